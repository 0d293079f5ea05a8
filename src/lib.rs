//! Asterisk Gateway Interface (AGI) client for Rust
//!
//! This crate provides an async Rust implementation of the Asterisk Gateway
//! Interface, letting applications drive call control from a script invoked
//! by the dialplan — either directly over stdin/stdout, or as a FastAGI
//! server that Asterisk connects to over TCP.
//!
//! # Architecture
//!
//! An [`AgiSession`] owns one transport and speaks the line protocol in
//! lockstep: Asterisk opens the session with a block of `agi_` environment
//! variables, then each command sent gets exactly one classified reply.
//! Every AGI command is available as a method on the session; each returns
//! a [`Reply`] (numeric result plus optional payload) or an [`AgiError`]
//! describing exactly how the exchange failed.
//!
//! # Examples
//!
//! ## Standalone AGI
//!
//! Invoked from the dialplan via `AGI(myscript)`, with Asterisk on the other
//! end of stdin/stdout:
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AgiError, AgiSession, EnvKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgiError> {
//!     let mut agi = AgiSession::from_stdio().await?;
//!
//!     let caller = agi.env().var(EnvKey::CallerId).unwrap_or("unknown").to_string();
//!     agi.verbose(&format!("call from {}", caller), None).await?;
//!
//!     agi.answer().await?;
//!     agi.stream_file("welcome", "any", None).await?;
//!     agi.hangup(None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## FastAGI
//!
//! Asterisk connects to *your* application for each `agi://host:port/...`
//! dialplan invocation. You run a TCP listener and accept sessions:
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AgiError, AgiSession, DEFAULT_FASTAGI_PORT};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgiError> {
//!     let listener = TcpListener::bind(("0.0.0.0", DEFAULT_FASTAGI_PORT))
//!         .await
//!         .map_err(AgiError::from)?;
//!
//!     loop {
//!         let (mut agi, addr) = AgiSession::accept(&listener).await?;
//!         tokio::spawn(async move {
//!             let _ = addr;
//!             if let Err(err) = serve(&mut agi).await {
//!                 if !err.is_hangup() {
//!                     eprintln!("session failed: {}", err);
//!                 }
//!             }
//!         });
//!     }
//! }
//!
//! async fn serve(
//!     agi: &mut asterisk_agi_tokio::TcpSession,
//! ) -> Result<(), AgiError> {
//!     agi.answer().await?;
//!     agi.say_digits(42, "").await?;
//!     agi.hangup(None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Hangup handling
//!
//! Asterisk may end the call at any point by sending a bare `HANGUP` line in
//! place of a reply. It surfaces as [`AgiError::Hangup`] from whichever
//! command was in flight (or about to be sent); treat it as "session over",
//! not as a command failure.
//!
//! # Concurrency
//!
//! A session is strictly synchronous and single-owner. For many simultaneous
//! calls, run one session per task; sessions share nothing. There are no
//! internal timeouts — apply [`tokio::time::timeout`] around calls or use
//! transport-level deadlines if the peer may stall.

#[macro_use]
mod macros;

pub mod command;
pub mod constants;
pub mod env;
pub mod error;
pub mod session;

pub(crate) mod protocol;

pub use command::{AgiCommand, Reply};
pub use constants::{DEFAULT_FASTAGI_PORT, DEFAULT_MIN_ENV_VARS, ENV_KEY_PREFIX, MAX_ENV_LINES};
pub use env::{AgiEnv, EnvKey, ParseEnvKeyError};
pub use error::{AgiError, AgiResult};
pub use session::{AgiSession, AgiSessionOptions, StdioSession, TcpSession};
