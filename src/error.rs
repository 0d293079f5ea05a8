//! Error types for AGI sessions.

use thiserror::Error;

/// Convenience alias for `Result<T, AgiError>`.
pub type AgiResult<T> = Result<T, AgiError>;

/// All failure conditions an AGI session can surface.
///
/// Replies that Asterisk rejects ([`InvalidCommand`](AgiError::InvalidCommand),
/// [`DeadChannel`](AgiError::DeadChannel), [`InvalidSyntax`](AgiError::InvalidSyntax))
/// are distinct variants so callers can branch on cause instead of matching
/// message strings. [`Hangup`](AgiError::Hangup) is not a failure of the
/// current command but a signal that the peer has ended the session; no
/// further commands should be sent after it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgiError {
    /// Transport-level read/write failure, propagated verbatim.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An environment line violated the `agi_<key>: <value>` structure.
    /// The partially built environment is discarded.
    #[error("malformed environment input: {line}")]
    MalformedEnv {
        /// The offending line, terminator stripped.
        line: String,
    },

    /// The environment block ended with fewer entries than the configured
    /// minimum, indicating a truncated or non-conformant handshake.
    #[error("incomplete environment with only {count} env vars")]
    IncompleteEnv {
        /// Number of entries collected before the block ended.
        count: usize,
    },

    /// A reply line that fits none of the known shapes.
    #[error("malformed or partial AGI response: {line}")]
    MalformedResponse {
        /// The offending line, terminator stripped.
        line: String,
    },

    /// A `200` reply whose remainder is not `result=...`.
    #[error("malformed 200 response: {line}")]
    Malformed200 {
        /// The offending line, terminator stripped.
        line: String,
    },

    /// A `200 result=` reply whose result token is not a number.
    #[error("failed to parse AGI 200 reply: {source}")]
    ResultParse {
        /// The underlying conversion failure.
        #[source]
        source: std::num::ParseIntError,
    },

    /// `510` — Asterisk did not recognize the command.
    #[error("invalid or unknown command")]
    InvalidCommand,

    /// `511` — the command is not permitted on a dead channel.
    #[error("command not permitted on a dead channel")]
    DeadChannel,

    /// `520` or `520-Invalid` — Asterisk rejected the command syntax.
    #[error("invalid command syntax")]
    InvalidSyntax,

    /// The peer sent the out-of-band `HANGUP` line: the call is over.
    #[error("client sent a HANGUP request")]
    Hangup,
}

impl AgiError {
    /// `true` for the unsolicited hangup notification.
    pub fn is_hangup(&self) -> bool {
        matches!(self, AgiError::Hangup)
    }

    /// `true` for replies Asterisk itself rejected (510/511/520 families),
    /// as opposed to transport failures or unparseable input.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AgiError::InvalidCommand | AgiError::DeadChannel | AgiError::InvalidSyntax
        )
    }
}
