//! Protocol constants and configuration values

/// Conventional FastAGI listening port (`agi://host:4573/...`).
pub const DEFAULT_FASTAGI_PORT: u16 = 4573;

/// Prefix carried by every key in the environment block (`agi_channel: ...`).
pub const ENV_KEY_PREFIX: &str = "agi_";

/// Default minimum number of environment entries for a well-formed handshake.
///
/// Asterisk has sent between 18 and 25 variables across releases; 18 is the
/// most permissive observed floor. Override per session via
/// [`AgiSessionOptions`](crate::AgiSessionOptions) when talking to a peer
/// that sends more.
pub const DEFAULT_MIN_ENV_VARS: usize = 18;

/// Cap on environment-block read iterations. A safety bound on a runaway
/// peer, not a correctness rule.
pub const MAX_ENV_LINES: usize = 150;

/// Shortest known environment key including prefix (`agi_type`).
pub(crate) const ENV_KEY_MIN_LEN: usize = "agi_type".len();

/// Longest known environment key including prefix (`agi_network_script`).
pub(crate) const ENV_KEY_MAX_LEN: usize = "agi_network_script".len();

/// Status tokens on reply lines.
pub(crate) const STATUS_SUCCESS: &str = "200";
pub(crate) const STATUS_INVALID_COMMAND: &str = "510";
pub(crate) const STATUS_DEAD_CHANNEL: &str = "511";
pub(crate) const STATUS_BAD_SYNTAX: &str = "520";
/// The two-line syntax-error variant: the space-split token keeps the
/// hyphenated continuation word, and a usage line follows on the stream.
pub(crate) const STATUS_BAD_SYNTAX_USAGE: &str = "520-Invalid";

/// Unsolicited line sent by the peer when the call leg ends.
pub(crate) const HANGUP_TOKEN: &str = "HANGUP";

/// Byte offset of `=` in a well-formed `200 result=N` line.
pub(crate) const RESULT_KEYWORD_END: usize = "200 result".len();

/// Protocol line terminator.
pub const LINE_TERMINATOR: &str = "\n";
