//! The AGI environment block: typed key names and the read-only variable map.

use std::collections::HashMap;

/// Error returned when parsing an unrecognized environment key name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnvKeyError(pub String);

impl std::fmt::Display for ParseEnvKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown environment key: {}", self.0)
    }
}

impl std::error::Error for ParseEnvKeyError {}

define_key_enum! {
    error_type: ParseEnvKeyError,
    /// Well-known environment keys sent by Asterisk at session start.
    ///
    /// These are the key names after the `agi_` prefix has been stripped.
    /// Use with [`AgiEnv::var()`] for type-safe lookups. Positional script
    /// arguments (`arg_1`, `arg_2`, ...) are not listed here; read them with
    /// [`AgiEnv::arg()`].
    pub enum EnvKey {
        Network => "network",
        NetworkScript => "network_script",
        Request => "request",
        Channel => "channel",
        Language => "language",
        Type => "type",
        UniqueId => "uniqueid",
        Version => "version",
        CallerId => "callerid",
        CallerIdName => "calleridname",
        CallingPres => "callingpres",
        CallingAni2 => "callingani2",
        CallingTon => "callington",
        CallingTns => "callingtns",
        Dnid => "dnid",
        Rdnis => "rdnis",
        Context => "context",
        Extension => "extension",
        Priority => "priority",
        Enhanced => "enhanced",
        AccountCode => "accountcode",
        ThreadId => "threadid",
    }
}

/// The environment variables received in the session handshake.
///
/// Built once when the session starts and read-only afterwards. Keys are
/// stored with the `agi_` prefix already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgiEnv {
    vars: HashMap<String, String>,
}

impl AgiEnv {
    pub(crate) fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Look up a variable by its raw key name (without the `agi_` prefix).
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.vars
            .get(key.as_ref())
            .map(|s| s.as_str())
    }

    /// Look up a well-known variable by typed key.
    pub fn var(&self, key: EnvKey) -> Option<&str> {
        self.get(key.as_str())
    }

    /// Positional script argument `arg_<n>` (1-based, matching the wire names).
    pub fn arg(&self, n: usize) -> Option<&str> {
        self.get(format!("arg_{}", n))
    }

    /// All positional script arguments in order, stopping at the first gap.
    pub fn args(&self) -> Vec<&str> {
        let mut args = Vec::new();
        for n in 1.. {
            match self.arg(n) {
                Some(value) => args.push(value),
                None => break,
            }
        }
        args
    }

    /// Number of variables in the environment.
    pub fn len(&self) -> usize {
        self.vars
            .len()
    }

    /// `true` if the environment holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars
            .is_empty()
    }

    /// Iterate over all `(key, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_env() -> AgiEnv {
        let vars: HashMap<String, String> = [
            ("request", "agi://127.0.0.1/foo"),
            ("channel", "SIP/1234-00000000"),
            ("type", "SIP"),
            ("uniqueid", "1397044468.0"),
            ("arg_1", "argument1"),
            ("arg_2", "argument 2"),
            ("arg_3", "3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        AgiEnv::new(vars)
    }

    #[test]
    fn typed_and_raw_lookup_agree() {
        let env = sample_env();
        assert_eq!(env.var(EnvKey::Channel), Some("SIP/1234-00000000"));
        assert_eq!(env.get("channel"), Some("SIP/1234-00000000"));
        assert_eq!(env.var(EnvKey::Rdnis), None);
    }

    #[test]
    fn positional_args_in_order() {
        let env = sample_env();
        assert_eq!(env.arg(1), Some("argument1"));
        assert_eq!(env.arg(2), Some("argument 2"));
        assert_eq!(env.args(), vec!["argument1", "argument 2", "3"]);
        assert_eq!(env.arg(4), None);
    }

    #[test]
    fn key_display_round_trip() {
        assert_eq!(EnvKey::NetworkScript.to_string(), "network_script");
        assert_eq!(
            "calleridname".parse::<EnvKey>(),
            Ok(EnvKey::CallerIdName)
        );
        assert_eq!("UNIQUEID".parse::<EnvKey>(), Ok(EnvKey::UniqueId));
    }

    #[test]
    fn unknown_key_errors() {
        let err = "not_a_key".parse::<EnvKey>();
        assert!(err.is_err());
        assert_eq!(
            err.unwrap_err()
                .to_string(),
            "unknown environment key: not_a_key"
        );
    }
}
