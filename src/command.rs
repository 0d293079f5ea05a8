//! Command formatting and the reply value returned for each command.

use std::fmt::Write;

/// Structured result of one AGI command invocation.
///
/// Holds the numeric result extracted from a `200 result=N` line and any
/// additional payload that followed it. The numeric code's meaning is
/// command-specific (for example `ANSWER` reports `-1` on channel failure
/// and `0` on success); this layer does not interpret it. A fresh `Reply`
/// is produced per invocation and handed to the caller by value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub(crate) res: i32,
    pub(crate) data: String,
}

impl Reply {
    pub(crate) fn new(res: i32, data: String) -> Self {
        Self { res, data }
    }

    /// The numeric result of the command.
    pub fn result(&self) -> i32 {
        self.res
    }

    /// Additional data returned alongside the numeric result, empty if none.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Consume the reply, keeping only the payload.
    pub fn into_data(self) -> String {
        self.data
    }
}

/// Replace embedded line terminators with spaces.
///
/// AGI commands are line-delimited; a `\r` or `\n` inside a caller-supplied
/// value would inject extra protocol lines and desynchronize the session.
pub(crate) fn sanitize_command(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// An AGI command and its arguments.
///
/// [`to_wire_format`](AgiCommand::to_wire_format) produces the single-line
/// wire text (without the trailing newline, which the session appends).
/// Free-text and escape-digit arguments are double-quoted the way Asterisk
/// expects; optional arguments are positional and emitted in protocol order.
///
/// Most callers go through the wrapper methods on
/// [`AgiSession`](crate::AgiSession) rather than building commands directly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AgiCommand {
    /// Answer the channel.
    Answer,
    /// Interrupt Async AGI.
    AsyncAgiBreak,
    /// Status of the given channel, or the current channel if `None`.
    ChannelStatus { channel: Option<String> },
    /// Stream an audio file with listener-controlled playback.
    ControlStreamFile {
        file: String,
        escape: String,
        skip_ms: Option<u32>,
        fast_forward: Option<char>,
        rewind: Option<char>,
        pause: Option<char>,
    },
    /// Remove a database key/value.
    DatabaseDel { family: String, key: String },
    /// Remove a database key tree.
    DatabaseDelTree {
        family: String,
        key_tree: Option<String>,
    },
    /// Get a database value.
    DatabaseGet { family: String, key: String },
    /// Add or update a database value.
    DatabasePut {
        family: String,
        key: String,
        value: String,
    },
    /// Execute a dialplan application.
    Exec { app: String, options: String },
    /// Prompt for DTMF on the channel.
    GetData {
        file: String,
        timeout: Option<i32>,
        max_digits: Option<u32>,
    },
    /// Evaluate a channel expression, understanding complex variable names.
    GetFullVariable {
        variable: String,
        channel: Option<String>,
    },
    /// Stream a file and prompt for DTMF with a timeout.
    GetOption {
        file: String,
        escape: String,
        timeout: Option<i32>,
    },
    /// Get a channel variable.
    GetVariable { variable: String },
    /// Run a dialplan subroutine, returning on its `Return()`.
    GoSub {
        context: String,
        extension: String,
        priority: String,
        args: String,
    },
    /// Hang up the given channel, or the current channel if `None`.
    Hangup { channel: Option<String> },
    /// Do nothing, optionally logging a message.
    Noop { message: Option<String> },
    /// Receive one character from channels supporting it.
    ReceiveChar { timeout: i32 },
    /// Receive text from channels supporting it.
    ReceiveText { timeout: i32 },
    /// Record channel audio to a file.
    RecordFile {
        file: String,
        format: String,
        escape: String,
        timeout: i32,
        offset: Option<u32>,
        beep: bool,
        silence: Option<u32>,
    },
    /// Say a character string.
    SayAlpha { text: String, escape: String },
    /// Say a date (Unix time).
    SayDate { date: i64, escape: String },
    /// Say a date and time (Unix time), with optional format and timezone.
    SayDateTime {
        time: i64,
        escape: String,
        format: Option<String>,
        timezone: Option<String>,
    },
    /// Say a number digit by digit.
    SayDigits { digits: i32, escape: String },
    /// Say a number, with optional gender.
    SayNumber {
        number: i32,
        escape: String,
        gender: Option<String>,
    },
    /// Say a character string with phonetics.
    SayPhonetic { text: String, escape: String },
    /// Say a time (Unix time).
    SayTime { time: i64, escape: String },
    /// Send an image to channels supporting it.
    SendImage { image: String },
    /// Send text to channels supporting it.
    SendText { text: String },
    /// Hang up the channel automatically after the given seconds (0 disables).
    SetAutoHangup { seconds: u32 },
    /// Set the caller id for the current channel.
    SetCallerId { caller_id: String },
    /// Set the channel's dialplan context.
    SetContext { context: String },
    /// Set the channel's dialplan extension.
    SetExtension { extension: String },
    /// Enable or disable the music-on-hold generator.
    SetMusic { on: bool, class: Option<String> },
    /// Set the channel's dialplan priority (a number or a label).
    SetPriority { priority: String },
    /// Set a channel variable.
    SetVariable { variable: String, value: String },
    /// Activate a speech grammar.
    SpeechActivateGrammar { grammar: String },
    /// Create a speech object for the given engine.
    SpeechCreate { engine: String },
    /// Deactivate a speech grammar.
    SpeechDeactivateGrammar { grammar: String },
    /// Destroy the speech object.
    SpeechDestroy,
    /// Load a speech grammar from a path.
    SpeechLoadGrammar { grammar: String, path: String },
    /// Recognize speech.
    SpeechRecognize {
        prompt: String,
        timeout: String,
        offset: String,
    },
    /// Set a speech engine setting.
    SpeechSet { name: String, value: String },
    /// Unload a speech grammar.
    SpeechUnloadGrammar { grammar: String },
    /// Stream an audio file, optionally from a sample offset.
    StreamFile {
        file: String,
        escape: String,
        offset: Option<u32>,
    },
    /// Toggle TDD mode.
    TddMode { mode: String },
    /// Log a message to the Asterisk verbose log.
    Verbose {
        message: String,
        level: Option<u32>,
    },
    /// Wait for a DTMF digit (`-1` blocks indefinitely).
    WaitForDigit { timeout: i32 },
    /// A user-supplied command line, sent as-is after sanitization.
    Raw { command: String },
}

impl AgiCommand {
    /// Append ` {arg}` if the optional argument is present.
    fn push_opt<T: std::fmt::Display>(out: &mut String, arg: Option<&T>) {
        if let Some(arg) = arg {
            let _ = write!(out, " {}", arg);
        }
    }

    /// The single-line wire text for this command, without the terminator.
    pub fn to_wire_format(&self) -> String {
        match self {
            AgiCommand::Answer => "ANSWER".to_string(),
            AgiCommand::AsyncAgiBreak => "ASYNCAGI BREAK".to_string(),
            AgiCommand::ChannelStatus { channel } => {
                let mut out = String::from("CHANNEL STATUS");
                Self::push_opt(&mut out, channel.as_ref());
                out
            }
            AgiCommand::ControlStreamFile {
                file,
                escape,
                skip_ms,
                fast_forward,
                rewind,
                pause,
            } => {
                let mut out = format!("CONTROL STREAM FILE {} \"{}\"", file, escape);
                Self::push_opt(&mut out, skip_ms.as_ref());
                Self::push_opt(&mut out, fast_forward.as_ref());
                Self::push_opt(&mut out, rewind.as_ref());
                Self::push_opt(&mut out, pause.as_ref());
                out
            }
            AgiCommand::DatabaseDel { family, key } => {
                format!("DATABASE DEL {} {}", family, key)
            }
            AgiCommand::DatabaseDelTree { family, key_tree } => {
                let mut out = format!("DATABASE DELTREE {}", family);
                Self::push_opt(&mut out, key_tree.as_ref());
                out
            }
            AgiCommand::DatabaseGet { family, key } => {
                format!("DATABASE GET {} {}", family, key)
            }
            AgiCommand::DatabasePut { family, key, value } => {
                format!("DATABASE PUT {} {} {}", family, key, value)
            }
            AgiCommand::Exec { app, options } => format!("EXEC {} {}", app, options),
            AgiCommand::GetData {
                file,
                timeout,
                max_digits,
            } => {
                let mut out = format!("GET DATA {}", file);
                Self::push_opt(&mut out, timeout.as_ref());
                Self::push_opt(&mut out, max_digits.as_ref());
                out
            }
            AgiCommand::GetFullVariable { variable, channel } => {
                let mut out = format!("GET FULL VARIABLE {}", variable);
                Self::push_opt(&mut out, channel.as_ref());
                out
            }
            AgiCommand::GetOption {
                file,
                escape,
                timeout,
            } => {
                let mut out = format!("GET OPTION {} \"{}\"", file, escape);
                Self::push_opt(&mut out, timeout.as_ref());
                out
            }
            AgiCommand::GetVariable { variable } => format!("GET VARIABLE {}", variable),
            AgiCommand::GoSub {
                context,
                extension,
                priority,
                args,
            } => format!("GOSUB {} {} {} {}", context, extension, priority, args),
            AgiCommand::Hangup { channel } => {
                let mut out = String::from("HANGUP");
                Self::push_opt(&mut out, channel.as_ref());
                out
            }
            AgiCommand::Noop { message } => {
                let mut out = String::from("NOOP");
                Self::push_opt(&mut out, message.as_ref());
                out
            }
            AgiCommand::ReceiveChar { timeout } => format!("RECEIVE CHAR {}", timeout),
            AgiCommand::ReceiveText { timeout } => format!("RECEIVE TEXT {}", timeout),
            AgiCommand::RecordFile {
                file,
                format,
                escape,
                timeout,
                offset,
                beep,
                silence,
            } => {
                let mut out =
                    format!("RECORD FILE {} {} \"{}\" {}", file, format, escape, timeout);
                Self::push_opt(&mut out, offset.as_ref());
                if *beep {
                    out.push_str(" BEEP");
                }
                if let Some(silence) = silence {
                    let _ = write!(out, " s={}", silence);
                }
                out
            }
            AgiCommand::SayAlpha { text, escape } => {
                format!("SAY ALPHA {} \"{}\"", text, escape)
            }
            AgiCommand::SayDate { date, escape } => format!("SAY DATE {} \"{}\"", date, escape),
            AgiCommand::SayDateTime {
                time,
                escape,
                format,
                timezone,
            } => {
                let mut out = format!("SAY DATETIME {} \"{}\"", time, escape);
                Self::push_opt(&mut out, format.as_ref());
                Self::push_opt(&mut out, timezone.as_ref());
                out
            }
            AgiCommand::SayDigits { digits, escape } => {
                format!("SAY DIGITS {} \"{}\"", digits, escape)
            }
            AgiCommand::SayNumber {
                number,
                escape,
                gender,
            } => {
                let mut out = format!("SAY NUMBER {} \"{}\"", number, escape);
                Self::push_opt(&mut out, gender.as_ref());
                out
            }
            AgiCommand::SayPhonetic { text, escape } => {
                format!("SAY PHONETIC {} \"{}\"", text, escape)
            }
            AgiCommand::SayTime { time, escape } => format!("SAY TIME {} \"{}\"", time, escape),
            AgiCommand::SendImage { image } => format!("SEND IMAGE {}", image),
            AgiCommand::SendText { text } => format!("SEND TEXT \"{}\"", text),
            AgiCommand::SetAutoHangup { seconds } => format!("SET AUTOHANGUP {}", seconds),
            AgiCommand::SetCallerId { caller_id } => format!("SET CALLERID {}", caller_id),
            AgiCommand::SetContext { context } => format!("SET CONTEXT {}", context),
            AgiCommand::SetExtension { extension } => format!("SET EXTENSION {}", extension),
            AgiCommand::SetMusic { on, class } => {
                let mut out = format!("SET MUSIC {}", if *on { "on" } else { "off" });
                Self::push_opt(&mut out, class.as_ref());
                out
            }
            AgiCommand::SetPriority { priority } => format!("SET PRIORITY {}", priority),
            AgiCommand::SetVariable { variable, value } => {
                format!("SET VARIABLE \"{}\" \"{}\"", variable, value)
            }
            AgiCommand::SpeechActivateGrammar { grammar } => {
                format!("SPEECH ACTIVATE GRAMMAR {}", grammar)
            }
            AgiCommand::SpeechCreate { engine } => format!("SPEECH CREATE {}", engine),
            AgiCommand::SpeechDeactivateGrammar { grammar } => {
                format!("SPEECH DEACTIVATE GRAMMAR {}", grammar)
            }
            AgiCommand::SpeechDestroy => "SPEECH DESTROY".to_string(),
            AgiCommand::SpeechLoadGrammar { grammar, path } => {
                format!("SPEECH LOAD GRAMMAR {} {}", grammar, path)
            }
            AgiCommand::SpeechRecognize {
                prompt,
                timeout,
                offset,
            } => format!("SPEECH RECOGNIZE {} {} {}", prompt, timeout, offset),
            AgiCommand::SpeechSet { name, value } => format!("SPEECH SET {} {}", name, value),
            AgiCommand::SpeechUnloadGrammar { grammar } => {
                format!("SPEECH UNLOAD GRAMMAR {}", grammar)
            }
            AgiCommand::StreamFile {
                file,
                escape,
                offset,
            } => {
                let mut out = format!("STREAM FILE {} \"{}\"", file, escape);
                Self::push_opt(&mut out, offset.as_ref());
                out
            }
            AgiCommand::TddMode { mode } => format!("TDD MODE {}", mode),
            AgiCommand::Verbose { message, level } => {
                let mut out = format!("VERBOSE \"{}\"", message);
                Self::push_opt(&mut out, level.as_ref());
                out
            }
            AgiCommand::WaitForDigit { timeout } => format!("WAIT FOR DIGIT {}", timeout),
            AgiCommand::Raw { command } => command.clone(),
        }
    }
}
