//! Session management: the command dispatcher and transport bindings.

use std::net::SocketAddr;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Stdin, Stdout,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{sanitize_command, AgiCommand, Reply},
    constants::{DEFAULT_MIN_ENV_VARS, HANGUP_TOKEN, LINE_TERMINATOR},
    env::AgiEnv,
    error::{AgiError, AgiResult},
    protocol,
};

/// Options for AGI session establishment.
///
/// Controls parameters fixed at handshake time. Use [`Default::default()`]
/// for standard settings.
#[derive(Debug, Clone)]
pub struct AgiSessionOptions {
    /// Minimum number of environment variables required for the handshake to
    /// be considered well formed. Default: 18. Asterisk releases differ in
    /// how many variables they send (18, 20 and 25 have all been observed);
    /// raise this when you rely on the newer variables being present.
    pub min_env_vars: usize,
}

impl Default for AgiSessionOptions {
    fn default() -> Self {
        Self {
            min_env_vars: DEFAULT_MIN_ENV_VARS,
        }
    }
}

/// One AGI session bound to its own transport.
///
/// A session is strictly synchronous: each command is written and flushed,
/// then exactly one reply is read. The engine holds no shared state, so run
/// one session per concurrent call, each on its own connection.
///
/// The session does not enforce timeouts; a peer that never terminates a
/// line blocks the in-flight read. Enforce deadlines at the transport layer
/// (or wrap calls in [`tokio::time::timeout`]) when that matters.
pub struct AgiSession<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    env: AgiEnv,
}

impl<R, W> std::fmt::Debug for AgiSession<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgiSession")
            .field("env_vars", &self.env.len())
            .finish()
    }
}

/// A standalone AGI session on the process's stdin/stdout.
pub type StdioSession = AgiSession<Stdin, Stdout>;

/// A FastAGI session on a TCP connection from Asterisk.
pub type TcpSession = AgiSession<OwnedReadHalf, OwnedWriteHalf>;

impl StdioSession {
    /// Start a standalone AGI session on standard input/output.
    ///
    /// This is the mode Asterisk uses when the dialplan invokes a local
    /// script via `AGI()`.
    pub async fn from_stdio() -> AgiResult<Self> {
        Self::start(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Start a standalone AGI session with custom options.
    pub async fn from_stdio_with_options(options: AgiSessionOptions) -> AgiResult<Self> {
        Self::start_with_options(tokio::io::stdin(), tokio::io::stdout(), options).await
    }
}

impl TcpSession {
    /// Accept one FastAGI connection from Asterisk and run its handshake.
    ///
    /// Asterisk connects to the listener for each `agi://host:port/...`
    /// dialplan invocation. Accept loops, worker pools and shutdown handling
    /// belong to the application; this accepts a single connection.
    pub async fn accept(listener: &TcpListener) -> AgiResult<(Self, SocketAddr)> {
        Self::accept_with_options(listener, AgiSessionOptions::default()).await
    }

    /// Accept one FastAGI connection with custom options.
    pub async fn accept_with_options(
        listener: &TcpListener,
        options: AgiSessionOptions,
    ) -> AgiResult<(Self, SocketAddr)> {
        let (stream, addr) = listener
            .accept()
            .await?;
        info!(%addr, "accepted FastAGI connection");
        let (read_half, write_half) = stream.into_split();
        let session = Self::start_with_options(read_half, write_half, options).await?;
        Ok((session, addr))
    }
}

impl<R, W> AgiSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Start a session on an arbitrary transport and run the handshake.
    ///
    /// Reads the environment block from `reader` before returning; on any
    /// handshake error the transport is dropped. Works with any byte stream
    /// (a TLS stream's split halves satisfy the same bounds).
    pub async fn start(reader: R, writer: W) -> AgiResult<Self> {
        Self::start_with_options(reader, writer, AgiSessionOptions::default()).await
    }

    /// Start a session with custom options.
    pub async fn start_with_options(
        reader: R,
        writer: W,
        options: AgiSessionOptions,
    ) -> AgiResult<Self> {
        let mut reader = BufReader::new(reader);
        let vars = protocol::parse_env_block(&mut reader, options.min_env_vars).await?;
        info!(env_vars = vars.len(), "AGI session established");
        Ok(Self {
            reader,
            writer: BufWriter::new(writer),
            env: AgiEnv::new(vars),
        })
    }

    /// The environment variables received in the handshake (read-only).
    pub fn env(&self) -> &AgiEnv {
        &self.env
    }

    /// Send a command and read back its reply.
    pub async fn send_command(&mut self, command: AgiCommand) -> AgiResult<Reply> {
        self.send_raw(&command.to_wire_format())
            .await
    }

    /// Send a raw command line and read back its reply.
    ///
    /// The text is sanitized (embedded `\r`/`\n` become spaces), terminated
    /// with a single newline and flushed before the reply is read; write and
    /// read form a strict pair with nothing interleaved between them.
    pub async fn send_raw(&mut self, command: &str) -> AgiResult<Reply> {
        // Data already waiting before the write is an out-of-band line from
        // the peer, usually a hangup notice. Sending now would desynchronize
        // the request/reply pairing, so surface that line instead.
        if self.has_buffered_input() {
            return Err(self
                .read_unsolicited()
                .await);
        }

        let line = sanitize_command(command);
        trace!(command = %line, "sending AGI command");
        self.writer
            .write_all(line.as_bytes())
            .await?;
        self.writer
            .write_all(LINE_TERMINATOR.as_bytes())
            .await?;
        // The peer waits synchronously for the full line; flush immediately.
        self.writer
            .flush()
            .await?;

        let result = protocol::parse_response(&mut self.reader).await;
        match &result {
            Ok(reply) => debug!(result = reply.result(), "command completed"),
            Err(err) => debug!(error = %err, "command did not complete"),
        }
        result
    }

    /// Whether bytes are already buffered from the peer without blocking.
    ///
    /// This only inspects the session's read buffer; it never touches the
    /// transport. It is the single point where out-of-band data is detected.
    fn has_buffered_input(&self) -> bool {
        !self
            .reader
            .buffer()
            .is_empty()
    }

    /// Consume and classify a line that arrived outside a request/reply pair.
    async fn read_unsolicited(&mut self) -> AgiError {
        let mut line = Vec::new();
        match self
            .reader
            .read_until(b'\n', &mut line)
            .await
        {
            Err(err) => AgiError::Io(err),
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                let text = String::from_utf8_lossy(&line).into_owned();
                warn!(line = %text, "unsolicited line from peer");
                if text == HANGUP_TOKEN {
                    AgiError::Hangup
                } else {
                    AgiError::MalformedResponse { line: text }
                }
            }
        }
    }

    /// Strip `(`/`)` wrapping from the reply payload.
    fn trim_wrapping(reply: Reply) -> Reply {
        let data = reply
            .data
            .trim_matches(['(', ')'])
            .to_string();
        Reply::new(reply.res, data)
    }

    /// Strip the `endpos=` prefix from the reply payload.
    fn strip_endpos(reply: Reply) -> Reply {
        let data = match reply
            .data
            .strip_prefix("endpos=")
        {
            Some(rest) => rest.to_string(),
            None => reply.data,
        };
        Reply::new(reply.res, data)
    }

    // Command wrappers. Result-code semantics are Asterisk's own; they are
    // documented here but not interpreted by the library.

    /// Answers the channel. Result is -1 on channel failure, or 0 if successful.
    pub async fn answer(&mut self) -> AgiResult<Reply> {
        self.send_command(AgiCommand::Answer)
            .await
    }

    /// Interrupts Async AGI. Result is always 0.
    pub async fn asyncagi_break(&mut self) -> AgiResult<Reply> {
        self.send_command(AgiCommand::AsyncAgiBreak)
            .await
    }

    /// Status of the given channel, or the current channel if `None`.
    ///
    /// Result values:
    ///     0 - Channel is down and available.
    ///     1 - Channel is down, but reserved.
    ///     2 - Channel is off hook.
    ///     3 - Digits (or equivalent) have been dialed.
    ///     4 - Line is ringing.
    ///     5 - Remote end is ringing.
    ///     6 - Line is up.
    ///     7 - Line is busy.
    pub async fn channel_status(&mut self, channel: Option<&str>) -> AgiResult<Reply> {
        self.send_command(AgiCommand::ChannelStatus {
            channel: channel.map(Into::into),
        })
        .await
    }

    /// Streams an audio file, letting the listener control playback.
    ///
    /// The optional arguments are positional: skip milliseconds,
    /// fast-forward digit (defaults to `*` on the Asterisk side), rewind
    /// digit (defaults to `#`), pause digit. Result is 0 if playback
    /// completes without a digit pressed, the ASCII value of the digit if
    /// one was pressed, or -1 on error or hangup.
    pub async fn control_stream_file(
        &mut self,
        file: &str,
        escape: &str,
        skip_ms: Option<u32>,
        fast_forward: Option<char>,
        rewind: Option<char>,
        pause: Option<char>,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::ControlStreamFile {
            file: file.into(),
            escape: escape.into(),
            skip_ms,
            fast_forward,
            rewind,
            pause,
        })
        .await
    }

    /// Removes a database key/value. Result is 1 if successful, 0 otherwise.
    pub async fn database_del(&mut self, family: &str, key: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::DatabaseDel {
            family: family.into(),
            key: key.into(),
        })
        .await
    }

    /// Removes a database key tree. Result is 1 if successful, 0 otherwise.
    pub async fn database_del_tree(
        &mut self,
        family: &str,
        key_tree: Option<&str>,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::DatabaseDelTree {
            family: family.into(),
            key_tree: key_tree.map(Into::into),
        })
        .await
    }

    /// Gets a database value. Result is 0 if the key is not set, 1 if it is
    /// set, with the value in the payload.
    pub async fn database_get(&mut self, family: &str, key: &str) -> AgiResult<Reply> {
        let reply = self
            .send_command(AgiCommand::DatabaseGet {
                family: family.into(),
                key: key.into(),
            })
            .await?;
        Ok(Self::trim_wrapping(reply))
    }

    /// Adds or updates a database value. Result is 1 if successful, 0 otherwise.
    pub async fn database_put(&mut self, family: &str, key: &str, value: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::DatabasePut {
            family: family.into(),
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    /// Executes a dialplan application. Result is whatever the application
    /// returns, or -2 on failure to find it.
    pub async fn exec(&mut self, app: &str, options: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::Exec {
            app: app.into(),
            options: options.into(),
        })
        .await
    }

    /// Prompts for DTMF on the channel. The payload holds the digits
    /// received from the channel at the other end.
    pub async fn get_data(
        &mut self,
        file: &str,
        timeout: Option<i32>,
        max_digits: Option<u32>,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::GetData {
            file: file.into(),
            timeout,
            max_digits,
        })
        .await
    }

    /// Evaluates a channel expression; uses the current channel if `None`.
    /// Result is 1 if the variable is set, with the value in the payload.
    /// Understands complex variable names and builtin variables.
    pub async fn get_full_variable(
        &mut self,
        variable: &str,
        channel: Option<&str>,
    ) -> AgiResult<Reply> {
        let reply = self
            .send_command(AgiCommand::GetFullVariable {
                variable: variable.into(),
                channel: channel.map(Into::into),
            })
            .await?;
        Ok(Self::trim_wrapping(reply))
    }

    /// Streams a file and prompts for DTMF with a timeout. The payload holds
    /// the sample offset; on failure to play back, result is -1.
    pub async fn get_option(
        &mut self,
        file: &str,
        escape: &str,
        timeout: Option<i32>,
    ) -> AgiResult<Reply> {
        let reply = self
            .send_command(AgiCommand::GetOption {
                file: file.into(),
                escape: escape.into(),
                timeout,
            })
            .await?;
        Ok(Self::strip_endpos(reply))
    }

    /// Gets a channel variable. Result is 0 if the variable is not set, 1 if
    /// it is set, with the value in the payload.
    pub async fn get_variable(&mut self, variable: &str) -> AgiResult<Reply> {
        let reply = self
            .send_command(AgiCommand::GetVariable {
                variable: variable.into(),
            })
            .await?;
        Ok(Self::trim_wrapping(reply))
    }

    /// Runs a dialplan subroutine, returning to the dialplan on `Return()`.
    pub async fn gosub(
        &mut self,
        context: &str,
        extension: &str,
        priority: &str,
        args: &str,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::GoSub {
            context: context.into(),
            extension: extension.into(),
            priority: priority.into(),
            args: args.into(),
        })
        .await
    }

    /// Hangs up the given channel, or the current channel if `None`. Result
    /// is 1 on success, -1 if the channel was not found.
    pub async fn hangup(&mut self, channel: Option<&str>) -> AgiResult<Reply> {
        let reply = self
            .send_command(AgiCommand::Hangup {
                channel: channel.map(Into::into),
            })
            .await?;
        // Asterisk follows the reply with its own HANGUP notice. Drain it if
        // it has already arrived so the next command does not trip over it.
        if self.has_buffered_input() {
            let mut notice = Vec::new();
            let _ = self
                .reader
                .read_until(b'\n', &mut notice)
                .await;
            trace!("drained hangup notice");
        }
        Ok(reply)
    }

    /// Does nothing, optionally logging a message. Result is always 0.
    pub async fn noop(&mut self, message: Option<&str>) -> AgiResult<Reply> {
        self.send_command(AgiCommand::Noop {
            message: message.map(Into::into),
        })
        .await
    }

    /// Sends a user-defined command line as-is (after sanitization). Useful
    /// for debugging and for commands this library does not wrap.
    pub async fn raw_command(&mut self, command: &str) -> AgiResult<Reply> {
        self.send_raw(command)
            .await
    }

    /// Receives one character from channels supporting it. Result is the
    /// decimal value of the character, 0 if the channel does not support
    /// text reception, or -1 on error or hangup.
    pub async fn receive_char(&mut self, timeout: i32) -> AgiResult<Reply> {
        self.send_command(AgiCommand::ReceiveChar { timeout })
            .await
    }

    /// Receives text from channels supporting it. Result is -1 for failure
    /// or 1 for success, with the text in the payload.
    pub async fn receive_text(&mut self, timeout: i32) -> AgiResult<Reply> {
        let reply = self
            .send_command(AgiCommand::ReceiveText { timeout })
            .await?;
        Ok(Self::trim_wrapping(reply))
    }

    /// Records channel audio to a file. `timeout` is the maximum record time
    /// in milliseconds, -1 for none. `silence` is the number of seconds of
    /// silence allowed before returning despite the lack of digits.
    pub async fn record_file(
        &mut self,
        file: &str,
        format: &str,
        escape: &str,
        timeout: i32,
        offset: Option<u32>,
        beep: bool,
        silence: Option<u32>,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::RecordFile {
            file: file.into(),
            format: format.into(),
            escape: escape.into(),
            timeout,
            offset,
            beep,
            silence,
        })
        .await
    }

    /// Says a character string. Result is 0 if playback completes without a
    /// digit pressed, the ASCII value of the digit if one was pressed, or -1
    /// on error or hangup. The same convention applies to the other `say_*`
    /// methods.
    pub async fn say_alpha(&mut self, text: &str, escape: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SayAlpha {
            text: text.into(),
            escape: escape.into(),
        })
        .await
    }

    /// Says a date (Unix time format).
    pub async fn say_date(&mut self, date: i64, escape: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SayDate {
            date,
            escape: escape.into(),
        })
        .await
    }

    /// Says a date and time (Unix time format). `format` defaults on the
    /// Asterisk side to `ABdY 'digits/at' IMp`; `timezone` to the machine
    /// default (acceptable values live in /usr/share/zoneinfo).
    pub async fn say_datetime(
        &mut self,
        time: i64,
        escape: &str,
        format: Option<&str>,
        timezone: Option<&str>,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SayDateTime {
            time,
            escape: escape.into(),
            format: format.map(Into::into),
            timezone: timezone.map(Into::into),
        })
        .await
    }

    /// Says a number digit by digit.
    pub async fn say_digits(&mut self, digits: i32, escape: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SayDigits {
            digits,
            escape: escape.into(),
        })
        .await
    }

    /// Says a number, with optional gender.
    pub async fn say_number(
        &mut self,
        number: i32,
        escape: &str,
        gender: Option<&str>,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SayNumber {
            number,
            escape: escape.into(),
            gender: gender.map(Into::into),
        })
        .await
    }

    /// Says a character string with phonetics.
    pub async fn say_phonetic(&mut self, text: &str, escape: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SayPhonetic {
            text: text.into(),
            escape: escape.into(),
        })
        .await
    }

    /// Says a time (Unix time format).
    pub async fn say_time(&mut self, time: i64, escape: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SayTime {
            time,
            escape: escape.into(),
        })
        .await
    }

    /// Sends an image to channels supporting it. Image names should not
    /// include extensions. Result is 0 if sent or unsupported, -1 on error.
    pub async fn send_image(&mut self, image: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SendImage {
            image: image.into(),
        })
        .await
    }

    /// Sends text to channels supporting it. Result is 0 if sent or
    /// unsupported, -1 on error.
    pub async fn send_text(&mut self, text: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SendText { text: text.into() })
            .await
    }

    /// Hangs up the channel automatically after `seconds`; 0 disables the
    /// feature. Result is always 0.
    pub async fn set_auto_hangup(&mut self, seconds: u32) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SetAutoHangup { seconds })
            .await
    }

    /// Sets the caller id for the current channel. Result is always 1.
    pub async fn set_caller_id(&mut self, caller_id: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SetCallerId {
            caller_id: caller_id.into(),
        })
        .await
    }

    /// Sets the channel's dialplan context. Result is always 0.
    pub async fn set_context(&mut self, context: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SetContext {
            context: context.into(),
        })
        .await
    }

    /// Sets the channel's dialplan extension. Result is always 0.
    pub async fn set_extension(&mut self, extension: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SetExtension {
            extension: extension.into(),
        })
        .await
    }

    /// Enables or disables the music-on-hold generator, optionally naming a
    /// class. Result is always 0.
    pub async fn set_music(&mut self, on: bool, class: Option<&str>) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SetMusic {
            on,
            class: class.map(Into::into),
        })
        .await
    }

    /// Sets the channel's dialplan priority (a number or a label). Result is
    /// always 0.
    pub async fn set_priority(&mut self, priority: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SetPriority {
            priority: priority.into(),
        })
        .await
    }

    /// Sets a channel variable. Result is always 1.
    pub async fn set_variable(&mut self, variable: &str, value: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SetVariable {
            variable: variable.into(),
            value: value.into(),
        })
        .await
    }

    /// Activates a speech grammar. Result is 1 on success, 0 on error; the
    /// same convention applies to the other `speech_*` methods.
    pub async fn speech_activate_grammar(&mut self, grammar: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechActivateGrammar {
            grammar: grammar.into(),
        })
        .await
    }

    /// Creates a speech object for the given engine.
    pub async fn speech_create(&mut self, engine: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechCreate {
            engine: engine.into(),
        })
        .await
    }

    /// Deactivates a speech grammar.
    pub async fn speech_deactivate_grammar(&mut self, grammar: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechDeactivateGrammar {
            grammar: grammar.into(),
        })
        .await
    }

    /// Destroys the speech object.
    pub async fn speech_destroy(&mut self) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechDestroy)
            .await
    }

    /// Loads a speech grammar from a path.
    pub async fn speech_load_grammar(&mut self, grammar: &str, path: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechLoadGrammar {
            grammar: grammar.into(),
            path: path.into(),
        })
        .await
    }

    /// Recognizes speech. On success the payload carries engine-specific
    /// result values.
    pub async fn speech_recognize(
        &mut self,
        prompt: &str,
        timeout: &str,
        offset: &str,
    ) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechRecognize {
            prompt: prompt.into(),
            timeout: timeout.into(),
            offset: offset.into(),
        })
        .await
    }

    /// Sets a speech engine setting.
    pub async fn speech_set(&mut self, name: &str, value: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechSet {
            name: name.into(),
            value: value.into(),
        })
        .await
    }

    /// Unloads a speech grammar.
    pub async fn speech_unload_grammar(&mut self, grammar: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::SpeechUnloadGrammar {
            grammar: grammar.into(),
        })
        .await
    }

    /// Streams an audio file, optionally from a sample offset. Result is 0
    /// if playback completes without a digit pressed, the ASCII value of the
    /// digit if one was pressed, or -1 on error or disconnect. Music on hold
    /// is stopped and not restarted.
    pub async fn stream_file(
        &mut self,
        file: &str,
        escape: &str,
        offset: Option<u32>,
    ) -> AgiResult<Reply> {
        let reply = self
            .send_command(AgiCommand::StreamFile {
                file: file.into(),
                escape: escape.into(),
                offset,
            })
            .await?;
        Ok(Self::strip_endpos(reply))
    }

    /// Toggles TDD mode (for the deaf). Result is 1 if successful, 0 if the
    /// channel is not TDD-capable.
    pub async fn tdd_mode(&mut self, mode: &str) -> AgiResult<Reply> {
        self.send_command(AgiCommand::TddMode { mode: mode.into() })
            .await
    }

    /// Logs a message to the Asterisk verbose log, optionally at a level
    /// (1-4). Result is always 1.
    pub async fn verbose(&mut self, message: &str, level: Option<u32>) -> AgiResult<Reply> {
        self.send_command(AgiCommand::Verbose {
            message: message.into(),
            level,
        })
        .await
    }

    /// Waits for a DTMF digit. Use -1 to block indefinitely. Result is -1 on
    /// channel failure, 0 if no digit arrived in time, or the ASCII value of
    /// the digit received.
    pub async fn wait_for_digit(&mut self, timeout: i32) -> AgiResult<Reply> {
        self.send_command(AgiCommand::WaitForDigit { timeout })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, ReadHalf, WriteHalf};

    const ENV_BLOCK: &str = "agi_network: yes\n\
        agi_network_script: foo\n\
        agi_request: agi://127.0.0.1/foo\n\
        agi_channel: SIP/1234-00000000\n\
        agi_language: en\n\
        agi_type: SIP\n\
        agi_uniqueid: 1397044468.0\n\
        agi_version: 0.1\n\
        agi_callerid: 1001\n\
        agi_calleridname: 1001\n\
        agi_callingpres: 67\n\
        agi_callingani2: 0\n\
        agi_callington: 0\n\
        agi_callingtns: 0\n\
        agi_dnid: 123456\n\
        agi_rdnis: unknown\n\
        agi_context: default\n\
        agi_extension: 123456\n\
        agi_priority: 1\n\
        agi_enhanced: 0.0\n\
        agi_accountcode: 0\n\
        agi_threadid: -1289290944\n\
        \n";

    type PeerReader = BufReader<ReadHalf<tokio::io::DuplexStream>>;
    type PeerWriter = WriteHalf<tokio::io::DuplexStream>;

    /// Start a session against an in-memory peer that has already sent the
    /// environment block (plus any extra bytes).
    async fn session_with_peer(
        extra: &str,
    ) -> (
        AgiSession<ReadHalf<tokio::io::DuplexStream>, WriteHalf<tokio::io::DuplexStream>>,
        PeerReader,
        PeerWriter,
    ) {
        let (ours, theirs) = duplex(16 * 1024);
        let (our_read, our_write) = split(ours);
        let (peer_read, mut peer_write) = split(theirs);

        peer_write
            .write_all(ENV_BLOCK.as_bytes())
            .await
            .unwrap();
        peer_write
            .write_all(extra.as_bytes())
            .await
            .unwrap();

        let session = AgiSession::start(our_read, our_write)
            .await
            .unwrap();
        (session, BufReader::new(peer_read), peer_write)
    }

    #[tokio::test]
    async fn handshake_builds_environment() {
        let (session, _peer_read, _peer_write) = session_with_peer("").await;
        assert_eq!(
            session
                .env()
                .len(),
            22
        );
        assert_eq!(
            session
                .env()
                .get("channel"),
            Some("SIP/1234-00000000")
        );
    }

    #[tokio::test]
    async fn handshake_rejects_short_environment() {
        let (ours, theirs) = duplex(1024);
        let (our_read, our_write) = split(ours);
        let (_peer_read, mut peer_write) = split(theirs);

        peer_write
            .write_all(b"agi_network: yes\n\n")
            .await
            .unwrap();

        let err = AgiSession::start(our_read, our_write)
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::IncompleteEnv { count: 1 }));
    }

    #[tokio::test]
    async fn dispatcher_writes_then_reads() {
        let (mut session, mut peer_read, mut peer_write) = session_with_peer("").await;

        let exchange = tokio::spawn(async move {
            let mut line = String::new();
            peer_read
                .read_line(&mut line)
                .await
                .unwrap();
            assert_eq!(line, "GET OPTION echo \"any\"\n");
            peer_write
                .write_all(b"200 result=1 endpos=1234\n")
                .await
                .unwrap();
        });

        let reply = session
            .get_option("echo", "any", None)
            .await
            .unwrap();
        assert_eq!(reply.result(), 1);
        assert_eq!(reply.data(), "1234");
        exchange
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn command_text_cannot_inject_lines() {
        let (mut session, mut peer_read, mut peer_write) = session_with_peer("").await;

        let exchange = tokio::spawn(async move {
            let mut line = String::new();
            peer_read
                .read_line(&mut line)
                .await
                .unwrap();
            // Exactly one line reaches the wire, terminators replaced.
            assert_eq!(line, "VERBOSE \"first second  third\"\n");
            peer_write
                .write_all(b"200 result=1\n")
                .await
                .unwrap();
        });

        let reply = session
            .send_raw("VERBOSE \"first\nsecond\r\nthird\"")
            .await
            .unwrap();
        assert_eq!(reply.result(), 1);
        exchange
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn buffered_hangup_preempts_send() {
        // The hangup notice is on the wire before any command is sent.
        let (mut session, _peer_read, _peer_write) = session_with_peer("HANGUP\n").await;

        let err = session
            .answer()
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::Hangup));
    }

    #[tokio::test]
    async fn buffered_junk_preempts_send() {
        let (mut session, _peer_read, _peer_write) = session_with_peer("spurious noise\n").await;

        let err = session
            .answer()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgiError::MalformedResponse { ref line } if line == "spurious noise"
        ));
    }

    #[tokio::test]
    async fn get_variable_strips_wrapping() {
        let (mut session, mut peer_read, mut peer_write) = session_with_peer("").await;

        let exchange = tokio::spawn(async move {
            let mut line = String::new();
            peer_read
                .read_line(&mut line)
                .await
                .unwrap();
            assert_eq!(line, "GET VARIABLE UNIQUEID\n");
            peer_write
                .write_all(b"200 result=1 (1397044468.0)\n")
                .await
                .unwrap();
        });

        let reply = session
            .get_variable("UNIQUEID")
            .await
            .unwrap();
        assert_eq!(reply.result(), 1);
        assert_eq!(reply.data(), "1397044468.0");
        exchange
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hangup_drains_pending_notice() {
        let (mut session, mut peer_read, mut peer_write) = session_with_peer("").await;

        let exchange = tokio::spawn(async move {
            let mut line = String::new();
            peer_read
                .read_line(&mut line)
                .await
                .unwrap();
            assert_eq!(line, "HANGUP\n");
            // Reply and notice in one write so both are buffered client-side.
            peer_write
                .write_all(b"200 result=1\nHANGUP\n")
                .await
                .unwrap();

            // The follow-up command must still pair up cleanly.
            let mut line = String::new();
            peer_read
                .read_line(&mut line)
                .await
                .unwrap();
            assert_eq!(line, "NOOP\n");
            peer_write
                .write_all(b"200 result=0\n")
                .await
                .unwrap();
        });

        let reply = session
            .hangup(None)
            .await
            .unwrap();
        assert_eq!(reply.result(), 1);

        let reply = session
            .noop(None)
            .await
            .unwrap();
        assert_eq!(reply.result(), 0);
        exchange
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn closed_transport_surfaces_io_error() {
        let (mut session, _peer_read, peer_write) = session_with_peer("").await;
        drop(peer_write);
        drop(_peer_read);

        let err = session
            .answer()
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::Io(_)));
    }
}
