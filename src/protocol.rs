//! AGI wire protocol parsing: the environment handshake and reply classification.
//!
//! Both parsers consume exactly the lines that belong to them, so the stream
//! stays framed for the next read. Reply classification is the load-bearing
//! part: the wire format has three distinct success shapes, a two-line
//! syntax-error variant, and an out-of-band `HANGUP` line, and every command
//! call site depends on telling them apart.

use std::collections::HashMap;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{trace, warn};

use crate::{
    command::Reply,
    constants::{
        ENV_KEY_MAX_LEN, ENV_KEY_MIN_LEN, ENV_KEY_PREFIX, HANGUP_TOKEN, MAX_ENV_LINES,
        RESULT_KEYWORD_END, STATUS_BAD_SYNTAX, STATUS_BAD_SYNTAX_USAGE, STATUS_DEAD_CHANNEL,
        STATUS_INVALID_COMMAND, STATUS_SUCCESS,
    },
    error::{AgiError, AgiResult},
};

/// Parse the environment block sent by Asterisk at session start.
///
/// Reads `agi_<key>: <value>` lines until the blank terminator line, end of
/// stream, or the iteration cap. On success the returned map holds each key
/// with the `agi_` prefix stripped. Any structural violation aborts the
/// parse and discards the partial map; a block that terminates with fewer
/// than `min_vars` entries is reported as incomplete even if every line was
/// individually well formed.
pub(crate) async fn parse_env_block<R>(
    reader: &mut R,
    min_vars: usize,
) -> AgiResult<HashMap<String, String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut vars = HashMap::new();
    let mut line = Vec::new();

    for _ in 0..=MAX_ENV_LINES {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await?;
        // End of stream, or a partial line with no terminator: the block is
        // over. The empty terminator line also lands here (n <= 2 covers a
        // bare "\n" and a "\r\n" pair, and nothing shorter can hold a key).
        if n == 0 || line.last() != Some(&b'\n') || n <= 2 {
            break;
        }

        let bytes = &line[..n - 1];
        let colon = bytes
            .iter()
            .position(|&b| b == b':');
        match colon {
            // The key span runs from the shortest known key ("agi_type") to
            // the longest ("agi_network_script"); a colon outside that window
            // or in final position means the line is not an environment line.
            Some(ind)
                if (ENV_KEY_MIN_LEN..=ENV_KEY_MAX_LEN).contains(&ind)
                    && ind != bytes.len() - 1 =>
            {
                let key = String::from_utf8_lossy(&bytes[ENV_KEY_PREFIX.len()..ind]).into_owned();
                // Skip the ": " delimiter.
                let value = String::from_utf8_lossy(&bytes[ind + 2..]).into_owned();
                vars.insert(key, value);
            }
            _ => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                warn!(line = %text, "aborting environment parse on malformed line");
                return Err(AgiError::MalformedEnv { line: text });
            }
        }
    }

    if vars.len() < min_vars {
        warn!(
            count = vars.len(),
            min = min_vars,
            "environment block ended early"
        );
        return Err(AgiError::IncompleteEnv { count: vars.len() });
    }
    trace!(count = vars.len(), "environment block parsed");
    Ok(vars)
}

/// Read and classify one reply from the peer.
///
/// Reads the status line and dispatches on its leading token. Only the
/// `200` family produces a [`Reply`]; every other shape is returned as the
/// matching [`AgiError`] variant. For the two-line `520-Invalid` variant the
/// trailing usage line is drained so the stream stays framed.
pub(crate) async fn parse_response<R>(reader: &mut R) -> AgiResult<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 || line.last() != Some(&b'\n') {
        return Err(AgiError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed before a full reply line",
        )));
    }
    let text = String::from_utf8_lossy(&line[..n - 1]).into_owned();
    trace!(line = %text, "received reply line");

    // A status line is "<token> <remainder>". No space, a leading space, or
    // a trailing space means the line fits no reply shape; the bare HANGUP
    // notification is the one valid spaceless line.
    let ind = match text.find(' ') {
        Some(ind) if ind > 0 && ind != text.len() - 1 => ind,
        _ => {
            return Err(if text == HANGUP_TOKEN {
                AgiError::Hangup
            } else {
                AgiError::MalformedResponse { line: text }
            });
        }
    };

    match &text[..ind] {
        STATUS_SUCCESS => parse_success_line(text),
        STATUS_INVALID_COMMAND => Err(AgiError::InvalidCommand),
        STATUS_DEAD_CHANNEL => Err(AgiError::DeadChannel),
        STATUS_BAD_SYNTAX => Err(AgiError::InvalidSyntax),
        STATUS_BAD_SYNTAX_USAGE => {
            // The peer follows this status with a usage/documentation line;
            // drain it so the next read starts on a fresh reply.
            let mut usage = Vec::new();
            let _ = reader
                .read_until(b'\n', &mut usage)
                .await;
            Err(AgiError::InvalidSyntax)
        }
        _ => Err(AgiError::MalformedResponse { line: text }),
    }
}

/// Extract the numeric result and optional payload from a `200` line.
///
/// Accepts `200 result=N` and `200 result=N <payload>`; anything else under
/// the `200` prefix is malformed. A non-numeric result token is reported as
/// a conversion failure, distinct from the structural error.
fn parse_success_line(text: String) -> AgiResult<Reply> {
    // The `=` must sit immediately after the literal "200 result" prefix and
    // must not be the final character.
    if text.find('=') == Some(RESULT_KEYWORD_END) && RESULT_KEYWORD_END < text.len() - 1 {
        let rest = &text[RESULT_KEYWORD_END + 1..];
        match rest.find(' ') {
            None => {
                let res = rest
                    .parse::<i32>()
                    .map_err(|source| AgiError::ResultParse { source })?;
                return Ok(Reply::new(res, String::new()));
            }
            Some(sp) if sp > 0 && sp < rest.len() - 1 => {
                let res = rest[..sp]
                    .parse::<i32>()
                    .map_err(|source| AgiError::ResultParse { source })?;
                return Ok(Reply::new(res, rest[sp + 1..].to_string()));
            }
            // A space directly after `=` or in final position leaves no
            // parseable result/payload split.
            Some(_) => {}
        }
    }
    Err(AgiError::Malformed200 { line: text })
}
