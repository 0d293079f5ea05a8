//! Integration tests against a scripted in-memory peer.
//!
//! Each test runs a full session over a duplex pipe: the peer task plays the
//! Asterisk side (environment handshake, then replies per command), and the
//! assertions check both what reached the wire and what the session returned.

use asterisk_agi_tokio::{AgiError, AgiSession, AgiSessionOptions, EnvKey};
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
    WriteHalf};

const ENV_BLOCK: &str = "agi_network: yes\n\
    agi_network_script: playback?file=welcome\n\
    agi_request: agi://127.0.0.1/playback?file=welcome\n\
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
    agi_arg_1: argument1\n\
    agi_arg_2: argument 2\n\
    \n";

struct Peer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Peer {
    async fn expect(&mut self, wanted: &str) {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .await
            .unwrap();
        assert_eq!(line, wanted);
    }

    async fn send(&mut self, raw: &str) {
        self.writer
            .write_all(raw.as_bytes())
            .await
            .unwrap();
    }
}

/// Open a session whose peer has already completed the handshake.
async fn connect() -> (
    AgiSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>,
    Peer,
) {
    let (ours, theirs) = duplex(16 * 1024);
    let (our_read, our_write) = split(ours);
    let (peer_read, peer_write) = split(theirs);
    let mut peer = Peer {
        reader: BufReader::new(peer_read),
        writer: peer_write,
    };

    peer.send(ENV_BLOCK)
        .await;
    let session = AgiSession::start(our_read, our_write)
        .await
        .expect("handshake should succeed");
    (session, peer)
}

#[tokio::test]
async fn handshake_exposes_environment() {
    let (session, _peer) = connect().await;
    let env = session.env();

    assert_eq!(env.len(), 24);
    assert_eq!(env.var(EnvKey::Channel), Some("SIP/1234-00000000"));
    assert_eq!(
        env.var(EnvKey::Request),
        Some("agi://127.0.0.1/playback?file=welcome")
    );
    assert_eq!(env.var(EnvKey::CallerId), Some("1001"));
    assert_eq!(env.args(), vec!["argument1", "argument 2"]);
}

#[tokio::test]
async fn playback_call_flow() {
    let (mut session, mut peer) = connect().await;

    let peer_task = tokio::spawn(async move {
        peer.expect("CHANNEL STATUS\n")
            .await;
        peer.send("200 result=4\n")
            .await;

        peer.expect("ANSWER\n")
            .await;
        peer.send("200 result=0\n")
            .await;

        peer.expect("STREAM FILE welcome \"any\"\n")
            .await;
        peer.send("200 result=0 endpos=15080\n")
            .await;

        peer.expect("HANGUP\n")
            .await;
        peer.send("200 result=1\n")
            .await;
    });

    let status = session
        .channel_status(None)
        .await
        .unwrap();
    assert_eq!(status.result(), 4);

    let answered = session
        .answer()
        .await
        .unwrap();
    assert_eq!(answered.result(), 0);

    let played = session
        .stream_file("welcome", "any", None)
        .await
        .unwrap();
    assert_eq!(played.result(), 0);
    assert_eq!(played.data(), "15080");

    let hung_up = session
        .hangup(None)
        .await
        .unwrap();
    assert_eq!(hung_up.result(), 1);

    peer_task
        .await
        .unwrap();
}

#[tokio::test]
async fn rejections_do_not_break_framing() {
    let (mut session, mut peer) = connect().await;

    let peer_task = tokio::spawn(async move {
        peer.expect("SNARF\n")
            .await;
        peer.send("510 Invalid or unknown command\n")
            .await;

        peer.expect("ANSWER bogus extra args\n")
            .await;
        peer.send(
            "520-Invalid command syntax.  Proper usage follows:\n\
             Answers channel if not already in answer state.\n",
        )
        .await;

        peer.expect("ANSWER\n")
            .await;
        peer.send("200 result=0\n")
            .await;

        peer.expect("SET CONTEXT closed\n")
            .await;
        peer.send("511 Command Not Permitted on a dead channel\n")
            .await;
    });

    let err = session
        .raw_command("SNARF")
        .await
        .unwrap_err();
    assert!(matches!(err, AgiError::InvalidCommand));
    assert!(err.is_rejection());

    // Two-line syntax error: the usage line must be consumed with it.
    let err = session
        .raw_command("ANSWER bogus extra args")
        .await
        .unwrap_err();
    assert!(matches!(err, AgiError::InvalidSyntax));

    // Framing intact: the next command pairs with the next reply.
    let reply = session
        .answer()
        .await
        .unwrap();
    assert_eq!(reply.result(), 0);

    let err = session
        .set_context("closed")
        .await
        .unwrap_err();
    assert!(matches!(err, AgiError::DeadChannel));

    peer_task
        .await
        .unwrap();
}

#[tokio::test]
async fn hangup_in_place_of_reply() {
    let (mut session, mut peer) = connect().await;

    let peer_task = tokio::spawn(async move {
        peer.expect("WAIT FOR DIGIT -1\n")
            .await;
        // The caller hung up while we were waiting.
        peer.send("HANGUP\n")
            .await;
    });

    let err = session
        .wait_for_digit(-1)
        .await
        .unwrap_err();
    assert!(matches!(err, AgiError::Hangup));
    assert!(err.is_hangup());

    peer_task
        .await
        .unwrap();
}

#[tokio::test]
async fn unsolicited_hangup_before_send() {
    let (mut session, mut peer) = connect().await;

    // The notice lands before the application issues its next command.
    peer.send("HANGUP\n")
        .await;
    // Make sure the bytes are buffered on the session side before sending.
    tokio::task::yield_now().await;

    let err = session
        .answer()
        .await
        .unwrap_err();
    assert!(matches!(err, AgiError::Hangup));
}

#[tokio::test]
async fn sanitized_arguments_reach_the_wire_on_one_line() {
    let (mut session, mut peer) = connect().await;

    let peer_task = tokio::spawn(async move {
        peer.expect("SET VARIABLE \"notes\" \"line one line two\"\n")
            .await;
        peer.send("200 result=1\n")
            .await;
    });

    let reply = session
        .set_variable("notes", "line one\nline two")
        .await
        .unwrap();
    assert_eq!(reply.result(), 1);

    peer_task
        .await
        .unwrap();
}

#[tokio::test]
async fn stricter_threshold_rejects_old_peer() {
    let (ours, theirs) = duplex(16 * 1024);
    let (our_read, our_write) = split(ours);
    let (_peer_read, mut peer_write) = split(theirs);

    peer_write
        .write_all(ENV_BLOCK.as_bytes())
        .await
        .unwrap();

    // 24 vars on the wire; a deployment requiring 25 treats that as truncated.
    let err = AgiSession::start_with_options(
        our_read,
        our_write,
        AgiSessionOptions { min_env_vars: 25 },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AgiError::IncompleteEnv { count: 24 }));
}
