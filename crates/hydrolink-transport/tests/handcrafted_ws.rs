//! Integration tests driving [`WireSocket`] against real listeners: a
//! `tokio-tungstenite` server for well-formed traffic, and a scripted raw
//! TCP server for byte sequences a protocol library will not produce
//! (fragmented frames, bogus opcodes, broken handshakes).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use hydrolink_transport::frame::{
    self, OP_CLOSE, OP_CONTINUATION, OP_PING, OP_TEXT, PONG_FRAME, close_payload, encode_frame,
};
use hydrolink_transport::handshake::accept_digest;
use hydrolink_transport::{TransportEvent, WireSocket};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

async fn next_event(events: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

/// Spawns a tungstenite server that echoes text/binary messages back.
async fn start_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() || message.is_binary() {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    format!("ws://{addr}/")
}

/// Accepts one raw TCP connection, answers the upgrade handshake by hand,
/// and writes `tail` in the same packet as the 101 response. Returns the
/// upgraded stream and the request head the client sent.
async fn accept_scripted(listener: &TcpListener, tail: &[u8]) -> (TcpStream, String) {
    let (mut stream, _) = listener.accept().await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let request = String::from_utf8(head).unwrap();

    let key = request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .expect("client sent no Sec-WebSocket-Key");

    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_digest(&key)
    )
    .into_bytes();
    response.extend_from_slice(tail);
    stream.write_all(&response).await.unwrap();

    (stream, request)
}

/// Reads one complete frame off the raw stream, unmasking if needed.
async fn read_frame(stream: &mut TcpStream) -> (frame::FrameHeader, Vec<u8>) {
    let mut buf = Vec::new();
    loop {
        if let Some(header) = frame::parse_header(&buf) {
            let total = header.header_len + header.payload_len;
            if buf.len() >= total {
                let mut payload = buf[header.header_len..total].to_vec();
                if let Some(mask) = header.mask {
                    for (i, byte) in payload.iter_mut().enumerate() {
                        *byte ^= mask[i & 3];
                    }
                }
                return (header, payload);
            }
        }
        let mut chunk = [0u8; 1024];
        let read = stream.read(&mut chunk).await.unwrap();
        assert!(read > 0, "stream ended while waiting for a frame");
        buf.extend_from_slice(&chunk[..read]);
    }
}

fn fragment(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = encode_frame(opcode, payload, false);
    if !fin {
        bytes[0] &= 0x7F;
    }
    bytes
}

// ---------------------------------------------------------------------------
// Well-formed traffic (tungstenite peer)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_handshake_and_text_echo() {
    let url = start_echo_server().await;
    let (socket, mut events) = WireSocket::connect(&url, vec![], false).unwrap();

    assert_eq!(next_event(&mut events).await, TransportEvent::Open);

    socket.send("{\"op\":\"probe\"}").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message {
            text: "{\"op\":\"probe\"}".into(),
            binary: false,
        }
    );
}

#[tokio::test]
async fn test_large_payload_round_trips() {
    let url = start_echo_server().await;
    let (socket, mut events) = WireSocket::connect(&url, vec![], false).unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Open);

    // 70,000 bytes forces the 64-bit length encoding in both directions.
    let big = "x".repeat(70_000);
    socket.send(&big).await.unwrap();

    match next_event(&mut events).await {
        TransportEvent::Message { text, .. } => assert_eq!(text.len(), 70_000),
        other => panic!("expected echoed message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_close_frame_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Close(Some(CloseFrame {
            code: 4000.into(),
            reason: "maintenance".into(),
        })))
        .await
        .unwrap();
    });

    let (_socket, mut events) = WireSocket::connect(&format!("ws://{addr}/"), vec![], false)
        .unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Close {
            code: 4000,
            reason: "maintenance".into(),
        }
    );
}

#[tokio::test]
async fn test_legacy_mode_echo_and_close() {
    let url = start_echo_server().await;
    let (socket, mut events) = WireSocket::connect(&url, vec![], true).unwrap();

    assert_eq!(next_event(&mut events).await, TransportEvent::Open);

    socket.send("legacy hello").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message {
            text: "legacy hello".into(),
            binary: false,
        }
    );

    socket.close(1000, "bye").await.unwrap();
    match next_event(&mut events).await {
        TransportEvent::Close { code, .. } => assert_eq!(code, 1000),
        other => panic!("expected close, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Scripted byte sequences (raw peer)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_headers_sent_and_fragmented_leftover_reassembles() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Fragmented text pushed in the same packet as the 101 response.
    let mut tail = fragment(false, OP_TEXT, b"Hel");
    tail.extend(fragment(false, OP_CONTINUATION, b"lo, "));
    tail.extend(fragment(true, OP_CONTINUATION, b"node"));

    let server = tokio::spawn(async move {
        let (_stream, request) = accept_scripted(&listener, &tail).await;
        request
    });

    let headers = vec![("Authorization".to_string(), "youshallnotpass".to_string())];
    let (_socket, mut events) =
        WireSocket::connect(&format!("ws://{addr}/v4/websocket"), headers, false).unwrap();

    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message {
            text: "Hello, node".into(),
            binary: false,
        }
    );

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v4/websocket HTTP/1.1\r\n"));
    assert!(request.contains("Authorization: youshallnotpass\r\n"));
}

#[tokio::test]
async fn test_ping_answered_with_unmasked_pong() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_scripted(&listener, &[]).await;
        stream
            .write_all(&encode_frame(OP_PING, b"", false))
            .await
            .unwrap();
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await.unwrap();
        reply
    });

    let (_socket, mut events) =
        WireSocket::connect(&format!("ws://{addr}/"), vec![], false).unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Open);

    assert_eq!(server.await.unwrap(), PONG_FRAME);
}

#[tokio::test]
async fn test_unknown_opcode_sends_1002_and_tears_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_scripted(&listener, &[]).await;
        stream
            .write_all(&fragment(true, 0x3, b"junk"))
            .await
            .unwrap();
        read_frame(&mut stream).await
    });

    let (_socket, mut events) =
        WireSocket::connect(&format!("ws://{addr}/"), vec![], false).unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Close {
            code: 1006,
            reason: "invalid opcode".into(),
        }
    );

    // The peer was told why before the connection dropped.
    let (header, payload) = server.await.unwrap();
    assert_eq!(header.opcode, OP_CLOSE);
    assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1002);
    assert_eq!(&payload[2..], b"invalid opcode");
}

#[tokio::test]
async fn test_client_close_is_a_proper_close_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_scripted(&listener, &[]).await;
        let (header, payload) = read_frame(&mut stream).await;
        // Echo the close back, as a well-behaved peer would.
        stream
            .write_all(&encode_frame(OP_CLOSE, &payload, false))
            .await
            .unwrap();
        (header, payload)
    });

    let (socket, mut events) =
        WireSocket::connect(&format!("ws://{addr}/"), vec![], false).unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Open);

    socket.close(4001, "done here").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Close {
            code: 4001,
            reason: "done here".into(),
        }
    );

    let (header, payload) = server.await.unwrap();
    assert_eq!(header.opcode, OP_CLOSE);
    assert_eq!(payload, close_payload(4001, "done here"));
}

#[tokio::test]
async fn test_bad_accept_digest_never_opens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut sink = [0u8; 1024];
        let _ = stream.read(&mut sink).await;
        stream
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\n\
                  Upgrade: websocket\r\n\
                  Connection: Upgrade\r\n\
                  Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBkaWdlc3Q=\r\n\r\n",
            )
            .await
            .unwrap();
    });

    let (_socket, mut events) =
        WireSocket::connect(&format!("ws://{addr}/"), vec![], false).unwrap();

    match next_event(&mut events).await {
        TransportEvent::Error { message } => {
            assert!(message.contains("Sec-WebSocket-Accept"));
        }
        other => panic!("expected error event, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Close { .. }
    ));
}

#[tokio::test]
async fn test_dial_failure_reports_internal_error() {
    // Grab a port, then free it so nobody is listening there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (_socket, mut events) =
        WireSocket::connect(&format!("ws://{addr}/"), vec![], false).unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Error { .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Close {
            code: 1011,
            reason: "Internal Error".into(),
        }
    );
}

#[tokio::test]
async fn test_send_after_teardown_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = accept_scripted(&listener, &[]).await;
        drop(stream);
    });

    let (socket, mut events) =
        WireSocket::connect(&format!("ws://{addr}/"), vec![], false).unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Close { code: 1006, .. }
    ));

    let err = socket.send("too late").await.unwrap_err();
    assert!(matches!(
        err,
        hydrolink_transport::TransportError::ConnectionClosed
    ));
}
