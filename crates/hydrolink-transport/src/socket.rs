//! The socket: dial, handshake, reader task, and the send/close surface.
//!
//! [`WireSocket::connect`] returns a handle immediately and reports
//! progress on an event channel: at most one [`TransportEvent::Open`],
//! then messages and pongs, then exactly one terminal
//! [`TransportEvent::Close`]. Failures never panic the owner — a dial or
//! handshake problem becomes an `Error` event followed by the terminal
//! `Close`, so the layer above drives its retry logic from one signal.
//!
//! Legacy mode skips the handcrafted frame engine entirely and delegates
//! to `tokio-tungstenite`, keeping the same event contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::frame::{self, FrameAssembler, FrameEvent, OP_CLOSE, OP_TEXT, PONG_FRAME};
use crate::handshake;

/// Counter for socket ids in log output.
static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// What a socket reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed; the socket is writable.
    Open,
    /// A complete data message. Binary payloads are delivered as
    /// (lossily) decoded text — every supported backend speaks JSON text,
    /// and the flag is kept for diagnostics.
    Message { text: String, binary: bool },
    /// The peer answered a ping.
    Pong,
    /// Something went wrong. Always followed by `Close`.
    Error { message: String },
    /// Terminal. Emitted exactly once per connection.
    Close { code: u16, reason: String },
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type LegacySink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<TcpStream>>,
    tungstenite::Message,
>;

enum Writer {
    Raw(BoxedWriter),
    Legacy(LegacySink),
}

type SharedWriter = Arc<Mutex<Option<Writer>>>;

/// Handle to one WebSocket connection.
///
/// Cheap to clone; dropping a handle does not close the connection (the
/// reader task owns that).
#[derive(Clone)]
pub struct WireSocket {
    id: u64,
    writer: SharedWriter,
}

impl WireSocket {
    /// Opens a connection to `url` (`ws://` or `wss://`).
    ///
    /// Returns as soon as the connection task is spawned. Only a
    /// malformed URL fails synchronously; everything after that —
    /// including "nobody is listening" — arrives on the event channel.
    pub fn connect(
        url: &str,
        headers: Vec<(String, String)>,
        legacy: bool,
    ) -> Result<(Self, UnboundedReceiver<TransportEvent>), TransportError> {
        let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        let (events, receiver) = mpsc::unbounded_channel();
        let writer: SharedWriter = Arc::new(Mutex::new(None));
        let socket = Self {
            id,
            writer: Arc::clone(&writer),
        };

        if legacy {
            tracing::debug!(id, url, "opening websocket (legacy mode)");
            let url = url.to_string();
            tokio::spawn(run_legacy(id, url, headers, writer, events));
        } else {
            tracing::debug!(id, url, "opening websocket");
            let target = WsUrl::parse(url)?;
            tokio::spawn(run_handcrafted(id, target, headers, writer, events));
        }
        Ok((socket, receiver))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sends a text message. Data frames are always masked.
    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        let mut slot = self.writer.lock().await;
        match slot.as_mut() {
            Some(Writer::Raw(stream)) => {
                let frame = frame::encode_frame(OP_TEXT, text.as_bytes(), true);
                stream
                    .write_all(&frame)
                    .await
                    .map_err(|err| TransportError::SendFailed(err.to_string()))
            }
            Some(Writer::Legacy(sink)) => sink
                .send(tungstenite::Message::text(text))
                .await
                .map_err(|err| TransportError::SendFailed(err.to_string())),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    /// Sends a close frame with the given code and reason.
    ///
    /// The handcrafted path writes the frame and waits for the peer to
    /// drop the connection — the terminal `Close` event follows from
    /// that, not from this call.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        let mut slot = self.writer.lock().await;
        match slot.as_mut() {
            Some(Writer::Raw(stream)) => {
                let payload = frame::close_payload(code, reason);
                let frame = frame::encode_frame(OP_CLOSE, &payload, false);
                stream
                    .write_all(&frame)
                    .await
                    .map_err(|err| TransportError::SendFailed(err.to_string()))
            }
            Some(Writer::Legacy(sink)) => {
                // Codes reserved by the RFC (1005/1006/1015) cannot go on
                // the wire through the platform socket.
                let code = if matches!(code, 1005 | 1006 | 1015) { 1000 } else { code };
                sink.send(tungstenite::Message::Close(Some(tungstenite::protocol::CloseFrame {
                    code: code.into(),
                    reason: reason.to_string().into(),
                })))
                .await
                .map_err(|err| TransportError::SendFailed(err.to_string()))
            }
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

// ---------------------------------------------------------------------------
// Handcrafted path
// ---------------------------------------------------------------------------

async fn run_handcrafted(
    id: u64,
    target: WsUrl,
    headers: Vec<(String, String)>,
    writer: SharedWriter,
    events: UnboundedSender<TransportEvent>,
) {
    match establish(&target, &headers, &writer).await {
        Ok((reader, leftover)) => {
            tracing::debug!(id, "websocket open");
            let _ = events.send(TransportEvent::Open);
            read_loop(id, reader, leftover, writer, events).await;
        }
        Err(failure) => {
            tracing::debug!(id, message = %failure.message, "websocket setup failed");
            let _ = events.send(TransportEvent::Error {
                message: failure.message,
            });
            let _ = events.send(TransportEvent::Close {
                code: failure.close_code,
                reason: failure.close_reason,
            });
        }
    }
}

struct SetupFailure {
    message: String,
    close_code: u16,
    close_reason: String,
}

impl SetupFailure {
    /// Dial and I/O problems: the connection never existed.
    fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            close_code: 1011,
            close_reason: "Internal Error".into(),
        }
    }

    /// The server answered, but not with a valid upgrade.
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            close_code: 1006,
            close_reason: "socket closed suddenly".into(),
        }
    }
}

/// Dials, performs the upgrade handshake, and verifies the accept digest.
/// On success the write half is parked in `writer` and the read half is
/// returned together with any frame bytes that trailed the response head.
async fn establish(
    target: &WsUrl,
    headers: &[(String, String)],
    writer: &SharedWriter,
) -> Result<(BoxedReader, BytesMut), SetupFailure> {
    let (mut reader, mut write_half) = dial(target).await?;

    let key = handshake::generate_key();
    let request =
        handshake::upgrade_request(&target.host_header(), &target.resource, &key, headers);
    write_half
        .write_all(request.as_bytes())
        .await
        .map_err(|err| SetupFailure::internal(format!("handshake write failed: {err}")))?;

    // Accumulate until the full response head has arrived.
    let mut buf = BytesMut::with_capacity(4096);
    let (head, head_len) = loop {
        match handshake::parse_response_head(&buf) {
            Some(Ok(parsed)) => break parsed,
            Some(Err(err)) => return Err(SetupFailure::internal(err.to_string())),
            None => match reader.read_buf(&mut buf).await {
                Ok(0) => {
                    return Err(SetupFailure::internal(
                        "connection closed during handshake",
                    ));
                }
                Ok(_) => {}
                Err(err) => {
                    return Err(SetupFailure::internal(format!(
                        "handshake read failed: {err}"
                    )));
                }
            },
        }
    };

    if head.status != 101 {
        return Err(SetupFailure::rejected(format!(
            "server refused upgrade with status {}",
            head.status
        )));
    }
    let upgraded = head
        .header("upgrade")
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
    if !upgraded {
        return Err(SetupFailure::rejected("missing Upgrade: websocket header"));
    }
    let expected = handshake::accept_digest(&key);
    if head.header("sec-websocket-accept") != Some(expected.as_str()) {
        return Err(SetupFailure::rejected("Sec-WebSocket-Accept mismatch"));
    }

    // Bytes past the head are the start of the frame stream.
    buf.advance(head_len);

    *writer.lock().await = Some(Writer::Raw(write_half));
    Ok((reader, buf))
}

async fn dial(target: &WsUrl) -> Result<(BoxedReader, BoxedWriter), SetupFailure> {
    let tcp = TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|err| SetupFailure::internal(format!("connect failed: {err}")))?;
    let _ = tcp.set_nodelay(true);

    if !target.secure {
        let (read_half, write_half) = tcp.into_split();
        return Ok((Box::new(read_half), Box::new(write_half)));
    }

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = rustls::pki_types::ServerName::try_from(target.host.clone())
        .map_err(|_| SetupFailure::internal(format!("invalid tls host: {}", target.host)))?;

    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|err| SetupFailure::internal(format!("tls handshake failed: {err}")))?;
    let (read_half, write_half) = tokio::io::split(tls);
    Ok((Box::new(read_half), Box::new(write_half)))
}

async fn read_loop(
    id: u64,
    mut reader: BoxedReader,
    mut buf: BytesMut,
    writer: SharedWriter,
    events: UnboundedSender<TransportEvent>,
) {
    let mut assembler = FrameAssembler::new();
    loop {
        for event in assembler.drain(&mut buf) {
            match event {
                FrameEvent::Message { payload, text } => {
                    let message = String::from_utf8_lossy(&payload).into_owned();
                    let _ = events.send(TransportEvent::Message {
                        text: message,
                        binary: !text,
                    });
                }
                FrameEvent::Ping => {
                    if let Some(Writer::Raw(stream)) = writer.lock().await.as_mut() {
                        let _ = stream.write_all(&PONG_FRAME).await;
                    }
                }
                FrameEvent::Pong => {
                    let _ = events.send(TransportEvent::Pong);
                }
                FrameEvent::Close { code, reason } => {
                    tracing::debug!(id, code, %reason, "websocket closed by peer");
                    teardown(&writer).await;
                    let _ = events.send(TransportEvent::Close { code, reason });
                    return;
                }
                FrameEvent::Violation(detail) => {
                    tracing::debug!(id, detail, "websocket protocol violation");
                    // Tell the peer why, then drop the connection.
                    if let Some(Writer::Raw(stream)) = writer.lock().await.as_mut() {
                        let payload = frame::close_payload(1002, detail);
                        let close = frame::encode_frame(OP_CLOSE, &payload, false);
                        let _ = stream.write_all(&close).await;
                    }
                    teardown(&writer).await;
                    let _ = events.send(TransportEvent::Close {
                        code: 1006,
                        reason: detail.to_string(),
                    });
                    return;
                }
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                tracing::debug!(id, "websocket stream ended");
                teardown(&writer).await;
                let _ = events.send(TransportEvent::Close {
                    code: 1006,
                    reason: "socket closed suddenly".into(),
                });
                return;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(id, error = %err, "websocket read error");
                teardown(&writer).await;
                let _ = events.send(TransportEvent::Error {
                    message: err.to_string(),
                });
                let _ = events.send(TransportEvent::Close {
                    code: 1006,
                    reason: "socket error".into(),
                });
                return;
            }
        }
    }
}

async fn teardown(writer: &SharedWriter) {
    if let Some(Writer::Legacy(mut sink)) = writer.lock().await.take() {
        let _ = sink.close().await;
    }
    // A raw write half just drops; TCP teardown follows.
}

// ---------------------------------------------------------------------------
// Legacy path
// ---------------------------------------------------------------------------

async fn run_legacy(
    id: u64,
    url: String,
    headers: Vec<(String, String)>,
    writer: SharedWriter,
    events: UnboundedSender<TransportEvent>,
) {
    let request = match legacy_request(&url, &headers) {
        Ok(request) => request,
        Err(err) => {
            let _ = events.send(TransportEvent::Error {
                message: err.to_string(),
            });
            let _ = events.send(TransportEvent::Close {
                code: 1011,
                reason: "Internal Error".into(),
            });
            return;
        }
    };

    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            tracing::debug!(id, error = %err, "legacy websocket connect failed");
            let _ = events.send(TransportEvent::Error {
                message: err.to_string(),
            });
            let _ = events.send(TransportEvent::Close {
                code: 1011,
                reason: "Internal Error".into(),
            });
            return;
        }
    };

    let (sink, mut source) = stream.split();
    *writer.lock().await = Some(Writer::Legacy(sink));
    tracing::debug!(id, "websocket open (legacy mode)");
    let _ = events.send(TransportEvent::Open);

    while let Some(next) = source.next().await {
        match next {
            Ok(tungstenite::Message::Text(text)) => {
                let _ = events.send(TransportEvent::Message {
                    text: text.to_string(),
                    binary: false,
                });
            }
            Ok(tungstenite::Message::Binary(data)) => {
                let _ = events.send(TransportEvent::Message {
                    text: String::from_utf8_lossy(&data).into_owned(),
                    binary: true,
                });
            }
            Ok(tungstenite::Message::Pong(_)) => {
                let _ = events.send(TransportEvent::Pong);
            }
            Ok(tungstenite::Message::Close(frame)) => {
                let (code, reason) = match frame {
                    Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                    None => (1005, String::new()),
                };
                tracing::debug!(id, code, %reason, "legacy websocket closed by peer");
                teardown(&writer).await;
                let _ = events.send(TransportEvent::Close { code, reason });
                return;
            }
            // Pings are answered by the platform socket itself.
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(id, error = %err, "legacy websocket error");
                teardown(&writer).await;
                let _ = events.send(TransportEvent::Error {
                    message: err.to_string(),
                });
                let _ = events.send(TransportEvent::Close {
                    code: 1006,
                    reason: "socket error".into(),
                });
                return;
            }
        }
    }

    teardown(&writer).await;
    let _ = events.send(TransportEvent::Close {
        code: 1006,
        reason: "socket closed suddenly".into(),
    });
}

fn legacy_request(
    url: &str,
    headers: &[(String, String)],
) -> Result<tungstenite::handshake::client::Request, TransportError> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};

    let mut request = url
        .into_client_request()
        .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
    let map = request.headers_mut();
    for (name, value) in headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| TransportError::InvalidUrl(format!("bad header {name}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| TransportError::InvalidUrl(format!("bad value for {name}: {err}")))?;
        map.insert(header, value);
    }
    Ok(request)
}

// ---------------------------------------------------------------------------
// URL parsing
// ---------------------------------------------------------------------------

/// The pieces of a `ws://` / `wss://` endpoint we dial by hand.
#[derive(Debug, PartialEq, Eq)]
struct WsUrl {
    secure: bool,
    host: String,
    port: u16,
    /// Path plus query, always starting with `/`.
    resource: String,
}

impl WsUrl {
    fn parse(url: &str) -> Result<Self, TransportError> {
        let (secure, rest) = if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else {
            return Err(TransportError::InvalidUrl(format!(
                "expected ws:// or wss:// scheme in {url:?}"
            )));
        };

        let (authority, resource) = match rest.find('/') {
            Some(at) => (&rest[..at], rest[at..].to_string()),
            None => (rest, "/".to_string()),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    TransportError::InvalidUrl(format!("invalid port in {url:?}"))
                })?;
                (host.to_string(), port)
            }
            None => (authority.to_string(), if secure { 443 } else { 80 }),
        };
        if host.is_empty() {
            return Err(TransportError::InvalidUrl(format!("missing host in {url:?}")));
        }

        Ok(Self {
            secure,
            host,
            port,
            resource,
        })
    }

    /// Value for the `Host` header; default ports are omitted.
    fn host_header(&self) -> String {
        match (self.secure, self.port) {
            (true, 443) | (false, 80) => self.host.clone(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
