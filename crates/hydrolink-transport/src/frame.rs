//! WebSocket frame grammar (RFC 6455).
//!
//! Everything in this module is pure byte manipulation: no sockets, no
//! tasks. The socket layer feeds received bytes into a [`FrameAssembler`]
//! and acts on the [`FrameEvent`]s it produces. Outbound frames are built
//! with [`encode_frame`].
//!
//! Frame layout: byte 0 carries FIN (bit 7) and the opcode (low 4 bits);
//! byte 1 carries the MASK bit and a 7-bit length, extended to a 16-bit
//! (length code 126) or 64-bit (length code 127) big-endian field. A set
//! MASK bit is followed by a 4-byte key, applied to the payload via XOR
//! with the byte index modulo 4.

use bytes::BytesMut;
use rand::Rng;

pub const OP_CONTINUATION: u8 = 0x0;
pub const OP_TEXT: u8 = 0x1;
pub const OP_BINARY: u8 = 0x2;
pub const OP_CLOSE: u8 = 0x8;
pub const OP_PING: u8 = 0x9;
pub const OP_PONG: u8 = 0xA;

/// Fixed reply to any ping: an unmasked, empty pong frame.
pub const PONG_FRAME: [u8; 2] = [0x8A, 0x00];

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// A parsed frame header. `header_len` is the number of bytes the header
/// occupies, so the payload spans `header_len..header_len + payload_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: u8,
    pub mask: Option<[u8; 4]>,
    pub payload_len: usize,
    pub header_len: usize,
}

/// Parses a frame header from the start of `buf`.
///
/// Returns `None` while the buffer does not yet hold the complete header;
/// the caller reads more bytes and retries. Never reads past the header.
pub fn parse_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < 2 {
        return None;
    }
    let fin = buf[0] & 0x80 != 0;
    let opcode = buf[0] & 0x0F;
    let masked = buf[1] & 0x80 != 0;

    let mut offset = 2;
    let payload_len = match buf[1] & 0x7F {
        126 => {
            if buf.len() < offset + 2 {
                return None;
            }
            offset += 2;
            u16::from_be_bytes([buf[2], buf[3]]) as usize
        }
        127 => {
            if buf.len() < offset + 8 {
                return None;
            }
            let mut wide = [0u8; 8];
            wide.copy_from_slice(&buf[2..10]);
            offset += 8;
            u64::from_be_bytes(wide) as usize
        }
        short => short as usize,
    };

    let mask = if masked {
        if buf.len() < offset + 4 {
            return None;
        }
        let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += 4;
        Some(key)
    } else {
        None
    };

    Some(FrameHeader {
        fin,
        opcode,
        mask,
        payload_len,
        header_len: offset,
    })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Builds a single FIN frame with the given opcode and payload.
///
/// When `masked`, a non-zero random 4-byte key is generated (resampled if
/// the draw happens to be all-zero) and XORed over the payload. Data
/// frames on the client-to-server direction must be masked; this client
/// sends its control frames unmasked.
pub fn encode_frame(opcode: u8, payload: &[u8], masked: bool) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 14);
    frame.push(0x80 | opcode);

    let mask_bit = if masked { 0x80 } else { 0x00 };
    if len >= 65536 {
        frame.push(mask_bit | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    } else if len > 125 {
        frame.push(mask_bit | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | len as u8);
    }

    if masked {
        let key = mask_key();
        frame.extend_from_slice(&key);
        frame.extend(payload.iter().enumerate().map(|(i, byte)| byte ^ key[i & 3]));
    } else {
        frame.extend_from_slice(payload);
    }
    frame
}

/// Builds the payload of a close frame: status code, then UTF-8 reason.
pub fn close_payload(code: u16, reason: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    payload
}

fn mask_key() -> [u8; 4] {
    let mut rng = rand::rng();
    let mut key: [u8; 4] = rng.random();
    while key == [0u8; 4] {
        key = rng.random();
    }
    key
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// What a drained frame means to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete data message (single frame or reassembled fragments).
    /// `text` reflects the opcode of the message's first frame.
    Message { payload: Vec<u8>, text: bool },
    /// The peer pinged us; the socket layer replies with [`PONG_FRAME`].
    Ping,
    /// The peer answered a ping.
    Pong,
    /// The peer sent a close frame. A zero-length payload maps to code
    /// 1006 with an empty reason.
    Close { code: u16, reason: String },
    /// The peer violated the framing rules. The socket layer sends a
    /// close frame with code 1002 and tears the connection down.
    Violation(&'static str),
}

/// Incremental frame parser with continuation state.
///
/// At most one fragmented message can be in flight. Its opcode is
/// remembered from the first fragment; a new text/binary frame arriving
/// while a fragmented message of the *other* type is unfinished is a
/// protocol violation. Control frames may interleave with fragments.
#[derive(Default)]
pub struct FrameAssembler {
    fragment_opcode: Option<u8>,
    fragments: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes every complete frame at the front of `buf` and returns
    /// the events they produce, leaving any trailing partial frame in
    /// place. Stops early after a close or violation; the connection is
    /// coming down, so any bytes after that frame are not interpreted.
    pub fn drain(&mut self, buf: &mut BytesMut) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        loop {
            let Some(header) = parse_header(buf) else { break };
            let total = header.header_len + header.payload_len;
            if buf.len() < total {
                break;
            }

            let frame = buf.split_to(total);
            let mut payload = frame[header.header_len..].to_vec();
            if let Some(key) = header.mask {
                for (i, byte) in payload.iter_mut().enumerate() {
                    *byte ^= key[i & 3];
                }
            }

            if let Some(event) = self.step(header.fin, header.opcode, payload) {
                let terminal =
                    matches!(event, FrameEvent::Close { .. } | FrameEvent::Violation(_));
                events.push(event);
                if terminal {
                    break;
                }
            }
        }
        events
    }

    fn step(&mut self, fin: bool, opcode: u8, payload: Vec<u8>) -> Option<FrameEvent> {
        match opcode {
            OP_CONTINUATION => {
                self.fragments.extend_from_slice(&payload);
                if fin {
                    let text = self.fragment_opcode == Some(OP_TEXT);
                    let payload = std::mem::take(&mut self.fragments);
                    self.fragment_opcode = None;
                    Some(FrameEvent::Message { payload, text })
                } else {
                    None
                }
            }
            OP_TEXT | OP_BINARY => {
                if self.fragment_opcode.is_some_and(|active| active != opcode) {
                    return Some(FrameEvent::Violation("invalid continuation frame"));
                }
                if fin {
                    Some(FrameEvent::Message {
                        payload,
                        text: opcode == OP_TEXT,
                    })
                } else {
                    self.fragment_opcode = Some(opcode);
                    self.fragments.extend_from_slice(&payload);
                    None
                }
            }
            OP_CLOSE => {
                if payload.len() < 2 {
                    Some(FrameEvent::Close {
                        code: 1006,
                        reason: String::new(),
                    })
                } else {
                    let code = u16::from_be_bytes([payload[0], payload[1]]);
                    let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
                    Some(FrameEvent::Close { code, reason })
                }
            }
            OP_PING => Some(FrameEvent::Ping),
            OP_PONG => Some(FrameEvent::Pong),
            _ => Some(FrameEvent::Violation("invalid opcode")),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
