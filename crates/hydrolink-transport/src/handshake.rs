//! HTTP/1.1 upgrade handshake for the handcrafted client.
//!
//! The client sends a GET with `Upgrade: websocket` and a random
//! `Sec-WebSocket-Key`, then verifies the server's `Sec-WebSocket-Accept`
//! echo. Any bytes following the response head belong to the frame stream
//! and must be preserved, not discarded — some servers start pushing
//! frames in the same packet as the 101 response.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use sha1::{Digest, Sha1};

use crate::error::TransportError;

/// Fixed GUID appended to the key before hashing (RFC 6455 §1.3).
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Generates a `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
pub fn generate_key() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    BASE64.encode(bytes)
}

/// Computes the `Sec-WebSocket-Accept` value the server must echo for a
/// given key: `base64(SHA1(key + GUID))`.
pub fn accept_digest(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Builds the upgrade request. Caller headers (authorization, client
/// identity, ...) are appended after the fixed upgrade headers.
pub fn upgrade_request(
    host: &str,
    resource: &str,
    key: &str,
    headers: &[(String, String)],
) -> String {
    let mut request = format!(
        "GET {resource} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n"
    );
    for (name, value) in headers {
        request.push_str(name);
        request.push_str(": ");
        request.push_str(value);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

/// A parsed HTTP response head.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: u16,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Tries to parse a response head from the start of `buf`.
///
/// Returns `None` until the terminating blank line has arrived. On
/// success, yields the head and its length in bytes — everything after
/// that offset is frame-stream data.
pub fn parse_response_head(
    buf: &[u8],
) -> Option<Result<(ResponseHead, usize), TransportError>> {
    let head_len = buf
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|at| at + 4)?;

    let text = String::from_utf8_lossy(&buf[..head_len]);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let status = match status_line.split_whitespace().nth(1).and_then(|code| code.parse().ok()) {
        Some(status) => status,
        None => {
            return Some(Err(TransportError::Handshake(format!(
                "malformed status line: {status_line:?}"
            ))));
        }
    };

    let headers = lines
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    Some(Ok((ResponseHead { status, headers }, head_len)))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_digest_matches_rfc_example() {
        // The worked example from RFC 6455 §1.3.
        assert_eq!(
            accept_digest("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_generate_key_is_16_bytes_of_base64() {
        let key = generate_key();
        let decoded = BASE64.decode(&key).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn test_upgrade_request_carries_fixed_and_custom_headers() {
        let request = upgrade_request(
            "node.example:2333",
            "/v4/websocket",
            "c2FtcGxlLWtleS1ieXRlcw==",
            &[
                ("Authorization".into(), "youshallnotpass".into()),
                ("User-Id".into(), "1234".into()),
            ],
        );

        assert!(request.starts_with("GET /v4/websocket HTTP/1.1\r\n"));
        assert!(request.contains("Host: node.example:2333\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: c2FtcGxlLWtleS1ieXRlcw==\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.contains("Authorization: youshallnotpass\r\n"));
        assert!(request.contains("User-Id: 1234\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_parse_response_head_waits_for_blank_line() {
        let partial = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n";
        assert!(parse_response_head(partial).is_none());
    }

    #[test]
    fn test_parse_response_head_splits_leftover_bytes() {
        let mut bytes =
            b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: x\r\n\r\n"
                .to_vec();
        let head_len = bytes.len();
        bytes.extend_from_slice(&[0x81, 0x02, b'{', b'}']); // first frame

        let (head, parsed_len) = parse_response_head(&bytes).unwrap().unwrap();
        assert_eq!(parsed_len, head_len);
        assert_eq!(head.status, 101);
        assert_eq!(head.header("upgrade"), Some("websocket"));
        assert_eq!(head.header("SEC-WEBSOCKET-ACCEPT"), Some("x"));
        assert_eq!(&bytes[parsed_len..], &[0x81, 0x02, b'{', b'}']);
    }

    #[test]
    fn test_parse_response_head_rejects_garbage_status() {
        let bytes = b"NOT-HTTP\r\n\r\n";
        let err = parse_response_head(bytes).unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Handshake(_)));
    }
}
