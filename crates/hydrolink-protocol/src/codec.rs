//! Binary track blob codec.
//!
//! Audio backends hand out tracks as opaque base64 blobs. The blob is a
//! big-endian binary record: a 4-byte header word, a format version byte,
//! then the track metadata as length-prefixed strings and fixed-width
//! integers. Decoding locally saves a round-trip to the backend's
//! `/decodetrack` endpoint.
//!
//! Two layout families exist:
//!
//! - [`BlobLayout::Versioned`] — the Lavalink family. Version 1 blobs stop
//!   after the stream flag and source name; version 2 and later carry an
//!   extended header (uri, flagged artwork URL, flagged ISRC).
//! - [`BlobLayout::Extended`] — FrequenC. The version byte is consumed but
//!   the extended header is always present regardless of its value.
//!
//! Decoding is pure and synchronous. Any failure (bad base64, truncated
//! buffer, malformed string) yields a [`ProtocolError`], never a partial
//! track.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;

use crate::error::ProtocolError;
use crate::types::{Track, TrackInfo};

/// Which binary layout a blob uses. Selected per dialect, not per blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobLayout {
    /// Lavalink family: the version byte decides whether the extended
    /// header is present (version >= 2).
    Versioned,
    /// FrequenC: the extended header is always present.
    Extended,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes a base64 track blob into a [`Track`].
///
/// The original base64 text is retained verbatim in `Track::encoded`; the
/// codec never re-encodes. The 4-byte header word is consumed but treated
/// as opaque — the backend wrote it, the backend validates it.
///
/// Two fields are not stored in the blob and take fixed values:
/// `is_seekable` is always `true` for blobs of this family, and
/// `position_ms` is always `0`.
pub fn decode_track(encoded: &str, layout: BlobLayout) -> Result<Track, ProtocolError> {
    let bytes = BASE64.decode(encoded)?;
    let mut reader = BlobReader::new(&bytes);

    // Header word: total length and flag bits. Opaque to this layer.
    reader.read_u32()?;
    let version = reader.read_u8()?;

    let title = reader.read_string()?;
    let author = reader.read_string()?;
    let duration_ms = reader.read_u64()?;
    let identifier = reader.read_string()?;
    let is_stream = reader.read_u8()? == 1;

    let extended = matches!(layout, BlobLayout::Extended) || version >= 2;
    let (uri, artwork_url, isrc) = if extended {
        let uri = Some(reader.read_string()?);
        let artwork_url = reader.read_flagged_string()?;
        let isrc = reader.read_flagged_string()?;
        (uri, artwork_url, isrc)
    } else {
        (None, None, None)
    };

    let source_name = reader.read_string()?.to_lowercase();

    Ok(Track {
        encoded: encoded.to_string(),
        info: TrackInfo {
            title,
            author,
            duration_ms,
            identifier,
            is_seekable: true,
            is_stream,
            uri,
            artwork_url,
            isrc,
            source_name,
            position_ms: 0,
        },
        plugin_info: json!({}),
    })
}

/// Big-endian cursor over a decoded blob.
///
/// Every read checks the remaining length first, so a truncated blob fails
/// with [`ProtocolError::TrackTruncated`] at the offending offset instead
/// of panicking or reading garbage.
struct BlobReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Takes the next `len` bytes, or fails with the current offset.
    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ProtocolError::TrackTruncated(self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let bytes = self.take(8)?;
        let mut fixed = [0u8; 8];
        fixed.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(fixed))
    }

    /// Reads a `u16`-length-prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Reads a presence byte, then a string only when the byte is `1`.
    fn read_flagged_string(&mut self) -> Result<Option<String>, ProtocolError> {
        if self.read_u8()? == 1 {
            Ok(Some(self.read_string()?))
        } else {
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes track metadata into a blob of the given layout and version.
///
/// Production code never re-encodes — backends are the only minters of
/// blobs and `Track::encoded` keeps their exact bytes. This exists so
/// tests can fabricate blobs and verify `decode(encode(info)) == info`.
pub fn encode_track(info: &TrackInfo, layout: BlobLayout, version: u8) -> String {
    let mut body = Vec::with_capacity(64);
    body.push(version);
    write_string(&mut body, &info.title);
    write_string(&mut body, &info.author);
    body.extend_from_slice(&info.duration_ms.to_be_bytes());
    write_string(&mut body, &info.identifier);
    body.push(u8::from(info.is_stream));

    if matches!(layout, BlobLayout::Extended) || version >= 2 {
        write_string(&mut body, info.uri.as_deref().unwrap_or(""));
        write_flagged_string(&mut body, info.artwork_url.as_deref());
        write_flagged_string(&mut body, info.isrc.as_deref());
    }

    write_string(&mut body, &info.source_name);

    // Header word: body size in the low 30 bits, "versioned" flag at bit 30.
    let header = (body.len() as u32 & 0x3FFF_FFFF) | 0x4000_0000;
    let mut blob = Vec::with_capacity(body.len() + 4);
    blob.extend_from_slice(&header.to_be_bytes());
    blob.extend_from_slice(&body);
    BASE64.encode(blob)
}

fn write_string(buf: &mut Vec<u8>, text: &str) {
    let bytes = text.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn write_flagged_string(buf: &mut Vec<u8>, text: Option<&str>) {
    match text {
        Some(text) => {
            buf.push(1);
            write_string(buf, text);
        }
        None => buf.push(0),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
