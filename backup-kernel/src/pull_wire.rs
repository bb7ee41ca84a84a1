//! Fixed-width framing for the pull protocol (Manager client <-> Agent server).
//!
//! All framed strings are right-padded with `'|'` to their declared width;
//! readers strip trailing `'|'` bytes from the right. The protocol is
//! line-free so that arbitrary ETag/path bytes never collide with a
//! delimiter.

use std::time::Duration;

use thiserror::Error;

/// Deadline applied to every pull-protocol socket read/write, on both sides
/// of the connection, so a stuck peer cannot block a worker indefinitely.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(10);

/// Width, in bytes, of the ETag frame.
pub const ETAG_FRAME_LEN: usize = 64;
/// Width, in bytes, of the requested-path frame.
pub const PATH_FRAME_LEN: usize = 256;
/// Width, in bytes, of the body-size frame.
pub const SIZE_FRAME_LEN: usize = 10;
/// Chunk size used when streaming archive bytes over the wire.
pub const BUFFER_BACKUP: usize = 1024;

/// Sentinel size-frame value: the Agent could not find the requested path.
pub const SIZE_ERROR: i64 = -1;
/// Sentinel size-frame value: the archive is unchanged since the ETag given.
pub const SIZE_UNCHANGED: i64 = 0;

const PAD: u8 = b'|';

/// Errors raised by the fixed-width framing helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A size frame did not decode to valid ASCII decimal.
    #[error("malformed size frame: {0:?}")]
    MalformedSize(Vec<u8>),
}

/// Right-pads `value` with `'|'` to exactly `width` bytes, truncating if
/// `value` is already longer than `width` (see design note on oversized
/// input: truncate rather than panic or corrupt adjacent frames).
#[must_use]
pub fn pad(value: &str, width: usize) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.truncate(width);
    bytes.resize(width, PAD);
    bytes
}

/// Strips trailing `'|'` padding from the right only; interior `'|'` bytes
/// are preserved. Frame content is assumed (and, by the wire format, only
/// producible) as valid UTF-8.
#[must_use]
pub fn unpad(frame: &[u8]) -> String {
    let end = frame.iter().rposition(|&b| b != PAD).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&frame[..end]).into_owned()
}

/// Encodes a signed body-size value as a `'|'`-padded 10-byte ASCII decimal frame.
#[must_use]
pub fn encode_size(size: i64) -> Vec<u8> {
    pad(&size.to_string(), SIZE_FRAME_LEN)
}

/// Decodes a 10-byte size frame back to its signed decimal value.
///
/// # Errors
///
/// Returns [`FrameError::MalformedSize`] if the unpadded content is not a
/// valid signed decimal integer.
pub fn decode_size(frame: &[u8]) -> Result<i64, FrameError> {
    unpad(frame)
        .trim()
        .parse()
        .map_err(|_| FrameError::MalformedSize(frame.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_then_unpad_round_trips() {
        let framed = pad("abc", 10);
        assert_eq!(framed.len(), 10);
        assert_eq!(unpad(&framed), "abc");
    }

    #[test]
    fn unpad_preserves_interior_pad_bytes() {
        let framed = pad("a|b", 10);
        assert_eq!(unpad(&framed), "a|b");
    }

    #[test]
    fn pad_truncates_oversized_input() {
        let framed = pad("0123456789extra", 10);
        assert_eq!(framed.len(), 10);
        assert_eq!(unpad(&framed), "0123456789");
    }

    #[test]
    fn content_exactly_at_frame_width_needs_no_padding() {
        let exact = "x".repeat(ETAG_FRAME_LEN);
        let framed = pad(&exact, ETAG_FRAME_LEN);
        assert_eq!(unpad(&framed), exact);
    }

    #[test]
    fn size_frame_round_trips_sentinels() {
        for size in [SIZE_ERROR, SIZE_UNCHANGED, 4096] {
            let framed = encode_size(size);
            assert_eq!(framed.len(), SIZE_FRAME_LEN);
            assert_eq!(decode_size(&framed).unwrap(), size);
        }
    }

    #[test]
    fn malformed_size_frame_is_rejected() {
        let framed = pad("not-a-number", SIZE_FRAME_LEN);
        assert!(decode_size(&framed).is_err());
    }
}
