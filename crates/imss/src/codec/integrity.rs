//! Trailer handling: the `\[END]` marker and the integrity tag.
//!
//! The tag is the first 8 bytes of SHA-256 over every byte that precedes
//! the marker, written as 16 lowercase hex digits.

use sha2::{Digest, Sha256};

use crate::codec::field::encode_hex;
use crate::error::DecodeError;
use crate::grammar::{HEADER_LEN, INTEGRITY_TAG_LEN, TRAILER_LEN, TRAILER_MARKER};

/// Computes the integrity tag of `content`.
pub fn integrity_tag(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    encode_hex(&hash[..INTEGRITY_TAG_LEN / 2])
}

/// Appends the trailer marker and the tag of everything already in `buf`.
pub fn append_trailer(buf: &mut Vec<u8>) {
    let tag = integrity_tag(buf);
    buf.extend_from_slice(TRAILER_MARKER);
    buf.extend_from_slice(tag.as_bytes());
}

/// Splits a complete stream into its content (header and body) and its tag.
///
/// Fails with [`DecodeError::MissingTrailer`] when the marker is absent or
/// the tag is not 16 lowercase hex digits, and with
/// [`DecodeError::IntegrityMismatch`] when the tag does not match. Both
/// carry the offset where the marker (or tag) was expected.
pub fn split_trailer(input: &[u8]) -> Result<(&[u8], String), DecodeError> {
    if input.len() < HEADER_LEN + TRAILER_LEN {
        return Err(DecodeError::MissingTrailer {
            offset: input.len().min(HEADER_LEN),
        });
    }
    let marker_at = input.len() - TRAILER_LEN;
    let tag_at = marker_at + TRAILER_MARKER.len();
    let (content, trailer) = input.split_at(marker_at);
    let (marker, tag) = trailer.split_at(TRAILER_MARKER.len());
    if marker != TRAILER_MARKER {
        return Err(DecodeError::MissingTrailer { offset: marker_at });
    }
    if !tag.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(DecodeError::MissingTrailer { offset: tag_at });
    }
    // every byte is ASCII hex at this point
    let found = String::from_utf8_lossy(tag).into_owned();
    let expected = integrity_tag(content);
    if found != expected {
        return Err(DecodeError::IntegrityMismatch {
            expected,
            found,
            offset: tag_at,
        });
    }
    Ok((content, found))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(content: &[u8]) -> Vec<u8> {
        let mut buf = content.to_vec();
        append_trailer(&mut buf);
        buf
    }

    #[test]
    fn test_tag_is_deterministic_hex() {
        let tag = integrity_tag(b"IMSS0100BIN");
        assert_eq!(tag.len(), INTEGRITY_TAG_LEN);
        assert!(tag.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(tag, integrity_tag(b"IMSS0100BIN"));
        assert_ne!(tag, integrity_tag(b"IMSS0100TXT"));
    }

    #[test]
    fn test_split_roundtrip() {
        let stream = sealed(b"IMSS0100BINbody");
        let (content, tag) = split_trailer(&stream).unwrap();
        assert_eq!(content, b"IMSS0100BINbody");
        assert_eq!(tag, integrity_tag(content));
        assert!(stream.ends_with(tag.as_bytes()));
    }

    #[test]
    fn test_altered_marker_rejected() {
        let mut stream = sealed(b"IMSS0100BINbody");
        let marker_at = stream.len() - TRAILER_LEN;
        stream[marker_at + 2] = b'X';
        assert!(matches!(
            split_trailer(&stream),
            Err(DecodeError::MissingTrailer { offset }) if offset == marker_at
        ));
    }

    #[test]
    fn test_altered_content_rejected() {
        let mut stream = sealed(b"IMSS0100BINbody");
        stream[12] ^= 0x01;
        let tag_at = stream.len() - INTEGRITY_TAG_LEN;
        assert!(matches!(
            split_trailer(&stream),
            Err(DecodeError::IntegrityMismatch { offset, .. }) if offset == tag_at
        ));
    }

    #[test]
    fn test_uppercase_tag_rejected() {
        let mut stream = sealed(b"IMSS0100BINbody");
        let last = stream.len() - 1;
        stream[last] = b'G';
        assert!(matches!(split_trailer(&stream), Err(DecodeError::MissingTrailer { .. })));
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let stream = sealed(b"IMSS0100BINbody");
        assert!(matches!(
            split_trailer(&stream[..stream.len() - 3]),
            Err(DecodeError::MissingTrailer { .. })
        ));
    }
}
