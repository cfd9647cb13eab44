//! Stream encoding/decoding for IMSS.
//!
//! Two sibling encodings share one grammar: [`binary`] (`IMSS0100BIN`) and
//! [`text`] (`IMSS0100TXT`). Both start with the 11-byte header and end with
//! the `\[END]` trailer carrying the integrity tag.

pub mod binary;
pub mod field;
pub mod integrity;
pub mod primitives;
pub mod text;

use std::io::{Read, Write};

use crate::error::{DecodeError, EncodeError};
use crate::grammar::{FORMAT_CODE, FORMAT_VERSION, HEADER_LEN, StreamKind};
use crate::limits::MAX_STREAM_SIZE;
use crate::model::{Graph, GraphSource, NodeId};

pub use binary::{EncodeOptions, decode_graph, encode_graph, encode_graph_with_options};
pub use primitives::{Reader, Writer};
pub use text::{decode_graph_text, encode_graph_text};

/// Counters collected while decoding a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub type_declarations: usize,
    pub definitions: usize,
    pub references: usize,
    pub collections: usize,
    pub items: usize,
    /// Blocks with a reserved but unknown tag, skipped by length.
    pub skipped_blocks: usize,
    /// Integrity tag found in (and verified against) the trailer.
    pub integrity_tag: String,
}

/// A decoded stream: the reconstructed graph and its root node.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub graph: Graph,
    pub root: NodeId,
    pub stats: DecodeStats,
}

/// Verifies the 11-byte header against the expected stream kind.
pub(crate) fn check_header(input: &[u8], expected: StreamKind) -> Result<(), DecodeError> {
    if input.len() < HEADER_LEN {
        if !FORMAT_CODE.starts_with(&input[..input.len().min(FORMAT_CODE.len())]) {
            return Err(DecodeError::InvalidMagic {
                found: input.to_vec(),
            });
        }
        return Err(DecodeError::UnexpectedEof {
            context: "header",
            offset: input.len(),
        });
    }
    if &input[0..4] != FORMAT_CODE {
        return Err(DecodeError::InvalidMagic {
            found: input[0..4].to_vec(),
        });
    }
    if &input[4..8] != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: input[4..8].to_vec(),
        });
    }
    if &input[8..11] != expected.code() {
        let expected = match expected {
            StreamKind::Binary => "BIN",
            StreamKind::Text => "TXT",
        };
        return Err(DecodeError::UnexpectedKind {
            expected,
            found: input[8..11].to_vec(),
        });
    }
    Ok(())
}

/// Fails if the whole stream exceeds [`MAX_STREAM_SIZE`].
pub(crate) fn check_stream_size(input: &[u8]) -> Result<(), DecodeError> {
    if input.len() > MAX_STREAM_SIZE {
        return Err(DecodeError::LengthExceedsLimit {
            field: "stream",
            len: input.len(),
            max: MAX_STREAM_SIZE,
            offset: 0,
        });
    }
    Ok(())
}

/// Decodes a stream of either kind, dispatching on the header.
///
/// A header naming neither `BIN` nor `TXT` is reported as the binary
/// decoder would report it.
pub fn decode_stream(input: &[u8]) -> Result<Decoded, DecodeError> {
    match StreamKind::detect(input) {
        Some(StreamKind::Text) => decode_graph_text(input),
        Some(StreamKind::Binary) | None => decode_graph(input),
    }
}

/// Encodes `root` as a binary stream and writes it to `sink`.
///
/// The stream is built in memory first; the sink sees a single
/// `write_all` followed by `flush`.
pub fn write_graph<S, W>(
    source: &S,
    root: NodeId,
    options: EncodeOptions,
    sink: &mut W,
) -> Result<usize, EncodeError>
where
    S: GraphSource + ?Sized,
    W: Write + ?Sized,
{
    let bytes = encode_graph_with_options(source, root, options)?;
    sink.write_all(&bytes)?;
    sink.flush()?;
    Ok(bytes.len())
}

/// Reads a whole stream from `source` and decodes it.
///
/// At most [`MAX_STREAM_SIZE`] + 1 bytes are read, so an oversized stream
/// fails with [`DecodeError::LengthExceedsLimit`] without being buffered
/// in full.
pub fn read_graph<R: Read>(source: R) -> Result<Decoded, DecodeError> {
    let mut input = Vec::new();
    source
        .take(MAX_STREAM_SIZE as u64 + 1)
        .read_to_end(&mut input)?;
    decode_stream(&input)
}
