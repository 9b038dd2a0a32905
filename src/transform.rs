//! Plain-text capture import: format detection and parser dispatch
//!
//! Two legacy text conventions are accepted. Serial logs from printer
//! emulators contain JSON command records and go through the classic parser;
//! anything else is treated as a free-form capture dump. Both parsers are
//! lenient: malformed records are skipped with a warning and parsing
//! continues at the next recoverable boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tiles::{infer_tiles_wide, Tile, TileMatrix, FRAME_TILES_WIDE, TILE_BYTES};

pub mod capture;
pub mod classic;

pub use capture::transform_capture;
pub use classic::transform_classic;

/// Substring marking a classic command-log capture.
pub const CLASSIC_MARKER: &str = r#"{"command""#;

/// Error type for imports where nothing could be recovered at all.
///
/// Zero *complete images* in otherwise readable input is not an error; this
/// only fires when the text yields no valid record or tile byte whatsoever.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Text looked like a command log but no record could be parsed
    #[error("{file_name}: no recoverable printer command records")]
    NoValidRecords { file_name: String },
    /// Free-form text contained no recognizable tile data
    #[error("{file_name}: no tile data found")]
    NoValidData { file_name: String },
}

/// A non-fatal parse diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub line: usize,
}

/// Result of transforming one text capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformResult {
    /// Decoded images, first captured first
    pub matrices: Vec<TileMatrix>,
    pub warnings: Vec<Warning>,
}

/// Parse raw capture text into tile matrices, routing to the matching parser.
///
/// Text containing `{"command"` anywhere is dispatched to the classic
/// command-log parser, everything else to the capture parser. Pure: the same
/// input always yields the same ordered result.
pub fn transform_plain_text(data: &str, file_name: &str) -> Result<TransformResult, FormatError> {
    if data.contains(CLASSIC_MARKER) {
        transform_classic(data, file_name)
    } else {
        transform_capture(data, file_name)
    }
}

/// Assemble buffered capture bytes into a matrix.
///
/// Bytes are grouped into 16-byte tiles; a trailing partial tile is dropped
/// with a warning. Captures not divisible into the standard 20-tile width
/// fall back to an inferred width. Returns `None` when less than one tile
/// row survives.
pub(crate) fn collect_matrix(
    bytes: &[u8],
    line: usize,
    warnings: &mut Vec<Warning>,
) -> Option<TileMatrix> {
    let trailing = bytes.len() % TILE_BYTES;
    if trailing != 0 {
        warnings.push(Warning {
            message: format!("dropping {trailing} trailing bytes of a partial tile"),
            line,
        });
    }

    let tiles: Vec<Tile> = bytes
        .chunks_exact(TILE_BYTES)
        .map(|chunk| {
            let mut buf = [0u8; TILE_BYTES];
            buf.copy_from_slice(chunk);
            Tile::from_bytes(&buf)
        })
        .collect();
    if tiles.is_empty() {
        return None;
    }

    let tiles_wide = if tiles.len() % FRAME_TILES_WIDE == 0 {
        FRAME_TILES_WIDE
    } else {
        infer_tiles_wide(tiles.len())
    };

    match TileMatrix::from_tiles(&tiles, tiles_wide) {
        Ok(matrix) => Some(matrix),
        Err(err) => {
            warnings.push(Warning {
                message: format!("discarding undersized capture: {err}"),
                line,
            });
            None
        }
    }
}
