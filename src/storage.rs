//! Content addressing: canonical text form, compression and hashing
//!
//! An image's identity is the SHA-256 digest of its *compressed* canonical
//! text form, not of the in-memory matrix, so the key stays stable across
//! internal representation changes as long as the stored bytes are
//! unchanged. The text form is the library's interchange format: one line
//! of 32 lowercase hex characters per tile, row-major.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::tiles::{infer_tiles_wide, Tile, TileMatrix, FRAME_TILES_WIDE, TILE_BYTES};

/// Compression level fixed so identical matrices always compress to
/// identical byte sequences.
const COMPRESSION_LEVEL: u32 = 9;

/// Error type for storage encoding/decoding failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("compression failed: {0}")]
    Io(#[from] std::io::Error),
    /// Stored text contains a line that is not a 32-hex-char tile
    #[error("line {line} is not a valid tile")]
    InvalidTileText { line: usize },
    #[error(transparent)]
    Tile(#[from] crate::tiles::TileError),
}

/// A content-addressed image ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    /// Hex SHA-256 digest of `compressed`, the image's identity key
    pub data_hash: String,
    pub compressed: Vec<u8>,
}

/// Render a matrix in its canonical text form.
pub fn tile_text(matrix: &TileMatrix) -> String {
    let tiles = matrix.tiles();
    let mut text = String::with_capacity(tiles.len() * (TILE_BYTES * 2 + 1));
    for tile in tiles {
        for byte in tile.to_bytes() {
            text.push_str(&format!("{byte:02x}"));
        }
        text.push('\n');
    }
    text
}

/// Compress a matrix and derive its content hash.
pub fn compress_and_hash(matrix: &TileMatrix) -> Result<CompressedImage, StorageError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    encoder.write_all(tile_text(matrix).as_bytes())?;
    let compressed = encoder.finish()?;

    let digest = Sha256::digest(&compressed);
    let data_hash = digest.iter().map(|b| format!("{b:02x}")).collect();

    Ok(CompressedImage {
        data_hash,
        compressed,
    })
}

/// Exact inverse of [`compress_and_hash`]'s encoding: inflate and rebuild
/// the matrix.
///
/// The text form carries no width, so the matrix comes back 20 tiles wide
/// whenever the tile count is a multiple of 20, and at the parsers'
/// inferred width otherwise. Round-trip is exact for matrices that follow
/// that rule (standard frames and anything the parsers produce); a matrix
/// stored with some other width is rebuilt at the rule's width instead.
pub fn decompress(compressed: &[u8]) -> Result<TileMatrix, StorageError> {
    let mut text = String::new();
    ZlibDecoder::new(compressed).read_to_string(&mut text)?;

    let mut tiles = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let bytes = parse_tile_line(trimmed).ok_or(StorageError::InvalidTileText {
            line: index + 1,
        })?;
        tiles.push(Tile::from_bytes(&bytes));
    }

    let tiles_wide = if tiles.len() % FRAME_TILES_WIDE == 0 && !tiles.is_empty() {
        FRAME_TILES_WIDE
    } else {
        infer_tiles_wide(tiles.len())
    };
    Ok(TileMatrix::from_tiles(&tiles, tiles_wide)?)
}

fn parse_tile_line(line: &str) -> Option<[u8; TILE_BYTES]> {
    if line.len() != TILE_BYTES * 2 {
        return None;
    }
    let mut bytes = [0u8; TILE_BYTES];
    for (i, chunk) in line.as_bytes().chunks_exact(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        bytes[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(bytes)
}
