//! Tile model and Game Boy 2bpp decoding
//!
//! A printer capture is a stream of 8x8 tiles, 16 bytes each, two bit-planes
//! per pixel row. This module decodes that stream and assembles tiles into
//! full image matrices.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width and height of a single tile in pixels.
pub const TILE_SIZE: usize = 8;

/// Number of bytes encoding one tile (two bytes per pixel row).
pub const TILE_BYTES: usize = 16;

/// Tile width of a standard printer frame (160 pixels).
pub const FRAME_TILES_WIDE: usize = 20;

/// Tile height of a standard printer frame (144 pixels).
pub const FRAME_TILES_HIGH: usize = 18;

/// Byte length of one full 160x144 frame.
pub const FRAME_BYTES: usize = FRAME_TILES_WIDE * FRAME_TILES_HIGH * TILE_BYTES;

/// Error type for tile assembly failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Matrix rows have differing lengths
    #[error("row {row} has length {found}, expected {expected}")]
    NotRectangular {
        row: usize,
        found: usize,
        expected: usize,
    },
    /// Matrix dimensions are not multiples of the tile size
    #[error("dimensions {width}x{height} are not multiples of {TILE_SIZE}")]
    NotTileAligned { width: usize, height: usize },
    /// A pixel value is outside the 2-bit range
    #[error("pixel value {value} at ({x}, {y}) exceeds 3")]
    PixelOutOfRange { value: u8, x: usize, y: usize },
    /// Not enough tiles to form a single complete row
    #[error("{count} tiles cannot fill a row of {tiles_wide}")]
    TooFewTiles { count: usize, tiles_wide: usize },
}

/// A single decoded 8x8 tile of 2-bit pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pixels: [[u8; TILE_SIZE]; TILE_SIZE],
}

impl Tile {
    /// Decode a tile from its 16-byte 2bpp representation.
    ///
    /// Per pixel row `r`, byte `2r` holds the low bit-plane and byte `2r + 1`
    /// the high bit-plane; pixel `x` takes bit `7 - x` from each plane.
    pub fn from_bytes(bytes: &[u8; TILE_BYTES]) -> Self {
        let mut pixels = [[0u8; TILE_SIZE]; TILE_SIZE];
        for (row, pair) in bytes.chunks_exact(2).enumerate() {
            let (lo, hi) = (pair[0], pair[1]);
            for x in 0..TILE_SIZE {
                let bit = 7 - x;
                pixels[row][x] = (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1);
            }
        }
        Self { pixels }
    }

    /// Encode back to the 16-byte 2bpp representation.
    pub fn to_bytes(&self) -> [u8; TILE_BYTES] {
        let mut bytes = [0u8; TILE_BYTES];
        for (row, pixels) in self.pixels.iter().enumerate() {
            let mut lo = 0u8;
            let mut hi = 0u8;
            for (x, &value) in pixels.iter().enumerate() {
                let bit = 7 - x;
                lo |= (value & 1) << bit;
                hi |= ((value >> 1) & 1) << bit;
            }
            bytes[row * 2] = lo;
            bytes[row * 2 + 1] = hi;
        }
        bytes
    }

    /// Pixel value at tile-local coordinates.
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y][x]
    }

    /// One pixel row of the tile.
    pub fn row(&self, y: usize) -> &[u8; TILE_SIZE] {
        &self.pixels[y]
    }
}

/// A decoded image channel: a rectangular grid of 2-bit pixel values whose
/// dimensions are multiples of the tile size.
///
/// Deserialization goes through [`TileMatrix::new`], so a matrix read back
/// from JSON upholds the same invariants as one built in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTileMatrix")]
pub struct TileMatrix {
    rows: Vec<Vec<u8>>,
}

/// Unvalidated wire shape of [`TileMatrix`].
#[derive(Deserialize)]
struct RawTileMatrix {
    rows: Vec<Vec<u8>>,
}

impl TryFrom<RawTileMatrix> for TileMatrix {
    type Error = TileError;

    fn try_from(raw: RawTileMatrix) -> Result<Self, Self::Error> {
        TileMatrix::new(raw.rows)
    }
}

impl TileMatrix {
    /// Build a matrix from raw pixel rows, validating the invariants:
    /// rectangular, tile-aligned dimensions, all values in 0..=3.
    pub fn new(rows: Vec<Vec<u8>>) -> Result<Self, TileError> {
        let width = rows.first().map_or(0, Vec::len);
        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(TileError::NotRectangular {
                    row: y,
                    found: row.len(),
                    expected: width,
                });
            }
            for (x, &value) in row.iter().enumerate() {
                if value > 3 {
                    return Err(TileError::PixelOutOfRange { value, x, y });
                }
            }
        }
        if width % TILE_SIZE != 0 || rows.len() % TILE_SIZE != 0 || rows.is_empty() {
            return Err(TileError::NotTileAligned {
                width,
                height: rows.len(),
            });
        }
        Ok(Self { rows })
    }

    /// Assemble an ordered tile stream into a matrix `tiles_wide` tiles wide.
    ///
    /// Trailing tiles that do not fill a complete row are dropped. Fails only
    /// when not even one row can be filled.
    pub fn from_tiles(tiles: &[Tile], tiles_wide: usize) -> Result<Self, TileError> {
        if tiles_wide == 0 || tiles.len() < tiles_wide {
            return Err(TileError::TooFewTiles {
                count: tiles.len(),
                tiles_wide: tiles_wide.max(1),
            });
        }
        let tiles_high = tiles.len() / tiles_wide;
        let mut rows = Vec::with_capacity(tiles_high * TILE_SIZE);
        for ty in 0..tiles_high {
            for py in 0..TILE_SIZE {
                let mut row = Vec::with_capacity(tiles_wide * TILE_SIZE);
                for tx in 0..tiles_wide {
                    row.extend_from_slice(tiles[ty * tiles_wide + tx].row(py));
                }
                rows.push(row);
            }
        }
        Ok(Self { rows })
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Width in tiles.
    pub fn tiles_wide(&self) -> usize {
        self.width() / TILE_SIZE
    }

    /// Height in tiles.
    pub fn tiles_high(&self) -> usize {
        self.height() / TILE_SIZE
    }

    /// Pixel rows, top to bottom.
    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    /// Extract the tile at tile coordinates `(tx, ty)`.
    pub fn tile_at(&self, tx: usize, ty: usize) -> Tile {
        let mut pixels = [[0u8; TILE_SIZE]; TILE_SIZE];
        for (py, row) in pixels.iter_mut().enumerate() {
            let src = &self.rows[ty * TILE_SIZE + py];
            row.copy_from_slice(&src[tx * TILE_SIZE..(tx + 1) * TILE_SIZE]);
        }
        Tile { pixels }
    }

    /// All tiles in row-major order.
    pub fn tiles(&self) -> Vec<Tile> {
        let mut tiles = Vec::with_capacity(self.tiles_wide() * self.tiles_high());
        for ty in 0..self.tiles_high() {
            for tx in 0..self.tiles_wide() {
                tiles.push(self.tile_at(tx, ty));
            }
        }
        tiles
    }
}

/// Pick a tile width for a capture that is not a standard frame.
///
/// Standard output is 20 tiles wide; otherwise the divisor of the tile count
/// closest to 20 is used, so small captures still come out roughly
/// screen-shaped. A prime tile count degenerates to a single row.
pub fn infer_tiles_wide(tile_count: usize) -> usize {
    if tile_count == 0 {
        return FRAME_TILES_WIDE;
    }
    if tile_count % FRAME_TILES_WIDE == 0 {
        return FRAME_TILES_WIDE;
    }
    let mut best = tile_count;
    for d in 1..=tile_count {
        if tile_count % d != 0 {
            continue;
        }
        let diff = d.abs_diff(FRAME_TILES_WIDE);
        if diff < best.abs_diff(FRAME_TILES_WIDE) || (diff == best.abs_diff(FRAME_TILES_WIDE) && d > best) {
            best = d;
        }
    }
    best
}
