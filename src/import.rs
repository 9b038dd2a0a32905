//! Import session queue
//!
//! Decoded images wait here until the caller commits them to the catalog or
//! discards them. The queue is owned by one import session, append-only
//! while open, and never deduplicates: two captures of the same picture both
//! get offered to the catalog, which is where dedup by content hash
//! belongs.

use thiserror::Error;

use crate::storage::{compress_and_hash, StorageError};
use crate::tiles::TileMatrix;
use crate::transform::{transform_plain_text, FormatError, Warning};

/// Error type for a failed file import. Only that file's import is aborted.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One parsed-and-hashed image candidate awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItem {
    /// Session-unique transient id. Deliberately not the content hash:
    /// several pending items may collapse to the same hash later.
    pub temp_id: u64,
    pub file_name: String,
    pub image_hash: String,
    pub tiles: TileMatrix,
    /// Source file mtime, offset per image when one file yields several
    pub last_modified: Option<u64>,
}

/// What one import call added to the queue.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub added: usize,
    pub warnings: Vec<Warning>,
}

/// An import session's pending images.
#[derive(Debug, Default)]
pub struct ImportQueue {
    items: Vec<ImportItem>,
    next_id: u64,
}

impl ImportQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one candidate. Never blocks, never deduplicates.
    pub fn add(
        &mut self,
        file_name: String,
        image_hash: String,
        tiles: TileMatrix,
        last_modified: Option<u64>,
    ) -> u64 {
        let temp_id = self.next_id;
        self.next_id += 1;
        self.items.push(ImportItem {
            temp_id,
            file_name,
            image_hash,
            tiles,
            last_modified,
        });
        temp_id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportItem> {
        self.items.iter()
    }

    /// Hand everything over for committing; the session is empty afterwards.
    pub fn drain(&mut self) -> Vec<ImportItem> {
        std::mem::take(&mut self.items)
    }

    /// Discard the session's pending images.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Run the full plain-text pipeline for one file: parse, hash, enqueue.
///
/// When a file yields several images, each gets a ` NN` suffix on the file
/// name and its index added to `last_modified`, so the split images stay
/// distinguishable downstream.
pub fn import_plain_text(
    queue: &mut ImportQueue,
    data: &str,
    file_name: &str,
    last_modified: Option<u64>,
) -> Result<ImportSummary, ImportError> {
    let result = transform_plain_text(data, file_name)?;
    let multiple = result.matrices.len() > 1;
    let before = queue.len();

    for (index, tiles) in result.matrices.into_iter().enumerate() {
        let compressed = compress_and_hash(&tiles)?;
        let name = if multiple {
            format!("{file_name} {:02}", index + 1)
        } else {
            file_name.to_string()
        };
        queue.add(
            name,
            compressed.data_hash,
            tiles,
            last_modified.map(|stamp| stamp + index as u64),
        );
    }

    Ok(ImportSummary {
        added: queue.len() - before,
        warnings: result.warnings,
    })
}
