//! printvault - Game Boy Printer capture decoding and library sync
//!
//! This library provides functionality to:
//! - Parse plain-text printer captures (command logs and free-form dumps)
//!   into 2-bit tile matrices
//! - Content-address decoded images by hashing their compressed form
//! - Stage decoded images in an import session queue
//! - Reconcile a local image catalog against a remote file listing through
//!   a concurrency-limited task queue

pub mod import;
pub mod models;
pub mod queue;
pub mod storage;
pub mod sync;
pub mod tiles;
pub mod transform;

pub use import::{import_plain_text, ImportItem, ImportQueue};
pub use models::{DownloadInfo, Image, RepoFile, SyncFile};
pub use queue::{TaskError, TaskHandle, TaskQueue};
pub use storage::{compress_and_hash, decompress, CompressedImage};
pub use sync::{get_missing_locally, get_upload_images, reconcile, SyncResult, TxtFetcher};
pub use tiles::{Tile, TileMatrix};
pub use transform::{transform_plain_text, FormatError, TransformResult};
