//! Remote store reconciliation
//!
//! Compares the local catalog against a pre-fetched remote file listing and
//! computes the minimal transfer set: images whose hashes are all present
//! remotely are satisfied immediately, everything else becomes a fetch job
//! on the bounded task queue. The core never talks to the network itself;
//! payload production is delegated to the [`TxtFetcher`] collaborator.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{DownloadInfo, Image, RepoFile, SyncFile};
use crate::queue::TaskQueue;

/// Priority for sync fetch jobs: mid-level, below interactive work.
pub const SYNC_PRIORITY: u8 = 3;

/// Error type for a single failed fetch/produce job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed for channel {channel_hash}: {message}")]
pub struct ChannelFetchError {
    pub channel_hash: String,
    pub message: String,
}

/// Why one image could not be reconciled. Isolated per image; siblings in
/// the same run are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] ChannelFetchError),
    #[error("fetch job did not settle: {0}")]
    TaskFailed(String),
}

/// The fetch/produce collaborator: materializes the textual payload for one
/// channel hash. Scheduled through the task queue, never called directly.
pub trait TxtFetcher: Send + Sync + 'static {
    fn get_txt_file(
        &self,
        hash: &str,
        title: &str,
        channel_hash: &str,
    ) -> impl Future<Output = Result<DownloadInfo, ChannelFetchError>> + Send;
}

/// An image that could not be reconciled this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// The image's canonical identity key
    pub identity: String,
    pub error: SyncError,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// One entry per reconciled image, in original catalog order
    pub sync_files: Vec<SyncFile>,
    /// Images whose fetch jobs failed; retry or report is the caller's call
    pub failed: Vec<SyncFailure>,
    /// Remote files no local image requires (download direction)
    pub missing_locally: Vec<RepoFile>,
}

/// Queue type used for sync fetch jobs.
pub type FetchQueue = TaskQueue<Result<DownloadInfo, ChannelFetchError>>;

struct Plan<'a> {
    image: &'a Image,
    in_repo: Vec<RepoFile>,
    missing: Vec<String>,
}

/// Compute the upload-direction transfer set.
///
/// Exactly one fetch job is issued per *unique* missing hash across the
/// whole batch: hashes confirmed present remotely are never fetched, and a
/// hash required by two images is fetched once. Results are reassembled in
/// original catalog order regardless of job completion order.
/// `missing_locally` is left empty here; see [`get_missing_locally`] and
/// [`reconcile`].
pub async fn get_upload_images<F>(
    images: &[Image],
    repo_files: &[RepoFile],
    queue: &FetchQueue,
    fetcher: Arc<F>,
) -> SyncResult
where
    F: TxtFetcher,
{
    let mut by_hash: HashMap<&str, Vec<&RepoFile>> = HashMap::new();
    for file in repo_files {
        by_hash.entry(file.hash.as_str()).or_default().push(file);
    }

    let plans: Vec<Plan> = images
        .iter()
        .map(|image| {
            let mut in_repo = Vec::new();
            let mut missing = Vec::new();
            for hash in image.search_hashes() {
                match by_hash.get(hash) {
                    Some(files) => in_repo.extend(files.iter().map(|file| (*file).clone())),
                    None => missing.push(hash.to_string()),
                }
            }
            Plan {
                image,
                in_repo,
                missing,
            }
        })
        .collect();

    // Channel-level dedup: one fetch per unique missing hash, first-need order
    let mut seen = HashSet::new();
    let mut fetches: Vec<(String, String)> = Vec::new();
    for plan in &plans {
        for hash in &plan.missing {
            if seen.insert(hash.clone()) {
                fetches.push((hash.clone(), plan.image.title().to_string()));
            }
        }
    }

    let total = fetches.len();
    let handles: Vec<_> = fetches
        .into_iter()
        .enumerate()
        .map(|(index, (hash, title))| {
            let fetcher = Arc::clone(&fetcher);
            let label = format!("sync fetch ({}/{}) {}", index + 1, total, title);
            let job_hash = hash.clone();
            let handle = queue.add(&label, SYNC_PRIORITY, async move {
                fetcher.get_txt_file(&job_hash, &title, &job_hash).await
            });
            (hash, handle)
        })
        .collect();

    let mut fetched: HashMap<String, DownloadInfo> = HashMap::new();
    let mut errors: HashMap<String, SyncError> = HashMap::new();
    for (hash, handle) in handles {
        match handle.join().await {
            Ok(Ok(info)) => {
                fetched.insert(hash, info);
            }
            Ok(Err(err)) => {
                errors.insert(hash, SyncError::Fetch(err));
            }
            Err(task_err) => {
                errors.insert(hash, SyncError::TaskFailed(task_err.to_string()));
            }
        }
    }

    let mut result = SyncResult::default();
    for plan in plans {
        if plan.missing.is_empty() {
            result.sync_files.push(SyncFile {
                hash: plan.image.identity(),
                in_repo: plan.in_repo,
                files: Vec::new(),
            });
            continue;
        }

        let mut files = Vec::with_capacity(plan.missing.len());
        let mut failure = None;
        for hash in &plan.missing {
            match fetched.get(hash) {
                Some(info) => files.push(info.clone()),
                None => {
                    let error = errors
                        .get(hash)
                        .cloned()
                        .unwrap_or_else(|| SyncError::TaskFailed(hash.clone()));
                    failure = Some(error);
                    break;
                }
            }
        }

        match failure {
            None => result.sync_files.push(SyncFile {
                hash: plan.image.identity(),
                in_repo: plan.in_repo,
                files,
            }),
            Some(error) => result.failed.push(SyncFailure {
                identity: plan.image.identity(),
                error,
            }),
        }
    }
    result
}

/// The download-direction sibling: remote files whose hash no local image
/// requires.
pub fn get_missing_locally(images: &[Image], repo_files: &[RepoFile]) -> Vec<RepoFile> {
    let required: HashSet<&str> = images
        .iter()
        .flat_map(|image| image.search_hashes())
        .collect();
    repo_files
        .iter()
        .filter(|file| !required.contains(file.hash.as_str()))
        .cloned()
        .collect()
}

/// Full reconciliation run: upload transfer set plus the remote files
/// missing from the local catalog.
pub async fn reconcile<F>(
    images: &[Image],
    repo_files: &[RepoFile],
    queue: &FetchQueue,
    fetcher: Arc<F>,
) -> SyncResult
where
    F: TxtFetcher,
{
    let mut result = get_upload_images(images, repo_files, queue, fetcher).await;
    result.missing_locally = get_missing_locally(images, repo_files);
    result
}
