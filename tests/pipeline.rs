//! End-to-end pipeline tests
//!
//! These tests drive the full flow a real import/sync does: raw capture
//! text through parsing, hashing and the import queue, then reconciliation
//! against a remote listing through the bounded task queue.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use printvault::models::{ImageMetadata, MonochromeImage, RgbnHashes, RgbnImage};
use printvault::sync::{ChannelFetchError, FetchQueue};
use printvault::tiles::{FRAME_TILES_HIGH, FRAME_TILES_WIDE, TILE_BYTES};
use printvault::{
    compress_and_hash, decompress, get_upload_images, import_plain_text, transform_plain_text,
    DownloadInfo, Image, ImportQueue, RepoFile, TxtFetcher,
};

/// Build a classic command log for one full 160x144 frame.
fn classic_frame_log(fill: u8) -> String {
    let mut text = String::from("{\"command\":\"INIT\"}\n");
    // Real printers transfer two tile rows per DATA packet
    let packet_bytes = FRAME_TILES_WIDE * 2 * TILE_BYTES;
    for packet in 0..(FRAME_TILES_HIGH / 2) {
        let hex: Vec<String> = (0..packet_bytes)
            .map(|i| format!("{:02X}", fill.wrapping_add(packet as u8).wrapping_add(i as u8)))
            .collect();
        text.push_str(&format!(
            "{{\"command\":\"DATA\",\"compressed\":0,\"more\":0,\"data\":\"{}\"}}\n",
            hex.join(" ")
        ));
    }
    text.push_str("{\"command\":\"PRNT\",\"sheets\":1,\"margin_upper\":1,\"margin_lower\":3}\n");
    text
}

struct CountingFetcher {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingFetcher {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

impl TxtFetcher for CountingFetcher {
    fn get_txt_file(
        &self,
        hash: &str,
        title: &str,
        channel_hash: &str,
    ) -> impl Future<Output = Result<DownloadInfo, ChannelFetchError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let info = DownloadInfo {
            channel_hash: channel_hash.to_string(),
            title: title.to_string(),
            content: format!("payload {hash}"),
        };
        async move {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(info)
        }
    }
}

fn mono(title: &str, hash: &str) -> Image {
    Image::Monochrome(MonochromeImage {
        hash: hash.to_string(),
        meta: ImageMetadata {
            title: title.to_string(),
            ..Default::default()
        },
    })
}

#[test]
fn classic_log_decodes_to_one_standard_frame() {
    let result = transform_plain_text(&classic_frame_log(0), "serial.txt").unwrap();
    assert_eq!(result.matrices.len(), 1);
    let matrix = &result.matrices[0];
    assert_eq!(matrix.tiles_wide(), FRAME_TILES_WIDE);
    assert_eq!(matrix.tiles_high(), FRAME_TILES_HIGH);
    assert!(result.warnings.is_empty());
}

#[test]
fn import_then_roundtrip_through_storage() {
    let mut queue = ImportQueue::new();
    let summary =
        import_plain_text(&mut queue, &classic_frame_log(42), "serial.txt", Some(12345)).unwrap();
    assert_eq!(summary.added, 1);

    let item = queue.iter().next().unwrap();
    let compressed = compress_and_hash(&item.tiles).unwrap();
    assert_eq!(compressed.data_hash, item.image_hash);
    assert_eq!(decompress(&compressed.compressed).unwrap(), item.tiles);
}

#[test]
fn two_prints_in_one_log_split_and_suffix() {
    let text = format!("{}{}", classic_frame_log(1), classic_frame_log(2));
    let mut queue = ImportQueue::new();
    import_plain_text(&mut queue, &text, "serial.txt", Some(99)).unwrap();

    let items: Vec<_> = queue.iter().collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].file_name, "serial.txt 01");
    assert_eq!(items[1].file_name, "serial.txt 02");
    assert_ne!(items[0].image_hash, items[1].image_hash);
}

#[test]
fn unparseable_capture_text_is_a_format_error() {
    let err = transform_plain_text("just some notes\nno data here\n", "notes.txt");
    assert!(err.is_err());
}

#[tokio::test]
async fn sync_respects_queue_ceiling_and_settles_all() {
    let images: Vec<Image> = (0..8).map(|i| mono(&format!("img {i}"), &format!("h{i}"))).collect();
    let queue = FetchQueue::new(3);
    let fetcher = Arc::new(CountingFetcher::new());

    let result = get_upload_images(&images, &[], &queue, Arc::clone(&fetcher)).await;
    assert_eq!(result.sync_files.len(), 8);
    assert!(result.failed.is_empty());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 8);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn satisfied_rgbn_image_issues_no_fetch() {
    let image = Image::Rgbn(RgbnImage {
        hashes: RgbnHashes {
            r: "r".into(),
            g: "g".into(),
            b: "b".into(),
            n: "n".into(),
        },
        meta: ImageMetadata {
            title: "composite".into(),
            ..Default::default()
        },
    });
    let repo: Vec<RepoFile> = ["r", "g", "b", "n"]
        .iter()
        .map(|h| RepoFile {
            hash: h.to_string(),
            path: format!("images/{h}.txt"),
        })
        .collect();
    let queue = FetchQueue::new(3);
    let fetcher = Arc::new(CountingFetcher::new());

    let result = get_upload_images(&[image], &repo, &queue, Arc::clone(&fetcher)).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.sync_files.len(), 1);
    assert!(result.sync_files[0].files.is_empty());
    assert_eq!(result.sync_files[0].in_repo.len(), 4);
}
