//! Data models for the image catalog and sync records

use serde::{Deserialize, Serialize};

/// Shared metadata carried by every catalog image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub title: String,
    /// Creation timestamp, as recorded by the capture source
    pub created: String,
    /// Name of the palette the image is displayed with
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub palette: Option<String>,
    /// Name of the decorative frame, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub frame: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

/// A single-channel image, identified by one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonochromeImage {
    pub hash: String,
    #[serde(flatten)]
    pub meta: ImageMetadata,
}

/// The four channel hashes of an RGBN image, in canonical r, g, b, n order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbnHashes {
    pub r: String,
    pub g: String,
    pub b: String,
    pub n: String,
}

impl RgbnHashes {
    /// Channel hashes in canonical order.
    pub fn ordered(&self) -> [&str; 4] {
        [&self.r, &self.g, &self.b, &self.n]
    }
}

/// A composite image assembled from four independently captured channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbnImage {
    pub hashes: RgbnHashes,
    #[serde(flatten)]
    pub meta: ImageMetadata,
}

/// A catalog image. The variant is an explicit discriminant so unexpected
/// shapes cannot slip through untyped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Image {
    Monochrome(MonochromeImage),
    Rgbn(RgbnImage),
}

impl Image {
    pub fn title(&self) -> &str {
        match self {
            Image::Monochrome(image) => &image.meta.title,
            Image::Rgbn(image) => &image.meta.title,
        }
    }

    pub fn meta(&self) -> &ImageMetadata {
        match self {
            Image::Monochrome(image) => &image.meta,
            Image::Rgbn(image) => &image.meta,
        }
    }

    /// The content hashes this image needs present in a store: one for
    /// monochrome, four (r, g, b, n) for RGBN.
    pub fn search_hashes(&self) -> Vec<&str> {
        match self {
            Image::Monochrome(image) => vec![&image.hash],
            Image::Rgbn(image) => image.hashes.ordered().to_vec(),
        }
    }

    /// Canonical identity key. Monochrome images are identified by their
    /// single hash; RGBN images by the ordered channel hashes joined with
    /// `,`, so two composites agree exactly when all four channels agree.
    pub fn identity(&self) -> String {
        match self {
            Image::Monochrome(image) => image.hash.clone(),
            Image::Rgbn(image) => image.hashes.ordered().join(","),
        }
    }
}

/// One physical file already present in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFile {
    pub hash: String,
    pub path: String,
}

/// A textual payload ready to be written or uploaded for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub channel_hash: String,
    pub title: String,
    pub content: String,
}

/// Reconciliation output for one image: which remote files already satisfy
/// it, and which payloads still have to be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFile {
    /// The image's canonical identity key (see [`Image::identity`])
    pub hash: String,
    pub in_repo: Vec<RepoFile>,
    pub files: Vec<DownloadInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str) -> ImageMetadata {
        ImageMetadata {
            title: title.to_string(),
            created: "2021-01-30 18:23:11".to_string(),
            palette: Some("bw".to_string()),
            frame: None,
            tags: vec![],
        }
    }

    #[test]
    fn test_image_tagged_serialization() {
        let image = Image::Monochrome(MonochromeImage {
            hash: "abc123".to_string(),
            meta: meta("hello"),
        });
        let json = serde_json::to_string(&image).unwrap();
        assert!(json.contains(r#""type":"monochrome""#));
        let parsed: Image = serde_json::from_str(&json).unwrap();
        assert_eq!(image, parsed);
    }

    #[test]
    fn test_search_hashes_monochrome() {
        let image = Image::Monochrome(MonochromeImage {
            hash: "abc".to_string(),
            meta: meta("m"),
        });
        assert_eq!(image.search_hashes(), vec!["abc"]);
        assert_eq!(image.identity(), "abc");
    }

    #[test]
    fn test_search_hashes_rgbn_ordered() {
        let image = Image::Rgbn(RgbnImage {
            hashes: RgbnHashes {
                r: "r1".to_string(),
                g: "g1".to_string(),
                b: "b1".to_string(),
                n: "n1".to_string(),
            },
            meta: meta("composite"),
        });
        assert_eq!(image.search_hashes(), vec!["r1", "g1", "b1", "n1"]);
        assert_eq!(image.identity(), "r1,g1,b1,n1");
    }
}
