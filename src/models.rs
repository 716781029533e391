//! Data models and structures
//!
//! Defines source assets, typed transform descriptors, read-only cached
//! handles, configuration, and the Tinify API response shapes.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Asset id carried by every [`CachedHandle`]. Never a valid store id.
pub const CACHED_ASSET_ID: i64 = -1;

/// The persistable part of a source image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetRecord {
    pub id: i64,
    pub filename: PathBuf,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parent_id: i64,
}

impl AssetRecord {
    pub fn new(id: i64, filename: impl Into<PathBuf>) -> Self {
        Self {
            id,
            filename: filename.into(),
            title: String::new(),
            parent_id: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_parent_id(mut self, parent_id: i64) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// A live source image plus its one-shot compression request.
#[derive(Debug)]
pub struct SourceAsset {
    record: AssetRecord,
    should_compress: AtomicBool,
}

impl SourceAsset {
    pub fn new(record: AssetRecord) -> Self {
        Self {
            record,
            should_compress: AtomicBool::new(false),
        }
    }

    pub fn record(&self) -> &AssetRecord {
        &self.record
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn filename(&self) -> &Path {
        &self.record.filename
    }

    pub fn full_path(&self, assets_root: &Path) -> PathBuf {
        assets_root.join(&self.record.filename)
    }

    /// Has a valid identity and a backing file on disk.
    pub fn exists(&self, assets_root: &Path) -> bool {
        self.record.id > 0
            && !self.record.filename.as_os_str().is_empty()
            && self.full_path(assets_root).is_file()
    }

    /// Arm (or disarm) compression for the next variant request.
    pub fn set_should_compress(&self, should_compress: bool) -> &Self {
        self.should_compress.store(should_compress, Ordering::SeqCst);
        self
    }

    pub fn should_compress(&self) -> bool {
        self.should_compress.load(Ordering::SeqCst)
    }

    /// Read and disarm the compression request in one step.
    pub fn take_should_compress(&self) -> bool {
        self.should_compress.swap(false, Ordering::SeqCst)
    }
}

/// A single typed transform parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformArg {
    Int(i64),
    Float(f64),
    Text(String),
}

impl TransformArg {
    /// Parse a CLI-style argument, preferring integers, then floats.
    pub fn parse(input: &str) -> Self {
        if let Ok(v) = input.parse::<i64>() {
            TransformArg::Int(v)
        } else if let Ok(v) = input.parse::<f64>() {
            TransformArg::Float(v)
        } else {
            TransformArg::Text(input.to_string())
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            TransformArg::Int(v) => u32::try_from(*v).ok(),
            TransformArg::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as u32),
            _ => None,
        }
    }

    fn type_tag(&self) -> &'static str {
        match self {
            TransformArg::Int(_) => "i",
            TransformArg::Float(_) => "f",
            TransformArg::Text(_) => "s",
        }
    }
}

impl fmt::Display for TransformArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Keep '-' out of file names; it separates name parts.
            TransformArg::Int(v) => write!(f, "{}", v.to_string().replace('-', "n")),
            TransformArg::Float(v) => write!(f, "{}", v.to_string().replace('-', "n")),
            TransformArg::Text(s) => {
                let cleaned: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
                write!(f, "{}", cleaned)
            }
        }
    }
}

/// Transform name plus ordered arguments, e.g. `Fit(200, 100)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDescriptor {
    pub name: String,
    #[serde(default)]
    pub args: Vec<TransformArg>,
}

impl TransformDescriptor {
    pub fn new(name: impl Into<String>, args: Vec<TransformArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Filename-safe variant name: `ScaleWidth100`, `Fit200x100`.
    pub fn variant_name(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        format!("{}{}", self.name, args.join("x"))
    }

    /// Unambiguous encoding used when hashing the descriptor.
    pub fn fingerprint(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| match a {
                TransformArg::Text(s) => format!("{}:{}", a.type_tag(), s),
                _ => format!("{}:{}", a.type_tag(), a),
            })
            .collect();
        format!("{}({})", self.name, args.join(","))
    }
}

impl fmt::Display for TransformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

/// Display fields copied from the source when a handle is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayMetadata {
    pub title: String,
    pub parent_id: i64,
}

/// Read-only view over a materialised variant file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedHandle {
    relative_path: PathBuf,
    full_path: PathBuf,
    metadata: DisplayMetadata,
}

impl CachedHandle {
    pub(crate) fn new(relative_path: PathBuf, full_path: PathBuf, source: &SourceAsset) -> Self {
        Self {
            relative_path,
            full_path,
            metadata: DisplayMetadata {
                title: source.record.title.clone(),
                parent_id: source.record.parent_id,
            },
        }
    }

    pub fn id(&self) -> i64 {
        CACHED_ASSET_ID
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn parent_id(&self) -> i64 {
        self.metadata.parent_id
    }

    pub fn metadata(&self) -> &DisplayMetadata {
        &self.metadata
    }

    pub fn exists(&self) -> bool {
        self.full_path.is_file()
    }
}

/// Either a persisted source image or a cache-only derived view.
#[derive(Debug)]
pub enum Asset {
    Live(SourceAsset),
    Cached(CachedHandle),
}

impl Asset {
    pub fn id(&self) -> i64 {
        match self {
            Asset::Live(source) => source.id(),
            Asset::Cached(handle) => handle.id(),
        }
    }

    /// Write a live asset to the store. Cached views always fail.
    pub async fn persist(&self, store: &dyn crate::store::AssetStore) -> Result<()> {
        match self {
            Asset::Live(source) => store.save(source.record()).await,
            Asset::Cached(handle) => {
                tracing::error!(
                    "Refusing to persist cached image {}",
                    handle.relative_path().display()
                );
                Err(Error::CachedWriteBack(handle.relative_path().to_path_buf()))
            }
        }
    }
}

// Tinify API response models
#[derive(Debug, Deserialize)]
pub struct ShrinkResponse {
    pub input: ShrinkInput,
    pub output: ShrinkOutput,
}

#[derive(Debug, Deserialize)]
pub struct ShrinkInput {
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ShrinkOutput {
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub ratio: Option<f64>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TinifyErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKeyMode {
    /// Key includes a hash of the source bytes, so edits invalidate variants.
    #[default]
    ContentAddressed,
    /// Legacy naming by filename only; a replaced source keeps stale variants.
    Filename,
}

impl CacheKeyMode {
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "content" | "content-addressed" | "hash" => Ok(CacheKeyMode::ContentAddressed),
            "filename" | "legacy" => Ok(CacheKeyMode::Filename),
            other => Err(Error::Config(format!(
                "Invalid CACHE_KEY_MODE '{}'. Expected 'content' or 'filename'",
                other
            ))),
        }
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub tinify_api_key: Option<String>,
    pub tinify_base_url: String,
    pub assets_root: PathBuf,
    pub cache_root: PathBuf,
    pub compression_timeout: Duration,
    pub cache_key_mode: CacheKeyMode,
    pub flush: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let assets_root =
            PathBuf::from(std::env::var("ASSETS_ROOT").unwrap_or_else(|_| "assets".to_string()));
        let cache_root = std::env::var("CACHE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| assets_root.clone());

        let compression_timeout = match std::env::var("COMPRESSION_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                Error::Config(format!("Invalid COMPRESSION_TIMEOUT_SECS '{}'", raw))
            })?),
            Err(_) => Duration::from_secs(30),
        };

        let cache_key_mode = match std::env::var("CACHE_KEY_MODE") {
            Ok(raw) => CacheKeyMode::parse(&raw)?,
            Err(_) => CacheKeyMode::default(),
        };

        Ok(Self {
            tinify_api_key: std::env::var("TINIFY_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            tinify_base_url: std::env::var("TINIFY_BASE_URL")
                .unwrap_or_else(|_| "https://api.tinify.com".to_string()),
            assets_root,
            cache_root,
            compression_timeout,
            cache_key_mode,
            flush: std::env::var("FLUSH")
                .map(|v| matches!(v.trim(), "1" | "true" | "all"))
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_name_formats() {
        let scale = TransformDescriptor::new("ScaleWidth", vec![TransformArg::Int(100)]);
        assert_eq!(scale.variant_name(), "ScaleWidth100");

        let fit = TransformDescriptor::new(
            "Fit",
            vec![TransformArg::Int(200), TransformArg::Int(100)],
        );
        assert_eq!(fit.variant_name(), "Fit200x100");

        let grey = TransformDescriptor::new("Greyscale", vec![]);
        assert_eq!(grey.variant_name(), "Greyscale");
    }

    #[test]
    fn test_fingerprint_distinguishes_arg_types() {
        let int = TransformDescriptor::new("Pad", vec![TransformArg::Int(1)]);
        let text = TransformDescriptor::new("Pad", vec![TransformArg::Text("1".into())]);
        assert_eq!(int.variant_name(), text.variant_name());
        assert_ne!(int.fingerprint(), text.fingerprint());
    }

    #[test]
    fn test_transform_arg_parse() {
        assert_eq!(TransformArg::parse("120"), TransformArg::Int(120));
        assert_eq!(TransformArg::parse("0.5"), TransformArg::Float(0.5));
        assert_eq!(
            TransformArg::parse("center"),
            TransformArg::Text("center".into())
        );
        assert_eq!(TransformArg::Int(-3).as_u32(), None);
    }

    #[test]
    fn test_take_should_compress_disarms() {
        let asset = SourceAsset::new(AssetRecord::new(1, "a.png"));
        assert!(!asset.take_should_compress());

        asset.set_should_compress(true);
        assert!(asset.should_compress());
        assert!(asset.take_should_compress());
        assert!(!asset.should_compress());
        assert!(!asset.take_should_compress());
    }

    #[test]
    fn test_source_exists_requires_id_and_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();

        assert!(SourceAsset::new(AssetRecord::new(1, "a.png")).exists(dir.path()));
        assert!(!SourceAsset::new(AssetRecord::new(0, "a.png")).exists(dir.path()));
        assert!(!SourceAsset::new(AssetRecord::new(1, "")).exists(dir.path()));
        assert!(!SourceAsset::new(AssetRecord::new(1, "missing.png")).exists(dir.path()));
    }

    #[test]
    fn test_cache_key_mode_parse() {
        assert_eq!(
            CacheKeyMode::parse("filename").unwrap(),
            CacheKeyMode::Filename
        );
        assert_eq!(
            CacheKeyMode::parse("Content").unwrap(),
            CacheKeyMode::ContentAddressed
        );
        assert!(CacheKeyMode::parse("mtime").is_err());
    }

    #[test]
    fn test_shrink_response_deserializes() {
        let json = r#"{
            "input": {"size": 207565, "type": "image/png"},
            "output": {"size": 63669, "type": "image/png", "width": 400, "height": 400,
                       "ratio": 0.3067, "url": "https://api.tinify.com/output/abc"}
        }"#;
        let parsed: ShrinkResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.input.size, 207565);
        assert_eq!(parsed.output.mime_type, "image/png");
        assert_eq!(
            parsed.output.url.as_deref(),
            Some("https://api.tinify.com/output/abc")
        );
    }
}
