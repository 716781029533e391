use crate::models::{CacheKeyMode, TransformDescriptor};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Directory holding generated variants, beside the source file.
pub const RESAMPLED_DIR: &str = "_resampled";

const DIGEST_LEN: usize = 16;

/// Short hex digest of the source bytes and the transform descriptor.
pub fn content_digest(source_bytes: &[u8], descriptor: &TransformDescriptor) -> String {
    let digest = Sha256::new()
        .chain_update(source_bytes)
        .chain_update([0u8])
        .chain_update(descriptor.fingerprint().as_bytes())
        .finalize();
    let mut hex = format!("{:x}", digest);
    hex.truncate(DIGEST_LEN);
    hex
}

/// Cache path of a variant, relative to the cache root.
///
/// `assets/photos/cat.png` + `ScaleWidth(100)` becomes
/// `assets/photos/_resampled/ScaleWidth100-cat.png`, or
/// `.../ScaleWidth100-<digest>-cat.png` when a digest is supplied.
pub fn variant_relative_path(
    filename: &Path,
    descriptor: &TransformDescriptor,
    digest: Option<&str>,
) -> PathBuf {
    let parent = filename.parent().unwrap_or_else(|| Path::new(""));
    let file = filename
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = match digest {
        Some(digest) => format!("{}-{}-{}", descriptor.variant_name(), digest, file),
        None => format!("{}-{}", descriptor.variant_name(), file),
    };
    parent.join(RESAMPLED_DIR).join(name)
}

/// Whether `candidate` is a variant file name for `source_file`.
pub fn is_variant_of(candidate: &str, source_file: &str) -> bool {
    let Some(prefix) = candidate.strip_suffix(&format!("-{}", source_file)) else {
        return false;
    };

    match prefix.split_once('-') {
        None => !prefix.is_empty(),
        Some((variant, digest)) => {
            !variant.is_empty()
                && digest.len() == DIGEST_LEN
                && digest.chars().all(|c| c.is_ascii_hexdigit())
        }
    }
}

pub fn needs_digest(mode: CacheKeyMode) -> bool {
    matches!(mode, CacheKeyMode::ContentAddressed)
}
