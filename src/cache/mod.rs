//! Variant cache
//!
//! Maps a source asset plus a transform descriptor to a file under the cache
//! root. An entry is fresh when the file exists and no flush is active;
//! anything else is regenerated through the [`GenerationCoordinator`].
//!
//! `resolve` writes files as a side effect of what looks like a read.

pub mod key;

use crate::compression::CompressionPolicy;
use crate::coordinator::{GenerationCoordinator, GenerationJob, GenerationStats, GenerationWork};
use crate::flush::Staleness;
use crate::models::{CacheKeyMode, CachedHandle, SourceAsset, TransformDescriptor};
use crate::transform::{TransformRegistry, VariantGenerator};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Filesystem layout of the cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub assets_root: PathBuf,
    pub cache_root: PathBuf,
    pub key_mode: CacheKeyMode,
}

/// Collaborators injected into [`VariantCache`].
pub struct CacheServices {
    pub registry: Arc<TransformRegistry>,
    pub generator: Arc<dyn VariantGenerator>,
    pub compression: Arc<CompressionPolicy>,
    pub staleness: Arc<dyn Staleness>,
}

pub struct VariantCache {
    settings: CacheSettings,
    registry: Arc<TransformRegistry>,
    generator: Arc<dyn VariantGenerator>,
    compression: Arc<CompressionPolicy>,
    staleness: Arc<dyn Staleness>,
    coordinator: Arc<GenerationCoordinator>,
}

impl VariantCache {
    pub fn new(settings: CacheSettings, services: CacheServices) -> Self {
        Self {
            settings,
            registry: services.registry,
            generator: services.generator,
            compression: services.compression,
            staleness: services.staleness,
            coordinator: Arc::new(GenerationCoordinator::new()),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn stats(&self) -> GenerationStats {
        self.coordinator.stats()
    }

    /// Cache path of a variant, relative to the cache root.
    pub async fn cache_path_for(
        &self,
        asset: &SourceAsset,
        descriptor: &TransformDescriptor,
    ) -> Result<PathBuf> {
        let source = self.read_source_for_key(asset).await?;
        Ok(self.relative_path(asset, descriptor, source.as_deref()))
    }

    /// Source bytes, read only when the key mode hashes them.
    async fn read_source_for_key(&self, asset: &SourceAsset) -> Result<Option<Vec<u8>>> {
        if !key::needs_digest(self.settings.key_mode) {
            return Ok(None);
        }
        let source = tokio::fs::read(asset.full_path(&self.settings.assets_root)).await?;
        Ok(Some(source))
    }

    fn relative_path(
        &self,
        asset: &SourceAsset,
        descriptor: &TransformDescriptor,
        source: Option<&[u8]>,
    ) -> PathBuf {
        let digest = source.map(|bytes| key::content_digest(bytes, descriptor));
        key::variant_relative_path(asset.filename(), descriptor, digest.as_deref())
    }

    /// Return a handle to the cached variant, generating it if needed.
    ///
    /// Returns `Ok(None)` when the asset has no identity or backing file, when
    /// the transform is unknown, or when the variant could not be produced.
    /// Nothing is published in the last case. Compression failures still
    /// yield the uncompressed variant.
    pub async fn resolve(
        &self,
        asset: &SourceAsset,
        descriptor: &TransformDescriptor,
    ) -> Result<Option<CachedHandle>> {
        // One-shot: disarmed whatever happens below.
        let compress_requested = asset.take_should_compress();

        if !asset.exists(&self.settings.assets_root) {
            debug!(
                "Skipping {} for asset {} ({}): no backing file",
                descriptor,
                asset.id(),
                asset.filename().display()
            );
            return Ok(None);
        }

        let transform = match self.registry.get(&descriptor.name) {
            Ok(transform) => transform,
            Err(e) => {
                warn!("Skipping variant for {}: {}", asset.filename().display(), e);
                return Ok(None);
            }
        };
        let compress = compress_requested || transform.arms_compression();

        // The digest and the generator must see the same bytes.
        let source_bytes = match self.read_source_for_key(asset).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    "Failed to read {} for {}: {}",
                    asset.filename().display(),
                    descriptor,
                    e
                );
                return Ok(None);
            }
        };
        let relative = self.relative_path(asset, descriptor, source_bytes.as_deref());
        let full = self.settings.cache_root.join(&relative);
        let stale = self.staleness.is_stale();

        if !stale {
            match tokio::fs::try_exists(&full).await {
                Ok(true) => {
                    debug!("Cache hit for {}", relative.display());
                    return Ok(Some(CachedHandle::new(relative, full, asset)));
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to check cached variant {}: {}", relative.display(), e);
                    return Ok(None);
                }
            }
        }

        let label = relative.display().to_string();
        let work: GenerationWork = {
            let generator = self.generator.clone();
            let compression = self.compression.clone();
            let source = asset.full_path(&self.settings.assets_root);
            let descriptor = descriptor.clone();
            let label = label.clone();
            Box::pin(async move {
                let data = match source_bytes {
                    Some(data) => data,
                    None => tokio::fs::read(&source).await?,
                };
                let bytes = generator.generate(&source, data, &descriptor).await?;
                if compress {
                    Ok(compression.apply(&label, bytes).await)
                } else {
                    Ok(bytes)
                }
            })
        };

        let generated = self
            .coordinator
            .ensure_generated(GenerationJob {
                target: full.clone(),
                label,
                force: stale,
                work,
            })
            .await;

        if let Err(e) = generated {
            error!(
                "No variant served for {} ({}): {}",
                asset.filename().display(),
                descriptor,
                e
            );
            return Ok(None);
        }

        Ok(Some(CachedHandle::new(relative, full, asset)))
    }

    /// Delete every cached variant of `asset`. Returns the number removed.
    pub async fn purge(&self, asset: &SourceAsset) -> Result<usize> {
        let Some(source_file) = asset.filename().file_name() else {
            return Ok(0);
        };
        let source_file = source_file.to_string_lossy().into_owned();
        let parent = asset.filename().parent().unwrap_or_else(|| Path::new(""));
        let dir = self.settings.cache_root.join(parent).join(key::RESAMPLED_DIR);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if key::is_variant_of(&name, &source_file) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        info!(
            "Purged {} cached variants of {}",
            removed,
            asset.filename().display()
        );
        Ok(removed)
    }
}
