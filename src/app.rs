//! Application wiring for resolving variants from configuration.

use crate::cache::{CacheServices, CacheSettings, VariantCache};
use crate::compression::CompressionPolicy;
use crate::compressor::{CompressorService, TinifyClient};
use crate::coordinator::GenerationStats;
use crate::flush::FlushController;
use crate::models::{
    Asset, AssetRecord, CachedHandle, Config, SourceAsset, TransformDescriptor,
};
use crate::store::{AssetStore, JsonAssetStore};
use crate::transform::{ImageProcessor, TransformRegistry, VariantGenerator};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Manifest file holding source asset records, under the assets root.
pub const MANIFEST_FILE: &str = "assets.json";

/// One variant request: which source, which transform, compress or not.
#[derive(Debug, Clone)]
pub struct VariantRequest {
    pub record: AssetRecord,
    pub descriptor: TransformDescriptor,
    pub compress: bool,
}

/// Coordinates the asset store, flush switch, and variant cache.
pub struct App {
    cache: VariantCache,
    flush: Arc<FlushController>,
    store: Box<dyn AssetStore>,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub registry: Arc<TransformRegistry>,
    pub generator: Arc<dyn VariantGenerator>,
    pub compressor: Option<Arc<dyn CompressorService>>,
    pub store: Box<dyn AssetStore>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(
        services: AppServices,
        settings: CacheSettings,
        compression_timeout: Duration,
    ) -> Self {
        let flush = Arc::new(FlushController::new());
        let cache = VariantCache::new(
            settings,
            CacheServices {
                registry: services.registry,
                generator: services.generator,
                compression: Arc::new(CompressionPolicy::new(
                    services.compressor,
                    compression_timeout,
                )),
                staleness: flush.clone(),
            },
        );

        Self {
            cache,
            flush,
            store: services.store,
        }
    }

    /// Construct an app from environment configuration (`Config::from_env`).
    pub fn new() -> Result<Self> {
        let config = Config::from_env()?;

        let compressor: Option<Arc<dyn CompressorService>> = match &config.tinify_api_key {
            Some(key) => Some(Arc::new(
                TinifyClient::new(key.clone()).with_base_url(config.tinify_base_url.clone()),
            )),
            None => {
                warn!("TINIFY_API_KEY not set - compression requests will be skipped");
                None
            }
        };

        let registry = Arc::new(TransformRegistry::with_defaults());
        let generator = Arc::new(ImageProcessor::new(registry.clone()));
        let store = Box::new(JsonAssetStore::new(
            &config.assets_root.join(MANIFEST_FILE),
        ));

        info!(
            "Assets root: {}, cache root: {}, key mode: {:?}",
            config.assets_root.display(),
            config.cache_root.display(),
            config.cache_key_mode
        );

        let app = Self::with_services(
            AppServices {
                registry,
                generator,
                compressor,
                store,
            },
            CacheSettings {
                assets_root: config.assets_root,
                cache_root: config.cache_root,
                key_mode: config.cache_key_mode,
            },
            config.compression_timeout,
        );

        if config.flush {
            app.flush();
        }
        Ok(app)
    }

    /// Operator trigger: regenerate every variant until restart.
    pub fn flush(&self) {
        self.flush.trigger();
    }

    pub fn is_flushing(&self) -> bool {
        self.flush.is_active()
    }

    pub fn stats(&self) -> GenerationStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &VariantCache {
        &self.cache
    }

    /// Save a source record, keeping any title/parent already stored.
    pub async fn register(&self, record: AssetRecord) -> Result<AssetRecord> {
        let record = match self.store.load(record.id).await? {
            Some(existing) if existing.filename == record.filename => existing,
            _ => {
                self.store.save(&record).await?;
                record
            }
        };
        Ok(record)
    }

    pub async fn persist(&self, asset: &Asset) -> Result<()> {
        asset.persist(self.store.as_ref()).await
    }

    pub async fn run(&self, request: VariantRequest) -> Result<Option<CachedHandle>> {
        let source = SourceAsset::new(request.record);
        source.set_should_compress(request.compress);

        let handle = self.cache.resolve(&source, &request.descriptor).await?;
        match &handle {
            Some(handle) => info!(
                "{} for {} is at {}",
                request.descriptor,
                source.filename().display(),
                handle.full_path().display()
            ),
            None => warn!(
                "No variant produced for {} (asset {})",
                source.filename().display(),
                source.id()
            ),
        }
        Ok(handle)
    }

    /// Remove every cached variant of a stored asset.
    pub async fn purge(&self, id: i64) -> Result<usize> {
        match self.store.load(id).await? {
            Some(record) => self.cache.purge(&SourceAsset::new(record)).await,
            None => Ok(0),
        }
    }
}
