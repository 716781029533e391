use image::ImageFormat;
use image_variant_cache::{
    app::{App, AppServices, VariantRequest},
    cache::{CacheServices, CacheSettings, VariantCache},
    compression::CompressionPolicy,
    compressor::{CompressorService, MockCompressor, TinifyClient},
    flush::FlushController,
    models::{Asset, AssetRecord, CacheKeyMode, SourceAsset, TransformArg, TransformDescriptor},
    store::{AssetStore, JsonAssetStore, MemoryAssetStore},
    transform::{ImageProcessor, MockGenerator, TransformRegistry, VariantGenerator},
    Error,
};
use pretty_assertions::assert_eq;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn red_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(10, 10, image::Rgba([255, 0, 0, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn real_cache(
    root: &Path,
    compressor: Arc<dyn CompressorService>,
    flush: Arc<FlushController>,
) -> (VariantCache, Arc<ImageProcessor>) {
    let registry = Arc::new(TransformRegistry::with_defaults());
    let generator = Arc::new(ImageProcessor::new(registry.clone()));
    let cache = VariantCache::new(
        CacheSettings {
            assets_root: root.to_path_buf(),
            cache_root: root.to_path_buf(),
            key_mode: CacheKeyMode::ContentAddressed,
        },
        CacheServices {
            registry,
            generator: generator.clone(),
            compression: Arc::new(CompressionPolicy::new(
                Some(compressor),
                Duration::from_secs(5),
            )),
            staleness: flush,
        },
    );
    (cache, generator)
}

fn scale(width: i64) -> TransformDescriptor {
    TransformDescriptor::new("ScaleWidth", vec![TransformArg::Int(width)])
}

/// Compressor rejects a 10x10 red PNG: the cached file is exactly the
/// uncompressed generator output and a handle is still returned.
#[tokio::test]
async fn test_compression_failure_serves_uncompressed_variant() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("red.png"), red_png()).unwrap();

    let compressor = MockCompressor::new().with_failure(true);
    let (cache, generator) = real_cache(
        dir.path(),
        Arc::new(compressor.clone()),
        Arc::new(FlushController::new()),
    );

    let asset = SourceAsset::new(AssetRecord::new(1, "red.png"));
    asset.set_should_compress(true);
    let handle = cache.resolve(&asset, &scale(10)).await.unwrap().unwrap();

    let expected = generator
        .generate(&dir.path().join("red.png"), red_png(), &scale(10))
        .await
        .unwrap();
    assert_eq!(std::fs::read(handle.full_path()).unwrap(), expected);
    assert_eq!(compressor.get_call_count(), 1);
    assert!(!asset.should_compress());
}

#[tokio::test]
async fn test_tinify_outage_falls_back_to_uncompressed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/shrink"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "Unauthorized",
            "message": "Credentials are invalid"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("red.png"), red_png()).unwrap();
    let tinify = TinifyClient::new("bad-key".to_string())
        .with_base_url(server.uri())
        .with_retry(0, Duration::from_millis(1));
    let (cache, generator) = real_cache(
        dir.path(),
        Arc::new(tinify),
        Arc::new(FlushController::new()),
    );

    let asset = SourceAsset::new(AssetRecord::new(1, "red.png"));
    asset.set_should_compress(true);
    let handle = cache.resolve(&asset, &scale(5)).await.unwrap().unwrap();

    let expected = generator
        .generate(&dir.path().join("red.png"), red_png(), &scale(5))
        .await
        .unwrap();
    assert_eq!(std::fs::read(handle.full_path()).unwrap(), expected);
}

#[tokio::test]
async fn test_tinify_success_replaces_variant() {
    let server = MockServer::start().await;
    let compressed = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x42];
    Mock::given(method("POST"))
        .and(path("/shrink"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "input": { "size": 80, "type": "image/png" },
            "output": {
                "size": 9, "type": "image/png", "width": 5, "height": 5, "ratio": 0.1,
                "url": format!("{}/output/xyz", server.uri())
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/output/xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(compressed.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("red.png"), red_png()).unwrap();
    let tinify = TinifyClient::new("key".to_string()).with_base_url(server.uri());
    let (cache, _) = real_cache(
        dir.path(),
        Arc::new(tinify),
        Arc::new(FlushController::new()),
    );

    let asset = SourceAsset::new(AssetRecord::new(1, "red.png"));
    asset.set_should_compress(true);
    let first = cache.resolve(&asset, &scale(5)).await.unwrap().unwrap();
    assert_eq!(std::fs::read(first.full_path()).unwrap(), compressed);

    // Warm cache: same path, no second upload (the mock expects exactly one).
    asset.set_should_compress(true);
    let second = cache.resolve(&asset, &scale(5)).await.unwrap().unwrap();
    assert_eq!(first.full_path(), second.full_path());
}

/// Bad arguments and undecodable sources degrade to "no variant" and
/// publish nothing.
#[tokio::test]
async fn test_generation_failures_serve_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("red.png"), red_png()).unwrap();
    std::fs::write(dir.path().join("broken.png"), b"not an image").unwrap();
    let (cache, _) = real_cache(
        dir.path(),
        Arc::new(MockCompressor::new()),
        Arc::new(FlushController::new()),
    );

    let red = SourceAsset::new(AssetRecord::new(1, "red.png"));
    assert!(cache.resolve(&red, &scale(0)).await.unwrap().is_none());
    let huge = TransformDescriptor::new(
        "Pad",
        vec![TransformArg::Int(100_000), TransformArg::Int(100_000)],
    );
    assert!(cache.resolve(&red, &huge).await.unwrap().is_none());
    let bad_background = TransformDescriptor::new(
        "Pad",
        vec![
            TransformArg::Int(8),
            TransformArg::Int(8),
            TransformArg::Text("aéb12".into()),
        ],
    );
    assert!(cache.resolve(&red, &bad_background).await.unwrap().is_none());

    let broken = SourceAsset::new(AssetRecord::new(2, "broken.png"));
    assert!(cache.resolve(&broken, &scale(4)).await.unwrap().is_none());

    let resampled = dir.path().join("_resampled");
    let published = std::fs::read_dir(&resampled)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(published, 0);
}

#[tokio::test]
async fn test_concurrent_cold_requests_through_app() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cat.png"), b"cat").unwrap();
    let generator = MockGenerator::new().with_delay(Duration::from_millis(50));
    let compressor = MockCompressor::new();

    let app = Arc::new(App::with_services(
        AppServices {
            registry: Arc::new(TransformRegistry::with_defaults()),
            generator: Arc::new(generator.clone()),
            compressor: Some(Arc::new(compressor.clone())),
            store: Box::new(MemoryAssetStore::new()),
        },
        CacheSettings {
            assets_root: dir.path().to_path_buf(),
            cache_root: dir.path().to_path_buf(),
            key_mode: CacheKeyMode::Filename,
        },
        Duration::from_secs(5),
    ));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                app.run(VariantRequest {
                    record: AssetRecord::new(1, "cat.png"),
                    descriptor: TransformDescriptor::new(
                        "Fill",
                        vec![TransformArg::Int(8), TransformArg::Int(8)],
                    ),
                    compress: true,
                })
                .await
            })
        })
        .collect();

    let mut paths = Vec::new();
    for task in tasks {
        paths.push(task.await.unwrap().unwrap().unwrap().full_path().to_path_buf());
    }

    assert_eq!(generator.get_generate_count(), 1);
    assert_eq!(compressor.get_call_count(), 1);
    assert!(paths.iter().all(|p| p == &paths[0]));
    assert_eq!(app.stats().total_requests, 16);
}

#[tokio::test]
async fn test_flush_regenerates_existing_variant() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("red.png"), red_png()).unwrap();
    let flush = Arc::new(FlushController::new());
    let (cache, _) = real_cache(dir.path(), Arc::new(MockCompressor::new()), flush.clone());
    let asset = SourceAsset::new(AssetRecord::new(1, "red.png"));

    let handle = cache.resolve(&asset, &scale(4)).await.unwrap().unwrap();
    std::fs::write(handle.full_path(), b"tampered").unwrap();

    // Without a flush the tampered file is served as-is.
    cache.resolve(&asset, &scale(4)).await.unwrap();
    assert_eq!(std::fs::read(handle.full_path()).unwrap(), b"tampered");

    flush.trigger();
    cache.resolve(&asset, &scale(4)).await.unwrap();
    let regenerated = std::fs::read(handle.full_path()).unwrap();
    assert!(image::load_from_memory(&regenerated).is_ok());
    assert_eq!(cache.stats().generations, 2);
}

#[tokio::test]
async fn test_cached_handle_never_reaches_json_store() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("red.png"), red_png()).unwrap();
    let (cache, _) = real_cache(
        dir.path(),
        Arc::new(MockCompressor::new()),
        Arc::new(FlushController::new()),
    );
    let store = JsonAssetStore::new(&dir.path().join("assets.json"));

    let live = Asset::Live(SourceAsset::new(
        AssetRecord::new(1, "red.png").with_title("Red"),
    ));
    live.persist(&store).await.unwrap();

    let source = SourceAsset::new(AssetRecord::new(1, "red.png").with_title("Red"));
    let handle = cache.resolve(&source, &scale(4)).await.unwrap().unwrap();
    assert_eq!(handle.title(), "Red");
    let cached = Asset::Cached(handle);
    assert_eq!(cached.id(), -1);

    for _ in 0..10 {
        assert!(matches!(
            cached.persist(&store).await,
            Err(Error::CachedWriteBack(_))
        ));
    }

    let stored = store.load(1).await.unwrap().unwrap();
    assert_eq!(stored.filename, Path::new("red.png"));
    assert_eq!(store.load(-1).await.unwrap(), None);
}
