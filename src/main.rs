use anyhow::Result;
use clap::Parser;
use image_variant_cache::app::{App, VariantRequest};
use image_variant_cache::models::{AssetRecord, CachedHandle, TransformArg, TransformDescriptor};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "variant-cache")]
#[command(about = "Generate, compress, and cache image variants")]
struct CliArgs {
    /// Source image path, relative to ASSETS_ROOT.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Transform name, e.g. ScaleWidth, Fit, Fill, Pad, Greyscale, Compressed.
    #[arg(value_name = "TRANSFORM")]
    transform: String,

    /// Transform arguments, e.g. `200 100`.
    #[arg(value_name = "ARGS", value_parser = parse_transform_arg, allow_negative_numbers = true)]
    args: Vec<TransformArg>,

    /// Asset id of the source image.
    #[arg(long, default_value_t = 1)]
    id: i64,

    /// Title copied onto the cached handle.
    #[arg(long, default_value = "")]
    title: String,

    /// Parent folder id copied onto the cached handle.
    #[arg(long, default_value_t = 0)]
    parent_id: i64,

    /// Send the generated variant through the compression API.
    #[arg(long)]
    compress: bool,

    /// Regenerate even if a cached variant exists.
    #[arg(long)]
    flush: bool,
}

fn parse_transform_arg(input: &str) -> std::result::Result<TransformArg, String> {
    if input.trim().is_empty() {
        return Err("Transform arguments must not be empty".to_string());
    }
    Ok(TransformArg::parse(input))
}

async fn resolve(
    app: &App,
    request: VariantRequest,
) -> image_variant_cache::Result<Option<CachedHandle>> {
    let record = app.register(request.record.clone()).await?;
    app.run(VariantRequest { record, ..request }).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_variant_cache=info,variant_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let app = match App::new() {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };
    if args.flush {
        app.flush();
    }

    let record = AssetRecord::new(args.id, args.file)
        .with_title(args.title)
        .with_parent_id(args.parent_id);
    let request = VariantRequest {
        record,
        descriptor: TransformDescriptor::new(args.transform, args.args),
        compress: args.compress,
    };

    match resolve(&app, request).await {
        Ok(Some(handle)) => {
            println!("{}", handle.full_path().display());
            info!(
                "Generations: {}, coalesced: {}",
                app.stats().generations,
                app.stats().coalesced_requests
            );
            Ok(())
        }
        Ok(None) => {
            error!("No variant produced: source missing, transform unknown, or generation failed");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Variant generation failed: {}", e);
            std::process::exit(1);
        }
    }
}
