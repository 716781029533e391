use super::{TransformRegistry, VariantGenerator};
use crate::models::TransformDescriptor;
use crate::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Generates variants with the `image` crate, re-encoding in the source format.
pub struct ImageProcessor {
    registry: Arc<TransformRegistry>,
}

impl ImageProcessor {
    pub fn new(registry: Arc<TransformRegistry>) -> Self {
        Self { registry }
    }

    fn output_format(source: &Path) -> ImageFormat {
        match ImageFormat::from_path(source) {
            Ok(format) if format.can_write() => format,
            _ => ImageFormat::Png,
        }
    }

    fn generate_sync(
        registry: &TransformRegistry,
        data: Vec<u8>,
        format: ImageFormat,
        descriptor: &TransformDescriptor,
    ) -> Result<Vec<u8>> {
        let transform = registry.get(&descriptor.name)?;
        let image = image::load_from_memory(&data)?;
        let output = transform.apply(image, &descriptor.args)?;

        // JPEG has no alpha channel
        let output = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(output.to_rgb8()),
            _ => output,
        };

        let mut bytes = Vec::new();
        output.write_to(&mut Cursor::new(&mut bytes), format)?;
        Ok(bytes)
    }
}

#[async_trait]
impl VariantGenerator for ImageProcessor {
    async fn generate(
        &self,
        source: &Path,
        data: Vec<u8>,
        descriptor: &TransformDescriptor,
    ) -> Result<Vec<u8>> {
        let format = Self::output_format(source);
        tracing::debug!(
            "Generating {} from {} ({} bytes, {:?})",
            descriptor,
            source.display(),
            data.len(),
            format
        );

        tokio::task::spawn_blocking({
            let registry = self.registry.clone();
            let descriptor = descriptor.clone();
            move || Self::generate_sync(&registry, data, format, &descriptor)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Image processing task join error: {}", e)))?
    }
}
