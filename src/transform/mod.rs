//! Image transforms and variant generation
//!
//! Transforms are looked up by name in an explicit [`TransformRegistry`] and
//! receive typed arguments. A [`VariantGenerator`] turns the bytes of a source
//! file plus a [`TransformDescriptor`] into the encoded bytes of the variant.

pub mod mock;
pub mod processor;
pub mod registry;

pub use mock::MockGenerator;
pub use processor::ImageProcessor;
pub use registry::TransformRegistry;

use crate::models::{TransformArg, TransformDescriptor};
use crate::{Error, Result};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::Path;

pub trait Transform: Send + Sync {
    fn apply(&self, image: DynamicImage, args: &[TransformArg]) -> Result<DynamicImage>;

    /// Variants produced by this transform are always sent to the compressor.
    fn arms_compression(&self) -> bool {
        false
    }
}

/// Largest width or height a transform may produce.
pub const MAX_DIMENSION: u32 = 8192;

#[async_trait]
pub trait VariantGenerator: Send + Sync {
    /// `source` names the file `data` was read from; it only selects the
    /// output encoding.
    async fn generate(
        &self,
        source: &Path,
        data: Vec<u8>,
        descriptor: &TransformDescriptor,
    ) -> Result<Vec<u8>>;
}

/// Read a pixel dimension in `1..=MAX_DIMENSION` at `index`.
pub(crate) fn dimension(args: &[TransformArg], index: usize, transform: &str) -> Result<u32> {
    let arg = args.get(index).ok_or_else(|| {
        Error::Transform(format!("{} expects an argument at position {}", transform, index))
    })?;

    match arg.as_u32() {
        Some(v) if v > 0 => check_dimension(v, transform),
        _ => Err(Error::Transform(format!(
            "{} argument {} must be a positive integer, got {:?}",
            transform, index, arg
        ))),
    }
}

/// Reject output sizes the encoder would have to allocate a huge canvas for.
pub(crate) fn check_dimension(value: u32, transform: &str) -> Result<u32> {
    if value > MAX_DIMENSION {
        return Err(Error::Transform(format!(
            "{} would produce {} pixels on one side, the limit is {}",
            transform, value, MAX_DIMENSION
        )));
    }
    Ok(value)
}
