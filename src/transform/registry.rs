use super::{check_dimension, dimension, Transform};
use crate::models::TransformArg;
use crate::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::Arc;

const FILTER: FilterType = FilterType::Lanczos3;

/// Name → transform lookup.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in resize/format transforms.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("ScaleWidth", ScaleWidth);
        registry.register("ScaleHeight", ScaleHeight);
        registry.register("Fit", Fit);
        registry.register("Fill", Fill);
        registry.register("Pad", Pad);
        registry.register("Greyscale", Greyscale);
        registry.register("Compressed", Compressed);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, transform: impl Transform + 'static) {
        self.transforms.insert(name.into(), Arc::new(transform));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Transform>> {
        self.transforms
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTransform(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Scale `length` by `to / from`, bounded like any requested dimension.
fn scaled(length: u32, from: u32, to: u32, transform: &str) -> Result<u32> {
    let value = (length as f64 * to as f64 / from.max(1) as f64).round();
    if value > u32::MAX as f64 {
        return check_dimension(u32::MAX, transform);
    }
    check_dimension((value as u32).max(1), transform)
}

/// Resize to a width, keeping the aspect ratio.
pub struct ScaleWidth;

impl Transform for ScaleWidth {
    fn apply(&self, image: DynamicImage, args: &[TransformArg]) -> Result<DynamicImage> {
        let width = dimension(args, 0, "ScaleWidth")?;
        let (w, h) = image.dimensions();
        let height = scaled(h, w, width, "ScaleWidth")?;
        Ok(image.resize_exact(width, height, FILTER))
    }
}

/// Resize to a height, keeping the aspect ratio.
pub struct ScaleHeight;

impl Transform for ScaleHeight {
    fn apply(&self, image: DynamicImage, args: &[TransformArg]) -> Result<DynamicImage> {
        let height = dimension(args, 0, "ScaleHeight")?;
        let (w, h) = image.dimensions();
        let width = scaled(w, h, height, "ScaleHeight")?;
        Ok(image.resize_exact(width, height, FILTER))
    }
}

/// Shrink or grow to fit inside a box, keeping the aspect ratio.
pub struct Fit;

impl Transform for Fit {
    fn apply(&self, image: DynamicImage, args: &[TransformArg]) -> Result<DynamicImage> {
        let width = dimension(args, 0, "Fit")?;
        let height = dimension(args, 1, "Fit")?;
        Ok(image.resize(width, height, FILTER))
    }
}

/// Resize and crop to exactly fill a box.
pub struct Fill;

impl Transform for Fill {
    fn apply(&self, image: DynamicImage, args: &[TransformArg]) -> Result<DynamicImage> {
        let width = dimension(args, 0, "Fill")?;
        let height = dimension(args, 1, "Fill")?;
        Ok(image.resize_to_fill(width, height, FILTER))
    }
}

/// Fit inside a box, then center on a canvas of exactly that size.
///
/// An optional third argument sets the background as `RRGGBB` hex;
/// the default is white.
pub struct Pad;

impl Pad {
    fn background(args: &[TransformArg]) -> Result<Rgba<u8>> {
        let hex = match args.get(2) {
            None => return Ok(Rgba([255, 255, 255, 255])),
            Some(TransformArg::Text(s)) => s.trim_start_matches('#').to_string(),
            Some(TransformArg::Int(v)) => format!("{:06}", v),
            Some(other) => {
                return Err(Error::Transform(format!(
                    "Pad background must be a hex colour, got {:?}",
                    other
                )))
            }
        };

        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Transform(format!(
                "Pad background must be 6 hex digits, got '{}'",
                hex
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::Transform(format!("Invalid hex colour '{}'", hex)))
        };
        Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
    }
}

impl Transform for Pad {
    fn apply(&self, image: DynamicImage, args: &[TransformArg]) -> Result<DynamicImage> {
        let width = dimension(args, 0, "Pad")?;
        let height = dimension(args, 1, "Pad")?;
        let background = Self::background(args)?;

        let fitted = image.resize(width, height, FILTER).to_rgba8();
        let mut canvas = RgbaImage::from_pixel(width, height, background);
        let x = (width - fitted.width()) / 2;
        let y = (height - fitted.height()) / 2;
        image::imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);

        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

pub struct Greyscale;

impl Transform for Greyscale {
    fn apply(&self, image: DynamicImage, _args: &[TransformArg]) -> Result<DynamicImage> {
        Ok(image.grayscale())
    }
}

/// Leaves pixels untouched; the variant exists to be compressed.
pub struct Compressed;

impl Transform for Compressed {
    fn apply(&self, image: DynamicImage, _args: &[TransformArg]) -> Result<DynamicImage> {
        Ok(image)
    }

    fn arms_compression(&self) -> bool {
        true
    }
}
