//! Remote image compression
//!
//! Sends encoded images to the Tinify (TinyPNG) API and returns the
//! compressed bytes. The service is a black box with its own quotas and
//! failure modes; callers decide what to do when it fails.

pub mod client;
pub mod mime;
pub mod mock;

pub use client::TinifyClient;
pub use mock::MockCompressor;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CompressorService: Send + Sync {
    async fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
}
