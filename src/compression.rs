//! Post-generation compression step.
//!
//! Compression is best effort: any failure leaves the generated bytes as
//! they were and is only logged.

use crate::compressor::CompressorService;
use crate::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct CompressionPolicy {
    compressor: Option<Arc<dyn CompressorService>>,
    timeout: Duration,
}

impl CompressionPolicy {
    pub fn new(compressor: Option<Arc<dyn CompressorService>>, timeout: Duration) -> Self {
        Self {
            compressor,
            timeout,
        }
    }

    /// A policy that can never compress; armed requests pass through.
    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.compressor.is_some()
    }

    /// Compress `bytes`, falling back to the input on any failure.
    pub async fn apply(&self, label: &str, bytes: Vec<u8>) -> Vec<u8> {
        let Some(compressor) = &self.compressor else {
            warn!("[{}] Compression requested but no API key is configured", label);
            return bytes;
        };

        let result = match tokio::time::timeout(self.timeout, compressor.compress(&bytes)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CompressionTimeout(self.timeout)),
        };

        match result {
            Ok(compressed) => {
                info!(
                    "[{}] Compressed {} bytes to {} bytes",
                    label,
                    bytes.len(),
                    compressed.len()
                );
                compressed
            }
            Err(e) => {
                error!("[{}] Image compression failed: {}", label, e);
                bytes
            }
        }
    }
}
