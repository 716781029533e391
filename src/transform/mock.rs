use super::VariantGenerator;
use crate::models::TransformDescriptor;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counting generator whose output is derived from the source bytes.
#[derive(Clone)]
pub struct MockGenerator {
    generate_count: Arc<Mutex<usize>>,
    delay: Option<Duration>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            generate_count: Arc::new(Mutex::new(0)),
            delay: None,
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_generate_count(&self) -> usize {
        *self.generate_count.lock().unwrap()
    }

    /// Bytes produced for a given source and descriptor.
    pub fn expected_output(source_bytes: &[u8], descriptor: &TransformDescriptor) -> Vec<u8> {
        let mut out = format!("{}|", descriptor.fingerprint()).into_bytes();
        out.extend_from_slice(source_bytes);
        out
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VariantGenerator for MockGenerator {
    async fn generate(
        &self,
        _source: &Path,
        data: Vec<u8>,
        descriptor: &TransformDescriptor,
    ) -> Result<Vec<u8>> {
        *self.generate_count.lock().unwrap() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if *self.should_fail.lock().unwrap() {
            return Err(Error::Transform("Mock failure".to_string()));
        }

        Ok(Self::expected_output(&data, descriptor))
    }
}
