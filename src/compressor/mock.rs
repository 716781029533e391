use super::CompressorService;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct MockCompressor {
    output: Arc<Mutex<Option<Vec<u8>>>>,
    should_fail: Arc<Mutex<bool>>,
    delay: Option<Duration>,
    call_count: Arc<Mutex<usize>>,
}

impl MockCompressor {
    /// Prefix prepended to the input when no fixed output is configured.
    pub const MARKER: &'static [u8] = b"tiny:";

    pub fn new() -> Self {
        Self {
            output: Arc::new(Mutex::new(None)),
            should_fail: Arc::new(Mutex::new(false)),
            delay: None,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_output(self, output: Vec<u8>) -> Self {
        *self.output.lock().unwrap() = Some(output);
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockCompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompressorService for MockCompressor {
    async fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        *self.call_count.lock().unwrap() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if *self.should_fail.lock().unwrap() {
            return Err(Error::Compression("Mock failure".to_string()));
        }

        match self.output.lock().unwrap().clone() {
            Some(output) => Ok(output),
            None => {
                let mut out = Self::MARKER.to_vec();
                out.extend_from_slice(data);
                Ok(out)
            }
        }
    }
}
