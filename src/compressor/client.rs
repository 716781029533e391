use super::mime::detect_image_mime;
use super::CompressorService;
use crate::models::{ShrinkResponse, TinifyErrorBody};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

const DEFAULT_BASE_URL: &str = "https://api.tinify.com";

pub struct TinifyClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry_interval: Duration,
    retry_attempts: usize,
}

impl TinifyClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_client(api_key, Client::new())
    }

    pub fn new_with_client(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_interval: Duration::from_millis(1000),
            retry_attempts: 2,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Retry transient failures `attempts` extra times, `interval` apart.
    pub fn with_retry(mut self, attempts: usize, interval: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_interval = interval;
        self
    }

    async fn error_from_response(response: Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<TinifyErrorBody>(&body) {
            Ok(parsed) => format!("{}: {}", parsed.error, parsed.message),
            Err(_) => body,
        };

        tracing::error!("Tinify API error (status {}): {}", status, detail);
        if status == StatusCode::TOO_MANY_REQUESTS {
            Error::QuotaExceeded(detail)
        } else {
            Error::CompressionApi {
                status: status.as_u16(),
                message: detail,
            }
        }
    }

    /// Upload the image; returns the URL of the compressed output.
    async fn shrink(&self, data: &[u8]) -> Result<String> {
        let url = format!("{}/shrink", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Tinify: {}", e);
                e
            })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        let parsed: ShrinkResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Tinify response: {}\nBody: {}", e, body);
            Error::Compression(format!("Failed to parse Tinify response: {}", e))
        })?;

        tracing::debug!(
            "Tinify shrank {} bytes ({}) to {} bytes ({})",
            parsed.input.size,
            parsed.input.mime_type,
            parsed.output.size,
            parsed.output.mime_type
        );

        parsed.output.url.or(location).ok_or_else(|| {
            Error::Compression("Tinify response carried no output location".to_string())
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let bytes = response.bytes().await?.to_vec();
        if detect_image_mime(&bytes).is_none() {
            return Err(Error::Compression(format!(
                "Tinify returned {} bytes that are not an image",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    async fn compress_once(&self, data: &[u8]) -> Result<Vec<u8>> {
        let output_url = self.shrink(data).await?;
        self.download(&output_url).await
    }
}

#[async_trait]
impl CompressorService for TinifyClient {
    async fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let strategy = FixedInterval::new(self.retry_interval).take(self.retry_attempts);

        RetryIf::spawn(
            strategy,
            move || async move {
                self.compress_once(data).await.map_err(|e| {
                    if e.is_transient() {
                        tracing::warn!("Tinify request failed: {}. Will retry...", e);
                    }
                    e
                })
            },
            |e: &Error| e.is_transient(),
        )
        .await
    }
}
