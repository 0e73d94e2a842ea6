use super::{GenerationRequest, GenerationResult, ImageGenerationService};
use crate::config::Config;
use crate::error::GenerationFailure;
use crate::image::ImageValidator;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Option<Vec<ImageDatum>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// Human-readable text of an API error object.
fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => {
            let message = fields.get("message").and_then(Value::as_str);
            let code = fields.get("code").and_then(Value::as_str);
            match (code, message) {
                (Some(code), Some(message)) => format!("{}: {}", code, message),
                (None, Some(message)) => message.to_string(),
                (Some(code), None) => code.to_string(),
                (None, None) => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Client for the real `images/generations` endpoint.
pub struct SeedreamClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    images_dir: PathBuf,
    validator: ImageValidator,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl SeedreamClient {
    pub fn new(
        api_key: Option<String>,
        endpoint: impl Into<String>,
        images_dir: &Path,
        validator: ImageValidator,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: endpoint.into(),
            images_dir: images_dir.to_path_buf(),
            validator,
            request_timeout: REQUEST_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api_key().map(str::to_string),
            config.api.image_generation_url.clone(),
            &config.images_dir(),
            ImageValidator::new(false),
        )
    }

    pub fn with_timeouts(mut self, request: Duration, download: Duration) -> Self {
        self.request_timeout = request;
        self.download_timeout = download;
        self
    }

    async fn submit(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationFailure> {
        debug!(
            "POST {} (size {}, {} reference image(s), prompt {} chars)",
            self.endpoint,
            request.size,
            request.image.as_ref().map_or(0, |images| images.len()),
            request.prompt.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send generation request: {}", e);
                GenerationFailure::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;
        let parsed = serde_json::from_str::<GenerationResponse>(&body);

        if !status.is_success() {
            return Err(match parsed.ok().and_then(|r| r.error) {
                Some(err) => GenerationFailure::Remote(format!(
                    "status {}: {}",
                    status,
                    error_message(&err)
                )),
                None => GenerationFailure::Transport(format!(
                    "HTTP {}: {}",
                    status,
                    truncate(&body, 200)
                )),
            });
        }

        parsed.map_err(|e| {
            GenerationFailure::MalformedResponse(format!("invalid JSON body ({})", e))
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, GenerationFailure> {
        debug!("Downloading generated image from {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationFailure::Transport(format!(
                "image download returned HTTP {}",
                status
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn image_bytes(
        &self,
        response: GenerationResponse,
    ) -> Result<Vec<u8>, GenerationFailure> {
        if let Some(err) = response.error {
            return Err(GenerationFailure::Remote(error_message(&err)));
        }

        let datum = response
            .data
            .and_then(|data| data.into_iter().next())
            .ok_or_else(|| {
                GenerationFailure::MalformedResponse("no data in response".to_string())
            })?;

        if let Some(err) = datum.error {
            return Err(GenerationFailure::Remote(error_message(&err)));
        }
        if let Some(b64) = datum.b64_json {
            return base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|e| {
                    GenerationFailure::MalformedResponse(format!("invalid base64 image: {}", e))
                });
        }
        if let Some(url) = datum.url {
            return self.download(&url).await;
        }
        Err(GenerationFailure::MalformedResponse(
            "image entry has neither b64_json nor url".to_string(),
        ))
    }

    async fn store(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, GenerationFailure> {
        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|e| GenerationFailure::Storage(e.to_string()))?;
        let path = self.images_dir.join(format!("{}.jpg", filename));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| GenerationFailure::Storage(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }
}

#[async_trait]
impl ImageGenerationService for SeedreamClient {
    async fn generate(&self, request: &GenerationRequest, filename: &str) -> GenerationResult {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationFailure::MissingCredential)?;

        let response = self.submit(api_key, request).await?;
        let bytes = self.image_bytes(response).await?;
        let path = self.store(&bytes, filename).await?;

        if !self.validator.check(&path).await {
            warn!("Generated image failed quality check: {}", path.display());
            return Err(GenerationFailure::QualityRejected(path));
        }

        info!("Generated: {}", path.display());
        Ok(path)
    }
}
