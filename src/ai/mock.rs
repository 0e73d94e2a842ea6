use super::{GenerationRequest, GenerationResult, ImageGenerationService};
use crate::config::Config;
use crate::error::GenerationFailure;
use crate::image::write_jpeg;
use crate::models::ImageSize;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

const MOCK_DELAY: Duration = Duration::from_millis(500);
const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([200, 150, 100]);
const FALLBACK_SIZE: ImageSize = ImageSize {
    width: 1024,
    height: 1024,
};

/// Offline stand-in for the generation API.
///
/// Copies a matching file from the sample directory when one exists,
/// otherwise writes a solid placeholder of the requested size.
#[derive(Clone)]
pub struct MockGenerationClient {
    images_dir: PathBuf,
    samples_dir: Option<PathBuf>,
    delay: Duration,
    call_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
    failures: Arc<Mutex<Vec<String>>>,
}

impl MockGenerationClient {
    pub fn new(images_dir: &Path) -> Self {
        Self {
            images_dir: images_dir.to_path_buf(),
            samples_dir: None,
            delay: MOCK_DELAY,
            call_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = Self::new(&config.images_dir());
        if config.mock.use_sample_images {
            client.with_samples_dir(&config.sample_images_dir())
        } else {
            client
        }
    }

    pub fn with_samples_dir(mut self, dir: &Path) -> Self {
        self.samples_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every call whose filename contains `pattern`.
    pub fn with_failure(self, pattern: &str) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pattern.to_string());
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received so far, in call order.
    pub fn get_requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most specific sample for `filename`: the full name first, then
    /// with trailing `_segment`s removed one at a time.
    fn find_sample(&self, filename: &str) -> Option<PathBuf> {
        let dir = self.samples_dir.as_ref()?;
        let mut stem = filename;
        loop {
            let candidate = dir.join(format!("{}.jpg", stem));
            if candidate.is_file() {
                return Some(candidate);
            }
            stem = &stem[..stem.rfind('_')?];
        }
    }

    async fn synthesize(&self, size: ImageSize, output: &Path) -> Result<(), GenerationFailure> {
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let image = RgbImage::from_pixel(size.width, size.height, PLACEHOLDER_COLOR);
            write_jpeg(&image, &output, 90)
        })
        .await
        .map_err(|e| GenerationFailure::Storage(format!("placeholder task failed: {}", e)))?
        .map_err(|e| GenerationFailure::Storage(e.to_string()))
    }
}

#[async_trait]
impl ImageGenerationService for MockGenerationClient {
    async fn generate(&self, request: &GenerationRequest, filename: &str) -> GenerationResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|pattern| filename.contains(pattern.as_str()));
        if should_fail {
            return Err(GenerationFailure::Remote(format!(
                "Mock failure for {}",
                filename
            )));
        }

        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|e| GenerationFailure::Storage(e.to_string()))?;
        let output = self.images_dir.join(format!("{}.jpg", filename));

        match self.find_sample(filename) {
            Some(sample) => {
                debug!("Using sample image {}", sample.display());
                tokio::fs::copy(&sample, &output)
                    .await
                    .map_err(|e| GenerationFailure::Storage(e.to_string()))?;
            }
            None => {
                let size = request.size().unwrap_or(FALLBACK_SIZE);
                self.synthesize(size, &output).await?;
            }
        }

        info!("[mock] Generated: {}", output.display());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::RequestBuilder;
    use crate::prompts::ComposedPrompt;
    use tempfile::TempDir;

    fn request(size: ImageSize) -> GenerationRequest {
        let composed = ComposedPrompt {
            prompt: "mock".to_string(),
            negative_prompt: "none".to_string(),
        };
        RequestBuilder::new("mock-model", size)
            .build(&composed, &[], None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_synthesizes_placeholder_of_requested_size() {
        let dir = TempDir::new().unwrap();
        let client = MockGenerationClient::new(dir.path()).with_delay(Duration::ZERO);

        let path = client
            .generate(&request(ImageSize::new(64, 32)), "celebrity_thor_000")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("celebrity_thor_000.jpg"));
        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (64, 32));
        assert_eq!(client.get_call_count(), 1);
        assert_eq!(client.get_requests()[0].prompt, "mock");
    }

    #[tokio::test]
    async fn test_copies_most_specific_sample() {
        let dir = TempDir::new().unwrap();
        let samples = TempDir::new().unwrap();
        std::fs::write(samples.path().join("celebrity_thor.jpg"), b"thor sample").unwrap();
        std::fs::write(samples.path().join("celebrity.jpg"), b"generic sample").unwrap();

        let client = MockGenerationClient::new(dir.path())
            .with_samples_dir(samples.path())
            .with_delay(Duration::ZERO);

        let thor = client
            .generate(&request(FALLBACK_SIZE), "celebrity_thor_000_20260101_120000")
            .await
            .unwrap();
        assert_eq!(std::fs::read(thor).unwrap(), b"thor sample");

        let hulk = client
            .generate(&request(FALLBACK_SIZE), "celebrity_hulk_001_20260101_120000")
            .await
            .unwrap();
        assert_eq!(std::fs::read(hulk).unwrap(), b"generic sample");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let dir = TempDir::new().unwrap();
        let client = MockGenerationClient::new(dir.path())
            .with_delay(Duration::ZERO)
            .with_failure("hulk");

        let err = client
            .generate(&request(ImageSize::new(8, 8)), "celebrity_hulk_000")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationFailure::Remote(_)));
        assert!(client
            .generate(&request(ImageSize::new(8, 8)), "celebrity_thor_001")
            .await
            .is_ok());
        assert_eq!(client.get_call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_delay() {
        let dir = TempDir::new().unwrap();
        let client = MockGenerationClient::new(dir.path());
        let start = tokio::time::Instant::now();
        client
            .generate(&request(ImageSize::new(8, 8)), "delayed")
            .await
            .unwrap();
        assert!(start.elapsed() >= MOCK_DELAY);
    }
}
