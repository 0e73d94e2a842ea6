//! Reference photo normalization before upload.

use super::write_jpeg;
use crate::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAX_DIMENSION: u32 = 2048;
const JPEG_QUALITY: u8 = 95;

pub struct PhotoPreprocessor {
    output_dir: PathBuf,
    max_dimension: u32,
}

impl PhotoPreprocessor {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            max_dimension: MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    fn decode_oriented(input: &Path) -> Result<DynamicImage> {
        let mut decoder = ImageReader::open(input)?
            .with_guessed_format()?
            .into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);
        Ok(image)
    }

    fn prepare_sync(input: &Path, output: &Path, max_dimension: u32) -> Result<()> {
        let image = Self::decode_oriented(input)?;
        let (width, height) = (image.width(), image.height());

        let image = if width.max(height) > max_dimension {
            let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
            info!(
                "Resized {}: {}x{} -> {}x{}",
                input.display(),
                width,
                height,
                resized.width(),
                resized.height()
            );
            resized
        } else {
            debug!("{} is {}x{}, no resize needed", input.display(), width, height);
            image
        };

        write_jpeg(&image.to_rgb8(), output, JPEG_QUALITY)
    }

    /// Normalize `input` into `output`. On any failure the original path is
    /// returned so the run can continue with the unmodified photo.
    pub async fn prepare(&self, input: &Path, output: &Path) -> PathBuf {
        let result = tokio::task::spawn_blocking({
            let input = input.to_path_buf();
            let output = output.to_path_buf();
            let max_dimension = self.max_dimension;
            move || Self::prepare_sync(&input, &output, max_dimension)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Preprocessing task join error: {}", e)))
        .and_then(|result| result);

        match result {
            Ok(()) => {
                info!("Photo ready: {}", output.display());
                output.to_path_buf()
            }
            Err(e) => {
                warn!(
                    "Failed to preprocess {} ({}). Using original photo.",
                    input.display(),
                    e
                );
                input.to_path_buf()
            }
        }
    }

    /// Output path for the photo at `index` out of `total`.
    pub fn output_path(&self, index: usize, total: usize) -> PathBuf {
        if total == 1 {
            self.output_dir.join("processed_user_photo.jpg")
        } else {
            self.output_dir
                .join(format!("processed_user_photo_{:02}.jpg", index))
        }
    }

    /// Prepare every photo in order; the result has the same length as `photos`.
    pub async fn prepare_all(&self, photos: &[PathBuf]) -> Vec<PathBuf> {
        let mut prepared = Vec::with_capacity(photos.len());
        for (index, photo) in photos.iter().enumerate() {
            debug!("Preprocessing photo {}/{}", index + 1, photos.len());
            let output = self.output_path(index, photos.len());
            prepared.push(self.prepare(photo, &output).await);
        }
        prepared
    }
}
