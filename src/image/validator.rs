//! Quality gate for generated images.

use image::{DynamicImage, GrayImage, ImageReader};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const MIN_DIMENSION: u32 = 512;
pub const MIN_SHARPNESS: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct ImageValidator {
    mock_mode: bool,
    min_dimension: u32,
    min_sharpness: f64,
}

impl ImageValidator {
    pub fn new(mock_mode: bool) -> Self {
        Self {
            mock_mode,
            min_dimension: MIN_DIMENSION,
            min_sharpness: MIN_SHARPNESS,
        }
    }

    pub fn passes_sharpness(&self, variance: f64) -> bool {
        variance >= self.min_sharpness
    }

    /// Whether the image at `path` is large and sharp enough to keep.
    pub fn validate(&self, path: &Path) -> bool {
        if self.mock_mode {
            return true;
        }

        let image = match open_by_content(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Cannot read generated image {}: {}", path.display(), e);
                return false;
            }
        };

        let (width, height) = (image.width(), image.height());
        if width < self.min_dimension || height < self.min_dimension {
            warn!("Image too small: {}x{}", width, height);
            return false;
        }

        let variance = laplacian_variance(&image.to_luma8());
        if !self.passes_sharpness(variance) {
            warn!(
                "Image may be blurry: variance={:.2} (threshold: {})",
                variance, self.min_sharpness
            );
            return false;
        }
        true
    }

    /// [`validate`](Self::validate) on the blocking pool.
    pub async fn check(&self, path: &Path) -> bool {
        let validator = self.clone();
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || validator.validate(&path))
            .await
            .unwrap_or_else(|e| {
                warn!("Validation task failed: {}", e);
                false
            })
    }
}

/// Decode by sniffing the bytes; generated files may not match their extension.
fn open_by_content(path: &Path) -> crate::Result<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Index into `0..len` mirroring at the edges without repeating the edge
/// pixel (`-1 -> 1`, `len -> len - 2`).
fn reflect101(index: i64, len: i64) -> u32 {
    if len == 1 {
        return 0;
    }
    let mut i = index;
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * (len - 1) - i;
    }
    i as u32
}

/// Variance of the 3x3 Laplacian `[0,1,0; 1,-4,1; 0,1,0]` over the image.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let (w, h) = (i64::from(width), i64::from(height));
    let px = |x: i64, y: i64| f64::from(gray.get_pixel(reflect101(x, w), reflect101(y, h))[0]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..h {
        for x in 0..w {
            let value =
                px(x, y - 1) + px(x - 1, y) + px(x + 1, y) + px(x, y + 1) - 4.0 * px(x, y);
            sum += value;
            sum_sq += value * value;
        }
    }

    let n = (w * h) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
