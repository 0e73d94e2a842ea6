//! Image processing and quality checks
//!
//! Reference photos are normalized before upload; generated images must
//! pass a size and sharpness gate before they count as a success.

pub mod preprocess;
pub mod validator;

pub use preprocess::PhotoPreprocessor;
pub use validator::ImageValidator;

use crate::Result;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Encode `image` as a JPEG file at `path`.
pub(crate) fn write_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    image.write_with_encoder(encoder)?;
    writer.flush()?;
    Ok(())
}
