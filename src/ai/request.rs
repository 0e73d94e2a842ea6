//! Wire payload for `images/generations`.

use crate::error::GenerationFailure;
use crate::models::ImageSize;
use crate::prompts::ComposedPrompt;
use base64::Engine as _;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reference images: one photo travels as a bare string, several as a list.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ReferenceImages {
    Single(String),
    Multiple(Vec<String>),
}

impl ReferenceImages {
    /// `None` for an empty list.
    pub fn from_data_uris(mut uris: Vec<String>) -> Option<Self> {
        match uris.len() {
            0 => None,
            1 => uris.pop().map(Self::Single),
            _ => Some(Self::Multiple(uris)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(uris) => uris.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ReferenceImages>,
    pub size: String,
    pub negative_prompt: String,
    pub sequential_image_generation: String,
    pub response_format: String,
    pub watermark: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationRequest {
    pub fn size(&self) -> Option<ImageSize> {
        self.size.parse().ok()
    }
}

/// MIME type from the leading bytes; preprocessed photos are JPEG.
fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => {
            warn!(
                "Unrecognized image format (first bytes: {:02X?}), sending as image/jpeg",
                &bytes[..bytes.len().min(4)]
            );
            "image/jpeg"
        }
    }
}

/// Read `path` and return it as a `data:` URI.
pub fn encode_reference_image(path: &Path) -> Result<String, GenerationFailure> {
    let bytes = std::fs::read(path).map_err(|e| {
        GenerationFailure::InvalidReferenceImage(format!("{}: {}", path.display(), e))
    })?;
    if bytes.is_empty() {
        return Err(GenerationFailure::InvalidReferenceImage(format!(
            "{}: empty file",
            path.display()
        )));
    }
    let mime = sniff_mime(&bytes);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    model: String,
    size: ImageSize,
}

impl RequestBuilder {
    pub fn new(model: impl Into<String>, size: ImageSize) -> Self {
        Self {
            model: model.into(),
            size,
        }
    }

    pub fn build(
        &self,
        composed: &ComposedPrompt,
        photos: &[PathBuf],
        seed: Option<u64>,
    ) -> Result<GenerationRequest, GenerationFailure> {
        let uris = photos
            .iter()
            .map(|photo| encode_reference_image(photo))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GenerationRequest {
            model: self.model.clone(),
            prompt: composed.prompt.clone(),
            image: ReferenceImages::from_data_uris(uris),
            size: self.size.to_string(),
            negative_prompt: composed.negative_prompt.clone(),
            sequential_image_generation: "disabled".to_string(),
            response_format: "b64_json".to_string(),
            watermark: false,
            seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn composed() -> ComposedPrompt {
        ComposedPrompt {
            prompt: "a portrait".to_string(),
            negative_prompt: "blurry".to_string(),
        }
    }

    fn write_jpeg_bytes(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]).unwrap();
        path
    }

    #[test]
    fn test_single_photo_is_scalar() {
        let dir = TempDir::new().unwrap();
        let photo = write_jpeg_bytes(&dir, "a.jpg");
        let builder = RequestBuilder::new("model-x", ImageSize::new(1440, 2560));

        let request = builder.build(&composed(), &[photo], Some(7)).unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert!(json["image"].is_string());
        assert!(json["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(json["size"], "1440x2560");
        assert_eq!(json["seed"], 7);
        assert_eq!(json["watermark"], false);
        assert_eq!(json["response_format"], "b64_json");
        assert_eq!(json["sequential_image_generation"], "disabled");
        assert!(json.get("guidance_scale").is_none());
    }

    #[test]
    fn test_multiple_photos_are_ordered_list() {
        let dir = TempDir::new().unwrap();
        let first = write_jpeg_bytes(&dir, "a.jpg");
        let second = dir.path().join("b.png");
        std::fs::write(&second, [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
        let builder = RequestBuilder::new("model-x", ImageSize::new(2048, 2048));

        let request = builder.build(&composed(), &[first, second], None).unwrap();
        let json = serde_json::to_value(&request).unwrap();

        let images = json["image"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].as_str().unwrap().starts_with("data:image/jpeg"));
        assert!(images[1].as_str().unwrap().starts_with("data:image/png"));
        assert!(json.get("seed").is_none());
    }

    #[test]
    fn test_no_photos_omits_image() {
        let builder = RequestBuilder::new("model-x", ImageSize::new(1728, 2304));
        let request = builder.build(&composed(), &[], None).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("image").is_none());
        assert_eq!(request.size(), Some(ImageSize::new(1728, 2304)));
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(
            sniff_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            "image/png"
        );
        assert_eq!(
            sniff_mime(&[
                0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50
            ]),
            "image/webp"
        );
        assert_eq!(sniff_mime(&[0x00, 0x01, 0x02]), "image/jpeg");
        assert_eq!(sniff_mime(&[]), "image/jpeg");
    }

    #[test]
    fn test_unreadable_photo_is_invalid_reference() {
        let dir = TempDir::new().unwrap();
        let builder = RequestBuilder::new("model-x", ImageSize::new(512, 512));
        let err = builder
            .build(&composed(), &[dir.path().join("missing.jpg")], None)
            .unwrap_err();
        assert!(matches!(err, GenerationFailure::InvalidReferenceImage(_)));
    }
}
