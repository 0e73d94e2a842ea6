//! Image generation API integration
//!
//! Talks to a Seedream-compatible `images/generations` endpoint, or to an
//! offline mock that produces placeholder images, behind one trait.

pub mod client;
pub mod mock;
pub mod request;

pub use client::SeedreamClient;
pub use mock::MockGenerationClient;
pub use request::{GenerationRequest, ReferenceImages, RequestBuilder};

use crate::error::GenerationFailure;
use async_trait::async_trait;
use std::path::PathBuf;

/// Path of the stored image, or why the unit failed.
pub type GenerationResult = std::result::Result<PathBuf, GenerationFailure>;

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Generate one image and store it as `{filename}.jpg` in the images directory.
    async fn generate(&self, request: &GenerationRequest, filename: &str) -> GenerationResult;
}
