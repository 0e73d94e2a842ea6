//! Error handling and custom error types
//!
//! Two layers: [`GenerationFailure`] is the per-unit outcome taxonomy that the
//! orchestrator downgrades to "this unit failed", while [`Error`] covers
//! conditions that stop a command before or outside a batch.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single generation unit did not produce a usable image.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationFailure {
    #[error("API credentials not configured (set ARK_API_KEY)")]
    MissingCredential,

    #[error("Invalid reference image: {0}")]
    InvalidReferenceImage(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("API error: {0}")]
    Remote(String),

    #[error("Image failed quality check: {}", .0.display())]
    QualityRejected(PathBuf),

    #[error("Template field missing: {0}")]
    TemplateFieldMissing(String),

    #[error("Failed to store image: {0}")]
    Storage(String),
}

impl GenerationFailure {
    /// Short tag used in summaries and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidReferenceImage(_) => "invalid_reference_image",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Remote(_) => "remote_error",
            Self::QualityRejected(_) => "quality_rejected",
            Self::TemplateFieldMissing(_) => "template_field_missing",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<reqwest::Error> for GenerationFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("API credentials not configured. Please set ARK_API_KEY before running.")]
    MissingCredential,

    #[error(transparent)]
    Generation(#[from] GenerationFailure),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_tags_are_distinct() {
        let failures = [
            GenerationFailure::MissingCredential,
            GenerationFailure::InvalidReferenceImage(String::new()),
            GenerationFailure::Timeout(String::new()),
            GenerationFailure::Transport(String::new()),
            GenerationFailure::MalformedResponse(String::new()),
            GenerationFailure::Remote(String::new()),
            GenerationFailure::QualityRejected(PathBuf::new()),
            GenerationFailure::TemplateFieldMissing(String::new()),
            GenerationFailure::Storage(String::new()),
        ];
        let mut tags: Vec<_> = failures.iter().map(|f| f.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), failures.len());
    }

    #[test]
    fn test_generation_failure_wraps_into_error() {
        let err: Error = GenerationFailure::TemplateFieldMissing("season".to_string()).into();
        assert_eq!(err.to_string(), "Template field missing: season");
    }
}
