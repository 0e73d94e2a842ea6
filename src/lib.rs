//! AI photo studio - turns user photos into generated portraits
//!
//! Each scenario (movie-character cameos, styled portraits, couple and family
//! shots, free-form prompts, template-driven edits, fusions, series and
//! posters) is planned into a list of units, composed into prompts and sent
//! one by one to a Seedream-compatible image generation API.

pub mod ai;
pub mod catalog;
pub mod config;
pub mod error;
pub mod image;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod scenarios;
pub mod session;

pub use error::{Error, Result};
