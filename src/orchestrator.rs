//! Batch generation driver
//!
//! Runs every unit of a [`GenerationJob`] strictly in order: compose the
//! prompt, build the request, submit it, record the result in the session.
//! A failed unit is reported and skipped; the batch always runs to the end.

use crate::ai::{
    GenerationResult, ImageGenerationService, MockGenerationClient, RequestBuilder, SeedreamClient,
};
use crate::config::{Config, SESSION_FILE};
use crate::error::GenerationFailure;
use crate::image::PhotoPreprocessor;
use crate::models::{slugify, Character, GenerationUnit, ImageSize, ScenarioId};
use crate::prompts::PromptComposer;
use crate::session::Session;
use crate::Result;
use chrono::Local;
use rand::Rng;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_SEED: u64 = 2_147_483_647;

/// Everything needed to run one batch.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub scenario: ScenarioId,
    pub units: Vec<GenerationUnit>,
    pub photos: Vec<PathBuf>,
    pub size: ImageSize,
}

/// How far a unit got before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnitStage {
    Pending,
    Composed,
    Built,
    Submitted,
    Succeeded,
    Failed,
}

impl fmt::Display for UnitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Composed => "composed",
            Self::Built => "built",
            Self::Submitted => "submitted",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedUnit {
    pub name: String,
    /// Last stage reached before the failure.
    pub stage: UnitStage,
    pub reason: GenerationFailure,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<FailedUnit>,
}

impl GenerationReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Injectable service bundle used to construct an [`Orchestrator`] in tests.
pub struct OrchestratorServices {
    pub generator: Box<dyn ImageGenerationService>,
    pub preprocessor: PhotoPreprocessor,
}

pub struct Orchestrator {
    generator: Box<dyn ImageGenerationService>,
    preprocessor: PhotoPreprocessor,
    composer: PromptComposer,
    model: String,
    random_seed: bool,
    delay: Duration,
    temp_dir: PathBuf,
}

impl Orchestrator {
    /// Orchestrator backed by the real API, or by the mock in mock mode.
    pub fn new(config: &Config) -> Self {
        let generator: Box<dyn ImageGenerationService> = if config.mock_enabled() {
            info!("Mock mode enabled - no API calls will be made");
            Box::new(MockGenerationClient::from_config(config))
        } else {
            info!(
                "Image model: {} ({})",
                config.generation.image_model, config.api.image_generation_url
            );
            Box::new(SeedreamClient::from_config(config))
        };

        Self::with_services(
            OrchestratorServices {
                generator,
                preprocessor: PhotoPreprocessor::new(&config.temp_dir()),
            },
            config,
        )
    }

    pub fn with_services(services: OrchestratorServices, config: &Config) -> Self {
        Self {
            generator: services.generator,
            preprocessor: services.preprocessor,
            composer: PromptComposer::new(),
            model: config.generation.image_model.clone(),
            random_seed: config.generation.random_seed,
            delay: config.request_delay(),
            temp_dir: config.temp_dir(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run every unit of `job` in order, recording progress in `session`.
    ///
    /// Unit failures end up in the report; only session persistence errors
    /// abort the batch.
    pub async fn run(
        &self,
        job: &GenerationJob,
        session: &mut Session,
    ) -> Result<GenerationReport> {
        let total = job.units.len();
        info!(
            "Starting {} generation: {} image(s) at {}",
            job.scenario, total, job.size
        );

        session.begin_run(job.scenario.as_str(), &job.photos, total)?;
        let photos = self.preprocessor.prepare_all(&job.photos).await;

        let characters: Vec<Character> = job
            .units
            .iter()
            .filter_map(|unit| match unit {
                GenerationUnit::Character(character) => Some(character.clone()),
                _ => None,
            })
            .collect();
        if !characters.is_empty() {
            session.set_selected_characters(characters)?;
        }

        let builder = RequestBuilder::new(self.model.clone(), job.size);
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut report = GenerationReport::default();

        for (index, unit) in job.units.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                debug!("Waiting {:?} before next request", self.delay);
                tokio::time::sleep(self.delay).await;
            }

            let filename = format!(
                "{}_{}_{:03}_{}",
                job.scenario,
                slugify(unit.label()),
                index,
                timestamp
            );
            info!("Generating image {}/{}: {}", index + 1, total, unit.label());

            let mut stage = UnitStage::Pending;
            match self
                .run_unit(unit, &photos, &builder, &filename, &mut stage)
                .await
            {
                Ok(path) => {
                    session.record_generated(path.clone())?;
                    report.succeeded.push(path);
                }
                Err(reason) => {
                    error!(
                        "Failed to generate {} at stage {} [{}]: {}",
                        unit.label(),
                        stage,
                        reason.tag(),
                        reason
                    );
                    report.failed.push(FailedUnit {
                        name: unit.label().to_string(),
                        stage,
                        reason,
                    });
                }
            }
        }

        info!(
            "Generation complete: {}/{} succeeded",
            report.succeeded.len(),
            total
        );
        if !report.failed.is_empty() {
            warn!("Failed for: {}", report.failed_names().join(", "));
        }

        session.finalize_order()?;
        Ok(report)
    }

    async fn run_unit(
        &self,
        unit: &GenerationUnit,
        photos: &[PathBuf],
        builder: &RequestBuilder,
        filename: &str,
        stage: &mut UnitStage,
    ) -> GenerationResult {
        let composed = self.composer.compose(unit, photos.len())?;
        *stage = UnitStage::Composed;
        debug!("Prompt for {}: {}", unit.label(), composed.prompt);

        let seed = self
            .random_seed
            .then(|| rand::thread_rng().gen_range(0..=MAX_SEED));
        let request = builder.build(&composed, photos, seed)?;
        *stage = UnitStage::Built;

        *stage = UnitStage::Submitted;
        let path = self.generator.generate(&request, filename).await?;
        *stage = UnitStage::Succeeded;
        Ok(path)
    }

    /// Delete every file in the temp directory except the session file.
    pub fn cleanup_temp_files(&self) -> usize {
        cleanup_dir(&self.temp_dir)
    }
}

fn cleanup_dir(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Nothing to clean in {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || entry.file_name() == SESSION_FILE {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not delete {}: {}", path.display(), e),
        }
    }
    if removed > 0 {
        info!("Cleaned up {} temporary file(s)", removed);
    }
    removed
}
