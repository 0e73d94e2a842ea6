//! Persisted wizard state
//!
//! A single JSON document under the temp directory records how far the
//! current session has progressed. There is one session per working
//! directory and no locking: two concurrent invocations against the same
//! file race, and the last writer wins.

use crate::models::Character;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

/// Forward-only wizard progression.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStep {
    #[default]
    Initial,
    InputsCollected,
    ImagesConfirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionState {
    pub step: SessionStep,
    pub run_id: Option<Uuid>,
    pub scenario: Option<String>,
    pub user_photo: Option<PathBuf>,
    pub user_photos: Vec<PathBuf>,
    pub selected_characters: Vec<Character>,
    pub image_count: usize,
    pub generated_images: Vec<PathBuf>,
    pub image_order: Vec<PathBuf>,
    pub confirmed: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            step: SessionStep::Initial,
            run_id: None,
            scenario: None,
            user_photo: None,
            user_photos: Vec::new(),
            selected_characters: Vec::new(),
            image_count: 5,
            generated_images: Vec::new(),
            image_order: Vec::new(),
            confirmed: false,
        }
    }
}

/// Write `value` as pretty JSON via a sibling temp file and rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// The session document together with its backing file.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    state: SessionState,
}

impl Session {
    /// Load the session at `path`; missing or unreadable files yield defaults.
    pub fn load(path: &Path) -> Self {
        let state = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(
                    "Session file {} is corrupted ({}). Starting a fresh session.",
                    path.display(),
                    e
                );
                SessionState::default()
            }),
            Err(_) => SessionState::default(),
        };

        Self {
            path: path.to_path_buf(),
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.state)?;
        debug!("Saved session state to {}", self.path.display());
        Ok(())
    }

    /// Mutate the state and persist it immediately.
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionState),
    {
        f(&mut self.state);
        self.save()
    }

    /// Move to `step`. Going backwards is rejected; staying put is a no-op.
    pub fn advance(&mut self, step: SessionStep) -> Result<()> {
        if step < self.state.step {
            return Err(Error::InvalidInput(format!(
                "Cannot move session from {:?} back to {:?}; delete {} to start over",
                self.state.step,
                step,
                self.path.display()
            )));
        }
        self.update(|state| state.step = step)
    }

    /// Discard all progress, including a confirmation.
    pub fn reset(&mut self) -> Result<()> {
        self.update(|state| *state = SessionState::default())
    }

    /// Record the inputs of a new run and clear the previous run's images.
    pub fn begin_run(
        &mut self,
        scenario: &str,
        photos: &[PathBuf],
        image_count: usize,
    ) -> Result<()> {
        if self.state.step == SessionStep::ImagesConfirmed {
            return Err(Error::InvalidInput(format!(
                "Session already confirmed; delete {} to start a new one",
                self.path.display()
            )));
        }

        let scenario = scenario.to_string();
        let photos = photos.to_vec();
        self.update(|state| {
            state.step = SessionStep::InputsCollected;
            state.run_id = Some(Uuid::new_v4());
            state.scenario = Some(scenario);
            state.user_photo = photos.first().cloned();
            state.user_photos = photos;
            state.selected_characters.clear();
            state.image_count = image_count;
            state.generated_images.clear();
            state.image_order.clear();
        })
    }

    pub fn set_selected_characters(&mut self, characters: Vec<Character>) -> Result<()> {
        self.update(|state| state.selected_characters = characters)
    }

    pub fn record_generated(&mut self, path: PathBuf) -> Result<()> {
        self.update(|state| state.generated_images.push(path))
    }

    /// Snapshot the generation order as the initial display order.
    pub fn finalize_order(&mut self) -> Result<()> {
        self.update(|state| state.image_order = state.generated_images.clone())
    }

    /// Images as shown to the user: `image_order`, or generation order
    /// before it is set.
    pub fn display_order(&self) -> &[PathBuf] {
        if self.state.image_order.is_empty() {
            &self.state.generated_images
        } else {
            &self.state.image_order
        }
    }

    /// Reorder by a permutation of 0-based positions in [`display_order`](Self::display_order).
    pub fn reorder(&mut self, permutation: &[usize]) -> Result<()> {
        let images = self.display_order();
        let mut seen = vec![false; images.len()];
        if permutation.len() != images.len() {
            return Err(Error::InvalidInput(format!(
                "Order must include all {} images exactly once",
                images.len()
            )));
        }
        for &idx in permutation {
            match seen.get_mut(idx) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "Invalid or repeated image number {}",
                        idx + 1
                    )))
                }
            }
        }

        let order: Vec<PathBuf> = permutation.iter().map(|&i| images[i].clone()).collect();
        self.update(|state| state.image_order = order)
    }

    /// Mark the generated images as accepted. Irreversible.
    pub fn confirm(&mut self) -> Result<()> {
        if self.state.generated_images.is_empty() {
            return Err(Error::InvalidInput(
                "No generated images to confirm".to_string(),
            ));
        }
        self.state.confirmed = true;
        self.advance(SessionStep::ImagesConfirmed)
    }
}
