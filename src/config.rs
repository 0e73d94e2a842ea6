//! Configuration loading and persistence
//!
//! `config.json` lives in the working directory and is created with defaults
//! on first use. Credentials and the mock switch come from the environment
//! (optionally via `.env`), never from the file.

use crate::models::{Character, ImageSize};
use crate::session::write_json_atomic;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "config.json";
pub const SESSION_FILE: &str = "generation_state.json";
pub const API_KEY_VAR: &str = "ARK_API_KEY";
pub const MOCK_VAR: &str = "MOCK_API";

const DEFAULT_ENDPOINT: &str = "https://ark.cn-beijing.volces.com/api/v3/images/generations";
const DEFAULT_MODEL: &str = "doubao-seedream-4-5-251128";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub image_generation_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            image_generation_url: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathSettings {
    pub temp_dir: String,
    pub output_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            temp_dir: "temp".to_string(),
            output_dir: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub default_image_count: usize,
    /// Upper bound for any requested image count.
    pub max_image_count: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub image_model: String,
    pub request_delay_secs: f64,
    pub random_seed: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            default_image_count: 5,
            max_image_count: 10,
            image_width: 2048,
            image_height: 2048,
            image_model: DEFAULT_MODEL.to_string(),
            request_delay_secs: 2.0,
            random_seed: true,
        }
    }
}

impl GenerationSettings {
    /// Resolve a requested count against the default and `max_image_count`.
    pub fn clamp_count(&self, requested: Option<usize>, default: usize) -> usize {
        requested
            .unwrap_or(default)
            .clamp(1, self.max_image_count.max(1))
    }

    pub fn image_size(&self) -> ImageSize {
        ImageSize::new(self.image_width, self.image_height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MockSettings {
    pub enabled: bool,
    pub use_sample_images: bool,
    pub sample_images_dir: String,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            use_sample_images: true,
            sample_images_dir: "mock_samples".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioSettings {
    pub default_scenario: String,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            default_scenario: "celebrity".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct EnvOverrides {
    api_key: Option<String>,
    mock_api: bool,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_VAR)
                .ok()
                .filter(|key| !key.trim().is_empty()),
            mock_api: std::env::var(MOCK_VAR)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub mock: MockSettings,
    #[serde(default)]
    pub scenarios: ScenarioSettings,
    /// User-added characters, listed before the bundled defaults.
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(skip)]
    base_dir: PathBuf,
    #[serde(skip)]
    env: EnvOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            paths: PathSettings::default(),
            generation: GenerationSettings::default(),
            mock: MockSettings::default(),
            scenarios: ScenarioSettings::default(),
            characters: Vec::new(),
            base_dir: PathBuf::from("."),
            env: EnvOverrides::default(),
        }
    }
}

impl Config {
    /// Load `config.json` from `base_dir` and apply environment overrides.
    ///
    /// A missing file is created with defaults. A corrupt file is reported and
    /// replaced in memory by defaults but left untouched on disk.
    pub fn load(base_dir: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = base_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            match Self::read(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "Config file {} is corrupted ({}). Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            let config = Self::default();
            write_json_atomic(&path, &config)?;
            info!("Created default configuration at {}", path.display());
            config
        };

        config.base_dir = base_dir.to_path_buf();
        config.env = EnvOverrides::from_env();
        config.ensure_directories()?;
        Ok(config)
    }

    /// Defaults rooted at `base_dir` with no environment applied.
    pub fn for_dir(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            ..Self::default()
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.config_path(), self)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(self.temp_dir())?;
        fs::create_dir_all(self.images_dir())?;
        Ok(())
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.env.api_key = api_key;
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.env.api_key.as_deref()
    }

    pub fn mock_enabled(&self) -> bool {
        self.env.mock_api || self.mock.enabled
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    fn resolve(&self, value: &str) -> PathBuf {
        let path = Path::new(value);
        if value.is_empty() {
            self.base_dir.clone()
        } else if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.resolve(&self.paths.temp_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.paths.output_dir)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir().join("images")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    pub fn sample_images_dir(&self) -> PathBuf {
        self.resolve(&self.mock.sample_images_dir)
    }

    pub fn session_path(&self) -> PathBuf {
        self.temp_dir().join(SESSION_FILE)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.generation.request_delay_secs.max(0.0))
    }

    /// Append a custom character and persist the config.
    pub fn add_character(
        &mut self,
        name: &str,
        prompt: &str,
        scene: Option<String>,
    ) -> Result<Character> {
        let character = Character::new(
            name,
            prompt,
            scene.or_else(|| Some("movie theater setting, cinematic photo".to_string())),
        );
        self.characters.push(character.clone());
        self.save()?;
        Ok(character)
    }

    /// Update one `section.key` setting from its string form and persist.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid value '{}' for {}", value, key)))
        }

        match key {
            "api.image_generation_url" => self.api.image_generation_url = value.to_string(),
            "paths.temp_dir" => self.paths.temp_dir = value.to_string(),
            "paths.output_dir" => self.paths.output_dir = value.to_string(),
            "generation.default_image_count" => {
                self.generation.default_image_count = parse(key, value)?
            }
            "generation.max_image_count" => self.generation.max_image_count = parse(key, value)?,
            "generation.image_width" => self.generation.image_width = parse(key, value)?,
            "generation.image_height" => self.generation.image_height = parse(key, value)?,
            "generation.image_model" => self.generation.image_model = value.to_string(),
            "generation.request_delay_secs" => {
                self.generation.request_delay_secs = parse(key, value)?
            }
            "generation.random_seed" => self.generation.random_seed = parse(key, value)?,
            "mock.enabled" => self.mock.enabled = parse(key, value)?,
            "mock.use_sample_images" => self.mock.use_sample_images = parse(key, value)?,
            "mock.sample_images_dir" => self.mock.sample_images_dir = value.to_string(),
            "scenarios.default_scenario" => self.scenarios.default_scenario = value.to_string(),
            _ => return Err(Error::Config(format!("Unknown setting '{}'", key))),
        }
        self.save()
    }
}
