//! Scenario catalog
//!
//! Characters, styles, poses and templates come from JSON files under
//! `data/`. Every bundled file is also compiled in, so a working directory
//! without `data/` still has the full catalog; a file on disk replaces its
//! bundled copy.

use crate::models::{
    Background, Character, CouplePose, FamilyTemplate, ImageSize, PortraitStyle,
    ScenarioDescriptor, ScenarioId, ScenarioTemplate,
};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const SCENARIOS_FILE: &str = "scenarios.json";

const BUNDLED: &[(&str, &str)] = &[
    (SCENARIOS_FILE, include_str!("../data/scenarios.json")),
    (
        "default_characters.json",
        include_str!("../data/default_characters.json"),
    ),
    (
        "portrait_styles.json",
        include_str!("../data/portrait_styles.json"),
    ),
    ("couple_poses.json", include_str!("../data/couple_poses.json")),
    (
        "family_templates.json",
        include_str!("../data/family_templates.json"),
    ),
    ("edit_templates.json", include_str!("../data/edit_templates.json")),
    (
        "fusion_templates.json",
        include_str!("../data/fusion_templates.json"),
    ),
    (
        "series_templates.json",
        include_str!("../data/series_templates.json"),
    ),
    (
        "poster_templates.json",
        include_str!("../data/poster_templates.json"),
    ),
];

#[derive(Debug, Deserialize)]
struct ScenariosFile {
    #[serde(default)]
    scenarios: Vec<ScenarioDescriptor>,
}

/// A data file is either a bare list or an object keyed by entry kind.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataFile<T> {
    Keyed {
        #[serde(alias = "styles", alias = "poses", alias = "templates", alias = "characters")]
        items: Vec<T>,
        #[serde(default)]
        backgrounds: Vec<Background>,
    },
    Bare(Vec<T>),
}

impl<T> DataFile<T> {
    fn into_parts(self) -> (Vec<T>, Vec<Background>) {
        match self {
            Self::Keyed { items, backgrounds } => (items, backgrounds),
            Self::Bare(items) => (items, Vec::new()),
        }
    }
}

/// Anything that can be selected by name or id on the command line.
pub trait CatalogEntry {
    fn name(&self) -> &str;
    fn id(&self) -> Option<&str> {
        None
    }
}

impl CatalogEntry for Character {
    fn name(&self) -> &str {
        &self.name
    }
}

macro_rules! catalog_entry {
    ($($ty:ty),*) => {
        $(impl CatalogEntry for $ty {
            fn name(&self) -> &str {
                &self.name
            }
            fn id(&self) -> Option<&str> {
                self.id.as_deref()
            }
        })*
    };
}

catalog_entry!(PortraitStyle, CouplePose, FamilyTemplate, Background);

impl CatalogEntry for ScenarioTemplate {
    fn name(&self) -> &str {
        &self.name
    }
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

/// Look up `key` by exact id or case-insensitive name.
pub fn find<'a, T: CatalogEntry>(items: &'a [T], key: &str, kind: &str) -> Result<&'a T> {
    let key = key.trim();
    items
        .iter()
        .find(|item| item.id() == Some(key) || item.name().eq_ignore_ascii_case(key))
        .ok_or_else(|| {
            let available: Vec<&str> = items.iter().map(|item| item.name()).collect();
            if available.is_empty() {
                Error::InvalidInput(format!("{} '{}' not found; none are available", kind, key))
            } else {
                Error::InvalidInput(format!(
                    "{} '{}' not found. Available: {}",
                    kind,
                    key,
                    available.join(", ")
                ))
            }
        })
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    scenarios: Vec<ScenarioDescriptor>,
    characters: Vec<Character>,
    portrait_styles: Vec<PortraitStyle>,
    couple_poses: Vec<CouplePose>,
    couple_backgrounds: Vec<Background>,
    family_templates: Vec<FamilyTemplate>,
    family_backgrounds: Vec<Background>,
    templates: BTreeMap<ScenarioId, Vec<ScenarioTemplate>>,
}

fn read_source(data_dir: Option<&Path>, file: &str) -> Result<Option<String>> {
    if let Some(path) = data_dir.map(|dir| dir.join(file)).filter(|path| path.is_file()) {
        debug!("Loading catalog file {}", path.display());
        return Ok(Some(fs::read_to_string(&path)?));
    }
    Ok(BUNDLED
        .iter()
        .find(|(name, _)| *name == file)
        .map(|(_, content)| content.to_string()))
}

fn parse<T: DeserializeOwned>(file: &str, content: &str) -> Result<T> {
    serde_json::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid catalog file {}: {}", file, e)))
}

fn load_entries<T: DeserializeOwned>(
    data_dir: Option<&Path>,
    file: Option<&str>,
) -> Result<(Vec<T>, Vec<Background>)> {
    let Some(file) = file else {
        return Ok((Vec::new(), Vec::new()));
    };
    match read_source(data_dir, file)? {
        Some(content) => Ok(parse::<DataFile<T>>(file, &content)?.into_parts()),
        None => {
            warn!("Catalog file {} not found", file);
            Ok((Vec::new(), Vec::new()))
        }
    }
}

impl Catalog {
    /// Load the catalog from `data_dir`, with `custom` characters listed first.
    pub fn load(data_dir: &Path, custom: &[Character]) -> Result<Self> {
        Self::load_from(Some(data_dir), custom)
    }

    /// Bundled catalog only.
    pub fn bundled() -> Result<Self> {
        Self::load_from(None, &[])
    }

    fn load_from(data_dir: Option<&Path>, custom: &[Character]) -> Result<Self> {
        let scenarios_file: ScenariosFile = match read_source(data_dir, SCENARIOS_FILE)? {
            Some(content) => parse(SCENARIOS_FILE, &content)?,
            None => ScenariosFile {
                scenarios: Vec::new(),
            },
        };

        let mut catalog = Catalog {
            scenarios: scenarios_file.scenarios,
            ..Default::default()
        };

        let (defaults, _) =
            load_entries::<Character>(data_dir, catalog.data_file(ScenarioId::Celebrity))?;
        catalog.characters = custom.iter().cloned().chain(defaults).collect();

        (catalog.portrait_styles, _) =
            load_entries(data_dir, catalog.data_file(ScenarioId::Portrait))?;
        (catalog.couple_poses, catalog.couple_backgrounds) =
            load_entries(data_dir, catalog.data_file(ScenarioId::Couple))?;
        (catalog.family_templates, catalog.family_backgrounds) =
            load_entries(data_dir, catalog.data_file(ScenarioId::Family))?;

        for id in ScenarioId::ALL.into_iter().filter(|id| id.is_template_based()) {
            let (templates, _) = load_entries(data_dir, catalog.data_file(id))?;
            catalog.templates.insert(id, templates);
        }

        debug!(
            "Catalog loaded: {} characters, {} styles, {} poses, {} family templates",
            catalog.characters.len(),
            catalog.portrait_styles.len(),
            catalog.couple_poses.len(),
            catalog.family_templates.len()
        );
        Ok(catalog)
    }

    fn data_file(&self, id: ScenarioId) -> Option<&str> {
        match self.scenario(id).and_then(|s| s.data_file.as_deref()) {
            Some(file) => Some(file),
            None => id.default_data_file(),
        }
    }

    pub fn scenarios(&self) -> &[ScenarioDescriptor] {
        &self.scenarios
    }

    pub fn scenario(&self, id: ScenarioId) -> Option<&ScenarioDescriptor> {
        self.scenarios.iter().find(|s| s.id == id.as_str())
    }

    /// `(required, max)` photo counts for a scenario.
    pub fn photo_limits(&self, id: ScenarioId) -> (usize, usize) {
        self.scenario(id)
            .map(|s| (s.required_photos, s.max_photos.max(s.required_photos)))
            .unwrap_or_else(|| id.default_photo_limits())
    }

    /// Output size declared by the scenario, if it declares both dimensions.
    pub fn size_override(&self, id: ScenarioId) -> Option<ImageSize> {
        let scenario = self.scenario(id)?;
        Some(ImageSize::new(scenario.width?, scenario.height?))
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn portrait_styles(&self) -> &[PortraitStyle] {
        &self.portrait_styles
    }

    pub fn couple_poses(&self) -> &[CouplePose] {
        &self.couple_poses
    }

    pub fn family_templates(&self) -> &[FamilyTemplate] {
        &self.family_templates
    }

    /// Background options; only couple and family scenarios have any.
    pub fn backgrounds(&self, id: ScenarioId) -> &[Background] {
        match id {
            ScenarioId::Couple => &self.couple_backgrounds,
            ScenarioId::Family => &self.family_backgrounds,
            _ => &[],
        }
    }

    pub fn templates(&self, id: ScenarioId) -> &[ScenarioTemplate] {
        self.templates.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}
