//! Data models and structures
//!
//! Catalog entries loaded from the `data/` fixtures (characters, portrait
//! styles, couple poses, family templates, scenario templates) and the
//! per-run generation units built from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CHARACTER_SCENE: &str =
    "movie set with crew members working, cameras and equipment visible";

fn default_character_scene() -> String {
    DEFAULT_CHARACTER_SCENE.to_string()
}

/// A movie character the user is photographed with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    pub name: String,
    pub prompt: String,
    #[serde(default = "default_character_scene")]
    pub scene: String,
}

impl Character {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, scene: Option<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            scene: scene.unwrap_or_else(default_character_scene),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortraitStyle {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "PortraitStyle::default_category")]
    pub category: String,
    pub prompt: String,
    #[serde(default = "PortraitStyle::default_attire")]
    pub attire: String,
    #[serde(default = "PortraitStyle::default_pose")]
    pub pose: String,
    #[serde(default = "PortraitStyle::default_lighting")]
    pub lighting: String,
    #[serde(default = "PortraitStyle::default_background")]
    pub background: String,
    #[serde(default = "PortraitStyle::default_mood")]
    pub mood: String,
}

impl PortraitStyle {
    fn default_category() -> String {
        "Portrait".to_string()
    }
    fn default_attire() -> String {
        "appropriate attire for style".to_string()
    }
    fn default_pose() -> String {
        "standard portrait pose facing camera".to_string()
    }
    fn default_lighting() -> String {
        "soft studio lighting".to_string()
    }
    fn default_background() -> String {
        "clean neutral background".to_string()
    }
    fn default_mood() -> String {
        "confident and professional".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouplePose {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "CouplePose::default_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default = "CouplePose::default_atmosphere")]
    pub atmosphere: String,
    #[serde(default = "CouplePose::default_attire")]
    pub attire: String,
}

impl CouplePose {
    fn default_prompt() -> String {
        "romantic couple".to_string()
    }
    fn default_atmosphere() -> String {
        "romantic, intimate".to_string()
    }
    fn default_attire() -> String {
        "coordinated outfits suitable for couple".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyTemplate {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "FamilyTemplate::default_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default = "FamilyTemplate::default_atmosphere")]
    pub atmosphere: String,
    #[serde(default = "FamilyTemplate::default_attire")]
    pub attire: String,
    #[serde(default)]
    pub person_count: Option<usize>,
}

impl FamilyTemplate {
    fn default_prompt() -> String {
        "happy family portrait".to_string()
    }
    fn default_atmosphere() -> String {
        "warm and loving".to_string()
    }
    fn default_attire() -> String {
        "coordinated casual family outfits".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Background {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Select,
    Multiselect,
    Number,
}

/// One named placeholder a [`ScenarioTemplate`] accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateField {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default = "TemplateField::default_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl TemplateField {
    fn default_type() -> FieldType {
        FieldType::Text
    }
}

/// A reusable prompt skeleton with typed, optionally-defaulted fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "ScenarioTemplate::default_version")]
    pub version: u32,
    pub prompt_template: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub fields: Vec<TemplateField>,
    #[serde(default = "ScenarioTemplate::default_photo_count")]
    pub required_photos: usize,
    #[serde(default = "ScenarioTemplate::default_photo_count")]
    pub max_photos: usize,
    #[serde(default = "ScenarioTemplate::default_photo_count")]
    pub default_count: usize,
}

impl ScenarioTemplate {
    fn default_version() -> u32 {
        1
    }
    fn default_photo_count() -> usize {
        1
    }
}

/// Entry of `data/scenarios.json` describing one end-to-end generation mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default = "ScenarioDescriptor::default_required")]
    pub required_photos: usize,
    #[serde(default = "ScenarioDescriptor::default_required")]
    pub max_photos: usize,
    #[serde(default)]
    pub data_file: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl ScenarioDescriptor {
    fn default_required() -> usize {
        1
    }
}

/// Output dimensions, serialized on the wire as `"{width}x{height}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("Invalid size '{}'. Expected WIDTHxHEIGHT", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| format!("Invalid width in size '{}'", s))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| format!("Invalid height in size '{}'", s))?;
        Ok(Self { width, height })
    }
}

/// Named end-to-end generation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScenarioId {
    Celebrity,
    Portrait,
    Couple,
    Family,
    Free,
    Edit,
    Fusion,
    Series,
    Poster,
}

impl ScenarioId {
    pub const ALL: [ScenarioId; 9] = [
        Self::Celebrity,
        Self::Portrait,
        Self::Couple,
        Self::Family,
        Self::Free,
        Self::Edit,
        Self::Fusion,
        Self::Series,
        Self::Poster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Celebrity => "celebrity",
            Self::Portrait => "portrait",
            Self::Couple => "couple",
            Self::Family => "family",
            Self::Free => "free",
            Self::Edit => "edit",
            Self::Fusion => "fusion",
            Self::Series => "series",
            Self::Poster => "poster",
        }
    }

    /// Photo count bounds used when `scenarios.json` does not override them.
    pub fn default_photo_limits(&self) -> (usize, usize) {
        match self {
            Self::Celebrity | Self::Portrait | Self::Edit | Self::Series => (1, 1),
            Self::Couple => (2, 14),
            Self::Family | Self::Fusion => (1, 6),
            Self::Free => (1, 14),
            Self::Poster => (0, 1),
        }
    }

    pub fn default_data_file(&self) -> Option<&'static str> {
        match self {
            Self::Celebrity => Some("default_characters.json"),
            Self::Portrait => Some("portrait_styles.json"),
            Self::Couple => Some("couple_poses.json"),
            Self::Family => Some("family_templates.json"),
            Self::Free => None,
            Self::Edit => Some("edit_templates.json"),
            Self::Fusion => Some("fusion_templates.json"),
            Self::Series => Some("series_templates.json"),
            Self::Poster => Some("poster_templates.json"),
        }
    }

    /// Whether units come from generic [`ScenarioTemplate`]s.
    pub fn is_template_based(&self) -> bool {
        matches!(self, Self::Edit | Self::Fusion | Self::Series | Self::Poster)
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|id| id.as_str()).collect();
                format!("Unknown scenario '{}'. Known: {}", s, known.join(", "))
            })
    }
}

/// One subject to render as a single output image.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationUnit {
    Character(Character),
    Portrait(PortraitStyle),
    Couple {
        pose: CouplePose,
        background: Option<Background>,
    },
    Family {
        template: FamilyTemplate,
        background: Option<Background>,
        person_count: usize,
    },
    FreeForm {
        prompt: String,
        negative_prompt: Option<String>,
    },
    Template {
        template: ScenarioTemplate,
        values: BTreeMap<String, String>,
    },
}

impl GenerationUnit {
    /// Identifying name reported when the unit fails.
    pub fn label(&self) -> &str {
        match self {
            Self::Character(character) => &character.name,
            Self::Portrait(style) => &style.name,
            Self::Couple { pose, .. } => &pose.name,
            Self::Family { template, .. } => &template.name,
            Self::FreeForm { .. } => "free-form",
            Self::Template { template, .. } => &template.name,
        }
    }
}

/// Lowercase, filesystem-safe version of a label for output filenames.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut last_was_sep = true;
    for c in label.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unit");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_scene_defaults() {
        let character: Character =
            serde_json::from_str(r#"{"name": "Thor", "prompt": "Thor holding Mjolnir"}"#).unwrap();
        assert_eq!(character.scene, DEFAULT_CHARACTER_SCENE);
    }

    #[test]
    fn test_template_field_type_rename() {
        let field: TemplateField = serde_json::from_str(
            r#"{"name": "items", "type": "multiselect", "options": ["a", "b"]}"#,
        )
        .unwrap();
        assert_eq!(field.field_type, FieldType::Multiselect);
        assert!(!field.required);
        assert!(field.default.is_none());
    }

    #[test]
    fn test_image_size_display_and_parse() {
        let size = ImageSize::new(1440, 2560);
        assert_eq!(size.to_string(), "1440x2560");
        assert_eq!("1440x2560".parse::<ImageSize>().unwrap(), size);
        assert!("1440".parse::<ImageSize>().is_err());
        assert!("axb".parse::<ImageSize>().is_err());
    }

    #[test]
    fn test_scenario_id_parse() {
        assert_eq!("Couple".parse::<ScenarioId>().unwrap(), ScenarioId::Couple);
        assert_eq!(ScenarioId::Poster.to_string(), "poster");
        let err = "wedding".parse::<ScenarioId>().unwrap_err();
        assert!(err.contains("celebrity"));
        assert!(ScenarioId::Series.is_template_based());
        assert!(!ScenarioId::Family.is_template_based());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Neo (Matrix)"), "neo_matrix");
        assert_eq!(slugify("T'Challa"), "t_challa");
        assert_eq!(slugify("  "), "unit");
    }

    #[test]
    fn test_unit_label() {
        let unit = GenerationUnit::Character(Character::new("Hulk", "big green", None));
        assert_eq!(unit.label(), "Hulk");

        let free = GenerationUnit::FreeForm {
            prompt: "a castle".to_string(),
            negative_prompt: None,
        };
        assert_eq!(free.label(), "free-form");
    }
}
