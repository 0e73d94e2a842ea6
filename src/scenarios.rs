//! Scenario planning
//!
//! Turns user input (scenario id, photos, catalog selections, template field
//! values) into a validated [`GenerationJob`]. Everything that can be checked
//! without the network is checked here, so a bad invocation fails before the
//! first request is sent.

use crate::catalog::{find, Catalog};
use crate::config::Config;
use crate::models::{
    Character, FieldType, GenerationUnit, ImageSize, ScenarioId, ScenarioTemplate,
};
use crate::orchestrator::GenerationJob;
use crate::prompts::COMPUTED_PLACEHOLDERS;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Raw selections for one `generate` invocation.
#[derive(Debug, Clone)]
pub struct ScenarioRequest {
    pub scenario: ScenarioId,
    pub photos: Vec<PathBuf>,
    /// Character names for the celebrity scenario; empty picks the first `count`.
    pub characters: Vec<String>,
    pub style: Option<String>,
    pub pose: Option<String>,
    pub template: Option<String>,
    pub background: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub count: Option<usize>,
    pub fields: BTreeMap<String, String>,
    pub size: Option<ImageSize>,
}

impl ScenarioRequest {
    pub fn new(scenario: ScenarioId) -> Self {
        Self {
            scenario,
            photos: Vec::new(),
            characters: Vec::new(),
            style: None,
            pose: None,
            template: None,
            background: None,
            prompt: None,
            negative_prompt: None,
            count: None,
            fields: BTreeMap::new(),
            size: None,
        }
    }

    pub fn with_photos(mut self, photos: Vec<PathBuf>) -> Self {
        self.photos = photos;
        self
    }
}

/// Parse a repeatable `key=value` argument.
pub fn parse_field(arg: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("Invalid field '{}'. Expected key=value", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid field '{}'. Key is empty", arg));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Validate `request` and expand it into the ordered unit list.
pub fn plan(
    request: &ScenarioRequest,
    catalog: &Catalog,
    config: &Config,
) -> Result<GenerationJob> {
    for photo in &request.photos {
        if !photo.is_file() {
            return Err(Error::InvalidInput(format!(
                "Photo not found: {}",
                photo.display()
            )));
        }
    }

    let scenario = request.scenario;
    let generation = &config.generation;
    let photo_count = request.photos.len();

    let units = if scenario.is_template_based() {
        let template = select_template(request, catalog)?;
        let (scenario_min, scenario_max) = catalog.photo_limits(scenario);
        let min = scenario_min.max(template.required_photos);
        let max = scenario_max.min(template.max_photos).max(min);
        check_photo_count(scenario, photo_count, (min, max))?;
        check_fields(template, &request.fields)?;

        let count = generation.clamp_count(request.count, template.default_count);
        let unit = GenerationUnit::Template {
            template: template.clone(),
            values: request.fields.clone(),
        };
        vec![unit; count]
    } else {
        check_photo_count(scenario, photo_count, catalog.photo_limits(scenario))?;
        match scenario {
            ScenarioId::Celebrity => celebrity_units(request, catalog, config)?,
            ScenarioId::Portrait => {
                let key = request.style.as_deref().ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "The portrait scenario requires --style. Available: {}",
                        names(catalog.portrait_styles().iter().map(|s| s.name.as_str()))
                    ))
                })?;
                let style = find(catalog.portrait_styles(), key, "Style")?;
                let count = generation.clamp_count(request.count, 1);
                vec![GenerationUnit::Portrait(style.clone()); count]
            }
            ScenarioId::Couple => {
                let pose = match request.pose.as_deref() {
                    Some(key) => find(catalog.couple_poses(), key, "Pose")?,
                    None => catalog.couple_poses().first().ok_or_else(|| {
                        Error::Config("No couple poses available in the catalog".to_string())
                    })?,
                };
                let background = request
                    .background
                    .as_deref()
                    .map(|key| find(catalog.backgrounds(scenario), key, "Background"))
                    .transpose()?
                    .cloned();
                let count = generation.clamp_count(request.count, 1);
                let unit = GenerationUnit::Couple {
                    pose: pose.clone(),
                    background,
                };
                vec![unit; count]
            }
            ScenarioId::Family => {
                let template = match request.template.as_deref() {
                    Some(key) => find(catalog.family_templates(), key, "Family template")?,
                    None => catalog.family_templates().first().ok_or_else(|| {
                        Error::Config("No family templates available in the catalog".to_string())
                    })?,
                };
                let background = request
                    .background
                    .as_deref()
                    .map(|key| find(catalog.backgrounds(scenario), key, "Background"))
                    .transpose()?
                    .cloned();
                let person_count = template.person_count.unwrap_or(0).max(photo_count);
                let count = generation.clamp_count(request.count, 1);
                let unit = GenerationUnit::Family {
                    template: template.clone(),
                    background,
                    person_count,
                };
                vec![unit; count]
            }
            ScenarioId::Free => {
                let prompt = request
                    .prompt
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidInput("The free scenario requires --prompt".to_string())
                    })?;
                let count = generation.clamp_count(request.count, 1);
                let unit = GenerationUnit::FreeForm {
                    prompt: prompt.to_string(),
                    negative_prompt: request.negative_prompt.clone(),
                };
                vec![unit; count]
            }
            other => {
                return Err(Error::Invariant(format!(
                    "scenario {} has no planner",
                    other
                )))
            }
        }
    };

    let size = request
        .size
        .or_else(|| catalog.size_override(scenario))
        .unwrap_or_else(|| generation.image_size());

    debug!("Planned {} {} unit(s) at {}", units.len(), scenario, size);
    Ok(GenerationJob {
        scenario,
        units,
        photos: request.photos.clone(),
        size,
    })
}

fn names<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

fn check_photo_count(scenario: ScenarioId, count: usize, (min, max): (usize, usize)) -> Result<()> {
    if count < min {
        return Err(Error::InvalidInput(format!(
            "The {} scenario needs at least {} photo(s), got {}",
            scenario, min, count
        )));
    }
    if count > max {
        return Err(Error::InvalidInput(format!(
            "The {} scenario accepts at most {} photo(s), got {}",
            scenario, max, count
        )));
    }
    Ok(())
}

fn celebrity_units(
    request: &ScenarioRequest,
    catalog: &Catalog,
    config: &Config,
) -> Result<Vec<GenerationUnit>> {
    let available = catalog.characters();
    if available.is_empty() {
        return Err(Error::Config("No characters available in the catalog".to_string()));
    }

    let max = config.generation.max_image_count.max(1);
    let selected: Vec<&Character> = if request.characters.is_empty() {
        let count = config
            .generation
            .clamp_count(request.count, config.generation.default_image_count);
        available.iter().take(count).collect()
    } else {
        for name in &request.characters {
            if !available
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(name.trim()))
            {
                return Err(Error::InvalidInput(format!(
                    "Character '{}' not found. Available: {}",
                    name,
                    names(available.iter().map(|c| c.name.as_str()))
                )));
            }
        }
        let mut selected: Vec<&Character> = available
            .iter()
            .filter(|c| {
                request
                    .characters
                    .iter()
                    .any(|name| c.name.eq_ignore_ascii_case(name.trim()))
            })
            .collect();
        if selected.len() > max {
            warn!(
                "{} characters selected; only the first {} will be generated",
                selected.len(),
                max
            );
            selected.truncate(max);
        }
        selected
    };

    Ok(selected
        .into_iter()
        .cloned()
        .map(GenerationUnit::Character)
        .collect())
}

fn select_template<'a>(
    request: &ScenarioRequest,
    catalog: &'a Catalog,
) -> Result<&'a ScenarioTemplate> {
    let templates = catalog.templates(request.scenario);
    match request.template.as_deref() {
        Some(key) => find(templates, key, "Template"),
        None => templates.first().ok_or_else(|| {
            Error::Config(format!(
                "No templates available for the {} scenario",
                request.scenario
            ))
        }),
    }
}

/// Required fields present, choice fields within their options, numbers numeric.
fn check_fields(template: &ScenarioTemplate, values: &BTreeMap<String, String>) -> Result<()> {
    for key in values.keys() {
        if COMPUTED_PLACEHOLDERS.contains(&key.as_str()) {
            return Err(Error::InvalidInput(format!(
                "Field '{}' is filled automatically and cannot be set",
                key
            )));
        }
        if !template.fields.iter().any(|f| &f.name == key) {
            warn!("Template '{}' has no field '{}'; ignoring", template.name, key);
        }
    }

    for field in &template.fields {
        let value = match values.get(&field.name) {
            Some(value) => value,
            None => {
                let has_default = field.default.as_deref().is_some_and(|d| !d.is_empty());
                if field.required && !has_default {
                    return Err(Error::InvalidInput(format!(
                        "Template '{}' requires field '{}' (use --field {}=...)",
                        template.name, field.name, field.name
                    )));
                }
                continue;
            }
        };

        match field.field_type {
            FieldType::Text => {}
            FieldType::Number => {
                if value.trim().parse::<f64>().is_err() {
                    return Err(Error::InvalidInput(format!(
                        "Field '{}' must be a number, got '{}'",
                        field.name, value
                    )));
                }
            }
            FieldType::Select | FieldType::Multiselect if field.options.is_empty() => {}
            FieldType::Select => check_option(&field.name, value.trim(), &field.options)?,
            FieldType::Multiselect => {
                for choice in value.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                    check_option(&field.name, choice, &field.options)?;
                }
            }
        }
    }
    Ok(())
}

fn check_option(field: &str, value: &str, options: &[String]) -> Result<()> {
    if options.iter().any(|o| o == value) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Invalid value '{}' for field '{}'. Options: {}",
            value,
            field,
            options.join(", ")
        )))
    }
}
