//! Prompt composition
//!
//! A single [`PromptComposer`] turns any [`GenerationUnit`] into the prompt
//! and negative prompt sent to the API. Built-in scenarios render the
//! skeletons under `data/prompts/`; template scenarios fill their own
//! `{{placeholder}}` skeleton from field values.

use crate::error::GenerationFailure;
use crate::models::{
    Background, Character, CouplePose, FamilyTemplate, FieldType, GenerationUnit, PortraitStyle,
    ScenarioTemplate,
};
use std::collections::BTreeMap;

pub const CAMEO: &str = include_str!("../data/prompts/cameo.txt");
pub const PORTRAIT: &str = include_str!("../data/prompts/portrait.txt");
pub const COUPLE: &str = include_str!("../data/prompts/couple.txt");
pub const FAMILY: &str = include_str!("../data/prompts/family.txt");
pub const NEGATIVE: &str = include_str!("../data/prompts/negative.txt");

const SEASON_DESCRIPTIONS: &str = "Spring: fresh blossoms, soft pastel light and light layered \
clothing. \
Summer: bright sunshine, vivid greens and airy summer outfits. \
Autumn: golden and red foliage, warm low sunlight and cozy knitwear. \
Winter: snow-covered scenery, crisp cool light and warm winter coats.";

/// Placeholders filled by the composer; field values never override them.
pub const COMPUTED_PLACEHOLDERS: [&str; 4] = [
    "photo_count",
    "person_extraction",
    "season_descriptions",
    "story_stages",
];

const DEFAULT_STORY_STAGES: [&str; 4] = ["beginning", "development", "climax", "ending"];

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Replace every `{{name}}` using `lookup`; the first name it cannot
/// resolve is reported as missing.
fn fill<'a, F>(template: &str, lookup: F) -> Result<String, GenerationFailure>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated braces are literal text.
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = after[..end].trim();
        let value = lookup(name)
            .ok_or_else(|| GenerationFailure::TemplateFieldMissing(name.to_string()))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// One clause per input photo binding photo `#i` to person `i`.
pub fn person_extraction(photo_count: usize) -> String {
    (1..=photo_count)
        .map(|i| {
            format!(
                "Person {i}: Extract facial features, gender, age, and appearance \
                 from input photo #{i} only."
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn story_stages(stages: Option<&str>) -> String {
    let custom: Vec<&str> = stages
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let stages = if custom.is_empty() {
        DEFAULT_STORY_STAGES.to_vec()
    } else {
        custom
    };
    stages
        .iter()
        .enumerate()
        .map(|(i, stage)| format!("Stage {}: {}.", i + 1, stage))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub prompt: String,
    pub negative_prompt: String,
}

impl ComposedPrompt {
    fn new(prompt: String, negative_override: Option<&str>) -> Self {
        let negative_prompt = match negative_override.map(str::trim) {
            Some(negative) if !negative.is_empty() => negative.to_string(),
            _ => NEGATIVE.trim().to_string(),
        };
        Self {
            prompt,
            negative_prompt,
        }
    }
}

/// Builds prompts for every scenario kind. Pure and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer;

impl PromptComposer {
    pub fn new() -> Self {
        Self
    }

    /// Compose the prompt for `unit` given how many reference photos accompany it.
    pub fn compose(
        &self,
        unit: &GenerationUnit,
        photo_count: usize,
    ) -> Result<ComposedPrompt, GenerationFailure> {
        match unit {
            GenerationUnit::Character(character) => Ok(Self::cameo(character)),
            GenerationUnit::Portrait(style) => Ok(Self::portrait(style)),
            GenerationUnit::Couple { pose, background } => {
                Ok(Self::couple(pose, background.as_ref(), photo_count))
            }
            GenerationUnit::Family {
                template,
                background,
                person_count,
            } => Ok(Self::family(
                template,
                background.as_ref(),
                photo_count,
                *person_count,
            )),
            GenerationUnit::FreeForm {
                prompt,
                negative_prompt,
            } => Ok(Self::free_form(prompt, negative_prompt.as_deref(), photo_count)),
            GenerationUnit::Template { template, values } => {
                Self::template(template, values, photo_count)
            }
        }
    }

    fn cameo(character: &Character) -> ComposedPrompt {
        let prompt = render(
            CAMEO.trim(),
            &[
                ("name", &character.name),
                ("character_prompt", &character.prompt),
                ("scene", &character.scene),
            ],
        );
        ComposedPrompt::new(prompt, None)
    }

    fn portrait(style: &PortraitStyle) -> ComposedPrompt {
        let prompt = render(
            PORTRAIT.trim(),
            &[
                ("style_prompt", &style.prompt),
                ("pose", &style.pose),
                ("attire", &style.attire),
                ("lighting", &style.lighting),
                ("background", &style.background),
                ("mood", &style.mood),
            ],
        );
        ComposedPrompt::new(prompt, None)
    }

    fn couple(
        pose: &CouplePose,
        background: Option<&Background>,
        photo_count: usize,
    ) -> ComposedPrompt {
        let scene = background
            .map(|bg| bg.prompt.as_str())
            .or(pose.scene.as_deref())
            .unwrap_or("outdoor park or urban setting");
        let person_count = photo_count.to_string();
        let extraction = person_extraction(photo_count);

        let prompt = render(
            COUPLE.trim(),
            &[
                ("person_count", &person_count),
                ("pose_prompt", &pose.prompt),
                ("person_extraction", &extraction),
                ("scene", scene),
                ("atmosphere", &pose.atmosphere),
                ("attire", &pose.attire),
            ],
        );
        ComposedPrompt::new(prompt, None)
    }

    fn family(
        template: &FamilyTemplate,
        background: Option<&Background>,
        photo_count: usize,
        person_count: usize,
    ) -> ComposedPrompt {
        let person_count = person_count.max(photo_count);
        let scene = background
            .map(|bg| bg.prompt.as_str())
            .or(template.scene.as_deref())
            .unwrap_or("warm home setting");
        let extraction = person_extraction(photo_count);
        let additional = match person_count - photo_count {
            0 => String::new(),
            1 => "Include 1 additional family member who does not come from any input photo. "
                .to_string(),
            n => format!(
                "Include {} additional family members who do not come from any input photo. ",
                n
            ),
        };
        let count = person_count.to_string();

        let prompt = render(
            FAMILY.trim(),
            &[
                ("person_count", &count),
                ("template_prompt", &template.prompt),
                ("person_extraction", &extraction),
                ("additional_people", &additional),
                ("scene", scene),
                ("atmosphere", &template.atmosphere),
                ("attire", &template.attire),
            ],
        );
        ComposedPrompt::new(prompt, None)
    }

    fn free_form(
        prompt: &str,
        negative_prompt: Option<&str>,
        photo_count: usize,
    ) -> ComposedPrompt {
        let prompt = if photo_count > 1 {
            format!("{} {}", prompt.trim(), person_extraction(photo_count))
        } else {
            prompt.trim().to_string()
        };
        ComposedPrompt::new(prompt, negative_prompt)
    }

    fn template(
        template: &ScenarioTemplate,
        supplied: &BTreeMap<String, String>,
        photo_count: usize,
    ) -> Result<ComposedPrompt, GenerationFailure> {
        let values = resolve_field_values(template, supplied)?;

        let photo_count_str = photo_count.to_string();
        let extraction = person_extraction(photo_count);
        let stages = story_stages(values.get("stages").map(String::as_str));
        let prompt = fill(template.prompt_template.trim(), |name| match name {
            "photo_count" => Some(photo_count_str.as_str()),
            "person_extraction" => Some(extraction.as_str()),
            "season_descriptions" => Some(SEASON_DESCRIPTIONS),
            "story_stages" => Some(stages.as_str()),
            _ => values.get(name).map(String::as_str),
        })?;
        Ok(ComposedPrompt::new(prompt, template.negative_prompt.as_deref()))
    }
}

/// Resolve declared fields: supplied value, then declared default, then
/// empty for optional fields. Undeclared supplied values pass through.
fn resolve_field_values(
    template: &ScenarioTemplate,
    supplied: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, GenerationFailure> {
    let mut values = supplied.clone();
    for field in &template.fields {
        let value = match supplied.get(&field.name) {
            Some(value) if field.field_type == FieldType::Multiselect => {
                value.split(',').map(str::trim).collect::<Vec<_>>().join(", ")
            }
            Some(value) => value.clone(),
            None => match field.default.as_deref() {
                Some(default) if !default.is_empty() => default.to_string(),
                _ if !field.required => String::new(),
                _ => return Err(GenerationFailure::TemplateFieldMissing(field.name.clone())),
            },
        };
        values.insert(field.name.clone(), value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateField;
    use pretty_assertions::assert_eq;

    fn field(name: &str, required: bool, default: Option<&str>) -> TemplateField {
        TemplateField {
            name: name.to_string(),
            label: None,
            field_type: FieldType::Text,
            required,
            default: default.map(str::to_string),
            options: Vec::new(),
        }
    }

    fn template(prompt_template: &str, fields: Vec<TemplateField>) -> ScenarioTemplate {
        ScenarioTemplate {
            id: "t1".to_string(),
            name: "Test".to_string(),
            category: None,
            description: None,
            version: 1,
            prompt_template: prompt_template.to_string(),
            negative_prompt: None,
            fields,
            required_photos: 1,
            max_photos: 1,
            default_count: 1,
        }
    }

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_single_var() {
        assert_eq!(
            render("Hello {{name}}!", &[("name", "world")]),
            "Hello world!"
        );
    }

    #[test]
    fn test_render_multiple_vars() {
        assert_eq!(
            render("{{a}} and {{b}}", &[("a", "cats"), ("b", "dogs")]),
            "cats and dogs"
        );
    }

    #[test]
    fn test_skeletons_are_non_empty() {
        for skeleton in [CAMEO, PORTRAIT, COUPLE, FAMILY, NEGATIVE] {
            assert!(!skeleton.trim().is_empty());
        }
    }

    #[test]
    fn test_builtin_units_leave_no_placeholders() {
        let units = vec![
            GenerationUnit::Character(Character::new("Thor", "god of thunder", None)),
            GenerationUnit::Portrait(
                serde_json::from_str(r#"{"name": "Business", "prompt": "corporate headshot"}"#)
                    .unwrap(),
            ),
            GenerationUnit::Couple {
                pose: serde_json::from_str(r#"{"name": "Hug"}"#).unwrap(),
                background: None,
            },
            GenerationUnit::Family {
                template: serde_json::from_str(r#"{"name": "Picnic"}"#).unwrap(),
                background: None,
                person_count: 4,
            },
        ];
        let composer = PromptComposer::new();
        for unit in &units {
            let composed = composer.compose(unit, 2).unwrap();
            assert!(!composed.prompt.contains("{{"), "{}", composed.prompt);
            assert_eq!(composed.negative_prompt, NEGATIVE.trim());
        }
    }

    #[test]
    fn test_cameo_mentions_character_and_scene() {
        let character = Character::new(
            "Iron Man",
            "Tony Stark in Iron Man suit",
            Some("Stark Industries lab".to_string()),
        );
        let composed = PromptComposer::new()
            .compose(&GenerationUnit::Character(character), 1)
            .unwrap();
        assert!(composed.prompt.contains("taking photo with Iron Man"));
        assert!(composed.prompt.contains("Stark Industries lab"));
        assert!(composed.prompt.contains("photorealistic"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let unit = GenerationUnit::Template {
            template: template("{{a}} in {{photo_count}} photos", vec![field("a", true, None)]),
            values: values(&[("a", "cat")]),
        };
        let composer = PromptComposer::new();
        let first = composer.compose(&unit, 3).unwrap();
        let second = composer.compose(&unit, 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.prompt, "cat in 3 photos");
    }

    #[test]
    fn test_couple_has_one_clause_per_photo() {
        let unit = GenerationUnit::Couple {
            pose: serde_json::from_str(r#"{"name": "Hug", "scene": "beach"}"#).unwrap(),
            background: None,
        };
        let composed = PromptComposer::new().compose(&unit, 2).unwrap();
        assert!(composed.prompt.contains("Person 1: Extract facial features, gender, age"));
        assert!(composed.prompt.contains("appearance from input photo #1 only."));
        assert!(composed.prompt.contains("Person 2: Extract facial features, gender, age"));
        assert!(composed.prompt.contains("appearance from input photo #2 only."));
        assert!(!composed.prompt.contains("Person 3"));
        assert!(composed.prompt.contains("EXACTLY 2 PEOPLE - NO MORE, NO FEWER"));
        assert!(composed.prompt.contains("Scene: beach."));
    }

    #[test]
    fn test_background_overrides_scene() {
        let unit = GenerationUnit::Couple {
            pose: serde_json::from_str(r#"{"name": "Hug", "scene": "beach"}"#).unwrap(),
            background: Some(Background {
                id: Some("paris".to_string()),
                name: "Paris".to_string(),
                prompt: "Eiffel Tower at dusk".to_string(),
            }),
        };
        let composed = PromptComposer::new().compose(&unit, 2).unwrap();
        assert!(composed.prompt.contains("Scene: Eiffel Tower at dusk."));
        assert!(!composed.prompt.contains("beach"));
    }

    #[test]
    fn test_family_counts_people() {
        let unit = GenerationUnit::Family {
            template: serde_json::from_str(r#"{"name": "Picnic"}"#).unwrap(),
            background: None,
            person_count: 4,
        };
        let composed = PromptComposer::new().compose(&unit, 3).unwrap();
        assert!(composed.prompt.contains("EXACTLY 4 people"));
        assert!(composed.prompt.contains("input photo #3 only"));
        assert!(!composed.prompt.contains("input photo #4"));
        assert!(composed.prompt.contains("1 additional family member"));
    }

    #[test]
    fn test_free_form_negative_override() {
        let unit = GenerationUnit::FreeForm {
            prompt: "  Turn me into a watercolor  ".to_string(),
            negative_prompt: Some("photorealistic".to_string()),
        };
        let composed = PromptComposer::new().compose(&unit, 1).unwrap();
        assert_eq!(composed.prompt, "Turn me into a watercolor");
        assert_eq!(composed.negative_prompt, "photorealistic");

        let blank = GenerationUnit::FreeForm {
            prompt: "x".to_string(),
            negative_prompt: Some("   ".to_string()),
        };
        let composed = PromptComposer::new().compose(&blank, 2).unwrap();
        assert_eq!(composed.negative_prompt, NEGATIVE.trim());
        assert!(composed.prompt.contains("input photo #2 only"));
    }

    #[test]
    fn test_template_missing_required_field() {
        let unit = GenerationUnit::Template {
            template: template("Change {{item}}", vec![field("item", true, None)]),
            values: BTreeMap::new(),
        };
        let err = PromptComposer::new().compose(&unit, 1).unwrap_err();
        assert_eq!(err, GenerationFailure::TemplateFieldMissing("item".to_string()));
    }

    #[test]
    fn test_template_undeclared_placeholder_fails() {
        let unit = GenerationUnit::Template {
            template: template("Change {{item}} to {{color}}", vec![field("item", false, None)]),
            values: BTreeMap::new(),
        };
        let err = PromptComposer::new().compose(&unit, 1).unwrap_err();
        assert_eq!(err, GenerationFailure::TemplateFieldMissing("color".to_string()));
    }

    #[test]
    fn test_template_defaults_and_optional_fields() {
        let unit = GenerationUnit::Template {
            template: template(
                "Style {{style}};{{extra}};{{mood}}",
                vec![
                    field("style", true, Some("oil painting")),
                    field("extra", false, None),
                    field("mood", false, Some("calm")),
                ],
            ),
            values: values(&[("mood", "joyful")]),
        };
        let composed = PromptComposer::new().compose(&unit, 1).unwrap();
        assert_eq!(composed.prompt, "Style oil painting;;joyful");
    }

    #[test]
    fn test_template_multiselect_and_computed() {
        let mut items = field("items", true, None);
        items.field_type = FieldType::Multiselect;
        let mut tpl = template(
            "Add {{items}}. {{season_descriptions}} {{story_stages}}",
            vec![items, field("stages", false, None)],
        );
        tpl.negative_prompt = Some("cartoon".to_string());

        let unit = GenerationUnit::Template {
            template: tpl,
            values: values(&[("items", "hat,scarf"), ("stages", "meet, wed")]),
        };
        let composed = PromptComposer::new().compose(&unit, 1).unwrap();
        assert!(composed.prompt.starts_with("Add hat, scarf. Spring:"));
        assert!(composed.prompt.ends_with("Stage 1: meet. Stage 2: wed."));
        assert_eq!(composed.negative_prompt, "cartoon");
    }

    #[test]
    fn test_computed_placeholders_ignore_supplied_values() {
        let unit = GenerationUnit::Template {
            template: template("{{photo_count}} photos. {{person_extraction}}", vec![]),
            values: values(&[("photo_count", "9"), ("person_extraction", "anyone")]),
        };
        let composed = PromptComposer::new().compose(&unit, 2).unwrap();
        assert_eq!(
            composed.prompt,
            format!("2 photos. {}", person_extraction(2))
        );
    }

    #[test]
    fn test_story_stages_default() {
        assert_eq!(
            story_stages(None),
            "Stage 1: beginning. Stage 2: development. Stage 3: climax. Stage 4: ending."
        );
        assert_eq!(story_stages(Some(" , ")), story_stages(None));
    }
}
