use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

use crate::models::chat::UserProfile;

const BUILTIN_PROMPTS: &str = include_str!("../../json/prompts.json");

/// Placeholder rendered for every profile field the user has not provided.
pub const UNKNOWN_FIELD: &str = "[unknown]";

/// Specialization used whenever the requested problem type has no entry.
pub const DEFAULT_PROBLEM_TYPE: &str = "General";

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    SpecializationNotFound(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Prompt template '{}' is empty", key),
            PromptError::SpecializationNotFound(key) =>
                write!(f, "Specialization for problem type '{}' not found", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// Therapy focuses offered during onboarding. Every one of them must have a
/// specialization entry in the prompt configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemType {
    Anxiety,
    Depression,
    RelationshipIssues,
    Stress,
    Grief,
    SelfEsteem,
    FamilyTherapy,
    CareerCounseling,
    Other,
    Sadness,
    General,
}

impl ProblemType {
    pub const ALL: [ProblemType; 11] = [
        ProblemType::Anxiety,
        ProblemType::Depression,
        ProblemType::RelationshipIssues,
        ProblemType::Stress,
        ProblemType::Grief,
        ProblemType::SelfEsteem,
        ProblemType::FamilyTherapy,
        ProblemType::CareerCounseling,
        ProblemType::Other,
        ProblemType::Sadness,
        ProblemType::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProblemType::Anxiety => "Anxiety",
            ProblemType::Depression => "Depression",
            ProblemType::RelationshipIssues => "Relationship Issues",
            ProblemType::Stress => "Stress",
            ProblemType::Grief => "Grief",
            ProblemType::SelfEsteem => "Self-Esteem",
            ProblemType::FamilyTherapy => "Family Therapy",
            ProblemType::CareerCounseling => "Career Counseling",
            ProblemType::Other => "Other",
            ProblemType::Sadness => "Sadness",
            ProblemType::General => "General",
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Specialization {
    pub focus: String,
    #[serde(default)]
    pub approach: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PolicyConfig {
    #[serde(default)]
    pub deny_list: Vec<String>,
    pub fallback_reply: String,
    pub empty_reply: String,
    #[serde(default = "default_anonymous_name")]
    pub anonymous_name: String,
}

fn default_anonymous_name() -> String {
    "Friend".to_string()
}

/// Declarative prompt material. Specializations are keyed by the exact
/// problem-type tag the client sends, so adding a focus is a data change.
#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub persona: String,
    pub profile_template: String,
    pub general_rules: String,
    pub specialization_template: String,
    pub specializations: HashMap<String, Specialization>,
    pub context_heading: String,
    pub policy: PolicyConfig,
}

impl PromptConfig {
    pub fn builtin() -> Result<Self, PromptError> {
        Self::from_json(BUILTIN_PROMPTS)
    }

    pub fn from_json(text: &str) -> Result<Self, PromptError> {
        let config: PromptConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PromptError> {
        let required = [
            ("persona", &self.persona),
            ("profile_template", &self.profile_template),
            ("general_rules", &self.general_rules),
            ("specialization_template", &self.specialization_template),
            ("context_heading", &self.context_heading),
            ("policy.fallback_reply", &self.policy.fallback_reply),
            ("policy.empty_reply", &self.policy.empty_reply),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(PromptError::TemplateNotFound(key.to_string()));
            }
        }
        for problem_type in ProblemType::ALL {
            if !self.specializations.contains_key(problem_type.label()) {
                return Err(PromptError::SpecializationNotFound(problem_type.label().to_string()));
            }
        }
        Ok(())
    }

    /// Resolves a client supplied tag to a configured specialization key,
    /// falling back to `General` for unknown or missing tags.
    pub fn resolve_problem_type<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(tag) if self.specializations.contains_key(tag) => tag,
            _ => DEFAULT_PROBLEM_TYPE,
        }
    }
}

/// Loads the prompt configuration from `path`, or the built-in templates
/// when no path is configured.
pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, Box<dyn Error + Send + Sync>> {
    let config = match path {
        Some(path) => {
            let file_content = fs
                ::read_to_string(path)
                .map_err(|e| format!("Failed to read prompts file '{}': {}", path, e))?;
            let config = PromptConfig::from_json(&file_content).map_err(|e|
                format!("Failed to parse prompts file '{}': {}", path, e)
            )?;
            info!("Loaded prompt configuration from {}", path);
            config
        }
        None => {
            info!("Using built-in prompt configuration");
            PromptConfig::builtin()?
        }
    };
    Ok(Arc::new(config))
}

fn field_or_unknown(value: &Option<String>) -> &str {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => UNKNOWN_FIELD,
    }
}

/// Substitutes `{key}` placeholders in one left-to-right pass. Substituted
/// values are never rescanned, so user text containing `{age}` stays
/// literal. Unknown keys are left as written.
fn fill_placeholders<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn render_profile(config: &PromptConfig, profile: &UserProfile) -> String {
    fill_placeholders(&config.profile_template, |key| {
        let field = match key {
            "name" => &profile.name,
            "age" => &profile.age,
            "gender" => &profile.gender,
            "country" => &profile.country,
            "religion" => &profile.religion,
            "therapy_type" => &profile.therapy_type,
            _ => {
                return None;
            }
        };
        Some(field_or_unknown(field))
    })
}

pub fn render_specialization(config: &PromptConfig, problem_type: Option<&str>) -> Result<String, PromptError> {
    let label = config.resolve_problem_type(problem_type);
    let spec = config.specializations
        .get(label)
        .ok_or_else(|| PromptError::SpecializationNotFound(label.to_string()))?;

    let approach = spec.approach
        .iter()
        .map(|step| format!("- {}", step))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(
        fill_placeholders(&config.specialization_template, |key| {
            match key {
                "label" => Some(label),
                "focus" => Some(spec.focus.as_str()),
                "approach" => Some(approach.as_str()),
                _ => None,
            }
        })
    )
}

/// Builds the system prompt: persona, user profile, general rules,
/// problem-type specialization and, when retrieval produced anything, the
/// retrieved context. Blocks always appear in that order.
pub fn compose_system_prompt(
    config: &PromptConfig,
    problem_type: Option<&str>,
    profile: &UserProfile,
    context: &[String]
) -> Result<String, PromptError> {
    let mut blocks = vec![
        config.persona.trim().to_string(),
        render_profile(config, profile),
        config.general_rules.trim().to_string(),
        render_specialization(config, problem_type)?
    ];

    let passages = context
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    if !passages.is_empty() {
        let body = passages
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(format!("{}\n{}", config.context_heading, body));
    }

    Ok(blocks.join("\n\n"))
}
