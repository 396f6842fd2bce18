//! Registry configuration: a YAML file with a root `llm.models` mapping,
//! `${ENV_VAR}` expansion in string fields, and `LLM__`-prefixed
//! environment overrides.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as Yaml};
use thiserror::Error;

/// Overrides the default `config.yaml` path.
pub const CONFIG_PATH_ENV: &str = "LLM_CONFIG_PATH";

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const ENV_OVERRIDE_PREFIX: &str = "LLM__";
const ENV_LEVEL_SEPARATOR: &str = "__";

/// One model entry in the registry. Every field has a zero default so
/// partial entries (for example, built up from environment overrides)
/// still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    /// Endpoint override; adapters fall back to their vendor default.
    pub host: Option<String>,
    /// Registry key of the web-search-capable sibling model.
    pub web_variant: Option<String>,
    pub supports_web_search: bool,
    pub supports_tools: bool,
    pub supports_structured_output: bool,
    pub context_window: u32,
    pub max_output_tokens: u32,
}

/// Mapping from user-facing model key to [`ModelConfig`]. A `BTreeMap`
/// keeps iteration in lexicographic key order, which auto-selection
/// depends on.
pub type Registry = BTreeMap<String, ModelConfig>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config missing llm.models section")]
    MissingModels,
}

/// Load the registry from `LLM_CONFIG_PATH` or `./config.yaml`.
pub fn load() -> Result<Registry, ConfigError> {
    let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from_path(path)
}

/// Load the registry from an explicit path.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Registry, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&raw)
}

fn parse(raw: &str) -> Result<Registry, ConfigError> {
    let mut doc: Yaml = serde_yaml::from_str(raw)?;
    apply_env_overrides(&mut doc);
    expand_env_vars(&mut doc);

    let models = doc
        .get("llm")
        .and_then(|llm| llm.get("models"))
        .cloned()
        .ok_or(ConfigError::MissingModels)?;
    Ok(serde_yaml::from_value(models)?)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").unwrap())
}

/// Replace `${VAR}` with the environment value in every string field.
/// Missing variables expand to the empty string.
fn expand_env_vars(value: &mut Yaml) {
    match value {
        Yaml::String(text) => {
            let expanded = env_var_pattern()
                .replace_all(text, |caps: &regex::Captures| {
                    env::var(&caps[1]).unwrap_or_default()
                })
                .into_owned();
            *text = expanded;
        }
        Yaml::Mapping(mapping) => {
            for (_, child) in mapping.iter_mut() {
                expand_env_vars(child);
            }
        }
        Yaml::Sequence(sequence) => {
            for child in sequence {
                expand_env_vars(child);
            }
        }
        _ => {}
    }
}

/// Apply overrides of the form `LLM__MODELS__gpt4o__API_KEY=...`: the
/// prefix names the `llm` root key and each `__` descends one level
/// (segments are lower-cased).
fn apply_env_overrides(doc: &mut Yaml) {
    for (key, value) in env::vars() {
        let Some(stripped) = key.strip_prefix(ENV_OVERRIDE_PREFIX) else {
            continue;
        };
        if stripped.is_empty() {
            continue;
        }
        let mut path = vec!["llm".to_string()];
        path.extend(
            stripped
                .to_lowercase()
                .split(ENV_LEVEL_SEPARATOR)
                .map(str::to_string),
        );
        // Scalars keep their YAML meaning so boolean and numeric fields
        // can be overridden too.
        let parsed = serde_yaml::from_str(&value).unwrap_or(Yaml::String(value));
        set_path(doc, &path, parsed);
    }
}

fn set_path(node: &mut Yaml, path: &[String], value: Yaml) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if !node.is_mapping() {
        *node = Yaml::Mapping(Mapping::new());
    }
    let Some(mapping) = node.as_mapping_mut() else {
        return;
    };
    let key = Yaml::String(head.clone());
    if rest.is_empty() {
        mapping.insert(key, value);
        return;
    }
    let child = mapping
        .entry(key)
        .or_insert_with(|| Yaml::Mapping(Mapping::new()));
    set_path(child, rest, value);
}
