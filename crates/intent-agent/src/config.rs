//! Agent configuration file
//!
//! ```yaml
//! model: gpt-3.5-turbo-0613
//! api_key_env: OPENAI_API_KEY
//! specs:
//!   - source: ./oases/petstore.yaml
//!     auth:
//!       token: ${PETSTORE_TOKEN}
//! ```

use std::path::{Path, PathBuf};

use api_catalog::{Credentials, SpecSource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::agent::{AgentOptions, SpecConfig, DEFAULT_MODEL};
use crate::error::{AgentError, AgentResult};

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var regex should be valid")
});

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the oracle API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub specs: Vec<SpecEntry>,

    /// Directory relative spec paths resolve against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecEntry {
    /// File path or http(s) URL
    pub source: String,
    #[serde(default)]
    pub auth: Option<Credentials>,
}

impl AgentConfig {
    /// Read a config file; `.json` files parse as JSON, anything else as YAML
    pub async fn load(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut config = if is_json {
            serde_json::from_str::<AgentConfig>(&content)
                .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Self::from_yaml(&content)?
        };

        config.base_dir = path.parent().map(Path::to_path_buf);
        debug!("Loaded config from {} with {} specs", path.display(), config.specs.len());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> AgentResult<Self> {
        serde_yaml::from_str(content).map_err(|e| AgentError::Config(e.to_string()))
    }

    /// Resolve the oracle key and expand `${VAR}` references from the process environment
    pub fn into_options(self) -> AgentResult<AgentOptions> {
        self.into_options_with(|name| std::env::var(name).ok())
    }

    /// Same as [`into_options`](Self::into_options) with a custom variable lookup
    pub fn into_options_with<F>(self, lookup: F) -> AgentResult<AgentOptions>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&self.api_key_env).filter(|key| !key.is_empty()).ok_or_else(|| {
            AgentError::Config(format!("environment variable {} is not set", self.api_key_env))
        })?;
        let specs = self.spec_configs_with(&lookup)?;

        Ok(AgentOptions {
            api_key,
            model: Some(self.model),
            base_url: self.base_url,
            specs,
        })
    }

    /// The configured specs with `${VAR}` references expanded; needs no oracle key
    pub fn spec_configs(&self) -> AgentResult<Vec<SpecConfig>> {
        self.spec_configs_with(&|name: &str| std::env::var(name).ok())
    }

    pub fn spec_configs_with<F>(&self, lookup: &F) -> AgentResult<Vec<SpecConfig>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut specs = Vec::with_capacity(self.specs.len());
        for entry in &self.specs {
            let source = resolve_source(&entry.source, self.base_dir.as_deref());
            let mut spec = SpecConfig::new(source);
            if let Some(auth) = &entry.auth {
                spec = spec.with_auth(expand_credentials(auth, lookup)?);
            }
            specs.push(spec);
        }
        Ok(specs)
    }
}

fn resolve_source(source: &str, base_dir: Option<&Path>) -> SpecSource {
    match (SpecSource::from(source), base_dir) {
        (SpecSource::Path(path), Some(dir)) if path.is_relative() => SpecSource::Path(dir.join(path)),
        (source, _) => source,
    }
}

fn expand_credentials<F>(auth: &Credentials, lookup: &F) -> AgentResult<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    auth.iter()
        .map(|(key, value)| -> AgentResult<(String, String)> {
            Ok((key.clone(), expand_env(value, lookup)?))
        })
        .collect()
}

/// Replace every `${VAR}` with its value. A missing variable is an error.
pub fn expand_env<F>(value: &str, lookup: &F) -> AgentResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(value.len());
    let mut last = 0;
    for caps in ENV_VAR_REGEX.captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        let name = &caps[1];
        let replacement = lookup(name).ok_or_else(|| {
            AgentError::Config(format!("environment variable {} is not set", name))
        })?;
        expanded.push_str(&value[last..whole.start()]);
        expanded.push_str(&replacement);
        last = whole.end();
    }
    expanded.push_str(&value[last..]);
    Ok(expanded)
}
