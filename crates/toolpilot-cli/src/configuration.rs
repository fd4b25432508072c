use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use toolpilot::agent::{AgentConfig, DEFAULT_MAX_STEPS, DEFAULT_SYSTEM_PROMPT};
use toolpilot::providers::base::{ToolCalling, ToolChoice};
use toolpilot::providers::configs::{OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig};
use toolpilot::providers::factory::ProviderType;

use crate::error::{to_env_var, ConfigError, ENV_PREFIX};

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(rename = "type", default = "default_provider_type")]
    pub kind: ProviderType,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    /// `prompted` for endpoints without a function-calling API
    #[serde(default)]
    pub tool_calling: ToolCalling,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: default_provider_type(),
            host: None,
            api_key: None,
            model: None,
            temperature: None,
            max_tokens: None,
            tool_calling: ToolCalling::default(),
        }
    }
}

impl ProviderSettings {
    /// Resolve host and model defaults for the provider type and find the API
    /// key, falling back to the provider's conventional environment variable
    pub fn into_config(self) -> Result<ProviderConfig, ConfigError> {
        let host = self
            .host
            .unwrap_or_else(|| self.kind.default_host().to_string());
        let model = self
            .model
            .unwrap_or_else(|| self.kind.default_model().to_string());

        let Some(key_env) = self.kind.api_key_env() else {
            return Ok(ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            }));
        };

        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .or_else(|| env::var(key_env).ok().filter(|key| !key.is_empty()))
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: format!("{} or {}", to_env_var("provider.api_key"), key_env),
            })?;

        Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
            host,
            api_key: Some(api_key),
            model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            tool_choice: ToolChoice::default(),
            system_prompt: None,
        }
    }
}

impl AgentSettings {
    pub fn into_config(self) -> AgentConfig {
        AgentConfig {
            system_prompt: Some(
                self.system_prompt
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            max_steps: self.max_steps,
            tool_choice: self.tool_choice,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsSettings {
    /// Route discovery and calls through the in-process MCP server
    #[serde(default)]
    pub via_mcp: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub tools: ToolsSettings,
}

impl Settings {
    /// Load defaults, then the config file, then `TOOLPILOT__*` environment
    /// variables. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(File::from(path).format(FileFormat::Toml).required(true)),
            None => default_config_path()
                .map(|path| File::from(path).format(FileFormat::Toml).required(false)),
        };

        let mut builder = Config::builder()
            .set_default("provider.type", default_provider_type().to_string())?
            .set_default("provider.tool_calling", ToolCalling::default().to_string())?
            .set_default("agent.max_steps", default_max_steps() as i64)?
            .set_default("agent.tool_choice", ToolChoice::default().to_string())?
            .set_default("tools.via_mcp", false)?;
        if let Some(file) = file {
            builder = builder.add_source(file);
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// `<config_dir>/toolpilot/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("toolpilot").join("config.toml"))
}

fn default_provider_type() -> ProviderType {
    ProviderType::Groq
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}
