use super::{
    base::{Provider, ToolCalling},
    configs::ProviderConfig,
    openai::OpenAiProvider,
    prompted::PromptedToolsProvider,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

pub const OPENAI_HOST: &str = "https://api.openai.com";
pub const OPENAI_MODEL: &str = "gpt-4o";
pub const GROQ_HOST: &str = "https://api.groq.com/openai";
pub const GROQ_MODEL: &str = "openai/gpt-oss-20b";
pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "qwen2.5";

#[derive(
    EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Groq,
    Ollama,
}

impl ProviderType {
    pub fn default_host(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => OPENAI_HOST,
            ProviderType::Groq => GROQ_HOST,
            ProviderType::Ollama => OLLAMA_HOST,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => OPENAI_MODEL,
            ProviderType::Groq => GROQ_MODEL,
            ProviderType::Ollama => OLLAMA_MODEL,
        }
    }

    /// The conventional environment variable holding the key, if the provider needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAi => Some("OPENAI_API_KEY"),
            ProviderType::Groq => Some("GROQ_API_KEY"),
            ProviderType::Ollama => None,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Ollama(ollama_config) => {
            Ok(Box::new(OpenAiProvider::new(ollama_config.into())?))
        }
    }
}

/// Wrap `provider` so it speaks the requested tool-calling style
pub fn with_tool_calling(provider: Box<dyn Provider>, mode: ToolCalling) -> Box<dyn Provider> {
    match mode {
        ToolCalling::Native => provider,
        ToolCalling::Prompted => Box::new(PromptedToolsProvider::new(provider)),
    }
}
