/// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Ollama(OllamaProviderConfig),
}

/// Any endpoint speaking the OpenAI chat completions API with bearer auth (OpenAI, Groq)
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OllamaProviderConfig {
    pub host: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl From<OllamaProviderConfig> for OpenAiProviderConfig {
    // ollama serves the same chat completions API without auth
    fn from(config: OllamaProviderConfig) -> Self {
        Self {
            host: config.host,
            api_key: None,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}
