use thiserror::Error;

pub const ENV_PREFIX: &str = "TOOLPILOT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration, set the {env_var} environment variable")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted config path to the environment variable that sets it,
/// e.g. `provider.api_key` to `TOOLPILOT__PROVIDER__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "{}__{}",
        ENV_PREFIX,
        field_path.replace('.', "__").to_uppercase()
    )
}
