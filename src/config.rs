use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL override; each provider has its own default.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable the API credential is read from.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            url: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            sample_limit: default_sample_limit(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_sample_limit() -> usize {
    50
}

impl OracleConfig {
    /// Whether this provider talks to a remote service and needs a credential.
    pub fn is_remote(&self) -> bool {
        matches!(self.provider.as_str(), "gemini" | "openai")
    }

    /// Environment variable holding the API key, per provider unless overridden.
    pub fn key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(name), _) => name,
            (None, "openai") => "OPENAI_API_KEY",
            (None, _) => "GEMINI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: default_language(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_language() -> String {
    "Korean".to_string()
}
fn default_max_chars() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Config {
    /// Defaults for every section; used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            oracle: OracleConfig::default(),
            analysis: AnalysisConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    match config.oracle.provider.as_str() {
        "gemini" | "openai" | "rules" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown oracle provider: '{}'. Must be gemini, openai, rules, or disabled.",
            other
        ),
    }

    if config.oracle.is_remote() && config.oracle.model.trim().is_empty() {
        anyhow::bail!(
            "oracle.model must be specified when provider is '{}'",
            config.oracle.provider
        );
    }

    if config.oracle.sample_limit == 0 {
        anyhow::bail!("oracle.sample_limit must be > 0");
    }

    if config.analysis.max_chars == 0 {
        anyhow::bail!("analysis.max_chars must be > 0");
    }

    if config.server.max_upload_bytes == 0 {
        anyhow::bail!("server.max_upload_bytes must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.oracle.provider, "gemini");
        assert_eq!(config.oracle.sample_limit, 50);
        assert_eq!(config.analysis.max_chars, 400);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config: Config = toml::from_str("[oracle]\nprovider = \"bard\"\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown oracle provider"));
    }

    #[test]
    fn zero_sample_limit_is_rejected() {
        let config: Config =
            toml::from_str("[oracle]\nprovider = \"rules\"\nsample_limit = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn key_env_defaults_per_provider() {
        let mut oracle = OracleConfig::default();
        assert_eq!(oracle.key_env(), "GEMINI_API_KEY");
        oracle.provider = "openai".into();
        assert_eq!(oracle.key_env(), "OPENAI_API_KEY");
        oracle.api_key_env = Some("MY_KEY".into());
        assert_eq!(oracle.key_env(), "MY_KEY");
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("salesboard.toml");
        std::fs::write(
            &path,
            "[oracle]\nprovider = \"rules\"\n\n[server]\nbind = \"0.0.0.0:9000\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.oracle.provider, "rules");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }
}
