use dirs::config_dir;
use eyre::{OptionExt, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub gemini_api_key: String,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub temperature: f64,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Seconds to wait for the next chunk before giving up on the stream
    pub chunk_timeout_secs: u64,
    pub scan_mode: ScanMode,
}

/// How much of the transcript is re-scanned for fields on every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Re-scan the whole transcript
    Full,
    /// Re-scan from the start of the last unterminated line only
    #[default]
    Incremental,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_timeout_secs: 60,
            scan_mode: ScanMode::Incremental,
        }
    }
}

impl Config {
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self> {
        let config_path = Self::get_config_path(custom_path)?;
        debug!("Loading config from {}", config_path.display());

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            bail!(
                "Created default config at {}. Please add your Gemini API key.",
                config_path.display()
            );
        }

        let mut config = Self::load_from(&config_path)?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                debug!("Using API key from {}", API_KEY_ENV);
                config.gemini_api_key = key;
            }
        }

        if config.gemini_api_key.trim().is_empty() {
            bail!(
                "Gemini API key not set in {} or {}",
                config_path.display(),
                API_KEY_ENV
            );
        }

        Ok(config)
    }

    /// Parse and validate a config file without touching the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&contents).wrap_err("Failed to parse config file")?;
        config.validate()?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).wrap_err("Failed to serialize config")?;

        fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    pub fn get_config_path(custom_path: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let config_dir = config_dir().ok_or_eyre("Failed to get config directory")?;
        Ok(config_dir.join("harvest-interpreter").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            bail!(
                "model.temperature must be between 0.0 and 2.0, got {}",
                self.model.temperature
            );
        }
        if self.model.name.trim().is_empty() {
            bail!("model.name must not be empty");
        }
        if self.stream.chunk_timeout_secs == 0 {
            bail!("stream.chunk_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "gemini_api_key = \"abc\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.gemini_api_key, "abc");
        assert_eq!(config.model.name, "gemini-1.5-flash");
        assert_eq!(config.stream.chunk_timeout_secs, 60);
        assert_eq!(config.stream.scan_mode, ScanMode::Incremental);
    }

    #[test]
    fn saved_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.gemini_api_key = "key".to_string();
        config.stream.scan_mode = ScanMode::Full;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.stream.scan_mode, ScanMode::Full);
        assert_eq!(loaded.gemini_api_key, "key");
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
gemini_api_key = "abc"

[model]
name = "gemini-1.5-flash"
temperature = 3.5
endpoint = "https://example.invalid"
"#,
        )
        .unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
gemini_api_key = "abc"

[stream]
chunk_timeout_secs = 0
scan_mode = "full"
"#,
        )
        .unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let err = Config::load(Some(path.clone())).unwrap_err();
        assert!(err.to_string().contains("Created default config"));
        assert!(path.exists());
    }
}
