use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemorixConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Flat data directory shared by every editor process.
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Where the native backend's model files live.
    pub model_cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub half_life_hours: f64,
    pub causal_half_life_hours: f64,
}

impl Default for MemorixConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = default_memorix_dir()
            .join("data")
            .to_string_lossy()
            .into_owned();
        Self { data_dir }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model_cache_dir = default_memorix_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self { model_cache_dir }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            half_life_hours: crate::memory::retention::HALF_LIFE_HOURS,
            causal_half_life_hours: crate::memory::retention::CAUSAL_HALF_LIFE_HOURS,
        }
    }
}

/// Returns `~/.memorix/`
pub fn default_memorix_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".memorix")
}

/// Returns the default config file path: `~/.memorix/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memorix_dir().join("config.toml")
}

impl MemorixConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemorixConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (MEMORIX_DATA_DIR, MEMORIX_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMORIX_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("MEMORIX_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Resolve the model cache directory, expanding `~` if needed.
    pub fn resolved_model_cache_dir(&self) -> PathBuf {
        expand_tilde(&self.embedding.model_cache_dir)
    }

    /// The working directory used for project detection. `MEMORIX_CWD` wins
    /// when set, for clients whose own cwd is unusable.
    pub fn working_dir(&self) -> PathBuf {
        if let Ok(cwd) = std::env::var("MEMORIX_CWD") {
            return PathBuf::from(cwd);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    pub fn retention_params(&self) -> crate::memory::retention::RetentionParams {
        crate::memory::retention::RetentionParams {
            half_life_hours: self.retention.half_life_hours,
            causal_half_life_hours: self.retention.causal_half_life_hours,
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MemorixConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert!(config.storage.data_dir.ends_with("data"));
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(
            config.retention.half_life_hours,
            crate::memory::retention::HALF_LIFE_HOURS
        );
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
data_dir = "/tmp/memorix-test"

[retention]
half_life_hours = 100.0
"#;
        let config: MemorixConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.data_dir, "/tmp/memorix-test");
        assert_eq!(config.retention.half_life_hours, 100.0);
        // defaults still apply for unset fields
        assert_eq!(config.search.default_limit, 10);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MemorixConfig::default();
        std::env::set_var("MEMORIX_DATA_DIR", "/tmp/override-data");
        std::env::set_var("MEMORIX_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.data_dir, "/tmp/override-data");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("MEMORIX_DATA_DIR");
        std::env::remove_var("MEMORIX_LOG_LEVEL");
    }
}
