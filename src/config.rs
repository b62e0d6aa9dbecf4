use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::DEFAULT_DEADLINE;
use crate::validator::{CommandValidator, DEFAULT_DENYLIST};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub execution: ExecutionConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    // Defaults to ~/.tk when unset
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
    // Replaces the built-in denylist when set
    pub denylist: Option<Vec<String>>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DEADLINE.as_secs(),
            denylist: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub max_history_shown: usize,
    pub language: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_history_shown: 10,
            language: "auto".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Loads `~/.tk/config.toml`, writing the defaults on first run, then
    /// applies `TK_DATA_DIR` and `TK_TIMEOUT_SECS`.
    pub fn new() -> Result<Self> {
        let mut config = Self::load_or_create(&Self::get_config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            fs::create_dir_all(config_dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = var("TK_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = var("TK_TIMEOUT_SECS").filter(|v| !v.trim().is_empty()) {
            self.execution.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid TK_TIMEOUT_SECS '{}'", secs))?;
        }
        if self.execution.timeout_secs == 0 {
            anyhow::bail!("execution.timeout_secs must be greater than 0");
        }
        Ok(())
    }

    fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tk")
    }

    fn get_config_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(Self::home_dir)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    pub fn validator(&self) -> CommandValidator {
        match &self.execution.denylist {
            Some(entries) => CommandValidator::new(entries),
            None => CommandValidator::new(DEFAULT_DENYLIST.iter().copied()),
        }
    }

    pub fn get_effective_language(&self) -> String {
        if self.display.language == "auto" {
            // Try to get system language
            std::env::var("LANG")
                .unwrap_or_else(|_| "en_US".to_string())
                .split('.')
                .next()
                .unwrap_or("en")
                .to_string()
        } else {
            self.display.language.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn first_load_writes_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_or_create(&path)?;
        assert!(path.exists());
        assert_eq!(config.deadline(), DEFAULT_DEADLINE);
        assert_eq!(config.display.max_history_shown, 10);
        assert_eq!(config.logging.level, "warn");
        Ok(())
    }

    #[test]
    fn partial_file_fills_in_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[execution]\ntimeout_secs = 30\ndenylist = [\"sleep\"]\n",
        )?;
        let config = Config::load_or_create(&path)?;
        assert_eq!(config.deadline(), Duration::from_secs(30));
        assert_eq!(config.display.language, "auto");

        let validator = config.validator();
        assert!(!validator.is_safe("sleep 1"));
        assert!(validator.is_safe("rm -f x"));
        Ok(())
    }

    #[test]
    fn env_overrides_file_values() -> Result<()> {
        let vars: HashMap<&str, &str> =
            [("TK_DATA_DIR", "/srv/tk"), ("TK_TIMEOUT_SECS", " 12 ")].into();
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()))?;
        assert_eq!(config.data_dir(), PathBuf::from("/srv/tk"));
        assert_eq!(config.deadline(), Duration::from_secs(12));
        Ok(())
    }

    #[test]
    fn zero_or_garbage_timeout_is_rejected() {
        let mut config = Config::default();
        assert!(config.apply_env(|k| (k == "TK_TIMEOUT_SECS").then(|| "0".to_string())).is_err());
        let mut config = Config::default();
        assert!(config.apply_env(|k| (k == "TK_TIMEOUT_SECS").then(|| "soon".to_string())).is_err());
    }
}
