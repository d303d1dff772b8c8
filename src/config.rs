use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::gateway::Credentials;

pub const API_KEY_ENV: &str = "CRIMP_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode config: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One athlete the app may save sessions for, with its fixed sign-in pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AthleteConfig {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl AthleteConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub api_key: String,
    pub athletes: Vec<AthleteConfig>,
    pub default_athlete: Option<String>,
    pub email_recipient: Option<String>,
    pub tick_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            api_key: String::new(),
            athletes: Vec::new(),
            default_athlete: None,
            email_recipient: None,
            tick_interval_ms: 1000,
        }
    }
}

impl Config {
    pub fn athlete(&self, name: &str) -> Option<&AthleteConfig> {
        self.athletes.iter().find(|a| a.name == name)
    }

    /// The explicitly requested athlete, else the configured default, else the only one.
    pub fn select_athlete(&self, requested: Option<&str>) -> Option<&AthleteConfig> {
        match requested.or(self.default_athlete.as_deref()) {
            Some(name) => self.athlete(name),
            None if self.athletes.len() == 1 => self.athletes.first(),
            None => None,
        }
    }

    pub fn has_backend(&self) -> bool {
        !self.backend_url.trim().is_empty()
    }

    /// Applies `CRIMP_API_KEY` when it is set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        self.with_api_key_override(std::env::var(API_KEY_ENV).ok())
    }

    fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = key;
        }
        self
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "crimp") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("crimp_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice::<Config>(&bytes).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable config {}: {e}", self.path.display());
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
