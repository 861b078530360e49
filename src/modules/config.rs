use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{
    DEFAULT_CODE_LENGTH, DEFAULT_HASH_ITERATIONS, DEFAULT_INVITATION_TTL, LOG_FILE,
    MAX_CODE_ATTEMPTS, MAX_CODE_LENGTH, STORE_FILE,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime settings, read from a JSON file; missing fields take their defaults
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub store_path: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub invitation_code_length: usize,
    pub max_code_attempts: u32,
    pub default_invitation_ttl_secs: u64,
    pub password_hash_iterations: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(STORE_FILE),
            log_file: PathBuf::from(LOG_FILE),
            log_level: "info".to_string(),
            invitation_code_length: DEFAULT_CODE_LENGTH,
            max_code_attempts: MAX_CODE_ATTEMPTS,
            default_invitation_ttl_secs: DEFAULT_INVITATION_TTL,
            password_hash_iterations: DEFAULT_HASH_ITERATIONS,
        }
    }
}

impl GateConfig {
    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: GateConfig = match fs::read_to_string(path.as_ref()) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => GateConfig::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(config.normalized())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Clamp values into their usable ranges
    pub fn normalized(mut self) -> Self {
        self.invitation_code_length = self.invitation_code_length.clamp(1, MAX_CODE_LENGTH);
        self.max_code_attempts = self.max_code_attempts.max(1);
        self.password_hash_iterations = self.password_hash_iterations.max(1);
        self
    }

    /// Level filter for the logger; unknown names fall back to `Info`
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
