use crate::{BagError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default cap on spill files taking part in the final merge.
pub const DEFAULT_MAX_SPILL_FILES: usize = 100;

pub const ENV_THRESHOLD: &str = "SPILLBAG_THRESHOLD";
pub const ENV_MAX_SPILL_FILES: &str = "SPILLBAG_MAX_SPILL_FILES";
pub const ENV_TMP_DIR: &str = "SPILLBAG_TMP_DIR";

/// Tuning for one bag. Passed to every constructor; nothing here is global.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpillConfig {
    /// Buffered element count at which the buffer spills. `None` keeps everything in memory.
    pub spill_threshold: Option<usize>,
    /// Spill files allowed into the final merge before premerge rounds kick in.
    pub max_spill_files: usize,
    /// Directory for spill files. `None` uses the system temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            spill_threshold: None,
            max_spill_files: DEFAULT_MAX_SPILL_FILES,
            temp_dir: None,
        }
    }
}

impl SpillConfig {
    pub fn with_spill_threshold(mut self, threshold: usize) -> Self {
        self.spill_threshold = Some(threshold);
        self
    }

    pub fn with_max_spill_files(mut self, max_spill_files: usize) -> Self {
        self.max_spill_files = max_spill_files;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Build from `SPILLBAG_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_THRESHOLD) {
            config.spill_threshold = Some(parse_count(ENV_THRESHOLD, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_SPILL_FILES) {
            config.max_spill_files = parse_count(ENV_MAX_SPILL_FILES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TMP_DIR) {
            if !raw.is_empty() {
                config.temp_dir = Some(PathBuf::from(raw));
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_spill_files < 2 {
            return Err(BagError::Config(format!(
                "max_spill_files must be at least 2, got {}",
                self.max_spill_files
            )));
        }
        if self.spill_threshold == Some(0) {
            return Err(BagError::Config("spill_threshold must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn spill_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| BagError::Config(format!("{}={:?}: {}", key, raw, e)))
}
