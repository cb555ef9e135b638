use anyhow::{Context, Result};
use pi_engine::{Language, RetryPolicy, RoundingDigits, TOTAL_SEEDS, WalkOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Highest digit count `round_to_digits` stays exact for.
const MAX_ROUNDING_DIGITS: u32 = 15;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarvestConfigError {
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
    #[error("{field} rounding must be at most {MAX_ROUNDING_DIGITS} digits (got {digits})")]
    Rounding { field: &'static str, digits: u32 },
    #[error("game version must not be empty")]
    EmptyGameVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "RetrySettings::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "RetrySettings::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl RetrySettings {
    const fn default_max_attempts() -> u32 {
        200
    }

    const fn default_poll_interval_ms() -> u64 {
        5
    }

    #[must_use]
    pub const fn policy(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

/// Harvester settings. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "HarvestConfig::default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "HarvestConfig::default_language")]
    pub language: Language,
    #[serde(default = "HarvestConfig::default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "HarvestConfig::default_total_seeds")]
    pub total_seeds: u32,
    #[serde(default)]
    pub rounding: RoundingDigits,
    /// Defaults to `<output_root>/.checkpoints`.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Replaces the embedded catalog.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default = "HarvestConfig::default_progress_step")]
    pub progress_step: u32,
    /// Version quoted by unavailable placeholders.
    #[serde(default = "HarvestConfig::default_game_version")]
    pub game_version: String,
}

impl HarvestConfig {
    fn default_output_root() -> PathBuf {
        PathBuf::from("data")
    }

    const fn default_language() -> Language {
        Language::En
    }

    const fn default_workers() -> usize {
        4
    }

    const fn default_total_seeds() -> u32 {
        TOTAL_SEEDS
    }

    const fn default_progress_step() -> u32 {
        10_000
    }

    fn default_game_version() -> String {
        "4.30".to_string()
    }

    /// Load from `path`, or use defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str::<Self>(&raw)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config
            .validate()
            .context("invalid harvester configuration")?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Rejects zero workers, attempts or seeds, oversized rounding and an
    /// empty game version.
    pub fn validate(&self) -> Result<(), HarvestConfigError> {
        if self.workers == 0 {
            return Err(HarvestConfigError::Zero { field: "workers" });
        }
        if self.retry.max_attempts == 0 {
            return Err(HarvestConfigError::Zero {
                field: "retry.max_attempts",
            });
        }
        if self.total_seeds == 0 {
            return Err(HarvestConfigError::Zero {
                field: "total_seeds",
            });
        }
        for (field, digits) in [
            ("technology", self.rounding.technology),
            ("product", self.rounding.product),
        ] {
            if digits > MAX_ROUNDING_DIGITS {
                return Err(HarvestConfigError::Rounding { field, digits });
            }
        }
        if self.game_version.trim().is_empty() {
            return Err(HarvestConfigError::EmptyGameVersion);
        }
        Ok(())
    }

    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir
            .clone()
            .unwrap_or_else(|| self.output_root.join(".checkpoints"))
    }

    #[must_use]
    pub const fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            retry: self.retry.policy(),
            language: self.language,
            progress_step: self.progress_step,
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_root: Self::default_output_root(),
            language: Self::default_language(),
            workers: Self::default_workers(),
            retry: RetrySettings::default(),
            total_seeds: Self::default_total_seeds(),
            rounding: RoundingDigits::default(),
            checkpoint_dir: None,
            catalog: None,
            progress_step: Self::default_progress_step(),
            game_version: Self::default_game_version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_fill_defaults() {
        let config: HarvestConfig =
            serde_json::from_str(r#"{"workers": 2, "retry": {"max_attempts": 9}}"#).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.retry.max_attempts, 9);
        assert_eq!(config.retry.poll_interval_ms, 5);
        assert_eq!(config.total_seeds, 100_000);
        assert_eq!(config.rounding.product, 5);
        assert_eq!(config.game_version, "4.30");
        assert_eq!(config.checkpoint_dir(), PathBuf::from("data/.checkpoints"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nonsensical_values_are_rejected() {
        let mut config = HarvestConfig {
            workers: 0,
            ..HarvestConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(HarvestConfigError::Zero { field: "workers" })
        );
        config.workers = 1;
        config.rounding.technology = 16;
        assert_eq!(
            config.validate(),
            Err(HarvestConfigError::Rounding {
                field: "technology",
                digits: 16
            })
        );
        config.rounding.technology = 3;
        config.total_seeds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn language_uses_column_codes() {
        let config: HarvestConfig = serde_json::from_str(r#"{"language": "zh-Hans"}"#).unwrap();
        assert_eq!(config.language, Language::ZhHans);
        assert_eq!(config.walk_options().retry.poll_interval, Duration::from_millis(5));
    }
}
