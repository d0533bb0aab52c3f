use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::LiftRsError;
use crate::logging::LogConfig;
use crate::progression::{ProgressionLimits, ProgressionOptions};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Session detection settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Progression engine defaults and limits
    #[serde(default)]
    pub progression: ProgressionSettings,

    /// Document store settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Session detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Seconds without an activity signal before a session finishes
    pub inactivity_window_secs: u64,

    /// Sessions shorter than this raise no notification (disabled when unset)
    pub min_session_minutes: Option<u32>,
}

/// Progression engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionSettings {
    /// RPE added per week when the user does not choose one
    pub default_rpe_increase: Decimal,

    /// RPE caps and deload targets
    pub limits: ProgressionLimits,
}

/// Document store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database path
    pub database_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            session: SessionSettings::default(),
            progression: ProgressionSettings::default(),
            storage: StorageSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            inactivity_window_secs: 15 * 60,
            min_session_minutes: None,
        }
    }
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        ProgressionSettings {
            default_rpe_increase: dec!(0.5),
            limits: ProgressionLimits::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("liftrs")
                .join("liftrs.db"),
        }
    }
}

impl SessionSettings {
    pub fn inactivity_window(&self) -> Duration {
        Duration::from_secs(self.inactivity_window_secs)
    }
}

impl ProgressionSettings {
    /// Options for a run, using the configured increase when none is given
    pub fn options(&self, rpe_increase: Option<Decimal>, deload_last_week: bool) -> ProgressionOptions {
        ProgressionOptions {
            rpe_increase: rpe_increase.unwrap_or(self.default_rpe_increase),
            deload_last_week,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        // Update modification timestamp
        self.metadata.updated_at = Utc::now();

        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".liftrs")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    path = %config_path.display(),
                    error = %err,
                    "Config file not usable, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Save configuration to default location
    pub fn save_default(&mut self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to_file(config_path)
    }

    /// Reject settings the session and progression engines cannot run with
    pub fn validate(&self) -> std::result::Result<(), LiftRsError> {
        if self.session.inactivity_window_secs == 0 {
            return Err(LiftRsError::Configuration(
                "session.inactivity_window_secs must be greater than 0".to_string(),
            ));
        }

        let limits = &self.progression.limits;
        for (name, value) in [
            ("main_rpe_cap", limits.main_rpe_cap),
            ("accessory_rpe_cap", limits.accessory_rpe_cap),
        ] {
            if value <= Decimal::ZERO {
                return Err(LiftRsError::Configuration(format!(
                    "progression.limits.{} must be positive, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}
