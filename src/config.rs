// Performance configuration
// Every tunable of a run, loaded from JSON and validated once up front

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arranger::pedal::PedalStyle;
use crate::groove::humanize::HumanizeSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Options for one performance run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Humanization toggles and amounts (flattened into the top-level object)
    #[serde(flatten)]
    pub humanize: HumanizeSettings,

    /// Sustain pedal strategy
    pub pedal_style: PedalStyle,

    /// Group-aware hand assignment instead of a plain pitch split
    pub simulate_hands: bool,

    /// Playback speed factor (1.0 = as written, 2.0 = twice as fast)
    pub tempo_scale: f64,

    /// Map pitches onto the 88-key keyboard instead of the 61-key one
    pub use_88_key_layout: bool,

    /// Fixed RNG seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            humanize: HumanizeSettings::default(),
            pedal_style: PedalStyle::Hybrid,
            simulate_hands: false,
            tempo_scale: 1.0,
            use_88_key_layout: false,
            seed: None,
        }
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(self)
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidParameter(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_ratio(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidParameter(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// Reject values the humanizer and importer cannot work with
pub fn validate_config(config: &PerformanceConfig) -> Result<(), ConfigError> {
    let humanize = &config.humanize;
    check_non_negative("timing_variance", humanize.timing_variance)?;
    check_non_negative("tempo_sway_intensity", humanize.tempo_sway_intensity)?;
    check_ratio("articulation", humanize.articulation)?;
    check_ratio("drift_decay_factor", humanize.drift_decay_factor)?;

    if !config.tempo_scale.is_finite() || config.tempo_scale <= 0.0 {
        return Err(ConfigError::InvalidParameter(format!(
            "tempo_scale must be positive, got {}",
            config.tempo_scale
        )));
    }

    Ok(())
}

/// Load and validate configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PerformanceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: PerformanceConfig = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to a JSON file
pub fn save_config<P: AsRef<Path>>(config: &PerformanceConfig, path: P) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
