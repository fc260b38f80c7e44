//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Raw configuration as read from YAML; absent fields fall back to the
/// defaults of [`EngineConfig`].
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct EngineConfigRaw {
    /// worker threads for the parallel search folds (1 = sequential)
    pub workers: Option<usize>,
    /// stop balancing after this many placements (negative = unlimited)
    pub max_rounds: Option<i64>,
    /// stop balancing once the score drops to this value
    pub min_score: Option<f64>,
    /// minimum score gain required per accepted round
    pub min_gain: Option<f64>,
    /// score above which any strict improvement is accepted
    pub min_gain_limit: Option<f64>,
}

/// Engine tunables.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// worker threads for the parallel search folds (1 = sequential)
    pub workers: usize,
    /// stop balancing after this many placements (negative = unlimited)
    pub max_rounds: i64,
    /// stop balancing once the score drops to this value
    pub min_score: f64,
    /// minimum score gain required per accepted round
    pub min_gain: f64,
    /// score above which any strict improvement is accepted
    pub min_gain_limit: f64,
}

impl EngineConfig {
    /// Creates a config with default parameter values.
    pub fn new() -> Self {
        Self {
            workers: 1,
            max_rounds: -1,
            min_score: 1e-9,
            min_gain: 0.01,
            min_gain_limit: 0.1,
        }
    }

    /// Creates a config by reading parameter values from a YAML file
    /// (uses default values for absent parameters).
    pub fn from_file(file_name: &str) -> Self {
        let raw: EngineConfigRaw = serde_yaml::from_str(
            &std::fs::read_to_string(file_name)
                .unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));
        let default = EngineConfig::new();
        Self {
            workers: raw.workers.unwrap_or(default.workers),
            max_rounds: raw.max_rounds.unwrap_or(default.max_rounds),
            min_score: raw.min_score.unwrap_or(default.min_score),
            min_gain: raw.min_gain.unwrap_or(default.min_gain),
            min_gain_limit: raw.min_gain_limit.unwrap_or(default.min_gain_limit),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
