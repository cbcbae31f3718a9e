//! Configuration for cold item inference.

use crate::error::{ColdVecError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration for an inference run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Per-item estimator configuration.
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Worker pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Input record parsing configuration.
    #[serde(default)]
    pub input: InputConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ColdVecError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Checks that all values are usable.
    pub fn validate(&self) -> Result<()> {
        self.estimator.validate()?;
        self.pool.validate()?;
        self.input.validate()
    }
}

/// Estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Number of full passes over an item's tokens.
    /// Default: 200.
    pub num_iters: usize,

    /// Initial learning rate.
    /// Default: 0.01.
    pub learning_rate: f32,

    /// Learning rate reached at the last epoch.
    /// Default: 0.0001.
    pub min_learning_rate: f32,

    /// Negative samples drawn per positive token.
    /// Default: 50.
    pub num_negatives: usize,

    /// Target length of the negative sampling table.
    /// Default: 5,000,000.
    pub neg_table_size: usize,

    /// Sigmoid saturation bound; inputs beyond +/- this value clamp.
    /// Default: 8.0.
    pub max_sigmoid: f32,

    /// Number of quantization steps in the sigmoid table.
    /// Default: 512.
    pub sigmoid_resolution: usize,

    /// Redraw a negative that equals the positive token of the same step.
    /// Default: false.
    pub exclude_positive_negatives: bool,

    /// Random seed for table shuffling.
    /// Default: None (random).
    pub seed: Option<u64>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            num_iters: 200,
            learning_rate: 0.01,
            min_learning_rate: 0.0001,
            num_negatives: 50,
            neg_table_size: crate::DEFAULT_NEG_TABLE_SIZE,
            max_sigmoid: crate::DEFAULT_MAX_SIGMOID,
            sigmoid_resolution: crate::DEFAULT_SIGMOID_RESOLUTION,
            exclude_positive_negatives: false,
            seed: None,
        }
    }
}

impl EstimatorConfig {
    fn validate(&self) -> Result<()> {
        if self.num_iters == 0 {
            return Err(ColdVecError::Config("num_iters must be positive".to_string()));
        }
        if self.neg_table_size == 0 {
            return Err(ColdVecError::Config("neg_table_size must be positive".to_string()));
        }
        if self.sigmoid_resolution == 0 {
            return Err(ColdVecError::Config(
                "sigmoid_resolution must be positive".to_string(),
            ));
        }
        if self.max_sigmoid.is_nan() || self.max_sigmoid <= 0.0 {
            return Err(ColdVecError::Config("max_sigmoid must be positive".to_string()));
        }
        if self.learning_rate < self.min_learning_rate {
            return Err(ColdVecError::Config(format!(
                "learning_rate {} is below min_learning_rate {}",
                self.learning_rate, self.min_learning_rate
            )));
        }
        Ok(())
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads, each with its own estimator.
    /// Default: 4.
    pub num_workers: usize,

    /// Items with more tokens than this are skipped.
    /// Default: 40.
    pub max_word_num: usize,

    /// Bounded wait for a single job dequeue, in milliseconds.
    /// Default: 1500.
    pub dequeue_timeout_ms: u64,

    /// Interval between queue depth reports, in milliseconds.
    /// Default: 5000.
    pub progress_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            max_word_num: 40,
            dequeue_timeout_ms: 1500,
            progress_interval_ms: 5000,
        }
    }
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(ColdVecError::Config("num_workers must be positive".to_string()));
        }
        if self.dequeue_timeout_ms == 0 || self.progress_interval_ms == 0 {
            return Err(ColdVecError::Config(
                "queue wait intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input record parsing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Field separator between item id and token list.
    /// Default: tab.
    pub separator: char,

    /// Reserved strings marking a missing field.
    /// Default: `\N` and `NULL`.
    pub null_markers: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            separator: '\t',
            null_markers: vec!["\\N".to_string(), "NULL".to_string()],
        }
    }
}

impl InputConfig {
    fn validate(&self) -> Result<()> {
        if self.separator == ',' || self.separator == '"' {
            return Err(ColdVecError::Config(format!(
                "separator {:?} collides with the token list syntax",
                self.separator
            )));
        }
        if self.null_markers.iter().any(|m| m.is_empty()) {
            return Err(ColdVecError::Config("null markers must be non-empty".to_string()));
        }
        Ok(())
    }

    /// Returns true if the field is empty or carries a null marker.
    pub fn is_null(&self, field: &str) -> bool {
        field.is_empty() || self.null_markers.iter().any(|m| field.contains(m.as_str()))
    }
}
