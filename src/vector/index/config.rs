//! Configuration types for vector indexes.
//!
//! [`Config`] is the loose key-value object accepted at the API boundary
//! (`nlist`, `metric_type`, `k`, `nprobe`, ...). The typed
//! [`TrainConfig`] and [`SearchConfig`] are built from it and are what the
//! index actually consumes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IvfError, Result};
use crate::vector::core::distance::MetricType;

/// Default number of partitions probed per query.
pub const DEFAULT_NPROBE: usize = 1;

/// Default cap on Lloyd iterations during training.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Default mean centroid movement under which k-means stops early.
pub const DEFAULT_CONVERGENCE_THRESHOLD: f32 = 1e-6;

/// Key-value configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    values: Map<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a JSON object string.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(IvfError::invalid_config(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Set a key, returning the updated configuration.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Read a required positive integer.
    pub fn get_positive(&self, key: &str) -> Result<usize> {
        match self.values.get(key) {
            Some(value) => positive(key, value),
            None => Err(IvfError::invalid_config(format!("missing key '{key}'"))),
        }
    }

    /// Read an optional positive integer, falling back to `default`.
    pub fn get_positive_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.values.get(key) {
            Some(value) => positive(key, value),
            None => Ok(default),
        }
    }

    /// Read an optional string.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.values.get(key) {
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(IvfError::invalid_config(format!(
                "'{key}' must be a string, got {other}"
            ))),
            None => Ok(None),
        }
    }
}

fn positive(key: &str, value: &Value) -> Result<usize> {
    match value.as_u64() {
        Some(n) if n > 0 => usize::try_from(n)
            .map_err(|_| IvfError::invalid_config(format!("'{key}' is out of range: {n}"))),
        _ => Err(IvfError::invalid_config(format!(
            "'{key}' must be a positive integer, got {value}"
        ))),
    }
}

/// Parameters for training a coarse quantizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Number of partitions.
    pub nlist: usize,
    /// Metric used when scanning candidates.
    pub metric: MetricType,
    /// Maximum number of k-means iterations.
    pub max_iterations: usize,
    /// Mean centroid movement below which training stops early.
    pub convergence_threshold: f32,
    /// Seed for k-means++ initialization; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            nlist: 16,
            metric: MetricType::L2,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn new(nlist: usize, metric: MetricType) -> Self {
        Self {
            nlist,
            metric,
            ..Self::default()
        }
    }

    /// Fix the k-means++ seed so training is reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Build from `nlist`, `metric_type`, and optionally `max_iterations`, `seed`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let nlist = config.get_positive("nlist")?;
        let metric = match config.get_str("metric_type")? {
            Some(name) => MetricType::parse_str(name)?,
            None => MetricType::L2,
        };
        let max_iterations = config.get_positive_or("max_iterations", DEFAULT_MAX_ITERATIONS)?;
        let seed = match config.get("seed") {
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                IvfError::invalid_config(format!("'seed' must be an unsigned integer, got {value}"))
            })?),
            None => None,
        };

        Ok(Self {
            nlist,
            metric,
            max_iterations,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            seed,
        })
    }
}

/// Per-call search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of neighbors to return per query.
    pub k: usize,
    /// Number of partitions probed per query.
    pub nprobe: usize,
}

impl SearchConfig {
    pub fn new(k: usize, nprobe: usize) -> Self {
        Self { k, nprobe }
    }

    /// Build from `k` and optionally `nprobe` (default 1).
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            k: config.get_positive("k")?,
            nprobe: config.get_positive_or("nprobe", DEFAULT_NPROBE)?,
        })
    }

    /// Reject zero `k` or `nprobe`.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(IvfError::invalid_config("k must be positive"));
        }
        if self.nprobe == 0 {
            return Err(IvfError::invalid_config("nprobe must be positive"));
        }
        Ok(())
    }
}
