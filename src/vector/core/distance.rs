//! Distance metrics for vector similarity calculation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{IvfError, Result};

/// Metric used to rank candidates during search.
///
/// `L2` reports squared Euclidean distances (smaller is better).
/// `InnerProduct` reports raw dot products (larger is better).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MetricType {
    /// Squared Euclidean distance.
    #[default]
    #[serde(rename = "L2")]
    L2,
    /// Inner product similarity.
    #[serde(rename = "IP")]
    InnerProduct,
}

impl MetricType {
    /// Score `b` against `a` under this metric.
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricType::L2 => l2_squared(a, b),
            MetricType::InnerProduct => inner_product(a, b),
        }
    }

    /// Score with a dimension check, for callers holding unvalidated slices.
    pub fn checked_score(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(IvfError::invalid_input(format!(
                "Vector dimensions must match for distance calculation: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        Ok(self.score(a, b))
    }

    /// Whether `a` ranks strictly ahead of `b`.
    #[inline]
    pub fn is_better(&self, a: f32, b: f32) -> bool {
        match self {
            MetricType::L2 => a < b,
            MetricType::InnerProduct => a > b,
        }
    }

    /// Ordering that sorts best-first.
    #[inline]
    pub fn compare(&self, a: f32, b: f32) -> Ordering {
        match self {
            MetricType::L2 => a.total_cmp(&b),
            MetricType::InnerProduct => b.total_cmp(&a),
        }
    }

    /// Distance written into padded result slots.
    pub fn sentinel(&self) -> f32 {
        match self {
            MetricType::L2 => f32::INFINITY,
            MetricType::InnerProduct => f32::NEG_INFINITY,
        }
    }

    /// Get the configuration name of this metric.
    pub fn name(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::InnerProduct => "IP",
        }
    }

    /// Parse a metric from its configuration name.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L2" | "EUCLIDEAN" => Ok(MetricType::L2),
            "IP" | "INNER_PRODUCT" | "DOT_PRODUCT" => Ok(MetricType::InnerProduct),
            _ => Err(IvfError::invalid_config(format!(
                "Unknown metric_type: {s}"
            ))),
        }
    }

    pub(crate) fn to_tag(self) -> u8 {
        match self {
            MetricType::L2 => 0,
            MetricType::InnerProduct => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MetricType::L2),
            1 => Some(MetricType::InnerProduct),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Squared Euclidean distance.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Dot product.
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
