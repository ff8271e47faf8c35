//! Vector index module.
//!
//! [`VectorIndex`] is the capability set shared by every index variant:
//! insertion, search, serialization and introspection. Concrete variants are
//! chosen at construction time:
//!
//! - [`ivf::IvfIndex`]: host-resident IVF index.
//! - [`device::DeviceIvfIndex`]: the same index held in accelerator memory.

pub mod config;
pub mod device;
pub mod ivf;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::vector::binary_set::BinarySet;
use crate::vector::core::dataset::Dataset;
use crate::vector::core::distance::MetricType;
use crate::vector::index::config::{Config, SearchConfig};
use crate::vector::search::SearchResult;

/// Where an index keeps its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeviceLocation {
    #[default]
    Host,
    Device(i64),
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceLocation::Host => f.write_str("host"),
            DeviceLocation::Device(id) => write!(f, "device({id})"),
        }
    }
}

/// Trait for vector index implementations.
///
/// Structural mutations (`add`, `add_without_ids`) are serialized against
/// each other and against readers by the implementation; callers may share
/// an index across threads freely.
pub trait VectorIndex: Send + Sync + fmt::Debug {
    /// Whether the index holds a trained quantizer.
    fn is_trained(&self) -> bool;

    /// Add vectors with the ids carried by `dataset`.
    fn add(&self, dataset: &Dataset) -> Result<()>;

    /// Add vectors, assigning sequential ids starting at [`count`](Self::count).
    fn add_without_ids(&self, dataset: &Dataset) -> Result<()>;

    /// k-nearest-neighbor search.
    fn search(&self, queries: &Dataset, params: &SearchConfig) -> Result<SearchResult>;

    /// Persist the index into named blobs.
    fn serialize(&self) -> Result<BinarySet>;

    /// Number of stored vectors.
    fn count(&self) -> usize;

    /// Vector dimensionality, `0` when untrained.
    fn dimension(&self) -> usize;

    /// Candidate metric, `None` when untrained.
    fn metric(&self) -> Option<MetricType>;

    /// Where the index data lives.
    fn device(&self) -> DeviceLocation;

    /// Search with a key-value configuration (`k`, optional `nprobe`).
    fn search_with_config(&self, queries: &Dataset, config: &Config) -> Result<SearchResult> {
        let params = SearchConfig::from_config(config)?;
        self.search(queries, &params)
    }
}
