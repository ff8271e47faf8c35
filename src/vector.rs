//! IVF-Flat approximate nearest neighbor search.
//!
//! # Module Structure
//!
//! - `core`: datasets and distance metrics
//! - `index`: index trait, configuration, host and device IVF indexes
//! - `search`: top-k collection and probe-and-scan search
//! - `binary_set`: named blobs used for persistence
//! - `graph`: k-NN graph construction

pub mod binary_set;
pub mod core;
pub mod graph;
pub mod index;
pub mod search;

pub use self::binary_set::BinarySet;
pub use self::core::dataset::Dataset;
pub use self::core::distance::MetricType;
pub use self::index::VectorIndex;
pub use self::search::SearchResult;
