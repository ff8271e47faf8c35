//! # ivfflat
//!
//! An inverted-file (IVF) approximate nearest neighbor index with flat
//! coarse quantization.
//!
//! ## Features
//!
//! - k-means++ training of the coarse quantizer
//! - Bulk insertion with explicit or sequential ids
//! - Parallel multi-query search with a tunable `nprobe`
//! - Versioned, checksummed serialization into a [`vector::BinarySet`]
//! - Host/device migration through pluggable resource pools
//! - k-NN graph construction

pub mod cli;
pub mod device;
pub mod error;
pub mod vector;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
