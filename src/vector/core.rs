//! Core data structures for vector search.

pub mod dataset;
pub mod distance;
