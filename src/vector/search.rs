//! Vector search module: partition probing, candidate scans and top-k collection.

pub mod collector;
pub mod searcher;

pub use self::searcher::SearchResult;
