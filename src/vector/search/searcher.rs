//! Probe-and-scan search over partitioned vectors.

use rayon::prelude::*;

use crate::error::{IvfError, Result};
use crate::vector::core::distance::MetricType;
use crate::vector::index::config::SearchConfig;
use crate::vector::index::ivf::lists::ListScan;
use crate::vector::index::ivf::quantizer::CoarseQuantizer;
use crate::vector::search::collector::TopKCollector;

/// Owned `nq × k` search output, row `i` holding the neighbors of query `i`
/// best-first. Unfilled slots carry id `-1` and the metric's sentinel
/// distance (`+inf` for L2, `-inf` for inner product).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    nq: usize,
    k: usize,
    ids: Vec<i64>,
    distances: Vec<f32>,
}

impl SearchResult {
    /// Allocate a sentinel-filled result, reporting allocation failure.
    pub(crate) fn allocate(nq: usize, k: usize, metric: MetricType) -> Result<Self> {
        let elems = nq.checked_mul(k).ok_or_else(|| {
            IvfError::allocation(format!("Result size {nq} x {k} overflows"))
        })?;

        let mut ids: Vec<i64> = Vec::new();
        ids.try_reserve_exact(elems).map_err(|e| {
            IvfError::allocation(format!("Failed to allocate {elems} result ids: {e}"))
        })?;
        let mut distances: Vec<f32> = Vec::new();
        distances.try_reserve_exact(elems).map_err(|e| {
            IvfError::allocation(format!("Failed to allocate {elems} result distances: {e}"))
        })?;
        ids.resize(elems, -1);
        distances.resize(elems, metric.sentinel());

        Ok(Self {
            nq,
            k,
            ids,
            distances,
        })
    }

    /// Number of queries.
    pub fn nq(&self) -> usize {
        self.nq
    }

    /// Neighbors per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// All ids, row-major.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// All distances, row-major.
    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    /// Ids for query `i`.
    pub fn row_ids(&self, i: usize) -> &[i64] {
        &self.ids[i * self.k..(i + 1) * self.k]
    }

    /// Distances for query `i`.
    pub fn row_distances(&self, i: usize) -> &[f32] {
        &self.distances[i * self.k..(i + 1) * self.k]
    }

    /// Split into the id and distance buffers.
    pub fn into_parts(self) -> (Vec<i64>, Vec<f32>) {
        (self.ids, self.distances)
    }
}

/// Search `queries` (row-major, `quantizer.dim()` wide) against `lists`.
///
/// `nprobe` above `nlist` is clamped. Zero `k` or `nprobe` is rejected.
pub fn search_lists<L: ListScan>(
    quantizer: &CoarseQuantizer,
    lists: &L,
    metric: MetricType,
    queries: &[f32],
    params: &SearchConfig,
) -> Result<SearchResult> {
    params.validate()?;
    let dim = quantizer.dim();
    if queries.len() % dim != 0 {
        return Err(IvfError::invalid_input(format!(
            "Query buffer of length {} is not a multiple of dimension {dim}",
            queries.len()
        )));
    }

    let nq = queries.len() / dim;
    let k = params.k;
    let nprobe = params.nprobe.min(quantizer.nlist());
    let mut result = SearchResult::allocate(nq, k, metric)?;

    result
        .ids
        .par_chunks_mut(k)
        .zip(result.distances.par_chunks_mut(k))
        .zip(queries.par_chunks_exact(dim))
        .for_each(|((ids, distances), query)| {
            let collector = scan_query(quantizer, lists, metric, query, k, nprobe);
            collector.write_into(ids, distances);
        });

    Ok(result)
}

/// Probe the `nprobe` nearest partitions of one query and rank their entries.
pub(crate) fn scan_query<L: ListScan>(
    quantizer: &CoarseQuantizer,
    lists: &L,
    metric: MetricType,
    query: &[f32],
    k: usize,
    nprobe: usize,
) -> TopKCollector {
    let dim = quantizer.dim();
    let mut collector = TopKCollector::new(k, metric);

    for list in quantizer.probe(query, nprobe) {
        let (ids, vectors) = lists.list(list);
        for (&id, vector) in ids.iter().zip(vectors.chunks_exact(dim)) {
            collector.collect(id, metric.score(query, vector));
        }
    }

    collector
}
