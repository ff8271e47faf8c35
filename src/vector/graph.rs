//! k-nearest-neighbor graph construction on top of an index.

use log::debug;

use crate::error::{IvfError, Result};
use crate::vector::core::dataset::Dataset;
use crate::vector::index::VectorIndex;
use crate::vector::index::config::SearchConfig;

/// Row `i` lists the neighbors of the `i`-th indexed vector, best-first.
/// Slots with no neighbor hold `-1`.
pub type Graph = Vec<Vec<i64>>;

/// Queries per search batch.
pub const DEFAULT_GRAPH_BATCH_SIZE: usize = 100;

/// Builds a [`Graph`] by querying every indexed vector against its own index.
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    index: &'a dyn VectorIndex,
    batch_size: usize,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(index: &'a dyn VectorIndex) -> Self {
        Self {
            index,
            batch_size: DEFAULT_GRAPH_BATCH_SIZE,
        }
    }

    /// Override the number of queries issued per search call. Zero falls back
    /// to the default.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 {
            DEFAULT_GRAPH_BATCH_SIZE
        } else {
            batch_size
        };
        self
    }

    /// Search `k` neighbors for each row of `dataset`, which must hold exactly
    /// the indexed vectors in insertion order.
    pub fn build(&self, k: usize, dataset: &Dataset, nprobe: usize) -> Result<Graph> {
        if k == 0 {
            return Err(IvfError::invalid_input("graph degree k must be positive"));
        }
        let count = self.index.count();
        if dataset.rows() != count {
            return Err(IvfError::invalid_input(format!(
                "graph dataset has {} rows but the index holds {count} vectors",
                dataset.rows()
            )));
        }

        let params = SearchConfig::new(k, nprobe);
        let mut graph: Graph = Vec::new();
        graph
            .try_reserve_exact(count)
            .map_err(|e| IvfError::allocation(format!("Failed to allocate graph: {e}")))?;

        let mut start = 0;
        while start < count {
            let end = (start + self.batch_size).min(count);
            let batch = Dataset::new(dataset.dim(), dataset.slice_rows(start, end).to_vec())?;
            let result = self.index.search(&batch, &params)?;
            graph.extend((0..result.nq()).map(|i| result.row_ids(i).to_vec()));
            debug!("Graph rows {start}..{end} of {count} built");
            start = end;
        }

        Ok(graph)
    }
}
