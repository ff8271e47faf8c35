//! IVF vector index implementation.
//!
//! An [`IvfIndex`] partitions vectors with a flat coarse quantizer and keeps
//! one inverted list per partition. Search probes the `nprobe` partitions
//! whose centroids are closest to the query and scans only their entries.
//!
//! ```
//! use ivfflat::vector::core::dataset::Dataset;
//! use ivfflat::vector::core::distance::MetricType;
//! use ivfflat::vector::index::VectorIndex;
//! use ivfflat::vector::index::config::{SearchConfig, TrainConfig};
//! use ivfflat::vector::index::ivf::{IvfIndex, model};
//!
//! # fn main() -> ivfflat::error::Result<()> {
//! let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
//! let dataset = Dataset::new(2, data)?;
//!
//! let model = model::train(&dataset, &TrainConfig::new(4, MetricType::L2).with_seed(3))?;
//! let index = IvfIndex::from_model(&model);
//! index.add_without_ids(&dataset)?;
//!
//! let query = Dataset::new(2, vec![10.0, 11.0])?;
//! let result = index.search(&query, &SearchConfig::new(1, 4))?;
//! assert_eq!(result.row_ids(0), &[5]);
//! # Ok(())
//! # }
//! ```

pub mod lists;
pub mod model;
pub mod quantizer;
pub mod serialize;

#[cfg(test)]
mod tests;

use ahash::AHashSet;
use log::{debug, info};
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::device::DeviceResourcePool;
use crate::error::{IvfError, Result};
use crate::vector::binary_set::BinarySet;
use crate::vector::core::dataset::Dataset;
use crate::vector::core::distance::MetricType;
use crate::vector::graph::{Graph, GraphBuilder};
use crate::vector::index::config::SearchConfig;
use crate::vector::index::device::DeviceIvfIndex;
use crate::vector::index::ivf::lists::InvertedLists;
use crate::vector::index::ivf::model::TrainedModel;
use crate::vector::index::ivf::quantizer::CoarseQuantizer;
use crate::vector::index::{DeviceLocation, VectorIndex};
use crate::vector::search::SearchResult;
use crate::vector::search::searcher::search_lists;

/// Batches larger than this are assigned to partitions in parallel.
const PARALLEL_ADD_THRESHOLD: usize = 1000;

/// Trained state of a host index.
#[derive(Debug, Clone)]
pub(crate) struct IvfCore {
    pub quantizer: CoarseQuantizer,
    pub lists: InvertedLists,
    pub metric: MetricType,
    pub ntotal: usize,
    pub ids: AHashSet<i64>,
}

impl IvfCore {
    fn new(quantizer: CoarseQuantizer, lists: InvertedLists, metric: MetricType) -> Self {
        let ids: AHashSet<i64> = lists.all_ids().collect();
        Self {
            quantizer,
            ntotal: lists.total(),
            lists,
            metric,
            ids,
        }
    }
}

/// A validated batch ready to be appended.
#[derive(Debug)]
pub(crate) struct PreparedBatch {
    pub ids: Vec<i64>,
    pub assignments: Vec<usize>,
    /// New entries per partition.
    pub per_list: Vec<usize>,
}

/// Validate `dataset` and its ids against the index before anything is appended.
///
/// With `explicit_ids` unset, ids run from `next_id` upward. Negative ids,
/// ids repeated within the batch and ids already present are rejected.
pub(crate) fn prepare_batch(
    quantizer: &CoarseQuantizer,
    existing: &AHashSet<i64>,
    dataset: &Dataset,
    explicit_ids: Option<&[i64]>,
    next_id: i64,
) -> Result<PreparedBatch> {
    dataset.validate(quantizer.dim())?;

    let ids: Vec<i64> = match explicit_ids {
        Some(ids) => ids.to_vec(),
        None => (0..dataset.rows() as i64).map(|i| next_id + i).collect(),
    };

    let mut seen = AHashSet::with_capacity(ids.len());
    for &id in &ids {
        if id < 0 {
            return Err(IvfError::invalid_input(format!(
                "id {id} is negative; ids must be non-negative"
            )));
        }
        if !seen.insert(id) {
            return Err(IvfError::invalid_input(format!(
                "id {id} appears more than once in the batch"
            )));
        }
        if existing.contains(&id) {
            return Err(IvfError::invalid_input(format!(
                "id {id} already exists in the index"
            )));
        }
    }

    let assignments: Vec<usize> = if dataset.rows() > PARALLEL_ADD_THRESHOLD {
        dataset
            .data()
            .par_chunks_exact(dataset.dim())
            .map(|row| quantizer.assign(row))
            .collect()
    } else {
        dataset.iter_rows().map(|row| quantizer.assign(row)).collect()
    };

    let mut per_list = vec![0usize; quantizer.nlist()];
    for &list in &assignments {
        per_list[list] += 1;
    }

    Ok(PreparedBatch {
        ids,
        assignments,
        per_list,
    })
}

fn not_trained() -> IvfError {
    IvfError::not_trained("index not initialized or trained")
}

/// A host-resident IVF index.
///
/// Writers (`add`, `add_without_ids`, `load`, `set_model`) take an exclusive
/// lock; searches, serialization, cloning and device copies share a read lock.
#[derive(Debug, Default)]
pub struct IvfIndex {
    state: RwLock<Option<IvfCore>>,
}

impl IvfIndex {
    /// An untrained index. Everything but `load` and `set_model` fails until
    /// one of them is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a fresh index from a trained model (deep copy).
    pub fn from_model(model: &TrainedModel) -> Self {
        let (quantizer, lists, metric) = model.materialize();
        Self {
            state: RwLock::new(Some(IvfCore::new(quantizer, lists, metric))),
        }
    }

    /// Restore an index from serialized blobs.
    pub fn from_binary_set(set: &BinarySet) -> Result<Self> {
        let index = Self::new();
        index.load(set)?;
        Ok(index)
    }

    pub(crate) fn from_core(core: IvfCore) -> Self {
        Self {
            state: RwLock::new(Some(core)),
        }
    }

    pub(crate) fn from_parts(
        quantizer: CoarseQuantizer,
        lists: InvertedLists,
        metric: MetricType,
    ) -> Self {
        Self::from_core(IvfCore::new(quantizer, lists, metric))
    }

    /// Replace this index's contents with a deep copy of `model`.
    pub fn set_model(&self, model: &TrainedModel) {
        let (quantizer, lists, metric) = model.materialize();
        *self.state.write() = Some(IvfCore::new(quantizer, lists, metric));
    }

    /// Replace this index's contents with the state stored in `set`.
    ///
    /// The set is fully decoded and validated before the index is touched.
    pub fn load(&self, set: &BinarySet) -> Result<()> {
        let decoded = serialize::decode(set)?;
        let core = IvfCore::new(decoded.quantizer, decoded.lists, decoded.metric);
        info!(
            "Loaded IVF index: nlist={} dim={} ntotal={}",
            core.quantizer.nlist(),
            core.quantizer.dim(),
            core.ntotal
        );
        *self.state.write() = Some(core);
        Ok(())
    }

    /// Run `f` against the trained state under the read lock.
    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&IvfCore) -> R) -> Result<R> {
        let guard = self.state.read();
        let core = guard.as_ref().ok_or_else(not_trained)?;
        Ok(f(core))
    }

    fn add_impl(&self, dataset: &Dataset, explicit_ids: Option<&[i64]>) -> Result<()> {
        let mut guard = self.state.write();
        let core = guard.as_mut().ok_or_else(not_trained)?;

        let batch = prepare_batch(
            &core.quantizer,
            &core.ids,
            dataset,
            explicit_ids,
            core.ntotal as i64,
        )?;

        core.lists.reserve(&batch.per_list)?;
        core.ids.try_reserve(batch.ids.len()).map_err(|e| {
            IvfError::allocation(format!("Failed to grow id set: {e}"))
        })?;

        for ((&id, &list), row) in batch
            .ids
            .iter()
            .zip(&batch.assignments)
            .zip(dataset.iter_rows())
        {
            core.lists.append(list, id, row);
            core.ids.insert(id);
        }
        core.ntotal += dataset.rows();

        debug!("Added {} vectors, ntotal={}", dataset.rows(), core.ntotal);
        Ok(())
    }

    /// Deep copy. The copy shares no state with `self`.
    pub fn clone_index(&self) -> Result<IvfIndex> {
        let core = self.with_core(IvfCore::clone)?;
        Ok(Self::from_core(core))
    }

    /// Copy this index into accelerator memory on `device_id`.
    ///
    /// A handle is borrowed from `pool` for the duration of the copy only.
    pub fn copy_cpu_to_gpu(
        &self,
        pool: &dyn DeviceResourcePool,
        device_id: i64,
    ) -> Result<DeviceIvfIndex> {
        let guard = self.state.read();
        let core = guard.as_ref().ok_or_else(not_trained)?;
        DeviceIvfIndex::from_host(core, pool, device_id)
    }

    /// Build a k-NN graph over the indexed vectors.
    ///
    /// `dataset` must hold the indexed vectors in insertion order.
    pub fn gen_graph(&self, k: usize, dataset: &Dataset, params: &SearchConfig) -> Result<Graph> {
        if !self.is_trained() {
            return Err(not_trained());
        }
        GraphBuilder::new(self).build(k, dataset, params.nprobe)
    }

    /// Number of partitions.
    pub fn nlist(&self) -> Result<usize> {
        self.with_core(|core| core.quantizer.nlist())
    }

    /// Entries per partition.
    pub fn list_sizes(&self) -> Result<Vec<usize>> {
        self.with_core(|core| core.lists.sizes())
    }
}

impl VectorIndex for IvfIndex {
    fn is_trained(&self) -> bool {
        self.state.read().is_some()
    }

    fn add(&self, dataset: &Dataset) -> Result<()> {
        if !self.is_trained() {
            return Err(not_trained());
        }
        let ids = dataset.ids().ok_or_else(|| {
            IvfError::invalid_input("dataset carries no ids; use add_without_ids")
        })?;
        self.add_impl(dataset, Some(ids))
    }

    fn add_without_ids(&self, dataset: &Dataset) -> Result<()> {
        self.add_impl(dataset, None)
    }

    fn search(&self, queries: &Dataset, params: &SearchConfig) -> Result<SearchResult> {
        let guard = self.state.read();
        let core = guard.as_ref().ok_or_else(not_trained)?;
        queries.validate(core.quantizer.dim())?;
        search_lists(
            &core.quantizer,
            &core.lists,
            core.metric,
            queries.data(),
            params,
        )
    }

    fn serialize(&self) -> Result<BinarySet> {
        let guard = self.state.read();
        let core = guard.as_ref().ok_or_else(not_trained)?;
        serialize::encode(&core.quantizer, &core.lists, core.metric, core.ntotal as u64)
    }

    fn count(&self) -> usize {
        self.state.read().as_ref().map(|core| core.ntotal).unwrap_or(0)
    }

    fn dimension(&self) -> usize {
        self.state
            .read()
            .as_ref()
            .map(|core| core.quantizer.dim())
            .unwrap_or(0)
    }

    fn metric(&self) -> Option<MetricType> {
        self.state.read().as_ref().map(|core| core.metric)
    }

    fn device(&self) -> DeviceLocation {
        DeviceLocation::Host
    }
}
