//! Accelerator-resident IVF index.
//!
//! The device layout packs every partition into three contiguous buffers
//! (offsets, ids, vectors) so a whole index moves to the device in one
//! transfer. Buffers are charged against the device's memory budget and
//! released when the index is dropped.

use std::sync::Arc;

use ahash::AHashSet;
use log::{debug, info};
use parking_lot::RwLock;

use crate::device::{DeviceAllocation, DeviceMemory, DeviceResourcePool, ResourceScope};
use crate::error::{IvfError, Result};
use crate::vector::binary_set::BinarySet;
use crate::vector::core::dataset::Dataset;
use crate::vector::core::distance::MetricType;
use crate::vector::index::config::SearchConfig;
use crate::vector::index::ivf::lists::{InvertedLists, ListScan};
use crate::vector::index::ivf::quantizer::CoarseQuantizer;
use crate::vector::index::ivf::{IvfCore, IvfIndex, PreparedBatch, prepare_batch, serialize};
use crate::vector::index::{DeviceLocation, VectorIndex};
use crate::vector::search::SearchResult;
use crate::vector::search::searcher::search_lists;

/// Packed partitions: list `i` spans `offsets[i]..offsets[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceLists {
    dim: usize,
    offsets: Vec<usize>,
    ids: Vec<i64>,
    vectors: Vec<f32>,
}

fn reserve_exact<T>(buf: &mut Vec<T>, n: usize, what: &str) -> Result<()> {
    buf.try_reserve_exact(n)
        .map_err(|e| IvfError::allocation(format!("Failed to allocate device {what}: {e}")))
}

impl DeviceLists {
    /// Pack `lists` into contiguous buffers.
    pub fn pack<L: ListScan>(lists: &L, dim: usize) -> Result<Self> {
        let nlist = lists.nlist();
        let total: usize = (0..nlist).map(|i| lists.list(i).0.len()).sum();

        let mut offsets = Vec::new();
        reserve_exact(&mut offsets, nlist + 1, "offsets")?;
        let mut ids = Vec::new();
        reserve_exact(&mut ids, total, "ids")?;
        let mut vectors = Vec::new();
        reserve_exact(&mut vectors, total * dim, "vectors")?;

        offsets.push(0);
        for i in 0..nlist {
            let (list_ids, list_vectors) = lists.list(i);
            ids.extend_from_slice(list_ids);
            vectors.extend_from_slice(list_vectors);
            offsets.push(ids.len());
        }

        Ok(Self {
            dim,
            offsets,
            ids,
            vectors,
        })
    }

    /// A new packing with `batch` appended to the end of each partition.
    fn with_batch(&self, dataset: &Dataset, batch: &PreparedBatch) -> Result<Self> {
        let nlist = self.nlist();
        let mut buckets: Vec<Vec<usize>> = batch
            .per_list
            .iter()
            .map(|&n| Vec::with_capacity(n))
            .collect();
        for (row, &list) in batch.assignments.iter().enumerate() {
            buckets[list].push(row);
        }

        let total = self.ids.len() + batch.ids.len();
        let mut offsets = Vec::new();
        reserve_exact(&mut offsets, nlist + 1, "offsets")?;
        let mut ids = Vec::new();
        reserve_exact(&mut ids, total, "ids")?;
        let mut vectors = Vec::new();
        reserve_exact(&mut vectors, total * self.dim, "vectors")?;

        offsets.push(0);
        for (i, bucket) in buckets.iter().enumerate() {
            let (list_ids, list_vectors) = self.list(i);
            ids.extend_from_slice(list_ids);
            vectors.extend_from_slice(list_vectors);
            for &row in bucket {
                ids.push(batch.ids[row]);
                vectors.extend_from_slice(dataset.row(row));
            }
            offsets.push(ids.len());
        }

        Ok(Self {
            dim: self.dim,
            offsets,
            ids,
            vectors,
        })
    }

    /// Unpack into host inverted lists.
    pub fn unpack(&self) -> Result<InvertedLists> {
        let parts = (0..self.nlist())
            .map(|i| {
                let (ids, vectors) = self.list(i);
                (ids.to_vec(), vectors.to_vec())
            })
            .collect();
        InvertedLists::from_parts(self.dim, parts)
    }

    /// Bytes occupied by the packed buffers.
    pub fn bytes(&self) -> usize {
        self.offsets.len() * size_of::<usize>()
            + self.ids.len() * size_of::<i64>()
            + self.vectors.len() * size_of::<f32>()
    }

    pub fn total(&self) -> usize {
        self.ids.len()
    }
}

impl ListScan for DeviceLists {
    fn nlist(&self) -> usize {
        self.offsets.len() - 1
    }

    fn list(&self, list: usize) -> (&[i64], &[f32]) {
        let (start, end) = (self.offsets[list], self.offsets[list + 1]);
        (
            &self.ids[start..end],
            &self.vectors[start * self.dim..end * self.dim],
        )
    }
}

#[derive(Debug)]
struct DeviceState {
    quantizer: CoarseQuantizer,
    lists: DeviceLists,
    metric: MetricType,
    ntotal: usize,
    ids: AHashSet<i64>,
    allocation: DeviceAllocation,
}

fn footprint(quantizer: &CoarseQuantizer, lists: &DeviceLists) -> usize {
    quantizer.centroids().len() * size_of::<f32>() + lists.bytes()
}

/// An IVF index whose data lives in accelerator memory.
#[derive(Debug)]
pub struct DeviceIvfIndex {
    device_id: i64,
    memory: Arc<DeviceMemory>,
    state: RwLock<DeviceState>,
}

impl DeviceIvfIndex {
    /// Convert a host index's state, borrowing a handle from `pool` for the
    /// duration of the conversion.
    pub(crate) fn from_host(
        core: &IvfCore,
        pool: &dyn DeviceResourcePool,
        device_id: i64,
    ) -> Result<Self> {
        let scope = ResourceScope::acquire(pool, device_id)?;
        let memory = Arc::clone(scope.handle().memory());

        let quantizer = core.quantizer.clone();
        let lists = DeviceLists::pack(&core.lists, quantizer.dim())?;
        let allocation = memory.allocate(footprint(&quantizer, &lists))?;

        info!(
            "Copied IVF index to device {device_id}: ntotal={} bytes={}",
            core.ntotal,
            allocation.bytes()
        );

        Ok(Self {
            device_id,
            memory,
            state: RwLock::new(DeviceState {
                quantizer,
                lists,
                metric: core.metric,
                ntotal: core.ntotal,
                ids: core.ids.clone(),
                allocation,
            }),
        })
    }

    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    /// Bytes this index holds on its device.
    pub fn device_bytes(&self) -> usize {
        self.state.read().allocation.bytes()
    }

    /// Copy back into an equivalent host index.
    pub fn copy_gpu_to_cpu(&self) -> Result<IvfIndex> {
        let state = self.state.read();
        let lists = state.lists.unpack()?;
        Ok(IvfIndex::from_parts(
            state.quantizer.clone(),
            lists,
            state.metric,
        ))
    }

    /// Deep copy on the same device, charged to the device budget.
    pub fn clone_index(&self) -> Result<DeviceIvfIndex> {
        let state = self.state.read();
        let lists = state.lists.clone();
        let allocation = self.memory.allocate(footprint(&state.quantizer, &lists))?;
        Ok(Self {
            device_id: self.device_id,
            memory: Arc::clone(&self.memory),
            state: RwLock::new(DeviceState {
                quantizer: state.quantizer.clone(),
                lists,
                metric: state.metric,
                ntotal: state.ntotal,
                ids: state.ids.clone(),
                allocation,
            }),
        })
    }

    fn add_impl(&self, dataset: &Dataset, explicit_ids: Option<&[i64]>) -> Result<()> {
        let mut state = self.state.write();
        let batch = prepare_batch(
            &state.quantizer,
            &state.ids,
            dataset,
            explicit_ids,
            state.ntotal as i64,
        )?;

        let lists = state.lists.with_batch(dataset, &batch)?;
        state.ids.try_reserve(batch.ids.len()).map_err(|e| {
            IvfError::allocation(format!("Failed to grow id set: {e}"))
        })?;
        // Charge the device last so no failure above leaves it charged.
        let grown = lists.bytes().saturating_sub(state.lists.bytes());
        state.allocation.grow(grown)?;

        state.ids.extend(batch.ids.iter().copied());
        state.lists = lists;
        state.ntotal += dataset.rows();

        debug!(
            "Added {} vectors on device {}, ntotal={}",
            dataset.rows(),
            self.device_id,
            state.ntotal
        );
        Ok(())
    }
}

impl VectorIndex for DeviceIvfIndex {
    fn is_trained(&self) -> bool {
        true
    }

    fn add(&self, dataset: &Dataset) -> Result<()> {
        let ids = dataset.ids().ok_or_else(|| {
            IvfError::invalid_input("dataset carries no ids; use add_without_ids")
        })?;
        self.add_impl(dataset, Some(ids))
    }

    fn add_without_ids(&self, dataset: &Dataset) -> Result<()> {
        self.add_impl(dataset, None)
    }

    fn search(&self, queries: &Dataset, params: &SearchConfig) -> Result<SearchResult> {
        let state = self.state.read();
        queries.validate(state.quantizer.dim())?;
        search_lists(
            &state.quantizer,
            &state.lists,
            state.metric,
            queries.data(),
            params,
        )
    }

    fn serialize(&self) -> Result<BinarySet> {
        let state = self.state.read();
        serialize::encode(
            &state.quantizer,
            &state.lists,
            state.metric,
            state.ntotal as u64,
        )
    }

    fn count(&self) -> usize {
        self.state.read().ntotal
    }

    fn dimension(&self) -> usize {
        self.state.read().quantizer.dim()
    }

    fn metric(&self) -> Option<MetricType> {
        Some(self.state.read().metric)
    }

    fn device(&self) -> DeviceLocation {
        DeviceLocation::Device(self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_lists() -> InvertedLists {
        let mut lists = InvertedLists::new(3, 2);
        lists.append(0, 1, &[0.0, 1.0]);
        lists.append(2, 2, &[2.0, 3.0]);
        lists.append(2, 3, &[4.0, 5.0]);
        lists
    }

    #[test]
    fn test_pack_unpack() {
        let lists = host_lists();
        let packed = DeviceLists::pack(&lists, 2).unwrap();
        assert_eq!(packed.nlist(), 3);
        assert_eq!(packed.total(), 3);
        assert_eq!(packed.list(0).0, &[1]);
        assert!(packed.list(1).0.is_empty());
        assert_eq!(packed.list(2).1, &[2.0, 3.0, 4.0, 5.0]);
        assert_eq!(packed.unpack().unwrap(), lists);
    }

    #[test]
    fn test_with_batch_appends_per_list() {
        let packed = DeviceLists::pack(&host_lists(), 2).unwrap();
        let dataset = Dataset::new(2, vec![9.0, 9.0, 8.0, 8.0]).unwrap();
        let batch = PreparedBatch {
            ids: vec![10, 11],
            assignments: vec![1, 0],
            per_list: vec![1, 1, 0],
        };
        let grown = packed.with_batch(&dataset, &batch).unwrap();
        assert_eq!(grown.list(0).0, &[1, 11]);
        assert_eq!(grown.list(1), (&[10i64][..], &[9.0f32, 9.0][..]));
        assert_eq!(grown.list(2).0, &[2, 3]);
        assert!(grown.bytes() > packed.bytes());
    }
}
