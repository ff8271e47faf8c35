//! Per-partition append-only storage of `(vector, id)` pairs.

use crate::error::{IvfError, Result};

/// A read-only view over partitioned vectors, shared by host and device layouts.
pub trait ListScan: Sync {
    /// Number of partitions.
    fn nlist(&self) -> usize;

    /// Ids and row-major vectors stored in partition `list`.
    fn list(&self, list: usize) -> (&[i64], &[f32]);
}

/// One partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvertedList {
    ids: Vec<i64>,
    vectors: Vec<f32>,
}

impl InvertedList {
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The inverted lists of an IVF index.
#[derive(Debug, Clone, PartialEq)]
pub struct InvertedLists {
    dim: usize,
    lists: Vec<InvertedList>,
}

impl InvertedLists {
    /// `nlist` empty partitions.
    pub fn new(nlist: usize, dim: usize) -> Self {
        Self {
            dim,
            lists: vec![InvertedList::default(); nlist],
        }
    }

    /// Rebuild from per-partition `(ids, vectors)` pairs.
    pub fn from_parts(dim: usize, parts: Vec<(Vec<i64>, Vec<f32>)>) -> Result<Self> {
        let mut lists = Vec::with_capacity(parts.len());
        for (i, (ids, vectors)) in parts.into_iter().enumerate() {
            if vectors.len() != ids.len() * dim {
                return Err(IvfError::invalid_input(format!(
                    "List {i} holds {} ids but {} floats for dimension {dim}",
                    ids.len(),
                    vectors.len()
                )));
            }
            lists.push(InvertedList { ids, vectors });
        }
        Ok(Self { dim, lists })
    }

    /// Append one entry to partition `list`.
    pub fn append(&mut self, list: usize, id: i64, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dim);
        let entry = &mut self.lists[list];
        entry.ids.push(id);
        entry.vectors.extend_from_slice(vector);
    }

    /// Reserve room for `additional[i]` more entries in partition `i`.
    pub fn reserve(&mut self, additional: &[usize]) -> Result<()> {
        for (list, &extra) in self.lists.iter_mut().zip(additional) {
            list.ids.try_reserve(extra).map_err(|e| {
                IvfError::allocation(format!("Failed to grow inverted list: {e}"))
            })?;
            list.vectors.try_reserve(extra * self.dim).map_err(|e| {
                IvfError::allocation(format!("Failed to grow inverted list: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn get(&self, list: usize) -> &InvertedList {
        &self.lists[list]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InvertedList> {
        self.lists.iter()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Total number of stored entries.
    pub fn total(&self) -> usize {
        self.lists.iter().map(InvertedList::len).sum()
    }

    /// Entries per partition.
    pub fn sizes(&self) -> Vec<usize> {
        self.lists.iter().map(InvertedList::len).collect()
    }

    /// Every stored id, partition by partition.
    pub fn all_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.lists.iter().flat_map(|l| l.ids.iter().copied())
    }
}

impl ListScan for InvertedLists {
    fn nlist(&self) -> usize {
        self.lists.len()
    }

    fn list(&self, list: usize) -> (&[i64], &[f32]) {
        let entry = &self.lists[list];
        (&entry.ids, &entry.vectors)
    }
}
