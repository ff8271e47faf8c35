//! Named collection of serialized byte blobs.

use std::collections::BTreeMap;

use crate::error::{IvfError, Result};

/// Mapping from blob name to bytes. Iteration order is by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySet {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl BinarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a blob.
    pub fn append(&mut self, key: impl Into<String>, data: Vec<u8>) {
        self.blobs.insert(key.into(), data);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.blobs.get(key).map(Vec::as_slice)
    }

    /// Get a blob that must be present.
    pub fn require(&self, key: &str) -> Result<&[u8]> {
        self.get(key)
            .ok_or_else(|| IvfError::format(format!("missing blob '{key}'")))
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.blobs.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.blobs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Sum of all blob sizes in bytes.
    pub fn total_bytes(&self) -> usize {
        self.blobs.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_get_require() {
        let mut set = BinarySet::new();
        set.append("b", vec![1, 2]);
        set.append("a", vec![3]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("b"), Some(&[1u8, 2][..]));
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(set.total_bytes(), 3);
        assert!(set.require("missing").is_err());

        set.append("a", vec![9, 9, 9]);
        assert_eq!(set.get("a"), Some(&[9u8, 9, 9][..]));
        assert_eq!(set.remove("a"), Some(vec![9, 9, 9]));
        assert!(!set.contains("a"));
    }
}
