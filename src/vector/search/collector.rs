//! Bounded top-k collection of scored candidates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::vector::core::distance::MetricType;

/// Keeps the best `k` candidates seen so far under a metric.
#[derive(Debug)]
pub struct TopKCollector {
    k: usize,
    metric: MetricType,
    /// Max-heap on badness: the worst retained candidate is on top.
    heap: BinaryHeap<Candidate>,
}

/// A scored candidate for use in the heap.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: i64,
    score: f32,
    /// Larger is worse, regardless of metric direction.
    badness: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Equal scores: the higher id counts as worse.
        self.badness
            .total_cmp(&other.badness)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl TopKCollector {
    pub fn new(k: usize, metric: MetricType) -> Self {
        Self {
            k,
            metric,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    fn candidate(&self, id: i64, score: f32) -> Candidate {
        let badness = match self.metric {
            MetricType::L2 => score,
            MetricType::InnerProduct => -score,
        };
        Candidate { id, score, badness }
    }

    /// Offer a candidate.
    #[inline]
    pub fn collect(&mut self, id: i64, score: f32) {
        if self.k == 0 {
            return;
        }
        let candidate = self.candidate(id, score);
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek()
            && candidate < *worst
        {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    /// Number of candidates retained.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Write results best-first into `ids`/`distances`, padding with sentinels.
    pub fn write_into(self, ids: &mut [i64], distances: &mut [f32]) {
        let sentinel = self.metric.sentinel();
        let sorted = self.heap.into_sorted_vec();
        for (slot, (id, distance)) in ids.iter_mut().zip(distances.iter_mut()).enumerate() {
            match sorted.get(slot) {
                Some(candidate) => {
                    *id = candidate.id;
                    *distance = candidate.score;
                }
                None => {
                    *id = -1;
                    *distance = sentinel;
                }
            }
        }
    }

    /// Results best-first as `(id, score)` pairs.
    pub fn into_sorted(self) -> Vec<(i64, f32)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.id, c.score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_smallest_l2() {
        let mut collector = TopKCollector::new(2, MetricType::L2);
        for (id, d) in [(1, 5.0), (2, 1.0), (3, 3.0), (4, 0.5)] {
            collector.collect(id, d);
        }
        assert_eq!(collector.into_sorted(), vec![(4, 0.5), (2, 1.0)]);
    }

    #[test]
    fn test_keeps_largest_inner_product() {
        let mut collector = TopKCollector::new(2, MetricType::InnerProduct);
        for (id, s) in [(1, 5.0), (2, 1.0), (3, 3.0), (4, 0.5)] {
            collector.collect(id, s);
        }
        assert_eq!(collector.into_sorted(), vec![(1, 5.0), (3, 3.0)]);
    }

    #[test]
    fn test_ties_prefer_lower_id() {
        let mut collector = TopKCollector::new(2, MetricType::L2);
        for id in [9, 3, 7, 1] {
            collector.collect(id, 1.0);
        }
        assert_eq!(collector.into_sorted(), vec![(1, 1.0), (3, 1.0)]);
    }

    #[test]
    fn test_write_into_pads_with_sentinels() {
        let mut collector = TopKCollector::new(3, MetricType::InnerProduct);
        collector.collect(5, 2.0);
        let mut ids = [0i64; 3];
        let mut distances = [0.0f32; 3];
        collector.write_into(&mut ids, &mut distances);
        assert_eq!(ids, [5, -1, -1]);
        assert_eq!(distances, [2.0, f32::NEG_INFINITY, f32::NEG_INFINITY]);
    }
}
