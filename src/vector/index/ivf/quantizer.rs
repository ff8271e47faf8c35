//! Flat coarse quantizer trained with k-means.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{IvfError, Result};
use crate::vector::core::dataset::Dataset;
use crate::vector::core::distance::l2_squared;
use crate::vector::index::config::TrainConfig;

/// Below this many training vectors assignment stays on the calling thread.
const PARALLEL_ASSIGN_THRESHOLD: usize = 1000;

/// Maps vectors to the nearest of `nlist` centroids by L2 distance.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseQuantizer {
    dim: usize,
    nlist: usize,
    /// `nlist * dim` floats, centroid `i` at `[i * dim, (i + 1) * dim)`.
    centroids: Vec<f32>,
}

impl CoarseQuantizer {
    /// Rebuild a quantizer from stored centroids.
    pub fn from_centroids(dim: usize, centroids: Vec<f32>) -> Result<Self> {
        if dim == 0 || centroids.is_empty() || centroids.len() % dim != 0 {
            return Err(IvfError::invalid_input(format!(
                "{} centroid values do not form whole vectors of dimension {dim}",
                centroids.len()
            )));
        }
        Ok(Self {
            dim,
            nlist: centroids.len() / dim,
            centroids,
        })
    }

    /// Cluster `dataset` into `config.nlist` partitions.
    pub fn train(dataset: &Dataset, config: &TrainConfig) -> Result<Self> {
        let n = dataset.rows();
        let nlist = config.nlist;

        if nlist == 0 {
            return Err(IvfError::training_precondition("nlist must be positive"));
        }
        if n < nlist {
            return Err(IvfError::training_precondition(format!(
                "Cannot create {nlist} clusters from {n} vectors"
            )));
        }
        dataset.validate(dataset.dim())?;

        info!("Training {nlist} centroids on {n} vectors of dimension {}", dataset.dim());

        let mut quantizer = Self {
            dim: dataset.dim(),
            nlist,
            centroids: Vec::new(),
        };
        quantizer.init_centroids_kmeans_plus_plus(dataset, config.seed);

        for iteration in 0..config.max_iterations {
            let old_centroids = quantizer.centroids.clone();

            let assignments = quantizer.assign_all(dataset);
            quantizer.update_centroids(dataset, &assignments);

            let movement = quantizer.mean_movement(&old_centroids);
            debug!("k-means iteration {}: mean centroid movement {movement}", iteration + 1);
            if movement < config.convergence_threshold {
                info!("K-means converged after {} iterations", iteration + 1);
                break;
            }
        }

        Ok(quantizer)
    }

    /// Initialize centroids using k-means++.
    fn init_centroids_kmeans_plus_plus(&mut self, dataset: &Dataset, seed: Option<u64>) {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        let n = dataset.rows();

        self.centroids.clear();
        self.centroids.reserve(self.nlist * self.dim);

        let first = rng.random_range(0..n);
        self.centroids.extend_from_slice(dataset.row(first));

        // Squared distance from each vector to its closest chosen centroid.
        let mut min_dists: Vec<f32> = dataset
            .iter_rows()
            .map(|row| l2_squared(row, dataset.row(first)))
            .collect();

        for _ in 1..self.nlist {
            let total_weight: f64 = min_dists.iter().map(|&d| d as f64).sum();

            let chosen = if total_weight <= 0.0 {
                rng.random_range(0..n)
            } else {
                let target = rng.random::<f64>() * total_weight;
                let mut cumsum = 0.0;
                let mut chosen = n - 1;
                for (i, &weight) in min_dists.iter().enumerate() {
                    cumsum += weight as f64;
                    if cumsum >= target {
                        chosen = i;
                        break;
                    }
                }
                chosen
            };

            let centroid = dataset.row(chosen);
            self.centroids.extend_from_slice(centroid);
            for (dist, row) in min_dists.iter_mut().zip(dataset.iter_rows()) {
                *dist = dist.min(l2_squared(row, centroid));
            }
        }
    }

    fn assign_all(&self, dataset: &Dataset) -> Vec<usize> {
        if dataset.rows() > PARALLEL_ASSIGN_THRESHOLD {
            dataset
                .data()
                .par_chunks_exact(self.dim)
                .map(|row| self.assign(row))
                .collect()
        } else {
            dataset.iter_rows().map(|row| self.assign(row)).collect()
        }
    }

    /// Recompute centroids as cluster means; empty clusters keep their centroid.
    fn update_centroids(&mut self, dataset: &Dataset, assignments: &[usize]) {
        let mut sums = vec![0.0f64; self.nlist * self.dim];
        let mut counts = vec![0usize; self.nlist];

        for (row, &cluster) in dataset.iter_rows().zip(assignments) {
            counts[cluster] += 1;
            let sum = &mut sums[cluster * self.dim..(cluster + 1) * self.dim];
            for (s, &v) in sum.iter_mut().zip(row) {
                *s += v as f64;
            }
        }

        for (cluster, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let range = cluster * self.dim..(cluster + 1) * self.dim;
            for (c, &s) in self.centroids[range.clone()].iter_mut().zip(&sums[range]) {
                *c = (s / count as f64) as f32;
            }
        }
    }

    fn mean_movement(&self, old_centroids: &[f32]) -> f32 {
        let total: f32 = old_centroids
            .chunks_exact(self.dim)
            .zip(self.centroids.chunks_exact(self.dim))
            .map(|(old, new)| l2_squared(old, new))
            .sum();
        total / self.nlist as f32
    }

    /// Index of the nearest centroid; ties go to the lower index.
    pub fn assign(&self, vector: &[f32]) -> usize {
        let mut best_cluster = 0;
        let mut best_distance = f32::INFINITY;

        for (i, centroid) in self.centroids.chunks_exact(self.dim).enumerate() {
            let distance = l2_squared(vector, centroid);
            if distance < best_distance {
                best_distance = distance;
                best_cluster = i;
            }
        }

        best_cluster
    }

    /// The `nprobe` nearest partitions, nearest first, ties by centroid index.
    ///
    /// `nprobe` larger than `nlist` probes every partition.
    pub fn probe(&self, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut distances: Vec<(f32, usize)> = self
            .centroids
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(i, centroid)| (l2_squared(query, centroid), i))
            .collect();

        let nprobe = nprobe.min(self.nlist);
        let by_distance =
            |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if nprobe < distances.len() {
            distances.select_nth_unstable_by(nprobe, by_distance);
            distances.truncate(nprobe);
        }
        distances.sort_unstable_by(by_distance);
        distances.into_iter().map(|(_, i)| i).collect()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    /// Centroid `i`.
    pub fn centroid(&self, i: usize) -> &[f32] {
        &self.centroids[i * self.dim..(i + 1) * self.dim]
    }

    /// All centroids, row-major.
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }
}
