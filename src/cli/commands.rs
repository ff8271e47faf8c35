//! Command implementations for the ivfflat CLI.

use std::time::Instant;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::device::{DeviceResourceConfig, StandardResourcePool};
use crate::error::{IvfError, Result};
use crate::vector::core::dataset::Dataset;
use crate::vector::core::distance::MetricType;
use crate::vector::graph::GraphBuilder;
use crate::vector::index::VectorIndex;
use crate::vector::index::config::{SearchConfig, TrainConfig};
use crate::vector::index::ivf::{IvfIndex, model};

/// Execute a CLI command.
pub fn execute_command(args: IvfArgs) -> Result<()> {
    configure_threads(args.thread_count());
    match &args.command {
        Command::Bench(bench_args) => run_bench(bench_args, &args),
        Command::Graph(graph_args) => run_graph(graph_args, &args),
    }
}

fn configure_threads(threads: usize) {
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        warn!("Could not configure {threads} worker threads: {e}");
    }
}

/// Uniform random vectors in `[-1, 1)`.
pub fn synthetic_dataset(rows: usize, dim: usize, rng: &mut StdRng) -> Result<Dataset> {
    let data: Vec<f32> = (0..rows * dim).map(|_| rng.random_range(-1.0..1.0)).collect();
    Dataset::new(dim, data)
}

/// Exact top-`k` ids for each query, ties broken by lower id.
pub fn brute_force_knn(
    base: &Dataset,
    queries: &Dataset,
    k: usize,
    metric: MetricType,
) -> Vec<Vec<i64>> {
    queries
        .iter_rows()
        .map(|query| {
            let mut scored: Vec<(f32, i64)> = base
                .iter_rows()
                .enumerate()
                .map(|(id, row)| (metric.score(query, row), id as i64))
                .collect();
            scored.sort_by(|a, b| metric.compare(a.0, b.0).then(a.1.cmp(&b.1)));
            scored.truncate(k);
            scored.into_iter().map(|(_, id)| id).collect()
        })
        .collect()
}

/// Fraction of true neighbors found, averaged over queries.
pub fn recall(found: &[i64], k: usize, truth: &[Vec<i64>]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let total: f64 = truth
        .iter()
        .enumerate()
        .map(|(i, expected)| {
            if expected.is_empty() {
                return 1.0;
            }
            let row = &found[i * k..(i + 1) * k];
            let hits = expected.iter().filter(|id| row.contains(id)).count();
            hits as f64 / expected.len() as f64
        })
        .sum();
    total / truth.len() as f64
}

struct Built {
    index: Box<dyn VectorIndex>,
    base: Dataset,
    train_ms: u64,
    add_ms: u64,
}

fn build_index(data: &DataArgs, rng: &mut StdRng, verbosity: u8) -> Result<Built> {
    let train_rows = data.train_size.unwrap_or(data.size);
    let train_set = synthetic_dataset(train_rows, data.dim, rng)?;
    let base = synthetic_dataset(data.size, data.dim, rng)?;

    if verbosity > 1 {
        println!(
            "Training nlist={} on {} vectors of dimension {}",
            data.nlist, train_rows, data.dim
        );
    }

    let start = Instant::now();
    let config = TrainConfig::new(data.nlist, data.metric).with_seed(data.seed);
    let trained = model::train(&train_set, &config)?;
    let train_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let host = IvfIndex::from_model(&trained);
    host.add_without_ids(&base)?;
    let add_ms = start.elapsed().as_millis() as u64;
    info!("Built index with {} vectors", host.count());

    let index: Box<dyn VectorIndex> = match data.device {
        Some(device_id) => {
            let pool = StandardResourcePool::new(DeviceResourceConfig {
                devices: vec![device_id],
                ..DeviceResourceConfig::default()
            });
            Box::new(host.copy_cpu_to_gpu(&pool, device_id)?)
        }
        None => Box::new(host),
    };

    Ok(Built {
        index,
        base,
        train_ms,
        add_ms,
    })
}

/// Benchmark search at each requested `nprobe`.
fn run_bench(args: &BenchArgs, cli_args: &IvfArgs) -> Result<()> {
    if args.nprobe.is_empty() {
        return Err(IvfError::invalid_input("at least one nprobe value is required"));
    }
    let mut rng = StdRng::seed_from_u64(args.data.seed);
    let built = build_index(&args.data, &mut rng, cli_args.verbosity())?;
    let queries = synthetic_dataset(args.queries, args.data.dim, &mut rng)?;
    let truth = brute_force_knn(&built.base, &queries, args.k, args.data.metric);

    let mut runs = Vec::with_capacity(args.nprobe.len());
    for &nprobe in &args.nprobe {
        let start = Instant::now();
        let result = built.index.search(&queries, &SearchConfig::new(args.k, nprobe))?;
        let elapsed = start.elapsed().as_secs_f64();

        let run = ProbeRun {
            nprobe,
            recall: recall(result.ids(), args.k, &truth),
            queries_per_second: if elapsed > 0.0 {
                queries.rows() as f64 / elapsed
            } else {
                0.0
            },
            average_latency_ms: elapsed * 1000.0 / queries.rows().max(1) as f64,
        };
        info!("nprobe={} recall={:.4}", run.nprobe, run.recall);
        runs.push(run);
    }

    let report = BenchReport {
        dimension: built.index.dimension(),
        nlist: args.data.nlist,
        metric: args.data.metric.name().to_string(),
        location: built.index.device().to_string(),
        vectors: built.index.count(),
        serialized_bytes: built.index.serialize()?.total_bytes() as u64,
        train_ms: built.train_ms,
        add_ms: built.add_ms,
        k: args.k,
        runs,
    };

    output_result("Benchmark completed", &report, cli_args)
}

/// Build a k-NN graph and summarize it.
fn run_graph(args: &GraphArgs, cli_args: &IvfArgs) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.data.seed);
    let built = build_index(&args.data, &mut rng, cli_args.verbosity())?;

    let start = Instant::now();
    let graph = GraphBuilder::new(built.index.as_ref())
        .with_batch_size(args.batch_size)
        .build(args.k, &built.base, args.nprobe)?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let self_first = graph
        .iter()
        .enumerate()
        .filter(|(i, row)| row.first() == Some(&(*i as i64)))
        .count();
    let missing = graph.iter().flatten().filter(|&&id| id < 0).count();

    let report = GraphReport {
        vertices: graph.len(),
        k: args.k,
        nprobe: args.nprobe,
        location: built.index.device().to_string(),
        self_first_ratio: if graph.is_empty() {
            0.0
        } else {
            self_first as f64 / graph.len() as f64
        },
        missing_edges: missing,
        duration_ms,
    };

    output_result("Graph built", &report, cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brute_force_knn_orders_by_metric() {
        let base = Dataset::new(1, vec![0.0, 3.0, 1.0, 2.0]).unwrap();
        let queries = Dataset::new(1, vec![2.9]).unwrap();
        assert_eq!(
            brute_force_knn(&base, &queries, 2, MetricType::L2),
            vec![vec![1, 3]]
        );
        assert_eq!(
            brute_force_knn(&base, &queries, 2, MetricType::InnerProduct),
            vec![vec![1, 3]]
        );
        let neg = Dataset::new(1, vec![-1.0]).unwrap();
        assert_eq!(
            brute_force_knn(&base, &neg, 1, MetricType::InnerProduct),
            vec![vec![0]]
        );
    }

    #[test]
    fn test_recall() {
        let truth = vec![vec![1, 2], vec![3, 4]];
        let found = [2, 1, 3, -1];
        assert!((recall(&found, 2, &truth) - 0.75).abs() < 1e-9);
        assert_eq!(recall(&[], 2, &[]), 0.0);
    }

    #[test]
    fn test_build_index_on_device() {
        let data = DataArgs {
            dim: 4,
            size: 200,
            train_size: None,
            nlist: 8,
            metric: MetricType::L2,
            seed: 1,
            device: Some(2),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let built = build_index(&data, &mut rng, 0).unwrap();
        assert_eq!(built.index.count(), 200);
        assert_eq!(built.index.device().to_string(), "device(2)");
    }
}
