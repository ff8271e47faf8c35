//! Command line argument parsing for the ivfflat CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::vector::core::distance::MetricType;

/// ivfflat - inverted-file approximate nearest neighbor search
#[derive(Parser, Debug, Clone)]
#[command(name = "ivfflat")]
#[command(about = "Train, benchmark and inspect IVF-Flat vector indexes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct IvfArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Worker threads for training and search (default: number of CPUs)
    #[arg(long, env = "IVFFLAT_THREADS")]
    pub threads: Option<usize>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl IvfArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }

    /// Thread count for the global rayon pool.
    pub fn thread_count(&self) -> usize {
        self.threads
            .filter(|&n| n > 0)
            .unwrap_or_else(num_cpus::get)
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Measure add throughput, search latency and recall on synthetic data
    Bench(BenchArgs),

    /// Build a k-NN graph over synthetic data
    Graph(GraphArgs),
}

/// Shape of the synthetic data set and index.
#[derive(Parser, Debug, Clone)]
pub struct DataArgs {
    /// Vector dimension
    #[arg(short, long, default_value = "32")]
    pub dim: usize,

    /// Number of indexed vectors
    #[arg(short = 'n', long, default_value = "10000")]
    pub size: usize,

    /// Number of training vectors (default: same as --size)
    #[arg(long)]
    pub train_size: Option<usize>,

    /// Number of partitions
    #[arg(long, default_value = "64")]
    pub nlist: usize,

    /// Distance metric (L2 or IP)
    #[arg(short, long, default_value = "L2", value_parser = MetricType::parse_str)]
    pub metric: MetricType,

    /// Seed for data generation and training
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Copy the index to this simulated device before searching
    #[arg(long)]
    pub device: Option<i64>,
}

/// Arguments for the benchmark command
#[derive(Parser, Debug, Clone)]
pub struct BenchArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Number of queries
    #[arg(long, default_value = "100")]
    pub queries: usize,

    /// Neighbors per query
    #[arg(short, long, default_value = "10")]
    pub k: usize,

    /// Probe counts to measure (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "1,4,16")]
    pub nprobe: Vec<usize>,
}

/// Arguments for the graph command
#[derive(Parser, Debug, Clone)]
pub struct GraphArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Neighbors per vertex
    #[arg(short, long, default_value = "8")]
    pub k: usize,

    /// Partitions probed per query
    #[arg(long, default_value = "8")]
    pub nprobe: usize,

    /// Queries issued per search batch
    #[arg(long, default_value = "100")]
    pub batch_size: usize,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
