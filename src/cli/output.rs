//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{IvfArgs, OutputFormat};
use crate::error::Result;

/// Search quality and speed at one probe count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRun {
    pub nprobe: usize,
    pub recall: f64,
    pub queries_per_second: f64,
    pub average_latency_ms: f64,
}

/// Benchmark results.
#[derive(Debug, Serialize, Deserialize)]
pub struct BenchReport {
    pub dimension: usize,
    pub nlist: usize,
    pub metric: String,
    pub location: String,
    pub vectors: usize,
    pub serialized_bytes: u64,
    pub train_ms: u64,
    pub add_ms: u64,
    pub k: usize,
    pub runs: Vec<ProbeRun>,
}

/// Graph construction summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphReport {
    pub vertices: usize,
    pub k: usize,
    pub nprobe: usize,
    pub location: String,
    pub self_first_ratio: f64,
    pub missing_edges: usize,
    pub duration_ms: u64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &IvfArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &IvfArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    if std::any::type_name::<T>().contains("BenchReport") {
        output_bench_human(&value)
    } else {
        output_generic_human(&value)
    }
}

/// Output benchmark results in human format.
fn output_bench_human(value: &serde_json::Value) -> Result<()> {
    let Some(obj) = value.as_object() else {
        return output_generic_human(value);
    };

    println!("Index:");
    println!("──────");
    for key in ["dimension", "nlist", "metric", "location", "vectors", "k"] {
        if let Some(val) = obj.get(key) {
            println!("{key}: {}", format_value(val));
        }
    }
    if let Some(bytes) = obj.get("serialized_bytes").and_then(|b| b.as_u64()) {
        println!("serialized size: {}", format_bytes(bytes));
    }
    if let Some(train) = obj.get("train_ms").and_then(|t| t.as_u64()) {
        println!("train time: {train}ms");
    }
    if let Some(add) = obj.get("add_ms").and_then(|a| a.as_u64()) {
        println!("add time: {add}ms");
    }

    if let Some(runs) = obj.get("runs").and_then(|r| r.as_array()) {
        println!();
        println!("{:>8} {:>8} {:>12} {:>12}", "nprobe", "recall", "qps", "latency_ms");
        for run in runs {
            let field = |name: &str| run.get(name).and_then(|v| v.as_f64()).unwrap_or(0.0);
            println!(
                "{:>8} {:>8.4} {:>12.1} {:>12.3}",
                run.get("nprobe").and_then(|n| n.as_u64()).unwrap_or(0),
                field("recall"),
                field("queries_per_second"),
                field("average_latency_ms")
            );
        }
    }
    Ok(())
}

/// Output generic data in human format.
fn output_generic_human(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                let formatted_val = format_value(val);
                println!("{key}: {formatted_val}");
            }
        }
        _ => {
            let formatted_value = format_value(value);
            println!("{formatted_value}");
        }
    }
    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &IvfArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a JSON value for display.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

/// Format bytes into human-readable format.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}
