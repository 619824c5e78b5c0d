//! x86sim cycle-accurate simulator CLI.
//!
//! A thin run/stats-dump driver (spec §6 "the CLI ... stays thin and out of
//! the design target"): loads a raw instruction byte stream into a
//! `TestContext`, builds a `Simulator` from an optional JSON config file,
//! runs it to its configured stop condition, and prints the resulting
//! `SimStats`.

use std::path::PathBuf;
use std::{fs, process};

use clap::Parser;

use x86sim_core::config::Config;
use x86sim_core::core::context::TestContext;
use x86sim_core::core::memory_hierarchy::SimpleMemoryHierarchy;
use x86sim_core::sim::simulator::Simulator;

/// Memory-hierarchy latency (cycles) used by the CLI's `SimpleMemoryHierarchy`
/// stand-in. Not configurable: a real memory model is an external
/// collaborator (spec §6), out of scope for this thin driver.
const DEFAULT_MEMORY_LATENCY: u32 = 4;

#[derive(Parser, Debug)]
#[command(
    name = "x86sim",
    author,
    version,
    about = "Cycle-accurate x86-64 core simulator"
)]
struct Cli {
    /// Raw instruction bytes to load at `run.start_rip` before the run.
    #[arg(short, long)]
    file: PathBuf,

    /// JSON config file (see `x86sim_core::config::Config`). Falls back to
    /// the built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `run.stop_after_iterations` from the config.
    #[arg(long)]
    cycles: Option<u64>,

    /// Suppresses the end-of-run stats dump.
    #[arg(long)]
    quiet: bool,

    /// Dumps stats as YAML instead of the human-readable summary.
    #[arg(long)]
    yaml: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path),
        None => Config::default(),
    };
    if let Some(cycles) = cli.cycles {
        config.run.stop_after_iterations = cycles;
    }

    let program = fs::read(&cli.file).unwrap_or_else(|e| {
        eprintln!("error reading {}: {e}", cli.file.display());
        process::exit(1);
    });

    let mut ctx = TestContext::new();
    ctx.load_bytes(config.run.start_rip, &program);

    let mem = Box::new(SimpleMemoryHierarchy::new(DEFAULT_MEMORY_LATENCY));
    let mut simulator = Simulator::new(&config, ctx, mem);
    let ran = simulator.run();

    println!("ran {ran} cycles");
    if !cli.quiet {
        if cli.yaml {
            match simulator.stats.to_yaml() {
                Ok(yaml) => print!("{yaml}"),
                Err(e) => eprintln!("error serializing stats: {e}"),
            }
        } else {
            simulator.stats.print();
        }
    }
}

fn load_config(path: &PathBuf) -> Config {
    let contents = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error reading {}: {e}", path.display());
        process::exit(1);
    });
    serde_json::from_str(&contents).unwrap_or_else(|e| {
        eprintln!("error parsing {}: {e}", path.display());
        process::exit(1);
    })
}
