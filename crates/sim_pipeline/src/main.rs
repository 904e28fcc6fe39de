use std::path::PathBuf;
use std::process::exit;
use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use sim_pipeline::config::SimulationConfig;
use sim_pipeline::report::{print_banner, RunReport};
use sim_pipeline::transport::tcp::TcpLinks;
use sim_pipeline::worker::{run_local, run_worker};
use sim_pipeline_core::wire::run_fingerprint;

#[derive(Parser)]
#[command(
    name = "sim_pipeline",
    about = "Distributed cellular-automaton traffic simulation",
    long_about = "Simulates multi-lane road traffic as a cellular automaton over a\n\
                  chain of workers, each owning one road segment. Vehicles crossing\n\
                  a segment boundary are handed to the next worker; travel-time\n\
                  statistics are pooled at the head when the run ends."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every worker as a thread joined by in-process channels
    Local {
        /// Number of workers (road segments); at least 2
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Parameter file (JSON); defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Suppress the per-tick progress bar
        #[arg(long)]
        quiet: bool,
    },
    /// Run one worker rank of a TCP pipeline (one process per rank)
    Tcp {
        /// This worker's rank, 0-based; rank 0 is the head
        #[arg(long)]
        rank: usize,
        /// Total number of workers in the pipeline
        #[arg(long)]
        world_size: usize,
        /// Host the pipeline's listeners bind and dial on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// First port of the pipeline's port range
        #[arg(long, default_value_t = 7600)]
        base_port: u16,
        /// Parameter file (JSON); defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(SimulationConfig::load(&path)?),
        None => Ok(SimulationConfig::default()),
    }
}

fn tick_progress_bar(ticks: u64) -> ProgressBar {
    let bar = ProgressBar::new(ticks);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid progress template")
            .progress_chars("#>-"),
    );
    bar
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Local {
            workers,
            config,
            quiet,
        } => {
            let config = load_config(config)?;
            print_banner(&run_fingerprint(&config.canonical_json()));

            let bar = (!quiet).then(|| tick_progress_bar(config.max_ticks));
            let hook_bar = bar.clone();
            let outcome = run_local(&config, workers, move |_| {
                if let Some(bar) = &hook_bar {
                    bar.inc(1);
                }
            })?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            outcome.report.print();
        }
        Commands::Tcp {
            rank,
            world_size,
            host,
            base_port,
            config,
        } => {
            let config = load_config(config)?;
            if rank == 0 {
                print_banner(&run_fingerprint(&config.canonical_json()));
            }

            let mut links = TcpLinks::connect(rank, world_size, &host, base_port)?;
            let started = Instant::now();
            let summary = run_worker(&mut links, &config)?;
            if rank == 0 {
                let report = RunReport {
                    fingerprint: run_fingerprint(&config.canonical_json()),
                    elapsed_secs: started.elapsed().as_secs_f64(),
                    ticks: config.max_ticks,
                    combined: summary.combined,
                };
                report.print();
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        exit(1);
    }
}
