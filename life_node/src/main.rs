// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Runs either side of a distributed Game of Life

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::time::Duration;

use life_cluster::config::DEFAULT_BLOCK_SIZE;
use life_cluster::pattern::{load_pattern, DEFAULT_LIVE_CHAR};
use life_cluster::{MasterConfig, RunOutcome, WorkerConfig, WorkerNode};

#[derive(Debug, clap::Subcommand)]
enum Cli {
    /// Run the master, waiting on the workers and stepping the board
    Master {
        /// The port workers connect to
        port: u16,
        /// The maximum number of generations to compute
        generations: usize,
        /// The starting pattern, one line per row
        pattern: PathBuf,
        /// The number of workers to wait for
        workers: usize,
        /// Cells per side of each worker's tile
        #[clap(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        /// The character marking a live cell in the pattern
        #[clap(long, default_value_t = DEFAULT_LIVE_CHAR)]
        live_char: char,
        /// Fail the run if a worker takes longer than this to report a generation
        #[clap(long)]
        generation_timeout_ms: Option<u64>,
    },

    /// Run a worker, serving one tile of the board
    Worker {
        /// The port neighbouring workers connect to
        port: u16,
        /// The master's host
        master_host: String,
        /// The master's port
        master_port: u16,
        /// The host announced to the master for neighbours to reach us at
        #[clap(long)]
        advertise_host: Option<String>,
        /// Delay between attempts to reach the master
        #[clap(long, default_value_t = 5000)]
        retry_delay_ms: u64,
        /// Timeout on connecting and on every exchange with a neighbour
        #[clap(long)]
        io_timeout_ms: Option<u64>,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cli,

    /// Set the logging level, in `RUST_LOG` syntax. Ignored when `RUST_LOG` is set
    #[clap(short, long, default_value = "info")]
    log: String,
}

async fn run(command: Cli) -> anyhow::Result<()> {
    match command {
        Cli::Master {
            port,
            generations,
            pattern,
            workers,
            block_size,
            live_char,
            generation_timeout_ms,
        } => {
            anyhow::ensure!(workers > 0, "At least one worker is required");
            anyhow::ensure!(block_size > 0, "Block size must be at least 1");
            let pattern = load_pattern(&pattern, live_char)
                .with_context(|| format!("Failed to load {}", pattern.display()))?;

            let config = MasterConfig::new(port, generations, workers)
                .with_block_size(block_size)
                .with_generation_timeout(generation_timeout_ms.map(Duration::from_millis));
            let summary = life_cluster::run_master(config, pattern).await?;
            match summary.outcome {
                RunOutcome::Converged => log::info!(
                    "Board stopped changing after {} generations",
                    summary.generations
                ),
                RunOutcome::ExhaustedGenerations => log::info!(
                    "Finished all {} generations",
                    summary.generations
                ),
            }
            println!("{}", summary.board);
        }
        Cli::Worker {
            port,
            master_host,
            master_port,
            advertise_host,
            retry_delay_ms,
            io_timeout_ms,
        } => {
            let mut config = WorkerConfig::new(port, master_host, master_port)
                .with_io_timeout(io_timeout_ms.map(Duration::from_millis));
            config.advertise_host = advertise_host;
            config.connect_retry_delay = Duration::from_millis(retry_delay_ms);
            WorkerNode::new(config).run().await?;
        }
    }
    Ok(())
}

// MAIN //
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let args = Args::parse();

    // if it's not set, fall back on the command line's level
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", &args.log);
    }
    env_logger::builder().format_timestamp_millis().init();

    let result = tokio::select! {
        out = run(args.command) => out,
        _ = tokio::signal::ctrl_c() => {
            log::info!("CTRL-C pressed, exiting");
            Ok(())
        }
    };

    if let Err(err) = result {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
