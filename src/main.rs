//! ddogsvc
//!
//! Demo service for request timing metrics.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ request id ─▶ trace span ─▶ metric capture ─▶ route table
//!                                                                        │
//!                                                                        ▼
//!                                                              ┌──────────────────┐
//!                                                              │    dispatcher    │
//!                                                              │  handler task ◀──┼── deadline
//!                                                              └────────┬─────────┘
//!                                                                       │ one write
//!     Client Response                                                   ▼
//!     ◀───────────────────────────────────────────────────────── idempotent sink
//!
//!     metric capture ──spawn──▶ MetricSink (DogStatsD | Prometheus | noop)
//! ```

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ddogsvc")]
#[command(about = "HTTP service with per-route deadlines and request metrics", long_about = None)]
struct Cli {
    /// Config file; skips `main.<ENTENV>.toml` lookup.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    ddogsvc::lifecycle::startup::run(cli.config).await?;
    Ok(())
}
