//! # stagegraph - Stage Pipeline Scheduler
//!
//! The main binary for the stagegraph declarative pipeline scheduler.
//!
//! This application provides:
//! - Schedule planning from a TOML pipeline manifest
//! - FailFast checking for CI
//! - Frame simulation with an execution trace and perf summary
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              apps/stagegraph (THE BINARY)           │
//! │                                                     │
//! │  ┌───────────┐   ┌────────────┐   ┌─────────────┐   │
//! │  │   CLI     │──▶│  Manifest  │──▶│  Simulator  │   │
//! │  │  (clap)   │   │   (toml)   │   │  (SimWorld) │   │
//! │  └───────────┘   └─────┬──────┘   └──────┬──────┘   │
//! │                        ▼                 ▼          │
//! │                  ┌─────────────────────────┐        │
//! │                  │     stagegraph-core     │        │
//! │                  │       (THE LOGIC)       │        │
//! │                  └─────────────────────────┘        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! stagegraph plan -m pipeline.toml
//! stagegraph check -m pipeline.toml
//! stagegraph simulate -m pipeline.toml -f 3 --disable "Motion Blur"
//! ```

use clap::Parser;
use stagegraph::cli;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // STAGEGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("STAGEGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "stagegraph=debug,stagegraph_core=debug"
    } else {
        "stagegraph=info,stagegraph_core=info"
    };
    let filter = EnvFilter::try_from_env("STAGEGRAPH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so plan/simulate output stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    eprintln!(
        "stagegraph v{} - declarative stage pipeline scheduler\n",
        env!("CARGO_PKG_VERSION")
    );
}
