//! # stagegraph CLI Module
//!
//! This module implements the CLI interface for stagegraph.
//!
//! ## Available Commands
//!
//! - `plan` - Build every schedule and print its order
//! - `check` - Build with `fail_fast`; fail when any stage is unplaced
//! - `simulate` - Run frames and print the execution trace

mod commands;

use clap::{Args, Parser, Subcommand};
use stagegraph_core::StageError;
use std::path::PathBuf;

pub use commands::*;

/// Manifest path used when no subcommand is given.
pub const DEFAULT_MANIFEST: &str = "stagegraph.toml";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// stagegraph - declarative stage pipeline scheduler
///
/// Builds ordered update and render schedules from partial before/after
/// constraints and simulates the per-frame execution protocol.
#[derive(Parser, Debug)]
#[command(name = "stagegraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// TOML file with a [scheduler] table, replacing the manifest's own
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Scheduler settings that take precedence over every config source.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Fail the build when any stage cannot be placed
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Bound on type-condition iterations per render stage
    #[arg(long, global = true)]
    pub max_type_iterations: Option<u32>,

    /// Bound on object-condition iterations per object
    #[arg(long, global = true)]
    pub max_object_iterations: Option<u32>,

    /// Skip a stage by name (repeatable)
    #[arg(long = "disable", global = true)]
    pub disabled: Vec<String>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build every schedule and print its order and unplaced stages
    Plan {
        /// Path to the pipeline manifest
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },

    /// Verify that every registered stage can be placed
    Check {
        /// Path to the pipeline manifest
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },

    /// Run frames on the manifest's objects
    Simulate {
        /// Path to the pipeline manifest
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Number of frames to run
        #[arg(short, long, default_value = "1")]
        frames: u64,

        /// Render backend (defaults to the first in name order)
        #[arg(short, long)]
        backend: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StageError> {
    let json_mode = cli.json_mode;
    let config = cli.config.as_deref();
    let overrides = &cli.overrides;

    match cli.command {
        Some(Commands::Plan { manifest }) => cmd_plan(&manifest, config, overrides, json_mode),
        Some(Commands::Check { manifest }) => cmd_check(&manifest, config, overrides, json_mode),
        Some(Commands::Simulate {
            manifest,
            frames,
            backend,
        }) => cmd_simulate(
            &manifest,
            config,
            overrides,
            json_mode,
            frames,
            backend.as_deref(),
        ),
        None => {
            // No subcommand - plan the default manifest
            cmd_plan(
                std::path::Path::new(DEFAULT_MANIFEST),
                config,
                overrides,
                json_mode,
            )
        }
    }
}
