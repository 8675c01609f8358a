//! # stagegraph
//!
//! Command-line front end for `stagegraph-core`: loads TOML pipeline
//! manifests, prints the derived schedules, and simulates frames.

pub mod cli;
pub mod manifest;
pub mod simulation;
