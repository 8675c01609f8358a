//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::ConfigOverrides;
use crate::manifest::{ConfigFile, Manifest, Pipeline};
use crate::simulation::{SimulationReport, Simulator};
use stagegraph_core::{
    ScheduleReport, Scheduler, SchedulerConfig, StageError, UnplacedPolicy, UnplacedRegistration,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum manifest size (4 MB).
const MAX_MANIFEST_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Maximum config file size (64 KB).
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), StageError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| StageError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(StageError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize `path` and ensure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, StageError> {
    let canonical = path.canonicalize().map_err(|e| {
        StageError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(StageError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn read_text(path: &Path, max_size: u64) -> Result<String, StageError> {
    let canonical = validate_file_path(path)?;
    validate_file_size(&canonical, max_size)?;
    std::fs::read_to_string(&canonical)
        .map_err(|e| StageError::IoError(format!("Read '{}': {}", path.display(), e)))
}

// =============================================================================
// LOADING
// =============================================================================

/// Read and parse a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, StageError> {
    let text = read_text(path, MAX_MANIFEST_FILE_SIZE)?;
    Manifest::parse(&text)
}

/// Resolve the effective scheduler settings.
///
/// Precedence, lowest first: the manifest's `[scheduler]` table, the
/// `--config` file (which replaces it as a whole), then CLI overrides.
pub fn resolve_config(
    manifest: &Manifest,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<SchedulerConfig, StageError> {
    let mut config = match config_path {
        Some(path) => ConfigFile::parse(&read_text(path, MAX_CONFIG_FILE_SIZE)?)?.scheduler,
        None => manifest.scheduler.clone(),
    };

    if overrides.fail_fast {
        config.unplaced_policy = UnplacedPolicy::FailFast;
    }
    if let Some(limit) = overrides.max_type_iterations {
        config.max_type_iterations = limit;
    }
    if let Some(limit) = overrides.max_object_iterations {
        config.max_object_iterations = limit;
    }
    config
        .disabled_stages
        .extend(overrides.disabled.iter().cloned());

    config.validate()?;
    Ok(config)
}

fn load(
    manifest_path: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<(Pipeline, SchedulerConfig), StageError> {
    let manifest = load_manifest(manifest_path)?;
    let config = resolve_config(&manifest, config_path, overrides)?;
    let pipeline = manifest.compile()?;
    Ok((pipeline, config))
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn print_unplaced(unplaced: &[UnplacedRegistration]) {
    if unplaced.is_empty() {
        return;
    }
    println!();
    println!("Unplaced ({}):", unplaced.len());
    for entry in unplaced {
        println!(
            "  {}: '{}' {} '{}' priority {} ({})",
            entry.schedule, entry.id, entry.relation, entry.reference, entry.priority, entry.reason
        );
    }
}

// =============================================================================
// PLAN COMMAND
// =============================================================================

/// Build every schedule and print its order.
pub fn cmd_plan(
    manifest_path: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    json_mode: bool,
) -> Result<(), StageError> {
    let (pipeline, config) = load(manifest_path, config_path, overrides)?;
    let scheduler = Scheduler::build_schedules(&pipeline.registry, &config)?;
    let report = scheduler.report();

    if json_mode {
        print_json(&report);
        return Ok(());
    }

    println!("stagegraph Schedule Plan");
    println!("========================");
    println!("Manifest: {}", manifest_path.display());
    print_report(&report);

    Ok(())
}

fn print_report(report: &ScheduleReport) {
    for schedule in &report.schedules {
        println!();
        println!(
            "{} ({:?}, {} stages)",
            schedule.name,
            schedule.kind,
            schedule.stages.len()
        );
        for stage in &schedule.stages {
            let anchor = stage
                .anchor
                .map(|side| format!("  [{side} anchor]"))
                .unwrap_or_default();
            println!(
                "  {:>3}  {:<32} priority {}{}",
                stage.position, stage.id, stage.priority, anchor
            );
        }
    }
    print_unplaced(&report.unplaced);
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Build with `FailFast`; the first incomplete schedule is an error.
pub fn cmd_check(
    manifest_path: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    json_mode: bool,
) -> Result<(), StageError> {
    let (pipeline, mut config) = load(manifest_path, config_path, overrides)?;
    config.unplaced_policy = UnplacedPolicy::FailFast;

    let scheduler = Scheduler::build_schedules(&pipeline.registry, &config)?;
    let report = scheduler.report();

    if json_mode {
        let output = serde_json::json!({
            "ok": true,
            "schedules": report.schedules.len(),
            "stages": report.placed_count(),
        });
        print_json(&output);
        return Ok(());
    }

    println!(
        "OK: {} stages placed across {} schedules",
        report.placed_count(),
        report.schedules.len()
    );

    Ok(())
}

// =============================================================================
// SIMULATE COMMAND
// =============================================================================

/// Run `frames` frames and print the execution trace.
pub fn cmd_simulate(
    manifest_path: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    json_mode: bool,
    frames: u64,
    backend: Option<&str>,
) -> Result<(), StageError> {
    let (pipeline, config) = load(manifest_path, config_path, overrides)?;
    let simulator = Simulator::new(pipeline, &config, backend)?;
    let unplaced = simulator.scheduler().unplaced().to_vec();
    let report = simulator.run(frames)?;

    if json_mode {
        let output = serde_json::json!({
            "simulation": report,
            "unplaced": unplaced,
        });
        print_json(&output);
        return Ok(());
    }

    println!("stagegraph Simulation");
    println!("=====================");
    println!("Manifest: {}", manifest_path.display());
    println!(
        "Backend:  {}",
        report.backend.as_deref().unwrap_or("(none, update only)")
    );
    println!("Frames:   {}", report.frames.len());
    print_simulation(&report);
    print_unplaced(&unplaced);

    Ok(())
}

fn print_simulation(report: &SimulationReport) {
    println!();
    println!("Trace:");
    for event in &report.trace {
        println!("  {event}");
    }

    println!();
    println!("Frames:");
    for frame in &report.frames {
        let render = frame
            .render
            .as_ref()
            .map(|r| {
                format!(
                    ", render {} iterations / {} invocations",
                    r.stage_iterations, r.object_invocations
                )
            })
            .unwrap_or_default();
        println!(
            "  [{}] update {} invocations{}",
            frame.frame, frame.update.object_invocations, render
        );
        let skipped = frame
            .update
            .skipped
            .iter()
            .chain(frame.render.iter().flat_map(|r| r.skipped.iter()));
        for stage in skipped {
            println!("      skipped: {stage}");
        }
    }

    println!();
    println!("Perf (per stage):");
    for line in report.perf.iter().filter(|l| l.object.is_none()) {
        println!(
            "  {:<8} {:<32} calls {:>5}  total {:>8}us  max {:>6}us",
            line.schedule, line.stage, line.calls, line.total_micros, line.max_micros
        );
    }
}
