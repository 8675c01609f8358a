//! # Execution Engine
//!
//! Walks a built stage list once per update tick or once per render
//! submission. The engine never re-derives order; it only evaluates the
//! callbacks each stage supplies.
//!
//! ## Render walk
//!
//! ```text
//! for stage in list:
//!     skip if disabled
//!     while type_condition():
//!         pre_state()
//!         if action:
//!             for object in objects_of_type(stage.object_type):
//!                 while object_condition(object):
//!                     action(object)
//!         post_state()
//! ```
//!
//! Both while loops are bounded by [`ExecutionLimits`]; a condition that
//! keeps returning true past its bound aborts the walk with
//! `StageError::RepeatLimitExceeded`.
//!
//! ## Update walk
//!
//! No conditions or hooks: each stage's action runs exactly once per
//! matching enabled object.

use crate::builder::StageList;
use crate::config::ExecutionLimits;
use crate::objects::ObjectSource;
use crate::payload::PayloadStore;
use crate::perf::{PerfScope, PerfSink};
use crate::stage::{FrameContext, RenderStage, UpdateStage};
use crate::types::{FrameId, StageError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;

// =============================================================================
// RUN REPORT
// =============================================================================

/// Counters of one walk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RunReport {
    pub schedule: String,
    pub frame: FrameId,
    /// Type iterations executed (one per update stage, one per open type
    /// condition in the render walk).
    pub stage_iterations: u64,
    pub object_invocations: u64,
    /// Stages skipped because they were disabled.
    pub skipped: Vec<String>,
}

impl RunReport {
    fn new(schedule: &str, frame: FrameId) -> Self {
        Self {
            schedule: schedule.to_string(),
            frame,
            ..Self::default()
        }
    }
}

// =============================================================================
// EXECUTION ENGINE
// =============================================================================

/// Walks stage lists with repeat bounds and a disabled-stage set.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    limits: ExecutionLimits,
    disabled: BTreeSet<String>,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            disabled: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_disabled(mut self, disabled: BTreeSet<String>) -> Self {
        self.disabled = disabled;
        self
    }

    #[must_use]
    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Names of stages the walks skip.
    #[must_use]
    pub fn disabled(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    /// Mutable disabled-stage set, for collaborators toggling stages at runtime.
    pub fn disabled_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.disabled
    }

    #[must_use]
    pub fn is_disabled(&self, stage: &str) -> bool {
        self.disabled.contains(stage)
    }

    /// Run every update stage once per matching object.
    pub fn run_update<W: ObjectSource>(
        &self,
        stages: &StageList<UpdateStage<W>>,
        world: &mut W,
        payloads: &mut PayloadStore,
        frame: FrameId,
        sink: &mut dyn PerfSink,
    ) -> Result<RunReport, StageError> {
        let schedule = stages.name();
        let mut report = RunReport::new(schedule, frame);

        for scheduled in stages.iter() {
            let name = scheduled.id.as_str();
            if self.skip(schedule, name, &mut report) {
                continue;
            }

            let stage = &scheduled.payload;
            let started = Instant::now();
            let objects = world.objects_of_type(stage.object_type);
            tracing::trace!(schedule, stage = name, objects = objects.len(), "running update stage");

            let mut ctx = FrameContext::new(&mut *world, &mut *payloads, frame, name);
            for object in &objects {
                let invoked = Instant::now();
                (stage.action)(&mut ctx, object).inspect_err(|e| {
                    tracing::warn!(schedule, stage = name, object = %object.name, "update action failed: {}", e);
                })?;
                sink.record(
                    PerfScope::object(schedule, name, &object.name),
                    invoked.elapsed(),
                );
                report.object_invocations = report.object_invocations.saturating_add(1);
            }

            report.stage_iterations = report.stage_iterations.saturating_add(1);
            sink.record(PerfScope::stage(schedule, name), started.elapsed());
        }

        Ok(report)
    }

    /// Run the render walk with repeat-while semantics.
    pub fn run_render<W: ObjectSource>(
        &self,
        stages: &StageList<RenderStage<W>>,
        world: &mut W,
        payloads: &mut PayloadStore,
        frame: FrameId,
        sink: &mut dyn PerfSink,
    ) -> Result<RunReport, StageError> {
        let schedule = stages.name();
        let mut report = RunReport::new(schedule, frame);

        for scheduled in stages.iter() {
            let name = scheduled.id.as_str();
            if self.skip(schedule, name, &mut report) {
                continue;
            }

            let stage = &scheduled.payload;
            let mut iterations: u32 = 0;
            loop {
                let mut ctx = FrameContext::new(&mut *world, &mut *payloads, frame, name);
                if !(stage.type_condition)(&mut ctx)? {
                    break;
                }
                if iterations >= self.limits.max_type_iterations {
                    return Err(self.repeat_limit(name, None, self.limits.max_type_iterations));
                }
                iterations = iterations.saturating_add(1);

                let started = Instant::now();
                tracing::trace!(schedule, stage = name, iteration = iterations, "running render stage");

                if let Some(pre) = &stage.pre_state {
                    pre(&mut ctx)?;
                }

                if let Some(action) = &stage.action {
                    let objects = ctx.world().objects_of_type(stage.object_type);
                    for object in &objects {
                        let mut repeats: u32 = 0;
                        while (stage.object_condition)(&mut ctx, object)? {
                            if repeats >= self.limits.max_object_iterations {
                                return Err(self.repeat_limit(
                                    name,
                                    Some(&object.name),
                                    self.limits.max_object_iterations,
                                ));
                            }
                            repeats = repeats.saturating_add(1);

                            let invoked = Instant::now();
                            action(&mut ctx, object).inspect_err(|e| {
                                tracing::warn!(schedule, stage = name, object = %object.name, "render action failed: {}", e);
                            })?;
                            sink.record(
                                PerfScope::object(schedule, name, &object.name),
                                invoked.elapsed(),
                            );
                            report.object_invocations = report.object_invocations.saturating_add(1);
                        }
                    }
                }

                if let Some(post) = &stage.post_state {
                    post(&mut ctx)?;
                }

                report.stage_iterations = report.stage_iterations.saturating_add(1);
                sink.record(PerfScope::stage(schedule, name), started.elapsed());
            }
        }

        Ok(report)
    }

    fn skip(&self, schedule: &str, stage: &str, report: &mut RunReport) -> bool {
        if !self.is_disabled(stage) {
            return false;
        }
        tracing::trace!(schedule, stage, "skipping disabled stage");
        report.skipped.push(stage.to_string());
        true
    }

    fn repeat_limit(&self, stage: &str, object: Option<&str>, limit: u32) -> StageError {
        tracing::error!(stage, object, limit, "stage condition exceeded its repeat limit");
        StageError::RepeatLimitExceeded {
            stage: stage.to_string(),
            object: object.map(str::to_string),
            limit,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
