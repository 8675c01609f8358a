//! # Frame Simulation
//!
//! Runs a compiled pipeline for a number of frames against an in-memory
//! world. Every manifest callback appends a [`TraceEvent`], so the trace
//! shows exactly which stage ran, in which order, and for which object.

use serde::Serialize;
use stagegraph_core::{
    FrameContext, FrameId, ObjectAction, ObjectRef, ObjectSource, ObjectTable, ObjectType,
    RunReport, Scheduler, SchedulerConfig, StageError, StateHook, object_action, state_hook,
};
use std::fmt;

use crate::manifest::Pipeline;

// =============================================================================
// TRACE
// =============================================================================

/// Which callback produced a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// Per-object update action.
    Update,
    /// Pre-state hook of a render stage iteration.
    PreState,
    /// Per-object render action.
    Render,
    /// Post-state hook of a render stage iteration.
    PostState,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => f.pad("update"),
            Self::PreState => f.pad("pre"),
            Self::Render => f.pad("render"),
            Self::PostState => f.pad("post"),
        }
    }
}

/// One recorded callback invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub frame: FrameId,
    pub kind: TraceKind,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<7} {}", self.frame, self.kind, self.stage)?;
        if let Some(object) = &self.object {
            write!(f, " :: {object}")?;
        }
        Ok(())
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// The world the simulated schedules run against.
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    objects: ObjectTable,
    trace: Vec<TraceEvent>,
}

impl SimWorld {
    #[must_use]
    pub fn new(objects: ObjectTable) -> Self {
        Self {
            objects,
            trace: Vec::new(),
        }
    }

    #[must_use]
    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    /// Events recorded so far, oldest first.
    #[must_use]
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Drain the recorded events.
    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace)
    }

    pub fn record(&mut self, event: TraceEvent) {
        self.trace.push(event);
    }
}

impl ObjectSource for SimWorld {
    fn objects_of_type(&self, filter: ObjectType) -> Vec<ObjectRef> {
        self.objects.objects_of_type(filter)
    }
}

/// Per-object action that records a `kind` event.
#[must_use]
pub fn trace_action(kind: TraceKind) -> ObjectAction<SimWorld> {
    object_action(move |ctx: &mut FrameContext<'_, SimWorld>, object| {
        let event = TraceEvent {
            frame: ctx.frame(),
            kind,
            stage: ctx.stage().to_string(),
            object: Some(object.name.clone()),
        };
        ctx.world_mut().record(event);
        Ok(())
    })
}

/// State hook that records a `kind` event.
#[must_use]
pub fn trace_hook(kind: TraceKind) -> StateHook<SimWorld> {
    state_hook(move |ctx: &mut FrameContext<'_, SimWorld>| {
        let event = TraceEvent {
            frame: ctx.frame(),
            kind,
            stage: ctx.stage().to_string(),
            object: None,
        };
        ctx.world_mut().record(event);
        Ok(())
    })
}

/// Update action that does nothing.
#[must_use]
pub fn silent_action() -> ObjectAction<SimWorld> {
    object_action(|_ctx: &mut FrameContext<'_, SimWorld>, _object| Ok(()))
}

// =============================================================================
// SIMULATOR
// =============================================================================

/// Counters of one simulated frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSummary {
    pub frame: FrameId,
    pub update: RunReport,
    /// `None` when the pipeline has no render backend.
    pub render: Option<RunReport>,
}

/// Aggregated timing of one stage (or stage/object pair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerfLine {
    pub schedule: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    pub calls: u64,
    pub total_micros: u64,
    pub max_micros: u64,
}

/// Everything a simulation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub backend: Option<String>,
    pub frames: Vec<FrameSummary>,
    pub trace: Vec<TraceEvent>,
    pub perf: Vec<PerfLine>,
}

/// A built scheduler bound to its world and one render backend.
pub struct Simulator {
    scheduler: Scheduler<SimWorld>,
    world: SimWorld,
    backend: Option<String>,
}

impl Simulator {
    /// Build the pipeline's schedules.
    ///
    /// Without an explicit `backend` the first backend in name order is
    /// rendered; a pipeline without render stages only runs updates.
    pub fn new(
        pipeline: Pipeline,
        config: &SchedulerConfig,
        backend: Option<&str>,
    ) -> Result<Self, StageError> {
        let scheduler = Scheduler::build_schedules(&pipeline.registry, config)?;

        let backend = match backend {
            Some(name) => {
                if scheduler.render_schedule(name).is_none() {
                    return Err(StageError::UnknownSchedule(name.to_string()));
                }
                Some(name.to_string())
            }
            None => scheduler.backends().next().map(str::to_string),
        };

        Ok(Self {
            scheduler,
            world: pipeline.world,
            backend,
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<SimWorld> {
        &self.scheduler
    }

    #[must_use]
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    #[must_use]
    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    /// Run one frame: update, then render the selected backend.
    pub fn step(&mut self) -> Result<FrameSummary, StageError> {
        match self.backend.as_deref() {
            Some(backend) => {
                let report = self.scheduler.run_frame(backend, &mut self.world)?;
                Ok(FrameSummary {
                    frame: report.frame,
                    update: report.update,
                    render: Some(report.render),
                })
            }
            None => {
                let frame = self.scheduler.frame();
                let update = self.scheduler.run_update_schedule(&mut self.world)?;
                self.scheduler.end_frame();
                Ok(FrameSummary {
                    frame,
                    update,
                    render: None,
                })
            }
        }
    }

    /// Run `frames` frames and collect the trace and perf summary.
    pub fn run(mut self, frames: u64) -> Result<SimulationReport, StageError> {
        let mut summaries = Vec::new();
        for _ in 0..frames {
            summaries.push(self.step()?);
        }

        let perf = self
            .scheduler
            .perf()
            .iter()
            .map(|(key, stat)| PerfLine {
                schedule: key.schedule.clone(),
                stage: key.stage.clone(),
                object: key.object.clone(),
                calls: stat.calls,
                total_micros: stat.total_micros,
                max_micros: stat.max_micros,
            })
            .collect();

        tracing::debug!(
            frames,
            events = self.world.trace().len(),
            "simulation finished"
        );

        Ok(SimulationReport {
            backend: self.backend,
            frames: summaries,
            trace: self.world.take_trace(),
            perf,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
