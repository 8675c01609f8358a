//! # stagegraph-core
//!
//! The declarative pipeline scheduler - THE LOGIC.
//!
//! Feature modules register update and render *stages* with partial
//! constraints ("after X", "before Y", "priority P"). No global order is
//! ever declared: the graph builder derives one ordered stage list per
//! schedule, and the execution engine walks those lists every frame with
//! per-stage and per-object repeat/skip semantics.
//!
//! ## Layers
//!
//! - `payload` → frame-scoped keyed store for dedup counters and signaling
//! - `registry` → registration tables, `SchedulerRegistry`, `StageModule`
//! - `builder` → iterative fixed-point placement into a `StageList`
//! - `stage` → callback contract and standard conditions
//! - `executor` → update and render walks with bounded repetition
//! - `scheduler` → facade owning schedules, payloads and the frame counter
//!
//! ## Architectural Constraints
//!
//! - Single-threaded: callbacks are `Rc` closures walked sequentially
//! - Deterministic: `BTreeMap` only; ties broken by registration sequence
//! - Never panics on bad registrations: unplaced stages are reported
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod builder;
pub mod config;
pub mod executor;
pub mod objects;
pub mod payload;
pub mod perf;
pub mod primitives;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod stage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    FrameId, ObjectRef, ObjectType, Priority, Relation, Side, StageError, StageId, UnplacedReason,
};

// =============================================================================
// RE-EXPORTS: Scheduling
// =============================================================================

pub use builder::{BuildOutcome, GraphBuilder, ScheduledStage, StageList, UnplacedRegistration};
pub use config::{ExecutionLimits, SchedulerConfig, UnplacedPolicy};
pub use executor::{ExecutionEngine, RunReport};
pub use payload::PayloadStore;
pub use registry::{Placement, Registration, RegistrationTable, SchedulerRegistry, StageModule};
pub use report::{ScheduleKind, ScheduleReport, ScheduleSummary, StageSummary};
pub use scheduler::{FrameReport, Scheduler};

// =============================================================================
// RE-EXPORTS: Stages, Objects, Perf
// =============================================================================

pub use objects::{ObjectSource, ObjectTable, SceneObject};
pub use perf::{NullPerfSink, PerfKey, PerfRecorder, PerfScope, PerfSink, PerfStat};
pub use stage::{
    FrameContext, ObjectAction, ObjectCondition, RenderStage, StateHook, TypeCondition,
    UpdateStage, object_action, object_condition, state_hook, type_condition,
};
