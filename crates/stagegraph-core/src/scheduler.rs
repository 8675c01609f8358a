//! # Scheduler
//!
//! Facade the surrounding engine talks to. It owns:
//! - the built update schedule and one render schedule per backend
//! - the payload store shared by every stage
//! - the frame counter
//! - the disabled-stage set (through the execution engine)
//! - a [`PerfRecorder`] fed by every walk
//!
//! Schedules are built once from a [`SchedulerRegistry`] and never
//! re-derived while frames run.

use crate::builder::{GraphBuilder, StageList, UnplacedRegistration};
use crate::config::SchedulerConfig;
use crate::executor::{ExecutionEngine, RunReport};
use crate::objects::ObjectSource;
use crate::payload::PayloadStore;
use crate::perf::PerfRecorder;
use crate::primitives::UPDATE_SCHEDULE;
use crate::registry::SchedulerRegistry;
use crate::report::{ScheduleKind, ScheduleReport, ScheduleSummary};
use crate::stage::{RenderStage, UpdateStage};
use crate::types::{FrameId, StageError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Reports of one full frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub frame: FrameId,
    pub update: RunReport,
    pub render: RunReport,
}

/// Built schedules plus the per-frame state needed to walk them.
pub struct Scheduler<W> {
    update: StageList<UpdateStage<W>>,
    render: BTreeMap<String, StageList<RenderStage<W>>>,
    unplaced: Vec<UnplacedRegistration>,
    engine: ExecutionEngine,
    payloads: PayloadStore,
    frame: FrameId,
    perf: PerfRecorder,
}

impl<W> Scheduler<W> {
    /// Build the update schedule and every render schedule.
    ///
    /// Under `UnplacedPolicy::FailFast` the first incomplete schedule fails
    /// the whole build.
    pub fn build_schedules(
        registry: &SchedulerRegistry<W>,
        config: &SchedulerConfig,
    ) -> Result<Self, StageError> {
        config.validate()?;
        let policy = config.unplaced_policy;

        let update = GraphBuilder::new(UPDATE_SCHEDULE, policy)
            .build(registry.update_table().working_copy())?;
        let mut unplaced = update.unplaced;

        let mut render = BTreeMap::new();
        for table in registry.render_tables() {
            let outcome = GraphBuilder::new(table.name(), policy).build(table.working_copy())?;
            unplaced.extend(outcome.unplaced);
            render.insert(table.name().to_string(), outcome.stages);
        }

        tracing::info!(
            update_stages = update.stages.len(),
            render_schedules = render.len(),
            unplaced = unplaced.len(),
            "schedules built"
        );

        Ok(Self {
            update: update.stages,
            render,
            unplaced,
            engine: ExecutionEngine::new(config.limits())
                .with_disabled(config.disabled_stages.clone()),
            payloads: PayloadStore::new(),
            frame: FrameId::default(),
            perf: PerfRecorder::new(),
        })
    }

    /// The update schedule.
    #[must_use]
    pub fn update_schedule(&self) -> &StageList<UpdateStage<W>> {
        &self.update
    }

    /// The render schedule of `backend`, if one was registered.
    #[must_use]
    pub fn render_schedule(&self, backend: &str) -> Option<&StageList<RenderStage<W>>> {
        self.render.get(backend)
    }

    /// Render backends in name order.
    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.render.keys().map(String::as_str)
    }

    /// Registrations left out of every schedule.
    #[must_use]
    pub fn unplaced(&self) -> &[UnplacedRegistration] {
        &self.unplaced
    }

    /// Current frame id.
    #[must_use]
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Advance to the next frame; returns the new frame id.
    pub fn end_frame(&mut self) -> FrameId {
        self.frame = self.frame.next();
        self.frame
    }

    #[must_use]
    pub fn payloads(&self) -> &PayloadStore {
        &self.payloads
    }

    pub fn payloads_mut(&mut self) -> &mut PayloadStore {
        &mut self.payloads
    }

    /// Stage names skipped by every walk; may be changed between frames.
    pub fn disabled_stages_mut(&mut self) -> &mut BTreeSet<String> {
        self.engine.disabled_mut()
    }

    #[must_use]
    pub fn perf(&self) -> &PerfRecorder {
        &self.perf
    }

    pub fn reset_perf(&mut self) {
        self.perf.clear();
    }

    /// Serializable snapshot of every schedule.
    #[must_use]
    pub fn report(&self) -> ScheduleReport {
        let mut schedules = vec![ScheduleSummary::from_list(ScheduleKind::Update, &self.update)];
        schedules.extend(
            self.render
                .values()
                .map(|list| ScheduleSummary::from_list(ScheduleKind::Render, list)),
        );
        ScheduleReport {
            schedules,
            unplaced: self.unplaced.clone(),
        }
    }
}

impl<W: ObjectSource> Scheduler<W> {
    /// Walk the update schedule for the current frame.
    pub fn run_update_schedule(&mut self, world: &mut W) -> Result<RunReport, StageError> {
        self.engine.run_update(
            &self.update,
            world,
            &mut self.payloads,
            self.frame,
            &mut self.perf,
        )
    }

    /// Walk `backend`'s render schedule for the current frame.
    ///
    /// Transient payload entries are discarded first, so per-frame counters
    /// start at zero for every render pass.
    pub fn run_render_schedule(
        &mut self,
        backend: &str,
        world: &mut W,
    ) -> Result<RunReport, StageError> {
        let stages = self
            .render
            .get(backend)
            .ok_or_else(|| StageError::UnknownSchedule(backend.to_string()))?;
        self.payloads.reset();
        self.engine
            .run_render(stages, world, &mut self.payloads, self.frame, &mut self.perf)
    }

    /// Update, render `backend`, then advance the frame.
    pub fn run_frame(&mut self, backend: &str, world: &mut W) -> Result<FrameReport, StageError> {
        let frame = self.frame;
        let update = self.run_update_schedule(world)?;
        let render = self.run_render_schedule(backend, world)?;
        self.end_frame();
        Ok(FrameReport {
            frame,
            update,
            render,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnplacedPolicy;
    use crate::objects::ObjectTable;
    use crate::stage::{FrameContext, object_action};
    use crate::types::{ObjectType, Relation, Side};

    fn registry() -> SchedulerRegistry<ObjectTable> {
        let mut registry = SchedulerRegistry::new();
        registry.register_update_anchor(
            "Begin",
            Side::Head,
            0,
            ObjectType::ANY,
            object_action(|_ctx: &mut FrameContext<'_, ObjectTable>, _o| Ok(())),
        );
        registry.register_render_anchor(
            "opengl",
            Side::Head,
            0,
            RenderStage::new("Init Frame", ObjectType::ANY),
        );
        registry.register_render_stage(
            "opengl",
            "Init Frame",
            Relation::After,
            0,
            RenderStage::new("Lighting", ObjectType::ANY),
        );
        registry.register_render_stage(
            "vulkan",
            "Nowhere",
            Relation::After,
            0,
            RenderStage::new("Orphan", ObjectType::ANY),
        );
        registry
    }

    #[test]
    fn builds_each_schedule() {
        let scheduler =
            Scheduler::build_schedules(&registry(), &SchedulerConfig::default()).expect("build");

        assert_eq!(scheduler.update_schedule().ids(), vec!["Begin"]);
        assert_eq!(
            scheduler.render_schedule("opengl").map(|l| l.ids()),
            Some(vec!["Init Frame", "Lighting"])
        );
        assert_eq!(scheduler.backends().collect::<Vec<_>>(), vec!["opengl", "vulkan"]);
        assert_eq!(scheduler.unplaced().len(), 1);
        assert_eq!(scheduler.report().schedules.len(), 3);
    }

    #[test]
    fn fail_fast_rejects_incomplete_registry() {
        let config = SchedulerConfig {
            unplaced_policy: UnplacedPolicy::FailFast,
            ..SchedulerConfig::default()
        };
        let result = Scheduler::build_schedules(&registry(), &config);
        assert!(matches!(result, Err(StageError::UnresolvedStages { .. })));
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let mut scheduler =
            Scheduler::build_schedules(&registry(), &SchedulerConfig::default()).expect("build");
        let mut world = ObjectTable::new();
        let result = scheduler.run_render_schedule("metal", &mut world);
        assert!(matches!(result, Err(StageError::UnknownSchedule(ref b)) if b == "metal"));
    }

    #[test]
    fn run_frame_advances_and_resets_transients() {
        let mut scheduler =
            Scheduler::build_schedules(&registry(), &SchedulerConfig::default()).expect("build");
        let mut world = ObjectTable::new();
        world.insert("Cube", ObjectType::bit(0));

        scheduler.payloads_mut().set("scratch", false, 1u8);
        let report = scheduler.run_frame("opengl", &mut world).expect("frame");

        assert_eq!(report.frame, FrameId::new(0));
        assert_eq!(report.render.stage_iterations, 2);
        assert_eq!(scheduler.frame(), FrameId::new(1));
        assert!(!scheduler.payloads().contains("scratch"));
        assert!(scheduler.payloads().contains("Lighting::LastCalled"));
        assert!(scheduler.perf().stage("opengl", "Lighting").is_some());
    }

    #[test]
    fn disabled_stages_can_change_between_frames() {
        let mut scheduler =
            Scheduler::build_schedules(&registry(), &SchedulerConfig::default()).expect("build");
        let mut world = ObjectTable::new();

        scheduler.disabled_stages_mut().insert("Lighting".to_string());
        let first = scheduler.run_frame("opengl", &mut world).expect("frame");
        assert_eq!(first.render.skipped, vec!["Lighting".to_string()]);

        scheduler.disabled_stages_mut().clear();
        let second = scheduler.run_frame("opengl", &mut world).expect("frame");
        assert!(second.render.skipped.is_empty());
        assert_eq!(second.render.stage_iterations, 2);
    }

    #[test]
    fn update_transients_do_not_reach_the_render_walk() {
        let mut registry = SchedulerRegistry::new();
        registry.register_update_anchor(
            "Physics",
            Side::Head,
            0,
            ObjectType::ANY,
            object_action(|ctx: &mut FrameContext<'_, ObjectTable>, _o| {
                ctx.payloads().set("Physics::Scratch", false, 1u32);
                ctx.payloads().set("Physics::Total", true, 1u32);
                Ok(())
            }),
        );
        registry.register_render_anchor(
            "opengl",
            Side::Head,
            0,
            RenderStage::new("Lighting", ObjectType::ANY),
        );
        let mut scheduler =
            Scheduler::build_schedules(&registry, &SchedulerConfig::default()).expect("build");
        let mut world = ObjectTable::new();
        world.insert("Cube", ObjectType::bit(0));

        scheduler.run_update_schedule(&mut world).expect("update");
        assert!(scheduler.payloads().contains("Physics::Scratch"));

        scheduler.run_render_schedule("opengl", &mut world).expect("render");
        assert!(!scheduler.payloads().contains("Physics::Scratch"));
        assert!(scheduler.payloads().contains("Physics::Total"));
    }
}
