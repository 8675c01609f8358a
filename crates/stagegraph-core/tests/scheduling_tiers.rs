//! # Scheduling Tier Tests (T0-T3)
//!
//! If ANY tier fails, the scheduler is INVALID.
//!
//! ## Tiers
//! - T0: Payload Store
//! - T1: Placement
//! - T2: Execution Protocol
//! - T3: End-to-End Frames

use stagegraph_core::stage::conditions::{
    all_of_type, call_count, multi_call_object_driven_by, multi_call_type, repeat_type,
};
use stagegraph_core::{
    FrameContext, FrameId, GraphBuilder, ObjectRef, ObjectSource, ObjectTable, ObjectType,
    PayloadStore, Relation, RegistrationTable, RenderStage, Scheduler, SchedulerConfig,
    SchedulerRegistry, Side, StageError, StageModule, UnplacedPolicy, UnplacedReason,
    object_action, state_hook,
};

// =============================================================================
// SHARED FIXTURES
// =============================================================================

const MESH: ObjectType = ObjectType::bit(0);
const LIGHT: ObjectType = ObjectType::bit(1);

/// Scene objects plus an ordered trace of everything the stages did.
#[derive(Default)]
struct World {
    objects: ObjectTable,
    trace: Vec<String>,
}

impl ObjectSource for World {
    fn objects_of_type(&self, filter: ObjectType) -> Vec<ObjectRef> {
        self.objects.objects_of_type(filter)
    }
}

fn tracing_stage(name: &str, object_type: ObjectType) -> RenderStage<World> {
    RenderStage::new(name, object_type).with_action(object_action(
        |ctx: &mut FrameContext<'_, World>, object| {
            let entry = format!("{}/{}", ctx.stage(), object.name);
            ctx.world_mut().trace.push(entry);
            Ok(())
        },
    ))
}

fn order(table: &RegistrationTable<()>) -> Vec<String> {
    GraphBuilder::new(table.name(), UnplacedPolicy::WarnAndDrop)
        .build(table.working_copy())
        .expect("build")
        .stages
        .ids()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// TIER T0: PAYLOAD STORE
// =============================================================================

mod t0_payload_store {
    use super::*;

    /// T0.1: get returns the default, then the stored value, then the
    /// default again after a reset.
    #[test]
    fn get_store_reset_cycle() {
        let mut store = PayloadStore::new();

        assert_eq!(*store.get("frame::counter", false, 0i32).expect("get"), 0);
        *store.get("frame::counter", false, 0i32).expect("get") = 5;
        assert_eq!(*store.get("frame::counter", false, 0i32).expect("get"), 5);

        store.reset();
        assert_eq!(*store.get("frame::counter", false, 0i32).expect("get"), 0);
    }

    /// T0.2: consume returns the value once.
    #[test]
    fn consume_once() {
        let mut store = PayloadStore::new();
        store.set("resize", false, (1920u32, 1080u32));

        assert_eq!(
            store.consume::<(u32, u32)>("resize").expect("consume"),
            Some((1920, 1080))
        );
        assert_eq!(store.consume::<(u32, u32)>("resize").expect("consume"), None);
    }

    /// T0.3: wrong type is an error, not a wrong value.
    #[test]
    fn type_mismatch_is_error() {
        let mut store = PayloadStore::new();
        store.set("exposure", true, 2u64);

        let result = store.get("exposure", true, String::new());
        assert!(matches!(result, Err(StageError::PayloadTypeMismatch { .. })));
    }
}

// =============================================================================
// TIER T1: PLACEMENT
// =============================================================================

mod t1_placement {
    use super::*;

    /// T1.1: A chain registered back-to-front builds front-to-back.
    #[test]
    fn end_to_end_order() {
        let mut table = RegistrationTable::new("update");
        table.register("Input", "", Relation::Before, 0, ());
        table.register("Physics", "Input", Relation::After, 0, ());
        table.register("Render", "Physics", Relation::After, 0, ());
        table.register_anchor("Begin", Side::Head, 0, ());

        assert_eq!(order(&table), vec!["Begin", "Input", "Physics", "Render"]);
    }

    /// T1.2: A two-stage cycle leaves both unplaced.
    #[test]
    fn cycle_detected() {
        let mut table = RegistrationTable::new("update");
        table.register("A", "B", Relation::After, 0, ());
        table.register("B", "A", Relation::After, 0, ());

        let outcome = GraphBuilder::new("update", UnplacedPolicy::WarnAndDrop)
            .build(table.working_copy())
            .expect("build");

        assert!(outcome.stages.is_empty());
        let ids: Vec<_> = outcome.unplaced.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    /// T1.3: Priority tiers: X is placed before Y is ever attempted.
    #[test]
    fn priority_tiers_respected() {
        let mut table = RegistrationTable::new("update");
        table.register("Y", "X", Relation::Before, 1, ());
        table.register("X", "", Relation::Before, 0, ());

        let outcome = GraphBuilder::new("update", UnplacedPolicy::WarnAndDrop)
            .build(table.working_copy())
            .expect("build");

        assert_eq!(outcome.stages.ids(), vec!["Y", "X"]);
        assert_eq!(outcome.passes, 2);
    }

    /// T1.4: A lower priority referencing a higher one stalls the build.
    #[test]
    fn inverted_priorities_stall() {
        let mut table = RegistrationTable::new("update");
        table.register("Early", "Late", Relation::Before, 0, ());
        table.register("Late", "", Relation::Before, 1, ());

        let outcome = GraphBuilder::new("update", UnplacedPolicy::WarnAndDrop)
            .build(table.working_copy())
            .expect("build");

        assert!(outcome.stages.is_empty());
        let reasons: Vec<_> = outcome.unplaced.iter().map(|u| u.reason).collect();
        assert_eq!(
            reasons,
            vec![
                UnplacedReason::UnresolvedDependency,
                UnplacedReason::BlockedByPriority
            ]
        );
    }

    /// T1.5: Begin/End brackets with stages registered between them.
    #[test]
    fn bracket_pattern() {
        let mut table = RegistrationTable::new("opengl");
        table.register("Uniforms [Begin]", "", Relation::Before, 0, ());
        table.register("Uniforms [End]", "Uniforms [Begin]", Relation::After, 0, ());
        table.register("Lighting [Begin]", "Uniforms [End]", Relation::After, 0, ());
        table.register("Lighting [End]", "Lighting [Begin]", Relation::After, 0, ());
        table.register("Init Frame", "Uniforms [Begin]", Relation::After, 1, ());
        table.register("Render Uniforms", "Init Frame", Relation::After, 1, ());
        table.register("Lighting [Sun]", "Lighting [Begin]", Relation::After, 2, ());

        assert_eq!(
            order(&table),
            vec![
                "Uniforms [Begin]",
                "Init Frame",
                "Render Uniforms",
                "Uniforms [End]",
                "Lighting [Begin]",
                "Lighting [Sun]",
                "Lighting [End]",
            ]
        );
    }
}

// =============================================================================
// TIER T2: EXECUTION PROTOCOL
// =============================================================================

mod t2_execution {
    use super::*;

    fn scheduler(stages: Vec<(RenderStage<World>, &str)>) -> Scheduler<World> {
        let mut registry = SchedulerRegistry::new();
        for (stage, after) in stages {
            registry.register_render_stage("opengl", after, Relation::After, 0, stage);
        }
        Scheduler::build_schedules(&registry, &SchedulerConfig::default()).expect("build")
    }

    fn world() -> World {
        let mut world = World::default();
        world.objects.insert("Cube", MESH);
        world.objects.insert("Sun", LIGHT);
        world.objects.insert("Lamp", MESH.with(LIGHT));
        world
    }

    /// T2.1: Stages run in list order, objects in enumeration order.
    #[test]
    fn list_then_object_order() {
        let mut scheduler = scheduler(vec![
            (tracing_stage("GBuffer", MESH), ""),
            (tracing_stage("Lighting", LIGHT), "GBuffer"),
        ]);
        let mut world = world();

        scheduler
            .run_render_schedule("opengl", &mut world)
            .expect("render");

        assert_eq!(
            world.trace,
            vec!["GBuffer/Cube", "GBuffer/Lamp", "Lighting/Sun", "Lighting/Lamp"]
        );
    }

    /// T2.2: First-call gates hold within a frame and reopen on the next.
    #[test]
    fn first_call_per_frame() {
        let mut scheduler = scheduler(vec![(tracing_stage("GBuffer", MESH), "")]);
        let mut world = world();

        scheduler.run_render_schedule("opengl", &mut world).expect("render");
        scheduler.run_render_schedule("opengl", &mut world).expect("render");
        assert_eq!(world.trace.len(), 2);

        scheduler.end_frame();
        scheduler.run_render_schedule("opengl", &mut world).expect("render");
        assert_eq!(world.trace.len(), 4);
    }

    /// T2.3: A mesh stage replays once per shadow map rendered by its driver.
    #[test]
    fn driven_multi_call() {
        let driver = RenderStage::new("Shadow Maps [Begin]", LIGHT)
            .with_type_condition(all_of_type(vec![repeat_type(3), multi_call_type()]));
        let meshes = tracing_stage("Shadow Maps [Mesh]", MESH)
            .with_object_condition(multi_call_object_driven_by("Shadow Maps [Begin]"));

        let mut scheduler = scheduler(vec![
            (driver, ""),
            (meshes, "Shadow Maps [Begin]"),
        ]);
        let mut world = world();
        let report = scheduler
            .run_render_schedule("opengl", &mut world)
            .expect("render");

        assert_eq!(
            world
                .trace
                .iter()
                .filter(|t| t.as_str() == "Shadow Maps [Mesh]/Cube")
                .count(),
            3
        );
        assert_eq!(report.object_invocations, 6);
        assert_eq!(
            call_count(scheduler.payloads(), "Shadow Maps [Begin]", None).expect("count"),
            3
        );
    }

    /// T2.4: Disabled stages do not run any callback.
    #[test]
    fn disabled_stage_skipped() {
        let mut scheduler = scheduler(vec![
            (tracing_stage("GBuffer", MESH), ""),
            (tracing_stage("Motion Blur", MESH), "GBuffer"),
        ]);
        scheduler
            .disabled_stages_mut()
            .insert("Motion Blur".to_string());
        let mut world = world();

        let report = scheduler
            .run_render_schedule("opengl", &mut world)
            .expect("render");

        assert_eq!(report.skipped, vec!["Motion Blur".to_string()]);
        assert!(world.trace.iter().all(|t| t.starts_with("GBuffer/")));
    }

    /// T2.5: Pre and post hooks bracket every type iteration.
    #[test]
    fn hooks_bracket_iterations() {
        let stage = tracing_stage("Translucency", MESH)
            .with_type_condition(all_of_type(vec![repeat_type(2), multi_call_type()]))
            .with_object_condition(stagegraph_core::stage::conditions::multi_call_object())
            .with_pre_state(state_hook(|ctx: &mut FrameContext<'_, World>| {
                ctx.world_mut().trace.push("pre".to_string());
                Ok(())
            }))
            .with_post_state(state_hook(|ctx: &mut FrameContext<'_, World>| {
                ctx.world_mut().trace.push("post".to_string());
                Ok(())
            }));
        let mut scheduler = scheduler(vec![(stage, "")]);
        let mut world = world();

        scheduler.run_render_schedule("opengl", &mut world).expect("render");

        assert_eq!(
            world.trace,
            vec![
                "pre",
                "Translucency/Cube",
                "Translucency/Lamp",
                "post",
                "pre",
                "Translucency/Cube",
                "Translucency/Lamp",
                "post",
            ]
        );
    }
}

// =============================================================================
// TIER T3: END-TO-END FRAMES
// =============================================================================

mod t3_frames {
    use super::*;

    struct Animation;

    impl StageModule<World> for Animation {
        fn name(&self) -> &str {
            "Animation"
        }

        fn register(&self, registry: &mut SchedulerRegistry<World>) {
            registry.register_update_stage(
                "Animate",
                "Input",
                Relation::After,
                0,
                MESH,
                object_action(|ctx: &mut FrameContext<'_, World>, object| {
                    let entry = format!("update:{}@{}", object.name, ctx.frame());
                    ctx.world_mut().trace.push(entry);
                    Ok(())
                }),
            );
        }
    }

    struct Input;

    impl StageModule<World> for Input {
        fn name(&self) -> &str {
            "Input"
        }

        fn register(&self, registry: &mut SchedulerRegistry<World>) {
            registry.register_update_anchor(
                "Input",
                Side::Head,
                0,
                ObjectType::ANY,
                object_action(|_ctx: &mut FrameContext<'_, World>, _object| Ok(())),
            );
            registry.register_render_anchor(
                "opengl",
                Side::Tail,
                0,
                tracing_stage("Present", ObjectType::ANY).owned_by(self.name()),
            );
        }
    }

    /// T3.1: Modules installed in any order produce the same frames.
    #[test]
    fn frames_independent_of_install_order() {
        let run = |modules: Vec<&dyn StageModule<World>>| {
            let mut registry = SchedulerRegistry::new();
            for module in modules {
                registry.install(module);
            }
            let mut scheduler =
                Scheduler::build_schedules(&registry, &SchedulerConfig::default()).expect("build");
            let mut world = World::default();
            world.objects.insert("Cube", MESH);

            for _ in 0..2 {
                scheduler.run_frame("opengl", &mut world).expect("frame");
            }
            (scheduler.update_schedule().ids().join(","), world.trace)
        };

        let forward = run(vec![&Input as &dyn StageModule<World>, &Animation]);
        let backward = run(vec![&Animation as &dyn StageModule<World>, &Input]);

        assert_eq!(forward, backward);
        assert_eq!(forward.0, "Input,Animate");
        assert_eq!(
            forward.1,
            vec![
                "update:Cube@0",
                "Present/Cube",
                "update:Cube@1",
                "Present/Cube"
            ]
        );
    }

    /// T3.2: FailFast surfaces unplaced stages at build time.
    #[test]
    fn fail_fast_build() {
        let mut registry = SchedulerRegistry::new();
        registry.install(&Animation);

        let config = SchedulerConfig {
            unplaced_policy: UnplacedPolicy::FailFast,
            ..SchedulerConfig::default()
        };
        let err = Scheduler::build_schedules(&registry, &config)
            .err()
            .expect("missing Input");
        assert!(err.to_string().contains("Animate"));
    }

    /// T3.3: The frame counter advances once per frame.
    #[test]
    fn frame_counter_advances() {
        let mut registry = SchedulerRegistry::new();
        registry.install(&Input);
        let mut scheduler =
            Scheduler::build_schedules(&registry, &SchedulerConfig::default()).expect("build");
        let mut world = World::default();

        let first = scheduler.run_frame("opengl", &mut world).expect("frame");
        let second = scheduler.run_frame("opengl", &mut world).expect("frame");

        assert_eq!(first.frame, FrameId::new(0));
        assert_eq!(second.frame, FrameId::new(1));
        assert_eq!(scheduler.frame(), FrameId::new(2));
    }
}
