//! # Standard Conditions
//!
//! Reusable type and object conditions built on the payload store.
//!
//! ## First-call
//!
//! True at most once per frame per `(stage)` or `(stage, object)`. The
//! persistent `LastCalled` entry remembers the last frame the gate opened;
//! the transient `CallCount` entry counts openings within the frame.
//!
//! ## Multi-call
//!
//! `multi_call_type` always opens and bumps the stage's `CallCount`, so it
//! must be combined with a bounding predicate such as [`repeat_type`].
//! `multi_call_object` opens once per increment of a driving stage's
//! `CallCount`, replaying the object loop once per outer iteration.

use super::{FrameContext, ObjectCondition, TypeCondition, object_condition, type_condition};
use crate::payload::PayloadStore;
use crate::primitives::{
    CALL_COUNT_SUFFIX, LAST_CALLED_SUFFIX, ONCE_SUFFIX, REPEAT_COUNT_SUFFIX, payload_key,
};
use crate::types::{FrameId, StageError};

// =============================================================================
// KEYS
// =============================================================================

/// Persistent key holding the last frame a stage (or stage/object pair) ran.
#[must_use]
pub fn last_called_key(stage: &str, object: Option<&str>) -> String {
    payload_key(&[stage, object.unwrap_or_default(), LAST_CALLED_SUFFIX])
}

/// Transient key counting invocations of a stage (or stage/object pair) this frame.
#[must_use]
pub fn call_count_key(stage: &str, object: Option<&str>) -> String {
    payload_key(&[stage, object.unwrap_or_default(), CALL_COUNT_SUFFIX])
}

/// Current call count, without creating the entry.
pub fn call_count(
    store: &PayloadStore,
    stage: &str,
    object: Option<&str>,
) -> Result<u32, StageError> {
    Ok(store
        .peek::<u32>(&call_count_key(stage, object))?
        .copied()
        .unwrap_or(0))
}

fn bump_call_count(
    store: &mut PayloadStore,
    stage: &str,
    object: Option<&str>,
) -> Result<u32, StageError> {
    let count = store.get(&call_count_key(stage, object), false, 0u32)?;
    *count = count.saturating_add(1);
    Ok(*count)
}

fn first_call(
    store: &mut PayloadStore,
    stage: &str,
    object: Option<&str>,
    frame: FrameId,
) -> Result<bool, StageError> {
    let last = store.get(&last_called_key(stage, object), true, None::<FrameId>)?;
    if *last == Some(frame) {
        return Ok(false);
    }
    *last = Some(frame);
    bump_call_count(store, stage, object)?;
    Ok(true)
}

// =============================================================================
// FIRST-CALL
// =============================================================================

/// Open once per frame for the stage.
pub fn first_call_type<W: 'static>() -> TypeCondition<W> {
    type_condition(|ctx: &mut FrameContext<'_, W>| {
        let (stage, frame) = (ctx.stage(), ctx.frame());
        first_call(ctx.payloads(), stage, None, frame)
    })
}

/// Open once per frame for each object of the stage.
pub fn first_call_object<W: 'static>() -> ObjectCondition<W> {
    object_condition(|ctx: &mut FrameContext<'_, W>, object| {
        let (stage, frame) = (ctx.stage(), ctx.frame());
        first_call(ctx.payloads(), stage, Some(object.name.as_str()), frame)
    })
}

// =============================================================================
// MULTI-CALL
// =============================================================================

/// Always open; counts openings in the stage's `CallCount`.
pub fn multi_call_type<W: 'static>() -> TypeCondition<W> {
    type_condition(|ctx: &mut FrameContext<'_, W>| {
        let stage = ctx.stage();
        bump_call_count(ctx.payloads(), stage, None)?;
        Ok(true)
    })
}

/// Open while the object's count is below the stage's own `CallCount`.
pub fn multi_call_object<W: 'static>() -> ObjectCondition<W> {
    object_condition(|ctx: &mut FrameContext<'_, W>, object| {
        let stage = ctx.stage();
        multi_call(ctx.payloads(), stage, stage, &object.name)
    })
}

/// Open while the object's count is below `driver`'s `CallCount`.
pub fn multi_call_object_driven_by<W: 'static>(driver: impl Into<String>) -> ObjectCondition<W> {
    let driver = driver.into();
    object_condition(move |ctx: &mut FrameContext<'_, W>, object| {
        let stage = ctx.stage();
        multi_call(ctx.payloads(), &driver, stage, &object.name)
    })
}

fn multi_call(
    store: &mut PayloadStore,
    driver: &str,
    stage: &str,
    object: &str,
) -> Result<bool, StageError> {
    let target = call_count(store, driver, None)?;
    let count = store.get(&call_count_key(stage, Some(object)), false, 0u32)?;
    if *count >= target {
        return Ok(false);
    }
    *count = count.saturating_add(1);
    Ok(true)
}

// =============================================================================
// BOUNDING & COMBINATORS
// =============================================================================

/// Open for the first `times` evaluations of each render pass.
pub fn repeat_type<W: 'static>(times: u32) -> TypeCondition<W> {
    type_condition(move |ctx: &mut FrameContext<'_, W>| {
        let key = payload_key(&[ctx.stage(), REPEAT_COUNT_SUFFIX]);
        let count = ctx.payloads().get(&key, false, 0u32)?;
        if *count >= times {
            return Ok(false);
        }
        *count = count.saturating_add(1);
        Ok(true)
    })
}

/// Open when every condition opens, evaluated left to right with short-circuit.
pub fn all_of_type<W: 'static>(conditions: Vec<TypeCondition<W>>) -> TypeCondition<W> {
    type_condition(move |ctx: &mut FrameContext<'_, W>| {
        for condition in &conditions {
            if !condition(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

/// Object counterpart of [`all_of_type`].
pub fn all_of_object<W: 'static>(conditions: Vec<ObjectCondition<W>>) -> ObjectCondition<W> {
    object_condition(move |ctx: &mut FrameContext<'_, W>, object| {
        for condition in &conditions {
            if !condition(ctx, object)? {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

/// Open exactly once per render pass, whatever frame the stage last ran in.
///
/// Uses a transient marker only, so a second pass in the same frame (after
/// the transient payloads are reset) opens the gate again.
pub fn always_once<W: 'static>() -> TypeCondition<W> {
    type_condition(|ctx: &mut FrameContext<'_, W>| {
        let key = payload_key(&[ctx.stage(), ONCE_SUFFIX]);
        let seen = ctx.payloads().get(&key, false, false)?;
        if *seen {
            return Ok(false);
        }
        *seen = true;
        Ok(true)
    })
}

/// Never opens. Keeps a stage registered but inert.
pub fn never_type<W: 'static>() -> TypeCondition<W> {
    type_condition(|_ctx: &mut FrameContext<'_, W>| Ok(false))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectRef;

    fn eval_type(
        cond: &TypeCondition<()>,
        payloads: &mut PayloadStore,
        frame: u64,
        stage: &str,
    ) -> bool {
        let mut world = ();
        let mut ctx = FrameContext::new(&mut world, payloads, FrameId::new(frame), stage);
        cond(&mut ctx).expect("condition")
    }

    fn eval_object(
        cond: &ObjectCondition<()>,
        payloads: &mut PayloadStore,
        frame: u64,
        stage: &str,
        object: &ObjectRef,
    ) -> bool {
        let mut world = ();
        let mut ctx = FrameContext::new(&mut world, payloads, FrameId::new(frame), stage);
        cond(&mut ctx, object).expect("condition")
    }

    #[test]
    fn first_call_type_once_per_frame() {
        let cond = first_call_type::<()>();
        let mut payloads = PayloadStore::new();

        assert!(eval_type(&cond, &mut payloads, 1, "Bloom"));
        assert!(!eval_type(&cond, &mut payloads, 1, "Bloom"));
        assert_eq!(call_count(&payloads, "Bloom", None).expect("count"), 1);

        payloads.reset();
        assert!(eval_type(&cond, &mut payloads, 2, "Bloom"));
        assert!(!eval_type(&cond, &mut payloads, 2, "Bloom"));
    }

    #[test]
    fn last_called_survives_reset() {
        let cond = first_call_type::<()>();
        let mut payloads = PayloadStore::new();

        assert!(eval_type(&cond, &mut payloads, 3, "GUI"));
        payloads.reset();
        // Same frame id after a reset: the persistent stamp still closes the gate.
        assert!(!eval_type(&cond, &mut payloads, 3, "GUI"));
        assert!(payloads.is_persistent("GUI::LastCalled"));
    }

    #[test]
    fn first_call_object_is_per_object() {
        let cond = first_call_object::<()>();
        let mut payloads = PayloadStore::new();
        let cube = ObjectRef::new(0, "Cube");
        let sphere = ObjectRef::new(1, "Sphere");

        assert!(eval_object(&cond, &mut payloads, 1, "Mesh", &cube));
        assert!(eval_object(&cond, &mut payloads, 1, "Mesh", &sphere));
        assert!(!eval_object(&cond, &mut payloads, 1, "Mesh", &cube));
        assert!(payloads.contains("Mesh::Cube::LastCalled"));
    }

    #[test]
    fn multi_call_object_follows_driver_count() {
        let ty = all_of_type::<()>(vec![repeat_type(2), multi_call_type()]);
        let obj = multi_call_object::<()>();
        let mut payloads = PayloadStore::new();
        let light = ObjectRef::new(0, "Sun");

        let mut runs = 0;
        while eval_type(&ty, &mut payloads, 1, "Shadow Maps") {
            while eval_object(&obj, &mut payloads, 1, "Shadow Maps", &light) {
                runs += 1;
            }
        }

        assert_eq!(runs, 2);
        assert_eq!(call_count(&payloads, "Shadow Maps", None).expect("count"), 2);
    }

    #[test]
    fn driven_multi_call_reads_other_stage() {
        let driver = multi_call_type::<()>();
        let obj = multi_call_object_driven_by::<()>("Shadow Maps [Begin]");
        let mut payloads = PayloadStore::new();
        let cube = ObjectRef::new(0, "Cube");

        assert!(!eval_object(&obj, &mut payloads, 1, "Shadow Maps [Mesh]", &cube));

        assert!(eval_type(&driver, &mut payloads, 1, "Shadow Maps [Begin]"));
        assert!(eval_type(&driver, &mut payloads, 1, "Shadow Maps [Begin]"));

        let mut runs = 0;
        while eval_object(&obj, &mut payloads, 1, "Shadow Maps [Mesh]", &cube) {
            runs += 1;
        }
        assert_eq!(runs, 2);
    }

    #[test]
    fn never_type_stays_closed() {
        let cond = never_type::<()>();
        let mut payloads = PayloadStore::new();
        assert!(!eval_type(&cond, &mut payloads, 1, "Disabled"));
        assert!(payloads.is_empty());
    }

    #[test]
    fn always_once_reopens_after_reset() {
        let cond = always_once::<()>();
        let mut payloads = PayloadStore::new();

        assert!(eval_type(&cond, &mut payloads, 5, "Present"));
        assert!(!eval_type(&cond, &mut payloads, 5, "Present"));
        assert!(!payloads.contains("Present::LastCalled"));

        // A second pass in the same frame opens again.
        payloads.reset();
        assert!(eval_type(&cond, &mut payloads, 5, "Present"));
        assert!(!payloads.is_persistent("Present::Once"));
    }

    #[test]
    fn all_of_object_short_circuits() {
        let closed = all_of_object::<()>(vec![
            object_condition(|_ctx: &mut FrameContext<'_, ()>, _object| Ok(false)),
            first_call_object(),
        ]);
        let mut payloads = PayloadStore::new();
        let cube = ObjectRef::new(0, "Cube");

        assert!(!eval_object(&closed, &mut payloads, 1, "Mesh", &cube));
        // The first-call gate was never evaluated.
        assert!(!payloads.contains("Mesh::Cube::LastCalled"));

        let open = all_of_object::<()>(vec![
            object_condition(|_ctx: &mut FrameContext<'_, ()>, _object| Ok(true)),
            first_call_object(),
        ]);
        assert!(eval_object(&open, &mut payloads, 1, "Mesh", &cube));
        assert!(!eval_object(&open, &mut payloads, 1, "Mesh", &cube));
        assert!(payloads.contains("Mesh::Cube::LastCalled"));
    }
}
