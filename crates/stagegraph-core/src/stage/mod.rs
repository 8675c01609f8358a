//! # Stage Callback Contract
//!
//! A stage is a named unit of update or render behavior. Its behavior is a
//! small set of reference-counted closures the execution engine composes:
//!
//! | Callback | Signature | Used by |
//! |----------|-----------|---------|
//! | type condition | `(ctx) -> bool` | render walk, outer while loop |
//! | object condition | `(ctx, object) -> bool` | render walk, inner while loop |
//! | pre/post state hook | `(ctx)` | render walk, around each type iteration |
//! | object action | `(ctx, object)` | render walk and update walk |
//!
//! Every callback returns a `Result`; the first error aborts the walk.
//!
//! Closures are `Rc`, not `Arc`: the walk is single-threaded and a built
//! stage list is shared by clone between the registry and the scheduler.

pub mod conditions;

use crate::payload::PayloadStore;
use crate::types::{FrameId, ObjectRef, ObjectType, StageError, StageId};
use std::fmt;
use std::rc::Rc;

// =============================================================================
// FRAME CONTEXT
// =============================================================================

/// Everything a callback can see while its stage runs.
pub struct FrameContext<'a, W> {
    world: &'a mut W,
    payloads: &'a mut PayloadStore,
    frame: FrameId,
    stage: &'a str,
}

impl<'a, W> FrameContext<'a, W> {
    /// Create a context for one stage invocation.
    pub fn new(
        world: &'a mut W,
        payloads: &'a mut PayloadStore,
        frame: FrameId,
        stage: &'a str,
    ) -> Self {
        Self {
            world,
            payloads,
            frame,
            stage,
        }
    }

    /// The world the schedule runs against.
    pub fn world(&self) -> &W {
        &*self.world
    }

    /// Mutable access to the world.
    pub fn world_mut(&mut self) -> &mut W {
        &mut *self.world
    }

    /// The shared payload store.
    pub fn payloads(&mut self) -> &mut PayloadStore {
        &mut *self.payloads
    }

    /// Current frame id.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Name of the stage being executed.
    pub fn stage(&self) -> &'a str {
        self.stage
    }
}

// =============================================================================
// CALLBACK TYPES
// =============================================================================

/// Outer repeat-while predicate of a render stage.
pub type TypeCondition<W> = Rc<dyn Fn(&mut FrameContext<'_, W>) -> Result<bool, StageError>>;

/// Inner repeat-while predicate, evaluated per object.
pub type ObjectCondition<W> =
    Rc<dyn Fn(&mut FrameContext<'_, W>, &ObjectRef) -> Result<bool, StageError>>;

/// Hook run before or after each type iteration.
pub type StateHook<W> = Rc<dyn Fn(&mut FrameContext<'_, W>) -> Result<(), StageError>>;

/// Per-object work of a stage.
pub type ObjectAction<W> =
    Rc<dyn Fn(&mut FrameContext<'_, W>, &ObjectRef) -> Result<(), StageError>>;

/// Wrap a closure as a [`TypeCondition`].
pub fn type_condition<W, F>(f: F) -> TypeCondition<W>
where
    F: Fn(&mut FrameContext<'_, W>) -> Result<bool, StageError> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as an [`ObjectCondition`].
pub fn object_condition<W, F>(f: F) -> ObjectCondition<W>
where
    F: Fn(&mut FrameContext<'_, W>, &ObjectRef) -> Result<bool, StageError> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`StateHook`].
pub fn state_hook<W, F>(f: F) -> StateHook<W>
where
    F: Fn(&mut FrameContext<'_, W>) -> Result<(), StageError> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as an [`ObjectAction`].
pub fn object_action<W, F>(f: F) -> ObjectAction<W>
where
    F: Fn(&mut FrameContext<'_, W>, &ObjectRef) -> Result<(), StageError> + 'static,
{
    Rc::new(f)
}

// =============================================================================
// RENDER STAGE
// =============================================================================

/// Definition of one render stage.
///
/// Both conditions default to the first-call gates, so a stage built with
/// only a name and an action runs once per frame and once per object.
pub struct RenderStage<W> {
    pub name: StageId,
    /// Module that registered the stage, for diagnostics.
    pub owner: String,
    pub object_type: ObjectType,
    pub action: Option<ObjectAction<W>>,
    pub type_condition: TypeCondition<W>,
    pub object_condition: ObjectCondition<W>,
    pub pre_state: Option<StateHook<W>>,
    pub post_state: Option<StateHook<W>>,
}

impl<W: 'static> RenderStage<W> {
    /// Create a stage with default conditions and no callbacks.
    #[must_use]
    pub fn new(name: impl Into<StageId>, object_type: ObjectType) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            object_type,
            action: None,
            type_condition: conditions::first_call_type(),
            object_condition: conditions::first_call_object(),
            pre_state: None,
            post_state: None,
        }
    }

    #[must_use]
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: ObjectAction<W>) -> Self {
        self.action = Some(action);
        self
    }

    #[must_use]
    pub fn with_type_condition(mut self, condition: TypeCondition<W>) -> Self {
        self.type_condition = condition;
        self
    }

    #[must_use]
    pub fn with_object_condition(mut self, condition: ObjectCondition<W>) -> Self {
        self.object_condition = condition;
        self
    }

    #[must_use]
    pub fn with_pre_state(mut self, hook: StateHook<W>) -> Self {
        self.pre_state = Some(hook);
        self
    }

    #[must_use]
    pub fn with_post_state(mut self, hook: StateHook<W>) -> Self {
        self.post_state = Some(hook);
        self
    }
}

impl<W> Clone for RenderStage<W> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            owner: self.owner.clone(),
            object_type: self.object_type,
            action: self.action.clone(),
            type_condition: Rc::clone(&self.type_condition),
            object_condition: Rc::clone(&self.object_condition),
            pre_state: self.pre_state.clone(),
            post_state: self.post_state.clone(),
        }
    }
}

impl<W> fmt::Debug for RenderStage<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStage")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("object_type", &self.object_type)
            .field("action", &self.action.is_some())
            .field("pre_state", &self.pre_state.is_some())
            .field("post_state", &self.post_state.is_some())
            .finish()
    }
}

// =============================================================================
// UPDATE STAGE
// =============================================================================

/// Definition of one update stage: an action run once per matching object.
pub struct UpdateStage<W> {
    pub id: StageId,
    pub object_type: ObjectType,
    pub action: ObjectAction<W>,
}

impl<W> UpdateStage<W> {
    #[must_use]
    pub fn new(id: impl Into<StageId>, object_type: ObjectType, action: ObjectAction<W>) -> Self {
        Self {
            id: id.into(),
            object_type,
            action,
        }
    }
}

impl<W> Clone for UpdateStage<W> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            object_type: self.object_type,
            action: Rc::clone(&self.action),
        }
    }
}

impl<W> fmt::Debug for UpdateStage<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateStage")
            .field("id", &self.id)
            .field("object_type", &self.object_type)
            .finish()
    }
}
