//! # Registration Table
//!
//! The unordered bag of stage registrations collected at start-up.
//!
//! Each feature module receives the [`SchedulerRegistry`] once during its
//! initialization and declares its stages relative to other stages:
//!
//! ```text
//! "Shadow Maps [Mesh]"  After  "Shadow Maps [Begin]"  priority 1
//! "Uniforms [Begin]"    Head anchor                   priority 0
//! ```
//!
//! Registrations are never mutated after insertion. Each one records its
//! insertion sequence, which the builder uses as the final tie-break.

use crate::primitives::UPDATE_SCHEDULE;
use crate::stage::{ObjectAction, RenderStage, UpdateStage};
use crate::types::{ObjectType, Priority, Relation, Side, StageId};
use std::collections::BTreeMap;

// =============================================================================
// REGISTRATION
// =============================================================================

/// Where a registration wants to be placed, after empty-reference resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement<'a> {
    /// Pinned to one end of the list.
    Anchor(Side),
    /// Inserted at the current end of the list without being pinned, so
    /// later registrations may still be placed around it.
    Edge(Side),
    /// Immediately before or after the first occurrence of `reference`.
    Relative {
        reference: &'a StageId,
        before: bool,
    },
}

/// One stage registration.
#[derive(Debug, Clone)]
pub struct Registration<P> {
    pub id: StageId,
    pub reference: StageId,
    pub relation: Relation,
    pub side: Side,
    pub priority: Priority,
    pub sequence: usize,
    pub payload: P,
}

impl<P> Registration<P> {
    /// Resolve the relation/reference pair into a placement.
    ///
    /// An `Unordered` relation makes the registration a pinned anchor. A
    /// `Before`/`After` relation with an empty reference is an unpinned
    /// edge insertion; see [`Side::from_empty_reference`].
    #[must_use]
    pub fn placement(&self) -> Placement<'_> {
        if self.relation == Relation::Unordered {
            return Placement::Anchor(self.side);
        }
        if self.reference.is_none() {
            return Placement::Edge(Side::from_empty_reference(self.relation, self.side));
        }
        Placement::Relative {
            reference: &self.reference,
            before: self.relation == Relation::Before,
        }
    }

    /// Whether the registration is pinned to an end of the list.
    #[must_use]
    pub fn is_anchor(&self) -> bool {
        matches!(self.placement(), Placement::Anchor(_))
    }
}

// =============================================================================
// REGISTRATION TABLE
// =============================================================================

/// Insertion-ordered registrations of one schedule.
#[derive(Debug, Clone)]
pub struct RegistrationTable<P> {
    name: String,
    entries: Vec<Registration<P>>,
}

impl<P> RegistrationTable<P> {
    /// Create an empty table for the named schedule.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Schedule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a registration; returns its sequence number.
    pub fn register(
        &mut self,
        id: impl Into<StageId>,
        reference: impl Into<StageId>,
        relation: Relation,
        priority: Priority,
        payload: P,
    ) -> usize {
        self.push(id.into(), reference.into(), relation, Side::Tail, priority, payload)
    }

    /// Append an anchor registration pinned to `side`.
    pub fn register_anchor(
        &mut self,
        id: impl Into<StageId>,
        side: Side,
        priority: Priority,
        payload: P,
    ) -> usize {
        self.push(
            id.into(),
            StageId::none(),
            Relation::Unordered,
            side,
            priority,
            payload,
        )
    }

    fn push(
        &mut self,
        id: StageId,
        reference: StageId,
        relation: Relation,
        side: Side,
        priority: Priority,
        payload: P,
    ) -> usize {
        if relation == Relation::Unordered && !reference.is_none() {
            tracing::warn!(
                schedule = %self.name,
                stage = %id,
                reference = %reference,
                "unordered registration ignores its reference"
            );
        }
        if self.entries.iter().any(|r| r.id == id) {
            tracing::warn!(
                schedule = %self.name,
                stage = %id,
                "duplicate stage id; references resolve to the first occurrence in list order"
            );
        }

        let sequence = self.entries.len();
        tracing::trace!(
            schedule = %self.name,
            stage = %id,
            reference = %reference,
            relation = %relation,
            priority,
            sequence,
            "registered stage"
        );
        self.entries.push(Registration {
            id,
            reference,
            relation,
            side,
            priority,
            sequence,
            payload,
        });
        sequence
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any registration carries `id`.
    #[must_use]
    pub fn contains(&self, id: &StageId) -> bool {
        self.entries.iter().any(|r| &r.id == id)
    }

    /// Registrations in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[Registration<P>] {
        &self.entries
    }
}

impl<P: Clone> RegistrationTable<P> {
    /// Working copy for the builder, leaving the table intact.
    #[must_use]
    pub fn working_copy(&self) -> Vec<Registration<P>> {
        self.entries.clone()
    }
}

// =============================================================================
// SCHEDULER REGISTRY
// =============================================================================

/// A feature module that contributes stages.
pub trait StageModule<W> {
    /// Module name, used in logs and as the default render stage owner.
    fn name(&self) -> &str;

    /// Register every stage of the module.
    fn register(&self, registry: &mut SchedulerRegistry<W>);
}

/// Every schedule's registrations: one update table and one render table
/// per backend.
pub struct SchedulerRegistry<W> {
    update: RegistrationTable<UpdateStage<W>>,
    render: BTreeMap<String, RegistrationTable<RenderStage<W>>>,
}

impl<W> Default for SchedulerRegistry<W> {
    fn default() -> Self {
        Self {
            update: RegistrationTable::new(UPDATE_SCHEDULE),
            render: BTreeMap::new(),
        }
    }
}

impl<W> SchedulerRegistry<W> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Let a module register its stages.
    pub fn install(&mut self, module: &dyn StageModule<W>) {
        let before = self.registration_count();
        module.register(self);
        tracing::debug!(
            module = module.name(),
            stages = self.registration_count().saturating_sub(before),
            "installed stage module"
        );
    }

    /// Register a per-object update action.
    pub fn register_update_stage(
        &mut self,
        id: impl Into<StageId>,
        reference: impl Into<StageId>,
        relation: Relation,
        priority: Priority,
        object_type: ObjectType,
        action: ObjectAction<W>,
    ) -> usize {
        let id = id.into();
        let stage = UpdateStage::new(id.clone(), object_type, action);
        self.update.register(id, reference, relation, priority, stage)
    }

    /// Register an update action pinned to one end of the update schedule.
    pub fn register_update_anchor(
        &mut self,
        id: impl Into<StageId>,
        side: Side,
        priority: Priority,
        object_type: ObjectType,
        action: ObjectAction<W>,
    ) -> usize {
        let id = id.into();
        let stage = UpdateStage::new(id.clone(), object_type, action);
        self.update.register_anchor(id, side, priority, stage)
    }

    /// Register a render stage in the schedule of `backend`.
    pub fn register_render_stage(
        &mut self,
        backend: &str,
        reference: impl Into<StageId>,
        relation: Relation,
        priority: Priority,
        stage: RenderStage<W>,
    ) -> usize {
        let id = stage.name.clone();
        self.render_table(backend)
            .register(id, reference, relation, priority, stage)
    }

    /// Register a render stage pinned to one end of `backend`'s schedule.
    pub fn register_render_anchor(
        &mut self,
        backend: &str,
        side: Side,
        priority: Priority,
        stage: RenderStage<W>,
    ) -> usize {
        let id = stage.name.clone();
        self.render_table(backend)
            .register_anchor(id, side, priority, stage)
    }

    fn render_table(&mut self, backend: &str) -> &mut RegistrationTable<RenderStage<W>> {
        self.render
            .entry(backend.to_string())
            .or_insert_with(|| RegistrationTable::new(backend))
    }

    /// The update registrations.
    #[must_use]
    pub fn update_table(&self) -> &RegistrationTable<UpdateStage<W>> {
        &self.update
    }

    /// Render registrations per backend, in backend name order.
    pub fn render_tables(&self) -> impl Iterator<Item = &RegistrationTable<RenderStage<W>>> {
        self.render.values()
    }

    /// Total registrations across every schedule.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.render
            .values()
            .fold(self.update.len(), |acc, t| acc.saturating_add(t.len()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
