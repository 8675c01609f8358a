//! # Graph Builder
//!
//! Derives one ordered [`StageList`] from a schedule's registrations.
//!
//! ## Algorithm
//!
//! Iterative fixed-point placement. Each pass:
//! 1. Computes the minimum priority among unplaced registrations.
//! 2. Walks the unplaced registrations in sequence order. Higher-priority
//!    ones are deferred. Anchors go to the head block or the end of the list.
//!    Relative ones are inserted immediately before or after the first
//!    occurrence of their reference in the *current* list, so a placement
//!    is visible to later registrations of the same pass.
//! 3. Stops when a full pass places nothing.
//!
//! Head anchors stay in front of every other stage and tail anchors behind
//! every other stage: relative insertions are clamped between the two
//! anchor blocks.
//!
//! Whatever is left is returned as [`UnplacedRegistration`]s with a reason,
//! and each one is logged. The builder never panics on bad input.

use crate::config::UnplacedPolicy;
use crate::registry::{Placement, Registration};
use crate::types::{Priority, Relation, Side, StageError, StageId, UnplacedReason};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// STAGE LIST
// =============================================================================

/// A placed stage.
#[derive(Debug, Clone)]
pub struct ScheduledStage<P> {
    pub id: StageId,
    pub priority: Priority,
    pub sequence: usize,
    /// Set for pinned anchor registrations.
    pub anchor: Option<Side>,
    pub payload: P,
}

/// Ordered, immutable result of a build.
#[derive(Debug, Clone)]
pub struct StageList<P> {
    name: String,
    stages: Vec<ScheduledStage<P>>,
}

impl<P> StageList<P> {
    /// An empty list for the named schedule.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Schedule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledStage<P>> {
        self.stages.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ScheduledStage<P>> {
        self.stages.get(index)
    }

    /// Position of the first stage named `id`.
    #[must_use]
    pub fn position(&self, id: &StageId) -> Option<usize> {
        self.stages.iter().position(|s| &s.id == id)
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }
}

// =============================================================================
// BUILD OUTCOME
// =============================================================================

/// A registration the builder could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnplacedRegistration {
    pub schedule: String,
    pub id: StageId,
    pub reference: StageId,
    pub relation: Relation,
    pub priority: Priority,
    pub reason: UnplacedReason,
}

impl UnplacedRegistration {
    /// The error describing this entry.
    #[must_use]
    pub fn to_error(&self) -> StageError {
        StageError::UnresolvableReference {
            schedule: self.schedule.clone(),
            stage: self.id.clone(),
            relation: self.relation,
            reference: self.reference.clone(),
            reason: self.reason,
        }
    }
}

/// Result of one build.
#[derive(Debug, Clone)]
pub struct BuildOutcome<P> {
    pub stages: StageList<P>,
    pub unplaced: Vec<UnplacedRegistration>,
    /// Placement passes run, including the final pass that placed nothing.
    pub passes: usize,
}

impl<P> BuildOutcome<P> {
    /// Whether every registration was placed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }
}

// =============================================================================
// GRAPH BUILDER
// =============================================================================

/// Builds stage lists for one schedule.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    schedule: String,
    policy: UnplacedPolicy,
}

impl GraphBuilder {
    /// Create a builder for the named schedule.
    #[must_use]
    pub fn new(schedule: impl Into<String>, policy: UnplacedPolicy) -> Self {
        Self {
            schedule: schedule.into(),
            policy,
        }
    }

    /// Place `registrations` into an ordered list.
    ///
    /// Ties are broken by `Registration::sequence`, never by the order of
    /// the input vector. Returns `StageError::UnresolvedStages` only under
    /// `UnplacedPolicy::FailFast`.
    pub fn build<P>(
        &self,
        mut registrations: Vec<Registration<P>>,
    ) -> Result<BuildOutcome<P>, StageError> {
        registrations.sort_by_key(|r| r.sequence);

        let mut pending = registrations;
        let mut stages: Vec<ScheduledStage<P>> = Vec::with_capacity(pending.len());
        let mut heads = 0usize;
        let mut tails = 0usize;
        let mut passes = 0usize;
        let mut stalled_at: Option<Priority> = None;

        while let Some(min_priority) = pending.iter().map(|r| r.priority).min() {
            passes = passes.saturating_add(1);
            tracing::debug!(
                schedule = %self.schedule,
                pass = passes,
                entries = pending.len(),
                min_priority,
                "starting placement pass"
            );

            let mut deferred = Vec::with_capacity(pending.len());
            let mut placed_any = false;

            for registration in std::mem::take(&mut pending) {
                if registration.priority > min_priority {
                    tracing::trace!(
                        schedule = %self.schedule,
                        stage = %registration.id,
                        priority = registration.priority,
                        "deferring stage to a later pass"
                    );
                    deferred.push(registration);
                    continue;
                }

                let Some(index) = insertion_index(&registration, &stages, heads, tails) else {
                    tracing::debug!(
                        schedule = %self.schedule,
                        stage = %registration.id,
                        reference = %registration.reference,
                        relation = %registration.relation,
                        "requirements not satisfied"
                    );
                    deferred.push(registration);
                    continue;
                };

                let anchor = match registration.placement() {
                    Placement::Anchor(side) => Some(side),
                    Placement::Edge(_) | Placement::Relative { .. } => None,
                };
                match anchor {
                    Some(Side::Head) => heads = heads.saturating_add(1),
                    Some(Side::Tail) => tails = tails.saturating_add(1),
                    None => {}
                }

                tracing::debug!(
                    schedule = %self.schedule,
                    stage = %registration.id,
                    position = index,
                    priority = registration.priority,
                    "placed stage"
                );
                stages.insert(
                    index,
                    ScheduledStage {
                        id: registration.id,
                        priority: registration.priority,
                        sequence: registration.sequence,
                        anchor,
                        payload: registration.payload,
                    },
                );
                placed_any = true;
            }

            pending = deferred;
            if !placed_any {
                stalled_at = Some(min_priority);
                break;
            }
        }

        let unplaced = self.classify(&pending, &stages, stalled_at);
        let stages = StageList {
            name: self.schedule.clone(),
            stages,
        };
        self.report(&stages, &unplaced);

        if self.policy == UnplacedPolicy::FailFast && !unplaced.is_empty() {
            return Err(StageError::UnresolvedStages {
                schedule: self.schedule.clone(),
                stages: unplaced.iter().map(|u| u.id.to_string()).collect(),
            });
        }

        Ok(BuildOutcome {
            stages,
            unplaced,
            passes,
        })
    }

    fn classify<P>(
        &self,
        pending: &[Registration<P>],
        stages: &[ScheduledStage<P>],
        stalled_at: Option<Priority>,
    ) -> Vec<UnplacedRegistration> {
        let pending_ids: BTreeSet<&StageId> = pending.iter().map(|r| &r.id).collect();

        pending
            .iter()
            .map(|r| {
                let attempted = stalled_at.is_some_and(|p| r.priority <= p);
                let reason = match r.placement() {
                    _ if !attempted => UnplacedReason::BlockedByPriority,
                    Placement::Anchor(_) | Placement::Edge(_) => UnplacedReason::BlockedByPriority,
                    Placement::Relative { reference, .. } => {
                        if stages.iter().any(|s| &s.id == reference) {
                            UnplacedReason::AnchorConflict
                        } else if pending_ids.contains(reference) {
                            UnplacedReason::UnresolvedDependency
                        } else {
                            UnplacedReason::MissingReference
                        }
                    }
                };
                UnplacedRegistration {
                    schedule: self.schedule.clone(),
                    id: r.id.clone(),
                    reference: r.reference.clone(),
                    relation: r.relation,
                    priority: r.priority,
                    reason,
                }
            })
            .collect()
    }

    fn report<P>(&self, stages: &StageList<P>, unplaced: &[UnplacedRegistration]) {
        if unplaced.is_empty() {
            tracing::info!(
                schedule = %self.schedule,
                stages = stages.len(),
                "built schedule"
            );
        } else {
            for entry in unplaced {
                tracing::error!(
                    schedule = %self.schedule,
                    stage = %entry.id,
                    reason = %entry.reason,
                    "{}",
                    entry.to_error()
                );
            }
            tracing::error!(
                schedule = %self.schedule,
                placed = stages.len(),
                unplaced = unplaced.len(),
                "Unable to construct a valid {} graph: potentially ambiguous constraints",
                self.schedule
            );
        }

        for (position, stage) in stages.iter().enumerate() {
            tracing::debug!(
                schedule = %self.schedule,
                position,
                stage = %stage.id,
                priority = stage.priority,
                "final order"
            );
        }
    }
}

/// Where `registration` goes in the current list, or `None` if it cannot
/// be placed yet.
fn insertion_index<P>(
    registration: &Registration<P>,
    stages: &[ScheduledStage<P>],
    heads: usize,
    tails: usize,
) -> Option<usize> {
    match registration.placement() {
        Placement::Anchor(Side::Head) => Some(heads),
        Placement::Anchor(Side::Tail) => Some(stages.len()),
        Placement::Edge(Side::Head) => Some(heads),
        Placement::Edge(Side::Tail) => Some(stages.len().saturating_sub(tails)),
        Placement::Relative { reference, before } => {
            let position = stages.iter().position(|s| &s.id == reference)?;
            let target = stages.get(position)?;
            match (target.anchor, before) {
                (Some(Side::Head), true) | (Some(Side::Tail), false) => None,
                _ => {
                    let raw = if before {
                        position
                    } else {
                        position.saturating_add(1)
                    };
                    Some(raw.clamp(heads, stages.len().saturating_sub(tails)))
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
