//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the scheduler:
//! - Stage identifiers and placement constraints (`StageId`, `Relation`, `Side`, `Priority`)
//! - Frame counter (`FrameId`)
//! - Object enumeration types (`ObjectType`, `ObjectRef`)
//! - Error types (`StageError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`,
//! and counters use saturating arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// STAGE IDENTIFIERS
// =============================================================================

/// Opaque identifier of a stage.
///
/// The empty identifier is the sentinel for "no reference": a registration
/// whose reference is empty is anchored to the head or tail of the list.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StageId(pub String);

impl StageId {
    /// Create a new stage identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The "no reference" sentinel.
    #[must_use]
    pub const fn none() -> Self {
        Self(String::new())
    }

    /// Returns true for the sentinel.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Placement constraint between a stage and its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Run before the reference stage.
    Before,
    /// Run after the reference stage.
    After,
    /// No relative constraint; the registration is an anchor.
    Unordered,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
            Self::Unordered => f.write_str("unordered"),
        }
    }
}

/// End of the stage list an anchor registration is pinned to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Pinned before every non-anchor stage.
    Head,
    /// Pinned after every non-anchor stage.
    #[default]
    Tail,
}

impl Side {
    /// Side implied by a relative constraint with an empty reference.
    ///
    /// "Before nothing" means before the end of the list, "after nothing"
    /// means right after its beginning.
    #[must_use]
    pub const fn from_empty_reference(relation: Relation, declared: Side) -> Self {
        match relation {
            Relation::Before => Self::Tail,
            Relation::After => Self::Head,
            Relation::Unordered => declared,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Tail => f.write_str("tail"),
        }
    }
}

/// Pass-ordering value. Lower priorities are placed in earlier passes.
pub type Priority = i32;

// =============================================================================
// FRAME COUNTER
// =============================================================================

/// Monotonic frame counter, advanced once per presented frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct FrameId(pub u64);

impl FrameId {
    /// Create a frame id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The next frame, saturating at `u64::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Get the raw frame number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// OBJECT ENUMERATION
// =============================================================================

/// Component mask describing which objects a stage targets.
///
/// An object matches when every bit of the filter is set in the object's
/// own mask. The empty mask matches every enabled object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ObjectType(pub u64);

impl ObjectType {
    /// Matches every enabled object.
    pub const ANY: Self = Self(0);

    /// Mask with a single component bit set.
    ///
    /// `index` must be below 64. Larger indices wrap modulo 64 and alias a
    /// low bit; use [`ObjectType::checked_bit`] for untrusted input.
    #[must_use]
    pub const fn bit(index: u32) -> Self {
        Self(1u64.wrapping_shl(index))
    }

    /// Like [`ObjectType::bit`], but `None` when `index` is 64 or more.
    #[must_use]
    pub const fn checked_bit(index: u32) -> Option<Self> {
        match 1u64.checked_shl(index) {
            Some(mask) => Some(Self(mask)),
            None => None,
        }
    }

    /// Union of two masks.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Non-exact match: `(mask & filter) == filter`.
    #[must_use]
    pub const fn matches(self, mask: ObjectType) -> bool {
        mask.0 & self.0 == self.0
    }
}

/// Handle to one enumerated object, passed to per-object callbacks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Stable numeric id assigned by the object source.
    pub id: u64,
    /// Unique object name, used in payload keys.
    pub name: String,
}

impl ObjectRef {
    /// Create an object handle.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Why the builder could not place a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    /// The reference was never registered in this schedule.
    MissingReference,
    /// The reference is registered but was itself left unplaced (cycle or chain).
    UnresolvedDependency,
    /// `Before` a head anchor or `After` a tail anchor.
    AnchorConflict,
    /// Never attempted: the build stalled on a lower priority tier.
    BlockedByPriority,
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReference => f.write_str("reference not registered"),
            Self::UnresolvedDependency => f.write_str("reference never placed"),
            Self::AnchorConflict => f.write_str("conflicts with anchor"),
            Self::BlockedByPriority => f.write_str("blocked by lower priority tier"),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while building or executing schedules.
#[derive(Debug, Error)]
pub enum StageError {
    /// A registration could not be placed relative to its reference.
    #[error("Unresolvable reference in {schedule}: '{stage}' {relation} '{reference}' ({reason})")]
    UnresolvableReference {
        schedule: String,
        stage: StageId,
        relation: Relation,
        reference: StageId,
        reason: UnplacedReason,
    },

    /// The build left stages unplaced and the policy forbids dropping them.
    #[error("Unable to construct a valid {schedule} graph: {} stage(s) unplaced [{}]", .stages.len(), .stages.join(", "))]
    UnresolvedStages {
        schedule: String,
        stages: Vec<String>,
    },

    /// A payload entry was read back with a different type than it was stored with.
    #[error("Payload type mismatch for '{key}': stored {stored}, requested {requested}")]
    PayloadTypeMismatch {
        key: String,
        stored: &'static str,
        requested: &'static str,
    },

    /// A stage condition kept returning true past the configured bound.
    #[error("Repeat limit of {limit} exceeded in stage '{stage}'{}", .object.as_ref().map(|o| format!(" for object '{o}'")).unwrap_or_default())]
    RepeatLimitExceeded {
        stage: String,
        object: Option<String>,
        limit: u32,
    },

    /// A render schedule was requested for a backend that was never built.
    #[error("Unknown schedule: {0}")]
    UnknownSchedule(String),

    /// A user callback failed.
    #[error("Stage '{stage}' failed: {message}")]
    Callback { stage: String, message: String },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl StageError {
    /// Convenience constructor for callback failures.
    #[must_use]
    pub fn callback(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callback {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stage_id_is_sentinel() {
        assert!(StageId::none().is_none());
        assert!(!StageId::new("Begin").is_none());
        assert_eq!(StageId::default(), StageId::none());
    }

    #[test]
    fn empty_reference_side_mapping() {
        assert_eq!(
            Side::from_empty_reference(Relation::Before, Side::Head),
            Side::Tail
        );
        assert_eq!(
            Side::from_empty_reference(Relation::After, Side::Tail),
            Side::Head
        );
        assert_eq!(
            Side::from_empty_reference(Relation::Unordered, Side::Head),
            Side::Head
        );
    }

    #[test]
    fn frame_id_saturates() {
        assert_eq!(FrameId::new(u64::MAX).next(), FrameId::new(u64::MAX));
        assert_eq!(FrameId::new(4).next().value(), 5);
    }

    #[test]
    fn object_type_non_exact_match() {
        let mesh = ObjectType::bit(0);
        let caster = ObjectType::bit(3);
        let both = mesh.with(caster);

        assert!(mesh.matches(both));
        assert!(both.matches(both));
        assert!(!both.matches(mesh));
        assert!(ObjectType::ANY.matches(ObjectType::ANY));
        assert!(ObjectType::ANY.matches(caster));
    }

    #[test]
    fn checked_bit_rejects_out_of_range_index() {
        assert_eq!(ObjectType::checked_bit(0), Some(ObjectType::bit(0)));
        assert_eq!(ObjectType::checked_bit(63), Some(ObjectType(1 << 63)));
        assert_eq!(ObjectType::checked_bit(64), None);
        assert_eq!(ObjectType::checked_bit(u32::MAX), None);
        // The unchecked form wraps, so bit 64 aliases bit 0.
        assert_eq!(ObjectType::bit(64), ObjectType::bit(0));
    }

    #[test]
    fn repeat_limit_message_names_object() {
        let err = StageError::RepeatLimitExceeded {
            stage: "Shadow Maps [Mesh]".to_string(),
            object: Some("Sun".to_string()),
            limit: 8,
        };
        let text = err.to_string();
        assert!(text.contains("Shadow Maps [Mesh]"));
        assert!(text.contains("'Sun'"));

        let err = StageError::RepeatLimitExceeded {
            stage: "Bloom".to_string(),
            object: None,
            limit: 8,
        };
        assert!(!err.to_string().contains("object"));
    }
}
