//! # Scheduler Primitives
//!
//! Hardcoded constants shared by the builder, the payload store and the
//! execution engine.
//!
//! ## Primitives
//!
//! 1. **Schedule names**: the update schedule has a fixed name, render
//!    schedules are named after their backend.
//! 2. **Payload keys**: dedup counters live under `<stage>[::<object>]::<suffix>`.
//! 3. **Repeat bounds**: default limits for the render walk's while loops.

/// Name of the single update schedule.
pub const UPDATE_SCHEDULE: &str = "update";

/// Separator joining payload key segments.
pub const PAYLOAD_KEY_SEPARATOR: &str = "::";

/// Suffix of the persistent "frame this last ran" entry.
pub const LAST_CALLED_SUFFIX: &str = "LastCalled";

/// Suffix of the transient per-frame invocation counter.
pub const CALL_COUNT_SUFFIX: &str = "CallCount";

/// Suffix of the transient counter used by `repeat_type`.
pub const REPEAT_COUNT_SUFFIX: &str = "RepeatCount";

/// Suffix of the transient marker set by `always_once`.
pub const ONCE_SUFFIX: &str = "Once";

/// Default bound on how often one stage's type condition may return true
/// within a single render walk.
///
/// Exceeding it aborts the walk with `StageError::RepeatLimitExceeded`.
pub const DEFAULT_MAX_TYPE_ITERATIONS: u32 = 1024;

/// Default bound on how often one object's condition may return true
/// within a single type iteration.
pub const DEFAULT_MAX_OBJECT_ITERATIONS: u32 = 1024;

/// Join key segments with the payload separator.
///
/// Empty segments are skipped, so `payload_key(&["Bloom", "", "CallCount"])`
/// yields `"Bloom::CallCount"`.
#[must_use]
pub fn payload_key(segments: &[&str]) -> String {
    segments
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(PAYLOAD_KEY_SEPARATOR)
}
