//! # Scheduler Configuration
//!
//! Tunables for building and walking schedules. Every field has a default,
//! so an empty `[scheduler]` table (or none at all) is valid.
//!
//! ```toml
//! [scheduler]
//! unplaced_policy = "fail_fast"
//! max_type_iterations = 64
//! disabled_stages = ["Motion Blur"]
//! ```

use crate::primitives::{DEFAULT_MAX_OBJECT_ITERATIONS, DEFAULT_MAX_TYPE_ITERATIONS};
use crate::types::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What the builder does with registrations it cannot place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedPolicy {
    /// Log each one and drop it from the schedule.
    #[default]
    WarnAndDrop,
    /// Fail the build with `StageError::UnresolvedStages`.
    FailFast,
}

/// Upper bounds on the render walk's repeat-while loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub max_type_iterations: u32,
    pub max_object_iterations: u32,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_type_iterations: DEFAULT_MAX_TYPE_ITERATIONS,
            max_object_iterations: DEFAULT_MAX_OBJECT_ITERATIONS,
        }
    }
}

/// Scheduler settings, deserializable from a `[scheduler]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub unplaced_policy: UnplacedPolicy,
    pub max_type_iterations: u32,
    pub max_object_iterations: u32,
    pub disabled_stages: BTreeSet<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            unplaced_policy: UnplacedPolicy::default(),
            max_type_iterations: limits.max_type_iterations,
            max_object_iterations: limits.max_object_iterations,
            disabled_stages: BTreeSet::new(),
        }
    }
}

impl SchedulerConfig {
    /// Reject values the execution engine cannot work with.
    pub fn validate(&self) -> Result<(), StageError> {
        if self.max_type_iterations == 0 {
            return Err(StageError::ConfigError(
                "max_type_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_object_iterations == 0 {
            return Err(StageError::ConfigError(
                "max_object_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(empty) = self.disabled_stages.iter().find(|s| s.trim().is_empty()) {
            return Err(StageError::ConfigError(format!(
                "disabled_stages contains a blank name: {:?}",
                empty
            )));
        }
        Ok(())
    }

    /// The repeat bounds as one value.
    #[must_use]
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_type_iterations: self.max_type_iterations,
            max_object_iterations: self.max_object_iterations,
        }
    }
}
