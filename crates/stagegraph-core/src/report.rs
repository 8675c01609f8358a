//! # Schedule Report
//!
//! Serializable snapshot of built schedules, used for plan output and
//! diagnostics.

use crate::builder::{StageList, UnplacedRegistration};
use crate::types::{Priority, Side};
use serde::Serialize;

/// Kind of schedule a list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Update,
    Render,
}

/// One placed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub position: usize,
    pub id: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Side>,
}

/// One built schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub name: String,
    pub kind: ScheduleKind,
    pub stages: Vec<StageSummary>,
}

impl ScheduleSummary {
    /// Summarize a stage list.
    #[must_use]
    pub fn from_list<P>(kind: ScheduleKind, list: &StageList<P>) -> Self {
        Self {
            name: list.name().to_string(),
            kind,
            stages: list
                .iter()
                .enumerate()
                .map(|(position, stage)| StageSummary {
                    position,
                    id: stage.id.to_string(),
                    priority: stage.priority,
                    anchor: stage.anchor,
                })
                .collect(),
        }
    }
}

/// Every schedule plus the registrations left out of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub schedules: Vec<ScheduleSummary>,
    pub unplaced: Vec<UnplacedRegistration>,
}

impl ScheduleReport {
    /// Whether every registration of every schedule was placed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Total placed stages.
    #[must_use]
    pub fn placed_count(&self) -> usize {
        self.schedules
            .iter()
            .fold(0usize, |acc, s| acc.saturating_add(s.stages.len()))
    }
}
