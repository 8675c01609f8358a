//! # Pipeline Manifest
//!
//! TOML description of a pipeline: scene objects, update stages, and the
//! render stages of each backend. A manifest compiles into a
//! [`SchedulerRegistry`] whose callbacks record into a [`SimWorld`] trace.
//!
//! ```toml
//! [scheduler]
//! unplaced_policy = "warn_and_drop"
//!
//! [[objects]]
//! name = "Cube"
//! types = ["mesh"]
//!
//! [[update]]
//! id = "Input"
//! anchor = "head"
//!
//! [[render]]
//! backend = "opengl"
//! name = "Shadow Maps [Begin]"
//! after = "Uniforms [End]"
//! types = ["light"]
//! type_condition = "multi_call"
//! repeat = 3
//! pre_hook = true
//! ```
//!
//! ## Placement keys
//!
//! At most one of `before`, `after`, `anchor` may be set. With none of
//! them the stage is appended at the tail without being pinned. An empty
//! `before`/`after` string follows the same rule as an empty reference in
//! the registration API.
//!
//! ## Object types
//!
//! Type names are mapped to component bits in order of first appearance:
//! objects first, then update stages, then render stages. At most
//! [`MAX_OBJECT_TYPES`] distinct names are allowed.

use crate::simulation::{SimWorld, TraceKind, silent_action, trace_action, trace_hook};
use serde::{Deserialize, Serialize};
use stagegraph_core::stage::conditions::{
    all_of_type, always_once, first_call_object, first_call_type, multi_call_object,
    multi_call_object_driven_by, multi_call_type, never_type, repeat_type,
};
use stagegraph_core::{
    ObjectCondition, ObjectTable, ObjectType, Priority, Relation, RenderStage, SchedulerConfig,
    SchedulerRegistry, Side, StageError, TypeCondition,
};
use std::collections::{BTreeMap, BTreeSet};

/// Number of component bits in an [`ObjectType`] mask.
pub const MAX_OBJECT_TYPES: u32 = 64;

/// Owner recorded on render stages that do not name one.
pub const DEFAULT_OWNER: &str = "manifest";

// =============================================================================
// MANIFEST SCHEMA
// =============================================================================

/// A whole pipeline manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub scheduler: SchedulerConfig,
    pub objects: Vec<ObjectSpec>,
    pub update: Vec<UpdateSpec>,
    pub render: Vec<RenderSpec>,
}

/// One `[[objects]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectSpec {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One `[[update]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSpec {
    pub id: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub anchor: Option<Side>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub types: Vec<String>,
    /// Record a trace event per object; otherwise the action is silent.
    #[serde(default = "default_true")]
    pub action: bool,
}

/// Outer condition of a render stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeConditionKind {
    #[default]
    FirstCall,
    MultiCall,
    /// Once per render pass, ignoring the frame it last ran in.
    AlwaysOnce,
    Never,
}

/// Inner condition of a render stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectConditionKind {
    #[default]
    FirstCall,
    MultiCall,
}

/// One `[[render]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderSpec {
    pub backend: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub anchor: Option<Side>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub type_condition: TypeConditionKind,
    #[serde(default)]
    pub object_condition: ObjectConditionKind,
    /// Bound the type condition to this many openings per render pass.
    #[serde(default)]
    pub repeat: Option<u32>,
    /// Stage whose `CallCount` drives a `multi_call` object condition.
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub pre_hook: bool,
    #[serde(default)]
    pub post_hook: bool,
    #[serde(default = "default_true")]
    pub action: bool,
}

fn default_true() -> bool {
    true
}

/// Optional `--config` file: a bare `[scheduler]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
}

impl ConfigFile {
    /// Parse a config file from TOML text.
    pub fn parse(text: &str) -> Result<Self, StageError> {
        toml::from_str(text)
            .map_err(|e| StageError::ConfigError(format!("Invalid config file: {}", e)))
    }
}

// =============================================================================
// TYPE MAP
// =============================================================================

/// Assigns component bits to type names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMap {
    bits: BTreeMap<String, u32>,
}

impl TypeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask containing the bit of every name, assigning new bits as needed.
    pub fn mask(&mut self, names: &[String]) -> Result<ObjectType, StageError> {
        names
            .iter()
            .try_fold(ObjectType::ANY, |mask, name| Ok(mask.with(self.bit(name)?)))
    }

    fn bit(&mut self, name: &str) -> Result<ObjectType, StageError> {
        if let Some(&index) = self.bits.get(name) {
            return Ok(ObjectType::bit(index));
        }
        if name.trim().is_empty() {
            return Err(StageError::ConfigError("Blank object type name".to_string()));
        }
        let index = u32::try_from(self.bits.len()).unwrap_or(MAX_OBJECT_TYPES);
        let mask = ObjectType::checked_bit(index)
            .filter(|_| index < MAX_OBJECT_TYPES)
            .ok_or_else(|| {
                StageError::ConfigError(format!(
                    "Too many object types: '{}' would exceed {}",
                    name, MAX_OBJECT_TYPES
                ))
            })?;
        self.bits.insert(name.to_string(), index);
        Ok(mask)
    }

    /// Bit index of `name`, if assigned.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<u32> {
        self.bits.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

// =============================================================================
// COMPILATION
// =============================================================================

/// A compiled manifest, ready to be built into schedules.
pub struct Pipeline {
    pub registry: SchedulerRegistry<SimWorld>,
    pub world: SimWorld,
    pub types: TypeMap,
}

/// Resolved placement keys of one entry.
enum Position {
    Relative(String, Relation),
    Anchor(Side),
}

fn position(
    id: &str,
    before: Option<&String>,
    after: Option<&String>,
    anchor: Option<Side>,
) -> Result<Position, StageError> {
    match (before, after, anchor) {
        (None, None, None) => Ok(Position::Relative(String::new(), Relation::Before)),
        (Some(reference), None, None) => Ok(Position::Relative(reference.clone(), Relation::Before)),
        (None, Some(reference), None) => Ok(Position::Relative(reference.clone(), Relation::After)),
        (None, None, Some(side)) => Ok(Position::Anchor(side)),
        _ => Err(StageError::ConfigError(format!(
            "Stage '{}' sets more than one of before/after/anchor",
            id
        ))),
    }
}

fn require_name(kind: &str, name: &str) -> Result<(), StageError> {
    if name.trim().is_empty() {
        return Err(StageError::ConfigError(format!("Blank {} name", kind)));
    }
    Ok(())
}

impl Manifest {
    /// Parse a manifest from TOML text.
    pub fn parse(text: &str) -> Result<Self, StageError> {
        toml::from_str(text)
            .map_err(|e| StageError::SerializationError(format!("Invalid manifest: {}", e)))
    }

    /// Render backends named by the manifest.
    #[must_use]
    pub fn backends(&self) -> BTreeSet<&str> {
        self.render.iter().map(|r| r.backend.as_str()).collect()
    }

    /// Validate the manifest and build its registry and world.
    pub fn compile(&self) -> Result<Pipeline, StageError> {
        let mut types = TypeMap::new();
        let objects = self.object_table(&mut types)?;

        let mut registry = SchedulerRegistry::new();
        for spec in &self.update {
            register_update(&mut registry, &mut types, spec)?;
        }
        for spec in &self.render {
            register_render(&mut registry, &mut types, spec)?;
        }

        tracing::debug!(
            objects = objects.len(),
            registrations = registry.registration_count(),
            types = types.len(),
            "manifest compiled"
        );

        Ok(Pipeline {
            registry,
            world: SimWorld::new(objects),
            types,
        })
    }

    fn object_table(&self, types: &mut TypeMap) -> Result<ObjectTable, StageError> {
        let mut table = ObjectTable::new();
        let mut seen = BTreeSet::new();
        for spec in &self.objects {
            require_name("object", &spec.name)?;
            // Object names key per-object payload entries.
            if !seen.insert(spec.name.as_str()) {
                return Err(StageError::ConfigError(format!(
                    "Duplicate object name '{}'",
                    spec.name
                )));
            }
            let mask = types.mask(&spec.types)?;
            table.insert(spec.name.clone(), mask);
            if !spec.enabled {
                table.set_enabled(&spec.name, false);
            }
        }
        Ok(table)
    }
}

fn register_update(
    registry: &mut SchedulerRegistry<SimWorld>,
    types: &mut TypeMap,
    spec: &UpdateSpec,
) -> Result<(), StageError> {
    require_name("update stage", &spec.id)?;
    let mask = types.mask(&spec.types)?;
    let action = if spec.action {
        trace_action(TraceKind::Update)
    } else {
        silent_action()
    };

    match position(
        &spec.id,
        spec.before.as_ref(),
        spec.after.as_ref(),
        spec.anchor,
    )? {
        Position::Relative(reference, relation) => {
            registry.register_update_stage(
                spec.id.as_str(),
                reference,
                relation,
                spec.priority,
                mask,
                action,
            );
        }
        Position::Anchor(side) => {
            registry.register_update_anchor(spec.id.as_str(), side, spec.priority, mask, action);
        }
    }
    Ok(())
}

fn register_render(
    registry: &mut SchedulerRegistry<SimWorld>,
    types: &mut TypeMap,
    spec: &RenderSpec,
) -> Result<(), StageError> {
    require_name("render stage", &spec.name)?;
    require_name("backend", &spec.backend)?;
    let mask = types.mask(&spec.types)?;

    let mut stage = RenderStage::new(spec.name.as_str(), mask)
        .owned_by(spec.owner.as_deref().unwrap_or(DEFAULT_OWNER))
        .with_type_condition(render_type_condition(spec))
        .with_object_condition(render_object_condition(spec)?);
    if spec.action {
        stage = stage.with_action(trace_action(TraceKind::Render));
    }
    if spec.pre_hook {
        stage = stage.with_pre_state(trace_hook(TraceKind::PreState));
    }
    if spec.post_hook {
        stage = stage.with_post_state(trace_hook(TraceKind::PostState));
    }

    match position(
        &spec.name,
        spec.before.as_ref(),
        spec.after.as_ref(),
        spec.anchor,
    )? {
        Position::Relative(reference, relation) => {
            registry.register_render_stage(&spec.backend, reference, relation, spec.priority, stage);
        }
        Position::Anchor(side) => {
            registry.register_render_anchor(&spec.backend, side, spec.priority, stage);
        }
    }
    Ok(())
}

fn render_type_condition(spec: &RenderSpec) -> TypeCondition<SimWorld> {
    let base = match spec.type_condition {
        TypeConditionKind::FirstCall => first_call_type(),
        TypeConditionKind::MultiCall => multi_call_type(),
        TypeConditionKind::AlwaysOnce => always_once(),
        TypeConditionKind::Never => never_type(),
    };
    // The bound is checked first so a closed repeat never bumps CallCount.
    match spec.repeat {
        Some(times) => all_of_type(vec![repeat_type(times), base]),
        None => base,
    }
}

fn render_object_condition(spec: &RenderSpec) -> Result<ObjectCondition<SimWorld>, StageError> {
    match (spec.object_condition, spec.driver.as_deref()) {
        (ObjectConditionKind::FirstCall, None) => Ok(first_call_object()),
        (ObjectConditionKind::MultiCall, None) => Ok(multi_call_object()),
        (ObjectConditionKind::MultiCall, Some(driver)) => {
            require_name("driver", driver)?;
            Ok(multi_call_object_driven_by(driver))
        }
        (ObjectConditionKind::FirstCall, Some(_)) => Err(StageError::ConfigError(format!(
            "Render stage '{}' names a driver but its object_condition is first_call",
            spec.name
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================
