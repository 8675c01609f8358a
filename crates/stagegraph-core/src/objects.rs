//! # Object Source
//!
//! The scheduler never owns scene objects. Stages only need a way to
//! enumerate the enabled objects matching their target type, which the
//! surrounding engine provides through [`ObjectSource`].
//!
//! [`ObjectTable`] is a small in-memory implementation used by the CLI
//! simulator and by tests.

use crate::types::{ObjectRef, ObjectType};
use serde::{Deserialize, Serialize};

/// Enumerates the objects a stage runs over.
pub trait ObjectSource {
    /// Enabled objects whose component mask contains every bit of `filter`,
    /// in the source's stable enumeration order.
    fn objects_of_type(&self, filter: ObjectType) -> Vec<ObjectRef>;
}

/// One object stored in an [`ObjectTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneObject {
    pub object: ObjectRef,
    pub mask: ObjectType,
    pub enabled: bool,
}

/// Insertion-ordered object list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTable {
    objects: Vec<SceneObject>,
}

impl ObjectTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enabled object. Ids are assigned sequentially from 0.
    pub fn insert(&mut self, name: impl Into<String>, mask: ObjectType) -> ObjectRef {
        let object = ObjectRef::new(self.objects.len() as u64, name);
        self.objects.push(SceneObject {
            object: object.clone(),
            mask,
            enabled: true,
        });
        object
    }

    /// Enable or disable an object by name. Returns false if no such object exists.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.objects.iter_mut().find(|o| o.object.name == name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Number of stored objects, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over every stored object.
    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }
}

impl ObjectSource for ObjectTable {
    fn objects_of_type(&self, filter: ObjectType) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .filter(|o| o.enabled && filter.matches(o.mask))
            .map(|o| o.object.clone())
            .collect()
    }
}
