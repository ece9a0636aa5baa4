//! Class registry for the runtime's class descriptors

use rustc_hash::FxHashMap;

use crate::class::{Class, ClassBuilder, ClassId};
use crate::error::{ObjectError, ObjectResult};

/// Registered classes, indexed by ID and by name
#[derive(Debug, Default)]
pub struct ClassRegistry {
    /// Classes indexed by ID
    classes: Vec<Class>,
    /// Class name to ID mapping
    name_to_id: FxHashMap<String, ClassId>,
}

impl ClassRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a class
    ///
    /// Classes without an explicit parent inherit from `default_parent`.
    pub fn register_class(
        &mut self,
        builder: ClassBuilder,
        default_parent: Option<&Class>,
    ) -> ObjectResult<Class> {
        if builder.name().is_empty() || builder.name().contains('/') {
            return Err(ObjectError::InvalidClassName(builder.name().to_string()));
        }
        if self.name_to_id.contains_key(builder.name()) {
            return Err(ObjectError::DuplicateClass(builder.name().to_string()));
        }
        if let Some(property) = builder.duplicate_property() {
            return Err(ObjectError::DuplicateProperty {
                class: builder.name().to_string(),
                property: property.to_string(),
            });
        }

        let id = self.next_class_id();
        let class = builder.build(id, default_parent);
        self.name_to_id.insert(class.name().to_string(), id);
        self.classes.push(class.clone());
        Ok(class)
    }

    /// Get class by ID
    pub fn get_class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id)
    }

    /// Get class by name
    pub fn get_class_by_name(&self, name: &str) -> Option<&Class> {
        self.name_to_id
            .get(name)
            .and_then(|id| self.classes.get(*id))
    }

    /// Get next available class ID
    pub fn next_class_id(&self) -> ClassId {
        self.classes.len()
    }

    /// Iterate over all classes in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if no class is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Create a registry holding only the root class
    pub(crate) fn with_root(root: ClassBuilder) -> (Self, Class) {
        let class = root.build(0, None);
        let mut name_to_id = FxHashMap::default();
        name_to_id.insert(class.name().to_string(), class.id());
        let registry = Self {
            classes: vec![class.clone()],
            name_to_id,
        };
        (registry, class)
    }

    /// Remove every class, returning them
    pub(crate) fn take_all(&mut self) -> Vec<Class> {
        self.name_to_id.clear();
        std::mem::take(&mut self.classes)
    }
}
