//! The frozen type registry shared by stores and command buffers.
//!
//! All component and tag types are registered up front in a [`SchemaBuilder`]. Calling
//! [`SchemaBuilder::build`] freezes the registry into an immutable [`Schema`]; stores are
//! created from that, so ids can never shift under an existing archetype.
//!
//! ```
//! use strata_ecs::{Component, Schema, Tag};
//!
//! #[derive(Component, Default, Clone, Copy)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Tag)]
//! struct Player;
//!
//! let mut builder = Schema::builder();
//! let position = builder.component::<Position>().unwrap();
//! builder.tag::<Player>().unwrap();
//! let schema = builder.build();
//!
//! assert_eq!(schema.component_id::<Position>().unwrap(), position);
//! ```

use std::{fmt, hash::Hash, sync::Arc};

use tracing::debug;

use crate::{
    component::{
        Component, ComponentId, ComponentInfo, ComponentRegistry, MAX_COMPONENT_TYPES, Tag, TagId,
        TagInfo, TagRegistry,
    },
    error::SchemaError,
    index::{Link, LinkIndex, RangeIndex, ValueIndex},
    signature::Signature,
};

/// Immutable registry of component and tag types.
pub struct Schema {
    components: ComponentRegistry,
    tags: TagRegistry,
}

impl Schema {
    /// Start registering types.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Id of a registered component type.
    pub fn component_id<T: Component>(&self) -> Result<ComponentId, SchemaError> {
        self.components
            .get_id::<T>()
            .ok_or(SchemaError::UnregisteredComponent(std::any::type_name::<T>()))
    }

    /// Id of a registered tag type.
    pub fn tag_id<T: Tag>(&self) -> Result<TagId, SchemaError> {
        self.tags
            .get_id::<T>()
            .ok_or(SchemaError::UnregisteredTag(std::any::type_name::<T>()))
    }

    /// Metadata of a component id.
    #[must_use]
    pub fn component_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.components.get_info(id)
    }

    /// Metadata of a tag id.
    #[must_use]
    pub fn tag_info(&self, id: TagId) -> Option<&TagInfo> {
        self.tags.get_info(id)
    }

    /// All component types in id order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.components.iter()
    }

    /// All tag types in id order.
    pub fn tags(&self) -> impl Iterator<Item = &TagInfo> {
        self.tags.iter()
    }

    /// Check that every id in `signature` belongs to this schema.
    pub fn validate(&self, signature: &Signature) -> Result<(), SchemaError> {
        if let Some(id) = signature
            .components
            .iter()
            .find(|&id| self.components.get_info(id).is_none())
        {
            return Err(SchemaError::UnknownComponentId(id));
        }
        if let Some(id) = signature
            .tags
            .iter()
            .find(|&id| self.tags.get_info(id).is_none())
        {
            return Err(SchemaError::UnknownTagId(id));
        }
        Ok(())
    }

    pub(crate) fn name_of(&self, id: ComponentId) -> &'static str {
        self.components
            .get_info(id)
            .map_or("<unknown component>", ComponentInfo::name)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("components", &self.components)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Collects component and tag registrations until [`build`](Self::build).
pub struct SchemaBuilder {
    components: ComponentRegistry,
    tags: TagRegistry,
    max_components: usize,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: ComponentRegistry::new(),
            tags: TagRegistry::new(),
            max_components: MAX_COMPONENT_TYPES,
        }
    }

    /// Lower the bound on distinct component types. Values above
    /// [`MAX_COMPONENT_TYPES`] are clamped.
    #[must_use]
    pub fn with_max_components(mut self, max: usize) -> Self {
        self.max_components = max.min(MAX_COMPONENT_TYPES);
        self
    }

    /// Register a component type. Returns the existing id if already registered.
    pub fn component<T: Component>(&mut self) -> Result<ComponentId, SchemaError> {
        self.components.register::<T>(None, self.max_components)
    }

    /// Register a tag type. Returns the existing id if already registered.
    pub fn tag<T: Tag>(&mut self) -> Result<TagId, SchemaError> {
        self.tags.register::<T>()
    }

    /// Register a component type with an equality index.
    pub fn value_index<T: Component + Hash + Eq>(&mut self) -> Result<ComponentId, SchemaError> {
        self.components
            .register::<T>(Some(ValueIndex::<T>::descriptor()), self.max_components)
    }

    /// Register a component type with an ordered index supporting range lookups.
    pub fn range_index<T: Component + Ord>(&mut self) -> Result<ComponentId, SchemaError> {
        self.components
            .register::<T>(Some(RangeIndex::<T>::descriptor()), self.max_components)
    }

    /// Register a link component with an index by target entity.
    pub fn link_index<T: Component + Link>(&mut self) -> Result<ComponentId, SchemaError> {
        self.components
            .register::<T>(Some(LinkIndex::<T>::descriptor()), self.max_components)
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> Arc<Schema> {
        debug!(
            components = self.components.len(),
            tags = self.tags.len(),
            "schema built"
        );
        Arc::new(Schema {
            components: self.components,
            tags: self.tags,
        })
    }
}
