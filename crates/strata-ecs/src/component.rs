//! Component and tag types, their ids and runtime metadata.
//!
//! Components are plain value types stored in archetype columns. Tags are zero-sized
//! markers that only take part in an archetype's signature. Both are registered once in
//! a [`SchemaBuilder`](crate::SchemaBuilder) and receive a dense id from their own index
//! space.

use std::{alloc::Layout, any::Any, any::TypeId, fmt};

use rustc_hash::FxHashMap;

use crate::{
    error::SchemaError,
    index::{IndexDescriptor, IndexKind},
    signature::BIT_CAPACITY,
};

/// Upper bound on distinct component types in one schema.
pub const MAX_COMPONENT_TYPES: usize = BIT_CAPACITY;

/// Upper bound on distinct tag types in one schema.
pub const MAX_TAG_TYPES: usize = BIT_CAPACITY;

/// Marker trait for types that can be stored as components.
///
/// Components are flat values: no heap ownership, no drop glue. Rows are
/// default-initialized when an entity enters an archetype, and values are moved
/// between archetypes by bitwise copy.
///
/// Implement it with the derive macro, which also rejects forbidden field types:
///
/// ```
/// use strata_ecs::Component;
///
/// #[derive(Component, Default, Clone, Copy, Debug, PartialEq)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
/// ```
pub trait Component: Default + Clone + Send + Sync + 'static {}

/// Marker trait for zero-sized classification types.
///
/// ```
/// use strata_ecs::Tag;
///
/// #[derive(Tag)]
/// struct Selected;
/// ```
pub trait Tag: Send + Sync + 'static {}

/// Dense identifier of a component type within a schema.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Create a component ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// Dense identifier of a tag type within a schema.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(u32);

impl TagId {
    /// Create a tag ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({})", self.0)
    }
}

/// Runtime information about a component type.
#[derive(Clone)]
pub struct ComponentInfo {
    /// Dense id within the schema.
    id: ComponentId,
    /// Type name for debugging and errors.
    name: &'static str,
    /// Memory layout of one value.
    layout: Layout,
    /// Writes `T::default()` to an uninitialized slot.
    default_fn: unsafe fn(*mut u8),
    /// Views a stored value as `dyn Any`.
    erase_fn: unsafe fn(*const u8) -> *const dyn Any,
    /// Rust TypeId for type checking.
    type_id: TypeId,
    /// Attached secondary index, if any.
    index: Option<IndexDescriptor>,
}

unsafe fn write_default<T: Component>(ptr: *mut u8) {
    // SAFETY: caller provides an aligned, writable slot for one `T`
    unsafe { ptr.cast::<T>().write(T::default()) };
}

unsafe fn erase<T: Component>(ptr: *const u8) -> *const dyn Any {
    ptr.cast::<T>() as *const dyn Any
}

impl ComponentInfo {
    /// Create component info for a concrete type.
    ///
    /// Fails if `T` has drop glue, which means it owns heap data or other resources.
    pub fn of<T: Component>(id: ComponentId) -> Result<Self, SchemaError> {
        let name = std::any::type_name::<T>();
        if std::mem::needs_drop::<T>() {
            return Err(SchemaError::NotPlainValue(name));
        }

        Ok(Self {
            id,
            name,
            layout: Layout::new::<T>(),
            default_fn: write_default::<T>,
            erase_fn: erase::<T>,
            type_id: TypeId::of::<T>(),
            index: None,
        })
    }

    /// Get the component ID.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Get the component type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Get the memory layout.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.layout.size()
    }

    /// Get the alignment requirement.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.layout.align()
    }

    /// Kind of index attached to this component.
    #[must_use]
    pub fn index_kind(&self) -> Option<IndexKind> {
        self.index.as_ref().map(|index| index.kind)
    }

    pub(crate) fn index_descriptor(&self) -> Option<&IndexDescriptor> {
        self.index.as_ref()
    }

    /// Check if this info is for the given type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Check if both infos describe the same Rust type.
    #[must_use]
    pub fn is_same_type(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }

    /// Write a default value to `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be aligned and valid for writing one value of this component type.
    pub(crate) unsafe fn write_default(&self, ptr: *mut u8) {
        unsafe { (self.default_fn)(ptr) };
    }

    /// View the value at `ptr` as `dyn Any`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an initialized value of this component type that outlives `'a`.
    pub(crate) unsafe fn erase<'a>(&self, ptr: *const u8) -> &'a dyn Any {
        unsafe { &*(self.erase_fn)(ptr) }
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .field("index", &self.index_kind())
            .finish()
    }
}

/// Runtime information about a tag type.
#[derive(Clone, Debug)]
pub struct TagInfo {
    id: TagId,
    name: &'static str,
    type_id: TypeId,
}

impl TagInfo {
    /// Create tag info for a concrete type. Fails unless `T` is zero-sized.
    pub fn of<T: Tag>(id: TagId) -> Result<Self, SchemaError> {
        let name = std::any::type_name::<T>();
        if size_of::<T>() != 0 {
            return Err(SchemaError::TagNotZeroSized(name));
        }
        Ok(Self {
            id,
            name,
            type_id: TypeId::of::<T>(),
        })
    }

    /// Get the tag ID.
    #[must_use]
    pub const fn id(&self) -> TagId {
        self.id
    }

    /// Get the tag type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Check if this info is for the given type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

/// Registry for component types.
///
/// Maps Rust types to dense `ComponentId`s in registration order. Ids are never reused.
#[derive(Default)]
pub struct ComponentRegistry {
    /// Map from TypeId to ComponentId.
    type_to_id: FxHashMap<TypeId, ComponentId>,
    /// Component info indexed by ComponentId.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type and return its ID.
    ///
    /// If the type is already registered, returns the existing ID. An index can be
    /// attached on a later registration, but never swapped for a different kind.
    pub(crate) fn register<T: Component>(
        &mut self,
        index: Option<IndexDescriptor>,
        max: usize,
    ) -> Result<ComponentId, SchemaError> {
        if let Some(&id) = self.type_to_id.get(&TypeId::of::<T>()) {
            let info = &mut self.infos[id.index()];
            match (info.index_kind(), index) {
                (Some(existing), Some(index)) if existing != index.kind => {
                    return Err(SchemaError::IndexConflict(info.name));
                }
                (None, Some(index)) => info.index = Some(index),
                _ => {}
            }
            return Ok(id);
        }

        if self.infos.len() >= max {
            return Err(SchemaError::TooManyComponents {
                name: std::any::type_name::<T>(),
                max,
            });
        }

        let id = ComponentId(self.infos.len() as u32);
        let mut info = ComponentInfo::of::<T>(id)?;
        info.index = index;

        self.type_to_id.insert(TypeId::of::<T>(), id);
        self.infos.push(info);

        Ok(id)
    }

    /// Get the component ID for a type, if registered.
    #[must_use]
    pub fn get_id<T: 'static>(&self) -> Option<ComponentId> {
        self.type_to_id.get(&TypeId::of::<T>()).copied()
    }

    /// Get component info by ID.
    #[must_use]
    pub fn get_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Get the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Iterate over all registered component infos in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .field("components", &self.infos)
            .finish()
    }
}

/// Registry for tag types, with its own id space.
#[derive(Debug, Default)]
pub struct TagRegistry {
    type_to_id: FxHashMap<TypeId, TagId>,
    infos: Vec<TagInfo>,
}

impl TagRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register<T: Tag>(&mut self) -> Result<TagId, SchemaError> {
        if let Some(&id) = self.type_to_id.get(&TypeId::of::<T>()) {
            return Ok(id);
        }

        if self.infos.len() >= MAX_TAG_TYPES {
            return Err(SchemaError::TooManyTags {
                name: std::any::type_name::<T>(),
                max: MAX_TAG_TYPES,
            });
        }

        let id = TagId(self.infos.len() as u32);
        let info = TagInfo::of::<T>(id)?;

        self.type_to_id.insert(TypeId::of::<T>(), id);
        self.infos.push(info);

        Ok(id)
    }

    /// Get the tag ID for a type, if registered.
    #[must_use]
    pub fn get_id<T: 'static>(&self) -> Option<TagId> {
        self.type_to_id.get(&TypeId::of::<T>()).copied()
    }

    /// Get tag info by ID.
    #[must_use]
    pub fn get_info(&self, id: TagId) -> Option<&TagInfo> {
        self.infos.get(id.index())
    }

    /// Get the number of registered tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Iterate over all registered tag infos in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TagInfo> {
        self.infos.iter()
    }
}
