//! Entity store - the main container for all ECS data.
//!
//! The store owns every archetype table, the node table mapping entity ids to their
//! row, the parent/child tree, the component indices, attached scripts and event
//! handlers. It provides the primary API for creating entities, adding and removing
//! components and tags, and deleting entities.

use std::{any::Any, fmt, ops::RangeBounds, sync::Arc};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::{
    archetype::{Archetype, ArchetypeId, ArchetypeStorage, MovedEntity},
    command::CommandBuffer,
    component::{Component, ComponentId, Tag},
    config::StoreConfig,
    entity::{EntityId, IdAllocator},
    error::{EcsError, EcsResult},
    event::{
        ComponentAction, ComponentChanged, EntityCreated, EntityDeleted, EventHub, ScriptAction,
        ScriptChanged, TagsChanged,
    },
    index::{ComponentIndex, IndexKind},
    query::QueryBuilder,
    schema::Schema,
    script::Scripts,
    signature::{ComponentTypes, Signature, Tags},
    tree::Tree,
};

/// Location of an entity within the archetype storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// The archetype containing this entity.
    pub archetype: ArchetypeId,
    /// Row index within the archetype.
    pub row: usize,
}

/// The entity store - container for all entities, components and their relations.
pub struct EntityStore {
    schema: Arc<Schema>,
    archetypes: ArchetypeStorage,
    /// Node table: where each live entity's row is.
    nodes: FxHashMap<EntityId, EntityLocation>,
    ids: IdAllocator,
    /// One slot per component id; `Some` for indexed components.
    indices: Vec<Option<Box<dyn ComponentIndex>>>,
    pub(crate) tree: Tree,
    pub(crate) events: EventHub,
    pub(crate) scripts: Scripts,
}

impl EntityStore {
    /// Create an empty store for `schema`.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Create an empty store with explicit capacities and id policy.
    #[must_use]
    pub fn with_config(schema: Arc<Schema>, config: StoreConfig) -> Self {
        let archetypes = ArchetypeStorage::with_capacity(&schema, config.archetype_capacity);

        let mut nodes = FxHashMap::default();
        nodes.reserve(config.entity_capacity);

        let indices = schema
            .components()
            .map(|info| info.index_descriptor().map(|descriptor| descriptor.create()))
            .collect();

        Self {
            schema,
            archetypes,
            nodes,
            ids: IdAllocator::new(config.recycle_ids),
            indices,
            tree: Tree::default(),
            events: EventHub::default(),
            scripts: Scripts::default(),
        }
    }

    /// The schema this store was created with.
    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Start recording deferred operations against this store.
    #[must_use]
    pub fn command_buffer(&self) -> CommandBuffer {
        CommandBuffer::new(Arc::clone(&self.schema), self.ids.reserver())
    }

    /// Start building a query.
    #[must_use]
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(&self.schema))
    }

    // ==================== Entity Operations ====================

    /// Create an entity with no components and no tags.
    ///
    /// # Panics
    ///
    /// Panics if no deleted id is available for reuse and every fresh id up to
    /// [`EntityId::MAX`] has been handed out.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.allocate_id();
        self.place(entity, ArchetypeId::EMPTY);
        entity
    }

    /// Create an entity with a caller-chosen id.
    ///
    /// Fresh ids handed out afterwards are above `entity`. Ids `0` and `u32::MAX` are
    /// rejected with [`EcsError::InvalidEntityId`].
    pub fn create_entity_with_id(&mut self, entity: EntityId) -> EcsResult<EntityId> {
        if !entity.is_valid() {
            return Err(EcsError::InvalidEntityId(entity));
        }
        if self.is_alive(entity) {
            return Err(EcsError::DuplicateEntityId(entity));
        }

        self.ids.claim(entity);
        self.place(entity, ArchetypeId::EMPTY);
        Ok(entity)
    }

    /// Create an entity directly in `archetype`, with every component defaulted.
    pub fn create_entity_in(&mut self, archetype: ArchetypeId) -> EcsResult<EntityId> {
        self.ensure_archetype(archetype)?;
        let entity = self.allocate_id();
        self.place(entity, archetype);
        Ok(entity)
    }

    /// Create `count` entities directly in `archetype`.
    pub fn create_entities_in(
        &mut self,
        archetype: ArchetypeId,
        count: usize,
    ) -> EcsResult<Vec<EntityId>> {
        self.ensure_archetype(archetype)?;

        if let Some(table) = self.archetypes.get_mut(archetype) {
            table.reserve(count);
        }
        self.nodes.reserve(count);

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let entity = self.allocate_id();
            self.place(entity, archetype);
            created.push(entity);
        }
        Ok(created)
    }

    /// Delete an entity with all its components, tags and scripts.
    ///
    /// Children of the entity are detached and left without a parent.
    pub fn delete_entity(&mut self, entity: EntityId) -> EcsResult<()> {
        let location = self.location(entity)?;

        self.events
            .entity_deleted
            .fire(&EntityDeleted { entity });

        self.index_row(entity, location, false);

        for script in self.scripts.remove_entity(entity) {
            self.events.script_changed(ScriptChanged {
                entity,
                script,
                action: ScriptAction::Remove,
            });
        }

        let moved = self
            .archetypes
            .get_mut(location.archetype)
            .map(|table| table.remove_entity_at(location.row));
        match moved {
            Some(Some(moved)) => self.relocated(moved, location.row),
            Some(None) => {}
            None => panic!("node table points at missing {:?}", location.archetype),
        }

        self.nodes.remove(&entity);
        self.detach_deleted(entity);
        self.ids.release(entity);

        trace!(%entity, archetype = location.archetype.as_raw(), "deleted entity");
        Ok(())
    }

    /// Check if an entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.nodes.contains_key(&entity)
    }

    /// Get the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate all live entities, grouped by archetype.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.archetypes
            .iter()
            .flat_map(|table| table.entities().iter().copied())
    }

    /// Get the location of an entity.
    #[must_use]
    pub fn entity_location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.nodes.get(&entity).copied()
    }

    /// Fail unless `entity` is alive.
    pub fn ensure_alive(&self, entity: EntityId) -> EcsResult<()> {
        self.location(entity).map(drop)
    }

    // ==================== Archetype Operations ====================

    /// Get or create the archetype with exactly `signature`.
    pub fn find_or_create_archetype(&mut self, signature: &Signature) -> EcsResult<ArchetypeId> {
        self.schema.validate(signature)?;
        Ok(self.archetypes.get_or_create(signature, &self.schema))
    }

    /// Get an archetype by id.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Iterate all archetypes in creation order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Archetype currently holding `entity`.
    pub fn archetype_of(&self, entity: EntityId) -> EcsResult<ArchetypeId> {
        self.location(entity).map(|location| location.archetype)
    }

    /// Signature of the archetype currently holding `entity`.
    pub fn signature_of(&self, entity: EntityId) -> EcsResult<Signature> {
        let location = self.location(entity)?;
        Ok(*self.table(location.archetype).signature())
    }

    /// Component types of `entity`.
    pub fn component_types_of(&self, entity: EntityId) -> EcsResult<ComponentTypes> {
        self.signature_of(entity).map(|signature| signature.components)
    }

    /// Tags of `entity`.
    pub fn tags_of(&self, entity: EntityId) -> EcsResult<Tags> {
        self.signature_of(entity).map(|signature| signature.tags)
    }

    // ==================== Component Operations ====================

    /// Add a component to an entity.
    ///
    /// If the entity already has this component type, the value is overwritten and
    /// `false` is returned.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> EcsResult<bool> {
        let component = self.schema.component_id::<T>()?;
        let location = self.location(entity)?;
        let current = self.table(location.archetype);

        if current.contains(component) {
            self.write_value(entity, location, component, value, true)?;
            self.fire_component(entity, component, ComponentAction::Update);
            return Ok(false);
        }

        let signature = current.signature().with_component(component);
        let target = self.archetypes.get_or_create(&signature, &self.schema);
        let location = self.move_entity(entity, location, target);

        self.write_value(entity, location, component, value, false)?;
        self.fire_component(entity, component, ComponentAction::Add);
        Ok(true)
    }

    /// Overwrite an existing component value.
    pub fn set_component<T: Component>(&mut self, entity: EntityId, value: T) -> EcsResult<()> {
        let component = self.schema.component_id::<T>()?;
        let location = self.location(entity)?;

        if !self.table(location.archetype).contains(component) {
            return Err(EcsError::ComponentNotFound {
                entity,
                name: std::any::type_name::<T>(),
            });
        }

        self.write_value(entity, location, component, value, true)?;
        self.fire_component(entity, component, ComponentAction::Update);
        Ok(())
    }

    /// Remove a component from an entity.
    ///
    /// Returns the removed value, or `None` if the entity did not have it.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> EcsResult<Option<T>> {
        let component = self.schema.component_id::<T>()?;
        let location = self.location(entity)?;
        let current = self.table(location.archetype);

        if !current.contains(component) {
            return Ok(None);
        }

        let value = current.components::<T>(component)?[location.row].clone();
        let signature = current.signature().without_component(component);

        if let Some(index) = self.index_mut(component) {
            index.remove(entity, &value);
        }

        let target = self.archetypes.get_or_create(&signature, &self.schema);
        self.move_entity(entity, location, target);

        self.fire_component(entity, component, ComponentAction::Remove);
        Ok(Some(value))
    }

    /// Get a reference to an entity's component.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> EcsResult<&T> {
        let component = self.schema.component_id::<T>()?;
        let location = self.location(entity)?;

        self.table(location.archetype)
            .column(component)
            .map(|column| &column.as_slice::<T>()[location.row])
            .ok_or(EcsError::ComponentNotFound {
                entity,
                name: std::any::type_name::<T>(),
            })
    }

    /// Get a mutable reference to an entity's component.
    ///
    /// Indexed components must be written with [`set_component`](Self::set_component)
    /// so that their index stays in sync.
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> EcsResult<&mut T> {
        let component = self.schema.component_id::<T>()?;
        if self.index(component).is_some() {
            return Err(EcsError::IndexedComponentMutation(
                std::any::type_name::<T>(),
            ));
        }
        let location = self.location(entity)?;

        self.archetypes
            .get_mut(location.archetype)
            .and_then(|table| table.column_mut(component))
            .map(|column| &mut column.as_mut_slice::<T>()[location.row])
            .ok_or(EcsError::ComponentNotFound {
                entity,
                name: std::any::type_name::<T>(),
            })
    }

    /// Check if an entity has a component.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        let Ok(component) = self.schema.component_id::<T>() else {
            return false;
        };
        self.signature_of(entity)
            .is_ok_and(|signature| signature.components.contains(component))
    }

    // ==================== Tag Operations ====================

    /// Add a tag to an entity. Returns `false` if it was already present.
    pub fn add_tag<T: Tag>(&mut self, entity: EntityId) -> EcsResult<bool> {
        let tag = self.schema.tag_id::<T>()?;
        let (added, _) = self.change_tags(entity, Tags::EMPTY.with(tag), Tags::EMPTY)?;
        Ok(!added.is_empty())
    }

    /// Remove a tag from an entity. Returns `false` if it was not present.
    pub fn remove_tag<T: Tag>(&mut self, entity: EntityId) -> EcsResult<bool> {
        let tag = self.schema.tag_id::<T>()?;
        let (_, removed) = self.change_tags(entity, Tags::EMPTY, Tags::EMPTY.with(tag))?;
        Ok(!removed.is_empty())
    }

    /// Add several tags with a single archetype move. Returns the tags that were new.
    pub fn add_tags(&mut self, entity: EntityId, tags: Tags) -> EcsResult<Tags> {
        self.validate_tags(tags)?;
        self.change_tags(entity, tags, Tags::EMPTY)
            .map(|(added, _)| added)
    }

    /// Remove several tags with a single archetype move. Returns the tags that were present.
    pub fn remove_tags(&mut self, entity: EntityId, tags: Tags) -> EcsResult<Tags> {
        self.validate_tags(tags)?;
        self.change_tags(entity, Tags::EMPTY, tags)
            .map(|(_, removed)| removed)
    }

    /// Check if an entity has a tag.
    #[must_use]
    pub fn has_tag<T: Tag>(&self, entity: EntityId) -> bool {
        let Ok(tag) = self.schema.tag_id::<T>() else {
            return false;
        };
        self.signature_of(entity)
            .is_ok_and(|signature| signature.tags.contains(tag))
    }

    fn validate_tags(&self, tags: Tags) -> EcsResult<()> {
        self.schema
            .validate(&Signature::new(ComponentTypes::EMPTY, tags))?;
        Ok(())
    }

    fn change_tags(
        &mut self,
        entity: EntityId,
        add: Tags,
        remove: Tags,
    ) -> EcsResult<(Tags, Tags)> {
        let location = self.location(entity)?;
        let signature = *self.table(location.archetype).signature();

        let added = add.difference(&signature.tags);
        let removed = remove.intersection(&signature.tags);
        if added.is_empty() && removed.is_empty() {
            return Ok((added, removed));
        }

        let tags = signature.tags.union(&added).difference(&removed);
        let target = self
            .archetypes
            .get_or_create(&Signature::new(signature.components, tags), &self.schema);
        self.move_entity(entity, location, target);

        self.events.tags_changed.fire(&TagsChanged {
            entity,
            added,
            removed,
        });
        Ok((added, removed))
    }

    // ==================== Index Lookups ====================

    /// Entities whose `T` equals `value`.
    pub fn entities_with_value<T: Component>(&self, value: &T) -> EcsResult<&[EntityId]> {
        Ok(self.index_for::<T>()?.entities_with(value))
    }

    /// Entities whose `T` lies in `range`, in value order. Needs a range index.
    pub fn entities_in_range<T: Component>(
        &self,
        range: impl RangeBounds<T>,
    ) -> EcsResult<Vec<EntityId>> {
        let index = self.index_for::<T>()?;
        let start = range.start_bound().map(|v| v as &dyn Any);
        let end = range.end_bound().map(|v| v as &dyn Any);

        index
            .entities_in(start, end)
            .ok_or_else(|| unsupported::<T>("range lookup", index.kind()))
    }

    /// Distinct values of `T` currently held by at least one entity.
    pub fn indexed_values<T: Component>(&self) -> EcsResult<Vec<T>> {
        let index = self.index_for::<T>()?;
        let values = index
            .values()
            .ok_or_else(|| unsupported::<T>("value listing", index.kind()))?;

        Ok(values
            .into_iter()
            .filter_map(|value| value.downcast_ref::<T>().cloned())
            .collect())
    }

    /// Entities whose link component `T` points at `target`.
    pub fn linked_entities<T: Component>(&self, target: EntityId) -> EcsResult<&[EntityId]> {
        let index = self.index_for::<T>()?;
        index
            .linked(target)
            .ok_or_else(|| unsupported::<T>("link lookup", index.kind()))
    }

    fn index_for<T: Component>(&self) -> EcsResult<&dyn ComponentIndex> {
        let component = self.schema.component_id::<T>()?;
        self.index(component)
            .ok_or(EcsError::NotIndexed(std::any::type_name::<T>()))
    }

    pub(crate) fn index(&self, component: ComponentId) -> Option<&dyn ComponentIndex> {
        self.indices.get(component.index())?.as_deref()
    }

    fn index_mut(&mut self, component: ComponentId) -> Option<&mut Box<dyn ComponentIndex>> {
        self.indices.get_mut(component.index())?.as_mut()
    }

    // ==================== Internals ====================

    pub(crate) const fn archetype_storage(&self) -> &ArchetypeStorage {
        &self.archetypes
    }

    pub(crate) fn archetype_storage_mut(&mut self) -> &mut ArchetypeStorage {
        &mut self.archetypes
    }

    fn location(&self, entity: EntityId) -> EcsResult<EntityLocation> {
        self.nodes
            .get(&entity)
            .copied()
            .ok_or(EcsError::EntityNotFound(entity))
    }

    fn ensure_archetype(&self, archetype: ArchetypeId) -> EcsResult<()> {
        self.archetypes
            .get(archetype)
            .map(drop)
            .ok_or(EcsError::ArchetypeNotFound(archetype.as_raw()))
    }

    /// Archetype referenced by the node table.
    ///
    /// # Panics
    ///
    /// Panics if the node table points at an archetype that does not exist.
    fn table(&self, archetype: ArchetypeId) -> &Archetype {
        match self.archetypes.get(archetype) {
            Some(table) => table,
            None => panic!("node table points at missing {archetype:?}"),
        }
    }

    fn allocate_id(&mut self) -> EntityId {
        let nodes = &self.nodes;
        self.ids.allocate(|id| nodes.contains_key(&id))
    }

    /// Append a fresh row for `entity` and announce it.
    fn place(&mut self, entity: EntityId, archetype: ArchetypeId) {
        let Some(table) = self.archetypes.get_mut(archetype) else {
            panic!("cannot place {entity:?} in missing {archetype:?}");
        };
        let row = table.add_entity(entity);
        let location = EntityLocation { archetype, row };
        self.nodes.insert(entity, location);

        self.index_row(entity, location, true);
        self.events
            .entity_created
            .fire(&EntityCreated { entity });
    }

    /// Move `entity` to `target`, fixing up the row of the entity swapped into its old slot.
    fn move_entity(
        &mut self,
        entity: EntityId,
        from: EntityLocation,
        target: ArchetypeId,
    ) -> EntityLocation {
        let (source, dest) = self.archetypes.pair_mut(from.archetype, target);
        let MovedEntity { new_row, moved } = source.move_entity_to(dest, from.row);

        if let Some(moved) = moved {
            self.relocated(moved, from.row);
        }

        let location = EntityLocation {
            archetype: target,
            row: new_row,
        };
        self.nodes.insert(entity, location);

        trace!(
            %entity,
            from = from.archetype.as_raw(),
            to = target.as_raw(),
            row = new_row,
            "moved entity"
        );
        location
    }

    /// Record that `moved` now lives at `row` of its archetype.
    fn relocated(&mut self, moved: EntityId, row: usize) {
        match self.nodes.get_mut(&moved) {
            Some(location) => location.row = row,
            None => panic!("node table corrupted: swapped-in {moved:?} has no node"),
        }
    }

    /// Store `value` in the entity's row and keep the index in sync.
    ///
    /// With `replacing`, the previous value is taken out of the index first.
    fn write_value<T: Component>(
        &mut self,
        entity: EntityId,
        location: EntityLocation,
        component: ComponentId,
        value: T,
        replacing: bool,
    ) -> EcsResult<()> {
        let Some(table) = self.archetypes.get_mut(location.archetype) else {
            panic!("node table points at missing {:?}", location.archetype);
        };
        let slot = &mut table.components_mut::<T>(component)?[location.row];
        let previous = std::mem::replace(slot, value);

        if let Some(index) = self
            .indices
            .get_mut(component.index())
            .and_then(Option::as_mut)
        {
            if replacing {
                index.remove(entity, &previous);
            }
            index.insert(entity, &*slot);
        }
        Ok(())
    }

    /// Insert or remove every indexed value of one row.
    fn index_row(&mut self, entity: EntityId, location: EntityLocation, insert: bool) {
        let Some(table) = self.archetypes.get(location.archetype) else {
            return;
        };

        for &component in table.component_ids() {
            let Some(index) = self
                .indices
                .get_mut(component.index())
                .and_then(Option::as_mut)
            else {
                continue;
            };
            let Some(column) = table.column(component) else {
                continue;
            };

            // SAFETY: the row is live, so the slot holds an initialized value of the
            // column's type, and it is not written while `value` is in use
            let value = unsafe { column.info().erase(column.get_unchecked_raw(location.row)) };
            if insert {
                index.insert(entity, value);
            } else {
                index.remove(entity, value);
            }
        }
    }

    fn fire_component(&self, entity: EntityId, component: ComponentId, action: ComponentAction) {
        self.events.component_changed(ComponentChanged {
            entity,
            component,
            name: self.schema.name_of(component),
            action,
        });
    }
}

fn unsupported<T>(operation: &'static str, kind: IndexKind) -> EcsError {
    EcsError::NotSupportedByIndex {
        operation,
        kind: kind.name(),
        name: std::any::type_name::<T>(),
    }
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("entities", &self.nodes.len())
            .field("archetypes", &self.archetypes.len())
            .field("free_ids", &self.ids.free_count())
            .field("scripts", &self.scripts)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
