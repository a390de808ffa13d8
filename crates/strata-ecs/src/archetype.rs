//! Archetype storage - tables of entities with identical signatures.
//!
//! An archetype represents a unique combination of component and tag types.
//! All entities with the same signature are stored together for cache-efficient
//! iteration: one column per component, plus the entity-id column, all indexed by row.

use std::{fmt, ptr::NonNull};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    component::{Component, ComponentId},
    entity::EntityId,
    error::{EcsError, EcsResult},
    schema::Schema,
    signature::Signature,
    storage::Column,
};

/// Unique identifier for an archetype within one store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The root archetype (no components, no tags).
    pub const EMPTY: Self = Self(0);

    /// Create an archetype ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

/// Result of moving a row from one archetype to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovedEntity {
    /// Row of the entity in the target archetype.
    pub new_row: usize,
    /// Entity that was swapped into the vacated source row, if any.
    pub moved: Option<EntityId>,
}

/// An archetype - a table storing entities with the same signature.
pub struct Archetype {
    /// Unique identifier for this archetype.
    id: ArchetypeId,
    /// Components and tags shared by every row.
    signature: Signature,
    /// Sorted list of component IDs in this archetype.
    components: SmallVec<[ComponentId; 8]>,
    /// Component columns, indexed in same order as `components`.
    columns: Vec<Column>,
    /// Map from ComponentId to column index for fast lookup.
    component_indices: FxHashMap<ComponentId, usize>,
    /// Entities stored in this archetype.
    entities: Vec<EntityId>,
}

impl Archetype {
    /// Create a new archetype for `signature`.
    ///
    /// # Panics
    ///
    /// Panics if the signature names a component outside `schema`; use
    /// [`Schema::validate`] first for untrusted signatures.
    #[must_use]
    pub fn new(id: ArchetypeId, signature: Signature, schema: &Schema) -> Self {
        let components: SmallVec<[ComponentId; 8]> = signature.components.iter().collect();

        let mut component_indices = FxHashMap::default();
        component_indices.reserve(components.len());
        let mut columns = Vec::with_capacity(components.len());

        for (idx, &comp_id) in components.iter().enumerate() {
            let Some(info) = schema.component_info(comp_id) else {
                panic!("{comp_id:?} is not registered in the schema");
            };
            component_indices.insert(comp_id, idx);
            columns.push(Column::new(info.clone()));
        }

        Self {
            id,
            signature,
            components,
            columns,
            component_indices,
            entities: Vec::new(),
        }
    }

    /// Get the archetype ID.
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Get the signature.
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Get the component IDs in this archetype (sorted).
    #[must_use]
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.components
    }

    /// Check if this archetype contains a component type.
    #[must_use]
    pub fn contains(&self, component_id: ComponentId) -> bool {
        self.component_indices.contains_key(&component_id)
    }

    /// Get the number of entities in this archetype.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the archetype is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get the entities in this archetype, in row order.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Get a column by component ID.
    #[must_use]
    pub fn column(&self, component_id: ComponentId) -> Option<&Column> {
        self.component_indices
            .get(&component_id)
            .map(|&idx| &self.columns[idx])
    }

    /// Get a mutable column by component ID.
    #[must_use]
    pub fn column_mut(&mut self, component_id: ComponentId) -> Option<&mut Column> {
        self.component_indices
            .get(&component_id)
            .map(|&idx| &mut self.columns[idx])
    }

    /// Entity ids plus one column pointer per requested component, for borrowing
    /// several distinct columns mutably at once.
    ///
    /// All pointers derive from one borrow of the column array, so turning them into
    /// references is sound as long as the ids are pairwise distinct.
    pub(crate) fn split_for_write(
        &mut self,
        component_ids: &[ComponentId],
    ) -> Option<(&[EntityId], SmallVec<[NonNull<Column>; 6]>)> {
        let base = self.columns.as_mut_ptr();
        let mut columns = SmallVec::new();
        for id in component_ids {
            let &idx = self.component_indices.get(id)?;
            // SAFETY: idx is a valid position in `columns`
            columns.push(unsafe { NonNull::new_unchecked(base.add(idx)) });
        }
        Some((&self.entities, columns))
    }

    /// Typed view of one component column.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type registered under `component_id`.
    pub fn components<T: Component>(&self, component_id: ComponentId) -> EcsResult<&[T]> {
        self.column(component_id)
            .map(Column::as_slice::<T>)
            .ok_or(EcsError::ComponentNotInArchetype {
                component: component_id,
                archetype: self.id.as_raw(),
            })
    }

    /// Mutable typed view of one component column.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type registered under `component_id`.
    pub fn components_mut<T: Component>(
        &mut self,
        component_id: ComponentId,
    ) -> EcsResult<&mut [T]> {
        let archetype = self.id.as_raw();
        self.column_mut(component_id)
            .map(Column::as_mut_slice::<T>)
            .ok_or(EcsError::ComponentNotInArchetype {
                component: component_id,
                archetype,
            })
    }

    /// Append a row for `entity` with every component default-initialized.
    ///
    /// Returns the new row index.
    pub fn add_entity(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.columns {
            column.push_default();
        }
        row
    }

    /// Remove a row using swap-remove.
    ///
    /// Returns the entity that was moved into `row`, or `None` if `row` was last.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn remove_entity_at(&mut self, row: usize) -> Option<EntityId> {
        assert!(
            row < self.entities.len(),
            "row {row} out of bounds for archetype {:?} with {} entities",
            self.id,
            self.entities.len()
        );

        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.entities.swap_remove(row);

        self.entities.get(row).copied()
    }

    /// Move a row into `target`.
    ///
    /// Components present in both archetypes are copied, components only in the
    /// target are default-initialized, components only in the source are discarded.
    /// The source row is then swap-removed.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds, or if a component id shared by both archetypes
    /// maps to different types (archetypes built from different schemas).
    pub fn move_entity_to(&mut self, target: &mut Self, row: usize) -> MovedEntity {
        assert!(
            row < self.entities.len(),
            "row {row} out of bounds for archetype {:?} with {} entities",
            self.id,
            self.entities.len()
        );

        let entity = self.entities[row];
        let new_row = target.entities.len();
        target.entities.push(entity);

        for (comp_id, column) in target.components.iter().zip(&mut target.columns) {
            match self.column(*comp_id) {
                Some(source) => {
                    assert!(
                        source.info().is_same_type(column.info()),
                        "{comp_id:?} holds `{}` in the source archetype but `{}` in the target",
                        source.info().name(),
                        column.info().name()
                    );
                    // SAFETY: row is in bounds and both columns store the same component type
                    unsafe { column.push_raw(source.get_unchecked_raw(row)) };
                }
                None => column.push_default(),
            }
        }

        let moved = self.remove_entity_at(row);

        MovedEntity { new_row, moved }
    }

    /// Reserve capacity in all columns.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("entity_count", &self.entities.len())
            .finish()
    }
}

/// Storage for all archetypes of a store, in creation order.
pub struct ArchetypeStorage {
    /// All archetypes. Index equals the archetype id.
    archetypes: Vec<Archetype>,
    /// Map from signature to archetype ID.
    archetype_map: FxHashMap<Signature, ArchetypeId>,
}

impl ArchetypeStorage {
    /// Create new archetype storage holding only the root archetype.
    #[must_use]
    pub fn new(schema: &Schema) -> Self {
        Self::with_capacity(schema, 0)
    }

    /// Create storage with room for `capacity` archetypes.
    #[must_use]
    pub fn with_capacity(schema: &Schema, capacity: usize) -> Self {
        let mut storage = Self {
            archetypes: Vec::with_capacity(capacity.max(1)),
            archetype_map: FxHashMap::default(),
        };

        storage
            .archetypes
            .push(Archetype::new(ArchetypeId::EMPTY, Signature::EMPTY, schema));
        storage
            .archetype_map
            .insert(Signature::EMPTY, ArchetypeId::EMPTY);

        storage
    }

    /// Get or create the archetype with exactly `signature`.
    ///
    /// # Panics
    ///
    /// Panics if the signature names a component outside `schema`.
    pub fn get_or_create(&mut self, signature: &Signature, schema: &Schema) -> ArchetypeId {
        if let Some(&id) = self.archetype_map.get(signature) {
            return id;
        }

        let id = ArchetypeId::from_raw(self.archetypes.len() as u32);
        self.archetypes
            .push(Archetype::new(id, *signature, schema));
        self.archetype_map.insert(*signature, id);

        debug!(
            archetype = id.as_raw(),
            components = signature.components.len(),
            tags = signature.tags.len(),
            "created archetype"
        );

        id
    }

    /// Find the archetype with exactly `signature`, if it exists.
    #[must_use]
    pub fn find(&self, signature: &Signature) -> Option<ArchetypeId> {
        self.archetype_map.get(signature).copied()
    }

    /// Get an archetype by ID.
    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.as_raw() as usize)
    }

    /// Get a mutable archetype by ID.
    #[must_use]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.as_raw() as usize)
    }

    /// Borrow two distinct archetypes mutably.
    ///
    /// # Panics
    ///
    /// Panics if `a == b` or either id is out of range.
    pub fn pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut Archetype, &mut Archetype) {
        let (ia, ib) = (a.as_raw() as usize, b.as_raw() as usize);
        assert_ne!(ia, ib, "pair_mut needs two distinct archetypes");

        if ia < ib {
            let (left, right) = self.archetypes.split_at_mut(ib);
            (&mut left[ia], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(ia);
            (&mut right[0], &mut left[ib])
        }
    }

    /// Get the number of archetypes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Check if only the root archetype exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.len() <= 1
    }

    /// Iterate over all archetypes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Iterate mutably over all archetypes in creation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.archetypes.iter_mut()
    }
}

impl fmt::Debug for ArchetypeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeStorage")
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }
    impl Component for Velocity {}

    struct Fixture {
        schema: Arc<Schema>,
        pos: ComponentId,
        vel: ComponentId,
    }

    fn fixture() -> Fixture {
        let mut builder = Schema::builder();
        let pos = builder.component::<Position>().unwrap();
        let vel = builder.component::<Velocity>().unwrap();
        Fixture {
            schema: builder.build(),
            pos,
            vel,
        }
    }

    fn e(raw: u32) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn test_archetype_creation() {
        let f = fixture();
        let sig = Signature::EMPTY.with_component(f.vel).with_component(f.pos);
        let archetype = Archetype::new(ArchetypeId::from_raw(1), sig, &f.schema);

        assert!(archetype.contains(f.pos));
        assert!(archetype.contains(f.vel));
        assert_eq!(archetype.component_ids(), &[f.pos, f.vel]);
    }

    #[test]
    fn test_add_entity_defaults_columns() {
        let f = fixture();
        let sig = Signature::EMPTY.with_component(f.pos);
        let mut archetype = Archetype::new(ArchetypeId::from_raw(1), sig, &f.schema);

        assert_eq!(archetype.add_entity(e(1)), 0);
        assert_eq!(archetype.add_entity(e(2)), 1);

        let positions = archetype.components::<Position>(f.pos).unwrap();
        assert_eq!(positions, &[Position::default(); 2]);
        assert_eq!(archetype.entities(), &[e(1), e(2)]);
    }

    #[test]
    fn test_remove_entity_at_swaps_last() {
        let f = fixture();
        let sig = Signature::EMPTY.with_component(f.pos);
        let mut archetype = Archetype::new(ArchetypeId::from_raw(1), sig, &f.schema);

        for (i, id) in [10, 11, 12].into_iter().enumerate() {
            archetype.add_entity(e(id));
            archetype.components_mut::<Position>(f.pos).unwrap()[i].x = id as f32;
        }

        assert_eq!(archetype.remove_entity_at(0), Some(e(12)));
        assert_eq!(archetype.entities(), &[e(12), e(11)]);
        assert_eq!(archetype.components::<Position>(f.pos).unwrap()[0].x, 12.0);

        assert_eq!(archetype.remove_entity_at(1), None);
        assert_eq!(archetype.len(), 1);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_remove_out_of_range_panics() {
        let f = fixture();
        let mut archetype = Archetype::new(ArchetypeId::EMPTY, Signature::EMPTY, &f.schema);
        archetype.remove_entity_at(0);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let f = fixture();
        let archetype = Archetype::new(ArchetypeId::EMPTY, Signature::EMPTY, &f.schema);

        assert_eq!(
            archetype.components::<Position>(f.pos),
            Err(EcsError::ComponentNotInArchetype {
                component: f.pos,
                archetype: 0,
            })
        );
    }

    #[test]
    fn test_move_entity_copies_shared_and_defaults_new() {
        let f = fixture();
        let mut storage = ArchetypeStorage::new(&f.schema);
        let pos_only = storage.get_or_create(&Signature::EMPTY.with_component(f.pos), &f.schema);
        let pos_vel = storage.get_or_create(
            &Signature::EMPTY.with_component(f.pos).with_component(f.vel),
            &f.schema,
        );

        let source = storage.get_mut(pos_only).unwrap();
        source.add_entity(e(1));
        source.add_entity(e(2));
        source.components_mut::<Position>(f.pos).unwrap()[0] = Position { x: 1.0, y: 2.0 };

        let (source, target) = storage.pair_mut(pos_only, pos_vel);
        let moved = source.move_entity_to(target, 0);

        assert_eq!(
            moved,
            MovedEntity {
                new_row: 0,
                moved: Some(e(2)),
            }
        );
        assert_eq!(target.entities(), &[e(1)]);
        assert_eq!(
            target.components::<Position>(f.pos).unwrap()[0],
            Position { x: 1.0, y: 2.0 }
        );
        assert_eq!(
            target.components::<Velocity>(f.vel).unwrap()[0],
            Velocity::default()
        );
        assert_eq!(source.entities(), &[e(2)]);
    }

    #[test]
    #[should_panic(expected = "in the source archetype but")]
    fn test_move_between_schemas_with_clashing_ids_panics() {
        #[derive(Debug, Default, Clone, Copy)]
        struct Small(u8);
        impl Component for Small {}

        #[derive(Debug, Default, Clone, Copy)]
        struct Big([u64; 32]);
        impl Component for Big {}

        let mut small_builder = Schema::builder();
        let small = small_builder.component::<Small>().unwrap();
        let small_schema = small_builder.build();

        let mut big_builder = Schema::builder();
        let big = big_builder.component::<Big>().unwrap();
        let big_schema = big_builder.build();
        assert_eq!(small, big);

        let mut source = Archetype::new(
            ArchetypeId::from_raw(1),
            Signature::EMPTY.with_component(small),
            &small_schema,
        );
        let mut target = Archetype::new(
            ArchetypeId::from_raw(1),
            Signature::EMPTY.with_component(big),
            &big_schema,
        );
        source.add_entity(e(1));

        source.move_entity_to(&mut target, 0);
    }

    #[test]
    fn test_move_back_drops_source_only_component() {
        let f = fixture();
        let mut storage = ArchetypeStorage::new(&f.schema);
        let both = storage.get_or_create(
            &Signature::EMPTY.with_component(f.pos).with_component(f.vel),
            &f.schema,
        );
        let vel_only = storage.get_or_create(&Signature::EMPTY.with_component(f.vel), &f.schema);

        let source = storage.get_mut(both).unwrap();
        source.add_entity(e(1));
        source.components_mut::<Velocity>(f.vel).unwrap()[0] = Velocity { x: 3.0, y: 4.0 };

        let (target, source) = storage.pair_mut(vel_only, both);
        let moved = source.move_entity_to(target, 0);

        assert_eq!(moved.moved, None);
        assert!(source.is_empty());
        assert_eq!(
            target.components::<Velocity>(f.vel).unwrap(),
            &[Velocity { x: 3.0, y: 4.0 }]
        );
        assert!(!target.contains(f.pos));
    }

    #[test]
    fn test_archetype_storage() {
        let f = fixture();
        let mut storage = ArchetypeStorage::new(&f.schema);

        let arch1 = storage.get_or_create(&Signature::EMPTY.with_component(f.pos), &f.schema);
        let arch2 = storage.get_or_create(
            &Signature::EMPTY.with_component(f.pos).with_component(f.vel),
            &f.schema,
        );
        let arch3 = storage.get_or_create(&Signature::EMPTY.with_component(f.pos), &f.schema);

        assert_ne!(arch1, arch2);
        assert_eq!(arch1, arch3); // Same signature = same archetype
        assert_eq!(storage.find(&Signature::EMPTY), Some(ArchetypeId::EMPTY));
        assert_eq!(storage.len(), 3);
    }
}
