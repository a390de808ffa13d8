//! Query system for iterating over entities with specific component patterns.
//!
//! Queries are built at runtime with method chaining:
//!
//! ```
//! use strata_ecs::{Component, EntityStore, Schema, Tag};
//!
//! #[derive(Component, Default, Clone, Copy)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//!
//! #[derive(Component, Default, Clone, Copy)]
//! struct Velocity {
//!     x: f32,
//!     y: f32,
//! }
//!
//! #[derive(Tag)]
//! struct Frozen;
//!
//! let mut builder = Schema::builder();
//! builder.component::<Position>().unwrap();
//! builder.component::<Velocity>().unwrap();
//! builder.tag::<Frozen>().unwrap();
//! let mut store = EntityStore::new(builder.build());
//!
//! let e = store.create_entity();
//! store.add_component(e, Position::default()).unwrap();
//! store.add_component(e, Velocity { x: 1.0, y: 0.5 }).unwrap();
//!
//! let query = store
//!     .query()
//!     .without_tag::<Frozen>()
//!     .build()
//!     .unwrap();
//!
//! for chunk in query.chunks_mut::<(Position, Velocity)>(&mut store).unwrap() {
//!     let (positions, velocities) = chunk.components;
//!     for (pos, vel) in positions.iter_mut().zip(velocities.iter()) {
//!         pos.x += vel.x;
//!         pos.y += vel.y;
//!     }
//! }
//!
//! assert_eq!(store.get_component::<Position>(e).unwrap().x, 1.0);
//! ```
//!
//! # Filters
//!
//! - `.with::<T>()` / `.with_tag::<T>()` - entity must have T
//! - `.without::<T>()` / `.without_tag::<T>()` - entity must NOT have T
//! - `.has_value(v)` - component equals `v` (needs an index)
//! - `.value_in_range(r)` - component lies in `r` (needs a range index)
//!
//! Archetype filters are bit-set checks against each archetype's signature. Value
//! filters are answered by the component index and then checked against the
//! archetype filters, so they never scan columns.

use std::{
    any::Any,
    fmt,
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use crate::{
    archetype::Archetype,
    chunk::{Chunk, ChunkQuery},
    component::{Component, ComponentId, Tag},
    entity::EntityId,
    error::{EcsError, EcsResult, SchemaError},
    index::IndexKind,
    schema::Schema,
    signature::Signature,
    store::EntityStore,
};

type BoxedValue = Box<dyn Any + Send + Sync>;

/// A value filter answered by a component index.
enum Predicate {
    Equals {
        component: ComponentId,
        name: &'static str,
        value: BoxedValue,
    },
    InRange {
        component: ComponentId,
        name: &'static str,
        start: Bound<BoxedValue>,
        end: Bound<BoxedValue>,
    },
}

impl Predicate {
    /// Matching entities, sorted by id.
    fn evaluate(&self, store: &EntityStore) -> EcsResult<Vec<EntityId>> {
        let (component, name) = match self {
            Self::Equals {
                component, name, ..
            }
            | Self::InRange {
                component, name, ..
            } => (*component, *name),
        };
        let index = store.index(component).ok_or(EcsError::NotIndexed(name))?;

        let mut hits = match self {
            Self::Equals { value, .. } => index.entities_with(&**value).to_vec(),
            Self::InRange { start, end, .. } => {
                let start = start.as_ref().map(|v| &**v as &dyn Any);
                let end = end.as_ref().map(|v| &**v as &dyn Any);
                index
                    .entities_in(start, end)
                    .ok_or(EcsError::NotSupportedByIndex {
                        operation: "range lookup",
                        kind: index.kind().name(),
                        name,
                    })?
            }
        };
        hits.sort_unstable();
        Ok(hits)
    }
}

/// Keep the ids present in both sorted lists.
fn intersect_sorted(a: &[EntityId], b: &[EntityId]) -> Vec<EntityId> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn matches(required: &Signature, excluded: &Signature, signature: &Signature) -> bool {
    signature.components.is_superset(&required.components)
        && signature.tags.is_superset(&required.tags)
        && signature.components.is_disjoint(&excluded.components)
        && signature.tags.is_disjoint(&excluded.tags)
}

// ============================================================================
// QueryBuilder - Runtime Builder Pattern
// ============================================================================

/// Builder for constructing queries at runtime.
///
/// Type lookups happen as terms are added; the first failure is reported by
/// [`build`](Self::build).
pub struct QueryBuilder {
    schema: Arc<Schema>,
    required: Signature,
    excluded: Signature,
    predicates: Vec<Predicate>,
    error: Option<EcsError>,
}

impl QueryBuilder {
    /// Create a new query builder.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            required: Signature::EMPTY,
            excluded: Signature::EMPTY,
            predicates: Vec::new(),
            error: None,
        }
    }

    fn resolve<T>(&mut self, result: Result<T, SchemaError>) -> Option<T> {
        match result {
            Ok(id) => Some(id),
            Err(err) => {
                self.fail(err.into());
                None
            }
        }
    }

    fn fail(&mut self, err: EcsError) {
        self.error.get_or_insert(err);
    }

    /// Entity must have component `T`.
    #[must_use]
    pub fn with<T: Component>(mut self) -> Self {
        if let Some(id) = self.resolve(self.schema.component_id::<T>()) {
            self.required = self.required.with_component(id);
        }
        self
    }

    /// Entity must have tag `T`.
    #[must_use]
    pub fn with_tag<T: Tag>(mut self) -> Self {
        if let Some(id) = self.resolve(self.schema.tag_id::<T>()) {
            self.required = self.required.with_tag(id);
        }
        self
    }

    /// Exclude entities that have component `T`.
    #[must_use]
    pub fn without<T: Component>(mut self) -> Self {
        if let Some(id) = self.resolve(self.schema.component_id::<T>()) {
            self.excluded = self.excluded.with_component(id);
        }
        self
    }

    /// Exclude entities that have tag `T`.
    #[must_use]
    pub fn without_tag<T: Tag>(mut self) -> Self {
        if let Some(id) = self.resolve(self.schema.tag_id::<T>()) {
            self.excluded = self.excluded.with_tag(id);
        }
        self
    }

    /// Entity's `T` must equal `value`. `T` must carry an index.
    #[must_use]
    pub fn has_value<T: Component>(mut self, value: T) -> Self {
        let Some(component) = self.indexed::<T>() else {
            return self;
        };
        self.required = self.required.with_component(component);
        self.predicates.push(Predicate::Equals {
            component,
            name: std::any::type_name::<T>(),
            value: Box::new(value),
        });
        self
    }

    /// Entity's `T` must lie in `range`. `T` must carry a range index.
    #[must_use]
    pub fn value_in_range<T: Component>(mut self, range: impl RangeBounds<T>) -> Self {
        let Some(component) = self.indexed::<T>() else {
            return self;
        };
        let name = std::any::type_name::<T>();

        let kind = self
            .schema
            .component_info(component)
            .and_then(|info| info.index_kind());
        if let Some(kind @ (IndexKind::Value | IndexKind::Link)) = kind {
            self.fail(EcsError::NotSupportedByIndex {
                operation: "range lookup",
                kind: kind.name(),
                name,
            });
            return self;
        }

        let boxed = |bound: Bound<&T>| bound.cloned().map(|v| Box::new(v) as BoxedValue);
        self.required = self.required.with_component(component);
        self.predicates.push(Predicate::InRange {
            component,
            name,
            start: boxed(range.start_bound()),
            end: boxed(range.end_bound()),
        });
        self
    }

    fn indexed<T: Component>(&mut self) -> Option<ComponentId> {
        let component = self.resolve(self.schema.component_id::<T>())?;
        let indexed = self
            .schema
            .component_info(component)
            .is_some_and(|info| info.index_kind().is_some());
        if indexed {
            Some(component)
        } else {
            self.fail(EcsError::NotIndexed(std::any::type_name::<T>()));
            None
        }
    }

    /// Build the query.
    pub fn build(self) -> EcsResult<Query> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Query {
            schema: self.schema,
            required: self.required,
            excluded: self.excluded,
            predicates: self.predicates,
        })
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("required", &self.required)
            .field("excluded", &self.excluded)
            .field("predicates", &self.predicates.len())
            .field("error", &self.error)
            .finish()
    }
}

// ============================================================================
// Query - Executable Query
// ============================================================================

/// An executable query over entities.
///
/// A query holds no store state: matching archetypes are found on every execution,
/// so archetypes created after the query was built are picked up.
pub struct Query {
    schema: Arc<Schema>,
    required: Signature,
    excluded: Signature,
    predicates: Vec<Predicate>,
}

impl Query {
    /// Components and tags every matching entity has.
    #[must_use]
    pub const fn required(&self) -> &Signature {
        &self.required
    }

    /// Components and tags no matching entity has.
    #[must_use]
    pub const fn excluded(&self) -> &Signature {
        &self.excluded
    }

    /// Check if the query has value filters.
    #[must_use]
    pub fn has_value_filters(&self) -> bool {
        !self.predicates.is_empty()
    }

    /// Check if an archetype with `signature` passes the archetype filters.
    #[must_use]
    pub fn matches(&self, signature: &Signature) -> bool {
        matches(&self.required, &self.excluded, signature)
    }

    fn check_schema(&self, store: &EntityStore) -> EcsResult<()> {
        if Arc::ptr_eq(&self.schema, store.schema()) {
            Ok(())
        } else {
            Err(EcsError::SchemaMismatch)
        }
    }

    /// Non-empty archetypes passing the archetype filters, in creation order.
    ///
    /// Only signatures are compared here; the execution methods below also reject a store
    /// built on a different schema.
    pub fn archetypes<'s>(&'s self, store: &'s EntityStore) -> impl Iterator<Item = &'s Archetype> {
        store
            .archetype_storage()
            .iter()
            .filter(|table| !table.is_empty() && self.matches(table.signature()))
    }

    /// Iterate matching entities.
    ///
    /// Without value filters this walks the matching archetypes row by row. With value
    /// filters the candidates come from the indices, sorted by id.
    pub fn entities<'s>(&'s self, store: &'s EntityStore) -> EcsResult<QueryEntities<'s>> {
        self.check_schema(store)?;
        if self.predicates.is_empty() {
            return Ok(QueryEntities {
                inner: EntitiesInner::Scan {
                    tables: Box::new(self.archetypes(store)),
                    current: std::slice::Iter::default(),
                },
            });
        }

        let mut candidates: Option<Vec<EntityId>> = None;
        for predicate in &self.predicates {
            let hits = predicate.evaluate(store)?;
            candidates = Some(match candidates {
                Some(previous) => intersect_sorted(&previous, &hits),
                None => hits,
            });
        }

        Ok(QueryEntities {
            inner: EntitiesInner::Indexed {
                store,
                query: self,
                candidates: candidates.unwrap_or_default().into_iter(),
            },
        })
    }

    /// Number of matching entities.
    pub fn count(&self, store: &EntityStore) -> EcsResult<usize> {
        self.check_schema(store)?;
        if self.predicates.is_empty() {
            return Ok(self.archetypes(store).map(Archetype::len).sum());
        }
        Ok(self.entities(store)?.count())
    }

    /// Iterate matching archetypes as typed column slices.
    ///
    /// The components in `Q` are implicitly required.
    pub fn chunks<'s, Q: ChunkQuery>(
        &'s self,
        store: &'s EntityStore,
    ) -> EcsResult<impl Iterator<Item = Chunk<'s, Q::Slices<'s>>>> {
        self.check_schema(store)?;
        if self.has_value_filters() {
            return Err(EcsError::ValueFilterOnChunks);
        }

        let ids = Q::component_ids(&self.schema)?;
        let required = ids
            .iter()
            .fold(self.required, |sig, &id| sig.with_component(id));
        let excluded = self.excluded;

        Ok(store
            .archetype_storage()
            .iter()
            .filter(move |table| !table.is_empty() && matches(&required, &excluded, table.signature()))
            .map(move |table| Chunk {
                archetype: table.id(),
                entities: table.entities(),
                components: Q::slices(table, &ids),
            }))
    }

    /// Iterate matching archetypes as mutable typed column slices.
    ///
    /// Indexed components cannot be fetched mutably; write them with
    /// [`EntityStore::set_component`].
    pub fn chunks_mut<'s, Q: ChunkQuery>(
        &'s self,
        store: &'s mut EntityStore,
    ) -> EcsResult<impl Iterator<Item = Chunk<'s, Q::SlicesMut<'s>>>> {
        self.check_schema(store)?;
        if self.has_value_filters() {
            return Err(EcsError::ValueFilterOnChunks);
        }

        let ids = Q::component_ids(&self.schema)?;
        if let Some(&id) = ids.iter().find(|&&id| store.index(id).is_some()) {
            return Err(EcsError::IndexedComponentMutation(self.schema.name_of(id)));
        }

        let required = ids
            .iter()
            .fold(self.required, |sig, &id| sig.with_component(id));
        let excluded = self.excluded;

        Ok(store
            .archetype_storage_mut()
            .iter_mut()
            .filter(move |table| !table.is_empty() && matches(&required, &excluded, table.signature()))
            .map(move |table| {
                let archetype = table.id();
                let Some((entities, columns)) = table.split_for_write(&ids) else {
                    panic!("matched {archetype:?} is missing a requested column");
                };
                // SAFETY: the ids are distinct (checked by `component_ids`), each column holds
                // the type registered under its id, and the archetype is borrowed for 's
                let components = unsafe { Q::slices_mut(&columns) };
                Chunk {
                    archetype,
                    entities,
                    components,
                }
            }))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("required", &self.required)
            .field("excluded", &self.excluded)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

// ============================================================================
// QueryEntities - Iterator Over Query Results
// ============================================================================

/// Iterator over the entities matched by a [`Query`].
pub struct QueryEntities<'s> {
    inner: EntitiesInner<'s>,
}

enum EntitiesInner<'s> {
    Scan {
        tables: Box<dyn Iterator<Item = &'s Archetype> + 's>,
        current: std::slice::Iter<'s, EntityId>,
    },
    Indexed {
        store: &'s EntityStore,
        query: &'s Query,
        candidates: std::vec::IntoIter<EntityId>,
    },
}

impl Iterator for QueryEntities<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EntitiesInner::Scan { tables, current } => loop {
                if let Some(&entity) = current.next() {
                    return Some(entity);
                }
                *current = tables.next()?.entities().iter();
            },
            EntitiesInner::Indexed {
                store,
                query,
                candidates,
            } => candidates.find(|&entity| {
                store
                    .signature_of(entity)
                    .is_ok_and(|signature| query.matches(&signature))
            }),
        }
    }
}

impl fmt::Debug for QueryEntities<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.inner {
            EntitiesInner::Scan { .. } => "scan",
            EntitiesInner::Indexed { .. } => "indexed",
        };
        f.debug_struct("QueryEntities").field("mode", &mode).finish()
    }
}
