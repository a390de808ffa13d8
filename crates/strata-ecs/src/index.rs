//! Secondary indices from component values to entities.
//!
//! An index is attached to a component type when the schema is built and is owned by
//! each [`EntityStore`](crate::EntityStore). The store keeps it in sync on every add, set,
//! remove and delete, so lookups never scan archetype columns.
//!
//! Three kinds exist:
//! - [`ValueIndex`] - hash map, equality lookups
//! - [`RangeIndex`] - ordered map, equality and range lookups
//! - [`LinkIndex`] - keyed by the entity a [`Link`] component points at

use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    hash::Hash,
    ops::Bound,
};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{component::Component, entity::EntityId};

/// Kind of index attached to a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IndexKind {
    /// Hash index, equality lookups only.
    Value,
    /// Ordered index, equality and range lookups.
    Range,
    /// Index by link target.
    Link,
}

impl IndexKind {
    /// Name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Range => "range",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind plus constructor, recorded in the schema.
#[derive(Clone, Copy)]
pub(crate) struct IndexDescriptor {
    pub(crate) kind: IndexKind,
    create: fn() -> Box<dyn ComponentIndex>,
}

impl IndexDescriptor {
    pub(crate) fn create(&self) -> Box<dyn ComponentIndex> {
        (self.create)()
    }
}

/// Components that point at another entity.
///
/// A component implementing `Link` can carry a [`LinkIndex`], which answers "which
/// entities point at `target`".
pub trait Link {
    /// Entity this value points at.
    fn target(&self) -> EntityId;
}

/// Sorted, deduplicated set of entity ids.
pub(crate) type IdSet = SmallVec<[EntityId; 4]>;

fn insert_sorted(set: &mut IdSet, id: EntityId) {
    if let Err(pos) = set.binary_search(&id) {
        set.insert(pos, id);
    }
}

fn remove_sorted(set: &mut IdSet, id: EntityId) -> bool {
    match set.binary_search(&id) {
        Ok(pos) => {
            set.remove(pos);
            true
        }
        Err(_) => false,
    }
}

fn typed<T: 'static>(value: &dyn Any) -> &T {
    match value.downcast_ref::<T>() {
        Some(value) => value,
        None => panic!(
            "index for `{}` received a value of another type",
            std::any::type_name::<T>()
        ),
    }
}

/// Type-erased index interface used by the store.
///
/// Values are passed as `dyn Any` and must be of the indexed component type; anything
/// else is a bookkeeping bug and panics.
pub trait ComponentIndex: Send + Sync {
    /// Kind of this index.
    fn kind(&self) -> IndexKind;

    /// Record that `entity` holds `value`. Idempotent.
    fn insert(&mut self, entity: EntityId, value: &dyn Any);

    /// Forget that `entity` holds `value`. Absent mappings are ignored.
    fn remove(&mut self, entity: EntityId, value: &dyn Any);

    /// Entities holding a value equal to `value` (for links: pointing at the same target).
    fn entities_with(&self, value: &dyn Any) -> &[EntityId];

    /// Entities whose value lies within the bounds, in value order.
    ///
    /// `None` if this kind cannot answer range lookups.
    fn entities_in(&self, start: Bound<&dyn Any>, end: Bound<&dyn Any>) -> Option<Vec<EntityId>>;

    /// Distinct values currently held by at least one entity. A link index reports one
    /// value per distinct target.
    ///
    /// `None` if this kind does not keep values.
    fn values(&self) -> Option<Vec<&dyn Any>>;

    /// Entities pointing at `target`. `None` unless this is a link index.
    fn linked(&self, target: EntityId) -> Option<&[EntityId]>;

    /// Number of distinct keys.
    fn len(&self) -> usize;

    /// Check if no entity is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Equality index over a hashable component.
pub struct ValueIndex<T> {
    map: FxHashMap<T, IdSet>,
}

impl<T: Component + Hash + Eq> ValueIndex<T> {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }

    pub(crate) fn descriptor() -> IndexDescriptor {
        IndexDescriptor {
            kind: IndexKind::Value,
            create: || Box::new(Self::new()) as Box<dyn ComponentIndex>,
        }
    }
}

impl<T: Component + Hash + Eq> Default for ValueIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component + Hash + Eq> ComponentIndex for ValueIndex<T> {
    fn kind(&self) -> IndexKind {
        IndexKind::Value
    }

    fn insert(&mut self, entity: EntityId, value: &dyn Any) {
        let value = typed::<T>(value);
        insert_sorted(self.map.entry(value.clone()).or_default(), entity);
    }

    fn remove(&mut self, entity: EntityId, value: &dyn Any) {
        let value = typed::<T>(value);
        if let Some(set) = self.map.get_mut(value) {
            remove_sorted(set, entity);
            if set.is_empty() {
                self.map.remove(value);
            }
        }
    }

    fn entities_with(&self, value: &dyn Any) -> &[EntityId] {
        self.map
            .get(typed::<T>(value))
            .map(SmallVec::as_slice)
            .unwrap_or_default()
    }

    fn entities_in(&self, _start: Bound<&dyn Any>, _end: Bound<&dyn Any>) -> Option<Vec<EntityId>> {
        None
    }

    fn values(&self) -> Option<Vec<&dyn Any>> {
        Some(self.map.keys().map(|v| v as &dyn Any).collect())
    }

    fn linked(&self, _target: EntityId) -> Option<&[EntityId]> {
        None
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Ordered index over a totally ordered component.
pub struct RangeIndex<T> {
    map: BTreeMap<T, IdSet>,
}

impl<T: Component + Ord> RangeIndex<T> {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn descriptor() -> IndexDescriptor {
        IndexDescriptor {
            kind: IndexKind::Range,
            create: || Box::new(Self::new()) as Box<dyn ComponentIndex>,
        }
    }
}

impl<T: Component + Ord> Default for RangeIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `BTreeMap::range` panics on inverted or empty-exclusive bounds.
fn is_valid_range<T: Ord>(start: Bound<&T>, end: Bound<&T>) -> bool {
    match (start, end) {
        (Bound::Excluded(s), Bound::Excluded(e)) => s < e,
        (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
            s <= e
        }
        _ => true,
    }
}

impl<T: Component + Ord> ComponentIndex for RangeIndex<T> {
    fn kind(&self) -> IndexKind {
        IndexKind::Range
    }

    fn insert(&mut self, entity: EntityId, value: &dyn Any) {
        let value = typed::<T>(value);
        insert_sorted(self.map.entry(value.clone()).or_default(), entity);
    }

    fn remove(&mut self, entity: EntityId, value: &dyn Any) {
        let value = typed::<T>(value);
        if let Some(set) = self.map.get_mut(value) {
            remove_sorted(set, entity);
            if set.is_empty() {
                self.map.remove(value);
            }
        }
    }

    fn entities_with(&self, value: &dyn Any) -> &[EntityId] {
        self.map
            .get(typed::<T>(value))
            .map(SmallVec::as_slice)
            .unwrap_or_default()
    }

    fn entities_in(&self, start: Bound<&dyn Any>, end: Bound<&dyn Any>) -> Option<Vec<EntityId>> {
        let start = start.map(typed::<T>);
        let end = end.map(typed::<T>);
        if !is_valid_range(start, end) {
            return Some(Vec::new());
        }
        Some(
            self.map
                .range::<T, _>((start, end))
                .flat_map(|(_, set)| set.iter().copied())
                .collect(),
        )
    }

    fn values(&self) -> Option<Vec<&dyn Any>> {
        Some(self.map.keys().map(|v| v as &dyn Any).collect())
    }

    fn linked(&self, _target: EntityId) -> Option<&[EntityId]> {
        None
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Index from link target to the entities pointing at it.
///
/// Entries are not pruned when the target itself is deleted.
pub struct LinkIndex<T> {
    targets: FxHashMap<EntityId, LinkEntry<T>>,
}

/// Entities pointing at one target, plus the first value seen for it.
struct LinkEntry<T> {
    value: T,
    entities: IdSet,
}

impl<T: Component + Link> LinkIndex<T> {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            targets: FxHashMap::default(),
        }
    }

    pub(crate) fn descriptor() -> IndexDescriptor {
        IndexDescriptor {
            kind: IndexKind::Link,
            create: || Box::new(Self::new()) as Box<dyn ComponentIndex>,
        }
    }
}

impl<T: Component + Link> Default for LinkIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component + Link> ComponentIndex for LinkIndex<T> {
    fn kind(&self) -> IndexKind {
        IndexKind::Link
    }

    fn insert(&mut self, entity: EntityId, value: &dyn Any) {
        let value = typed::<T>(value);
        let entry = self
            .targets
            .entry(value.target())
            .or_insert_with(|| LinkEntry {
                value: value.clone(),
                entities: IdSet::new(),
            });
        insert_sorted(&mut entry.entities, entity);
    }

    fn remove(&mut self, entity: EntityId, value: &dyn Any) {
        let target = typed::<T>(value).target();
        if let Some(entry) = self.targets.get_mut(&target) {
            remove_sorted(&mut entry.entities, entity);
            if entry.entities.is_empty() {
                self.targets.remove(&target);
            }
        }
    }

    fn entities_with(&self, value: &dyn Any) -> &[EntityId] {
        self.linked(typed::<T>(value).target()).unwrap_or(&[])
    }

    fn entities_in(&self, _start: Bound<&dyn Any>, _end: Bound<&dyn Any>) -> Option<Vec<EntityId>> {
        None
    }

    /// One value per distinct target.
    fn values(&self) -> Option<Vec<&dyn Any>> {
        Some(
            self.targets
                .values()
                .map(|entry| &entry.value as &dyn Any)
                .collect(),
        )
    }

    fn linked(&self, target: EntityId) -> Option<&[EntityId]> {
        Some(
            self.targets
                .get(&target)
                .map(|entry| entry.entities.as_slice())
                .unwrap_or_default(),
        )
    }

    fn len(&self) -> usize {
        self.targets.len()
    }
}
