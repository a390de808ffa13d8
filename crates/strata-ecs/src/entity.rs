//! Entity identifiers and id allocation.
//!
//! Entities are plain 32-bit ids. A deleted id goes onto a free list and is handed
//! out again by a later `create_entity`, so a stored id is only meaningful while the
//! entity is alive.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

/// Handle of an entity in an [`EntityStore`](crate::EntityStore).
///
/// Id `0` is reserved and never names an entity. Fresh ids start at `1` and end at
/// [`EntityId::MAX`]; `u32::MAX` marks an exhausted id space and is never handed out.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(u32);

impl EntityId {
    /// The reserved "no entity" id.
    pub const NONE: Self = Self(0);

    /// The largest id that can name an entity.
    pub const MAX: Self = Self(u32::MAX - 1);

    /// Create an id from its raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into per-entity tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if the id can name an entity at all.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= Self::MAX.0
    }

    /// Check if this is the reserved id `0`.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Hands out fresh entity ids without access to the store.
///
/// Shared between a store and its command buffers so that `CommandBuffer::create_entity`
/// can return an id immediately while the entity itself is created on playback.
#[derive(Clone, Debug)]
pub struct IdReserver {
    next: Arc<AtomicU32>,
}

impl IdReserver {
    fn new() -> Self {
        Self {
            next: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Reserve an id that the store will never hand out on its own.
    ///
    /// Returns `None` once every id up to [`EntityId::MAX`] has been taken. The counter
    /// never wraps, so an id reserved here is never handed out a second time.
    pub fn try_reserve(&self) -> Option<EntityId> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| {
                (next <= EntityId::MAX.0).then_some(next + 1)
            })
            .ok()
            .map(EntityId)
    }

    /// Reserve an id that the store will never hand out on its own.
    ///
    /// # Panics
    ///
    /// Panics if the id space is exhausted (see [`try_reserve`](Self::try_reserve)).
    pub fn reserve(&self) -> EntityId {
        match self.try_reserve() {
            Some(id) => id,
            None => panic!("entity id space exhausted: every id up to {} is taken", EntityId::MAX),
        }
    }

    /// Make sure fresh ids are allocated above `id`. `id` must be valid.
    fn bump_past(&self, id: EntityId) {
        debug_assert!(id.is_valid());
        self.next.fetch_max(id.raw() + 1, Ordering::Relaxed);
    }

    /// The next id [`reserve`](Self::reserve) would return.
    #[must_use]
    pub fn peek(&self) -> EntityId {
        EntityId(self.next.load(Ordering::Relaxed))
    }
}

/// Allocator for entity ids.
///
/// Recycled ids are popped from a free list first; otherwise a fresh id is taken from
/// the shared [`IdReserver`]. Explicitly created ids push the fresh counter past them.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    /// Free list of deleted ids.
    free_list: Vec<EntityId>,
    /// Source of fresh ids.
    reserver: IdReserver,
    /// Whether deleted ids are reused.
    recycle: bool,
}

impl IdAllocator {
    pub(crate) fn new(recycle: bool) -> Self {
        Self {
            free_list: Vec::new(),
            reserver: IdReserver::new(),
            recycle,
        }
    }

    /// Allocate an id that `is_alive` reports as unused.
    ///
    /// The free list can hold ids that were later claimed explicitly, so every
    /// candidate is checked.
    ///
    /// # Panics
    ///
    /// Panics if the free list is empty and the fresh id space is exhausted.
    pub(crate) fn allocate(&mut self, is_alive: impl Fn(EntityId) -> bool) -> EntityId {
        if self.recycle {
            while let Some(id) = self.free_list.pop() {
                if !is_alive(id) {
                    return id;
                }
            }
        }

        loop {
            let id = self.reserver.reserve();
            if !is_alive(id) {
                return id;
            }
        }
    }

    /// Record that `id` was created explicitly.
    pub(crate) fn claim(&mut self, id: EntityId) {
        self.reserver.bump_past(id);
    }

    /// Return a deleted id to the free list.
    pub(crate) fn release(&mut self, id: EntityId) {
        if self.recycle {
            self.free_list.push(id);
        }
    }

    pub(crate) fn reserver(&self) -> IdReserver {
        self.reserver.clone()
    }

    /// Number of ids waiting for reuse.
    pub(crate) fn free_count(&self) -> usize {
        self.free_list.len()
    }
}
