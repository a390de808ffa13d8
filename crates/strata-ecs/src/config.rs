//! Store configuration.

/// Configuration for an [`EntityStore`](crate::EntityStore).
///
/// ```
/// use strata_ecs::StoreConfig;
///
/// let config = StoreConfig::default()
///     .entity_capacity(10_000)
///     .recycle_ids(false);
/// assert_eq!(config.entity_capacity, 10_000);
/// ```
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Entities to reserve room for in the node table.
    pub entity_capacity: usize,
    /// Archetypes to reserve room for.
    pub archetype_capacity: usize,
    /// Whether ids of deleted entities are handed out again.
    pub recycle_ids: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 0,
            archetype_capacity: 16,
            recycle_ids: true,
        }
    }
}

impl StoreConfig {
    /// Set the initial entity capacity.
    #[must_use]
    pub fn entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    /// Set the initial archetype capacity.
    #[must_use]
    pub fn archetype_capacity(mut self, capacity: usize) -> Self {
        self.archetype_capacity = capacity;
        self
    }

    /// Enable or disable id recycling.
    #[must_use]
    pub fn recycle_ids(mut self, recycle: bool) -> Self {
        self.recycle_ids = recycle;
        self
    }
}
