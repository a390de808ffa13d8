//! Change events.
//!
//! Handlers are plain callbacks registered on an [`EntityStore`]. They run synchronously
//! on the thread that made the change, in registration order, right after the change is
//! applied. Handlers only see the event, never the store, so they cannot mutate it
//! while it is in the middle of an operation; record follow-up changes in a
//! [`CommandBuffer`](crate::CommandBuffer) instead.
//!
//! A panicking handler propagates out of the store call that fired it.

use crate::{
    component::ComponentId,
    entity::EntityId,
    signature::Tags,
    store::EntityStore,
};

/// Identifier returned when a handler is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// What happened to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    /// The component was added; the entity changed archetype.
    Add,
    /// An existing value was overwritten.
    Update,
    /// The component was removed; the entity changed archetype.
    Remove,
}

/// A component was added, updated or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentChanged {
    /// Affected entity.
    pub entity: EntityId,
    /// Component type.
    pub component: ComponentId,
    /// Component type name.
    pub name: &'static str,
    /// What happened.
    pub action: ComponentAction,
}

/// The tag set of an entity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagsChanged {
    /// Affected entity.
    pub entity: EntityId,
    /// Tags that were not present before.
    pub added: Tags,
    /// Tags that are no longer present.
    pub removed: Tags,
}

/// Whether a child entered or left a child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAction {
    /// The child was appended at `index`, the end of the list.
    Add,
    /// The child was inserted at `index` by [`EntityStore::insert_child`].
    Insert,
    /// The child was removed from `index`.
    Remove,
}

/// The child list of an entity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildEntitiesChanged {
    /// Entity owning the child list.
    pub parent: EntityId,
    /// Child that was added or removed.
    pub child: EntityId,
    /// Position in the child list.
    pub index: usize,
    /// What happened.
    pub action: ChildAction,
}

/// What happened to a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    /// A script was attached.
    Add,
    /// A script replaced one of the same type.
    Replace,
    /// A script was detached.
    Remove,
}

/// A script was attached, replaced or detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptChanged {
    /// Affected entity.
    pub entity: EntityId,
    /// Script type name.
    pub script: &'static str,
    /// What happened.
    pub action: ScriptAction,
}

/// An entity was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityCreated {
    /// The new entity.
    pub entity: EntityId,
}

/// An entity is about to be deleted. Its components are still readable when this fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDeleted {
    /// The entity being deleted.
    pub entity: EntityId,
}

type Handler<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Ordered handler list for one event type.
pub(crate) struct Handlers<E> {
    entries: Vec<(HandlerId, Handler<E>)>,
}

impl<E> Default for Handlers<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E> Handlers<E> {
    fn push(&mut self, id: HandlerId, handler: Handler<E>) {
        self.entries.push((id, handler));
    }

    fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Run every handler in registration order.
    pub(crate) fn fire(&self, event: &E) {
        for (_, handler) in &self.entries {
            handler(event);
        }
    }
}

/// All handler lists of a store.
#[derive(Default)]
pub(crate) struct EventHub {
    next_id: u64,
    pub(crate) component_added: Handlers<ComponentChanged>,
    pub(crate) component_removed: Handlers<ComponentChanged>,
    pub(crate) tags_changed: Handlers<TagsChanged>,
    pub(crate) child_entities_changed: Handlers<ChildEntitiesChanged>,
    pub(crate) script_added: Handlers<ScriptChanged>,
    pub(crate) script_removed: Handlers<ScriptChanged>,
    pub(crate) entity_created: Handlers<EntityCreated>,
    pub(crate) entity_deleted: Handlers<EntityDeleted>,
}

impl EventHub {
    fn next_id(&mut self) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        id
    }

    fn remove(&mut self, id: HandlerId) -> bool {
        self.component_added.remove(id)
            || self.component_removed.remove(id)
            || self.tags_changed.remove(id)
            || self.child_entities_changed.remove(id)
            || self.script_added.remove(id)
            || self.script_removed.remove(id)
            || self.entity_created.remove(id)
            || self.entity_deleted.remove(id)
    }

    pub(crate) fn component_changed(&self, event: ComponentChanged) {
        match event.action {
            ComponentAction::Add | ComponentAction::Update => self.component_added.fire(&event),
            ComponentAction::Remove => self.component_removed.fire(&event),
        }
    }

    pub(crate) fn script_changed(&self, event: ScriptChanged) {
        match event.action {
            ScriptAction::Add | ScriptAction::Replace => self.script_added.fire(&event),
            ScriptAction::Remove => self.script_removed.fire(&event),
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("component_added", &self.component_added.entries.len())
            .field("component_removed", &self.component_removed.entries.len())
            .field("tags_changed", &self.tags_changed.entries.len())
            .field(
                "child_entities_changed",
                &self.child_entities_changed.entries.len(),
            )
            .field("script_added", &self.script_added.entries.len())
            .field("script_removed", &self.script_removed.entries.len())
            .field("entity_created", &self.entity_created.entries.len())
            .field("entity_deleted", &self.entity_deleted.entries.len())
            .finish()
    }
}

macro_rules! subscribe {
    ($(#[$meta:meta])* $method:ident, $list:ident, $event:ty) => {
        $(#[$meta])*
        pub fn $method<F>(&mut self, handler: F) -> HandlerId
        where
            F: Fn(&$event) + Send + Sync + 'static,
        {
            let id = self.events.next_id();
            self.events.$list.push(id, Box::new(handler));
            id
        }
    };
}

impl EntityStore {
    subscribe!(
        /// Run `handler` when a component is added or an existing value is overwritten
        /// (`Add` and `Update` actions).
        on_component_added,
        component_added,
        ComponentChanged
    );

    subscribe!(
        /// Run `handler` when a component is removed.
        on_component_removed,
        component_removed,
        ComponentChanged
    );

    subscribe!(
        /// Run `handler` when an entity's tag set changes.
        on_tags_changed,
        tags_changed,
        TagsChanged
    );

    subscribe!(
        /// Run `handler` when a child list gains or loses an entry.
        on_child_entities_changed,
        child_entities_changed,
        ChildEntitiesChanged
    );

    subscribe!(
        /// Run `handler` when a script is attached or replaced.
        on_script_added,
        script_added,
        ScriptChanged
    );

    subscribe!(
        /// Run `handler` when a script is detached.
        on_script_removed,
        script_removed,
        ScriptChanged
    );

    subscribe!(
        /// Run `handler` after an entity is created.
        on_entity_created,
        entity_created,
        EntityCreated
    );

    subscribe!(
        /// Run `handler` before an entity is deleted.
        on_entity_deleted,
        entity_deleted,
        EntityDeleted
    );

    /// Unregister a handler. Returns `false` if the id is unknown.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        self.events.remove(id)
    }
}
