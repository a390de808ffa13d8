// Allow unsafe code in ECS - necessary for low-level component storage
#![allow(unsafe_code)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::ptr_as_ptr)]
#![allow(clippy::ref_as_ptr)]
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::float_cmp)]

//! Strata ECS - archetype-based entity storage and query engine.
//!
//! Entities with the same set of components and tags share one table (an archetype)
//! with a dense column per component, so iteration over many uniformly shaped
//! entities touches contiguous memory.
//!
//! # Key Concepts
//!
//! - **Schema**: the frozen set of component and tag types, built once up front
//! - **Entity**: a reusable 32-bit id
//! - **Component**: a plain value attached to an entity (e.g., Position, Velocity)
//! - **Tag**: a zero-sized marker that only changes the entity's archetype
//! - **Archetype**: a table of entities with identical signatures
//! - **Index**: value, range or link lookup over one component type
//! - **Command buffer**: structural changes recorded during iteration, applied later
//!
//! # Example
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Component, Default, Clone, Copy, Debug, PartialEq)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//!
//! #[derive(Component, Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! struct Team(u8);
//!
//! #[derive(Tag)]
//! struct Player;
//!
//! let mut builder = Schema::builder();
//! builder.component::<Position>()?;
//! builder.value_index::<Team>()?;
//! builder.tag::<Player>()?;
//! let mut store = EntityStore::new(builder.build());
//!
//! let parent = store.create_entity();
//! let child = store.create_entity();
//! store.add_component(child, Position { x: 1.0, y: 2.0 })?;
//! store.add_component(child, Team(3))?;
//! store.add_tag::<Player>(child)?;
//! store.add_child(parent, child)?;
//!
//! let players = store.query().with_tag::<Player>().build()?;
//! assert_eq!(players.count(&store)?, 1);
//! assert_eq!(store.entities_with_value(&Team(3))?, &[child]);
//! assert_eq!(store.parent_of(child), Some(parent));
//! # Ok::<(), strata_ecs::EcsError>(())
//! ```
//!
//! # Compile-time checks
//!
//! Components must be flat values:
//!
//! ```compile_fail
//! use strata_ecs::Component;
//!
//! #[derive(Component, Default, Clone)]
//! struct Inventory {
//!     items: Vec<u32>,
//! }
//! ```
//!
//! ```compile_fail
//! use strata_ecs::Component;
//!
//! #[derive(Component, Default, Clone)]
//! struct Name(String);
//! ```
//!
//! ```compile_fail
//! use strata_ecs::Component;
//!
//! #[derive(Component, Clone)]
//! struct Borrowed<'a> {
//!     value: &'a u32,
//! }
//! ```
//!
//! Tags carry no data:
//!
//! ```compile_fail
//! use strata_ecs::Tag;
//!
//! #[derive(Tag)]
//! struct Level(u32);
//! ```

#[allow(unused_extern_crates)]
extern crate self as strata_ecs;

mod archetype;
mod chunk;
mod command;
mod component;
mod config;
mod entity;
mod error;
mod event;
mod index;
mod query;
mod schema;
mod script;
mod signature;
mod storage;
mod store;
mod tree;

pub use archetype::{Archetype, ArchetypeId, ArchetypeStorage, MovedEntity};
pub use chunk::{Chunk, ChunkQuery};
pub use command::{CommandBuffer, PlaybackStats};
pub use component::{
    Component, ComponentId, ComponentInfo, ComponentRegistry, MAX_COMPONENT_TYPES, MAX_TAG_TYPES,
    Tag, TagId, TagInfo, TagRegistry,
};
pub use config::StoreConfig;
pub use entity::{EntityId, IdReserver};
pub use error::{CommandFailure, EcsError, EcsResult, SchemaError};
pub use event::{
    ChildAction, ChildEntitiesChanged, ComponentAction, ComponentChanged, EntityCreated,
    EntityDeleted, HandlerId, ScriptAction, ScriptChanged, TagsChanged,
};
pub use index::{ComponentIndex, IndexKind, Link, LinkIndex, RangeIndex, ValueIndex};
pub use query::{Query, QueryBuilder, QueryEntities};
pub use schema::{Schema, SchemaBuilder};
pub use script::Script;
pub use signature::{ComponentTypes, Signature, Tags};
pub use storage::Column;
pub use store::{EntityLocation, EntityStore};
pub use strata_ecs_derive::{Component, Tag};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Component, EcsError, EcsResult, EntityId, EntityStore, Link, Schema, Script, Tag,
    };
}
