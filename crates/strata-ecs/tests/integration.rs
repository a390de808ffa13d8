//! Integration tests for strata-ecs

use std::sync::Arc;

use parking_lot::Mutex;
use strata_ecs::{
    ChildAction, Component, ComponentAction, EcsError, EntityId, EntityStore, Link, Schema,
    Script, ScriptAction, Signature, StoreConfig, Tag,
};

// ============================================================================
// Test Components
// ============================================================================

#[derive(Component, Default, Clone, Copy, Debug, PartialEq)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

impl Position {
    const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Rotation {
    x: f32,
    y: f32,
    z: f32,
    w: f32,
}

impl Rotation {
    const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Component, Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Team(u8);

#[derive(Component, Default, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Level(u32);

#[derive(Component, Default, Clone, Copy, Debug, PartialEq, Eq)]
struct Target(EntityId);

impl Link for Target {
    fn target(&self) -> EntityId {
        self.0
    }
}

#[derive(Tag)]
struct Player;

#[derive(Tag)]
struct Frozen;

#[derive(Debug, PartialEq)]
struct Greeter {
    greeting: String,
}

impl Script for Greeter {}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn schema() -> Arc<Schema> {
    let mut builder = Schema::builder();
    builder.component::<Position>().unwrap();
    builder.component::<Rotation>().unwrap();
    builder.value_index::<Team>().unwrap();
    builder.range_index::<Level>().unwrap();
    builder.link_index::<Target>().unwrap();
    builder.tag::<Player>().unwrap();
    builder.tag::<Frozen>().unwrap();
    builder.build()
}

fn store() -> EntityStore {
    init_tracing();
    EntityStore::new(schema())
}

// ============================================================================
// Archetype Migration
// ============================================================================

#[test]
fn test_component_add_moves_entity_between_archetypes() {
    let mut store = store();
    let schema = Arc::clone(store.schema());
    let pos = schema.component_id::<Position>().unwrap();
    let rot = schema.component_id::<Rotation>().unwrap();

    let entity = store.create_entity_with_id(EntityId::new(1)).unwrap();
    store
        .add_component(entity, Position::new(1.0, 1.0, 1.0))
        .unwrap();

    let position_only = store.archetype_of(entity).unwrap();
    assert_eq!(
        store.signature_of(entity).unwrap(),
        Signature::EMPTY.with_component(pos)
    );
    assert_eq!(store.entity_location(entity).unwrap().row, 0);
    assert_eq!(
        store.get_component::<Position>(entity).unwrap(),
        &Position::new(1.0, 1.0, 1.0)
    );

    store.add_component(entity, Rotation::IDENTITY).unwrap();

    let both = store.archetype_of(entity).unwrap();
    assert_ne!(both, position_only);
    assert_eq!(
        store.signature_of(entity).unwrap(),
        Signature::EMPTY.with_component(pos).with_component(rot)
    );
    assert_eq!(store.entity_location(entity).unwrap().row, 0);
    assert!(store.archetype(position_only).unwrap().is_empty());

    // The emptied archetype is skipped, the superset still matches
    let query = store.query().with::<Position>().build().unwrap();
    let matched: Vec<_> = query.archetypes(&store).map(|a| a.id()).collect();
    assert_eq!(matched, vec![both]);
    assert_eq!(query.entities(&store).unwrap().collect::<Vec<_>>(), vec![
        entity
    ]);
    assert_eq!(
        store.get_component::<Position>(entity).unwrap(),
        &Position::new(1.0, 1.0, 1.0)
    );
    assert_eq!(
        store.get_component::<Rotation>(entity).unwrap(),
        &Rotation::IDENTITY
    );
}

#[test]
fn test_delete_relocates_last_row() {
    let mut store = store();

    let first = store.create_entity_with_id(EntityId::new(10)).unwrap();
    let second = store.create_entity_with_id(EntityId::new(11)).unwrap();
    store
        .add_component(first, Position::new(10.0, 0.0, 0.0))
        .unwrap();
    store
        .add_component(second, Position::new(11.0, 0.0, 0.0))
        .unwrap();
    assert_eq!(store.entity_location(first).unwrap().row, 0);
    assert_eq!(store.entity_location(second).unwrap().row, 1);

    store.delete_entity(first).unwrap();

    assert!(!store.is_alive(first));
    assert_eq!(store.entity_location(second).unwrap().row, 0);
    assert_eq!(
        store.get_component::<Position>(second).unwrap(),
        &Position::new(11.0, 0.0, 0.0)
    );
    assert_eq!(
        store.get_component::<Position>(first),
        Err(EcsError::EntityNotFound(first))
    );
}

#[test]
fn test_deleted_ids_are_recycled() {
    let mut store = store();

    let a = store.create_entity();
    store.delete_entity(a).unwrap();
    let b = store.create_entity();
    assert_eq!(a, b);
    assert!(store.get_component::<Position>(b).is_err());
}

#[test]
fn test_recycling_can_be_disabled() {
    init_tracing();
    let mut store = EntityStore::with_config(schema(), StoreConfig::default().recycle_ids(false));

    let a = store.create_entity();
    store.delete_entity(a).unwrap();
    let b = store.create_entity();
    assert_ne!(a, b);
}

#[test]
fn test_final_signature_is_net_of_adds_and_removes() {
    let mut store = store();
    let schema = Arc::clone(store.schema());
    let team = schema.component_id::<Team>().unwrap();
    let rot = schema.component_id::<Rotation>().unwrap();

    let first = store.create_entity();
    store.add_component(first, Position::default()).unwrap();
    store.add_component(first, Team(1)).unwrap();
    store.add_tag::<Player>(first).unwrap();
    store.remove_component::<Position>(first).unwrap();
    store.add_component(first, Rotation::IDENTITY).unwrap();
    store.remove_tag::<Player>(first).unwrap();

    let second = store.create_entity();
    store.add_component(second, Rotation::IDENTITY).unwrap();
    store.add_tag::<Player>(second).unwrap();
    store.add_component(second, Position::default()).unwrap();
    store.remove_tag::<Player>(second).unwrap();
    store.add_component(second, Team(1)).unwrap();
    store.remove_component::<Position>(second).unwrap();

    let expected = Signature::EMPTY.with_component(team).with_component(rot);
    assert_eq!(store.signature_of(first).unwrap(), expected);
    assert_eq!(store.signature_of(second).unwrap(), expected);
    assert_eq!(
        store.archetype_of(first).unwrap(),
        store.archetype_of(second).unwrap()
    );
}

#[test]
fn test_add_then_remove_restores_archetype() {
    let mut store = store();
    let e = store.create_entity();
    store.add_component(e, Team(4)).unwrap();
    let before = store.archetype_of(e).unwrap();

    store.add_component(e, Position::new(1.0, 2.0, 3.0)).unwrap();
    store.add_tag::<Frozen>(e).unwrap();
    assert_ne!(store.archetype_of(e).unwrap(), before);
    store.remove_tag::<Frozen>(e).unwrap();
    assert_eq!(
        store.remove_component::<Position>(e).unwrap(),
        Some(Position::new(1.0, 2.0, 3.0))
    );

    assert_eq!(store.archetype_of(e).unwrap(), before);
    assert_eq!(store.get_component::<Team>(e).unwrap(), &Team(4));
}

#[test]
fn test_largest_id_is_usable_and_u32_max_is_rejected() {
    let mut store = store();
    let beyond = EntityId::new(u32::MAX);

    assert_eq!(
        store.create_entity_with_id(beyond),
        Err(EcsError::InvalidEntityId(beyond))
    );
    assert!(!store.is_alive(beyond));

    let last = store.create_entity_with_id(EntityId::MAX).unwrap();
    store.add_component(last, Team(9)).unwrap();
    assert_eq!(store.get_component::<Team>(last).unwrap(), &Team(9));
}

#[test]
fn test_explicit_max_id_never_recycles_reserved_ids() {
    let mut store = store();
    let mut commands = store.command_buffer();
    let reserved = commands.create_entity();
    commands
        .add_component(reserved, Position::new(5.0, 0.0, 0.0))
        .unwrap();

    let last = store.create_entity_with_id(EntityId::MAX).unwrap();
    store.delete_entity(last).unwrap();

    // The fresh id space is used up, so only the deleted id comes back
    let fresh = store.create_entity();
    assert_eq!(fresh, last);
    assert_ne!(fresh, reserved);

    commands.playback(&mut store).unwrap();
    assert_eq!(
        store.get_component::<Position>(reserved).unwrap(),
        &Position::new(5.0, 0.0, 0.0)
    );
    assert!(!store.has_component::<Position>(fresh));
}

#[test]
#[should_panic(expected = "entity id space exhausted")]
fn test_exhausted_id_space_panics_instead_of_wrapping() {
    let mut store = store();
    store.create_entity_with_id(EntityId::MAX).unwrap();
    let _ = store.create_entity();
}

// ============================================================================
// Tree Tests
// ============================================================================

#[test]
fn test_self_parenting_rejected() {
    let mut store = store();
    let five = store.create_entity_with_id(EntityId::new(5)).unwrap();

    assert_eq!(
        store.add_child(five, five),
        Err(EcsError::TreeCycle {
            parent: five,
            child: five
        })
    );
    assert_eq!(store.parent_of(five), None);
    assert!(store.children_of(five).is_empty());
}

#[test]
fn test_indirect_cycle_rejected_without_changes() {
    let mut store = store();
    let five = store.create_entity_with_id(EntityId::new(5)).unwrap();
    let seven = store.create_entity_with_id(EntityId::new(7)).unwrap();

    store.add_child(five, seven).unwrap();
    assert_eq!(
        store.add_child(seven, five),
        Err(EcsError::TreeCycle {
            parent: seven,
            child: five
        })
    );
    assert_eq!(
        store.insert_child(seven, 0, five),
        Err(EcsError::TreeCycle {
            parent: seven,
            child: five
        })
    );

    assert_eq!(store.parent_of(seven), Some(five));
    assert_eq!(store.parent_of(five), None);
    assert_eq!(store.children_of(five), &[seven]);
    assert!(store.children_of(seven).is_empty());
}

#[test]
fn test_deleting_parent_floats_children() {
    let mut store = store();
    let root = store.create_entity();
    let a = store.create_entity();
    let b = store.create_entity();
    store.add_child(root, a).unwrap();
    store.add_child(root, b).unwrap();

    store.delete_entity(root).unwrap();

    assert_eq!(store.parent_of(a), None);
    assert_eq!(store.parent_of(b), None);
    assert!(store.is_alive(a));
    assert!(store.is_alive(b));
}

type ChildLog = Arc<Mutex<Vec<(EntityId, EntityId, usize, ChildAction)>>>;

fn record_child_events(store: &mut EntityStore) -> ChildLog {
    let log: ChildLog = Arc::default();
    let sink = Arc::clone(&log);
    store.on_child_entities_changed(move |event| {
        sink.lock()
            .push((event.parent, event.child, event.index, event.action));
    });
    log
}

#[test]
fn test_insert_child_reports_insert_at_index() {
    let mut store = store();
    let parent = store.create_entity();
    let a = store.create_entity();
    let b = store.create_entity();
    let c = store.create_entity();
    let log = record_child_events(&mut store);

    assert_eq!(store.add_child(parent, a).unwrap(), 0);
    assert_eq!(store.add_child(parent, b).unwrap(), 1);
    store.insert_child(parent, 1, c).unwrap();

    assert_eq!(store.children_of(parent), &[a, c, b]);
    assert_eq!(*log.lock(), vec![
        (parent, a, 0, ChildAction::Add),
        (parent, b, 1, ChildAction::Add),
        (parent, c, 1, ChildAction::Insert),
    ]);
}

#[test]
fn test_reordering_within_parent_reports_remove_then_insert() {
    let mut store = store();
    let parent = store.create_entity();
    let a = store.create_entity();
    let b = store.create_entity();
    let c = store.create_entity();
    for child in [a, b, c] {
        store.add_child(parent, child).unwrap();
    }
    let log = record_child_events(&mut store);

    store.insert_child(parent, 0, c).unwrap();

    assert_eq!(store.children_of(parent), &[c, a, b]);
    assert_eq!(*log.lock(), vec![
        (parent, c, 2, ChildAction::Remove),
        (parent, c, 0, ChildAction::Insert),
    ]);
}

#[test]
fn test_reattaching_child_reports_old_parent_first() {
    let mut store = store();
    let old_parent = store.create_entity();
    let new_parent = store.create_entity();
    let sibling = store.create_entity();
    let child = store.create_entity();
    store.add_child(old_parent, sibling).unwrap();
    store.add_child(old_parent, child).unwrap();
    let log = record_child_events(&mut store);

    store.add_child(new_parent, child).unwrap();

    assert_eq!(store.parent_of(child), Some(new_parent));
    assert_eq!(store.children_of(old_parent), &[sibling]);
    assert_eq!(*log.lock(), vec![
        (old_parent, child, 1, ChildAction::Remove),
        (new_parent, child, 0, ChildAction::Add),
    ]);
}

#[test]
fn test_remove_child_reports_former_index() {
    let mut store = store();
    let parent = store.create_entity();
    let a = store.create_entity();
    let b = store.create_entity();
    store.add_child(parent, a).unwrap();
    store.add_child(parent, b).unwrap();
    let log = record_child_events(&mut store);

    assert!(store.remove_child(parent, a).unwrap());
    assert!(!store.remove_child(parent, a).unwrap());

    assert_eq!(store.parent_of(a), None);
    assert_eq!(store.children_of(parent), &[b]);
    assert_eq!(*log.lock(), vec![(parent, a, 0, ChildAction::Remove)]);
}

// ============================================================================
// Command Buffer Tests
// ============================================================================

#[test]
fn test_add_then_set_is_one_structural_change() {
    let mut store = store();
    let entity = store.create_entity();

    let added = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&added);
    store.on_component_added(move |event| log.lock().push(event.action));

    let mut commands = store.command_buffer();
    commands
        .add_component(entity, Position::new(1.0, 0.0, 0.0))
        .unwrap();
    commands
        .set_component(entity, Position::new(2.0, 0.0, 0.0))
        .unwrap();
    assert_eq!(commands.len(), 1);

    let stats = commands.playback(&mut store).unwrap();
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.coalesced, 1);
    assert_eq!(
        store.get_component::<Position>(entity).unwrap(),
        &Position::new(2.0, 0.0, 0.0)
    );
    assert_eq!(*added.lock(), vec![ComponentAction::Add]);
}

#[test]
fn test_structural_changes_recorded_during_iteration() {
    let mut store = store();
    for i in 0..4 {
        let e = store.create_entity();
        store.add_component(e, Level(i)).unwrap();
    }

    let query = store.query().with::<Level>().build().unwrap();
    let mut commands = store.command_buffer();
    for chunk in query.chunks::<(Level,)>(&store).unwrap() {
        for (&entity, level) in chunk.entities.iter().zip(chunk.components.0) {
            if level.0 % 2 == 0 {
                commands.add_tag::<Frozen>(entity).unwrap();
            }
        }
    }
    let spawned = commands.create_entity();
    commands.add_component(spawned, Level(99)).unwrap();
    commands.playback(&mut store).unwrap();

    let frozen = store.query().with_tag::<Frozen>().build().unwrap();
    assert_eq!(frozen.count(&store).unwrap(), 2);
    assert_eq!(store.get_component::<Level>(spawned).unwrap(), &Level(99));
}

#[test]
fn test_playback_reports_failures_and_applies_the_rest() {
    let mut store = store();
    let alive = store.create_entity();
    let dead = store.create_entity();
    store.delete_entity(dead).unwrap();

    let mut commands = store.command_buffer();
    commands.add_component(dead, Team(1)).unwrap();
    commands.add_component(alive, Team(2)).unwrap();

    let Err(EcsError::Playback(failures)) = commands.playback(&mut store) else {
        panic!("expected playback failure");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].position, 0);
    assert_eq!(failures[0].entity, dead);
    assert_eq!(store.get_component::<Team>(alive).unwrap(), &Team(2));
    assert!(commands.is_empty());
}

// ============================================================================
// Query Tests
// ============================================================================

#[test]
fn test_query_visits_every_matching_entity_once() {
    let mut store = store();
    let mut expected = Vec::new();

    for i in 0..30_u32 {
        let e = store.create_entity();
        if i % 2 == 0 {
            store.add_component(e, Position::default()).unwrap();
        }
        if i % 3 == 0 {
            store.add_component(e, Rotation::IDENTITY).unwrap();
        }
        if i % 5 == 0 {
            store.add_tag::<Player>(e).unwrap();
        }
        if i % 2 == 0 && i % 5 != 0 {
            expected.push(e);
        }
    }

    let query = store
        .query()
        .with::<Position>()
        .without_tag::<Player>()
        .build()
        .unwrap();
    let mut found: Vec<_> = query.entities(&store).unwrap().collect();
    found.sort();
    assert_eq!(found, expected);
    assert_eq!(query.count(&store).unwrap(), expected.len());
}

#[test]
fn test_query_sees_archetypes_created_after_build() {
    let mut store = store();
    let query = store.query().with::<Position>().build().unwrap();
    assert_eq!(query.count(&store).unwrap(), 0);

    let e = store.create_entity();
    store.add_component(e, Position::default()).unwrap();
    store.add_tag::<Frozen>(e).unwrap();

    assert_eq!(query.count(&store).unwrap(), 1);
}

#[test]
fn test_value_filters_use_indices() {
    let mut store = store();
    let mut red = Vec::new();

    for i in 0..12_u32 {
        let e = store.create_entity();
        store.add_component(e, Team((i % 3) as u8)).unwrap();
        store.add_component(e, Level(i)).unwrap();
        if i % 3 == 0 && (4..=9).contains(&i) {
            red.push(e);
        }
    }

    let query = store
        .query()
        .has_value(Team(0))
        .value_in_range(Level(4)..=Level(9))
        .build()
        .unwrap();
    let found: Vec<_> = query.entities(&store).unwrap().collect();
    assert_eq!(found, red);

    let linked = store.query().value_in_range(Target::default()..).build();
    assert!(matches!(
        linked,
        Err(EcsError::NotSupportedByIndex { .. })
    ));
}

#[test]
fn test_chunks_mut_writes_through() {
    let mut store = store();
    for i in 0..8 {
        let e = store.create_entity();
        store
            .add_component(e, Position::new(i as f32, 0.0, 0.0))
            .unwrap();
        if i % 2 == 0 {
            store.add_component(e, Rotation::IDENTITY).unwrap();
        }
    }

    let query = store.query().build().unwrap();
    for chunk in query.chunks_mut::<(Position,)>(&mut store).unwrap() {
        for pos in chunk.components.0.iter_mut() {
            pos.y = pos.x * 2.0;
        }
    }

    let all = store.query().with::<Position>().build().unwrap();
    let entities: Vec<_> = all.entities(&store).unwrap().collect();
    assert_eq!(entities.len(), 8);
    for e in entities {
        let pos = store.get_component::<Position>(e).unwrap();
        assert_eq!(pos.y, pos.x * 2.0);
    }
}

// ============================================================================
// Index Tests
// ============================================================================

#[test]
fn test_link_index_follows_component_changes() {
    let mut store = store();
    let boss = store.create_entity();
    let a = store.create_entity();
    let b = store.create_entity();

    store.add_component(a, Target(boss)).unwrap();
    store.add_component(b, Target(boss)).unwrap();
    assert_eq!(store.linked_entities::<Target>(boss).unwrap(), &[a, b]);

    store.set_component(a, Target(b)).unwrap();
    assert_eq!(store.linked_entities::<Target>(boss).unwrap(), &[b]);
    assert_eq!(store.linked_entities::<Target>(b).unwrap(), &[a]);

    store.delete_entity(b).unwrap();
    assert!(store.linked_entities::<Target>(boss).unwrap().is_empty());
}

#[test]
fn test_indexed_component_cannot_be_mutated_in_place() {
    let mut store = store();
    let e = store.create_entity();
    store.add_component(e, Team(1)).unwrap();

    assert!(matches!(
        store.get_component_mut::<Team>(e),
        Err(EcsError::IndexedComponentMutation(_))
    ));
    assert!(store.get_component_mut::<Position>(e).is_err());
}

// ============================================================================
// Script Tests
// ============================================================================

#[test]
fn test_scripts_follow_entity_lifetime() {
    let mut store = store();
    let e = store.create_entity();

    let removed = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&removed);
    store.on_script_removed(move |event| log.lock().push((event.entity, event.action)));

    let greeter = Greeter {
        greeting: "hello".to_owned(),
    };
    assert_eq!(store.add_script(e, greeter).unwrap(), None);
    assert_eq!(store.get_script::<Greeter>(e).unwrap().greeting, "hello");

    store.delete_entity(e).unwrap();

    assert_eq!(*removed.lock(), vec![(e, ScriptAction::Remove)]);
    assert!(store.get_script::<Greeter>(e).is_none());
}

// ============================================================================
// Schema Mismatch Tests
// ============================================================================

fn reordered_schema() -> Arc<Schema> {
    let mut builder = Schema::builder();
    builder.component::<Rotation>().unwrap();
    builder.component::<Position>().unwrap();
    builder.build()
}

#[test]
fn test_query_rejects_store_with_other_schema() {
    let mut home = store();
    let mut other = EntityStore::new(reordered_schema());
    for store in [&mut home, &mut other] {
        let e = store.create_entity();
        store.add_component(e, Position::default()).unwrap();
    }

    let query = home.query().with::<Position>().build().unwrap();
    assert_eq!(query.count(&home).unwrap(), 1);

    assert_eq!(query.count(&other), Err(EcsError::SchemaMismatch));
    assert_eq!(query.entities(&other).err(), Some(EcsError::SchemaMismatch));
    assert_eq!(
        query.chunks::<(Position,)>(&other).err(),
        Some(EcsError::SchemaMismatch)
    );
    assert_eq!(
        query.chunks_mut::<(Position,)>(&mut other).err(),
        Some(EcsError::SchemaMismatch)
    );

    let indexed = home.query().has_value(Team(1)).build().unwrap();
    assert_eq!(indexed.entities(&other).err(), Some(EcsError::SchemaMismatch));
}

#[test]
fn test_query_runs_on_stores_sharing_a_schema() {
    let schema = schema();
    let mut first = EntityStore::new(Arc::clone(&schema));
    let mut second = EntityStore::new(schema);
    let e = second.create_entity();
    second.add_component(e, Position::default()).unwrap();
    first.create_entity();

    let query = first.query().with::<Position>().build().unwrap();
    assert_eq!(query.count(&first).unwrap(), 0);
    assert_eq!(query.count(&second).unwrap(), 1);
}

#[test]
fn test_playback_rejects_store_with_other_schema() {
    let mut home = store();
    let mut other = EntityStore::new(reordered_schema());

    let mut commands = home.command_buffer();
    let e = commands.create_entity();
    commands.add_component(e, Position::new(1.0, 0.0, 0.0)).unwrap();

    assert_eq!(commands.playback(&mut other), Err(EcsError::SchemaMismatch));
    assert_eq!(other.entity_count(), 0);
    assert_eq!(commands.len(), 2);

    commands.playback(&mut home).unwrap();
    assert_eq!(
        home.get_component::<Position>(e).unwrap(),
        &Position::new(1.0, 0.0, 0.0)
    );
}
