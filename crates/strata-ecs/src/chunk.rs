//! Chunk iteration - whole archetype columns as typed slices.
//!
//! A chunk is one archetype's worth of rows: the entity-id column plus one slice per
//! requested component, all indexed by the same row.

use std::ptr::NonNull;

use smallvec::{SmallVec, smallvec};

use crate::{
    archetype::{Archetype, ArchetypeId},
    component::{Component, ComponentId},
    entity::EntityId,
    error::{EcsError, EcsResult},
    schema::Schema,
    storage::Column,
};

/// Component ids requested by a chunk tuple, in tuple order.
pub(crate) type ComponentList = SmallVec<[ComponentId; 6]>;

/// One archetype's rows.
#[derive(Debug)]
pub struct Chunk<'a, C> {
    /// Archetype the rows belong to.
    pub archetype: ArchetypeId,
    /// Entity of each row.
    pub entities: &'a [EntityId],
    /// One slice per requested component, same length as `entities`.
    pub components: C,
}

impl<C> Chunk<'_, C> {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the chunk has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Tuples of component types that can be fetched as chunk slices.
///
/// Implemented for tuples of one to six distinct [`Component`] types.
pub trait ChunkQuery {
    /// Shared slices, e.g. `(&'a [A], &'a [B])`.
    type Slices<'a>;
    /// Mutable slices, e.g. `(&'a mut [A], &'a mut [B])`.
    type SlicesMut<'a>;

    /// Resolve the tuple's component ids, rejecting repeated types.
    fn component_ids(schema: &Schema) -> EcsResult<ComponentList>;

    /// Borrow the requested columns of `archetype`.
    ///
    /// # Panics
    ///
    /// Panics if the archetype lacks one of the columns.
    fn slices<'a>(archetype: &'a Archetype, ids: &[ComponentId]) -> Self::Slices<'a>;

    /// Borrow the requested columns mutably.
    ///
    /// # Safety
    ///
    /// The pointers must come from one [`Archetype`] that stays exclusively borrowed for
    /// `'a`, must be pairwise distinct, and must be in tuple order.
    unsafe fn slices_mut<'a>(columns: &[NonNull<Column>]) -> Self::SlicesMut<'a>;
}

fn ensure_distinct(ids: &[ComponentId], schema: &Schema) -> EcsResult<()> {
    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            return Err(EcsError::DuplicateQueryComponent(schema.name_of(*id)));
        }
    }
    Ok(())
}

fn column_slice<T: Component>(archetype: &Archetype, id: ComponentId) -> &[T] {
    match archetype.components::<T>(id) {
        Ok(slice) => slice,
        Err(err) => panic!("matched archetype cannot serve chunk: {err}"),
    }
}

/// # Safety
///
/// `column` must hold `T`, be valid for `'a` and not be aliased during `'a`.
unsafe fn column_slice_mut<'a, T: Component>(column: NonNull<Column>) -> &'a mut [T] {
    unsafe { (*column.as_ptr()).as_mut_slice::<T>() }
}

macro_rules! impl_chunk_query {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Component),+> ChunkQuery for ($($name,)+) {
            type Slices<'a> = ($(&'a [$name],)+);
            type SlicesMut<'a> = ($(&'a mut [$name],)+);

            fn component_ids(schema: &Schema) -> EcsResult<ComponentList> {
                let ids: ComponentList = smallvec![$(schema.component_id::<$name>()?),+];
                ensure_distinct(&ids, schema)?;
                Ok(ids)
            }

            fn slices<'a>(archetype: &'a Archetype, ids: &[ComponentId]) -> Self::Slices<'a> {
                ($(column_slice::<$name>(archetype, ids[$idx]),)+)
            }

            unsafe fn slices_mut<'a>(columns: &[NonNull<Column>]) -> Self::SlicesMut<'a> {
                // SAFETY: forwarded from the caller
                unsafe { ($(column_slice_mut::<$name>(columns[$idx]),)+) }
            }
        }
    };
}

impl_chunk_query!(A: 0);
impl_chunk_query!(A: 0, B: 1);
impl_chunk_query!(A: 0, B: 1, C: 2);
impl_chunk_query!(A: 0, B: 1, C: 2, D: 3);
impl_chunk_query!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_chunk_query!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
