//! Component storage - type-erased column storage for archetype tables.
//!
//! Each column stores components of a single type in a contiguous array,
//! enabling cache-friendly iteration. Components are plain values, so rows are
//! moved by bitwise copy and removed without running any destructor.

use std::{alloc::Layout, ptr::NonNull};

use crate::component::ComponentInfo;

/// A column of components of a single type.
///
/// Stores components in a contiguous, type-erased array.
/// Manages its own memory allocation and deallocation.
pub struct Column {
    /// Pointer to the data array. Always aligned for the component type.
    data: NonNull<u8>,
    /// Number of components stored.
    len: usize,
    /// Allocated capacity (in number of components).
    capacity: usize,
    /// Component type information.
    info: ComponentInfo,
}

// SAFETY: Column manages its own memory and `Component` requires Send + Sync
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Create a new empty column for the given component type.
    #[must_use]
    pub fn new(info: ComponentInfo) -> Self {
        let capacity = if info.size() == 0 { usize::MAX } else { 0 };
        Self {
            data: Self::dangling(&info),
            len: 0,
            capacity,
            info,
        }
    }

    /// Create a column with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(info: ComponentInfo, capacity: usize) -> Self {
        let mut column = Self::new(info);
        column.reserve(capacity);
        column
    }

    /// Get the number of components stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the column is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the component info.
    #[must_use]
    pub const fn info(&self) -> &ComponentInfo {
        &self.info
    }

    /// Append a default-initialized component.
    pub fn push_default(&mut self) {
        self.reserve(1);

        // SAFETY: we just reserved space, so the slot at `len` is allocated
        unsafe {
            let dst = self.get_unchecked_raw(self.len);
            self.info.write_default(dst);
        }

        self.len += 1;
    }

    /// Push a component onto the column by copying it from `value`.
    ///
    /// # Safety
    ///
    /// `value` must point to a valid instance of the column's component type.
    pub unsafe fn push_raw(&mut self, value: *const u8) {
        self.reserve(1);

        // SAFETY: We just reserved space, so self.len is a valid index
        let dst = unsafe { self.get_unchecked_raw(self.len) };

        // SAFETY: dst is valid, value is valid, and they don't overlap
        unsafe {
            std::ptr::copy_nonoverlapping(value, dst, self.info.size());
        }

        self.len += 1;
    }

    /// Remove the component at `index` by moving the last one into its slot.
    ///
    /// Returns the former index of the moved component, or `None` if `index` was last.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn swap_remove(&mut self, index: usize) -> Option<usize> {
        assert!(
            index < self.len,
            "swap_remove index {index} out of bounds for column of length {}",
            self.len
        );

        self.len -= 1;

        if index < self.len {
            // SAFETY: both indices are below the old length and distinct
            unsafe {
                let dst = self.get_unchecked_raw(index);
                let last = self.get_unchecked_raw(self.len);
                std::ptr::copy_nonoverlapping(last, dst, self.info.size());
            }
            Some(self.len)
        } else {
            None
        }
    }

    /// Get a raw pointer to the component at the given index.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`, or equal to `len` with spare capacity.
    #[must_use]
    pub unsafe fn get_unchecked_raw(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.len || (index == self.len && self.len < self.capacity));
        // SAFETY: Caller ensures index is valid
        unsafe { self.data.as_ptr().add(index * self.info.size()) }
    }

    /// View the column as a typed slice.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the column's component type.
    #[must_use]
    pub fn as_slice<T: 'static>(&self) -> &[T] {
        assert!(self.info.is::<T>(), "type mismatch in Column::as_slice");
        // SAFETY: type checked above, data is aligned and holds `len` initialized values
        unsafe { std::slice::from_raw_parts(self.data.as_ptr().cast::<T>(), self.len) }
    }

    /// View the column as a mutable typed slice.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the column's component type.
    #[must_use]
    pub fn as_mut_slice<T: 'static>(&mut self) -> &mut [T] {
        assert!(self.info.is::<T>(), "type mismatch in Column::as_mut_slice");
        // SAFETY: type checked above, and `&mut self` guarantees exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr().cast::<T>(), self.len) }
    }

    /// Reserve capacity for at least `additional` more components.
    ///
    /// # Panics
    ///
    /// Panics if the required capacity overflows `usize`.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.len.checked_add(additional).expect("Capacity overflow");

        if required <= self.capacity {
            return;
        }

        self.grow(required);
    }

    /// Grow the column to at least `min_capacity`.
    fn grow(&mut self, min_capacity: usize) {
        // Growth strategy: double capacity, but at least 4 elements
        let new_capacity = self
            .capacity
            .checked_mul(2)
            .unwrap_or(min_capacity)
            .max(min_capacity)
            .max(4);

        let new_layout = Self::array_layout(&self.info, new_capacity);

        // SAFETY: We handle both new allocation and reallocation
        let new_data = unsafe {
            if self.capacity == 0 {
                std::alloc::alloc(new_layout)
            } else {
                let old_layout = Self::array_layout(&self.info, self.capacity);
                std::alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size())
            }
        };

        let Some(new_data) = NonNull::new(new_data) else {
            std::alloc::handle_alloc_error(new_layout);
        };

        self.data = new_data;
        self.capacity = new_capacity;
    }

    /// Dangling pointer with the component's alignment, for empty and zero-sized columns.
    fn dangling(info: &ComponentInfo) -> NonNull<u8> {
        // SAFETY: alignments are non-zero powers of two
        unsafe { NonNull::new_unchecked(std::ptr::without_provenance_mut(info.align())) }
    }

    /// Calculate the array layout for `count` components.
    fn array_layout(info: &ComponentInfo, count: usize) -> Layout {
        let size = info.size().checked_mul(count).expect("Layout overflow");
        // SAFETY: align is always a power of 2 from Layout
        unsafe { Layout::from_size_align_unchecked(size, info.align()) }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.info.size() > 0 && self.capacity > 0 {
            let layout = Self::array_layout(&self.info, self.capacity);
            // SAFETY: data was allocated with this layout
            unsafe {
                std::alloc::dealloc(self.data.as_ptr(), layout);
            }
        }
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("component", &self.info.name())
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, ComponentId};

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Aligned(u128);
    impl Component for Aligned {}

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Unit;
    impl Component for Unit {}

    fn column<T: Component>() -> Column {
        Column::new(ComponentInfo::of::<T>(ComponentId::from_raw(0)).unwrap())
    }

    fn push<T: Component>(col: &mut Column, value: T) {
        // SAFETY: value is a valid T and the column stores T
        unsafe { col.push_raw(std::ptr::from_ref(&value).cast()) };
    }

    #[test]
    fn test_column_push_get() {
        let mut col = column::<Position>();

        push(&mut col, Position { x: 1.0, y: 2.0 });
        push(&mut col, Position { x: 3.0, y: 4.0 });

        assert_eq!(col.len(), 2);
        assert_eq!(
            col.as_slice::<Position>(),
            &[Position { x: 1.0, y: 2.0 }, Position { x: 3.0, y: 4.0 }]
        );
    }

    #[test]
    fn test_column_push_default() {
        let mut col = column::<Position>();
        push(&mut col, Position { x: 9.0, y: 9.0 });
        col.push_default();

        assert_eq!(col.as_slice::<Position>()[1], Position::default());
    }

    #[test]
    fn test_column_swap_remove() {
        let mut col = column::<Position>();

        push(&mut col, Position { x: 1.0, y: 2.0 });
        push(&mut col, Position { x: 3.0, y: 4.0 });
        push(&mut col, Position { x: 5.0, y: 6.0 });

        let swapped = col.swap_remove(0);

        assert_eq!(swapped, Some(2)); // Last element was at index 2
        assert_eq!(
            col.as_slice::<Position>(),
            &[Position { x: 5.0, y: 6.0 }, Position { x: 3.0, y: 4.0 }]
        );

        assert_eq!(col.swap_remove(1), None);
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn test_column_growth_keeps_values() {
        let mut col = column::<Aligned>();
        for i in 0..100 {
            push(&mut col, Aligned(i));
        }

        assert!(col.capacity() >= 100);
        let values = col.as_slice::<Aligned>();
        assert_eq!(values.len(), 100);
        assert!(values.iter().enumerate().all(|(i, v)| v.0 == i as u128));
        assert_eq!(values.as_ptr() as usize % align_of::<Aligned>(), 0);
    }

    #[test]
    fn test_empty_column_slice_is_aligned() {
        let col = column::<Aligned>();
        let slice = col.as_slice::<Aligned>();
        assert!(slice.is_empty());
        assert_eq!(slice.as_ptr() as usize % align_of::<Aligned>(), 0);
    }

    #[test]
    fn test_zero_sized_column() {
        let mut col = column::<Unit>();
        col.push_default();
        col.push_default();
        assert_eq!(col.as_slice::<Unit>().len(), 2);
        assert_eq!(col.swap_remove(0), Some(1));
        assert_eq!(col.len(), 1);
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn test_wrong_type_panics() {
        let col = column::<Position>();
        let _ = col.as_slice::<Aligned>();
    }
}
