//! Archetype signatures - fixed-width bit sets of component and tag ids.
//!
//! Ids are dense and bounded (see [`MAX_COMPONENT_TYPES`](crate::MAX_COMPONENT_TYPES)),
//! so a signature is four words per id space. Superset and disjointness checks used by
//! the query engine are plain word-wise bit operations.

use std::fmt;

use crate::component::{ComponentId, TagId};

const WORDS: usize = 4;

/// Number of ids a bit set can hold.
pub(crate) const BIT_CAPACITY: usize = WORDS * 64;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
struct BitSet([u64; WORDS]);

impl BitSet {
    const EMPTY: Self = Self([0; WORDS]);

    fn insert(&mut self, bit: usize) -> bool {
        assert!(
            bit < BIT_CAPACITY,
            "id {bit} does not fit in a signature (capacity {BIT_CAPACITY})"
        );
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        let added = self.0[word] & mask == 0;
        self.0[word] |= mask;
        added
    }

    fn remove(&mut self, bit: usize) -> bool {
        if bit >= BIT_CAPACITY {
            return false;
        }
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        let removed = self.0[word] & mask != 0;
        self.0[word] &= !mask;
        removed
    }

    fn contains(&self, bit: usize) -> bool {
        bit < BIT_CAPACITY && self.0[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    fn is_superset(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0).all(|(a, b)| a & b == b)
    }

    fn is_disjoint(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0).all(|(a, b)| a & b == 0)
    }

    fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for (w, o) in out.0.iter_mut().zip(other.0) {
            *w |= o;
        }
        out
    }

    fn difference(&self, other: &Self) -> Self {
        let mut out = *self;
        for (w, o) in out.0.iter_mut().zip(other.0) {
            *w &= !o;
        }
        out
    }

    fn intersection(&self, other: &Self) -> Self {
        let mut out = *self;
        for (w, o) in out.0.iter_mut().zip(other.0) {
            *w &= o;
        }
        out
    }

    /// Set bits in ascending order.
    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(idx * 64 + bit)
            })
        })
    }
}

macro_rules! id_set {
    ($(#[$meta:meta])* $name:ident, $id:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(BitSet);

        impl $name {
            /// The empty set.
            pub const EMPTY: Self = Self(BitSet::EMPTY);

            /// Add an id. Returns `true` if it was not present.
            ///
            /// # Panics
            ///
            /// Panics if the raw id is not below the id-space bound of 256. Ids handed
            /// out by a [`Schema`](crate::Schema) always are.
            pub fn insert(&mut self, id: $id) -> bool {
                self.0.insert(id.index())
            }

            /// Remove an id. Returns `true` if it was present.
            pub fn remove(&mut self, id: $id) -> bool {
                self.0.remove(id.index())
            }

            /// Copy of this set with `id` added.
            ///
            /// # Panics
            ///
            /// Panics if the raw id is not below the id-space bound of 256. Ids handed
            /// out by a [`Schema`](crate::Schema) always are.
            #[must_use]
            pub fn with(mut self, id: $id) -> Self {
                self.insert(id);
                self
            }

            /// Copy of this set with `id` removed.
            #[must_use]
            pub fn without(mut self, id: $id) -> Self {
                self.remove(id);
                self
            }

            /// Check if the set contains `id`.
            #[must_use]
            pub fn contains(&self, id: $id) -> bool {
                self.0.contains(id.index())
            }

            /// Number of ids in the set.
            #[must_use]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Check if the set is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Check if every id of `other` is in this set.
            #[must_use]
            pub fn is_superset(&self, other: &Self) -> bool {
                self.0.is_superset(&other.0)
            }

            /// Check if the sets share no id.
            #[must_use]
            pub fn is_disjoint(&self, other: &Self) -> bool {
                self.0.is_disjoint(&other.0)
            }

            /// Ids in either set.
            #[must_use]
            pub fn union(&self, other: &Self) -> Self {
                Self(self.0.union(&other.0))
            }

            /// Ids in this set but not in `other`.
            #[must_use]
            pub fn difference(&self, other: &Self) -> Self {
                Self(self.0.difference(&other.0))
            }

            /// Ids in both sets.
            #[must_use]
            pub fn intersection(&self, other: &Self) -> Self {
                Self(self.0.intersection(&other.0))
            }

            /// Iterate ids in ascending order.
            pub fn iter(&self) -> impl Iterator<Item = $id> + '_ {
                self.0.iter().map(|bit| $id::from_raw(bit as u32))
            }
        }

        impl FromIterator<$id> for $name {
            fn from_iter<I: IntoIterator<Item = $id>>(iter: I) -> Self {
                let mut set = Self::EMPTY;
                for id in iter {
                    set.insert(id);
                }
                set
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_set().entries(self.0.iter()).finish()
            }
        }
    };
}

id_set!(
    /// Sorted set of component ids.
    ComponentTypes,
    ComponentId
);

id_set!(
    /// Sorted set of tag ids.
    Tags,
    TagId
);

/// The shape of an archetype: its component set and its tag set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    /// Components stored in columns.
    pub components: ComponentTypes,
    /// Tags carried by every entity of the archetype.
    pub tags: Tags,
}

impl Signature {
    /// The root signature: no components, no tags.
    pub const EMPTY: Self = Self {
        components: ComponentTypes::EMPTY,
        tags: Tags::EMPTY,
    };

    /// Create a signature from its parts.
    #[must_use]
    pub const fn new(components: ComponentTypes, tags: Tags) -> Self {
        Self { components, tags }
    }

    /// Copy with a component added.
    ///
    /// # Panics
    ///
    /// Panics if the raw id is not below the id-space bound of 256. Ids handed out by a
    /// [`Schema`](crate::Schema) always are; [`Schema::validate`](crate::Schema::validate)
    /// reports in-range ids the schema does not know.
    #[must_use]
    pub fn with_component(mut self, id: ComponentId) -> Self {
        self.components.insert(id);
        self
    }

    /// Copy with a component removed.
    #[must_use]
    pub fn without_component(mut self, id: ComponentId) -> Self {
        self.components.remove(id);
        self
    }

    /// Copy with a tag added.
    ///
    /// # Panics
    ///
    /// Panics if the raw id is not below the id-space bound of 256. Ids handed out by a
    /// [`Schema`](crate::Schema) always are; [`Schema::validate`](crate::Schema::validate)
    /// reports in-range ids the schema does not know.
    #[must_use]
    pub fn with_tag(mut self, id: TagId) -> Self {
        self.tags.insert(id);
        self
    }

    /// Copy with a tag removed.
    #[must_use]
    pub fn without_tag(mut self, id: TagId) -> Self {
        self.tags.remove(id);
        self
    }

    /// Check if the signature has no components and no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.tags.is_empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("components", &self.components)
            .field("tags", &self.tags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(raw: u32) -> ComponentId {
        ComponentId::from_raw(raw)
    }

    #[test]
    #[should_panic(expected = "does not fit in a signature")]
    fn test_out_of_range_id_panics_with_message() {
        let _ = Signature::EMPTY.with_component(c(300));
    }

    #[test]
    fn test_out_of_range_id_is_never_contained() {
        let mut set = ComponentTypes::EMPTY.with(c(255));
        assert!(!set.contains(c(300)));
        assert!(!set.remove(c(300)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_insert_remove_contains() {
        let mut set = ComponentTypes::EMPTY;
        assert!(set.insert(c(3)));
        assert!(!set.insert(c(3)));
        assert!(set.insert(c(200)));
        assert!(set.contains(c(3)));
        assert!(set.contains(c(200)));
        assert_eq!(set.len(), 2);

        assert!(set.remove(c(3)));
        assert!(!set.remove(c(3)));
        assert!(!set.contains(c(3)));
    }

    #[test]
    fn test_iteration_is_sorted() {
        let set: ComponentTypes = [c(130), c(5), c(64), c(0)].into_iter().collect();
        let ids: Vec<u32> = set.iter().map(ComponentId::as_raw).collect();
        assert_eq!(ids, vec![0, 5, 64, 130]);
    }

    #[test]
    fn test_superset_and_disjoint() {
        let big: ComponentTypes = [c(1), c(2), c(70)].into_iter().collect();
        let small: ComponentTypes = [c(2), c(70)].into_iter().collect();
        let other: ComponentTypes = [c(3)].into_iter().collect();

        assert!(big.is_superset(&small));
        assert!(!small.is_superset(&big));
        assert!(big.is_superset(&ComponentTypes::EMPTY));
        assert!(big.is_disjoint(&other));
        assert!(!big.is_disjoint(&small));
    }

    #[test]
    fn test_signature_equality_ignores_insertion_order() {
        let a = Signature::EMPTY.with_component(c(1)).with_component(c(4));
        let b = Signature::EMPTY.with_component(c(4)).with_component(c(1));
        assert_eq!(a, b);

        let tagged = a.with_tag(TagId::from_raw(0));
        assert_ne!(a, tagged);
        assert_eq!(tagged.without_tag(TagId::from_raw(0)), a);
    }
}
