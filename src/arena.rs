//! The document arena (§4.A): lifetime-bounded bump allocation that every
//! other subsystem borrows from. `original_source/src/arena.c` hand-rolls a
//! block list with top-down bump pointers and geometric growth capped at
//! 1 GiB; here that block list is `bumpalo::Bump`, which implements the same
//! allocation strategy (a chain of chunks, doubling on overflow) behind a
//! safe API — the REDESIGN FLAGS section asks for exactly this: "use the
//! target language's generic container type, parameterised over an
//! allocator when available".

use bumpalo::Bump;

/// Thin wrapper so call sites read `Arena` (matching §3's `Resolver` field
/// name) instead of reaching for `bumpalo` directly everywhere.
pub struct Arena {
    bump: Bump,
}

impl Arena {
    /// `block_size` seeds the first chunk; like the source, growth beyond
    /// that is geometric and capped (bumpalo caps individual chunk requests
    /// at its own internal limit, which is far above any single PDF object).
    pub fn new(block_size: usize) -> Self {
        Arena {
            bump: Bump::with_capacity(block_size.max(1)),
        }
    }

    pub fn alloc<T>(&self, value: T) -> &mut T {
        self.bump.alloc(value)
    }

    pub fn alloc_slice_copy<T: Copy>(&self, slice: &[T]) -> &mut [T] {
        self.bump.alloc_slice_copy(slice)
    }

    pub fn alloc_str<'a>(&'a self, s: &str) -> &'a mut str {
        self.bump.alloc_str(s)
    }

    /// Marks all chunks empty without releasing them (`arena_reset` in the
    /// source). Invalidates every outstanding borrow — callers must not
    /// keep `&` references across a `reset`.
    ///
    /// # Safety
    /// The caller must guarantee no live references into this arena are
    /// used after the call.
    pub unsafe fn reset(&mut self) {
        self.bump.reset();
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new(4096)
    }
}

/// Owned, arena-backed growable vector (§4.A "owned vector family").
/// `bumpalo::collections::Vec` already provides the geometric-growth,
/// arena-backed storage the source's `DVEC_*` macros hand-generated per
/// element type; `OwnedVec<T>` just gives it the API shape §4.A specifies
/// (`push_uninit`, `get`/`get_ref` returning `Option`).
pub struct OwnedVec<'arena, T> {
    inner: bumpalo::collections::Vec<'arena, T>,
}

impl<'arena, T> OwnedVec<'arena, T> {
    pub fn new(arena: &'arena Arena) -> Self {
        OwnedVec {
            inner: bumpalo::collections::Vec::new_in(&arena.bump),
        }
    }

    pub fn with_capacity(arena: &'arena Arena, capacity: usize) -> Self {
        OwnedVec {
            inner: bumpalo::collections::Vec::with_capacity_in(capacity, &arena.bump),
        }
    }

    pub fn push(&mut self, value: T) -> &mut T {
        self.inner.push(value);
        let idx = self.inner.len() - 1;
        &mut self.inner[idx]
    }

    /// Pushes a default-initialised slot and returns it for in-place
    /// construction — mirrors the source's `push_uninit`, minus the
    /// actual uninitialized-memory unsafety (Rust has no safe uninit-slot
    /// API for a growable vec, so we require `Default`).
    pub fn push_uninit(&mut self) -> &mut T
    where
        T: Default,
    {
        self.push(T::default())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.inner.get(index).cloned()
    }

    pub fn get_ref(&self, index: usize) -> Option<&T> {
        self.inner.get(index)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.inner.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_from_one_block_are_distinct() {
        let arena = Arena::new(1024);
        let a = arena.alloc(1u32);
        let b = arena.alloc(2u32);
        assert_ne!(a as *const u32, b as *const u32);
        assert_eq!(*a, 1);
        assert_eq!(*b, 2);
    }

    #[test]
    fn allocation_larger_than_initial_block_grows() {
        let arena = Arena::new(16);
        let big = arena.alloc_slice_copy(&[0u8; 4096]);
        assert_eq!(big.len(), 4096);
    }

    #[test]
    fn owned_vec_push_and_get() {
        let arena = Arena::new(1024);
        let mut v: OwnedVec<u32> = OwnedVec::new(&arena);
        v.push(10);
        v.push(20);
        v.push(30);
        assert_eq!(v.len(), 3);
        assert_eq!(v.get(1), Some(20));
        assert_eq!(v.get(10), None);
    }

    #[test]
    fn owned_vec_clear_keeps_capacity() {
        let arena = Arena::new(1024);
        let mut v: OwnedVec<u8> = OwnedVec::new(&arena);
        for i in 0..100u8 {
            v.push(i);
        }
        v.clear();
        assert_eq!(v.len(), 0);
        assert!(v.is_empty());
    }
}
