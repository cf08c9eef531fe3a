//! Generation-checked slot storage and the handles that index it.
//!
//! Every channel and timer lives in an [`Arena`] owned by the kernel. Callers
//! hold a [`Handle`], a `(slot, generation)` pair that stays valid until the
//! object is deleted. Reusing a slot bumps its generation, so a handle that
//! outlives its object is detected instead of silently aliasing a newer one.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::num::NonZeroUsize;

/// Number of low bits of a raw handle holding `slot + 1`.
const SLOT_BITS: u32 = usize::BITS / 2;
const SLOT_MASK: usize = (1 << SLOT_BITS) - 1;

/// Stable, address-independent reference to an object of type `T`.
pub struct Handle<T> {
    slot: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(slot: u32, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Encodes the handle as a non-zero pointer-sized value.
    ///
    /// This exists for code that stores handles in untyped storage (queue set
    /// records, FFI-style context words). The value is never an address.
    pub fn into_raw(self) -> NonZeroUsize {
        let slot = (self.slot as usize + 1) & SLOT_MASK;
        let generation = (self.generation as usize) << SLOT_BITS;
        // slot + 1 is never zero for any slot an arena hands out
        NonZeroUsize::new(generation | slot).unwrap_or(NonZeroUsize::MIN)
    }

    /// Inverse of [`Handle::into_raw`].
    pub fn from_raw(raw: NonZeroUsize) -> Option<Self> {
        let raw = raw.get();
        let slot = raw & SLOT_MASK;
        if slot == 0 {
            return None;
        }
        let generation = u32::try_from(raw >> SLOT_BITS).ok()?;
        Some(Self::new((slot - 1) as u32, generation))
    }

    pub(crate) fn to_bytes(self) -> [u8; core::mem::size_of::<usize>()] {
        self.into_raw().get().to_ne_bytes()
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; core::mem::size_of::<usize>()] = bytes.try_into().ok()?;
        NonZeroUsize::new(usize::from_ne_bytes(raw)).and_then(Self::from_raw)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.slot, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.value = Some(value);
            return Handle::new(slot, entry.generation);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(slot, 0)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots
            .get(handle.slot as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.slot);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            entry
                .value
                .as_ref()
                .map(|value| (Handle::new(slot as u32, entry.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(slot, entry)| {
            let generation = entry.generation;
            entry
                .value
                .as_mut()
                .map(|value| (Handle::new(slot as u32, generation), value))
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_slot_is_reused_with_new_generation() {
        let mut arena = Arena::new();
        let first = arena.insert("a");
        assert_eq!(arena.remove(first), Some("a"));

        let second = arena.insert("b");
        assert_eq!(second.slot(), first.slot());
        assert_ne!(second, first);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&"b"));
    }

    #[test]
    fn raw_encoding_is_bijective_and_non_zero() {
        let mut arena = Arena::new();
        let handles: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        arena.remove(handles[2]);
        let reused = arena.insert(99);

        for handle in handles.iter().copied().chain([reused]) {
            let raw = handle.into_raw();
            assert_eq!(Handle::<i32>::from_raw(raw), Some(handle));
            assert_eq!(Handle::<i32>::from_bytes(&handle.to_bytes()), Some(handle));
        }
    }

    #[test]
    fn double_remove_is_rejected() {
        let mut arena = Arena::new();
        let handle = arena.insert(1u8);
        assert!(arena.remove(handle).is_some());
        assert!(arena.remove(handle).is_none());
        assert_eq!(arena.len(), 0);
    }
}
