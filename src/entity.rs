//! Entity keys and the registry that owns every long-lived engine object.
//!
//! Every variable, constraint, token, object, decision point, and rule
//! instance in the system is an *entity*: it gets a stable key at
//! construction and is looked up through the registry rather than through a
//! direct reference, so stale keys (an entity destroyed out from under a
//! holder) fail cleanly instead of aliasing whatever reused the slot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// A typed, generation-guarded entity key.
///
/// The phantom type parameter keeps keys for different entity kinds from
/// being mixed up at compile time, the same role the teacher crate's
/// `EntityId<T>` phantom parameter plays. Unlike the teacher, the payload
/// is a `u64` index plus a `u32` generation counter rather than a `Uuid`:
/// the registry reuses index slots after an entity is destroyed, and the
/// generation lets a [`Registry::lookup`] on a stale key fail instead of
/// silently returning whatever now occupies that slot.
#[derive(Serialize, Deserialize)]
pub struct Key<T> {
    index: u64,
    generation: u32,
    #[serde(skip)]
    _phantom: PhantomData<T>,
}

impl<T> Key<T> {
    fn new(index: u64, generation: u32) -> Self {
        Self {
            index,
            generation,
            _phantom: PhantomData,
        }
    }

    /// The raw slot index, stable across generations.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The generation this key was minted for.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Reinterpret this key as referring to a different entity kind.
    ///
    /// Only meaningful when the caller knows the two kinds share a
    /// registry-level identity (e.g. a `Key<Token>` that is also valid as a
    /// `Key<Entity>` for generic bookkeeping). Use with care.
    pub fn cast<U>(self) -> Key<U> {
        Key::new(self.index, self.generation)
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Key<T> {}

impl<T> std::hash::Hash for Key<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}#{})", self.index, self.generation)
    }
}

impl<T> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

/// Owning store of entities of one kind, keyed by [`Key<T>`].
///
/// Ownership is hierarchical in the engine as a whole (the constraint
/// engine owns variables/constraints, the plan database owns
/// objects/tokens) but each owner uses one `Registry` per entity kind it
/// holds. Destroying an entity clears its slot and bumps the generation so
/// any key still held elsewhere becomes a stale reference (spec §7) rather
/// than a dangling one.
pub struct Registry<T, V> {
    slots: Vec<Slot<V>>,
    free: Vec<u64>,
    next_generation: u32,
    _phantom: PhantomData<T>,
}

impl<T, V> Default for Registry<T, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, V> Registry<T, V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_generation: 1,
            _phantom: PhantomData,
        }
    }

    /// Insert a new entity, returning its freshly minted key.
    pub fn insert(&mut self, value: V) -> Key<T> {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1).max(1);

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = generation;
            slot.value = Some(value);
            Key::new(index, generation)
        } else {
            let index = self.slots.len() as u64;
            self.slots.push(Slot {
                generation,
                value: Some(value),
            });
            Key::new(index, generation)
        }
    }

    /// Weak lookup: `None` if the key's slot is empty or its generation is
    /// stale (the entity was destroyed, possibly replaced by another).
    pub fn lookup(&self, key: Key<T>) -> Option<&V> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutable weak lookup, same validity rule as [`Registry::lookup`].
    pub fn lookup_mut(&mut self, key: Key<T>) -> Option<&mut V> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// True iff `key` still resolves to a live entity.
    pub fn is_alive(&self, key: Key<T>) -> bool {
        self.lookup(key).is_some()
    }

    /// Remove the entity at `key`, returning its value if it was alive.
    /// The slot is queued for reuse under a new generation.
    pub fn remove(&mut self, key: Key<T>) -> Option<V> {
        let index = key.index as usize;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take();
        if value.is_some() {
            self.free.push(key.index);
        }
        value
    }

    /// Iterate over all currently live entities with their keys.
    pub fn iter(&self) -> impl Iterator<Item = (Key<T>, &V)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Key::new(index as u64, slot.generation), v))
        })
    }

    /// Number of currently live entities.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    /// True iff no entities are currently live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut reg: Registry<Marker, &'static str> = Registry::new();
        let k = reg.insert("alpha");
        assert_eq!(reg.lookup(k), Some(&"alpha"));
    }

    #[test]
    fn stale_key_after_removal_fails_cleanly() {
        let mut reg: Registry<Marker, &'static str> = Registry::new();
        let k = reg.insert("alpha");
        assert_eq!(reg.remove(k), Some("alpha"));
        assert_eq!(reg.lookup(k), None);
        assert!(!reg.is_alive(k));
    }

    #[test]
    fn reused_slot_does_not_alias_old_key() {
        let mut reg: Registry<Marker, &'static str> = Registry::new();
        let k1 = reg.insert("alpha");
        reg.remove(k1).unwrap();
        let k2 = reg.insert("beta");
        assert_eq!(k1.index(), k2.index());
        assert_ne!(k1.generation(), k2.generation());
        assert_eq!(reg.lookup(k1), None);
        assert_eq!(reg.lookup(k2), Some(&"beta"));
    }

    #[test]
    fn iter_skips_removed_entities() {
        let mut reg: Registry<Marker, i32> = Registry::new();
        let a = reg.insert(1);
        let _b = reg.insert(2);
        reg.remove(a);
        let remaining: Vec<_> = reg.iter().map(|(_, v)| *v).collect();
        assert_eq!(remaining, vec![2]);
    }
}
