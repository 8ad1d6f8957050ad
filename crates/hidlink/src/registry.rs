//! Session table
//!
//! Open sessions live in an arena of slots addressed by [`SessionId`]. Each id
//! carries the generation of the slot it was issued for; removing a value bumps
//! the generation, so an id kept after `close` never resolves to whatever
//! session reuses the slot later.

use crate::sync::lock;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Opaque handle to an open session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

#[derive(Debug)]
struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

/// Generation-checked arena of shared values
#[derive(Debug)]
pub struct Registry<T> {
    slots: Mutex<Slots<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
                len: 0,
            }),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, value: Arc<T>) -> SessionId {
        let mut slots = lock(&self.slots);
        slots.len += 1;

        if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            slot.value = Some(value);
            return SessionId {
                index,
                generation: slot.generation,
            };
        }

        let index = slots.entries.len() as u32;
        slots.entries.push(Slot {
            generation: 0,
            value: Some(value),
        });
        SessionId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<T>> {
        let slots = lock(&self.slots);
        slots
            .entries
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.clone())
    }

    /// Detach the value for `id`; the id is dead afterwards
    pub fn remove(&self, id: SessionId) -> Option<Arc<T>> {
        let mut slots = lock(&self.slots);
        let slot = slots
            .entries
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        slots.free.push(id.index);
        slots.len -= 1;
        Some(value)
    }

    /// Remove every value, in slot order
    pub fn drain_all(&self) -> Vec<Arc<T>> {
        let mut slots = lock(&self.slots);
        let mut drained = Vec::with_capacity(slots.len);

        for index in 0..slots.entries.len() {
            let slot = &mut slots.entries[index];
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                drained.push(value);
                slots.free.push(index as u32);
            }
        }
        slots.len = 0;
        drained
    }

    /// Ids of every live value, in slot order
    pub fn ids(&self) -> Vec<SessionId> {
        lock(&self.slots)
            .entries
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| SessionId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
