//! Slot arena with stable handles.
//!
//! Values live in a `Vec<Option<T>>`; a [`SlotId`] stays valid until its value
//! is removed, and freed slots are reused by later inserts. The arena also
//! exposes its slot *span* (occupied plus vacant slots below the highest
//! occupied one) so a cursor can address slots by position: a vacant slot just
//! reads as `None`.
//!
//! ```text
//!   slots:  [ A ][   ][ C ][ D ]      span = 4, len = 3
//!             0    1    2    3
//!   free:   [1]
//!
//!   remove(D) -> trailing vacancies are trimmed, span = 3
//! ```
//!
//! [`ConcurrentSlotArena`] wraps the arena in a `parking_lot::RwLock`.

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<usize>,
    len: usize,
}

impl<T> SlotArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> SlotId {
        let idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx] = Some(value);
            idx
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        };
        self.len += 1;
        SlotId(idx)
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.0)?;
        let value = slot.take()?;
        self.free_list.push(id.0);
        self.len -= 1;
        self.trim_tail();
        Some(value)
    }

    fn trim_tail(&mut self) {
        let before = self.slots.len();
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        if self.slots.len() != before {
            let span = self.slots.len();
            self.free_list.retain(|&idx| idx < span);
        }
    }

    /// Value at slot position `index`, `None` if out of range or vacant.
    pub fn get_at(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of addressable slot positions.
    pub fn span(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|value| (SlotId(idx), value)))
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ConcurrentSlotArena<T> {
    inner: RwLock<SlotArena<T>>,
}

impl<T> ConcurrentSlotArena<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SlotArena::new()),
        }
    }

    pub fn insert(&self, value: T) -> SlotId {
        self.inner.write().insert(value)
    }

    pub fn remove(&self, id: SlotId) -> Option<T> {
        self.inner.write().remove(id)
    }

    pub fn get_at_with<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.read().get_at(index).map(f)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn span(&self) -> usize {
        self.inner.read().span()
    }

    /// Clones every live value, in slot order.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner
            .read()
            .iter()
            .map(|(_, value)| value.clone())
            .collect()
    }
}

impl<T> Default for ConcurrentSlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
