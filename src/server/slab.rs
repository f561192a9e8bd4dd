//! Free-list slab holding per-connection state.
//!
//! Slot indices double as poll tokens, so readiness events map back to
//! their connection without any hashing. Vacant slots chain through a
//! free-list head; insert and remove are O(1) and allocation stops once
//! the configured capacity is reached.

use crate::server::conn::Connection;

enum Entry {
    Vacant { next: Option<usize> },
    Occupied(Box<Connection>),
}

pub(crate) struct ConnSlab {
    entries: Vec<Entry>,
    free: Option<usize>,
    len: usize,
    capacity: usize,
}

impl ConnSlab {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: None,
            len: 0,
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Stores a connection, reusing a vacant slot when one exists.
    /// Returns `None` (dropping the connection) at capacity.
    pub(crate) fn insert(&mut self, conn: Connection) -> Option<usize> {
        if let Some(idx) = self.free {
            let next = match self.entries[idx] {
                Entry::Vacant { next } => next,
                Entry::Occupied(_) => unreachable!("free list points at occupied slot"),
            };
            self.free = next;
            self.entries[idx] = Entry::Occupied(Box::new(conn));
            self.len += 1;
            return Some(idx);
        }

        if self.entries.len() < self.capacity {
            self.entries.push(Entry::Occupied(Box::new(conn)));
            self.len += 1;
            return Some(self.entries.len() - 1);
        }

        None
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Connection> {
        match self.entries.get_mut(idx) {
            Some(Entry::Occupied(conn)) => Some(conn),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, idx: usize) -> Option<Connection> {
        let slot = self.entries.get_mut(idx)?;
        if !matches!(slot, Entry::Occupied(_)) {
            return None;
        }

        let taken = std::mem::replace(slot, Entry::Vacant { next: self.free });
        self.free = Some(idx);
        self.len -= 1;
        match taken {
            Entry::Occupied(conn) => Some(*conn),
            Entry::Vacant { .. } => unreachable!(),
        }
    }

    /// Empties the slab, yielding every live connection.
    pub(crate) fn drain(&mut self) -> Vec<Connection> {
        let mut out = Vec::with_capacity(self.len);
        for idx in 0..self.entries.len() {
            if let Some(conn) = self.remove(idx) {
                out.push(conn);
            }
        }
        out
    }
}
