//! Open-addressed hash storage shared by dict, set and frozenset.
//!
//! Linear probing over a power-of-two slot array. Deleted slots become
//! tombstones so later keys in the same probe run stay reachable; a rehash
//! drops them.
use crate::{Value, Visitable, Visitor};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Entry {
    #[default]
    Empty,
    Deleted,
    Occupied {
        hash: u64,
        key: Value,
        value: Value,
    },
}

/// Result of looking a key up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Found(usize),
    /// Where the key would be inserted; prefers the first tombstone seen.
    Vacant(usize),
    /// No empty slot and no tombstone. Never returned while the load factor
    /// is respected.
    Full,
}

#[derive(Debug)]
pub struct HashTable {
    elements: usize,
    tombstones: usize,
    stores_values: bool,
    entries: Box<[Entry]>,
}

impl HashTable {
    /// `capacity` is rounded up to a power of two.
    pub fn with_capacity(capacity: usize, stores_values: bool) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            elements: 0,
            tombstones: 0,
            stores_values,
            entries: vec![Entry::Empty; capacity].into_boxed_slice(),
        }
    }

    /// Smallest power-of-two slot count holding `elements` under `load`.
    /// `None` when no such count fits a `usize`.
    pub fn capacity_for(elements: usize, load: f64, min: usize) -> Option<usize> {
        let needed = (elements as f64 / load).ceil();
        if needed >= usize::MAX as f64 {
            return None;
        }
        (needed as usize)
            .checked_add(1)?
            .max(min)
            .checked_next_power_of_two()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    #[inline]
    pub fn stores_values(&self) -> bool {
        self.stores_values
    }

    #[inline]
    fn mask(&self) -> usize {
        self.entries.len() - 1
    }

    /// Whether one more insertion would push used slots past `load`.
    pub fn needs_rehash(&self, load: f64) -> bool {
        let used = self.elements + self.tombstones + 1;
        used as f64 > self.capacity() as f64 * load
    }

    pub fn probe(&self, hash: u64, mut eq: impl FnMut(Value) -> bool) -> Probe {
        let mask = self.mask();
        let mut idx = hash as usize & mask;
        let mut first_deleted = None;

        for _ in 0..self.entries.len() {
            match self.entries[idx] {
                Entry::Empty => return Probe::Vacant(first_deleted.unwrap_or(idx)),
                Entry::Deleted => {
                    first_deleted.get_or_insert(idx);
                }
                Entry::Occupied { hash: h, key, .. } => {
                    if h == hash && eq(key) {
                        return Probe::Found(idx);
                    }
                }
            }
            idx = (idx + 1) & mask;
        }

        match first_deleted {
            Some(idx) => Probe::Vacant(idx),
            None => Probe::Full,
        }
    }

    #[inline]
    pub fn entry(&self, idx: usize) -> Entry {
        self.entries[idx]
    }

    /// Fill a vacant slot found by [`HashTable::probe`].
    pub fn occupy(&mut self, idx: usize, hash: u64, key: Value, value: Value) {
        match self.entries[idx] {
            Entry::Empty => {}
            Entry::Deleted => self.tombstones -= 1,
            Entry::Occupied { .. } => panic!("slot {idx} already occupied"),
        }
        self.entries[idx] = Entry::Occupied { hash, key, value };
        self.elements += 1;
    }

    pub fn replace_value(&mut self, idx: usize, value: Value) {
        if let Entry::Occupied { value: slot, .. } = &mut self.entries[idx] {
            *slot = value;
        }
    }

    /// Turn an occupied slot into a tombstone, returning its key and value.
    pub fn remove(&mut self, idx: usize) -> Option<(Value, Value)> {
        match self.entries[idx] {
            Entry::Occupied { key, value, .. } => {
                self.entries[idx] = Entry::Deleted;
                self.elements -= 1;
                self.tombstones += 1;
                Some((key, value))
            }
            _ => None,
        }
    }

    /// Rebuild into `capacity` slots from the stored hashes, without tombstones.
    pub fn rehashed(&self, capacity: usize) -> HashTable {
        let mut table = HashTable::with_capacity(capacity, self.stores_values);
        debug_assert!(table.capacity() > self.elements);
        let mask = table.mask();
        for entry in self.entries.iter() {
            if let Entry::Occupied { hash, key, value } = *entry {
                let mut idx = hash as usize & mask;
                while table.entries[idx] != Entry::Empty {
                    idx = (idx + 1) & mask;
                }
                table.entries[idx] = Entry::Occupied { hash, key, value };
                table.elements += 1;
            }
        }
        table
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, Value, Value)> + '_ {
        self.entries.iter().filter_map(|entry| match *entry {
            Entry::Occupied { hash, key, value } => Some((hash, key, value)),
            _ => None,
        })
    }

    /// Occupied entries at or after slot `from`, for resumable iteration.
    pub fn next_occupied(&self, from: usize) -> Option<(usize, Value, Value)> {
        self.entries
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(idx, entry)| match *entry {
                Entry::Occupied { key, value, .. } => Some((idx, key, value)),
                _ => None,
            })
    }
}

impl Visitable for HashTable {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        for (_, key, value) in self.iter() {
            visitor.visit(key);
            if self.stores_values {
                visitor.visit(value);
            }
        }
    }
}
