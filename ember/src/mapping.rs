//! Dict, set and frozenset accessors.
//!
//! Keys hash and compare by value: ints, bools and integral floats that are
//! numerically equal are the same key; strings, bytes and tuples compare by
//! content; frozensets by membership. Mutable containers cannot be keys, all
//! other objects are keyed by identity.
use std::hash::{BuildHasher, Hash};

use ahash::RandomState;
use log::trace;

use crate::{
    Allocator, Body, Entry, HashTable, Heap, HeapError, HeapRef, Probe,
    RootProvider, TypeTag, Value, object::hash_block_size,
};

const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

enum KeyHash<'a> {
    Done(u64),
    /// Tuple elements, hashed in order into the tuple's hash.
    Items(&'a [Value]),
}

#[inline]
fn hash_one(data: impl Hash) -> u64 {
    let state = RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]);
    BuildHasher::hash_one(&state, data)
}

impl Heap {
    /// Hash of a key, consistent with [`Heap::values_equal`].
    ///
    /// Nested tuples are hashed with an explicit stack, so depth is bounded
    /// only by the heap.
    pub fn hash_of(&self, key: Value) -> Result<u64, HeapError> {
        let items = match self.shallow_hash(key)? {
            KeyHash::Done(hash) => return Ok(hash),
            KeyHash::Items(items) => items,
        };
        // open tuples: items still to hash and the running hash
        let mut open = vec![(items, hash_one(items.len()))];
        let mut finished = 0;
        while let Some((items, acc)) = open.last_mut() {
            let remaining = *items;
            match remaining.split_first() {
                Some((&item, rest)) => {
                    *items = rest;
                    match self.shallow_hash(item)? {
                        KeyHash::Done(hash) => *acc = hash_one((*acc, hash)),
                        KeyHash::Items(inner) => open.push((inner, hash_one(inner.len()))),
                    }
                }
                None => {
                    finished = *acc;
                    open.pop();
                    if let Some((_, outer)) = open.last_mut() {
                        *outer = hash_one((*outer, finished));
                    }
                }
            }
        }
        Ok(finished)
    }

    /// Hash everything but the elements of a tuple.
    fn shallow_hash(&self, key: Value) -> Result<KeyHash<'_>, HeapError> {
        if let Some(number) = self.number(key) {
            return Ok(KeyHash::Done(match number.as_exact_int() {
                Some(n) => hash_one(n),
                None => hash_one(number.as_f64().to_bits()),
            }));
        }
        let Some(r) = key.heap_ref() else {
            return Ok(KeyHash::Done(hash_one(key.raw())));
        };
        let kind = self.header(r).kind();
        if !kind.is_hashable() {
            return Err(HeapError::Unhashable(kind));
        }
        Ok(KeyHash::Done(match self.body(r) {
            Body::Bytes(seq) => hash_one(seq.as_slice()),
            Body::Shorts(seq) => hash_one(seq.as_slice()),
            Body::Objects(seq) => return Ok(KeyHash::Items(seq.as_slice())),
            Body::Hash(table) => table
                .iter()
                .fold(hash_one(table.len()), |acc, (hash, _, _)| acc ^ hash),
            _ => hash_one(key.raw()),
        }))
    }

    /// Key equality used by every hash lookup.
    ///
    /// Tuple elements are compared through a worklist; there is no nesting
    /// limit. Lists and dicts are equal only to themselves.
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            if !self.shallow_equal(a, b, &mut pending) {
                return false;
            }
        }
        true
    }

    /// Compare `a` and `b` one level deep, queueing pairs of tuple elements.
    fn shallow_equal(&self, a: Value, b: Value, pending: &mut Vec<(Value, Value)>) -> bool {
        if a == b {
            return true;
        }
        if let (Some(x), Some(y)) = (self.number(a), self.number(b)) {
            return x.equals(y);
        }
        let (Some(ra), Some(rb)) = (a.heap_ref(), b.heap_ref()) else {
            return false;
        };
        let (ka, kb) = (self.header(ra).kind(), self.header(rb).kind());
        if !comparable(ka, kb) {
            return false;
        }
        match (self.body(ra), self.body(rb)) {
            (Body::Bytes(x), Body::Bytes(y)) => x.as_slice() == y.as_slice(),
            (Body::Shorts(x), Body::Shorts(y)) => x.as_slice() == y.as_slice(),
            (Body::Objects(x), Body::Objects(y)) if ka == TypeTag::Tuple => {
                if x.len() != y.len() {
                    return false;
                }
                let pairs = x.as_slice().iter().zip(y.as_slice());
                pending.extend(pairs.map(|(&p, &q)| (p, q)));
                true
            }
            // members are looked up by hash, so nesting recurses once per set
            (Body::Hash(x), Body::Hash(y)) if !x.stores_values() => {
                x.len() == y.len()
                    && x.iter().all(|(hash, key, _)| {
                        let probe = y.probe(hash, |k| self.values_equal(k, key));
                        matches!(probe, Probe::Found(_))
                    })
            }
            _ => false,
        }
    }

    fn hash_ref(
        &self,
        value: Value,
        expected: &'static str,
        accept: impl Fn(TypeTag) -> bool,
    ) -> Result<HeapRef, HeapError> {
        self.expect_ref(value, expected, accept)
    }

    fn table(&self, r: HeapRef) -> &HashTable {
        match self.body(r) {
            Body::Hash(table) => table,
            _ => unreachable!("hash kind with another body"),
        }
    }

    fn table_mut(&mut self, r: HeapRef) -> &mut HashTable {
        match self.body_mut(r) {
            Body::Hash(table) => table,
            _ => unreachable!("hash kind with another body"),
        }
    }

    fn find(&self, r: HeapRef, key: Value, hash: u64) -> Probe {
        self.table(r).probe(hash, |k| self.values_equal(k, key))
    }

    /// Insert or overwrite; grows the table before touching it.
    fn hash_insert(
        &mut self,
        roots: &mut dyn RootProvider,
        r: HeapRef,
        key: Value,
        value: Value,
    ) -> Result<(), HeapError> {
        let hash = self.hash_of(key)?;
        if let Probe::Found(idx) = self.find(r, key, hash) {
            self.table_mut(r).replace_value(idx, value);
            return Ok(());
        }
        self.reserve_slot(roots, r, &[key, value])?;
        match self.find(r, key, hash) {
            Probe::Vacant(idx) => self.table_mut(r).occupy(idx, hash, key, value),
            probe => unreachable!("no vacant slot after reserve: {probe:?}"),
        }
        Ok(())
    }

    /// Rehash `r` if one more entry would exceed the load factor.
    fn reserve_slot(
        &mut self,
        roots: &mut dyn RootProvider,
        r: HeapRef,
        operands: &[Value],
    ) -> Result<(), HeapError> {
        let load = self.settings().hash_load_factor;
        let min = self.settings().min_hash_capacity;
        let table = self.table(r);
        if !table.needs_rehash(load) {
            return Ok(());
        }
        let Some(capacity) = HashTable::capacity_for(table.len() + 1, load, min) else {
            return self.check_size(None).map(drop);
        };
        let capacity = capacity.max(table.capacity());
        trace!(
            "rehash #{}: {} entries, {} tombstones, {} -> {} slots",
            r.index(),
            table.len(),
            table.tombstones(),
            table.capacity(),
            capacity
        );
        if capacity == table.capacity() {
            let rehashed = table.rehashed(capacity);
            *self.table_mut(r) = rehashed;
            return Ok(());
        }
        let size = self.check_size(hash_block_size(table.stores_values(), capacity))?;
        self.resize(roots, r, operands, size, |body| {
            if let Body::Hash(table) = body {
                *table = table.rehashed(capacity);
            }
        })
    }

    fn hash_remove(&mut self, r: HeapRef, key: Value) -> Result<Value, HeapError> {
        let hash = self.hash_of(key)?;
        match self.find(r, key, hash) {
            Probe::Found(idx) => match self.table_mut(r).remove(idx) {
                Some((_, value)) => Ok(value),
                None => unreachable!("found slot was not occupied"),
            },
            _ => Err(HeapError::KeyNotFound),
        }
    }

    fn hash_lookup(&self, r: HeapRef, key: Value) -> Result<Option<Entry>, HeapError> {
        let hash = self.hash_of(key)?;
        Ok(match self.find(r, key, hash) {
            Probe::Found(idx) => Some(self.table(r).entry(idx)),
            _ => None,
        })
    }

    // ── dict ──────────────────────────────────────────────────────────

    pub fn dict_put(
        &mut self,
        roots: &mut dyn RootProvider,
        dict: Value,
        key: Value,
        value: Value,
    ) -> Result<(), HeapError> {
        let r = self.hash_ref(dict, "dict", |kind| kind == TypeTag::Dict)?;
        self.hash_insert(roots, r, key, value)
    }

    /// `Ok(None)` when the key is absent.
    pub fn dict_get(&self, dict: Value, key: Value) -> Result<Option<Value>, HeapError> {
        let r = self.hash_ref(dict, "dict", |kind| kind == TypeTag::Dict)?;
        Ok(match self.hash_lookup(r, key)? {
            Some(Entry::Occupied { value, .. }) => Some(value),
            _ => None,
        })
    }

    /// Remove `key`, returning its value.
    pub fn dict_del(&mut self, dict: Value, key: Value) -> Result<Value, HeapError> {
        let r = self.hash_ref(dict, "dict", |kind| kind == TypeTag::Dict)?;
        self.hash_remove(r, key)
    }

    // ── set / frozenset ───────────────────────────────────────────────

    pub fn set_put(
        &mut self,
        roots: &mut dyn RootProvider,
        set: Value,
        key: Value,
    ) -> Result<(), HeapError> {
        let r = self.mutable_set_ref(set)?;
        self.hash_insert(roots, r, key, Value::NONE)
    }

    /// The stored member equal to `key`, if any.
    pub fn set_get(&self, set: Value, key: Value) -> Result<Option<Value>, HeapError> {
        let r = self.hash_ref(set, "set", |kind| {
            matches!(kind, TypeTag::Set | TypeTag::FrozenSet)
        })?;
        Ok(match self.hash_lookup(r, key)? {
            Some(Entry::Occupied { key, .. }) => Some(key),
            _ => None,
        })
    }

    pub fn set_del(&mut self, set: Value, key: Value) -> Result<(), HeapError> {
        let r = self.mutable_set_ref(set)?;
        self.hash_remove(r, key).map(drop)
    }

    fn mutable_set_ref(&self, set: Value) -> Result<HeapRef, HeapError> {
        let r = self.hash_ref(set, "set", |kind| {
            matches!(kind, TypeTag::Set | TypeTag::FrozenSet)
        })?;
        match self.header(r).kind() {
            TypeTag::Set => Ok(r),
            kind => Err(HeapError::Immutable(kind)),
        }
    }

    /// Frozenset of `items`. Fails before allocating if any item is unhashable.
    pub fn new_frozenset(
        &mut self,
        roots: &mut dyn RootProvider,
        items: &[Value],
    ) -> Result<Value, HeapError> {
        for &item in items {
            self.hash_of(item)?;
        }
        self.protected(items, |heap| {
            let set = heap.allocate_set(roots, TypeTag::FrozenSet, items.len())?;
            let r = heap.hash_ref(set, "frozenset", |kind| kind == TypeTag::FrozenSet)?;
            for &item in items {
                heap.hash_insert(roots, r, item, Value::NONE)?;
            }
            Ok(set)
        })
    }

    /// Snapshot of the `(key, value)` pairs of a dict, set or frozenset.
    /// Set members pair with None.
    pub fn hash_entries(&self, value: Value) -> Result<Vec<(Value, Value)>, HeapError> {
        let r = self.hash_ref(value, "dict or set", TypeTag::is_hash)?;
        Ok(self
            .table(r)
            .iter()
            .map(|(_, key, value)| (key, value))
            .collect())
    }
}

fn comparable(a: TypeTag, b: TypeTag) -> bool {
    use TypeTag as T;
    let family = |kind: TypeTag| match kind {
        T::Bytes | T::ByteArray | T::Buffer => 1,
        T::Set | T::FrozenSet => 2,
        T::Shorts | T::ShortArray => 3,
        T::SysObj => 0,
        _ => 4,
    };
    if a == b {
        return a != T::SysObj;
    }
    let f = family(a);
    f != 0 && f != 4 && f == family(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeapSettings, NoRoots};

    fn int(n: i32) -> Value {
        Value::small_int(n)
    }

    fn heap() -> Heap {
        Heap::new(HeapSettings::default()).unwrap()
    }

    #[test]
    fn put_get_del() {
        let mut heap = heap();
        let d = heap.allocate_dict(&mut NoRoots, 0).unwrap();
        heap.dict_put(&mut NoRoots, d, int(1), int(10)).unwrap();
        heap.dict_put(&mut NoRoots, d, int(1), int(11)).unwrap();
        assert_eq!(heap.len(d).unwrap(), 1);
        assert_eq!(heap.dict_get(d, int(1)).unwrap(), Some(int(11)));
        assert_eq!(heap.dict_del(d, int(1)).unwrap(), int(11));
        assert_eq!(heap.dict_get(d, int(1)).unwrap(), None);
        assert_eq!(heap.dict_del(d, int(1)), Err(HeapError::KeyNotFound));
    }

    #[test]
    fn numeric_keys_unify() {
        let mut heap = heap();
        let d = heap.allocate_dict(&mut NoRoots, 0).unwrap();
        let wide = heap.allocate_integer(&mut NoRoots, 1).unwrap();
        let float = heap.allocate_float(&mut NoRoots, 1.0).unwrap();
        heap.pin(wide);
        heap.pin(float);
        heap.dict_put(&mut NoRoots, d, int(1), int(100)).unwrap();
        assert_eq!(heap.dict_get(d, wide).unwrap(), Some(int(100)));
        assert_eq!(heap.dict_get(d, float).unwrap(), Some(int(100)));
        assert_eq!(heap.dict_get(d, Value::TRUE).unwrap(), Some(int(100)));
        assert_eq!(heap.hash_of(float).unwrap(), heap.hash_of(int(1)).unwrap());
    }

    #[test]
    fn strings_compare_by_content() {
        let mut heap = heap();
        let mut roots: Vec<Value> = Vec::new();
        let d = heap.allocate_dict(&mut roots, 0).unwrap();
        roots.push(d);
        let k1 = heap.allocate_string(&mut roots, "key").unwrap();
        roots.push(k1);
        heap.dict_put(&mut roots, d, k1, int(1)).unwrap();
        let k2 = heap.allocate_string(&mut roots, "key").unwrap();
        let b = heap.allocate_bytes(&mut roots, b"key").unwrap();
        assert_eq!(heap.dict_get(d, k2).unwrap(), Some(int(1)));
        assert_eq!(heap.dict_get(d, b).unwrap(), None);
    }

    #[test]
    fn tuple_keys_hash_by_elements() {
        let mut heap = heap();
        let t1 = heap.allocate_tuple(&mut NoRoots, &[int(1), int(2)]).unwrap();
        let t2 = heap.allocate_tuple(&mut NoRoots, &[int(1), int(2)]).unwrap();
        let t3 = heap.allocate_tuple(&mut NoRoots, &[int(2), int(1)]).unwrap();
        assert_eq!(heap.hash_of(t1).unwrap(), heap.hash_of(t2).unwrap());
        assert!(heap.values_equal(t1, t2));
        assert!(!heap.values_equal(t1, t3));
    }

    fn nested(heap: &mut Heap, depth: usize, leaf: Value) -> Value {
        let mut value = leaf;
        for _ in 0..depth {
            value = heap.allocate_tuple(&mut NoRoots, &[value]).unwrap();
        }
        heap.pin(value);
        value
    }

    #[test]
    fn deeply_nested_tuple_keys_match() {
        let mut heap = heap();
        let d = heap.allocate_dict(&mut NoRoots, 0).unwrap();
        heap.pin(d);
        let a = nested(&mut heap, 200, int(1));
        let b = nested(&mut heap, 200, int(1));
        let c = nested(&mut heap, 200, int(2));

        assert_eq!(heap.hash_of(a).unwrap(), heap.hash_of(b).unwrap());
        assert!(heap.values_equal(a, b));
        assert!(!heap.values_equal(a, c));

        heap.dict_put(&mut NoRoots, d, a, int(7)).unwrap();
        assert_eq!(heap.dict_get(d, b).unwrap(), Some(int(7)));
        assert_eq!(heap.dict_get(d, c).unwrap(), None);
        assert_eq!(heap.dict_del(d, b).unwrap(), int(7));
        assert_eq!(heap.len(d).unwrap(), 0);
    }

    #[test]
    fn lists_and_dicts_compare_by_identity() {
        let mut heap = heap();
        let mut roots: Vec<Value> = Vec::new();
        let a = heap.allocate_list(&mut roots, &[]).unwrap();
        roots.push(a);
        let b = heap.allocate_list(&mut roots, &[]).unwrap();
        roots.push(b);
        heap.seq_append(&mut roots, a, a).unwrap();
        heap.seq_append(&mut roots, b, b).unwrap();
        assert!(heap.values_equal(a, a));
        assert!(!heap.values_equal(a, b));

        let t1 = heap.allocate_tuple(&mut roots, &[a]).unwrap();
        roots.push(t1);
        let t2 = heap.allocate_tuple(&mut roots, &[a]).unwrap();
        roots.push(t2);
        let t3 = heap.allocate_tuple(&mut roots, &[b]).unwrap();
        assert!(heap.values_equal(t1, t2));
        assert!(!heap.values_equal(t1, t3));

        let d1 = heap.allocate_dict(&mut roots, 0).unwrap();
        roots.push(d1);
        let d2 = heap.allocate_dict(&mut roots, 0).unwrap();
        assert!(!heap.values_equal(d1, d2));
    }

    #[test]
    fn nested_tuple_hash_matches_flat_fold() {
        let mut heap = heap();
        let inner = heap.allocate_tuple(&mut NoRoots, &[int(2), int(3)]).unwrap();
        heap.pin(inner);
        let outer = heap.allocate_tuple(&mut NoRoots, &[int(1), inner]).unwrap();
        let inner_hash = hash_one((hash_one((hash_one(2usize), hash_one(2i64))), hash_one(3i64)));
        let expected = hash_one((hash_one((hash_one(2usize), hash_one(1i64))), inner_hash));
        assert_eq!(heap.hash_of(inner).unwrap(), inner_hash);
        assert_eq!(heap.hash_of(outer).unwrap(), expected);
    }

    #[test]
    fn mutable_keys_are_rejected_without_mutation() {
        let mut heap = heap();
        let d = heap.allocate_dict(&mut NoRoots, 0).unwrap();
        let l = heap.allocate_list(&mut NoRoots, &[]).unwrap();
        assert_eq!(
            heap.dict_put(&mut NoRoots, d, l, int(1)),
            Err(HeapError::Unhashable(TypeTag::List))
        );
        assert_eq!(heap.len(d).unwrap(), 0);
        let inner = heap.allocate_tuple(&mut NoRoots, &[l]).unwrap();
        assert_eq!(heap.hash_of(inner), Err(HeapError::Unhashable(TypeTag::List)));
    }

    #[test]
    fn growth_preserves_entries() {
        let mut heap = heap();
        let d = heap.allocate_dict(&mut NoRoots, 0).unwrap();
        let initial = heap.capacity(d).unwrap();
        for n in 0..100 {
            heap.dict_put(&mut NoRoots, d, int(n), int(n * 2)).unwrap();
        }
        assert!(heap.capacity(d).unwrap() > initial);
        for n in 0..100 {
            assert_eq!(heap.dict_get(d, int(n)).unwrap(), Some(int(n * 2)));
        }
        let r = d.heap_ref().unwrap();
        assert_eq!(heap.header(r).size(), heap.body(r).block_size());
    }

    #[test]
    fn churn_rehashes_in_place() {
        let mut heap = heap();
        let d = heap.allocate_dict(&mut NoRoots, 0).unwrap();
        let capacity = heap.capacity(d).unwrap();
        for n in 0..50 {
            heap.dict_put(&mut NoRoots, d, int(n), int(n)).unwrap();
            heap.dict_del(d, int(n)).unwrap();
        }
        assert_eq!(heap.len(d).unwrap(), 0);
        assert_eq!(heap.capacity(d).unwrap(), capacity);
    }

    #[test]
    fn set_membership() {
        let mut heap = heap();
        let s = heap.allocate_set(&mut NoRoots, TypeTag::Set, 0).unwrap();
        heap.set_put(&mut NoRoots, s, int(3)).unwrap();
        heap.set_put(&mut NoRoots, s, int(3)).unwrap();
        assert_eq!(heap.len(s).unwrap(), 1);
        assert_eq!(heap.set_get(s, int(3)).unwrap(), Some(int(3)));
        heap.set_del(s, int(3)).unwrap();
        assert_eq!(heap.set_del(s, int(3)), Err(HeapError::KeyNotFound));
    }

    #[test]
    fn frozensets_are_immutable_and_hashable() {
        let mut heap = heap();
        let a = heap.new_frozenset(&mut NoRoots, &[int(1), int(2)]).unwrap();
        heap.pin(a);
        let b = heap.new_frozenset(&mut NoRoots, &[int(2), int(1)]).unwrap();
        heap.pin(b);
        assert_eq!(
            heap.set_put(&mut NoRoots, a, int(3)),
            Err(HeapError::Immutable(TypeTag::FrozenSet))
        );
        assert!(heap.values_equal(a, b));
        assert_eq!(heap.hash_of(a).unwrap(), heap.hash_of(b).unwrap());
        let s = heap.allocate_set(&mut NoRoots, TypeTag::Set, 0).unwrap();
        assert_eq!(heap.set_put(&mut NoRoots, s, a), Ok(()));
        assert_eq!(heap.set_get(s, b).unwrap(), Some(a));
    }

    #[test]
    fn entries_snapshot() {
        let mut heap = heap();
        let d = heap.allocate_dict(&mut NoRoots, 0).unwrap();
        heap.dict_put(&mut NoRoots, d, int(1), int(2)).unwrap();
        assert_eq!(heap.hash_entries(d).unwrap(), vec![(int(1), int(2))]);
        assert!(heap.hash_entries(int(1)).is_err());
    }
}
