//! Sequence accessors: strings, bytes, 16-bit arrays, lists and tuples.
//!
//! Indices are unsigned; negative indexing is resolved by the interpreter.
use crate::{
    Body, Heap, HeapError, HeapRef, RootProvider, TypeTag, Value,
    object::sequence_block_size,
};

/// Growth policy for appends: double, starting at four.
#[inline]
fn grown_capacity(capacity: usize, needed: usize) -> usize {
    needed.max(capacity.saturating_mul(2)).max(4)
}

impl Heap {
    fn sequence_ref(&self, value: Value) -> Result<HeapRef, HeapError> {
        self.expect_ref(value, "sequence", TypeTag::is_sequence)
    }

    fn mutable_sequence_ref(&self, value: Value) -> Result<(HeapRef, TypeTag), HeapError> {
        let r = self.sequence_ref(value)?;
        let kind = self.header(r).kind();
        if !kind.is_mutable() {
            return Err(HeapError::Immutable(kind));
        }
        Ok((r, kind))
    }

    fn growable_sequence_ref(&self, value: Value) -> Result<(HeapRef, TypeTag), HeapError> {
        let (r, kind) = self.mutable_sequence_ref(value)?;
        if !kind.is_growable() {
            return Err(HeapError::TypeMismatch {
                expected: "growable sequence",
                found: kind,
            });
        }
        Ok((r, kind))
    }

    /// Logical length of a sequence, hash or range.
    pub fn len(&self, value: Value) -> Result<usize, HeapError> {
        let found = self.type_of(value);
        let Some(r) = value.heap_ref() else {
            return Err(HeapError::TypeMismatch {
                expected: "sized object",
                found,
            });
        };
        match self.body(r) {
            Body::Bytes(seq) => Ok(seq.len()),
            Body::Shorts(seq) => Ok(seq.len()),
            Body::Objects(seq) => Ok(seq.len()),
            Body::Hash(table) => Ok(table.len()),
            Body::Range(range) => Ok(range.len()),
            _ => Err(HeapError::TypeMismatch {
                expected: "sized object",
                found,
            }),
        }
    }

    /// Element capacity of a sequence, slot count of a hash.
    pub fn capacity(&self, value: Value) -> Result<usize, HeapError> {
        let r = self.expect_ref(value, "sequence or hash", |kind| {
            kind.is_sequence() || kind.is_hash()
        })?;
        Ok(match self.body(r) {
            Body::Bytes(seq) => seq.capacity(),
            Body::Shorts(seq) => seq.capacity(),
            Body::Objects(seq) => seq.capacity(),
            Body::Hash(table) => table.capacity(),
            _ => unreachable!("sequence or hash kind with another body"),
        })
    }

    /// Element `index` as a value; byte and 16-bit elements are small ints.
    pub fn seq_get(&self, value: Value, index: usize) -> Result<Value, HeapError> {
        let r = self.sequence_ref(value)?;
        let (item, len) = match self.body(r) {
            Body::Bytes(seq) => (seq.get(index).map(|b| Value::small_int(b as i32)), seq.len()),
            Body::Shorts(seq) => (seq.get(index).map(|s| Value::small_int(s as i32)), seq.len()),
            Body::Objects(seq) => (seq.get(index), seq.len()),
            _ => unreachable!("sequence kind with another body"),
        };
        item.ok_or(HeapError::IndexOutOfRange { index, len })
    }

    /// Replace element `index` of a mutable sequence.
    pub fn seq_set(&mut self, value: Value, index: usize, item: Value) -> Result<(), HeapError> {
        let (r, kind) = self.mutable_sequence_ref(value)?;
        self.check_element(kind, item)?;
        let (stored, len) = match self.body_mut(r) {
            Body::Bytes(seq) => (seq.set(index, item.small_int_value() as u8), seq.len()),
            Body::Shorts(seq) => (seq.set(index, item.small_int_value() as u16), seq.len()),
            Body::Objects(seq) => (seq.set(index, item), seq.len()),
            _ => unreachable!("sequence kind with another body"),
        };
        if stored {
            Ok(())
        } else {
            Err(HeapError::IndexOutOfRange { index, len })
        }
    }

    /// Whether `item` can be stored in a sequence of `kind`.
    fn check_element(&self, kind: TypeTag, item: Value) -> Result<(), HeapError> {
        let max = match kind.shape() {
            crate::Shape::ByteSequence => u8::MAX as i32,
            crate::Shape::ShortSequence => u16::MAX as i32,
            _ => return Ok(()),
        };
        if !item.is_small_int() {
            return Err(HeapError::TypeMismatch {
                expected: "int",
                found: self.type_of(item),
            });
        }
        if !(0..=max).contains(&item.small_int_value()) {
            return Err(HeapError::ValueOutOfRange(kind));
        }
        Ok(())
    }

    /// Append to a growable sequence, doubling its block when full.
    pub fn seq_append(
        &mut self,
        roots: &mut dyn RootProvider,
        value: Value,
        item: Value,
    ) -> Result<(), HeapError> {
        let (r, kind) = self.growable_sequence_ref(value)?;
        self.check_element(kind, item)?;
        let (len, capacity) = self.seq_extent(r);
        if len == capacity {
            let target = grown_capacity(capacity, len + 1);
            self.grow_sequence(roots, r, kind, &[item], target)?;
        }
        let pushed = match self.body_mut(r) {
            Body::Bytes(seq) => seq.push(item.small_int_value() as u8),
            Body::Shorts(seq) => seq.push(item.small_int_value() as u16),
            Body::Objects(seq) => seq.push(item),
            _ => unreachable!("sequence kind with another body"),
        };
        debug_assert!(pushed, "append after growth failed");
        Ok(())
    }

    /// Append every item of `items`, growing at most once.
    pub fn seq_extend(
        &mut self,
        roots: &mut dyn RootProvider,
        value: Value,
        items: &[Value],
    ) -> Result<(), HeapError> {
        let (r, kind) = self.growable_sequence_ref(value)?;
        for &item in items {
            self.check_element(kind, item)?;
        }
        let (len, capacity) = self.seq_extent(r);
        let needed = len.saturating_add(items.len());
        if needed > capacity {
            let target = grown_capacity(capacity, needed);
            self.grow_sequence(roots, r, kind, items, target)?;
        }
        for &item in items {
            match self.body_mut(r) {
                Body::Bytes(seq) => seq.push(item.small_int_value() as u8),
                Body::Shorts(seq) => seq.push(item.small_int_value() as u16),
                Body::Objects(seq) => seq.push(item),
                _ => unreachable!("sequence kind with another body"),
            };
        }
        Ok(())
    }

    /// Remove and return the last element.
    pub fn seq_pop(&mut self, value: Value) -> Result<Value, HeapError> {
        let (r, _) = self.growable_sequence_ref(value)?;
        let item = match self.body_mut(r) {
            Body::Bytes(seq) => seq.pop().map(|b| Value::small_int(b as i32)),
            Body::Shorts(seq) => seq.pop().map(|s| Value::small_int(s as i32)),
            Body::Objects(seq) => seq.pop(),
            _ => unreachable!("sequence kind with another body"),
        };
        item.ok_or(HeapError::IndexOutOfRange { index: 0, len: 0 })
    }

    /// Make room for at least `capacity` elements.
    pub fn seq_reserve(
        &mut self,
        roots: &mut dyn RootProvider,
        value: Value,
        capacity: usize,
    ) -> Result<(), HeapError> {
        let (r, kind) = self.growable_sequence_ref(value)?;
        if capacity > self.seq_extent(r).1 {
            self.grow_sequence(roots, r, kind, &[], capacity)?;
        }
        Ok(())
    }

    /// Set the logical length of a mutable sequence within its capacity.
    /// Exposed elements read as zero or None.
    pub fn seq_set_len(&mut self, value: Value, len: usize) -> Result<(), HeapError> {
        let (r, _) = self.mutable_sequence_ref(value)?;
        let capacity = self.seq_extent(r).1;
        let done = match self.body_mut(r) {
            Body::Bytes(seq) => seq.set_len(len),
            Body::Shorts(seq) => seq.set_len(len),
            Body::Objects(seq) => seq.set_len(len),
            _ => unreachable!("sequence kind with another body"),
        };
        if done {
            Ok(())
        } else {
            Err(HeapError::IndexOutOfRange {
                index: len,
                len: capacity,
            })
        }
    }

    fn seq_extent(&self, r: HeapRef) -> (usize, usize) {
        match self.body(r) {
            Body::Bytes(seq) => (seq.len(), seq.capacity()),
            Body::Shorts(seq) => (seq.len(), seq.capacity()),
            Body::Objects(seq) => (seq.len(), seq.capacity()),
            _ => unreachable!("sequence kind with another body"),
        }
    }

    fn grow_sequence(
        &mut self,
        roots: &mut dyn RootProvider,
        r: HeapRef,
        kind: TypeTag,
        operands: &[Value],
        capacity: usize,
    ) -> Result<(), HeapError> {
        let size = self.check_size(sequence_block_size(kind, capacity))?;
        self.resize(roots, r, operands, size, |body| match body {
            Body::Bytes(seq) => seq.grow(capacity),
            Body::Shorts(seq) => seq.grow(capacity),
            Body::Objects(seq) => seq.grow(capacity),
            _ => unreachable!("sequence kind with another body"),
        })
    }

    // ── Raw views ─────────────────────────────────────────────────────

    pub fn bytes(&self, value: Value) -> Result<&[u8], HeapError> {
        let r = self.expect_ref(value, "byte sequence", |kind| {
            kind.shape() == crate::Shape::ByteSequence
        })?;
        match self.body(r) {
            Body::Bytes(seq) => Ok(seq.as_slice()),
            _ => unreachable!("byte kind with another body"),
        }
    }

    pub fn bytes_mut(&mut self, value: Value) -> Result<&mut [u8], HeapError> {
        let (r, kind) = self.mutable_sequence_ref(value)?;
        if kind.shape() != crate::Shape::ByteSequence {
            return Err(HeapError::TypeMismatch {
                expected: "byte sequence",
                found: kind,
            });
        }
        match self.body_mut(r) {
            Body::Bytes(seq) => Ok(seq.as_mut_slice()),
            _ => unreachable!("byte kind with another body"),
        }
    }

    pub fn str_value(&self, value: Value) -> Result<&str, HeapError> {
        self.expect_ref(value, "str", |kind| kind == TypeTag::String)?;
        std::str::from_utf8(self.bytes(value)?)
            .map_err(|_| HeapError::ValueOutOfRange(TypeTag::String))
    }

    pub fn shorts(&self, value: Value) -> Result<&[u16], HeapError> {
        let r = self.expect_ref(value, "short sequence", |kind| {
            kind.shape() == crate::Shape::ShortSequence
        })?;
        match self.body(r) {
            Body::Shorts(seq) => Ok(seq.as_slice()),
            _ => unreachable!("short kind with another body"),
        }
    }

    /// Elements of a list or tuple.
    pub fn objects(&self, value: Value) -> Result<&[Value], HeapError> {
        let r = self.expect_ref(value, "list or tuple", |kind| {
            matches!(kind, TypeTag::List | TypeTag::Tuple)
        })?;
        match self.body(r) {
            Body::Objects(seq) => Ok(seq.as_slice()),
            _ => unreachable!("object sequence kind with another body"),
        }
    }
}
