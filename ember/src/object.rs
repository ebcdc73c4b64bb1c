//! Heap block payloads.
//!
//! Every heap kind maps onto one [`Body`] variant. A body answers the two
//! questions the collector asks of any block: how many arena bytes it
//! occupies ([`Body::block_size`]) and which values it references
//! ([`Visitable::visit_edges`]).
use std::mem;

use crate::{HashTable, TypeTag, Value, Visitable, Visitor};

/// Size of one value slot.
pub const WORD: usize = mem::size_of::<Value>();
/// Size of the block header.
pub const HEADER_SIZE: usize = 8;
/// Block sizes are rounded up to this.
pub const ALIGN: usize = 8;
/// Capacity and length fields of sequence and hash payloads.
pub const SEQUENCE_META: usize = 8;

const DICT_ENTRY: usize = 2 * WORD + 8;
const SET_ENTRY: usize = WORD + 8;
const FRAME_FIXED: usize = 3 * WORD + 8;

#[inline]
pub const fn align_up(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}

#[inline]
const fn block_of(payload: usize) -> usize {
    align_up(HEADER_SIZE + payload)
}

/// Like [`block_of`] for `count` elements of `unit` bytes after `fixed`
/// bytes; `None` when the size does not fit a `usize`.
fn checked_block(fixed: usize, count: usize, unit: usize) -> Option<usize> {
    count
        .checked_mul(unit)?
        .checked_add(fixed + HEADER_SIZE + ALIGN - 1)
        .map(|size| size & !(ALIGN - 1))
}

/// Block size of a sequence of `kind` with room for `capacity` elements.
/// `None` on overflow.
pub fn sequence_block_size(kind: TypeTag, capacity: usize) -> Option<usize> {
    let unit = match kind.shape() {
        crate::Shape::ByteSequence => 1,
        crate::Shape::ShortSequence => 2,
        crate::Shape::ObjectSequence => WORD,
        _ => panic!("{kind} is not a sequence kind"),
    };
    checked_block(SEQUENCE_META, capacity, unit)
}

/// Block size of a hash table with `slots` entries.
pub fn hash_block_size(stores_values: bool, slots: usize) -> Option<usize> {
    let entry = if stores_values { DICT_ENTRY } else { SET_ENTRY };
    checked_block(SEQUENCE_META, slots, entry)
}

/// Block size of a frame with `locals` slots and a `stack_size` value stack.
pub fn frame_block_size(locals: usize, stack_size: usize) -> Option<usize> {
    checked_block(FRAME_FIXED, locals.checked_add(stack_size)?, WORD)
}

/// Growable storage for one sequence: `data.len()` is the capacity,
/// `len` the logical element count.
///
/// Slots past `len` always hold `T::default()`.
#[derive(Debug, Clone)]
pub struct Seq<T> {
    len: usize,
    data: Box<[T]>,
}

impl<T: Copy + Default> Seq<T> {
    /// Empty sequence with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            len: 0,
            data: vec![T::default(); capacity].into_boxed_slice(),
        }
    }

    /// Full sequence of default elements.
    pub fn zeroed(len: usize) -> Self {
        Self {
            len,
            data: vec![T::default(); len].into_boxed_slice(),
        }
    }

    /// Full sequence: length equals capacity.
    pub fn filled(items: &[T]) -> Self {
        Self {
            len: items.len(),
            data: Box::from(items),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.as_slice().get(index).copied()
    }

    #[inline]
    pub fn set(&mut self, index: usize, item: T) -> bool {
        match self.as_mut_slice().get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Returns `false` when full; growing is the heap's job.
    pub fn push(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[self.len] = item;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(mem::take(&mut self.data[self.len]))
    }

    /// Set the logical length within capacity; uncovered slots are reset.
    pub fn set_len(&mut self, len: usize) -> bool {
        if len > self.capacity() {
            return false;
        }
        if len < self.len {
            self.data[len..self.len].fill(T::default());
        }
        self.len = len;
        true
    }

    /// Move the contents into a larger buffer.
    pub fn grow(&mut self, capacity: usize) {
        debug_assert!(capacity >= self.capacity());
        let mut data = vec![T::default(); capacity].into_boxed_slice();
        data[..self.len].copy_from_slice(self.as_slice());
        self.data = data;
    }
}

impl Visitable for Seq<Value> {
    #[inline]
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        self.as_slice().visit_edges(visitor);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            self.stop.saturating_sub(self.start)
        } else {
            self.start.saturating_sub(self.stop)
        };
        if span <= 0 {
            return 0;
        }
        let step = self.step.unsigned_abs();
        span.unsigned_abs().div_ceil(step) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nth(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        Some(self.start + self.step * index as i64)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Slice {
    pub start: Value,
    pub stop: Value,
    pub step: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct Iter {
    pub iterable: Value,
    pub position: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Function {
    pub name: Value,
    /// Index of the code object in the program image.
    pub code: u32,
    pub module: Value,
    /// Tuple of default argument values or None.
    pub defaults: Value,
    /// Tuple of captured cells or None.
    pub closure: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct Method {
    pub function: Value,
    pub receiver: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct Class {
    pub name: Value,
    /// Tuple of base classes.
    pub bases: Value,
    /// Dict of class attributes and methods.
    pub methods: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct Instance {
    pub class: Value,
    /// Dict of instance attributes.
    pub attributes: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct Module {
    pub name: Value,
    /// Dict of module globals.
    pub namespace: Value,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub parent: Value,
    pub function: Value,
    pub module: Value,
    pub pc: u32,
    pub locals: Box<[Value]>,
    pub stack: Seq<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct Thread {
    pub id: u32,
    pub priority: u8,
    /// Innermost frame, None once finished.
    pub frame: Value,
    pub result: Value,
}

/// Payload of a heap block. The header's [`TypeTag`] selects which kinds
/// share a variant (e.g. `Objects` serves both list and tuple).
#[derive(Debug)]
pub enum Body {
    Integer(i64),
    Float(f64),
    Bytes(Seq<u8>),
    Shorts(Seq<u16>),
    Objects(Seq<Value>),
    Hash(HashTable),
    Range(Range),
    Slice(Slice),
    Iterator(Iter),
    Function(Function),
    Method(Method),
    Class(Class),
    Instance(Instance),
    Module(Module),
    Frame(Frame),
    Thread(Thread),
}

impl Body {
    /// Whether this payload is a valid representation of `kind`.
    pub fn fits(&self, kind: TypeTag) -> bool {
        use TypeTag as T;
        match self {
            Body::Integer(_) => kind == T::Integer,
            Body::Float(_) => kind == T::Float,
            Body::Bytes(_) => matches!(
                kind,
                T::String | T::Bytes | T::ByteArray | T::Buffer | T::SysObj
            ),
            Body::Shorts(_) => matches!(kind, T::Shorts | T::ShortArray),
            Body::Objects(_) => matches!(kind, T::List | T::Tuple),
            Body::Hash(table) => match kind {
                T::Dict => table.stores_values(),
                T::Set | T::FrozenSet => !table.stores_values(),
                _ => false,
            },
            Body::Range(_) => kind == T::Range,
            Body::Slice(_) => kind == T::Slice,
            Body::Iterator(_) => kind == T::Iterator,
            Body::Function(_) => kind == T::Function,
            Body::Method(_) => kind == T::Method,
            Body::Class(_) => kind == T::Class,
            Body::Instance(_) => kind == T::Instance,
            Body::Module(_) => kind == T::Module,
            Body::Frame(_) => kind == T::Frame,
            Body::Thread(_) => kind == T::Thread,
        }
    }

    /// Bytes of payload following the header.
    pub fn payload_size(&self) -> usize {
        match self {
            Body::Integer(_) | Body::Float(_) => 8,
            Body::Bytes(seq) => SEQUENCE_META + seq.capacity(),
            Body::Shorts(seq) => SEQUENCE_META + 2 * seq.capacity(),
            Body::Objects(seq) => SEQUENCE_META + WORD * seq.capacity(),
            Body::Hash(table) => {
                let entry = if table.stores_values() { DICT_ENTRY } else { SET_ENTRY };
                SEQUENCE_META + entry * table.capacity()
            }
            Body::Range(_) => 3 * 8,
            Body::Slice(_) => 3 * WORD,
            Body::Iterator(_) => WORD + 8,
            Body::Function(_) => 4 * WORD + 8,
            Body::Method(_) => 2 * WORD,
            Body::Class(_) => 3 * WORD,
            Body::Instance(_) => 2 * WORD,
            Body::Module(_) => 2 * WORD,
            Body::Frame(frame) => {
                FRAME_FIXED + WORD * (frame.locals.len() + frame.stack.capacity())
            }
            Body::Thread(_) => 2 * WORD + 8,
        }
    }

    /// Total arena bytes of the block: header plus payload, aligned.
    #[inline]
    pub fn block_size(&self) -> usize {
        block_of(self.payload_size())
    }
}

impl Visitable for Body {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        match self {
            Body::Integer(_)
            | Body::Float(_)
            | Body::Bytes(_)
            | Body::Shorts(_)
            | Body::Range(_) => {}
            Body::Objects(seq) => seq.visit_edges(visitor),
            Body::Hash(table) => table.visit_edges(visitor),
            Body::Slice(slice) => {
                visitor.visit(slice.start);
                visitor.visit(slice.stop);
                visitor.visit(slice.step);
            }
            Body::Iterator(iter) => visitor.visit(iter.iterable),
            Body::Function(function) => {
                visitor.visit(function.name);
                visitor.visit(function.module);
                visitor.visit(function.defaults);
                visitor.visit(function.closure);
            }
            Body::Method(method) => {
                visitor.visit(method.function);
                visitor.visit(method.receiver);
            }
            Body::Class(class) => {
                visitor.visit(class.name);
                visitor.visit(class.bases);
                visitor.visit(class.methods);
            }
            Body::Instance(instance) => {
                visitor.visit(instance.class);
                visitor.visit(instance.attributes);
            }
            Body::Module(module) => {
                visitor.visit(module.name);
                visitor.visit(module.namespace);
            }
            Body::Frame(frame) => {
                visitor.visit(frame.parent);
                visitor.visit(frame.function);
                visitor.visit(frame.module);
                frame.locals.visit_edges(visitor);
                frame.stack.visit_edges(visitor);
            }
            Body::Thread(thread) => {
                visitor.visit(thread.frame);
                visitor.visit(thread.result);
            }
        }
    }
}
