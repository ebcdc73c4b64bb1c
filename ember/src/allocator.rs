use crate::{
    Body, HashTable, Heap, HeapError, HeapSettings, RootProvider, Seq, TypeTag,
    Value,
    object::{
        Class, Frame, Function, Instance, Iter, Method, Module, Range, Slice, Thread,
        frame_block_size, hash_block_size, sequence_block_size,
    },
    types::Shape,
};

/// Typed construction entry points.
///
/// Only [`Allocator::allocate`] touches the arena; every other method builds
/// a body and hands it over. Every method may collect, so values passed in
/// are kept alive by the body under construction and nothing else needs to
/// be rooted for the duration of the call.
///
/// Constructors sized by a count pass the block size through
/// [`Allocator::check_size`] first, so a request the arena can never hold
/// fails with [`HeapError::OutOfMemory`] before its payload is built.
pub trait Allocator {
    fn allocate(
        &mut self,
        roots: &mut dyn RootProvider,
        kind: TypeTag,
        body: Body,
    ) -> Result<Value, HeapError>;

    fn heap_settings(&self) -> &HeapSettings;

    /// `size` is `None` when computing it overflowed.
    fn check_size(&self, size: Option<usize>) -> Result<usize, HeapError>;

    /// Slot count for a hash table holding `hint` entries, checked against
    /// the arena.
    fn hash_capacity(&self, hint: usize, stores_values: bool) -> Result<usize, HeapError> {
        let settings = self.heap_settings();
        let slots = HashTable::capacity_for(
            hint,
            settings.hash_load_factor,
            settings.min_hash_capacity,
        );
        let Some(slots) = slots else {
            return self.check_size(None);
        };
        self.check_size(hash_block_size(stores_values, slots))?;
        Ok(slots)
    }

    /// Inline small integer when `n` fits, heap integer otherwise.
    fn allocate_int(
        &mut self,
        roots: &mut dyn RootProvider,
        n: i64,
    ) -> Result<Value, HeapError> {
        if Value::fits_small_int(n) {
            Ok(Value::small_int(n as i32))
        } else {
            self.allocate_integer(roots, n)
        }
    }

    fn allocate_integer(
        &mut self,
        roots: &mut dyn RootProvider,
        n: i64,
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::Integer, Body::Integer(n))
    }

    fn allocate_float(
        &mut self,
        roots: &mut dyn RootProvider,
        value: f64,
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::Float, Body::Float(value))
    }

    /// Sequence of `kind` sized for `len` elements.
    ///
    /// Mutable kinds start empty with capacity `len`; immutable kinds have
    /// length `len` and zero-filled contents.
    fn allocate_sequence(
        &mut self,
        roots: &mut dyn RootProvider,
        kind: TypeTag,
        len: usize,
    ) -> Result<Value, HeapError> {
        if !kind.is_sequence() {
            return Err(HeapError::TypeMismatch {
                expected: "sequence kind",
                found: kind,
            });
        }
        self.check_size(sequence_block_size(kind, len))?;
        let mutable = kind.is_mutable();
        let body = match kind.shape() {
            Shape::ByteSequence if mutable => Body::Bytes(Seq::with_capacity(len)),
            Shape::ByteSequence => Body::Bytes(Seq::zeroed(len)),
            Shape::ShortSequence if mutable => Body::Shorts(Seq::with_capacity(len)),
            Shape::ShortSequence => Body::Shorts(Seq::zeroed(len)),
            Shape::ObjectSequence if mutable => Body::Objects(Seq::with_capacity(len)),
            _ => Body::Objects(Seq::zeroed(len)),
        };
        self.allocate(roots, kind, body)
    }

    fn allocate_string(
        &mut self,
        roots: &mut dyn RootProvider,
        text: &str,
    ) -> Result<Value, HeapError> {
        let body = Body::Bytes(Seq::filled(text.as_bytes()));
        self.allocate(roots, TypeTag::String, body)
    }

    fn allocate_bytes(
        &mut self,
        roots: &mut dyn RootProvider,
        data: &[u8],
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::Bytes, Body::Bytes(Seq::filled(data)))
    }

    /// Bytearray holding `data`, with no spare capacity.
    fn allocate_bytearray(
        &mut self,
        roots: &mut dyn RootProvider,
        data: &[u8],
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::ByteArray, Body::Bytes(Seq::filled(data)))
    }

    fn allocate_shorts(
        &mut self,
        roots: &mut dyn RootProvider,
        data: &[u16],
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::Shorts, Body::Shorts(Seq::filled(data)))
    }

    fn allocate_shortarray(
        &mut self,
        roots: &mut dyn RootProvider,
        data: &[u16],
    ) -> Result<Value, HeapError> {
        let body = Body::Shorts(Seq::filled(data));
        self.allocate(roots, TypeTag::ShortArray, body)
    }

    fn allocate_tuple(
        &mut self,
        roots: &mut dyn RootProvider,
        items: &[Value],
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::Tuple, Body::Objects(Seq::filled(items)))
    }

    /// List whose length is `items.len()`.
    fn allocate_list(
        &mut self,
        roots: &mut dyn RootProvider,
        items: &[Value],
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::List, Body::Objects(Seq::filled(items)))
    }

    /// Empty growable byte buffer.
    fn allocate_buffer(
        &mut self,
        roots: &mut dyn RootProvider,
        capacity: usize,
    ) -> Result<Value, HeapError> {
        self.check_size(sequence_block_size(TypeTag::Buffer, capacity))?;
        let body = Body::Bytes(Seq::with_capacity(capacity));
        self.allocate(roots, TypeTag::Buffer, body)
    }

    /// Zeroed fixed-size blob owned by a native module.
    fn allocate_sysobj(
        &mut self,
        roots: &mut dyn RootProvider,
        size: usize,
    ) -> Result<Value, HeapError> {
        self.check_size(sequence_block_size(TypeTag::SysObj, size))?;
        self.allocate(roots, TypeTag::SysObj, Body::Bytes(Seq::zeroed(size)))
    }

    /// Dict with room for `hint` entries before its first rehash.
    fn allocate_dict(
        &mut self,
        roots: &mut dyn RootProvider,
        hint: usize,
    ) -> Result<Value, HeapError> {
        let capacity = self.hash_capacity(hint, true)?;
        let body = Body::Hash(HashTable::with_capacity(capacity, true));
        self.allocate(roots, TypeTag::Dict, body)
    }

    /// Empty set or frozenset with room for `hint` members.
    fn allocate_set(
        &mut self,
        roots: &mut dyn RootProvider,
        kind: TypeTag,
        hint: usize,
    ) -> Result<Value, HeapError> {
        if !matches!(kind, TypeTag::Set | TypeTag::FrozenSet) {
            return Err(HeapError::TypeMismatch {
                expected: "set kind",
                found: kind,
            });
        }
        let capacity = self.hash_capacity(hint, false)?;
        let body = Body::Hash(HashTable::with_capacity(capacity, false));
        self.allocate(roots, kind, body)
    }

    fn allocate_range(
        &mut self,
        roots: &mut dyn RootProvider,
        start: i64,
        stop: i64,
        step: i64,
    ) -> Result<Value, HeapError> {
        if step == 0 {
            return Err(HeapError::ValueOutOfRange(TypeTag::Range));
        }
        let body = Body::Range(Range { start, stop, step });
        self.allocate(roots, TypeTag::Range, body)
    }

    fn allocate_slice(
        &mut self,
        roots: &mut dyn RootProvider,
        start: Value,
        stop: Value,
        step: Value,
    ) -> Result<Value, HeapError> {
        let body = Body::Slice(Slice { start, stop, step });
        self.allocate(roots, TypeTag::Slice, body)
    }

    fn allocate_iterator(
        &mut self,
        roots: &mut dyn RootProvider,
        iterable: Value,
    ) -> Result<Value, HeapError> {
        let body = Body::Iterator(Iter {
            iterable,
            position: 0,
        });
        self.allocate(roots, TypeTag::Iterator, body)
    }

    fn allocate_function(
        &mut self,
        roots: &mut dyn RootProvider,
        function: Function,
    ) -> Result<Value, HeapError> {
        self.allocate(roots, TypeTag::Function, Body::Function(function))
    }

    fn allocate_method(
        &mut self,
        roots: &mut dyn RootProvider,
        function: Value,
        receiver: Value,
    ) -> Result<Value, HeapError> {
        let body = Body::Method(Method { function, receiver });
        self.allocate(roots, TypeTag::Method, body)
    }

    fn allocate_class(
        &mut self,
        roots: &mut dyn RootProvider,
        name: Value,
        bases: Value,
        methods: Value,
    ) -> Result<Value, HeapError> {
        let body = Body::Class(Class {
            name,
            bases,
            methods,
        });
        self.allocate(roots, TypeTag::Class, body)
    }

    fn allocate_instance(
        &mut self,
        roots: &mut dyn RootProvider,
        class: Value,
        attributes: Value,
    ) -> Result<Value, HeapError> {
        let body = Body::Instance(Instance { class, attributes });
        self.allocate(roots, TypeTag::Instance, body)
    }

    fn allocate_module(
        &mut self,
        roots: &mut dyn RootProvider,
        name: Value,
        namespace: Value,
    ) -> Result<Value, HeapError> {
        let body = Body::Module(Module { name, namespace });
        self.allocate(roots, TypeTag::Module, body)
    }

    /// Frame with `locals` slots set to None and an empty value stack of
    /// `stack_size` entries.
    fn allocate_frame(
        &mut self,
        roots: &mut dyn RootProvider,
        parent: Value,
        function: Value,
        module: Value,
        locals: usize,
        stack_size: usize,
    ) -> Result<Value, HeapError> {
        self.check_size(frame_block_size(locals, stack_size))?;
        let body = Body::Frame(Frame {
            parent,
            function,
            module,
            pc: 0,
            locals: vec![Value::NONE; locals].into_boxed_slice(),
            stack: Seq::with_capacity(stack_size),
        });
        self.allocate(roots, TypeTag::Frame, body)
    }

    fn allocate_thread(
        &mut self,
        roots: &mut dyn RootProvider,
        id: u32,
        priority: u8,
        frame: Value,
    ) -> Result<Value, HeapError> {
        let body = Body::Thread(Thread {
            id,
            priority,
            frame,
            result: Value::NONE,
        });
        self.allocate(roots, TypeTag::Thread, body)
    }
}

impl Allocator for Heap {
    #[inline]
    fn allocate(
        &mut self,
        roots: &mut dyn RootProvider,
        kind: TypeTag,
        body: Body,
    ) -> Result<Value, HeapError> {
        self.allocate_body(roots, kind, body).map(Value::from)
    }

    #[inline]
    fn heap_settings(&self) -> &HeapSettings {
        self.settings()
    }

    #[inline]
    fn check_size(&self, size: Option<usize>) -> Result<usize, HeapError> {
        Heap::check_size(self, size)
    }
}
