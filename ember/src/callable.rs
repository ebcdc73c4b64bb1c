//! Record kinds: functions, methods, classes, instances, modules, frames,
//! threads and iterators.
use crate::{
    Allocator, Body, Heap, HeapError, RootProvider, TypeTag, Value,
    object::{Class, Frame, Function, Instance, Method, Module, Thread},
};

macro_rules! record_accessors {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty), $kind:ident, $name:literal;)*) => {
        impl Heap {
            $(
                pub fn $get(&self, value: Value) -> Result<&$ty, HeapError> {
                    let r = self.expect_ref(value, $name, |kind| kind == TypeTag::$kind)?;
                    match self.body(r) {
                        Body::$variant(record) => Ok(record),
                        _ => unreachable!(concat!($name, " with another body")),
                    }
                }

                pub fn $get_mut(&mut self, value: Value) -> Result<&mut $ty, HeapError> {
                    let r = self.expect_ref(value, $name, |kind| kind == TypeTag::$kind)?;
                    match self.body_mut(r) {
                        Body::$variant(record) => Ok(record),
                        _ => unreachable!(concat!($name, " with another body")),
                    }
                }
            )*
        }
    };
}

record_accessors! {
    function, function_mut => Function(Function), Function, "function";
    method, method_mut => Method(Method), Method, "method";
    class, class_mut => Class(Class), Class, "class";
    instance, instance_mut => Instance(Instance), Instance, "instance";
    module, module_mut => Module(Module), Module, "module";
    frame, frame_mut => Frame(Frame), Frame, "frame";
    thread, thread_mut => Thread(Thread), Thread, "thread";
}

impl Heap {
    /// Instance of `class` with an empty attribute dict.
    pub fn new_instance(
        &mut self,
        roots: &mut dyn RootProvider,
        class: Value,
    ) -> Result<Value, HeapError> {
        self.class(class)?;
        self.protected(&[class], |heap| {
            let attributes = heap.allocate_dict(roots, 0)?;
            heap.allocate_instance(roots, class, attributes)
        })
    }

    /// Module named `name` with an empty namespace.
    pub fn new_module(
        &mut self,
        roots: &mut dyn RootProvider,
        name: Value,
    ) -> Result<Value, HeapError> {
        self.protected(&[name], |heap| {
            let namespace = heap.allocate_dict(roots, 0)?;
            heap.allocate_module(roots, name, namespace)
        })
    }

    /// Look `name` up on an instance, class or module.
    ///
    /// Instances search their own attributes, then their class. Classes
    /// search their methods, then their bases depth-first, left to right.
    pub fn get_attr(&self, object: Value, name: Value) -> Result<Option<Value>, HeapError> {
        let mut pending = match self.type_of(object) {
            TypeTag::Instance => {
                let instance = self.instance(object)?;
                if let Some(found) = self.dict_get(instance.attributes, name)? {
                    return Ok(Some(found));
                }
                vec![instance.class]
            }
            TypeTag::Module => return self.dict_get(self.module(object)?.namespace, name),
            TypeTag::Class => vec![object],
            found => {
                return Err(HeapError::TypeMismatch {
                    expected: "instance, class or module",
                    found,
                });
            }
        };

        while let Some(class) = pending.pop() {
            let class = self.class(class)?;
            if let Some(found) = self.dict_get(class.methods, name)? {
                return Ok(Some(found));
            }
            if class.bases.is_ref() {
                pending.extend(self.objects(class.bases)?.iter().rev());
            }
        }
        Ok(None)
    }

    /// Bind `name` on an instance, class or module.
    pub fn set_attr(
        &mut self,
        roots: &mut dyn RootProvider,
        object: Value,
        name: Value,
        value: Value,
    ) -> Result<(), HeapError> {
        let table = match self.type_of(object) {
            TypeTag::Instance => self.instance(object)?.attributes,
            TypeTag::Class => self.class(object)?.methods,
            TypeTag::Module => self.module(object)?.namespace,
            found => {
                return Err(HeapError::TypeMismatch {
                    expected: "instance, class or module",
                    found,
                });
            }
        };
        self.protected(&[object], |heap| heap.dict_put(roots, table, name, value))
    }

    // ── Frames ────────────────────────────────────────────────────────

    pub fn frame_local(&self, frame: Value, index: usize) -> Result<Value, HeapError> {
        let locals = &self.frame(frame)?.locals;
        locals.get(index).copied().ok_or(HeapError::IndexOutOfRange {
            index,
            len: locals.len(),
        })
    }

    pub fn frame_set_local(
        &mut self,
        frame: Value,
        index: usize,
        value: Value,
    ) -> Result<(), HeapError> {
        let locals = &mut self.frame_mut(frame)?.locals;
        let len = locals.len();
        match locals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(HeapError::IndexOutOfRange { index, len }),
        }
    }

    /// Push onto the frame's value stack. The stack never grows.
    pub fn frame_push(&mut self, frame: Value, value: Value) -> Result<(), HeapError> {
        if self.frame_mut(frame)?.stack.push(value) {
            Ok(())
        } else {
            Err(HeapError::Overflow)
        }
    }

    pub fn frame_pop(&mut self, frame: Value) -> Result<Value, HeapError> {
        self.frame_mut(frame)?
            .stack
            .pop()
            .ok_or(HeapError::IndexOutOfRange { index: 0, len: 0 })
    }

    /// Live stack slots, bottom first.
    pub fn frame_stack(&self, frame: Value) -> Result<&[Value], HeapError> {
        Ok(self.frame(frame)?.stack.as_slice())
    }

    // ── Threads ───────────────────────────────────────────────────────

    /// Make `frame` the thread's innermost frame.
    pub fn thread_enter(&mut self, thread: Value, frame: Value) -> Result<(), HeapError> {
        self.frame(frame)?;
        self.thread_mut(thread)?.frame = frame;
        Ok(())
    }

    /// Pop the innermost frame; once the outermost returns, record `result`.
    pub fn thread_return(&mut self, thread: Value, result: Value) -> Result<(), HeapError> {
        let current = self.thread(thread)?.frame;
        let parent = self.frame(current)?.parent;
        let record = self.thread_mut(thread)?;
        record.frame = parent;
        if parent.is_none() {
            record.result = result;
        }
        Ok(())
    }

    // ── Iterators ─────────────────────────────────────────────────────

    /// Next item of an iterator, `Ok(None)` once exhausted.
    ///
    /// Sequences yield their elements, strings one-character strings,
    /// ranges their integers and hashes their keys.
    pub fn iter_next(
        &mut self,
        roots: &mut dyn RootProvider,
        iterator: Value,
    ) -> Result<Option<Value>, HeapError> {
        let r = self.expect_ref(iterator, "iterator", |kind| kind == TypeTag::Iterator)?;
        let (iterable, position) = match self.body(r) {
            Body::Iterator(iter) => (iter.iterable, iter.position),
            _ => unreachable!("iterator with another body"),
        };
        let Some((item, next)) = self.item_at(roots, iterator, iterable, position)? else {
            return Ok(None);
        };
        if let Body::Iterator(iter) = self.body_mut(r) {
            iter.position = next;
        }
        Ok(Some(item))
    }

    fn item_at(
        &mut self,
        roots: &mut dyn RootProvider,
        iterator: Value,
        iterable: Value,
        position: usize,
    ) -> Result<Option<(Value, usize)>, HeapError> {
        let kind = self.type_of(iterable);
        let Some(source) = iterable.heap_ref() else {
            return Err(HeapError::TypeMismatch {
                expected: "iterable",
                found: kind,
            });
        };
        match kind {
            TypeTag::String => {
                let text = self.str_value(iterable)?;
                let Some(ch) = text.get(position..).and_then(|rest| rest.chars().next()) else {
                    return Ok(None);
                };
                let mut buf = [0; 4];
                let piece = ch.encode_utf8(&mut buf);
                let item = self.protected(&[iterator], |heap| heap.allocate_string(roots, piece))?;
                Ok(Some((item, position + ch.len_utf8())))
            }
            TypeTag::Range => {
                let Body::Range(range) = self.body(source) else {
                    unreachable!("range with another body");
                };
                let Some(n) = range.nth(position) else {
                    return Ok(None);
                };
                let item = self.protected(&[iterator], |heap| heap.allocate_int(roots, n))?;
                Ok(Some((item, position + 1)))
            }
            _ if kind.is_sequence() => {
                if position >= self.len(iterable)? {
                    return Ok(None);
                }
                Ok(Some((self.seq_get(iterable, position)?, position + 1)))
            }
            _ if kind.is_hash() => {
                let Body::Hash(table) = self.body(source) else {
                    unreachable!("hash kind with another body");
                };
                Ok(table
                    .next_occupied(position)
                    .map(|(idx, key, _)| (key, idx + 1)))
            }
            found => Err(HeapError::TypeMismatch {
                expected: "iterable",
                found,
            }),
        }
    }
}
