//! Argument conversion for native functions.
//!
//! A format string names one conversion per argument:
//!
//! | char | accepts              | produces          |
//! |------|----------------------|-------------------|
//! | `l`  | int                  | [`Arg::Long`]     |
//! | `i`  | int in i32 range     | [`Arg::Int`]      |
//! | `s`  | str, bytes, bytearray| [`Arg::Bytes`]    |
//! | `b`  | str, bytes, bytearray| [`Arg::Buffer`]   |
//! | `f`  | float                | [`Arg::Float`]    |
//!
//! Uppercase letters are optional: when the argument is missing the next
//! entry of `defaults` is used instead.
use crate::{Body, Heap, HeapError, TypeTag, Value};

/// A converted argument, borrowing byte data from the heap or the defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Long(i64),
    Int(i32),
    Bytes(&'a [u8]),
    /// Contents plus the number of bytes the object can hold.
    Buffer { data: &'a [u8], capacity: usize },
    Float(f64),
}

fn argument(position: usize, reason: &'static str) -> HeapError {
    HeapError::Argument { position, reason }
}

fn is_byte_source(kind: TypeTag) -> bool {
    matches!(kind, TypeTag::String | TypeTag::Bytes | TypeTag::ByteArray)
}

/// Convert `args` according to `format`.
///
/// Fails with [`HeapError::Argument`] naming the first argument that could
/// not be converted.
pub fn parse_args<'a>(
    heap: &'a Heap,
    format: &str,
    args: &[Value],
    defaults: &[Arg<'a>],
) -> Result<Vec<Arg<'a>>, HeapError> {
    if args.len() > format.len() {
        return Err(argument(format.len(), "too many arguments"));
    }
    let mut defaults = defaults.iter();
    let mut converted = Vec::with_capacity(format.len());

    for (position, spec) in format.chars().enumerate() {
        let optional = spec.is_ascii_uppercase();
        let default = if optional {
            Some(
                defaults
                    .next()
                    .copied()
                    .ok_or_else(|| argument(position, "missing default"))?,
            )
        } else {
            None
        };
        let arg = match (args.get(position), default) {
            (Some(&value), _) => convert(heap, position, spec.to_ascii_lowercase(), value)?,
            (None, Some(default)) => default,
            (None, None) => return Err(argument(position, "missing required argument")),
        };
        converted.push(arg);
    }
    Ok(converted)
}

fn convert<'a>(
    heap: &'a Heap,
    position: usize,
    spec: char,
    value: Value,
) -> Result<Arg<'a>, HeapError> {
    match spec {
        'l' => heap
            .int_value(value)
            .map(Arg::Long)
            .map_err(|_| argument(position, "expected int")),
        'i' => {
            let n = heap
                .int_value(value)
                .map_err(|_| argument(position, "expected int"))?;
            i32::try_from(n)
                .map(Arg::Int)
                .map_err(|_| argument(position, "int out of range"))
        }
        's' | 'b' => {
            let Some(r) = value.heap_ref().filter(|_| is_byte_source(heap.type_of(value)))
            else {
                return Err(argument(position, "expected str, bytes or bytearray"));
            };
            let Body::Bytes(seq) = heap.body(r) else {
                unreachable!("byte kind with another body");
            };
            Ok(if spec == 's' {
                Arg::Bytes(seq.as_slice())
            } else {
                Arg::Buffer {
                    data: seq.as_slice(),
                    capacity: seq.capacity(),
                }
            })
        }
        'f' if heap.is_float(value) => heap
            .float_value(value)
            .map(Arg::Float)
            .map_err(|_| argument(position, "expected float")),
        'f' => Err(argument(position, "expected float")),
        _ => Err(argument(position, "unknown format character")),
    }
}
