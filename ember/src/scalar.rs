use crate::{Body, Heap, HeapError, TypeTag, Unpacked, Value};

/// Numeric view of int, bool and float values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// The integer this number equals exactly, if any.
    pub fn as_exact_int(self) -> Option<i64> {
        match self {
            Number::Int(n) => Some(n),
            Number::Float(f) => {
                // i64::MAX as f64 rounds up to 2^63, which is out of range
                let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
                (f.fract() == 0.0 && in_range).then_some(f as i64)
            }
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    /// Numeric equality across representations, exact for integers.
    pub fn equals(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                Number::Float(f).as_exact_int() == Some(i)
            }
        }
    }
}

impl Heap {
    pub fn number(&self, value: Value) -> Option<Number> {
        match value.unpack() {
            Unpacked::SmallInt(n) => Some(Number::Int(n as i64)),
            Unpacked::Bool(b) => Some(Number::Int(b as i64)),
            Unpacked::Heap(r) => match self.body(r) {
                Body::Integer(n) => Some(Number::Int(*n)),
                Body::Float(f) => Some(Number::Float(*f)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Value of a small or heap integer (bools count as 0 and 1).
    pub fn int_value(&self, value: Value) -> Result<i64, HeapError> {
        match self.number(value) {
            Some(Number::Int(n)) => Ok(n),
            _ => Err(HeapError::TypeMismatch {
                expected: "int",
                found: self.type_of(value),
            }),
        }
    }

    /// Value of a float, or of an integer converted to float.
    pub fn float_value(&self, value: Value) -> Result<f64, HeapError> {
        self.number(value)
            .map(Number::as_f64)
            .ok_or_else(|| HeapError::TypeMismatch {
                expected: "float",
                found: self.type_of(value),
            })
    }

    /// Whether `value` is a heap float.
    pub fn is_float(&self, value: Value) -> bool {
        value.is_ref() && self.type_of(value) == TypeTag::Float
    }
}
