use thiserror::Error;

use crate::TypeTag;

/// Builtin exception identities carried by inline exception values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ExceptionKind {
    TypeError = 0,
    ZeroDivisionError,
    AttributeError,
    RuntimeError,
    ValueError,
    IndexError,
    KeyError,
    NotImplementedError,
    UnsupportedError,
    OverflowError,
    StopIteration,
    NameError,
    IOError,
    ConnectionRefusedError,
    ConnectionResetError,
    ConnectionAbortedError,
    TimeoutError,
    PeripheralError,
    InvalidPinError,
    InvalidHardwareStatusError,
    HardwareInitializationError,
    MemoryError,
}

impl ExceptionKind {
    const ALL: [ExceptionKind; 22] = [
        Self::TypeError,
        Self::ZeroDivisionError,
        Self::AttributeError,
        Self::RuntimeError,
        Self::ValueError,
        Self::IndexError,
        Self::KeyError,
        Self::NotImplementedError,
        Self::UnsupportedError,
        Self::OverflowError,
        Self::StopIteration,
        Self::NameError,
        Self::IOError,
        Self::ConnectionRefusedError,
        Self::ConnectionResetError,
        Self::ConnectionAbortedError,
        Self::TimeoutError,
        Self::PeripheralError,
        Self::InvalidPinError,
        Self::InvalidHardwareStatusError,
        Self::HardwareInitializationError,
        Self::MemoryError,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Recoverable failures of allocation and accessor operations.
///
/// None of these leave the heap partially mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error(
        "out of memory: requested {requested} bytes, {free} free (largest extent {largest})"
    )]
    OutOfMemory {
        requested: usize,
        free: usize,
        largest: usize,
    },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("key not found")]
    KeyNotFound,
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: TypeTag,
    },
    #[error("unhashable type: {0}")]
    Unhashable(TypeTag),
    #[error("{0} object is immutable")]
    Immutable(TypeTag),
    #[error("value out of range for {0}")]
    ValueOutOfRange(TypeTag),
    #[error("integer overflow")]
    Overflow,
    #[error("invalid heap settings: {0}")]
    InvalidSettings(&'static str),
    #[error("argument {position}: {reason}")]
    Argument {
        position: usize,
        reason: &'static str,
    },
}

impl HeapError {
    /// The builtin exception the interpreter raises for this error.
    pub fn exception(&self) -> ExceptionKind {
        match self {
            Self::OutOfMemory { .. } => ExceptionKind::MemoryError,
            Self::IndexOutOfRange { .. } => ExceptionKind::IndexError,
            Self::KeyNotFound => ExceptionKind::KeyError,
            Self::TypeMismatch { .. }
            | Self::Unhashable(_)
            | Self::Immutable(_)
            | Self::Argument { .. } => ExceptionKind::TypeError,
            Self::ValueOutOfRange(_) => ExceptionKind::ValueError,
            Self::Overflow => ExceptionKind::OverflowError,
            Self::InvalidSettings(_) => ExceptionKind::RuntimeError,
        }
    }
}
