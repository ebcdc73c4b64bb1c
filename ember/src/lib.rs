mod allocator;
mod args;
mod callable;
mod error;
mod freelist;
mod hash;
mod header;
mod heap;
mod mapping;
mod object;
mod scalar;
mod sequence;
mod shared;
mod types;
mod value;
mod visitor;

pub use allocator::Allocator;
pub use args::{Arg, parse_args};
pub use error::{ExceptionKind, HeapError};
pub use freelist::{Extent, FreeList};
pub use hash::{Entry, HashTable, Probe};
pub use header::{Color, Header, HeaderFlags};
pub use heap::{
    GcPhase, GcStats, Heap, HeapSettings, HeapStats, NoRoots, RootProvider,
};
pub use object::*;
pub use scalar::Number;
pub use shared::SharedHeap;
pub use types::{Shape, TypeTag};
pub use value::{HeapRef, SMALL_INT_MAX, SMALL_INT_MIN, Unpacked, Value};
pub use visitor::{Visitable, Visitor};
