//! Value: the universal object handle, one machine word.
//!
//! Unpacked: the same word decoded into a sum type, so call sites match on
//! variants instead of testing bits.
//!
//! HeapRef: index of a block in the heap's slot table.
use crate::{ExceptionKind, TypeTag};

const INLINE_BIT: u64 = 0b1;
const INLINE_TAG_SHIFT: u32 = 1;
const INLINE_TAG_MASK: u64 = 0x7f;
const PAYLOAD_SHIFT: u32 = 32;

/// Smallest integer representable inline.
pub const SMALL_INT_MIN: i64 = -(1 << 30);
/// Largest integer representable inline.
pub const SMALL_INT_MAX: i64 = (1 << 30) - 1;

/// Handle of a heap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HeapRef(u32);

impl HeapRef {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A tagged value.
///
/// Encoding:
/// - **Heap**:   `[index:63][0]` a slot index, low bit clear like an aligned pointer.
/// - **Inline**: `[payload:32][zero:24][tag:7][1]` with `tag` a [`TypeTag`].
///
/// Small integers use 31 of the 32 payload bits so that their range is the
/// same as on 32-bit targets where the integer shares the word with the tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

/// A [`Value`] decoded into its variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unpacked {
    SmallInt(i32),
    Bool(bool),
    None,
    Cell(u32),
    Exception(ExceptionKind),
    Native(u32),
    Driver(u32),
    Heap(HeapRef),
}

impl Value {
    pub const NONE: Self = Self::inline(TypeTag::None, 0);
    pub const TRUE: Self = Self::inline(TypeTag::Bool, 1);
    pub const FALSE: Self = Self::inline(TypeTag::Bool, 0);

    #[inline(always)]
    const fn inline(tag: TypeTag, payload: u32) -> Self {
        Self(
            ((payload as u64) << PAYLOAD_SHIFT)
                | ((tag as u64) << INLINE_TAG_SHIFT)
                | INLINE_BIT,
        )
    }

    #[inline(always)]
    const fn payload(self) -> u32 {
        (self.0 >> PAYLOAD_SHIFT) as u32
    }

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn is_inline(self) -> bool {
        self.0 & INLINE_BIT == INLINE_BIT
    }

    #[inline(always)]
    pub const fn is_ref(self) -> bool {
        !self.is_inline()
    }

    /// Type of an inline value, `None` for heap references.
    pub fn inline_tag(self) -> Option<TypeTag> {
        if !self.is_inline() {
            return None;
        }
        let raw = ((self.0 >> INLINE_TAG_SHIFT) & INLINE_TAG_MASK) as u8;
        let tag = TypeTag::from_u8(raw);
        debug_assert!(
            tag.is_some_and(TypeTag::is_inline),
            "malformed inline tag {raw} in {:#x}",
            self.0
        );
        tag
    }

    // ── small integers ─────────────────────────────────────────────

    #[inline]
    pub const fn fits_small_int(n: i64) -> bool {
        n >= SMALL_INT_MIN && n <= SMALL_INT_MAX
    }

    /// Unchecked construction: the caller must keep `n` within
    /// [`SMALL_INT_MIN`]..=[`SMALL_INT_MAX`] and widen to a heap integer otherwise.
    #[inline]
    pub fn small_int(n: i32) -> Self {
        debug_assert!(Self::fits_small_int(n as i64), "small int overflow: {n}");
        Self::inline(TypeTag::SmallInt, n as u32)
    }

    #[inline]
    pub fn is_small_int(self) -> bool {
        self.inline_tag() == Some(TypeTag::SmallInt)
    }

    /// Requires `self` to be a small integer.
    #[inline]
    pub fn small_int_value(self) -> i32 {
        debug_assert!(self.is_small_int(), "not a small int: {self:?}");
        self.payload() as i32
    }

    // ── other inline kinds ─────────────────────────────────────────

    #[inline]
    pub const fn bool(value: bool) -> Self {
        if value { Self::TRUE } else { Self::FALSE }
    }

    #[inline]
    pub fn is_bool(self) -> bool {
        self.inline_tag() == Some(TypeTag::Bool)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    #[inline]
    pub const fn cell(payload: u32) -> Self {
        Self::inline(TypeTag::Cell, payload)
    }

    #[inline]
    pub const fn native(index: u32) -> Self {
        Self::inline(TypeTag::Native, index)
    }

    #[inline]
    pub const fn driver(id: u32) -> Self {
        Self::inline(TypeTag::Driver, id)
    }

    #[inline]
    pub const fn exception(kind: ExceptionKind) -> Self {
        Self::inline(TypeTag::Exception, kind as u32)
    }

    // ── heap references ────────────────────────────────────────────

    #[inline(always)]
    pub const fn from_ref(heap_ref: HeapRef) -> Self {
        Self((heap_ref.0 as u64) << 1)
    }

    #[inline(always)]
    pub const fn heap_ref(self) -> Option<HeapRef> {
        if self.is_inline() {
            None
        } else {
            Some(HeapRef((self.0 >> 1) as u32))
        }
    }

    /// Decode into an [`Unpacked`].
    ///
    /// A malformed inline tag is an invariant violation and panics.
    pub fn unpack(self) -> Unpacked {
        if let Some(heap_ref) = self.heap_ref() {
            return Unpacked::Heap(heap_ref);
        }
        let payload = self.payload();
        match self.inline_tag() {
            Some(TypeTag::SmallInt) => Unpacked::SmallInt(payload as i32),
            Some(TypeTag::Bool) => Unpacked::Bool(payload != 0),
            Some(TypeTag::None) => Unpacked::None,
            Some(TypeTag::Cell) => Unpacked::Cell(payload),
            Some(TypeTag::Native) => Unpacked::Native(payload),
            Some(TypeTag::Driver) => Unpacked::Driver(payload),
            Some(TypeTag::Exception) => match ExceptionKind::from_code(payload) {
                Some(kind) => Unpacked::Exception(kind),
                None => panic!("malformed exception value {:#x}", self.0),
            },
            _ => panic!("malformed inline value {:#x}", self.0),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<Unpacked> for Value {
    fn from(unpacked: Unpacked) -> Self {
        match unpacked {
            Unpacked::SmallInt(n) => Value::small_int(n),
            Unpacked::Bool(b) => Value::bool(b),
            Unpacked::None => Value::NONE,
            Unpacked::Cell(payload) => Value::cell(payload),
            Unpacked::Exception(kind) => Value::exception(kind),
            Unpacked::Native(index) => Value::native(index),
            Unpacked::Driver(id) => Value::driver(id),
            Unpacked::Heap(heap_ref) => Value::from_ref(heap_ref),
        }
    }
}

impl From<HeapRef> for Value {
    fn from(heap_ref: HeapRef) -> Self {
        Value::from_ref(heap_ref)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}

impl core::fmt::Debug for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.unpack() {
            Unpacked::SmallInt(n) => write!(f, "SmallInt({n})"),
            Unpacked::Bool(b) => write!(f, "Bool({b})"),
            Unpacked::None => write!(f, "None"),
            Unpacked::Cell(p) => write!(f, "Cell({p})"),
            Unpacked::Exception(kind) => write!(f, "Exception({kind:?})"),
            Unpacked::Native(i) => write!(f, "Native({i})"),
            Unpacked::Driver(i) => write!(f, "Driver({i})"),
            Unpacked::Heap(r) => write!(f, "Ref(#{})", r.index()),
        }
    }
}
