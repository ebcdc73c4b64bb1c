/// Object kind tag. Inline kinds live in a [`crate::Value`]'s tag bits,
/// heap kinds in a block's [`crate::Header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TypeTag {
    SmallInt = 0,
    Integer,
    Float,
    Bool,
    String,
    Bytes,
    ByteArray,
    Shorts,
    ShortArray,
    List,
    Tuple,
    Range,
    FrozenSet,
    Set,
    Dict,
    Function,
    Method,
    Class,
    Instance,
    Module,
    Buffer,
    Slice,
    Iterator,
    Frame,
    Cell,
    None,
    Exception,
    Native,
    SysObj,
    Driver,
    Thread,
}

/// Payload layout of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Encoded in the value word, never allocated.
    Inline,
    /// Fixed-size binary payload.
    Scalar,
    /// Capacity + length + raw bytes.
    ByteSequence,
    /// Capacity + length + 16-bit units.
    ShortSequence,
    /// Capacity + length + value slots.
    ObjectSequence,
    /// Slot count + element count + open-addressed entries.
    Hash,
    /// Fixed reference fields, plus value arrays for frames.
    Record,
}

impl TypeTag {
    pub const COUNT: usize = Self::Thread as usize + 1;

    pub const ALL: [TypeTag; Self::COUNT] = [
        Self::SmallInt,
        Self::Integer,
        Self::Float,
        Self::Bool,
        Self::String,
        Self::Bytes,
        Self::ByteArray,
        Self::Shorts,
        Self::ShortArray,
        Self::List,
        Self::Tuple,
        Self::Range,
        Self::FrozenSet,
        Self::Set,
        Self::Dict,
        Self::Function,
        Self::Method,
        Self::Class,
        Self::Instance,
        Self::Module,
        Self::Buffer,
        Self::Slice,
        Self::Iterator,
        Self::Frame,
        Self::Cell,
        Self::None,
        Self::Exception,
        Self::Native,
        Self::SysObj,
        Self::Driver,
        Self::Thread,
    ];

    #[inline]
    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SmallInt | Self::Integer => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::String => "str",
            Self::Bytes => "bytes",
            Self::ByteArray => "bytearray",
            Self::Shorts => "shorts",
            Self::ShortArray => "shortarray",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Range => "range",
            Self::FrozenSet => "frozenset",
            Self::Set => "set",
            Self::Dict => "dict",
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Instance => "instance",
            Self::Module => "module",
            Self::Buffer => "buffer",
            Self::Slice => "slice",
            Self::Iterator => "iterator",
            Self::Frame => "frame",
            Self::Cell => "cell",
            Self::None => "NoneType",
            Self::Exception => "exception",
            Self::Native => "native",
            Self::SysObj => "sysobj",
            Self::Driver => "driver",
            Self::Thread => "thread",
        }
    }

    pub const fn shape(self) -> Shape {
        match self {
            Self::SmallInt
            | Self::Bool
            | Self::None
            | Self::Cell
            | Self::Exception
            | Self::Native
            | Self::Driver => Shape::Inline,
            Self::Integer | Self::Float => Shape::Scalar,
            Self::String
            | Self::Bytes
            | Self::ByteArray
            | Self::Buffer
            | Self::SysObj => Shape::ByteSequence,
            Self::Shorts | Self::ShortArray => Shape::ShortSequence,
            Self::List | Self::Tuple => Shape::ObjectSequence,
            Self::FrozenSet | Self::Set | Self::Dict => Shape::Hash,
            Self::Range
            | Self::Function
            | Self::Method
            | Self::Class
            | Self::Instance
            | Self::Module
            | Self::Slice
            | Self::Iterator
            | Self::Frame
            | Self::Thread => Shape::Record,
        }
    }

    #[inline]
    pub const fn is_inline(self) -> bool {
        matches!(self.shape(), Shape::Inline)
    }

    #[inline]
    pub const fn is_sequence(self) -> bool {
        matches!(
            self.shape(),
            Shape::ByteSequence | Shape::ShortSequence | Shape::ObjectSequence
        )
    }

    #[inline]
    pub const fn is_hash(self) -> bool {
        matches!(self.shape(), Shape::Hash)
    }

    /// Sequence and hash kinds whose contents may change after creation.
    pub const fn is_mutable(self) -> bool {
        matches!(
            self,
            Self::ByteArray
                | Self::ShortArray
                | Self::List
                | Self::Set
                | Self::Dict
                | Self::Buffer
                | Self::SysObj
        )
    }

    /// Mutable sequences that support append and reserve.
    pub const fn is_growable(self) -> bool {
        matches!(
            self,
            Self::ByteArray | Self::ShortArray | Self::List | Self::Buffer
        )
    }

    /// Kinds usable as dict keys and set members.
    pub const fn is_hashable(self) -> bool {
        !matches!(
            self,
            Self::ByteArray
                | Self::ShortArray
                | Self::List
                | Self::Set
                | Self::Dict
                | Self::Buffer
                | Self::SysObj
        )
    }
}

impl core::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
