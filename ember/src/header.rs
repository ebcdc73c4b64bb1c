use bitflags::bitflags;

use crate::{Extent, TypeTag};

/// Tri-color mark state of a block.
///
/// White blocks are unvisited, grey blocks are reached but their edges are
/// not traced yet, black blocks are fully traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Grey = 1,
    Black = 2,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// Treated as a root by every collection.
        const PINNED = 1 << 0;
    }
}

/// Metadata of one heap block.
///
/// ```text
/// byte 0:    type tag
/// byte 1:    color
/// byte 2:    flags
/// bytes 3‥7: reserved
/// then:      arena extent (offset, length)
/// ```
///
/// The extent length is the block's total size as given by the size rule,
/// so the sweep can credit it back without looking at the payload.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    kind: TypeTag,
    color: Color,
    flags: HeaderFlags,
    extent: Extent,
}

impl Header {
    pub fn new(kind: TypeTag, extent: Extent) -> Self {
        debug_assert!(!kind.is_inline(), "{kind} is never heap allocated");
        Self {
            kind,
            color: Color::White,
            flags: HeaderFlags::empty(),
            extent,
        }
    }

    /// Header of an unused slot.
    pub(crate) fn vacant() -> Self {
        Self {
            kind: TypeTag::None,
            color: Color::White,
            flags: HeaderFlags::empty(),
            extent: Extent::EMPTY,
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> TypeTag {
        self.kind
    }

    #[inline(always)]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline(always)]
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    #[inline(always)]
    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    #[inline(always)]
    pub fn has_flag(&self, flag: HeaderFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline(always)]
    pub fn add_flag(&mut self, flag: HeaderFlags) {
        self.flags.insert(flag);
    }

    #[inline(always)]
    pub fn remove_flag(&mut self, flag: HeaderFlags) {
        self.flags.remove(flag);
    }

    #[inline(always)]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    #[inline(always)]
    pub(crate) fn set_extent(&mut self, extent: Extent) {
        self.extent = extent;
    }

    /// Total bytes the block occupies in the arena.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.extent.len as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_is_white_and_unflagged() {
        let h = Header::new(TypeTag::List, Extent { offset: 8, len: 32 });
        assert_eq!(h.kind(), TypeTag::List);
        assert_eq!(h.color(), Color::White);
        assert!(h.flags().is_empty());
        assert_eq!(h.size(), 32);
    }

    #[test]
    fn flags_toggle() {
        let mut h = Header::new(TypeTag::Dict, Extent { offset: 0, len: 16 });
        h.add_flag(HeaderFlags::PINNED);
        assert!(h.has_flag(HeaderFlags::PINNED));
        h.remove_flag(HeaderFlags::PINNED);
        assert!(!h.has_flag(HeaderFlags::PINNED));
    }

    #[test]
    fn color_transitions() {
        let mut h = Header::new(TypeTag::Tuple, Extent { offset: 0, len: 16 });
        h.set_color(Color::Grey);
        assert_eq!(h.color(), Color::Grey);
        h.set_color(Color::Black);
        assert_eq!(h.color(), Color::Black);
    }
}
