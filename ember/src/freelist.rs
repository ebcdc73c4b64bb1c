//! Free-space bookkeeping for the heap arena.
//!
//! The arena is a range of byte offsets `[0, heap_size)`. Every live block
//! owns one [`Extent`]; everything else sits in the [`FreeList`], kept sorted
//! by offset so released extents coalesce with their neighbours.

/// A contiguous run of arena bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u32,
    pub len: u32,
}

impl Extent {
    pub const EMPTY: Self = Self { offset: 0, len: 0 };

    #[inline]
    pub fn end(self) -> u32 {
        self.offset + self.len
    }
}

#[derive(Debug)]
pub struct FreeList {
    extents: Vec<Extent>,
    free_bytes: usize,
}

impl FreeList {
    pub fn new(size: u32) -> Self {
        let extents = if size == 0 {
            Vec::new()
        } else {
            vec![Extent { offset: 0, len: size }]
        };
        Self {
            extents,
            free_bytes: size as usize,
        }
    }

    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    #[inline]
    pub fn fragments(&self) -> usize {
        self.extents.len()
    }

    pub fn largest(&self) -> usize {
        self.extents
            .iter()
            .map(|e| e.len as usize)
            .max()
            .unwrap_or(0)
    }

    /// First-fit: carve `size` bytes off the lowest extent large enough.
    pub fn reserve(&mut self, size: usize) -> Option<Extent> {
        let size = u32::try_from(size).ok()?;
        if size == 0 {
            return None;
        }
        let idx = self.extents.iter().position(|e| e.len >= size)?;
        let free = &mut self.extents[idx];
        let taken = Extent {
            offset: free.offset,
            len: size,
        };
        if free.len == size {
            self.extents.remove(idx);
        } else {
            free.offset += size;
            free.len -= size;
        }
        self.free_bytes -= size as usize;
        Some(taken)
    }

    /// Return an extent, merging it with adjacent free extents.
    pub fn release(&mut self, extent: Extent) {
        if extent.len == 0 {
            return;
        }
        let idx = self.extents.partition_point(|e| e.offset < extent.offset);

        debug_assert!(
            idx == 0 || self.extents[idx - 1].end() <= extent.offset,
            "released extent {extent:?} overlaps free space"
        );
        debug_assert!(
            idx == self.extents.len() || extent.end() <= self.extents[idx].offset,
            "released extent {extent:?} overlaps free space"
        );

        self.free_bytes += extent.len as usize;

        let merges_prev = idx > 0 && self.extents[idx - 1].end() == extent.offset;
        let merges_next =
            idx < self.extents.len() && extent.end() == self.extents[idx].offset;

        match (merges_prev, merges_next) {
            (true, true) => {
                let next = self.extents.remove(idx);
                self.extents[idx - 1].len += extent.len + next.len;
            }
            (true, false) => self.extents[idx - 1].len += extent.len,
            (false, true) => {
                let next = &mut self.extents[idx];
                next.offset = extent.offset;
                next.len += extent.len;
            }
            (false, false) => self.extents.insert(idx, extent),
        }
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_is_first_fit_and_sequential() {
        let mut list = FreeList::new(128);
        let a = list.reserve(16).unwrap();
        let b = list.reserve(32).unwrap();
        assert_eq!(a, Extent { offset: 0, len: 16 });
        assert_eq!(b, Extent { offset: 16, len: 32 });
        assert_eq!(list.free_bytes(), 80);
        assert_eq!(list.largest(), 80);
    }

    #[test]
    fn exact_fit_consumes_extent() {
        let mut list = FreeList::new(64);
        assert!(list.reserve(64).is_some());
        assert_eq!(list.fragments(), 0);
        assert_eq!(list.free_bytes(), 0);
        assert!(list.reserve(8).is_none());
    }

    #[test]
    fn oversized_and_empty_requests_fail() {
        let mut list = FreeList::new(64);
        assert!(list.reserve(72).is_none());
        assert!(list.reserve(0).is_none());
        assert_eq!(list.free_bytes(), 64);
    }

    #[test]
    fn release_coalesces_both_sides() {
        let mut list = FreeList::new(96);
        let a = list.reserve(32).unwrap();
        let b = list.reserve(32).unwrap();
        let c = list.reserve(32).unwrap();
        assert_eq!(list.fragments(), 0);

        list.release(a);
        list.release(c);
        assert_eq!(list.fragments(), 2);
        assert_eq!(list.largest(), 32);

        list.release(b);
        assert_eq!(list.fragments(), 1);
        assert_eq!(list.extents()[0], Extent { offset: 0, len: 96 });
        assert_eq!(list.free_bytes(), 96);
    }

    #[test]
    fn fragmented_space_rejects_large_request() {
        let mut list = FreeList::new(64);
        let a = list.reserve(16).unwrap();
        let _b = list.reserve(16).unwrap();
        let c = list.reserve(16).unwrap();
        let _d = list.reserve(16).unwrap();
        list.release(a);
        list.release(c);
        assert_eq!(list.free_bytes(), 32);
        assert!(list.reserve(32).is_none());
        assert!(list.reserve(16).is_some());
    }
}
