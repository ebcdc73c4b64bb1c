use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::{Heap, HeapError, HeapSettings};

/// Process-wide heap behind a single lock.
///
/// Every allocation, mutation and collection happens while the lock is
/// held, so a collection never observes a half-built object and two
/// threads never see each other's partial updates.
#[derive(Debug, Clone)]
pub struct SharedHeap {
    inner: Arc<Mutex<Heap>>,
}

impl SharedHeap {
    pub fn new(settings: HeapSettings) -> Result<Self, HeapError> {
        Ok(Self::from_heap(Heap::new(settings)?))
    }

    pub fn from_heap(heap: Heap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(heap)),
        }
    }

    /// Block until the heap is free.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Heap> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, Heap>> {
        self.inner.try_lock()
    }

    /// Run `f` as one critical section.
    pub fn with<T>(&self, f: impl FnOnce(&mut Heap) -> T) -> T {
        f(&mut self.inner.lock())
    }
}
