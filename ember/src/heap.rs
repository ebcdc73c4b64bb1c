//! Mark-sweep collected heap.
//!
//! Blocks live in a slot table indexed by [`HeapRef`]: `headers[i]` holds the
//! block metadata and `bodies[i]` its payload. The byte budget of the arena
//! is enforced through a [`FreeList`] of extents; every live block owns the
//! extent its size rule asks for, and a sweep returns extents of dead blocks.
//!
//! Objects never move. Collection runs only from allocation that cannot be
//! satisfied, or from an explicit [`Heap::collect`].
//!
//! Consumers provide a [`RootProvider`] to every operation that may
//! allocate. Values held only in native locals across such a call must be
//! registered with [`Heap::protect`] or pinned.
use std::{collections::BTreeMap, time::Duration, time::Instant};

use log::{debug, info, trace, warn};

use crate::{
    Body, Color, Extent, FreeList, Header, HeaderFlags, HeapError, HeapRef,
    TypeTag, Value, Visitable,
};

// ── Public API types ──────────────────────────────────────────────────

/// Consumers implement this to provide GC roots.
///
/// Called once per collection. Every value the VM holds live must be
/// visited; stale values are allowed and only delay reclamation.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Value));
}

impl RootProvider for [Value] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Value)) {
        self.iter().for_each(|&value| visitor(value));
    }
}

impl RootProvider for Vec<Value> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Value)) {
        self.as_mut_slice().visit_roots(visitor);
    }
}

/// Root provider for callers that keep everything pinned or registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&mut self, _visitor: &mut dyn FnMut(Value)) {}
}

// ── Heap settings ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Arena size in bytes. Must be a multiple of 8.
    pub heap_size: usize,
    /// Entries of the fixed mark stack. Overflow falls back to rescanning.
    pub mark_stack_size: usize,
    /// Fraction of hash slots (live + tombstones) that triggers a rehash.
    pub hash_load_factor: f64,
    /// Smallest slot count of a hash table. Must be a power of two.
    pub min_hash_capacity: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            heap_size: 65_536, // 64 KB
            mark_stack_size: 64,
            hash_load_factor: 0.75,
            min_hash_capacity: 4,
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.heap_size == 0 || self.mark_stack_size == 0 {
            return Err("sizes must be > 0");
        }
        if !self.heap_size.is_multiple_of(crate::ALIGN) {
            return Err("heap_size must be a multiple of 8");
        }
        if self.heap_size > u32::MAX as usize {
            return Err("heap_size must fit in 32 bits");
        }
        if !(0.1..=0.9).contains(&self.hash_load_factor) {
            return Err("hash_load_factor must be between 0.1 and 0.9");
        }
        if !self.min_hash_capacity.is_power_of_two() {
            return Err("min_hash_capacity must be a power of two");
        }
        Ok(())
    }
}

// ── GC state / statistics ─────────────────────────────────────────────

/// Collector phase. A cycle always runs to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Idle,
    Marking,
    Sweeping,
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub marked: usize,
    pub freed_objects: usize,
    pub freed_bytes: usize,
    /// Header rescans caused by mark stack overflow.
    pub rescans: usize,
    pub live_objects: usize,
    pub free_bytes: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub heap_size: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub largest_free_extent: usize,
    pub free_fragments: usize,
    pub live_objects: usize,
    pub collections: u64,
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

// ── Heap ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Heap {
    settings: HeapSettings,
    headers: Vec<Header>,
    bodies: Vec<Option<Body>>,
    free_slots: Vec<u32>,
    arena: FreeList,
    registers: Vec<Value>,
    mark_stack: Vec<HeapRef>,
    phase: GcPhase,
    live_objects: usize,
    collections: u64,
    last_gc: Option<GcStats>,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Result<Self, HeapError> {
        settings.validate().map_err(HeapError::InvalidSettings)?;
        info!(
            "heap: {} bytes, mark stack {} entries",
            settings.heap_size, settings.mark_stack_size
        );
        Ok(Self {
            arena: FreeList::new(settings.heap_size as u32),
            mark_stack: Vec::with_capacity(settings.mark_stack_size),
            settings,
            headers: Vec::new(),
            bodies: Vec::new(),
            free_slots: Vec::new(),
            registers: Vec::new(),
            phase: GcPhase::Idle,
            live_objects: 0,
            collections: 0,
            last_gc: None,
        })
    }

    #[inline]
    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    #[inline]
    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.arena.free_bytes()
    }

    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.settings.heap_size - self.arena.free_bytes()
    }

    /// Largest block that can be allocated without collecting.
    #[inline]
    pub fn largest_free(&self) -> usize {
        self.arena.largest()
    }

    #[inline]
    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    #[inline]
    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub fn last_gc(&self) -> Option<GcStats> {
        self.last_gc
    }

    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        for (header, body) in self.headers.iter().zip(&self.bodies) {
            if body.is_some() {
                *objects_by_type.entry(header.kind().name()).or_insert(0) += 1;
            }
        }
        HeapStats {
            heap_size: self.settings.heap_size,
            used_bytes: self.used_bytes(),
            free_bytes: self.free_bytes(),
            largest_free_extent: self.arena.largest(),
            free_fragments: self.arena.fragments(),
            live_objects: self.live_objects,
            collections: self.collections,
            objects_by_type,
        }
    }

    // ── Introspection ─────────────────────────────────────────────────

    /// Whether `value` is an inline value or references a live block.
    pub fn contains(&self, value: Value) -> bool {
        match value.heap_ref() {
            Some(r) => matches!(self.bodies.get(r.index()), Some(Some(_))),
            None => true,
        }
    }

    /// Kind of any value: inline tag bits, or the block header.
    pub fn type_of(&self, value: Value) -> TypeTag {
        match value.heap_ref() {
            Some(r) => self.header(r).kind(),
            None => match value.inline_tag() {
                Some(tag) => tag,
                None => panic!("malformed inline value {:#x}", value.raw()),
            },
        }
    }

    /// Header of a live block. Dangling handles are invariant violations.
    pub fn header(&self, r: HeapRef) -> &Header {
        self.check_live(r);
        &self.headers[r.index()]
    }

    pub fn body(&self, r: HeapRef) -> &Body {
        match self.bodies.get(r.index()) {
            Some(Some(body)) => body,
            _ => panic!("dangling heap reference #{}", r.index()),
        }
    }

    pub fn body_mut(&mut self, r: HeapRef) -> &mut Body {
        match self.bodies.get_mut(r.index()) {
            Some(Some(body)) => body,
            _ => panic!("dangling heap reference #{}", r.index()),
        }
    }

    #[inline]
    fn check_live(&self, r: HeapRef) {
        if !matches!(self.bodies.get(r.index()), Some(Some(_))) {
            panic!("dangling heap reference #{}", r.index());
        }
    }

    /// Heap handle of `value` if it is a block of one of the accepted kinds.
    pub(crate) fn expect_ref(
        &self,
        value: Value,
        expected: &'static str,
        accept: impl Fn(TypeTag) -> bool,
    ) -> Result<HeapRef, HeapError> {
        let found = self.type_of(value);
        match value.heap_ref() {
            Some(r) if accept(found) => Ok(r),
            _ => Err(HeapError::TypeMismatch { expected, found }),
        }
    }

    // ── Registers and pinning ─────────────────────────────────────────

    /// Root `value` until the registers are released past it.
    #[inline]
    pub fn protect(&mut self, value: Value) {
        self.registers.push(value);
    }

    #[inline]
    pub fn register_mark(&self) -> usize {
        self.registers.len()
    }

    #[inline]
    pub fn release_registers(&mut self, mark: usize) {
        self.registers.truncate(mark);
    }

    /// Run `f` with `values` rooted.
    pub(crate) fn protected<T>(
        &mut self,
        values: &[Value],
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let mark = self.register_mark();
        self.registers.extend_from_slice(values);
        let result = f(self);
        self.release_registers(mark);
        result
    }

    /// Keep `value` alive across every collection until unpinned.
    pub fn pin(&mut self, value: Value) {
        if let Some(r) = value.heap_ref() {
            self.check_live(r);
            self.headers[r.index()].add_flag(HeaderFlags::PINNED);
        }
    }

    pub fn unpin(&mut self, value: Value) {
        if let Some(r) = value.heap_ref() {
            self.check_live(r);
            self.headers[r.index()].remove_flag(HeaderFlags::PINNED);
        }
    }

    // ── Allocation ────────────────────────────────────────────────────

    /// Place `body` in a new block of `kind`.
    ///
    /// Collects once if the arena has no room, with the body's own edges
    /// rooted, then fails with [`HeapError::OutOfMemory`].
    pub fn allocate_body(
        &mut self,
        roots: &mut dyn RootProvider,
        kind: TypeTag,
        body: Body,
    ) -> Result<HeapRef, HeapError> {
        debug_assert!(body.fits(kind), "{kind} cannot hold {body:?}");
        let extent = self.reserve(roots, body.block_size(), Some(&body))?;
        Ok(self.install(Header::new(kind, extent), body))
    }

    /// Admit a block size computed before its body is built.
    ///
    /// `None` stands for a size that overflowed. Anything larger than the
    /// whole arena can never be satisfied and fails without collecting.
    pub fn check_size(&self, size: Option<usize>) -> Result<usize, HeapError> {
        match size {
            Some(size) if size <= self.settings.heap_size => Ok(size),
            _ => Err(self.out_of_memory(size.unwrap_or(usize::MAX))),
        }
    }

    fn out_of_memory(&self, requested: usize) -> HeapError {
        let err = HeapError::OutOfMemory {
            requested,
            free: self.arena.free_bytes(),
            largest: self.arena.largest(),
        };
        warn!("{err}");
        err
    }

    fn reserve(
        &mut self,
        roots: &mut dyn RootProvider,
        size: usize,
        pending: Option<&Body>,
    ) -> Result<Extent, HeapError> {
        if let Some(extent) = self.arena.reserve(size) {
            return Ok(extent);
        }
        if size > self.settings.heap_size {
            return Err(self.out_of_memory(size));
        }
        self.collect_with(roots, pending);
        self.arena
            .reserve(size)
            .ok_or_else(|| self.out_of_memory(size))
    }

    fn install(&mut self, header: Header, body: Body) -> HeapRef {
        self.live_objects += 1;
        match self.free_slots.pop() {
            Some(idx) => {
                self.headers[idx as usize] = header;
                self.bodies[idx as usize] = Some(body);
                HeapRef::new(idx)
            }
            None => {
                let idx = self.headers.len() as u32;
                self.headers.push(header);
                self.bodies.push(Some(body));
                HeapRef::new(idx)
            }
        }
    }

    /// Give `r` a block of `new_size` bytes, then let `grow` enlarge its
    /// body to match.
    ///
    /// `r` and `operands` stay rooted while the new extent is reserved. On
    /// failure nothing is changed.
    pub(crate) fn resize(
        &mut self,
        roots: &mut dyn RootProvider,
        r: HeapRef,
        operands: &[Value],
        new_size: usize,
        grow: impl FnOnce(&mut Body),
    ) -> Result<(), HeapError> {
        let old = self.header(r).extent();
        let mark = self.register_mark();
        self.protect(Value::from_ref(r));
        self.registers.extend_from_slice(operands);
        let reserved = self.reserve(roots, new_size, None);
        self.release_registers(mark);
        let extent = reserved?;

        self.arena.release(old);
        self.headers[r.index()].set_extent(extent);
        let body = self.body_mut(r);
        grow(&mut *body);
        debug_assert_eq!(body.block_size(), new_size, "resize size mismatch");
        Ok(())
    }

    // ── Collection ────────────────────────────────────────────────────

    pub fn collect(&mut self, roots: &mut dyn RootProvider) -> GcStats {
        self.collect_with(roots, None)
    }

    #[cold]
    fn collect_with(
        &mut self,
        roots: &mut dyn RootProvider,
        pending: Option<&Body>,
    ) -> GcStats {
        assert_eq!(self.phase, GcPhase::Idle, "collection is not reentrant");
        let start = Instant::now();

        self.phase = GcPhase::Marking;
        let (marked, rescans) = self.mark(roots, pending);

        self.phase = GcPhase::Sweeping;
        let (freed_objects, freed_bytes) = self.sweep();

        self.phase = GcPhase::Idle;
        self.collections += 1;

        let stats = GcStats {
            marked,
            freed_objects,
            freed_bytes,
            rescans,
            live_objects: self.live_objects,
            free_bytes: self.arena.free_bytes(),
            duration: start.elapsed(),
        };
        debug!(
            "gc #{}: marked {}, freed {} objects ({} bytes), {} free, {} rescans in {:?}",
            self.collections,
            stats.marked,
            stats.freed_objects,
            stats.freed_bytes,
            stats.free_bytes,
            stats.rescans,
            stats.duration
        );
        self.last_gc = Some(stats);
        stats
    }

    // ── Marking ───────────────────────────────────────────────────────

    fn mark(
        &mut self,
        roots: &mut dyn RootProvider,
        pending: Option<&Body>,
    ) -> (usize, usize) {
        let Heap {
            headers,
            bodies,
            registers,
            mark_stack,
            settings,
            ..
        } = self;
        debug_assert!(mark_stack.is_empty());

        let mut marker = Marker {
            headers,
            bodies,
            stack: mark_stack,
            limit: settings.mark_stack_size,
            overflowed: false,
            marked: 0,
            rescans: 0,
        };

        roots.visit_roots(&mut |value| marker.shade(value));
        marker.drain();

        for &value in registers.iter() {
            marker.shade(value);
        }
        if let Some(body) = pending {
            body.visit_edges(&mut |value: Value| marker.shade(value));
        }
        for idx in 0..marker.headers.len() {
            if marker.bodies[idx].is_some()
                && marker.headers[idx].has_flag(HeaderFlags::PINNED)
            {
                marker.shade(Value::from_ref(HeapRef::new(idx as u32)));
            }
        }
        marker.drain();

        (marker.marked, marker.rescans)
    }

    // ── Sweeping ──────────────────────────────────────────────────────

    fn sweep(&mut self) -> (usize, usize) {
        let mut freed_objects = 0;
        let mut freed_bytes = 0;

        for idx in 0..self.headers.len() {
            let Some(body) = &self.bodies[idx] else {
                continue;
            };
            let header = &mut self.headers[idx];
            match header.color() {
                Color::Black => header.set_color(Color::White),
                Color::Grey => panic!("grey block #{idx} at sweep"),
                Color::White => {
                    debug_assert_eq!(
                        body.block_size(),
                        header.size(),
                        "block #{idx} size drifted from its extent"
                    );
                    freed_bytes += header.size();
                    self.arena.release(header.extent());
                    *header = Header::vacant();
                    self.bodies[idx] = None;
                    self.free_slots.push(idx as u32);
                    freed_objects += 1;
                }
            }
        }

        self.live_objects -= freed_objects;
        (freed_objects, freed_bytes)
    }
}

/// Tri-color marking over a fixed-capacity stack.
///
/// Shading a white block turns it grey and pushes it; a full stack leaves
/// the block grey and sets `overflowed`, and [`Marker::drain`] later finds
/// such blocks by scanning the headers.
struct Marker<'a> {
    headers: &'a mut [Header],
    bodies: &'a [Option<Body>],
    stack: &'a mut Vec<HeapRef>,
    limit: usize,
    overflowed: bool,
    marked: usize,
    rescans: usize,
}

impl Marker<'_> {
    fn shade(&mut self, value: Value) {
        let Some(r) = value.heap_ref() else {
            return;
        };
        let idx = r.index();
        if !matches!(self.bodies.get(idx), Some(Some(_))) {
            panic!("dangling heap reference #{idx} reached while marking");
        }
        let header = &mut self.headers[idx];
        if header.color() != Color::White {
            return;
        }
        header.set_color(Color::Grey);
        self.marked += 1;
        if self.stack.len() < self.limit {
            self.stack.push(r);
        } else {
            self.overflowed = true;
        }
    }

    fn scan(&mut self, r: HeapRef) {
        let idx = r.index();
        if self.headers[idx].color() == Color::Black {
            return;
        }
        self.headers[idx].set_color(Color::Black);
        let bodies = self.bodies;
        if let Some(body) = &bodies[idx] {
            body.visit_edges(&mut |value: Value| self.shade(value));
        }
    }

    fn drain(&mut self) {
        loop {
            while let Some(r) = self.stack.pop() {
                self.scan(r);
            }
            if !self.overflowed {
                return;
            }
            self.overflowed = false;
            self.rescans += 1;
            trace!(
                "mark stack overflow, rescanning {} headers",
                self.headers.len()
            );
            for idx in 0..self.headers.len() {
                if self.headers[idx].color() == Color::Grey {
                    self.scan(HeapRef::new(idx as u32));
                    while let Some(r) = self.stack.pop() {
                        self.scan(r);
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
