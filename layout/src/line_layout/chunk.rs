//! Chunks and the bounded chunk-fragment cache.
//!
//! A chunk is a slice of at most `chunk_size` units of one bidi run. Its
//! fragments are shaped lazily and stored in a [`ChunkCache`]: an arena of
//! slots threaded on an intrusive LRU list. Eviction drops the slot's fragments
//! and bumps its generation, so the chunk's [`SlotHandle`] simply stops
//! resolving and the fragments are shaped again on the next request.
use super::fragment::{shape_chunk, Fragment, ShapingContext};
use std::{
    cell::{Cell, RefCell},
    ops::Range,
    rc::Rc,
};

const NIL: u32 = u32::MAX;

/// Generation-checked reference to a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    fragments: Option<Rc<[Fragment]>>,
    prev: u32,
    next: u32,
}

#[derive(Debug)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Most recently used.
    head: u32,
    /// Least recently used, evicted first.
    tail: u32,
    len: usize,
    limit: usize,
    evictions: u64,
}

impl Arena {
    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let slot = &self.slots[index as usize];
            (slot.prev, slot.next)
        };
        match prev {
            NIL => self.head = next,
            prev => self.slots[prev as usize].next = next,
        }
        match next {
            NIL => self.tail = prev,
            next => self.slots[next as usize].prev = prev,
        }
        let slot = &mut self.slots[index as usize];
        slot.prev = NIL;
        slot.next = NIL;
    }

    fn push_front(&mut self, index: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[index as usize];
            slot.prev = NIL;
            slot.next = old_head;
        }
        match old_head {
            NIL => self.tail = index,
            head => self.slots[head as usize].prev = index,
        }
        self.head = index;
    }

    fn clear_slot(&mut self, index: u32) {
        self.unlink(index);
        let slot = &mut self.slots[index as usize];
        slot.fragments = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
    }

    fn evict_to(&mut self, limit: usize) {
        while self.len > limit && self.tail != NIL {
            let tail = self.tail;
            self.clear_slot(tail);
            self.evictions += 1;
        }
    }

    fn is_live(&self, handle: SlotHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.fragments.is_some())
    }
}

/// Bounded LRU store of shaped chunk fragments.
#[derive(Debug)]
pub struct ChunkCache {
    arena: RefCell<Arena>,
}

impl ChunkCache {
    pub fn new(limit: usize) -> Self {
        Self {
            arena: RefCell::new(Arena {
                slots: Vec::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
                len: 0,
                limit: limit.max(1),
                evictions: 0,
            }),
        }
    }

    /// Fragments behind `handle`, marking them most recently used.
    pub fn get(&self, handle: SlotHandle) -> Option<Rc<[Fragment]>> {
        let mut arena = self.arena.borrow_mut();
        if !arena.is_live(handle) {
            return None;
        }
        arena.unlink(handle.index);
        arena.push_front(handle.index);
        arena.slots[handle.index as usize].fragments.clone()
    }

    /// Store `fragments`, evicting the least recently used chunks beyond the limit.
    pub fn insert(&self, fragments: Rc<[Fragment]>) -> SlotHandle {
        let mut arena = self.arena.borrow_mut();
        let limit = arena.limit;
        arena.evict_to(limit - 1);

        let index = match arena.free.pop() {
            Some(index) => {
                arena.slots[index as usize].fragments = Some(fragments);
                index
            },
            None => {
                let index = u32::try_from(arena.slots.len()).unwrap_or(NIL - 1);
                arena.slots.push(Slot {
                    generation: 0,
                    fragments: Some(fragments),
                    prev: NIL,
                    next: NIL,
                });
                index
            },
        };
        arena.len += 1;
        arena.push_front(index);
        SlotHandle {
            index,
            generation: arena.slots[index as usize].generation,
        }
    }

    /// Drop the fragments behind `handle` if it is still live.
    pub fn release(&self, handle: SlotHandle) {
        let mut arena = self.arena.borrow_mut();
        if arena.is_live(handle) {
            arena.clear_slot(handle.index);
        }
    }

    pub fn set_limit(&self, limit: usize) {
        let mut arena = self.arena.borrow_mut();
        arena.limit = limit.max(1);
        let before = arena.evictions;
        arena.evict_to(limit.max(1));
        let evicted = arena.evictions - before;
        if evicted > 0 {
            tracing::debug!(limit, evicted, "shrank chunk cache");
        }
    }

    /// Drop every chunk. Not counted as evictions.
    pub fn clear(&self) {
        let mut arena = self.arena.borrow_mut();
        while arena.tail != NIL {
            let tail = arena.tail;
            arena.clear_slot(tail);
        }
    }

    pub fn len(&self) -> usize {
        self.arena.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.arena.borrow().limit
    }

    /// Total evictions caused by the size limit since creation.
    pub fn evictions(&self) -> u64 {
        self.arena.borrow().evictions
    }
}

/// A slice of one bidi run whose fragments are shaped on demand.
#[derive(Debug)]
pub struct Chunk {
    range: Range<usize>,
    slot: Cell<Option<SlotHandle>>,
}

impl Chunk {
    pub(crate) fn new(range: Range<usize>) -> Self {
        Self {
            range,
            slot: Cell::new(None),
        }
    }

    /// Range relative to the line start.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Shaped fragments, from the cache when present.
    pub(crate) fn fragments(&self, rtl: bool, tab_run: bool, shaping: &ShapingContext<'_>) -> Rc<[Fragment]> {
        let Some(cache) = shaping.chunks else {
            return shape_chunk(self.range(), rtl, tab_run, shaping).into();
        };
        if let Some(fragments) = self.slot.get().and_then(|handle| cache.get(handle)) {
            return fragments;
        }
        let fragments: Rc<[Fragment]> = shape_chunk(self.range(), rtl, tab_run, shaping).into();
        self.slot.set(Some(cache.insert(fragments.clone())));
        fragments
    }

    pub(crate) fn release(&self, cache: &ChunkCache) {
        if let Some(handle) = self.slot.take() {
            cache.release(handle);
        }
    }
}

/// Split `range` into chunks of at most `size` units without splitting a
/// surrogate pair.
pub(crate) fn chunk_ranges(text: &[u16], range: Range<usize>, size: usize) -> Vec<Range<usize>> {
    let size = size.max(2);
    let mut chunks = Vec::with_capacity(range.len() / size + 1);
    let mut start = range.start;
    while start < range.end {
        let mut end = (start + size).min(range.end);
        if crate::document::splits_surrogate_pair(text, end) {
            end -= 1;
        }
        chunks.push(start..end);
        start = end;
    }
    chunks
}
