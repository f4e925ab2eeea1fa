//! Buffer Manager (spec §4.2): pins pages from a fixed-capacity frame pool,
//! serving hits from cache and evicting unpinned frames under a pluggable
//! replacement policy (LRU or FIFO) on a miss. Delegates all byte I/O and
//! id allocation to `storage::DiskManager`.

mod queue;


use common::{trace::Tracer, DbError, DbResult, PageId, ReplacementPolicyKind};
use hashbrown::HashMap;
use queue::ReplacementQueue;
use std::path::Path;
use storage::{record::PagePool, DiskManager, Page, PageAllocator};

/// A resident page plus the bookkeeping the buffer manager needs to decide
/// when it may be evicted (spec §3's "Frame").
struct Frame {
    page: Page,
    pin_count: u32,
    dirty: bool,
}

/// Monotonic counters updated exactly once per triggering event (spec
/// §4.2's "Ordering and observability").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub flushes: u64,
}

/// Pins pages into a fixed pool of `capacity` frames, backed by a single
/// `DiskManager`. Not re-entrant: the spec's single-writer single-reader
/// regime (§5) means this type requires no internal locking.
pub struct BufferManager {
    disk: DiskManager,
    capacity: usize,
    frames: HashMap<PageId, Frame>,
    queue: ReplacementQueue,
    policy: ReplacementPolicyKind,
    stats: BufferStats,
    tracer: Tracer,
}

impl BufferManager {
    /// Wraps an already-open `DiskManager` with a `capacity`-frame pool.
    pub fn new(disk: DiskManager, capacity: usize, policy: ReplacementPolicyKind) -> Self {
        Self::with_tracer(disk, capacity, policy, Tracer::disabled())
    }

    /// Same as [`Self::new`] but with tracing enabled/disabled explicitly
    /// (spec §4.5/§9: an optional boolean switch for structural events).
    pub fn with_tracer(
        disk: DiskManager,
        capacity: usize,
        policy: ReplacementPolicyKind,
        tracer: Tracer,
    ) -> Self {
        assert!(capacity >= 1, "buffer pool capacity must be at least 1");
        Self {
            disk,
            capacity,
            frames: HashMap::with_capacity(capacity),
            queue: ReplacementQueue::new(),
            policy,
            stats: BufferStats::default(),
            tracer,
        }
    }

    /// Opens the heap file at `path` and wraps it with a buffer pool.
    pub fn open(
        path: impl AsRef<Path>,
        capacity: usize,
        policy: ReplacementPolicyKind,
    ) -> DbResult<Self> {
        Ok(Self::new(DiskManager::open(path)?, capacity, policy))
    }

    /// Allocates a fresh page id via the disk manager. The page is not
    /// pinned by this call; fetch it with [`Self::get_page`] to populate a
    /// frame.
    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        self.disk.allocate_page()
    }

    /// Returns `page_id` to the disk manager's free list. The caller must
    /// ensure the page is not currently pinned.
    pub fn free_page(&mut self, page_id: PageId) -> DbResult<()> {
        self.frames.remove(&page_id);
        self.queue.remove(page_id);
        self.disk.free_page(page_id)
    }

    /// Pins `page_id`, returning a mutable view of its bytes. On a cache
    /// hit the frame is made ineligible for eviction; on a miss a frame is
    /// acquired (from spare capacity or by evicting the replacement
    /// queue's front) and the page is loaded from disk.
    pub fn get_page(&mut self, page_id: PageId) -> DbResult<&mut Page> {
        if self.frames.contains_key(&page_id) {
            self.stats.hits += 1;
            self.queue.remove(page_id);
            let frame = self.frames.get_mut(&page_id).unwrap();
            frame.pin_count += 1;
            self.tracer
                .emit(|| format!("buffer: hit page={} pin={}", page_id.0, frame.pin_count));
            return Ok(&mut frame.page);
        }

        self.stats.misses += 1;
        self.ensure_capacity()?;

        let page = self.disk.read_page_owned(page_id)?;
        self.frames.insert(
            page_id,
            Frame {
                page,
                pin_count: 1,
                dirty: false,
            },
        );
        self.tracer.emit(|| format!("buffer: miss page={}", page_id.0));
        Ok(&mut self.frames.get_mut(&page_id).unwrap().page)
    }

    /// Unpins `page_id`, OR-ing `dirty` into the frame's dirty bit. Once
    /// the pin count reaches zero the frame becomes eligible for
    /// replacement and is appended to the queue.
    pub fn unpin_page(&mut self, page_id: PageId, dirty: bool) -> DbResult<()> {
        let frame = self
            .frames
            .get_mut(&page_id)
            .ok_or_else(|| DbError::InvariantViolation(format!("unpin of unknown page {}", page_id.0)))?;
        if frame.pin_count == 0 {
            return Err(DbError::InvariantViolation(format!(
                "unpin of page {} with pin_count already 0",
                page_id.0
            )));
        }
        frame.pin_count -= 1;
        frame.dirty |= dirty;
        if frame.pin_count == 0 {
            self.requeue(page_id);
        }
        Ok(())
    }

    /// Writes `page_id` back and clears its dirty bit if it is resident
    /// and dirty. A no-op if the page is not in the pool.
    pub fn flush_page(&mut self, page_id: PageId) -> DbResult<()> {
        if let Some(frame) = self.frames.get_mut(&page_id) {
            if frame.dirty {
                self.disk.write_page(page_id, &frame.page.data)?;
                frame.dirty = false;
                self.stats.flushes += 1;
            }
        }
        Ok(())
    }

    /// Flushes every dirty resident frame.
    pub fn flush_all(&mut self) -> DbResult<()> {
        let dirty_ids: Vec<PageId> = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.dirty)
            .map(|(id, _)| *id)
            .collect();
        for id in dirty_ids {
            self.flush_page(id)?;
        }
        self.disk.sync()
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// Re-queues a just-unpinned frame. LRU "touches" an already-queued
    /// entry to the tail; FIFO leaves it where it is (spec §4.2). Under the
    /// invariant that a pinned frame is never queued, the "already queued"
    /// branch is defensive rather than load-bearing.
    fn requeue(&mut self, page_id: PageId) {
        match self.policy {
            ReplacementPolicyKind::Lru => {
                self.queue.remove(page_id);
                self.queue.push_back(page_id);
            }
            ReplacementPolicyKind::Fifo => {
                if !self.queue.contains(page_id) {
                    self.queue.push_back(page_id);
                }
            }
        }
    }

    /// Makes room for one more resident frame, evicting the replacement
    /// queue's front (flushing it first if dirty) when the pool is full.
    fn ensure_capacity(&mut self) -> DbResult<()> {
        if self.frames.len() < self.capacity {
            return Ok(());
        }
        let victim = self.queue.pop_front().ok_or_else(|| {
            DbError::InvariantViolation("buffer pool exhausted: every frame is pinned".into())
        })?;
        let frame = self.frames.remove(&victim).expect("queued page is resident");
        if frame.dirty {
            self.disk.write_page(victim, &frame.page.data)?;
            self.stats.flushes += 1;
        }
        self.stats.evictions += 1;
        self.tracer.emit(|| format!("buffer: evict page={}", victim.0));
        Ok(())
    }
}

impl PagePool for BufferManager {
    fn get_page(&mut self, page_id: PageId) -> DbResult<&mut Page> {
        BufferManager::get_page(self, page_id)
    }

    fn unpin_page(&mut self, page_id: PageId, dirty: bool) -> DbResult<()> {
        BufferManager::unpin_page(self, page_id, dirty)
    }
}

impl PageAllocator for BufferManager {
    fn allocate_page(&mut self) -> DbResult<PageId> {
        BufferManager::allocate_page(self)
    }

    fn free_page(&mut self, page_id: PageId) -> DbResult<()> {
        BufferManager::free_page(self, page_id)
    }
}
