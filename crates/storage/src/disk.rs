//! Disk Manager: a page-addressed heap file plus a text meta sidecar
//! tracking the next unused page id and the free list (spec §4.1).
//!
//! The heap file itself holds nothing but `PAGE_SIZE`-aligned pages; every
//! other piece of bookkeeping (free list, next id) lives in `meta.json`
//! (text despite the name, per spec §6) beside it, so that a reader can
//! inspect it without decoding binary.

use crate::{Page, PAGE_SIZE};
use common::{DbError, DbResult, PageId};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// On-disk bookkeeping for a heap file: the next id that would be minted by
/// allocation, and the set of freed page ids available for reuse.
///
/// Persisted as two bare lines of text (spec §4.1/§6):
/// ```text
/// <next_page_id>
/// <id> <id> ...
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DiskMeta {
    next_page_id: u32,
    free_list: Vec<u32>,
}

impl DiskMeta {
    fn parse(text: &str) -> DbResult<Self> {
        let mut lines = text.lines();
        let next_page_id = lines
            .next()
            .ok_or_else(|| DbError::InvariantViolation("disk meta missing next_page_id".into()))?
            .trim()
            .parse::<u32>()
            .map_err(|_| DbError::InvariantViolation("bad next_page_id in disk meta".into()))?;
        let free_list = lines
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(|id| {
                id.parse::<u32>()
                    .map_err(|_| DbError::InvariantViolation(format!("bad free list entry: {id:?}")))
            })
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self {
            next_page_id,
            free_list,
        })
    }

    fn render(&self) -> String {
        let free_list = self
            .free_list
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{}\n{}\n", self.next_page_id, free_list)
    }
}

/// Owns one heap file and its meta sidecar. All page-granular I/O for the
/// engine passes through here; the buffer manager is the only other crate
/// that talks to a `DiskManager` directly.
pub struct DiskManager {
    file: File,
    meta_path: PathBuf,
    meta: DiskMeta,
}

impl DiskManager {
    /// Opens (creating if absent) the heap file at `path`, loading or
    /// initializing its `meta.json` sidecar.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let meta_path = meta_path_for(path);
        let meta = if meta_path.exists() {
            let mut text = String::new();
            File::open(&meta_path)?.read_to_string(&mut text)?;
            DiskMeta::parse(&text)?
        } else {
            let meta = DiskMeta::default();
            write_meta(&meta_path, &meta)?;
            meta
        };

        Ok(Self {
            file,
            meta_path,
            meta,
        })
    }

    /// Allocates a fresh page id, preferring a page from the free list
    /// before minting a new one, and zero-fills it on disk (spec §4.1).
    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        let id = if let Some(id) = self.meta.free_list.pop() {
            id
        } else {
            let id = self.meta.next_page_id;
            self.meta.next_page_id += 1;
            id
        };
        self.grow_to_fit(id)?;
        self.write_page(PageId(id), &[0u8; PAGE_SIZE])?;
        self.persist_meta()?;
        Ok(PageId(id))
    }

    /// Returns `page_id` to the free list. The underlying bytes are left in
    /// place; they are overwritten the next time the id is reallocated.
    pub fn free_page(&mut self, page_id: PageId) -> DbResult<()> {
        if page_id.0 >= self.meta.next_page_id {
            return Err(DbError::NotFound(format!(
                "page {} was never allocated",
                page_id.0
            )));
        }
        if self.meta.free_list.contains(&page_id.0) {
            return Err(DbError::InvalidArgument(format!(
                "page {} is already free",
                page_id.0
            )));
        }
        self.meta.free_list.push(page_id.0);
        self.persist_meta()
    }

    /// Reads one `PAGE_SIZE` page into `out`. `out` must be exactly
    /// `PAGE_SIZE` bytes long.
    pub fn read_page(&mut self, page_id: PageId, out: &mut [u8]) -> DbResult<()> {
        if out.len() != PAGE_SIZE {
            return Err(DbError::InvalidArgument(format!(
                "read buffer must be {PAGE_SIZE} bytes, got {}",
                out.len()
            )));
        }
        self.ensure_allocated(page_id)?;
        self.file.seek(SeekFrom::Start(offset_of(page_id)))?;
        self.file.read_exact(out)?;
        Ok(())
    }

    /// Writes `data` (exactly `PAGE_SIZE` bytes) to `page_id`.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> DbResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::InvalidArgument(format!(
                "page write must be {PAGE_SIZE} bytes, got {}",
                data.len()
            )));
        }
        self.grow_to_fit(page_id.0)?;
        self.file.seek(SeekFrom::Start(offset_of(page_id)))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Convenience wrapper returning an owned [`Page`].
    pub fn read_page_owned(&mut self, page_id: PageId) -> DbResult<Page> {
        let mut page = Page::zeroed(page_id);
        self.read_page(page_id, &mut page.data)?;
        Ok(page)
    }

    /// Flushes durable state: the heap file's OS buffers and the meta
    /// sidecar. Called by the buffer manager on an explicit flush request
    /// (spec's Non-goal: no background/periodic flushing).
    pub fn sync(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn ensure_allocated(&self, page_id: PageId) -> DbResult<()> {
        if page_id.0 >= self.meta.next_page_id || self.meta.free_list.contains(&page_id.0) {
            return Err(DbError::NotFound(format!(
                "page {} is not a live allocated page",
                page_id.0
            )));
        }
        Ok(())
    }

    fn grow_to_fit(&mut self, page_id: u32) -> DbResult<()> {
        let required_len = offset_of(PageId(page_id)) + PAGE_SIZE as u64;
        let current_len = self.file.metadata()?.len();
        if current_len < required_len {
            self.file.set_len(required_len)?;
        }
        Ok(())
    }

    fn persist_meta(&self) -> DbResult<()> {
        write_meta(&self.meta_path, &self.meta)
    }
}

/// Mints and reclaims page ids. Implemented by [`DiskManager`] directly and,
/// in the `buffer` crate, by `BufferManager` (whose `free_page` additionally
/// evicts any cached frame so a reused id never serves stale bytes from
/// cache). Kept as a trait so `catalog` can accept either without depending
/// on `buffer`.
pub trait PageAllocator {
    fn allocate_page(&mut self) -> DbResult<PageId>;
    fn free_page(&mut self, page_id: PageId) -> DbResult<()>;
}

impl PageAllocator for DiskManager {
    fn allocate_page(&mut self) -> DbResult<PageId> {
        DiskManager::allocate_page(self)
    }

    fn free_page(&mut self, page_id: PageId) -> DbResult<()> {
        DiskManager::free_page(self, page_id)
    }
}

fn offset_of(page_id: PageId) -> u64 {
    page_id.0 as u64 * PAGE_SIZE as u64
}

/// The Disk Manager meta sidecar always lives at `meta.json` beside the
/// heap file (spec §6), regardless of the heap file's own name.
fn meta_path_for(heap_path: &Path) -> PathBuf {
    match heap_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("meta.json"),
        _ => PathBuf::from("meta.json"),
    }
}

fn write_meta(path: &Path, meta: &DiskMeta) -> DbResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(meta.render().as_bytes())?;
    Ok(())
}
