//! Record Manager (spec §4.4): table-level record operations built on top
//! of the slotted-page primitives, pinning pages through whatever pool the
//! caller supplies.
//!
//! `storage` cannot depend on `buffer` (buffer already depends on `storage`
//! for `Page`/`DiskManager`), so page access here goes through the
//! [`PagePool`] trait rather than a concrete `BufferManager`. `buffer`
//! implements this trait for its `BufferManager`; tests in this crate use a
//! minimal in-memory stand-in.

use crate::{slotted::SlottedPage, Page, PAGE_SIZE};
use common::{DbError, DbResult, PageId, RecordId};

/// Whatever pins and unpins pages for the Record Manager. Implemented by
/// `buffer::BufferManager`; kept as a trait so this crate never has to
/// depend on `buffer`.
pub trait PagePool {
    /// Pins `page_id`, returning a mutable view of its bytes.
    fn get_page(&mut self, page_id: PageId) -> DbResult<&mut Page>;
    /// Unpins `page_id`, marking it dirty if `dirty` is set.
    fn unpin_page(&mut self, page_id: PageId, dirty: bool) -> DbResult<()>;
}

/// Stateless table-record operations. Takes the caller's page-pool and the
/// table's current page list (owned by the catalog) as parameters rather
/// than holding them, since both are shared with other components.
pub struct RecordManager;

impl RecordManager {
    /// Scans `table_pages` for one with enough free space for `bytes` and
    /// inserts there, without allocating. `None` means every existing page
    /// is full and the caller must allocate a fresh one (via
    /// [`Self::insert_into_page`]) and register it on the table's page list
    /// itself — a separate call so callers whose allocator and pool are the
    /// same borrowed value (e.g. a catalog allocating through the same
    /// buffer pool being pinned) can sequence the two mutable borrows
    /// instead of holding both open at once.
    pub fn try_insert_existing(
        pool: &mut impl PagePool,
        table_pages: &[PageId],
        bytes: &[u8],
    ) -> DbResult<Option<RecordId>> {
        if bytes.len() > u16::MAX as usize {
            return Err(DbError::InvalidArgument(format!(
                "record of {} bytes exceeds the {}-byte limit",
                bytes.len(),
                u16::MAX
            )));
        }

        for &page_id in table_pages {
            let page = pool.get_page(page_id)?;
            let mut slotted = SlottedPage::new(&mut page.data);
            if slotted.fits(bytes.len(), true) {
                let slot_id = slotted.insert(bytes)?;
                pool.unpin_page(page_id, true)?;
                return Ok(Some(RecordId { page_id, slot_id }));
            }
            pool.unpin_page(page_id, false)?;
        }
        Ok(None)
    }

    /// Inserts `bytes` into a just-allocated, empty `page_id`. Paired with
    /// [`Self::try_insert_existing`]: the caller allocates `page_id` (and
    /// registers it on the table's page list) between the two calls.
    pub fn insert_into_page(pool: &mut impl PagePool, page_id: PageId, bytes: &[u8]) -> DbResult<RecordId> {
        let page = pool.get_page(page_id)?;
        let mut slotted = SlottedPage::new(&mut page.data);
        let slot_id = slotted.insert(bytes)?;
        pool.unpin_page(page_id, true)?;
        Ok(RecordId { page_id, slot_id })
    }

    /// Reads the record at `rid` into a fresh buffer, or `None` if the slot
    /// is out of range or tombstoned.
    pub fn read(pool: &mut impl PagePool, rid: RecordId) -> DbResult<Option<Vec<u8>>> {
        let page = pool.get_page(rid.page_id)?;
        let slotted = SlottedPage::new(&mut page.data);
        let result = slotted.read(rid.slot_id).unwrap_or(None);
        pool.unpin_page(rid.page_id, false)?;
        Ok(result)
    }

    /// Updates the record at `rid` in place when it fits, or after an
    /// intra-page compaction frees enough room to append it at the tail.
    /// Returns `false` (and leaves the record untouched) if neither works;
    /// callers may fall back to an erase-then-insert elsewhere.
    pub fn update(pool: &mut impl PagePool, rid: RecordId, bytes: &[u8]) -> DbResult<bool> {
        if bytes.len() > u16::MAX as usize {
            return Err(DbError::InvalidArgument(format!(
                "record of {} bytes exceeds the {}-byte limit",
                bytes.len(),
                u16::MAX
            )));
        }
        let page = pool.get_page(rid.page_id)?;
        let mut slotted = SlottedPage::new(&mut page.data);

        if slotted.update_in_place(rid.slot_id, bytes)? {
            pool.unpin_page(rid.page_id, true)?;
            return Ok(true);
        }

        slotted.compact();
        let grew = slotted.relocate_to_tail(rid.slot_id, bytes)?;
        pool.unpin_page(rid.page_id, true)?;
        Ok(grew)
    }

    /// Tombstones the record at `rid`. Returns `false` if the slot was
    /// already unknown or tombstoned. Compacts the page if the resulting
    /// free space drops below a quarter of `PAGE_SIZE`.
    pub fn erase(pool: &mut impl PagePool, rid: RecordId) -> DbResult<bool> {
        let page = pool.get_page(rid.page_id)?;
        let mut slotted = SlottedPage::new(&mut page.data);

        if slotted.erase(rid.slot_id).is_err() {
            pool.unpin_page(rid.page_id, false)?;
            return Ok(false);
        }
        if slotted.free_space() < PAGE_SIZE / 4 {
            slotted.compact();
        }
        pool.unpin_page(rid.page_id, true)?;
        Ok(true)
    }

    /// Scans every page of a table in catalog (insertion) order, yielding
    /// live `(RecordId, bytes)` pairs in ascending slot order within each
    /// page.
    pub fn scan(pool: &mut impl PagePool, table_pages: &[PageId]) -> DbResult<Vec<(RecordId, Vec<u8>)>> {
        let mut out = Vec::new();
        for &page_id in table_pages {
            let page = pool.get_page(page_id)?;
            let slotted = SlottedPage::new(&mut page.data);
            out.extend(slotted.scan().map(|(slot_id, bytes)| {
                (
                    RecordId {
                        page_id,
                        slot_id,
                    },
                    bytes,
                )
            }));
            pool.unpin_page(page_id, false)?;
        }
        Ok(out)
    }
}
