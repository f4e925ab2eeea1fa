use super::*;
use record::{PagePool, RecordManager};
use slotted::SlottedPage;
use std::collections::HashMap;
use tempfile::tempdir;

/// Minimal in-memory stand-in for `buffer::BufferManager`, just enough to
/// exercise `RecordManager` without the pin-count/eviction machinery a real
/// buffer pool adds.
struct FakePool {
    pages: HashMap<u32, Page>,
}

impl FakePool {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    fn allocate(&mut self) -> PageId {
        let id = PageId(self.pages.len() as u32);
        self.pages.insert(id.0, Page::zeroed(id));
        id
    }
}

impl PagePool for FakePool {
    fn get_page(&mut self, page_id: PageId) -> DbResult<&mut Page> {
        self.pages
            .get_mut(&page_id.0)
            .ok_or_else(|| DbError::NotFound(format!("page {} not resident", page_id.0)))
    }

    fn unpin_page(&mut self, _page_id: PageId, _dirty: bool) -> DbResult<()> {
        Ok(())
    }
}

fn fresh_disk_manager() -> (tempfile::TempDir, DiskManager) {
    let dir = tempdir().expect("tempdir");
    let dm = DiskManager::open(dir.path().join("heap.db")).expect("open");
    (dir, dm)
}

#[test]
fn allocate_then_read_write_round_trips() {
    let (_dir, mut dm) = fresh_disk_manager();
    let page_id = dm.allocate_page().expect("allocate");

    let mut data = vec![0u8; PAGE_SIZE];
    data[0] = 0xAB;
    dm.write_page(page_id, &data).expect("write");

    let mut out = vec![0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut out).expect("read");
    assert_eq!(out, data);
}

#[test]
fn freed_pages_are_reused_before_minting_new_ids() {
    let (_dir, mut dm) = fresh_disk_manager();
    let first = dm.allocate_page().expect("allocate");
    let second = dm.allocate_page().expect("allocate");
    dm.free_page(first).expect("free");

    let reused = dm.allocate_page().expect("reallocate");
    assert_eq!(reused, first);

    let fresh = dm.allocate_page().expect("allocate new");
    assert!(fresh.0 > second.0);
}

#[test]
fn reading_a_freed_page_is_not_found() {
    let (_dir, mut dm) = fresh_disk_manager();
    let page_id = dm.allocate_page().expect("allocate");
    dm.free_page(page_id).expect("free");

    let mut out = vec![0u8; PAGE_SIZE];
    let err = dm.read_page(page_id, &mut out).unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[test]
fn meta_persists_across_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("heap.db");
    let first_id = {
        let mut dm = DiskManager::open(&path).expect("open");
        let first_id = dm.allocate_page().expect("allocate");
        dm.allocate_page().expect("allocate");
        dm.free_page(first_id).expect("free");
        first_id
    };
    let mut dm = DiskManager::open(&path).expect("reopen");
    let reused = dm.allocate_page().expect("allocate after reopen");
    assert_eq!(reused, first_id);
}

#[test]
fn write_rejects_wrong_sized_buffers() {
    let (_dir, mut dm) = fresh_disk_manager();
    let page_id = dm.allocate_page().expect("allocate");
    let err = dm.write_page(page_id, &[0u8; 10]).unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));
}

#[test]
fn slotted_insert_read_round_trips() {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let slot = page.insert(b"hello").expect("insert");
    assert_eq!(page.read(slot).unwrap(), Some(b"hello".to_vec()));
}

#[test]
fn slotted_update_in_place_when_it_fits() {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let slot = page.insert(b"hello world").expect("insert");
    let fit = page.update_in_place(slot, b"hi").expect("update");
    assert!(fit);
    assert_eq!(page.read(slot).unwrap(), Some(b"hi".to_vec()));
}

#[test]
fn slotted_update_in_place_refuses_growth() {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let slot = page.insert(b"hi").expect("insert");
    let fit = page.update_in_place(slot, b"hello world").expect("update");
    assert!(!fit);
    assert_eq!(page.read(slot).unwrap(), Some(b"hi".to_vec()));
}

#[test]
fn slotted_erase_tombstones_but_keeps_slot_index() {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let a = page.insert(b"a").expect("insert a");
    let b = page.insert(b"b").expect("insert b");
    page.erase(a).expect("erase");

    assert_eq!(page.read(a).unwrap(), None);
    assert_eq!(page.read(b).unwrap(), Some(b"b".to_vec()));

    let err = page.erase(a).unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[test]
fn slotted_compact_preserves_rids_and_reclaims_space() {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let a = page.insert(b"alpha").expect("insert a");
    let b = page.insert(b"beta").expect("insert b");
    let c = page.insert(b"gamma").expect("insert c");
    page.erase(b).expect("erase b");

    let free_before = page.free_space();
    page.compact();
    let free_after = page.free_space();

    assert!(free_after > free_before);
    assert_eq!(page.read(a).unwrap(), Some(b"alpha".to_vec()));
    assert_eq!(page.read(b).unwrap(), None);
    assert_eq!(page.read(c).unwrap(), Some(b"gamma".to_vec()));
}

#[test]
fn slotted_compact_survives_offsets_out_of_slot_order() {
    // Relocating an early slot to the tail gives it a larger `off` than a
    // later-inserted slot, inverting off-order vs slot-index order. compact
    // must not clobber the later slot's still-unread bytes while repacking.
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let a = page.insert(b"alpha").expect("insert a");
    let b = page.insert(b"beta").expect("insert b");

    assert!(page.relocate_to_tail(a, b"ALPHA-GROWN").expect("relocate"));

    page.compact();

    assert_eq!(page.read(a).unwrap(), Some(b"ALPHA-GROWN".to_vec()));
    assert_eq!(page.read(b).unwrap(), Some(b"beta".to_vec()));
}

#[test]
fn slotted_scan_skips_tombstones_and_preserves_order() {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let a = page.insert(b"one").expect("insert");
    let _b = page.insert(b"two").expect("insert");
    let c = page.insert(b"three").expect("insert");
    page.erase(_b).expect("erase");

    let live: Vec<_> = page.scan().collect();
    assert_eq!(live, vec![(a, b"one".to_vec()), (c, b"three".to_vec())]);
}

#[test]
fn slotted_insert_fails_once_page_is_full() {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut page = SlottedPage::new(&mut buf);
    let record = vec![0u8; 64];
    loop {
        if page.insert(&record).is_err() {
            break;
        }
    }
    assert!(page.insert(&record).is_err());
}
