use super::*;
use common::{DbError, DbResult, PageId, RecordId};
use std::collections::HashMap;
use storage::Page;

/// In-memory stand-in for a real page pool: unknown pages are auto-vivified
/// as zeroed rather than erroring, so tests don't need to pre-register every
/// id a split might allocate. Allocation simply mints the next unused id.
///
/// Unlike a throwaway no-op pool, `unpin_page` actually decrements a
/// per-page pin count and errors on underflow, so a caller that leaks a pin
/// (an extra `get_page` with no matching `unpin_page`) fails loudly here
/// instead of silently passing.
struct FakePool {
    pages: HashMap<u32, Page>,
    pins: HashMap<u32, u32>,
    next_id: u32,
}

impl FakePool {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            pins: HashMap::new(),
            next_id: 0,
        }
    }

    /// True once every page this pool has ever handed out is fully unpinned.
    fn all_unpinned(&self) -> bool {
        self.pins.values().all(|&count| count == 0)
    }
}

impl PagePool for FakePool {
    fn get_page(&mut self, page_id: PageId) -> DbResult<&mut Page> {
        *self.pins.entry(page_id.0).or_insert(0) += 1;
        Ok(self
            .pages
            .entry(page_id.0)
            .or_insert_with(|| Page::zeroed(page_id)))
    }

    fn unpin_page(&mut self, page_id: PageId, _dirty: bool) -> DbResult<()> {
        let count = self
            .pins
            .get_mut(&page_id.0)
            .ok_or_else(|| DbError::InvariantViolation(format!("page {} was never pinned", page_id.0)))?;
        if *count == 0 {
            return Err(DbError::InvariantViolation(format!(
                "page {} unpinned more times than it was pinned",
                page_id.0
            )));
        }
        *count -= 1;
        Ok(())
    }
}

impl PageAllocator for FakePool {
    fn allocate_page(&mut self) -> DbResult<PageId> {
        let id = self.next_id;
        self.next_id += 1;
        Ok(PageId(id))
    }

    fn free_page(&mut self, _page_id: PageId) -> DbResult<()> {
        Ok(())
    }
}

fn rid(n: u32) -> RecordId {
    RecordId {
        page_id: PageId(n),
        slot_id: (n % 100) as u16,
    }
}

fn fresh_tree() -> (FakePool, BTree<Int64Key>) {
    let mut pool = FakePool::new();
    let tree = BTree::<Int64Key>::create(&mut pool).unwrap();
    (pool, tree)
}

#[test]
fn search_in_empty_tree_is_none() {
    let (mut pool, tree) = fresh_tree();
    assert_eq!(tree.search(&mut pool, Int64Key(1)).unwrap(), None);
}

#[test]
fn insert_and_search_round_trips() {
    let (mut pool, mut tree) = fresh_tree();
    let r = rid(42);
    assert!(tree.insert(&mut pool, Int64Key(42), r).unwrap());
    assert_eq!(tree.search(&mut pool, Int64Key(42)).unwrap(), Some(r));
    assert_eq!(tree.search(&mut pool, Int64Key(99)).unwrap(), None);
}

#[test]
fn insert_rejects_duplicate_key() {
    let (mut pool, mut tree) = fresh_tree();
    assert!(tree.insert(&mut pool, Int64Key(7), rid(1)).unwrap());
    assert!(!tree.insert(&mut pool, Int64Key(7), rid(2)).unwrap());
    // first write wins
    assert_eq!(tree.search(&mut pool, Int64Key(7)).unwrap(), Some(rid(1)));
}

#[test]
fn dense_insert_forces_splits_and_range_scan_is_sorted() {
    let (mut pool, mut tree) = fresh_tree();
    let n = 2000i64;
    for i in 0..n {
        // insert out of order to exercise mid-range shifts, not just
        // tail-appends
        let key = (i * 37) % n;
        assert!(tree
            .insert(&mut pool, Int64Key(key), rid(key as u32))
            .unwrap());
    }
    for i in 0..n {
        assert_eq!(
            tree.search(&mut pool, Int64Key(i)).unwrap(),
            Some(rid(i as u32)),
            "key {i} missing after dense insert"
        );
    }

    let results = tree.range(&mut pool, Int64Key(100), Int64Key(199)).unwrap();
    assert_eq!(results.len(), 100);
    let keys: Vec<i64> = results.iter().map(|(k, _)| k.0).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "range results must already be ascending");
    assert_eq!(keys.first(), Some(&100));
    assert_eq!(keys.last(), Some(&199));
}

#[test]
fn range_scan_covers_full_key_space() {
    let (mut pool, mut tree) = fresh_tree();
    for i in 0..500i64 {
        tree.insert(&mut pool, Int64Key(i), rid(i as u32)).unwrap();
    }
    let all = tree.range(&mut pool, Int64Key(0), Int64Key(499)).unwrap();
    assert_eq!(all.len(), 500);
    assert_eq!(all.first().unwrap().0, Int64Key(0));
    assert_eq!(all.last().unwrap().0, Int64Key(499));
}

#[test]
fn fixed_string_key_tree_splits_and_scans_in_order() {
    let mut pool = FakePool::new();
    let mut tree = BTree::<FixedStringKey>::create(&mut pool).unwrap();

    let mut names: Vec<String> = (0..300).map(|i| format!("key{i:04}")).collect();
    names.sort();
    for (i, name) in names.iter().enumerate() {
        assert!(tree
            .insert(&mut pool, FixedStringKey::new(name), rid(i as u32))
            .unwrap());
    }

    for (i, name) in names.iter().enumerate() {
        assert_eq!(
            tree.search(&mut pool, FixedStringKey::new(name)).unwrap(),
            Some(rid(i as u32))
        );
    }

    let scanned = tree
        .range(
            &mut pool,
            FixedStringKey::new("key0000"),
            FixedStringKey::new("key9999"),
        )
        .unwrap();
    let scanned_names: Vec<String> = scanned.iter().map(|(k, _)| k.as_str().to_string()).collect();
    assert_eq!(scanned_names, names);
}

#[test]
fn erase_is_accepted_but_always_reports_false() {
    let (mut pool, mut tree) = fresh_tree();
    tree.insert(&mut pool, Int64Key(5), rid(5)).unwrap();
    assert!(!tree.erase(&mut pool, Int64Key(5)).unwrap());
    // the key is still there — erase is a documented no-op.
    assert_eq!(tree.search(&mut pool, Int64Key(5)).unwrap(), Some(rid(5)));
}

#[test]
fn non_splitting_inserts_leave_no_pins_behind() {
    // Regression test: `insert`/`propagate_insert` used to call `get_page`
    // twice (once to inspect count/idx, once to mutate) but `unpin_page`
    // only once, leaking a pin on every non-splitting insert.
    let (mut pool, mut tree) = fresh_tree();
    for i in 0..50i64 {
        assert!(tree.insert(&mut pool, Int64Key(i), rid(i as u32)).unwrap());
        assert!(
            pool.all_unpinned(),
            "pin leaked after inserting key {i} (leaf never split)"
        );
    }
}

#[test]
fn open_adopts_an_existing_root() {
    let (mut pool, mut tree) = fresh_tree();
    tree.insert(&mut pool, Int64Key(1), rid(1)).unwrap();
    let reopened = BTree::<Int64Key>::open(tree.root_page_id());
    assert_eq!(reopened.search(&mut pool, Int64Key(1)).unwrap(), Some(rid(1)));
}
