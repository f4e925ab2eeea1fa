//! Generic B+Tree Index (spec §4.5): an ordered `Key → RID` mapping
//! persisted entirely in pages pinned through whatever pool the caller
//! supplies — the same layering `storage::record::RecordManager` uses, so
//! this crate depends on `storage` for the `PagePool` trait rather than
//! pulling in `buffer` directly.

pub mod key;
mod node;

#[cfg(test)]
mod tests;

use common::{trace::Tracer, DbResult, PageId, RecordId};
use key::BTreeKey;
use node::{NodeView, SENTINEL};
use std::cmp::Ordering;
use std::marker::PhantomData;
use storage::record::PagePool;
use storage::PageAllocator;

/// What a B+Tree needs from its host: pin/unpin pages (`PagePool`) and mint
/// fresh ones for splits (`PageAllocator`). `buffer::BufferManager`
/// implements both, so callers pass a single `&mut BufferManager` rather
/// than threading a separate id-minting closure alongside it — the prior
/// closure-based shape forced callers to borrow the same buffer pool twice
/// at once for any insert that could allocate.
pub trait PagePoolAlloc: PagePool + PageAllocator {}
impl<T: PagePool + PageAllocator> PagePoolAlloc for T {}

pub use key::{FixedStringKey, Int64Key, KEY_BYTES};

/// An ordered index over `K → RecordId`, rooted at a single page id that
/// the caller is responsible for persisting alongside the table it indexes.
pub struct BTree<K: BTreeKey> {
    root: PageId,
    tracer: Tracer,
    _marker: PhantomData<K>,
}

impl<K: BTreeKey> BTree<K> {
    /// Allocates a page and initializes it as an empty root leaf.
    pub fn create(pool: &mut impl PagePoolAlloc) -> DbResult<Self> {
        Self::create_with_tracer(pool, Tracer::disabled())
    }

    pub fn create_with_tracer(pool: &mut impl PagePoolAlloc, tracer: Tracer) -> DbResult<Self> {
        let root = pool.allocate_page()?;
        {
            let page = pool.get_page(root)?;
            let mut view = NodeView::<K>::new(&mut page.data);
            view.init_leaf(SENTINEL);
        }
        pool.unpin_page(root, true)?;
        tracer.emit(|| format!("btree: create root={}", root.0));
        Ok(Self {
            root,
            tracer,
            _marker: PhantomData,
        })
    }

    /// Adopts an already-built tree rooted at `root`.
    pub fn open(root: PageId) -> Self {
        Self::open_with_tracer(root, Tracer::disabled())
    }

    pub fn open_with_tracer(root: PageId, tracer: Tracer) -> Self {
        Self {
            root,
            tracer,
            _marker: PhantomData,
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root
    }

    /// Point lookup. `None` if `key` is absent.
    pub fn search(&self, pool: &mut impl PagePool, key: K) -> DbResult<Option<RecordId>> {
        let leaf_id = self.descend_to_leaf(pool, &key)?;
        let page = pool.get_page(leaf_id)?;
        let view = NodeView::<K>::new(&mut page.data);
        let count = view.header().count;
        let idx = lower_bound_leaf(&view, count, &key);
        let found = if idx < count {
            let (found_key, rid) = view.leaf_entry(idx);
            if found_key.equals(&key) {
                Some(rid)
            } else {
                None
            }
        } else {
            None
        };
        drop(view);
        pool.unpin_page(leaf_id, false)?;
        Ok(found)
    }

    /// Inclusive range scan, ascending by key, walking the leaf sibling
    /// chain.
    pub fn range(&self, pool: &mut impl PagePool, low: K, high: K) -> DbResult<Vec<(K, RecordId)>> {
        let mut out = Vec::new();
        let mut leaf_id = self.descend_to_leaf(pool, &low)?;
        loop {
            let page = pool.get_page(leaf_id)?;
            let view = NodeView::<K>::new(&mut page.data);
            let count = view.header().count;
            let start = if out.is_empty() {
                lower_bound_leaf(&view, count, &low)
            } else {
                0
            };
            let mut stop = false;
            for i in start..count {
                let (key, rid) = view.leaf_entry(i);
                if key.compare(&high) == Ordering::Greater {
                    stop = true;
                    break;
                }
                out.push((key, rid));
            }
            let next = view.header().next;
            drop(view);
            pool.unpin_page(leaf_id, false)?;
            if stop || next == SENTINEL {
                break;
            }
            leaf_id = PageId(next);
        }
        Ok(out)
    }

    /// Inserts `(key, rid)`. Returns `false` without modifying the tree if
    /// `key` is already present.
    pub fn insert(&mut self, pool: &mut impl PagePoolAlloc, key: K, rid: RecordId) -> DbResult<bool> {
        let path = self.descend_path(pool, &key)?;
        let leaf_id = *path.last().unwrap();

        // One `get_page` pin for the whole non-splitting path: the same
        // mutable view is used to read `count`/`idx` and, if there is room,
        // to perform the insert in place — never re-fetched.
        let page = pool.get_page(leaf_id)?;
        let mut view = NodeView::<K>::new(&mut page.data);
        let count = view.header().count;
        let idx = lower_bound_leaf(&view, count, &key);
        let duplicate = idx < count && view.leaf_entry(idx).0.equals(&key);

        if duplicate {
            drop(view);
            pool.unpin_page(leaf_id, false)?;
            return Ok(false);
        }

        if count < node::CAPACITY {
            view.shift_right(idx, count);
            view.set_leaf_entry(idx, key, rid);
            let mut header = view.header();
            header.count += 1;
            view.set_header(header);
            drop(view);
            pool.unpin_page(leaf_id, true)?;
            self.tracer
                .emit(|| format!("btree: insert leaf={} count={}", leaf_id.0, count + 1));
            return Ok(true);
        }
        drop(view);
        pool.unpin_page(leaf_id, false)?;

        self.split_leaf_and_insert(pool, &path, idx, key, rid)?;
        Ok(true)
    }

    /// `erase` has no rebalancing implementation in this scope; it accepts
    /// the call and always reports the key as not found.
    pub fn erase(&mut self, _pool: &mut impl PagePool, _key: K) -> DbResult<bool> {
        Ok(false)
    }

    fn descend_to_leaf(&self, pool: &mut impl PagePool, key: &K) -> DbResult<PageId> {
        Ok(*self.descend_path(pool, key)?.last().unwrap())
    }

    /// Walks from the root to the target leaf, returning every page id
    /// visited (root first, leaf last). Each node is pinned only for the
    /// duration of reading its header/entries.
    fn descend_path(&self, pool: &mut impl PagePool, key: &K) -> DbResult<Vec<PageId>> {
        let mut path = vec![self.root];
        loop {
            let current = *path.last().unwrap();
            let (is_leaf, child) = {
                let page = pool.get_page(current)?;
                let view = NodeView::<K>::new(&mut page.data);
                let header = view.header();
                if header.is_leaf {
                    (true, 0)
                } else {
                    let count = header.count;
                    let idx = partition_point_le(&view, count, key);
                    let child = if idx == 0 {
                        header.leftmost
                    } else {
                        view.internal_entry(idx - 1).1 .0
                    };
                    (false, child)
                }
            };
            pool.unpin_page(current, false)?;
            if is_leaf {
                return Ok(path);
            }
            path.push(PageId(child));
        }
    }

    /// Splits a full leaf at `path.last()`, inserting `(key, rid)` at its
    /// lower-bound position `idx` in the reconstructed entry list, then
    /// propagates the new separator upward.
    fn split_leaf_and_insert(
        &mut self,
        pool: &mut impl PagePoolAlloc,
        path: &[PageId],
        idx: u16,
        key: K,
        rid: RecordId,
    ) -> DbResult<()> {
        let leaf_id = *path.last().unwrap();

        let (mut entries, parent, old_next): (Vec<(K, RecordId)>, u32, u32) = {
            let page = pool.get_page(leaf_id)?;
            let view = NodeView::<K>::new(&mut page.data);
            let header = view.header();
            let entries = (0..header.count).map(|i| view.leaf_entry(i)).collect();
            (entries, header.parent, header.next)
        };
        pool.unpin_page(leaf_id, false)?;
        entries.insert(idx as usize, (key, rid));

        let total = entries.len();
        let mid = total / 2;
        let right_entries = entries.split_off(mid);
        let left_entries = entries;

        let right_id = pool.allocate_page()?;
        {
            let page = pool.get_page(leaf_id)?;
            let mut view = NodeView::<K>::new(&mut page.data);
            view.init_leaf(parent);
            for (i, (k, r)) in left_entries.iter().enumerate() {
                view.set_leaf_entry(i as u16, *k, *r);
            }
            let mut header = view.header();
            header.count = left_entries.len() as u16;
            header.next = right_id.0;
            view.set_header(header);
        }
        pool.unpin_page(leaf_id, true)?;

        {
            let page = pool.get_page(right_id)?;
            let mut view = NodeView::<K>::new(&mut page.data);
            view.init_leaf(parent);
            for (i, (k, r)) in right_entries.iter().enumerate() {
                view.set_leaf_entry(i as u16, *k, *r);
            }
            let mut header = view.header();
            header.count = right_entries.len() as u16;
            header.next = old_next;
            view.set_header(header);
        }
        pool.unpin_page(right_id, true)?;

        let separator = right_entries[0].0;
        self.tracer.emit(|| {
            format!(
                "btree: split leaf={} right={} separator={:?}",
                leaf_id.0, right_id.0, separator
            )
        });
        self.propagate_insert(pool, &path[..path.len() - 1], separator, leaf_id, right_id)
    }

    /// Inserts `(separator, right_child)` into `ancestors.last()` (or
    /// allocates a new root if `ancestors` is empty, meaning `left_child`
    /// itself was the root).
    fn propagate_insert(
        &mut self,
        pool: &mut impl PagePoolAlloc,
        ancestors: &[PageId],
        separator: K,
        left_child: PageId,
        right_child: PageId,
    ) -> DbResult<()> {
        let Some(&parent_id) = ancestors.last() else {
            let new_root = pool.allocate_page()?;
            {
                let page = pool.get_page(new_root)?;
                let mut view = NodeView::<K>::new(&mut page.data);
                view.init_internal(SENTINEL, left_child);
                view.set_internal_entry(0, separator, right_child);
                let mut header = view.header();
                header.count = 1;
                view.set_header(header);
            }
            pool.unpin_page(new_root, true)?;

            set_parent(pool, left_child, new_root.0)?;
            set_parent(pool, right_child, new_root.0)?;
            self.root = new_root;
            self.tracer
                .emit(|| format!("btree: new root={} left={} right={}", new_root.0, left_child.0, right_child.0));
            return Ok(());
        };

        set_parent(pool, right_child, parent_id.0)?;

        // One `get_page` pin for the whole non-splitting path, mirroring
        // `insert`'s fix: the same mutable view reads `count`/`idx` and, if
        // there is room, performs the insert in place.
        let page = pool.get_page(parent_id)?;
        let mut view = NodeView::<K>::new(&mut page.data);
        let count = view.header().count;
        let idx = partition_point_le(&view, count, &separator);

        if count < node::CAPACITY {
            view.shift_right(idx, count);
            view.set_internal_entry(idx, separator, right_child);
            let mut header = view.header();
            header.count += 1;
            view.set_header(header);
            drop(view);
            pool.unpin_page(parent_id, true)?;
            return Ok(());
        }
        drop(view);
        pool.unpin_page(parent_id, false)?;

        self.split_internal_and_insert(pool, ancestors, idx, separator, right_child)
    }

    /// Splits a full internal node, reinserting `(sep, right_child)` at its
    /// slot `idx`, then recurses one level up.
    fn split_internal_and_insert(
        &mut self,
        pool: &mut impl PagePoolAlloc,
        ancestors: &[PageId],
        idx: u16,
        sep: K,
        new_right_child: PageId,
    ) -> DbResult<()> {
        let parent_id = *ancestors.last().unwrap();

        let (mut children, mut keys, parent_of_parent): (Vec<PageId>, Vec<K>, u32) = {
            let page = pool.get_page(parent_id)?;
            let view = NodeView::<K>::new(&mut page.data);
            let header = view.header();
            let mut children = vec![PageId(header.leftmost)];
            let mut keys = Vec::with_capacity(header.count as usize);
            for i in 0..header.count {
                let (k, c) = view.internal_entry(i);
                keys.push(k);
                children.push(c);
            }
            (children, keys, header.parent)
        };
        pool.unpin_page(parent_id, false)?;

        // children[i] is the child before keys[i] (for i < keys.len()); the
        // new separator's right child replaces the slot right after the
        // node that just split.
        keys.insert(idx as usize, sep);
        children.insert(idx as usize + 1, new_right_child);

        let total_keys = keys.len();
        let mid = total_keys / 2;
        let promoted = keys[mid];

        let right_keys: Vec<K> = keys[mid + 1..].to_vec();
        let left_keys: Vec<K> = keys[..mid].to_vec();
        let right_children: Vec<PageId> = children[mid + 1..].to_vec();
        let left_children: Vec<PageId> = children[..=mid].to_vec();

        {
            let page = pool.get_page(parent_id)?;
            let mut view = NodeView::<K>::new(&mut page.data);
            view.init_internal(parent_of_parent, left_children[0]);
            for (i, (k, c)) in left_keys.iter().zip(left_children[1..].iter()).enumerate() {
                view.set_internal_entry(i as u16, *k, *c);
            }
            let mut header = view.header();
            header.count = left_keys.len() as u16;
            view.set_header(header);
        }
        pool.unpin_page(parent_id, true)?;

        let right_id = pool.allocate_page()?;
        {
            let page = pool.get_page(right_id)?;
            let mut view = NodeView::<K>::new(&mut page.data);
            view.init_internal(parent_of_parent, right_children[0]);
            for (i, (k, c)) in right_keys.iter().zip(right_children[1..].iter()).enumerate() {
                view.set_internal_entry(i as u16, *k, *c);
            }
            let mut header = view.header();
            header.count = right_keys.len() as u16;
            view.set_header(header);
        }
        pool.unpin_page(right_id, true)?;

        for child in &right_children {
            set_parent(pool, *child, right_id.0)?;
        }

        self.tracer.emit(|| {
            format!(
                "btree: split internal={} right={} promoted={:?}",
                parent_id.0, right_id.0, promoted
            )
        });
        self.propagate_insert(pool, &ancestors[..ancestors.len() - 1], promoted, parent_id, right_id)
    }
}

/// Patches the `parent` field of an arbitrary node page without needing to
/// know whether it is a leaf or internal node.
fn set_parent(pool: &mut impl PagePool, child: PageId, parent: u32) -> DbResult<()> {
    let page = pool.get_page(child)?;
    node::write_parent(&mut page.data, parent);
    pool.unpin_page(child, true)
}

/// First index in `[0, count)` whose key is `>= target` (standard binary
/// lower bound over the leaf's sorted entries).
fn lower_bound_leaf<K: BTreeKey>(view: &NodeView<K>, count: u16, target: &K) -> u16 {
    let mut lo = 0u16;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (k, _) = view.leaf_entry(mid);
        if k.compare(target) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Number of internal-node separator keys that are `<= target`. Descent
/// picks `leftmost` when this is `0`, else `internal_entry(result - 1)`'s
/// child — "the rightmost separator whose key is ≤ target" (spec §4.5).
fn partition_point_le<K: BTreeKey>(view: &NodeView<K>, count: u16, target: &K) -> u16 {
    let mut lo = 0u16;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (k, _) = view.internal_entry(mid);
        if k.compare(target) != Ordering::Greater {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
