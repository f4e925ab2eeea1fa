//! Secondary index registry for the storage facade. Each named index wraps
//! one `BTree<K>` over a single table column, with the concrete key type
//! chosen from the column's declared `SqlType` at creation time. Index
//! maintenance on DML is out of scope here — callers drive `BTree` inserts
//! themselves.

use btree::{BTree, FixedStringKey, Int64Key};
use buffer::BufferManager;
use common::{trace::Tracer, DbError, DbResult, PageId, RecordId};
use std::fs;
use std::path::{Path, PathBuf};
use types::SqlType;

pub const INDEXES_FILE: &str = "indexes.meta";

/// A value a caller supplies to key into an index, independent of which
/// concrete `BTreeKey` backs it.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexKeyValue {
    Int(i64),
    Text(String),
}

/// Which concrete key type an index uses, derived from the indexed column's
/// `SqlType` and persisted so `open` can rebuild the right `BTree<K>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IndexKind {
    Int64,
    FixedString,
}

impl IndexKind {
    fn for_column_type(ty: SqlType) -> DbResult<Self> {
        match ty {
            SqlType::Int | SqlType::Timestamp => Ok(IndexKind::Int64),
            SqlType::Varchar | SqlType::Char => Ok(IndexKind::FixedString),
            other => Err(DbError::InvalidArgument(format!(
                "column type {other:?} is not indexable"
            ))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Int64 => "int64",
            IndexKind::FixedString => "string",
        }
    }

    fn parse(s: &str) -> DbResult<Self> {
        match s {
            "int64" => Ok(IndexKind::Int64),
            "string" => Ok(IndexKind::FixedString),
            other => Err(DbError::InvariantViolation(format!(
                "unknown index kind: {other:?}"
            ))),
        }
    }
}

enum IndexTree {
    Int64(BTree<Int64Key>),
    FixedString(BTree<FixedStringKey>),
}

impl IndexTree {
    fn root_page_id(&self) -> PageId {
        match self {
            IndexTree::Int64(tree) => tree.root_page_id(),
            IndexTree::FixedString(tree) => tree.root_page_id(),
        }
    }
}

struct IndexEntry {
    table: String,
    column: String,
    unique: bool,
    kind: IndexKind,
    tree: IndexTree,
}

/// The facade's view of every registered secondary index, keyed by name and
/// persisted alongside the catalog.
pub struct IndexRegistry {
    path: PathBuf,
    entries: Vec<(String, IndexEntry)>,
}

impl IndexRegistry {
    pub fn open(dir: impl AsRef<Path>) -> DbResult<Self> {
        let path = dir.as_ref().join(INDEXES_FILE);
        let mut registry = Self {
            path,
            entries: Vec::new(),
        };
        registry.load()?;
        Ok(registry)
    }

    fn load(&mut self) -> DbResult<()> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Ok(());
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let name = parts.next().ok_or_else(malformed(line))?.to_string();
            let table = parts.next().ok_or_else(malformed(line))?.to_string();
            let column = parts.next().ok_or_else(malformed(line))?.to_string();
            let kind = IndexKind::parse(parts.next().ok_or_else(malformed(line))?)?;
            let unique: bool = parts
                .next()
                .ok_or_else(malformed(line))?
                .parse()
                .map_err(|_| DbError::InvariantViolation(format!("bad unique flag: {line:?}")))?;
            let root: u32 = parts
                .next()
                .ok_or_else(malformed(line))?
                .parse()
                .map_err(|_| DbError::InvariantViolation(format!("bad root page id: {line:?}")))?;
            let tree = match kind {
                IndexKind::Int64 => IndexTree::Int64(BTree::open(PageId(root))),
                IndexKind::FixedString => IndexTree::FixedString(BTree::open(PageId(root))),
            };
            self.entries.push((
                name,
                IndexEntry {
                    table,
                    column,
                    unique,
                    kind,
                    tree,
                },
            ));
        }
        Ok(())
    }

    fn persist(&self) -> DbResult<()> {
        let mut text = String::new();
        for (name, entry) in &self.entries {
            text.push_str(&format!(
                "{} {} {} {} {} {}\n",
                name,
                entry.table,
                entry.column,
                entry.kind.as_str(),
                entry.unique,
                entry.tree.root_page_id().0
            ));
        }
        fs::write(&self.path, text)?;
        Ok(())
    }

    fn find(&self, name: &str) -> DbResult<&IndexEntry> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
            .ok_or_else(|| DbError::NotFound(format!("unknown index '{name}'")))
    }

    fn find_mut(&mut self, name: &str) -> DbResult<&mut IndexEntry> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
            .ok_or_else(|| DbError::NotFound(format!("unknown index '{name}'")))
    }

    /// Registers `name` over `table.column`, allocating a fresh empty
    /// `BTree<K>` whose key type is picked from `column_type`. Fails if
    /// `name` already exists.
    pub fn create_index(
        &mut self,
        buffer: &mut BufferManager,
        name: &str,
        table: &str,
        column: &str,
        column_type: SqlType,
        unique: bool,
        tracer: Tracer,
    ) -> DbResult<()> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(DbError::InvalidArgument(format!(
                "index '{name}' already exists"
            )));
        }
        let kind = IndexKind::for_column_type(column_type)?;
        let tree = match kind {
            IndexKind::Int64 => IndexTree::Int64(BTree::create_with_tracer(buffer, tracer)?),
            IndexKind::FixedString => IndexTree::FixedString(BTree::create_with_tracer(buffer, tracer)?),
        };
        self.entries.push((
            name.to_string(),
            IndexEntry {
                table: table.to_string(),
                column: column.to_string(),
                unique,
                kind,
                tree,
            },
        ));
        self.persist()
    }

    pub fn insert(
        &mut self,
        buffer: &mut BufferManager,
        name: &str,
        key: IndexKeyValue,
        rid: RecordId,
    ) -> DbResult<bool> {
        let entry = self.find_mut(name)?;
        let inserted = match (&mut entry.tree, key) {
            (IndexTree::Int64(tree), IndexKeyValue::Int(v)) => tree.insert(buffer, Int64Key(v), rid)?,
            (IndexTree::FixedString(tree), IndexKeyValue::Text(s)) => {
                tree.insert(buffer, fixed_string_key(&s)?, rid)?
            }
            _ => return Err(DbError::InvalidArgument(format!("key type mismatch for index '{name}'"))),
        };
        self.persist()?;
        Ok(inserted)
    }

    pub fn search(
        &self,
        buffer: &mut BufferManager,
        name: &str,
        key: IndexKeyValue,
    ) -> DbResult<Option<RecordId>> {
        let entry = self.find(name)?;
        match (&entry.tree, key) {
            (IndexTree::Int64(tree), IndexKeyValue::Int(v)) => tree.search(buffer, Int64Key(v)),
            (IndexTree::FixedString(tree), IndexKeyValue::Text(s)) => {
                tree.search(buffer, fixed_string_key(&s)?)
            }
            _ => Err(DbError::InvalidArgument(format!("key type mismatch for index '{name}'"))),
        }
    }

    pub fn range(
        &self,
        buffer: &mut BufferManager,
        name: &str,
        low: IndexKeyValue,
        high: IndexKeyValue,
    ) -> DbResult<Vec<(IndexKeyValue, RecordId)>> {
        let entry = self.find(name)?;
        match (&entry.tree, low, high) {
            (IndexTree::Int64(tree), IndexKeyValue::Int(lo), IndexKeyValue::Int(hi)) => Ok(tree
                .range(buffer, Int64Key(lo), Int64Key(hi))?
                .into_iter()
                .map(|(k, rid)| (IndexKeyValue::Int(k.0), rid))
                .collect()),
            (IndexTree::FixedString(tree), IndexKeyValue::Text(lo), IndexKeyValue::Text(hi)) => Ok(tree
                .range(buffer, fixed_string_key(&lo)?, fixed_string_key(&hi)?)?
                .into_iter()
                .map(|(k, rid)| (IndexKeyValue::Text(k.as_str().into_owned()), rid))
                .collect()),
            _ => Err(DbError::InvalidArgument(format!("key type mismatch for index '{name}'"))),
        }
    }

    pub fn is_unique(&self, name: &str) -> DbResult<bool> {
        Ok(self.find(name)?.unique)
    }
}

fn fixed_string_key(s: &str) -> DbResult<FixedStringKey> {
    if s.len() > btree::KEY_BYTES {
        return Err(DbError::InvalidArgument(format!(
            "key {s:?} exceeds {}-byte index key limit",
            btree::KEY_BYTES
        )));
    }
    Ok(FixedStringKey::new(s))
}

fn malformed(line: &str) -> impl Fn() -> DbError + '_ {
    move || DbError::InvariantViolation(format!("malformed indexes line: {line:?}"))
}
