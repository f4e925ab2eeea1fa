//! Table Catalog: the single source of truth for "which pages
//! belong to table T" plus each table's column schema. Both are persisted as
//! line-oriented text sidecars so they can be inspected without decoding a
//! binary format — the same philosophy `storage::disk`'s `.meta` file uses.


use ahash::RandomState;
use common::{DbError, DbResult, PageId, TableId};
use hashbrown::HashMap;
use std::{
    fs,
    path::{Path, PathBuf},
};
use storage::PageAllocator;
use types::SqlType;

type Map<K, V> = HashMap<K, V, RandomState>;

pub const TABLES_FILE: &str = "tables.meta";
pub const SCHEMAS_FILE: &str = "schemas.meta";

/// One declared column: its name, type, optional `CHAR`/`VARCHAR` length,
/// and any constraint strings (stored verbatim, e.g. `"not null"`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub ty: SqlType,
    pub length: Option<u32>,
    pub constraints: Vec<String>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            length: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// A table's ordered column list plus a lower-cased name → column index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnMetadata>,
    name_to_ordinal: Map<String, usize>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        let mut name_to_ordinal = Map::default();
        for (idx, column) in columns.iter().enumerate() {
            name_to_ordinal.insert(column.name.to_lowercase(), idx);
        }
        Self {
            columns,
            name_to_ordinal,
        }
    }

    /// Looks up a column's ordinal by name, case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_ordinal.get(&name.to_lowercase()).copied()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.column_index(name).and_then(|i| self.columns.get(i))
    }
}

/// A registered table: its id, its display-case name, and its ordered data
/// page list (scan order).
#[derive(Clone, Debug)]
struct TableEntry {
    id: TableId,
    name: String,
    pages: Vec<PageId>,
}

/// Persistent name↔id↔pages registry plus per-table column schema.
pub struct Catalog {
    tables_path: PathBuf,
    schemas_path: PathBuf,
    next_table_id: i32,
    entries: Vec<TableEntry>,
    schemas: Map<String, TableSchema>,
    name_index: Map<String, usize>,
    id_index: Map<i32, usize>,
}

impl Catalog {
    /// Loads the catalog rooted at `dir`, creating an empty one if neither
    /// sidecar file exists yet.
    pub fn open(dir: impl AsRef<Path>) -> DbResult<Self> {
        let dir = dir.as_ref();
        let tables_path = dir.join(TABLES_FILE);
        let schemas_path = dir.join(SCHEMAS_FILE);

        let mut catalog = Self {
            tables_path,
            schemas_path,
            next_table_id: 1,
            entries: Vec::new(),
            schemas: Map::default(),
            name_index: Map::default(),
            id_index: Map::default(),
        };
        catalog.load()?;
        Ok(catalog)
    }

    fn load(&mut self) -> DbResult<()> {
        if let Ok(text) = fs::read_to_string(&self.tables_path) {
            let mut lines = text.lines();
            self.next_table_id = lines
                .next()
                .and_then(|l| l.trim().parse().ok())
                .unwrap_or(1);
            for line in lines {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let mut parts = line.split_whitespace();
                let id: i32 = parts.next().and_then(|t| t.parse().ok()).ok_or_else(|| {
                    DbError::InvariantViolation(format!("malformed tables line: {line:?}"))
                })?;
                let name = parts.next().ok_or_else(|| {
                    DbError::InvariantViolation(format!("malformed tables line: {line:?}"))
                })?;
                let pages = parts
                    .map(|tok| tok.parse::<u32>().map(PageId))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| {
                        DbError::InvariantViolation(format!("malformed page id in line: {line:?}"))
                    })?;
                self.entries.push(TableEntry {
                    id: TableId(id),
                    name: name.to_string(),
                    pages,
                });
            }
        }

        if let Ok(text) = fs::read_to_string(&self.schemas_path) {
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let mut parts = line.split_whitespace();
                let table_name = parts.next().ok_or_else(|| {
                    DbError::InvariantViolation(format!("malformed schemas line: {line:?}"))
                })?;
                let mut columns = Vec::new();
                for token in parts {
                    columns.push(parse_column(token)?);
                }
                self.schemas
                    .insert(table_name.to_lowercase(), TableSchema::new(columns));
            }
        }

        self.rebuild_indexes();
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        self.name_index.clear();
        self.id_index.clear();
        for (idx, entry) in self.entries.iter().enumerate() {
            self.name_index.insert(entry.name.to_lowercase(), idx);
            self.id_index.insert(entry.id.0, idx);
        }
    }

    fn persist(&self) -> DbResult<()> {
        let mut tables_text = format!("{}\n", self.next_table_id);
        for entry in &self.entries {
            tables_text.push_str(&entry.id.0.to_string());
            tables_text.push(' ');
            tables_text.push_str(&entry.name);
            for page in &entry.pages {
                tables_text.push(' ');
                tables_text.push_str(&page.0.to_string());
            }
            tables_text.push('\n');
        }
        fs::write(&self.tables_path, tables_text)?;

        let mut schemas_text = String::new();
        for entry in &self.entries {
            let Some(schema) = self.schemas.get(&entry.name.to_lowercase()) else {
                continue;
            };
            schemas_text.push_str(&entry.name);
            for column in &schema.columns {
                schemas_text.push(' ');
                schemas_text.push_str(&render_column(column));
            }
            schemas_text.push('\n');
        }
        fs::write(&self.schemas_path, schemas_text)?;
        Ok(())
    }

    /// Registers a new table with `columns`, failing if `name` already
    /// exists (case-insensitively).
    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnMetadata>) -> DbResult<TableId> {
        if self.name_index.contains_key(&name.to_lowercase()) {
            return Err(DbError::InvalidArgument(format!(
                "table '{name}' already exists"
            )));
        }
        let table_id = TableId(self.next_table_id);
        self.next_table_id += 1;
        self.entries.push(TableEntry {
            id: table_id,
            name: name.to_string(),
            pages: Vec::new(),
        });
        self.schemas
            .insert(name.to_lowercase(), TableSchema::new(columns));
        self.rebuild_indexes();
        self.persist()?;
        Ok(table_id)
    }

    /// Drops the table named `name`, handing its pages back to `disk`'s free
    /// list. Returns whether the table existed.
    pub fn drop_table_by_name(&mut self, name: &str, disk: &mut impl PageAllocator) -> DbResult<bool> {
        let Some(&idx) = self.name_index.get(&name.to_lowercase()) else {
            return Ok(false);
        };
        self.drop_entry(idx, disk)?;
        Ok(true)
    }

    /// Drops the table with the given id, handing its pages back to `disk`'s
    /// free list. Returns whether the table existed.
    pub fn drop_table_by_id(&mut self, id: TableId, disk: &mut impl PageAllocator) -> DbResult<bool> {
        let Some(&idx) = self.id_index.get(&id.0) else {
            return Ok(false);
        };
        self.drop_entry(idx, disk)?;
        Ok(true)
    }

    fn drop_entry(&mut self, idx: usize, disk: &mut impl PageAllocator) -> DbResult<()> {
        let entry = self.entries.remove(idx);
        for page in &entry.pages {
            disk.free_page(*page)?;
        }
        self.schemas.remove(&entry.name.to_lowercase());
        self.rebuild_indexes();
        self.persist()
    }

    /// Returns the table's id, or `-1` if `name` is not registered.
    pub fn get_table_id(&self, name: &str) -> i32 {
        self.name_index
            .get(&name.to_lowercase())
            .map(|&idx| self.entries[idx].id.0)
            .unwrap_or(-1)
    }

    /// Returns the table's name, or an empty string if `id` is not
    /// registered.
    pub fn get_table_name(&self, id: TableId) -> String {
        self.id_index
            .get(&id.0)
            .map(|&idx| self.entries[idx].name.clone())
            .unwrap_or_default()
    }

    /// Allocates a fresh data page for `table_id` via `disk`, appends it to
    /// the table's page list, and persists.
    pub fn allocate_table_page(&mut self, table_id: TableId, disk: &mut impl PageAllocator) -> DbResult<PageId> {
        let &idx = self
            .id_index
            .get(&table_id.0)
            .ok_or_else(|| DbError::NotFound(format!("unknown table id {}", table_id.0)))?;
        let page_id = disk.allocate_page()?;
        self.entries[idx].pages.push(page_id);
        self.persist()?;
        Ok(page_id)
    }

    /// Returns `table_id`'s data pages in scan order.
    pub fn get_table_pages(&self, table_id: TableId) -> DbResult<&[PageId]> {
        let &idx = self
            .id_index
            .get(&table_id.0)
            .ok_or_else(|| DbError::NotFound(format!("unknown table id {}", table_id.0)))?;
        Ok(&self.entries[idx].pages)
    }

    /// Returns `name`'s column schema, failing if the table is absent.
    pub fn get_table_schema(&self, name: &str) -> DbResult<&TableSchema> {
        self.schemas
            .get(&name.to_lowercase())
            .ok_or_else(|| DbError::NotFound(format!("unknown table '{name}'")))
    }
}

/// Renders one column as `name:TYPE[:c1,c2,...]`; the constraint segment is
/// omitted entirely when there are none. `length` is never persisted (spec
/// §4.3/§6 name no such segment; the original schema catalog's `save()`
/// doesn't write one either) — it is reconstructed as `None` on load.
fn render_column(column: &ColumnMetadata) -> String {
    if column.constraints.is_empty() {
        return format!("{}:{}", column.name, column.ty.as_str());
    }
    let constraints = column
        .constraints
        .iter()
        .map(|c| c.replace(' ', "_"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}:{}:{}", column.name, column.ty.as_str(), constraints)
}

/// Parses one `name:TYPE[:c1,c2,...]` column token.
fn parse_column(token: &str) -> DbResult<ColumnMetadata> {
    let mut parts = token.splitn(3, ':');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DbError::InvariantViolation(format!("malformed column token: {token:?}")))?
        .to_string();
    let ty = SqlType::parse(
        parts
            .next()
            .ok_or_else(|| DbError::InvariantViolation(format!("malformed column token: {token:?}")))?,
    );
    let constraints = match parts.next() {
        None | Some("") => Vec::new(),
        Some(cons) => cons.split(',').map(|c| c.replace('_', " ")).collect(),
    };
    Ok(ColumnMetadata {
        name,
        ty,
        length: None,
        constraints,
    })
}
