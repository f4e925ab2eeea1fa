//! Storage facade: the single entry point SQL compilation, execution, and
//! protocol layers would call through. Wires the Disk/Buffer Manager, Table
//! Catalog, Record Manager, and secondary indexes together behind one owned
//! value per directory.

mod indexes;


pub use indexes::IndexKeyValue;

use buffer::{BufferManager, BufferStats};
use catalog::{Catalog, ColumnMetadata, TableSchema};
use common::{trace::Tracer, Config, DbError, DbResult, PageId, RecordId, TableId};
use indexes::IndexRegistry;
use storage::record::RecordManager;
use storage::Page;

const HEAP_FILE: &str = "data.db";

/// Owns every subcomponent rooted at one `data_dir`: the buffer pool (and,
/// through it, the disk manager), the table catalog, and the secondary
/// index registry. Not `Clone`/`Sync`: one `Database` per directory, used
/// from one thread at a time.
pub struct Database {
    buffer: BufferManager,
    catalog: Catalog,
    indexes: IndexRegistry,
    tracer: Tracer,
}

impl Database {
    /// Opens (creating if absent) the storage engine rooted at
    /// `config.data_dir`.
    pub fn open(config: &Config) -> DbResult<Self> {
        Self::open_with_tracer(config, Tracer::disabled())
    }

    pub fn open_with_tracer(config: &Config, tracer: Tracer) -> DbResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let heap_path = config.data_dir.join(HEAP_FILE);
        let buffer = BufferManager::with_tracer(
            storage::DiskManager::open(heap_path)?,
            config.buffer_pool_pages,
            config.replacement_policy,
            tracer,
        );
        let catalog = Catalog::open(&config.data_dir)?;
        let indexes = IndexRegistry::open(&config.data_dir)?;
        Ok(Self {
            buffer,
            catalog,
            indexes,
            tracer,
        })
    }

    // ---- Page ops --------------------------------------------------------

    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        self.buffer.allocate_page()
    }

    pub fn free_page(&mut self, page_id: PageId) -> DbResult<()> {
        self.buffer.free_page(page_id)
    }

    pub fn get_page(&mut self, page_id: PageId) -> DbResult<&mut Page> {
        self.buffer.get_page(page_id)
    }

    pub fn unpin_page(&mut self, page_id: PageId, dirty: bool) -> DbResult<()> {
        self.buffer.unpin_page(page_id, dirty)
    }

    pub fn flush_page(&mut self, page_id: PageId) -> DbResult<()> {
        self.buffer.flush_page(page_id)
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        self.buffer.flush_all()
    }

    pub fn stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    // ---- Table ops -------------------------------------------------------

    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnMetadata>) -> DbResult<TableId> {
        self.catalog.create_table(name, columns)
    }

    pub fn drop_table_by_id(&mut self, id: TableId) -> DbResult<bool> {
        self.catalog.drop_table_by_id(id, &mut self.buffer)
    }

    pub fn drop_table_by_name(&mut self, name: &str) -> DbResult<bool> {
        self.catalog.drop_table_by_name(name, &mut self.buffer)
    }

    pub fn get_table_id(&self, name: &str) -> i32 {
        self.catalog.get_table_id(name)
    }

    pub fn get_table_name(&self, id: TableId) -> String {
        self.catalog.get_table_name(id)
    }

    pub fn allocate_table_page(&mut self, table_id: TableId) -> DbResult<PageId> {
        self.catalog.allocate_table_page(table_id, &mut self.buffer)
    }

    pub fn get_table_pages(&self, table_id: TableId) -> DbResult<&[PageId]> {
        self.catalog.get_table_pages(table_id)
    }

    pub fn get_table_schema(&self, name: &str) -> DbResult<&TableSchema> {
        self.catalog.get_table_schema(name)
    }

    // ---- Record ops ------------------------------------------------------

    /// Inserts `bytes` into the first table page with room, or a freshly
    /// allocated one. Split into a lookup pass and an allocate-and-insert
    /// pass (rather than one call threading an allocation closure through
    /// the buffer pool) because both the lookup and the allocation borrow
    /// `self.buffer` mutably — they cannot be expressed as two arguments to
    /// the same call without aliasing it.
    pub fn insert_record(&mut self, table_id: TableId, bytes: &[u8]) -> DbResult<RecordId> {
        let pages = self.catalog.get_table_pages(table_id)?.to_vec();
        if let Some(rid) = RecordManager::try_insert_existing(&mut self.buffer, &pages, bytes)? {
            return Ok(rid);
        }
        let page_id = self.catalog.allocate_table_page(table_id, &mut self.buffer)?;
        RecordManager::insert_into_page(&mut self.buffer, page_id, bytes)
    }

    pub fn read_record(&mut self, rid: RecordId) -> DbResult<Option<Vec<u8>>> {
        RecordManager::read(&mut self.buffer, rid)
    }

    pub fn update_record(&mut self, rid: RecordId, bytes: &[u8]) -> DbResult<bool> {
        RecordManager::update(&mut self.buffer, rid, bytes)
    }

    pub fn delete_record(&mut self, rid: RecordId) -> DbResult<bool> {
        RecordManager::erase(&mut self.buffer, rid)
    }

    pub fn scan_table(&mut self, table_id: TableId) -> DbResult<Vec<(RecordId, Vec<u8>)>> {
        let pages = self.catalog.get_table_pages(table_id)?.to_vec();
        RecordManager::scan(&mut self.buffer, &pages)
    }

    // ---- Index ops -------------------------------------------------------

    /// Registers a secondary index named `name` over `table`'s `column`,
    /// picking the B+Tree key type from the column's declared `SqlType`.
    /// Index maintenance on subsequent DML is the caller's responsibility
    /// by design — use [`Self::index_insert`] alongside
    /// [`Self::insert_record`].
    pub fn create_index(&mut self, name: &str, table: &str, column: &str, unique: bool) -> DbResult<()> {
        let schema = self.catalog.get_table_schema(table)?;
        let column_type = schema
            .column(column)
            .ok_or_else(|| DbError::NotFound(format!("unknown column '{column}' on table '{table}'")))?
            .ty;
        self.indexes
            .create_index(&mut self.buffer, name, table, column, column_type, unique, self.tracer)
    }

    pub fn index_insert(&mut self, name: &str, key: IndexKeyValue, rid: RecordId) -> DbResult<bool> {
        self.indexes.insert(&mut self.buffer, name, key, rid)
    }

    pub fn index_search(&mut self, name: &str, key: IndexKeyValue) -> DbResult<Option<RecordId>> {
        self.indexes.search(&mut self.buffer, name, key)
    }

    pub fn index_range(
        &mut self,
        name: &str,
        low: IndexKeyValue,
        high: IndexKeyValue,
    ) -> DbResult<Vec<(IndexKeyValue, RecordId)>> {
        self.indexes.range(&mut self.buffer, name, low, high)
    }

    pub fn index_is_unique(&self, name: &str) -> DbResult<bool> {
        self.indexes.is_unique(name)
    }
}
