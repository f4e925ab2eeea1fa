
pub mod trace;

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;
use types::Value;

/// Logical identifier for a page in the storage layer. Pages are 32-bit.
/// Examples:
/// - `let freelist_page = PageId(0);`
/// - `let user_data_page = PageId(42);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

/// Logical identifier for a table registered in the catalog. Signed so
/// `Catalog::get_table_id` can use `-1` as its "absent" sentinel.
/// Examples:
/// - `let users = TableId(7);`
/// - `let absent = TableId(-1);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub i32);

/// Fully-qualified identifier for a record within a page. Stable for the
/// lifetime of the record.
/// Examples:
/// - `let rid = RecordId { page_id: PageId(42), slot_id: 3 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: u16,
}

/// Positional row representation backed by `types::Value`. The storage
/// engine never parses this — it is a convenience for callers and tests to
/// build realistic record bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Joins a row's values with `|`, a plain external row convention for
/// whatever execution layer sits above this storage engine. The storage
/// engine treats the result as opaque bytes; this exists purely so tests can
/// build/verify realistic records.
pub fn encode_row_pipe(values: &[Value]) -> Vec<u8> {
    values
        .iter()
        .map(format_value)
        .collect::<Vec<_>>()
        .join("|")
        .into_bytes()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(text) => text.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Timestamp(ts) => ts.to_string(),
        Value::Null => "NULL".into(),
    }
}

/// Canonical error type shared across the storage core. There is no
/// `LogicalMiss` variant: callers report a missing row, page, or key as a
/// `bool`/`Option`, never as an error (see storage/buffer/catalog/btree
/// APIs).
#[derive(Error, Debug)]
pub enum DbError {
    /// Bad argument shape: oversized record, wrong buffer length, duplicate
    /// name on create, unknown table on allocate.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Unknown table id/name, or a page id beyond the current file size.
    #[error("not found: {0}")]
    NotFound(String),
    /// A program invariant was violated: double-unpin, all-frames-pinned on
    /// a miss, malformed meta file.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// Short read/write or failed file create/open.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Pluggable frame-replacement strategy for the buffer manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementPolicyKind {
    #[default]
    Lru,
    Fifo,
}

/// Runtime configuration for the storage engine.
///
/// # Example
/// ```
/// use common::{Config, ReplacementPolicyKind};
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .buffer_pool_pages(64)
///     .replacement_policy(ReplacementPolicyKind::Fifo)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where the heap file and catalog/meta sidecars live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Frame-replacement policy the buffer pool enforces.
    #[builder(default)]
    pub replacement_policy: ReplacementPolicyKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            buffer_pool_pages: 256,
            replacement_policy: ReplacementPolicyKind::default(),
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, PageId, RecordId, ReplacementPolicyKind, Row, TableId};
    pub use types::{SqlType, Value};
}
