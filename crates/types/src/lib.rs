use std::cmp::Ordering;

/// Declared column type, matching the vocabulary the table catalog persists
/// per column (`ColumnMetadata.ty` in the schema file).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int,
    Double,
    Varchar,
    Char,
    Boolean,
    Timestamp,
    Unknown,
}

impl SqlType {
    /// Parses the short name used in the `schemas.meta` persistence format
    /// (`col_name:TYPE[:c1,c2,...]`).
    pub fn parse(name: &str) -> Self {
        match name {
            "INT" => SqlType::Int,
            "DOUBLE" => SqlType::Double,
            "VARCHAR" => SqlType::Varchar,
            "CHAR" => SqlType::Char,
            "BOOLEAN" => SqlType::Boolean,
            "TIMESTAMP" => SqlType::Timestamp,
            _ => SqlType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Int => "INT",
            SqlType::Double => "DOUBLE",
            SqlType::Varchar => "VARCHAR",
            SqlType::Char => "CHAR",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Unknown => "UNKNOWN",
        }
    }
}

/// A column value. The storage engine never interprets these — it moves
/// opaque bytes — but the catalog uses `Value`/`SqlType` to describe schemas,
/// and tests build realistic row bytes with them.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Double(f64),
    Text(String),
    Bool(bool),
    Timestamp(i64),
    Null,
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        self.cmp_same_type(other).map(|o| o == Ordering::Equal)
    }
}
