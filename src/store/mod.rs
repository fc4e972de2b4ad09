//! Keyed-record repository consumed by the import engine.
//!
//! The engine only ever issues three request shapes against the store:
//! a batched lookup by key column, a bulk insert and a title search.
//! Everything else (schema, transactions, conflict handling) belongs to
//! the implementation.

use anyhow::Result;
use serde_json::{Map, Value};

mod sqlite;

pub use sqlite::{DB_SCHEMA_VERSION, SqliteStore};

pub type RecordId = i64;

/// Column name to value, as written to or read from a table.
pub type Record = Map<String, Value>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Table {
    Faculties,
    Departments,
    Courses,
    NavigationNodes,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Faculties,
        Table::Departments,
        Table::Courses,
        Table::NavigationNodes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faculties => "faculties",
            Self::Departments => "departments",
            Self::Courses => "courses",
            Self::NavigationNodes => "navigation_nodes",
        }
    }

    /// Every column except the generated `id`.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Faculties => &["code", "name", "created_at"],
            Self::Departments => &["code", "name", "faculty_id", "created_at"],
            Self::Courses => &[
                "code",
                "name",
                "slug",
                "department_id",
                "duration_months",
                "total_credits",
                "degree_level",
                "created_at",
            ],
            Self::NavigationNodes => &["title", "path", "parent_id", "position", "created_at"],
        }
    }

    /// Column carrying the unique natural key.
    pub fn natural_key(self) -> &'static str {
        match self {
            Self::Faculties | Self::Departments | Self::Courses => "code",
            Self::NavigationNodes => "path",
        }
    }

    pub fn has_column(self, column: &str) -> bool {
        column == "id" || self.columns().contains(&column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub fields: Record,
}

impl StoredRecord {
    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(Value::as_str)
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        self.fields.get(column).and_then(Value::as_i64)
    }
}

pub trait CatalogStore {
    /// Returns every record whose `key_column` value is one of `keys`.
    fn find_by_keys(
        &self,
        table: Table,
        key_column: &str,
        keys: &[Value],
    ) -> Result<Vec<StoredRecord>>;

    /// Inserts all records or none. Records whose natural key already
    /// exists are left untouched and are absent from the returned list.
    fn insert_many(&mut self, table: Table, records: &[Record]) -> Result<Vec<StoredRecord>>;

    /// First record (lowest id) whose title contains `pattern`, ignoring case.
    fn find_by_title_like(&self, table: Table, pattern: &str) -> Result<Option<StoredRecord>>;
}
