use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use serde_json::{Number, Value};

use super::{CatalogStore, Record, StoredRecord, Table};
use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

// Stays well below SQLITE_MAX_VARIABLE_NUMBER on older builds.
const KEY_LOOKUP_BATCH: usize = 500;

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        connection
            .pragma_update(None, "foreign_keys", "ON")
            .context("failed to set foreign_keys=ON")?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn count_rows(&self, table: Table) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        let count = self
            .connection
            .query_row(&sql, [], |row| row.get(0))
            .with_context(|| format!("failed to count rows in {}", table.as_str()))?;
        Ok(count)
    }

    pub fn metadata_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .connection
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to read metadata key {key}"))?;
        Ok(value)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to set foreign_keys=ON")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS faculties (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              code TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS departments (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              code TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              faculty_id INTEGER NOT NULL,
              created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
              FOREIGN KEY(faculty_id) REFERENCES faculties(id)
            );

            CREATE TABLE IF NOT EXISTS courses (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              code TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              slug TEXT NOT NULL,
              department_id INTEGER NOT NULL,
              duration_months INTEGER NOT NULL,
              total_credits INTEGER NOT NULL,
              degree_level TEXT NOT NULL,
              created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
              FOREIGN KEY(department_id) REFERENCES departments(id)
            );

            CREATE TABLE IF NOT EXISTS navigation_nodes (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              title TEXT NOT NULL,
              path TEXT NOT NULL UNIQUE,
              parent_id INTEGER,
              position INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
              FOREIGN KEY(parent_id) REFERENCES navigation_nodes(id)
            );

            CREATE INDEX IF NOT EXISTS idx_departments_faculty ON departments(faculty_id);
            CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department_id);
            CREATE INDEX IF NOT EXISTS idx_navigation_parent ON navigation_nodes(parent_id);
            ",
        )
        .context("failed to initialize catalog schema")?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

impl CatalogStore for SqliteStore {
    fn find_by_keys(
        &self,
        table: Table,
        key_column: &str,
        keys: &[Value],
    ) -> Result<Vec<StoredRecord>> {
        if !table.has_column(key_column) {
            bail!("unknown column {key_column} on {}", table.as_str());
        }

        let mut found = Vec::new();
        for batch in keys.chunks(KEY_LOOKUP_BATCH) {
            let placeholders = (1..=batch.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {} FROM {} WHERE {key_column} IN ({placeholders}) ORDER BY id",
                select_list(table),
                table.as_str()
            );

            let mut statement = self
                .connection
                .prepare(&sql)
                .with_context(|| format!("failed to prepare lookup on {}", table.as_str()))?;
            let mut rows = statement.query(params_from_iter(batch.iter().map(to_sql_value)))?;
            while let Some(row) = rows.next()? {
                found.push(read_record(table, row)?);
            }
        }

        Ok(found)
    }

    fn insert_many(&mut self, table: Table, records: &[Record]) -> Result<Vec<StoredRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self.connection.transaction()?;
        let mut inserted = Vec::with_capacity(records.len());

        for record in records {
            let mut columns = Vec::with_capacity(record.len());
            let mut values = Vec::with_capacity(record.len());
            for (column, value) in record {
                if column == "id" || !table.has_column(column) {
                    bail!("column {column} is not writable on {}", table.as_str());
                }
                columns.push(column.as_str());
                values.push(to_sql_value(value));
            }

            let placeholders = (1..=columns.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {table_name}({column_list}) VALUES({placeholders})
                 ON CONFLICT({natural_key}) DO NOTHING
                 RETURNING {select}",
                table_name = table.as_str(),
                column_list = columns.join(", "),
                natural_key = table.natural_key(),
                select = select_list(table),
            );

            let mut statement = tx
                .prepare_cached(&sql)
                .with_context(|| format!("failed to prepare insert on {}", table.as_str()))?;
            let mut rows = statement
                .query(params_from_iter(values))
                .with_context(|| format!("insert into {} failed", table.as_str()))?;
            while let Some(row) = rows
                .next()
                .with_context(|| format!("insert into {} failed", table.as_str()))?
            {
                inserted.push(read_record(table, row)?);
            }
        }

        tx.commit()
            .with_context(|| format!("failed to commit insert on {}", table.as_str()))?;
        Ok(inserted)
    }

    fn find_by_title_like(&self, table: Table, pattern: &str) -> Result<Option<StoredRecord>> {
        if !table.has_column("title") {
            bail!("{} has no title column", table.as_str());
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE instr(lower(title), lower(?1)) > 0 ORDER BY id LIMIT 1",
            select_list(table),
            table.as_str()
        );
        let record = self
            .connection
            .query_row(&sql, [pattern], |row| Ok(read_record(table, row)))
            .optional()
            .with_context(|| format!("title search on {} failed", table.as_str()))?
            .transpose()?;

        Ok(record)
    }
}

fn select_list(table: Table) -> String {
    let mut columns = vec!["id"];
    columns.extend_from_slice(table.columns());
    columns.join(", ")
}

fn read_record(table: Table, row: &Row<'_>) -> Result<StoredRecord> {
    let id: i64 = row.get(0)?;
    let mut fields = Record::new();
    for (offset, column) in table.columns().iter().enumerate() {
        let value: SqlValue = row.get(offset + 1)?;
        fields.insert((*column).to_string(), from_sql_value(value));
    }
    Ok(StoredRecord { id, fields })
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => Value::Null,
        SqlValue::Integer(integer) => Value::from(integer),
        SqlValue::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn faculty(code: &str, name: &str) -> Record {
        let mut record = Record::new();
        record.insert("code".to_string(), json!(code));
        record.insert("name".to_string(), json!(name));
        record
    }

    #[test]
    fn insert_many_skips_existing_natural_keys() {
        let mut store = SqliteStore::open_in_memory().expect("store should open");

        let first = store
            .insert_many(Table::Faculties, &[faculty("SCI", "Science")])
            .expect("first insert should succeed");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].text("code"), Some("SCI"));

        let second = store
            .insert_many(
                Table::Faculties,
                &[faculty("SCI", "Renamed"), faculty("ART", "Arts")],
            )
            .expect("conflicting insert should not fail");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].text("code"), Some("ART"));

        let existing = store
            .find_by_keys(Table::Faculties, "code", &[json!("SCI")])
            .expect("lookup should succeed");
        assert_eq!(existing[0].text("name"), Some("Science"));
        assert_eq!(store.count_rows(Table::Faculties).unwrap(), 2);
    }

    #[test]
    fn insert_many_rolls_back_whole_batch_on_error() {
        let mut store = SqliteStore::open_in_memory().expect("store should open");

        let mut orphan = Record::new();
        orphan.insert("code".to_string(), json!("D1"));
        orphan.insert("name".to_string(), json!("Physics"));
        orphan.insert("faculty_id".to_string(), json!(999));

        let mut nameless = faculty("SCI", "Science");
        nameless.remove("name");

        let err = store
            .insert_many(Table::Departments, &[orphan])
            .expect_err("foreign key violation should fail");
        assert!(format!("{err:#}").contains("departments"));
        assert_eq!(store.count_rows(Table::Departments).unwrap(), 0);

        assert!(store.insert_many(Table::Faculties, &[nameless]).is_err());
        assert_eq!(store.count_rows(Table::Faculties).unwrap(), 0);
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let mut store = SqliteStore::open_in_memory().expect("store should open");
        let mut record = faculty("SCI", "Science");
        record.insert("dean".to_string(), json!("Ada"));

        assert!(store.insert_many(Table::Faculties, &[record]).is_err());
        assert!(store
            .find_by_keys(Table::Faculties, "code; DROP TABLE faculties", &[json!("x")])
            .is_err());
    }

    #[test]
    fn find_by_keys_batches_large_key_sets() {
        let mut store = SqliteStore::open_in_memory().expect("store should open");
        let records = (0..1200)
            .map(|index| faculty(&format!("F{index}"), "Faculty"))
            .collect::<Vec<_>>();
        store
            .insert_many(Table::Faculties, &records)
            .expect("bulk insert should succeed");

        let keys = (0..1300)
            .map(|index| json!(format!("F{index}")))
            .collect::<Vec<_>>();
        let found = store
            .find_by_keys(Table::Faculties, "code", &keys)
            .expect("lookup should succeed");
        assert_eq!(found.len(), 1200);
    }

    #[test]
    fn find_by_title_like_matches_case_insensitive_substring() {
        let mut store = SqliteStore::open_in_memory().expect("store should open");
        let mut home = Record::new();
        home.insert("title".to_string(), json!("Home"));
        home.insert("path".to_string(), json!("/"));
        let mut anchor = Record::new();
        anchor.insert("title".to_string(), json!("Academic Programs"));
        anchor.insert("path".to_string(), json!("/academics"));
        store
            .insert_many(Table::NavigationNodes, &[home, anchor])
            .expect("insert should succeed");

        let found = store
            .find_by_title_like(Table::NavigationNodes, "ACADEMIC")
            .expect("search should succeed")
            .expect("anchor should be found");
        assert_eq!(found.text("path"), Some("/academics"));

        let missing = store
            .find_by_title_like(Table::NavigationNodes, "admissions")
            .expect("search should succeed");
        assert!(missing.is_none());

        assert!(store.find_by_title_like(Table::Courses, "x").is_err());
    }

    #[test]
    fn schema_version_is_recorded() {
        let store = SqliteStore::open_in_memory().expect("store should open");
        assert_eq!(
            store.metadata_value("db_schema_version").unwrap().as_deref(),
            Some(DB_SCHEMA_VERSION)
        );
    }
}
