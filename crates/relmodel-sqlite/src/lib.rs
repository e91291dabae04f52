//! SQLite driver for relmodel.
//!
//! [`SqliteConnection`] implements [`relmodel_core::Connection`] over
//! `rusqlite`. Every opened connection has `foreign_keys=ON` and a busy
//! timeout, so concurrent writers wait on each other instead of failing
//! immediately.
//!
//! Storage conventions:
//! - booleans are stored as integers `0`/`1`;
//! - timestamps are stored as UTC text in
//!   [`TIMESTAMP_FORMAT`](relmodel_core::value::TIMESTAMP_FORMAT), which sorts
//!   chronologically;
//! - list values must have been expanded by the statement builder.

use std::path::Path;
use std::time::{Duration, Instant};

use relmodel_core::value::TIMESTAMP_FORMAT;
use relmodel_core::{ConstraintKind, Error, Result, Row, Value};
use rusqlite::ffi;
use rusqlite::types::{Value as SqlValue, ValueRef};

/// Busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A SQLite connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteConnection {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let started = Instant::now();
        let path_str = path.as_ref().display().to_string();
        let conn = rusqlite::Connection::open(path.as_ref()).map_err(|e| {
            tracing::error!(path = %path_str, error = %e, "Failed to open SQLite database");
            Error::Connection(format!("open {}: {}", path_str, e))
        })?;
        let this = Self::bootstrap(conn, path_str)?;
        tracing::debug!(
            path = %this.path,
            duration_ms = started.elapsed().as_millis() as u64,
            "Opened SQLite database"
        );
        Ok(this)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| Error::Connection(format!("open in-memory database: {}", e)))?;
        Self::bootstrap(conn, ":memory:".to_string())
    }

    fn bootstrap(conn: rusqlite::Connection, path: String) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| Error::Connection(format!("configure {}: {}", path, e)))?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .map_err(|e| Error::Connection(format!("configure {}: {}", path, e)))?;
        Ok(Self { conn, path })
    }

    /// Database path (`:memory:` for in-memory databases).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The underlying `rusqlite` connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn bind(params: &[Value]) -> Result<Vec<SqlValue>> {
        params.iter().map(to_sql_value).collect()
    }
}

impl relmodel_core::Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let bound = Self::bind(params)?;
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_error)?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound.iter()))
            .map_err(map_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_value_ref(row.get_ref(i).map_err(map_error)?)?);
            }
            out.push(Row::from_parts(columns.clone(), values));
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let bound = Self::bind(params)?;
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_error)?;
        let affected = stmt
            .execute(rusqlite::params_from_iter(bound.iter()))
            .map_err(map_error)?;
        Ok(affected as u64)
    }

    fn insert(&mut self, sql: &str, params: &[Value]) -> Result<(u64, Option<i64>)> {
        let affected = self.execute(sql, params)?;
        let id = (affected > 0).then(|| self.conn.last_insert_rowid());
        Ok((affected, id))
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(map_error)
    }

    fn ping(&mut self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(map_error)
    }
}

fn to_sql_value(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::BigInt(i) => SqlValue::Integer(*i),
        Value::Double(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Timestamp(ts) => SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        Value::List(_) => {
            return Err(Error::Query(
                "list parameter was not expanded before binding".to_string(),
            ));
        }
    })
}

fn from_value_ref(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::BigInt(i),
        ValueRef::Real(f) => Value::Double(f),
        ValueRef::Text(t) => Value::Text(
            std::str::from_utf8(t)
                .map_err(|e| Error::mapping(format!("invalid UTF-8 in text value: {}", e)))?
                .to_string(),
        ),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}

/// Translate a `rusqlite` error into the relmodel error taxonomy.
pub fn map_error(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let message = message.clone().unwrap_or_else(|| failure.to_string());
            match failure.code {
                rusqlite::ErrorCode::ConstraintViolation => Error::ConstraintViolation {
                    kind: constraint_kind(failure.extended_code),
                    message,
                },
                rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::NotADatabase
                | rusqlite::ErrorCode::PermissionDenied
                | rusqlite::ErrorCode::SystemIoFailure => Error::Connection(message),
                _ => Error::Query(message),
            }
        }
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => Error::Mapping(err.to_string()),
        _ => Error::Query(err.to_string()),
    }
}

fn constraint_kind(extended_code: i32) -> ConstraintKind {
    match extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::Unique,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
        ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
        ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
        _ => ConstraintKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use relmodel_core::{Connection, params};

    fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                active INTEGER NOT NULL DEFAULT 0,
                score REAL,
                avatar BLOB,
                created_at TEXT,
                CHECK (score IS NULL OR score >= 0)
            );
            CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id)
            );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_insert_returns_rowid_and_round_trips_types() {
        let mut conn = conn();
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let (affected, id) = conn
            .insert(
                "INSERT INTO users (email, active, score, avatar, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                &params!["a@example.com", true, 1.5_f64, vec![1_u8, 2], ts],
            )
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(id, Some(1));

        let rows = conn
            .query("SELECT * FROM users WHERE id = ?1", &params![1_i64])
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get_named::<bool>("active").unwrap(), true);
        assert_eq!(row.get_named::<f64>("score").unwrap(), 1.5);
        assert_eq!(row.get_named::<Vec<u8>>("avatar").unwrap(), vec![1, 2]);
        assert_eq!(
            row.get_named::<chrono::DateTime<Utc>>("created_at").unwrap(),
            ts
        );
    }

    #[test]
    fn test_constraint_errors_are_classified() {
        let mut conn = conn();
        conn.execute("INSERT INTO users (email) VALUES (?1)", &params!["x"])
            .unwrap();

        let dup = conn
            .execute("INSERT INTO users (email) VALUES (?1)", &params!["x"])
            .unwrap_err();
        assert!(dup.is_unique_violation());

        let pk = conn
            .execute("INSERT INTO users (id, email) VALUES (1, 'y')", &[])
            .unwrap_err();
        assert!(pk.is_unique_violation());

        let fk = conn
            .execute("INSERT INTO posts (id, user_id) VALUES (1, 99)", &[])
            .unwrap_err();
        assert!(matches!(
            fk,
            Error::ConstraintViolation {
                kind: ConstraintKind::ForeignKey,
                ..
            }
        ));

        let not_null = conn
            .execute("INSERT INTO users (email) VALUES (NULL)", &[])
            .unwrap_err();
        assert!(matches!(
            not_null,
            Error::ConstraintViolation {
                kind: ConstraintKind::NotNull,
                ..
            }
        ));

        let check = conn
            .execute("INSERT INTO users (email, score) VALUES ('z', -1)", &[])
            .unwrap_err();
        assert!(matches!(
            check,
            Error::ConstraintViolation {
                kind: ConstraintKind::Check,
                ..
            }
        ));
    }

    #[test]
    fn test_unexpanded_list_is_rejected() {
        let mut conn = conn();
        let err = conn
            .query(
                "SELECT * FROM users WHERE id IN (?1)",
                &[Value::list([1_i64, 2])],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_syntax_error_is_query_error() {
        let mut conn = conn();
        let err = conn.query("SELEC nope", &[]).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
        assert!(conn.ping().is_ok());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            let mut conn = SqliteConnection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
            conn.execute("INSERT INTO t VALUES (?1)", &params!["kept"])
                .unwrap();
        }
        let mut conn = SqliteConnection::open(&path).unwrap();
        let rows = conn.query("SELECT v FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_named::<String>("v").unwrap(), "kept");
    }

    #[test]
    fn test_open_failure_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteConnection::open(dir.path().join("missing").join("app.db")).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
