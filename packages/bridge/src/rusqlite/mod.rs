//! `SQLite` driver backend using `rusqlite`
//!
//! Implements the blocking [`DriverConnection`] contract over a synchronous
//! `rusqlite::Connection`, plus the value codec between `SQLite`'s native
//! column values and [`SqlValue`].
//!
//! # Codec
//!
//! `SQLite` natively stores NULL, INTEGER, REAL, TEXT and BLOB. Those five
//! kinds round-trip exactly; blobs byte-identical. Portable values without
//! a native kind are encoded on bind:
//!
//! - `Bool` → INTEGER `1`/`0`
//! - `DateTime` → TEXT, RFC 3339, normalized to UTC
//!
//! and therefore read back as `Int64`/`String`, matching how `SQLite`
//! itself reports them.
//!
//! # Transactions
//!
//! `SQLite` has no autocommit toggle of its own, so the connection drives
//! it with raw `BEGIN`/`COMMIT`/`ROLLBACK` statements. Disabling autocommit
//! opens a transaction; `commit`/`rollback` finalize it and immediately
//! open the next one so the session stays in explicit-transaction mode
//! until autocommit is re-enabled.
//!
//! # Generated keys
//!
//! `SQLite` has no generated-key result set. The connection reports
//! `last_insert_rowid()` as the single generated key when the statement's
//! leading keyword is `INSERT` and at least one row changed. For
//! single-row inserts this correlates 1:1 with the inserted row.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use chrono::SecondsFormat;
use rusqlite::{Connection, ffi::ErrorCode, types::Value};

use crate::{
    ResultSet, SqlValue, UpdateResult,
    driver::{ConnectionSource, DriverConnection, DriverError},
};

const BUSY_TIMEOUT: Duration = Duration::from_millis(10);

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Integer(value) => Self::Int64(value),
            Value::Real(value) => Self::Real64(value),
            Value::Text(value) => Self::String(value),
            Value::Blob(value) => Self::Bytes(value),
        }
    }
}

fn to_driver_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(value) => Value::Integer(i64::from(*value)),
        SqlValue::Int64(value) => Value::Integer(*value),
        SqlValue::Real64(value) => Value::Real(*value),
        SqlValue::String(value) => Value::Text(value.clone()),
        SqlValue::Bytes(value) => Value::Blob(value.clone()),
        SqlValue::DateTime(value) => {
            Value::Text(value.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
    }
}

fn is_fatal_code(error: &rusqlite::Error) -> bool {
    match error {
        rusqlite::Error::SqliteFailure(code, _) => matches!(
            code.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::DiskFull
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied
        ),
        _ => false,
    }
}

fn map_error(error: rusqlite::Error) -> DriverError {
    if is_fatal_code(&error) {
        DriverError::fatal_caused_by("connection is unusable", error)
    } else {
        DriverError::statement_caused_by("statement rejected", error)
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|word| word.eq_ignore_ascii_case("insert"))
}

/// One blocking `SQLite` connection.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct RusqliteConnection {
    connection: Connection,
    in_transaction: bool,
}

impl RusqliteConnection {
    #[must_use]
    pub const fn new(connection: Connection) -> Self {
        Self {
            connection,
            in_transaction: false,
        }
    }
}

impl DriverConnection for RusqliteConnection {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet, DriverError> {
        log::trace!("query: sql={sql} params={params:?}");

        let mut statement = self.connection.prepare(sql).map_err(map_error)?;

        let columns: Vec<String> = statement
            .column_names()
            .iter()
            .map(|&name| name.to_string())
            .collect();

        for (index, param) in params.iter().enumerate() {
            statement
                .raw_bind_parameter(index + 1, to_driver_value(param))
                .map_err(map_error)?;
        }

        let mut rows = statement.raw_query();
        let mut results = vec![];

        while let Some(row) = rows.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                values.push(row.get::<_, Value>(index).map_err(map_error)?.into());
            }
            results.push(values);
        }

        Ok(ResultSet::new(columns, results))
    }

    fn update(&mut self, sql: &str, params: &[SqlValue]) -> Result<UpdateResult, DriverError> {
        log::trace!("update: sql={sql} params={params:?}");

        let mut statement = self.connection.prepare(sql).map_err(map_error)?;

        for (index, param) in params.iter().enumerate() {
            statement
                .raw_bind_parameter(index + 1, to_driver_value(param))
                .map_err(map_error)?;
        }

        let updated = statement.raw_execute().map_err(map_error)? as u64;
        drop(statement);

        let keys = if updated > 0 && is_insert(sql) {
            vec![SqlValue::Int64(self.connection.last_insert_rowid())]
        } else {
            vec![]
        };

        Ok(UpdateResult { updated, keys })
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), DriverError> {
        if auto_commit {
            if self.in_transaction {
                self.connection.execute_batch("COMMIT").map_err(map_error)?;
                self.in_transaction = false;
            }
        } else if !self.in_transaction {
            self.connection.execute_batch("BEGIN").map_err(map_error)?;
            self.in_transaction = true;
        }

        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if !self.in_transaction {
            return Err(DriverError::statement("no transaction is open"));
        }

        self.connection.execute_batch("COMMIT").map_err(map_error)?;
        self.connection.execute_batch("BEGIN").map_err(map_error)?;

        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if !self.in_transaction {
            return Err(DriverError::statement("no transaction is open"));
        }

        self.connection
            .execute_batch("ROLLBACK")
            .map_err(map_error)?;
        self.connection.execute_batch("BEGIN").map_err(map_error)?;

        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.in_transaction {
            self.connection
                .execute_batch("ROLLBACK")
                .map_err(map_error)?;
            self.in_transaction = false;
        }

        Ok(())
    }
}

/// Non-pooled connection source opening one `SQLite` connection per
/// acquire.
///
/// Released connections are closed outright. For shared in-memory
/// databases the source holds a keeper connection open so the database
/// outlives individual handles.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct RusqliteSource {
    uri: String,
    closed: AtomicBool,
    keeper: std::sync::Mutex<Option<Connection>>,
}

impl RusqliteSource {
    /// Source backed by a database file.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        Self {
            uri: path.to_string_lossy().to_string(),
            closed: AtomicBool::new(false),
            keeper: std::sync::Mutex::new(None),
        }
    }

    /// Source backed by a named shared in-memory database.
    ///
    /// # Errors
    ///
    /// * If the in-memory database cannot be opened
    pub fn memory(name: &str) -> Result<Self, DriverError> {
        let uri = format!("file:{name}?mode=memory&cache=shared");
        let keeper = Connection::open(&uri)
            .map_err(|e| DriverError::fatal_caused_by("failed to open in-memory database", e))?;

        Ok(Self {
            uri,
            closed: AtomicBool::new(false),
            keeper: std::sync::Mutex::new(Some(keeper)),
        })
    }
}

impl ConnectionSource for RusqliteSource {
    fn acquire(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::fatal("source is closed"));
        }

        let connection = Connection::open(&self.uri)
            .map_err(|e| DriverError::fatal_caused_by("failed to open database", e))?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| DriverError::fatal_caused_by("failed to set busy timeout", e))?;

        log::debug!("acquire: opened connection to {}", self.uri);

        Ok(Box::new(RusqliteConnection::new(connection)))
    }

    fn release(&self, mut connection: Box<dyn DriverConnection>) {
        if let Err(error) = connection.close() {
            log::warn!("release: driver close failed: {error:?}");
        }
        drop(connection);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut keeper) = self.keeper.lock() {
            *keeper = None;
        }
    }
}
