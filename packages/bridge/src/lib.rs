#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod action;
pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod driver;
#[cfg(feature = "sqlite-rusqlite")]
pub mod rusqlite;
#[cfg(feature = "simulator")]
pub mod simulator;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

pub use client::SqlClient;
pub use connection::ConnectionHandle;
pub use dispatcher::{Dispatcher, DispatcherConfig};
use driver::DriverError;

/// Portable scalar value exchanged at the API boundary.
///
/// Every parameter bound into a statement and every column value read back
/// out of one is represented as a `SqlValue`. Date/times are normalized to
/// UTC; binary data round-trips byte-exact.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int64(i64),
    Real64(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
}

impl SqlValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real64(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(val: Option<T>) -> Self {
        val.map_or(Self::Null, std::convert::Into::into)
    }
}

impl From<bool> for SqlValue {
    fn from(val: bool) -> Self {
        Self::Bool(val)
    }
}

impl From<&str> for SqlValue {
    fn from(val: &str) -> Self {
        Self::String(val.to_string())
    }
}

impl From<&String> for SqlValue {
    fn from(val: &String) -> Self {
        Self::String(val.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(val: String) -> Self {
        Self::String(val)
    }
}

impl From<f32> for SqlValue {
    fn from(val: f32) -> Self {
        Self::Real64(f64::from(val))
    }
}

impl From<f64> for SqlValue {
    fn from(val: f64) -> Self {
        Self::Real64(val)
    }
}

impl From<i8> for SqlValue {
    fn from(val: i8) -> Self {
        Self::Int64(i64::from(val))
    }
}

impl From<i16> for SqlValue {
    fn from(val: i16) -> Self {
        Self::Int64(i64::from(val))
    }
}

impl From<i32> for SqlValue {
    fn from(val: i32) -> Self {
        Self::Int64(i64::from(val))
    }
}

impl From<i64> for SqlValue {
    fn from(val: i64) -> Self {
        Self::Int64(val)
    }
}

impl From<u8> for SqlValue {
    fn from(val: u8) -> Self {
        Self::Int64(i64::from(val))
    }
}

impl From<u16> for SqlValue {
    fn from(val: u16) -> Self {
        Self::Int64(i64::from(val))
    }
}

impl From<u32> for SqlValue {
    fn from(val: u32) -> Self {
        Self::Int64(i64::from(val))
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(val: Vec<u8>) -> Self {
        Self::Bytes(val)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(val: &[u8]) -> Self {
        Self::Bytes(val.to_vec())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(val: DateTime<Utc>) -> Self {
        Self::DateTime(val)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(val: NaiveDateTime) -> Self {
        Self::DateTime(val.and_utc())
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int64(value) => serializer.serialize_i64(*value),
            Self::Real64(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value),
            Self::Bytes(value) => serializer.serialize_str(&BASE64.encode(value)),
            Self::DateTime(value) => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum TryFromError {
    #[error("Could not convert to type '{0}'")]
    CouldNotConvert(String),
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl TryFrom<SqlValue> for i64 {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::Int64(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("i64".into())),
        }
    }
}

impl TryFrom<SqlValue> for i32 {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::Int64(value) => Ok(Self::try_from(value)?),
            _ => Err(TryFromError::CouldNotConvert("i32".into())),
        }
    }
}

impl TryFrom<SqlValue> for u64 {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::Int64(value) => Ok(Self::try_from(value)?),
            _ => Err(TryFromError::CouldNotConvert("u64".into())),
        }
    }
}

impl TryFrom<SqlValue> for String {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::String(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("String".into())),
        }
    }
}

impl TryFrom<SqlValue> for bool {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::Bool(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("bool".into())),
        }
    }
}

impl TryFrom<SqlValue> for f64 {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::Real64(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("f64".into())),
        }
    }
}

impl TryFrom<SqlValue> for Vec<u8> {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::Bytes(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("Vec<u8>".into())),
        }
    }
}

impl TryFrom<SqlValue> for DateTime<Utc> {
    type Error = TryFromError;

    fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::DateTime(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("DateTime<Utc>".into())),
        }
    }
}

/// Keyed view of a single result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub columns: Vec<(String, SqlValue)>,
}

impl Row {
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<SqlValue> {
        self.columns
            .iter()
            .find(|c| c.0 == column_name)
            .map(|c| c.1.clone())
    }
}

/// Ordered result of a read statement.
///
/// Column names are preserved verbatim as returned by the driver, including
/// aliased labels. Every row has exactly as many values as there are
/// columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    /// # Panics
    ///
    /// * If any row's width differs from the column count
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        for row in &rows {
            assert_eq!(
                row.len(),
                columns.len(),
                "ResultSet row width must match column count"
            );
        }
        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keyed view of the row at `index`, pairing each value with its column
    /// name.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<Row> {
        self.rows.get(index).map(|values| Row {
            columns: self
                .columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
        })
    }
}

/// Result of a write statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UpdateResult {
    /// Number of rows the statement changed
    pub updated: u64,
    /// Identity values generated by the statement, empty when it generated
    /// none
    pub keys: Vec<SqlValue>,
}

#[derive(Debug, Error)]
pub enum SqlError {
    /// Could not obtain a connection from the source
    #[error("Failed to acquire a connection")]
    AcquisitionFailed(#[source] DriverError),
    /// The driver rejected the statement
    #[error("Statement rejected")]
    Statement(#[source] DriverError),
    /// The connection was closed before the operation was issued
    #[error("Connection is closed")]
    ConnectionClosed,
    /// Commit or rollback was issued while autocommit is enabled
    #[error("Not in a transaction")]
    NotInTransaction,
    /// A value could not be represented by the driver
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    /// The dispatcher queue is full
    #[error("Overloaded")]
    Overloaded,
    /// The underlying connection failed and is no longer usable
    #[error("Driver failure")]
    Driver(#[source] DriverError),
}

impl From<DriverError> for SqlError {
    fn from(value: DriverError) -> Self {
        match value {
            DriverError::Statement { .. } => Self::Statement(value),
            DriverError::Unsupported(type_name) => Self::UnsupportedType(type_name),
            DriverError::Fatal { .. } => Self::Driver(value),
        }
    }
}

/// The shared asynchronous operation surface.
///
/// Implemented by [`ConnectionHandle`] for operations on one exclusively
/// owned connection, and by [`SqlClient`] for one-shot operations that
/// acquire a connection, run the statement, and release the connection
/// again regardless of outcome.
#[async_trait]
pub trait SqlOperations: Send + Sync {
    /// Execute a read statement and collect the full result set.
    async fn query(&self, sql: &str) -> Result<ResultSet, SqlError>;

    /// Execute a read statement with positional parameters.
    async fn query_with_params(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlError>;

    /// Execute a write statement.
    async fn update(&self, sql: &str) -> Result<UpdateResult, SqlError>;

    /// Execute a write statement with positional parameters.
    async fn update_with_params(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<UpdateResult, SqlError>;
}
