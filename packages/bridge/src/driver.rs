//! Contracts for the blocking driver layer.
//!
//! The facade never talks to a database directly. It consumes two
//! interfaces: [`DriverConnection`], one blocking connection executing SQL,
//! and [`ConnectionSource`], the pool or factory connections are acquired
//! from. Every method on these traits blocks the calling thread, which is
//! why the facade only ever invokes them from dispatcher workers.

use thiserror::Error;

use crate::{ResultSet, SqlValue, UpdateResult};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a driver, classified by how the facade must react.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver rejected the statement (syntax, constraint violation,
    /// type mismatch). The connection remains usable.
    #[error("Statement rejected: {message}")]
    Statement {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },
    /// The driver cannot represent the value
    #[error("Unsupported type: {0}")]
    Unsupported(String),
    /// The connection is unusable. The facade discards it and fails every
    /// later operation on the same handle.
    #[error("Driver failure: {message}")]
    Fatal {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },
}

impl DriverError {
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            cause: None,
        }
    }

    pub fn statement_caused_by(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Statement {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::Unsupported(type_name.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            cause: None,
        }
    }

    pub fn fatal_caused_by(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Fatal {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// One blocking driver connection.
///
/// Implementations are not required to be thread-safe. The facade owns each
/// connection exclusively and guarantees at most one call is in flight at
/// any instant.
pub trait DriverConnection: Send + std::fmt::Debug {
    /// Execute a read statement, binding `params` positionally.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet, DriverError>;

    /// Execute a write statement, binding `params` positionally.
    fn update(&mut self, sql: &str, params: &[SqlValue]) -> Result<UpdateResult, DriverError>;

    /// Toggle autocommit. Turning it back on while a transaction is open
    /// commits that transaction.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), DriverError>;

    /// Finalize the current transaction scope.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Discard the current transaction scope.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Flush connection state ahead of release. The connection is freed by
    /// dropping it.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Where connections come from and go back to.
pub trait ConnectionSource: Send + Sync + std::fmt::Debug {
    /// Acquire a connection. May block and may fail (exhausted pool,
    /// network failure, auth failure).
    fn acquire(&self) -> Result<Box<dyn DriverConnection>, DriverError>;

    /// Return a connection. A pooled source may reuse it; a plain factory
    /// or a closed source closes it outright.
    fn release(&self, connection: Box<dyn DriverConnection>);

    /// Stop handing out connections. Connections already acquired are not
    /// affected.
    fn close(&self);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn is_fatal_only_for_fatal_errors() {
        assert!(DriverError::fatal("gone").is_fatal());
        assert!(!DriverError::statement("bad sql").is_fatal());
        assert!(!DriverError::unsupported("interval").is_fatal());
    }

    #[test]
    fn cause_is_preserved_as_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let error = DriverError::fatal_caused_by("io", cause);
        assert!(std::error::Error::source(&error).is_some());
    }
}
