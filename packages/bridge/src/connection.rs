//! Caller-facing wrapper around one exclusively owned driver connection.
//!
//! A handle serializes everything issued against it: the connection state
//! sits behind a fair async mutex whose guard travels into the dispatcher
//! job and is only released once the blocking call finishes. At most one
//! driver call is ever in flight per handle, and operations issued
//! sequentially complete in issuance order.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    ResultSet, SqlError, SqlOperations, SqlValue, UpdateResult,
    action::{Action, ActionOutcome},
    dispatcher::Dispatcher,
    driver::{ConnectionSource, DriverConnection, DriverError},
};

#[derive(Debug)]
struct HandleState {
    /// `None` once the handle is closed or permanently failed
    connection: Option<Box<dyn DriverConnection>>,
    auto_commit: bool,
}

/// Async surface over one acquired driver connection.
///
/// Autocommit starts enabled. [`close`](Self::close) releases the
/// connection back to its source and is final: every operation issued
/// afterwards fails with [`SqlError::ConnectionClosed`] without touching
/// the driver.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    state: Arc<Mutex<HandleState>>,
    source: Arc<dyn ConnectionSource>,
    dispatcher: Arc<Dispatcher>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        connection: Box<dyn DriverConnection>,
        source: Arc<dyn ConnectionSource>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandleState {
                connection: Some(connection),
                auto_commit: true,
            })),
            source,
            dispatcher,
        }
    }

    /// Whether the handle has been closed or permanently failed.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.connection.is_none()
    }

    /// Whether each statement currently runs in its own implicit
    /// transaction.
    pub async fn auto_commit(&self) -> bool {
        self.state.lock().await.auto_commit
    }

    /// Toggle autocommit.
    ///
    /// Turning it off opens an explicit transaction scope owned by the
    /// caller; no commit or rollback is issued implicitly. Turning it back
    /// on commits the open scope.
    ///
    /// # Errors
    ///
    /// * If the handle is closed
    /// * If the driver rejects the toggle
    pub async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), SqlError> {
        self.run(Action::SetAutoCommit(auto_commit)).await?;
        Ok(())
    }

    /// Finalize the current transaction scope.
    ///
    /// # Errors
    ///
    /// * `NotInTransaction` if autocommit is enabled
    /// * If the handle is closed or the driver fails the commit
    pub async fn commit(&self) -> Result<(), SqlError> {
        self.run(Action::Commit).await?;
        Ok(())
    }

    /// Discard the current transaction scope.
    ///
    /// # Errors
    ///
    /// * `NotInTransaction` if autocommit is enabled
    /// * If the handle is closed or the driver fails the rollback
    pub async fn rollback(&self) -> Result<(), SqlError> {
        self.run(Action::Rollback).await?;
        Ok(())
    }

    /// Release the underlying connection back to its source.
    ///
    /// Closing an already-closed handle is a no-op. The connection is
    /// never resurrected afterwards.
    ///
    /// # Errors
    ///
    /// * `Overloaded` if the release could not be queued; the handle stays
    ///   open and close can be retried
    pub async fn close(&self) -> Result<(), SqlError> {
        let guard = self.state.clone().lock_owned().await;

        if guard.connection.is_none() {
            log::trace!("close: already closed");
            return Ok(());
        }

        let source = Arc::clone(&self.source);
        let rx = self.dispatcher.submit(move || {
            let mut guard = guard;
            if let Some(connection) = guard.connection.take() {
                source.release(connection);
            }
        })?;

        rx.await
            .map_err(|_| SqlError::Driver(DriverError::fatal("close was dropped unresolved")))?;

        log::debug!("close: connection released");
        Ok(())
    }

    async fn run(&self, action: Action) -> Result<ActionOutcome, SqlError> {
        let guard = self.state.clone().lock_owned().await;

        if guard.connection.is_none() {
            return Err(SqlError::ConnectionClosed);
        }
        if action.requires_transaction() && guard.auto_commit {
            return Err(SqlError::NotInTransaction);
        }

        let kind = action.kind();
        let rx = self
            .dispatcher
            .submit(move || run_blocking(guard, &action))?;

        let result = rx.await.map_err(|_| {
            SqlError::Driver(DriverError::fatal("action was dropped unresolved"))
        })?;

        if let Err(error) = &result {
            log::debug!("run: {kind} failed: {error:?}");
        }

        result
    }
}

/// Executes on a dispatcher worker while the handle's guard is held.
fn run_blocking(
    mut guard: OwnedMutexGuard<HandleState>,
    action: &Action,
) -> Result<ActionOutcome, SqlError> {
    let state = &mut *guard;
    let Some(connection) = state.connection.as_mut() else {
        return Err(SqlError::ConnectionClosed);
    };

    let result = action.run(connection.as_mut());

    match &result {
        Ok(_) => {
            if let Action::SetAutoCommit(value) = action {
                state.auto_commit = *value;
            }
        }
        Err(error) if error.is_fatal() => {
            // The connection is unusable; discard it so every later
            // operation fails closed instead of touching the driver.
            log::warn!("run: connection permanently failed: {error:?}");
            state.connection = None;
        }
        Err(_) => {}
    }

    result.map_err(SqlError::from)
}

#[async_trait]
impl SqlOperations for ConnectionHandle {
    async fn query(&self, sql: &str) -> Result<ResultSet, SqlError> {
        let outcome = self.run(Action::Query { sql: sql.into() }).await?;
        Ok(outcome.into_rows()?)
    }

    async fn query_with_params(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlError> {
        let outcome = self
            .run(Action::QueryWithParams {
                sql: sql.into(),
                params: params.to_vec(),
            })
            .await?;
        Ok(outcome.into_rows()?)
    }

    async fn update(&self, sql: &str) -> Result<UpdateResult, SqlError> {
        let outcome = self.run(Action::Update { sql: sql.into() }).await?;
        Ok(outcome.into_updated()?)
    }

    async fn update_with_params(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<UpdateResult, SqlError> {
        let outcome = self
            .run(Action::UpdateWithParams {
                sql: sql.into(),
                params: params.to_vec(),
            })
            .await?;
        Ok(outcome.into_updated()?)
    }
}
