//! Entry point managing connection acquisition and process-wide lifecycle.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;

use crate::{
    ResultSet, SqlError, SqlOperations, SqlValue, UpdateResult,
    connection::ConnectionHandle,
    dispatcher::{Dispatcher, DispatcherConfig},
    driver::{ConnectionSource, DriverError},
};

/// Hands out [`ConnectionHandle`]s from an underlying connection source.
///
/// Cloning is cheap; clones share the source and the dispatcher. Closing
/// the client stops acquisition and tears down the source, but handles
/// already delivered keep working until they close themselves.
#[derive(Debug, Clone)]
pub struct SqlClient {
    source: Arc<dyn ConnectionSource>,
    dispatcher: Arc<Dispatcher>,
    closed: Arc<AtomicBool>,
}

impl SqlClient {
    /// # Panics
    ///
    /// * If the OS refuses to spawn the dispatcher's worker threads
    #[must_use]
    pub fn new(source: Arc<dyn ConnectionSource>, config: &DispatcherConfig) -> Self {
        Self::with_dispatcher(source, Arc::new(Dispatcher::new(config)))
    }

    /// Build a client on an existing dispatcher, sharing its worker pool.
    #[must_use]
    pub fn with_dispatcher(source: Arc<dyn ConnectionSource>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            source,
            dispatcher,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquire a connection and wrap it in a [`ConnectionHandle`].
    ///
    /// Acquisition runs on the dispatcher since the source may block.
    ///
    /// # Errors
    ///
    /// * `AcquisitionFailed` if the source cannot supply a connection or
    ///   the client is closed
    /// * `Overloaded` if the dispatcher queue is full
    pub async fn get_connection(&self) -> Result<ConnectionHandle, SqlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlError::AcquisitionFailed(DriverError::fatal(
                "client is closed",
            )));
        }

        let source = Arc::clone(&self.source);
        let rx = self.dispatcher.submit(move || source.acquire())?;

        let connection = rx
            .await
            .map_err(|_| {
                SqlError::AcquisitionFailed(DriverError::fatal("acquire was dropped unresolved"))
            })?
            .map_err(SqlError::AcquisitionFailed)?;

        log::debug!("get_connection: acquired driver connection");

        Ok(ConnectionHandle::new(
            connection,
            Arc::clone(&self.source),
            Arc::clone(&self.dispatcher),
        ))
    }

    /// Release pooling resources.
    ///
    /// Idempotent. Handles already delivered are unaffected; their
    /// in-flight operations complete and their connections close outright
    /// on release instead of returning to the source.
    ///
    /// # Errors
    ///
    /// * `Overloaded` if the teardown could not be queued
    pub async fn close(&self) -> Result<(), SqlError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let source = Arc::clone(&self.source);
        let rx = match self.dispatcher.submit(move || source.close()) {
            Ok(rx) => rx,
            Err(error) => {
                // Teardown never ran; let the caller retry
                self.closed.store(false, Ordering::SeqCst);
                return Err(error);
            }
        };
        rx.await
            .map_err(|_| SqlError::Driver(DriverError::fatal("close was dropped unresolved")))?;

        log::debug!("close: connection source closed");
        Ok(())
    }
}

/// One-shot operations: acquire a connection, run the statement, release
/// the connection again regardless of outcome.
#[async_trait]
impl SqlOperations for SqlClient {
    async fn query(&self, sql: &str) -> Result<ResultSet, SqlError> {
        let connection = self.get_connection().await?;
        let result = connection.query(sql).await;
        close_quietly(&connection).await;
        result
    }

    async fn query_with_params(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlError> {
        let connection = self.get_connection().await?;
        let result = connection.query_with_params(sql, params).await;
        close_quietly(&connection).await;
        result
    }

    async fn update(&self, sql: &str) -> Result<UpdateResult, SqlError> {
        let connection = self.get_connection().await?;
        let result = connection.update(sql).await;
        close_quietly(&connection).await;
        result
    }

    async fn update_with_params(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<UpdateResult, SqlError> {
        let connection = self.get_connection().await?;
        let result = connection.update_with_params(sql, params).await;
        close_quietly(&connection).await;
        result
    }
}

async fn close_quietly(connection: &ConnectionHandle) {
    if let Err(error) = connection.close().await {
        log::warn!("close_quietly: failed to release one-shot connection: {error:?}");
    }
}
