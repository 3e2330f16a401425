#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Init helpers wiring a ready-to-use [`SqlClient`] onto a `SQLite`
//! database, with the default dispatcher sizing.

use std::{path::Path, sync::Arc};

use sqlbridge::{DispatcherConfig, SqlClient, SqlError, rusqlite::RusqliteSource};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitDbError {
    #[error(transparent)]
    Sql(#[from] SqlError),
    #[error(transparent)]
    Driver(#[from] sqlbridge::driver::DriverError),
}

/// Build a client over a `SQLite` database file.
///
/// The database is opened once up front so a bad path fails here rather
/// than on first use.
///
/// # Errors
///
/// * If the database cannot be opened
pub async fn init_sqlite(db_location: &Path) -> Result<SqlClient, InitDbError> {
    let source = RusqliteSource::from_path(db_location);
    let client = SqlClient::new(Arc::new(source), &DispatcherConfig::default());

    validate(&client).await?;

    log::debug!("init_sqlite: initialized client for {}", db_location.display());

    Ok(client)
}

/// Build a client over a named shared in-memory `SQLite` database.
///
/// The database lives as long as the client's connection source.
///
/// # Errors
///
/// * If the in-memory database cannot be opened
pub async fn init_sqlite_memory(name: &str) -> Result<SqlClient, InitDbError> {
    let source = RusqliteSource::memory(name)?;
    let client = SqlClient::new(Arc::new(source), &DispatcherConfig::default());

    validate(&client).await?;

    log::debug!("init_sqlite_memory: initialized client for {name}");

    Ok(client)
}

async fn validate(client: &SqlClient) -> Result<(), SqlError> {
    let connection = client.get_connection().await?;
    connection.close().await
}
