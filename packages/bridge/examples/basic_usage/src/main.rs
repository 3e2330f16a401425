#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic usage example for `sqlbridge`
//!
//! Opens a client over a shared in-memory `SQLite` database, runs a few
//! statements through the async facade, and walks through an explicit
//! transaction with a rollback.

use std::sync::Arc;

use sqlbridge::{
    DispatcherConfig, SqlClient, SqlOperations as _, SqlValue, rusqlite::RusqliteSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let source = RusqliteSource::memory("basic_usage")?;
    let client = SqlClient::new(Arc::new(source), &DispatcherConfig::default());

    // One-shot operations acquire and release a connection per statement
    client
        .update("CREATE TABLE people (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, dob TEXT)")
        .await?;

    let inserted = client
        .update_with_params(
            "INSERT INTO people VALUES (?, ?, ?)",
            &[
                SqlValue::Null,
                SqlValue::String("john smith".into()),
                SqlValue::String("2003-03-03".into()),
            ],
        )
        .await?;
    println!("inserted {} row(s), generated keys: {:?}", inserted.updated, inserted.keys);

    // A dedicated connection serializes everything issued against it
    let connection = client.get_connection().await?;

    let results = connection
        .query("SELECT ID, NAME FROM people ORDER BY ID")
        .await?;
    println!("columns: {:?}", results.columns());
    for index in 0..results.len() {
        let row = results.row(index).expect("row within bounds");
        println!("  name = {:?}", row.get("NAME"));
    }

    // Explicit transaction scope: the caller owns the boundary
    connection.set_auto_commit(false).await?;
    connection
        .update_with_params(
            "INSERT INTO people VALUES (?, ?, ?)",
            &[
                SqlValue::Null,
                SqlValue::String("jane doe".into()),
                SqlValue::Null,
            ],
        )
        .await?;
    connection.rollback().await?;
    connection.set_auto_commit(true).await?;

    let count = connection.query("SELECT COUNT(*) AS N FROM people").await?;
    println!("rows after rollback: {:?}", count.rows()[0][0]);

    connection.close().await?;
    client.close().await?;

    Ok(())
}
