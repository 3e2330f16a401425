//! End-to-end tests over the `SQLite` driver: real SQL in a shared
//! in-memory database, driven entirely through the async facade.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use pretty_assertions::assert_eq;
use sqlbridge::{
    DispatcherConfig, SqlClient, SqlError, SqlOperations as _, SqlValue,
    rusqlite::RusqliteSource,
};

async fn test_client() -> SqlClient {
    static ID: AtomicU64 = AtomicU64::new(0);

    let id = ID.fetch_add(1, Ordering::Relaxed);
    let source = RusqliteSource::memory(&format!("integration_{id}")).unwrap();
    let client = SqlClient::new(Arc::new(source), &DispatcherConfig::default());

    for sql in [
        "CREATE TABLE select_table (id INTEGER, lname TEXT, fname TEXT)",
        "INSERT INTO select_table VALUES (1, 'doe', 'john')",
        "INSERT INTO select_table VALUES (2, 'doe', 'jane')",
        "CREATE TABLE insert_table (id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, lname TEXT, fname TEXT, dob TEXT)",
        "CREATE TABLE update_table (id INTEGER, lname TEXT, fname TEXT, dob TEXT)",
        "INSERT INTO update_table VALUES (1, 'doe', 'john', '2001-01-01')",
        "CREATE TABLE delete_table (id INTEGER, lname TEXT, fname TEXT, dob TEXT)",
        "INSERT INTO delete_table VALUES (1, 'doe', 'john', '2001-01-01')",
        "INSERT INTO delete_table VALUES (2, 'doe', 'jane', '2002-02-02')",
    ] {
        client.update(sql).await.unwrap();
    }

    client
}

#[test_log::test(tokio::test)]
async fn select_returns_columns_and_rows_in_order() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let results = connection
        .query("SELECT ID, FNAME, LNAME FROM select_table ORDER BY ID")
        .await
        .unwrap();

    assert_eq!(
        results.columns(),
        &["ID".to_string(), "FNAME".to_string(), "LNAME".to_string()]
    );
    assert_eq!(results.len(), 2);
    assert_eq!(
        results.rows()[0],
        vec![
            SqlValue::Int64(1),
            SqlValue::String("john".into()),
            SqlValue::String("doe".into()),
        ]
    );
    assert_eq!(
        results.rows()[1],
        vec![
            SqlValue::Int64(2),
            SqlValue::String("jane".into()),
            SqlValue::String("doe".into()),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn select_with_params_binds_positionally() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let results = connection
        .query_with_params(
            "SELECT ID, FNAME, LNAME FROM select_table WHERE fname = ?",
            &[SqlValue::String("john".into())],
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results.rows()[0][0], SqlValue::Int64(1));
}

#[test_log::test(tokio::test)]
async fn select_with_labels_preserves_aliases_in_both_views() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let results = connection
        .query_with_params(
            "SELECT ID as \"IdLabel\", FNAME as \"first_name\", LNAME as \"LAST.NAME\" \
             FROM select_table WHERE fname = ?",
            &[SqlValue::String("john".into())],
        )
        .await
        .unwrap();

    assert_eq!(
        results.columns(),
        &[
            "IdLabel".to_string(),
            "first_name".to_string(),
            "LAST.NAME".to_string(),
        ]
    );

    let row = results.row(0).unwrap();
    assert_eq!(row.get("IdLabel"), Some(SqlValue::Int64(1)));
    assert_eq!(row.get("first_name"), Some(SqlValue::String("john".into())));
    assert_eq!(row.get("LAST.NAME"), Some(SqlValue::String("doe".into())));
}

#[test_log::test(tokio::test)]
async fn invalid_select_fails_with_statement_error() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let error = connection
        .query("SELECT FROM WHERE FOO BAR")
        .await
        .unwrap_err();

    assert!(matches!(error, SqlError::Statement(_)));

    // The handle stays usable after a rejected statement
    connection.query("SELECT 1 FROM select_table").await.unwrap();
}

#[test_log::test(tokio::test)]
async fn insert_with_params_returns_generated_key() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let result = connection
        .update_with_params(
            "INSERT INTO insert_table VALUES (?, ?, ?, ?)",
            &[
                SqlValue::Null,
                SqlValue::String("smith".into()),
                SqlValue::String("john".into()),
                SqlValue::String("2003-03-03".into()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(result.updated, 1);
    let key = result.keys.first().cloned().unwrap();

    let results = connection
        .query_with_params("SELECT LNAME FROM insert_table WHERE id = ?", &[key])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results.rows()[0][0], SqlValue::String("smith".into()));
}

#[test_log::test(tokio::test)]
async fn datetime_param_is_normalized_to_utc_text() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let dob = chrono::DateTime::parse_from_rfc3339("2002-02-02T00:00:00+01:00")
        .unwrap()
        .with_timezone(&chrono::Utc);

    let result = connection
        .update_with_params(
            "INSERT INTO insert_table VALUES (?, ?, ?, ?)",
            &[
                SqlValue::Null,
                SqlValue::String("doe".into()),
                SqlValue::String("jane".into()),
                SqlValue::DateTime(dob),
            ],
        )
        .await
        .unwrap();

    let key = result.keys.first().cloned().unwrap();
    let results = connection
        .query_with_params("SELECT DOB FROM insert_table WHERE id = ?", &[key])
        .await
        .unwrap();

    assert_eq!(
        results.rows()[0][0],
        SqlValue::String("2002-02-01T23:00:00Z".into())
    );
}

#[test_log::test(tokio::test)]
async fn update_changes_matching_rows() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let result = connection
        .update("UPDATE update_table SET fname='jane' WHERE id = 1")
        .await
        .unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.keys, vec![]);

    let results = connection
        .query("SELECT fname FROM update_table WHERE id = 1")
        .await
        .unwrap();
    assert_eq!(results.rows()[0][0], SqlValue::String("jane".into()));
}

#[test_log::test(tokio::test)]
async fn update_with_params_changes_matching_rows() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let result = connection
        .update_with_params(
            "UPDATE update_table SET fname = ? WHERE id = ?",
            &[SqlValue::String("bob".into()), SqlValue::Int64(1)],
        )
        .await
        .unwrap();
    assert_eq!(result.updated, 1);

    let results = connection
        .query("SELECT fname FROM update_table WHERE id = 1")
        .await
        .unwrap();
    assert_eq!(results.rows()[0][0], SqlValue::String("bob".into()));
}

#[test_log::test(tokio::test)]
async fn update_matching_no_rows_reports_zero_updated() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let result = connection
        .update("UPDATE update_table SET fname='jane' WHERE id = -231")
        .await
        .unwrap();

    assert_eq!(result.updated, 0);
    assert_eq!(result.keys, vec![]);
}

#[test_log::test(tokio::test)]
async fn delete_with_params_removes_matching_rows() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    let result = connection
        .update_with_params(
            "DELETE FROM delete_table WHERE id = ?",
            &[SqlValue::Int64(2)],
        )
        .await
        .unwrap();
    assert_eq!(result.updated, 1);

    let results = connection.query("SELECT id FROM delete_table").await.unwrap();
    assert_eq!(results.len(), 1);
}

async fn run_transaction(client: &SqlClient, inserts: usize, commit: bool) -> Vec<SqlValue> {
    let connection = client.get_connection().await.unwrap();
    connection.set_auto_commit(false).await.unwrap();

    let mut keys = Vec::with_capacity(inserts);
    for _ in 0..inserts {
        let result = connection
            .update_with_params(
                "INSERT INTO insert_table VALUES (?, ?, ?, ?)",
                &[
                    SqlValue::Null,
                    SqlValue::String("smith".into()),
                    SqlValue::String("john".into()),
                    SqlValue::String("2003-03-03".into()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.updated, 1);
        keys.push(result.keys.first().cloned().unwrap());
    }

    if commit {
        connection.commit().await.unwrap();
    } else {
        connection.rollback().await.unwrap();
    }
    connection.close().await.unwrap();

    keys
}

fn select_by_keys(keys: &[SqlValue]) -> String {
    let placeholders = keys
        .iter()
        .map(|_| "id = ?")
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("SELECT * FROM insert_table WHERE {placeholders}")
}

#[test_log::test(tokio::test)]
async fn committed_transaction_is_visible_from_a_fresh_connection() {
    let client = test_client().await;
    let keys = run_transaction(&client, 5, true).await;

    let fresh = client.get_connection().await.unwrap();
    let results = fresh
        .query_with_params(&select_by_keys(&keys), &keys)
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
}

#[test_log::test(tokio::test)]
async fn rolled_back_transaction_leaves_no_rows_behind() {
    let client = test_client().await;
    let keys = run_transaction(&client, 3, false).await;

    let fresh = client.get_connection().await.unwrap();
    let results = fresh
        .query_with_params(&select_by_keys(&keys), &keys)
        .await
        .unwrap();

    assert!(results.is_empty());
}

#[test_log::test(tokio::test)]
async fn commit_with_autocommit_enabled_fails_fast() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    assert!(matches!(
        connection.commit().await.unwrap_err(),
        SqlError::NotInTransaction
    ));
    assert!(matches!(
        connection.rollback().await.unwrap_err(),
        SqlError::NotInTransaction
    ));
}

#[test_log::test(tokio::test)]
async fn query_after_close_fails_with_connection_closed() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    connection.query("SELECT 1 FROM select_table").await.unwrap();
    connection.close().await.unwrap();

    let error = connection
        .query("SELECT 1 FROM select_table")
        .await
        .unwrap_err();

    assert!(matches!(error, SqlError::ConnectionClosed));
}

#[test_log::test(tokio::test)]
async fn sequential_inserts_complete_in_issuance_order() {
    let client = test_client().await;
    let connection = client.get_connection().await.unwrap();

    for i in 0..10i64 {
        connection
            .update_with_params(
                "INSERT INTO update_table VALUES (?, 'x', 'y', NULL)",
                &[SqlValue::Int64(100 + i)],
            )
            .await
            .unwrap();
    }

    let results = connection
        .query("SELECT id FROM update_table WHERE id >= 100 ORDER BY rowid")
        .await
        .unwrap();

    let ids: Vec<_> = results
        .rows()
        .iter()
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(
        ids,
        (0..10i64).map(|i| SqlValue::Int64(100 + i)).collect::<Vec<_>>()
    );
}

#[test_log::test(tokio::test)]
async fn one_shot_client_query_round_trips() {
    let client = test_client().await;

    let results = client
        .query("SELECT FNAME FROM select_table ORDER BY ID")
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results.rows()[0][0], SqlValue::String("john".into()));
}
