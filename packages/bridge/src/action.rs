use crate::{
    ResultSet, SqlValue, UpdateResult,
    driver::{DriverConnection, DriverError},
};

/// Immutable description of one unit of blocking driver work.
///
/// An action is constructed when an operation is issued, executed exactly
/// once on a dispatcher worker, and resolves to exactly one
/// [`ActionOutcome`] or one [`DriverError`]. Never retried.
#[derive(Debug, Clone)]
pub(crate) enum Action {
    Query { sql: String },
    QueryWithParams { sql: String, params: Vec<SqlValue> },
    Update { sql: String },
    UpdateWithParams { sql: String, params: Vec<SqlValue> },
    SetAutoCommit(bool),
    Commit,
    Rollback,
}

#[derive(Debug)]
pub(crate) enum ActionOutcome {
    Rows(ResultSet),
    Updated(UpdateResult),
    Unit,
}

impl Action {
    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::QueryWithParams { .. } => "query_with_params",
            Self::Update { .. } => "update",
            Self::UpdateWithParams { .. } => "update_with_params",
            Self::SetAutoCommit(..) => "set_auto_commit",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }

    /// Transaction-scope finalizers are invalid while autocommit is on.
    pub(crate) const fn requires_transaction(&self) -> bool {
        matches!(self, Self::Commit | Self::Rollback)
    }

    /// Perform the single blocking driver call this action describes.
    pub(crate) fn run(
        &self,
        connection: &mut dyn DriverConnection,
    ) -> Result<ActionOutcome, DriverError> {
        log::trace!("run: action={}", self.kind());

        match self {
            Self::Query { sql } => connection.query(sql, &[]).map(ActionOutcome::Rows),
            Self::QueryWithParams { sql, params } => {
                connection.query(sql, params).map(ActionOutcome::Rows)
            }
            Self::Update { sql } => connection.update(sql, &[]).map(ActionOutcome::Updated),
            Self::UpdateWithParams { sql, params } => {
                connection.update(sql, params).map(ActionOutcome::Updated)
            }
            Self::SetAutoCommit(value) => connection
                .set_auto_commit(*value)
                .map(|()| ActionOutcome::Unit),
            Self::Commit => connection.commit().map(|()| ActionOutcome::Unit),
            Self::Rollback => connection.rollback().map(|()| ActionOutcome::Unit),
        }
    }
}

impl ActionOutcome {
    pub(crate) fn into_rows(self) -> Result<ResultSet, DriverError> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Updated(..) | Self::Unit => {
                Err(DriverError::fatal("action resolved to a non-result-set outcome"))
            }
        }
    }

    pub(crate) fn into_updated(self) -> Result<UpdateResult, DriverError> {
        match self {
            Self::Updated(result) => Ok(result),
            Self::Rows(..) | Self::Unit => {
                Err(DriverError::fatal("action resolved to a non-update outcome"))
            }
        }
    }
}
