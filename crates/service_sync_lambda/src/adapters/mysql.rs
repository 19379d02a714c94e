//! MySQL implementation of the `services` store and its connector.
//!
//! Each store call runs one transaction on the guarded connection and is
//! bridged onto the Lambda's tokio runtime with `block_in_place`.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::NaiveDateTime;
use service_sync_core::contract::{SnapshotEntry, STATUS_ACTIVE, STATUS_DELETED};
use service_sync_core::guardian::Connector;
use service_sync_core::store::{ServiceStore, StoreError};
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, QueryBuilder, Transaction};

use crate::config::DatabaseSettings;

/// Rows per INSERT statement; all chunks share one transaction.
pub const UPSERT_CHUNK_SIZE: usize = 500;

/// Largest kept-id set rendered as an inline `NOT IN (...)`. MySQL caps a
/// prepared statement at 65,535 placeholders; bigger sets are staged in a
/// temporary table and anti-joined instead.
pub const MARK_ABSENT_INLINE_LIMIT: usize = 10_000;

const KEEP_TABLE_DROP: &str = "DROP TEMPORARY TABLE IF EXISTS service_sync_keep";
const KEEP_TABLE_CREATE: &str =
    "CREATE TEMPORARY TABLE service_sync_keep (service_id VARCHAR(255) NOT NULL PRIMARY KEY)";

const INSERT_SERVICES: &str = "INSERT INTO services \
    (name, public_ip, private_ip, service_id, status, additional_information, created_at, updated_at) ";

const ON_DUPLICATE_UPDATE: &str = " ON DUPLICATE KEY UPDATE \
    name = VALUES(name), \
    public_ip = VALUES(public_ip), \
    private_ip = VALUES(private_ip), \
    status = VALUES(status), \
    additional_information = VALUES(additional_information), \
    updated_at = ";

pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(settings: &DatabaseSettings) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        Self {
            options,
            connect_timeout: settings.connect_timeout,
        }
    }
}

impl Connector for MySqlConnector {
    type Connection = MySqlServiceStore;

    fn connect(&self) -> Result<MySqlServiceStore, StoreError> {
        let options = self.options.clone();
        let connect_timeout = self.connect_timeout;

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match tokio::time::timeout(connect_timeout, options.connect()).await {
                    Ok(Ok(connection)) => Ok(MySqlServiceStore { connection }),
                    Ok(Err(error)) => Err(StoreError::Connection(error.to_string())),
                    Err(_) => Err(StoreError::Connection(format!(
                        "connect timed out after {}s",
                        connect_timeout.as_secs()
                    ))),
                }
            })
        })
    }

    fn ping(&self, store: &mut MySqlServiceStore) -> Result<(), StoreError> {
        let connect_timeout = self.connect_timeout;
        let connection = &mut store.connection;

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match tokio::time::timeout(connect_timeout, connection.ping()).await {
                    Ok(result) => result.map_err(|error| StoreError::Connection(error.to_string())),
                    Err(_) => Err(StoreError::Connection("ping timed out".to_string())),
                }
            })
        })
    }
}

pub struct MySqlServiceStore {
    connection: MySqlConnection,
}

impl ServiceStore for MySqlServiceStore {
    fn upsert_services(
        &mut self,
        entries: &[SnapshotEntry],
        now: NaiveDateTime,
    ) -> Result<u64, StoreError> {
        let connection = &mut self.connection;
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(upsert_batch(connection, entries, now))
        })
        .map_err(store_error)
    }

    fn mark_absent(
        &mut self,
        keep: &BTreeSet<String>,
        now: NaiveDateTime,
    ) -> Result<u64, StoreError> {
        if keep.len() > MARK_ABSENT_INLINE_LIMIT {
            let connection = &mut self.connection;
            return tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(mark_absent_staged(connection, keep, now))
            })
            .map_err(store_error);
        }

        let Some(statement) = mark_absent_statement(keep, now) else {
            return Err(StoreError::EmptyExclusionSet);
        };
        let connection = &mut self.connection;
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(execute_update(
                connection,
                "mark_absent",
                statement,
            ))
        })
        .map_err(store_error)
    }

    fn mark_all_deleted(&mut self, now: NaiveDateTime) -> Result<u64, StoreError> {
        let statement = mark_all_deleted_statement(now);
        let connection = &mut self.connection;
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(execute_update(
                connection,
                "mark_all_deleted",
                statement,
            ))
        })
        .map_err(store_error)
    }
}

async fn upsert_batch(
    connection: &mut MySqlConnection,
    entries: &[SnapshotEntry],
    now: NaiveDateTime,
) -> Result<u64, sqlx::Error> {
    let mut transaction = connection.begin().await?;
    for chunk in entries.chunks(UPSERT_CHUNK_SIZE) {
        let mut statement = upsert_statement(chunk, now);
        let executed = statement.build().execute(&mut *transaction).await;
        if let Err(error) = executed {
            roll_back(transaction, "upsert").await;
            return Err(error);
        }
    }
    transaction.commit().await?;
    Ok(entries.len() as u64)
}

async fn execute_update(
    connection: &mut MySqlConnection,
    step: &'static str,
    mut statement: QueryBuilder<'static, MySql>,
) -> Result<u64, sqlx::Error> {
    let mut transaction = connection.begin().await?;
    let executed = statement.build().execute(&mut *transaction).await;
    let affected = match executed {
        Ok(result) => result.rows_affected(),
        Err(error) => {
            roll_back(transaction, step).await;
            return Err(error);
        }
    };
    transaction.commit().await?;
    Ok(affected)
}

/// Loads the kept ids into a session-scoped table and marks every other row
/// deleted with an anti-join. The ids and the update share one transaction.
async fn mark_absent_staged(
    connection: &mut MySqlConnection,
    keep: &BTreeSet<String>,
    now: NaiveDateTime,
) -> Result<u64, sqlx::Error> {
    sqlx::query(KEEP_TABLE_DROP).execute(&mut *connection).await?;
    sqlx::query(KEEP_TABLE_CREATE).execute(&mut *connection).await?;

    let marked = stage_and_mark(connection, keep, now).await;

    if let Err(error) = sqlx::query(KEEP_TABLE_DROP).execute(&mut *connection).await {
        tracing::warn!(
            component = "mysql_store",
            event = "keep_table_drop_failed",
            error = %error,
            "temporary table left for the next invocation to replace"
        );
    }
    marked
}

async fn stage_and_mark(
    connection: &mut MySqlConnection,
    keep: &BTreeSet<String>,
    now: NaiveDateTime,
) -> Result<u64, sqlx::Error> {
    let ids: Vec<&String> = keep.iter().collect();
    let mut transaction = connection.begin().await?;
    for chunk in ids.chunks(UPSERT_CHUNK_SIZE) {
        let mut statement = keep_insert_statement(chunk);
        let executed = statement.build().execute(&mut *transaction).await;
        if let Err(error) = executed {
            roll_back(transaction, "mark_absent").await;
            return Err(error);
        }
    }

    let mut statement = mark_absent_staged_statement(now);
    let executed = statement.build().execute(&mut *transaction).await;
    let affected = match executed {
        Ok(result) => result.rows_affected(),
        Err(error) => {
            roll_back(transaction, "mark_absent").await;
            return Err(error);
        }
    };
    transaction.commit().await?;
    Ok(affected)
}

async fn roll_back(transaction: Transaction<'_, MySql>, step: &'static str) {
    if let Err(error) = transaction.rollback().await {
        tracing::error!(
            component = "mysql_store",
            event = "rollback_failed",
            step,
            error = %error,
            "error while rolling back"
        );
    }
}

pub(crate) fn upsert_statement(
    chunk: &[SnapshotEntry],
    now: NaiveDateTime,
) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new(INSERT_SERVICES);
    builder.push_values(chunk, |mut row, entry| {
        row.push_bind(entry.name.clone())
            .push_bind(entry.public_ip.clone())
            .push_bind(entry.private_ip.clone())
            .push_bind(entry.service_id.clone())
            .push_bind(entry.status)
            .push_bind(entry.additional_information.clone())
            .push_bind(entry.created_at.unwrap_or(now))
            .push_bind(entry.updated_at.unwrap_or(now));
    });
    builder.push(ON_DUPLICATE_UPDATE);
    builder.push_bind(now);
    builder
}

/// `None` when `keep` is empty: `NOT IN ()` is not valid SQL.
pub(crate) fn mark_absent_statement(
    keep: &BTreeSet<String>,
    now: NaiveDateTime,
) -> Option<QueryBuilder<'static, MySql>> {
    if keep.is_empty() {
        return None;
    }

    let mut builder =
        QueryBuilder::new(format!("UPDATE services SET status = {STATUS_DELETED}, updated_at = "));
    builder.push_bind(now);
    builder.push(" WHERE service_id NOT IN (");
    let mut ids = builder.separated(", ");
    for service_id in keep {
        ids.push_bind(service_id.clone());
    }
    ids.push_unseparated(")");
    Some(builder)
}

pub(crate) fn keep_insert_statement(chunk: &[&String]) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new("INSERT IGNORE INTO service_sync_keep (service_id) ");
    builder.push_values(chunk, |mut row, service_id| {
        row.push_bind((*service_id).clone());
    });
    builder
}

pub(crate) fn mark_absent_staged_statement(now: NaiveDateTime) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new(format!(
        "UPDATE services LEFT JOIN service_sync_keep \
         ON service_sync_keep.service_id = services.service_id \
         SET services.status = {STATUS_DELETED}, services.updated_at = "
    ));
    builder.push_bind(now);
    builder.push(" WHERE service_sync_keep.service_id IS NULL");
    builder
}

pub(crate) fn mark_all_deleted_statement(now: NaiveDateTime) -> QueryBuilder<'static, MySql> {
    let mut builder =
        QueryBuilder::new(format!("UPDATE services SET status = {STATUS_DELETED}, updated_at = "));
    builder.push_bind(now);
    builder.push(format!(" WHERE status = {STATUS_ACTIVE}"));
    builder
}

fn store_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(error.to_string()),
        other => StoreError::Transaction(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(7, 0, 0))
            .expect("valid timestamp")
    }

    fn entry(service_id: &str) -> SnapshotEntry {
        SnapshotEntry {
            name: format!("name-{service_id}"),
            public_ip: None,
            private_ip: None,
            service_id: service_id.to_string(),
            status: STATUS_ACTIVE,
            additional_information: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn upsert_renders_one_tuple_per_entry() {
        let statement = upsert_statement(&[entry("a"), entry("b")], now());
        let sql = statement.sql();

        assert!(sql.starts_with("INSERT INTO services (name, public_ip, private_ip, service_id"));
        assert_eq!(sql.matches("(?, ?, ?, ?, ?, ?, ?, ?)").count(), 2);
        assert!(sql.contains("ON DUPLICATE KEY UPDATE name = VALUES(name)"));
        assert!(sql.ends_with("updated_at = ?"));
        assert!(!sql.contains("created_at = VALUES"));
    }

    #[test]
    fn mark_absent_binds_each_kept_id() {
        let keep = BTreeSet::from(["x".to_string(), "y".to_string()]);
        let statement = mark_absent_statement(&keep, now()).expect("non-empty set");

        assert_eq!(
            statement.sql(),
            "UPDATE services SET status = 2, updated_at = ? WHERE service_id NOT IN (?, ?)"
        );
    }

    #[test]
    fn mark_absent_refuses_empty_set() {
        assert!(mark_absent_statement(&BTreeSet::new(), now()).is_none());
    }

    #[test]
    fn large_kept_sets_are_staged_and_anti_joined() {
        let ids: Vec<String> = (0..3).map(|index| format!("svc-{index}")).collect();
        let refs: Vec<&String> = ids.iter().collect();

        let insert = keep_insert_statement(&refs);
        assert_eq!(
            insert.sql(),
            "INSERT IGNORE INTO service_sync_keep (service_id) VALUES (?), (?), (?)"
        );

        let update = mark_absent_staged_statement(now());
        assert_eq!(
            update.sql(),
            "UPDATE services LEFT JOIN service_sync_keep \
             ON service_sync_keep.service_id = services.service_id \
             SET services.status = 2, services.updated_at = ? \
             WHERE service_sync_keep.service_id IS NULL"
        );
    }

    #[test]
    fn inline_limit_stays_below_placeholder_cap() {
        assert!(MARK_ABSENT_INLINE_LIMIT + 1 < u16::MAX as usize);
        assert!(UPSERT_CHUNK_SIZE * 8 < u16::MAX as usize);
    }

    #[test]
    fn schema_status_column_holds_any_parsed_status() {
        let schema = include_str!("../../schema.sql");
        let status_column = schema
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("status "))
            .unwrap_or_default();
        let column_type = status_column.split_whitespace().nth(1);

        assert_eq!(column_type, Some("INT"));
    }

    #[test]
    fn destroy_only_touches_active_rows() {
        assert_eq!(
            mark_all_deleted_statement(now()).sql(),
            "UPDATE services SET status = 2, updated_at = ? WHERE status = 1"
        );
    }

    #[test]
    fn io_failures_map_to_connection_errors() {
        let error = store_error(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "server gone",
        )));
        assert!(matches!(error, StoreError::Connection(_)));

        let error = store_error(sqlx::Error::RowNotFound);
        assert!(matches!(error, StoreError::Transaction(_)));
    }
}
