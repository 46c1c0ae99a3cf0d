//! Pool row store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist one row per entry: id, name, canonical body, owner ids and the
//!   three `*_u` permission columns.
//! - Issue monotonically increasing ids per table from `pool_control`.
//!
//! # Invariants
//! - Issued ids are never handed out twice, even after deletes.
//! - Unique index rejections surface as `StoreError::UniqueViolation`.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::EntryId;
use rusqlite::ffi;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const POOL_TABLES: &[&str] = &["marketplaceapp_pool", "marketplace_pool", "pool_control"];

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from record store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Insert rejected by a unique index on `table`.
    UniqueViolation { table: &'static str },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UniqueViolation { table } => {
                write!(f, "unique constraint rejected insert into `{table}`")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "record store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "record store requires table `{table}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UniqueViolation { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One persisted pool row. `body` is authoritative; the other columns are
/// index copies of fields inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub oid: EntryId,
    pub name: String,
    pub body: String,
    pub uid: i64,
    pub gid: i64,
    pub owner_u: i64,
    pub group_u: i64,
    pub other_u: i64,
}

/// Row-level store consumed by the object pools.
pub trait RecordStore {
    /// Reserves the next id for `table`.
    fn next_id(&self, table: &'static str) -> StoreResult<EntryId>;
    /// Inserts a new row.
    fn insert(&self, table: &'static str, record: &StoredRecord) -> StoreResult<()>;
    /// Replaces every column of the row at `record.oid`. Returns rows affected.
    fn replace(&self, table: &'static str, record: &StoredRecord) -> StoreResult<usize>;
    /// Deletes the row at `oid`. Returns rows affected.
    fn delete(&self, table: &'static str, oid: EntryId) -> StoreResult<usize>;
    /// Loads one row by primary key.
    fn fetch_by_id(
        &self,
        table: &'static str,
        oid: EntryId,
    ) -> StoreResult<Option<StoredRecord>>;
    /// Loads one row by name, optionally scoped to an owner uid.
    fn fetch_by_name(
        &self,
        table: &'static str,
        name: &str,
        uid: Option<i64>,
    ) -> StoreResult<Option<StoredRecord>>;
}

/// SQLite-backed record store.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Creates a store without schema checks. Callers must have validated
    /// the connection through `try_new` earlier.
    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn next_id(&self, table: &'static str) -> StoreResult<EntryId> {
        let id = self.conn.query_row(
            "UPDATE pool_control
             SET last_oid = last_oid + 1
             WHERE tablename = ?1
             RETURNING last_oid;",
            [table],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(id)
    }

    fn insert(&self, table: &'static str, record: &StoredRecord) -> StoreResult<()> {
        let result = self.conn.execute(
            &format!(
                "INSERT INTO {table} (
                    oid,
                    name,
                    body,
                    uid,
                    gid,
                    owner_u,
                    group_u,
                    other_u
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);"
            ),
            params![
                record.oid,
                record.name.as_str(),
                record.body.as_str(),
                record.uid,
                record.gid,
                record.owner_u,
                record.group_u,
                record.other_u,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::UniqueViolation { table }),
            Err(err) => Err(err.into()),
        }
    }

    fn replace(&self, table: &'static str, record: &StoredRecord) -> StoreResult<usize> {
        let result = self.conn.execute(
            &format!(
                "UPDATE {table}
                 SET
                    name = ?2,
                    body = ?3,
                    uid = ?4,
                    gid = ?5,
                    owner_u = ?6,
                    group_u = ?7,
                    other_u = ?8
                 WHERE oid = ?1;"
            ),
            params![
                record.oid,
                record.name.as_str(),
                record.body.as_str(),
                record.uid,
                record.gid,
                record.owner_u,
                record.group_u,
                record.other_u,
            ],
        );

        match result {
            Ok(changed) => Ok(changed),
            Err(err) if is_unique_violation(&err) => Err(StoreError::UniqueViolation { table }),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, table: &'static str, oid: EntryId) -> StoreResult<usize> {
        let changed = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE oid = ?1;"), [oid])?;
        Ok(changed)
    }

    fn fetch_by_id(
        &self,
        table: &'static str,
        oid: EntryId,
    ) -> StoreResult<Option<StoredRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("{} WHERE oid = ?1;", select_sql(table)),
                [oid],
                parse_record_row,
            )
            .optional()?;
        Ok(record)
    }

    fn fetch_by_name(
        &self,
        table: &'static str,
        name: &str,
        uid: Option<i64>,
    ) -> StoreResult<Option<StoredRecord>> {
        let record = match uid {
            Some(uid) => self
                .conn
                .query_row(
                    &format!("{} WHERE name = ?1 AND uid = ?2;", select_sql(table)),
                    params![name, uid],
                    parse_record_row,
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    &format!("{} WHERE name = ?1 ORDER BY oid ASC LIMIT 1;", select_sql(table)),
                    [name],
                    parse_record_row,
                )
                .optional()?,
        };
        Ok(record)
    }
}

fn select_sql(table: &str) -> String {
    format!(
        "SELECT
            oid,
            name,
            body,
            uid,
            gid,
            owner_u,
            group_u,
            other_u
         FROM {table}"
    )
}

fn parse_record_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        oid: row.get("oid")?,
        name: row.get("name")?,
        body: row.get("body")?,
        uid: row.get("uid")?,
        gid: row.get("gid")?,
        owner_u: row.get("owner_u")?,
        group_u: row.get("group_u")?,
        other_u: row.get("other_u")?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::ConstraintViolation
                && (inner.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || inner.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in POOL_TABLES {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
