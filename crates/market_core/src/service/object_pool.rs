//! Object pool for marketplace apps and marketplaces.
//!
//! # Responsibility
//! - Allocate, load, replace and drop catalog entries.
//! - Enforce name syntax, name uniqueness, marketplace emptiness on drop and
//!   the write-authority gate.
//!
//! # Invariants
//! - Every read-check-then-write sequence runs in one `BEGIN IMMEDIATE`
//!   transaction while the connection lock is held.
//! - Records are encoded and validated before any store write; a failure
//!   leaves the store untouched.
//! - Non-authoritative pools reject every mutation before touching the store.

use crate::codec::{self, DecodeError, ValidationError};
use crate::config::PoolConfig;
use crate::model::app::{App, AppState, StateTransitionError};
use crate::model::attributes::AttributeBag;
use crate::model::entry::{CatalogEntry, EntryKind, NameScope};
use crate::model::marketplace::Marketplace;
use crate::model::name::{validate_name, NameError};
use crate::model::owner::Owner;
use crate::model::{EntryId, UNALLOCATED_ID};
use crate::repo::record_store::{
    RecordStore, SqliteRecordStore, StoreError, StoreResult, StoredRecord,
};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub type PoolResult<T> = Result<T, PoolError>;

/// Errors from object pool operations.
#[derive(Debug)]
pub enum PoolError {
    /// Entry name fails the syntax rule.
    InvalidName(NameError),
    /// Name already used in the kind's name scope.
    DuplicateName {
        kind: EntryKind,
        name: String,
        existing_id: EntryId,
    },
    /// No entry matches the lookup key.
    NotFound { kind: EntryKind, key: String },
    /// Marketplace still lists apps.
    NotEmpty { id: EntryId },
    /// Mutation attempted on a read-only replica.
    NotAuthority { operation: &'static str },
    /// Encoded record failed structural validation; nothing was written.
    Validation(ValidationError),
    /// Stored record cannot be decoded.
    Decode(DecodeError),
    /// App state machine rejected the operation.
    InvalidState {
        id: EntryId,
        source: StateTransitionError,
    },
    /// Underlying store failure.
    Store(StoreError),
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(err) => write!(f, "{err}"),
            Self::DuplicateName {
                kind,
                name,
                existing_id,
            } => write!(
                f,
                "NAME `{name}` is already taken by {kind} {existing_id}"
            ),
            Self::NotFound { kind, key } => write!(f, "{kind} not found: {key}"),
            Self::NotEmpty { id } => write!(f, "marketplace {id} is not empty"),
            Self::NotAuthority { operation } => write!(
                f,
                "{operation} called, but this node is not the federation write authority"
            ),
            Self::Validation(err) => write!(f, "error transforming the entry to XML: {err}"),
            Self::Decode(err) => write!(f, "{err}"),
            Self::InvalidState { id, source } => write!(f, "app {id}: {source}"),
            Self::Store(err) => write!(f, "error writing catalog entry to the store: {err}"),
        }
    }
}

impl Error for PoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidName(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Decode(err) => Some(err),
            Self::InvalidState { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            Self::DuplicateName { .. } | Self::NotFound { .. } => None,
            Self::NotEmpty { .. } | Self::NotAuthority { .. } => None,
        }
    }
}

impl From<StoreError> for PoolError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<rusqlite::Error> for PoolError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(value.into())
    }
}

/// Outcome reported by post-allocation processing of an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed(String),
}

/// Catalog pool over one SQLite connection.
///
/// The pool is `Send + Sync`; concurrent callers are serialized on the
/// connection lock.
pub struct ObjectPool {
    conn: Mutex<Connection>,
    config: PoolConfig,
}

impl ObjectPool {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection, config: PoolConfig) -> PoolResult<Self> {
        SqliteRecordStore::try_new(&conn)?;
        info!(
            "event=pool_open module=pool status=ok write_authority={}",
            config.write_authority
        );
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    // ---------------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------------

    /// Allocates an app from caller attributes and returns its new id.
    ///
    /// `NAME` is required. When `marketplace_id` is given the app is listed
    /// in that marketplace within the same transaction.
    pub fn allocate_app(
        &self,
        owner: &Owner,
        umask: u32,
        attributes: AttributeBag,
        marketplace_id: Option<EntryId>,
    ) -> PoolResult<EntryId> {
        let started_at = Instant::now();
        let result = self.allocate_app_inner(owner, umask, attributes, marketplace_id);
        log_outcome("app_allocate", started_at, &result);
        result
    }

    fn allocate_app_inner(
        &self,
        owner: &Owner,
        umask: u32,
        attributes: AttributeBag,
        marketplace_id: Option<EntryId>,
    ) -> PoolResult<EntryId> {
        self.ensure_write_authority("allocate_app")?;

        let mut app = App::new(owner.clone(), umask, attributes);
        let name = app.attributes.get_or_empty("NAME");
        validate_name(&name).map_err(PoolError::InvalidName)?;

        self.with_write(|store| {
            ensure_name_free(store, EntryKind::App, &name, owner.uid)?;

            app.prepare_insert(now_epoch_secs())
                .map_err(|source| PoolError::InvalidState {
                    id: UNALLOCATED_ID,
                    source,
                })?;

            let marketplace = match marketplace_id {
                Some(id) => Some(load_marketplace(store, id)?),
                None => None,
            };
            if let Some(mp) = &marketplace {
                app.marketplace_id = mp.id;
                app.marketplace_name = mp.name.clone();
            }

            app.id = store.next_id(EntryKind::App.spec().table)?;
            let id = app.id;
            persist(store, &CatalogEntry::App(app), Write::Insert)?;

            if let Some(mut mp) = marketplace {
                mp.add_member(id);
                persist(store, &CatalogEntry::Marketplace(mp), Write::Replace)?;
            }
            Ok(id)
        })
    }

    /// Allocates a marketplace from caller attributes and returns its new id.
    pub fn allocate_marketplace(
        &self,
        owner: &Owner,
        umask: u32,
        attributes: AttributeBag,
    ) -> PoolResult<EntryId> {
        let started_at = Instant::now();
        let result = self.allocate_marketplace_inner(owner, umask, attributes);
        log_outcome("marketplace_allocate", started_at, &result);
        result
    }

    fn allocate_marketplace_inner(
        &self,
        owner: &Owner,
        umask: u32,
        attributes: AttributeBag,
    ) -> PoolResult<EntryId> {
        self.ensure_write_authority("allocate_marketplace")?;

        let mut mp = Marketplace::new(owner.clone(), umask, attributes);
        let name = mp.attributes.get_or_empty("NAME");
        validate_name(&name).map_err(PoolError::InvalidName)?;

        self.with_write(|store| {
            ensure_name_free(store, EntryKind::Marketplace, &name, owner.uid)?;

            mp.prepare_insert();
            mp.id = store.next_id(EntryKind::Marketplace.spec().table)?;
            let id = mp.id;
            persist(store, &CatalogEntry::Marketplace(mp), Write::Insert)?;
            Ok(id)
        })
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// Loads an app by `(name, owner uid)`.
    pub fn get_app(&self, name: &str, uid: i64) -> PoolResult<App> {
        self.with_read(|store| {
            let record = fetch_by_name(store, EntryKind::App, name, uid)?.ok_or_else(|| {
                PoolError::NotFound {
                    kind: EntryKind::App,
                    key: format!("name `{name}` uid {uid}"),
                }
            })?;
            codec::decode_app(&record.body).map_err(PoolError::Decode)
        })
    }

    pub fn get_app_by_id(&self, id: EntryId) -> PoolResult<App> {
        self.with_read(|store| load_app(store, id))
    }

    /// Loads a marketplace by name. Marketplace names are global.
    pub fn get_marketplace(&self, name: &str) -> PoolResult<Marketplace> {
        self.with_read(|store| {
            let record = fetch_by_name(store, EntryKind::Marketplace, name, UNALLOCATED_ID)?
                .ok_or_else(|| PoolError::NotFound {
                    kind: EntryKind::Marketplace,
                    key: format!("name `{name}`"),
                })?;
            codec::decode_marketplace(&record.body).map_err(PoolError::Decode)
        })
    }

    pub fn get_marketplace_by_id(&self, id: EntryId) -> PoolResult<Marketplace> {
        self.with_read(|store| load_marketplace(store, id))
    }

    /// Returns the stored canonical text for an entry, if present.
    pub fn stored_body(&self, kind: EntryKind, id: EntryId) -> PoolResult<Option<String>> {
        self.with_read(|store| {
            Ok(store
                .fetch_by_id(kind.spec().table, id)?
                .map(|record| record.body))
        })
    }

    // ---------------------------------------------------------------------
    // Update
    // ---------------------------------------------------------------------

    /// Replaces the stored app record with `app` (full overwrite).
    ///
    /// `created_at` and the marketplace back-reference are kept from the
    /// stored record. A new name must pass the name rule, and the state can
    /// only change through [`ObjectPool::complete_app`] and
    /// [`ObjectPool::relock_app`].
    pub fn update_app(&self, app: &App) -> PoolResult<()> {
        let started_at = Instant::now();
        let result = self.ensure_write_authority("update_app").and_then(|()| {
            self.with_write(|store| {
                let stored = load_app(store, app.id)?;
                if app.name != stored.name {
                    validate_name(&app.name).map_err(PoolError::InvalidName)?;
                }
                if app.state != stored.state {
                    return Err(PoolError::InvalidState {
                        id: app.id,
                        source: StateTransitionError {
                            from: stored.state,
                            to: app.state,
                        },
                    });
                }

                let mut next = app.clone();
                next.created_at = stored.created_at;
                next.marketplace_id = stored.marketplace_id;
                next.marketplace_name = stored.marketplace_name;
                persist(store, &CatalogEntry::App(next), Write::Replace)
            })
        });
        log_outcome("app_update", started_at, &result);
        result
    }

    /// Replaces the stored marketplace record with `mp` (full overwrite).
    ///
    /// Members are kept from the stored record; they change only through
    /// allocation, membership operations and app drops.
    pub fn update_marketplace(&self, mp: &Marketplace) -> PoolResult<()> {
        let started_at = Instant::now();
        let result = self
            .ensure_write_authority("update_marketplace")
            .and_then(|()| {
                self.with_write(|store| {
                    let stored = load_marketplace(store, mp.id)?;
                    if mp.name != stored.name {
                        validate_name(&mp.name).map_err(PoolError::InvalidName)?;
                    }

                    let mut next = mp.clone();
                    next.members = stored.members;
                    persist(store, &CatalogEntry::Marketplace(next), Write::Replace)
                })
            });
        log_outcome("marketplace_update", started_at, &result);
        result
    }

    /// Replaces an app's attributes and resyncs the fields derived from them.
    pub fn update_app_template(&self, id: EntryId, attributes: AttributeBag) -> PoolResult<App> {
        let started_at = Instant::now();
        let result = self
            .ensure_write_authority("update_app_template")
            .and_then(|()| {
                self.with_write(|store| {
                    let mut app = load_app(store, id)?;
                    app.replace_attributes(attributes);
                    persist(store, &CatalogEntry::App(app.clone()), Write::Replace)?;
                    Ok(app)
                })
            });
        log_outcome("app_update_template", started_at, &result);
        result
    }

    /// Applies the post-allocation outcome: `LOCKED -> READY | ERROR`.
    pub fn complete_app(&self, id: EntryId, completion: Completion) -> PoolResult<AppState> {
        let started_at = Instant::now();
        let result = self.ensure_write_authority("complete_app").and_then(|()| {
            self.with_write(|store| {
                let mut app = load_app(store, id)?;
                let transition = match &completion {
                    Completion::Succeeded => app.mark_ready(),
                    Completion::Failed(reason) => app.mark_error(reason),
                };
                transition.map_err(|source| PoolError::InvalidState { id, source })?;
                let state = app.state;
                persist(store, &CatalogEntry::App(app), Write::Replace)?;
                Ok(state)
            })
        });
        log_outcome("app_complete", started_at, &result);
        result
    }

    /// Starts a new operation cycle on a `READY` or `ERROR` app.
    pub fn relock_app(&self, id: EntryId) -> PoolResult<()> {
        let started_at = Instant::now();
        let result = self.ensure_write_authority("relock_app").and_then(|()| {
            self.with_write(|store| {
                let mut app = load_app(store, id)?;
                app.relock()
                    .map_err(|source| PoolError::InvalidState { id, source })?;
                persist(store, &CatalogEntry::App(app), Write::Replace)
            })
        });
        log_outcome("app_relock", started_at, &result);
        result
    }

    // ---------------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------------

    /// Lists an app in a marketplace, moving it out of any previous one.
    pub fn add_app_to_marketplace(&self, mp_id: EntryId, app_id: EntryId) -> PoolResult<()> {
        let started_at = Instant::now();
        let result = self
            .ensure_write_authority("add_app_to_marketplace")
            .and_then(|()| {
                self.with_write(|store| {
                    let mut mp = load_marketplace(store, mp_id)?;
                    let mut app = load_app(store, app_id)?;

                    if app.marketplace_id != UNALLOCATED_ID && app.marketplace_id != mp_id {
                        detach_from_marketplace(store, app.marketplace_id, app_id)?;
                    }

                    app.marketplace_id = mp.id;
                    app.marketplace_name = mp.name.clone();
                    persist(store, &CatalogEntry::App(app), Write::Replace)?;

                    if mp.add_member(app_id) {
                        persist(store, &CatalogEntry::Marketplace(mp), Write::Replace)?;
                    }
                    Ok(())
                })
            });
        log_outcome("marketplace_add_app", started_at, &result);
        result
    }

    /// Removes an app id from a marketplace. The app record itself stays;
    /// only its back-reference is cleared. Returns `false` when the id was
    /// not listed.
    pub fn remove_app_from_marketplace(&self, mp_id: EntryId, app_id: EntryId) -> PoolResult<bool> {
        let started_at = Instant::now();
        let result = self
            .ensure_write_authority("remove_app_from_marketplace")
            .and_then(|()| {
                self.with_write(|store| {
                    let removed = detach_from_marketplace(store, mp_id, app_id)?;

                    if let Some(record) = store.fetch_by_id(EntryKind::App.spec().table, app_id)? {
                        let mut app = codec::decode_app(&record.body).map_err(PoolError::Decode)?;
                        if app.marketplace_id == mp_id {
                            app.marketplace_id = UNALLOCATED_ID;
                            app.marketplace_name.clear();
                            persist(store, &CatalogEntry::App(app), Write::Replace)?;
                        }
                    }
                    Ok(removed)
                })
            });
        log_outcome("marketplace_remove_app", started_at, &result);
        result
    }

    // ---------------------------------------------------------------------
    // Drop
    // ---------------------------------------------------------------------

    /// Deletes an app and unlists it from its marketplace.
    pub fn drop_app(&self, app: &App) -> PoolResult<()> {
        let started_at = Instant::now();
        let result = self.ensure_write_authority("drop_app").and_then(|()| {
            self.with_write(|store| {
                let stored = load_app(store, app.id)?;
                if stored.marketplace_id != UNALLOCATED_ID {
                    detach_from_marketplace(store, stored.marketplace_id, stored.id)?;
                }
                delete(store, EntryKind::App, stored.id)
            })
        });
        log_outcome("app_drop", started_at, &result);
        result
    }

    /// Deletes an empty marketplace.
    ///
    /// Fails with `NotEmpty` when `mp` lists apps, before touching the store,
    /// and again if the stored record lists apps when the delete runs.
    pub fn drop_marketplace(&self, mp: &Marketplace) -> PoolResult<()> {
        let started_at = Instant::now();
        let result = self
            .ensure_write_authority("drop_marketplace")
            .and_then(|()| ensure_empty(mp))
            .and_then(|()| {
                self.with_write(|store| {
                    let stored = load_marketplace(store, mp.id)?;
                    ensure_empty(&stored)?;
                    delete(store, EntryKind::Marketplace, stored.id)
                })
            });
        log_outcome("marketplace_drop", started_at, &result);
        result
    }

    // ---------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------

    fn ensure_write_authority(&self, operation: &'static str) -> PoolResult<()> {
        if self.config.write_authority {
            return Ok(());
        }
        Err(PoolError::NotAuthority { operation })
    }

    fn with_read<T, F>(&self, op: F) -> PoolResult<T>
    where
        F: FnOnce(&SqliteRecordStore<'_>) -> PoolResult<T>,
    {
        let conn = self.conn.lock();
        let store = SqliteRecordStore::new(&conn);
        op(&store)
    }

    fn with_write<T, F>(&self, op: F) -> PoolResult<T>
    where
        F: FnOnce(&SqliteRecordStore<'_>) -> PoolResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = {
            let store = SqliteRecordStore::new(&tx);
            op(&store)?
        };
        tx.commit()?;
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Write {
    Insert,
    Replace,
}

/// Encodes, validates and writes one entry. Nothing reaches the store when
/// validation fails.
fn persist(store: &impl RecordStore, entry: &CatalogEntry, write: Write) -> PoolResult<()> {
    let kind = entry.kind();
    let spec = kind.spec();
    let body = codec::encode(entry);
    codec::validate_document(kind, &body).map_err(PoolError::Validation)?;

    let permissions = entry.permissions();
    let record = StoredRecord {
        oid: entry.id(),
        name: entry.name().to_string(),
        body,
        uid: entry.owner().uid,
        gid: entry.owner().gid,
        owner_u: i64::from(permissions.owner_u),
        group_u: i64::from(permissions.group_u),
        other_u: i64::from(permissions.other_u),
    };

    let outcome = match write {
        Write::Insert => store.insert(spec.table, &record).map(|()| 1),
        Write::Replace => store.replace(spec.table, &record),
    };

    match outcome {
        Ok(0) => Err(PoolError::NotFound {
            kind,
            key: format!("id {}", record.oid),
        }),
        Ok(_) => Ok(()),
        Err(StoreError::UniqueViolation { .. }) => {
            let existing_id = fetch_by_name(store, kind, &record.name, record.uid)?
                .map_or(UNALLOCATED_ID, |existing| existing.oid);
            Err(PoolError::DuplicateName {
                kind,
                name: record.name,
                existing_id,
            })
        }
        Err(err) => Err(err.into()),
    }
}

fn delete(store: &impl RecordStore, kind: EntryKind, id: EntryId) -> PoolResult<()> {
    if store.delete(kind.spec().table, id)? == 0 {
        return Err(PoolError::NotFound {
            kind,
            key: format!("id {id}"),
        });
    }
    debug!("event=entry_delete module=pool status=ok kind={} id={}", kind.as_str(), id);
    Ok(())
}

fn fetch_by_name(
    store: &impl RecordStore,
    kind: EntryKind,
    name: &str,
    uid: i64,
) -> StoreResult<Option<StoredRecord>> {
    let scope = match kind.spec().name_scope {
        NameScope::PerOwner => Some(uid),
        NameScope::Global => None,
    };
    store.fetch_by_name(kind.spec().table, name, scope)
}

fn ensure_name_free(
    store: &impl RecordStore,
    kind: EntryKind,
    name: &str,
    uid: i64,
) -> PoolResult<()> {
    match fetch_by_name(store, kind, name, uid)? {
        Some(existing) => Err(PoolError::DuplicateName {
            kind,
            name: name.to_string(),
            existing_id: existing.oid,
        }),
        None => Ok(()),
    }
}

fn ensure_empty(mp: &Marketplace) -> PoolResult<()> {
    if mp.has_members() {
        return Err(PoolError::NotEmpty { id: mp.id });
    }
    Ok(())
}

fn load_app(store: &impl RecordStore, id: EntryId) -> PoolResult<App> {
    let record = store
        .fetch_by_id(EntryKind::App.spec().table, id)?
        .ok_or_else(|| PoolError::NotFound {
            kind: EntryKind::App,
            key: format!("id {id}"),
        })?;
    codec::decode_app(&record.body).map_err(PoolError::Decode)
}

fn load_marketplace(store: &impl RecordStore, id: EntryId) -> PoolResult<Marketplace> {
    let record = store
        .fetch_by_id(EntryKind::Marketplace.spec().table, id)?
        .ok_or_else(|| PoolError::NotFound {
            kind: EntryKind::Marketplace,
            key: format!("id {id}"),
        })?;
    codec::decode_marketplace(&record.body).map_err(PoolError::Decode)
}

/// Removes `app_id` from marketplace `mp_id` if both the marketplace and the
/// membership exist. Returns whether a membership was removed.
fn detach_from_marketplace(
    store: &impl RecordStore,
    mp_id: EntryId,
    app_id: EntryId,
) -> PoolResult<bool> {
    let Some(record) = store.fetch_by_id(EntryKind::Marketplace.spec().table, mp_id)? else {
        warn!(
            "event=marketplace_detach module=pool status=skipped marketplace_id={} app_id={} reason=marketplace_missing",
            mp_id, app_id
        );
        return Ok(false);
    };
    let mut mp = codec::decode_marketplace(&record.body).map_err(PoolError::Decode)?;
    if !mp.remove_member(app_id) {
        return Ok(false);
    }
    persist(store, &CatalogEntry::Marketplace(mp), Write::Replace)?;
    Ok(true)
}

fn now_epoch_secs() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
        .to_string()
}

fn log_outcome<T>(event: &str, started_at: Instant, result: &PoolResult<T>) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!("event={event} module=pool status=ok duration_ms={duration_ms}"),
        Err(err @ (PoolError::Store(_) | PoolError::Decode(_))) => error!(
            "event={event} module=pool status=error duration_ms={duration_ms} error={err}"
        ),
        Err(err) => warn!(
            "event={event} module=pool status=error duration_ms={duration_ms} error={err}"
        ),
    }
}
