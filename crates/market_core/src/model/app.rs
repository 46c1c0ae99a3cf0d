//! Marketplace app (catalog entry) model.
//!
//! # Responsibility
//! - Hold the persisted fields of one importable application.
//! - Own the app state machine and the allocation/update attribute rules.
//!
//! # Invariants
//! - `INIT` is left only through [`App::prepare_insert`].
//! - `READY` and `ERROR` are reached only from `LOCKED`.
//! - `created_at` is written once by `prepare_insert` and never again.

use crate::model::attributes::AttributeBag;
use crate::model::owner::Owner;
use crate::model::permissions::Permissions;
use crate::model::{EntryId, UNALLOCATED_ID};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Attributes the pool manages itself; caller-provided values are dropped
/// at allocation time.
pub const POOL_MANAGED_ATTRIBUTES: &[&str] = &["ORIGIN", "SOURCE", "SIZE", "CHECKSUM"];

/// Attribute carrying the failure reason after `LOCKED -> ERROR`.
pub const ERROR_ATTRIBUTE: &str = "ERROR";

/// App lifecycle state. The discriminant is the persisted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    /// Constructed in memory, not allocated yet.
    Init = 0,
    /// Usable.
    Ready = 1,
    /// An operation (allocation, export) is in progress.
    Locked = 2,
    /// The last operation failed.
    Error = 3,
}

impl AppState {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Init),
            1 => Some(Self::Ready),
            2 => Some(Self::Locked),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Ready => "READY",
            Self::Locked => "LOCKED",
            Self::Error => "ERROR",
        }
    }
}

impl Display for AppState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransitionError {
    pub from: AppState,
    pub to: AppState,
}

impl Display for StateTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "app state cannot change from {} to {}", self.from, self.to)
    }
}

impl Error for StateTransitionError {}

/// One marketplace app record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: EntryId,
    pub name: String,
    pub owner: Owner,
    pub permissions: Permissions,
    /// Allocation time, epoch seconds.
    pub created_at: String,
    pub origin: String,
    pub source: String,
    pub checksum: String,
    pub size_mb: i64,
    pub description: String,
    pub publisher: String,
    pub version: String,
    /// Base64 template used to import the app.
    pub apptemplate64: String,
    /// Marketplace holding this app, `-1` when unset.
    pub marketplace_id: EntryId,
    pub marketplace_name: String,
    pub state: AppState,
    pub attributes: AttributeBag,
}

impl App {
    /// Creates an unallocated app owned by `owner`.
    pub fn new(owner: Owner, umask: u32, attributes: AttributeBag) -> Self {
        Self {
            id: UNALLOCATED_ID,
            name: String::new(),
            owner,
            permissions: Permissions::from_umask(umask),
            created_at: String::new(),
            origin: String::new(),
            source: String::new(),
            checksum: String::new(),
            size_mb: 0,
            description: String::new(),
            publisher: String::new(),
            version: String::new(),
            apptemplate64: String::new(),
            marketplace_id: UNALLOCATED_ID,
            marketplace_name: String::new(),
            state: AppState::Init,
            attributes,
        }
    }

    /// Applies the allocation rules and enters `LOCKED`.
    ///
    /// Moves `NAME` out of the attributes, drops pool-managed attributes,
    /// stamps `created_at`, and resolves description, payload, publisher
    /// (defaulting to the owner name) and version.
    pub fn prepare_insert(
        &mut self,
        created_at: impl Into<String>,
    ) -> Result<(), StateTransitionError> {
        if self.state != AppState::Init {
            return Err(StateTransitionError {
                from: self.state,
                to: AppState::Locked,
            });
        }

        if let Some(name) = self.attributes.remove("NAME") {
            self.name = name;
        }
        for key in POOL_MANAGED_ATTRIBUTES {
            self.attributes.remove(key);
        }

        self.created_at = created_at.into();
        self.description = self.attributes.get_or_empty("DESCRIPTION");
        self.apptemplate64 = self.attributes.get_or_empty("APPTEMPLATE64");

        self.publisher = match self.attributes.get("PUBLISHER") {
            Some(publisher) if !publisher.is_empty() => publisher.to_string(),
            _ => self.owner.uname.clone(),
        };

        if let Some(version) = self.attributes.get("VERSION").filter(|v| !v.is_empty()) {
            self.version = version.to_string();
        }

        self.state = AppState::Locked;
        Ok(())
    }

    /// Replaces the attribute bag and resyncs the well-known fields from it.
    pub fn replace_attributes(&mut self, attributes: AttributeBag) {
        self.attributes = attributes;
        self.sync_from_attributes();
    }

    /// Resyncs description, payload, publisher and version from attributes.
    pub fn sync_from_attributes(&mut self) {
        self.description = self.attributes.get_or_empty("DESCRIPTION");
        self.apptemplate64 = self.attributes.get_or_empty("APPTEMPLATE64");
        self.publisher = self.attributes.get_or_empty("PUBLISHER");
        self.version = self.attributes.get_or_empty("VERSION");
    }

    /// `LOCKED -> READY`.
    pub fn mark_ready(&mut self) -> Result<(), StateTransitionError> {
        self.transition(AppState::Locked, AppState::Ready)?;
        self.attributes.remove(ERROR_ATTRIBUTE);
        Ok(())
    }

    /// `LOCKED -> ERROR`, recording `reason` in the `ERROR` attribute.
    pub fn mark_error(&mut self, reason: &str) -> Result<(), StateTransitionError> {
        self.transition(AppState::Locked, AppState::Error)?;
        self.attributes.set(ERROR_ATTRIBUTE, reason);
        Ok(())
    }

    /// `READY | ERROR -> LOCKED`, starting a new operation cycle.
    pub fn relock(&mut self) -> Result<(), StateTransitionError> {
        match self.state {
            AppState::Ready | AppState::Error => {
                self.state = AppState::Locked;
                Ok(())
            }
            from => Err(StateTransitionError {
                from,
                to: AppState::Locked,
            }),
        }
    }

    fn transition(&mut self, from: AppState, to: AppState) -> Result<(), StateTransitionError> {
        if self.state != from {
            return Err(StateTransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
