//! Entry kinds and the per-kind persistence table.
//!
//! One pool implementation serves every kind; the differences (table,
//! record root tag, name scope, required fields) live in [`KindSpec`].

use crate::model::app::App;
use crate::model::marketplace::Marketplace;
use crate::model::owner::Owner;
use crate::model::permissions::Permissions;
use crate::model::EntryId;
use std::fmt::{Display, Formatter};

/// Scope in which entry names must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    /// Unique per `(name, owner uid)`.
    PerOwner,
    /// Unique across all owners.
    Global,
}

/// Persistence description of one entry kind.
#[derive(Debug)]
pub struct KindSpec {
    pub kind: EntryKind,
    pub table: &'static str,
    pub root_tag: &'static str,
    pub name_scope: NameScope,
    /// Top-level children every stored record must carry.
    pub required_fields: &'static [&'static str],
}

/// Supported catalog entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    App,
    Marketplace,
}

const APP_SPEC: KindSpec = KindSpec {
    kind: EntryKind::App,
    table: "marketplaceapp_pool",
    root_tag: "MARKETPLACEAPP",
    name_scope: NameScope::PerOwner,
    required_fields: &[
        "ID",
        "UID",
        "GID",
        "UNAME",
        "GNAME",
        "DATE",
        "NAME",
        "ORIGIN",
        "SOURCE",
        "CHECKSUM",
        "SIZE",
        "DESCRIPTION",
        "PUBLISHER",
        "VERSION",
        "APPTEMPLATE64",
        "MARKETPLACE_ID",
        "MARKETPLACE",
        "STATE",
        "PERMISSIONS",
        "TEMPLATE",
    ],
};

const MARKETPLACE_SPEC: KindSpec = KindSpec {
    kind: EntryKind::Marketplace,
    table: "marketplace_pool",
    root_tag: "MARKETPLACE",
    name_scope: NameScope::Global,
    required_fields: &[
        "ID",
        "UID",
        "GID",
        "UNAME",
        "GNAME",
        "NAME",
        "MARKET_MAD",
        "DESCRIPTION",
        "PERMISSIONS",
        "MARKETPLACEAPPS",
        "TEMPLATE",
    ],
};

impl EntryKind {
    pub fn spec(self) -> &'static KindSpec {
        match self {
            Self::App => &APP_SPEC,
            Self::Marketplace => &MARKETPLACE_SPEC,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "marketplace app",
            Self::Marketplace => "marketplace",
        }
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any catalog entry, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    App(App),
    Marketplace(Marketplace),
}

impl CatalogEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::App(_) => EntryKind::App,
            Self::Marketplace(_) => EntryKind::Marketplace,
        }
    }

    pub fn id(&self) -> EntryId {
        match self {
            Self::App(app) => app.id,
            Self::Marketplace(mp) => mp.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::App(app) => &app.name,
            Self::Marketplace(mp) => &mp.name,
        }
    }

    pub fn owner(&self) -> &Owner {
        match self {
            Self::App(app) => &app.owner,
            Self::Marketplace(mp) => &mp.owner,
        }
    }

    pub fn permissions(&self) -> &Permissions {
        match self {
            Self::App(app) => &app.permissions,
            Self::Marketplace(mp) => &mp.permissions,
        }
    }
}

impl From<App> for CatalogEntry {
    fn from(value: App) -> Self {
        Self::App(value)
    }
}

impl From<Marketplace> for CatalogEntry {
    fn from(value: Marketplace) -> Self {
        Self::Marketplace(value)
    }
}
