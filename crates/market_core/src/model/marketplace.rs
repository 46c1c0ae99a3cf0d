//! Marketplace (container entry) model.
//!
//! # Invariants
//! - `members` references apps by id only; removing an id never touches the
//!   app record itself.
//! - A marketplace with members cannot be dropped (enforced by the pool).

use crate::model::attributes::AttributeBag;
use crate::model::owner::Owner;
use crate::model::permissions::Permissions;
use crate::model::{EntryId, UNALLOCATED_ID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Driver used when `MARKET_MAD` is not provided.
pub const DEFAULT_MARKET_MAD: &str = "http";

/// One marketplace record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marketplace {
    pub id: EntryId,
    pub name: String,
    pub owner: Owner,
    pub permissions: Permissions,
    pub description: String,
    /// Driver handling exports to this marketplace.
    pub market_mad: String,
    /// Ids of apps currently listed in this marketplace.
    pub members: BTreeSet<EntryId>,
    pub attributes: AttributeBag,
}

impl Marketplace {
    pub fn new(owner: Owner, umask: u32, attributes: AttributeBag) -> Self {
        Self {
            id: UNALLOCATED_ID,
            name: String::new(),
            owner,
            permissions: Permissions::from_umask(umask),
            description: String::new(),
            market_mad: String::new(),
            members: BTreeSet::new(),
            attributes,
        }
    }

    /// Moves `NAME` out of the attributes and resolves driver and description.
    pub fn prepare_insert(&mut self) {
        if let Some(name) = self.attributes.remove("NAME") {
            self.name = name;
        }

        self.market_mad = self.attributes.get_or_empty("MARKET_MAD");
        if self.market_mad.is_empty() {
            self.market_mad = DEFAULT_MARKET_MAD.to_string();
            self.attributes.set("MARKET_MAD", DEFAULT_MARKET_MAD);
        }
        self.description = self.attributes.get_or_empty("DESCRIPTION");
    }

    /// Adds an app id. Returns `false` when it was already a member.
    pub fn add_member(&mut self, app_id: EntryId) -> bool {
        self.members.insert(app_id)
    }

    /// Removes an app id. Returns `false` when it was not a member.
    pub fn remove_member(&mut self, app_id: EntryId) -> bool {
        self.members.remove(&app_id)
    }

    pub fn has_members(&self) -> bool {
        !self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Marketplace, DEFAULT_MARKET_MAD};
    use crate::model::owner::Owner;
    use crate::model::permissions::DEFAULT_UMASK;

    #[test]
    fn prepare_insert_defaults_driver() {
        let mut mp = Marketplace::new(
            Owner::new(0, 0, "oneadmin", "oneadmin"),
            DEFAULT_UMASK,
            [("NAME", "Acme Public")].into_iter().collect(),
        );
        mp.prepare_insert();

        assert_eq!(mp.name, "Acme Public");
        assert_eq!(mp.market_mad, DEFAULT_MARKET_MAD);
        assert_eq!(mp.attributes.get("MARKET_MAD"), Some(DEFAULT_MARKET_MAD));
        assert!(!mp.attributes.contains("NAME"));
    }

    #[test]
    fn membership_is_a_set() {
        let mut mp = Marketplace::new(
            Owner::new(0, 0, "oneadmin", "oneadmin"),
            DEFAULT_UMASK,
            Default::default(),
        );
        assert!(mp.add_member(4));
        assert!(!mp.add_member(4));
        assert!(mp.has_members());
        assert!(mp.remove_member(4));
        assert!(!mp.remove_member(4));
        assert!(!mp.has_members());
    }
}
