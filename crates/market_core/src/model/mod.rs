//! Catalog domain model.
//!
//! # Responsibility
//! - Define the entities persisted by the object pools (apps, marketplaces).
//! - Own the identity, ownership and permission fields shared by all entries.
//!
//! # Invariants
//! - An entry id is `-1` until the pool allocates it, and never changes after.
//! - Attribute keys are always stored upper case.

pub mod app;
pub mod attributes;
pub mod entry;
pub mod marketplace;
pub mod name;
pub mod owner;
pub mod permissions;

/// Integer identifier assigned by a pool at allocation time.
pub type EntryId = i64;

/// Identifier value carried by entries that were never allocated.
pub const UNALLOCATED_ID: EntryId = -1;
