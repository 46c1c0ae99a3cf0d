//! Record store contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the row-level store contract consumed by the object pools.
//! - Isolate SQLite statement details from pool orchestration.
//!
//! # Invariants
//! - Every write is a full-row insert or replace keyed by `oid`.
//! - Statements are parameterized; values are never spliced into SQL text.

pub mod record_store;
