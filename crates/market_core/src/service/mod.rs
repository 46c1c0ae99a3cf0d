//! Catalog use-case services.
//!
//! # Responsibility
//! - Orchestrate codec and record store calls into allocate/get/update/drop.
//! - Keep callers decoupled from SQL and record layout details.

pub mod object_pool;
