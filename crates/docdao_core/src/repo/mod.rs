//! Repository layer: generic CRUD over one collection plus a typed view.
//!
//! # Invariants
//! - Repositories hold no per-record state; every call goes to the driver.
//! - `NotFound` is a dedicated error case, distinct from driver failures.

pub mod generic_repo;
pub mod typed_repo;
