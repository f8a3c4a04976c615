//! Record, key, descriptor and filter types shared by every layer.
//!
//! # Invariants
//! - Records are schema-less; entity-specific typing lives in
//!   `repo::typed_repo`.

pub mod descriptor;
pub mod document;
pub mod filter;
