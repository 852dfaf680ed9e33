//! Domain records for the catalog and per-user state.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep serialization shapes aligned with the persisted records.
//!
//! # Invariants
//! - Catalog records are validated once and never mutated.
//! - A user's mutable state lives in exactly one `UserProfile`.

pub mod book;
pub mod profile;
