//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define line-level data access contracts over `category` / `content`.
//! - Isolate SQLite query details from document orchestration.
//!
//! # Invariants
//! - Repositories are scoped to one subject and never cross it.
//! - Repository APIs report missing rows as zero affected rows, and transport
//!   failures as `RepoError`.

pub mod heading;
pub mod line_repo;
pub mod subject_repo;
