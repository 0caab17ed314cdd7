//! Outline document services.
//!
//! # Responsibility
//! - Orchestrate line repository calls into document-level edits and saves.
//! - Keep presentation layers decoupled from storage details.

pub mod document;
pub(crate) mod history;
pub mod loader;
pub mod save;
pub mod scheduler;
