//! Domain model for outline documents.
//!
//! # Responsibility
//! - Define the editable line entity and its heading/text state machine.
//! - Define the persisted subject/category/content row shapes.
//!
//! # Invariants
//! - A line's heading state and level live in one tagged `LineKind`.
//! - Id value `0` always means "not persisted yet".

pub mod line;
pub mod outline;
