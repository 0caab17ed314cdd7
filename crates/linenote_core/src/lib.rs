//! Core outline synchronization engine for LineNote.
//! This crate is the single source of truth for line/category invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::line::{
    CategoryId, ContentChange, KindTransition, Line, LineId, LineKind, LineSnapshot, SubjectId,
    TextId, DEFAULT_CATEGORY_ID,
};
pub use model::outline::{Category, CategoryNode, ContentRow, OutlineRow, Subject};
pub use repo::heading::{
    classify_line, extract_heading_text, is_category_heading, is_markdown_heading,
    markdown_heading_level,
};
pub use repo::line_repo::{LineRepository, RepoError, RepoResult, SqliteLineRepository};
pub use repo::subject_repo::{SqliteSubjectRepository, SubjectRepository};
pub use service::document::{
    DocumentConfig, DocumentError, DocumentEvent, DocumentResult, HeadingOutlineEntry,
    OutlineDocument, PollOutcome,
};
pub use service::loader::{load_category_tree, load_document, load_document_with_clock};
pub use service::save::SaveReport;
pub use service::scheduler::{AutosaveConfig, Clock, ManualClock, SystemClock};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
