//! Line entity: one editable line of an outline document.
//!
//! # Responsibility
//! - Hold one line's content, identity and dirty state.
//! - Classify content changes into the `PlainText` / `CategoryHeading`
//!   state machine and report transitions to the owning document.
//!
//! # Invariants
//! - A heading keeps its `category_id` across edits that keep it a heading.
//! - Becoming a heading discards `text_id`; becoming text discards
//!   `category_id` ownership. Both are reported, never silently dropped.
//! - Every mutation marks the line dirty.

use crate::repo::heading::classify_line;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable in-memory handle of a line. Independent of position.
pub type LineId = Uuid;
/// Persisted subject id.
pub type SubjectId = i64;
/// Persisted category id (`category.category_id`).
pub type CategoryId = i64;
/// Persisted content id (`content.text_id`).
pub type TextId = i64;

/// Id value of rows that do not exist yet.
pub const UNASSIGNED_ID: i64 = 0;
/// Default category id of the first subject created in a fresh store.
pub const DEFAULT_CATEGORY_ID: CategoryId = 1;
pub const MIN_HEADING_LEVEL: u8 = 1;
pub const MAX_HEADING_LEVEL: u8 = 6;

/// Heading classification of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineKind {
    /// Stored as a `content` row.
    PlainText,
    /// Stored as a `category` row owning the text lines that follow it.
    CategoryHeading { level: u8 },
}

impl LineKind {
    pub fn is_heading(self) -> bool {
        matches!(self, Self::CategoryHeading { .. })
    }

    pub fn level(self) -> Option<u8> {
        match self {
            Self::PlainText => None,
            Self::CategoryHeading { level } => Some(level),
        }
    }
}

/// Kind change caused by a content edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindTransition {
    /// Text became a heading. The old content row (if any) must be deleted.
    BecameHeading { discarded_text_id: TextId },
    /// Heading became text. The old category (if any) must be dissolved.
    BecameText { former_category_id: CategoryId },
}

/// Outcome of [`Line::set_content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentChange {
    Unchanged,
    Edited,
    Transitioned(KindTransition),
}

/// Editable surrogate for either a category row or a content row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    id: LineId,
    content: String,
    kind: LineKind,
    category_id: CategoryId,
    text_id: TextId,
    display_order: i64,
    is_dirty: bool,
}

impl Line {
    /// Creates a fresh empty text line. New lines are dirty so the next flush
    /// reserves their row and display order.
    pub fn new_empty(category_id: CategoryId, display_order: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: String::new(),
            kind: LineKind::PlainText,
            category_id,
            text_id: UNASSIGNED_ID,
            display_order,
            is_dirty: true,
        }
    }

    /// Builds a clean heading line from a persisted category row.
    pub fn persisted_heading(
        category_id: CategoryId,
        title: impl Into<String>,
        level: u8,
        display_order: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: title.into(),
            kind: LineKind::CategoryHeading {
                level: level.clamp(MIN_HEADING_LEVEL, MAX_HEADING_LEVEL),
            },
            category_id,
            text_id: UNASSIGNED_ID,
            display_order,
            is_dirty: false,
        }
    }

    /// Builds a clean text line from a persisted content row.
    pub fn persisted_text(
        text_id: TextId,
        category_id: CategoryId,
        content: impl Into<String>,
        display_order: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            kind: LineKind::PlainText,
            category_id,
            text_id,
            display_order,
            is_dirty: false,
        }
    }

    pub fn id(&self) -> LineId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> LineKind {
        self.kind
    }

    pub fn is_heading_line(&self) -> bool {
        self.kind.is_heading()
    }

    /// Heading depth; `0` for text lines.
    pub fn level(&self) -> u8 {
        self.kind.level().unwrap_or(0)
    }

    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    pub fn text_id(&self) -> TextId {
        self.text_id
    }

    pub fn display_order(&self) -> i64 {
        self.display_order
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Whether this line has a backing row.
    pub fn is_persisted(&self) -> bool {
        match self.kind {
            LineKind::PlainText => self.text_id > UNASSIGNED_ID,
            LineKind::CategoryHeading { .. } => self.category_id > UNASSIGNED_ID,
        }
    }

    /// Replaces content and re-classifies the line.
    ///
    /// Transitions reset identity as follows:
    /// - text -> heading: `text_id = 0`, `category_id = 0`, level 1.
    /// - heading -> text: `text_id = 0`; `category_id` keeps the former
    ///   category until the document resolves the new owner.
    pub fn set_content(&mut self, text: &str) -> ContentChange {
        let normalized = normalize_line_text(text);
        if normalized == self.content {
            return ContentChange::Unchanged;
        }
        self.content = normalized;
        self.is_dirty = true;

        match (self.kind, classify_line(&self.content)) {
            (LineKind::PlainText, LineKind::CategoryHeading { level }) => {
                let discarded_text_id = self.text_id;
                self.kind = LineKind::CategoryHeading { level };
                self.text_id = UNASSIGNED_ID;
                self.category_id = UNASSIGNED_ID;
                ContentChange::Transitioned(KindTransition::BecameHeading { discarded_text_id })
            }
            (LineKind::CategoryHeading { .. }, LineKind::PlainText) => {
                let former_category_id = self.category_id;
                self.kind = LineKind::PlainText;
                self.text_id = UNASSIGNED_ID;
                ContentChange::Transitioned(KindTransition::BecameText { former_category_id })
            }
            _ => ContentChange::Edited,
        }
    }

    /// Changes heading depth. Identity is untouched; returns `false` for text
    /// lines or when the level is unchanged.
    pub(crate) fn set_level(&mut self, level: u8) -> bool {
        match self.kind {
            LineKind::CategoryHeading { level: current } if current != level => {
                self.kind = LineKind::CategoryHeading { level };
                self.is_dirty = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn assign_category_id(&mut self, category_id: CategoryId) {
        if self.category_id != category_id {
            self.category_id = category_id;
            self.is_dirty = true;
        }
    }

    /// Re-points a text line without scheduling a write. Used when the store
    /// was already updated by a bulk reassignment.
    pub(crate) fn sync_category_id(&mut self, category_id: CategoryId) {
        self.category_id = category_id;
    }

    pub(crate) fn record_persisted_text_id(&mut self, text_id: TextId) {
        self.text_id = text_id;
    }

    pub(crate) fn record_persisted_category_id(&mut self, category_id: CategoryId) {
        self.category_id = category_id;
    }

    pub(crate) fn shift_display_order(&mut self, delta: i64) {
        self.display_order += delta;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub(crate) fn forget_text_id(&mut self) {
        self.text_id = UNASSIGNED_ID;
    }

    pub(crate) fn forget_category_id(&mut self) {
        self.category_id = UNASSIGNED_ID;
    }

    pub fn snapshot(&self) -> LineSnapshot {
        LineSnapshot {
            id: self.id,
            content: self.content.clone(),
            kind: self.kind,
            category_id: self.category_id,
            text_id: self.text_id,
            display_order: self.display_order,
        }
    }

    /// Rebuilds a line from history. Restored lines are always dirty.
    pub(crate) fn from_snapshot(snapshot: &LineSnapshot) -> Self {
        Self {
            id: snapshot.id,
            content: snapshot.content.clone(),
            kind: snapshot.kind,
            category_id: snapshot.category_id,
            text_id: snapshot.text_id,
            display_order: snapshot.display_order,
            is_dirty: true,
        }
    }
}

/// Immutable copy of a line's persisted-relevant state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub id: LineId,
    pub content: String,
    pub kind: LineKind,
    pub category_id: CategoryId,
    pub text_id: TextId,
    pub display_order: i64,
}

/// Strips line breaks; one line never spans several rows.
pub fn normalize_line_text(text: &str) -> String {
    text.replace(['\r', '\n'], "")
}
