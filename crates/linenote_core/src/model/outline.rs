//! Persisted row models: subjects, categories and content rows.

use crate::model::line::{CategoryId, SubjectId, TextId};
use serde::{Deserialize, Serialize};

/// Top-level scope every category and content row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: SubjectId,
    pub title: String,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// One `category` row. Level `0` marks the subject's default category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: CategoryId,
    /// Raw heading text, markdown marker retained.
    pub title: String,
    pub subject_id: SubjectId,
    pub parent_category_id: Option<CategoryId>,
    pub level: u8,
    pub display_order: i64,
}

impl Category {
    pub fn is_default(&self) -> bool {
        self.level == 0
    }
}

/// One `content` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRow {
    pub text_id: TextId,
    pub content: String,
    pub category_id: CategoryId,
    pub subject_id: SubjectId,
    pub display_order: i64,
}

/// Either row kind, in persisted display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "row_type", rename_all = "snake_case")]
pub enum OutlineRow {
    Category(Category),
    Content(ContentRow),
}

impl OutlineRow {
    pub fn display_order(&self) -> i64 {
        match self {
            Self::Category(category) => category.display_order,
            Self::Content(content) => content.display_order,
        }
    }
}

/// Persisted category tree node with its own content rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    pub category: Category,
    pub contents: Vec<ContentRow>,
    pub children: Vec<CategoryNode>,
}

/// Write intent for a new category row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft<'a> {
    pub title: &'a str,
    pub parent_category_id: Option<CategoryId>,
    pub level: u8,
    pub display_order: i64,
}

/// Write intent for a new or updated content row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDraft<'a> {
    pub content: &'a str,
    pub category_id: CategoryId,
    pub display_order: i64,
}
