//! Line repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Translate line-level intents (insert, update, delete, reassign, shift)
//!   into `category` / `content` statements.
//! - Own display-order queries for one subject.
//!
//! # Invariants
//! - Every statement is scoped by `subject_id`.
//! - Multi-statement primitives join the caller's open transaction, or open
//!   their own when the connection is in autocommit mode.
//! - Updates/deletes that match no row are logged no-ops (`Ok(0)`).
//! - The default category (level 0) is never updated or deleted here.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::line::{CategoryId, SubjectId, TextId, MAX_HEADING_LEVEL, MIN_HEADING_LEVEL};
use crate::model::outline::{Category, CategoryDraft, ContentDraft, ContentRow, OutlineRow};
use log::{debug, error, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Title stored for a subject's default category.
pub const DEFAULT_CATEGORY_TITLE: &str = "# General";

const CATEGORY_SELECT_SQL: &str = "SELECT
    category_id,
    title,
    subject_id,
    parent_category_id,
    level,
    display_order
FROM category";

const CONTENT_SELECT_SQL: &str = "SELECT
    text_id,
    content,
    category_id,
    subject_id,
    display_order
FROM content";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for outline persistence.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target category does not exist in this subject.
    CategoryNotFound(CategoryId),
    /// Target subject does not exist.
    SubjectNotFound(SubjectId),
    /// The subject's default category cannot be modified or removed.
    ProtectedCategory(CategoryId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Input or persisted data is out of range.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::CategoryNotFound(id) => write!(f, "category not found: {id}"),
            Self::SubjectNotFound(id) => write!(f, "subject not found: {id}"),
            Self::ProtectedCategory(id) => {
                write!(f, "default category {id} cannot be modified")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "outline repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "outline repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid outline data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for line persistence within one subject.
pub trait LineRepository {
    /// Subject every statement is scoped to.
    fn subject_id(&self) -> SubjectId;
    /// `max(display_order) + 1` across categories and content, or `1`.
    fn next_display_order(&self) -> RepoResult<i64>;
    /// Increments display order of every row with order `> after_order`.
    fn shift_display_orders_after(&self, after_order: i64) -> RepoResult<usize>;
    /// Returns the subject's default category, creating it when missing.
    fn ensure_default_category(&self) -> RepoResult<CategoryId>;
    /// Inserts one heading category and returns its id.
    fn insert_category(&self, draft: &CategoryDraft<'_>) -> RepoResult<CategoryId>;
    /// Updates title, parent, level and order of one heading category.
    fn update_category(
        &self,
        category_id: CategoryId,
        draft: &CategoryDraft<'_>,
    ) -> RepoResult<usize>;
    /// Deletes one heading category, optionally with its content rows.
    fn delete_category(&self, category_id: CategoryId, cascade_content: bool)
        -> RepoResult<usize>;
    /// Moves every content row of `from` to `to`.
    fn reassign_content(&self, from: CategoryId, to: CategoryId) -> RepoResult<usize>;
    /// Inserts one content row and returns its id.
    fn insert_content(&self, draft: &ContentDraft<'_>) -> RepoResult<TextId>;
    /// Rewrites one content row.
    fn update_content(&self, text_id: TextId, draft: &ContentDraft<'_>) -> RepoResult<usize>;
    /// Deletes one content row.
    fn delete_content(&self, text_id: TextId) -> RepoResult<usize>;
    fn category_exists(&self, category_id: CategoryId) -> RepoResult<bool>;
    fn content_exists(&self, text_id: TextId) -> RepoResult<bool>;
    /// Lists categories (default included) by display order.
    fn list_categories(&self) -> RepoResult<Vec<Category>>;
    /// Lists content rows by display order.
    fn list_contents(&self) -> RepoResult<Vec<ContentRow>>;
    /// Lists both row kinds merged by display order.
    fn list_outline_rows(&self) -> RepoResult<Vec<OutlineRow>>;
}

/// SQLite-backed line repository bound to one subject.
pub struct SqliteLineRepository<'conn> {
    conn: &'conn Connection,
    subject_id: SubjectId,
}

impl<'conn> SqliteLineRepository<'conn> {
    /// Creates repository from a migrated connection.
    ///
    /// Accepts a plain connection or an open `Transaction` (via deref), in
    /// which case every primitive joins that transaction.
    pub fn try_new(conn: &'conn Connection, subject_id: SubjectId) -> RepoResult<Self> {
        ensure_outline_connection_ready(conn)?;
        Ok(Self::new_unchecked(conn, subject_id))
    }

    /// Skips the schema check. For callers that already validated `conn`.
    pub(crate) fn new_unchecked(conn: &'conn Connection, subject_id: SubjectId) -> Self {
        Self { conn, subject_id }
    }

    fn observe<T>(&self, op: &'static str, result: RepoResult<T>) -> RepoResult<T> {
        if let Err(err) = &result {
            error!(
                "event=line_repo_write module=repo status=error op={op} subject_id={} error={err}",
                self.subject_id
            );
        }
        result
    }

    fn report_missing(&self, op: &'static str, table: &'static str, id: i64, changed: usize) {
        if changed == 0 {
            warn!(
                "event=line_repo_write module=repo status=noop op={op} subject_id={} table={table} id={id} reason=not_found",
                self.subject_id
            );
        }
    }

    fn category_level(&self, category_id: CategoryId) -> RepoResult<Option<u8>> {
        let level: Option<i64> = self
            .conn
            .query_row(
                "SELECT level
                 FROM category
                 WHERE category_id = ?1
                   AND subject_id = ?2;",
                params![category_id, self.subject_id],
                |row| row.get(0),
            )
            .optional()?;
        level.map(|value| parse_level(value, "category.level")).transpose()
    }
}

impl LineRepository for SqliteLineRepository<'_> {
    fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    fn next_display_order(&self) -> RepoResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(display_order), 0) + 1
             FROM (
                SELECT display_order FROM category WHERE subject_id = ?1
                UNION ALL
                SELECT display_order FROM content WHERE subject_id = ?1
             );",
            [self.subject_id],
            |row| row.get(0),
        );
        self.observe("next_display_order", next.map_err(Into::into))
    }

    fn shift_display_orders_after(&self, after_order: i64) -> RepoResult<usize> {
        let subject_id = self.subject_id;
        let result = with_write_scope(self.conn, |conn| {
            let categories = conn.execute(
                "UPDATE category
                 SET display_order = display_order + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE subject_id = ?1
                   AND level > 0
                   AND display_order > ?2;",
                params![subject_id, after_order],
            )?;
            let contents = conn.execute(
                "UPDATE content
                 SET display_order = display_order + 1,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE subject_id = ?1
                   AND display_order > ?2;",
                params![subject_id, after_order],
            )?;
            Ok(categories + contents)
        });
        if let Ok(shifted) = &result {
            debug!(
                "event=display_order_shift module=repo status=ok subject_id={subject_id} after_order={after_order} rows={shifted}"
            );
        }
        self.observe("shift_display_orders_after", result)
    }

    fn ensure_default_category(&self) -> RepoResult<CategoryId> {
        let subject_id = self.subject_id;
        let result = with_write_scope(self.conn, |conn| {
            let existing: Option<CategoryId> = conn
                .query_row(
                    "SELECT category_id
                     FROM category
                     WHERE subject_id = ?1
                       AND level = 0;",
                    [subject_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(category_id) = existing {
                return Ok(category_id);
            }

            let subject_exists: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM subject WHERE subject_id = ?1);",
                [subject_id],
                |row| row.get(0),
            )?;
            if subject_exists != 1 {
                return Err(RepoError::SubjectNotFound(subject_id));
            }

            conn.execute(
                "INSERT INTO category (
                    title,
                    subject_id,
                    parent_category_id,
                    level,
                    display_order
                ) VALUES (?1, ?2, NULL, 0, 0);",
                params![DEFAULT_CATEGORY_TITLE, subject_id],
            )?;
            let category_id = conn.last_insert_rowid();
            debug!(
                "event=default_category_created module=repo status=ok subject_id={subject_id} category_id={category_id}"
            );
            Ok(category_id)
        });
        self.observe("ensure_default_category", result)
    }

    fn insert_category(&self, draft: &CategoryDraft<'_>) -> RepoResult<CategoryId> {
        let result = validate_heading_level(draft.level).and_then(|()| {
            self.conn.execute(
                "INSERT INTO category (
                    title,
                    subject_id,
                    parent_category_id,
                    level,
                    display_order
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    draft.title,
                    self.subject_id,
                    draft.parent_category_id,
                    i64::from(draft.level),
                    draft.display_order,
                ],
            )?;
            Ok(self.conn.last_insert_rowid())
        });
        self.observe("insert_category", result)
    }

    fn update_category(
        &self,
        category_id: CategoryId,
        draft: &CategoryDraft<'_>,
    ) -> RepoResult<usize> {
        let result = validate_heading_level(draft.level).and_then(|()| {
            let changed = self.conn.execute(
                "UPDATE category
                 SET title = ?3,
                     parent_category_id = ?4,
                     level = ?5,
                     display_order = ?6,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE category_id = ?1
                   AND subject_id = ?2
                   AND level > 0;",
                params![
                    category_id,
                    self.subject_id,
                    draft.title,
                    draft.parent_category_id,
                    i64::from(draft.level),
                    draft.display_order,
                ],
            )?;
            Ok(changed)
        });
        if let Ok(changed) = &result {
            self.report_missing("update_category", "category", category_id, *changed);
        }
        self.observe("update_category", result)
    }

    fn delete_category(
        &self,
        category_id: CategoryId,
        cascade_content: bool,
    ) -> RepoResult<usize> {
        let result = match self.category_level(category_id) {
            Err(err) => Err(err),
            Ok(Some(0)) => Err(RepoError::ProtectedCategory(category_id)),
            Ok(None) => Ok(0),
            Ok(Some(_)) => {
                let subject_id = self.subject_id;
                with_write_scope(self.conn, |conn| {
                    if cascade_content {
                        conn.execute(
                            "DELETE FROM content
                             WHERE category_id = ?1
                               AND subject_id = ?2;",
                            params![category_id, subject_id],
                        )?;
                    }
                    let deleted = conn.execute(
                        "DELETE FROM category
                         WHERE category_id = ?1
                           AND subject_id = ?2
                           AND level > 0;",
                        params![category_id, subject_id],
                    )?;
                    Ok(deleted)
                })
            }
        };
        if let Ok(changed) = &result {
            self.report_missing("delete_category", "category", category_id, *changed);
        }
        self.observe("delete_category", result)
    }

    fn reassign_content(&self, from: CategoryId, to: CategoryId) -> RepoResult<usize> {
        let result = self.category_exists(to).and_then(|exists| {
            if !exists {
                return Err(RepoError::CategoryNotFound(to));
            }
            let changed = self.conn.execute(
                "UPDATE content
                 SET category_id = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE category_id = ?1
                   AND subject_id = ?3;",
                params![from, to, self.subject_id],
            )?;
            Ok(changed)
        });
        if let Ok(changed) = &result {
            debug!(
                "event=content_reassign module=repo status=ok subject_id={} from={from} to={to} rows={changed}",
                self.subject_id
            );
        }
        self.observe("reassign_content", result)
    }

    fn insert_content(&self, draft: &ContentDraft<'_>) -> RepoResult<TextId> {
        let result = self
            .conn
            .execute(
                "INSERT INTO content (
                    content,
                    category_id,
                    subject_id,
                    display_order
                ) VALUES (?1, ?2, ?3, ?4);",
                params![
                    draft.content,
                    draft.category_id,
                    self.subject_id,
                    draft.display_order,
                ],
            )
            .map(|_| self.conn.last_insert_rowid())
            .map_err(Into::into);
        self.observe("insert_content", result)
    }

    fn update_content(&self, text_id: TextId, draft: &ContentDraft<'_>) -> RepoResult<usize> {
        let result = self
            .conn
            .execute(
                "UPDATE content
                 SET content = ?3,
                     category_id = ?4,
                     display_order = ?5,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE text_id = ?1
                   AND subject_id = ?2;",
                params![
                    text_id,
                    self.subject_id,
                    draft.content,
                    draft.category_id,
                    draft.display_order,
                ],
            )
            .map_err(Into::into);
        if let Ok(changed) = &result {
            self.report_missing("update_content", "content", text_id, *changed);
        }
        self.observe("update_content", result)
    }

    fn delete_content(&self, text_id: TextId) -> RepoResult<usize> {
        let result = self
            .conn
            .execute(
                "DELETE FROM content
                 WHERE text_id = ?1
                   AND subject_id = ?2;",
                params![text_id, self.subject_id],
            )
            .map_err(Into::into);
        if let Ok(changed) = &result {
            self.report_missing("delete_content", "content", text_id, *changed);
        }
        self.observe("delete_content", result)
    }

    fn category_exists(&self, category_id: CategoryId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM category
                WHERE category_id = ?1
                  AND subject_id = ?2
            );",
            params![category_id, self.subject_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn content_exists(&self, text_id: TextId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM content
                WHERE text_id = ?1
                  AND subject_id = ?2
            );",
            params![text_id, self.subject_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CATEGORY_SELECT_SQL}
             WHERE subject_id = ?1
             ORDER BY display_order ASC, category_id ASC;"
        ))?;
        let mut rows = stmt.query([self.subject_id])?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next()? {
            categories.push(parse_category_row(row)?);
        }
        Ok(categories)
    }

    fn list_contents(&self) -> RepoResult<Vec<ContentRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTENT_SELECT_SQL}
             WHERE subject_id = ?1
             ORDER BY display_order ASC, text_id ASC;"
        ))?;
        let mut rows = stmt.query([self.subject_id])?;
        let mut contents = Vec::new();
        while let Some(row) = rows.next()? {
            contents.push(parse_content_row(row)?);
        }
        Ok(contents)
    }

    fn list_outline_rows(&self) -> RepoResult<Vec<OutlineRow>> {
        let mut rows: Vec<OutlineRow> = self
            .list_categories()?
            .into_iter()
            .map(OutlineRow::Category)
            .chain(self.list_contents()?.into_iter().map(OutlineRow::Content))
            .collect();
        // Ties: headings first so equal orders never detach a heading from its text.
        rows.sort_by_key(|row| match row {
            OutlineRow::Category(category) => (category.display_order, 0, category.category_id),
            OutlineRow::Content(content) => (content.display_order, 1, content.text_id),
        });
        Ok(rows)
    }
}

/// Runs `op` inside the caller's transaction, or inside a new immediate
/// transaction when `conn` is in autocommit mode.
pub(crate) fn with_write_scope<T>(
    conn: &Connection,
    op: impl FnOnce(&Connection) -> RepoResult<T>,
) -> RepoResult<T> {
    if !conn.is_autocommit() {
        return op(conn);
    }
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

fn validate_heading_level(level: u8) -> RepoResult<()> {
    if (MIN_HEADING_LEVEL..=MAX_HEADING_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(RepoError::InvalidData(format!(
            "heading level {level} outside {MIN_HEADING_LEVEL}..={MAX_HEADING_LEVEL}"
        )))
    }
}

fn parse_level(value: i64, column: &'static str) -> RepoResult<u8> {
    u8::try_from(value)
        .ok()
        .filter(|level| *level <= MAX_HEADING_LEVEL)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid level `{value}` in {column}")))
}

fn parse_category_row(row: &Row<'_>) -> RepoResult<Category> {
    Ok(Category {
        category_id: row.get("category_id")?,
        title: row.get("title")?,
        subject_id: row.get("subject_id")?,
        parent_category_id: row.get("parent_category_id")?,
        level: parse_level(row.get("level")?, "category.level")?,
        display_order: row.get("display_order")?,
    })
}

fn parse_content_row(row: &Row<'_>) -> RepoResult<ContentRow> {
    Ok(ContentRow {
        text_id: row.get("text_id")?,
        content: row.get("content")?,
        category_id: row.get("category_id")?,
        subject_id: row.get("subject_id")?,
        display_order: row.get("display_order")?,
    })
}

pub(crate) fn ensure_outline_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["subject", "category", "content"] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
