//! Subject repository.
//!
//! # Responsibility
//! - Create and read the top-level subjects outline rows belong to.
//!
//! # Invariants
//! - Subject titles are trimmed and non-empty.
//! - Creating a subject also creates its default category.

use crate::model::line::SubjectId;
use crate::model::outline::Subject;
use crate::repo::line_repo::{
    ensure_outline_connection_ready, with_write_scope, LineRepository, RepoError, RepoResult,
    SqliteLineRepository,
};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Repository interface for subject persistence.
pub trait SubjectRepository {
    /// Creates one subject with its default category.
    fn create_subject(&self, title: &str) -> RepoResult<Subject>;
    fn get_subject(&self, subject_id: SubjectId) -> RepoResult<Option<Subject>>;
    /// Lists subjects oldest first.
    fn list_subjects(&self) -> RepoResult<Vec<Subject>>;
}

/// SQLite-backed subject repository.
pub struct SqliteSubjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubjectRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_outline_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SubjectRepository for SqliteSubjectRepository<'_> {
    fn create_subject(&self, title: &str) -> RepoResult<Subject> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RepoError::InvalidData(
                "subject title cannot be empty".to_string(),
            ));
        }

        let result = with_write_scope(self.conn, |conn| {
            conn.execute("INSERT INTO subject (title) VALUES (?1);", [title])?;
            let subject_id = conn.last_insert_rowid();
            SqliteLineRepository::new_unchecked(conn, subject_id).ensure_default_category()?;
            fetch_subject(conn, subject_id)?.ok_or(RepoError::SubjectNotFound(subject_id))
        });

        match &result {
            Ok(subject) => info!(
                "event=subject_create module=repo status=ok subject_id={}",
                subject.subject_id
            ),
            Err(err) => error!("event=subject_create module=repo status=error error={err}"),
        }
        result
    }

    fn get_subject(&self, subject_id: SubjectId) -> RepoResult<Option<Subject>> {
        fetch_subject(self.conn, subject_id)
    }

    fn list_subjects(&self) -> RepoResult<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, title, created_at
             FROM subject
             ORDER BY created_at ASC, subject_id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut subjects = Vec::new();
        while let Some(row) = rows.next()? {
            subjects.push(parse_subject_row(row)?);
        }
        Ok(subjects)
    }
}

fn fetch_subject(conn: &Connection, subject_id: SubjectId) -> RepoResult<Option<Subject>> {
    conn.query_row(
        "SELECT subject_id, title, created_at
         FROM subject
         WHERE subject_id = ?1;",
        params![subject_id],
        parse_subject_row,
    )
    .optional()
    .map_err(Into::into)
}

fn parse_subject_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        subject_id: row.get("subject_id")?,
        title: row.get("title")?,
        created_at: row.get("created_at")?,
    })
}
