//! Hydrates outline documents and category trees from the store.
//!
//! # Invariants
//! - Rows are read in `display_order, id` order; the default category is
//!   never turned into a line.
//! - Loaded lines are clean unless the store disagrees with the document
//!   rules, in which case the line is repaired in memory and marked dirty.
//!   A consistent store therefore causes zero writes on the next save.

use crate::model::line::{CategoryId, Line, SubjectId, UNASSIGNED_ID};
use crate::model::outline::{Category, CategoryNode, ContentRow, OutlineRow};
use crate::repo::line_repo::{LineRepository, SqliteLineRepository};
use crate::service::document::{DocumentConfig, DocumentResult, OutlineDocument};
use crate::service::save::parent_category_id;
use crate::service::scheduler::{Clock, SystemClock};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::HashMap;

/// Loads `config.subject_id` into a document.
pub fn load_document(conn: Connection, config: DocumentConfig) -> DocumentResult<OutlineDocument> {
    load_document_with_clock(conn, config, Box::new(SystemClock))
}

/// Like [`load_document`] with an explicit time source.
pub fn load_document_with_clock(
    conn: Connection,
    config: DocumentConfig,
    clock: Box<dyn Clock>,
) -> DocumentResult<OutlineDocument> {
    let (default_category_id, rows) = {
        let repo = SqliteLineRepository::try_new(&conn, config.subject_id)?;
        (repo.ensure_default_category()?, repo.list_outline_rows()?)
    };
    let row_count = rows.len();
    let lines = build_lines(rows, default_category_id);
    let repaired = lines.iter().filter(|line| line.is_dirty()).count();
    info!(
        "event=document_load module=service status=ok subject_id={} rows={row_count} repaired={repaired}",
        config.subject_id
    );
    Ok(OutlineDocument::from_parts(
        conn,
        config,
        clock,
        default_category_id,
        lines,
    ))
}

fn build_lines(rows: Vec<OutlineRow>, default_category_id: CategoryId) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::with_capacity(rows.len());
    let mut stored_parents: Vec<Option<CategoryId>> = Vec::with_capacity(rows.len());
    let mut owner = default_category_id;
    let mut last_order = 0;

    for row in rows {
        let mut line = match row {
            OutlineRow::Category(category) if category.is_default() => continue,
            OutlineRow::Category(category) => {
                owner = category.category_id;
                stored_parents.push(category.parent_category_id);
                Line::persisted_heading(
                    category.category_id,
                    category.title,
                    category.level,
                    category.display_order,
                )
            }
            OutlineRow::Content(content) => {
                stored_parents.push(None);
                let mut line = Line::persisted_text(
                    content.text_id,
                    content.category_id,
                    content.content,
                    content.display_order,
                );
                if content.category_id != owner {
                    warn!(
                        "event=document_load module=service status=repair text_id={} stored_category_id={} category_id={owner}",
                        content.text_id, content.category_id
                    );
                    line.assign_category_id(owner);
                }
                line
            }
        };

        if line.display_order() <= last_order {
            line.shift_display_order(last_order + 1 - line.display_order());
            line.mark_dirty();
        }
        last_order = line.display_order();
        lines.push(line);
    }

    for index in 0..lines.len() {
        if lines[index].is_heading_line()
            && stored_parents[index] != parent_category_id(&lines, index)
        {
            lines[index].mark_dirty();
        }
    }
    lines
}

/// Persisted category tree of one subject, default category included.
pub fn load_category_tree(
    conn: &Connection,
    subject_id: SubjectId,
) -> DocumentResult<Vec<CategoryNode>> {
    let repo = SqliteLineRepository::try_new(conn, subject_id)?;
    let categories = repo.list_categories()?;
    let mut contents: HashMap<CategoryId, Vec<ContentRow>> = HashMap::new();
    for content in repo.list_contents()? {
        contents.entry(content.category_id).or_default().push(content);
    }

    let known: Vec<CategoryId> = categories.iter().map(|c| c.category_id).collect();
    let mut children: HashMap<CategoryId, Vec<Category>> = HashMap::new();
    let mut roots = Vec::new();
    for category in categories {
        match category.parent_category_id {
            Some(parent) if parent > UNASSIGNED_ID && known.contains(&parent) => {
                children.entry(parent).or_default().push(category);
            }
            _ => roots.push(category),
        }
    }

    Ok(roots
        .into_iter()
        .map(|category| build_node(category, &mut children, &mut contents))
        .collect())
}

fn build_node(
    category: Category,
    children: &mut HashMap<CategoryId, Vec<Category>>,
    contents: &mut HashMap<CategoryId, Vec<ContentRow>>,
) -> CategoryNode {
    let child_categories = children.remove(&category.category_id).unwrap_or_default();
    CategoryNode {
        contents: contents.remove(&category.category_id).unwrap_or_default(),
        children: child_categories
            .into_iter()
            .map(|child| build_node(child, children, contents))
            .collect(),
        category,
    }
}
