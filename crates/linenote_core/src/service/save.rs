//! Batched persistence of dirty lines.
//!
//! # Responsibility
//! - Apply queued row deletions and write dirty lines in document order
//!   through a [`LineRepository`] bound to one open transaction.
//!
//! # Invariants
//! - Functions here mutate only the working copy they are given. The caller
//!   swaps it in after commit, so a failed batch leaves the document intact.
//! - A heading's parent is the nearest earlier heading with a strictly
//!   smaller level.
//! - A text line without a live category is written under the default
//!   category.

use crate::model::line::{CategoryId, Line, LineId, TextId, UNASSIGNED_ID};
use crate::model::outline::{CategoryDraft, ContentDraft};
use crate::repo::line_repo::{LineRepository, RepoResult};
use log::warn;
use serde::Serialize;

/// Store work deferred until the next save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingOp {
    /// Content row orphaned by a text -> heading transition or a restore.
    DeleteContent(TextId),
    /// Category whose heading is gone; content moves to `reassign_to`.
    DissolveCategory {
        category_id: CategoryId,
        reassign_to: CategoryId,
    },
}

impl PendingOp {
    pub(crate) fn text_id(self) -> Option<TextId> {
        match self {
            Self::DeleteContent(text_id) => Some(text_id),
            Self::DissolveCategory { .. } => None,
        }
    }

    pub(crate) fn category_id(self) -> Option<CategoryId> {
        match self {
            Self::DeleteContent(_) => None,
            Self::DissolveCategory { category_id, .. } => Some(category_id),
        }
    }
}

/// Row writes performed by one save or flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub categories_inserted: usize,
    pub categories_updated: usize,
    pub categories_dissolved: usize,
    pub contents_inserted: usize,
    pub contents_updated: usize,
    pub contents_deleted: usize,
}

impl SaveReport {
    pub fn total_writes(&self) -> usize {
        self.categories_inserted
            + self.categories_updated
            + self.categories_dissolved
            + self.contents_inserted
            + self.contents_updated
            + self.contents_deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total_writes() == 0
    }
}

/// Output of one batch: counts plus headings that received a category id.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    pub(crate) report: SaveReport,
    pub(crate) created_headings: Vec<(LineId, CategoryId)>,
}

/// Runs queued deletions, then writes every dirty line in order.
pub(crate) fn write_all<R: LineRepository>(
    repo: &R,
    lines: &mut [Line],
    pending: &[PendingOp],
    default_category_id: CategoryId,
) -> RepoResult<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    for op in pending {
        apply_pending(repo, lines, *op, default_category_id, &mut outcome.report)?;
    }
    for index in 0..lines.len() {
        if lines[index].is_dirty() {
            write_line(repo, lines, index, default_category_id, &mut outcome)?;
        }
    }
    Ok(outcome)
}

/// Runs queued deletions, then writes the line at `index` only.
pub(crate) fn write_one<R: LineRepository>(
    repo: &R,
    lines: &mut [Line],
    pending: &[PendingOp],
    index: usize,
    default_category_id: CategoryId,
) -> RepoResult<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    for op in pending {
        apply_pending(repo, lines, *op, default_category_id, &mut outcome.report)?;
    }
    write_line(repo, lines, index, default_category_id, &mut outcome)?;
    Ok(outcome)
}

fn apply_pending<R: LineRepository>(
    repo: &R,
    lines: &mut [Line],
    op: PendingOp,
    default_category_id: CategoryId,
    report: &mut SaveReport,
) -> RepoResult<()> {
    match op {
        PendingOp::DeleteContent(text_id) => {
            report.contents_deleted += repo.delete_content(text_id)?;
        }
        PendingOp::DissolveCategory {
            category_id,
            reassign_to,
        } => {
            let target = if reassign_to != category_id
                && reassign_to > UNASSIGNED_ID
                && repo.category_exists(reassign_to)?
            {
                reassign_to
            } else {
                default_category_id
            };
            repo.reassign_content(category_id, target)?;
            report.categories_dissolved += repo.delete_category(category_id, false)?;
            for line in lines
                .iter_mut()
                .filter(|line| !line.is_heading_line() && line.category_id() == category_id)
            {
                line.assign_category_id(target);
            }
        }
    }
    Ok(())
}

fn write_line<R: LineRepository>(
    repo: &R,
    lines: &mut [Line],
    index: usize,
    default_category_id: CategoryId,
    outcome: &mut BatchOutcome,
) -> RepoResult<()> {
    if lines[index].is_heading_line() {
        write_heading(repo, lines, index, outcome)?;
    } else {
        write_text(repo, lines, index, default_category_id, &mut outcome.report)?;
    }
    lines[index].mark_clean();
    Ok(())
}

fn write_heading<R: LineRepository>(
    repo: &R,
    lines: &mut [Line],
    index: usize,
    outcome: &mut BatchOutcome,
) -> RepoResult<()> {
    let parent_category_id = parent_category_id(lines, index);
    let line = &lines[index];
    let draft = CategoryDraft {
        title: line.content(),
        parent_category_id,
        level: line.level(),
        display_order: line.display_order(),
    };

    if line.category_id() > UNASSIGNED_ID && repo.update_category(line.category_id(), &draft)? > 0
    {
        outcome.report.categories_updated += 1;
        return Ok(());
    }

    let category_id = repo.insert_category(&draft)?;
    outcome.report.categories_inserted += 1;
    outcome.created_headings.push((line.id(), category_id));
    lines[index].record_persisted_category_id(category_id);
    adopt_following_text(lines, index, category_id);
    mark_child_headings_dirty(lines, index);
    Ok(())
}

fn write_text<R: LineRepository>(
    repo: &R,
    lines: &mut [Line],
    index: usize,
    default_category_id: CategoryId,
    report: &mut SaveReport,
) -> RepoResult<()> {
    let category_id = lines[index].category_id();
    if category_id <= UNASSIGNED_ID || !repo.category_exists(category_id)? {
        warn!(
            "event=orphan_line_defaulted module=service status=ok line_id={} category_id={category_id} default_category_id={default_category_id}",
            lines[index].id()
        );
        lines[index].assign_category_id(default_category_id);
    }

    let line = &lines[index];
    let draft = ContentDraft {
        content: line.content(),
        category_id: line.category_id(),
        display_order: line.display_order(),
    };

    if line.text_id() > UNASSIGNED_ID && repo.update_content(line.text_id(), &draft)? > 0 {
        report.contents_updated += 1;
        return Ok(());
    }

    let text_id = repo.insert_content(&draft)?;
    report.contents_inserted += 1;
    lines[index].record_persisted_text_id(text_id);
    Ok(())
}

/// Nearest earlier heading with a strictly smaller level, if persisted.
pub(crate) fn parent_category_id(lines: &[Line], index: usize) -> Option<CategoryId> {
    let level = lines[index].level();
    lines[..index]
        .iter()
        .rev()
        .find(|line| line.is_heading_line() && line.level() < level)
        .map(Line::category_id)
        .filter(|category_id| *category_id > UNASSIGNED_ID)
}

/// Re-points the text lines owned by the heading at `index`.
fn adopt_following_text(lines: &mut [Line], index: usize, category_id: CategoryId) {
    for line in lines[index + 1..]
        .iter_mut()
        .take_while(|line| !line.is_heading_line())
    {
        line.assign_category_id(category_id);
    }
}

/// Marks headings nested under the heading at `index` dirty so their
/// parent reference is rewritten.
pub(crate) fn mark_child_headings_dirty(lines: &mut [Line], index: usize) {
    let level = lines[index].level();
    for line in lines[index + 1..]
        .iter_mut()
        .filter(|line| line.is_heading_line())
    {
        if line.level() <= level {
            break;
        }
        line.mark_dirty();
    }
}
