//! Outline document: the in-memory line list kept in sync with the store.
//!
//! # Responsibility
//! - Own the ordered lines of one subject and every structural edit on them.
//! - Keep display order, category ownership and heading transitions
//!   consistent between memory and the `category` / `content` tables.
//! - Decide when dirty lines are flushed (debounce, idle autosave, close).
//!
//! # Invariants
//! - Display order is strictly increasing in document order.
//! - Text lines own the nearest preceding persisted heading's category, or
//!   the subject's default category.
//! - Batched saves are all-or-nothing: on failure the store rolls back and
//!   in-memory ids, dirty flags and queued deletions are left untouched.
//! - Timers are polled on the editing thread; no flush ever overlaps another.

use crate::db::DbError;
use crate::model::line::{
    normalize_line_text, CategoryId, ContentChange, KindTransition, Line, LineId, LineKind,
    SubjectId, TextId, MAX_HEADING_LEVEL, MIN_HEADING_LEVEL, UNASSIGNED_ID,
};
use crate::repo::heading::extract_heading_text;
use crate::repo::line_repo::{
    with_write_scope, LineRepository, RepoError, RepoResult, SqliteLineRepository,
};
use crate::service::history::{DocumentSnapshot, EditHistory, DEFAULT_HISTORY_LIMIT};
use crate::service::save::{
    mark_child_headings_dirty, write_all, write_one, BatchOutcome, PendingOp, SaveReport,
};
use crate::service::scheduler::{AutosaveConfig, Clock, EditScheduler, SystemClock};
use log::{debug, error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Document settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentConfig {
    pub subject_id: SubjectId,
    pub autosave: AutosaveConfig,
    /// Maximum undo entries. `0` disables history.
    pub history_limit: usize,
}

impl DocumentConfig {
    pub fn for_subject(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            ..Self::default()
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            subject_id: 1,
            autosave: AutosaveConfig::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Errors from document operations.
#[derive(Debug)]
pub enum DocumentError {
    /// Store could not be opened, read or validated.
    Store(RepoError),
    /// A structural transaction or batched save failed and was rolled back.
    Transaction(RepoError),
    LineNotFound(LineId),
    IndexOutOfRange { index: usize, len: usize },
    InvalidLevel(u8),
    NotAHeading(LineId),
    /// The view was closed; edits are rejected.
    Closed,
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "store unavailable: {err}"),
            Self::Transaction(err) => write!(f, "transaction rolled back: {err}"),
            Self::LineNotFound(id) => write!(f, "line not found: {id}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "line index {index} out of range for {len} lines")
            }
            Self::InvalidLevel(level) => write!(
                f,
                "heading level {level} outside {MIN_HEADING_LEVEL}..={MAX_HEADING_LEVEL}"
            ),
            Self::NotAHeading(id) => write!(f, "line is not a heading: {id}"),
            Self::Closed => write!(f, "document is closed"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) | Self::Transaction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for DocumentError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

impl From<DbError> for DocumentError {
    fn from(value: DbError) -> Self {
        Self::Store(RepoError::Db(value))
    }
}

/// Re-render hints for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DocumentEvent {
    LineInserted { line_id: LineId, index: usize },
    LineRemoved { line_id: LineId, index: usize },
    HeadingCreated { line_id: LineId, category_id: CategoryId },
    KindChanged { line_id: LineId, kind: LineKind },
    /// The whole line list was replaced by undo or redo.
    HistoryRestored,
}

/// What one `poll_timers` call did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub lines_flushed: usize,
    pub autosave: Option<SaveReport>,
    /// Flushes or saves that failed and were left for a later retry.
    pub failures: usize,
}

/// One heading with its effective parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingOutlineEntry {
    pub line_id: LineId,
    pub category_id: CategoryId,
    pub level: u8,
    pub title: String,
    pub parent_line_id: Option<LineId>,
    pub parent_category_id: Option<CategoryId>,
}

/// Ordered, editable lines of one subject.
pub struct OutlineDocument {
    conn: Connection,
    subject_id: SubjectId,
    default_category_id: CategoryId,
    lines: Vec<Line>,
    pending: Vec<PendingOp>,
    clock: Box<dyn Clock>,
    scheduler: EditScheduler,
    history: EditHistory,
    events: Vec<DocumentEvent>,
    closed: bool,
}

impl OutlineDocument {
    /// Creates an empty document (one empty line) for `config.subject_id`.
    pub fn new(conn: Connection, config: DocumentConfig) -> DocumentResult<Self> {
        Self::with_clock(conn, config, Box::new(SystemClock))
    }

    /// Like [`OutlineDocument::new`] with an explicit time source.
    pub fn with_clock(
        conn: Connection,
        config: DocumentConfig,
        clock: Box<dyn Clock>,
    ) -> DocumentResult<Self> {
        let (default_category_id, first_order) = {
            let repo = SqliteLineRepository::try_new(&conn, config.subject_id)?;
            (repo.ensure_default_category()?, repo.next_display_order()?)
        };
        let lines = vec![Line::new_empty(default_category_id, first_order)];
        Ok(Self::from_parts(
            conn,
            config,
            clock,
            default_category_id,
            lines,
        ))
    }

    /// Assembles a document from hydrated lines. An empty list gets one
    /// empty line.
    pub(crate) fn from_parts(
        conn: Connection,
        config: DocumentConfig,
        clock: Box<dyn Clock>,
        default_category_id: CategoryId,
        mut lines: Vec<Line>,
    ) -> Self {
        if lines.is_empty() {
            lines.push(Line::new_empty(default_category_id, 1));
        }
        let scheduler = EditScheduler::new(config.autosave, clock.now());
        info!(
            "event=document_open module=service status=ok subject_id={} default_category_id={default_category_id} lines={}",
            config.subject_id,
            lines.len()
        );
        Self {
            conn,
            subject_id: config.subject_id,
            default_category_id,
            lines,
            pending: Vec::new(),
            clock,
            scheduler,
            history: EditHistory::new(config.history_limit),
            events: Vec::new(),
            closed: false,
        }
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    pub fn default_category_id(&self) -> CategoryId {
        self.default_category_id
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, line_id: LineId) -> Option<&Line> {
        self.lines.iter().find(|line| line.id() == line_id)
    }

    pub fn index_of(&self, line_id: LineId) -> Option<usize> {
        self.lines.iter().position(|line| line.id() == line_id)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether any line is dirty or any row deletion is queued.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.pending.is_empty() || self.lines.iter().any(Line::is_dirty)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Connection the document writes through.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Releases the connection. Unsaved changes are dropped.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Returns and clears queued presentation events.
    pub fn drain_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Appends an empty line at the end.
    pub fn add_line(&mut self) -> DocumentResult<LineId> {
        let len = self.lines.len();
        self.insert_line_at(len)
    }

    /// Inserts an empty line directly after `line_id`.
    pub fn insert_line_after(&mut self, line_id: LineId) -> DocumentResult<LineId> {
        let index = self.require_index(line_id)?;
        self.insert_line_at(index + 1)
    }

    /// Inserts an empty line at `index` (`0..=len`).
    pub fn insert_line_at(&mut self, index: usize) -> DocumentResult<LineId> {
        self.ensure_open()?;
        let len = self.lines.len();
        if index > len {
            return Err(DocumentError::IndexOutOfRange { index, len });
        }

        let before = self.snapshot_lines();
        let category_id = self.previous_category_id_at(index);
        let prev_order = if index == 0 {
            0
        } else {
            self.lines[index - 1].display_order()
        };

        let display_order = if index == len {
            prev_order + 1
        } else {
            let next_order = self.lines[index].display_order();
            if next_order - prev_order > 1 {
                prev_order + (next_order - prev_order) / 2
            } else {
                self.repo()
                    .shift_display_orders_after(next_order - 1)
                    .map_err(DocumentError::Transaction)?;
                for line in self.lines[index..]
                    .iter_mut()
                    .filter(|line| line.display_order() >= next_order)
                {
                    line.shift_display_order(1);
                }
                next_order
            }
        };

        let line = Line::new_empty(category_id, display_order);
        let line_id = line.id();
        self.lines.insert(index, line);
        self.history.record_structural(before);
        self.touch();
        self.events
            .push(DocumentEvent::LineInserted { line_id, index });
        debug!(
            "event=line_insert module=service status=ok subject_id={} index={index} display_order={display_order} category_id={category_id}",
            self.subject_id
        );
        Ok(line_id)
    }

    /// Removes one line and its row.
    ///
    /// A persisted heading hands its content to the previous category in one
    /// transaction; on failure nothing is removed. A text row that fails to
    /// delete is queued and deleted by the next save.
    pub fn remove_line(&mut self, line_id: LineId) -> DocumentResult<()> {
        self.ensure_open()?;
        let index = self.require_index(line_id)?;
        let before = self.snapshot_lines();
        let line = &self.lines[index];
        let removed_order = line.display_order();

        if line.is_heading_line() && line.category_id() > UNASSIGNED_ID {
            let category_id = line.category_id();
            let reassign_to = self.previous_category_id_at(index);
            self.dissolve_category(category_id, reassign_to)
                .map_err(DocumentError::Transaction)?;
            mark_child_headings_dirty(&mut self.lines, index);
            self.repoint_following_text(index, category_id, reassign_to);
        } else if !line.is_heading_line() && line.text_id() > UNASSIGNED_ID {
            let text_id = line.text_id();
            if let Err(err) = self.repo().delete_content(text_id) {
                warn!(
                    "event=line_remove module=service status=error subject_id={} text_id={text_id} error={err}",
                    self.subject_id
                );
                self.pending.push(PendingOp::DeleteContent(text_id));
            }
        }

        self.lines.remove(index);
        self.scheduler.cancel(line_id);
        self.history.record_structural(before);
        self.touch();
        self.events
            .push(DocumentEvent::LineRemoved { line_id, index });

        if self.lines.is_empty() {
            let display_order = match self.repo().next_display_order() {
                Ok(order) => order,
                Err(err) => {
                    warn!(
                        "event=line_remove module=service status=error subject_id={} stage=next_display_order error={err}",
                        self.subject_id
                    );
                    removed_order + 1
                }
            };
            let line = Line::new_empty(self.default_category_id, display_order);
            self.events.push(DocumentEvent::LineInserted {
                line_id: line.id(),
                index: 0,
            });
            self.lines.push(line);
        }
        Ok(())
    }

    /// Replaces a line's text and applies heading transitions.
    pub fn set_line_content(
        &mut self,
        line_id: LineId,
        text: &str,
    ) -> DocumentResult<ContentChange> {
        self.ensure_open()?;
        let index = self.require_index(line_id)?;
        if normalize_line_text(text) == self.lines[index].content() {
            return Ok(ContentChange::Unchanged);
        }

        let lines = &self.lines;
        self.history
            .record_content_edit(line_id, || snapshot_of(lines));
        let change = self.lines[index].set_content(text);

        match change {
            ContentChange::Transitioned(KindTransition::BecameHeading { discarded_text_id }) => {
                self.on_line_became_heading(index, discarded_text_id);
            }
            ContentChange::Transitioned(KindTransition::BecameText { former_category_id }) => {
                self.on_line_became_text(index, former_category_id);
            }
            ContentChange::Unchanged | ContentChange::Edited => {}
        }

        let now = self.clock.now();
        self.scheduler.arm_debounce(line_id, now);
        self.scheduler.record_activity(now);
        Ok(change)
    }

    /// Changes a heading's depth (1..=6).
    pub fn set_heading_level(&mut self, line_id: LineId, level: u8) -> DocumentResult<()> {
        self.ensure_open()?;
        if !(MIN_HEADING_LEVEL..=MAX_HEADING_LEVEL).contains(&level) {
            return Err(DocumentError::InvalidLevel(level));
        }
        let index = self.require_index(line_id)?;
        let current = self.lines[index].level();
        if !self.lines[index].is_heading_line() {
            return Err(DocumentError::NotAHeading(line_id));
        }
        if current == level {
            return Ok(());
        }

        let before = self.snapshot_lines();
        self.lines[index].set_level(level);
        // Both the old and new children of this heading need their parent
        // rewritten.
        let scope_level = current.min(level);
        for line in self.lines[index + 1..]
            .iter_mut()
            .filter(|line| line.is_heading_line())
        {
            if line.level() <= scope_level {
                break;
            }
            line.mark_dirty();
        }
        self.history.record_structural(before);
        let now = self.clock.now();
        self.scheduler.arm_debounce(line_id, now);
        self.scheduler.record_activity(now);
        Ok(())
    }

    /// Nearest preceding persisted heading's category, else the default.
    pub fn find_previous_category_id(&self, line_id: LineId) -> DocumentResult<CategoryId> {
        let index = self.require_index(line_id)?;
        Ok(self.previous_category_id_at(index))
    }

    /// Every heading with its nearest earlier heading of smaller level.
    pub fn heading_outline(&self) -> Vec<HeadingOutlineEntry> {
        let mut stack: Vec<&Line> = Vec::new();
        let mut entries = Vec::new();
        for line in self.lines.iter().filter(|line| line.is_heading_line()) {
            while stack
                .last()
                .is_some_and(|parent| parent.level() >= line.level())
            {
                stack.pop();
            }
            let parent = stack.last();
            entries.push(HeadingOutlineEntry {
                line_id: line.id(),
                category_id: line.category_id(),
                level: line.level(),
                title: extract_heading_text(line.content()),
                parent_line_id: parent.map(|parent| parent.id()),
                parent_category_id: parent
                    .map(|parent| parent.category_id())
                    .filter(|category_id| *category_id > UNASSIGNED_ID),
            });
            stack.push(line);
        }
        entries
    }

    /// Writes every dirty line and queued deletion in one transaction.
    pub fn save_all_changes(&mut self) -> DocumentResult<SaveReport> {
        if !self.has_unsaved_changes() {
            debug!(
                "event=document_save module=service status=skip subject_id={} reason=clean",
                self.subject_id
            );
            return Ok(SaveReport::default());
        }

        let started = Instant::now();
        let dirty_lines = self.lines.iter().filter(|line| line.is_dirty()).count();
        info!(
            "event=document_save module=service status=start subject_id={} dirty_lines={dirty_lines} pending_ops={}",
            self.subject_id,
            self.pending.len()
        );

        let mut work = self.lines.clone();
        let result = run_in_transaction(&self.conn, self.subject_id, |repo| {
            write_all(repo, &mut work, &self.pending, self.default_category_id)
        });

        match result {
            Ok(outcome) => {
                self.lines = work;
                self.pending.clear();
                self.history.break_coalescing();
                let report = self.apply_outcome(outcome);
                info!(
                    "event=document_save module=service status=ok subject_id={} writes={} duration_ms={}",
                    self.subject_id,
                    report.total_writes(),
                    started.elapsed().as_millis()
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=document_save module=service status=error subject_id={} duration_ms={} error={err}",
                    self.subject_id,
                    started.elapsed().as_millis()
                );
                Err(DocumentError::Transaction(err))
            }
        }
    }

    /// Writes one line if dirty, after any queued row deletions. Returns
    /// whether a write happened.
    pub fn flush_line(&mut self, line_id: LineId) -> DocumentResult<bool> {
        let index = self.require_index(line_id)?;
        if !self.lines[index].is_dirty() {
            return Ok(false);
        }

        let mut work = self.lines.clone();
        let result = run_in_transaction(&self.conn, self.subject_id, |repo| {
            write_one(repo, &mut work, &self.pending, index, self.default_category_id)
        });

        match result {
            Ok(outcome) => {
                self.lines = work;
                self.pending.clear();
                let report = self.apply_outcome(outcome);
                debug!(
                    "event=line_flush module=service status=ok subject_id={} line_id={line_id} writes={}",
                    self.subject_id,
                    report.total_writes()
                );
                Ok(true)
            }
            Err(err) => {
                warn!(
                    "event=line_flush module=service status=error subject_id={} line_id={line_id} error={err}",
                    self.subject_id
                );
                Err(DocumentError::Transaction(err))
            }
        }
    }

    /// Runs due line debounces, then the idle autosave. Driven by the host's
    /// tick; failures are logged and retried later.
    pub fn poll_timers(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        if self.closed {
            return outcome;
        }

        let now = self.clock.now();
        for line_id in self.scheduler.take_due_lines(now) {
            match self.flush_line(line_id) {
                Ok(true) => outcome.lines_flushed += 1,
                Ok(false) | Err(DocumentError::LineNotFound(_)) => {}
                Err(_) => outcome.failures += 1,
            }
        }

        if self.scheduler.take_idle_due(now) && self.has_unsaved_changes() {
            match self.save_all_changes() {
                Ok(report) => outcome.autosave = Some(report),
                Err(err) => {
                    warn!(
                        "event=idle_autosave module=service status=error subject_id={} error={err}",
                        self.subject_id
                    );
                    outcome.failures += 1;
                }
            }
            self.scheduler.record_activity(now);
        }
        outcome
    }

    /// Stops every timer and performs the final save. Later edits are
    /// rejected with [`DocumentError::Closed`].
    pub fn on_view_closing(&mut self) -> DocumentResult<SaveReport> {
        self.scheduler.cancel_all();
        self.closed = true;
        info!(
            "event=document_close module=service status=start subject_id={}",
            self.subject_id
        );
        self.save_all_changes()
    }

    /// Restores the previous snapshot. Returns `false` when history is empty.
    pub fn undo(&mut self) -> DocumentResult<bool> {
        self.ensure_open()?;
        let current = self.snapshot_lines();
        match self.history.undo(current) {
            Some(target) => self.restore(target).map(|()| true),
            None => Ok(false),
        }
    }

    /// Re-applies the last undone snapshot.
    pub fn redo(&mut self) -> DocumentResult<bool> {
        self.ensure_open()?;
        let current = self.snapshot_lines();
        match self.history.redo(current) {
            Some(target) => self.restore(target).map(|()| true),
            None => Ok(false),
        }
    }

    fn on_line_became_heading(&mut self, index: usize, discarded_text_id: TextId) {
        if discarded_text_id > UNASSIGNED_ID {
            self.pending.push(PendingOp::DeleteContent(discarded_text_id));
        }
        self.history.break_coalescing();
        let line = &self.lines[index];
        self.events.push(DocumentEvent::KindChanged {
            line_id: line.id(),
            kind: line.kind(),
        });
    }

    fn on_line_became_text(&mut self, index: usize, former_category_id: CategoryId) {
        let reassign_to = self.previous_category_id_at(index);
        if former_category_id > UNASSIGNED_ID {
            match self.dissolve_category(former_category_id, reassign_to) {
                Ok(()) => {
                    self.repoint_following_text(index, former_category_id, reassign_to);
                }
                Err(err) => {
                    warn!(
                        "event=heading_dissolve module=service status=error subject_id={} category_id={former_category_id} error={err}",
                        self.subject_id
                    );
                    self.pending.push(PendingOp::DissolveCategory {
                        category_id: former_category_id,
                        reassign_to,
                    });
                    self.repoint_following_text(index, UNASSIGNED_ID, reassign_to);
                }
            }
            mark_child_headings_dirty_from(&mut self.lines, index);
        } else {
            self.repoint_following_text(index, UNASSIGNED_ID, reassign_to);
        }

        let line = &mut self.lines[index];
        line.assign_category_id(reassign_to);
        self.history.break_coalescing();
        self.events.push(DocumentEvent::KindChanged {
            line_id: line.id(),
            kind: line.kind(),
        });
    }

    /// Reassigns a category's content and deletes it in one transaction.
    fn dissolve_category(&self, category_id: CategoryId, reassign_to: CategoryId) -> RepoResult<()> {
        let subject_id = self.subject_id;
        with_write_scope(&self.conn, |conn| {
            let repo = SqliteLineRepository::new_unchecked(conn, subject_id);
            repo.reassign_content(category_id, reassign_to)?;
            repo.delete_category(category_id, false)?;
            Ok(())
        })?;
        debug!(
            "event=heading_dissolve module=service status=ok subject_id={subject_id} category_id={category_id} reassign_to={reassign_to}"
        );
        Ok(())
    }

    /// Re-points text lines after `index` up to the next heading. Lines that
    /// pointed at `dissolved` were already moved in the store.
    fn repoint_following_text(
        &mut self,
        index: usize,
        dissolved: CategoryId,
        category_id: CategoryId,
    ) {
        for line in self.lines[index + 1..]
            .iter_mut()
            .take_while(|line| !line.is_heading_line())
        {
            if dissolved > UNASSIGNED_ID && line.category_id() == dissolved && !line.is_dirty() {
                line.sync_category_id(category_id);
            } else {
                line.assign_category_id(category_id);
            }
        }
    }

    fn restore(&mut self, snapshot: DocumentSnapshot) -> DocumentResult<()> {
        let current: Vec<&Line> = self.lines.iter().collect();
        let mut restored: Vec<Line> = snapshot.iter().map(Line::from_snapshot).collect();

        // Same line, same kind: the current row is the live one.
        for line in &mut restored {
            if let Some(live) = current.iter().find(|live| live.id() == line.id()) {
                if live.is_heading_line() == line.is_heading_line() && live.is_persisted() {
                    if line.is_heading_line() {
                        line.record_persisted_category_id(live.category_id());
                    } else {
                        line.record_persisted_text_id(live.text_id());
                    }
                }
            }
        }

        let kept_text: HashSet<TextId> = restored
            .iter()
            .filter(|line| !line.is_heading_line() && line.text_id() > UNASSIGNED_ID)
            .map(Line::text_id)
            .collect();
        let kept_categories: HashSet<CategoryId> = restored
            .iter()
            .filter(|line| line.is_heading_line() && line.category_id() > UNASSIGNED_ID)
            .map(Line::category_id)
            .collect();

        // Ids whose rows are gone are recreated on save.
        {
            let repo = self.repo();
            for line in &mut restored {
                if line.is_heading_line() {
                    if line.category_id() > UNASSIGNED_ID
                        && !repo.category_exists(line.category_id())?
                    {
                        line.forget_category_id();
                    }
                } else if line.text_id() > UNASSIGNED_ID
                    && !repo.content_exists(line.text_id())?
                {
                    line.forget_text_id();
                }
            }
        }

        let mut pending: Vec<PendingOp> = self
            .pending
            .iter()
            .copied()
            .filter(|op| {
                !op.text_id().is_some_and(|id| kept_text.contains(&id))
                    && !op.category_id().is_some_and(|id| kept_categories.contains(&id))
            })
            .collect();
        for live in &current {
            if live.is_heading_line() {
                if live.category_id() > UNASSIGNED_ID && !kept_categories.contains(&live.category_id())
                {
                    pending.push(PendingOp::DissolveCategory {
                        category_id: live.category_id(),
                        reassign_to: self.default_category_id,
                    });
                }
            } else if live.text_id() > UNASSIGNED_ID && !kept_text.contains(&live.text_id()) {
                pending.push(PendingOp::DeleteContent(live.text_id()));
            }
        }

        let mut owner = self.default_category_id;
        for line in &mut restored {
            if line.is_heading_line() {
                if line.category_id() > UNASSIGNED_ID {
                    owner = line.category_id();
                }
            } else {
                line.assign_category_id(owner);
            }
        }

        let previous_ids: Vec<LineId> = self.lines.iter().map(Line::id).collect();
        for line_id in previous_ids {
            self.scheduler.cancel(line_id);
        }
        self.lines = restored;
        if self.lines.is_empty() {
            self.lines
                .push(Line::new_empty(self.default_category_id, 1));
        }
        self.pending = pending;
        self.touch();
        self.events.push(DocumentEvent::HistoryRestored);
        debug!(
            "event=history_restore module=service status=ok subject_id={} lines={} pending_ops={}",
            self.subject_id,
            self.lines.len(),
            self.pending.len()
        );
        Ok(())
    }

    fn apply_outcome(&mut self, outcome: BatchOutcome) -> SaveReport {
        for (line_id, category_id) in outcome.created_headings {
            self.events.push(DocumentEvent::HeadingCreated {
                line_id,
                category_id,
            });
        }
        outcome.report
    }

    fn previous_category_id_at(&self, index: usize) -> CategoryId {
        self.lines[..index]
            .iter()
            .rev()
            .find(|line| line.is_heading_line() && line.category_id() > UNASSIGNED_ID)
            .map(Line::category_id)
            .unwrap_or(self.default_category_id)
    }

    fn repo(&self) -> SqliteLineRepository<'_> {
        SqliteLineRepository::new_unchecked(&self.conn, self.subject_id)
    }

    fn require_index(&self, line_id: LineId) -> DocumentResult<usize> {
        self.index_of(line_id)
            .ok_or(DocumentError::LineNotFound(line_id))
    }

    fn ensure_open(&self) -> DocumentResult<()> {
        if self.closed {
            Err(DocumentError::Closed)
        } else {
            Ok(())
        }
    }

    fn snapshot_lines(&self) -> DocumentSnapshot {
        snapshot_of(&self.lines)
    }

    fn touch(&mut self) {
        let now = self.clock.now();
        self.scheduler.record_activity(now);
    }
}

fn snapshot_of(lines: &[Line]) -> DocumentSnapshot {
    lines.iter().map(Line::snapshot).collect()
}

/// Marks headings that were nested under the line at `index`, which is no
/// longer a heading. Its former level is unknown here, so every following
/// heading up to the next level-1 heading is rewritten.
fn mark_child_headings_dirty_from(lines: &mut [Line], index: usize) {
    for line in lines[index + 1..]
        .iter_mut()
        .filter(|line| line.is_heading_line())
    {
        if line.level() <= MIN_HEADING_LEVEL {
            break;
        }
        line.mark_dirty();
    }
}

fn run_in_transaction<T>(
    conn: &Connection,
    subject_id: SubjectId,
    op: impl FnOnce(&SqliteLineRepository<'_>) -> RepoResult<T>,
) -> RepoResult<T> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = op(&SqliteLineRepository::new_unchecked(&tx, subject_id))?;
    tx.commit()?;
    Ok(value)
}
