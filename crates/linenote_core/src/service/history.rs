//! Bounded linear edit history of full line-list snapshots.
//!
//! # Invariants
//! - At most `limit` undo entries are retained; the oldest is dropped first.
//! - Consecutive content edits on the same line share one entry.
//! - Recording a new entry clears the redo stack.

use crate::model::line::{LineId, LineSnapshot};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

pub(crate) type DocumentSnapshot = Vec<LineSnapshot>;

#[derive(Debug)]
pub(crate) struct EditHistory {
    limit: usize,
    undo: VecDeque<DocumentSnapshot>,
    redo: Vec<DocumentSnapshot>,
    coalescing_line: Option<LineId>,
}

impl EditHistory {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            undo: VecDeque::new(),
            redo: Vec::new(),
            coalescing_line: None,
        }
    }

    /// Records the state before a structural edit.
    pub(crate) fn record_structural(&mut self, before: DocumentSnapshot) {
        self.coalescing_line = None;
        self.push_undo(before);
        self.redo.clear();
    }

    /// Records the state before a content edit unless the previous entry was
    /// a content edit of the same line.
    pub(crate) fn record_content_edit(
        &mut self,
        line_id: LineId,
        before: impl FnOnce() -> DocumentSnapshot,
    ) {
        if self.coalescing_line == Some(line_id) {
            return;
        }
        self.push_undo(before());
        self.redo.clear();
        self.coalescing_line = Some(line_id);
    }

    pub(crate) fn break_coalescing(&mut self) {
        self.coalescing_line = None;
    }

    /// Pops the newest undo entry, parking `current` for redo.
    pub(crate) fn undo(&mut self, current: DocumentSnapshot) -> Option<DocumentSnapshot> {
        let target = self.undo.pop_back()?;
        self.redo.push(current);
        self.coalescing_line = None;
        Some(target)
    }

    /// Pops the newest redo entry, parking `current` for undo.
    pub(crate) fn redo(&mut self, current: DocumentSnapshot) -> Option<DocumentSnapshot> {
        let target = self.redo.pop()?;
        self.push_undo(current);
        self.coalescing_line = None;
        Some(target)
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    fn push_undo(&mut self, snapshot: DocumentSnapshot) {
        if self.limit == 0 {
            return;
        }
        self.undo.push_back(snapshot);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }
}
