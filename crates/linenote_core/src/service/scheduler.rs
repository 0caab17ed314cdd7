//! Edit scheduling: per-line debounce deadlines and idle autosave.
//!
//! # Responsibility
//! - Record when lines were last edited and when the document was last
//!   touched.
//! - Answer which deadlines are due for a given instant.
//!
//! # Invariants
//! - The scheduler never runs work itself; the owning document polls it on
//!   the editing thread, so flushes never overlap.
//! - Re-arming a line's debounce replaces its previous deadline.

use crate::model::line::LineId;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub const DEFAULT_LINE_DEBOUNCE: Duration = Duration::from_millis(1000);
pub const DEFAULT_IDLE_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(5);

/// Time source for scheduling decisions.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Autosave timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit of a line before that line flushes.
    pub line_debounce: Duration,
    /// Granularity of the idle check.
    pub idle_tick: Duration,
    /// Document-wide inactivity before a full save.
    pub idle_threshold: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            line_debounce: DEFAULT_LINE_DEBOUNCE,
            idle_tick: DEFAULT_IDLE_TICK,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }
}

#[derive(Debug)]
pub(crate) struct EditScheduler {
    config: AutosaveConfig,
    debounce: BTreeMap<LineId, Instant>,
    last_activity: Instant,
    last_idle_check: Instant,
    stopped: bool,
}

impl EditScheduler {
    pub(crate) fn new(config: AutosaveConfig, now: Instant) -> Self {
        Self {
            config,
            debounce: BTreeMap::new(),
            last_activity: now,
            last_idle_check: now,
            stopped: false,
        }
    }

    pub(crate) fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub(crate) fn arm_debounce(&mut self, line_id: LineId, now: Instant) {
        if !self.stopped {
            self.debounce.insert(line_id, now + self.config.line_debounce);
        }
    }

    pub(crate) fn cancel(&mut self, line_id: LineId) {
        self.debounce.remove(&line_id);
    }

    pub(crate) fn cancel_all(&mut self) {
        self.debounce.clear();
        self.stopped = true;
    }

    #[cfg(test)]
    pub(crate) fn pending_debounces(&self) -> usize {
        self.debounce.len()
    }

    /// Removes and returns every line whose debounce deadline passed.
    pub(crate) fn take_due_lines(&mut self, now: Instant) -> Vec<LineId> {
        let due: Vec<LineId> = self
            .debounce
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(line_id, _)| *line_id)
            .collect();
        for line_id in &due {
            self.debounce.remove(line_id);
        }
        due
    }

    /// Whether an idle tick elapsed and the document has been idle long
    /// enough. Consumes the tick.
    pub(crate) fn take_idle_due(&mut self, now: Instant) -> bool {
        if self.stopped {
            return false;
        }
        if now.saturating_duration_since(self.last_idle_check) < self.config.idle_tick {
            return false;
        }
        self.last_idle_check = now;
        now.saturating_duration_since(self.last_activity) >= self.config.idle_threshold
    }
}
