//! In-memory query log
//!
//! Records every dispatched statement while enabled. A pretend call gets a
//! log of its own and hands its entries back to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::grammar::{Statement, StatementKind};

/// One logged statement
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    pub id: Uuid,
    pub kind: StatementKind,
    pub collection: String,
    /// Rendered statement
    pub statement: String,
    pub elapsed_ms: f64,
    /// Captured in pretend mode, never sent to the store
    pub pretended: bool,
    pub logged_at: DateTime<Utc>,
}

impl LoggedQuery {
    pub fn new(statement: &Statement, elapsed_ms: f64, pretended: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: statement.kind(),
            collection: statement.collection().to_string(),
            statement: statement.describe(),
            elapsed_ms,
            pretended,
            logged_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryLog {
    enabled: AtomicBool,
    entries: Mutex<Vec<LoggedQuery>>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that records from the start
    pub fn enabled() -> Self {
        let log = Self::default();
        log.enable();
        log
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LoggedQuery>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Append an entry when enabled
    pub fn record(&self, entry: LoggedQuery) {
        if self.is_enabled() {
            self.lock().push(entry);
        }
    }

    pub fn entries(&self) -> Vec<LoggedQuery> {
        self.lock().clone()
    }

    /// Remove and return every entry
    pub fn take(&self) -> Vec<LoggedQuery> {
        std::mem::take(&mut *self.lock())
    }

    pub fn flush(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
