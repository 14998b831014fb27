//! Statement counters
//!
//! Counters only, monotonic, reset only when the registry is created.
//! One registry lives on each connection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for every statement a connection dispatches
///
/// # Thread Safety
///
/// All counters are atomics with Relaxed ordering. A snapshot taken while
/// other threads are dispatching may mix values from different instants.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Statements that reached the store and succeeded
    statements_executed: AtomicU64,
    /// Statements the store rejected
    statements_failed: AtomicU64,
    /// Statements captured in pretend mode
    statements_pretended: AtomicU64,
    selects: AtomicU64,
    writes: AtomicU64,
    /// Rows returned by selects
    documents_returned: AtomicU64,
    /// Documents updated or deleted
    documents_affected: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_statements_executed(&self) {
        self.statements_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_statements_failed(&self) {
        self.statements_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_statements_pretended(&self) {
        self.statements_pretended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_selects(&self) {
        self.selects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_documents_returned(&self, count: u64) {
        self.documents_returned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_documents_affected(&self, count: u64) {
        self.documents_affected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn statements_executed(&self) -> u64 {
        self.statements_executed.load(Ordering::Relaxed)
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"statements_executed":{},"statements_failed":{},"statements_pretended":{},"selects":{},"writes":{},"documents_returned":{},"documents_affected":{}}}"#,
            s.statements_executed,
            s.statements_failed,
            s.statements_pretended,
            s.selects,
            s.writes,
            s.documents_returned,
            s.documents_affected,
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            statements_failed: self.statements_failed.load(Ordering::Relaxed),
            statements_pretended: self.statements_pretended.load(Ordering::Relaxed),
            selects: self.selects.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            documents_returned: self.documents_returned.load(Ordering::Relaxed),
            documents_affected: self.documents_affected.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub statements_executed: u64,
    pub statements_failed: u64,
    pub statements_pretended: u64,
    pub selects: u64,
    pub writes: u64,
    pub documents_returned: u64,
    pub documents_affected: u64,
}
