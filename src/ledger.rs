//! Per-agent performance counters and bounded error log
//!
//! Updated at the start and end of every invocation regardless of outcome.
//! Counters are atomic; the error log sits behind its own lock and evicts
//! oldest-first at capacity. Guardrail blocks and per-tool failures are
//! expected outcomes and never enter the error log.

use crate::error::ErrorKind;
use crate::pipeline::TurnStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Default capacity of the bounded error log
pub const DEFAULT_MAX_ERROR_RECORDS: usize = 100;

/// One recorded technical failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub kind: ErrorKind,
}

/// Serializable view of the ledger at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub total_execution_seconds: f64,
    pub average_execution_seconds: f64,
    pub success_rate: f64,
    pub recent_errors: Vec<ErrorRecord>,
}

/// Thread-safe per-agent task counters and error log
pub struct PerformanceLedger {
    total_tasks: AtomicU64,
    successful_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    total_execution_micros: AtomicU64,
    errors: Mutex<VecDeque<ErrorRecord>>,
    max_error_records: usize,
}

impl PerformanceLedger {
    pub fn new(max_error_records: usize) -> Self {
        Self {
            total_tasks: AtomicU64::new(0),
            successful_tasks: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
            total_execution_micros: AtomicU64::new(0),
            errors: Mutex::new(VecDeque::new()),
            max_error_records,
        }
    }

    /// Called when an invocation begins
    pub fn task_started(&self) {
        self.total_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// Called when an invocation finishes, whatever the outcome
    ///
    /// A blocked turn is neither a success nor a failure: the pipeline did
    /// what it was asked to do, and the block is reported in the result.
    pub fn task_completed(&self, duration: Duration, status: TurnStatus) {
        match status {
            TurnStatus::Success => {
                self.successful_tasks.fetch_add(1, Ordering::Relaxed);
            }
            TurnStatus::Error => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            TurnStatus::Blocked => {}
        }
        self.total_execution_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Append a technical failure to the bounded log, oldest evicted first
    pub fn record_error(&self, kind: ErrorKind, message: impl Into<String>) {
        let record = ErrorRecord {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
        };
        let mut errors = self.lock_errors();
        errors.push_back(record);
        while errors.len() > self.max_error_records {
            errors.pop_front();
        }
    }

    /// Complete point-in-time view with derived rates, division-guarded
    pub fn snapshot(&self) -> LedgerSnapshot {
        let total = self.total_tasks.load(Ordering::Relaxed);
        let successful = self.successful_tasks.load(Ordering::Relaxed);
        let failed = self.failed_tasks.load(Ordering::Relaxed);
        let total_seconds =
            self.total_execution_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;

        let average = if total == 0 {
            0.0
        } else {
            total_seconds / total as f64
        };
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };

        LedgerSnapshot {
            total_tasks: total,
            successful_tasks: successful,
            failed_tasks: failed,
            total_execution_seconds: total_seconds,
            average_execution_seconds: average,
            success_rate,
            recent_errors: self.lock_errors().iter().cloned().collect(),
        }
    }

    /// Reset all counters and drop recorded errors
    pub fn reset(&self) {
        self.total_tasks.store(0, Ordering::Relaxed);
        self.successful_tasks.store(0, Ordering::Relaxed);
        self.failed_tasks.store(0, Ordering::Relaxed);
        self.total_execution_micros.store(0, Ordering::Relaxed);
        self.lock_errors().clear();
    }

    fn lock_errors(&self) -> std::sync::MutexGuard<'_, VecDeque<ErrorRecord>> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PerformanceLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERROR_RECORDS)
    }
}
