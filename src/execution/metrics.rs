//! Counters for the task driver.
//!
//! Plain atomics updated from every poll loop; [`TaskDriverMetrics::snapshot`]
//! gives a consistent-enough serializable view for logging and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct TaskDriverMetrics {
    tasks_started: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_timed_out: AtomicU64,
    empty_polls: AtomicU64,
    fetch_errors: AtomicU64,
    lost_acquisitions: AtomicU64,
    leftover_tasks_recovered: AtomicU64,
    wait_time_count: AtomicU64,
    wait_time_sum_ms: AtomicU64,
    wait_time_max_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskDriverMetricsSnapshot {
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_timed_out: u64,
    pub empty_polls: u64,
    pub fetch_errors: u64,
    pub lost_acquisitions: u64,
    pub leftover_tasks_recovered: u64,
    pub wait_time_count: u64,
    pub wait_time_sum_ms: u64,
    pub wait_time_max_ms: u64,
}

impl TaskDriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_succeeded(&self) {
        self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_timed_out(&self) {
        self.tasks_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost_acquisition(&self) {
        self.lost_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leftover_recovered(&self, count: u64) {
        self.leftover_tasks_recovered.fetch_add(count, Ordering::Relaxed);
    }

    /// Time between a task's creation and its acquisition
    pub fn record_wait_time(&self, wait: Duration) {
        let ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self.wait_time_count.fetch_add(1, Ordering::Relaxed);
        self.wait_time_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.wait_time_max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskDriverMetricsSnapshot {
        TaskDriverMetricsSnapshot {
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_timed_out: self.tasks_timed_out.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            lost_acquisitions: self.lost_acquisitions.load(Ordering::Relaxed),
            leftover_tasks_recovered: self.leftover_tasks_recovered.load(Ordering::Relaxed),
            wait_time_count: self.wait_time_count.load(Ordering::Relaxed),
            wait_time_sum_ms: self.wait_time_sum_ms.load(Ordering::Relaxed),
            wait_time_max_ms: self.wait_time_max_ms.load(Ordering::Relaxed),
        }
    }
}
