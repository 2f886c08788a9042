//! Background tasks with progress and cooperative cancellation.
//!
//! Each task runs on its own named thread and reports through a shared
//! [`TaskHandle`]: progress is an `f64` in `[0, 1]` stored as bits in an
//! atomic, and a stop flag the task body checks between work units.
//! Outcomes come back over a crossbeam channel and are collected by
//! [`TaskQueue::poll`]. A failing task never takes the process down: its
//! error goes to the [`ErrorLog`] and its progress is forced to 1.0.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};

use super::error_log::{ErrorLog, Notification, NotificationKind};

/// Shared progress/stop state of one task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: Arc<str>,
    progress: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            progress: Arc::new(AtomicU64::new(0f64.to_bits())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Relaxed))
    }

    pub fn set_progress(&self, value: f64) {
        let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.progress.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Finished,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub name: String,
    pub outcome: TaskOutcome,
}

struct RunningTask {
    handle: TaskHandle,
    thread: JoinHandle<()>,
}

pub struct TaskQueue {
    running: Vec<RunningTask>,
    tx: Sender<TaskReport>,
    rx: Receiver<TaskReport>,
    errors: ErrorLog,
}

impl TaskQueue {
    pub fn new(errors: ErrorLog) -> Self {
        let (tx, rx) = unbounded();
        Self { running: Vec::new(), tx, rx, errors }
    }

    /// Start `body` on a new thread named `scnodes-task-{name}`.
    pub fn spawn<F>(&mut self, name: &str, body: F) -> Result<TaskHandle>
    where
        F: FnOnce(&TaskHandle) -> Result<()> + Send + 'static,
    {
        let handle = TaskHandle::new(name);
        let task_handle = handle.clone();
        let tx = self.tx.clone();
        let errors = self.errors.clone();

        let thread = thread::Builder::new()
            .name(format!("scnodes-task-{}", name))
            .spawn(move || {
                log::debug!("Task '{}' started", task_handle.name());
                let outcome = match body(&task_handle) {
                    Ok(()) if task_handle.stop_requested() => TaskOutcome::Cancelled,
                    Ok(()) => TaskOutcome::Finished,
                    Err(e) => {
                        let e = e.context(format!("Task '{}' failed", task_handle.name()));
                        errors.report_error(&e);
                        TaskOutcome::Failed(format!("{:#}", e))
                    }
                };
                task_handle.set_progress(1.0);
                log::debug!("Task '{}' ended: {:?}", task_handle.name(), outcome);
                // Receiver lives as long as the queue; a dropped queue just discards the report.
                let _ = tx.send(TaskReport { name: task_handle.name().to_string(), outcome });
            })
            .with_context(|| format!("Failed to spawn task thread '{}'", name))?;

        self.running.push(RunningTask { handle: handle.clone(), thread });
        Ok(handle)
    }

    /// Collect reports of finished tasks and drop them from the queue.
    pub fn poll(&mut self) -> Vec<TaskReport> {
        let (done, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.running).into_iter().partition(|t| t.thread.is_finished());
        self.running = running;
        for task in done {
            if task.thread.join().is_err() {
                self.errors.push(Notification {
                    kind: NotificationKind::Error,
                    message: format!("Task '{}' panicked", task.handle.name()),
                    detail: None,
                });
            }
        }
        self.rx.try_iter().collect()
    }

    /// Block until every running task has ended.
    pub fn wait_all(&mut self) -> Vec<TaskReport> {
        for task in std::mem::take(&mut self.running) {
            if task.thread.join().is_err() {
                log::error!("Task '{}' panicked", task.handle.name());
            }
        }
        self.rx.try_iter().collect()
    }

    pub fn stop_all(&self) {
        for task in &self.running {
            task.handle.request_stop();
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = &TaskHandle> {
        self.running.iter().map(|t| &t.handle)
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.stop_all();
        self.wait_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_progress_bits_roundtrip() {
        let h = TaskHandle::new("t");
        h.set_progress(0.375);
        assert_eq!(h.progress(), 0.375);
        h.set_progress(3.0);
        assert_eq!(h.progress(), 1.0);
    }

    #[test]
    fn test_failed_task_reports_and_completes() {
        let errors = ErrorLog::default();
        let mut q = TaskQueue::new(errors.clone());
        let h = q.spawn("broken", |_| anyhow::bail!("disk full")).unwrap();
        let reports = q.wait_all();

        assert_eq!(h.progress(), 1.0);
        assert!(matches!(&reports[0].outcome, TaskOutcome::Failed(m) if m.contains("disk full")));
        let last = errors.last_error().unwrap();
        assert!(last.message.contains("broken"));
        assert!(q.is_empty());
    }

    #[test]
    fn test_stop_flag_cancels() {
        let mut q = TaskQueue::new(ErrorLog::default());
        let h = q
            .spawn("loop", |h| {
                while !h.stop_requested() {
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            })
            .unwrap();
        h.request_stop();
        let reports = q.wait_all();
        assert_eq!(reports, vec![TaskReport { name: "loop".into(), outcome: TaskOutcome::Cancelled }]);
    }

    #[test]
    fn test_poll_removes_finished() {
        let mut q = TaskQueue::new(ErrorLog::default());
        q.spawn("quick", |h| {
            h.set_progress(0.5);
            Ok(())
        })
        .unwrap();
        let mut reports = Vec::new();
        for _ in 0..1000 {
            reports.extend(q.poll());
            if q.is_empty() && !reports.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(q.is_empty());
        assert_eq!(reports[0].outcome, TaskOutcome::Finished);
    }
}
