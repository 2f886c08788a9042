//! Non-fatal notification queue.
//!
//! Pipeline and task failures end up here instead of unwinding across
//! subsystems. The queue is bounded: when full the oldest entry is dropped.
//! Clones share the same queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ERROR_LOG_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    /// Cause chain, one cause per line.
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorLog {
    queue: Arc<Mutex<VecDeque<Notification>>>,
    capacity: usize,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(ERROR_LOG_CAPACITY)
    }
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self { queue: Arc::new(Mutex::new(VecDeque::new())), capacity: capacity.max(1) }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, notification: Notification) {
        let mut q = self.lock();
        while q.len() >= self.capacity {
            q.pop_front();
        }
        q.push_back(notification);
    }

    /// Record an error with its full cause chain.
    pub fn report_error(&self, err: &anyhow::Error) {
        let causes: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
        log::error!("{:#}", err);
        self.push(Notification {
            kind: NotificationKind::Error,
            message: err.to_string(),
            detail: (!causes.is_empty()).then(|| causes.join("\n")),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.push(Notification { kind: NotificationKind::Warning, message, detail: None });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Notification { kind: NotificationKind::Info, message: message.into(), detail: None });
    }

    /// Most recent error, if any.
    pub fn last_error(&self) -> Option<Notification> {
        self.lock().iter().rev().find(|n| n.kind == NotificationKind::Error).cloned()
    }

    /// Take all pending notifications, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_chain_in_detail() {
        let log = ErrorLog::new(8);
        let err = std::fs::read("/nonexistent/scnodes")
            .context("reading input")
            .context("Load data failed")
            .unwrap_err();
        log.report_error(&err);

        let n = log.last_error().unwrap();
        assert_eq!(n.message, "Load data failed");
        let detail = n.detail.unwrap();
        assert!(detail.starts_with("reading input"));
        assert_eq!(detail.lines().count(), 2);
    }

    #[test]
    fn test_bounded_and_shared() {
        let log = ErrorLog::new(2);
        let other = log.clone();
        log.info("a");
        log.warn("b");
        other.info("c");
        let drained = log.drain();
        assert_eq!(drained.iter().map(|n| n.message.as_str()).collect::<Vec<_>>(), ["b", "c"]);
        assert!(other.is_empty());
        assert!(log.last_error().is_none());
    }
}
