//! Core session modules - context, notifications, tasks, workers
//!
//! These modules run the engine independent of any front-end.

pub mod context;
pub mod error_log;
pub mod tasks;
pub mod workers;

pub use context::{ActiveEditor, AppContext};
pub use error_log::{ErrorLog, Notification, NotificationKind};
pub use tasks::{TaskHandle, TaskOutcome, TaskQueue, TaskReport};
pub use workers::Workers;
