//! scnodes - CLEM workbench core
//!
//! Node-graph image pipeline (lazy pull evaluation with dirty tracking and
//! buffered outputs) plus the correlation editor engine: frame transforms,
//! camera, gizmos and tiled export rendering.

// Session state (context, notifications, tasks, workers)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod editor;
pub mod entities;
pub mod paths;

pub use core::{AppContext, ErrorLog};
pub use editor::CorrelationEditor;
pub use entities::{Attrs, AttrValue, ClemFrame, Dataset, Frame, NodeGraph, Transform};
