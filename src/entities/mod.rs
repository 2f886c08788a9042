//! Entities - data model of the CLEM workbench
//!
//! Two families live here:
//! - correlation editor data: transforms, camera, world-placed frames
//! - node graph dataflow: frames/datasets, attributes, nodes, graph, registry

pub mod attrs;
pub mod roi;
pub mod image_io;
pub mod frame;
pub mod dataset;
pub mod space;
pub mod transform;
pub mod clem_frame;
pub mod camera;
pub mod particles;
pub mod attribute;
pub mod keys;
pub mod node;
pub mod nodes;
pub mod node_kind;
pub mod graph;
pub mod registry;
pub mod project;

pub use attribute::{AttributeRef, AttributeType, ConnectableAttribute, Direction};
pub use attrs::{AttrValue, Attrs};
pub use camera::{Camera, CameraRecord};
pub use clem_frame::{ClemFrame, Lut};
pub use dataset::Dataset;
pub use frame::{Frame, FrameError, FrameStatus};
pub use graph::{EvalContext, GraphError, NodeGraph};
pub use node::{Node, NodeBase};
pub use node_kind::NodeKind;
pub use particles::{Particle, ParticleSet};
pub use project::ProjectFile;
pub use roi::Roi;
pub use transform::Transform;
