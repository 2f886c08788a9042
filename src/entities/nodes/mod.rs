//! Built-in processing nodes.
//!
//! Every node receives owned frames from upstream (`ctx.pull` returns a
//! copy), so modifying the received frame never touches upstream buffers.

pub mod bin;
pub mod crop;
pub mod frame_selection;
pub mod image_calculator;
pub mod load_data;
pub mod particle_detection;
pub mod reconstruction;
pub mod spatial_filter;
pub mod temporal_filter;

pub use bin::BinImageNode;
pub use crop::CropImageNode;
pub use frame_selection::FrameSelectionNode;
pub use image_calculator::ImageCalculatorNode;
pub use load_data::LoadDataNode;
pub use particle_detection::ParticleDetectionNode;
pub use reconstruction::ReconstructionNode;
pub use spatial_filter::SpatialFilterNode;
pub use temporal_filter::TemporalFilterNode;

use anyhow::Result;

use super::frame::Frame;
use super::graph::EvalContext;
use super::keys::A_DATASET_IN;
use super::node::NodeBase;

/// Pull the frame feeding the standard dataset input.
pub(crate) fn pull_dataset(ctx: &EvalContext, base: &NodeBase, idx: Option<usize>) -> Result<Option<Frame>> {
    ctx.pull(base.id, A_DATASET_IN, idx)
}
