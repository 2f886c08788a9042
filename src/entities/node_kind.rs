//! NodeKind - enum wrapper for all node types.
//!
//! Provides static dispatch of [`Node`] for the graph's node storage.

use enum_dispatch::enum_dispatch;
use uuid::Uuid;

use super::attrs::Attrs;
use super::frame::Frame;
use super::graph::EvalContext;
use super::node::{Node, NodeBase};
use super::nodes::{
    BinImageNode, CropImageNode, FrameSelectionNode, ImageCalculatorNode, LoadDataNode, ParticleDetectionNode,
    ReconstructionNode, SpatialFilterNode, TemporalFilterNode,
};

/// Enum containing all possible node types.
#[enum_dispatch(Node)]
#[derive(Debug)]
pub enum NodeKind {
    LoadData(LoadDataNode),
    Crop(CropImageNode),
    Bin(BinImageNode),
    SpatialFilter(SpatialFilterNode),
    TemporalFilter(TemporalFilterNode),
    ImageCalculator(ImageCalculatorNode),
    FrameSelection(FrameSelectionNode),
    ParticleDetection(ParticleDetectionNode),
    Reconstruction(ReconstructionNode),
}

impl NodeKind {
    /// Check if this node produces data without inputs
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::LoadData(_))
    }

    /// Get as LoadDataNode reference
    pub fn as_load_data(&self) -> Option<&LoadDataNode> {
        match self {
            NodeKind::LoadData(n) => Some(n),
            _ => None,
        }
    }

    /// Get as ReconstructionNode reference
    pub fn as_reconstruction(&self) -> Option<&ReconstructionNode> {
        match self {
            NodeKind::Reconstruction(n) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_reaches_inner_node() {
        let kind: NodeKind = SpatialFilterNode::new().into();
        assert_eq!(kind.title(), SpatialFilterNode::TITLE);
        assert!(!kind.is_source());
        assert!(kind.as_load_data().is_none());

        let src: NodeKind = LoadDataNode::new().into();
        assert!(src.is_source());
        assert_eq!(src.base().inputs().count(), 0);
    }

    #[test]
    fn test_reconstruction_is_index_independent() {
        let kind: NodeKind = ReconstructionNode::new().into();
        assert!(kind.index_independent());
        assert!(kind.base().buffer_last_output);
    }
}
