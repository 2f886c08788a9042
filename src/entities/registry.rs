//! Static node registry.
//!
//! Each entry describes one node type: title, palette group, colour, sort
//! order and a factory. Lookups are by title, which is also the key used in
//! saved projects.

use indexmap::IndexMap;

use super::node_kind::NodeKind;
use super::nodes::{
    BinImageNode, CropImageNode, FrameSelectionNode, ImageCalculatorNode, LoadDataNode, ParticleDetectionNode,
    ReconstructionNode, SpatialFilterNode, TemporalFilterNode,
};

#[derive(Debug, Clone, Copy)]
pub struct NodeDescriptor {
    pub title: &'static str,
    pub group: &'static str,
    pub colour: [u8; 3],
    pub sort_id: u32,
    pub enabled: bool,
    pub create: fn() -> NodeKind,
}

const IO: [u8; 3] = [84, 140, 200];
const IMAGE: [u8; 3] = [110, 180, 110];
const PARTICLES: [u8; 3] = [200, 140, 70];

pub static NODE_REGISTRY: &[NodeDescriptor] = &[
    NodeDescriptor {
        title: LoadDataNode::TITLE,
        group: "Data IO",
        colour: IO,
        sort_id: 0,
        enabled: true,
        create: || LoadDataNode::new().into(),
    },
    NodeDescriptor {
        title: CropImageNode::TITLE,
        group: "Image processing",
        colour: IMAGE,
        sort_id: 10,
        enabled: true,
        create: || CropImageNode::new().into(),
    },
    NodeDescriptor {
        title: BinImageNode::TITLE,
        group: "Image processing",
        colour: IMAGE,
        sort_id: 11,
        enabled: true,
        create: || BinImageNode::new().into(),
    },
    NodeDescriptor {
        title: SpatialFilterNode::TITLE,
        group: "Image processing",
        colour: IMAGE,
        sort_id: 12,
        enabled: true,
        create: || SpatialFilterNode::new().into(),
    },
    NodeDescriptor {
        title: TemporalFilterNode::TITLE,
        group: "Image processing",
        colour: IMAGE,
        sort_id: 13,
        enabled: true,
        create: || TemporalFilterNode::new().into(),
    },
    NodeDescriptor {
        title: ImageCalculatorNode::TITLE,
        group: "Image processing",
        colour: IMAGE,
        sort_id: 14,
        enabled: true,
        create: || ImageCalculatorNode::new().into(),
    },
    NodeDescriptor {
        title: FrameSelectionNode::TITLE,
        group: "Image processing",
        colour: IMAGE,
        sort_id: 15,
        enabled: true,
        create: || FrameSelectionNode::new().into(),
    },
    NodeDescriptor {
        title: ParticleDetectionNode::TITLE,
        group: "PSF-fitting reconstruction",
        colour: PARTICLES,
        sort_id: 20,
        enabled: true,
        create: || ParticleDetectionNode::new().into(),
    },
    NodeDescriptor {
        title: ReconstructionNode::TITLE,
        group: "PSF-fitting reconstruction",
        colour: PARTICLES,
        sort_id: 21,
        enabled: true,
        create: || ReconstructionNode::new().into(),
    },
];

pub fn find(title: &str) -> Option<&'static NodeDescriptor> {
    NODE_REGISTRY.iter().find(|d| d.title == title)
}

/// New node instance for an enabled title.
pub fn create(title: &str) -> Option<NodeKind> {
    find(title).filter(|d| d.enabled).map(|d| (d.create)())
}

/// Enabled descriptors grouped for a palette, each group sorted by `sort_id`.
pub fn by_group() -> IndexMap<&'static str, Vec<&'static NodeDescriptor>> {
    let mut sorted: Vec<&NodeDescriptor> = NODE_REGISTRY.iter().filter(|d| d.enabled).collect();
    sorted.sort_by_key(|d| d.sort_id);
    let mut groups: IndexMap<&'static str, Vec<&'static NodeDescriptor>> = IndexMap::new();
    for d in sorted {
        groups.entry(d.group).or_default().push(d);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::node::Node;

    #[test]
    fn test_titles_unique_and_factories_match() {
        for d in NODE_REGISTRY {
            assert_eq!(NODE_REGISTRY.iter().filter(|o| o.title == d.title).count(), 1);
            assert_eq!((d.create)().title(), d.title);
        }
    }

    #[test]
    fn test_create_and_groups() {
        assert!(create("Spatial filter").is_some());
        assert!(create("Neural network").is_none());
        let groups = by_group();
        assert_eq!(groups.keys().next(), Some(&"Data IO"));
        let image = &groups["Image processing"];
        assert!(image.windows(2).all(|w| w[0].sort_id < w[1].sort_id));
    }
}
