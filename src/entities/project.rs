//! Project persistence (JSON).
//!
//! A project stores the node graph (node ids, titles, parameters, buffer
//! flags and links by node id + attribute name), the correlation editor's
//! frames and the editor camera. Loading recreates nodes through the
//! registry, keeps their ids and re-links by id.
//!
//! Datasets handed to a Load data node in memory are not stored; only its
//! `path` parameter is.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attribute::AttributeRef;
use super::attrs::Attrs;
use super::camera::{Camera, CameraRecord};
use super::clem_frame::ClemFrame;
use super::graph::NodeGraph;
use super::node::Node;
use super::registry;
use crate::core::error_log::ErrorLog;

pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: Uuid,
    pub title: String,
    pub params: Attrs,
    pub buffer_last_output: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub from: AttributeRef,
    pub to: AttributeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub version: u32,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
    #[serde(default)]
    pub frames: Vec<ClemFrame>,
    #[serde(default)]
    pub camera: Option<CameraRecord>,
}

impl ProjectFile {
    /// Snapshot a graph plus editor state.
    pub fn capture<'a>(
        graph: &NodeGraph,
        frames: impl IntoIterator<Item = &'a ClemFrame>,
        camera: Option<&Camera>,
    ) -> Self {
        let order = graph.topological_order();
        let mut nodes = Vec::with_capacity(order.len());
        let mut links = Vec::new();
        for id in order {
            let Some(node) = graph.node(id) else { continue };
            let base = node.base();
            nodes.push(NodeRecord {
                id,
                title: base.title.to_string(),
                params: base.params.clone(),
                buffer_last_output: base.buffer_last_output,
            });
            for input in base.inputs() {
                if let Some(l) = input.link() {
                    links.push(LinkRecord { from: l.clone(), to: AttributeRef::new(id, input.name.clone()) });
                }
            }
        }
        Self {
            version: PROJECT_VERSION,
            nodes,
            links,
            frames: frames.into_iter().cloned().collect(),
            camera: camera.map(Camera::record),
        }
    }

    /// Rebuild the node graph. Nodes keep their saved ids.
    pub fn restore_graph(&self, errors: ErrorLog) -> Result<NodeGraph> {
        if self.version > PROJECT_VERSION {
            bail!("Project version {} is newer than supported {}", self.version, PROJECT_VERSION);
        }
        let mut graph = NodeGraph::new(errors);
        for rec in &self.nodes {
            let mut node = registry::create(&rec.title)
                .with_context(|| format!("Unknown node type '{}' ({})", rec.title, rec.id))?;
            let base = node.base_mut();
            base.id = rec.id;
            base.buffer_last_output = rec.buffer_last_output;
            for (key, value) in rec.params.iter() {
                base.params.set(key.clone(), value.clone());
            }
            base.params.clear_dirty();
            node.on_param_changed();
            graph.add_node(node);
        }
        for link in &self.links {
            graph
                .connect(link.from.clone(), link.to.clone())
                .with_context(|| format!("Failed to restore link into '{}'", link.to.attribute))?;
        }
        Ok(graph)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serialize project error")
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Parse project error")
    }

    /// Write to `path` (extension forced to `.json`).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let path = if path.extension().and_then(|s| s.to_str()) != Some("json") {
            path.with_extension("json")
        } else {
            path.to_path_buf()
        };
        fs::write(&path, self.to_json_string()?).with_context(|| format!("Write project error: {}", path.display()))?;
        log::info!("Saved project {}", path.display());
        Ok(())
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("Read project error: {}", path.display()))?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::attrs::AttrValue;
    use crate::entities::keys::*;
    use crate::entities::transform::Transform;

    fn sample_graph() -> (NodeGraph, [Uuid; 3]) {
        let mut g = NodeGraph::default();
        let load = g.create_node("Load data").unwrap();
        let filter = g.create_node("Spatial filter").unwrap();
        let recon = g.create_node("Reconstruction").unwrap();
        let det = g.create_node("Particle detection").unwrap();
        g.connect(AttributeRef::new(load, A_DATASET_OUT), AttributeRef::new(filter, A_DATASET_IN)).unwrap();
        g.connect(AttributeRef::new(filter, A_DATASET_OUT), AttributeRef::new(det, A_DATASET_IN)).unwrap();
        g.connect(AttributeRef::new(det, A_COORDINATES_OUT), AttributeRef::new(recon, A_COORDINATES_IN)).unwrap();
        g.set_param(filter, P_SIGMA, AttrValue::Float(2.5)).unwrap();
        g.set_param(load, P_PATH, AttrValue::Str("/data/stack".into())).unwrap();
        (g, [load, filter, recon])
    }

    #[test]
    fn test_graph_roundtrip_keeps_ids_and_links() {
        let (g, [load, filter, recon]) = sample_graph();
        let mut frame = ClemFrame::new("em", 2, 2, vec![0.0, 1.0, 2.0, 3.0], 5.0).unwrap();
        frame.transform = Transform::new([10.0, -4.0], 12.0, 1.5);
        let cam = Camera::new(640.0, 480.0);

        let file = ProjectFile::capture(&g, [&frame], Some(&cam));
        let json = file.to_json_string().unwrap();
        let back = ProjectFile::from_json_str(&json).unwrap();
        assert_eq!(back, file);

        let restored = back.restore_graph(ErrorLog::default()).unwrap();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.upstream(filter), vec![load]);
        assert_eq!(restored.node(filter).unwrap().params().get_float(P_SIGMA), Some(2.5));
        assert!(!restored.node(filter).unwrap().base().any_change());
        assert!(restored.node(recon).unwrap().base().buffer_last_output);
        assert_eq!(back.frames[0].transform, frame.transform);
    }

    #[test]
    fn test_unknown_title_fails() {
        let file = ProjectFile {
            version: PROJECT_VERSION,
            nodes: vec![NodeRecord {
                id: Uuid::new_v4(),
                title: "Segmentation".into(),
                params: Attrs::new(),
                buffer_last_output: false,
            }],
            links: Vec::new(),
            frames: Vec::new(),
            camera: None,
        };
        let err = file.restore_graph(ErrorLog::default()).unwrap_err();
        assert!(err.to_string().contains("Segmentation"));
    }

    #[test]
    fn test_file_roundtrip() {
        let (g, _) = sample_graph();
        let path = std::env::temp_dir().join(format!("scnodes-project-{}", Uuid::new_v4()));
        ProjectFile::capture(&g, [], None).to_json(&path).unwrap();
        let json_path = path.with_extension("json");
        let back = ProjectFile::from_json(&json_path).unwrap();
        assert_eq!(back.nodes.len(), 4);
        std::fs::remove_file(json_path).unwrap();
    }
}
