//! Node graph: storage, linking and pull evaluation.
//!
//! # Evaluation
//!
//! `get_image(node, idx)` builds an [`EvalContext`] and evaluates the node.
//! A node asks the context for its inputs (`ctx.pull`), which evaluates the
//! upstream node depth first. The context keeps an explicit stack of nodes
//! being evaluated, so a cycle is reported as an error instead of
//! recursing forever.
//!
//! # Invalidation
//!
//! Buffered outputs are dropped for a node and everything downstream of it
//! whenever its parameters or incoming links change. `on_update()` is the
//! per-tick hook that consumes the `any_change` flags.
//!
//! # Errors
//!
//! `try_get_image` returns the full `anyhow` chain. `get_image` records it
//! in the shared [`ErrorLog`] and returns `None`, so callers keep running.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};

use anyhow::Context;
use indexmap::IndexMap;
use uuid::Uuid;

use super::attribute::{AttributeRef, AttributeType, Direction};
use super::attrs::AttrValue;
use super::frame::Frame;
use super::node::Node;
use super::node_kind::NodeKind;
use super::registry;
use crate::core::error_log::ErrorLog;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    NodeNotFound(Uuid),
    UnknownNodeType(String),
    AttributeNotFound { node: Uuid, attribute: String },
    WrongDirection { attribute: String, expected: Direction },
    TypeMismatch { from: AttributeType, to: AttributeType },
    SelfLink(Uuid),
    NoCompatibleAttribute { from: Uuid, to: Uuid },
    /// Titles of the nodes forming the cycle.
    Cycle(Vec<String>),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::NodeNotFound(id) => write!(f, "Node {} not found", id),
            GraphError::UnknownNodeType(t) => write!(f, "Unknown node type '{}'", t),
            GraphError::AttributeNotFound { node, attribute } => {
                write!(f, "Node {} has no attribute '{}'", node, attribute)
            }
            GraphError::WrongDirection { attribute, expected } => {
                write!(f, "Attribute '{}' is not an {:?}", attribute, expected)
            }
            GraphError::TypeMismatch { from, to } => write!(f, "Cannot link {:?} to {:?}", from, to),
            GraphError::SelfLink(id) => write!(f, "Cannot link node {} to itself", id),
            GraphError::NoCompatibleAttribute { from, to } => {
                write!(f, "No compatible free input on {} for outputs of {}", to, from)
            }
            GraphError::Cycle(path) => write!(f, "Graph cycle: {}", path.join(" -> ")),
        }
    }
}

impl std::error::Error for GraphError {}

#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: IndexMap<Uuid, NodeKind>,
    errors: ErrorLog,
}

impl NodeGraph {
    pub fn new(errors: ErrorLog) -> Self {
        Self { nodes: IndexMap::new(), errors }
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    // === Nodes ===

    /// Create a node from the registry by title and insert it.
    pub fn create_node(&mut self, title: &str) -> Result<Uuid, GraphError> {
        let node = registry::create(title).ok_or_else(|| GraphError::UnknownNodeType(title.to_string()))?;
        Ok(self.add_node(node))
    }

    pub fn add_node(&mut self, node: NodeKind) -> Uuid {
        let id = node.id();
        log::debug!("Added node '{}' ({})", node.title(), id);
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and every link to it.
    pub fn remove_node(&mut self, id: Uuid) -> Option<NodeKind> {
        let consumers = self.downstream(id);
        let node = self.nodes.shift_remove(&id)?;
        for consumer in &consumers {
            if let Some(n) = self.nodes.get_mut(consumer) {
                for input in n.base_mut().inputs_mut() {
                    if input.link().is_some_and(|l| l.node == id) {
                        input.set_link(None);
                    }
                }
            }
        }
        for consumer in consumers {
            self.invalidate(consumer);
        }
        log::debug!("Removed node '{}' ({})", node.title(), id);
        Some(node)
    }

    pub fn node(&self, id: Uuid) -> Option<&NodeKind> {
        self.nodes.get(&id)
    }

    /// Mutate a node; its output and everything downstream is invalidated after.
    pub fn with_node_mut<R>(&mut self, id: Uuid, f: impl FnOnce(&mut NodeKind) -> R) -> Result<R, GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        let out = f(node);
        node.on_param_changed();
        self.invalidate(id);
        Ok(out)
    }

    /// Set one parameter (raises the node's `any_change`).
    pub fn set_param(&mut self, id: Uuid, key: &str, value: AttrValue) -> Result<(), GraphError> {
        self.with_node_mut(id, |n| n.base_mut().params.set(key, value))
    }

    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeKind> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // === Links ===

    /// Link output `from` to input `to`.
    ///
    /// An already linked input is re-pointed; the previous link is returned.
    pub fn connect(&mut self, from: AttributeRef, to: AttributeRef) -> Result<Option<AttributeRef>, GraphError> {
        if from.node == to.node {
            return Err(GraphError::SelfLink(from.node));
        }
        let src = self.attribute_of(&from)?;
        if src.direction != Direction::Output {
            return Err(GraphError::WrongDirection { attribute: from.attribute, expected: Direction::Output });
        }
        let dst = self.attribute_of(&to)?;
        if dst.direction != Direction::Input {
            return Err(GraphError::WrongDirection { attribute: to.attribute, expected: Direction::Input });
        }
        if !src.ty.compatible(dst.ty) {
            return Err(GraphError::TypeMismatch { from: src.ty, to: dst.ty });
        }
        if let Some(path) = self.path_between(to.node, from.node) {
            let titles = path
                .iter()
                .chain(std::iter::once(&to.node))
                .filter_map(|id| self.nodes.get(id).map(|n| n.title().to_string()))
                .collect();
            return Err(GraphError::Cycle(titles));
        }

        let consumer = to.node;
        let attr_name = to.attribute.clone();
        let previous = self
            .nodes
            .get_mut(&consumer)
            .and_then(|n| n.base_mut().attribute_mut(&attr_name))
            .and_then(|a| a.set_link(Some(from)));
        self.invalidate(consumer);
        Ok(previous)
    }

    /// Link the first output of `from` to the first free compatible input of `to`.
    pub fn connect_auto(&mut self, from: Uuid, to: Uuid) -> Result<AttributeRef, GraphError> {
        let src = self.nodes.get(&from).ok_or(GraphError::NodeNotFound(from))?;
        let dst = self.nodes.get(&to).ok_or(GraphError::NodeNotFound(to))?;
        let pair = src.base().outputs().find_map(|out| {
            dst.base()
                .inputs()
                .find(|inp| !inp.is_linked() && out.ty.compatible(inp.ty))
                .map(|inp| (out.name.clone(), inp.name.clone()))
        });
        let (out, inp) = pair.ok_or(GraphError::NoCompatibleAttribute { from, to })?;
        let target = AttributeRef::new(to, inp);
        self.connect(AttributeRef::new(from, out), target.clone())?;
        Ok(target)
    }

    /// Remove the link into input `to`, returning it.
    pub fn disconnect(&mut self, to: &AttributeRef) -> Result<Option<AttributeRef>, GraphError> {
        let node = self.nodes.get_mut(&to.node).ok_or(GraphError::NodeNotFound(to.node))?;
        let attr = node.base_mut().attribute_mut(&to.attribute).ok_or_else(|| GraphError::AttributeNotFound {
            node: to.node,
            attribute: to.attribute.clone(),
        })?;
        let previous = attr.set_link(None);
        self.invalidate(to.node);
        Ok(previous)
    }

    fn attribute_of(&self, r: &AttributeRef) -> Result<&super::attribute::ConnectableAttribute, GraphError> {
        let node = self.nodes.get(&r.node).ok_or(GraphError::NodeNotFound(r.node))?;
        node.base()
            .attribute(&r.attribute)
            .ok_or_else(|| GraphError::AttributeNotFound { node: r.node, attribute: r.attribute.clone() })
    }

    /// Direct upstream node ids.
    pub fn upstream(&self, id: Uuid) -> Vec<Uuid> {
        self.nodes.get(&id).map(|n| n.base().upstream_ids()).unwrap_or_default()
    }

    /// Direct downstream node ids (consumers of any output).
    pub fn downstream(&self, id: Uuid) -> Vec<Uuid> {
        self.nodes
            .values()
            .filter(|n| n.base().inputs().any(|a| a.link().is_some_and(|l| l.node == id)))
            .map(|n| n.id())
            .collect()
    }

    /// Downstream path `from -> ... -> to`, if one exists.
    fn path_between(&self, from: Uuid, to: Uuid) -> Option<Vec<Uuid>> {
        let mut parent: IndexMap<Uuid, Uuid> = IndexMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = HashSet::from([from]);
        while let Some(cur) = queue.pop_front() {
            if cur == to {
                let mut path = vec![to];
                let mut at = to;
                while let Some(&p) = parent.get(&at) {
                    path.push(p);
                    at = p;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.downstream(cur) {
                if seen.insert(next) {
                    parent.insert(next, cur);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Nodes in dependency order (sources first).
    pub fn topological_order(&self) -> Vec<Uuid> {
        let mut indegree: IndexMap<Uuid, usize> =
            self.nodes.keys().map(|&id| (id, self.upstream(id).len())).collect();
        let mut ready: VecDeque<Uuid> =
            indegree.iter().filter(|&(_, &d)| d == 0).map(|(&id, _)| id).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for next in self.downstream(id) {
                let links = self.upstream(next).iter().filter(|&&u| u == id).count();
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= links;
                    if *d == 0 {
                        ready.push_back(next);
                    }
                }
            }
        }
        order
    }

    // === Dirty tracking ===

    /// Drop buffered outputs of `id` and everything downstream.
    pub fn invalidate(&self, id: Uuid) {
        let mut queue = VecDeque::from([id]);
        let mut seen = HashSet::new();
        while let Some(cur) = queue.pop_front() {
            if !seen.insert(cur) {
                continue;
            }
            if let Some(n) = self.nodes.get(&cur) {
                n.base().clear_buffer();
            }
            queue.extend(self.downstream(cur));
        }
    }

    /// Per-tick update: propagate and clear `any_change`. Returns changed ids.
    pub fn on_update(&self) -> Vec<Uuid> {
        let changed: Vec<Uuid> = self.nodes.values().filter(|n| n.base().any_change()).map(|n| n.id()).collect();
        for &id in &changed {
            self.invalidate(id);
            if let Some(n) = self.nodes.get(&id) {
                n.base().params.clear_dirty();
            }
        }
        if !changed.is_empty() {
            log::trace!("Graph update: {} node(s) changed", changed.len());
        }
        changed
    }

    // === Evaluation ===

    /// Evaluate `id` at `idx`; errors carry the full context chain.
    pub fn try_get_image(&self, id: Uuid, idx: Option<usize>) -> anyhow::Result<Option<Frame>> {
        EvalContext::new(self).evaluate(id, idx)
    }

    /// Evaluate `id` at `idx`; failures go to the error log and yield `None`.
    pub fn get_image(&self, id: Uuid, idx: Option<usize>) -> Option<Frame> {
        match self.try_get_image(id, idx) {
            Ok(frame) => frame,
            Err(e) => {
                self.errors.report_error(&e);
                None
            }
        }
    }

    pub fn frame_count(&self, id: Uuid) -> usize {
        EvalContext::new(self).frame_count(id)
    }

    /// Run `f` with a fresh evaluation context.
    pub fn evaluate_with<R>(&self, f: impl FnOnce(&EvalContext) -> R) -> R {
        f(&EvalContext::new(self))
    }
}

/// Per-pull evaluation state.
pub struct EvalContext<'a> {
    graph: &'a NodeGraph,
    stack: RefCell<Vec<Uuid>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(graph: &'a NodeGraph) -> Self {
        Self { graph, stack: RefCell::new(Vec::new()) }
    }

    pub fn graph(&self) -> &NodeGraph {
        self.graph
    }

    fn enter(&self, id: Uuid) -> anyhow::Result<()> {
        let mut stack = self.stack.borrow_mut();
        if let Some(pos) = stack.iter().position(|&s| s == id) {
            let titles = stack[pos..]
                .iter()
                .chain(std::iter::once(&id))
                .filter_map(|s| self.graph.node(*s).map(|n| n.title().to_string()))
                .collect();
            return Err(GraphError::Cycle(titles).into());
        }
        stack.push(id);
        Ok(())
    }

    fn leave(&self) {
        self.stack.borrow_mut().pop();
    }

    /// Evaluate a node, honouring its output buffer.
    pub fn evaluate(&self, id: Uuid, idx: Option<usize>) -> anyhow::Result<Option<Frame>> {
        let node = self.graph.node(id).ok_or(GraphError::NodeNotFound(id))?;
        let base = node.base();
        let idx = if node.index_independent() { None } else { idx };

        if base.buffer_last_output
            && let Some(frame) = base.buffered(idx)
        {
            log::trace!("'{}' buffered output for {:?}", base.title, idx);
            return Ok(Some(frame));
        }

        self.enter(id)?;
        log::trace!("Evaluating '{}' at {:?}", base.title, idx);
        let result = node.get_image_impl(idx, self);
        self.leave();
        base.count_eval();

        let out = result.with_context(|| format!("{} failed at frame {}", base.title, fmt_idx(idx)))?;
        if base.buffer_last_output
            && let Some(frame) = &out
        {
            base.store(idx, frame.clone());
        }
        Ok(out)
    }

    /// Evaluate whatever feeds input `input` of `consumer`; `None` if unlinked.
    pub fn pull(&self, consumer: Uuid, input: &str, idx: Option<usize>) -> anyhow::Result<Option<Frame>> {
        let link = self
            .graph
            .node(consumer)
            .and_then(|n| n.base().input_link(input))
            .map(|l| l.node);
        match link {
            Some(upstream) => self.evaluate(upstream, idx),
            None => Ok(None),
        }
    }

    /// Frame count of a node (0 if unknown or cyclic).
    pub fn frame_count(&self, id: Uuid) -> usize {
        let Some(node) = self.graph.node(id) else { return 0 };
        if self.enter(id).is_err() {
            return 0;
        }
        let n = node.frame_count(self);
        self.leave();
        n
    }

    /// Frame count of whatever feeds `input` of `consumer`.
    pub fn input_frame_count(&self, consumer: Uuid, input: &str) -> usize {
        self.graph
            .node(consumer)
            .and_then(|n| n.base().input_link(input))
            .map(|l| self.frame_count(l.node))
            .unwrap_or(0)
    }
}

fn fmt_idx(idx: Option<usize>) -> String {
    idx.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::dataset::Dataset;
    use crate::entities::keys::*;
    use crate::entities::nodes::LoadDataNode;
    use crate::entities::roi::Roi;

    /// `n` frames of 4x4 where frame `i` is filled with `i + 1`.
    fn source(n: usize) -> NodeKind {
        let frames = (0..n)
            .map(|i| Frame::from_pixels(4, 4, vec![(i + 1) as f32; 16]).unwrap())
            .collect();
        LoadDataNode::new().with_dataset(Dataset::from_frames(frames, 100.0)).into()
    }

    fn link(g: &mut NodeGraph, from: Uuid, out: &str, to: Uuid, input: &str) -> Option<AttributeRef> {
        g.connect(AttributeRef::new(from, out), AttributeRef::new(to, input)).unwrap()
    }

    fn chain(g: &mut NodeGraph, titles: &[&str]) -> Vec<Uuid> {
        let mut ids = vec![g.add_node(source(3))];
        for t in titles {
            let id = g.create_node(t).unwrap();
            let prev = *ids.last().unwrap();
            link(g, prev, A_DATASET_OUT, id, A_DATASET_IN);
            ids.push(id);
        }
        ids
    }

    fn eval_count(g: &NodeGraph, id: Uuid) -> u64 {
        g.node(id).unwrap().base().eval_count()
    }

    #[test]
    fn test_pull_through_chain() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Bin image", "Crop image"]);
        let out = g.get_image(ids[2], Some(1)).unwrap();
        assert_eq!((out.width(), out.height()), (2, 2));
        assert_eq!(out.get(0, 0), Some(8.0)); // 2x2 sum of 2.0
        assert_eq!(out.pixel_size, 200.0);
        assert_eq!(g.frame_count(ids[2]), 3);
    }

    #[test]
    fn test_unbuffered_param_change_reaches_buffered_consumer() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Bin image", "Crop image"]);
        let (bin, crop) = (ids[1], ids[2]);
        g.with_node_mut(crop, |n| n.base_mut().buffer_last_output = true).unwrap();

        assert_eq!(g.get_image(crop, Some(0)).unwrap().width(), 2);
        assert_eq!(g.get_image(crop, Some(0)).unwrap().width(), 2);
        assert_eq!(eval_count(&g, crop), 1);

        g.set_param(bin, P_FACTOR, AttrValue::Int(1)).unwrap();
        assert_eq!(g.get_image(crop, Some(0)).unwrap().width(), 4);
        assert_eq!(eval_count(&g, crop), 2);
    }

    #[test]
    fn test_buffered_output_returned_unchanged() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Spatial filter", "Crop image"]);
        let (filter, crop) = (ids[1], ids[2]);
        g.with_node_mut(filter, |n| n.base_mut().buffer_last_output = true).unwrap();

        let first = g.get_image(crop, Some(2)).unwrap();
        g.on_update();
        let second = g.get_image(crop, Some(2)).unwrap();
        assert_eq!(first.pixels().unwrap(), second.pixels().unwrap());
        // The filter ran once; the unbuffered crop ran twice.
        assert_eq!(eval_count(&g, filter), 1);
        assert_eq!(eval_count(&g, crop), 2);

        // Different index misses the single slot.
        g.get_image(crop, Some(1)).unwrap();
        assert_eq!(eval_count(&g, filter), 2);
    }

    #[test]
    fn test_on_update_clears_any_change() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Spatial filter"]);
        assert!(g.on_update().is_empty());

        g.set_param(ids[1], P_SIGMA, AttrValue::Float(2.0)).unwrap();
        assert!(g.node(ids[1]).unwrap().base().any_change());
        assert_eq!(g.on_update(), vec![ids[1]]);
        assert!(g.on_update().is_empty());
    }

    #[test]
    fn test_connect_replaces_link() {
        let mut g = NodeGraph::default();
        let a = g.add_node(source(1));
        let b = g.add_node(source(2));
        let crop = g.create_node("Crop image").unwrap();

        assert!(link(&mut g, a, A_DATASET_OUT, crop, A_DATASET_IN).is_none());
        let replaced = link(&mut g, b, A_DATASET_OUT, crop, A_DATASET_IN);
        assert_eq!(replaced, Some(AttributeRef::new(a, A_DATASET_OUT)));
        assert_eq!(g.upstream(crop), vec![b]);
        assert!(g.downstream(a).is_empty());
        assert_eq!(g.frame_count(crop), 2);
    }

    #[test]
    fn test_connect_auto_picks_compatible_pair() {
        let mut g = NodeGraph::default();
        let load = g.add_node(source(2));
        let det = g.create_node("Particle detection").unwrap();
        let recon = g.create_node("Reconstruction").unwrap();
        let calc = g.create_node("Image calculator").unwrap();

        assert_eq!(g.connect_auto(load, det).unwrap(), AttributeRef::new(det, A_DATASET_IN));
        assert_eq!(g.connect_auto(det, recon).unwrap(), AttributeRef::new(recon, A_COORDINATES_IN));
        assert_eq!(g.connect_auto(load, calc).unwrap(), AttributeRef::new(calc, A_IMAGE_A));
        assert_eq!(g.connect_auto(load, calc).unwrap(), AttributeRef::new(calc, A_IMAGE_B));
        assert_eq!(
            g.connect_auto(load, calc),
            Err(GraphError::NoCompatibleAttribute { from: load, to: calc })
        );
    }

    #[test]
    fn test_connect_validation() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Crop image", "Crop image"]);
        let recon = g.create_node("Reconstruction").unwrap();

        let cycle = g.connect(AttributeRef::new(ids[2], A_DATASET_OUT), AttributeRef::new(ids[1], A_DATASET_IN));
        assert!(matches!(cycle, Err(GraphError::Cycle(ref p)) if p.len() == 3));
        // Rejected link leaves the old one in place.
        assert_eq!(g.upstream(ids[1]), vec![ids[0]]);

        let mismatch = g.connect(AttributeRef::new(ids[0], A_DATASET_OUT), AttributeRef::new(recon, A_COORDINATES_IN));
        assert!(matches!(mismatch, Err(GraphError::TypeMismatch { .. })));

        let self_link = g.connect(AttributeRef::new(ids[1], A_DATASET_OUT), AttributeRef::new(ids[1], A_DATASET_IN));
        assert_eq!(self_link, Err(GraphError::SelfLink(ids[1])));

        let backwards = g.connect(AttributeRef::new(ids[1], A_DATASET_IN), AttributeRef::new(ids[2], A_DATASET_IN));
        assert!(matches!(backwards, Err(GraphError::WrongDirection { .. })));
    }

    #[test]
    fn test_evaluation_detects_cycle() {
        let mut g = NodeGraph::default();
        let a = g.create_node("Crop image").unwrap();
        let b = g.create_node("Crop image").unwrap();
        link(&mut g, a, A_DATASET_OUT, b, A_DATASET_IN);
        // Bypass `connect` to force a loop.
        if let Some(attr) = g.nodes.get_mut(&a).and_then(|n| n.base_mut().attribute_mut(A_DATASET_IN)) {
            attr.set_link(Some(AttributeRef::new(b, A_DATASET_OUT)));
        }

        let err = g.try_get_image(b, Some(0)).unwrap_err();
        assert!(err.chain().any(|c| c.to_string().contains("cycle")));
        assert_eq!(g.frame_count(b), 0);
    }

    #[test]
    fn test_failure_reported_not_propagated() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Crop image", "Spatial filter"]);
        g.set_param(ids[1], P_ROI, AttrValue::Roi(Roi::new(0, 0, 10, 10))).unwrap();

        assert!(g.get_image(ids[2], Some(0)).is_none());
        let n = g.errors().last_error().unwrap();
        assert!(n.message.starts_with("Spatial filter failed"));
        let detail = n.detail.unwrap();
        assert!(detail.contains("Crop image failed at frame 0"));
        assert!(detail.contains("outside 4x4"));
    }

    #[test]
    fn test_unconnected_input_is_no_data() {
        let mut g = NodeGraph::default();
        let crop = g.create_node("Crop image").unwrap();
        assert!(g.get_image(crop, Some(0)).is_none());
        assert!(g.errors().is_empty());
        assert_eq!(g.frame_count(crop), 0);
    }

    #[test]
    fn test_remove_node_drops_links() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Crop image", "Crop image"]);
        assert!(g.remove_node(ids[1]).is_some());
        assert!(g.upstream(ids[2]).is_empty());
        assert!(g.downstream(ids[0]).is_empty());
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_topological_order() {
        let mut g = NodeGraph::default();
        let calc = g.create_node("Image calculator").unwrap();
        let ids = chain(&mut g, &["Spatial filter"]);
        link(&mut g, ids[1], A_DATASET_OUT, calc, A_IMAGE_A);
        link(&mut g, ids[0], A_DATASET_OUT, calc, A_IMAGE_B);

        let order = g.topological_order();
        let pos = |id| order.iter().position(|&o| o == id).unwrap();
        assert_eq!(order.len(), 3);
        assert!(pos(ids[0]) < pos(ids[1]));
        assert!(pos(ids[1]) < pos(calc));
    }

    #[test]
    fn test_image_calculator_and_temporal_filter() {
        let mut g = NodeGraph::default();
        let ids = chain(&mut g, &["Temporal filter"]);
        g.set_param(ids[1], P_TEMPORAL_MODE, AttrValue::Str("mean".into())).unwrap();
        g.set_param(ids[1], P_WINDOW, AttrValue::Int(1)).unwrap();
        // Frame 1 = 2.0, window {1, 2, 3} -> mean 2.0.
        assert_eq!(g.get_image(ids[1], Some(1)).unwrap().get(0, 0), Some(0.0));
        // Frame 0 = 1.0, window {1, 2} -> mean 1.5.
        assert_eq!(g.get_image(ids[1], Some(0)).unwrap().get(3, 3), Some(-0.5));

        let calc = g.create_node("Image calculator").unwrap();
        link(&mut g, ids[0], A_DATASET_OUT, calc, A_IMAGE_A);
        link(&mut g, ids[0], A_DATASET_OUT, calc, A_IMAGE_B);
        g.set_param(calc, P_OPERATION, AttrValue::Str("multiply".into())).unwrap();
        assert_eq!(g.get_image(calc, Some(2)).unwrap().get(1, 1), Some(9.0));
    }

    #[test]
    fn test_detection_to_reconstruction() {
        let mut g = NodeGraph::default();
        let mut px = vec![0.0f32; 32 * 32];
        px[8 * 32 + 8] = 100.0;
        px[20 * 32 + 24] = 80.0;
        let frames = vec![Frame::from_pixels(32, 32, px).unwrap(), Frame::zeros(32, 32)];
        let src = g.add_node(LoadDataNode::new().with_dataset(Dataset::from_frames(frames, 100.0)).into());
        let det = g.create_node("Particle detection").unwrap();
        let recon = g.create_node("Reconstruction").unwrap();
        link(&mut g, src, A_DATASET_OUT, det, A_DATASET_IN);
        link(&mut g, det, A_COORDINATES_OUT, recon, A_COORDINATES_IN);

        let out = g.get_image(recon, None).unwrap();
        // 32 px * 100 nm at 10 nm output pixels.
        assert_eq!((out.width(), out.height()), (320, 320));
        assert_eq!(out.scalar_metrics.get("n_particles"), Some(&2.0));
        // Brightest output pixel around (8.5 * 100 nm) / 10 nm = 85.
        let peak = out.get(84, 84).unwrap().max(out.get(85, 85).unwrap());
        assert!(peak > out.get(60, 60).unwrap());

        // Index independent and buffered: a second pull reuses the result.
        g.get_image(recon, Some(1)).unwrap();
        assert_eq!(eval_count(&g, recon), 1);
        assert_eq!(eval_count(&g, det), 2);
    }

    #[test]
    fn test_oversized_reconstruction_is_reported() {
        let mut g = NodeGraph::default();
        let mut px = vec![0.0f32; 32 * 32];
        px[8 * 32 + 8] = 100.0;
        let frames = vec![Frame::from_pixels(32, 32, px).unwrap()];
        let src = g.add_node(LoadDataNode::new().with_dataset(Dataset::from_frames(frames, 100.0)).into());
        let det = g.create_node("Particle detection").unwrap();
        let recon = g.create_node("Reconstruction").unwrap();
        link(&mut g, src, A_DATASET_OUT, det, A_DATASET_IN);
        link(&mut g, det, A_COORDINATES_OUT, recon, A_COORDINATES_IN);
        // 3200 nm at 0.01 nm per pixel: 320000 x 320000 px.
        g.set_param(recon, P_OUTPUT_PIXEL_SIZE, AttrValue::Float(0.01)).unwrap();

        assert!(g.get_image(recon, None).is_none());
        let n = g.errors().last_error().unwrap();
        assert!(n.message.starts_with("Reconstruction failed"), "{}", n.message);
        assert!(n.detail.unwrap().contains("exceeds the limit"));
    }
}
