//! Node trait - base interface for all processing nodes in the graph.
//!
//! Nodes are the building blocks of the dataflow graph:
//! - sources (Load data) produce frames from a [`Dataset`](super::dataset::Dataset)
//! - filters pull a frame from their input, clone it and modify the copy
//! - sinks (Reconstruction) gather every upstream frame
//!
//! Evaluation is pull-based: `get_image_impl(idx, ctx)` asks `ctx` for its
//! inputs, which evaluates upstream nodes depth first. Nothing is cached
//! unless `buffer_last_output` is set, in which case exactly the latest
//! `(idx, Frame)` is kept until the graph invalidates it.

use enum_dispatch::enum_dispatch;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::attribute::{AttributeRef, AttributeType, ConnectableAttribute};
use super::attrs::Attrs;
use super::frame::Frame;
use super::graph::EvalContext;

#[derive(Debug)]
pub struct BufferedOutput {
    pub idx: Option<usize>,
    pub frame: Frame,
}

/// State shared by every node type.
#[derive(Debug)]
pub struct NodeBase {
    pub id: Uuid,
    pub title: &'static str,
    attributes: IndexMap<String, ConnectableAttribute>,
    /// User-editable parameters; their dirty flag is the node's `any_change`.
    pub params: Attrs,
    /// Keep the latest output in `buffer`.
    pub buffer_last_output: bool,
    buffer: Mutex<Option<BufferedOutput>>,
    eval_count: AtomicU64,
}

impl NodeBase {
    pub fn new(title: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            attributes: IndexMap::new(),
            params: Attrs::new(),
            buffer_last_output: false,
            buffer: Mutex::new(None),
            eval_count: AtomicU64::new(0),
        }
    }

    pub fn with_input(mut self, name: &str, ty: AttributeType) -> Self {
        self.attributes.insert(name.to_string(), ConnectableAttribute::input(name, ty));
        self
    }

    pub fn with_output(mut self, name: &str, ty: AttributeType) -> Self {
        self.attributes.insert(name.to_string(), ConnectableAttribute::output(name, ty));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&ConnectableAttribute> {
        self.attributes.get(name)
    }

    pub(crate) fn attribute_mut(&mut self, name: &str) -> Option<&mut ConnectableAttribute> {
        self.attributes.get_mut(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &ConnectableAttribute> {
        self.attributes.values()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &ConnectableAttribute> {
        self.attributes.values().filter(|a| a.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ConnectableAttribute> {
        self.attributes.values().filter(|a| !a.is_input())
    }

    pub(crate) fn inputs_mut(&mut self) -> impl Iterator<Item = &mut ConnectableAttribute> {
        self.attributes.values_mut().filter(|a| a.is_input())
    }

    /// Upstream link of input `name`, if any.
    pub fn input_link(&self, name: &str) -> Option<&AttributeRef> {
        self.attributes.get(name).and_then(|a| a.link())
    }

    /// Node ids feeding this node (in attribute order).
    pub fn upstream_ids(&self) -> Vec<Uuid> {
        self.inputs().filter_map(|a| a.link().map(|l| l.node)).collect()
    }

    /// Dirty flag, raised by any parameter edit.
    pub fn any_change(&self) -> bool {
        self.params.is_dirty()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Option<BufferedOutput>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the buffered output for `idx`.
    pub fn buffered(&self, idx: Option<usize>) -> Option<Frame> {
        self.lock_buffer()
            .as_ref()
            .filter(|b| b.idx == idx)
            .map(|b| b.frame.clone())
    }

    pub(crate) fn store(&self, idx: Option<usize>, frame: Frame) {
        *self.lock_buffer() = Some(BufferedOutput { idx, frame });
    }

    pub fn clear_buffer(&self) {
        self.lock_buffer().take();
    }

    pub fn has_buffer(&self) -> bool {
        self.lock_buffer().is_some()
    }

    /// How many times `get_image_impl` ran (cache hits excluded).
    pub fn eval_count(&self) -> u64 {
        self.eval_count.load(Ordering::Relaxed)
    }

    pub(crate) fn count_eval(&self) {
        self.eval_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Base trait for all node types.
#[enum_dispatch]
pub trait Node: Send + Sync {
    fn base(&self) -> &NodeBase;

    fn base_mut(&mut self) -> &mut NodeBase;

    /// Compute the output for frame `idx` (`None` for index-independent nodes).
    ///
    /// `Ok(None)` means "no data" (e.g. unconnected input).
    fn get_image_impl(&self, idx: Option<usize>, ctx: &EvalContext) -> anyhow::Result<Option<Frame>>;

    /// Number of frames this node can produce. Defaults to the first linked input's count.
    fn frame_count(&self, ctx: &EvalContext) -> usize {
        self.base()
            .inputs()
            .find_map(|a| a.link())
            .map(|l| ctx.frame_count(l.node))
            .unwrap_or(0)
    }

    /// Ignores the frame index (one output for the whole series).
    fn index_independent(&self) -> bool {
        false
    }

    /// Hook called after `params` changed, before downstream invalidation.
    fn on_param_changed(&mut self) {}

    // --- Convenience ---

    fn id(&self) -> Uuid {
        self.base().id
    }

    fn title(&self) -> &'static str {
        self.base().title
    }

    fn params(&self) -> &Attrs {
        &self.base().params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::keys::A_DATASET_IN;

    #[test]
    fn test_buffer_single_slot() {
        let base = NodeBase::new("t");
        base.store(Some(1), Frame::zeros(1, 1));
        assert!(base.buffered(Some(1)).is_some());
        assert!(base.buffered(Some(2)).is_none());

        base.store(Some(2), Frame::zeros(1, 1));
        assert!(base.buffered(Some(1)).is_none());
        assert!(base.buffered(Some(2)).is_some());

        base.clear_buffer();
        assert!(!base.has_buffer());
    }

    #[test]
    fn test_builder_attributes() {
        let base = NodeBase::new("t")
            .with_input(A_DATASET_IN, AttributeType::Dataset)
            .with_output("out", AttributeType::Image);
        assert_eq!(base.inputs().count(), 1);
        assert_eq!(base.outputs().next().map(|a| a.name.as_str()), Some("out"));
        assert!(base.input_link(A_DATASET_IN).is_none());
    }
}
