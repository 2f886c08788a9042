//! Pixel-wise arithmetic between two inputs.

use anyhow::{Result, bail};
use rayon::prelude::*;

use crate::entities::attribute::AttributeType;
use crate::entities::attrs::AttrValue;
use crate::entities::frame::{Frame, FrameError};
use crate::entities::graph::EvalContext;
use crate::entities::keys::{A_IMAGE_A, A_IMAGE_B, A_IMAGE_OUT, P_OPERATION};
use crate::entities::node::{Node, NodeBase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
}

impl Operation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "add" => Some(Operation::Add),
            "subtract" => Some(Operation::Subtract),
            "multiply" => Some(Operation::Multiply),
            "divide" => Some(Operation::Divide),
            "min" => Some(Operation::Min),
            "max" => Some(Operation::Max),
            _ => None,
        }
    }

    /// Division by zero yields 0.
    #[inline]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Operation::Add => a + b,
            Operation::Subtract => a - b,
            Operation::Multiply => a * b,
            Operation::Divide => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
            Operation::Min => a.min(b),
            Operation::Max => a.max(b),
        }
    }
}

#[derive(Debug)]
pub struct ImageCalculatorNode {
    base: NodeBase,
}

impl Default for ImageCalculatorNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCalculatorNode {
    pub const TITLE: &'static str = "Image calculator";

    pub fn new() -> Self {
        let mut base = NodeBase::new(Self::TITLE)
            .with_input(A_IMAGE_A, AttributeType::Image)
            .with_input(A_IMAGE_B, AttributeType::Image)
            .with_output(A_IMAGE_OUT, AttributeType::Image);
        base.params.set(P_OPERATION, AttrValue::Str("subtract".into()));
        base.params.clear_dirty();
        Self { base }
    }
}

impl Node for ImageCalculatorNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    /// `A op B`; with B unconnected A passes through.
    fn get_image_impl(&self, idx: Option<usize>, ctx: &EvalContext) -> Result<Option<Frame>> {
        let Some(mut a) = ctx.pull(self.base.id, A_IMAGE_A, idx)? else {
            return Ok(None);
        };
        let Some(b) = ctx.pull(self.base.id, A_IMAGE_B, idx)? else {
            return Ok(Some(a));
        };
        let name = self.base.params.get_str_or(P_OPERATION, "subtract");
        let Some(op) = Operation::from_name(name) else {
            bail!("Unknown operation '{}'", name);
        };

        let b_px = b.pixels()?;
        a.with_pixels_mut(|px, _, _| {
            if px.len() != b_px.len() {
                return Err(FrameError::SizeMismatch { expected: px.len(), actual: b_px.len() });
            }
            px.par_iter_mut().zip(b_px.par_iter()).for_each(|(va, vb)| *va = op.apply(*va, *vb));
            Ok(())
        })??;
        Ok(Some(a))
    }
}
