//! Typed, linkable node ports.
//!
//! An input holds at most one upstream link to an output of another node.
//! Outputs keep no link list: consumers are found by scanning inputs, so an
//! output can fan out to any number of them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Dataset,
    Image,
    Reconstruction,
    Coordinates,
    /// Accepts any other type.
    Multi,
}

impl AttributeType {
    /// Whether an output of type `self` may feed an input of type `other`.
    ///
    /// Datasets and single images are interchangeable (both yield frames).
    pub fn compatible(self, other: AttributeType) -> bool {
        use AttributeType::*;
        match (self, other) {
            (Multi, _) | (_, Multi) => true,
            (Dataset, Image) | (Image, Dataset) => true,
            (a, b) => a == b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Address of an attribute: node id plus attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    pub node: Uuid,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(node: Uuid, attribute: impl Into<String>) -> Self {
        Self { node, attribute: attribute.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectableAttribute {
    pub name: String,
    pub ty: AttributeType,
    pub direction: Direction,
    link: Option<AttributeRef>,
}

impl ConnectableAttribute {
    pub fn input(name: impl Into<String>, ty: AttributeType) -> Self {
        Self { name: name.into(), ty, direction: Direction::Input, link: None }
    }

    pub fn output(name: impl Into<String>, ty: AttributeType) -> Self {
        Self { name: name.into(), ty, direction: Direction::Output, link: None }
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn link(&self) -> Option<&AttributeRef> {
        self.link.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    /// Replace the upstream link, returning the previous one. No-op on outputs.
    pub(crate) fn set_link(&mut self, link: Option<AttributeRef>) -> Option<AttributeRef> {
        if !self.is_input() {
            return None;
        }
        std::mem::replace(&mut self.link, link)
    }
}
