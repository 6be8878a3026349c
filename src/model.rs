//! The assembled model
//!
//! A `Model` is the immutable root produced by the assembler: every
//! shape keyed by id, plus document-level metadata. Shapes are stored
//! in a `BTreeMap` so all iteration is in shape-id order and every
//! consumer sees the same deterministic sequence. Transforms produce a
//! new `Model` rather than mutating an existing one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ModelError;
use crate::node::Node;
use crate::shape::{Shape, ShapeType};
use crate::shape_id::ShapeId;

/// An immutable, fully-resolved Weave model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    shapes: BTreeMap<ShapeId, Shape>,
    metadata: BTreeMap<String, Node>,
}

impl Model {
    pub(crate) fn new(shapes: BTreeMap<ShapeId, Shape>, metadata: BTreeMap<String, Node>) -> Self {
        Self { shapes, metadata }
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Look up a shape by id
    pub fn get_shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    /// Look up a shape that is required to exist
    pub fn expect_shape(&self, id: &ShapeId) -> Result<&Shape, ModelError> {
        self.shapes
            .get(id)
            .ok_or_else(|| ModelError::ShapeNotFound(id.clone()))
    }

    pub fn contains_shape(&self, id: &ShapeId) -> bool {
        self.shapes.contains_key(id)
    }

    /// All shapes, in shape-id order
    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    /// All shape ids, in order
    pub fn shape_ids(&self) -> impl Iterator<Item = &ShapeId> {
        self.shapes.keys()
    }

    /// Shapes of one type, in shape-id order
    pub fn shapes_of_type(&self, shape_type: ShapeType) -> impl Iterator<Item = &Shape> {
        self.shapes
            .values()
            .filter(move |s| s.shape_type() == shape_type)
    }

    /// Top-level metadata value for a key
    pub fn metadata(&self, key: &str) -> Option<&Node> {
        self.metadata.get(key)
    }

    pub fn metadata_entries(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.metadata.iter()
    }

    /// Shapes marked as trait definitions
    pub fn trait_definitions(&self) -> impl Iterator<Item = &Shape> {
        let trait_id = crate::prelude::trait_id();
        self.shapes
            .values()
            .filter(move |s| s.has_trait(&trait_id))
    }
}
