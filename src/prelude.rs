//! The `weave.api` prelude
//!
//! Every assembled model implicitly contains the prelude namespace:
//! the simple scalar shapes that member targets resolve against, the
//! `Unit` shape targeted by enum members, and the definition shapes of
//! the built-in traits. The assembler seeds these before resolution so
//! user documents never need to declare them.

use crate::shape::{Shape, ShapeKind, ShapeType};
use crate::shape_id::ShapeId;

/// Namespace reserved for the prelude
pub const PRELUDE_NAMESPACE: &str = "weave.api";

fn prelude_id(name: &str) -> ShapeId {
    ShapeId::new(PRELUDE_NAMESPACE, name, None)
}

/// `weave.api#trait`, the trait that marks a shape as a trait definition
pub fn trait_id() -> ShapeId {
    prelude_id("trait")
}

/// `weave.api#error`
pub fn error_trait_id() -> ShapeId {
    prelude_id("error")
}

/// `weave.api#required`
pub fn required_trait_id() -> ShapeId {
    prelude_id("required")
}

/// `weave.api#documentation`
pub fn documentation_trait_id() -> ShapeId {
    prelude_id("documentation")
}

/// `weave.api#deprecated`
pub fn deprecated_trait_id() -> ShapeId {
    prelude_id("deprecated")
}

/// `weave.api#references`, whose value names other shapes by id
pub fn references_trait_id() -> ShapeId {
    prelude_id("references")
}

/// `weave.api#Unit`, the target of enum members and empty operation I/O
pub fn unit_id() -> ShapeId {
    prelude_id("Unit")
}

const SIMPLE_SHAPES: [(&str, ShapeType); 13] = [
    ("Blob", ShapeType::Blob),
    ("Boolean", ShapeType::Boolean),
    ("String", ShapeType::String),
    ("Byte", ShapeType::Byte),
    ("Short", ShapeType::Short),
    ("Integer", ShapeType::Integer),
    ("Long", ShapeType::Long),
    ("Float", ShapeType::Float),
    ("Double", ShapeType::Double),
    ("BigInteger", ShapeType::BigInteger),
    ("BigDecimal", ShapeType::BigDecimal),
    ("Timestamp", ShapeType::Timestamp),
    ("Document", ShapeType::Document),
];

// Built-in trait definitions: (name, expected value kind or None for any).
// The kind feeds the assembler's structural trait check.
const TRAIT_SHAPES: [&str; 10] = [
    "trait",
    "error",
    "required",
    "documentation",
    "deprecated",
    "readonly",
    "idempotent",
    "sensitive",
    "paginated",
    "references",
];

/// All prelude shapes, ready to seed into an assembler
pub fn prelude_shapes() -> Vec<Shape> {
    let mut shapes = Vec::with_capacity(SIMPLE_SHAPES.len() + TRAIT_SHAPES.len() + 1);

    for (name, shape_type) in SIMPLE_SHAPES {
        shapes.push(Shape::new(prelude_id(name), ShapeKind::Simple(shape_type)));
    }

    shapes.push(Shape::new(
        unit_id(),
        ShapeKind::Structure { members: vec![] },
    ));

    for name in TRAIT_SHAPES {
        // Trait definitions are string/structure shapes marked with the
        // trait trait. Their own structural schema stays loose here;
        // the coercion pass only checks value kinds it can know.
        let kind = match name {
            "documentation" => ShapeKind::Simple(ShapeType::String),
            "error" => ShapeKind::Simple(ShapeType::String),
            // A list of reference objects; kept as a document so the
            // value check admits it.
            "references" => ShapeKind::Simple(ShapeType::Document),
            _ => ShapeKind::Structure { members: vec![] },
        };
        shapes.push(
            Shape::new(prelude_id(name), kind)
                .with_trait(trait_id(), crate::node::Node::empty_object()),
        );
    }

    shapes
}

/// Whether a shape id lives in the prelude namespace
pub fn is_prelude_id(id: &ShapeId) -> bool {
    id.namespace() == PRELUDE_NAMESPACE
}
