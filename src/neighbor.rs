//! Neighbor traversal
//!
//! The neighbor index materializes every directed relationship in a
//! model once, keyed by source shape, and lazily builds the transposed
//! (reverse) adjacency the first time any caller asks for incoming
//! edges. Edges are stored as compact `(relationship type, shape id)`
//! pairs per shape rather than per-edge objects, which keeps the index
//! memory-bounded on large models. The reverse build is guarded by a
//! `OnceLock` so concurrent validators share one initialization.

pub use petgraph::Direction;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::model::Model;
use crate::node::Node;
use crate::prelude;
use crate::shape::{Shape, ShapeKind, ShapeType};
use crate::shape_id::ShapeId;

/// Kind of a directed relationship between two shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipType {
    /// Service or resource -> bound resource
    Resource,
    /// Service or resource -> bound operation
    Operation,
    /// Resource -> operation that operates on an instance
    InstanceOperation,
    /// Resource -> operation that operates on the collection
    CollectionOperation,
    /// Operation or resource -> the service/resource it is bound to
    Bound,
    Create,
    Read,
    Update,
    Delete,
    List,
    Put,
    /// Resource -> identifier target shape
    Identifier,
    /// Resource -> property target shape
    Property,
    /// Operation -> input structure
    Input,
    /// Operation -> output structure
    Output,
    /// Operation or service -> error structure
    Error,
    StructureMember,
    UnionMember,
    EnumMember,
    IntEnumMember,
    ListMember,
    MapKey,
    MapValue,
    /// Member -> its containing shape
    MemberContainer,
    /// Member -> the shape it targets
    MemberTarget,
    /// Shape -> a mixin it consumes
    Mixin,
    /// Shape -> the definition shape of an applied trait
    Trait,
    /// Shape -> a shape named by id inside a trait value (the
    /// `references` trait)
    Reference,
}

impl RelationshipType {
    /// Label usable in selector edge constraints (`-[label]->`), or
    /// `None` for relationships selectors cannot name directly.
    pub fn selector_label(&self) -> Option<&'static str> {
        match self {
            RelationshipType::Resource => Some("resource"),
            RelationshipType::Operation => Some("operation"),
            RelationshipType::InstanceOperation => Some("instanceOperation"),
            RelationshipType::CollectionOperation => Some("collectionOperation"),
            RelationshipType::Bound => Some("bound"),
            RelationshipType::Create => Some("create"),
            RelationshipType::Read => Some("read"),
            RelationshipType::Update => Some("update"),
            RelationshipType::Delete => Some("delete"),
            RelationshipType::List => Some("list"),
            RelationshipType::Put => Some("put"),
            RelationshipType::Identifier => Some("identifier"),
            RelationshipType::Property => Some("property"),
            RelationshipType::Input => Some("input"),
            RelationshipType::Output => Some("output"),
            RelationshipType::Error => Some("error"),
            RelationshipType::StructureMember
            | RelationshipType::UnionMember
            | RelationshipType::EnumMember
            | RelationshipType::IntEnumMember
            | RelationshipType::ListMember
            | RelationshipType::MapKey
            | RelationshipType::MapValue => Some("member"),
            RelationshipType::MemberContainer | RelationshipType::MemberTarget => None,
            RelationshipType::Mixin => Some("mixin"),
            RelationshipType::Trait => Some("trait"),
            RelationshipType::Reference => Some("reference"),
        }
    }

    pub const ALL: [RelationshipType; 28] = [
        RelationshipType::Resource,
        RelationshipType::Operation,
        RelationshipType::InstanceOperation,
        RelationshipType::CollectionOperation,
        RelationshipType::Bound,
        RelationshipType::Create,
        RelationshipType::Read,
        RelationshipType::Update,
        RelationshipType::Delete,
        RelationshipType::List,
        RelationshipType::Put,
        RelationshipType::Identifier,
        RelationshipType::Property,
        RelationshipType::Input,
        RelationshipType::Output,
        RelationshipType::Error,
        RelationshipType::StructureMember,
        RelationshipType::UnionMember,
        RelationshipType::EnumMember,
        RelationshipType::IntEnumMember,
        RelationshipType::ListMember,
        RelationshipType::MapKey,
        RelationshipType::MapValue,
        RelationshipType::MemberContainer,
        RelationshipType::MemberTarget,
        RelationshipType::Mixin,
        RelationshipType::Trait,
        RelationshipType::Reference,
    ];

    /// All relationship types matching a selector label. Empty for
    /// unknown labels; callers treat that as matching nothing.
    pub fn from_selector_label(label: &str) -> Vec<RelationshipType> {
        RelationshipType::ALL
            .iter()
            .filter(|t| t.selector_label() == Some(label))
            .copied()
            .collect()
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.selector_label() {
            Some(label) => write!(f, "{}", label),
            None => write!(f, "{:?}", self),
        }
    }
}

/// One directed edge out of (or into) a shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_type: RelationshipType,
    /// The shape on the other end of the edge
    pub neighbor: ShapeId,
}

impl Relationship {
    fn new(relationship_type: RelationshipType, neighbor: ShapeId) -> Self {
        Self {
            relationship_type,
            neighbor,
        }
    }
}

/// Precomputed adjacency for a single model
#[derive(Debug)]
pub struct NeighborIndex {
    forward: HashMap<ShapeId, Vec<Relationship>>,
    reverse: OnceLock<HashMap<ShapeId, Vec<Relationship>>>,
}

impl NeighborIndex {
    /// Build the forward adjacency for every shape in the model
    pub fn new(model: &Model) -> Self {
        let mut builder = EdgeBuilder::default();
        for shape in model.shapes() {
            collect_edges(model, shape, &mut builder);
        }
        Self {
            forward: builder.finish(),
            reverse: OnceLock::new(),
        }
    }

    /// Outgoing or incoming edges of a shape. Unknown shapes and shapes
    /// with no edges in the requested direction yield an empty slice.
    pub fn neighbors(&self, id: &ShapeId, direction: Direction) -> &[Relationship] {
        let map = match direction {
            Direction::Outgoing => &self.forward,
            Direction::Incoming => self.reverse_index(),
        };
        map.get(id).map_or(&[], Vec::as_slice)
    }

    /// Force the reverse index to exist. The pipeline calls this before
    /// fanning out validators so the one-time transpose is not raced.
    pub fn ensure_reverse_index(&self) {
        self.reverse_index();
    }

    fn reverse_index(&self) -> &HashMap<ShapeId, Vec<Relationship>> {
        self.reverse.get_or_init(|| {
            let mut builder = EdgeBuilder::default();
            for (source, edges) in &self.forward {
                for edge in edges {
                    builder.push(
                        edge.neighbor.clone(),
                        edge.relationship_type,
                        source.clone(),
                    );
                }
            }
            builder.finish()
        })
    }

    /// Total number of forward edges
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(Vec::len).sum()
    }
}

/// Accumulates edges per source, dropping duplicate
/// (type, neighbor) pairs so self-loops appear exactly once per type.
#[derive(Default)]
struct EdgeBuilder {
    edges: HashMap<ShapeId, Vec<Relationship>>,
}

impl EdgeBuilder {
    fn push(&mut self, source: ShapeId, relationship_type: RelationshipType, neighbor: ShapeId) {
        let edges = self.edges.entry(source).or_default();
        let relationship = Relationship::new(relationship_type, neighbor);
        if !edges.contains(&relationship) {
            edges.push(relationship);
        }
    }

    fn finish(mut self) -> HashMap<ShapeId, Vec<Relationship>> {
        for edges in self.edges.values_mut() {
            edges.shrink_to_fit();
        }
        self.edges
    }
}

fn collect_edges(model: &Model, shape: &Shape, builder: &mut EdgeBuilder) {
    let id = &shape.id;

    // Mixin and trait edges apply to every shape kind.
    if !matches!(shape.kind, ShapeKind::Member { .. }) {
        for mixin in &shape.mixins {
            builder.push(id.clone(), RelationshipType::Mixin, mixin.clone());
        }
    }
    for (trait_id, value) in &shape.traits {
        builder.push(id.clone(), RelationshipType::Trait, trait_id.clone());
        // Shape-id-valued trait fields synthesize edges of their own.
        if *trait_id == prelude::references_trait_id() {
            for target in referenced_shape_ids(model, value) {
                builder.push(id.clone(), RelationshipType::Reference, target);
            }
        }
    }

    match &shape.kind {
        ShapeKind::Service {
            operations,
            resources,
            errors,
            ..
        } => {
            for op in operations {
                builder.push(id.clone(), RelationshipType::Operation, op.clone());
                builder.push(op.clone(), RelationshipType::Bound, id.clone());
            }
            for resource in resources {
                builder.push(id.clone(), RelationshipType::Resource, resource.clone());
                builder.push(resource.clone(), RelationshipType::Bound, id.clone());
            }
            for error in errors {
                builder.push(id.clone(), RelationshipType::Error, error.clone());
            }
        }
        ShapeKind::Resource {
            identifiers,
            properties,
            create,
            read,
            update,
            delete,
            list,
            put,
            operations,
            collection_operations,
            resources,
        } => {
            for target in identifiers.values() {
                builder.push(id.clone(), RelationshipType::Identifier, target.clone());
            }
            for target in properties.values() {
                builder.push(id.clone(), RelationshipType::Property, target.clone());
            }
            for resource in resources {
                builder.push(id.clone(), RelationshipType::Resource, resource.clone());
                builder.push(resource.clone(), RelationshipType::Bound, id.clone());
            }

            // READ, UPDATE, DELETE, and PUT operate on an instance by
            // definition; CREATE and LIST on the collection.
            let instance_lifecycle = [
                (read, RelationshipType::Read),
                (update, RelationshipType::Update),
                (delete, RelationshipType::Delete),
                (put, RelationshipType::Put),
            ];
            for (op, lifecycle) in instance_lifecycle {
                if let Some(op) = op {
                    builder.push(id.clone(), lifecycle, op.clone());
                    builder.push(id.clone(), RelationshipType::InstanceOperation, op.clone());
                    builder.push(id.clone(), RelationshipType::Operation, op.clone());
                    builder.push(op.clone(), RelationshipType::Bound, id.clone());
                }
            }
            let collection_lifecycle =
                [(create, RelationshipType::Create), (list, RelationshipType::List)];
            for (op, lifecycle) in collection_lifecycle {
                if let Some(op) = op {
                    builder.push(id.clone(), lifecycle, op.clone());
                    builder.push(
                        id.clone(),
                        RelationshipType::CollectionOperation,
                        op.clone(),
                    );
                    builder.push(id.clone(), RelationshipType::Operation, op.clone());
                    builder.push(op.clone(), RelationshipType::Bound, id.clone());
                }
            }
            for op in operations {
                builder.push(id.clone(), RelationshipType::InstanceOperation, op.clone());
                builder.push(id.clone(), RelationshipType::Operation, op.clone());
                builder.push(op.clone(), RelationshipType::Bound, id.clone());
            }
            for op in collection_operations {
                builder.push(
                    id.clone(),
                    RelationshipType::CollectionOperation,
                    op.clone(),
                );
                builder.push(id.clone(), RelationshipType::Operation, op.clone());
                builder.push(op.clone(), RelationshipType::Bound, id.clone());
            }
        }
        ShapeKind::Operation {
            input,
            output,
            errors,
        } => {
            if let Some(input) = input {
                builder.push(id.clone(), RelationshipType::Input, input.clone());
            }
            if let Some(output) = output {
                builder.push(id.clone(), RelationshipType::Output, output.clone());
            }
            for error in errors {
                builder.push(id.clone(), RelationshipType::Error, error.clone());
            }
        }
        ShapeKind::Structure { members } => {
            for (_, member) in members {
                builder.push(id.clone(), RelationshipType::StructureMember, member.clone());
            }
        }
        ShapeKind::Union { members } => {
            for (_, member) in members {
                builder.push(id.clone(), RelationshipType::UnionMember, member.clone());
            }
        }
        ShapeKind::Enum { members } => {
            for (_, member) in members {
                builder.push(id.clone(), RelationshipType::EnumMember, member.clone());
            }
        }
        ShapeKind::IntEnum { members } => {
            for (_, member) in members {
                builder.push(id.clone(), RelationshipType::IntEnumMember, member.clone());
            }
        }
        ShapeKind::List { member } => {
            builder.push(id.clone(), RelationshipType::ListMember, member.clone());
        }
        ShapeKind::Map { key, value } => {
            builder.push(id.clone(), RelationshipType::MapKey, key.clone());
            builder.push(id.clone(), RelationshipType::MapValue, value.clone());
        }
        ShapeKind::Member { container, target } => {
            builder.push(
                id.clone(),
                RelationshipType::MemberContainer,
                container.clone(),
            );
            // Enum members all target Unit; that edge is noise.
            let container_is_enum = model
                .get_shape(container)
                .map(|c| matches!(c.shape_type(), ShapeType::Enum | ShapeType::IntEnum))
                .unwrap_or(false);
            if !container_is_enum {
                builder.push(id.clone(), RelationshipType::MemberTarget, target.clone());
            }
        }
        ShapeKind::Simple(_) => {}
    }
}

/// Strings anywhere inside a trait value that name a shape present in
/// the model. Non-resolving strings are left alone; the trait stays
/// forward compatible with ids the model does not carry.
fn referenced_shape_ids(model: &Model, value: &Node) -> Vec<ShapeId> {
    let mut found = Vec::new();
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        match node {
            Node::String(text) => {
                if let Ok(id) = ShapeId::parse(text) {
                    if model.contains_shape(&id) {
                        found.push(id);
                    }
                }
            }
            Node::Array(items) => stack.extend(items),
            Node::Object(fields) => stack.extend(fields.values()),
            Node::Null | Node::Bool(_) | Node::Number(_) => {}
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeKind;
    use std::collections::BTreeMap;

    fn id(text: &str) -> ShapeId {
        ShapeId::parse(text).unwrap()
    }

    fn build_model(shapes: Vec<Shape>) -> Model {
        Model::new(
            shapes.into_iter().map(|s| (s.id.clone(), s)).collect(),
            BTreeMap::new(),
        )
    }

    fn structure_with_member(shape: &str, member: &str, target: &str) -> Vec<Shape> {
        let shape_id = id(shape);
        let member_id = shape_id.with_member(member);
        vec![
            Shape::new(
                shape_id.clone(),
                ShapeKind::Structure {
                    members: vec![(member.to_string(), member_id.clone())],
                },
            ),
            Shape::new(
                member_id,
                ShapeKind::Member {
                    container: shape_id,
                    target: id(target),
                },
            ),
            Shape::new(id(target), ShapeKind::Simple(ShapeType::String)),
        ]
    }

    #[test]
    fn test_structure_member_edges() {
        let model = build_model(structure_with_member("ns#Foo", "bar", "ns#Str"));
        let index = NeighborIndex::new(&model);

        let edges = index.neighbors(&id("ns#Foo"), Direction::Outgoing);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship_type, RelationshipType::StructureMember);
        assert_eq!(edges[0].neighbor, id("ns#Foo$bar"));

        let member_edges = index.neighbors(&id("ns#Foo$bar"), Direction::Outgoing);
        let types: Vec<_> = member_edges.iter().map(|r| r.relationship_type).collect();
        assert!(types.contains(&RelationshipType::MemberContainer));
        assert!(types.contains(&RelationshipType::MemberTarget));
    }

    #[test]
    fn test_reverse_is_transpose_of_forward() {
        let model = build_model(structure_with_member("ns#Foo", "bar", "ns#Str"));
        let index = NeighborIndex::new(&model);

        for shape_id in model.shape_ids() {
            for edge in index.neighbors(shape_id, Direction::Outgoing) {
                let back = index.neighbors(&edge.neighbor, Direction::Incoming);
                assert!(
                    back.iter().any(|r| {
                        r.relationship_type == edge.relationship_type && &r.neighbor == shape_id
                    }),
                    "missing reverse edge for {:?} from {}",
                    edge,
                    shape_id
                );
            }
        }
    }

    #[test]
    fn test_service_bindings_include_bound() {
        let service = Shape::new(
            id("ns#Svc"),
            ShapeKind::Service {
                version: Some("2024-01-01".to_string()),
                operations: vec![id("ns#Op")],
                resources: vec![],
                errors: vec![],
            },
        );
        let op = Shape::new(
            id("ns#Op"),
            ShapeKind::Operation {
                input: None,
                output: None,
                errors: vec![],
            },
        );
        let model = build_model(vec![service, op]);
        let index = NeighborIndex::new(&model);

        let op_edges = index.neighbors(&id("ns#Op"), Direction::Outgoing);
        assert!(op_edges
            .iter()
            .any(|r| r.relationship_type == RelationshipType::Bound && r.neighbor == id("ns#Svc")));
    }

    #[test]
    fn test_trait_self_loop_appears_once() {
        // The prelude `trait` shape carries itself as a trait.
        let trait_shape = Shape::new(id("weave.api#trait"), ShapeKind::Structure { members: vec![] })
            .with_trait(id("weave.api#trait"), crate::node::Node::empty_object());
        let model = build_model(vec![trait_shape]);
        let index = NeighborIndex::new(&model);

        let edges = index.neighbors(&id("weave.api#trait"), Direction::Outgoing);
        let self_loops = edges
            .iter()
            .filter(|r| {
                r.relationship_type == RelationshipType::Trait
                    && r.neighbor == id("weave.api#trait")
            })
            .count();
        assert_eq!(self_loops, 1);
    }

    #[test]
    fn test_references_trait_synthesizes_edges() {
        let city = Shape::new(id("ns#City"), ShapeKind::Structure { members: vec![] })
            .with_trait(
                crate::prelude::references_trait_id(),
                Node::from(serde_json::json!([
                    { "resource": "ns#CityResource" },
                    { "resource": "ns#NotDeclared" }
                ])),
            );
        let resource = Shape::new(
            id("ns#CityResource"),
            ShapeKind::Resource {
                identifiers: BTreeMap::new(),
                properties: BTreeMap::new(),
                create: None,
                read: None,
                update: None,
                delete: None,
                list: None,
                put: None,
                operations: vec![],
                collection_operations: vec![],
                resources: vec![],
            },
        );
        let model = build_model(vec![city, resource]);
        let index = NeighborIndex::new(&model);

        let edges = index.neighbors(&id("ns#City"), Direction::Outgoing);
        assert!(edges.iter().any(|r| {
            r.relationship_type == RelationshipType::Reference
                && r.neighbor == id("ns#CityResource")
        }));
        // Ids that do not resolve produce no edge.
        assert!(!edges
            .iter()
            .any(|r| r.neighbor == id("ns#NotDeclared")));

        // The synthesized edge is addressable from selectors.
        let referenced = index.neighbors(&id("ns#CityResource"), Direction::Incoming);
        assert!(referenced.iter().any(|r| {
            r.relationship_type == RelationshipType::Reference && r.neighbor == id("ns#City")
        }));
        assert!(RelationshipType::from_selector_label("reference")
            .contains(&RelationshipType::Reference));
    }

    #[test]
    fn test_selector_labels() {
        assert_eq!(
            RelationshipType::StructureMember.selector_label(),
            Some("member")
        );
        let member_types = RelationshipType::from_selector_label("member");
        assert!(member_types.contains(&RelationshipType::ListMember));
        assert!(RelationshipType::from_selector_label("nonsense").is_empty());
    }
}
