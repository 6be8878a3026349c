//! Model assembly
//!
//! The assembler turns an unordered collection of source documents into
//! one immutable `Model`, or a list of fatal events. Assembly is a
//! fixed sequence of passes:
//!
//! 1. declare every shape and metadata entry (duplicates detected here),
//! 2. flatten mixins in topological order,
//! 3. resolve every symbolic reference,
//! 4. structurally check applied trait values,
//! 5. reject unbounded required-member recursion.
//!
//! Failures in passes 1-3 are fatal and no model is produced. Passes 4
//! and 5 report events on an otherwise usable model. Documents merge in
//! sorted-shape-id order, so the result never depends on the order in
//! which documents were added.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::Model;
use crate::node::{Node, SourceLocation};
use crate::prelude;
use crate::shape::{Shape, ShapeKind, ShapeType};
use crate::shape_id::ShapeId;
use crate::validation::{event_ids, Severity, ValidationEvent};

/// A standalone trait application (`apply` statement)
#[derive(Debug, Clone, PartialEq)]
pub struct TraitApplication {
    pub target: ShapeId,
    pub trait_id: ShapeId,
    pub value: Node,
    pub source: SourceLocation,
}

/// One source document's contribution to a model
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub filename: String,
    pub metadata: BTreeMap<String, Node>,
    pub shapes: Vec<Shape>,
    pub applies: Vec<TraitApplication>,
}

/// Outcome of `ModelAssembler::assemble`
#[derive(Debug)]
pub struct AssembleResult {
    model: Option<Model>,
    events: Vec<ValidationEvent>,
}

impl AssembleResult {
    /// The assembled model; `None` when assembly failed fatally
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn into_model(self) -> Option<Model> {
        self.model
    }

    pub fn events(&self) -> &[ValidationEvent] {
        &self.events
    }

    pub fn into_parts(self) -> (Option<Model>, Vec<ValidationEvent>) {
        (self.model, self.events)
    }

    /// True when assembly failed and no model was produced
    pub fn is_failure(&self) -> bool {
        self.model.is_none()
    }
}

/// Multi-pass model builder
#[derive(Debug, Default)]
pub struct ModelAssembler {
    documents: Vec<SourceDocument>,
    adhoc: SourceDocument,
    deny_unknown_traits: bool,
    discard_mixin_shapes: bool,
}

impl ModelAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat applications of undefined traits as errors instead of
    /// warnings.
    pub fn deny_unknown_traits(mut self, deny: bool) -> Self {
        self.deny_unknown_traits = deny;
        self
    }

    /// After flattening, drop shapes that exist only to be mixed in
    /// (referenced solely through `mixins` lists).
    pub fn discard_mixin_shapes(mut self, discard: bool) -> Self {
        self.discard_mixin_shapes = discard;
        self
    }

    pub fn add_document(&mut self, document: SourceDocument) -> &mut Self {
        self.documents.push(document);
        self
    }

    pub fn add_shape(&mut self, shape: Shape) -> &mut Self {
        self.adhoc.shapes.push(shape);
        self
    }

    pub fn add_shapes(&mut self, shapes: impl IntoIterator<Item = Shape>) -> &mut Self {
        self.adhoc.shapes.extend(shapes);
        self
    }

    pub fn apply_trait(&mut self, application: TraitApplication) -> &mut Self {
        self.adhoc.applies.push(application);
        self
    }

    pub fn put_metadata(&mut self, key: impl Into<String>, value: Node) -> &mut Self {
        self.adhoc.metadata.insert(key.into(), value);
        self
    }

    /// Run all passes and produce a model or the fatal events
    pub fn assemble(&self) -> AssembleResult {
        let mut events = Vec::new();

        // Pass 1: declarations.
        let declared = self.declare(&mut events);
        let fatal = |events: &[ValidationEvent]| {
            events.iter().any(|e| e.severity == Severity::Error)
        };
        if fatal(&events) {
            return AssembleResult {
                model: None,
                events,
            };
        }
        let Declared {
            mut shapes,
            metadata,
        } = declared;

        // Pass 2: mixin flattening.
        flatten_mixins(&mut shapes, &mut events);
        if fatal(&events) {
            return AssembleResult {
                model: None,
                events,
            };
        }

        // Pass 3: reference resolution.
        let references = resolve_references(&shapes, &mut events);
        if fatal(&events) {
            return AssembleResult {
                model: None,
                events,
            };
        }

        if self.discard_mixin_shapes {
            discard_mixin_only_shapes(&mut shapes, &references);
        }

        // Passes 4 and 5 report on a model that is still produced.
        check_trait_values(&shapes, self.deny_unknown_traits, &mut events);
        check_recursion(&shapes, &mut events);

        AssembleResult {
            model: Some(Model::new(shapes, metadata)),
            events,
        }
    }

    fn all_documents(&self) -> impl Iterator<Item = &SourceDocument> {
        self.documents.iter().chain(std::iter::once(&self.adhoc))
    }

    fn declare(&self, events: &mut Vec<ValidationEvent>) -> Declared {
        let mut shapes: BTreeMap<ShapeId, Shape> = prelude::prelude_shapes()
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        // Deterministic merge: sort every contribution by shape id
        // before folding, so input order never shows through.
        let mut declared: Vec<&Shape> = self.all_documents().flat_map(|d| d.shapes.iter()).collect();
        declared.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.source.filename.cmp(&b.source.filename)));

        for shape in declared {
            match shapes.entry(shape.id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(shape.clone());
                }
                // Redeclaration with an identical definition merges
                // silently.
                Entry::Occupied(slot) if same_definition(slot.get(), shape) => {}
                Entry::Occupied(slot) => {
                    events.push(
                        ValidationEvent::error(
                            event_ids::DUPLICATE_SHAPE,
                            format!(
                                "shape `{}` is declared more than once with conflicting definitions ({} and {})",
                                shape.id, slot.get().source, shape.source
                            ),
                        )
                        .on_shape(shape.id.clone())
                        .at(shape.source.clone()),
                    );
                }
            }
        }

        let mut metadata: BTreeMap<String, Node> = BTreeMap::new();
        let mut metadata_entries: Vec<(&String, &Node, &str)> = self
            .all_documents()
            .flat_map(|d| d.metadata.iter().map(move |(k, v)| (k, v, d.filename.as_str())))
            .collect();
        metadata_entries.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.2.cmp(b.2)));
        for (key, value, filename) in metadata_entries {
            match metadata.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(value.clone());
                }
                Entry::Occupied(slot) if slot.get() == value => {}
                Entry::Occupied(_) => {
                    events.push(ValidationEvent::error(
                        event_ids::METADATA_CONFLICT,
                        format!(
                            "metadata key `{}` is defined with conflicting values (conflict found in {})",
                            key, filename
                        ),
                    ));
                }
            }
        }

        // Standalone trait applications, in deterministic order.
        let mut applies: Vec<&TraitApplication> =
            self.all_documents().flat_map(|d| d.applies.iter()).collect();
        applies.sort_by(|a, b| {
            a.target
                .cmp(&b.target)
                .then_with(|| a.trait_id.cmp(&b.trait_id))
        });
        for apply in applies {
            let Some(shape) = shapes.get_mut(&apply.target) else {
                events.push(
                    ValidationEvent::error(
                        event_ids::UNRESOLVED_REFERENCE,
                        format!(
                            "trait `{}` is applied to undefined shape `{}`",
                            apply.trait_id, apply.target
                        ),
                    )
                    .at(apply.source.clone()),
                );
                continue;
            };
            match shape.traits.entry(apply.trait_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(apply.value.clone());
                }
                Entry::Occupied(mut slot) => match merge_trait_values(slot.get(), &apply.value) {
                    Some(merged) => {
                        slot.insert(merged);
                    }
                    None => {
                        events.push(
                            ValidationEvent::error(
                                event_ids::TRAIT_CONFLICT,
                                format!(
                                    "trait `{}` is applied to `{}` with conflicting values",
                                    apply.trait_id, apply.target
                                ),
                            )
                            .on_shape(apply.target.clone())
                            .at(apply.source.clone()),
                        );
                    }
                },
            }
        }

        Declared { shapes, metadata }
    }
}

struct Declared {
    shapes: BTreeMap<ShapeId, Shape>,
    metadata: BTreeMap<String, Node>,
}

/// Definition equality, ignoring where the shape was declared
fn same_definition(a: &Shape, b: &Shape) -> bool {
    a.kind == b.kind && a.traits == b.traits && a.mixins == b.mixins
}

/// Duplicate identical applications merge; lists concatenate; objects
/// union with the existing value winning on key conflicts. Anything
/// else is a conflict.
fn merge_trait_values(existing: &Node, incoming: &Node) -> Option<Node> {
    if existing == incoming {
        return Some(existing.clone());
    }
    match (existing, incoming) {
        (Node::Array(a), Node::Array(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().cloned());
            Some(Node::Array(merged))
        }
        (Node::Object(a), Node::Object(b)) => {
            let mut merged = b.clone();
            merged.extend(a.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(Node::Object(merged))
        }
        _ => None,
    }
}

/// Pass 2: copy mixin members and traits into consumers, dependencies
/// first. Local definitions always win; earlier mixins beat later ones.
fn flatten_mixins(shapes: &mut BTreeMap<ShapeId, Shape>, events: &mut Vec<ValidationEvent>) {
    let mut graph: DiGraph<ShapeId, ()> = DiGraph::new();
    let mut nodes: HashMap<ShapeId, NodeIndex> = HashMap::new();

    for (id, shape) in shapes.iter() {
        if shape.mixins.is_empty() {
            continue;
        }
        let consumer = *nodes
            .entry(id.clone())
            .or_insert_with(|| graph.add_node(id.clone()));
        for mixin in &shape.mixins {
            let dependency = *nodes
                .entry(mixin.clone())
                .or_insert_with(|| graph.add_node(mixin.clone()));
            // Edge dependency -> consumer puts mixins first in toposort.
            graph.add_edge(dependency, consumer, ());
        }
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(_) => {
            for scc in tarjan_scc(&graph) {
                if scc.len() < 2 {
                    continue;
                }
                let mut members: Vec<String> =
                    scc.iter().map(|n| graph[*n].to_string()).collect();
                members.sort();
                events.push(
                    ValidationEvent::error(
                        event_ids::MIXIN_CYCLE,
                        format!("mixin cycle detected: {}", members.join(" -> ")),
                    )
                    .on_shape(graph[scc[0]].clone()),
                );
            }
            return;
        }
    };

    for node in order {
        let consumer_id = graph[node].clone();
        let Some(consumer) = shapes.get(&consumer_id) else {
            // Missing mixin targets are reported by the resolve pass.
            continue;
        };
        if consumer.mixins.is_empty() {
            continue;
        }

        let local_member_names: HashSet<String> = consumer
            .members()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        let local_members = consumer.members().to_vec();

        let mut inherited_members: Vec<(String, ShapeId)> = Vec::new();
        let mut inherited_traits: Vec<(ShapeId, Node)> = Vec::new();
        let mut new_member_shapes: Vec<Shape> = Vec::new();
        let mut seen_names = local_member_names.clone();

        for mixin_id in consumer.mixins.clone() {
            let Some(mixin) = shapes.get(&mixin_id) else {
                continue;
            };
            for (trait_id, value) in &mixin.traits {
                if *trait_id == prelude::trait_id() {
                    continue;
                }
                inherited_traits.push((trait_id.clone(), value.clone()));
            }
            for (name, member_id) in mixin.members() {
                if !seen_names.insert(name.clone()) {
                    continue;
                }
                let Some(member) = shapes.get(member_id) else {
                    continue;
                };
                let new_id = consumer_id.with_member(name.clone());
                let target = member
                    .member_target()
                    .cloned()
                    .unwrap_or_else(|| member_id.clone());
                let mut copied = Shape::new(
                    new_id.clone(),
                    ShapeKind::Member {
                        container: consumer_id.clone(),
                        target,
                    },
                );
                copied.traits = member.traits.clone();
                copied.source = member.source.clone();
                inherited_members.push((name.clone(), new_id));
                new_member_shapes.push(copied);
            }
        }

        for copied in new_member_shapes {
            // Never clobber an existing shape; the name check above
            // already guarantees the id is free on first flattening.
            shapes.entry(copied.id.clone()).or_insert(copied);
        }

        let Some(consumer) = shapes.get_mut(&consumer_id) else {
            continue;
        };
        for (trait_id, value) in inherited_traits {
            consumer.traits.entry(trait_id).or_insert(value);
        }
        if !inherited_members.is_empty() {
            let mut members = inherited_members;
            members.extend(local_members);
            match &mut consumer.kind {
                ShapeKind::Structure { members: m }
                | ShapeKind::Union { members: m }
                | ShapeKind::Enum { members: m }
                | ShapeKind::IntEnum { members: m } => *m = members,
                _ => {}
            }
        }
    }
}

/// Every id referenced by a shape, paired with the referencing shape
struct References {
    /// target id -> referencing shape ids (sorted, deduped at build)
    referenced_by: HashMap<ShapeId, Vec<ShapeId>>,
}

/// Pass 3: every symbolic reference must name a declared shape
fn resolve_references(
    shapes: &BTreeMap<ShapeId, Shape>,
    events: &mut Vec<ValidationEvent>,
) -> References {
    let mut referenced_by: HashMap<ShapeId, Vec<ShapeId>> = HashMap::new();

    for (id, shape) in shapes {
        for target in referenced_ids(shape) {
            referenced_by
                .entry(target.clone())
                .or_default()
                .push(id.clone());
            if !shapes.contains_key(&target) {
                events.push(
                    ValidationEvent::error(
                        event_ids::UNRESOLVED_REFERENCE,
                        format!("shape `{}` references undefined shape `{}`", id, target),
                    )
                    .on_shape(id.clone())
                    .at(shape.source.clone()),
                );
            }
        }
    }

    References { referenced_by }
}

/// All ids a shape structurally references (trait ids excluded; unknown
/// traits are tolerated separately)
fn referenced_ids(shape: &Shape) -> Vec<ShapeId> {
    let mut ids: Vec<ShapeId> = shape.mixins.clone();
    match &shape.kind {
        ShapeKind::Service {
            operations,
            resources,
            errors,
            ..
        } => {
            ids.extend(operations.iter().cloned());
            ids.extend(resources.iter().cloned());
            ids.extend(errors.iter().cloned());
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
            ids.extend(identifiers.values().cloned());
            ids.extend(properties.values().cloned());
            for op in [create, read, update, delete, list, put].into_iter().flatten() {
                ids.push(op.clone());
            }
            ids.extend(operations.iter().cloned());
            ids.extend(collection_operations.iter().cloned());
            ids.extend(resources.iter().cloned());
        }
        ShapeKind::Operation {
            input,
            output,
            errors,
        } => {
            for io in [input, output].into_iter().flatten() {
                ids.push(io.clone());
            }
            ids.extend(errors.iter().cloned());
        }
        ShapeKind::Structure { members }
        | ShapeKind::Union { members }
        | ShapeKind::Enum { members }
        | ShapeKind::IntEnum { members } => {
            ids.extend(members.iter().map(|(_, id)| id.clone()));
        }
        ShapeKind::List { member } => ids.push(member.clone()),
        ShapeKind::Map { key, value } => {
            ids.push(key.clone());
            ids.push(value.clone());
        }
        ShapeKind::Member { container, target } => {
            ids.push(container.clone());
            ids.push(target.clone());
        }
        ShapeKind::Simple(_) => {}
    }
    ids
}

/// Remove shapes whose only references are `mixins` entries, along with
/// their members, and clear flattened mixin lists.
fn discard_mixin_only_shapes(shapes: &mut BTreeMap<ShapeId, Shape>, references: &References) {
    let mixin_ids: HashSet<ShapeId> = shapes
        .values()
        .flat_map(|s| s.mixins.iter().cloned())
        .collect();

    let mut removable: HashSet<ShapeId> = HashSet::new();
    for mixin_id in &mixin_ids {
        let externally_referenced = references
            .referenced_by
            .get(mixin_id)
            .into_iter()
            .flatten()
            .any(|referrer| {
                shapes
                    .get(referrer)
                    .map(|r| {
                        // A member of the mixin itself does not count.
                        !r.mixins.contains(mixin_id)
                            && r.member_container() != Some(mixin_id)
                    })
                    .unwrap_or(false)
            });
        if !externally_referenced {
            removable.insert(mixin_id.clone());
        }
    }

    shapes.retain(|id, _| !removable.contains(&id.without_member()));
    for shape in shapes.values_mut() {
        shape.mixins.retain(|m| !removable.contains(m));
    }
}

/// Pass 4: structural check of applied trait values
fn check_trait_values(
    shapes: &BTreeMap<ShapeId, Shape>,
    deny_unknown: bool,
    events: &mut Vec<ValidationEvent>,
) {
    let trait_marker = prelude::trait_id();

    for (id, shape) in shapes {
        for (trait_id, value) in &shape.traits {
            let Some(definition) = shapes.get(trait_id) else {
                let severity = if deny_unknown {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                events.push(
                    ValidationEvent::new(
                        severity,
                        event_ids::UNKNOWN_TRAIT,
                        format!("unknown trait `{}` applied to `{}`", trait_id, id),
                    )
                    .on_shape(id.clone())
                    .at(shape.source.clone()),
                );
                continue;
            };
            if !definition.has_trait(&trait_marker) && *trait_id != trait_marker {
                events.push(
                    ValidationEvent::warning(
                        event_ids::UNKNOWN_TRAIT,
                        format!(
                            "shape `{}` is applied as a trait to `{}` but is not a trait definition",
                            trait_id, id
                        ),
                    )
                    .on_shape(id.clone()),
                );
                continue;
            }
            if let Some(expected) = expected_value_kind(definition) {
                if !value_matches(value, expected) {
                    events.push(
                        ValidationEvent::error(
                            event_ids::TRAIT_VALUE,
                            format!(
                                "value for trait `{}` on `{}` must be a {}, found {}",
                                trait_id,
                                id,
                                expected,
                                value.kind_name()
                            ),
                        )
                        .on_shape(id.clone())
                        .at(shape.source.clone()),
                    );
                }
            }
        }
    }
}

/// Node kind a trait definition's shape admits; `None` means any value
fn expected_value_kind(definition: &Shape) -> Option<&'static str> {
    match definition.shape_type() {
        ShapeType::Structure | ShapeType::Union | ShapeType::Map => Some("object"),
        ShapeType::String | ShapeType::Enum | ShapeType::Timestamp => Some("string"),
        ShapeType::List => Some("array"),
        ShapeType::Boolean => Some("boolean"),
        t if t.is_number() => Some("number"),
        _ => None,
    }
}

fn value_matches(value: &Node, expected: &str) -> bool {
    value.kind_name() == expected
}

/// Pass 5: reject cycles made only of required structure members with
/// no list, map, union, or optional member in between.
fn check_recursion(shapes: &BTreeMap<ShapeId, Shape>, events: &mut Vec<ValidationEvent>) {
    let required = prelude::required_trait_id();

    let mut graph: DiGraph<ShapeId, ()> = DiGraph::new();
    let mut nodes: HashMap<ShapeId, NodeIndex> = HashMap::new();
    let mut node_of = |graph: &mut DiGraph<ShapeId, ()>, id: &ShapeId| {
        *nodes
            .entry(id.clone())
            .or_insert_with(|| graph.add_node(id.clone()))
    };

    for (id, shape) in shapes {
        let ShapeKind::Structure { members } = &shape.kind else {
            continue;
        };
        for (_, member_id) in members {
            let Some(member) = shapes.get(member_id) else {
                continue;
            };
            if !member.has_trait(&required) {
                continue;
            }
            let Some(target) = member.member_target() else {
                continue;
            };
            let Some(target_shape) = shapes.get(target) else {
                continue;
            };
            // Only direct structure-to-structure containment can make
            // the value unboundedly recursive; aggregates and unions
            // break the cycle.
            if target_shape.shape_type() == ShapeType::Structure {
                let from = node_of(&mut graph, id);
                let to = node_of(&mut graph, target);
                graph.add_edge(from, to, ());
            }
        }
    }

    for scc in tarjan_scc(&graph) {
        let is_cycle = scc.len() > 1
            || graph
                .neighbors(scc[0])
                .any(|n| n == scc[0]);
        if !is_cycle {
            continue;
        }
        let mut members: Vec<String> = scc.iter().map(|n| graph[*n].to_string()).collect();
        members.sort();
        events.push(
            ValidationEvent::error(
                event_ids::ILLEGAL_RECURSION,
                format!(
                    "unbounded recursion through required members: {}",
                    members.join(" -> ")
                ),
            )
            .on_shape(graph[scc[0]].clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> ShapeId {
        ShapeId::parse(text).unwrap()
    }

    fn string_member(container: &str, name: &str, required: bool) -> Vec<Shape> {
        member_of(container, name, "weave.api#String", required)
    }

    fn member_of(container: &str, name: &str, target: &str, required: bool) -> Vec<Shape> {
        let member_id = id(container).with_member(name);
        let mut member = Shape::new(
            member_id.clone(),
            ShapeKind::Member {
                container: id(container),
                target: id(target),
            },
        );
        if required {
            member
                .traits
                .insert(prelude::required_trait_id(), Node::empty_object());
        }
        vec![member]
    }

    fn structure(container: &str, members: &[&str]) -> Shape {
        Shape::new(
            id(container),
            ShapeKind::Structure {
                members: members
                    .iter()
                    .map(|name| (name.to_string(), id(container).with_member(*name)))
                    .collect(),
            },
        )
    }

    #[test]
    fn test_assembles_simple_structure() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(structure("ns#Foo", &["bar"]));
        assembler.add_shapes(string_member("ns#Foo", "bar", false));

        let result = assembler.assemble();
        assert!(!result.is_failure(), "events: {:?}", result.events());
        let model = result.model().unwrap();
        assert!(model.contains_shape(&id("ns#Foo$bar")));
    }

    #[test]
    fn test_unresolved_reference_is_fatal() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(structure("ns#Foo", &["bar"]));
        assembler.add_shapes(member_of("ns#Foo", "bar", "ns#Missing", false));

        let result = assembler.assemble();
        assert!(result.is_failure());
        assert!(result
            .events()
            .iter()
            .any(|e| e.id == event_ids::UNRESOLVED_REFERENCE));
    }

    #[test]
    fn test_duplicate_identical_declarations_merge() {
        let mut assembler = ModelAssembler::new();
        assembler.add_document(SourceDocument {
            filename: "a.json".to_string(),
            shapes: vec![Shape::new(id("ns#S"), ShapeKind::Simple(ShapeType::String))],
            ..Default::default()
        });
        assembler.add_document(SourceDocument {
            filename: "b.json".to_string(),
            shapes: vec![Shape::new(id("ns#S"), ShapeKind::Simple(ShapeType::String))],
            ..Default::default()
        });
        assert!(!assembler.assemble().is_failure());
    }

    #[test]
    fn test_duplicate_conflicting_declarations_fail() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(Shape::new(id("ns#S"), ShapeKind::Simple(ShapeType::String)));
        assembler.add_shape(Shape::new(id("ns#S"), ShapeKind::Simple(ShapeType::Integer)));

        let result = assembler.assemble();
        assert!(result.is_failure());
        assert!(result
            .events()
            .iter()
            .any(|e| e.id == event_ids::DUPLICATE_SHAPE));
    }

    #[test]
    fn test_mixin_members_are_copied() {
        let mut assembler = ModelAssembler::new();
        let mut mixin = structure("ns#Base", &["x"]);
        mixin
            .traits
            .insert(prelude::deprecated_trait_id(), Node::empty_object());
        assembler.add_shape(mixin);
        assembler.add_shapes(string_member("ns#Base", "x", false));

        let mut consumer = structure("ns#A", &[]);
        consumer.mixins.push(id("ns#Base"));
        assembler.add_shape(consumer);

        let result = assembler.assemble();
        let model = result.model().expect("assembly succeeds");
        let a = model.get_shape(&id("ns#A")).unwrap();
        assert_eq!(a.member_named("x"), Some(&id("ns#A$x")));
        assert!(a.has_trait(&prelude::deprecated_trait_id()));

        let copied = model.get_shape(&id("ns#A$x")).unwrap();
        assert_eq!(copied.member_target(), Some(&id("weave.api#String")));
        assert_eq!(copied.member_container(), Some(&id("ns#A")));
    }

    #[test]
    fn test_local_member_overrides_mixin() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(structure("ns#B", &["x"]));
        assembler.add_shapes(string_member("ns#B", "x", false));

        let mut a = structure("ns#A", &["x"]);
        a.mixins.push(id("ns#B"));
        assembler.add_shape(a);
        assembler.add_shapes(member_of("ns#A", "x", "weave.api#Integer", false));

        let model = assembler.assemble().into_model().expect("assembly succeeds");
        let member = model.get_shape(&id("ns#A$x")).unwrap();
        assert_eq!(member.member_target(), Some(&id("weave.api#Integer")));
    }

    #[test]
    fn test_mixin_cycle_is_fatal() {
        let mut assembler = ModelAssembler::new();
        let mut a = structure("ns#A", &[]);
        a.mixins.push(id("ns#B"));
        let mut b = structure("ns#B", &[]);
        b.mixins.push(id("ns#A"));
        assembler.add_shape(a);
        assembler.add_shape(b);

        let result = assembler.assemble();
        assert!(result.is_failure());
        assert!(result.events().iter().any(|e| e.id == event_ids::MIXIN_CYCLE));
    }

    #[test]
    fn test_direct_required_recursion_rejected() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(structure("ns#S", &["next"]));
        assembler.add_shapes(member_of("ns#S", "next", "ns#S", true));

        let result = assembler.assemble();
        // Non-fatal: model still produced.
        assert!(!result.is_failure());
        assert!(result
            .events()
            .iter()
            .any(|e| e.id == event_ids::ILLEGAL_RECURSION));
    }

    #[test]
    fn test_list_breaks_recursion() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(structure("ns#S", &["next"]));
        assembler.add_shapes(member_of("ns#S", "next", "ns#SList", true));
        let list_member = id("ns#SList").with_member("member");
        assembler.add_shape(Shape::new(
            id("ns#SList"),
            ShapeKind::List {
                member: list_member.clone(),
            },
        ));
        assembler.add_shape(Shape::new(
            list_member,
            ShapeKind::Member {
                container: id("ns#SList"),
                target: id("ns#S"),
            },
        ));

        let result = assembler.assemble();
        assert!(!result.is_failure());
        assert!(!result
            .events()
            .iter()
            .any(|e| e.id == event_ids::ILLEGAL_RECURSION));
    }

    #[test]
    fn test_unknown_trait_warns() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(
            Shape::new(id("ns#S"), ShapeKind::Simple(ShapeType::String))
                .with_trait(id("ns#mystery"), Node::empty_object()),
        );

        let result = assembler.assemble();
        assert!(!result.is_failure());
        let event = result
            .events()
            .iter()
            .find(|e| e.id == event_ids::UNKNOWN_TRAIT)
            .expect("unknown trait event");
        assert_eq!(event.severity, Severity::Warning);
    }

    #[test]
    fn test_trait_value_kind_checked() {
        let mut assembler = ModelAssembler::new();
        // documentation expects a string value.
        assembler.add_shape(
            Shape::new(id("ns#S"), ShapeKind::Simple(ShapeType::String))
                .with_trait(prelude::documentation_trait_id(), Node::Bool(true)),
        );

        let result = assembler.assemble();
        assert!(!result.is_failure());
        assert!(result.events().iter().any(|e| e.id == event_ids::TRAIT_VALUE));
    }

    #[test]
    fn test_apply_statement_attaches_trait() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(Shape::new(id("ns#S"), ShapeKind::Simple(ShapeType::String)));
        assembler.apply_trait(TraitApplication {
            target: id("ns#S"),
            trait_id: prelude::documentation_trait_id(),
            value: Node::from("docs"),
            source: SourceLocation::none(),
        });

        let model = assembler.assemble().into_model().unwrap();
        let shape = model.get_shape(&id("ns#S")).unwrap();
        assert_eq!(
            shape
                .get_trait(&prelude::documentation_trait_id())
                .and_then(Node::as_str),
            Some("docs")
        );
    }

    #[test]
    fn test_reflattening_is_idempotent() {
        let mut assembler = ModelAssembler::new();
        assembler.add_shape(structure("ns#Base", &["x"]));
        assembler.add_shapes(string_member("ns#Base", "x", false));
        let mut a = structure("ns#A", &[]);
        a.mixins.push(id("ns#Base"));
        assembler.add_shape(a);

        let first = assembler.assemble().into_model().unwrap();

        let mut second_assembler = ModelAssembler::new();
        second_assembler.add_shapes(
            first
                .shapes()
                .filter(|s| !prelude::is_prelude_id(&s.id))
                .cloned(),
        );
        let second = second_assembler.assemble().into_model().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_metadata_conflict_is_fatal() {
        let mut assembler = ModelAssembler::new();
        assembler.add_document(SourceDocument {
            filename: "a.json".to_string(),
            metadata: [("key".to_string(), Node::from("one"))].into_iter().collect(),
            ..Default::default()
        });
        assembler.add_document(SourceDocument {
            filename: "b.json".to_string(),
            metadata: [("key".to_string(), Node::from("two"))].into_iter().collect(),
            ..Default::default()
        });
        assert!(assembler.assemble().is_failure());
    }

    #[test]
    fn test_document_order_does_not_matter() {
        let doc_a = SourceDocument {
            filename: "a.json".to_string(),
            shapes: vec![structure("ns#Foo", &["bar"])],
            ..Default::default()
        };
        let doc_b = SourceDocument {
            filename: "b.json".to_string(),
            shapes: string_member("ns#Foo", "bar", false),
            ..Default::default()
        };

        let mut forward = ModelAssembler::new();
        forward.add_document(doc_a.clone()).add_document(doc_b.clone());
        let mut backward = ModelAssembler::new();
        backward.add_document(doc_b).add_document(doc_a);

        assert_eq!(
            forward.assemble().into_model(),
            backward.assemble().into_model()
        );
    }
}
