//! Selector evaluation
//!
//! Evaluation pushes each shape of the model through the step pipeline.
//! A step either filters the current shape, fans out to neighbors, or
//! consults a sub-selector; shapes that survive the final step land in
//! the result set. Evaluation is total: a parsed selector always
//! produces a (possibly empty) result.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::model::Model;
use crate::neighbor::{Direction, NeighborIndex, RelationshipType};
use crate::node::Node;
use crate::shape::ShapeKind;
use crate::shape_id::ShapeId;

use super::{
    AttributePath, AttributeSelector, AttributeTerm, Comparator, Comparison, PathRoot,
    PathSegment, Selector, Step,
};

/// Variable bindings, scoped to one traversal root
type Env = HashMap<String, BTreeSet<ShapeId>>;

struct Context<'a> {
    model: &'a Model,
    neighbors: &'a NeighborIndex,
}

pub(super) fn select(selector: &Selector, model: &Model, neighbors: &NeighborIndex) -> Vec<ShapeId> {
    let ctx = Context { model, neighbors };
    let mut out = BTreeSet::new();
    let mut env = Env::new();
    for id in model.shape_ids() {
        eval_steps(&ctx, selector.steps(), id, &mut env, &mut out);
        env.clear();
    }
    out.into_iter().collect()
}

fn eval_steps(
    ctx: &Context<'_>,
    steps: &[Step],
    id: &ShapeId,
    env: &mut Env,
    out: &mut BTreeSet<ShapeId>,
) {
    let Some((step, rest)) = steps.split_first() else {
        out.insert(id.clone());
        return;
    };

    match step {
        Step::Types(filter) => {
            if let Some(shape) = ctx.model.get_shape(id) {
                if filter.matches(shape.shape_type()) {
                    eval_steps(ctx, rest, id, env, out);
                }
            }
        }
        Step::Attribute(attribute) => {
            if attribute_matches(ctx, id, attribute, env) {
                eval_steps(ctx, rest, id, env, out);
            }
        }
        Step::Forward(relationships) => {
            for edge in ctx.neighbors.neighbors(id, Direction::Outgoing) {
                if edge_selected(relationships, edge.relationship_type) {
                    eval_steps(ctx, rest, &edge.neighbor, env, out);
                }
            }
        }
        Step::Reverse(relationships) => {
            for edge in ctx.neighbors.neighbors(id, Direction::Incoming) {
                if edge_selected(relationships, edge.relationship_type) {
                    eval_steps(ctx, rest, &edge.neighbor, env, out);
                }
            }
        }
        Step::Recursive => {
            // Breadth-first closure over forward edges; each shape is
            // visited at most once per root, so cycles terminate.
            let mut visited = BTreeSet::new();
            visited.insert(id.clone());
            let mut queue = VecDeque::from([id.clone()]);
            while let Some(current) = queue.pop_front() {
                for edge in ctx.neighbors.neighbors(&current, Direction::Outgoing) {
                    if visited.insert(edge.neighbor.clone()) {
                        eval_steps(ctx, rest, &edge.neighbor, env, out);
                        queue.push_back(edge.neighbor.clone());
                    }
                }
            }
        }
        Step::Is(selectors) => {
            // Variable scope resets inside `:is` and `:not`; only
            // `:test` sees the enclosing bindings.
            let mut inner = Env::new();
            let mut reached = BTreeSet::new();
            for selector in selectors {
                eval_steps(ctx, selector.steps(), id, &mut inner, &mut reached);
                inner.clear();
            }
            for shape in reached {
                eval_steps(ctx, rest, &shape, env, out);
            }
        }
        Step::Not(selectors) => {
            let none_match = selectors.iter().all(|selector| {
                let mut inner = Env::new();
                eval_to_set(ctx, selector, id, &mut inner).is_empty()
            });
            if none_match {
                eval_steps(ctx, rest, id, env, out);
            }
        }
        Step::Test(selectors) => {
            let any_match = selectors
                .iter()
                .any(|selector| !eval_to_set(ctx, selector, id, env).is_empty());
            if any_match {
                eval_steps(ctx, rest, id, env, out);
            }
        }
        Step::Variable { name, selector } => {
            let bound = eval_to_set(ctx, selector, id, env);
            let previous = env.insert(name.clone(), bound);
            eval_steps(ctx, rest, id, env, out);
            match previous {
                Some(previous) => {
                    env.insert(name.clone(), previous);
                }
                None => {
                    env.remove(name);
                }
            }
        }
    }
}

fn eval_to_set(
    ctx: &Context<'_>,
    selector: &Selector,
    id: &ShapeId,
    env: &mut Env,
) -> BTreeSet<ShapeId> {
    let mut reached = BTreeSet::new();
    eval_steps(ctx, selector.steps(), id, env, &mut reached);
    reached
}

fn edge_selected(
    relationships: &Option<Vec<RelationshipType>>,
    relationship_type: RelationshipType,
) -> bool {
    match relationships {
        None => true,
        Some(wanted) => wanted.contains(&relationship_type),
    }
}

// === Attribute resolution ===

/// A resolved attribute value
#[derive(Debug, Clone, PartialEq)]
enum AttrValue {
    Text(String),
    Number(f64),
    Node(Node),
}

impl AttrValue {
    fn as_text(&self) -> String {
        match self {
            AttrValue::Text(s) => s.clone(),
            AttrValue::Number(n) => n.to_string(),
            AttrValue::Node(node) => node.to_string(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Text(s) => s.parse().ok(),
            AttrValue::Number(n) => Some(*n),
            AttrValue::Node(Node::Number(n)) => Some(*n),
            AttrValue::Node(Node::String(s)) => s.parse().ok(),
            AttrValue::Node(_) => None,
        }
    }
}

fn attribute_matches(
    ctx: &Context<'_>,
    id: &ShapeId,
    attribute: &AttributeSelector,
    env: &Env,
) -> bool {
    let matched = attribute
        .terms
        .iter()
        .all(|term| term_matches(ctx, id, term, attribute.case_insensitive, env));
    matched != attribute.negated
}

fn term_matches(
    ctx: &Context<'_>,
    id: &ShapeId,
    term: &AttributeTerm,
    case_insensitive: bool,
    env: &Env,
) -> bool {
    let values = resolve_path(ctx, id, &term.path, env);
    match &term.comparison {
        None => !values.is_empty(),
        Some(comparison) if comparison.comparator == Comparator::Exists => {
            let exists = !values.is_empty();
            comparison
                .values
                .iter()
                .any(|rhs| rhs.eq_ignore_ascii_case("true") == exists)
        }
        Some(comparison) => values
            .iter()
            .any(|value| compare(value, comparison, case_insensitive)),
    }
}

fn compare(value: &AttrValue, comparison: &Comparison, case_insensitive: bool) -> bool {
    if comparison.comparator.is_numeric() {
        let Some(left) = value.as_number() else {
            return false;
        };
        return comparison.values.iter().any(|rhs| {
            rhs.parse::<f64>().is_ok_and(|right| match comparison.comparator {
                Comparator::LessThan => left < right,
                Comparator::LessThanOrEqual => left <= right,
                Comparator::GreaterThan => left > right,
                Comparator::GreaterThanOrEqual => left >= right,
                _ => unreachable!(),
            })
        });
    }

    let mut left = value.as_text();
    if case_insensitive {
        left = left.to_lowercase();
    }
    comparison.values.iter().any(|rhs| {
        let right = if case_insensitive {
            rhs.to_lowercase()
        } else {
            rhs.clone()
        };
        match comparison.comparator {
            Comparator::Equals => left == right,
            Comparator::NotEquals => left != right,
            Comparator::StartsWith => left.starts_with(&right),
            Comparator::EndsWith => left.ends_with(&right),
            Comparator::Contains => left.contains(&right),
            _ => unreachable!(),
        }
    })
}

fn resolve_path(
    ctx: &Context<'_>,
    id: &ShapeId,
    path: &AttributePath,
    env: &Env,
) -> Vec<AttrValue> {
    match &path.root {
        PathRoot::Id => id_projection(id, &path.segments),
        PathRoot::Service => {
            let Some(shape) = ctx.model.get_shape(id) else {
                return Vec::new();
            };
            let ShapeKind::Service {
                version: Some(version),
                ..
            } = &shape.kind
            else {
                return Vec::new();
            };
            match path.segments.as_slice() {
                [PathSegment::Key(key)] if key == "version" => {
                    vec![AttrValue::Text(version.clone())]
                }
                _ => Vec::new(),
            }
        }
        PathRoot::Trait(trait_id) => {
            let Some(value) = ctx.model.get_shape(id).and_then(|s| s.get_trait(trait_id)) else {
                return Vec::new();
            };
            node_projection(value, &path.segments)
        }
        PathRoot::Var(name) => {
            let Some(bound) = env.get(name) else {
                return Vec::new();
            };
            bound
                .iter()
                .flat_map(|shape| id_projection(shape, &path.segments))
                .collect()
        }
    }
}

/// Project a shape id through `namespace` / `name` / `member` /
/// `(length)` segments
fn id_projection(id: &ShapeId, segments: &[PathSegment]) -> Vec<AttrValue> {
    let text = match segments.first() {
        None => Some(id.to_string()),
        Some(PathSegment::Key(key)) => match key.as_str() {
            "namespace" => Some(id.namespace().to_string()),
            "name" => Some(id.name().to_string()),
            "member" => id.member().map(str::to_string),
            _ => None,
        },
        Some(PathSegment::Length) => {
            return vec![AttrValue::Number(id.to_string().chars().count() as f64)]
        }
    };
    let Some(text) = text else {
        return Vec::new();
    };
    match segments.get(1) {
        None => vec![AttrValue::Text(text)],
        Some(PathSegment::Length) => vec![AttrValue::Number(text.chars().count() as f64)],
        Some(PathSegment::Key(_)) => Vec::new(),
    }
}

/// Walk a trait value along the remaining path segments
fn node_projection(value: &Node, segments: &[PathSegment]) -> Vec<AttrValue> {
    let mut current = value;
    for (index, segment) in segments.iter().enumerate() {
        match segment {
            PathSegment::Key(key) => match current.get_path([key.as_str()]) {
                Some(next) => current = next,
                None => return Vec::new(),
            },
            PathSegment::Length => {
                // `(length)` is terminal; anything after it resolves to
                // nothing.
                if index + 1 != segments.len() {
                    return Vec::new();
                }
                return match current.length() {
                    Some(length) => vec![AttrValue::Number(length as f64)],
                    None => Vec::new(),
                };
            }
        }
    }
    if current.is_null() {
        return Vec::new();
    }
    vec![AttrValue::Node(current.clone())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_projection() {
        let id = ShapeId::parse("example.weather#GetForecast$input").unwrap();
        let project = |segments: &[PathSegment]| id_projection(&id, segments);

        assert_eq!(
            project(&[]),
            vec![AttrValue::Text("example.weather#GetForecast$input".into())]
        );
        assert_eq!(
            project(&[PathSegment::Key("name".into())]),
            vec![AttrValue::Text("GetForecast".into())]
        );
        assert_eq!(
            project(&[PathSegment::Key("member".into())]),
            vec![AttrValue::Text("input".into())]
        );
        assert!(project(&[PathSegment::Key("bogus".into())]).is_empty());
        assert_eq!(
            project(&[PathSegment::Key("name".into()), PathSegment::Length]),
            vec![AttrValue::Number(11.0)]
        );
    }

    #[test]
    fn test_node_projection() {
        let value = Node::from(serde_json::json!({
            "items": ["a", "b"],
            "pageSize": 20
        }));
        let items = node_projection(
            &value,
            &[PathSegment::Key("items".into()), PathSegment::Length],
        );
        assert_eq!(items, vec![AttrValue::Number(2.0)]);

        let first = node_projection(
            &value,
            &[PathSegment::Key("items".into()), PathSegment::Key("0".into())],
        );
        assert_eq!(first, vec![AttrValue::Node(Node::from("a"))]);

        assert!(node_projection(&value, &[PathSegment::Key("missing".into())]).is_empty());
    }

    #[test]
    fn test_numeric_comparison() {
        let comparison = Comparison {
            comparator: Comparator::GreaterThanOrEqual,
            values: vec!["10".to_string()],
        };
        assert!(compare(&AttrValue::Number(20.0), &comparison, false));
        assert!(!compare(&AttrValue::Number(5.0), &comparison, false));
        // Non-numeric values never satisfy ordered comparators.
        assert!(!compare(&AttrValue::Text("abc".into()), &comparison, false));
    }

    #[test]
    fn test_string_comparison_case_flag() {
        let comparison = Comparison {
            comparator: Comparator::Equals,
            values: vec!["CLIENT".to_string()],
        };
        assert!(!compare(&AttrValue::Text("client".into()), &comparison, false));
        assert!(compare(&AttrValue::Text("client".into()), &comparison, true));
    }
}
