//! Selector queries
//!
//! Selectors are a small query language over an assembled model: a
//! pipeline of steps that starts from every shape and narrows or
//! traverses until the remaining shapes are the result. `Selector::parse`
//! is the only fallible half; evaluating a parsed selector never fails.
//!
//! ```text
//! service ~> operation -[input, output]-> structure
//! structure [trait|error = client]
//! string :test(< member < structure)
//! ```

mod eval;
mod parser;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::Model;
use crate::neighbor::{NeighborIndex, RelationshipType};
use crate::shape::ShapeType;
use crate::shape_id::ShapeId;

/// Parse-time selector error, with the character position it occurred at
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("selector syntax error at position {position}: {message}")]
pub struct SelectorSyntaxError {
    pub position: usize,
    pub message: String,
}

/// A parsed, reusable selector expression
#[derive(Debug, Clone)]
pub struct Selector {
    text: String,
    steps: Vec<Step>,
}

impl Selector {
    /// Parse a selector expression
    pub fn parse(text: &str) -> Result<Self, SelectorSyntaxError> {
        parser::parse(text)
    }

    pub(crate) fn from_parts(text: String, steps: Vec<Step>) -> Self {
        Self { text, steps }
    }

    /// The source text this selector was parsed from
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Evaluate against a model, building a throwaway neighbor index.
    /// Results are deduplicated and sorted by shape id.
    pub fn select(&self, model: &Model) -> Vec<ShapeId> {
        let neighbors = NeighborIndex::new(model);
        self.select_with(model, &neighbors)
    }

    /// Evaluate against a model with a shared neighbor index
    pub fn select_with(&self, model: &Model, neighbors: &NeighborIndex) -> Vec<ShapeId> {
        eval::select(self, model, neighbors)
    }

    /// Whether the given shape is in this selector's result set
    pub fn matches(&self, model: &Model, id: &ShapeId) -> bool {
        self.select(model).binary_search(id).is_ok()
    }

    /// `matches` with a shared neighbor index
    pub fn matches_with(&self, model: &Model, neighbors: &NeighborIndex, id: &ShapeId) -> bool {
        self.select_with(model, neighbors).binary_search(id).is_ok()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl FromStr for Selector {
    type Err = SelectorSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// === AST ===

#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Shape type or category filter
    Types(TypeFilter),
    /// `[...]` attribute constraint
    Attribute(AttributeSelector),
    /// `>` (any relationship) or `-[rel, ...]->`
    Forward(Option<Vec<RelationshipType>>),
    /// `<` or `<-[rel, ...]-`
    Reverse(Option<Vec<RelationshipType>>),
    /// `~>`: transitive forward closure, each shape visited once
    Recursive,
    /// `:is(sel, ...)`: union of the sub-selector results; variable
    /// scope resets inside
    Is(Vec<Selector>),
    /// `:not(sel, ...)`: keep shapes where every sub-selector is empty;
    /// variable scope resets inside
    Not(Vec<Selector>),
    /// `:test(sel, ...)`: non-consuming lookahead, evaluated with the
    /// enclosing variable bindings
    Test(Vec<Selector>),
    /// `$name(sel)`: bind the sub-selector's result for `var|name`
    Variable { name: String, selector: Selector },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeFilter {
    Any,
    Number,
    Simple,
    Collection,
    Exact(ShapeType),
}

impl TypeFilter {
    pub(crate) fn matches(&self, shape_type: ShapeType) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::Number => shape_type.is_number(),
            TypeFilter::Simple => shape_type.is_simple(),
            TypeFilter::Collection => shape_type.is_collection(),
            TypeFilter::Exact(t) => shape_type == *t,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AttributeSelector {
    pub negated: bool,
    /// Terms joined by `&&`; all must hold
    pub terms: Vec<AttributeTerm>,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct AttributeTerm {
    pub path: AttributePath,
    pub comparison: Option<Comparison>,
}

#[derive(Debug, Clone)]
pub(crate) struct AttributePath {
    pub root: PathRoot,
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone)]
pub(crate) enum PathRoot {
    /// `id`, `id|namespace`, `id|name`, `id|member`
    Id,
    /// `service|version`
    Service,
    /// `trait|<shape id>`, then into the trait value
    Trait(ShapeId),
    /// `var|<name>`: shapes bound by a `$name(...)` step
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSegment {
    Key(String),
    /// Terminal `(length)`
    Length,
}

#[derive(Debug, Clone)]
pub(crate) struct Comparison {
    pub comparator: Comparator,
    /// Right-hand values; a match against any one succeeds
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparator {
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    /// `?=`: attribute existence equals the boolean right-hand side
    Exists,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparator {
    /// The four ordered comparators only apply to numeric values
    pub(crate) fn is_numeric(&self) -> bool {
        matches!(
            self,
            Comparator::LessThan
                | Comparator::LessThanOrEqual
                | Comparator::GreaterThan
                | Comparator::GreaterThanOrEqual
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ModelAssembler;
    use crate::loader;

    fn model() -> Model {
        let document = loader::load_str(
            r#"{
                "weave": "1.0",
                "shapes": {
                    "example.weather#Weather": {
                        "type": "service",
                        "version": "2024-01-01",
                        "operations": [{ "target": "example.weather#GetForecast" }]
                    },
                    "example.weather#GetForecast": {
                        "type": "operation",
                        "input": { "target": "example.weather#GetForecastInput" },
                        "errors": [{ "target": "example.weather#NoSuchCity" }]
                    },
                    "example.weather#GetForecastInput": {
                        "type": "structure",
                        "members": {
                            "cityId": {
                                "target": "example.weather#CityId",
                                "traits": { "weave.api#required": {} }
                            }
                        }
                    },
                    "example.weather#CityId": { "type": "string" },
                    "example.weather#NoSuchCity": {
                        "type": "structure",
                        "traits": { "weave.api#error": "client" },
                        "members": {
                            "message": { "target": "weave.api#String" }
                        }
                    },
                    "example.weather#Temperature": { "type": "integer" }
                }
            }"#,
            "weather.json",
        )
        .unwrap();

        let mut assembler = ModelAssembler::new();
        assembler.add_document(document);
        assembler.assemble().into_model().expect("model assembles")
    }

    fn names(ids: &[ShapeId], namespace: &str) -> Vec<String> {
        ids.iter()
            .filter(|id| id.namespace() == namespace)
            .map(|id| id.to_string())
            .collect()
    }

    fn run(text: &str) -> Vec<ShapeId> {
        Selector::parse(text).unwrap().select(&model())
    }

    #[test]
    fn test_type_filter() {
        let ids = run("service");
        assert_eq!(
            names(&ids, "example.weather"),
            vec!["example.weather#Weather"]
        );
    }

    #[test]
    fn test_error_trait_attribute() {
        let ids = run("structure [trait|error]");
        assert_eq!(
            names(&ids, "example.weather"),
            vec!["example.weather#NoSuchCity"]
        );
        assert!(run("structure [trait|error = server]").is_empty());
        assert_eq!(run("structure [trait|error = client]").len(), 1);
    }

    #[test]
    fn test_forward_traversal() {
        let ids = run("operation -[input]-> structure");
        assert_eq!(
            names(&ids, "example.weather"),
            vec!["example.weather#GetForecastInput"]
        );
    }

    #[test]
    fn test_reverse_test_lookahead() {
        // Strings some member targets.
        let ids = run("string :test(< member)");
        assert!(ids.contains(&ShapeId::parse("example.weather#CityId").unwrap()));
        assert!(!ids.contains(&ShapeId::parse("example.weather#Temperature").unwrap()));
    }

    #[test]
    fn test_recursive_closure_from_service() {
        let ids = run("service ~> operation");
        assert_eq!(
            names(&ids, "example.weather"),
            vec!["example.weather#GetForecast"]
        );
        // The closure reaches member targets too.
        let all = run("[id|name = Weather] ~> string");
        assert!(all.contains(&ShapeId::parse("example.weather#CityId").unwrap()));
    }

    #[test]
    fn test_id_attribute_paths() {
        let ids =
            run("[id|namespace = example.weather][id|name ^= get i][id|member ?= false]");
        assert_eq!(
            names(&ids, "example.weather"),
            vec![
                "example.weather#GetForecast",
                "example.weather#GetForecastInput"
            ]
        );
    }

    #[test]
    fn test_not_function() {
        let ids = run("structure :not([trait|error]) [id|namespace = example.weather]");
        assert!(!ids.contains(&ShapeId::parse("example.weather#NoSuchCity").unwrap()));
        assert!(ids.contains(&ShapeId::parse("example.weather#GetForecastInput").unwrap()));
    }

    #[test]
    fn test_is_union() {
        let ids = run(":is(service, operation) [id|namespace = example.weather]");
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_variable_binding() {
        // Structures that have at least one required member.
        let ids = run("structure $req(> member [trait|required]) [var|req]");
        assert_eq!(
            names(&ids, "example.weather"),
            vec!["example.weather#GetForecastInput"]
        );
    }

    #[test]
    fn test_variable_scope_resets_in_is_and_not() {
        // Bindings flow into `:test` but reset inside `:is` and `:not`.
        let with_test = run("structure $req(> member [trait|required]) :test([var|req])");
        assert_eq!(
            names(&with_test, "example.weather"),
            vec!["example.weather#GetForecastInput"]
        );
        assert!(run("structure $req(> member [trait|required]) :is([var|req])").is_empty());
        let with_not = run("structure $req(> member [trait|required]) :not([var|req])");
        assert!(with_not.contains(&ShapeId::parse("example.weather#GetForecastInput").unwrap()));
    }

    #[test]
    fn test_unknown_relationship_matches_nothing() {
        assert!(run("service -[frobnicate]-> *").is_empty());
    }

    #[test]
    fn test_results_are_sorted_and_deduplicated() {
        let ids = run("*");
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_matches() {
        let selector = Selector::parse("[trait|error]").unwrap();
        let model = model();
        assert!(selector.matches(&model, &ShapeId::parse("example.weather#NoSuchCity").unwrap()));
        assert!(!selector.matches(&model, &ShapeId::parse("example.weather#CityId").unwrap()));
    }

    #[test]
    fn test_parse_errors_have_positions() {
        let error = Selector::parse("structure [").unwrap_err();
        assert!(error.position >= 10);
        assert!(Selector::parse("frobnicator").is_err());
        assert!(Selector::parse(":unknown(*)").is_err());
        assert!(Selector::parse("~").is_err());
    }
}
