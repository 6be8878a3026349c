//! Built-in validators
//!
//! Each validator is a self-contained read-only pass. The default set
//! covers naming hygiene, dangling shapes, and documentation coverage;
//! `EmitEachSelectorValidator` turns a configured selector into a
//! validator so projects can add their own rules without code.

use regex::Regex;
use std::collections::BTreeSet;

use crate::model::Model;
use crate::neighbor::{Direction, NeighborIndex};
use crate::prelude;
use crate::selector::Selector;
use crate::shape::ShapeType;
use crate::shape_id::ShapeId;
use crate::validation::{Severity, ValidationEvent, Validator};

/// The validators every pipeline runs unless configured otherwise
pub fn default_validators() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(NamingConventionValidator::new()),
        Box::new(UnreferencedShapeValidator),
        Box::new(MissingDocumentationValidator),
    ]
}

/// Shape names are UpperCamelCase, member names lowerCamelCase
pub struct NamingConventionValidator {
    shape_name: Regex,
    member_name: Regex,
}

impl NamingConventionValidator {
    pub fn new() -> Self {
        Self {
            shape_name: Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("static pattern"),
            member_name: Regex::new(r"^[a-zA-Z][A-Za-z0-9_]*$").expect("static pattern"),
        }
    }
}

impl Default for NamingConventionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for NamingConventionValidator {
    fn name(&self) -> &str {
        "NamingConvention"
    }

    fn validate(&self, model: &Model, _neighbors: &NeighborIndex) -> Vec<ValidationEvent> {
        let mut events = Vec::new();
        for shape in model.shapes() {
            if prelude::is_prelude_id(&shape.id) {
                continue;
            }
            match shape.id.member() {
                Some(member) => {
                    // Enum members are conventionally SCREAMING_SNAKE;
                    // only flag names that are invalid under either
                    // convention.
                    if !self.member_name.is_match(member) {
                        events.push(
                            ValidationEvent::warning(
                                self.name(),
                                format!(
                                    "member name `{}` does not match expected conventions",
                                    member
                                ),
                            )
                            .on_shape(shape.id.clone())
                            .at(shape.source.clone()),
                        );
                    }
                }
                None => {
                    if !self.shape_name.is_match(shape.id.name()) {
                        events.push(
                            ValidationEvent::warning(
                                self.name(),
                                format!(
                                    "shape name `{}` should be UpperCamelCase",
                                    shape.id.name()
                                ),
                            )
                            .on_shape(shape.id.clone())
                            .at(shape.source.clone()),
                        );
                    }
                }
            }
        }
        events
    }
}

/// Shapes not reachable from any service are flagged as dead weight.
/// Models that declare no service are skipped entirely; everything is a
/// root then.
pub struct UnreferencedShapeValidator;

impl Validator for UnreferencedShapeValidator {
    fn name(&self) -> &str {
        "UnreferencedShape"
    }

    fn validate(&self, model: &Model, neighbors: &NeighborIndex) -> Vec<ValidationEvent> {
        let roots: Vec<&ShapeId> = model
            .shapes_of_type(ShapeType::Service)
            .map(|s| &s.id)
            .collect();
        if roots.is_empty() {
            return Vec::new();
        }

        let mut reachable: BTreeSet<ShapeId> = roots.iter().map(|id| (*id).clone()).collect();
        let mut queue: Vec<ShapeId> = reachable.iter().cloned().collect();
        while let Some(current) = queue.pop() {
            for edge in neighbors.neighbors(&current, Direction::Outgoing) {
                if reachable.insert(edge.neighbor.clone()) {
                    queue.push(edge.neighbor.clone());
                }
            }
        }

        model
            .shapes()
            .filter(|shape| {
                !prelude::is_prelude_id(&shape.id)
                    && !reachable.contains(&shape.id)
                    && !shape.has_trait(&prelude::trait_id())
            })
            .map(|shape| {
                ValidationEvent::note(
                    self.name(),
                    format!("shape `{}` is not connected to any service", shape.id),
                )
                .on_shape(shape.id.clone())
                .at(shape.source.clone())
            })
            .collect()
    }
}

/// Top-level shapes outside the prelude should carry `documentation`
pub struct MissingDocumentationValidator;

impl Validator for MissingDocumentationValidator {
    fn name(&self) -> &str {
        "MissingDocumentation"
    }

    fn validate(&self, model: &Model, _neighbors: &NeighborIndex) -> Vec<ValidationEvent> {
        let documentation = prelude::documentation_trait_id();
        model
            .shapes()
            .filter(|shape| {
                !shape.id.is_member_id()
                    && !prelude::is_prelude_id(&shape.id)
                    && !shape.has_trait(&documentation)
            })
            .map(|shape| {
                ValidationEvent::note(
                    self.name(),
                    format!("shape `{}` has no documentation", shape.id),
                )
                .on_shape(shape.id.clone())
                .at(shape.source.clone())
            })
            .collect()
    }
}

/// Emits one event per shape matched by a configured selector.
/// `{id}` in the message template expands to the matched shape id.
pub struct EmitEachSelectorValidator {
    id: String,
    selector: Selector,
    severity: Severity,
    message: String,
}

impl EmitEachSelectorValidator {
    pub fn new(
        id: impl Into<String>,
        selector: Selector,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            selector,
            severity,
            message: message.into(),
        }
    }
}

impl Validator for EmitEachSelectorValidator {
    fn name(&self) -> &str {
        &self.id
    }

    fn validate(&self, model: &Model, neighbors: &NeighborIndex) -> Vec<ValidationEvent> {
        self.selector
            .select_with(model, neighbors)
            .into_iter()
            .map(|shape_id| {
                let message = self.message.replace("{id}", &shape_id.to_string());
                let source = model.get_shape(&shape_id).map(|s| s.source.clone());
                let mut event =
                    ValidationEvent::new(self.severity, self.id.clone(), message).on_shape(shape_id);
                if let Some(source) = source {
                    event = event.at(source);
                }
                event
            })
            .collect()
    }
}
