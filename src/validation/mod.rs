//! Validation events and the validator pipeline
//!
//! Validators are independent read-only passes over an assembled model.
//! The pipeline runs them in parallel, streams their events through a
//! deduplicating collector, applies suppressions and severity overrides,
//! and returns a deterministically ordered result. A panicking validator
//! is converted into a single error event and never aborts its siblings.

pub mod validators;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::model::Model;
use crate::neighbor::NeighborIndex;
use crate::node::{Node, SourceLocation};
use crate::shape_id::ShapeId;

/// Well-known event ids emitted by the assembler and pipeline
pub mod event_ids {
    pub const DUPLICATE_SHAPE: &str = "DuplicateShape";
    pub const UNRESOLVED_REFERENCE: &str = "UnresolvedReference";
    pub const MIXIN_CYCLE: &str = "MixinCycle";
    pub const ILLEGAL_RECURSION: &str = "IllegalRecursion";
    pub const UNKNOWN_TRAIT: &str = "UnknownTrait";
    pub const TRAIT_VALUE: &str = "TraitValue";
    pub const TRAIT_CONFLICT: &str = "TraitConflict";
    pub const METADATA_CONFLICT: &str = "MetadataConflict";
    pub const VALIDATOR_CRASH: &str = "ValidatorCrash";

    /// Events that come from structural assembly problems and can never
    /// be suppressed.
    pub const STRUCTURAL: [&str; 4] = [
        DUPLICATE_SHAPE,
        UNRESOLVED_REFERENCE,
        MIXIN_CYCLE,
        ILLEGAL_RECURSION,
    ];
}

/// Event severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Suppressed,
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suppressed => write!(f, "SUPPRESSED"),
            Self::Note => write!(f, "NOTE"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A single validation diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEvent {
    pub severity: Severity,
    /// Event id, e.g. `UnresolvedReference` or a validator name
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_id: Option<ShapeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    pub message: String,
    /// Reason recorded when a suppression downgraded this event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
}

impl ValidationEvent {
    pub fn new(severity: Severity, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            id: id.into(),
            shape_id: None,
            source: None,
            message: message.into(),
            suppression_reason: None,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, id, message)
    }

    pub fn warning(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, id, message)
    }

    pub fn note(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Note, id, message)
    }

    pub fn on_shape(mut self, shape_id: ShapeId) -> Self {
        self.shape_id = Some(shape_id);
        self
    }

    pub fn at(mut self, source: SourceLocation) -> Self {
        self.source = Some(source);
        self
    }

    /// The (id, shape id, message) key events are deduplicated by.
    /// Equality is exact; a distinct event is never dropped.
    pub fn dedup_key(&self) -> (String, Option<ShapeId>, String) {
        (self.id.clone(), self.shape_id.clone(), self.message.clone())
    }

    /// Whether this event came from a structural assembly problem
    pub fn is_structural(&self) -> bool {
        event_ids::STRUCTURAL.contains(&self.id.as_str())
    }
}

impl fmt::Display for ValidationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.id, self.message)?;
        if let Some(shape_id) = &self.shape_id {
            write!(f, " ({})", shape_id)?;
        }
        if let Some(source) = &self.source {
            write!(f, " at {}", source)?;
        }
        Ok(())
    }
}

/// A suppression rule: matching events are downgraded to `Suppressed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suppression {
    /// Event id to suppress
    pub id: String,
    /// Namespace the suppression applies to, or `*` for all
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Suppression {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            reason: None,
        }
    }

    /// Read suppressions out of the model's `suppressions` metadata entry.
    /// Malformed entries are skipped with a warning.
    pub fn from_metadata(model: &Model) -> Vec<Suppression> {
        let Some(Node::Array(entries)) = model.metadata("suppressions") else {
            return Vec::new();
        };

        let mut suppressions = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.get("id").and_then(Node::as_str);
            let namespace = entry.get("namespace").and_then(Node::as_str);
            match (id, namespace) {
                (Some(id), Some(namespace)) => suppressions.push(Suppression {
                    id: id.to_string(),
                    namespace: namespace.to_string(),
                    reason: entry
                        .get("reason")
                        .and_then(Node::as_str)
                        .map(str::to_string),
                }),
                _ => {
                    tracing::warn!("ignoring malformed suppression entry: {}", entry);
                }
            }
        }
        suppressions
    }

    /// Whether this rule matches the given event. Structural assembly
    /// events never match.
    pub fn matches(&self, event: &ValidationEvent) -> bool {
        if event.is_structural() || self.id != event.id {
            return false;
        }
        if self.namespace == "*" {
            return true;
        }
        event
            .shape_id
            .as_ref()
            .map(|id| id.namespace() == self.namespace)
            .unwrap_or(false)
    }
}

/// Streaming event sink that drops duplicates as they arrive
#[derive(Debug, Default)]
pub struct EventCollector {
    seen: HashSet<(String, Option<ShapeId>, String)>,
    events: Vec<ValidationEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event, returning false if an equal (id, shape, message)
    /// event was already collected.
    pub fn push(&mut self, event: ValidationEvent) -> bool {
        if self.seen.insert(event.dedup_key()) {
            self.events.push(event);
            true
        } else {
            false
        }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = ValidationEvent>) {
        for event in events {
            self.push(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Finish collection: deterministic order by shape id, event id,
    /// then message.
    pub fn finish(mut self) -> Vec<ValidationEvent> {
        self.events.sort_by(|a, b| {
            a.shape_id
                .cmp(&b.shape_id)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.events
    }
}

/// A single validation pass over an assembled model
pub trait Validator: Send + Sync {
    /// Name used for the event id of emitted events and crash reports
    fn name(&self) -> &str;

    fn validate(&self, model: &Model, neighbors: &NeighborIndex) -> Vec<ValidationEvent>;
}

/// Aggregated result of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub events: Vec<ValidationEvent>,
    pub has_error: bool,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationEvent> {
        self.events
            .iter()
            .filter(|e| e.severity == Severity::Error)
    }
}

/// Run every validator against the model and aggregate their events.
///
/// Validators only read the immutable model and neighbor index, so they
/// run in parallel. Suppressions are the union of the caller's rules and
/// the model's `suppressions` metadata; `severity_overrides` maps event
/// ids to a replacement severity for non-suppressed events.
pub fn run_validators(
    model: &Model,
    neighbors: &NeighborIndex,
    validators: &[Box<dyn Validator>],
    suppressions: &[Suppression],
    severity_overrides: &BTreeMap<String, Severity>,
) -> ValidationResult {
    // Reverse index build must happen-before the parallel fan-out.
    neighbors.ensure_reverse_index();

    let batches: Vec<Vec<ValidationEvent>> = validators
        .par_iter()
        .map(|validator| {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| validator.validate(model, neighbors)));
            match outcome {
                Ok(events) => events,
                Err(cause) => {
                    let detail = cause
                        .downcast_ref::<String>()
                        .map(String::as_str)
                        .or_else(|| cause.downcast_ref::<&str>().copied())
                        .unwrap_or("unknown panic");
                    tracing::error!(validator = validator.name(), "validator panicked: {detail}");
                    vec![ValidationEvent::error(
                        event_ids::VALIDATOR_CRASH,
                        format!("validator `{}` panicked: {}", validator.name(), detail),
                    )]
                }
            }
        })
        .collect();

    let mut all_suppressions = suppressions.to_vec();
    all_suppressions.extend(Suppression::from_metadata(model));

    let mut collector = EventCollector::new();
    for batch in batches {
        for mut event in batch {
            apply_severity_rules(&mut event, &all_suppressions, severity_overrides);
            collector.push(event);
        }
    }

    let events = collector.finish();
    let has_error = events.iter().any(|e| e.severity == Severity::Error);
    ValidationResult { events, has_error }
}

fn apply_severity_rules(
    event: &mut ValidationEvent,
    suppressions: &[Suppression],
    severity_overrides: &BTreeMap<String, Severity>,
) {
    if let Some(rule) = suppressions.iter().find(|s| s.matches(event)) {
        event.severity = Severity::Suppressed;
        event.suppression_reason = rule.reason.clone();
        return;
    }
    if !event.is_structural() {
        if let Some(severity) = severity_overrides.get(&event.id) {
            event.severity = *severity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> ShapeId {
        ShapeId::parse(text).unwrap()
    }

    #[test]
    fn test_collector_dedups_by_id_shape_message() {
        let mut collector = EventCollector::new();
        let event = ValidationEvent::warning("X", "msg").on_shape(id("ns#Foo"));
        assert!(collector.push(event.clone()));
        assert!(!collector.push(event.clone()));
        // Same id and shape, different message: kept.
        assert!(collector.push(ValidationEvent::warning("X", "other").on_shape(id("ns#Foo"))));
        // Same id and message, different shape: kept.
        assert!(collector.push(ValidationEvent::warning("X", "msg").on_shape(id("ns#Bar"))));
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn test_dedup_key_is_the_exact_triple() {
        let event = ValidationEvent::warning("X", "msg").on_shape(id("ns#Foo"));
        assert_eq!(
            event.dedup_key(),
            ("X".to_string(), Some(id("ns#Foo")), "msg".to_string())
        );
        // Severity and source do not take part in deduplication.
        let mut collector = EventCollector::new();
        assert!(collector.push(event.clone()));
        assert!(!collector.push(ValidationEvent::error("X", "msg").on_shape(id("ns#Foo"))));
    }

    #[test]
    fn test_finish_orders_deterministically() {
        let mut collector = EventCollector::new();
        collector.push(ValidationEvent::warning("B", "m").on_shape(id("ns#Zed")));
        collector.push(ValidationEvent::warning("A", "m").on_shape(id("ns#Abc")));
        collector.push(ValidationEvent::warning("A", "m"));
        let events = collector.finish();
        assert!(events[0].shape_id.is_none());
        assert_eq!(events[1].shape_id, Some(id("ns#Abc")));
        assert_eq!(events[2].shape_id, Some(id("ns#Zed")));
    }

    #[test]
    fn test_suppression_matching() {
        let rule = Suppression::new("X", "ns");
        let event = ValidationEvent::error("X", "m").on_shape(id("ns#Foo"));
        assert!(rule.matches(&event));

        let other_ns = ValidationEvent::error("X", "m").on_shape(id("other#Foo"));
        assert!(!rule.matches(&other_ns));

        let wildcard = Suppression::new("X", "*");
        assert!(wildcard.matches(&other_ns));
    }

    #[test]
    fn test_structural_events_cannot_be_suppressed() {
        let rule = Suppression::new(event_ids::UNRESOLVED_REFERENCE, "*");
        let event =
            ValidationEvent::error(event_ids::UNRESOLVED_REFERENCE, "m").on_shape(id("ns#Foo"));
        assert!(!rule.matches(&event));
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Suppressed < Severity::Note);
    }
}
