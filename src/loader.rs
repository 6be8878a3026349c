//! JSON AST loading
//!
//! Weave models are interchanged as JSON documents:
//!
//! ```json
//! {
//!   "weave": "1.0",
//!   "metadata": { "authors": ["..."] },
//!   "shapes": {
//!     "example.weather#City": {
//!       "type": "structure",
//!       "members": { "name": { "target": "weave.api#String" } }
//!     }
//!   }
//! }
//! ```
//!
//! The loader turns one document into a `SourceDocument` for the
//! assembler. Members declared inline are synthesized as standalone
//! member shapes keyed `container$name`; a `"type": "apply"` entry
//! contributes standalone trait applications instead of a shape.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::assembler::{SourceDocument, TraitApplication};
use crate::error::{ModelError, Result};
use crate::node::{Node, SourceLocation};
use crate::prelude;
use crate::shape::{Shape, ShapeKind, ShapeType};
use crate::shape_id::ShapeId;

/// Version prefix this loader understands
const SUPPORTED_VERSION_PREFIX: &str = "1.";

type TraitMap = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct DocumentFile {
    weave: String,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    shapes: BTreeMap<String, ShapeDecl>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    target: String,
}

#[derive(Debug, Deserialize)]
struct MemberDecl {
    /// Defaults to `weave.api#Unit`, the target of enum members
    target: Option<String>,
    #[serde(default)]
    traits: TraitMap,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ShapeDecl {
    #[serde(rename_all = "camelCase")]
    Service {
        version: Option<String>,
        #[serde(default)]
        operations: Vec<Reference>,
        #[serde(default)]
        resources: Vec<Reference>,
        #[serde(default)]
        errors: Vec<Reference>,
        #[serde(default)]
        traits: TraitMap,
        #[serde(default)]
        mixins: Vec<Reference>,
    },
    #[serde(rename_all = "camelCase")]
    Resource {
        #[serde(default)]
        identifiers: BTreeMap<String, Reference>,
        #[serde(default)]
        properties: BTreeMap<String, Reference>,
        create: Option<Reference>,
        read: Option<Reference>,
        update: Option<Reference>,
        delete: Option<Reference>,
        list: Option<Reference>,
        put: Option<Reference>,
        #[serde(default)]
        operations: Vec<Reference>,
        #[serde(default)]
        collection_operations: Vec<Reference>,
        #[serde(default)]
        resources: Vec<Reference>,
        #[serde(default)]
        traits: TraitMap,
        #[serde(default)]
        mixins: Vec<Reference>,
    },
    #[serde(rename_all = "camelCase")]
    Operation {
        input: Option<Reference>,
        output: Option<Reference>,
        #[serde(default)]
        errors: Vec<Reference>,
        #[serde(default)]
        traits: TraitMap,
        #[serde(default)]
        mixins: Vec<Reference>,
    },
    Structure(AggregateDecl),
    Union(AggregateDecl),
    Enum(AggregateDecl),
    IntEnum(AggregateDecl),
    #[serde(rename_all = "camelCase")]
    List {
        member: MemberDecl,
        #[serde(default)]
        traits: TraitMap,
        #[serde(default)]
        mixins: Vec<Reference>,
    },
    #[serde(rename_all = "camelCase")]
    Map {
        key: MemberDecl,
        value: MemberDecl,
        #[serde(default)]
        traits: TraitMap,
        #[serde(default)]
        mixins: Vec<Reference>,
    },
    Blob(SimpleDecl),
    Boolean(SimpleDecl),
    String(SimpleDecl),
    Byte(SimpleDecl),
    Short(SimpleDecl),
    Integer(SimpleDecl),
    Long(SimpleDecl),
    Float(SimpleDecl),
    Double(SimpleDecl),
    BigInteger(SimpleDecl),
    BigDecimal(SimpleDecl),
    Timestamp(SimpleDecl),
    Document(SimpleDecl),
    Apply {
        traits: TraitMap,
    },
}

#[derive(Debug, Deserialize)]
struct AggregateDecl {
    #[serde(default)]
    members: BTreeMap<String, MemberDecl>,
    #[serde(default)]
    traits: TraitMap,
    #[serde(default)]
    mixins: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct SimpleDecl {
    #[serde(default)]
    traits: TraitMap,
    #[serde(default)]
    mixins: Vec<Reference>,
}

/// Load one document from a file on disk
pub fn load_file(path: &Path) -> Result<SourceDocument> {
    let text = fs::read_to_string(path)?;
    load_str(&text, &path.display().to_string())
}

/// Load one document from JSON text; `filename` is used for diagnostics
pub fn load_str(text: &str, filename: &str) -> Result<SourceDocument> {
    let file: DocumentFile =
        serde_json::from_str(text).map_err(|e| ModelError::InvalidDocument {
            path: filename.to_string(),
            reason: e.to_string(),
        })?;

    if !file.weave.starts_with(SUPPORTED_VERSION_PREFIX) {
        return Err(ModelError::InvalidDocument {
            path: filename.to_string(),
            reason: format!("unsupported model version `{}`", file.weave),
        });
    }

    let source = SourceLocation::new(filename, 1, 1);
    let mut document = SourceDocument {
        filename: filename.to_string(),
        metadata: file
            .metadata
            .into_iter()
            .map(|(k, v)| (k, Node::from(v)))
            .collect(),
        ..Default::default()
    };

    for (key, decl) in file.shapes {
        let id = ShapeId::parse(&key).map_err(|e| ModelError::InvalidDocument {
            path: filename.to_string(),
            reason: format!("invalid shape id `{}`: {}", key, e),
        })?;
        lower_shape(&id, decl, &source, &mut document)?;
    }
    tracing::debug!(
        filename,
        shapes = document.shapes.len(),
        applies = document.applies.len(),
        "loaded document"
    );
    Ok(document)
}

fn lower_shape(
    id: &ShapeId,
    decl: ShapeDecl,
    source: &SourceLocation,
    document: &mut SourceDocument,
) -> Result<()> {
    let shape = match decl {
        ShapeDecl::Service {
            version,
            operations,
            resources,
            errors,
            traits,
            mixins,
        } => build(
            id,
            ShapeKind::Service {
                version,
                operations: targets(&operations)?,
                resources: targets(&resources)?,
                errors: targets(&errors)?,
            },
            traits,
            mixins,
            source,
        )?,
        ShapeDecl::Resource {
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
            traits,
            mixins,
        } => build(
            id,
            ShapeKind::Resource {
                identifiers: named_targets(&identifiers)?,
                properties: named_targets(&properties)?,
                create: optional_target(&create)?,
                read: optional_target(&read)?,
                update: optional_target(&update)?,
                delete: optional_target(&delete)?,
                list: optional_target(&list)?,
                put: optional_target(&put)?,
                operations: targets(&operations)?,
                collection_operations: targets(&collection_operations)?,
                resources: targets(&resources)?,
            },
            traits,
            mixins,
            source,
        )?,
        ShapeDecl::Operation {
            input,
            output,
            errors,
            traits,
            mixins,
        } => build(
            id,
            ShapeKind::Operation {
                input: optional_target(&input)?,
                output: optional_target(&output)?,
                errors: targets(&errors)?,
            },
            traits,
            mixins,
            source,
        )?,
        ShapeDecl::Structure(decl) => {
            let members = lower_members(id, decl.members, source, document)?;
            build(id, ShapeKind::Structure { members }, decl.traits, decl.mixins, source)?
        }
        ShapeDecl::Union(decl) => {
            let members = lower_members(id, decl.members, source, document)?;
            build(id, ShapeKind::Union { members }, decl.traits, decl.mixins, source)?
        }
        ShapeDecl::Enum(decl) => {
            let members = lower_members(id, decl.members, source, document)?;
            build(id, ShapeKind::Enum { members }, decl.traits, decl.mixins, source)?
        }
        ShapeDecl::IntEnum(decl) => {
            let members = lower_members(id, decl.members, source, document)?;
            build(id, ShapeKind::IntEnum { members }, decl.traits, decl.mixins, source)?
        }
        ShapeDecl::List {
            member,
            traits,
            mixins,
        } => {
            let member_id = lower_member(id, "member", member, source, document)?;
            build(id, ShapeKind::List { member: member_id }, traits, mixins, source)?
        }
        ShapeDecl::Map {
            key,
            value,
            traits,
            mixins,
        } => {
            let key_id = lower_member(id, "key", key, source, document)?;
            let value_id = lower_member(id, "value", value, source, document)?;
            build(
                id,
                ShapeKind::Map {
                    key: key_id,
                    value: value_id,
                },
                traits,
                mixins,
                source,
            )?
        }
        ShapeDecl::Blob(d) => simple(id, ShapeType::Blob, d, source)?,
        ShapeDecl::Boolean(d) => simple(id, ShapeType::Boolean, d, source)?,
        ShapeDecl::String(d) => simple(id, ShapeType::String, d, source)?,
        ShapeDecl::Byte(d) => simple(id, ShapeType::Byte, d, source)?,
        ShapeDecl::Short(d) => simple(id, ShapeType::Short, d, source)?,
        ShapeDecl::Integer(d) => simple(id, ShapeType::Integer, d, source)?,
        ShapeDecl::Long(d) => simple(id, ShapeType::Long, d, source)?,
        ShapeDecl::Float(d) => simple(id, ShapeType::Float, d, source)?,
        ShapeDecl::Double(d) => simple(id, ShapeType::Double, d, source)?,
        ShapeDecl::BigInteger(d) => simple(id, ShapeType::BigInteger, d, source)?,
        ShapeDecl::BigDecimal(d) => simple(id, ShapeType::BigDecimal, d, source)?,
        ShapeDecl::Timestamp(d) => simple(id, ShapeType::Timestamp, d, source)?,
        ShapeDecl::Document(d) => simple(id, ShapeType::Document, d, source)?,
        ShapeDecl::Apply { traits } => {
            for (trait_key, value) in traits {
                document.applies.push(TraitApplication {
                    target: id.clone(),
                    trait_id: ShapeId::parse(&trait_key)?,
                    value: Node::from(value),
                    source: source.clone(),
                });
            }
            return Ok(());
        }
    };
    document.shapes.push(shape);
    Ok(())
}

fn build(
    id: &ShapeId,
    kind: ShapeKind,
    traits: TraitMap,
    mixins: Vec<Reference>,
    source: &SourceLocation,
) -> Result<Shape> {
    let mut shape = Shape::new(id.clone(), kind).with_source(source.clone());
    shape.traits = lower_traits(traits)?;
    shape.mixins = targets(&mixins)?;
    Ok(shape)
}

fn simple(
    id: &ShapeId,
    shape_type: ShapeType,
    decl: SimpleDecl,
    source: &SourceLocation,
) -> Result<Shape> {
    build(id, ShapeKind::Simple(shape_type), decl.traits, decl.mixins, source)
}

/// Synthesize member shapes for an aggregate and return its ordered
/// `(name, member id)` entries. JSON objects carry no declaration
/// order, so members are ordered by name.
fn lower_members(
    container: &ShapeId,
    members: BTreeMap<String, MemberDecl>,
    source: &SourceLocation,
    document: &mut SourceDocument,
) -> Result<Vec<(String, ShapeId)>> {
    let mut entries = Vec::with_capacity(members.len());
    for (name, decl) in members {
        let member_id = lower_member(container, &name, decl, source, document)?;
        entries.push((name, member_id));
    }
    Ok(entries)
}

fn lower_member(
    container: &ShapeId,
    name: &str,
    decl: MemberDecl,
    source: &SourceLocation,
    document: &mut SourceDocument,
) -> Result<ShapeId> {
    let member_id = container.with_member(name);
    let target = match decl.target {
        Some(target) => ShapeId::parse(&target)?,
        None => prelude::unit_id(),
    };
    let mut member = Shape::new(
        member_id.clone(),
        ShapeKind::Member {
            container: container.clone(),
            target,
        },
    )
    .with_source(source.clone());
    member.traits = lower_traits(decl.traits)?;
    document.shapes.push(member);
    Ok(member_id)
}

fn lower_traits(traits: TraitMap) -> Result<BTreeMap<ShapeId, Node>> {
    traits
        .into_iter()
        .map(|(key, value)| Ok((ShapeId::parse(&key)?, Node::from(value))))
        .collect()
}

fn targets(references: &[Reference]) -> Result<Vec<ShapeId>> {
    references
        .iter()
        .map(|r| ShapeId::parse(&r.target).map_err(ModelError::from))
        .collect()
}

fn named_targets(references: &BTreeMap<String, Reference>) -> Result<BTreeMap<String, ShapeId>> {
    references
        .iter()
        .map(|(name, r)| Ok((name.clone(), ShapeId::parse(&r.target)?)))
        .collect()
}

fn optional_target(reference: &Option<Reference>) -> Result<Option<ShapeId>> {
    reference
        .as_ref()
        .map(|r| ShapeId::parse(&r.target).map_err(ModelError::from))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> ShapeId {
        ShapeId::parse(text).unwrap()
    }

    fn shape<'a>(document: &'a SourceDocument, shape_id: &str) -> &'a Shape {
        let shape_id = id(shape_id);
        document
            .shapes
            .iter()
            .find(|s| s.id == shape_id)
            .unwrap_or_else(|| panic!("shape {shape_id} not loaded"))
    }

    #[test]
    fn test_loads_structure_with_members() {
        let document = load_str(
            r#"{
                "weave": "1.0",
                "shapes": {
                    "ns#City": {
                        "type": "structure",
                        "members": {
                            "name": {
                                "target": "weave.api#String",
                                "traits": { "weave.api#required": {} }
                            }
                        }
                    }
                }
            }"#,
            "city.json",
        )
        .unwrap();

        let city = shape(&document, "ns#City");
        assert_eq!(city.member_named("name"), Some(&id("ns#City$name")));

        let member = shape(&document, "ns#City$name");
        assert_eq!(member.member_target(), Some(&id("weave.api#String")));
        assert!(member.has_trait(&prelude::required_trait_id()));
        assert_eq!(member.source.filename, "city.json");
    }

    #[test]
    fn test_loads_service_and_operation() {
        let document = load_str(
            r#"{
                "weave": "1.0",
                "shapes": {
                    "ns#Weather": {
                        "type": "service",
                        "version": "2024-01-01",
                        "operations": [{ "target": "ns#GetForecast" }]
                    },
                    "ns#GetForecast": {
                        "type": "operation",
                        "input": { "target": "ns#GetForecastInput" }
                    }
                }
            }"#,
            "svc.json",
        )
        .unwrap();

        let service = shape(&document, "ns#Weather");
        assert!(matches!(
            &service.kind,
            ShapeKind::Service { version: Some(v), operations, .. }
                if v == "2024-01-01" && operations == &vec![id("ns#GetForecast")]
        ));
    }

    #[test]
    fn test_list_and_map_members_synthesized() {
        let document = load_str(
            r#"{
                "weave": "1.0",
                "shapes": {
                    "ns#Names": {
                        "type": "list",
                        "member": { "target": "weave.api#String" }
                    },
                    "ns#Index": {
                        "type": "map",
                        "key": { "target": "weave.api#String" },
                        "value": { "target": "weave.api#Integer" }
                    }
                }
            }"#,
            "agg.json",
        )
        .unwrap();

        assert!(matches!(
            &shape(&document, "ns#Names").kind,
            ShapeKind::List { member } if *member == id("ns#Names$member")
        ));
        assert_eq!(
            shape(&document, "ns#Index$value").member_target(),
            Some(&id("weave.api#Integer"))
        );
    }

    #[test]
    fn test_enum_members_default_to_unit() {
        let document = load_str(
            r#"{
                "weave": "1.0",
                "shapes": {
                    "ns#Suit": {
                        "type": "enum",
                        "members": { "HEART": {}, "SPADE": {} }
                    }
                }
            }"#,
            "enum.json",
        )
        .unwrap();

        assert_eq!(
            shape(&document, "ns#Suit$HEART").member_target(),
            Some(&prelude::unit_id())
        );
    }

    #[test]
    fn test_apply_becomes_trait_application() {
        let document = load_str(
            r#"{
                "weave": "1.0",
                "shapes": {
                    "ns#Existing": {
                        "type": "apply",
                        "traits": { "weave.api#documentation": "docs" }
                    }
                }
            }"#,
            "apply.json",
        )
        .unwrap();

        assert!(document.shapes.is_empty());
        assert_eq!(document.applies.len(), 1);
        assert_eq!(document.applies[0].target, id("ns#Existing"));
        assert_eq!(document.applies[0].value, Node::from("docs"));
    }

    #[test]
    fn test_metadata_is_loaded() {
        let document = load_str(
            r#"{ "weave": "1.0", "metadata": { "authors": ["a"] } }"#,
            "meta.json",
        )
        .unwrap();
        assert_eq!(
            document.metadata.get("authors").and_then(|n| n.length()),
            Some(1)
        );
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let error = load_str(r#"{ "weave": "2.0" }"#, "v2.json").unwrap_err();
        assert!(matches!(error, ModelError::InvalidDocument { .. }));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(load_str("{ not json", "bad.json").is_err());
    }
}
