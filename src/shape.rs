//! Shape types and structures
//!
//! A `Shape` is one named element of a Weave model: a service, resource,
//! operation, aggregate type, member, or simple scalar. Members of
//! aggregate shapes are themselves shapes in the model (keyed
//! `container$name`); the containing shape holds an ordered list of
//! `(member name, member shape id)` entries so declaration order is
//! preserved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::node::{Node, SourceLocation};
use crate::shape_id::ShapeId;

/// Flat tag identifying a shape's type, as used by selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeType {
    Service,
    Resource,
    Operation,
    Structure,
    Union,
    Enum,
    IntEnum,
    List,
    Map,
    Member,
    Blob,
    Boolean,
    String,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    BigInteger,
    BigDecimal,
    Timestamp,
    Document,
}

impl ShapeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeType::Service => "service",
            ShapeType::Resource => "resource",
            ShapeType::Operation => "operation",
            ShapeType::Structure => "structure",
            ShapeType::Union => "union",
            ShapeType::Enum => "enum",
            ShapeType::IntEnum => "intEnum",
            ShapeType::List => "list",
            ShapeType::Map => "map",
            ShapeType::Member => "member",
            ShapeType::Blob => "blob",
            ShapeType::Boolean => "boolean",
            ShapeType::String => "string",
            ShapeType::Byte => "byte",
            ShapeType::Short => "short",
            ShapeType::Integer => "integer",
            ShapeType::Long => "long",
            ShapeType::Float => "float",
            ShapeType::Double => "double",
            ShapeType::BigInteger => "bigInteger",
            ShapeType::BigDecimal => "bigDecimal",
            ShapeType::Timestamp => "timestamp",
            ShapeType::Document => "document",
        }
    }

    pub const ALL: [ShapeType; 23] = [
        ShapeType::Service,
        ShapeType::Resource,
        ShapeType::Operation,
        ShapeType::Structure,
        ShapeType::Union,
        ShapeType::Enum,
        ShapeType::IntEnum,
        ShapeType::List,
        ShapeType::Map,
        ShapeType::Member,
        ShapeType::Blob,
        ShapeType::Boolean,
        ShapeType::String,
        ShapeType::Byte,
        ShapeType::Short,
        ShapeType::Integer,
        ShapeType::Long,
        ShapeType::Float,
        ShapeType::Double,
        ShapeType::BigInteger,
        ShapeType::BigDecimal,
        ShapeType::Timestamp,
        ShapeType::Document,
    ];

    /// Numeric scalar types (the selector `number` category)
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            ShapeType::Byte
                | ShapeType::Short
                | ShapeType::Integer
                | ShapeType::Long
                | ShapeType::Float
                | ShapeType::Double
                | ShapeType::BigInteger
                | ShapeType::BigDecimal
                | ShapeType::IntEnum
        )
    }

    /// Simple scalar types (the selector `simpleType` category)
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            ShapeType::Blob
                | ShapeType::Boolean
                | ShapeType::String
                | ShapeType::Byte
                | ShapeType::Short
                | ShapeType::Integer
                | ShapeType::Long
                | ShapeType::Float
                | ShapeType::Double
                | ShapeType::BigInteger
                | ShapeType::BigDecimal
                | ShapeType::Timestamp
                | ShapeType::Document
        )
    }

    /// List and map shapes (the selector `collection` category)
    pub fn is_collection(&self) -> bool {
        matches!(self, ShapeType::List | ShapeType::Map)
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ShapeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShapeType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or(())
    }
}

/// Structural fields of each shape variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeKind {
    Service {
        version: Option<String>,
        operations: Vec<ShapeId>,
        resources: Vec<ShapeId>,
        errors: Vec<ShapeId>,
    },
    Resource {
        identifiers: BTreeMap<String, ShapeId>,
        properties: BTreeMap<String, ShapeId>,
        create: Option<ShapeId>,
        read: Option<ShapeId>,
        update: Option<ShapeId>,
        delete: Option<ShapeId>,
        list: Option<ShapeId>,
        put: Option<ShapeId>,
        operations: Vec<ShapeId>,
        collection_operations: Vec<ShapeId>,
        resources: Vec<ShapeId>,
    },
    Operation {
        input: Option<ShapeId>,
        output: Option<ShapeId>,
        errors: Vec<ShapeId>,
    },
    Structure {
        members: Vec<(String, ShapeId)>,
    },
    Union {
        members: Vec<(String, ShapeId)>,
    },
    Enum {
        members: Vec<(String, ShapeId)>,
    },
    IntEnum {
        members: Vec<(String, ShapeId)>,
    },
    List {
        member: ShapeId,
    },
    Map {
        key: ShapeId,
        value: ShapeId,
    },
    Member {
        container: ShapeId,
        target: ShapeId,
    },
    Simple(ShapeType),
}

impl ShapeKind {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeKind::Service { .. } => ShapeType::Service,
            ShapeKind::Resource { .. } => ShapeType::Resource,
            ShapeKind::Operation { .. } => ShapeType::Operation,
            ShapeKind::Structure { .. } => ShapeType::Structure,
            ShapeKind::Union { .. } => ShapeType::Union,
            ShapeKind::Enum { .. } => ShapeType::Enum,
            ShapeKind::IntEnum { .. } => ShapeType::IntEnum,
            ShapeKind::List { .. } => ShapeType::List,
            ShapeKind::Map { .. } => ShapeType::Map,
            ShapeKind::Member { .. } => ShapeType::Member,
            ShapeKind::Simple(t) => *t,
        }
    }
}

/// A single shape in the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub kind: ShapeKind,
    /// Applied traits: trait shape id -> trait value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub traits: BTreeMap<ShapeId, Node>,
    /// Mixin shapes this shape consumes, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<ShapeId>,
    #[serde(default)]
    pub source: SourceLocation,
}

impl Shape {
    pub fn new(id: ShapeId, kind: ShapeKind) -> Self {
        Self {
            id,
            kind,
            traits: BTreeMap::new(),
            mixins: Vec::new(),
            source: SourceLocation::none(),
        }
    }

    pub fn with_trait(mut self, trait_id: ShapeId, value: Node) -> Self {
        self.traits.insert(trait_id, value);
        self
    }

    pub fn with_source(mut self, source: SourceLocation) -> Self {
        self.source = source;
        self
    }

    pub fn shape_type(&self) -> ShapeType {
        self.kind.shape_type()
    }

    /// Whether the given trait is applied to this shape
    pub fn has_trait(&self, trait_id: &ShapeId) -> bool {
        self.traits.contains_key(trait_id)
    }

    pub fn get_trait(&self, trait_id: &ShapeId) -> Option<&Node> {
        self.traits.get(trait_id)
    }

    /// Ordered `(name, member id)` entries for aggregate shapes
    pub fn members(&self) -> &[(String, ShapeId)] {
        match &self.kind {
            ShapeKind::Structure { members }
            | ShapeKind::Union { members }
            | ShapeKind::Enum { members }
            | ShapeKind::IntEnum { members } => members,
            _ => &[],
        }
    }

    pub fn member_named(&self, name: &str) -> Option<&ShapeId> {
        self.members()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| id)
    }

    /// Target of a member shape; `None` for non-members
    pub fn member_target(&self) -> Option<&ShapeId> {
        match &self.kind {
            ShapeKind::Member { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Container of a member shape; `None` for non-members
    pub fn member_container(&self) -> Option<&ShapeId> {
        match &self.kind {
            ShapeKind::Member { container, .. } => Some(container),
            _ => None,
        }
    }
}
