use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DocGraphError;
use crate::value::{Properties, RecordId, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Document,
    Vertex,
    Edge,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Document => "document",
            TypeKind::Vertex => "vertex",
            TypeKind::Edge => "edge",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeKind {
    type Err = DocGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" => Ok(TypeKind::Document),
            "vertex" => Ok(TypeKind::Vertex),
            "edge" => Ok(TypeKind::Edge),
            other => Err(DocGraphError::invalid_argument(format!(
                "unknown type kind {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub from: RecordId,
    pub to: RecordId,
}

/// A document, vertex or edge. Edges carry `endpoints`; the other kinds never do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub type_name: String,
    pub kind: TypeKind,
    pub version: u64,
    pub properties: Properties,
    pub endpoints: Option<Endpoints>,
}

impl Record {
    pub(crate) fn new(
        id: RecordId,
        type_name: &str,
        kind: TypeKind,
        properties: Properties,
    ) -> Self {
        Self {
            id,
            type_name: type_name.to_string(),
            kind,
            version: 1,
            properties,
            endpoints: None,
        }
    }

    pub(crate) fn new_edge(
        id: RecordId,
        type_name: &str,
        from: RecordId,
        to: RecordId,
        properties: Properties,
    ) -> Self {
        Self {
            endpoints: Some(Endpoints { from, to }),
            ..Self::new(id, type_name, TypeKind::Edge, properties)
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    pub fn is_vertex(&self) -> bool {
        self.kind == TypeKind::Vertex
    }

    pub fn is_edge(&self) -> bool {
        self.kind == TypeKind::Edge
    }
}
