use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::value::{Value, ValueKind};
use crate::span::Span;
use crate::ty::Type;

/// `#[key=value]` implementation annotations and `#_[key=value]`
/// natural-language annotations, kept separately, both ordered by key.
pub type AnnotationMap = BTreeMap<String, Value>;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum FunctionType {
    #[strum(serialize = "query")]
    Query,
    #[strum(serialize = "action")]
    Action,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum ArgDirection {
    #[strum(serialize = "in req")]
    InReq,
    #[strum(serialize = "in opt")]
    InOpt,
    #[strum(serialize = "out")]
    Out,
}

/// One declared parameter of a function, or one field of a compound type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDef {
    pub name: String,
    pub ty: Type,
    pub direction: ArgDirection,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nl_annotations: AnnotationMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,
}

impl ArgumentDef {
    pub fn new<S: ToString>(direction: ArgDirection, name: S, ty: Type) -> Self {
        ArgumentDef {
            name: name.to_string(),
            ty,
            direction,
            nl_annotations: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self.direction, ArgDirection::InReq | ArgDirection::InOpt)
    }

    pub fn is_required(&self) -> bool {
        matches!(self.direction, ArgDirection::InReq)
    }
}

/// The declaration of one query or action, as retrieved from the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub kind: String,
    pub name: String,
    pub function_type: FunctionType,
    /// declaration order matters: it drives NN serialization of entities
    pub args: Vec<ArgumentDef>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_list: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_monitorable: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nl_annotations: AnnotationMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,
}

impl FunctionDef {
    pub fn arg(&self, name: &str) -> Option<&ArgumentDef> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn out_params(&self) -> impl Iterator<Item = &ArgumentDef> {
        self.args.iter().filter(|a| !a.is_input())
    }

    pub fn in_params(&self) -> impl Iterator<Item = &ArgumentDef> {
        self.args.iter().filter(|a| a.is_input())
    }

    /// Parameters every projection must retain. Explicit
    /// `#[minimal_projection]` wins; otherwise `id`, when the function has
    /// one; otherwise nothing.
    pub fn minimal_projection(&self) -> Vec<String> {
        if let Some(value) = self.annotations.get("minimal_projection") {
            if let ValueKind::Array(elems) = &value.kind {
                return elems
                    .iter()
                    .filter_map(|v| v.kind.as_string().cloned())
                    .collect();
            }
        }
        if self.arg("id").is_some() {
            vec!["id".to_string()]
        } else {
            Vec::new()
        }
    }
}

/// A loader/config/auth mixin pulled into a class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixinImport {
    pub facet: String,
    pub module: String,
    pub in_params: Vec<crate::ast::primitive::InputParam>,
}

/// An entity kind declared by a class; its full name is `KIND:name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nl_annotations: AnnotationMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,
}

/// A named group of queries and actions against some third-party service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub kind: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<MixinImport>,

    pub queries: BTreeMap<String, FunctionDef>,
    pub actions: BTreeMap<String, FunctionDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityDef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nl_annotations: AnnotationMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl ClassDef {
    pub fn new<S: ToString>(kind: S) -> Self {
        ClassDef {
            kind: kind.to_string(),
            extends: Vec::new(),
            imports: Vec::new(),
            queries: BTreeMap::new(),
            actions: BTreeMap::new(),
            entities: Vec::new(),
            nl_annotations: BTreeMap::new(),
            annotations: BTreeMap::new(),
            span: None,
        }
    }

    pub fn get_function(&self, function_type: FunctionType, name: &str) -> Option<&FunctionDef> {
        match function_type {
            FunctionType::Query => self.queries.get(name),
            FunctionType::Action => self.actions.get(name),
        }
    }
}
