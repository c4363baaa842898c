use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::schema::FunctionDef;
use crate::ast::value::Value;
use crate::span::Span;

/// Identifies a device: class kind, optional concrete device id, optional
/// "all devices" marker, plus free-form attributes used to pick a device at
/// slot-fill time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSelector {
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<InputParam>,
}

impl DeviceSelector {
    pub fn new<S: ToString>(kind: S) -> Self {
        DeviceSelector {
            kind: kind.to_string(),
            id: None,
            all: false,
            attributes: Vec::new(),
        }
    }
}

/// A call of one function of one skill.
///
/// `schema` is populated by the typechecker and is guaranteed non-null on a
/// typechecked AST; it is identity-shared, lives outside the tree and is not
/// part of structural equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub selector: DeviceSelector,
    pub channel: String,
    pub in_params: Vec<InputParam>,

    #[serde(skip)]
    pub schema: Option<Arc<FunctionDef>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl PartialEq for Invocation {
    fn eq(&self, other: &Self) -> bool {
        self.selector == other.selector
            && self.channel == other.channel
            && self.in_params == other.in_params
            && self.span == other.span
    }
}

impl Invocation {
    pub fn new<S: ToString>(selector: DeviceSelector, channel: S) -> Self {
        Invocation {
            selector,
            channel: channel.to_string(),
            in_params: Vec::new(),
            schema: None,
            span: None,
        }
    }
}

/// A named argument at a call site, `name=value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParam {
    pub name: String,
    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl InputParam {
    pub fn new<S: ToString>(name: S, value: Value) -> Self {
        InputParam {
            name: name.to_string(),
            value,
            span: None,
        }
    }
}

/// The right-hand side of a rule or command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// `notify` sends the result to the user; `return` sends it back to the
    /// originating conversation of a remote program.
    Notify(NotifyKind),
    Invocation(Invocation),
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
pub enum NotifyKind {
    #[strum(serialize = "notify")]
    Notify,
    #[strum(serialize = "return")]
    Return,
}
