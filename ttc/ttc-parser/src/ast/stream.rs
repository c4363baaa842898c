use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ast::expression::BooleanExpression;
use crate::ast::primitive::InputParam;
use crate::ast::table::Table;
use crate::ast::value::Value;
use crate::span::Span;

impl Stream {
    pub fn new<K: Into<StreamKind>>(kind: K) -> Self {
        Stream {
            kind: kind.into(),
            span: None,
        }
    }
}

/// A temporally ordered source of table-shaped events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(flatten)]
    pub kind: StreamKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner, strum::AsRefStr)]
pub enum StreamKind {
    /// Fires every `interval` starting at `base`; `frequency` > 1 spreads
    /// that many firings evenly across each interval.
    Timer {
        base: Value,
        interval: Value,
        frequency: Option<Value>,
    },
    /// Fires at fixed times of day until the optional expiration date.
    AtTimer {
        times: Vec<Value>,
        expiration_date: Option<Value>,
    },
    /// Polls the table and fires on rows not seen before; `args`, when
    /// present, restricts which output parameters are compared.
    Monitor {
        table: Box<Table>,
        args: Option<Vec<String>>,
    },
    /// Fires when the filter transitions from false to true.
    EdgeFilter {
        stream: Box<Stream>,
        filter: BooleanExpression,
    },
    /// Fires on any value different from the previous firing.
    EdgeNew { stream: Box<Stream> },
    Filter {
        stream: Box<Stream>,
        filter: BooleanExpression,
    },
    Projection {
        stream: Box<Stream>,
        args: Vec<String>,
    },
    Compute {
        stream: Box<Stream>,
        expression: Value,
        alias: Option<String>,
    },
    /// Each stream event triggers the table; in_params pass event values in.
    Join {
        stream: Box<Stream>,
        table: Box<Table>,
        in_params: Vec<InputParam>,
    },
    Alias {
        stream: Box<Stream>,
        name: String,
    },
    /// An invocation of a `let stream` declaration.
    VarRef {
        name: String,
        in_params: Vec<InputParam>,
    },
}

impl StreamKind {
    pub fn into_stream(self, span: Span) -> Stream {
        Stream {
            kind: self,
            span: Some(span),
        }
    }
}
