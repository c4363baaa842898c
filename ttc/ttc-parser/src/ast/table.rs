use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ast::expression::BooleanExpression;
use crate::ast::ops::{AggregationOp, SortDirection};
use crate::ast::primitive::{InputParam, Invocation};
use crate::ast::value::Value;
use crate::span::Span;

impl Table {
    pub fn new<K: Into<TableKind>>(kind: K) -> Self {
        Table {
            kind: kind.into(),
            span: None,
        }
    }
}

/// A materialised multiset of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(flatten)]
    pub kind: TableKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner, strum::AsRefStr)]
pub enum TableKind {
    Invocation(Invocation),
    Filter {
        table: Box<Table>,
        filter: BooleanExpression,
    },
    /// Restriction to a subset of output parameters. An empty list means
    /// "all output params".
    Projection {
        table: Box<Table>,
        args: Vec<String>,
    },
    /// A derived column defined by a scalar expression.
    Compute {
        table: Box<Table>,
        expression: Value,
        alias: Option<String>,
    },
    /// Consumes a list, yields a single row holding only the aggregated
    /// column. A `field` of `None` counts rows.
    Aggregation {
        table: Box<Table>,
        op: AggregationOp,
        field: Option<String>,
        alias: Option<String>,
    },
    Sort {
        table: Box<Table>,
        field: String,
        direction: SortDirection,
    },
    /// Select rows by 1-based indices, negative counting from the end.
    Index {
        table: Box<Table>,
        indices: Vec<Value>,
    },
    Slice {
        table: Box<Table>,
        base: Value,
        limit: Value,
    },
    Join {
        lhs: Box<Table>,
        rhs: Box<Table>,
        /// parameters passed from the left scope into the right invocation
        in_params: Vec<InputParam>,
    },
    Alias {
        table: Box<Table>,
        name: String,
    },
    /// The stored result of a previous execution, `result(@kind.fn)`.
    History {
        kind: String,
        channel: String,
        index: Option<Value>,
    },
    /// An invocation of a `let` declaration or assignment.
    VarRef {
        name: String,
        in_params: Vec<InputParam>,
    },
}

impl TableKind {
    pub fn into_table(self, span: Span) -> Table {
        Table {
            kind: self,
            span: Some(span),
        }
    }
}

impl From<Invocation> for TableKind {
    fn from(inv: Invocation) -> Self {
        TableKind::Invocation(inv)
    }
}
