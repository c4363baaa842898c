//! Definitions of all AST node variants, their constructors, structural
//! traversal, and the slot/primitive iteration protocols.

pub mod dialogue;
pub mod expression;
pub mod fold;
pub mod ops;
pub mod primitive;
pub mod program;
pub mod schema;
pub mod slots;
pub mod stream;
pub mod table;
pub mod value;

pub use dialogue::*;
pub use expression::*;
pub use ops::*;
pub use primitive::*;
pub use program::*;
pub use schema::*;
pub use slots::*;
pub use stream::*;
pub use table::*;
pub use value::*;

use crate::ast::fold::AstFold;

struct SpanStripper;

impl AstFold for SpanStripper {
    fn fold_span(&mut self, _span: Option<crate::span::Span>) -> Option<crate::span::Span> {
        None
    }
}

/// Erase all source locations, for comparing two ASTs structurally.
pub fn strip_spans(input: Input) -> Input {
    // SpanStripper introduces no errors of its own
    SpanStripper.fold_input(input).unwrap()
}

/// Erase source locations inside one filter; used for stable ordering keys.
pub fn strip_filter_spans(filter: BooleanExpression) -> BooleanExpression {
    SpanStripper.fold_filter(filter).unwrap()
}

/// Erase source locations inside one value.
pub fn strip_value_spans(value: Value) -> Value {
    SpanStripper.fold_value(value).unwrap()
}
