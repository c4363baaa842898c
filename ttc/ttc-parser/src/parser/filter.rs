use std::str::FromStr;

use chumsky::prelude::*;

use super::table::invocation_with;
use super::value::{dotted_name, value};
use super::{ctrl, ident_part, keyword, named_ident, PError};
use crate::ast::*;
use crate::lexer::lr::TokenKind;

/// The boolean-expression grammar used in `filter` positions.
///
/// `true` and `false` parse as boolean expressions here and as boolean
/// values elsewhere; the split between this function and
/// [super::value::value] is what drives that disambiguation.
pub(crate) fn filter() -> impl Parser<TokenKind, BooleanExpression, Error = PError> + Clone {
    filter_with(value())
}

pub(crate) fn filter_with(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, BooleanExpression, Error = PError> + Clone {
    recursive(|filter| {
        // `true(param)` means the user does not care about this parameter
        let dont_care = keyword("true")
            .ignore_then(ident_part().delimited_by(ctrl('('), ctrl(')')))
            .map(|name| BooleanExpression::DontCare { name });

        let bool_true = keyword("true").to(BooleanExpression::True);
        let bool_false = keyword("false").to(BooleanExpression::False);

        // a subquery filter: `@com.weather.current(location=loc) { temperature >= 5C }`
        let external = invocation_with(value.clone())
            .then(filter.clone().delimited_by(ctrl('{'), ctrl('}')))
            .map(|(invocation, filter)| {
                BooleanExpression::External(Box::new(ExternalBooleanExpression {
                    invocation,
                    filter,
                }))
            });

        let atom = dotted_name()
            .then(filter_op())
            .then(value.clone())
            .map_with_span(|((name, operator), value), span| {
                BooleanExpression::Atom(AtomBooleanExpression {
                    name,
                    operator,
                    value,
                    span: Some(span),
                })
            });

        // the word operators also parse in call style:
        // `contains(hashtags, "x"^^tt:hashtag)`
        let atom_call = ident_part()
            .try_map(|name, span| {
                FilterOp::from_str(&name)
                    .map_err(|_| PError::custom(span, "not a filter operator"))
            })
            .then(
                dotted_name()
                    .then_ignore(ctrl(','))
                    .then(value.clone())
                    .delimited_by(ctrl('('), ctrl(')')),
            )
            .map_with_span(|(operator, (name, value)), span| {
                BooleanExpression::Atom(AtomBooleanExpression {
                    name,
                    operator,
                    value,
                    span: Some(span),
                })
            });

        // when the left-hand side is not a plain parameter name, it is a
        // computed operand: `count(labels) >= 5`
        let compute = value
            .clone()
            .then(filter_op())
            .then(value)
            .map_with_span(|((lhs, operator), rhs), span| {
                BooleanExpression::Compute(ComputeBooleanExpression {
                    lhs,
                    operator,
                    rhs,
                    span: Some(span),
                })
            });

        let parens = filter.clone().delimited_by(ctrl('('), ctrl(')'));

        let term = choice((
            dont_care, bool_true, bool_false, external, atom, atom_call, compute, parens,
        ))
        .boxed();

        let term = ctrl('!')
            .repeated()
            .then(term)
            .map(|(negations, inner)| {
                let mut result = inner;
                for _ in negations {
                    result = BooleanExpression::Not(Box::new(result));
                }
                result
            });

        let conjunction = term
            .clone()
            .separated_by(just(TokenKind::And))
            .at_least(1)
            .map(BooleanExpression::and);

        conjunction
            .separated_by(just(TokenKind::Or))
            .at_least(1)
            .map(BooleanExpression::or)
    })
}

pub(crate) fn filter_op() -> impl Parser<TokenKind, FilterOp, Error = PError> + Clone {
    let symbolic = select! {
        TokenKind::Eq => FilterOp::Eq,
        TokenKind::Gte => FilterOp::Ge,
        TokenKind::Lte => FilterOp::Le,
        TokenKind::Substr => FilterOp::Substr,
        TokenKind::RevSubstr => FilterOp::RevSubstr,
    };

    let tilde_contains = ctrl('~')
        .ignore_then(named_ident("contains"))
        .to(FilterOp::ContainsSubstr);

    let word = ident_part().try_map(|name, span| {
        FilterOp::from_str(&name).map_err(|_| PError::custom(span, "not a filter operator"))
    });

    choice((symbolic, tilde_contains, word))
}
