use std::str::FromStr;

use chumsky::prelude::*;

use super::filter;
use super::{ctrl, dollar, ident_part, integer, keyword, named_ident, number, quoted_string, sequence, PError};
use crate::ast::*;
use crate::lexer::lr::TokenKind;
use crate::span::Span;
use crate::ty::{units, Type};

/// The full value grammar, including the ambiguous `NAME of VALUE`
/// array-field form.
pub(crate) fn value() -> impl Parser<TokenKind, Value, Error = PError> + Clone {
    recursive(|value| {
        let array_field = ident_part()
            .then_ignore(keyword("of"))
            .then(value.clone())
            .map_with_span(|(field, value), span| {
                ValueKind::ArrayField {
                    field,
                    value: Box::new(value),
                }
                .into_value(span)
            });

        array_field.or(np_value_with(value))
    })
}

/// The non-ambiguous value grammar: everything except a top-level
/// `NAME of VALUE`, which would clash with `NAME of TABLE` in projection
/// positions. An array-field there must be parenthesized.
pub(crate) fn np_value() -> impl Parser<TokenKind, Value, Error = PError> + Clone {
    np_value_with(value())
}

fn np_value_with(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, Value, Error = PError> + Clone {
    let term = term_with(value.clone());

    // `VALUE filter { F }`
    let term = term
        .then(
            keyword("filter")
                .ignore_then(
                    filter::filter_with(value.clone()).delimited_by(ctrl('{'), ctrl('}')),
                )
                .map_with_span(|f, span: Span| (f, span))
                .or_not(),
        )
        .map(|(base, filter)| match filter {
            None => base,
            Some((filter, span)) => {
                let span = Span::union(base.span, Some(span));
                Value {
                    kind: ValueKind::Filter {
                        value: Box::new(base),
                        filter: Box::new(filter),
                    },
                    span,
                }
            }
        })
        .boxed();

    // Binary operators, loosest binding last
    let term = binary_op_parser(term, operator(&[ScalarOp::Pow]));
    let term = binary_op_parser(
        term,
        operator(&[ScalarOp::Mul, ScalarOp::Div, ScalarOp::Mod]),
    );
    binary_op_parser(term, operator(&[ScalarOp::Add, ScalarOp::Sub]))
}

fn operator(ops: &'static [ScalarOp]) -> impl Parser<TokenKind, ScalarOp, Error = PError> + Clone {
    select! {
        TokenKind::Control('+') if ops.contains(&ScalarOp::Add) => ScalarOp::Add,
        TokenKind::Control('-') if ops.contains(&ScalarOp::Sub) => ScalarOp::Sub,
        TokenKind::Control('*') if ops.contains(&ScalarOp::Mul) => ScalarOp::Mul,
        TokenKind::Control('/') if ops.contains(&ScalarOp::Div) => ScalarOp::Div,
        TokenKind::Control('%') if ops.contains(&ScalarOp::Mod) => ScalarOp::Mod,
        TokenKind::Pow if ops.contains(&ScalarOp::Pow) => ScalarOp::Pow,
    }
}

fn binary_op_parser<'a, Term, Op>(
    term: Term,
    op: Op,
) -> impl Parser<TokenKind, Value, Error = PError> + Clone + 'a
where
    Term: Parser<TokenKind, Value, Error = PError> + Clone + 'a,
    Op: Parser<TokenKind, ScalarOp, Error = PError> + Clone + 'a,
{
    term.clone()
        .then(op.then(term).repeated())
        .foldl(|left, (op, right)| {
            let span = Span::union(left.span, right.span);
            Value {
                kind: ValueKind::Computation {
                    op,
                    operands: vec![left, right],
                },
                span,
            }
        })
        .boxed()
}

fn term_with(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, Value, Error = PError> + Clone {
    let boolean = choice((
        keyword("true").to(ValueKind::Boolean(true)),
        keyword("false").to(ValueKind::Boolean(false)),
    ));

    // "bob"^^tt:username("display") is an entity; a bare string is a String
    let string_or_entity = quoted_string()
        .then(
            just(TokenKind::EntityMarker)
                .ignore_then(entity_kind())
                .then(quoted_string().delimited_by(ctrl('('), ctrl(')')).or_not())
                .or_not(),
        )
        .map(|(string, entity)| match entity {
            None => ValueKind::String(string),
            Some((kind, display)) => ValueKind::Entity {
                value: Some(string),
                kind,
                display,
            },
        });

    // an entity with unresolved value: null^^com.spotify:song("despacito")
    let null_entity = keyword("null")
        .ignore_then(just(TokenKind::EntityMarker).ignore_then(entity_kind()))
        .then(quoted_string().delimited_by(ctrl('('), ctrl(')')).or_not())
        .map(|(kind, display)| ValueKind::Entity {
            value: None,
            kind,
            display,
        });

    let number_like = numeric_literal();
    let negated = ctrl('-').ignore_then(numeric_literal()).map(|kind| match kind {
        ValueKind::Number(n) => ValueKind::Number(-n),
        ValueKind::Measure { value, unit } => ValueKind::Measure { value: -value, unit },
        ValueKind::Currency { value, unit } => ValueKind::Currency { value: -value, unit },
        other => other,
    });

    let enum_value = keyword("enum")
        .ignore_then(ident_part().delimited_by(ctrl('('), ctrl(')')))
        .map(ValueKind::Enum);

    let date = new_date();
    let time = new_time();
    let location = new_location();

    let date_edge = choice((
        named_ident("start_of").to(DateEdge::StartOf),
        named_ident("end_of").to(DateEdge::EndOf),
    ))
    .then(ident_part().delimited_by(ctrl('('), ctrl(')')))
    .map(|(edge, unit)| ValueKind::Date(DateValue::Edge { edge, unit }));

    let event = dollar("event")
        .ignore_then(
            ctrl('.')
                .ignore_then(select! {
                    TokenKind::Ident(f) if f == "type" => EventField::Type,
                    TokenKind::Ident(f) if f == "program_id" => EventField::ProgramId,
                })
                .or_not(),
        )
        .map(ValueKind::Event);

    let relative_location = dollar("context")
        .ignore_then(ctrl('.'))
        .ignore_then(named_ident("location"))
        .ignore_then(ctrl('.'))
        .ignore_then(ident_part())
        .map(|name| ValueKind::Location(LocationValue::Relative(name)));

    let context_ref = dollar("context")
        .ignore_then(ctrl('.'))
        .ignore_then(ident_part())
        .then_ignore(ctrl(':'))
        .then(type_expr())
        .map(|(name, ty)| ValueKind::ContextRef { name, ty });

    let undefined = dollar("undefined")
        .or(dollar("?"))
        .to(ValueKind::Undefined {
            slot_fillable: true,
        });

    let array = sequence(value.clone())
        .delimited_by(ctrl('['), ctrl(']'))
        .map(ValueKind::Array);

    let object = sequence(ident_part().then_ignore(ctrl('=')).then(value.clone()))
        .delimited_by(ctrl('{'), ctrl('}'))
        .map(|fields| ValueKind::Object(fields.into_iter().collect()));

    // count(x), distance(a, b) and friends; infix operators never match here
    let scalar_call = ident_part()
        .try_map(|name, span| {
            ScalarOp::from_str(&name)
                .ok()
                .filter(|op| !op.is_infix())
                .ok_or_else(|| PError::custom(span, "not a scalar function"))
        })
        .then(sequence(value.clone()).delimited_by(ctrl('('), ctrl(')')))
        .map(|(op, operands)| ValueKind::Computation { op, operands });

    // plain or alias-qualified (`results.text`) parameter reference
    let var_ref = dotted_name().map(ValueKind::VarRef);

    let kind = choice((
        boolean,
        string_or_entity,
        null_entity,
        negated,
        number_like,
        enum_value,
        date,
        time,
        location,
        date_edge,
        event,
        relative_location,
        context_ref,
        undefined,
        array,
        object,
        scalar_call,
        var_ref,
    ));

    kind.map_with_span(ValueKind::into_value)
        .or(value.delimited_by(ctrl('('), ctrl(')')))
        .boxed()
}

fn numeric_literal() -> impl Parser<TokenKind, ValueKind, Error = PError> + Clone {
    // compound measure chains like `6ft 3in` fold to one canonical value,
    // keeping the first display unit
    let measure = select! { TokenKind::Measure { value, unit } => (value, unit) }
        .repeated()
        .at_least(1)
        .map(|parts| {
            let unit = parts[0].1.clone();
            if parts.len() == 1 {
                ValueKind::Measure {
                    value: parts[0].0,
                    unit,
                }
            } else {
                let base: f64 = parts
                    .iter()
                    .map(|(v, u)| units::transform_to_base(*v, u))
                    .sum();
                ValueKind::Measure {
                    value: units::transform_from_base(base, &unit),
                    unit,
                }
            }
        });

    let currency = select! { TokenKind::Currency { value, unit } => ValueKind::Currency { value, unit } };
    let number = number().map(ValueKind::Number);

    choice((currency, measure, number))
}

/// `new Date()`, `new Date(2020, 4, 1)`, `new Date(2020, , )`
fn new_date() -> impl Parser<TokenKind, ValueKind, Error = PError> + Clone {
    keyword("new")
        .ignore_then(named_ident("Date"))
        .ignore_then(
            integer()
                .or_not()
                .separated_by(ctrl(','))
                .delimited_by(ctrl('('), ctrl(')')),
        )
        .try_map(|slots, span| build_date(slots, span))
        .map(ValueKind::Date)
}

fn build_date(slots: Vec<Option<i64>>, span: Span) -> Result<DateValue, PError> {
    if slots.iter().all(Option::is_none) {
        return Ok(DateValue::Now);
    }
    if slots.len() > 6 {
        return Err(PError::custom(span, "too many arguments to new Date"));
    }
    let get = |i: usize| slots.get(i).copied().flatten();
    let (year, month, day) = (get(0), get(1), get(2));
    let (hour, minute, second) = (get(3), get(4), get(5));

    let fully_specified =
        year.is_some() && month.is_some() && day.is_some() && slots.len() <= 6;
    if fully_specified {
        Ok(DateValue::Absolute(DateTimeValue {
            year: year.unwrap() as i32,
            month: month.unwrap() as u8,
            day: day.unwrap() as u8,
            hour: hour.unwrap_or(0) as u8,
            minute: minute.unwrap_or(0) as u8,
            second: second.unwrap_or(0) as u8,
        }))
    } else {
        let time = hour.map(|h| TimeValue {
            hour: h as u8,
            minute: minute.unwrap_or(0) as u8,
            second: second.unwrap_or(0) as u8,
        });
        Ok(DateValue::Piece {
            year: year.map(|y| y as i32),
            month: month.map(|m| m as u8),
            day: day.map(|d| d as u8),
            time,
        })
    }
}

fn new_time() -> impl Parser<TokenKind, ValueKind, Error = PError> + Clone {
    keyword("new")
        .ignore_then(named_ident("Time"))
        .ignore_then(
            integer()
                .separated_by(ctrl(','))
                .delimited_by(ctrl('('), ctrl(')')),
        )
        .try_map(|parts, span| {
            if parts.len() < 2 || parts.len() > 3 {
                return Err(PError::custom(span, "new Time takes hour, minute and an optional second"));
            }
            Ok(ValueKind::Time(TimeValue {
                hour: parts[0] as u8,
                minute: parts[1] as u8,
                second: parts.get(2).copied().unwrap_or(0) as u8,
            }))
        })
}

fn new_location() -> impl Parser<TokenKind, ValueKind, Error = PError> + Clone {
    let absolute = signed_number()
        .then_ignore(ctrl(','))
        .then(signed_number())
        .then(ctrl(',').ignore_then(quoted_string()).or_not())
        .map(|((latitude, longitude), display)| {
            LocationValue::Absolute {
                latitude,
                longitude,
                display,
            }
        });

    let by_name = quoted_string().map(LocationValue::Unresolved);

    keyword("new")
        .ignore_then(named_ident("Location"))
        .ignore_then(absolute.or(by_name).delimited_by(ctrl('('), ctrl(')')))
        .map(ValueKind::Location)
}

fn signed_number() -> impl Parser<TokenKind, f64, Error = PError> + Clone {
    ctrl('-')
        .or_not()
        .then(number())
        .map(|(neg, n)| if neg.is_some() { -n } else { n })
}

/// `tt:username`, `com.spotify:song`
pub(crate) fn entity_kind() -> impl Parser<TokenKind, String, Error = PError> + Clone {
    dotted_name()
        .then_ignore(ctrl(':'))
        .then(ident_part())
        .map(|(ns, name)| format!("{ns}:{name}"))
}

pub(crate) fn dotted_name() -> impl Parser<TokenKind, String, Error = PError> + Clone {
    ident_part()
        .then(ctrl('.').ignore_then(ident_part()).repeated())
        .map(|(head, rest)| {
            if rest.is_empty() {
                head
            } else {
                std::iter::once(head).chain(rest).collect::<Vec<_>>().join(".")
            }
        })
}

pub(crate) fn type_expr() -> impl Parser<TokenKind, Type, Error = PError> + Clone {
    recursive(|ty| {
        // `String` or the hinted form `String(tt:search_query)`
        let string = named_ident("String")
            .ignore_then(
                entity_kind()
                    .delimited_by(ctrl('('), ctrl(')'))
                    .or_not(),
            )
            .map(|hint| match hint {
                Some(hint) => Type::HintedString(hint),
                None => Type::String,
            });

        let simple = ident_part().map(|name| match name.as_str() {
            "Boolean" => Type::Boolean,
            "Number" => Type::Number,
            "Currency" => Type::Currency,
            "Location" => Type::Location,
            "Date" => Type::Date,
            "Time" => Type::Time,
            "RecurrentTimeSpecification" => Type::RecurrentTimeSpec,
            "Any" => Type::Any,
            other => Type::Unknown(other.to_string()),
        });

        let measure = named_ident("Measure")
            .ignore_then(ident_part().delimited_by(ctrl('('), ctrl(')')))
            .map(Type::Measure);

        let enum_ty = named_ident("Enum")
            .ignore_then(sequence(ident_part()).delimited_by(ctrl('('), ctrl(')')))
            .map(Type::Enum);

        let entity = named_ident("Entity")
            .ignore_then(entity_kind().delimited_by(ctrl('('), ctrl(')')))
            .map(Type::Entity);

        let array = named_ident("Array")
            .ignore_then(ty.clone().delimited_by(ctrl('('), ctrl(')')))
            .map(|elem| Type::Array(Box::new(elem)));

        let compound = sequence(
            ident_part()
                .then_ignore(ctrl(':'))
                .then(ty)
                .map(|(name, ty)| ArgumentDef::new(ArgDirection::Out, name, ty)),
        )
        .delimited_by(ctrl('{'), ctrl('}'))
        .map(Type::Compound);

        choice((string, measure, enum_ty, entity, array, compound, simple))
    })
}
