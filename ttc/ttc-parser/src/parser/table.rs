use std::str::FromStr;

use chumsky::prelude::*;

use super::filter::filter_with;
use super::value::np_value;
use super::{at_name, ctrl, ident_part, keyword, sequence, split_function_name, PError};
use crate::ast::*;
use crate::lexer::lr::TokenKind;
use crate::span::Span;

pub(crate) fn in_param_list(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, Vec<InputParam>, Error = PError> + Clone {
    sequence(
        ident_part()
            .then_ignore(ctrl('='))
            .then(value)
            .map_with_span(|(name, value), span| InputParam {
                name,
                value,
                span: Some(span),
            }),
    )
}

/// `@kind.channel(p=v, ...)`, optionally with selector attributes:
/// `@kind(id="...", all=true).channel(p=v)`.
pub(crate) fn invocation_with(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, Invocation, Error = PError> + Clone {
    let params = in_param_list(value).delimited_by(ctrl('('), ctrl(')'));

    let with_attributes = at_name()
        .then(params.clone())
        .then_ignore(ctrl('.'))
        .then(ident_part())
        .then(params.clone())
        .map_with_span(|(((kind, attributes), channel), in_params), span| {
            let selector = build_selector(kind, attributes);
            Invocation {
                selector,
                channel,
                in_params,
                schema: None,
                span: Some(span),
            }
        });

    let plain = at_name()
        .then(params)
        .try_map(|(full_name, in_params), span: Span| {
            let (kind, channel) = split_function_name(&full_name)
                .ok_or_else(|| PError::custom(span, "expected @kind.function"))?;
            Ok(Invocation {
                selector: DeviceSelector::new(kind),
                channel,
                in_params,
                schema: None,
                span: Some(span),
            })
        });

    with_attributes.or(plain)
}

/// `id` and `all` attributes are hoisted to their dedicated selector fields
/// when they are literal.
fn build_selector(kind: String, attributes: Vec<InputParam>) -> DeviceSelector {
    let mut selector = DeviceSelector::new(kind);
    for attr in attributes {
        match (attr.name.as_str(), &attr.value.kind) {
            ("id", ValueKind::String(id)) => selector.id = Some(id.clone()),
            ("all", ValueKind::Boolean(all)) => selector.all = *all,
            _ => selector.attributes.push(attr),
        }
    }
    selector
}

pub(crate) fn action_with(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, Action, Error = PError> + Clone {
    choice((
        keyword("notify").to(Action::Notify(NotifyKind::Notify)),
        keyword("return").to(Action::Notify(NotifyKind::Return)),
        invocation_with(value).map(Action::Invocation),
    ))
}

enum TablePostfix {
    Slice(Value, Value),
    Index(Vec<Value>),
    Join(Table, Vec<InputParam>),
    Alias(String),
    Filter(BooleanExpression),
}

pub(crate) fn table_with(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, Table, Error = PError> + Clone {
    recursive(|table| {
        // Operators written with `of` take a postfix-free operand, so that
        // `sort x asc of t[1:5]` slices the sorted table, not the source.
        // A parenthesized operand brings postfixes back in.
        let primary = recursive(|primary| {
            let invocation = invocation_with(value.clone())
                .map(TableKind::Invocation)
                .map_with_span(TableKind::into_table);

            let projection = sequence(ident_part())
                .delimited_by(ctrl('['), ctrl(']'))
                .then_ignore(keyword("of"))
                .then(primary.clone())
                .map_with_span(|(args, table), span| {
                    TableKind::Projection {
                        table: Box::new(table),
                        args,
                    }
                    .into_table(span)
                });

            let aggregation_op = ident_part().try_map(|name, span| {
                AggregationOp::from_str(&name)
                    .map_err(|_| PError::custom(span, "not an aggregation operator"))
            });

            // `aggregate count of T` counts rows; `aggregate avg field of T`
            // aggregates one column
            let aggregation = keyword("aggregate")
                .ignore_then(aggregation_op)
                .then(ident_part().or_not())
                .then_ignore(keyword("of"))
                .then(primary.clone())
                .try_map(|((op, field), table), span: Span| {
                    if field.is_none() && op != AggregationOp::Count {
                        return Err(PError::custom(span, "this aggregation requires a field"));
                    }
                    Ok(TableKind::Aggregation {
                        table: Box::new(table),
                        op,
                        field,
                        alias: None,
                    }
                    .into_table(span))
                });

            let direction = choice((
                keyword("asc").to(SortDirection::Asc),
                keyword("desc").to(SortDirection::Desc),
            ));

            let sort = keyword("sort")
                .ignore_then(ident_part())
                .then(direction)
                .then_ignore(keyword("of"))
                .then(primary.clone())
                .map_with_span(|((field, direction), table), span| {
                    TableKind::Sort {
                        table: Box::new(table),
                        field,
                        direction,
                    }
                    .into_table(span)
                });

            let compute = keyword("compute")
                .ignore_then(np_value())
                .then(keyword("as").ignore_then(ident_part()).or_not())
                .then_ignore(keyword("of"))
                .then(primary.clone())
                .map_with_span(|((expression, alias), table), span| {
                    TableKind::Compute {
                        table: Box::new(table),
                        expression,
                        alias,
                    }
                    .into_table(span)
                });

            let history = keyword("result")
                .ignore_then(
                    at_name()
                        .then(value.clone().delimited_by(ctrl('['), ctrl(']')).or_not())
                        .delimited_by(ctrl('('), ctrl(')')),
                )
                .try_map(|(full_name, index), span: Span| {
                    let (kind, channel) = split_function_name(&full_name)
                        .ok_or_else(|| PError::custom(span, "expected @kind.function"))?;
                    Ok(TableKind::History {
                        kind,
                        channel,
                        index,
                    }
                    .into_table(span))
                });

            let var_ref = ident_part()
                .then(
                    in_param_list(value.clone())
                        .delimited_by(ctrl('('), ctrl(')'))
                        .or_not(),
                )
                .map_with_span(|(name, in_params), span| {
                    TableKind::VarRef {
                        name,
                        in_params: in_params.unwrap_or_default(),
                    }
                    .into_table(span)
                });

            let parens = table.clone().delimited_by(ctrl('('), ctrl(')'));

            choice((
                invocation,
                projection,
                aggregation,
                sort,
                compute,
                history,
                parens,
                var_ref,
            ))
            .boxed()
        });

        let slice = value
            .clone()
            .then_ignore(ctrl(':'))
            .then(value.clone())
            .delimited_by(ctrl('['), ctrl(']'))
            .map(|(base, limit)| TablePostfix::Slice(base, limit));

        let index = sequence(value.clone())
            .delimited_by(ctrl('['), ctrl(']'))
            .map(TablePostfix::Index);

        let join = keyword("join")
            .ignore_then(primary.clone())
            .then(
                keyword("on")
                    .ignore_then(in_param_list(value.clone()).delimited_by(ctrl('('), ctrl(')')))
                    .or_not(),
            )
            .map(|(rhs, in_params)| TablePostfix::Join(rhs, in_params.unwrap_or_default()));

        let alias = keyword("as").ignore_then(ident_part()).map(TablePostfix::Alias);

        let table_filter = ctrl(',')
            .ignore_then(filter_with(value.clone()))
            .map(TablePostfix::Filter);

        primary
            .map_with_span(|t, span: Span| (t, span))
            .then(
                choice((slice, index, join, alias, table_filter))
                    .map_with_span(|p, span: Span| (p, span))
                    .repeated(),
            )
            .foldl(|(lhs, lhs_span), (postfix, postfix_span)| {
                let span = lhs_span.to(postfix_span);
                let kind = match postfix {
                    TablePostfix::Slice(base, limit) => TableKind::Slice {
                        table: Box::new(lhs),
                        base,
                        limit,
                    },
                    TablePostfix::Index(indices) => TableKind::Index {
                        table: Box::new(lhs),
                        indices,
                    },
                    TablePostfix::Join(rhs, in_params) => TableKind::Join {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        in_params,
                    },
                    TablePostfix::Alias(name) => TableKind::Alias {
                        table: Box::new(lhs),
                        name,
                    },
                    TablePostfix::Filter(filter) => TableKind::Filter {
                        table: Box::new(lhs),
                        filter,
                    },
                };
                (kind.into_table(span), span)
            })
            .map(|(table, _)| table)
    })
}

enum StreamPostfix {
    Join(Table, Vec<InputParam>),
    Alias(String),
    Filter(BooleanExpression),
}

pub(crate) fn stream_with(
    value: impl Parser<TokenKind, Value, Error = PError> + Clone + 'static,
) -> impl Parser<TokenKind, Stream, Error = PError> + Clone {
    let table = table_with(value.clone());

    recursive(|stream| {
        let timer = keyword("timer")
            .ignore_then(in_param_list(value.clone()).delimited_by(ctrl('('), ctrl(')')))
            .try_map(|params, span: Span| {
                let mut base = None;
                let mut interval = None;
                let mut frequency = None;
                for param in params {
                    match param.name.as_str() {
                        "base" => base = Some(param.value),
                        "interval" => interval = Some(param.value),
                        "frequency" => frequency = Some(param.value),
                        other => {
                            return Err(PError::custom(
                                span,
                                format!("invalid timer parameter `{other}`"),
                            ))
                        }
                    }
                }
                Ok(StreamKind::Timer {
                    base: base.unwrap_or_else(|| Value::new(ValueKind::Date(DateValue::Now))),
                    interval: interval
                        .ok_or_else(|| PError::custom(span, "timer requires an interval"))?,
                    frequency,
                }
                .into_stream(span))
            });

        let attimer = keyword("attimer")
            .ignore_then(in_param_list(value.clone()).delimited_by(ctrl('('), ctrl(')')))
            .try_map(|params, span: Span| {
                let mut times = Vec::new();
                let mut expiration_date = None;
                for param in params {
                    match param.name.as_str() {
                        "time" => match param.value {
                            Value {
                                kind: ValueKind::Array(elems),
                                ..
                            } => times = elems,
                            other => times = vec![other],
                        },
                        "expiration_date" => expiration_date = Some(param.value),
                        other => {
                            return Err(PError::custom(
                                span,
                                format!("invalid attimer parameter `{other}`"),
                            ))
                        }
                    }
                }
                if times.is_empty() {
                    return Err(PError::custom(span, "attimer requires a time"));
                }
                Ok(StreamKind::AtTimer {
                    times,
                    expiration_date,
                }
                .into_stream(span))
            });

        let monitor = keyword("monitor")
            .ignore_then(table.clone())
            .then(
                keyword("on")
                    .ignore_then(keyword("new"))
                    .ignore_then(
                        sequence(ident_part())
                            .delimited_by(ctrl('['), ctrl(']'))
                            .or_not(),
                    )
                    .or_not(),
            )
            .map_with_span(|(table, on_new), span| {
                StreamKind::Monitor {
                    table: Box::new(table),
                    args: on_new.flatten(),
                }
                .into_stream(span)
            });

        let edge = keyword("edge")
            .ignore_then(stream.clone().delimited_by(ctrl('('), ctrl(')')))
            .then_ignore(keyword("on"))
            .then(
                keyword("new")
                    .to(None)
                    .or(filter_with(value.clone()).map(Some)),
            )
            .map_with_span(|(stream, filter), span| {
                let kind = match filter {
                    None => StreamKind::EdgeNew {
                        stream: Box::new(stream),
                    },
                    Some(filter) => StreamKind::EdgeFilter {
                        stream: Box::new(stream),
                        filter,
                    },
                };
                kind.into_stream(span)
            });

        let projection = sequence(ident_part())
            .delimited_by(ctrl('['), ctrl(']'))
            .then_ignore(keyword("of"))
            .then(stream.clone())
            .map_with_span(|(args, stream), span| {
                StreamKind::Projection {
                    stream: Box::new(stream),
                    args,
                }
                .into_stream(span)
            });

        let compute = keyword("compute")
            .ignore_then(np_value())
            .then(keyword("as").ignore_then(ident_part()).or_not())
            .then_ignore(keyword("of"))
            .then(stream.clone())
            .map_with_span(|((expression, alias), stream), span| {
                StreamKind::Compute {
                    stream: Box::new(stream),
                    expression,
                    alias,
                }
                .into_stream(span)
            });

        let var_ref = ident_part()
            .then(
                in_param_list(value.clone())
                    .delimited_by(ctrl('('), ctrl(')'))
                    .or_not(),
            )
            .map_with_span(|(name, in_params), span| {
                StreamKind::VarRef {
                    name,
                    in_params: in_params.unwrap_or_default(),
                }
                .into_stream(span)
            });

        let parens = stream.clone().delimited_by(ctrl('('), ctrl(')'));

        let primary = choice((
            timer, attimer, monitor, edge, projection, compute, parens, var_ref,
        ))
        .boxed();

        let join = keyword("join")
            .ignore_then(table)
            .then(
                keyword("on")
                    .ignore_then(in_param_list(value.clone()).delimited_by(ctrl('('), ctrl(')')))
                    .or_not(),
            )
            .map(|(rhs, in_params)| StreamPostfix::Join(rhs, in_params.unwrap_or_default()));

        let alias = keyword("as").ignore_then(ident_part()).map(StreamPostfix::Alias);

        let stream_filter = ctrl(',')
            .ignore_then(filter_with(value))
            .map(StreamPostfix::Filter);

        primary
            .map_with_span(|s, span: Span| (s, span))
            .then(
                choice((join, alias, stream_filter))
                    .map_with_span(|p, span: Span| (p, span))
                    .repeated(),
            )
            .foldl(|(lhs, lhs_span), (postfix, postfix_span)| {
                let span = lhs_span.to(postfix_span);
                let kind = match postfix {
                    StreamPostfix::Join(rhs, in_params) => StreamKind::Join {
                        stream: Box::new(lhs),
                        table: Box::new(rhs),
                        in_params,
                    },
                    StreamPostfix::Alias(name) => StreamKind::Alias {
                        stream: Box::new(lhs),
                        name,
                    },
                    StreamPostfix::Filter(filter) => StreamKind::Filter {
                        stream: Box::new(lhs),
                        filter,
                    },
                };
                (kind.into_stream(span), span)
            })
            .map(|(stream, _)| stream)
    })
}
