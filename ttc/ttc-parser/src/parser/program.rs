use std::collections::BTreeMap;
use std::str::FromStr;

use chumsky::prelude::*;

use super::filter::filter;
use super::table::{action_with, in_param_list, invocation_with, stream_with, table_with};
use super::value::{type_expr, value};
use super::{
    at_name, ctrl, dollar, ident_part, integer, keyword, quoted_string, sequence,
    split_function_name, PError,
};
use crate::ast::*;
use crate::lexer::lr::TokenKind;
use crate::span::Span;
use crate::ty::Type;

/// The root parser: detects and parses any kind of input.
pub(crate) fn input() -> impl Parser<TokenKind, Input, Error = PError> {
    choice((
        dialogue_state().map(Input::DialogueState).boxed(),
        control_command().map(Input::ControlCommand).boxed(),
        bookkeeping().map(Input::Bookkeeping).boxed(),
        library().then_ignore(end()).map(Input::Library).boxed(),
        permission_rule().map(Input::PermissionRule).boxed(),
        program().map(Input::Program).boxed(),
    ))
    .then_ignore(end())
}

pub(crate) fn program() -> impl Parser<TokenKind, Program, Error = PError> + Clone {
    class_def()
        .repeated()
        .then(statements().repeated().at_least(1).flatten())
        .map_with_span(|(classes, statements), span| Program {
            classes,
            statements,
            principal: None,
            span: Some(span),
        })
}

/// One `;`-terminated statement, or an `oninput { ... }` block which expands
/// to one statement per choice.
fn statements() -> impl Parser<TokenKind, Vec<Statement>, Error = PError> + Clone {
    let declaration = declaration().map(StatementKind::Declaration);

    let assignment = keyword("let")
        .ignore_then(ident_part())
        .then_ignore(just(TokenKind::ColonEq))
        .then(table_with(value()))
        .map(|(name, value)| StatementKind::Assignment { name, value });

    let command = command_body().map(|(table, actions)| StatementKind::Command { table, actions });

    let rule = rule_body().map(|(stream, actions)| StatementKind::Rule { stream, actions });

    let single = choice((declaration, assignment, command, rule))
        .map_with_span(StatementKind::into_stmt)
        .then_ignore(ctrl(';'))
        .map(|stmt| vec![stmt]);

    let on_input = keyword("oninput").ignore_then(
        command_body()
            .then(annotations())
            .map_with_span(|((table, actions), (nl_annotations, annotations)), span| {
                StatementKind::OnInputChoice(OnInputChoice {
                    table,
                    actions,
                    nl_annotations,
                    annotations,
                })
                .into_stmt(span)
            })
            .then_ignore(ctrl(';'))
            .repeated()
            .at_least(1)
            .delimited_by(ctrl('{'), ctrl('}')),
    );

    single.or(on_input).boxed()
}

/// `now => TABLE? => ACTION`, without the trailing `;`
fn command_body() -> impl Parser<TokenKind, (Option<Table>, Vec<Action>), Error = PError> + Clone {
    let with_table = table_with(value())
        .then_ignore(just(TokenKind::ArrowFat))
        .then(action_with(value()))
        .map(|(table, action)| (Some(table), vec![action]));

    let action_only = action_with(value()).map(|action| (None, vec![action]));

    keyword("now")
        .ignore_then(just(TokenKind::ArrowFat))
        .ignore_then(with_table.or(action_only))
}

/// `STREAM => TABLE? => ACTION`; a middle table becomes a stream join.
fn rule_body() -> impl Parser<TokenKind, (Stream, Vec<Action>), Error = PError> + Clone {
    let with_table = table_with(value())
        .then_ignore(just(TokenKind::ArrowFat))
        .then(action_with(value()))
        .map(|(table, action)| (Some(table), action));

    let action_only = action_with(value()).map(|action| (None, action));

    stream_with(value())
        .then_ignore(just(TokenKind::ArrowFat))
        .then(with_table.or(action_only))
        .map(|(stream, (table, action))| {
            let stream = match table {
                None => stream,
                Some(table) => {
                    let span = Span::union(stream.span, table.span);
                    Stream {
                        kind: StreamKind::Join {
                            stream: Box::new(stream),
                            table: Box::new(table),
                            in_params: Vec::new(),
                        },
                        span,
                    }
                }
            };
            (stream, vec![action])
        })
}

fn lambda_params() -> impl Parser<TokenKind, BTreeMap<String, Type>, Error = PError> + Clone {
    sequence(ident_part().then_ignore(ctrl(':')).then(type_expr()))
        .delimited_by(ctrl('('), ctrl(')'))
        .map(|params| params.into_iter().collect())
}

/// `let query NAME(p : T, ...) := BODY`
fn declaration() -> impl Parser<TokenKind, Declaration, Error = PError> + Clone {
    let body_query = keyword("query")
        .ignore_then(ident_part())
        .then(lambda_params().or_not())
        .then_ignore(just(TokenKind::ColonEq))
        .then(table_with(value()).map(DeclarationValue::Table));

    let body_stream = keyword("stream")
        .ignore_then(ident_part())
        .then(lambda_params().or_not())
        .then_ignore(just(TokenKind::ColonEq))
        .then(stream_with(value()).map(DeclarationValue::Stream));

    let body_action = keyword("action")
        .ignore_then(ident_part())
        .then(lambda_params().or_not())
        .then_ignore(just(TokenKind::ColonEq))
        .then(invocation_with(value()).map(DeclarationValue::Action));

    keyword("let")
        .ignore_then(choice((body_query, body_stream, body_action)))
        .then(annotations())
        .map(
            |(((name, args), value), (nl_annotations, annotations))| Declaration {
                name,
                args: args.unwrap_or_default(),
                value,
                nl_annotations,
                annotations,
            },
        )
}

/// `#_[k=v]` and `#[k=v]` annotation lists, in any order.
fn annotations() -> impl Parser<TokenKind, (AnnotationMap, AnnotationMap), Error = PError> + Clone {
    #[derive(Clone)]
    enum Annot {
        Nl(String, Value),
        Impl(String, Value),
    }

    let nl = just(TokenKind::NlAnnotOpen)
        .ignore_then(ident_part())
        .then_ignore(ctrl('='))
        .then(value())
        .then_ignore(ctrl(']'))
        .map(|(k, v)| Annot::Nl(k, v));

    let implementation = just(TokenKind::AnnotOpen)
        .ignore_then(ident_part())
        .then_ignore(ctrl('='))
        .then(value())
        .then_ignore(ctrl(']'))
        .map(|(k, v)| Annot::Impl(k, v));

    nl.or(implementation).repeated().map(|annots| {
        let mut nl_map = BTreeMap::new();
        let mut impl_map = BTreeMap::new();
        for annot in annots {
            match annot {
                Annot::Nl(k, v) => nl_map.insert(k, v),
                Annot::Impl(k, v) => impl_map.insert(k, v),
            };
        }
        (nl_map, impl_map)
    })
}

fn class_def() -> impl Parser<TokenKind, ClassDef, Error = PError> + Clone {
    let extends = keyword("extends")
        .ignore_then(sequence(at_name()))
        .or_not()
        .map(Option::unwrap_or_default);

    keyword("class")
        .ignore_then(at_name())
        .then(extends)
        .then(annotations())
        .then(class_member().repeated().delimited_by(ctrl('{'), ctrl('}')))
        .map_with_span(
            |(((kind, extends), (nl_annotations, annotations)), members), span| {
                let mut class = ClassDef {
                    kind: kind.clone(),
                    extends,
                    imports: Vec::new(),
                    queries: BTreeMap::new(),
                    actions: BTreeMap::new(),
                    entities: Vec::new(),
                    nl_annotations,
                    annotations,
                    span: Some(span),
                };
                for member in members {
                    match member {
                        ClassMember::Import(import) => class.imports.push(import),
                        ClassMember::Function(mut def) => {
                            def.kind = kind.clone();
                            let slot = match def.function_type {
                                FunctionType::Query => &mut class.queries,
                                FunctionType::Action => &mut class.actions,
                            };
                            slot.insert(def.name.clone(), def);
                        }
                        ClassMember::Entity(entity) => class.entities.push(entity),
                    }
                }
                class
            },
        )
}

#[derive(Clone)]
enum ClassMember {
    Import(MixinImport),
    Function(FunctionDef),
    Entity(EntityDef),
}

fn class_member() -> impl Parser<TokenKind, ClassMember, Error = PError> + Clone {
    let import = keyword("import")
        .ignore_then(ident_part())
        .then_ignore(keyword("from"))
        .then(at_name())
        .then(in_param_list(value()).delimited_by(ctrl('('), ctrl(')')))
        .then_ignore(ctrl(';'))
        .map(|((facet, module), in_params)| {
            ClassMember::Import(MixinImport {
                facet,
                module,
                in_params,
            })
        });

    let arg_direction = choice((
        keyword("in").ignore_then(keyword("req")).to(ArgDirection::InReq),
        keyword("in").ignore_then(keyword("opt")).to(ArgDirection::InOpt),
        keyword("out").to(ArgDirection::Out),
    ));

    let arg_def = arg_direction
        .then(ident_part())
        .then_ignore(ctrl(':'))
        .then(type_expr())
        .then(annotations())
        .map(
            |(((direction, name), ty), (nl_annotations, annotations))| ArgumentDef {
                name,
                ty,
                direction,
                nl_annotations,
                annotations,
            },
        );

    let query = keyword("monitorable")
        .or_not()
        .then(keyword("list").or_not())
        .then_ignore(keyword("query"))
        .then(ident_part())
        .then(sequence(arg_def.clone()).delimited_by(ctrl('('), ctrl(')')))
        .then(annotations())
        .then_ignore(ctrl(';'))
        .map(
            |((((monitorable, list), name), args), (nl_annotations, annotations))| {
                ClassMember::Function(FunctionDef {
                    kind: String::new(),
                    name,
                    function_type: FunctionType::Query,
                    args,
                    is_list: list.is_some(),
                    is_monitorable: monitorable.is_some(),
                    nl_annotations,
                    annotations,
                })
            },
        );

    let action = keyword("action")
        .ignore_then(ident_part())
        .then(sequence(arg_def).delimited_by(ctrl('('), ctrl(')')))
        .then(annotations())
        .then_ignore(ctrl(';'))
        .map(|((name, args), (nl_annotations, annotations))| {
            ClassMember::Function(FunctionDef {
                kind: String::new(),
                name,
                function_type: FunctionType::Action,
                args,
                is_list: false,
                is_monitorable: false,
                nl_annotations,
                annotations,
            })
        });

    let entity = keyword("entity")
        .ignore_then(ident_part())
        .then(annotations())
        .then_ignore(ctrl(';'))
        .map(|(name, (nl_annotations, annotations))| {
            ClassMember::Entity(EntityDef {
                name,
                nl_annotations,
                annotations,
            })
        });

    choice((import, query, action, entity))
}

fn dataset() -> impl Parser<TokenKind, Dataset, Error = PError> + Clone {
    let program_block = statements()
        .repeated()
        .at_least(1)
        .flatten()
        .delimited_by(ctrl('{'), ctrl('}'))
        .map(Program::new);

    let ex_query = keyword("query")
        .ignore_then(lambda_params().or_not())
        .then_ignore(just(TokenKind::ColonEq))
        .then(table_with(value()).map(ExampleValue::Query));

    let ex_stream = keyword("stream")
        .ignore_then(lambda_params().or_not())
        .then_ignore(just(TokenKind::ColonEq))
        .then(stream_with(value()).map(ExampleValue::Stream));

    let ex_action = keyword("action")
        .ignore_then(lambda_params().or_not())
        .then_ignore(just(TokenKind::ColonEq))
        .then(invocation_with(value()).map(ExampleValue::Action));

    let ex_program = keyword("program")
        .ignore_then(lambda_params().or_not())
        .then_ignore(just(TokenKind::ColonEq))
        .then(program_block.map(ExampleValue::Program));

    let example = choice((ex_query, ex_stream, ex_action, ex_program))
        .then(annotations())
        .then_ignore(ctrl(';'))
        .map(|((args, value), (nl_annotations, mut annotations))| {
            let utterances = nl_annotations
                .get("utterances")
                .and_then(|v| v.kind.as_array())
                .map(|elems| {
                    elems
                        .iter()
                        .filter_map(|e| e.kind.as_string().cloned())
                        .collect()
                })
                .unwrap_or_default();
            let id = annotations
                .remove("id")
                .and_then(|v| v.kind.as_number().copied())
                .map(|n| n as i64)
                .unwrap_or(-1);
            Example {
                id,
                args: args.unwrap_or_default(),
                value,
                utterances,
                preprocessed: Vec::new(),
                annotations,
            }
        });

    keyword("dataset")
        .ignore_then(at_name())
        .then(
            keyword("language")
                .ignore_then(quoted_string())
                .or_not()
                .map(|l| l.unwrap_or_else(|| "en".to_string())),
        )
        .then(annotations())
        .then(example.repeated().delimited_by(ctrl('{'), ctrl('}')))
        .map(|(((name, language), (_, annotations)), examples)| Dataset {
            name,
            language,
            examples,
            annotations,
        })
}

fn library() -> impl Parser<TokenKind, Library, Error = PError> + Clone {
    #[derive(Clone)]
    enum Item {
        Class(Box<ClassDef>),
        Dataset(Dataset),
    }

    class_def()
        .map(|c| Item::Class(Box::new(c)))
        .or(dataset().map(Item::Dataset))
        .repeated()
        .at_least(1)
        .map(|items| {
            let mut library = Library {
                classes: Vec::new(),
                datasets: Vec::new(),
            };
            for item in items {
                match item {
                    Item::Class(c) => library.classes.push(*c),
                    Item::Dataset(d) => library.datasets.push(d),
                }
            }
            library
        })
}

/// `$policy`? FILTER `:` QUERY `=>` ACTION `;`
pub(crate) fn permission_rule() -> impl Parser<TokenKind, PermissionRule, Error = PError> + Clone {
    let specified = at_name()
        .then(ctrl(',').ignore_then(filter()).or_not())
        .try_map(|(full_name, filter), span: Span| {
            let (kind, channel) = split_function_name(&full_name)
                .ok_or_else(|| PError::custom(span, "expected @kind.function"))?;
            Ok(PermissionFunction::Specified {
                kind,
                channel,
                filter: filter.unwrap_or(BooleanExpression::True),
                schema: None,
            })
        });

    let class_star = at_name()
        .then_ignore(ctrl('.'))
        .then_ignore(ctrl('*'))
        .map(PermissionFunction::ClassStar);

    let query_function = choice((
        keyword("now").to(PermissionFunction::Builtin),
        ctrl('*').to(PermissionFunction::Star),
        class_star.clone(),
        specified.clone(),
    ));

    let action_function = choice((
        keyword("notify").to(PermissionFunction::Builtin),
        ctrl('*').to(PermissionFunction::Star),
        class_star,
        specified,
    ));

    dollar("policy")
        .or_not()
        .ignore_then(filter())
        .then_ignore(ctrl(':'))
        .then(query_function)
        .then_ignore(just(TokenKind::ArrowFat))
        .then(action_function)
        // a trailing `=> *` after the action is accepted as sugar
        .then_ignore(just(TokenKind::ArrowFat).ignore_then(ctrl('*')).or_not())
        .then_ignore(ctrl(';'))
        .map_with_span(|((principal, query), action), span| PermissionRule {
            principal,
            query,
            action,
            span: Some(span),
        })
}

fn bookkeeping() -> impl Parser<TokenKind, Bookkeeping, Error = PError> + Clone {
    let special = keyword("special")
        .ignore_then(ident_part().delimited_by(ctrl('('), ctrl(')')))
        .map(BookkeepingIntent::Special);

    let choice_of = keyword("choice")
        .ignore_then(integer().delimited_by(ctrl('('), ctrl(')')))
        .map(BookkeepingIntent::Choice);

    let answer = keyword("answer")
        .ignore_then(value().delimited_by(ctrl('('), ctrl(')')))
        .map(BookkeepingIntent::Answer);

    let commands = keyword("commands")
        .ignore_then(in_param_list(value()).delimited_by(ctrl('('), ctrl(')')))
        .try_map(|params, span: Span| {
            let mut device = None;
            let mut category = None;
            for param in params {
                match param.name.as_str() {
                    "device" => device = Some(param.value),
                    "category" => category = param.value.kind.into_string().ok(),
                    other => {
                        return Err(PError::custom(
                            span,
                            format!("invalid commands parameter `{other}`"),
                        ))
                    }
                }
            }
            Ok(BookkeepingIntent::CommandList {
                device,
                category: category
                    .ok_or_else(|| PError::custom(span, "commands requires a category"))?,
            })
        });

    keyword("bookkeeping")
        .ignore_then(
            choice((special, choice_of, answer, commands)).delimited_by(ctrl('('), ctrl(')')),
        )
        .then_ignore(ctrl(';'))
        .map_with_span(|intent, span| Bookkeeping {
            intent,
            span: Some(span),
        })
}

fn control_command() -> impl Parser<TokenKind, ControlCommand, Error = PError> + Clone {
    select! {
        TokenKind::Dollar(word) if ControlIntent::from_str(&word).is_ok() =>
            ControlIntent::from_str(&word).unwrap(),
    }
    .then_ignore(ctrl(';'))
    .map_with_span(|intent, span| ControlCommand {
        intent,
        span: Some(span),
    })
}

fn dialogue_state() -> impl Parser<TokenKind, DialogueState, Error = PError> + Clone {
    let header = dollar("dialogue")
        .ignore_then(at_name())
        .then(
            sequence(ident_part())
                .delimited_by(ctrl('('), ctrl(')'))
                .or_not(),
        )
        .then_ignore(ctrl(';'));

    let item_body = choice((
        command_body().map(|(table, actions)| StatementKind::Command { table, actions }),
        rule_body().map(|(stream, actions)| StatementKind::Rule { stream, actions }),
    ))
    .map_with_span(StatementKind::into_stmt);

    let item = item_body
        .then(annotations())
        .then_ignore(ctrl(';'))
        .try_map(|(statement, (_, mut annotations)), span: Span| {
            let results = annotations
                .remove("results")
                .map(|v| convert_result_list(v, &mut annotations))
                .transpose()
                .map_err(|msg| PError::custom(span, msg))?;

            let confirm = match annotations.remove("confirm") {
                Some(v) => match &v.kind {
                    ValueKind::Enum(state) => ConfirmationState::from_str(state)
                        .map_err(|_| PError::custom(span, "invalid confirmation state"))?,
                    _ => return Err(PError::custom(span, "confirm must be an enum")),
                },
                None if results.is_some() => ConfirmationState::ConfirmedAndExecuted,
                None => ConfirmationState::Accepted,
            };

            Ok(DialogueHistoryItem {
                statement,
                results,
                confirm,
            })
        });

    header
        .then(item.repeated())
        .try_map(|((act_name, act_param), history), span: Span| {
            let (policy, dialogue_act) = split_function_name(&act_name)
                .ok_or_else(|| PError::custom(span, "expected @policy.act"))?;
            Ok(DialogueState {
                policy,
                dialogue_act,
                dialogue_act_param: act_param.unwrap_or_default(),
                history,
                span: Some(span),
            })
        })
}

fn convert_result_list(
    value: Value,
    annotations: &mut AnnotationMap,
) -> Result<DialogueHistoryResultList, String> {
    let elems = match value.kind {
        ValueKind::Array(elems) => elems,
        _ => return Err("results must be an array".to_string()),
    };
    let results = elems
        .into_iter()
        .map(|elem| match elem.kind {
            ValueKind::Object(fields) => Ok(DialogueHistoryResultItem { value: fields }),
            _ => Err("each result must be an object".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let count = annotations
        .remove("count")
        .unwrap_or_else(|| Value::number(results.len() as f64));
    let more = annotations
        .remove("more")
        .and_then(|v| v.kind.as_boolean().copied())
        .unwrap_or(false);
    let error = annotations.remove("error");

    Ok(DialogueHistoryResultList {
        results,
        count,
        more,
        error,
    })
}
