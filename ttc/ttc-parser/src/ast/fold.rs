//! Rebuilding traversal over the tree: a transformation implements
//! [AstFold], overrides the hooks it cares about, and inherits structural
//! recursion for every other node. Nodes are consumed and rebuilt, so
//! unchanged subtrees move through untouched and rewrites stay functional.
use itertools::Itertools;

use super::*;
use crate::error::Error;
use crate::span::Span;

// Every hook has a companion free function carrying the default recursion.
// An override that still wants to descend into the children calls the free
// function; the normalizer and the schema installer both rely on this to
// rewrite a node after its children.
pub trait AstFold {
    fn fold_span(&mut self, span: Option<Span>) -> Option<Span> {
        span
    }
    fn fold_input(&mut self, input: Input) -> Result<Input, Error> {
        fold_input(self, input)
    }
    fn fold_program(&mut self, program: Program) -> Result<Program, Error> {
        fold_program(self, program)
    }
    fn fold_statement(&mut self, mut stmt: Statement) -> Result<Statement, Error> {
        stmt.kind = self.fold_statement_kind(stmt.kind)?;
        stmt.span = self.fold_span(stmt.span);
        Ok(stmt)
    }
    fn fold_statement_kind(&mut self, kind: StatementKind) -> Result<StatementKind, Error> {
        fold_statement_kind(self, kind)
    }
    fn fold_declaration(&mut self, decl: Declaration) -> Result<Declaration, Error> {
        fold_declaration(self, decl)
    }
    fn fold_table(&mut self, mut table: Table) -> Result<Table, Error> {
        table.kind = self.fold_table_kind(table.kind)?;
        table.span = self.fold_span(table.span);
        Ok(table)
    }
    fn fold_table_kind(&mut self, kind: TableKind) -> Result<TableKind, Error> {
        fold_table_kind(self, kind)
    }
    fn fold_stream(&mut self, mut stream: Stream) -> Result<Stream, Error> {
        stream.kind = self.fold_stream_kind(stream.kind)?;
        stream.span = self.fold_span(stream.span);
        Ok(stream)
    }
    fn fold_stream_kind(&mut self, kind: StreamKind) -> Result<StreamKind, Error> {
        fold_stream_kind(self, kind)
    }
    fn fold_invocation(&mut self, invocation: Invocation) -> Result<Invocation, Error> {
        fold_invocation(self, invocation)
    }
    fn fold_selector(&mut self, selector: DeviceSelector) -> Result<DeviceSelector, Error> {
        fold_selector(self, selector)
    }
    fn fold_input_param(&mut self, param: InputParam) -> Result<InputParam, Error> {
        Ok(InputParam {
            name: param.name,
            value: self.fold_value(param.value)?,
            span: self.fold_span(param.span),
        })
    }
    fn fold_input_params(&mut self, params: Vec<InputParam>) -> Result<Vec<InputParam>, Error> {
        params
            .into_iter()
            .map(|p| self.fold_input_param(p))
            .try_collect()
    }
    fn fold_action(&mut self, action: Action) -> Result<Action, Error> {
        Ok(match action {
            Action::Notify(kind) => Action::Notify(kind),
            Action::Invocation(inv) => Action::Invocation(self.fold_invocation(inv)?),
        })
    }
    fn fold_filter(&mut self, filter: BooleanExpression) -> Result<BooleanExpression, Error> {
        fold_filter(self, filter)
    }
    fn fold_value(&mut self, mut value: Value) -> Result<Value, Error> {
        value.kind = self.fold_value_kind(value.kind)?;
        value.span = self.fold_span(value.span);
        Ok(value)
    }
    fn fold_value_kind(&mut self, kind: ValueKind) -> Result<ValueKind, Error> {
        fold_value_kind(self, kind)
    }
    fn fold_values(&mut self, values: Vec<Value>) -> Result<Vec<Value>, Error> {
        values.into_iter().map(|v| self.fold_value(v)).try_collect()
    }
    fn fold_permission_rule(&mut self, rule: PermissionRule) -> Result<PermissionRule, Error> {
        Ok(PermissionRule {
            principal: self.fold_filter(rule.principal)?,
            query: self.fold_permission_function(rule.query)?,
            action: self.fold_permission_function(rule.action)?,
            span: self.fold_span(rule.span),
        })
    }
    fn fold_permission_function(
        &mut self,
        function: PermissionFunction,
    ) -> Result<PermissionFunction, Error> {
        fold_permission_function(self, function)
    }
    fn fold_dialogue_state(&mut self, state: DialogueState) -> Result<DialogueState, Error> {
        Ok(DialogueState {
            policy: state.policy,
            dialogue_act: state.dialogue_act,
            dialogue_act_param: state.dialogue_act_param,
            history: state
                .history
                .into_iter()
                .map(|item| self.fold_history_item(item))
                .try_collect()?,
            span: self.fold_span(state.span),
        })
    }
    fn fold_history_item(
        &mut self,
        item: DialogueHistoryItem,
    ) -> Result<DialogueHistoryItem, Error> {
        Ok(DialogueHistoryItem {
            statement: self.fold_statement(item.statement)?,
            results: item
                .results
                .map(|r| self.fold_result_list(r))
                .transpose()?,
            confirm: item.confirm,
        })
    }
    fn fold_result_list(
        &mut self,
        list: DialogueHistoryResultList,
    ) -> Result<DialogueHistoryResultList, Error> {
        Ok(DialogueHistoryResultList {
            results: list
                .results
                .into_iter()
                .map(|item| {
                    Ok(DialogueHistoryResultItem {
                        value: item
                            .value
                            .into_iter()
                            .map(|(k, v)| Ok((k, self.fold_value(v)?)))
                            .collect::<Result<_, Error>>()?,
                    })
                })
                .collect::<Result<_, Error>>()?,
            count: self.fold_value(list.count)?,
            more: list.more,
            error: list.error.map(|e| self.fold_value(e)).transpose()?,
        })
    }
    fn fold_class_def(&mut self, class: ClassDef) -> Result<ClassDef, Error> {
        fold_class_def(self, class)
    }
    fn fold_dataset(&mut self, dataset: Dataset) -> Result<Dataset, Error> {
        fold_dataset(self, dataset)
    }
    fn fold_annotations(&mut self, annotations: AnnotationMap) -> Result<AnnotationMap, Error> {
        annotations
            .into_iter()
            .map(|(k, v)| Ok((k, self.fold_value(v)?)))
            .collect()
    }
}

pub fn fold_permission_function<F: ?Sized + AstFold>(
    fold: &mut F,
    function: PermissionFunction,
) -> Result<PermissionFunction, Error> {
    Ok(match function {
        PermissionFunction::Specified {
            kind,
            channel,
            filter,
            schema,
        } => PermissionFunction::Specified {
            kind,
            channel,
            filter: fold.fold_filter(filter)?,
            schema,
        },
        other => other,
    })
}

pub fn fold_input<F: ?Sized + AstFold>(fold: &mut F, input: Input) -> Result<Input, Error> {
    Ok(match input {
        Input::Program(p) => Input::Program(fold.fold_program(p)?),
        Input::PermissionRule(r) => Input::PermissionRule(fold.fold_permission_rule(r)?),
        Input::Library(lib) => Input::Library(Library {
            classes: lib
                .classes
                .into_iter()
                .map(|c| fold.fold_class_def(c))
                .try_collect()?,
            datasets: lib
                .datasets
                .into_iter()
                .map(|d| fold.fold_dataset(d))
                .try_collect()?,
        }),
        Input::Dataset(d) => Input::Dataset(fold.fold_dataset(d)?),
        Input::Bookkeeping(b) => Input::Bookkeeping(Bookkeeping {
            intent: match b.intent {
                BookkeepingIntent::Answer(v) => BookkeepingIntent::Answer(fold.fold_value(v)?),
                BookkeepingIntent::CommandList { device, category } => {
                    BookkeepingIntent::CommandList {
                        device: device.map(|d| fold.fold_value(d)).transpose()?,
                        category,
                    }
                }
                other => other,
            },
            span: fold.fold_span(b.span),
        }),
        Input::ControlCommand(c) => Input::ControlCommand(ControlCommand {
            intent: c.intent,
            span: fold.fold_span(c.span),
        }),
        Input::DialogueState(s) => Input::DialogueState(fold.fold_dialogue_state(s)?),
    })
}

pub fn fold_program<F: ?Sized + AstFold>(fold: &mut F, program: Program) -> Result<Program, Error> {
    Ok(Program {
        classes: program
            .classes
            .into_iter()
            .map(|c| fold.fold_class_def(c))
            .try_collect()?,
        statements: program
            .statements
            .into_iter()
            .map(|s| fold.fold_statement(s))
            .try_collect()?,
        principal: program.principal.map(|p| fold.fold_value(p)).transpose()?,
        span: fold.fold_span(program.span),
    })
}

pub fn fold_statement_kind<F: ?Sized + AstFold>(
    fold: &mut F,
    kind: StatementKind,
) -> Result<StatementKind, Error> {
    Ok(match kind {
        StatementKind::Rule { stream, actions } => StatementKind::Rule {
            stream: fold.fold_stream(stream)?,
            actions: actions
                .into_iter()
                .map(|a| fold.fold_action(a))
                .try_collect()?,
        },
        StatementKind::Command { table, actions } => StatementKind::Command {
            table: table.map(|t| fold.fold_table(t)).transpose()?,
            actions: actions
                .into_iter()
                .map(|a| fold.fold_action(a))
                .try_collect()?,
        },
        StatementKind::Assignment { name, value } => StatementKind::Assignment {
            name,
            value: fold.fold_table(value)?,
        },
        StatementKind::Declaration(decl) => {
            StatementKind::Declaration(fold.fold_declaration(decl)?)
        }
        StatementKind::OnInputChoice(choice) => StatementKind::OnInputChoice(OnInputChoice {
            table: choice.table.map(|t| fold.fold_table(t)).transpose()?,
            actions: choice
                .actions
                .into_iter()
                .map(|a| fold.fold_action(a))
                .try_collect()?,
            nl_annotations: fold.fold_annotations(choice.nl_annotations)?,
            annotations: fold.fold_annotations(choice.annotations)?,
        }),
    })
}

pub fn fold_declaration<F: ?Sized + AstFold>(
    fold: &mut F,
    decl: Declaration,
) -> Result<Declaration, Error> {
    Ok(Declaration {
        name: decl.name,
        args: decl.args,
        value: match decl.value {
            DeclarationValue::Table(t) => DeclarationValue::Table(fold.fold_table(t)?),
            DeclarationValue::Stream(s) => DeclarationValue::Stream(fold.fold_stream(s)?),
            DeclarationValue::Action(a) => DeclarationValue::Action(fold.fold_invocation(a)?),
        },
        nl_annotations: fold.fold_annotations(decl.nl_annotations)?,
        annotations: fold.fold_annotations(decl.annotations)?,
    })
}

pub fn fold_table_kind<F: ?Sized + AstFold>(
    fold: &mut F,
    kind: TableKind,
) -> Result<TableKind, Error> {
    Ok(match kind {
        TableKind::Invocation(inv) => TableKind::Invocation(fold.fold_invocation(inv)?),
        TableKind::Filter { table, filter } => TableKind::Filter {
            table: Box::new(fold.fold_table(*table)?),
            filter: fold.fold_filter(filter)?,
        },
        TableKind::Projection { table, args } => TableKind::Projection {
            table: Box::new(fold.fold_table(*table)?),
            args,
        },
        TableKind::Compute {
            table,
            expression,
            alias,
        } => TableKind::Compute {
            table: Box::new(fold.fold_table(*table)?),
            expression: fold.fold_value(expression)?,
            alias,
        },
        TableKind::Aggregation {
            table,
            op,
            field,
            alias,
        } => TableKind::Aggregation {
            table: Box::new(fold.fold_table(*table)?),
            op,
            field,
            alias,
        },
        TableKind::Sort {
            table,
            field,
            direction,
        } => TableKind::Sort {
            table: Box::new(fold.fold_table(*table)?),
            field,
            direction,
        },
        TableKind::Index { table, indices } => TableKind::Index {
            table: Box::new(fold.fold_table(*table)?),
            indices: fold.fold_values(indices)?,
        },
        TableKind::Slice { table, base, limit } => TableKind::Slice {
            table: Box::new(fold.fold_table(*table)?),
            base: fold.fold_value(base)?,
            limit: fold.fold_value(limit)?,
        },
        TableKind::Join {
            lhs,
            rhs,
            in_params,
        } => TableKind::Join {
            lhs: Box::new(fold.fold_table(*lhs)?),
            rhs: Box::new(fold.fold_table(*rhs)?),
            in_params: fold.fold_input_params(in_params)?,
        },
        TableKind::Alias { table, name } => TableKind::Alias {
            table: Box::new(fold.fold_table(*table)?),
            name,
        },
        TableKind::History {
            kind,
            channel,
            index,
        } => TableKind::History {
            kind,
            channel,
            index: index.map(|i| fold.fold_value(i)).transpose()?,
        },
        TableKind::VarRef { name, in_params } => TableKind::VarRef {
            name,
            in_params: fold.fold_input_params(in_params)?,
        },
    })
}

pub fn fold_stream_kind<F: ?Sized + AstFold>(
    fold: &mut F,
    kind: StreamKind,
) -> Result<StreamKind, Error> {
    Ok(match kind {
        StreamKind::Timer {
            base,
            interval,
            frequency,
        } => StreamKind::Timer {
            base: fold.fold_value(base)?,
            interval: fold.fold_value(interval)?,
            frequency: frequency.map(|f| fold.fold_value(f)).transpose()?,
        },
        StreamKind::AtTimer {
            times,
            expiration_date,
        } => StreamKind::AtTimer {
            times: fold.fold_values(times)?,
            expiration_date: expiration_date.map(|e| fold.fold_value(e)).transpose()?,
        },
        StreamKind::Monitor { table, args } => StreamKind::Monitor {
            table: Box::new(fold.fold_table(*table)?),
            args,
        },
        StreamKind::EdgeFilter { stream, filter } => StreamKind::EdgeFilter {
            stream: Box::new(fold.fold_stream(*stream)?),
            filter: fold.fold_filter(filter)?,
        },
        StreamKind::EdgeNew { stream } => StreamKind::EdgeNew {
            stream: Box::new(fold.fold_stream(*stream)?),
        },
        StreamKind::Filter { stream, filter } => StreamKind::Filter {
            stream: Box::new(fold.fold_stream(*stream)?),
            filter: fold.fold_filter(filter)?,
        },
        StreamKind::Projection { stream, args } => StreamKind::Projection {
            stream: Box::new(fold.fold_stream(*stream)?),
            args,
        },
        StreamKind::Compute {
            stream,
            expression,
            alias,
        } => StreamKind::Compute {
            stream: Box::new(fold.fold_stream(*stream)?),
            expression: fold.fold_value(expression)?,
            alias,
        },
        StreamKind::Join {
            stream,
            table,
            in_params,
        } => StreamKind::Join {
            stream: Box::new(fold.fold_stream(*stream)?),
            table: Box::new(fold.fold_table(*table)?),
            in_params: fold.fold_input_params(in_params)?,
        },
        StreamKind::Alias { stream, name } => StreamKind::Alias {
            stream: Box::new(fold.fold_stream(*stream)?),
            name,
        },
        StreamKind::VarRef { name, in_params } => StreamKind::VarRef {
            name,
            in_params: fold.fold_input_params(in_params)?,
        },
    })
}

pub fn fold_invocation<F: ?Sized + AstFold>(
    fold: &mut F,
    invocation: Invocation,
) -> Result<Invocation, Error> {
    Ok(Invocation {
        selector: fold.fold_selector(invocation.selector)?,
        channel: invocation.channel,
        in_params: fold.fold_input_params(invocation.in_params)?,
        schema: invocation.schema,
        span: fold.fold_span(invocation.span),
    })
}

pub fn fold_selector<F: ?Sized + AstFold>(
    fold: &mut F,
    selector: DeviceSelector,
) -> Result<DeviceSelector, Error> {
    Ok(DeviceSelector {
        kind: selector.kind,
        id: selector.id,
        all: selector.all,
        attributes: fold.fold_input_params(selector.attributes)?,
    })
}

pub fn fold_filter<F: ?Sized + AstFold>(
    fold: &mut F,
    filter: BooleanExpression,
) -> Result<BooleanExpression, Error> {
    use BooleanExpression::*;
    Ok(match filter {
        True => True,
        False => False,
        And(ops) => And(ops
            .into_iter()
            .map(|f| fold.fold_filter(f))
            .try_collect()?),
        Or(ops) => Or(ops
            .into_iter()
            .map(|f| fold.fold_filter(f))
            .try_collect()?),
        Not(inner) => Not(Box::new(fold.fold_filter(*inner)?)),
        Atom(atom) => Atom(AtomBooleanExpression {
            name: atom.name,
            operator: atom.operator,
            value: fold.fold_value(atom.value)?,
            span: fold.fold_span(atom.span),
        }),
        Compute(c) => Compute(ComputeBooleanExpression {
            lhs: fold.fold_value(c.lhs)?,
            operator: c.operator,
            rhs: fold.fold_value(c.rhs)?,
            span: fold.fold_span(c.span),
        }),
        DontCare { name } => DontCare { name },
        External(e) => External(Box::new(ExternalBooleanExpression {
            invocation: fold.fold_invocation(e.invocation)?,
            filter: fold.fold_filter(e.filter)?,
        })),
    })
}

pub fn fold_value_kind<F: ?Sized + AstFold>(
    fold: &mut F,
    kind: ValueKind,
) -> Result<ValueKind, Error> {
    use ValueKind::*;
    Ok(match kind {
        Array(elems) => Array(fold.fold_values(elems)?),
        Object(fields) => Object(
            fields
                .into_iter()
                .map(|(k, v)| Ok((k, fold.fold_value(v)?)))
                .collect::<Result<_, Error>>()?,
        ),
        Computation { op, operands } => Computation {
            op,
            operands: fold.fold_values(operands)?,
        },
        ArrayField { field, value } => ArrayField {
            field,
            value: Box::new(fold.fold_value(*value)?),
        },
        Filter { value, filter } => Filter {
            value: Box::new(fold.fold_value(*value)?),
            filter: Box::new(fold.fold_filter(*filter)?),
        },
        // leaves don't capture values, so we don't need to fold them
        other => other,
    })
}

pub fn fold_class_def<F: ?Sized + AstFold>(fold: &mut F, class: ClassDef) -> Result<ClassDef, Error> {
    Ok(ClassDef {
        kind: class.kind,
        extends: class.extends,
        imports: class.imports,
        queries: class.queries,
        actions: class.actions,
        entities: class.entities,
        nl_annotations: fold.fold_annotations(class.nl_annotations)?,
        annotations: fold.fold_annotations(class.annotations)?,
        span: fold.fold_span(class.span),
    })
}

pub fn fold_dataset<F: ?Sized + AstFold>(fold: &mut F, dataset: Dataset) -> Result<Dataset, Error> {
    Ok(Dataset {
        name: dataset.name,
        language: dataset.language,
        examples: dataset
            .examples
            .into_iter()
            .map(|ex| {
                Ok(Example {
                    id: ex.id,
                    args: ex.args,
                    value: match ex.value {
                        ExampleValue::Query(t) => ExampleValue::Query(fold.fold_table(t)?),
                        ExampleValue::Stream(s) => ExampleValue::Stream(fold.fold_stream(s)?),
                        ExampleValue::Action(a) => ExampleValue::Action(fold.fold_invocation(a)?),
                        ExampleValue::Program(p) => ExampleValue::Program(fold.fold_program(p)?),
                    },
                    utterances: ex.utterances,
                    preprocessed: ex.preprocessed,
                    annotations: fold.fold_annotations(ex.annotations)?,
                })
            })
            .collect::<Result<_, Error>>()?,
        annotations: fold.fold_annotations(dataset.annotations)?,
    })
}
