//! The typechecker. Two passes: schema resolution (async, possibly
//! concurrent across independent invocations) and checking (pure).

pub(crate) mod operators;
mod resolve;
mod scope;
#[cfg(test)]
pub(crate) mod test;

pub use scope::Scope;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use ttc_parser::ast::*;
use ttc_parser::ty::{units, Type};
use ttc_parser::{Error, ErrorContext, TypeErrorKind};

use crate::schema::SchemaRetriever;
use resolve::{SchemaKey, SchemaMap};

#[derive(Clone)]
pub struct TypecheckOptions {
    /// the unit `defaultTemperature` resolves to: "C" or "F"
    pub temperature_unit: String,
    /// cancels all outstanding schema fetches; the whole operation fails
    /// with `Cancelled` and no partial AST escapes
    pub token: CancellationToken,
}

impl Default for TypecheckOptions {
    fn default() -> Self {
        TypecheckOptions {
            temperature_unit: "C".to_string(),
            token: CancellationToken::new(),
        }
    }
}

/// Typecheck any input. On success the returned AST has every invocation's
/// schema populated; on failure all accumulated semantic errors are
/// returned and no AST escapes.
pub async fn typecheck<R: SchemaRetriever>(
    input: Input,
    retriever: &R,
    options: &TypecheckOptions,
) -> Result<Input, Vec<Error>> {
    let (input, requests) = resolve::collect_requests(input);
    let schemas = resolve::fetch_schemas(requests, retriever, options)
        .await
        .map_err(|e| vec![e])?;
    let input = resolve::install_schemas(input, &schemas, options);

    let mut checker = Checker {
        schemas: &schemas,
        declarations: HashMap::new(),
        errors: Vec::new(),
        join_provided: Vec::new(),
    };
    checker.check_input(&input);

    if checker.errors.is_empty() {
        Ok(input)
    } else {
        Err(checker.errors)
    }
}

#[derive(Clone)]
struct TableProps {
    scope: Scope,
    is_list: bool,
    is_monitorable: bool,
}

impl TableProps {
    fn singleton(scope: Scope) -> Self {
        TableProps {
            scope,
            is_list: false,
            is_monitorable: false,
        }
    }
}

#[derive(Clone)]
struct DeclInfo {
    args: std::collections::BTreeMap<String, Type>,
    props: TableProps,
}

struct Checker<'a> {
    schemas: &'a SchemaMap,
    declarations: HashMap<String, DeclInfo>,
    errors: Vec<Error>,
    /// required parameters currently satisfied by an enclosing join's
    /// `on (...)` clause
    join_provided: Vec<String>,
}

fn err(kind: TypeErrorKind, message: impl ToString) -> Error {
    Error::type_error(kind, message)
}

impl Checker<'_> {
    fn check_input(&mut self, input: &Input) {
        match input {
            Input::Program(program) => self.check_program(program),
            Input::PermissionRule(rule) => self.check_permission_rule(rule),
            Input::Library(library) => {
                for class in &library.classes {
                    self.check_class(class);
                }
                for dataset in &library.datasets {
                    self.check_dataset(dataset);
                }
            }
            Input::Dataset(dataset) => self.check_dataset(dataset),
            Input::Bookkeeping(bookkeeping) => {
                if let BookkeepingIntent::Answer(value) = &bookkeeping.intent {
                    if let Err(e) = self.value_type(value, &Scope::new()) {
                        self.errors.push(e.or_at(value.span));
                    }
                }
            }
            Input::ControlCommand(_) => {}
            Input::DialogueState(state) => self.check_dialogue(state),
        }
    }

    fn check_program(&mut self, program: &Program) {
        for class in &program.classes {
            self.check_class(class);
        }
        for statement in &program.statements {
            if let Err(e) = self.check_statement(statement) {
                self.errors.push(e.or_at(statement.span));
            }
        }
    }

    /// One statement checks in isolation: a failure here does not prevent
    /// checking the next statement.
    fn check_statement(&mut self, statement: &Statement) -> Result<(), Error> {
        match &statement.kind {
            StatementKind::Command { table, actions } => {
                let scope = match table {
                    Some(table) => self.check_table(table, &Scope::new())?.scope,
                    None => Scope::new(),
                };
                for action in actions {
                    self.check_action(action, &scope)?;
                }
                Ok(())
            }
            StatementKind::Rule { stream, actions } => {
                let props = self.check_stream(stream)?;
                for action in actions {
                    self.check_action(action, &props.scope)?;
                }
                Ok(())
            }
            StatementKind::Assignment { name, value } => {
                let props = self.check_table(value, &Scope::new())?;
                self.declarations.insert(
                    name.clone(),
                    DeclInfo {
                        args: Default::default(),
                        props,
                    },
                );
                Ok(())
            }
            StatementKind::Declaration(decl) => self.check_declaration(decl),
            StatementKind::OnInputChoice(choice) => {
                let scope = match &choice.table {
                    Some(table) => self.check_table(table, &Scope::new())?.scope,
                    None => Scope::new(),
                };
                for action in &choice.actions {
                    self.check_action(action, &scope)?;
                }
                Ok(())
            }
        }
    }

    fn check_declaration(&mut self, decl: &Declaration) -> Result<(), Error> {
        let mut arg_scope = Scope::new();
        for (name, ty) in &decl.args {
            self.check_type_resolved(ty)?;
            arg_scope = arg_scope.bind(name, ty.clone());
        }

        let props = match &decl.value {
            DeclarationValue::Table(table) => self.check_table(table, &arg_scope)?,
            DeclarationValue::Stream(stream) => self.check_stream(stream)?,
            DeclarationValue::Action(inv) => {
                self.check_invocation(inv, FunctionType::Action, &arg_scope)?;
                TableProps::singleton(Scope::new())
            }
        };
        self.declarations.insert(
            decl.name.clone(),
            DeclInfo {
                args: decl.args.clone(),
                props,
            },
        );
        Ok(())
    }

    fn check_action(&mut self, action: &Action, scope: &Scope) -> Result<(), Error> {
        match action {
            Action::Notify(_) => Ok(()),
            Action::Invocation(inv) => {
                self.check_invocation(inv, FunctionType::Action, scope)?;
                Ok(())
            }
        }
    }

    /// Check selector attributes and input parameters against the schema,
    /// resolving variable references in `param_scope`. Returns the output
    /// scope of the function.
    fn check_invocation(
        &mut self,
        inv: &Invocation,
        function_type: FunctionType,
        param_scope: &Scope,
    ) -> Result<Arc<FunctionDef>, Error> {
        let schema = self.schema_of(
            &inv.selector.kind,
            &inv.channel,
            function_type,
            inv.span,
        )?;

        for attr in &inv.selector.attributes {
            let ty = self.value_type(&attr.value, param_scope)?;
            if !ty.is_assignable(&Type::String) && !ty.is_assignable(&Type::Entity("tt:device".to_string())) {
                return Err(err(
                    TypeErrorKind::TypeMismatch,
                    format!("invalid type {ty} for selector attribute `{}`", attr.name),
                )
                .at(attr.span));
            }
        }

        for param in &inv.in_params {
            let arg = schema.arg(&param.name).ok_or_else(|| {
                err(
                    TypeErrorKind::UnknownParameter,
                    format!(
                        "`{}` is not a parameter of {}.{}",
                        param.name, inv.selector.kind, inv.channel
                    ),
                )
                .at(param.span)
            })?;
            if !arg.is_input() {
                return Err(err(
                    TypeErrorKind::UnknownParameter,
                    format!("`{}` is an output parameter", param.name),
                )
                .at(param.span));
            }
            let ty = self.value_type(&param.value, param_scope)?;
            if !ty.is_assignable(&arg.ty) {
                return Err(err(
                    TypeErrorKind::TypeMismatch,
                    format!(
                        "invalid type {ty} for parameter `{}`, expected {}",
                        param.name, arg.ty
                    ),
                )
                .at(param.span));
            }
        }

        // required inputs must at least carry a slot-fillable hole, unless
        // an enclosing join passes them in
        for arg in schema.in_params() {
            if arg.is_required()
                && !inv.in_params.iter().any(|p| p.name == arg.name)
                && !self.join_provided.contains(&arg.name)
            {
                return Err(err(
                    TypeErrorKind::TypeMismatch,
                    format!("missing required parameter `{}`", arg.name),
                )
                .at(inv.span));
            }
        }

        Ok(schema)
    }

    fn schema_of(
        &self,
        kind: &str,
        channel: &str,
        function_type: FunctionType,
        span: Option<ttc_parser::Span>,
    ) -> Result<Arc<FunctionDef>, Error> {
        match self
            .schemas
            .get(&SchemaKey::new(kind, channel, function_type))
        {
            Some(Ok(schema)) => Ok(schema.clone()),
            Some(Err(e)) => Err(e.clone().or_at(span)),
            None => Err(err(
                TypeErrorKind::UnresolvedSchema,
                format!("no schema for @{kind}.{channel}"),
            )
            .at(span)),
        }
    }

    fn out_scope(schema: &FunctionDef) -> Scope {
        let mut scope = Scope::new();
        for arg in schema.out_params() {
            scope = scope.bind(&arg.name, canonical_type(&arg.ty));
        }
        scope
    }

    fn check_table(&mut self, table: &Table, param_scope: &Scope) -> Result<TableProps, Error> {
        match &table.kind {
            TableKind::Invocation(inv) => {
                let schema = self.check_invocation(inv, FunctionType::Query, param_scope)?;
                Ok(TableProps {
                    scope: Self::out_scope(&schema),
                    is_list: schema.is_list,
                    is_monitorable: schema.is_monitorable,
                })
            }
            TableKind::Filter { table, filter } => {
                let props = self.check_table(table, param_scope)?;
                // filters range over output parameters and the function's
                // own inputs
                let mut filter_scope = props.scope.clone();
                if let Some(schema) = table_schema(table) {
                    for arg in schema.in_params() {
                        if !filter_scope.contains(&arg.name) {
                            filter_scope = filter_scope.bind(&arg.name, canonical_type(&arg.ty));
                        }
                    }
                }
                self.check_filter(filter, &filter_scope, param_scope)?;
                Ok(props)
            }
            TableKind::Projection { table, args } => {
                let props = self.check_table(table, param_scope)?;
                // an empty projection list means "all output params"
                if args.is_empty() {
                    return Ok(props);
                }
                let mut scope = Scope::new();
                for name in args {
                    let ty = props.scope.lookup(name).ok_or_else(|| {
                        err(
                            TypeErrorKind::UnknownParameter,
                            format!("cannot project on `{name}`, not in scope"),
                        )
                        .at(table.span)
                    })?;
                    scope = scope.bind(name, ty.clone());
                }
                Ok(TableProps { scope, ..props })
            }
            TableKind::Compute {
                table,
                expression,
                alias,
            } => {
                let props = self.check_table(table, param_scope)?;
                let ty = self.value_type(expression, &props.scope)?;
                let name = alias
                    .clone()
                    .unwrap_or_else(|| crate::codegen::write_value(expression));
                Ok(TableProps {
                    scope: props.scope.bind(name, ty),
                    ..props
                })
            }
            TableKind::Aggregation {
                table,
                op,
                field,
                alias,
            } => {
                let props = self.check_table(table, param_scope)?;
                if !props.is_list {
                    return Err(err(
                        TypeErrorKind::NotList,
                        "aggregation requires a list table",
                    )
                    .at(table.span));
                }
                let (name, ty) = match field {
                    None => (alias.clone().unwrap_or_else(|| "count".to_string()), Type::Number),
                    Some(field) => {
                        let field_ty = props.scope.lookup(field).ok_or_else(|| {
                            err(
                                TypeErrorKind::UnknownParameter,
                                format!("cannot aggregate on `{field}`, not in scope"),
                            )
                            .at(table.span)
                        })?;
                        if !matches!(
                            field_ty,
                            Type::Number | Type::Currency | Type::Measure(_)
                        ) {
                            return Err(err(
                                TypeErrorKind::TypeMismatch,
                                format!("invalid aggregation over {field_ty}"),
                            )
                            .at(table.span));
                        }
                        let result_ty = match op {
                            AggregationOp::Count => Type::Number,
                            _ => field_ty.clone(),
                        };
                        (alias.clone().unwrap_or_else(|| field.clone()), result_ty)
                    }
                };
                Ok(TableProps::singleton(Scope::new().bind(name, ty)))
            }
            TableKind::Sort {
                table,
                field,
                direction: _,
            } => {
                let props = self.require_list(table, param_scope)?;
                let field_ty = props.scope.lookup(field).ok_or_else(|| {
                    err(
                        TypeErrorKind::UnknownParameter,
                        format!("cannot sort on `{field}`, not in scope"),
                    )
                    .at(table.span)
                })?;
                if !matches!(
                    field_ty,
                    Type::Number
                        | Type::Currency
                        | Type::Measure(_)
                        | Type::String
                        | Type::HintedString(_)
                        | Type::Date
                        | Type::Time
                ) {
                    return Err(err(
                        TypeErrorKind::TypeMismatch,
                        format!("cannot sort on values of type {field_ty}"),
                    )
                    .at(table.span));
                }
                Ok(props)
            }
            TableKind::Index { table, indices } => {
                let props = self.require_list(table, param_scope)?;
                for index in indices {
                    self.expect_value(index, &Type::Number, param_scope)?;
                }
                Ok(TableProps {
                    is_list: indices.len() > 1,
                    ..props
                })
            }
            TableKind::Slice { table, base, limit } => {
                let props = self.require_list(table, param_scope)?;
                self.expect_value(base, &Type::Number, param_scope)?;
                self.expect_value(limit, &Type::Number, param_scope)?;
                Ok(props)
            }
            TableKind::Join {
                lhs,
                rhs,
                in_params,
            } => {
                let left = self.check_table(lhs, param_scope)?;

                let provided = std::mem::replace(
                    &mut self.join_provided,
                    in_params.iter().map(|p| p.name.clone()).collect(),
                );
                let right = self.check_table(rhs, &left.scope);
                self.join_provided = provided;
                let right = right?;

                // join in_params pass values from the left scope into the
                // right function's inputs
                self.check_join_params(in_params, &left.scope, table_schema(rhs))?;

                let mut scope = left.scope.clone();
                for (name, ty) in right.scope.iter() {
                    if let Some(existing) = left.scope.lookup(name) {
                        match Type::common(existing, ty) {
                            Some(merged) => scope = scope.bind(name, merged),
                            None => {
                                return Err(err(
                                    TypeErrorKind::AmbiguousJoin,
                                    format!(
                                        "parameter `{name}` has incompatible types {existing} and {ty} across the join"
                                    ),
                                )
                                .at(table.span));
                            }
                        }
                    } else {
                        scope = scope.bind(name, ty.clone());
                    }
                }
                Ok(TableProps {
                    scope,
                    is_list: left.is_list || right.is_list,
                    is_monitorable: left.is_monitorable && right.is_monitorable,
                })
            }
            TableKind::Alias { table, name } => {
                let props = self.check_table(table, param_scope)?;
                let mut scope = props.scope.clone();
                let bindings: Vec<(String, Type)> = props
                    .scope
                    .iter()
                    .map(|(n, t)| (format!("{name}.{n}"), t.clone()))
                    .collect();
                for (n, t) in bindings {
                    scope = scope.bind(n, t);
                }
                Ok(TableProps { scope, ..props })
            }
            TableKind::History {
                kind,
                channel,
                index,
            } => {
                let schema = self.schema_of(kind, channel, FunctionType::Query, table.span)?;
                if let Some(index) = index {
                    self.expect_value(index, &Type::Number, param_scope)?;
                }
                Ok(TableProps {
                    scope: Self::out_scope(&schema),
                    is_list: false,
                    is_monitorable: false,
                })
            }
            TableKind::VarRef { name, in_params } => {
                let info = self.declarations.get(name).cloned().ok_or_else(|| {
                    err(
                        TypeErrorKind::UnresolvedVariable,
                        format!("`{name}` is not declared"),
                    )
                    .at(table.span)
                })?;
                for param in in_params {
                    let formal = info.args.get(&param.name).ok_or_else(|| {
                        err(
                            TypeErrorKind::UnknownParameter,
                            format!("`{}` is not a parameter of `{name}`", param.name),
                        )
                        .at(param.span)
                    })?;
                    self.expect_value(&param.value, formal, param_scope)?;
                }
                Ok(info.props)
            }
        }
    }

    fn check_join_params(
        &mut self,
        in_params: &[InputParam],
        left_scope: &Scope,
        rhs_schema: Option<&Arc<FunctionDef>>,
    ) -> Result<(), Error> {
        for param in in_params {
            let value_ty = self.value_type(&param.value, left_scope)?;
            if let Some(schema) = rhs_schema {
                let arg = schema.arg(&param.name).ok_or_else(|| {
                    err(
                        TypeErrorKind::UnknownParameter,
                        format!("`{}` is not a parameter of {}", param.name, schema.name),
                    )
                    .at(param.span)
                })?;
                if !arg.is_input() {
                    return Err(err(
                        TypeErrorKind::UnknownParameter,
                        format!("`{}` is an output parameter", param.name),
                    )
                    .at(param.span));
                }
                if !value_ty.is_assignable(&canonical_type(&arg.ty)) {
                    return Err(err(
                        TypeErrorKind::TypeMismatch,
                        format!(
                            "invalid type {value_ty} for parameter `{}`, expected {}",
                            param.name, arg.ty
                        ),
                    )
                    .at(param.span));
                }
            }
        }
        Ok(())
    }

    fn require_list(&mut self, table: &Table, param_scope: &Scope) -> Result<TableProps, Error> {
        let props = self.check_table(table, param_scope)?;
        if !props.is_list {
            return Err(err(
                TypeErrorKind::NotList,
                "this operation requires a list table",
            )
            .at(table.span));
        }
        Ok(props)
    }

    fn check_stream(&mut self, stream: &Stream) -> Result<TableProps, Error> {
        match &stream.kind {
            StreamKind::Timer {
                base,
                interval,
                frequency,
            } => {
                self.expect_value(base, &Type::Date, &Scope::new())?;
                self.expect_value(interval, &Type::Measure("ms".to_string()), &Scope::new())?;
                if let Some(frequency) = frequency {
                    self.expect_value(frequency, &Type::Number, &Scope::new())?;
                }
                Ok(TableProps::singleton(Scope::new()))
            }
            StreamKind::AtTimer {
                times,
                expiration_date,
            } => {
                for time in times {
                    self.expect_value(time, &Type::Time, &Scope::new())?;
                }
                if let Some(expiration_date) = expiration_date {
                    self.expect_value(expiration_date, &Type::Date, &Scope::new())?;
                }
                Ok(TableProps::singleton(Scope::new()))
            }
            StreamKind::Monitor { table, args } => {
                let props = self.check_table(table, &Scope::new())?;
                if !props.is_monitorable {
                    return Err(err(
                        TypeErrorKind::NotMonitorable,
                        "this table cannot be monitored",
                    )
                    .at(table.span));
                }
                if let Some(args) = args {
                    for name in args {
                        if !props.scope.contains(name) {
                            return Err(err(
                                TypeErrorKind::UnknownParameter,
                                format!("cannot monitor on `{name}`, not in scope"),
                            )
                            .at(table.span));
                        }
                    }
                }
                Ok(props)
            }
            StreamKind::EdgeFilter {
                stream: inner,
                filter,
            } => {
                let props = self.check_stream(inner)?;
                self.check_filter(filter, &props.scope, &Scope::new())?;
                Ok(props)
            }
            StreamKind::EdgeNew { stream: inner } => self.check_stream(inner),
            StreamKind::Filter {
                stream: inner,
                filter,
            } => {
                let props = self.check_stream(inner)?;
                self.check_filter(filter, &props.scope, &Scope::new())?;
                Ok(props)
            }
            StreamKind::Projection {
                stream: inner,
                args,
            } => {
                let props = self.check_stream(inner)?;
                if args.is_empty() {
                    return Ok(props);
                }
                let mut scope = Scope::new();
                for name in args {
                    let ty = props.scope.lookup(name).ok_or_else(|| {
                        err(
                            TypeErrorKind::UnknownParameter,
                            format!("cannot project on `{name}`, not in scope"),
                        )
                        .at(inner.span)
                    })?;
                    scope = scope.bind(name, ty.clone());
                }
                Ok(TableProps { scope, ..props })
            }
            StreamKind::Compute {
                stream: inner,
                expression,
                alias,
            } => {
                let props = self.check_stream(inner)?;
                let ty = self.value_type(expression, &props.scope)?;
                let name = alias
                    .clone()
                    .unwrap_or_else(|| crate::codegen::write_value(expression));
                Ok(TableProps {
                    scope: props.scope.bind(name, ty),
                    ..props
                })
            }
            StreamKind::Join {
                stream: inner,
                table,
                in_params,
            } => {
                let left = self.check_stream(inner)?;

                let provided = std::mem::replace(
                    &mut self.join_provided,
                    in_params.iter().map(|p| p.name.clone()).collect(),
                );
                let right = self.check_table(table, &left.scope);
                self.join_provided = provided;
                let right = right?;

                self.check_join_params(in_params, &left.scope, table_schema(table))?;
                let mut scope = left.scope.clone();
                for (name, ty) in right.scope.iter() {
                    if let Some(existing) = left.scope.lookup(name) {
                        match Type::common(existing, ty) {
                            Some(merged) => scope = scope.bind(name, merged),
                            None => {
                                return Err(err(
                                    TypeErrorKind::AmbiguousJoin,
                                    format!(
                                        "parameter `{name}` has incompatible types {existing} and {ty} across the join"
                                    ),
                                )
                                .at(stream.span));
                            }
                        }
                    } else {
                        scope = scope.bind(name, ty.clone());
                    }
                }
                Ok(TableProps {
                    scope,
                    ..left
                })
            }
            StreamKind::Alias {
                stream: inner,
                name,
            } => {
                let props = self.check_stream(inner)?;
                let mut scope = props.scope.clone();
                let bindings: Vec<(String, Type)> = props
                    .scope
                    .iter()
                    .map(|(n, t)| (format!("{name}.{n}"), t.clone()))
                    .collect();
                for (n, t) in bindings {
                    scope = scope.bind(n, t);
                }
                Ok(TableProps { scope, ..props })
            }
            StreamKind::VarRef { name, in_params } => {
                let info = self.declarations.get(name).cloned().ok_or_else(|| {
                    err(
                        TypeErrorKind::UnresolvedVariable,
                        format!("`{name}` is not declared"),
                    )
                    .at(stream.span)
                })?;
                for param in in_params {
                    let formal = info.args.get(&param.name).ok_or_else(|| {
                        err(
                            TypeErrorKind::UnknownParameter,
                            format!("`{}` is not a parameter of `{name}`", param.name),
                        )
                        .at(param.span)
                    })?;
                    self.expect_value(&param.value, formal, &Scope::new())?;
                }
                Ok(info.props)
            }
        }
    }

    fn check_filter(
        &mut self,
        filter: &BooleanExpression,
        scope: &Scope,
        outer_scope: &Scope,
    ) -> Result<(), Error> {
        match filter {
            BooleanExpression::True | BooleanExpression::False => Ok(()),
            BooleanExpression::And(operands) | BooleanExpression::Or(operands) => {
                for operand in operands {
                    self.check_filter(operand, scope, outer_scope)?;
                }
                Ok(())
            }
            BooleanExpression::Not(inner) => self.check_filter(inner, scope, outer_scope),
            BooleanExpression::Atom(atom) => {
                let param_ty = scope.lookup(&atom.name).cloned().ok_or_else(|| {
                    err(
                        TypeErrorKind::UnknownParameter,
                        format!("cannot filter on `{}`, not in scope", atom.name),
                    )
                    .at(atom.span)
                })?;
                let value_ty = self.value_type(&atom.value, scope)?;
                if !operators::check_filter_op(&param_ty, atom.operator, &value_ty) {
                    return Err(err(
                        TypeErrorKind::InvalidOperator,
                        format!(
                            "operator {} is not applicable to {param_ty} and {value_ty}",
                            atom.operator
                        ),
                    )
                    .at(atom.span));
                }
                Ok(())
            }
            BooleanExpression::Compute(compute) => {
                let lhs_ty = self.value_type(&compute.lhs, scope)?;
                let rhs_ty = self.value_type(&compute.rhs, scope)?;
                if !operators::check_filter_op(&lhs_ty, compute.operator, &rhs_ty) {
                    return Err(err(
                        TypeErrorKind::InvalidOperator,
                        format!(
                            "operator {} is not applicable to {lhs_ty} and {rhs_ty}",
                            compute.operator
                        ),
                    )
                    .at(compute.span));
                }
                Ok(())
            }
            BooleanExpression::DontCare { name } => {
                if scope.contains(name) {
                    Ok(())
                } else {
                    Err(err(
                        TypeErrorKind::UnknownParameter,
                        format!("cannot filter on `{name}`, not in scope"),
                    ))
                }
            }
            BooleanExpression::External(external) => {
                // the subquery's in_params may reference the outer scope
                let merged = merge_scopes(outer_scope, scope);
                let schema =
                    self.check_invocation(&external.invocation, FunctionType::Query, &merged)?;
                let mut sub_scope = Self::out_scope(&schema);
                for arg in schema.in_params() {
                    sub_scope = sub_scope.bind(&arg.name, canonical_type(&arg.ty));
                }
                self.check_filter(&external.filter, &sub_scope, scope)
            }
        }
    }

    fn expect_value(
        &mut self,
        value: &Value,
        expected: &Type,
        scope: &Scope,
    ) -> Result<Type, Error> {
        let ty = self.value_type(value, scope)?;
        if !ty.is_assignable(expected) {
            return Err(err(
                TypeErrorKind::TypeMismatch,
                format!("invalid type {ty}, expected {expected}"),
            )
            .at(value.span));
        }
        Ok(ty)
    }

    fn value_type(&mut self, value: &Value, scope: &Scope) -> Result<Type, Error> {
        match &value.kind {
            ValueKind::VarRef(name) => {
                if let Some(ty) = scope.lookup(name) {
                    return Ok(ty.clone());
                }
                if let Some(ty) = const_placeholder_type(name) {
                    return Ok(ty);
                }
                Err(err(
                    TypeErrorKind::UnresolvedVariable,
                    format!("`{name}` is not in scope"),
                )
                .at(value.span))
            }
            ValueKind::Computation { op, operands } => {
                let operand_types = operands
                    .iter()
                    .map(|o| self.value_type(o, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                operators::scalar_result_type(*op, &operand_types).ok_or_else(|| {
                    err(
                        TypeErrorKind::InvalidOperator,
                        format!("invalid operands for {op}"),
                    )
                    .at(value.span)
                })
            }
            ValueKind::ArrayField { field, value: inner } => {
                let inner_ty = self.value_type(inner, scope)?;
                match inner_ty {
                    Type::Array(elem) => match elem.as_ref() {
                        Type::Compound(fields) => fields
                            .iter()
                            .find(|f| &f.name == field)
                            .map(|f| Type::Array(Box::new(f.ty.clone())))
                            .ok_or_else(|| {
                                err(
                                    TypeErrorKind::UnknownParameter,
                                    format!("no field `{field}` in compound"),
                                )
                                .at(value.span)
                            }),
                        Type::Any => Ok(Type::Array(Box::new(Type::Any))),
                        other => Err(err(
                            TypeErrorKind::TypeMismatch,
                            format!("cannot project field `{field}` out of {other}"),
                        )
                        .at(value.span)),
                    },
                    Type::Any => Ok(Type::Any),
                    other => Err(err(
                        TypeErrorKind::TypeMismatch,
                        format!("cannot project field `{field}` out of {other}"),
                    )
                    .at(value.span)),
                }
            }
            ValueKind::Filter {
                value: inner,
                filter,
            } => {
                let inner_ty = self.value_type(inner, scope)?;
                let elem_scope = match &inner_ty {
                    Type::Array(elem) => match elem.as_ref() {
                        Type::Compound(fields) => {
                            let mut s = Scope::new();
                            for f in fields {
                                s = s.bind(&f.name, f.ty.clone());
                            }
                            s
                        }
                        elem => Scope::new().bind("value", elem.clone()),
                    },
                    _ => {
                        return Err(err(
                            TypeErrorKind::TypeMismatch,
                            format!("cannot filter a value of type {inner_ty}"),
                        )
                        .at(value.span))
                    }
                };
                self.check_filter(filter, &elem_scope, scope)?;
                Ok(inner_ty)
            }
            ValueKind::Array(elems) => {
                let mut elem_ty = Type::Any;
                for elem in elems {
                    let ty = self.value_type(elem, scope)?;
                    elem_ty = Type::common(&elem_ty, &ty).ok_or_else(|| {
                        err(
                            TypeErrorKind::TypeMismatch,
                            "array elements have incompatible types",
                        )
                        .at(elem.span)
                    })?;
                }
                Ok(Type::Array(Box::new(elem_ty)))
            }
            _ => Ok(canonical_type(&value.ty())),
        }
    }

    fn check_type_resolved(&mut self, ty: &Type) -> Result<(), Error> {
        match ty {
            Type::Unknown(name) => Err(err(
                TypeErrorKind::TypeMismatch,
                format!("unknown type `{name}`"),
            )),
            Type::Array(elem) => self.check_type_resolved(elem),
            Type::Compound(fields) => {
                for field in fields {
                    self.check_type_resolved(&field.ty)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_class(&mut self, class: &ClassDef) {
        for def in class.queries.values().chain(class.actions.values()) {
            for arg in &def.args {
                if let Err(e) = self.check_type_resolved(&arg.ty) {
                    self.errors.push(e.or_at(class.span));
                }
            }
        }
    }

    fn check_dataset(&mut self, dataset: &Dataset) {
        for example in &dataset.examples {
            let mut arg_scope = Scope::new();
            for (name, ty) in &example.args {
                arg_scope = arg_scope.bind(name, ty.clone());
            }
            let result = match &example.value {
                ExampleValue::Query(table) => {
                    self.check_table(table, &arg_scope).map(|_| ())
                }
                ExampleValue::Stream(stream) => self.check_stream(stream).map(|_| ()),
                ExampleValue::Action(inv) => self
                    .check_invocation(inv, FunctionType::Action, &arg_scope)
                    .map(|_| ()),
                ExampleValue::Program(program) => {
                    self.check_program(program);
                    Ok(())
                }
            };
            if let Err(e) = result {
                self.errors.push(e);
            }
        }
    }

    fn check_permission_rule(&mut self, rule: &PermissionRule) {
        // the principal is checked with the magic `__pi` contact in scope
        let principal_scope = Scope::new()
            .bind("__pi", Type::Entity("tt:contact".to_string()))
            .bind("source", Type::Entity("tt:contact".to_string()));
        if let Err(e) = self.check_filter(&rule.principal, &principal_scope, &Scope::new()) {
            self.errors.push(e.or_at(rule.span));
        }

        for (pf, function_type) in [
            (&rule.query, FunctionType::Query),
            (&rule.action, FunctionType::Action),
        ] {
            if let PermissionFunction::Specified {
                kind,
                channel,
                filter,
                ..
            } = pf
            {
                let result = self
                    .schema_of(kind, channel, function_type, rule.span)
                    .and_then(|schema| {
                        let mut scope = Self::out_scope(&schema);
                        for arg in schema.in_params() {
                            scope = scope.bind(&arg.name, canonical_type(&arg.ty));
                        }
                        self.check_filter(filter, &scope, &principal_scope)
                    });
                if let Err(e) = result {
                    self.errors.push(e.or_at(rule.span));
                }
            }
        }
    }

    fn check_dialogue(&mut self, state: &DialogueState) {
        for item in &state.history {
            if let Err(e) = self.check_statement(&item.statement) {
                self.errors.push(e.or_at(item.statement.span));
            }
            if let Some(results) = &item.results {
                for result in &results.results {
                    for (name, value) in &result.value {
                        // results describe completed executions; holes are
                        // not admitted here
                        if value.is_undefined() {
                            self.errors.push(
                                err(
                                    TypeErrorKind::TypeMismatch,
                                    format!("result value `{name}` cannot be undefined"),
                                )
                                .or_at(value.span),
                            );
                        }
                    }
                }
                if let Err(e) = self.expect_value(&results.count, &Type::Number, &Scope::new()) {
                    self.errors.push(e);
                }
            }
        }
    }
}

/// The schema of the innermost invocation a table wraps, when resolved.
fn table_schema(table: &Table) -> Option<&Arc<FunctionDef>> {
    match &table.kind {
        TableKind::Invocation(inv) => inv.schema.as_ref(),
        TableKind::Filter { table, .. }
        | TableKind::Projection { table, .. }
        | TableKind::Compute { table, .. }
        | TableKind::Sort { table, .. }
        | TableKind::Index { table, .. }
        | TableKind::Slice { table, .. }
        | TableKind::Alias { table, .. } => table_schema(table),
        _ => None,
    }
}

/// Measures are compared by canonical unit everywhere in the checker.
fn canonical_type(ty: &Type) -> Type {
    match ty {
        Type::Measure(unit) => Type::Measure(
            units::base_unit(unit)
                .map(|u| u.to_string())
                .unwrap_or_else(|| unit.clone()),
        ),
        Type::Array(elem) => Type::Array(Box::new(canonical_type(elem))),
        other => other.clone(),
    }
}

/// `__const_NUMBER_0`-style names resolve in the magic `__const` scope with
/// the type implied by the embedded entity token.
fn const_placeholder_type(name: &str) -> Option<Type> {
    let token = name.strip_prefix("__const_")?;
    let ty = if token.starts_with("NUMBER_") {
        Type::Number
    } else if token.starts_with("QUOTED_STRING_") {
        Type::String
    } else if token.starts_with("CURRENCY_") {
        Type::Currency
    } else if token.starts_with("DATE_") {
        Type::Date
    } else if token.starts_with("TIME_") {
        Type::Time
    } else if token.starts_with("LOCATION_") {
        Type::Location
    } else if let Some(rest) = token.strip_prefix("MEASURE_") {
        let unit = rest.split('_').next().unwrap_or("ms");
        Type::Measure(unit.to_string())
    } else if let Some(rest) = token.strip_prefix("GENERIC_ENTITY_") {
        let kind = rest.rsplit_once('_').map(|(k, _)| k).unwrap_or(rest);
        Type::Entity(kind.to_string())
    } else {
        return None;
    };
    Some(ty)
}

fn merge_scopes(outer: &Scope, inner: &Scope) -> Scope {
    let mut merged = outer.clone();
    let bindings: Vec<(String, Type)> = inner
        .iter()
        .map(|(n, t)| (n.to_string(), t.clone()))
        .collect();
    for (name, ty) in bindings {
        merged = merged.bind(name, ty);
    }
    merged
}
