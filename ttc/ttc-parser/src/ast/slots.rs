//! The two iteration protocols over a program: primitives (for schema
//! resolution and entity extraction) and slots (for slot-filling).
//!
//! Both are exposed as restartable sequences; the walk itself is eager, the
//! boundary is an iterator.

use std::collections::HashMap;

use serde::Serialize;

use super::*;
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
pub enum PrimitiveKind {
    #[strum(serialize = "query")]
    Query,
    #[strum(serialize = "action")]
    Action,
    /// an `External` subquery inside a filter
    #[strum(serialize = "filter")]
    Filter,
}

/// Visit every `Invocation` (including `External` subqueries) in evaluation
/// order.
pub fn iterate_primitives(input: &Input) -> impl Iterator<Item = (PrimitiveKind, &Invocation)> {
    let mut walker = PrimitiveWalker::default();
    walker.walk_input(input);
    walker.out.into_iter()
}

#[derive(Default)]
struct PrimitiveWalker<'a> {
    out: Vec<(PrimitiveKind, &'a Invocation)>,
}

impl<'a> PrimitiveWalker<'a> {
    fn walk_input(&mut self, input: &'a Input) {
        match input {
            Input::Program(p) => self.walk_program(p),
            Input::PermissionRule(rule) => {
                self.walk_filter(&rule.principal);
                for pf in [&rule.query, &rule.action] {
                    if let PermissionFunction::Specified { filter, .. } = pf {
                        self.walk_filter(filter);
                    }
                }
            }
            Input::Library(lib) => {
                for dataset in &lib.datasets {
                    self.walk_dataset(dataset);
                }
            }
            Input::Dataset(d) => self.walk_dataset(d),
            Input::Bookkeeping(_) | Input::ControlCommand(_) => {}
            Input::DialogueState(state) => {
                for item in &state.history {
                    self.walk_statement(&item.statement);
                }
            }
        }
    }

    fn walk_program(&mut self, program: &'a Program) {
        for stmt in &program.statements {
            self.walk_statement(stmt);
        }
    }

    fn walk_dataset(&mut self, dataset: &'a Dataset) {
        for ex in &dataset.examples {
            match &ex.value {
                ExampleValue::Query(t) => self.walk_table(t),
                ExampleValue::Stream(s) => self.walk_stream(s),
                ExampleValue::Action(a) => self.out.push((PrimitiveKind::Action, a)),
                ExampleValue::Program(p) => self.walk_program(p),
            }
        }
    }

    fn walk_statement(&mut self, stmt: &'a Statement) {
        match &stmt.kind {
            StatementKind::Rule { stream, actions } => {
                self.walk_stream(stream);
                self.walk_actions(actions);
            }
            StatementKind::Command { table, actions } => {
                if let Some(table) = table {
                    self.walk_table(table);
                }
                self.walk_actions(actions);
            }
            StatementKind::Assignment { value, .. } => self.walk_table(value),
            StatementKind::Declaration(decl) => match &decl.value {
                DeclarationValue::Table(t) => self.walk_table(t),
                DeclarationValue::Stream(s) => self.walk_stream(s),
                DeclarationValue::Action(a) => self.out.push((PrimitiveKind::Action, a)),
            },
            StatementKind::OnInputChoice(choice) => {
                if let Some(table) = &choice.table {
                    self.walk_table(table);
                }
                self.walk_actions(&choice.actions);
            }
        }
    }

    fn walk_actions(&mut self, actions: &'a [Action]) {
        for action in actions {
            if let Action::Invocation(inv) = action {
                self.out.push((PrimitiveKind::Action, inv));
            }
        }
    }

    fn walk_table(&mut self, table: &'a Table) {
        match &table.kind {
            TableKind::Invocation(inv) => {
                self.out.push((PrimitiveKind::Query, inv));
                self.walk_in_params(&inv.in_params);
            }
            TableKind::Filter { table, filter } => {
                self.walk_table(table);
                self.walk_filter(filter);
            }
            TableKind::Projection { table, .. }
            | TableKind::Compute { table, .. }
            | TableKind::Aggregation { table, .. }
            | TableKind::Sort { table, .. }
            | TableKind::Index { table, .. }
            | TableKind::Slice { table, .. }
            | TableKind::Alias { table, .. } => self.walk_table(table),
            TableKind::Join { lhs, rhs, .. } => {
                self.walk_table(lhs);
                self.walk_table(rhs);
            }
            TableKind::History { .. } | TableKind::VarRef { .. } => {}
        }
    }

    fn walk_stream(&mut self, stream: &'a Stream) {
        match &stream.kind {
            StreamKind::Timer { .. } | StreamKind::AtTimer { .. } | StreamKind::VarRef { .. } => {}
            StreamKind::Monitor { table, .. } => self.walk_table(table),
            StreamKind::EdgeFilter { stream, filter } => {
                self.walk_stream(stream);
                self.walk_filter(filter);
            }
            StreamKind::EdgeNew { stream } | StreamKind::Alias { stream, .. } => {
                self.walk_stream(stream)
            }
            StreamKind::Filter { stream, filter } => {
                self.walk_stream(stream);
                self.walk_filter(filter);
            }
            StreamKind::Projection { stream, .. } | StreamKind::Compute { stream, .. } => {
                self.walk_stream(stream)
            }
            StreamKind::Join { stream, table, .. } => {
                self.walk_stream(stream);
                self.walk_table(table);
            }
        }
    }

    fn walk_in_params(&mut self, params: &'a [InputParam]) {
        for param in params {
            self.walk_value(&param.value);
        }
    }

    fn walk_value(&mut self, value: &'a Value) {
        match &value.kind {
            ValueKind::Filter { value, filter } => {
                self.walk_value(value);
                self.walk_filter(filter);
            }
            ValueKind::Array(elems) => {
                for e in elems {
                    self.walk_value(e);
                }
            }
            ValueKind::Computation { operands, .. } => {
                for o in operands {
                    self.walk_value(o);
                }
            }
            ValueKind::ArrayField { value, .. } => self.walk_value(value),
            _ => {}
        }
    }

    fn walk_filter(&mut self, filter: &'a BooleanExpression) {
        match filter {
            BooleanExpression::And(ops) | BooleanExpression::Or(ops) => {
                for op in ops {
                    self.walk_filter(op);
                }
            }
            BooleanExpression::Not(inner) => self.walk_filter(inner),
            BooleanExpression::Atom(atom) => self.walk_value(&atom.value),
            BooleanExpression::Compute(c) => {
                self.walk_value(&c.lhs);
                self.walk_value(&c.rhs);
            }
            BooleanExpression::External(e) => {
                self.out.push((PrimitiveKind::Filter, &e.invocation));
                self.walk_in_params(&e.invocation.in_params);
                self.walk_filter(&e.filter);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotStatus {
    Empty,
    Filled,
    Invalid,
}

/// One fillable position in a program: a filter atom operand, an input
/// parameter, a timer value, and so on.
#[derive(Debug, Clone)]
pub struct Slot<'a> {
    /// the invocation this slot belongs to, or None for outer scope
    pub primitive: Option<&'a Invocation>,
    pub name: String,
    pub value: &'a Value,
    /// the declared type of this slot, when the owning schema is resolved
    pub ty: Option<Type>,
    /// names of already-resolved variables visible at this position
    pub scope: HashMap<String, Type>,
}

impl Slot<'_> {
    pub fn status(&self) -> SlotStatus {
        if self.value.is_undefined() {
            return SlotStatus::Empty;
        }
        match &self.ty {
            Some(ty) if !self.value.ty().is_assignable(ty) => SlotStatus::Invalid,
            _ => SlotStatus::Filled,
        }
    }
}

/// Visit every slot that may need slot-filling, in evaluation order. Every
/// slot-fillable `Undefined` in the tree is yielded exactly once.
pub fn iterate_slots(input: &Input) -> impl Iterator<Item = Slot<'_>> {
    let mut walker = SlotWalker::default();
    walker.walk_input(input);
    walker.out.into_iter()
}

#[derive(Default)]
struct SlotWalker<'a> {
    out: Vec<Slot<'a>>,
    scope: HashMap<String, Type>,
}

impl<'a> SlotWalker<'a> {
    fn walk_input(&mut self, input: &'a Input) {
        match input {
            Input::Program(p) => {
                if let Some(principal) = &p.principal {
                    self.push_outer("__principal", principal);
                }
                for stmt in &p.statements {
                    self.walk_statement(stmt);
                }
            }
            Input::PermissionRule(rule) => {
                self.walk_filter(&rule.principal, None);
                for pf in [&rule.query, &rule.action] {
                    if let PermissionFunction::Specified { filter, .. } = pf {
                        self.walk_filter(filter, None);
                    }
                }
            }
            Input::Bookkeeping(b) => {
                if let BookkeepingIntent::Answer(v) = &b.intent {
                    self.push_outer("__answer", v);
                }
            }
            Input::DialogueState(state) => {
                for item in &state.history {
                    self.walk_statement(&item.statement);
                }
            }
            Input::Library(_) | Input::Dataset(_) | Input::ControlCommand(_) => {}
        }
    }

    fn push_outer(&mut self, name: &str, value: &'a Value) {
        self.out.push(Slot {
            primitive: None,
            name: name.to_string(),
            value,
            ty: None,
            scope: self.scope.clone(),
        });
    }

    fn walk_statement(&mut self, stmt: &'a Statement) {
        self.scope.clear();
        match &stmt.kind {
            StatementKind::Rule { stream, actions } => {
                self.walk_stream(stream);
                for action in actions {
                    if let Action::Invocation(inv) = action {
                        self.walk_invocation(inv);
                    }
                }
            }
            StatementKind::Command { table, actions } => {
                if let Some(table) = table {
                    self.walk_table(table);
                }
                for action in actions {
                    if let Action::Invocation(inv) = action {
                        self.walk_invocation(inv);
                    }
                }
            }
            StatementKind::Assignment { value, .. } => self.walk_table(value),
            StatementKind::Declaration(decl) => match &decl.value {
                DeclarationValue::Table(t) => self.walk_table(t),
                DeclarationValue::Stream(s) => self.walk_stream(s),
                DeclarationValue::Action(a) => self.walk_invocation(a),
            },
            StatementKind::OnInputChoice(choice) => {
                if let Some(table) = &choice.table {
                    self.walk_table(table);
                }
                for action in &choice.actions {
                    if let Action::Invocation(inv) = action {
                        self.walk_invocation(inv);
                    }
                }
            }
        }
    }

    fn walk_table(&mut self, table: &'a Table) {
        match &table.kind {
            TableKind::Invocation(inv) => self.walk_invocation(inv),
            TableKind::Filter { table, filter } => {
                self.walk_table(table);
                let primitive = innermost_invocation(table);
                self.walk_filter(filter, primitive);
            }
            TableKind::Projection { table, .. }
            | TableKind::Compute { table, .. }
            | TableKind::Aggregation { table, .. }
            | TableKind::Sort { table, .. }
            | TableKind::Alias { table, .. } => self.walk_table(table),
            TableKind::Index { table, indices } => {
                self.walk_table(table);
                for (i, index) in indices.iter().enumerate() {
                    self.push_outer(&format!("__index_{i}"), index);
                }
            }
            TableKind::Slice { table, base, limit } => {
                self.walk_table(table);
                self.push_outer("__base", base);
                self.push_outer("__limit", limit);
            }
            TableKind::Join {
                lhs,
                rhs,
                in_params,
            } => {
                self.walk_table(lhs);
                self.walk_table(rhs);
                let primitive = innermost_invocation(rhs);
                for param in in_params {
                    self.push_param(primitive, param);
                }
            }
            TableKind::History { index, .. } => {
                if let Some(index) = index {
                    self.push_outer("__index", index);
                }
            }
            TableKind::VarRef { in_params, .. } => {
                for param in in_params {
                    self.push_param(None, param);
                }
            }
        }
    }

    fn walk_stream(&mut self, stream: &'a Stream) {
        match &stream.kind {
            StreamKind::Timer {
                base,
                interval,
                frequency,
            } => {
                self.push_outer("base", base);
                self.push_outer("interval", interval);
                if let Some(frequency) = frequency {
                    self.push_outer("frequency", frequency);
                }
            }
            StreamKind::AtTimer {
                times,
                expiration_date,
            } => {
                for (i, time) in times.iter().enumerate() {
                    self.push_outer(&format!("time_{i}"), time);
                }
                if let Some(expiration_date) = expiration_date {
                    self.push_outer("expiration_date", expiration_date);
                }
            }
            StreamKind::Monitor { table, .. } => self.walk_table(table),
            StreamKind::EdgeFilter { stream, filter } => {
                self.walk_stream(stream);
                self.walk_filter(filter, None);
            }
            StreamKind::EdgeNew { stream } | StreamKind::Alias { stream, .. } => {
                self.walk_stream(stream)
            }
            StreamKind::Filter { stream, filter } => {
                self.walk_stream(stream);
                self.walk_filter(filter, None);
            }
            StreamKind::Projection { stream, .. } | StreamKind::Compute { stream, .. } => {
                self.walk_stream(stream)
            }
            StreamKind::Join {
                stream,
                table,
                in_params,
            } => {
                self.walk_stream(stream);
                self.walk_table(table);
                let primitive = innermost_invocation(table);
                for param in in_params {
                    self.push_param(primitive, param);
                }
            }
            StreamKind::VarRef { in_params, .. } => {
                for param in in_params {
                    self.push_param(None, param);
                }
            }
        }
    }

    fn walk_invocation(&mut self, inv: &'a Invocation) {
        for attr in &inv.selector.attributes {
            self.out.push(Slot {
                primitive: Some(inv),
                name: attr.name.clone(),
                value: &attr.value,
                ty: None,
                scope: self.scope.clone(),
            });
        }
        for param in &inv.in_params {
            self.push_param(Some(inv), param);
        }
        // what this invocation outputs becomes visible downstream
        if let Some(schema) = &inv.schema {
            for arg in schema.out_params() {
                self.scope.insert(arg.name.clone(), arg.ty.clone());
            }
        }
    }

    fn push_param(&mut self, primitive: Option<&'a Invocation>, param: &'a InputParam) {
        let ty = primitive
            .and_then(|inv| inv.schema.as_ref())
            .and_then(|schema| schema.arg(&param.name))
            .map(|arg| arg.ty.clone());
        self.out.push(Slot {
            primitive,
            name: param.name.clone(),
            value: &param.value,
            ty,
            scope: self.scope.clone(),
        });
    }

    fn walk_filter(&mut self, filter: &'a BooleanExpression, primitive: Option<&'a Invocation>) {
        match filter {
            BooleanExpression::And(ops) | BooleanExpression::Or(ops) => {
                for op in ops {
                    self.walk_filter(op, primitive);
                }
            }
            BooleanExpression::Not(inner) => self.walk_filter(inner, primitive),
            BooleanExpression::Atom(atom) => {
                let ty = primitive
                    .and_then(|inv| inv.schema.as_ref())
                    .and_then(|schema| schema.arg(&atom.name))
                    .map(|arg| arg.ty.clone());
                self.out.push(Slot {
                    primitive,
                    name: atom.name.clone(),
                    value: &atom.value,
                    ty,
                    scope: self.scope.clone(),
                });
            }
            BooleanExpression::Compute(c) => {
                self.push_outer("__lhs", &c.lhs);
                self.push_outer("__rhs", &c.rhs);
            }
            BooleanExpression::External(e) => {
                for param in &e.invocation.in_params {
                    self.push_param(Some(&e.invocation), param);
                }
                self.walk_filter(&e.filter, Some(&e.invocation));
            }
            _ => {}
        }
    }
}

/// The invocation a filter or join parameter ultimately applies to.
fn innermost_invocation(table: &Table) -> Option<&Invocation> {
    match &table.kind {
        TableKind::Invocation(inv) => Some(inv),
        TableKind::Filter { table, .. }
        | TableKind::Projection { table, .. }
        | TableKind::Compute { table, .. }
        | TableKind::Aggregation { table, .. }
        | TableKind::Sort { table, .. }
        | TableKind::Index { table, .. }
        | TableKind::Slice { table, .. }
        | TableKind::Alias { table, .. } => innermost_invocation(table),
        TableKind::Join { rhs, .. } => innermost_invocation(rhs),
        TableKind::History { .. } | TableKind::VarRef { .. } => None,
    }
}
