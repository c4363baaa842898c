//! AST to NN-token serialization.

use ttc_parser::ast::*;
use ttc_parser::ty::Type;
use ttc_parser::{Error, ErrorKind};

use super::allocator::{entity_token_type, EntityAllocator};
use super::nn_type_tag;

/// Receives each literal value in emission order and produces its token.
pub(crate) trait LiteralSink {
    fn literal(&mut self, value: &Value, token_type: String) -> Result<String, Error>;
}

/// Phase one: remember the literal, emit a throwaway token.
pub(crate) struct RecordSink<'a, 'b> {
    pub allocator: &'b mut EntityAllocator<'a>,
}

impl LiteralSink for RecordSink<'_, '_> {
    fn literal(&mut self, value: &Value, token_type: String) -> Result<String, Error> {
        self.allocator.record(value, token_type)?;
        Ok("_".to_string())
    }
}

/// Phase two: replay the assigned tokens.
pub(crate) struct EmitSink<'a, 'b> {
    pub allocator: &'b EntityAllocator<'a>,
}

impl LiteralSink for EmitSink<'_, '_> {
    fn literal(&mut self, value: &Value, _token_type: String) -> Result<String, Error> {
        self.allocator.token_for(value)
    }
}

pub(crate) struct NnWriter<'s> {
    pub out: Vec<String>,
    sink: &'s mut dyn LiteralSink,
    allocate_slots: bool,
    slots: usize,
}

impl<'s> NnWriter<'s> {
    pub(crate) fn new(sink: &'s mut dyn LiteralSink, allocate_slots: bool) -> Self {
        NnWriter {
            out: Vec::new(),
            sink,
            allocate_slots,
            slots: 0,
        }
    }

    fn push(&mut self, token: impl ToString) {
        self.out.push(token.to_string());
    }

    fn unsupported(what: &str) -> Error {
        Error::new_simple(
            ErrorKind::UnsupportedFeature,
            format!("{what} cannot be expressed in NN syntax"),
        )
    }

    pub(crate) fn write_input(&mut self, input: &Input) -> Result<(), Error> {
        match input {
            Input::Program(program) => self.write_program(program),
            Input::PermissionRule(rule) => self.write_permission_rule(rule),
            Input::Bookkeeping(bookkeeping) => self.write_bookkeeping(bookkeeping),
            Input::ControlCommand(command) => {
                self.push(format!("${}", command.intent));
                Ok(())
            }
            Input::DialogueState(state) => self.write_dialogue(state),
            Input::Library(_) | Input::Dataset(_) => Err(Self::unsupported("a library")),
        }
    }

    fn write_program(&mut self, program: &Program) -> Result<(), Error> {
        if !program.classes.is_empty() {
            return Err(Self::unsupported("an inline class definition"));
        }
        for (i, statement) in program.statements.iter().enumerate() {
            if i > 0 {
                self.push(";");
            }
            self.write_statement(statement)?;
        }
        Ok(())
    }

    fn write_statement(&mut self, statement: &Statement) -> Result<(), Error> {
        match &statement.kind {
            StatementKind::Command { table, actions } => {
                self.push("now");
                self.push("=>");
                if let Some(table) = table {
                    self.write_table(table)?;
                    self.push("=>");
                }
                self.write_actions(actions)
            }
            StatementKind::Rule { stream, actions } => {
                self.write_stream(stream)?;
                self.push("=>");
                self.write_actions(actions)
            }
            StatementKind::Assignment { name, value } => {
                self.push("let");
                self.push(name);
                self.push(":=");
                self.write_table(value)
            }
            StatementKind::Declaration(_) => Err(Self::unsupported("a declaration")),
            StatementKind::OnInputChoice(_) => Err(Self::unsupported("an oninput block")),
        }
    }

    fn write_actions(&mut self, actions: &[Action]) -> Result<(), Error> {
        for (i, action) in actions.iter().enumerate() {
            if i > 0 {
                self.push("=>");
            }
            match action {
                Action::Notify(kind) => self.push(kind),
                Action::Invocation(inv) => self.write_invocation(inv)?,
            }
        }
        Ok(())
    }

    fn write_invocation(&mut self, inv: &Invocation) -> Result<(), Error> {
        let selector = &inv.selector;
        if let Some(id) = &selector.id {
            // post-1.11-beta.2 device binding: @kind ( " id " : " name " ) . fn
            let name = selector
                .attributes
                .iter()
                .find(|attr| attr.name == "name")
                .and_then(|attr| attr.value.kind.as_string().cloned())
                .unwrap_or_else(|| id.clone());
            self.push(format!("@{}", selector.kind));
            self.push("(");
            self.write_inline_string(id);
            self.push(":");
            self.write_inline_string(&name);
            self.push(")");
            self.push(".");
            self.push(&inv.channel);
        } else {
            self.push(format!("@{}.{}", selector.kind, inv.channel));
        }
        self.write_in_params(&inv.in_params, inv.schema.as_deref())
    }

    fn write_inline_string(&mut self, text: &str) {
        self.push("\"");
        for word in text.split_whitespace() {
            self.push(word);
        }
        self.push("\"");
    }

    fn param_token(&self, name: &str, ty: Option<&Type>) -> String {
        match ty {
            Some(ty) => format!("param:{name}:{}", nn_type_tag(ty)),
            None => format!("param:{name}"),
        }
    }

    fn write_in_params(
        &mut self,
        params: &[InputParam],
        schema: Option<&FunctionDef>,
    ) -> Result<(), Error> {
        for param in params {
            let declared = schema.and_then(|s| s.arg(&param.name)).map(|a| &a.ty);
            let value_ty;
            let ty = match declared {
                Some(ty) => Some(ty),
                None => {
                    value_ty = param.value.ty();
                    if value_ty == Type::Any {
                        None
                    } else {
                        Some(&value_ty)
                    }
                }
            };
            let token = self.param_token(&param.name, ty);
            self.push(token);
            self.push("=");
            self.write_value(&param.value)?;
        }
        Ok(())
    }

    fn write_table(&mut self, table: &Table) -> Result<(), Error> {
        match &table.kind {
            TableKind::Invocation(inv) => self.write_invocation(inv),
            TableKind::Filter { table, filter } => {
                self.parenthesized_table(table)?;
                self.push("filter");
                self.write_filter(filter)
            }
            TableKind::Projection { table, args } => {
                self.push("[");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    let token = self.param_token(arg, None);
                    self.push(token);
                }
                self.push("]");
                self.push("of");
                self.parenthesized_table(table)
            }
            TableKind::Compute {
                table,
                expression,
                alias,
            } => {
                self.push("compute");
                self.write_value(expression)?;
                if let Some(alias) = alias {
                    self.push("as");
                    let token = self.param_token(alias, None);
                    self.push(token);
                }
                self.push("of");
                self.parenthesized_table(table)
            }
            TableKind::Aggregation {
                table,
                op,
                field,
                alias: _,
            } => {
                self.push("aggregate");
                self.push(op);
                if let Some(field) = field {
                    let token = self.param_token(field, None);
                    self.push(token);
                }
                self.push("of");
                self.parenthesized_table(table)
            }
            TableKind::Sort {
                table,
                field,
                direction,
            } => {
                self.push("sort");
                let token = self.param_token(field, None);
                self.push(token);
                self.push(direction);
                self.push("of");
                self.parenthesized_table(table)
            }
            TableKind::Index { table, indices } => {
                self.parenthesized_table(table)?;
                self.push("[");
                for (i, index) in indices.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    self.write_value(index)?;
                }
                self.push("]");
                Ok(())
            }
            TableKind::Slice { table, base, limit } => {
                self.parenthesized_table(table)?;
                self.push("[");
                self.write_value(base)?;
                self.push(":");
                self.write_value(limit)?;
                self.push("]");
                Ok(())
            }
            TableKind::Join {
                lhs,
                rhs,
                in_params,
            } => {
                self.parenthesized_table(lhs)?;
                self.push("join");
                self.parenthesized_table(rhs)?;
                if !in_params.is_empty() {
                    self.push("on");
                    self.write_in_params(in_params, None)?;
                }
                Ok(())
            }
            TableKind::Alias { table, name } => {
                self.parenthesized_table(table)?;
                self.push("as");
                self.push(name);
                Ok(())
            }
            TableKind::History {
                kind,
                channel,
                index,
            } => {
                self.push("result");
                self.push("(");
                self.push(format!("@{kind}.{channel}"));
                if let Some(index) = index {
                    self.push("[");
                    self.write_value(index)?;
                    self.push("]");
                }
                self.push(")");
                Ok(())
            }
            TableKind::VarRef { name, in_params } => {
                self.push(name);
                if !in_params.is_empty() {
                    self.push("(");
                    self.write_in_params(in_params, None)?;
                    self.push(")");
                }
                Ok(())
            }
        }
    }

    fn parenthesized_table(&mut self, table: &Table) -> Result<(), Error> {
        match &table.kind {
            TableKind::Invocation(_) => self.write_table(table),
            _ => {
                self.push("(");
                self.write_table(table)?;
                self.push(")");
                Ok(())
            }
        }
    }

    fn write_stream(&mut self, stream: &Stream) -> Result<(), Error> {
        match &stream.kind {
            StreamKind::Timer {
                base,
                interval,
                frequency,
            } => {
                self.push("timer");
                self.push("base");
                self.push("=");
                self.write_value(base)?;
                self.push("interval");
                self.push("=");
                self.write_value(interval)?;
                if let Some(frequency) = frequency {
                    self.push("frequency");
                    self.push("=");
                    self.write_value(frequency)?;
                }
                Ok(())
            }
            StreamKind::AtTimer {
                times,
                expiration_date,
            } => {
                self.push("attimer");
                self.push("time");
                self.push("=");
                self.push("[");
                for (i, time) in times.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    self.write_value(time)?;
                }
                self.push("]");
                if let Some(expiration_date) = expiration_date {
                    self.push("expiration_date");
                    self.push("=");
                    self.write_value(expiration_date)?;
                }
                Ok(())
            }
            StreamKind::Monitor { table, args } => {
                self.push("monitor");
                self.parenthesized_table(table)?;
                if let Some(args) = args {
                    self.push("on");
                    self.push("new");
                    self.push("[");
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            self.push(",");
                        }
                        let token = self.param_token(arg, None);
                        self.push(token);
                    }
                    self.push("]");
                }
                Ok(())
            }
            StreamKind::EdgeFilter { stream, filter } => {
                self.push("edge");
                self.push("(");
                self.write_stream(stream)?;
                self.push(")");
                self.push("on");
                self.write_filter(filter)
            }
            StreamKind::EdgeNew { stream } => {
                self.push("edge");
                self.push("(");
                self.write_stream(stream)?;
                self.push(")");
                self.push("on");
                self.push("new");
                Ok(())
            }
            StreamKind::Filter { stream, filter } => {
                self.parenthesized_stream(stream)?;
                self.push("filter");
                self.write_filter(filter)
            }
            StreamKind::Projection { stream, args } => {
                self.push("[");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    let token = self.param_token(arg, None);
                    self.push(token);
                }
                self.push("]");
                self.push("of");
                self.parenthesized_stream(stream)
            }
            StreamKind::Compute {
                stream,
                expression,
                alias,
            } => {
                self.push("compute");
                self.write_value(expression)?;
                if let Some(alias) = alias {
                    self.push("as");
                    let token = self.param_token(alias, None);
                    self.push(token);
                }
                self.push("of");
                self.parenthesized_stream(stream)
            }
            StreamKind::Join {
                stream,
                table,
                in_params,
            } => {
                self.parenthesized_stream(stream)?;
                self.push("join");
                self.parenthesized_table(table)?;
                if !in_params.is_empty() {
                    self.push("on");
                    self.write_in_params(in_params, None)?;
                }
                Ok(())
            }
            StreamKind::Alias { stream, name } => {
                self.parenthesized_stream(stream)?;
                self.push("as");
                self.push(name);
                Ok(())
            }
            StreamKind::VarRef { name, in_params } => {
                self.push(name);
                if !in_params.is_empty() {
                    self.push("(");
                    self.write_in_params(in_params, None)?;
                    self.push(")");
                }
                Ok(())
            }
        }
    }

    fn parenthesized_stream(&mut self, stream: &Stream) -> Result<(), Error> {
        match &stream.kind {
            StreamKind::Timer { .. } | StreamKind::AtTimer { .. } => self.write_stream(stream),
            _ => {
                self.push("(");
                self.write_stream(stream)?;
                self.push(")");
                Ok(())
            }
        }
    }

    fn write_filter(&mut self, filter: &BooleanExpression) -> Result<(), Error> {
        match filter {
            BooleanExpression::True => {
                self.push("true");
                Ok(())
            }
            BooleanExpression::False => {
                self.push("false");
                Ok(())
            }
            BooleanExpression::And(operands) => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        self.push("and");
                    }
                    self.write_filter(operand)?;
                }
                Ok(())
            }
            BooleanExpression::Or(operands) => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        self.push("or");
                    }
                    self.write_filter(operand)?;
                }
                Ok(())
            }
            BooleanExpression::Not(inner) => {
                self.push("not");
                self.write_filter(inner)
            }
            BooleanExpression::Atom(atom) => {
                let ty = atom.value.ty();
                let token = self.param_token(
                    &atom.name,
                    if ty == Type::Any { None } else { Some(&ty) },
                );
                self.push(token);
                self.push(atom.operator);
                self.write_value(&atom.value)
            }
            BooleanExpression::Compute(c) => {
                self.write_value(&c.lhs)?;
                self.push(c.operator);
                self.write_value(&c.rhs)
            }
            BooleanExpression::DontCare { name } => {
                self.push("true");
                self.push("(");
                let token = self.param_token(name, None);
                self.push(token);
                self.push(")");
                Ok(())
            }
            BooleanExpression::External(e) => {
                self.write_invocation(&e.invocation)?;
                self.push("{");
                self.write_filter(&e.filter)?;
                self.push("}");
                Ok(())
            }
        }
    }

    fn write_value(&mut self, value: &Value) -> Result<(), Error> {
        if let ValueKind::Undefined { .. } = &value.kind {
            if self.allocate_slots {
                let token = format!("SLOT_{}", self.slots);
                self.slots += 1;
                self.push(token);
            } else {
                self.push("undefined");
            }
            return Ok(());
        }

        if let Some(token_type) = entity_token_type(value) {
            let token = self.sink.literal(value, token_type)?;
            self.push(token);
            return Ok(());
        }

        match &value.kind {
            ValueKind::Boolean(b) => {
                self.push(if *b { "true" } else { "false" });
                Ok(())
            }
            ValueKind::Number(n) => {
                // only reached for 0 and 1, which are tokens of their own
                self.push(format!("{n}"));
                Ok(())
            }
            ValueKind::Enum(variant) => {
                self.push(format!("enum:{variant}"));
                Ok(())
            }
            ValueKind::Date(date) => self.write_date(date),
            ValueKind::Location(LocationValue::Relative(name)) => {
                self.push(format!("location:{name}"));
                Ok(())
            }
            ValueKind::Event(field) => {
                match field {
                    None => self.push("$event"),
                    Some(field) => self.push(format!("$event.{field}")),
                }
                Ok(())
            }
            ValueKind::ContextRef { name, ty } => {
                self.push(format!("$context.{name}:{}", nn_type_tag(ty)));
                Ok(())
            }
            ValueKind::VarRef(name) => {
                let token = self.param_token(name, None);
                self.push(token);
                Ok(())
            }
            ValueKind::Computation { op, operands } => {
                self.push(op);
                self.push("(");
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    self.write_value(operand)?;
                }
                self.push(")");
                Ok(())
            }
            ValueKind::ArrayField { field, value } => {
                let token = self.param_token(field, None);
                self.push(token);
                self.push("of");
                self.write_value(value)
            }
            ValueKind::Filter { value, filter } => {
                self.push("(");
                self.write_value(value)?;
                self.push("filter");
                self.write_filter(filter)?;
                self.push(")");
                Ok(())
            }
            ValueKind::Array(elems) => {
                self.push("[");
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    self.write_value(elem)?;
                }
                self.push("]");
                Ok(())
            }
            ValueKind::Object(fields) => {
                self.push("{");
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    self.push(name);
                    self.push("=");
                    self.write_value(field)?;
                }
                self.push("}");
                Ok(())
            }
            _ => Err(Self::unsupported("this value")),
        }
    }

    fn write_date(&mut self, date: &DateValue) -> Result<(), Error> {
        match date {
            DateValue::Now => {
                self.push("new");
                self.push("Date");
                self.push("(");
                self.push(")");
            }
            DateValue::Edge { edge, unit } => {
                self.push(edge);
                self.push(unit);
            }
            DateValue::Absolute(dt) => {
                self.push("new");
                self.push("Date");
                self.push("(");
                self.push(dt.year);
                self.push(",");
                self.push(dt.month);
                self.push(",");
                self.push(dt.day);
                if dt.hour != 0 || dt.minute != 0 || dt.second != 0 {
                    self.push(",");
                    self.push(dt.hour);
                    self.push(",");
                    self.push(dt.minute);
                    self.push(",");
                    self.push(dt.second);
                }
                self.push(")");
            }
            DateValue::Piece {
                year,
                month,
                day,
                time,
            } => {
                self.push("new");
                self.push("Date");
                self.push("(");
                if let Some(year) = year {
                    self.push(year);
                }
                self.push(",");
                if let Some(month) = month {
                    self.push(month);
                }
                self.push(",");
                if let Some(day) = day {
                    self.push(day);
                }
                if let Some(time) = time {
                    self.push(",");
                    self.push(time.hour);
                    self.push(",");
                    self.push(time.minute);
                    self.push(",");
                    self.push(time.second);
                }
                self.push(")");
            }
        }
        Ok(())
    }

    fn write_permission_rule(&mut self, rule: &PermissionRule) -> Result<(), Error> {
        self.push("policy");
        self.write_filter(&rule.principal)?;
        self.push(":");
        self.write_permission_function(&rule.query, "now")?;
        self.push("=>");
        self.write_permission_function(&rule.action, "notify")
    }

    fn write_permission_function(
        &mut self,
        function: &PermissionFunction,
        builtin: &str,
    ) -> Result<(), Error> {
        match function {
            PermissionFunction::Builtin => {
                self.push(builtin);
                Ok(())
            }
            PermissionFunction::Star => {
                self.push("*");
                Ok(())
            }
            PermissionFunction::ClassStar(kind) => {
                self.push(format!("@{kind}"));
                self.push(".");
                self.push("*");
                Ok(())
            }
            PermissionFunction::Specified {
                kind,
                channel,
                filter,
                ..
            } => {
                self.push(format!("@{kind}.{channel}"));
                if !filter.is_true() {
                    self.push("filter");
                    self.write_filter(filter)?;
                }
                Ok(())
            }
        }
    }

    fn write_bookkeeping(&mut self, bookkeeping: &Bookkeeping) -> Result<(), Error> {
        self.push("bookkeeping");
        match &bookkeeping.intent {
            BookkeepingIntent::Special(name) => {
                self.push("special");
                self.push(format!("special:{name}"));
                Ok(())
            }
            BookkeepingIntent::Choice(index) => {
                self.push("choice");
                self.push(index);
                Ok(())
            }
            BookkeepingIntent::Answer(value) => {
                self.push("answer");
                self.write_value(value)
            }
            BookkeepingIntent::CommandList { device, category } => {
                self.push("commands");
                self.push(format!("category:{category}"));
                if let Some(device) = device {
                    self.write_value(device)?;
                }
                Ok(())
            }
        }
    }

    fn write_dialogue(&mut self, state: &DialogueState) -> Result<(), Error> {
        self.push("$dialogue");
        self.push(format!("@{}.{}", state.policy, state.dialogue_act));
        if !state.dialogue_act_param.is_empty() {
            self.push("(");
            for (i, param) in state.dialogue_act_param.iter().enumerate() {
                if i > 0 {
                    self.push(",");
                }
                let token = self.param_token(param, None);
                self.push(token);
            }
            self.push(")");
        }
        // execution results live in the dialogue context, not in the model
        // target, so history items serialize as bare statements
        for item in &state.history {
            self.push(";");
            self.write_statement(&item.statement)?;
        }
        Ok(())
    }
}
