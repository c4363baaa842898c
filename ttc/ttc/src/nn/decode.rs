//! NN-token to AST parsing, grammar-directed, driven by a token cursor and
//! an entity dictionary supplied alongside the sentence.

use std::str::FromStr;

use ttc_parser::ast::*;
use ttc_parser::ty::Type;
use ttc_parser::{Error, ErrorKind};

use super::EntityDict;

pub(crate) struct Decoder<'a> {
    tokens: &'a [String],
    pos: usize,
    entities: &'a EntityDict,
}

fn invalid(message: impl ToString) -> Error {
    Error::new_simple(ErrorKind::InvalidNNSyntax, message)
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(tokens: &'a [String], entities: &'a EntityDict) -> Self {
        Decoder {
            tokens,
            pos: 0,
            entities,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn peek_at(&self, offset: usize) -> Option<&'a str> {
        self.tokens.get(self.pos + offset).map(|s| s.as_str())
    }

    fn next(&mut self) -> Result<&'a str, Error> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| invalid("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, token: &str) -> Result<(), Error> {
        let found = self.next()?;
        if found == token {
            Ok(())
        } else {
            Err(invalid(format!("expected `{token}`, found `{found}`")))
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn decode_input(&mut self) -> Result<Input, Error> {
        let input = match self.peek() {
            Some("$dialogue") => Input::DialogueState(self.decode_dialogue()?),
            Some("bookkeeping") => Input::Bookkeeping(self.decode_bookkeeping()?),
            Some("policy") => Input::PermissionRule(self.decode_permission_rule()?),
            Some(token) if token.starts_with('$') => {
                let intent = ControlIntent::from_str(&token[1..])
                    .map_err(|_| invalid(format!("unknown control command `{token}`")))?;
                self.pos += 1;
                Input::ControlCommand(ControlCommand { intent, span: None })
            }
            _ => Input::Program(self.decode_program()?),
        };
        if !self.at_end() {
            return Err(invalid(format!(
                "trailing tokens starting at `{}`",
                self.peek().unwrap_or_default()
            )));
        }
        Ok(input)
    }

    fn decode_program(&mut self) -> Result<Program, Error> {
        let mut statements = vec![self.decode_statement()?];
        while self.eat(";") {
            statements.push(self.decode_statement()?);
        }
        Ok(Program::new(statements))
    }

    fn decode_statement(&mut self) -> Result<Statement, Error> {
        if self.eat("now") {
            self.expect("=>")?;
            if let Some(action) = self.try_decode_builtin_action() {
                return Ok(Statement::new(StatementKind::Command {
                    table: None,
                    actions: vec![action],
                }));
            }
            let table = self.decode_table()?;
            if self.eat("=>") {
                let action = self.decode_action()?;
                Ok(Statement::new(StatementKind::Command {
                    table: Some(table),
                    actions: vec![action],
                }))
            } else {
                // a bare invocation after `now =>` is an action call
                match table.kind {
                    TableKind::Invocation(inv) => Ok(Statement::new(StatementKind::Command {
                        table: None,
                        actions: vec![Action::Invocation(inv)],
                    })),
                    _ => Err(invalid("expected `=>` or an action")),
                }
            }
        } else if self.eat("let") {
            let name = self.next()?.to_string();
            self.expect(":=")?;
            let value = self.decode_table()?;
            Ok(Statement::new(StatementKind::Assignment { name, value }))
        } else {
            let stream = self.decode_stream()?;
            self.expect("=>")?;
            let mut stream = stream;
            let action = if let Some(action) = self.try_decode_builtin_action() {
                action
            } else {
                let table = self.decode_table()?;
                if self.eat("=>") {
                    // a middle table joins onto the stream
                    stream = Stream::new(StreamKind::Join {
                        stream: Box::new(stream),
                        table: Box::new(table),
                        in_params: Vec::new(),
                    });
                    self.decode_action()?
                } else {
                    match table.kind {
                        TableKind::Invocation(inv) => Action::Invocation(inv),
                        _ => return Err(invalid("expected `=>` or an action")),
                    }
                }
            };
            Ok(Statement::new(StatementKind::Rule {
                stream,
                actions: vec![action],
            }))
        }
    }

    fn try_decode_builtin_action(&mut self) -> Option<Action> {
        if self.eat("notify") {
            Some(Action::Notify(NotifyKind::Notify))
        } else if self.eat("return") {
            Some(Action::Notify(NotifyKind::Return))
        } else {
            None
        }
    }

    fn decode_action(&mut self) -> Result<Action, Error> {
        if let Some(action) = self.try_decode_builtin_action() {
            return Ok(action);
        }
        Ok(Action::Invocation(self.decode_invocation()?))
    }

    fn decode_invocation(&mut self) -> Result<Invocation, Error> {
        let token = self.next()?;
        let function = token
            .strip_prefix('@')
            .ok_or_else(|| invalid(format!("expected a function, found `{token}`")))?;

        let mut invocation = if self.peek() == Some("(") {
            // device binding: @kind ( " id " : " name " ) . fn
            let mut selector = DeviceSelector::new(function);
            self.expect("(")?;
            let id = self.decode_inline_string()?;
            self.expect(":")?;
            let name = self.decode_inline_string()?;
            self.expect(")")?;
            self.expect(".")?;
            let channel = self.next()?.to_string();
            selector.id = Some(id.clone());
            if name != id {
                selector
                    .attributes
                    .push(InputParam::new("name", Value::string(name)));
            }
            Invocation::new(selector, channel)
        } else {
            let (kind, channel) = function
                .rsplit_once('.')
                .ok_or_else(|| invalid(format!("expected @kind.function, found `{token}`")))?;
            Invocation::new(DeviceSelector::new(kind), channel)
        };

        invocation.in_params = self.decode_in_params()?;
        Ok(invocation)
    }

    fn decode_inline_string(&mut self) -> Result<String, Error> {
        self.expect("\"")?;
        let mut words = Vec::new();
        loop {
            let token = self.next()?;
            if token == "\"" {
                break;
            }
            words.push(token.to_string());
        }
        Ok(words.join(" "))
    }

    /// Zero or more `param:NAME:TYPE = VALUE` groups.
    fn decode_in_params(&mut self) -> Result<Vec<InputParam>, Error> {
        let mut params = Vec::new();
        while let Some((name, _ty)) = self.peek_param_token() {
            if self.peek_at(1) != Some("=") {
                break;
            }
            self.pos += 1;
            self.expect("=")?;
            let value = self.decode_value()?;
            params.push(InputParam::new(name, value));
        }
        Ok(params)
    }

    fn peek_param_token(&self) -> Option<(String, Option<Type>)> {
        parse_param_token(self.peek()?)
    }

    fn decode_param_token(&mut self) -> Result<(String, Option<Type>), Error> {
        let token = self.next()?;
        parse_param_token(token)
            .ok_or_else(|| invalid(format!("expected a parameter, found `{token}`")))
    }

    fn decode_table(&mut self) -> Result<Table, Error> {
        let mut table = self.decode_table_primary()?;
        loop {
            match self.peek() {
                Some("[") => {
                    self.pos += 1;
                    let first = self.decode_value()?;
                    if self.eat(":") {
                        let limit = self.decode_value()?;
                        self.expect("]")?;
                        table = Table::new(TableKind::Slice {
                            table: Box::new(table),
                            base: first,
                            limit,
                        });
                    } else {
                        let mut indices = vec![first];
                        while self.eat(",") {
                            indices.push(self.decode_value()?);
                        }
                        self.expect("]")?;
                        table = Table::new(TableKind::Index {
                            table: Box::new(table),
                            indices,
                        });
                    }
                }
                Some("filter") => {
                    self.pos += 1;
                    let filter = self.decode_filter()?;
                    table = Table::new(TableKind::Filter {
                        table: Box::new(table),
                        filter,
                    });
                }
                Some("join") => {
                    self.pos += 1;
                    let rhs = self.decode_table_primary()?;
                    let in_params = if self.eat("on") {
                        self.decode_in_params()?
                    } else {
                        Vec::new()
                    };
                    table = Table::new(TableKind::Join {
                        lhs: Box::new(table),
                        rhs: Box::new(rhs),
                        in_params,
                    });
                }
                Some("as") => {
                    self.pos += 1;
                    let name = self.next()?.to_string();
                    table = Table::new(TableKind::Alias {
                        table: Box::new(table),
                        name,
                    });
                }
                _ => break,
            }
        }
        Ok(table)
    }

    fn decode_table_primary(&mut self) -> Result<Table, Error> {
        match self.peek() {
            Some("(") => {
                self.pos += 1;
                let table = self.decode_table()?;
                self.expect(")")?;
                Ok(table)
            }
            Some("[") => {
                self.pos += 1;
                let mut args = Vec::new();
                loop {
                    let (name, _) = self.decode_param_token()?;
                    args.push(name);
                    if !self.eat(",") {
                        break;
                    }
                }
                self.expect("]")?;
                self.expect("of")?;
                let table = self.decode_operand_table()?;
                Ok(Table::new(TableKind::Projection {
                    table: Box::new(table),
                    args,
                }))
            }
            Some("aggregate") => {
                self.pos += 1;
                let op_token = self.next()?;
                let op = AggregationOp::from_str(op_token)
                    .map_err(|_| invalid(format!("unknown aggregation `{op_token}`")))?;
                let field = match self.peek_param_token() {
                    Some((name, _)) => {
                        self.pos += 1;
                        Some(name)
                    }
                    None => None,
                };
                self.expect("of")?;
                let table = self.decode_operand_table()?;
                Ok(Table::new(TableKind::Aggregation {
                    table: Box::new(table),
                    op,
                    field,
                    alias: None,
                }))
            }
            // `argmax`/`argmin` from older releases decode as sort + index
            Some("argmax") | Some("argmin") => {
                let direction = if self.next()? == "argmax" {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                let (field, _) = self.decode_param_token()?;
                self.expect("of")?;
                let table = self.decode_operand_table()?;
                Ok(Table::new(TableKind::Index {
                    table: Box::new(Table::new(TableKind::Sort {
                        table: Box::new(table),
                        field,
                        direction,
                    })),
                    indices: vec![Value::number(1.0)],
                }))
            }
            Some("sort") => {
                self.pos += 1;
                let (field, _) = self.decode_param_token()?;
                let direction_token = self.next()?;
                let direction = SortDirection::from_str(direction_token)
                    .map_err(|_| invalid(format!("expected asc or desc, found `{direction_token}`")))?;
                self.expect("of")?;
                let table = self.decode_operand_table()?;
                Ok(Table::new(TableKind::Sort {
                    table: Box::new(table),
                    field,
                    direction,
                }))
            }
            Some("compute") => {
                self.pos += 1;
                let expression = self.decode_value()?;
                let alias = if self.eat("as") {
                    Some(self.decode_param_token()?.0)
                } else {
                    None
                };
                self.expect("of")?;
                let table = self.decode_operand_table()?;
                Ok(Table::new(TableKind::Compute {
                    table: Box::new(table),
                    expression,
                    alias,
                }))
            }
            Some("result") => {
                self.pos += 1;
                self.expect("(")?;
                let token = self.next()?;
                let function = token
                    .strip_prefix('@')
                    .and_then(|f| f.rsplit_once('.'))
                    .ok_or_else(|| invalid(format!("expected @kind.function, found `{token}`")))?;
                let (kind, channel) = (function.0.to_string(), function.1.to_string());
                let index = if self.eat("[") {
                    let index = self.decode_value()?;
                    self.expect("]")?;
                    Some(index)
                } else {
                    None
                };
                self.expect(")")?;
                Ok(Table::new(TableKind::History {
                    kind,
                    channel,
                    index,
                }))
            }
            Some(token) if token.starts_with('@') => {
                Ok(Table::new(TableKind::Invocation(self.decode_invocation()?)))
            }
            Some(_) => {
                // an invocation of a declaration
                let name = self.next()?.to_string();
                let in_params = if self.eat("(") {
                    let params = self.decode_in_params()?;
                    self.expect(")")?;
                    params
                } else {
                    Vec::new()
                };
                Ok(Table::new(TableKind::VarRef { name, in_params }))
            }
            None => Err(invalid("expected a table")),
        }
    }

    /// The operand after `of`: parenthesized, or a bare invocation.
    fn decode_operand_table(&mut self) -> Result<Table, Error> {
        if self.eat("(") {
            let table = self.decode_table()?;
            self.expect(")")?;
            Ok(table)
        } else {
            self.decode_table_primary()
        }
    }

    fn decode_stream(&mut self) -> Result<Stream, Error> {
        let mut stream = self.decode_stream_primary()?;
        loop {
            match self.peek() {
                Some("filter") => {
                    self.pos += 1;
                    let filter = self.decode_filter()?;
                    stream = Stream::new(StreamKind::Filter {
                        stream: Box::new(stream),
                        filter,
                    });
                }
                Some("join") => {
                    self.pos += 1;
                    let table = self.decode_operand_table()?;
                    let in_params = if self.eat("on") {
                        self.decode_in_params()?
                    } else {
                        Vec::new()
                    };
                    stream = Stream::new(StreamKind::Join {
                        stream: Box::new(stream),
                        table: Box::new(table),
                        in_params,
                    });
                }
                Some("as") => {
                    self.pos += 1;
                    let name = self.next()?.to_string();
                    stream = Stream::new(StreamKind::Alias {
                        stream: Box::new(stream),
                        name,
                    });
                }
                _ => break,
            }
        }
        Ok(stream)
    }

    fn decode_stream_primary(&mut self) -> Result<Stream, Error> {
        match self.peek() {
            Some("(") => {
                self.pos += 1;
                let stream = self.decode_stream()?;
                self.expect(")")?;
                Ok(stream)
            }
            Some("timer") => {
                self.pos += 1;
                let mut base = None;
                let mut interval = None;
                let mut frequency = None;
                while matches!(self.peek(), Some("base") | Some("interval") | Some("frequency")) {
                    let field = self.next()?.to_string();
                    self.expect("=")?;
                    let value = self.decode_value()?;
                    match field.as_str() {
                        "base" => base = Some(value),
                        "interval" => interval = Some(value),
                        _ => frequency = Some(value),
                    }
                }
                Ok(Stream::new(StreamKind::Timer {
                    base: base.unwrap_or_else(|| Value::new(ValueKind::Date(DateValue::Now))),
                    interval: interval.ok_or_else(|| invalid("timer requires an interval"))?,
                    frequency,
                }))
            }
            Some("attimer") => {
                self.pos += 1;
                self.expect("time")?;
                self.expect("=")?;
                let time = self.decode_value()?;
                let times = match time {
                    Value {
                        kind: ValueKind::Array(elems),
                        ..
                    } => elems,
                    other => vec![other],
                };
                let expiration_date = if self.eat("expiration_date") {
                    self.expect("=")?;
                    Some(self.decode_value()?)
                } else {
                    None
                };
                Ok(Stream::new(StreamKind::AtTimer {
                    times,
                    expiration_date,
                }))
            }
            Some("monitor") => {
                self.pos += 1;
                let table = self.decode_operand_table()?;
                let args = if self.peek() == Some("on") && self.peek_at(1) == Some("new") {
                    self.pos += 2;
                    self.expect("[")?;
                    let mut args = Vec::new();
                    loop {
                        let (name, _) = self.decode_param_token()?;
                        args.push(name);
                        if !self.eat(",") {
                            break;
                        }
                    }
                    self.expect("]")?;
                    Some(args)
                } else {
                    None
                };
                Ok(Stream::new(StreamKind::Monitor {
                    table: Box::new(table),
                    args,
                }))
            }
            Some("edge") => {
                self.pos += 1;
                self.expect("(")?;
                let stream = self.decode_stream()?;
                self.expect(")")?;
                self.expect("on")?;
                if self.eat("new") {
                    Ok(Stream::new(StreamKind::EdgeNew {
                        stream: Box::new(stream),
                    }))
                } else {
                    let filter = self.decode_filter()?;
                    Ok(Stream::new(StreamKind::EdgeFilter {
                        stream: Box::new(stream),
                        filter,
                    }))
                }
            }
            Some("[") => {
                self.pos += 1;
                let mut args = Vec::new();
                loop {
                    let (name, _) = self.decode_param_token()?;
                    args.push(name);
                    if !self.eat(",") {
                        break;
                    }
                }
                self.expect("]")?;
                self.expect("of")?;
                self.expect("(")?;
                let stream = self.decode_stream()?;
                self.expect(")")?;
                Ok(Stream::new(StreamKind::Projection {
                    stream: Box::new(stream),
                    args,
                }))
            }
            Some("compute") => {
                self.pos += 1;
                let expression = self.decode_value()?;
                let alias = if self.eat("as") {
                    Some(self.decode_param_token()?.0)
                } else {
                    None
                };
                self.expect("of")?;
                self.expect("(")?;
                let stream = self.decode_stream()?;
                self.expect(")")?;
                Ok(Stream::new(StreamKind::Compute {
                    stream: Box::new(stream),
                    expression,
                    alias,
                }))
            }
            Some(token) if !token.starts_with('@') => {
                let name = self.next()?.to_string();
                let in_params = if self.eat("(") {
                    let params = self.decode_in_params()?;
                    self.expect(")")?;
                    params
                } else {
                    Vec::new()
                };
                Ok(Stream::new(StreamKind::VarRef { name, in_params }))
            }
            _ => Err(invalid("expected a stream")),
        }
    }

    fn decode_filter(&mut self) -> Result<BooleanExpression, Error> {
        let mut clauses = vec![self.decode_or_clause()?];
        while self.eat("and") {
            clauses.push(self.decode_or_clause()?);
        }
        Ok(BooleanExpression::and(clauses))
    }

    fn decode_or_clause(&mut self) -> Result<BooleanExpression, Error> {
        let mut literals = vec![self.decode_filter_literal()?];
        while self.eat("or") {
            literals.push(self.decode_filter_literal()?);
        }
        Ok(BooleanExpression::or(literals))
    }

    fn decode_filter_literal(&mut self) -> Result<BooleanExpression, Error> {
        if self.eat("not") {
            let inner = self.decode_filter_literal()?;
            return Ok(BooleanExpression::Not(Box::new(inner)));
        }

        if self.peek() == Some("true") && self.peek_at(1) == Some("(") {
            self.pos += 2;
            let (name, _) = self.decode_param_token()?;
            self.expect(")")?;
            return Ok(BooleanExpression::DontCare { name });
        }
        if self.eat("true") {
            return Ok(BooleanExpression::True);
        }
        if self.eat("false") {
            return Ok(BooleanExpression::False);
        }

        if self.peek().is_some_and(|t| t.starts_with('@')) {
            let invocation = self.decode_invocation()?;
            self.expect("{")?;
            let filter = self.decode_filter()?;
            self.expect("}")?;
            return Ok(BooleanExpression::External(Box::new(
                ExternalBooleanExpression { invocation, filter },
            )));
        }

        // `param:NAME:TYPE op VALUE` or a computed comparison
        if let Some((name, _ty)) = self.peek_param_token() {
            if self
                .peek_at(1)
                .and_then(|t| FilterOp::from_str(t).ok())
                .is_some()
            {
                self.pos += 1;
                let operator = FilterOp::from_str(self.next()?).unwrap();
                let value = self.decode_value()?;
                return Ok(BooleanExpression::atom(name, operator, value));
            }
        }

        let lhs = self.decode_value()?;
        let op_token = self.next()?;
        let operator = FilterOp::from_str(op_token)
            .map_err(|_| invalid(format!("expected a filter operator, found `{op_token}`")))?;
        let rhs = self.decode_value()?;
        Ok(BooleanExpression::Compute(ComputeBooleanExpression {
            lhs,
            operator,
            rhs,
            span: None,
        }))
    }

    fn decode_value(&mut self) -> Result<Value, Error> {
        let token = self
            .peek()
            .ok_or_else(|| invalid("expected a value"))?;

        // placeholder tokens resolve through the entity dictionary
        if super::is_entity_token(token) {
            let token = self.next()?;
            if token.starts_with("SLOT_") {
                return Ok(self
                    .entities
                    .get(token)
                    .cloned()
                    .unwrap_or_else(Value::undefined));
            }
            return self.entities.get(token).cloned().ok_or_else(|| {
                invalid(format!("`{token}` is not in the entity dictionary"))
            });
        }

        match token {
            "undefined" => {
                self.pos += 1;
                Ok(Value::undefined())
            }
            "true" => {
                self.pos += 1;
                Ok(Value::boolean(true))
            }
            "false" => {
                self.pos += 1;
                Ok(Value::boolean(false))
            }
            "new" => {
                self.pos += 1;
                self.expect("Date")?;
                self.decode_date()
            }
            "start_of" | "end_of" => {
                let edge = if self.next()? == "start_of" {
                    DateEdge::StartOf
                } else {
                    DateEdge::EndOf
                };
                let unit = self.next()?.to_string();
                Ok(Value::new(ValueKind::Date(DateValue::Edge { edge, unit })))
            }
            "$event" => {
                self.pos += 1;
                Ok(Value::new(ValueKind::Event(None)))
            }
            "$event.type" => {
                self.pos += 1;
                Ok(Value::new(ValueKind::Event(Some(EventField::Type))))
            }
            "$event.program_id" => {
                self.pos += 1;
                Ok(Value::new(ValueKind::Event(Some(EventField::ProgramId))))
            }
            "[" => {
                self.pos += 1;
                let mut elems = Vec::new();
                if self.peek() != Some("]") {
                    elems.push(self.decode_value()?);
                    while self.eat(",") {
                        elems.push(self.decode_value()?);
                    }
                }
                self.expect("]")?;
                Ok(Value::new(ValueKind::Array(elems)))
            }
            "{" => {
                self.pos += 1;
                let mut fields = std::collections::BTreeMap::new();
                if self.peek() != Some("}") {
                    loop {
                        let name = self.next()?.to_string();
                        self.expect("=")?;
                        fields.insert(name, self.decode_value()?);
                        if !self.eat(",") {
                            break;
                        }
                    }
                }
                self.expect("}")?;
                Ok(Value::new(ValueKind::Object(fields)))
            }
            "\"" => {
                let text = self.decode_inline_string()?;
                Ok(Value::string(text))
            }
            "(" => {
                // a filtered value: ( VALUE filter F )
                self.pos += 1;
                let inner = self.decode_value()?;
                self.expect("filter")?;
                let filter = self.decode_filter()?;
                self.expect(")")?;
                Ok(Value::new(ValueKind::Filter {
                    value: Box::new(inner),
                    filter: Box::new(filter),
                }))
            }
            _ => {
                if let Some(variant) = token.strip_prefix("enum:") {
                    let variant = variant.to_string();
                    self.pos += 1;
                    return Ok(Value::new(ValueKind::Enum(variant)));
                }
                if let Some(name) = token.strip_prefix("location:") {
                    let name = name.to_string();
                    self.pos += 1;
                    return Ok(Value::new(ValueKind::Location(LocationValue::Relative(
                        name,
                    ))));
                }
                if let Some(rest) = token.strip_prefix("$context.") {
                    let (name, tag) = rest
                        .split_once(':')
                        .ok_or_else(|| invalid(format!("malformed context token `{token}`")))?;
                    let ty = Type::parse(tag)
                        .ok_or_else(|| invalid(format!("unknown type tag `{tag}`")))?;
                    let name = name.to_string();
                    self.pos += 1;
                    return Ok(Value::new(ValueKind::ContextRef { name, ty }));
                }
                if let Some((name, _ty)) = parse_param_token(token) {
                    self.pos += 1;
                    if self.eat("of") {
                        let inner = self.decode_value()?;
                        return Ok(Value::new(ValueKind::ArrayField {
                            field: name,
                            value: Box::new(inner),
                        }));
                    }
                    return Ok(Value::var_ref(name));
                }
                if let Ok(op) = ScalarOp::from_str(token) {
                    if self.peek_at(1) == Some("(") {
                        self.pos += 2;
                        let mut operands = vec![self.decode_value()?];
                        while self.eat(",") {
                            operands.push(self.decode_value()?);
                        }
                        self.expect(")")?;
                        return Ok(Value::new(ValueKind::Computation { op, operands }));
                    }
                }
                if let Ok(n) = token.parse::<f64>() {
                    self.pos += 1;
                    return Ok(Value::number(n));
                }
                Err(invalid(format!("expected a value, found `{token}`")))
            }
        }
    }

    fn decode_date(&mut self) -> Result<Value, Error> {
        self.expect("(")?;
        let mut slots: Vec<Option<i64>> = Vec::new();
        let mut expect_value = true;
        loop {
            match self.peek() {
                Some(")") => {
                    self.pos += 1;
                    if expect_value && !slots.is_empty() {
                        slots.push(None);
                    }
                    break;
                }
                Some(",") => {
                    self.pos += 1;
                    if expect_value {
                        slots.push(None);
                    }
                    expect_value = true;
                }
                Some(token) => {
                    let n = token
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("expected a date part, found `{token}`")))?;
                    self.pos += 1;
                    slots.push(Some(n));
                    expect_value = false;
                }
                None => return Err(invalid("unterminated date")),
            }
        }

        let date = if slots.iter().all(Option::is_none) {
            DateValue::Now
        } else {
            let get = |i: usize| slots.get(i).copied().flatten();
            let (year, month, day) = (get(0), get(1), get(2));
            if year.is_some() && month.is_some() && day.is_some() {
                DateValue::Absolute(DateTimeValue {
                    year: year.unwrap() as i32,
                    month: month.unwrap() as u8,
                    day: day.unwrap() as u8,
                    hour: get(3).unwrap_or(0) as u8,
                    minute: get(4).unwrap_or(0) as u8,
                    second: get(5).unwrap_or(0) as u8,
                })
            } else {
                DateValue::Piece {
                    year: year.map(|y| y as i32),
                    month: month.map(|m| m as u8),
                    day: day.map(|d| d as u8),
                    time: get(3).map(|h| TimeValue {
                        hour: h as u8,
                        minute: get(4).unwrap_or(0) as u8,
                        second: get(5).unwrap_or(0) as u8,
                    }),
                }
            }
        };
        Ok(Value::new(ValueKind::Date(date)))
    }

    fn decode_permission_rule(&mut self) -> Result<PermissionRule, Error> {
        self.expect("policy")?;
        let principal = self.decode_filter()?;
        self.expect(":")?;
        let query = self.decode_permission_function("now")?;
        self.expect("=>")?;
        let action = self.decode_permission_function("notify")?;
        Ok(PermissionRule {
            principal,
            query,
            action,
            span: None,
        })
    }

    fn decode_permission_function(&mut self, builtin: &str) -> Result<PermissionFunction, Error> {
        if self.eat(builtin) {
            return Ok(PermissionFunction::Builtin);
        }
        if self.eat("*") {
            return Ok(PermissionFunction::Star);
        }
        let token = self.next()?;
        let function = token
            .strip_prefix('@')
            .ok_or_else(|| invalid(format!("expected a permission function, found `{token}`")))?;

        if self.peek() == Some(".") && self.peek_at(1) == Some("*") {
            self.pos += 2;
            return Ok(PermissionFunction::ClassStar(function.to_string()));
        }

        let (kind, channel) = function
            .rsplit_once('.')
            .ok_or_else(|| invalid(format!("expected @kind.function, found `{token}`")))?;
        let filter = if self.eat("filter") {
            self.decode_filter()?
        } else {
            BooleanExpression::True
        };
        Ok(PermissionFunction::Specified {
            kind: kind.to_string(),
            channel: channel.to_string(),
            filter,
            schema: None,
        })
    }

    fn decode_bookkeeping(&mut self) -> Result<Bookkeeping, Error> {
        self.expect("bookkeeping")?;
        let intent = match self.next()? {
            "special" => {
                let token = self.next()?;
                let name = token
                    .strip_prefix("special:")
                    .ok_or_else(|| invalid(format!("expected special:NAME, found `{token}`")))?;
                BookkeepingIntent::Special(name.to_string())
            }
            "choice" => {
                let token = self.next()?;
                let index = token
                    .parse::<i64>()
                    .map_err(|_| invalid(format!("expected a choice index, found `{token}`")))?;
                BookkeepingIntent::Choice(index)
            }
            "answer" => BookkeepingIntent::Answer(self.decode_value()?),
            "commands" => {
                let token = self.next()?;
                let category = token
                    .strip_prefix("category:")
                    .ok_or_else(|| invalid(format!("expected category:NAME, found `{token}`")))?
                    .to_string();
                let device = if self.at_end() {
                    None
                } else {
                    Some(self.decode_value()?)
                };
                BookkeepingIntent::CommandList { device, category }
            }
            other => return Err(invalid(format!("unknown bookkeeping intent `{other}`"))),
        };
        Ok(Bookkeeping { intent, span: None })
    }

    fn decode_dialogue(&mut self) -> Result<DialogueState, Error> {
        self.expect("$dialogue")?;
        let token = self.next()?;
        let act_name = token
            .strip_prefix('@')
            .ok_or_else(|| invalid(format!("expected @policy.act, found `{token}`")))?;
        let (policy, dialogue_act) = act_name
            .rsplit_once('.')
            .ok_or_else(|| invalid(format!("expected @policy.act, found `{token}`")))?;

        let mut dialogue_act_param = Vec::new();
        if self.eat("(") {
            loop {
                let (name, _) = self.decode_param_token()?;
                dialogue_act_param.push(name);
                if !self.eat(",") {
                    break;
                }
            }
            self.expect(")")?;
        }

        let mut history = Vec::new();
        while self.eat(";") {
            let statement = self.decode_statement()?;
            history.push(DialogueHistoryItem {
                statement,
                results: None,
                confirm: ConfirmationState::Accepted,
            });
        }

        Ok(DialogueState {
            policy: policy.to_string(),
            dialogue_act: dialogue_act.to_string(),
            dialogue_act_param,
            history,
            span: None,
        })
    }
}

/// Parse `param:NAME` or `param:NAME:TYPE`.
pub(crate) fn parse_param_token(token: &str) -> Option<(String, Option<Type>)> {
    let rest = token.strip_prefix("param:")?;
    match rest.split_once(':') {
        None => Some((rest.to_string(), None)),
        Some((name, tag)) => Some((name.to_string(), Type::parse(tag))),
    }
}
