use ttc_parser::ast::*;

use super::{SeparatedExprs, WriteOpt, WriteSource};

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn write_number(n: f64) -> String {
    format!("{n}")
}

impl WriteSource for Value {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        self.kind.write(opt)
    }
}

impl WriteSource for ValueKind {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        use ValueKind::*;
        Some(match self {
            Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            String(s) => quote_string(s),
            Number(n) => write_number(*n),
            Measure { value, unit } => format!("{}{unit}", write_number(*value)),
            Currency { value, unit } => format!("{}${unit}", write_number(*value)),
            Date(date) => date.write(opt)?,
            Time(time) => format!("new Time({})", write_time(time)),
            Location(location) => location.write(opt)?,
            Entity {
                value,
                kind,
                display,
            } => {
                let mut r = match value {
                    Some(v) => quote_string(v),
                    None => "null".to_string(),
                };
                r += &format!("^^{kind}");
                if let Some(display) = display {
                    r += &format!("({})", quote_string(display));
                }
                r
            }
            Enum(variant) => format!("enum({variant})"),
            Array(elems) => SeparatedExprs {
                exprs: elems,
                inline: ", ",
            }
            .write_between("[", "]", opt)?,
            Object(fields) => {
                let fields = fields
                    .iter()
                    .map(|(k, v)| Some(format!("{k}={}", v.write(opt.clone())?)))
                    .collect::<Option<Vec<_>>>()?;
                format!("{{ {} }}", fields.join(", "))
            }
            VarRef(name) => name.clone(),
            Event(None) => "$event".to_string(),
            Event(Some(field)) => format!("$event.{field}"),
            ContextRef { name, ty } => format!("$context.{name} : {ty}"),
            Computation { op, operands } => {
                if op.is_infix() && operands.len() == 2 {
                    format!(
                        "({} {op} {})",
                        operands[0].write(opt.clone())?,
                        operands[1].write(opt)?
                    )
                } else {
                    let operands = SeparatedExprs {
                        exprs: operands,
                        inline: ", ",
                    }
                    .write(opt)?;
                    format!("{op}({operands})")
                }
            }
            ArrayField { field, value } => format!("({field} of {})", value.write(opt)?),
            Filter { value, filter } => {
                format!(
                    "{} filter {{ {} }}",
                    value.write(opt.clone())?,
                    filter.write(opt)?
                )
            }
            Undefined { .. } => "$undefined".to_string(),
        })
    }
}

fn write_time(time: &TimeValue) -> String {
    if time.second != 0 {
        format!("{}, {}, {}", time.hour, time.minute, time.second)
    } else {
        format!("{}, {}", time.hour, time.minute)
    }
}

impl WriteSource for DateValue {
    fn write(&self, _opt: WriteOpt) -> Option<String> {
        Some(match self {
            DateValue::Now => "new Date()".to_string(),
            DateValue::Absolute(dt) => {
                if dt.hour == 0 && dt.minute == 0 && dt.second == 0 {
                    format!("new Date({}, {}, {})", dt.year, dt.month, dt.day)
                } else {
                    format!(
                        "new Date({}, {}, {}, {}, {}, {})",
                        dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
                    )
                }
            }
            DateValue::Edge { edge, unit } => format!("{edge}({unit})"),
            DateValue::Piece {
                year,
                month,
                day,
                time,
            } => {
                let part = |p: Option<i64>| p.map(|v| v.to_string()).unwrap_or_default();
                let mut r = format!(
                    "new Date({}, {}, {}",
                    part(year.map(i64::from)),
                    part(month.map(i64::from)),
                    part(day.map(i64::from))
                );
                if let Some(time) = time {
                    r += &format!(", {}", write_time(time));
                }
                r += ")";
                r
            }
        })
    }
}

impl WriteSource for LocationValue {
    fn write(&self, _opt: WriteOpt) -> Option<String> {
        Some(match self {
            LocationValue::Absolute {
                latitude,
                longitude,
                display,
            } => {
                let mut r = format!(
                    "new Location({}, {}",
                    write_number(*latitude),
                    write_number(*longitude)
                );
                if let Some(display) = display {
                    r += &format!(", {}", quote_string(display));
                }
                r += ")";
                r
            }
            LocationValue::Relative(name) => format!("$context.location.{name}"),
            LocationValue::Unresolved(name) => format!("new Location({})", quote_string(name)),
        })
    }
}

impl WriteSource for BooleanExpression {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        use BooleanExpression::*;
        Some(match self {
            True => "true".to_string(),
            False => "false".to_string(),
            And(operands) => {
                let parts = operands
                    .iter()
                    .map(|operand| {
                        let text = operand.write(opt.clone())?;
                        Some(if matches!(operand, Or(_)) {
                            format!("({text})")
                        } else {
                            text
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                parts.join(" && ")
            }
            Or(operands) => {
                let parts = operands
                    .iter()
                    .map(|operand| {
                        let text = operand.write(opt.clone())?;
                        Some(if matches!(operand, And(_)) {
                            format!("({text})")
                        } else {
                            text
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                parts.join(" || ")
            }
            Not(inner) => match inner.as_ref() {
                Atom(_) | DontCare { .. } | True | False => format!("!{}", inner.write(opt)?),
                _ => format!("!({})", inner.write(opt)?),
            },
            Atom(atom) => format!(
                "{} {} {}",
                atom.name,
                atom.operator,
                atom.value.write(opt)?
            ),
            Compute(c) => format!(
                "{} {} {}",
                c.lhs.write(opt.clone())?,
                c.operator,
                c.rhs.write(opt)?
            ),
            DontCare { name } => format!("true({name})"),
            External(e) => format!(
                "{} {{ {} }}",
                e.invocation.write(opt.clone())?,
                e.filter.write(opt)?
            ),
        })
    }
}

impl WriteSource for InputParam {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        Some(format!("{}={}", self.name, self.value.write(opt)?))
    }
}

impl WriteSource for Invocation {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let selector = &self.selector;
        let params = SeparatedExprs {
            exprs: &self.in_params,
            inline: ", ",
        }
        .write(opt.clone())?;

        let mut attributes: Vec<String> = Vec::new();
        if let Some(id) = &selector.id {
            attributes.push(format!("id={}", quote_string(id)));
        }
        if selector.all {
            attributes.push("all=true".to_string());
        }
        for attr in &selector.attributes {
            attributes.push(attr.write(opt.clone())?);
        }

        Some(if attributes.is_empty() {
            format!("@{}.{}({params})", selector.kind, self.channel)
        } else {
            format!(
                "@{}({}).{}({params})",
                selector.kind,
                attributes.join(", "),
                self.channel
            )
        })
    }
}

impl WriteSource for Action {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        match self {
            Action::Notify(kind) => Some(kind.to_string()),
            Action::Invocation(inv) => inv.write(opt),
        }
    }
}

/// Tables in operand position (after `of`, as a join operand, as the base of
/// an index) must be primaries; anything else gets parenthesized.
fn write_table_operand(table: &Table, opt: WriteOpt) -> Option<String> {
    match &table.kind {
        TableKind::Invocation(_)
        | TableKind::VarRef { .. }
        | TableKind::History { .. }
        | TableKind::Projection { .. }
        | TableKind::Aggregation { .. }
        | TableKind::Sort { .. }
        | TableKind::Compute { .. } => table.write(opt),
        _ => table.write_between("(", ")", opt),
    }
}

impl WriteSource for Table {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        use TableKind::*;
        Some(match &self.kind {
            Invocation(inv) => inv.write(opt)?,
            Filter { table, filter } => format!(
                "{}, {}",
                write_table_operand(table, opt.clone())?,
                filter.write(opt)?
            ),
            Projection { table, args } => format!(
                "[{}] of {}",
                args.join(", "),
                write_table_operand(table, opt)?
            ),
            Compute {
                table,
                expression,
                alias,
            } => {
                let alias = match alias {
                    Some(alias) => format!(" as {alias}"),
                    None => String::new(),
                };
                format!(
                    "compute {}{alias} of {}",
                    expression.write(opt.clone())?,
                    write_table_operand(table, opt)?
                )
            }
            Aggregation {
                table,
                op,
                field,
                alias: _,
            } => {
                let field = match field {
                    Some(field) => format!("{field} "),
                    None => String::new(),
                };
                format!("aggregate {op} {field}of {}", write_table_operand(table, opt)?)
            }
            Sort {
                table,
                field,
                direction,
            } => format!(
                "sort {field} {direction} of {}",
                write_table_operand(table, opt)?
            ),
            Index { table, indices } => format!(
                "{}[{}]",
                write_table_operand(table, opt.clone())?,
                SeparatedExprs {
                    exprs: indices,
                    inline: ", "
                }
                .write(opt)?
            ),
            Slice { table, base, limit } => format!(
                "{}[{}:{}]",
                write_table_operand(table, opt.clone())?,
                base.write(opt.clone())?,
                limit.write(opt)?
            ),
            Join {
                lhs,
                rhs,
                in_params,
            } => {
                let mut r = format!(
                    "{} join {}",
                    write_table_operand(lhs, opt.clone())?,
                    write_table_operand(rhs, opt.clone())?
                );
                if !in_params.is_empty() {
                    r += &format!(
                        " on ({})",
                        SeparatedExprs {
                            exprs: in_params,
                            inline: ", "
                        }
                        .write(opt)?
                    );
                }
                r
            }
            Alias { table, name } => {
                format!("{} as {name}", write_table_operand(table, opt)?)
            }
            History {
                kind,
                channel,
                index,
            } => match index {
                Some(index) => {
                    format!("result(@{kind}.{channel}[{}])", index.write(opt)?)
                }
                None => format!("result(@{kind}.{channel})"),
            },
            VarRef { name, in_params } => {
                if in_params.is_empty() {
                    name.clone()
                } else {
                    format!(
                        "{name}({})",
                        SeparatedExprs {
                            exprs: in_params,
                            inline: ", "
                        }
                        .write(opt)?
                    )
                }
            }
        })
    }
}

fn write_stream_operand(stream: &Stream, opt: WriteOpt) -> Option<String> {
    match &stream.kind {
        StreamKind::Timer { .. }
        | StreamKind::AtTimer { .. }
        | StreamKind::Monitor { .. }
        | StreamKind::EdgeFilter { .. }
        | StreamKind::EdgeNew { .. }
        | StreamKind::Projection { .. }
        | StreamKind::Compute { .. }
        | StreamKind::VarRef { .. } => stream.write(opt),
        _ => stream.write_between("(", ")", opt),
    }
}

impl WriteSource for Stream {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        use StreamKind::*;
        Some(match &self.kind {
            Timer {
                base,
                interval,
                frequency,
            } => {
                let mut r = format!(
                    "timer(base={}, interval={}",
                    base.write(opt.clone())?,
                    interval.write(opt.clone())?
                );
                if let Some(frequency) = frequency {
                    r += &format!(", frequency={}", frequency.write(opt)?);
                }
                r += ")";
                r
            }
            AtTimer {
                times,
                expiration_date,
            } => {
                let times = SeparatedExprs {
                    exprs: times,
                    inline: ", ",
                }
                .write(opt.clone())?;
                let mut r = format!("attimer(time=[{times}]");
                if let Some(expiration_date) = expiration_date {
                    r += &format!(", expiration_date={}", expiration_date.write(opt)?);
                }
                r += ")";
                r
            }
            Monitor { table, args } => {
                let mut r = format!("monitor {}", write_table_operand(table, opt)?);
                if let Some(args) = args {
                    r += &format!(" on new [{}]", args.join(", "));
                }
                r
            }
            EdgeFilter { stream, filter } => format!(
                "edge ({}) on {}",
                stream.write(opt.clone())?,
                filter.write(opt)?
            ),
            EdgeNew { stream } => format!("edge ({}) on new", stream.write(opt)?),
            Filter { stream, filter } => format!(
                "{}, {}",
                write_stream_operand(stream, opt.clone())?,
                filter.write(opt)?
            ),
            Projection { stream, args } => format!(
                "[{}] of {}",
                args.join(", "),
                write_stream_operand(stream, opt)?
            ),
            Compute {
                stream,
                expression,
                alias,
            } => {
                let alias = match alias {
                    Some(alias) => format!(" as {alias}"),
                    None => String::new(),
                };
                format!(
                    "compute {}{alias} of {}",
                    expression.write(opt.clone())?,
                    write_stream_operand(stream, opt)?
                )
            }
            Join {
                stream,
                table,
                in_params,
            } => {
                let mut r = format!(
                    "{} join {}",
                    write_stream_operand(stream, opt.clone())?,
                    write_table_operand(table, opt.clone())?
                );
                if !in_params.is_empty() {
                    r += &format!(
                        " on ({})",
                        SeparatedExprs {
                            exprs: in_params,
                            inline: ", "
                        }
                        .write(opt)?
                    );
                }
                r
            }
            Alias { stream, name } => {
                format!("{} as {name}", write_stream_operand(stream, opt)?)
            }
            VarRef { name, in_params } => {
                if in_params.is_empty() {
                    name.clone()
                } else {
                    format!(
                        "{name}({})",
                        SeparatedExprs {
                            exprs: in_params,
                            inline: ", "
                        }
                        .write(opt)?
                    )
                }
            }
        })
    }
}

/// `#_[...]` then `#[...]` annotations, one per line, indented one level
/// below their target.
fn write_annotations(
    nl: &AnnotationMap,
    implementation: &AnnotationMap,
    opt: &WriteOpt,
) -> Option<String> {
    let mut r = String::new();
    let inner = opt.indented();
    for (key, value) in nl {
        r += &format!("\n{}#_[{key}={}]", inner.write_indent(), value.write(inner.clone())?);
    }
    for (key, value) in implementation {
        r += &format!("\n{}#[{key}={}]", inner.write_indent(), value.write(inner.clone())?);
    }
    Some(r)
}

/// The same annotations, space-separated on one line; used inside argument
/// lists.
fn write_annotations_inline(
    nl: &AnnotationMap,
    implementation: &AnnotationMap,
    opt: &WriteOpt,
) -> Option<String> {
    let mut r = String::new();
    for (key, value) in nl {
        r += &format!(" #_[{key}={}]", value.write(opt.clone())?);
    }
    for (key, value) in implementation {
        r += &format!(" #[{key}={}]", value.write(opt.clone())?);
    }
    Some(r)
}

impl WriteSource for Statement {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        use StatementKind::*;
        Some(match &self.kind {
            Rule { stream, actions } => format!(
                "{} => {};",
                stream.write(opt.clone())?,
                SeparatedExprs {
                    exprs: actions,
                    inline: " => "
                }
                .write(opt)?
            ),
            Command { table, actions } => {
                let actions = SeparatedExprs {
                    exprs: actions,
                    inline: " => ",
                }
                .write(opt.clone())?;
                match table {
                    Some(table) => format!("now => {} => {actions};", table.write(opt)?),
                    None => format!("now => {actions};"),
                }
            }
            Assignment { name, value } => {
                format!("let {name} := {};", value.write(opt)?)
            }
            Declaration(decl) => decl.write(opt)?,
            OnInputChoice(choice) => {
                // grouped back into an `oninput { ... }` block by the
                // program writer
                let actions = SeparatedExprs {
                    exprs: &choice.actions,
                    inline: " => ",
                }
                .write(opt.clone())?;
                let body = match &choice.table {
                    Some(table) => format!("now => {} => {actions}", table.write(opt.clone())?),
                    None => format!("now => {actions}"),
                };
                format!(
                    "{body}{};",
                    write_annotations(&choice.nl_annotations, &choice.annotations, &opt)?
                )
            }
        })
    }
}

impl WriteSource for Declaration {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let args = if self.args.is_empty() {
            String::new()
        } else {
            let args = self
                .args
                .iter()
                .map(|(name, ty)| format!("{name} : {ty}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({args})")
        };
        let body = match &self.value {
            DeclarationValue::Table(table) => table.write(opt.clone())?,
            DeclarationValue::Stream(stream) => stream.write(opt.clone())?,
            DeclarationValue::Action(inv) => inv.write(opt.clone())?,
        };
        Some(format!(
            "let {} {}{args} := {body}{};",
            self.value.keyword(),
            self.name,
            write_annotations(&self.nl_annotations, &self.annotations, &opt)?
        ))
    }
}

impl WriteSource for Program {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let mut lines = Vec::new();
        for class in &self.classes {
            lines.push(class.write(opt.clone())?);
        }

        let mut statements = self.statements.iter().peekable();
        while let Some(statement) = statements.next() {
            if statement.kind.is_on_input_choice() {
                // consecutive choices form one block
                let mut block = vec![statement];
                while let Some(next) = statements.peek() {
                    if next.kind.is_on_input_choice() {
                        block.push(statements.next().unwrap());
                    } else {
                        break;
                    }
                }
                let inner = opt.indented();
                let mut r = "oninput {".to_string();
                for choice in block {
                    r += &format!("\n{}{}", inner.write_indent(), choice.write(inner.clone())?);
                }
                r += &format!("\n{}}}", opt.write_indent());
                lines.push(r);
            } else {
                lines.push(statement.write(opt.clone())?);
            }
        }
        Some(lines.join("\n"))
    }
}

impl WriteSource for PermissionFunction {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        Some(match self {
            PermissionFunction::Builtin => String::new(),
            PermissionFunction::Star => "*".to_string(),
            PermissionFunction::ClassStar(kind) => format!("@{kind}.*"),
            PermissionFunction::Specified {
                kind,
                channel,
                filter,
                ..
            } => {
                if filter.is_true() {
                    format!("@{kind}.{channel}")
                } else {
                    format!("@{kind}.{channel}, {}", filter.write(opt)?)
                }
            }
        })
    }
}

impl WriteSource for PermissionRule {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let query = match &self.query {
            PermissionFunction::Builtin => "now".to_string(),
            other => other.write(opt.clone())?,
        };
        let action = match &self.action {
            PermissionFunction::Builtin => "notify".to_string(),
            other => other.write(opt.clone())?,
        };
        Some(format!(
            "{} : {query} => {action};",
            self.principal.write(opt)?
        ))
    }
}

impl WriteSource for ClassDef {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let mut r = format!("class @{}", self.kind);
        if !self.extends.is_empty() {
            r += &format!(
                " extends {}",
                self.extends
                    .iter()
                    .map(|e| format!("@{e}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        r += &write_annotations(&self.nl_annotations, &self.annotations, &opt)?;
        r += " {";

        let inner = opt.indented();
        for import in &self.imports {
            r += &format!(
                "\n{}import {} from @{}({});",
                inner.write_indent(),
                import.facet,
                import.module,
                SeparatedExprs {
                    exprs: &import.in_params,
                    inline: ", "
                }
                .write(inner.clone())?
            );
        }
        for def in self.queries.values().chain(self.actions.values()) {
            r += &format!("\n{}{}", inner.write_indent(), def.write(inner.clone())?);
        }
        for entity in &self.entities {
            r += &format!(
                "\n{}entity {}{};",
                inner.write_indent(),
                entity.name,
                write_annotations(&entity.nl_annotations, &entity.annotations, &inner)?
            );
        }
        r += &format!("\n{}}}", opt.write_indent());
        Some(r)
    }
}

impl WriteSource for FunctionDef {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let mut r = String::new();
        if self.is_monitorable {
            r += "monitorable ";
        }
        if self.is_list {
            r += "list ";
        }
        r += self.function_type.as_ref();
        r += &format!(" {}", self.name);

        let args = self
            .args
            .iter()
            .map(|arg| {
                Some(format!(
                    "{} {} : {}{}",
                    arg.direction,
                    arg.name,
                    arg.ty,
                    write_annotations_inline(&arg.nl_annotations, &arg.annotations, &opt)?
                ))
            })
            .collect::<Option<Vec<_>>>()?;
        r += &format!("({})", args.join(", "));
        r += &write_annotations(&self.nl_annotations, &self.annotations, &opt)?;
        r += ";";
        Some(r)
    }
}

impl WriteSource for Dataset {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let mut r = format!(
            "dataset @{} language {}",
            self.name,
            quote_string(&self.language)
        );
        r += " {";
        let inner = opt.indented();
        for example in &self.examples {
            r += &format!("\n{}{}", inner.write_indent(), example.write(inner.clone())?);
        }
        r += &format!("\n{}}}", opt.write_indent());
        Some(r)
    }
}

impl WriteSource for Example {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let args = if self.args.is_empty() {
            String::new()
        } else {
            let args = self
                .args
                .iter()
                .map(|(name, ty)| format!("{name} : {ty}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(" ({args})")
        };
        let body = match &self.value {
            ExampleValue::Query(table) => table.write(opt.clone())?,
            ExampleValue::Stream(stream) => stream.write(opt.clone())?,
            ExampleValue::Action(inv) => inv.write(opt.clone())?,
            ExampleValue::Program(program) => {
                format!("{{ {} }}", program.write(opt.clone())?)
            }
        };

        let mut annotations = String::new();
        let inner = opt.indented();
        if !self.utterances.is_empty() {
            let utterances = self
                .utterances
                .iter()
                .map(|u| quote_string(u))
                .collect::<Vec<_>>()
                .join(", ");
            annotations += &format!("\n{}#_[utterances=[{utterances}]]", inner.write_indent());
        }
        if self.id >= 0 {
            annotations += &format!("\n{}#[id={}]", inner.write_indent(), self.id);
        }
        for (key, value) in &self.annotations {
            annotations += &format!(
                "\n{}#[{key}={}]",
                inner.write_indent(),
                value.write(inner.clone())?
            );
        }

        Some(format!(
            "{}{args} := {body}{annotations};",
            self.value.keyword()
        ))
    }
}

impl WriteSource for Bookkeeping {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let intent = match &self.intent {
            BookkeepingIntent::Special(name) => format!("special({name})"),
            BookkeepingIntent::Choice(index) => format!("choice({index})"),
            BookkeepingIntent::Answer(value) => format!("answer({})", value.write(opt)?),
            BookkeepingIntent::CommandList { device, category } => {
                let mut r = "commands(".to_string();
                if let Some(device) = device {
                    r += &format!("device={}, ", device.write(opt)?);
                }
                r += &format!("category={})", quote_string(category));
                r
            }
        };
        Some(format!("bookkeeping({intent});"))
    }
}

impl WriteSource for ControlCommand {
    fn write(&self, _opt: WriteOpt) -> Option<String> {
        Some(format!("${};", self.intent))
    }
}

impl WriteSource for DialogueState {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let mut r = format!("$dialogue @{}.{}", self.policy, self.dialogue_act);
        if !self.dialogue_act_param.is_empty() {
            r += &format!("({})", self.dialogue_act_param.join(", "));
        }
        r += ";";

        for item in &self.history {
            r += &format!("\n{}", item.write(opt.clone())?);
        }
        Some(r)
    }
}

impl WriteSource for DialogueHistoryItem {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        // reuse the statement writer, then splice the annotations in front
        // of the final `;`
        let statement = self.statement.write(opt.clone())?;
        let statement = statement.strip_suffix(';')?;

        let mut annotations = String::new();
        let inner = opt.indented();
        if let Some(results) = &self.results {
            let items = results
                .results
                .iter()
                .map(|item| {
                    let fields = item
                        .value
                        .iter()
                        .map(|(k, v)| Some(format!("{k}={}", v.write(inner.clone())?)))
                        .collect::<Option<Vec<_>>>()?;
                    Some(format!("{{ {} }}", fields.join(", ")))
                })
                .collect::<Option<Vec<_>>>()?;
            annotations += &format!(
                "\n{}#[results=[{}]]",
                inner.write_indent(),
                items.join(", ")
            );
            if results.count.kind != ValueKind::Number(results.results.len() as f64) {
                annotations += &format!(
                    "\n{}#[count={}]",
                    inner.write_indent(),
                    results.count.write(inner.clone())?
                );
            }
            if results.more {
                annotations += &format!("\n{}#[more=true]", inner.write_indent());
            }
            if let Some(error) = &results.error {
                annotations += &format!(
                    "\n{}#[error={}]",
                    inner.write_indent(),
                    error.write(inner.clone())?
                );
            }
        }

        let default_confirm = if self.results.is_some() {
            ConfirmationState::ConfirmedAndExecuted
        } else {
            ConfirmationState::Accepted
        };
        if self.confirm != default_confirm {
            annotations += &format!(
                "\n{}#[confirm=enum({})]",
                inner.write_indent(),
                self.confirm
            );
        }

        Some(format!("{statement}{annotations};"))
    }
}

impl WriteSource for Library {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let mut parts = Vec::new();
        for class in &self.classes {
            parts.push(class.write(opt.clone())?);
        }
        for dataset in &self.datasets {
            parts.push(dataset.write(opt.clone())?);
        }
        Some(parts.join("\n"))
    }
}

impl WriteSource for Input {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        match self {
            Input::Program(program) => program.write(opt),
            Input::PermissionRule(rule) => rule.write(opt),
            Input::Library(library) => library.write(opt),
            Input::Dataset(dataset) => dataset.write(opt),
            Input::Bookkeeping(bookkeeping) => bookkeeping.write(opt),
            Input::ControlCommand(command) => command.write(opt),
            Input::DialogueState(state) => state.write(opt),
        }
    }
}
