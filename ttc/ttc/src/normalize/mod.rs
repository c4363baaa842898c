//! Canonicalisation of typechecked programs. Pure AST to AST, idempotent,
//! never fails on typechecked input.

mod filter;
#[cfg(test)]
mod test;

use std::collections::HashSet;

use ttc_parser::ast::fold::{self, AstFold};
use ttc_parser::ast::*;

pub(crate) use filter::optimize_filter;

/// Rewrite a typechecked input into canonical form: filters in CNF, merged
/// projections, filters pushed into joins, trivial computes removed, minimal
/// projections widened, selector attributes canonicalised.
pub fn normalize(input: Input) -> Input {
    // normalization introduces no errors on typechecked input
    Normalizer.fold_input(input).unwrap()
}

struct Normalizer;

impl AstFold for Normalizer {
    fn fold_filter(&mut self, filter: BooleanExpression) -> Result<BooleanExpression, ttc_parser::Error> {
        let filter = fold::fold_filter(self, filter)?;
        Ok(optimize_filter(filter))
    }

    fn fold_selector(&mut self, selector: DeviceSelector) -> Result<DeviceSelector, ttc_parser::Error> {
        let mut selector = fold::fold_selector(self, selector)?;
        let mut attributes = Vec::new();
        for attr in std::mem::take(&mut selector.attributes) {
            match (attr.name.as_str(), &attr.value.kind) {
                ("id", ValueKind::String(id)) => selector.id = Some(id.clone()),
                ("all", ValueKind::Boolean(all)) => selector.all = *all,
                _ => attributes.push(attr),
            }
        }
        attributes.sort_by(|a, b| a.name.cmp(&b.name));
        selector.attributes = attributes;
        Ok(selector)
    }

    fn fold_table_kind(&mut self, kind: TableKind) -> Result<TableKind, ttc_parser::Error> {
        let kind = fold::fold_table_kind(self, kind)?;
        Ok(optimize_table_kind(kind))
    }

    fn fold_stream_kind(&mut self, kind: StreamKind) -> Result<StreamKind, ttc_parser::Error> {
        let kind = fold::fold_stream_kind(self, kind)?;
        Ok(optimize_stream_kind(kind))
    }
}

fn optimize_table_kind(kind: TableKind) -> TableKind {
    match kind {
        // true filters are vacuous; false filters stay (an empty table is
        // not the same as the unfiltered one)
        TableKind::Filter { table, filter } if filter.is_true() => table.kind,

        // adjacent filters conjoin
        TableKind::Filter { table, filter } => {
            let span = table.span;
            match table.kind {
                TableKind::Filter {
                    table: inner,
                    filter: inner_filter,
                } => TableKind::Filter {
                    table: inner,
                    filter: optimize_filter(BooleanExpression::and(vec![inner_filter, filter])),
                },
                TableKind::Join {
                    lhs,
                    rhs,
                    in_params,
                } => push_filter_into_join(*lhs, *rhs, in_params, filter),
                kind => TableKind::Filter {
                    table: Box::new(Table { kind, span }),
                    filter,
                },
            }
        }

        TableKind::Projection { table, args } => optimize_projection(*table, args),

        // a compute of a column that already exists adds nothing
        TableKind::Compute {
            table,
            expression,
            alias: None,
        } if expression.kind.is_var_ref() => table.kind,

        // a compute identical to the one below it is flattened away
        TableKind::Compute {
            table,
            expression,
            alias,
        } => {
            let duplicate = matches!(
                &table.kind,
                TableKind::Compute { expression: inner, .. }
                    if compute_key(inner) == compute_key(&expression)
            );
            if duplicate {
                table.kind
            } else {
                TableKind::Compute {
                    table,
                    expression,
                    alias,
                }
            }
        }

        other => other,
    }
}

fn optimize_stream_kind(kind: StreamKind) -> StreamKind {
    match kind {
        StreamKind::Filter { stream, filter } if filter.is_true() => stream.kind,
        StreamKind::Filter { stream, filter } => {
            let span = stream.span;
            match stream.kind {
                StreamKind::Filter {
                    stream: inner,
                    filter: inner_filter,
                } => StreamKind::Filter {
                    stream: inner,
                    filter: optimize_filter(BooleanExpression::and(vec![inner_filter, filter])),
                },
                kind => StreamKind::Filter {
                    stream: Box::new(Stream { kind, span }),
                    filter,
                },
            }
        }
        StreamKind::Projection { stream, args } => {
            let span = stream.span;
            match stream.kind {
                StreamKind::Projection {
                    stream: inner,
                    args: inner_args,
                } => StreamKind::Projection {
                    stream: inner,
                    args: intersect(inner_args, args),
                },
                kind => StreamKind::Projection {
                    stream: Box::new(Stream { kind, span }),
                    args,
                },
            }
        }
        other => other,
    }
}

fn optimize_projection(table: Table, args: Vec<String>) -> TableKind {
    // an empty list means "all output params": nothing to restrict
    if args.is_empty() {
        return table.kind;
    }

    let Table { kind, span } = table;
    let table = match kind {
        // a projection of a projection collapses to one
        TableKind::Projection {
            table: inner,
            args: inner_args,
        } => return optimize_projection(*inner, intersect(inner_args, args)),
        kind => Table { kind, span },
    };

    let mut args = args;

    // the compute alias below must survive the projection
    if let TableKind::Compute {
        expression, alias, ..
    } = &table.kind
    {
        let name = alias
            .clone()
            .unwrap_or_else(|| crate::codegen::write_value(expression));
        if !args.contains(&name) {
            args.push(name);
        }
    }

    // widen to the function's minimal projection
    if let Some(schema) = innermost_schema(&table) {
        for required in schema.minimal_projection() {
            if !args.contains(&required) {
                args.push(required);
            }
        }

        // a projection of the full schema is vacuous
        let full: HashSet<&str> = schema.out_params().map(|a| a.name.as_str()).collect();
        let projected: HashSet<&str> = args.iter().map(|a| a.as_str()).collect();
        if projected == full {
            return table.kind;
        }
    }

    TableKind::Projection {
        table: Box::new(table),
        args,
    }
}

fn push_filter_into_join(
    lhs: Table,
    rhs: Table,
    in_params: Vec<InputParam>,
    filter: BooleanExpression,
) -> TableKind {
    let (lhs_names, rhs_names) = match (out_names(&lhs), out_names(&rhs)) {
        (Some(l), Some(r)) => (l, r),
        // without schemas we can't prove a split is safe
        _ => {
            return TableKind::Filter {
                table: Box::new(Table::new(TableKind::Join {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    in_params,
                })),
                filter,
            }
        }
    };

    let conjuncts = match filter {
        BooleanExpression::And(ops) => ops,
        other => vec![other],
    };

    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut mixed = Vec::new();
    for conjunct in conjuncts {
        let refs = conjunct.referenced_params();
        if !refs.is_empty() && refs.iter().all(|r| lhs_names.contains(*r)) {
            left.push(conjunct);
        } else if refs.iter().all(|r| rhs_names.contains(*r)) {
            right.push(conjunct);
        } else {
            mixed.push(conjunct);
        }
    }

    let apply = |table: Table, conjuncts: Vec<BooleanExpression>| -> Table {
        if conjuncts.is_empty() {
            return table;
        }
        let filter = optimize_filter(BooleanExpression::and(conjuncts));
        Table::new(optimize_table_kind(TableKind::Filter {
            table: Box::new(table),
            filter,
        }))
    };

    let join = TableKind::Join {
        lhs: Box::new(apply(lhs, left)),
        rhs: Box::new(apply(rhs, right)),
        in_params,
    };
    if mixed.is_empty() {
        join
    } else {
        TableKind::Filter {
            table: Box::new(Table::new(join)),
            filter: optimize_filter(BooleanExpression::and(mixed)),
        }
    }
}

/// The set of output parameter names a table produces, when its schemas are
/// resolved. `None` means we cannot tell.
fn out_names(table: &Table) -> Option<HashSet<String>> {
    match &table.kind {
        TableKind::Invocation(inv) => {
            let schema = inv.schema.as_ref()?;
            Some(schema.out_params().map(|a| a.name.clone()).collect())
        }
        TableKind::Projection { args, .. } if !args.is_empty() => {
            Some(args.iter().cloned().collect())
        }
        TableKind::Projection { table, .. }
        | TableKind::Filter { table, .. }
        | TableKind::Sort { table, .. }
        | TableKind::Index { table, .. }
        | TableKind::Slice { table, .. } => out_names(table),
        TableKind::Compute {
            table,
            expression,
            alias,
        } => {
            let mut names = out_names(table)?;
            names.insert(
                alias
                    .clone()
                    .unwrap_or_else(|| crate::codegen::write_value(expression)),
            );
            Some(names)
        }
        TableKind::Aggregation { field, alias, .. } => {
            let name = alias.clone().unwrap_or_else(|| match field {
                Some(f) => f.clone(),
                None => "count".to_string(),
            });
            Some(HashSet::from([name]))
        }
        TableKind::Alias { table, name } => {
            let names = out_names(table)?;
            let mut all: HashSet<String> =
                names.iter().map(|n| format!("{name}.{n}")).collect();
            all.extend(names);
            Some(all)
        }
        TableKind::Join { lhs, rhs, .. } => {
            let mut names = out_names(lhs)?;
            names.extend(out_names(rhs)?);
            Some(names)
        }
        TableKind::History { .. } | TableKind::VarRef { .. } => None,
    }
}

fn innermost_schema(table: &Table) -> Option<&std::sync::Arc<FunctionDef>> {
    match &table.kind {
        TableKind::Invocation(inv) => inv.schema.as_ref(),
        TableKind::Filter { table, .. }
        | TableKind::Projection { table, .. }
        | TableKind::Compute { table, .. }
        | TableKind::Sort { table, .. }
        | TableKind::Index { table, .. }
        | TableKind::Slice { table, .. }
        | TableKind::Alias { table, .. } => innermost_schema(table),
        _ => None,
    }
}

fn intersect(a: Vec<String>, b: Vec<String>) -> Vec<String> {
    // an empty list means "everything": intersection keeps the other side
    if a.is_empty() {
        return b;
    }
    if b.is_empty() {
        return a;
    }
    a.into_iter().filter(|x| b.contains(x)).collect()
}

/// Two compute expressions are the same column if they print the same.
fn compute_key(expression: &Value) -> String {
    crate::codegen::write_value(&strip_value_spans(expression.clone()))
}
