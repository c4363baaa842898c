use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ast::ops::FilterOp;
use crate::ast::primitive::Invocation;
use crate::ast::value::Value;
use crate::span::Span;

/// A filter over the rows of a table or stream.
///
/// After normalization filters are in conjunctive normal form: `And` is the
/// outermost connective, `Or` inside, atoms or negated atoms at the leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum BooleanExpression {
    True,
    False,
    And(Vec<BooleanExpression>),
    Or(Vec<BooleanExpression>),
    Not(Box<BooleanExpression>),
    Atom(AtomBooleanExpression),
    /// A comparison between two computed operands, `lhs op rhs`.
    Compute(ComputeBooleanExpression),
    /// The user explicitly said any value of this parameter is fine.
    DontCare { name: String },
    /// A subquery filter: `@kind.fn(...) { F }`.
    External(Box<ExternalBooleanExpression>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomBooleanExpression {
    pub name: String,
    pub operator: FilterOp,
    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeBooleanExpression {
    pub lhs: Value,
    pub operator: FilterOp,
    pub rhs: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalBooleanExpression {
    pub invocation: Invocation,
    pub filter: BooleanExpression,
}

impl BooleanExpression {
    pub fn atom<S: ToString>(name: S, operator: FilterOp, value: Value) -> Self {
        BooleanExpression::Atom(AtomBooleanExpression {
            name: name.to_string(),
            operator,
            value,
            span: None,
        })
    }

    /// Conjunction that absorbs `True` and flattens nested `And`s.
    pub fn and(operands: Vec<BooleanExpression>) -> Self {
        let mut flat = Vec::new();
        for op in operands {
            match op {
                BooleanExpression::True => {}
                BooleanExpression::False => return BooleanExpression::False,
                BooleanExpression::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => BooleanExpression::True,
            1 => flat.into_iter().next().unwrap(),
            _ => BooleanExpression::And(flat),
        }
    }

    /// Disjunction that absorbs `False` and flattens nested `Or`s.
    pub fn or(operands: Vec<BooleanExpression>) -> Self {
        let mut flat = Vec::new();
        for op in operands {
            match op {
                BooleanExpression::False => {}
                BooleanExpression::True => return BooleanExpression::True,
                BooleanExpression::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => BooleanExpression::False,
            1 => flat.into_iter().next().unwrap(),
            _ => BooleanExpression::Or(flat),
        }
    }

    /// The parameter names this filter refers to, in no particular order.
    pub fn referenced_params(&self) -> Vec<&str> {
        fn walk<'a>(f: &'a BooleanExpression, out: &mut Vec<&'a str>) {
            match f {
                BooleanExpression::True | BooleanExpression::False => {}
                BooleanExpression::And(ops) | BooleanExpression::Or(ops) => {
                    for op in ops {
                        walk(op, out);
                    }
                }
                BooleanExpression::Not(inner) => walk(inner, out),
                BooleanExpression::Atom(atom) => out.push(&atom.name),
                BooleanExpression::Compute(c) => {
                    collect_value_refs(&c.lhs, out);
                    collect_value_refs(&c.rhs, out);
                }
                BooleanExpression::DontCare { name } => out.push(name),
                BooleanExpression::External(e) => {
                    // in_params of the subquery may reference the outer scope
                    for ip in &e.invocation.in_params {
                        collect_value_refs(&ip.value, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

fn collect_value_refs<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    use crate::ast::value::ValueKind;
    match &value.kind {
        ValueKind::VarRef(name) => out.push(name),
        ValueKind::Array(elems) => {
            for e in elems {
                collect_value_refs(e, out);
            }
        }
        ValueKind::Computation { operands, .. } => {
            for o in operands {
                collect_value_refs(o, out);
            }
        }
        ValueKind::ArrayField { value, .. } | ValueKind::Filter { value, .. } => {
            collect_value_refs(value, out);
        }
        _ => {}
    }
}
