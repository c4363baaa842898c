//! Filter canonicalisation: conjunctive normal form with stable ordering,
//! absorption, deduplication and `or`-of-equalities fusion into `in_array`.

use itertools::Itertools;
use ttc_parser::ast::*;

/// Canonicalise a filter. Idempotent.
pub(crate) fn optimize_filter(filter: BooleanExpression) -> BooleanExpression {
    let filter = push_not(filter, false);
    let mut clauses = to_cnf(filter);

    for clause in &mut clauses {
        fuse_equalities(clause);
        // identical literals collapse; ordering is stable for hashing
        clause.sort_by_cached_key(literal_key);
        clause.dedup_by(|a, b| literal_key(a) == literal_key(b));
    }

    // a clause that is trivially true absorbs nothing and drops out
    clauses.retain(|clause| !clause.iter().any(|l| matches!(l, BooleanExpression::True)));

    clauses.sort_by_cached_key(|c| clause_key(c));
    clauses.dedup_by(|a, b| clause_key(a) == clause_key(b));

    rebuild(clauses)
}

/// Push negations down to the leaves (negation normal form). `negated` is
/// whether an odd number of `Not`s encloses the current node.
fn push_not(filter: BooleanExpression, negated: bool) -> BooleanExpression {
    use BooleanExpression::*;
    match filter {
        Not(inner) => push_not(*inner, !negated),
        True if negated => False,
        False if negated => True,
        And(ops) => {
            let ops = ops.into_iter().map(|op| push_not(op, negated)).collect();
            if negated {
                BooleanExpression::or(ops)
            } else {
                BooleanExpression::and(ops)
            }
        }
        Or(ops) => {
            let ops = ops.into_iter().map(|op| push_not(op, negated)).collect();
            if negated {
                BooleanExpression::and(ops)
            } else {
                BooleanExpression::or(ops)
            }
        }
        leaf if negated => Not(Box::new(leaf)),
        leaf => leaf,
    }
}

/// Clauses of a conjunctive normal form: an AND of ORs of literals. An empty
/// clause list is `true`; an empty clause is `false`.
fn to_cnf(filter: BooleanExpression) -> Vec<Vec<BooleanExpression>> {
    use BooleanExpression::*;
    match filter {
        True => vec![],
        False => vec![vec![]],
        And(ops) => ops.into_iter().flat_map(to_cnf).collect(),
        Or(ops) => {
            let mut acc: Vec<Vec<BooleanExpression>> = vec![vec![]];
            for op in ops {
                let op_clauses = to_cnf(op);
                if op_clauses.is_empty() {
                    // one true disjunct makes the whole disjunction true
                    return vec![];
                }
                acc = acc
                    .into_iter()
                    .cartesian_product(op_clauses)
                    .map(|(mut left, right)| {
                        left.extend(right);
                        left
                    })
                    .collect();
            }
            acc
        }
        leaf => vec![vec![leaf]],
    }
}

/// Fuse `p == c1 || p == c2 || ...` into `in_array(p, [c1, c2, ...])`.
fn fuse_equalities(clause: &mut Vec<BooleanExpression>) {
    let fusable = |lit: &BooleanExpression| match lit {
        BooleanExpression::Atom(atom) => {
            atom.operator == FilterOp::Eq && atom.value.is_constant()
        }
        _ => false,
    };

    // group the fusable equality atoms by parameter name
    let mut groups: Vec<(String, Vec<Value>, Option<ttc_parser::Span>)> = Vec::new();
    for lit in clause.iter() {
        if !fusable(lit) {
            continue;
        }
        if let BooleanExpression::Atom(atom) = lit {
            match groups.iter_mut().find(|(n, _, _)| *n == atom.name) {
                Some((_, values, _)) => {
                    if !values.contains(&atom.value) {
                        values.push(atom.value.clone());
                    }
                }
                None => groups.push((atom.name.clone(), vec![atom.value.clone()], atom.span)),
            }
        }
    }
    groups.retain(|(_, values, _)| values.len() >= 2);

    let mut emitted: Vec<String> = Vec::new();
    let old = std::mem::take(clause);
    for lit in old {
        let group = match &lit {
            BooleanExpression::Atom(atom) if fusable(&lit) => {
                groups.iter().find(|(n, _, _)| *n == atom.name)
            }
            _ => None,
        };
        match group {
            None => clause.push(lit),
            Some((name, values, span)) => {
                if !emitted.contains(name) {
                    emitted.push(name.clone());
                    clause.push(BooleanExpression::Atom(AtomBooleanExpression {
                        name: name.clone(),
                        operator: FilterOp::InArray,
                        value: Value::new(ValueKind::Array(values.clone())),
                        span: *span,
                    }));
                }
            }
        }
    }
}

fn rebuild(clauses: Vec<Vec<BooleanExpression>>) -> BooleanExpression {
    BooleanExpression::and(
        clauses
            .into_iter()
            .map(BooleanExpression::or)
            .collect(),
    )
}

/// A stable key for a literal, independent of source locations.
fn literal_key(lit: &BooleanExpression) -> String {
    let stripped = strip_filter_spans(lit.clone());
    let sort_rank = match &stripped {
        BooleanExpression::Atom(atom) => format!("0:{}:{}", atom.name, atom.operator),
        BooleanExpression::DontCare { name } => format!("1:{name}"),
        BooleanExpression::Compute(c) => format!("2:{}", c.operator),
        BooleanExpression::Not(_) => "3".to_string(),
        _ => "4".to_string(),
    };
    format!(
        "{sort_rank}:{}",
        serde_json::to_string(&stripped).unwrap_or_default()
    )
}

fn clause_key(clause: &[BooleanExpression]) -> String {
    clause.iter().map(literal_key).join("|")
}

#[cfg(test)]
mod test {
    use super::*;

    fn atom(name: &str, op: FilterOp, value: Value) -> BooleanExpression {
        BooleanExpression::atom(name, op, value)
    }

    #[test]
    fn test_or_of_equalities_fuses_to_in_array() {
        let filter = BooleanExpression::Or(vec![
            atom("labels", FilterOp::Eq, Value::string("a")),
            atom("labels", FilterOp::Eq, Value::string("b")),
        ]);
        let optimized = optimize_filter(filter);
        let fused = optimized.as_atom().unwrap();
        assert_eq!(fused.operator, FilterOp::InArray);
        let elems = fused.value.kind.as_array().unwrap();
        assert_eq!(elems.len(), 2);
    }

    #[test]
    fn test_cnf_shape() {
        // (a || (b && c)) becomes (a || b) && (a || c)
        let filter = BooleanExpression::Or(vec![
            atom("a", FilterOp::Eq, Value::number(1.0)),
            BooleanExpression::And(vec![
                atom("b", FilterOp::Eq, Value::number(2.0)),
                atom("c", FilterOp::Eq, Value::number(3.0)),
            ]),
        ]);
        let optimized = optimize_filter(filter);
        let conjuncts = optimized.as_and().unwrap();
        assert_eq!(conjuncts.len(), 2);
        for conjunct in conjuncts {
            assert_eq!(conjunct.as_or().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_absorption_and_dedup() {
        let a = atom("x", FilterOp::Ge, Value::number(5.0));
        let filter = BooleanExpression::And(vec![
            BooleanExpression::True,
            a.clone(),
            a.clone(),
        ]);
        assert_eq!(optimize_filter(filter), a);

        assert_eq!(
            optimize_filter(BooleanExpression::And(vec![
                BooleanExpression::False,
                a.clone()
            ])),
            BooleanExpression::False
        );
    }

    #[test]
    fn test_not_pushdown() {
        let a = atom("x", FilterOp::Eq, Value::number(1.0));
        let b = atom("y", FilterOp::Eq, Value::number(2.0));
        let filter = BooleanExpression::Not(Box::new(BooleanExpression::Or(vec![
            a.clone(),
            b.clone(),
        ])));
        let optimized = optimize_filter(filter);
        // !(a || b) = !a && !b
        let conjuncts = optimized.as_and().unwrap();
        assert_eq!(conjuncts.len(), 2);
        assert!(conjuncts.iter().all(|c| c.is_not()));
    }

    #[test]
    fn test_idempotent() {
        let filter = BooleanExpression::Or(vec![
            atom("labels", FilterOp::Eq, Value::string("b")),
            atom("labels", FilterOp::Eq, Value::string("a")),
            atom("size", FilterOp::Ge, Value::number(10.0)),
        ]);
        let once = optimize_filter(filter);
        let twice = optimize_filter(once.clone());
        assert_eq!(once, twice);
    }
}
