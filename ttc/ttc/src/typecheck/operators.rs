use std::collections::HashMap;

use once_cell::sync::Lazy;
use ttc_parser::ast::{FilterOp, ScalarOp};
use ttc_parser::ty::Type;

/// One admissible signature of a filter operator. Type variables unify the
/// two sides; an extra domain restriction applies to the ordering operators.
pub struct Overload {
    pub lhs: Type,
    pub rhs: Type,
    /// variables resolved against this list must land on one of these, when
    /// the list is non-empty
    pub domain: &'static [Type],
}

const ORDERED: &[Type] = &[
    Type::Number,
    Type::Currency,
    Type::String,
    Type::Date,
    Type::Time,
];

fn tv() -> Type {
    Type::TypeVar(0)
}

static OVERLOADS: Lazy<HashMap<FilterOp, Vec<Overload>>> = Lazy::new(|| {
    HashMap::from([
        (
            FilterOp::Eq,
            vec![Overload {
                lhs: tv(),
                rhs: tv(),
                domain: &[],
            }],
        ),
        (
            FilterOp::Ge,
            vec![Overload {
                lhs: tv(),
                rhs: tv(),
                domain: ORDERED,
            }],
        ),
        (
            FilterOp::Le,
            vec![Overload {
                lhs: tv(),
                rhs: tv(),
                domain: ORDERED,
            }],
        ),
        (
            FilterOp::Substr,
            vec![Overload {
                lhs: Type::String,
                rhs: Type::String,
                domain: &[],
            }],
        ),
        (
            FilterOp::RevSubstr,
            vec![Overload {
                lhs: Type::String,
                rhs: Type::String,
                domain: &[],
            }],
        ),
        (
            FilterOp::Contains,
            vec![Overload {
                lhs: Type::Array(Box::new(Type::TypeVar(0))),
                rhs: tv(),
                domain: &[],
            }],
        ),
        (
            FilterOp::ContainsSubstr,
            vec![Overload {
                lhs: Type::Array(Box::new(Type::String)),
                rhs: Type::String,
                domain: &[],
            }],
        ),
        (
            FilterOp::InArray,
            vec![Overload {
                lhs: tv(),
                rhs: Type::Array(Box::new(Type::TypeVar(0))),
                domain: &[],
            }],
        ),
        (
            FilterOp::StartsWith,
            vec![Overload {
                lhs: Type::String,
                rhs: Type::String,
                domain: &[],
            }],
        ),
        (
            FilterOp::EndsWith,
            vec![Overload {
                lhs: Type::String,
                rhs: Type::String,
                domain: &[],
            }],
        ),
        (
            FilterOp::PrefixOf,
            vec![Overload {
                lhs: Type::String,
                rhs: Type::String,
                domain: &[],
            }],
        ),
        (
            FilterOp::SuffixOf,
            vec![Overload {
                lhs: Type::String,
                rhs: Type::String,
                domain: &[],
            }],
        ),
    ])
});

/// Whether `lhs op rhs` is admissible. Measures compare when their base
/// units agree; `Number` coerces to `Currency` through the usual rule.
pub fn check_filter_op(lhs: &Type, op: FilterOp, rhs: &Type) -> bool {
    let overloads = match OVERLOADS.get(&op) {
        Some(o) => o,
        None => return false,
    };

    overloads.iter().any(|overload| {
        let mut env = HashMap::new();
        if !lhs.match_with(&overload.lhs, &mut env) {
            return false;
        }
        if !rhs.match_with(&overload.rhs, &mut env) {
            return false;
        }
        if overload.domain.is_empty() {
            return true;
        }
        match env.get(&0) {
            // unresolved variable: an untyped hole on both sides
            None => true,
            Some(Type::Any) => true,
            Some(Type::Measure(_)) => true,
            // a hinted string orders like a plain one
            Some(Type::HintedString(_)) => true,
            Some(resolved) => overload.domain.contains(resolved),
        }
    })
}

/// The result type of a scalar computation, or `None` if the operand types
/// don't fit the operator.
pub fn scalar_result_type(op: ScalarOp, operands: &[Type]) -> Option<Type> {
    use ScalarOp::*;
    match op {
        Add | Sub | Mul | Div | Mod | Pow => {
            if operands.len() != 2 {
                return None;
            }
            let common = Type::common(&operands[0], &operands[1])?;
            match common {
                Type::Number | Type::Currency | Type::Measure(_) | Type::Any => Some(common),
                // adding an interval to a date is the one mixed form
                Type::Date if matches!(op, Add | Sub) => Some(Type::Date),
                _ => None,
            }
        }
        Distance => {
            if operands.len() == 2
                && operands.iter().all(|t| {
                    matches!(t, Type::Location | Type::Any)
                })
            {
                Some(Type::Measure("m".to_string()))
            } else {
                None
            }
        }
        Count => match operands {
            [Type::Array(_)] | [Type::Any] => Some(Type::Number),
            _ => None,
        },
        Max | Min | Sum | Avg => match operands {
            [Type::Array(elem)] => match elem.as_ref() {
                Type::Number | Type::Currency | Type::Measure(_) | Type::Any => {
                    Some(elem.as_ref().clone())
                }
                _ => None,
            },
            [Type::Any] => Some(Type::Any),
            _ => None,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_equality_unifies() {
        assert!(check_filter_op(&Type::Number, FilterOp::Eq, &Type::Number));
        assert!(check_filter_op(&Type::Number, FilterOp::Eq, &Type::Currency));
        assert!(!check_filter_op(&Type::Number, FilterOp::Eq, &Type::String));
    }

    #[test]
    fn test_ordering_domain() {
        assert!(check_filter_op(&Type::Date, FilterOp::Ge, &Type::Date));
        assert!(check_filter_op(
            &Type::Measure("C".to_string()),
            FilterOp::Ge,
            &Type::Measure("C".to_string())
        ));
        assert!(!check_filter_op(&Type::Boolean, FilterOp::Ge, &Type::Boolean));
        assert!(!check_filter_op(
            &Type::Measure("C".to_string()),
            FilterOp::Le,
            &Type::Measure("ms".to_string())
        ));
    }

    #[test]
    fn test_arrays() {
        let strings = Type::Array(Box::new(Type::String));
        assert!(check_filter_op(&strings, FilterOp::Contains, &Type::String));
        assert!(check_filter_op(&Type::String, FilterOp::InArray, &strings));
        assert!(!check_filter_op(&Type::String, FilterOp::Contains, &strings));
    }

    #[test]
    fn test_scalar_types() {
        assert_eq!(
            scalar_result_type(ScalarOp::Add, &[Type::Number, Type::Number]),
            Some(Type::Number)
        );
        assert_eq!(
            scalar_result_type(
                ScalarOp::Count,
                &[Type::Array(Box::new(Type::String))]
            ),
            Some(Type::Number)
        );
        assert_eq!(
            scalar_result_type(ScalarOp::Distance, &[Type::Location, Type::Location]),
            Some(Type::Measure("m".to_string()))
        );
        assert_eq!(scalar_result_type(ScalarOp::Add, &[Type::String, Type::String]), None);
    }
}
