use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use enum_as_inner::EnumAsInner;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::ast::ArgumentDef;

/// The type of a ThingTalk value.
///
/// Types are structural except for entities, which are nominal. `Any` is the
/// top type used as a sentinel during inference; `TypeVar` only occurs inside
/// the operator overload table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Type {
    Boolean,
    String,
    /// A string carrying a hint tag, written `String(tt:search_query)`.
    /// Hints mark arguments for the natural-language tooling; they never
    /// reject a program, and `String(hint) <: String`.
    HintedString(String),
    Number,
    Currency,
    Location,
    Date,
    Time,
    RecurrentTimeSpec,
    /// A quantity with the given canonical base unit.
    Measure(String),
    Enum(Vec<String>),
    /// A named nominal type, `namespace:name`.
    Entity(String),
    Array(Box<Type>),
    /// An ordered record of named fields, nestable.
    Compound(Vec<ArgumentDef>),
    Any,
    /// Type variable for operator polymorphism.
    TypeVar(u8),
    /// A reference to a type we could not resolve (e.g. an entity declared by
    /// a class we have not loaded). Fails typechecking if it survives.
    Unknown(String),
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => f.write_str("Boolean"),
            Type::String => f.write_str("String"),
            Type::HintedString(hint) => write!(f, "String({hint})"),
            Type::Number => f.write_str("Number"),
            Type::Currency => f.write_str("Currency"),
            Type::Location => f.write_str("Location"),
            Type::Date => f.write_str("Date"),
            Type::Time => f.write_str("Time"),
            Type::RecurrentTimeSpec => f.write_str("RecurrentTimeSpecification"),
            Type::Measure(unit) => write!(f, "Measure({unit})"),
            Type::Enum(variants) => write!(f, "Enum({})", variants.join(",")),
            Type::Entity(kind) => write!(f, "Entity({kind})"),
            Type::Array(elem) => write!(f, "Array({elem})"),
            Type::Compound(fields) => {
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} : {}", field.name, field.ty)?;
                }
                f.write_str(" }")
            }
            Type::Any => f.write_str("Any"),
            Type::TypeVar(k) => write!(f, "'{k}"),
            Type::Unknown(name) => write!(f, "{name}"),
        }
    }
}

impl Type {
    /// Parse a type from its compact display form. Used by the NN codec for
    /// `param:name:Type` tokens; compound types are opaque there.
    pub fn parse(s: &str) -> Option<Type> {
        Some(match s {
            "Boolean" => Type::Boolean,
            "String" => Type::String,
            "Number" => Type::Number,
            "Currency" => Type::Currency,
            "Location" => Type::Location,
            "Date" => Type::Date,
            "Time" => Type::Time,
            "RecurrentTimeSpecification" => Type::RecurrentTimeSpec,
            "Any" | "Compound" => Type::Any,
            _ => {
                let (head, rest) = s.split_once('(')?;
                let inner = rest.strip_suffix(')')?;
                match head {
                    "String" => Type::HintedString(inner.to_string()),
                    "Measure" => Type::Measure(inner.to_string()),
                    "Enum" => Type::Enum(inner.split(',').map(|v| v.to_string()).collect()),
                    "Entity" => Type::Entity(inner.to_string()),
                    "Array" => Type::Array(Box::new(Type::parse(inner)?)),
                    _ => return None,
                }
            }
        })
    }

    /// Whether a value of type `self` may be used where `formal` is expected.
    ///
    /// `Number` is implicitly accepted for `Currency`; hinted strings are
    /// plain strings; entity equality is nominal, walking the declared parent
    /// chain. Compounds are width-structural when the formal side declares
    /// them explicitly.
    pub fn is_assignable(&self, formal: &Type) -> bool {
        match (self, formal) {
            (_, Type::Any) => true,
            (Type::Any, _) => true,
            (Type::Number, Type::Currency) => true,
            // a hint is advisory: hinted strings are plain strings, and a
            // plain string may fill a hinted formal
            (
                Type::String | Type::HintedString(_),
                Type::String | Type::HintedString(_),
            ) => true,
            (Type::Entity(a), Type::Entity(b)) => {
                a == b || entity_parents(a).iter().any(|p| Type::Entity(p.to_string()).is_assignable(formal))
            }
            (Type::Measure(a), Type::Measure(b)) => a == b,
            (Type::Array(a), Type::Array(b)) => a.is_assignable(b),
            (Type::Enum(a), Type::Enum(b)) => b.iter().all(|v| a.contains(v)),
            (Type::Compound(a), Type::Compound(b)) => b.iter().all(|formal_field| {
                a.iter()
                    .any(|f| f.name == formal_field.name && f.ty.is_assignable(&formal_field.ty))
            }),
            (a, b) => a == b,
        }
    }

    /// The least common type of `a` and `b`: meet on structural widths,
    /// nominal equality on entities. `None` if the two are unrelated.
    pub fn common(a: &Type, b: &Type) -> Option<Type> {
        if a == b {
            return Some(a.clone());
        }
        match (a, b) {
            (Type::Any, other) | (other, Type::Any) => Some(other.clone()),
            (Type::Number, Type::Currency) | (Type::Currency, Type::Number) => {
                Some(Type::Currency)
            }
            // differing hints meet at the plain string
            (
                Type::String | Type::HintedString(_),
                Type::String | Type::HintedString(_),
            ) => Some(Type::String),
            (Type::Array(x), Type::Array(y)) => Some(Type::Array(Box::new(Type::common(x, y)?))),
            (Type::Compound(x), Type::Compound(y)) => {
                let common = x
                    .iter()
                    .filter(|f| {
                        y.iter()
                            .any(|g| g.name == f.name && g.ty.is_assignable(&f.ty))
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                if common.is_empty() {
                    None
                } else {
                    Some(Type::Compound(common))
                }
            }
            _ => None,
        }
    }

    /// Match a call-site type against a formal type, unifying type variables
    /// into `env`. Used by the operator overload table.
    pub fn match_with(&self, formal: &Type, env: &mut HashMap<u8, Type>) -> bool {
        match formal {
            Type::TypeVar(k) => match env.get(k).cloned() {
                Some(bound) => {
                    if let Some(common) = Type::common(self, &bound) {
                        env.insert(*k, common);
                        true
                    } else {
                        false
                    }
                }
                None => {
                    env.insert(*k, self.clone());
                    true
                }
            },
            Type::Array(formal_elem) => match self {
                Type::Array(elem) => elem.match_with(formal_elem, env),
                Type::Any => {
                    // an Any operand matches Array('0) leaving the variable free
                    Type::Any.match_with(formal_elem, env)
                }
                _ => false,
            },
            _ => self.is_assignable(formal),
        }
    }

    /// Substitute type variables from `env`; unbound variables become `Any`.
    pub fn resolve_vars(&self, env: &HashMap<u8, Type>) -> Type {
        match self {
            Type::TypeVar(k) => env.get(k).cloned().unwrap_or(Type::Any),
            Type::Array(elem) => Type::Array(Box::new(elem.resolve_vars(env))),
            other => other.clone(),
        }
    }
}

/// Unit handling. Parsed literals carry a display unit; comparisons use the
/// canonical value in the base unit.
pub mod units {
    use super::*;

    /// display unit -> (base unit, factor to base)
    static UNITS: Lazy<HashMap<&'static str, (&'static str, f64)>> = Lazy::new(|| {
        HashMap::from([
            // time
            ("ms", ("ms", 1.0)),
            ("s", ("ms", 1000.0)),
            ("min", ("ms", 60_000.0)),
            ("h", ("ms", 3_600_000.0)),
            ("day", ("ms", 86_400_000.0)),
            ("week", ("ms", 604_800_000.0)),
            ("mon", ("ms", 2_592_000_000.0)),
            ("year", ("ms", 31_536_000_000.0)),
            // length
            ("m", ("m", 1.0)),
            ("km", ("m", 1000.0)),
            ("mm", ("m", 0.001)),
            ("cm", ("m", 0.01)),
            ("mi", ("m", 1609.344)),
            ("in", ("m", 0.0254)),
            ("ft", ("m", 0.3048)),
            // speed
            ("mps", ("mps", 1.0)),
            ("kmph", ("mps", 0.27777778)),
            ("mph", ("mps", 0.44704)),
            // weight
            ("kg", ("kg", 1.0)),
            ("g", ("kg", 0.001)),
            ("lb", ("kg", 0.45359237)),
            ("oz", ("kg", 0.028349523)),
            // temperature (F and K are affine, handled below)
            ("C", ("C", 1.0)),
            ("F", ("C", f64::NAN)),
            ("K", ("C", f64::NAN)),
            // energy
            ("kcal", ("kcal", 1.0)),
            ("kJ", ("kcal", 0.239006)),
            ("kWh", ("kcal", 860.421)),
            // file size
            ("byte", ("byte", 1.0)),
            ("KB", ("byte", 1000.0)),
            ("KiB", ("byte", 1024.0)),
            ("MB", ("byte", 1_000_000.0)),
            ("MiB", ("byte", 1_048_576.0)),
            ("GB", ("byte", 1_000_000_000.0)),
            ("GiB", ("byte", 1_073_741_824.0)),
            ("TB", ("byte", 1_000_000_000_000.0)),
        ])
    });

    /// The pseudo-unit resolved to the user's preferred temperature unit at
    /// typecheck time.
    pub const DEFAULT_TEMPERATURE: &str = "defaultTemperature";

    pub fn is_unit(unit: &str) -> bool {
        unit == DEFAULT_TEMPERATURE || UNITS.contains_key(unit)
    }

    /// The canonical SI-style base unit for a display unit.
    pub fn base_unit(unit: &str) -> Option<&'static str> {
        if unit == DEFAULT_TEMPERATURE {
            return Some("C");
        }
        UNITS.get(unit).map(|(base, _)| *base)
    }

    pub fn transform_to_base(value: f64, unit: &str) -> f64 {
        match unit {
            "F" => (value - 32.0) * 5.0 / 9.0,
            "K" => value - 273.15,
            DEFAULT_TEMPERATURE => value,
            _ => UNITS.get(unit).map(|(_, factor)| value * factor).unwrap_or(value),
        }
    }

    pub fn transform_from_base(value: f64, unit: &str) -> f64 {
        match unit {
            "F" => value * 9.0 / 5.0 + 32.0,
            "K" => value + 273.15,
            DEFAULT_TEMPERATURE => value,
            _ => UNITS.get(unit).map(|(_, factor)| value / factor).unwrap_or(value),
        }
    }
}

/// The built-in entity kinds. User-defined kinds are declared inside classes.
pub const BUILTIN_ENTITIES: &[&str] = &[
    "tt:contact",
    "tt:contact_name",
    "tt:device",
    "tt:email_address",
    "tt:flow_token",
    "tt:function",
    "tt:hashtag",
    "tt:path_name",
    "tt:phone_number",
    "tt:picture",
    "tt:program",
    "tt:url",
    "tt:username",
];

/// Declared supertypes of built-in entity kinds.
pub fn entity_parents(kind: &str) -> &'static [&'static str] {
    match kind {
        "tt:picture" => &["tt:url"],
        "tt:contact_name" => &["tt:contact"],
        _ => &[],
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for t in [
            Type::Boolean,
            Type::String,
            Type::HintedString("tt:search_query".to_string()),
            Type::Currency,
            Type::Measure("ms".to_string()),
            Type::Enum(vec!["on".to_string(), "off".to_string()]),
            Type::Entity("tt:username".to_string()),
            Type::Array(Box::new(Type::Entity("com.spotify:song".to_string()))),
        ] {
            assert_eq!(Type::parse(&t.to_string()), Some(t));
        }
    }

    #[test]
    fn test_assignability() {
        assert!(Type::Number.is_assignable(&Type::Currency));
        assert!(!Type::Currency.is_assignable(&Type::Number));
        assert!(Type::Entity("tt:picture".to_string())
            .is_assignable(&Type::Entity("tt:url".to_string())));
        assert!(!Type::Entity("tt:url".to_string())
            .is_assignable(&Type::Entity("tt:picture".to_string())));
    }

    #[test]
    fn test_string_hints_never_reject() {
        let hinted = Type::HintedString("tt:search_query".to_string());
        assert!(hinted.is_assignable(&Type::String));
        assert!(Type::String.is_assignable(&hinted));
        assert!(!Type::Number.is_assignable(&hinted));
        assert_eq!(Type::common(&hinted, &Type::String), Some(Type::String));
    }

    #[test]
    fn test_units() {
        assert_eq!(units::base_unit("kWh"), Some("kcal"));
        assert_eq!(units::transform_to_base(2.0, "min"), 120_000.0);
        assert_eq!(units::transform_to_base(32.0, "F"), 0.0);
        assert!(units::is_unit(units::DEFAULT_TEMPERATURE));
    }

    #[test]
    fn test_match_with_typevars() {
        let mut env = HashMap::new();
        assert!(Type::Number.match_with(&Type::TypeVar(0), &mut env));
        assert!(Type::Currency.match_with(&Type::TypeVar(0), &mut env));
        assert_eq!(env.get(&0), Some(&Type::Currency));
    }
}
