use std::collections::BTreeMap;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ast::expression::BooleanExpression;
use crate::ast::ops::ScalarOp;
use crate::span::Span;
use crate::ty::{units, Type};

impl Value {
    pub fn new<K: Into<ValueKind>>(kind: K) -> Self {
        Value {
            kind: kind.into(),
            span: None,
        }
    }

    pub fn boolean(b: bool) -> Self {
        Value::new(ValueKind::Boolean(b))
    }

    pub fn string<S: ToString>(s: S) -> Self {
        Value::new(ValueKind::String(s.to_string()))
    }

    pub fn number(n: f64) -> Self {
        Value::new(ValueKind::Number(n))
    }

    pub fn var_ref<S: ToString>(name: S) -> Self {
        Value::new(ValueKind::VarRef(name.to_string()))
    }

    pub fn undefined() -> Self {
        Value::new(ValueKind::Undefined {
            slot_fillable: true,
        })
    }
}

/// A value in any position: input parameter, filter operand, annotation,
/// scalar expression operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    #[serde(flatten)]
    pub kind: ValueKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner, strum::AsRefStr)]
pub enum ValueKind {
    Boolean(bool),
    String(String),
    Number(f64),
    Measure {
        value: f64,
        unit: String,
    },
    Currency {
        value: f64,
        unit: String,
    },
    Date(DateValue),
    Time(TimeValue),
    Location(LocationValue),
    Entity {
        /// `None` before entity linking has assigned a concrete value.
        value: Option<String>,
        kind: String,
        display: Option<String>,
    },
    Enum(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// A reference to an output parameter in scope, a declaration parameter,
    /// or a `__const`/`__pi` magic name.
    VarRef(String),
    /// `$event`, `$event.type`, `$event.program_id`
    Event(Option<EventField>),
    /// `$context.NAME : Type`
    ContextRef {
        name: String,
        ty: Type,
    },
    Computation {
        op: ScalarOp,
        operands: Vec<Value>,
    },
    /// `FIELD of VALUE`, projecting a field out of an array of compounds
    ArrayField {
        field: String,
        value: Box<Value>,
    },
    /// `VALUE filter { F }`
    Filter {
        value: Box<Value>,
        filter: Box<BooleanExpression>,
    },
    /// A hole. `slot_fillable: true` holes may appear anywhere a value is
    /// expected before execution; `slot_fillable: false` never appears.
    Undefined {
        slot_fillable: bool,
    },
}

impl ValueKind {
    pub fn into_value(self, span: Span) -> Value {
        Value {
            kind: self,
            span: Some(span),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum DateValue {
    /// `new Date()`, meaning the time of execution
    Now,
    Absolute(DateTimeValue),
    /// `start_of(week)`, `end_of(day)`
    Edge { edge: DateEdge, unit: String },
    /// A partially specified date, `new Date(2020, , )`
    Piece {
        year: Option<i32>,
        month: Option<u8>,
        day: Option<u8>,
        time: Option<TimeValue>,
    },
}

/// A plain calendar date-time. The toolchain never does calendar arithmetic;
/// the runtime owns time zones and calendars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeValue {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum DateEdge {
    #[strum(serialize = "start_of")]
    StartOf,
    #[strum(serialize = "end_of")]
    EndOf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeValue {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum LocationValue {
    Absolute {
        latitude: f64,
        longitude: f64,
        display: Option<String>,
    },
    /// `$context.location.home` and friends
    Relative(String),
    /// A location mentioned by name, not yet geocoded
    Unresolved(String),
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum EventField {
    #[strum(serialize = "type")]
    Type,
    #[strum(serialize = "program_id")]
    ProgramId,
}

impl Value {
    /// The type of this value, as far as it can be determined without a
    /// scope. References and computations yield `Any`; the typechecker
    /// refines them.
    pub fn ty(&self) -> Type {
        match &self.kind {
            ValueKind::Boolean(_) => Type::Boolean,
            ValueKind::String(_) => Type::String,
            ValueKind::Number(_) => Type::Number,
            ValueKind::Measure { unit, .. } => Type::Measure(
                units::base_unit(unit)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| unit.clone()),
            ),
            ValueKind::Currency { .. } => Type::Currency,
            ValueKind::Date(_) => Type::Date,
            ValueKind::Time(_) => Type::Time,
            ValueKind::Location(_) => Type::Location,
            ValueKind::Entity { kind, .. } => Type::Entity(kind.clone()),
            ValueKind::Enum(variant) => Type::Enum(vec![variant.clone()]),
            ValueKind::Array(elems) => {
                let elem = elems
                    .iter()
                    .map(Value::ty)
                    .reduce(|a, b| Type::common(&a, &b).unwrap_or(Type::Any))
                    .unwrap_or(Type::Any);
                Type::Array(Box::new(elem))
            }
            ValueKind::Object(_) => Type::Any,
            ValueKind::VarRef(_) => Type::Any,
            ValueKind::Event(Some(EventField::ProgramId)) => {
                Type::Entity("tt:program_id".to_string())
            }
            ValueKind::Event(_) => Type::String,
            ValueKind::ContextRef { ty, .. } => ty.clone(),
            ValueKind::Computation { .. } => Type::Any,
            ValueKind::ArrayField { .. } => Type::Any,
            ValueKind::Filter { value, .. } => value.ty(),
            ValueKind::Undefined { .. } => Type::Any,
        }
    }

    /// Whether this value is fully concrete: no holes, no references.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ValueKind::Array(elems) => elems.iter().all(Value::is_constant),
            ValueKind::Object(fields) => fields.values().all(Value::is_constant),
            ValueKind::VarRef(_)
            | ValueKind::Event(_)
            | ValueKind::Computation { .. }
            | ValueKind::ArrayField { .. }
            | ValueKind::Filter { .. }
            | ValueKind::Undefined { .. } => false,
            ValueKind::Location(l) => l.is_absolute() || l.is_relative(),
            _ => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, ValueKind::Undefined { .. })
    }

    /// The canonical form used for equality in comparisons: measures convert
    /// to their base unit; other values are already canonical.
    pub fn canonical_measure(&self) -> Option<f64> {
        match &self.kind {
            ValueKind::Measure { value, unit } => Some(units::transform_to_base(*value, unit)),
            _ => None,
        }
    }
}

impl From<ValueKind> for Value {
    fn from(kind: ValueKind) -> Self {
        Value::new(kind)
    }
}
