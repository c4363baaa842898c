use serde::{Deserialize, Serialize};

/// Comparison operators usable in filter atoms.
///
/// Strict `<` and `>` do not exist; natural language is too imprecise about
/// boundaries for them to be useful, so only the inclusive forms are kept.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum FilterOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=")]
    Le,
    /// substring, case- and accent-insensitive
    #[strum(serialize = "=~")]
    Substr,
    /// reverse substring: the parameter occurs inside the value
    #[strum(serialize = "~=")]
    RevSubstr,
    #[strum(serialize = "contains")]
    Contains,
    /// contains, comparing elements as substrings
    #[strum(serialize = "~contains")]
    ContainsSubstr,
    #[strum(serialize = "in_array")]
    InArray,
    #[strum(serialize = "starts_with")]
    StartsWith,
    #[strum(serialize = "ends_with")]
    EndsWith,
    #[strum(serialize = "prefix_of")]
    PrefixOf,
    #[strum(serialize = "suffix_of")]
    SuffixOf,
}

/// Scalar operators usable inside `compute` expressions and computed filter
/// operands.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum ScalarOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "**")]
    Pow,
    #[strum(serialize = "distance")]
    Distance,
    #[strum(serialize = "count")]
    Count,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "sum")]
    Sum,
    #[strum(serialize = "avg")]
    Avg,
}

impl ScalarOp {
    /// Whether the operator is written between its two operands.
    pub fn is_infix(&self) -> bool {
        matches!(
            self,
            ScalarOp::Add
                | ScalarOp::Sub
                | ScalarOp::Mul
                | ScalarOp::Div
                | ScalarOp::Mod
                | ScalarOp::Pow
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum AggregationOp {
    #[strum(serialize = "count")]
    Count,
    #[strum(serialize = "sum")]
    Sum,
    #[strum(serialize = "avg")]
    Avg,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "max")]
    Max,
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
pub enum SortDirection {
    #[strum(serialize = "asc")]
    Asc,
    #[strum(serialize = "desc")]
    Desc,
}
