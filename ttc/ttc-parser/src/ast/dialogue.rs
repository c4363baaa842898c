use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::program::Statement;
use crate::ast::value::Value;
use crate::span::Span;

/// A sequence of history items describing what has been said and done in a
/// conversation, annotated with the dialogue act of the last turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueState {
    /// name of the dialogue policy, e.g. `org.thingpedia.dialogue.transaction`
    pub policy: String,
    pub dialogue_act: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dialogue_act_param: Vec<String>,

    pub history: Vec<DialogueHistoryItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueHistoryItem {
    pub statement: Statement,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<DialogueHistoryResultList>,

    pub confirm: ConfirmationState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueHistoryResultList {
    pub results: Vec<DialogueHistoryResultItem>,
    pub count: Value,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub more: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueHistoryResultItem {
    pub value: BTreeMap<String, Value>,
}

/// How far along the confirm-and-execute pipeline a history item is.
/// Transitions are strictly monotonic left to right; `Proposed` is initial,
/// `ConfirmedAndExecuted` terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
pub enum ConfirmationState {
    #[strum(serialize = "proposed")]
    Proposed,
    #[strum(serialize = "accepted")]
    Accepted,
    #[strum(serialize = "confirmed")]
    Confirmed,
    #[strum(serialize = "confirmed_and_executed")]
    ConfirmedAndExecuted,
}

impl ConfirmationState {
    pub fn can_transition_to(&self, next: ConfirmationState) -> bool {
        next > *self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_confirmation_monotonic() {
        use ConfirmationState::*;
        assert!(Proposed.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(ConfirmedAndExecuted));
        assert!(!Confirmed.can_transition_to(Accepted));
        assert!(!ConfirmedAndExecuted.can_transition_to(ConfirmedAndExecuted));
    }
}
