use std::collections::BTreeMap;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ast::dialogue::DialogueState;
use crate::ast::expression::BooleanExpression;
use crate::ast::primitive::{Action, Invocation};
use crate::ast::schema::{AnnotationMap, ClassDef, FunctionDef};
use crate::ast::stream::Stream;
use crate::ast::table::Table;
use crate::ast::value::Value;
use crate::span::Span;
use crate::ty::Type;

/// Any complete input accepted by the toolchain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Input {
    Program(Program),
    PermissionRule(PermissionRule),
    Library(Library),
    Dataset(Dataset),
    Bookkeeping(Bookkeeping),
    ControlCommand(ControlCommand),
    DialogueState(DialogueState),
}

/// An executable program: inline classes, declarations and rules/commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassDef>,

    pub statements: Vec<Statement>,

    /// The remote principal this program executes as, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Program {
            classes: Vec::new(),
            statements,
            principal: None,
            span: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(flatten)]
    pub kind: StatementKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Statement {
    pub fn new<K: Into<StatementKind>>(kind: K) -> Self {
        Statement {
            kind: kind.into(),
            span: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner, strum::AsRefStr)]
pub enum StatementKind {
    /// `STREAM => ACTIONS`
    Rule {
        stream: Stream,
        actions: Vec<Action>,
    },
    /// `now => TABLE? => ACTIONS`
    Command {
        table: Option<Table>,
        actions: Vec<Action>,
    },
    /// `let result NAME := TABLE`
    Assignment { name: String, value: Table },
    Declaration(Declaration),
    OnInputChoice(OnInputChoice),
}

impl StatementKind {
    pub fn into_stmt(self, span: Span) -> Statement {
        Statement {
            kind: self,
            span: Some(span),
        }
    }
}

/// `let query NAME(args) := BODY`, a reusable parameterised computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    /// declared parameters, ordered by name
    pub args: BTreeMap<String, Type>,
    pub value: DeclarationValue,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nl_annotations: AnnotationMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum DeclarationValue {
    Table(Table),
    Stream(Stream),
    Action(Invocation),
}

impl DeclarationValue {
    /// The keyword introducing this declaration kind in the surface syntax.
    pub fn keyword(&self) -> &'static str {
        match self {
            DeclarationValue::Table(_) => "query",
            DeclarationValue::Stream(_) => "stream",
            DeclarationValue::Action(_) => "action",
        }
    }
}

/// One alternative continuation offered when the program asks for input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnInputChoice {
    pub table: Option<Table>,
    pub actions: Vec<Action>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nl_annotations: AnnotationMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,
}

/// A filter over who may execute which functions with which parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// checked with `__pi : Entity(tt:contact)` in scope
    pub principal: BooleanExpression,
    pub query: PermissionFunction,
    pub action: PermissionFunction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Serialize, Deserialize, EnumAsInner)]
pub enum PermissionFunction {
    /// the builtin notification surface (`now` / `notify`)
    Builtin,
    /// any function of any class
    Star,
    /// any function of one class, `@kind.*`
    ClassStar(String),
    Specified {
        kind: String,
        channel: String,
        filter: BooleanExpression,
        #[serde(skip)]
        schema: Option<Arc<FunctionDef>>,
    },
}

impl PartialEq for PermissionFunction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PermissionFunction::Builtin, PermissionFunction::Builtin) => true,
            (PermissionFunction::Star, PermissionFunction::Star) => true,
            (PermissionFunction::ClassStar(a), PermissionFunction::ClassStar(b)) => a == b,
            (
                PermissionFunction::Specified {
                    kind: ak,
                    channel: ac,
                    filter: af,
                    ..
                },
                PermissionFunction::Specified {
                    kind: bk,
                    channel: bc,
                    filter: bf,
                    ..
                },
            ) => ak == bk && ac == bc && af == bf,
            _ => false,
        }
    }
}

/// A library of class definitions and datasets; no executable statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub classes: Vec<ClassDef>,
    pub datasets: Vec<Dataset>,
}

/// A collection of composable example commands for some skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub language: String,
    pub examples: Vec<Example>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// -1 when the example has not been stored yet
    pub id: i64,
    pub args: BTreeMap<String, Type>,
    pub value: ExampleValue,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub utterances: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocessed: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: AnnotationMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum ExampleValue {
    Query(Table),
    Stream(Stream),
    Action(Invocation),
    Program(Program),
}

impl ExampleValue {
    pub fn keyword(&self) -> &'static str {
        match self {
            ExampleValue::Query(_) => "query",
            ExampleValue::Stream(_) => "stream",
            ExampleValue::Action(_) => "action",
            ExampleValue::Program(_) => "program",
        }
    }
}

/// A meta-command about the conversation itself rather than the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookkeeping {
    pub intent: BookkeepingIntent,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum BookkeepingIntent {
    /// `yes`, `no`, `back`, `cancel`, ...
    Special(String),
    /// asks for the list of commands of one category, possibly of one device
    CommandList {
        device: Option<Value>,
        category: String,
    },
    /// picks one of the choices offered by the assistant
    Choice(i64),
    /// answers a slot-filling question
    Answer(Value),
}

/// Direct control of the assistant: `$stop;`, `$nevermind;`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub intent: ControlIntent,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
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
pub enum ControlIntent {
    #[strum(serialize = "stop")]
    Stop,
    #[strum(serialize = "nevermind")]
    Nevermind,
    #[strum(serialize = "wakeup")]
    Wakeup,
    #[strum(serialize = "debug")]
    Debug,
}
