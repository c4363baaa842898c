use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tokens(pub Vec<Token>);

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: std::ops::Range<usize>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize, EnumAsInner)]
pub enum TokenKind {
    Ident(String),
    Keyword(String),
    QuotedString(String),
    Number(f64),
    /// A quantity with a display unit, lexed as one token: `5kWh`, `1min`.
    Measure { value: f64, unit: String },
    /// `$50` or the no-spaces form `50$usd`.
    Currency { value: f64, unit: String },
    /// `@`-prefixed dotted name: `@com.twitter.home_timeline`.
    AtName(String),
    /// `$`-prefixed word: `$undefined`, `$event`, `$dialogue`, `$?` (as `?`).
    Dollar(String),

    /// single-char control tokens
    Control(char),

    ArrowFat,     // =>
    ColonEq,      // :=
    Eq,           // ==
    Gte,          // >=
    Lte,          // <=
    Substr,       // =~
    RevSubstr,    // ~=
    And,          // &&
    Or,           // ||
    Pow,          // **
    EntityMarker, // ^^
    AnnotOpen,    // #[
    NlAnnotOpen,  // #_[

    // Aesthetics only
    Comment(String),
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => {
                if s.is_empty() {
                    // FYI this shows up in errors
                    write!(f, "an identifier")
                } else {
                    write!(f, "{s}")
                }
            }
            TokenKind::Keyword(s) => write!(f, "keyword {s}"),
            TokenKind::QuotedString(s) => write!(f, "\"{s}\""),
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::Measure { value, unit } => write!(f, "{value}{unit}"),
            TokenKind::Currency { value, unit } => write!(f, "{value}${unit}"),
            TokenKind::AtName(s) => write!(f, "@{s}"),
            TokenKind::Dollar(s) => write!(f, "${s}"),
            TokenKind::Control(c) => write!(f, "{c}"),

            TokenKind::ArrowFat => f.write_str("=>"),
            TokenKind::ColonEq => f.write_str(":="),
            TokenKind::Eq => f.write_str("=="),
            TokenKind::Gte => f.write_str(">="),
            TokenKind::Lte => f.write_str("<="),
            TokenKind::Substr => f.write_str("=~"),
            TokenKind::RevSubstr => f.write_str("~="),
            TokenKind::And => f.write_str("&&"),
            TokenKind::Or => f.write_str("||"),
            TokenKind::Pow => f.write_str("**"),
            TokenKind::EntityMarker => f.write_str("^^"),
            TokenKind::AnnotOpen => f.write_str("#["),
            TokenKind::NlAnnotOpen => f.write_str("#_["),

            TokenKind::Comment(s) => writeln!(f, "//{s}"),
        }
    }
}

// This is here because TokenKind contains f64, which does not implement Hash
// or Eq. chumsky's error type needs Hash for the TokenKind so it can
// deduplicate tokens in errors; hashing the discriminant alone could lead to
// duplicated tokens in error messages.
#[allow(clippy::derived_hash_with_manual_eq)]
impl std::hash::Hash for TokenKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
    }
}

impl std::cmp::Eq for TokenKind {}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}..{}: {:?}", self.span.start, self.span.end, self.kind)
    }
}

/// Words that are reserved by the surface grammar and may not be used as
/// parameter or declaration names.
pub(crate) const KEYWORDS: &[&str] = &[
    "now",
    "monitor",
    "notify",
    "return",
    "join",
    "on",
    "of",
    "as",
    "aggregate",
    "sort",
    "asc",
    "desc",
    "compute",
    "filter",
    "edge",
    "new",
    "timer",
    "attimer",
    "let",
    "class",
    "extends",
    "dataset",
    "language",
    "import",
    "from",
    "query",
    "action",
    "stream",
    "program",
    "monitorable",
    "list",
    "entity",
    "mixin",
    "in",
    "req",
    "opt",
    "out",
    "true",
    "false",
    "enum",
    "null",
    "oninput",
    "bookkeeping",
    "special",
    "choice",
    "answer",
    "commands",
    "result",
];
