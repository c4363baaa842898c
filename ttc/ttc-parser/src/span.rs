use std::fmt::{self, Debug, Formatter};
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A region of one source text.
///
/// Every AST node carries an optional span, assigned during parsing and
/// preserved across transformations. The toolchain never reads source files
/// itself, so a span names its source only by the numeric id the caller
/// assigned when handing the text in.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub source_id: u16,
}

impl Span {
    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        assert_eq!(self.source_id, other.source_id);
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            source_id: self.source_id,
        }
    }

    /// Covering span of two optional spans; `None` only when both are.
    pub fn union(a: Option<Span>, b: Option<Span>) -> Option<Span> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.to(b)),
            (a, b) => a.or(b),
        }
    }

    fn parse(text: &str) -> Option<Span> {
        let (source_id, range) = text.split_once(':')?;
        let (start, end) = range.split_once("..")?;
        Some(Span {
            start: start.parse().ok()?,
            end: end.parse().ok()?,
            source_id: source_id.parse().ok()?,
        })
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.source_id, self.start, self.end)
    }
}

// Spans serialize as the compact `source:start..end` form rather than as a
// struct, to keep serialized ASTs readable.
impl Serialize for Span {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&format_args!("{self:?}"))
    }
}

impl<'de> Deserialize<'de> for Span {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Span::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("malformed span `{text}`")))
    }
}

impl chumsky::Span for Span {
    type Context = u16;

    type Offset = usize;

    fn new(source_id: Self::Context, range: Range<Self::Offset>) -> Self {
        Span {
            start: range.start,
            end: range.end,
            source_id,
        }
    }

    fn context(&self) -> Self::Context {
        self.source_id
    }

    fn start(&self) -> Self::Offset {
        self.start
    }

    fn end(&self) -> Self::Offset {
        self.end
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_serde_form() {
        let span = Span {
            start: 4,
            end: 21,
            source_id: 3,
        };
        let text = serde_json::to_string(&span).unwrap();
        insta::assert_snapshot!(text, @r###""3:4..21""###);
        assert_eq!(serde_json::from_str::<Span>(&text).unwrap(), span);
        assert!(serde_json::from_str::<Span>("\"3:4\"").is_err());
    }

    #[test]
    fn test_union() {
        let a = Span {
            start: 2,
            end: 5,
            source_id: 0,
        };
        let b = Span {
            start: 9,
            end: 12,
            source_id: 0,
        };
        assert_eq!(
            a.to(b),
            Span {
                start: 2,
                end: 12,
                source_id: 0
            }
        );
        assert_eq!(Span::union(None, Some(b)), Some(b));
        assert_eq!(Span::union(None, None), None);
    }
}
