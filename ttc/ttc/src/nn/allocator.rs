//! Entity allocation: assigning stable placeholder identifiers to literal
//! values when producing NN tokens.

use std::collections::HashMap;

use ttc_parser::ast::{strip_value_spans, LocationValue, Value, ValueKind};
use ttc_parser::ty::units;
use ttc_parser::{Error, ErrorContext, ErrorKind};
use unicode_normalization::UnicodeNormalization;

/// How entity indices are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationMode {
    /// The match of each literal in the sentence must be a contiguous
    /// substring; successive literals of the same type get indices 0,1,2,...
    /// in the order their matches appear in the sentence.
    #[default]
    Consecutive,
    /// Like consecutive, but gaps in the sentence are tolerated.
    NonConsecutive,
    /// Indices are assigned strictly in the order literals appear in the
    /// program, regardless of where (or whether) they match the sentence.
    Sequential,
}

/// Where a literal matched in the sentence: the indices of the matched
/// tokens, in order. Contiguous for the default matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub positions: Vec<usize>,
}

impl MatchSpan {
    pub fn contiguous(start: usize, end: usize) -> Self {
        MatchSpan {
            positions: (start..end).collect(),
        }
    }

    pub fn start(&self) -> usize {
        self.positions.first().copied().unwrap_or(0)
    }

    pub fn is_contiguous(&self) -> bool {
        self.positions.windows(2).all(|w| w[1] == w[0] + 1)
    }
}

/// Finds the span of the sentence a literal value corresponds to. Consumers
/// supply a custom matcher when the default normalization is insufficient.
pub trait ValueMatcher {
    fn match_value(&self, value: &Value, sentence: &[String]) -> Option<MatchSpan>;
}

/// Compares normalized string forms: lower-cased, accents stripped via NFD
/// with combining marks removed. Entities match on both canonical value and
/// display; currencies accept `$N`, `N dollars` and `N <unit>`.
#[derive(Default)]
pub struct DefaultValueMatcher;

pub(crate) fn normalize_token(token: &str) -> String {
    token
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(normalize_token).collect()
}

fn number_form(n: f64) -> String {
    format!("{n}")
}

/// The candidate token sequences a value may appear as in a sentence.
fn search_forms(value: &Value) -> Vec<Vec<String>> {
    match &value.kind {
        ValueKind::String(s) => vec![tokenize(s)],
        ValueKind::Number(n) => vec![vec![number_form(*n)]],
        ValueKind::Currency { value, unit } => vec![
            vec![format!("${}", number_form(*value))],
            vec![number_form(*value), "dollars".to_string()],
            vec![number_form(*value), normalize_token(unit)],
        ],
        ValueKind::Measure { value, unit } => vec![
            vec![number_form(*value), normalize_token(unit)],
            vec![format!("{}{}", number_form(*value), normalize_token(unit))],
        ],
        ValueKind::Time(time) => {
            let mut forms = vec![vec![format!("{}:{:02}", time.hour, time.minute)]];
            if time.minute == 0 {
                forms.push(vec![time.hour.to_string()]);
            }
            forms
        }
        ValueKind::Date(date) => match date {
            ttc_parser::ast::DateValue::Absolute(dt) => vec![
                vec![format!("{}-{:02}-{:02}", dt.year, dt.month, dt.day)],
                vec![format!("{}/{}/{}", dt.month, dt.day, dt.year)],
            ],
            _ => vec![],
        },
        ValueKind::Location(location) => match location {
            LocationValue::Absolute {
                display: Some(display),
                ..
            } => vec![tokenize(display)],
            LocationValue::Unresolved(name) => vec![tokenize(name)],
            _ => vec![],
        },
        ValueKind::Entity { value, display, .. } => {
            let mut forms = Vec::new();
            if let Some(display) = display {
                forms.push(tokenize(display));
            }
            if let Some(value) = value {
                forms.push(tokenize(value));
            }
            forms
        }
        _ => vec![],
    }
}

impl ValueMatcher for DefaultValueMatcher {
    fn match_value(&self, value: &Value, sentence: &[String]) -> Option<MatchSpan> {
        let sentence: Vec<String> = sentence.iter().map(|t| normalize_token(t)).collect();
        for form in search_forms(value) {
            if form.is_empty() || form.len() > sentence.len() {
                continue;
            }
            for start in 0..=(sentence.len() - form.len()) {
                if sentence[start..start + form.len()] == form[..] {
                    return Some(MatchSpan::contiguous(start, start + form.len()));
                }
            }
        }
        None
    }
}

/// Match `form` against the sentence allowing gaps, keeping token order.
fn subsequence_match(form: &[String], sentence: &[String]) -> Option<MatchSpan> {
    let mut positions = Vec::with_capacity(form.len());
    let mut from = 0;
    for part in form {
        let pos = sentence[from..]
            .iter()
            .position(|t| normalize_token(t) == *part)?
            + from;
        positions.push(pos);
        from = pos + 1;
    }
    Some(MatchSpan { positions })
}

/// The placeholder type of an allocatable literal, e.g. `QUOTED_STRING` or
/// `GENERIC_ENTITY_com.spotify:song`. `None` for values rendered with
/// structural tokens.
pub(crate) fn entity_token_type(value: &Value) -> Option<String> {
    Some(match &value.kind {
        ValueKind::String(_) => "QUOTED_STRING".to_string(),
        // 0 and 1 are part of the token alphabet itself
        ValueKind::Number(n) if *n != 0.0 && *n != 1.0 => "NUMBER".to_string(),
        ValueKind::Currency { .. } => "CURRENCY".to_string(),
        ValueKind::Measure { unit, .. } => format!(
            "MEASURE_{}",
            units::base_unit(unit).unwrap_or(unit.as_str())
        ),
        ValueKind::Time(_) => "TIME".to_string(),
        ValueKind::Location(LocationValue::Absolute { .. })
        | ValueKind::Location(LocationValue::Unresolved(_)) => "LOCATION".to_string(),
        ValueKind::Entity { kind, .. } => match kind.as_str() {
            "tt:username" => "USERNAME".to_string(),
            "tt:hashtag" => "HASHTAG".to_string(),
            "tt:url" => "URL".to_string(),
            "tt:phone_number" => "PHONE_NUMBER".to_string(),
            "tt:email_address" => "EMAIL_ADDRESS".to_string(),
            "tt:path_name" => "PATH_NAME".to_string(),
            other => format!("GENERIC_ENTITY_{other}"),
        },
        _ => return None,
    })
}

/// A stable identity for a literal: identical values share one placeholder.
fn value_key(value: &Value) -> String {
    serde_json::to_string(&strip_value_spans(value.clone())).unwrap_or_default()
}

struct Occurrence {
    token_type: String,
    key: String,
    value: Value,
    span: Option<MatchSpan>,
}

/// Two-phase allocator: `record` each literal in emission order, `assign`
/// the placeholder indices, then `token_for` replays them.
pub(crate) struct EntityAllocator<'a> {
    mode: AllocationMode,
    matcher: &'a dyn ValueMatcher,
    sentence: &'a [String],
    occurrences: Vec<Occurrence>,
    assigned: HashMap<String, String>,
}

impl<'a> EntityAllocator<'a> {
    pub(crate) fn new(
        mode: AllocationMode,
        matcher: &'a dyn ValueMatcher,
        sentence: &'a [String],
    ) -> Self {
        EntityAllocator {
            mode,
            matcher,
            sentence,
            occurrences: Vec::new(),
            assigned: HashMap::new(),
        }
    }

    /// Phase one: remember this literal. In the consecutive modes the
    /// literal must match the sentence; encoding never invents placeholders
    /// for values the sentence does not mention.
    pub(crate) fn record(&mut self, value: &Value, token_type: String) -> Result<(), Error> {
        let key = value_key(value);
        if self.occurrences.iter().any(|o| o.key == key) {
            return Ok(());
        }

        let span = match self.mode {
            AllocationMode::Sequential => self.matcher.match_value(value, self.sentence),
            AllocationMode::Consecutive => {
                let span = self
                    .matcher
                    .match_value(value, self.sentence)
                    .filter(MatchSpan::is_contiguous);
                Some(span.ok_or_else(|| unmatched(value))?)
            }
            AllocationMode::NonConsecutive => {
                let span = self.matcher.match_value(value, self.sentence).or_else(|| {
                    search_forms(value)
                        .into_iter()
                        .find_map(|form| subsequence_match(&form, self.sentence))
                });
                Some(span.ok_or_else(|| unmatched(value))?)
            }
        };

        self.occurrences.push(Occurrence {
            token_type,
            key,
            value: value.clone(),
            span,
        });
        Ok(())
    }

    /// Phase boundary: fix the indices.
    pub(crate) fn assign(&mut self) {
        let mut order: Vec<usize> = (0..self.occurrences.len()).collect();
        if self.mode != AllocationMode::Sequential {
            // order of appearance in the sentence, not in the program
            order.sort_by_key(|&i| {
                self.occurrences[i]
                    .span
                    .as_ref()
                    .map(MatchSpan::start)
                    .unwrap_or(usize::MAX)
            });
        }

        let mut per_type: HashMap<String, usize> = HashMap::new();
        for i in order {
            let occurrence = &self.occurrences[i];
            let index = per_type.entry(occurrence.token_type.clone()).or_insert(0);
            self.assigned.insert(
                occurrence.key.clone(),
                format!("{}_{}", occurrence.token_type, index),
            );
            *index += 1;
        }
    }

    /// Phase two: the placeholder of a recorded literal.
    pub(crate) fn token_for(&self, value: &Value) -> Result<String, Error> {
        self.assigned
            .get(&value_key(value))
            .cloned()
            .ok_or_else(|| {
                Error::new_simple(
                    ErrorKind::UnmatchedLiteral,
                    "literal was not seen during the recording pass",
                )
            })
    }

    /// The entity dictionary for everything assigned.
    pub(crate) fn into_entities(self) -> Vec<(String, Value)> {
        let mut entities: Vec<(String, Value)> = self
            .occurrences
            .into_iter()
            .map(|o| {
                let token = self.assigned[&o.key].clone();
                (token, o.value)
            })
            .collect();
        entities.sort_by(|a, b| a.0.cmp(&b.0));
        entities
    }
}

fn unmatched(value: &Value) -> Error {
    Error::new_simple(
        ErrorKind::UnmatchedLiteral,
        format!(
            "the value `{}` does not appear in the sentence",
            crate::codegen::write_value(value)
        ),
    )
    .at(value.span)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sentence(s: &str) -> Vec<String> {
        s.split_whitespace().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_default_matcher_strings() {
        let matcher = DefaultValueMatcher;
        let sentence = sentence("post hello world on twitter");
        let span = matcher
            .match_value(&Value::string("Hello World"), &sentence)
            .unwrap();
        assert_eq!(span, MatchSpan::contiguous(1, 3));
    }

    #[test]
    fn test_default_matcher_accents() {
        let matcher = DefaultValueMatcher;
        let sentence = sentence("play despacito now");
        assert!(matcher
            .match_value(&Value::string("Despacíto"), &sentence)
            .is_some());
    }

    #[test]
    fn test_currency_forms() {
        let matcher = DefaultValueMatcher;
        let value = Value::new(ValueKind::Currency {
            value: 50.0,
            unit: "usd".to_string(),
        });
        assert!(matcher.match_value(&value, &sentence("send $50 to bob")).is_some());
        assert!(matcher
            .match_value(&value, &sentence("send 50 dollars to bob"))
            .is_some());
        assert!(matcher.match_value(&value, &sentence("send money to bob")).is_none());
    }

    #[test]
    fn test_consecutive_allocation_follows_sentence_order() {
        let matcher = DefaultValueMatcher;
        let sentence = sentence("translate cat and then dog");
        let mut allocator =
            EntityAllocator::new(AllocationMode::Consecutive, &matcher, &sentence);

        // program order: dog first, cat second; sentence order wins
        allocator
            .record(&Value::string("dog"), "QUOTED_STRING".to_string())
            .unwrap();
        allocator
            .record(&Value::string("cat"), "QUOTED_STRING".to_string())
            .unwrap();
        allocator.assign();

        assert_eq!(
            allocator.token_for(&Value::string("cat")).unwrap(),
            "QUOTED_STRING_0"
        );
        assert_eq!(
            allocator.token_for(&Value::string("dog")).unwrap(),
            "QUOTED_STRING_1"
        );
    }

    #[test]
    fn test_sequential_allocation_follows_program_order() {
        let matcher = DefaultValueMatcher;
        let sentence = sentence("translate cat and then dog");
        let mut allocator =
            EntityAllocator::new(AllocationMode::Sequential, &matcher, &sentence);

        allocator
            .record(&Value::string("dog"), "QUOTED_STRING".to_string())
            .unwrap();
        allocator
            .record(&Value::string("cat"), "QUOTED_STRING".to_string())
            .unwrap();
        allocator.assign();

        assert_eq!(
            allocator.token_for(&Value::string("dog")).unwrap(),
            "QUOTED_STRING_0"
        );
        assert_eq!(
            allocator.token_for(&Value::string("cat")).unwrap(),
            "QUOTED_STRING_1"
        );
    }

    #[test]
    fn test_unmatched_literal_errors_in_consecutive_mode() {
        let matcher = DefaultValueMatcher;
        let sentence = sentence("post something");
        let mut allocator =
            EntityAllocator::new(AllocationMode::Consecutive, &matcher, &sentence);

        let err = allocator
            .record(&Value::string("missing text"), "QUOTED_STRING".to_string())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnmatchedLiteral);
    }

    #[test]
    fn test_identical_literals_share_a_token() {
        let matcher = DefaultValueMatcher;
        let sentence = sentence("compare cat with cat");
        let mut allocator =
            EntityAllocator::new(AllocationMode::Consecutive, &matcher, &sentence);
        allocator
            .record(&Value::string("cat"), "QUOTED_STRING".to_string())
            .unwrap();
        allocator
            .record(&Value::string("cat"), "QUOTED_STRING".to_string())
            .unwrap();
        allocator.assign();
        assert_eq!(allocator.into_entities().len(), 1);
    }
}
