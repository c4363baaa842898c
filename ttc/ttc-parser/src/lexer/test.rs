use super::lr::TokenKind;
use super::*;

fn lex_kinds(source: &str) -> Vec<TokenKind> {
    lex_source(source, 0)
        .unwrap()
        .0
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn test_basic_tokens() {
    assert_eq!(
        lex_kinds("now => notify ;"),
        vec![
            TokenKind::Keyword("now".to_string()),
            TokenKind::ArrowFat,
            TokenKind::Keyword("notify".to_string()),
            TokenKind::Control(';'),
        ]
    );
}

#[test]
fn test_at_names() {
    assert_eq!(
        lex_kinds("@com.twitter.home_timeline()"),
        vec![
            TokenKind::AtName("com.twitter.home_timeline".to_string()),
            TokenKind::Control('('),
            TokenKind::Control(')'),
        ]
    );
}

#[test]
fn test_measure_is_one_token() {
    assert_eq!(
        lex_kinds("5kWh"),
        vec![TokenKind::Measure {
            value: 5.0,
            unit: "kWh".to_string()
        }]
    );
    assert_eq!(
        lex_kinds("1min 30s"),
        vec![
            TokenKind::Measure {
                value: 1.0,
                unit: "min".to_string()
            },
            TokenKind::Measure {
                value: 30.0,
                unit: "s".to_string()
            },
        ]
    );
}

#[test]
fn test_currency() {
    assert_eq!(
        lex_kinds("$50"),
        vec![TokenKind::Currency {
            value: 50.0,
            unit: "usd".to_string()
        }]
    );
    assert_eq!(
        lex_kinds("50$eur"),
        vec![TokenKind::Currency {
            value: 50.0,
            unit: "eur".to_string()
        }]
    );
}

#[test]
fn test_dollar_words() {
    assert_eq!(
        lex_kinds("$undefined $event $?"),
        vec![
            TokenKind::Dollar("undefined".to_string()),
            TokenKind::Dollar("event".to_string()),
            TokenKind::Dollar("?".to_string()),
        ]
    );
}

#[test]
fn test_operators() {
    assert_eq!(
        lex_kinds("== >= <= =~ ~= && || ^^ :="),
        vec![
            TokenKind::Eq,
            TokenKind::Gte,
            TokenKind::Lte,
            TokenKind::Substr,
            TokenKind::RevSubstr,
            TokenKind::And,
            TokenKind::Or,
            TokenKind::EntityMarker,
            TokenKind::ColonEq,
        ]
    );
}

#[test]
fn test_annotations_markers() {
    assert_eq!(
        lex_kinds("#[poll_interval=1min]"),
        vec![
            TokenKind::AnnotOpen,
            TokenKind::Ident("poll_interval".to_string()),
            TokenKind::Control('='),
            TokenKind::Measure {
                value: 1.0,
                unit: "min".to_string()
            },
            TokenKind::Control(']'),
        ]
    );
    assert!(matches!(
        lex_kinds("#_[canonical=\"tweet\"]")[0],
        TokenKind::NlAnnotOpen
    ));
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        lex_kinds(r#""a \"quoted\" string\n""#),
        vec![TokenKind::QuotedString("a \"quoted\" string\n".to_string())]
    );
}

#[test]
fn test_comments_are_tokens() {
    let kinds = lex_kinds("now // line comment\n/* block */ => notify;");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Keyword("now".to_string()),
            TokenKind::Comment(" line comment".to_string()),
            TokenKind::Comment(" block ".to_string()),
            TokenKind::ArrowFat,
            TokenKind::Keyword("notify".to_string()),
            TokenKind::Control(';'),
        ]
    );
}

#[test]
fn test_reserved_words() {
    // `in_array` is an identifier, `in` alone is a keyword
    assert_eq!(
        lex_kinds("in in_array"),
        vec![
            TokenKind::Keyword("in".to_string()),
            TokenKind::Ident("in_array".to_string()),
        ]
    );
}

#[test]
fn test_lexical_error() {
    let errors = lex_source("now => `", 0).unwrap_err();
    assert!(!errors.is_empty());
    assert_eq!(errors[0].kind, crate::error::ErrorKind::Lexical);
}
