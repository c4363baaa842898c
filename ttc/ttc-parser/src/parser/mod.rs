mod filter;
mod program;
mod table;
#[cfg(test)]
mod test;
mod value;

use chumsky::error::SimpleReason;
use chumsky::{prelude::*, Stream};
use itertools::Itertools;

use crate::ast;
use crate::error::{Detail, Error, ErrorContext, ErrorKind};
use crate::lexer::lr::{Token, TokenKind};
use crate::span::Span;

pub(crate) type PError = Simple<TokenKind, Span>;

/// Parse a token stream into any [ast::Input].
///
/// The kind of input is detected from the leading tokens: dialogue states
/// start with `$dialogue`, control commands with `$stop` and friends,
/// permission rules with a filter followed by `:`, libraries with `class` or
/// `dataset`, and everything else is a program.
pub fn parse_tokens(tokens: Vec<Token>, source_id: u16) -> (Option<ast::Input>, Vec<Error>) {
    let semantic_tokens = tokens
        .into_iter()
        .filter(|token| !matches!(token.kind, TokenKind::Comment(_)))
        .collect_vec();

    let stream = prepare_stream(semantic_tokens, source_id);
    let (input, parse_errors) = program::input().parse_recovery(stream);

    let errors = parse_errors
        .into_iter()
        .map(convert_parser_error)
        .collect_vec();
    log::debug!("parse errors: {errors:?}");

    (input, errors)
}

/// Parse a token stream, expecting a permission rule.
pub fn parse_permission_rule_tokens(
    tokens: Vec<Token>,
    source_id: u16,
) -> (Option<ast::PermissionRule>, Vec<Error>) {
    let semantic_tokens = tokens
        .into_iter()
        .filter(|token| !matches!(token.kind, TokenKind::Comment(_)))
        .collect_vec();

    let stream = prepare_stream(semantic_tokens, source_id);
    let (rule, parse_errors) = program::permission_rule()
        .then_ignore(end())
        .parse_recovery(stream);

    let errors = parse_errors
        .into_iter()
        .map(convert_parser_error)
        .collect_vec();

    (rule, errors)
}

fn prepare_stream(
    tokens: Vec<Token>,
    source_id: u16,
) -> Stream<'static, TokenKind, Span, impl Iterator<Item = (TokenKind, Span)>> {
    let len = tokens.last().map(|t| t.span.end).unwrap_or_default();
    let eoi = Span {
        start: len,
        end: len + 1,
        source_id,
    };
    let tokens = tokens.into_iter().map(move |t| {
        (
            t.kind,
            Span {
                start: t.span.start,
                end: t.span.end,
                source_id,
            },
        )
    });
    Stream::from_iter(eoi, tokens)
}

fn convert_parser_error(e: PError) -> Error {
    let span = Some(e.span());

    if let SimpleReason::Custom(message) = e.reason() {
        return Error::new_simple(ErrorKind::Parse, message).at(span);
    }

    let found = e
        .found()
        .map(TokenKind::to_string)
        .unwrap_or_else(|| "the end of the input".to_string());
    let while_parsing = e.label().map(|label| label.to_string());

    // the expectation list explodes at some choice points; past a handful
    // of alternatives it reads better as a generic message
    let mut candidates = e
        .expected()
        .flatten()
        .map(TokenKind::to_string)
        .sorted()
        .collect_vec();
    let expected = match candidates.len() {
        0 => "something else".to_string(),
        1 => candidates.remove(0),
        2..=6 => {
            let last = candidates.pop().unwrap();
            format!("{} or {last}", candidates.join(", "))
        }
        _ => "something else".to_string(),
    };

    Error::new(
        ErrorKind::Parse,
        Detail::Syntax {
            expected,
            found,
            while_parsing,
        },
    )
    .at(span)
}

pub(crate) fn ident_part() -> impl Parser<TokenKind, String, Error = PError> + Clone {
    select! { TokenKind::Ident(ident) => ident }.map_err(|e: PError| {
        PError::expected_input_found(
            e.span(),
            [Some(TokenKind::Ident("".to_string()))],
            e.found().cloned(),
        )
    })
}

/// An identifier with a fixed spelling that is not reserved, such as `Date`
/// in `new Date(...)`.
pub(crate) fn named_ident(name: &'static str) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    select! { TokenKind::Ident(ident) if ident == name => () }
}

pub(crate) fn keyword(kw: &'static str) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    just(TokenKind::Keyword(kw.to_string())).ignored()
}

pub(crate) fn ctrl(char: char) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    just(TokenKind::Control(char)).ignored()
}

pub(crate) fn dollar(word: &'static str) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    just(TokenKind::Dollar(word.to_string())).ignored()
}

pub(crate) fn at_name() -> impl Parser<TokenKind, String, Error = PError> + Clone {
    select! { TokenKind::AtName(name) => name }
}

pub(crate) fn quoted_string() -> impl Parser<TokenKind, String, Error = PError> + Clone {
    select! { TokenKind::QuotedString(s) => s }
}

pub(crate) fn number() -> impl Parser<TokenKind, f64, Error = PError> + Clone {
    select! { TokenKind::Number(n) => n }
}

/// A number that must be a (possibly negative) integer.
pub(crate) fn integer() -> impl Parser<TokenKind, i64, Error = PError> + Clone {
    ctrl('-')
        .or_not()
        .then(number())
        .try_map(|(neg, n), span| {
            if n.fract() != 0.0 {
                return Err(PError::custom(span, "expected an integer"));
            }
            Ok(if neg.is_some() { -(n as i64) } else { n as i64 })
        })
}

/// A comma-separated sequence, allowing a trailing comma.
pub(crate) fn sequence<'a, P, O>(
    parser: P,
) -> impl Parser<TokenKind, Vec<O>, Error = PError> + Clone + 'a
where
    P: Parser<TokenKind, O, Error = PError> + Clone + 'a,
    O: Clone + 'a,
{
    parser.separated_by(ctrl(',')).allow_trailing()
}

/// Split a dotted `@`-name into class kind and channel name. The channel is
/// the last component; everything before it is the kind.
pub(crate) fn split_function_name(full: &str) -> Option<(String, String)> {
    let (kind, channel) = full.rsplit_once('.')?;
    Some((kind.to_string(), channel.to_string()))
}
