pub mod lr;
#[cfg(test)]
mod test;

use chumsky::{error::Cheap, prelude::*};

use self::lr::{Token, TokenKind, Tokens, KEYWORDS};
use crate::error::{Detail, Error, ErrorContext, ErrorKind};
use crate::span::Span;

/// Lex source text into tokens.
pub fn lex_source(source: &str, source_id: u16) -> Result<Tokens, Vec<Error>> {
    lexer().parse(source).map(Tokens).map_err(|e| {
        e.into_iter()
            .map(|e| convert_lexer_error(source, e, source_id))
            .collect()
    })
}

fn convert_lexer_error(source: &str, e: Cheap<char>, source_id: u16) -> Error {
    // We want to slice based on the chars, not the bytes, so we can't just
    // index into the str.
    let found = source
        .chars()
        .skip(e.span().start)
        .take(e.span().end - e.span().start)
        .collect();
    let span = Some(Span {
        start: e.span().start,
        end: e.span().end,
        source_id,
    });

    Error::new(
        ErrorKind::Lexical,
        Detail::Syntax {
            expected: "a token".to_string(),
            found,
            while_parsing: None,
        },
    )
    .at(span)
}

/// Lex chars to tokens until the end of the input
pub(crate) fn lexer() -> impl Parser<char, Vec<Token>, Error = Cheap<char>> {
    let control_multi = choice((
        just("=>").to(TokenKind::ArrowFat),
        just(":=").to(TokenKind::ColonEq),
        just("==").to(TokenKind::Eq),
        just(">=").to(TokenKind::Gte),
        just("<=").to(TokenKind::Lte),
        just("=~").to(TokenKind::Substr),
        just("~=").to(TokenKind::RevSubstr),
        just("&&").to(TokenKind::And),
        just("||").to(TokenKind::Or),
        just("**").to(TokenKind::Pow),
        just("^^").to(TokenKind::EntityMarker),
        just("#_[").to(TokenKind::NlAnnotOpen),
        just("#[").to(TokenKind::AnnotOpen),
    ));

    let control = one_of("()[]{},.:;=!+-*/%~").map(TokenKind::Control);

    let ident = ident_part().map(|name| {
        if KEYWORDS.contains(&name.as_str()) {
            TokenKind::Keyword(name)
        } else {
            TokenKind::Ident(name)
        }
    });

    let at_name = just('@')
        .ignore_then(dotted_ident())
        .map(TokenKind::AtName);

    let dollar = just('$')
        .ignore_then(ident_part().or(just('?').to("?".to_string())))
        .map(TokenKind::Dollar);

    // `$50` is a currency with the locale's default unit
    let currency_prefix = just('$')
        .ignore_then(number_chars())
        .try_map(|chars, span| parse_f64(chars, span))
        .map(|value| TokenKind::Currency {
            value,
            unit: "usd".to_string(),
        });

    // the no-spaces shorthand `50$usd`
    let currency_suffix = number_chars()
        .then_ignore(just('$'))
        .then(unit_part())
        .try_map(|(chars, unit), span| Ok(TokenKind::Currency { value: parse_f64(chars, span)?, unit }));

    // a measure such as `5kWh` is a single token with a structured payload
    let measure = number_chars()
        .then(unit_part())
        .try_map(|(chars, unit), span| Ok(TokenKind::Measure { value: parse_f64(chars, span)?, unit }));

    let number = number_chars()
        .try_map(parse_f64)
        .map(TokenKind::Number);

    let string = quoted_string().map(TokenKind::QuotedString);

    let line_comment = just("//")
        .ignore_then(filter(|c: &char| *c != '\n').repeated().collect::<String>())
        .map(TokenKind::Comment);

    let block_comment = just("/*")
        .ignore_then(take_until(just("*/")))
        .map(|(chars, _)| TokenKind::Comment(chars.into_iter().collect()));

    let token = choice((
        block_comment,
        line_comment,
        control_multi,
        string,
        at_name,
        currency_prefix,
        dollar,
        currency_suffix,
        measure,
        number,
        ident,
        control,
    ))
    .recover_with(skip_then_retry_until([]).skip_start());

    let whitespace = filter(|c: &char| c.is_whitespace())
        .repeated()
        .at_least(1)
        .ignored();

    whitespace
        .or_not()
        .ignore_then(
            token
                .map_with_span(|kind, span| Token { kind, span })
                .then_ignore(whitespace.or_not())
                .repeated(),
        )
        .then_ignore(end())
}

pub(crate) fn ident_part() -> impl Parser<char, String, Error = Cheap<char>> + Clone {
    filter(|c: &char| c.is_alphabetic() || *c == '_')
        .chain(filter(|c: &char| c.is_alphanumeric() || *c == '_').repeated())
        .collect()
}

/// A dotted name such as `com.twitter.home_timeline`.
fn dotted_ident() -> impl Parser<char, String, Error = Cheap<char>> + Clone {
    ident_part()
        .then(just('.').ignore_then(ident_part()).repeated())
        .map(|(head, rest)| {
            let mut name = head;
            for part in rest {
                name.push('.');
                name.push_str(&part);
            }
            name
        })
}

/// A unit suffix: letters and digits, starting with a letter.
fn unit_part() -> impl Parser<char, String, Error = Cheap<char>> + Clone {
    filter(|c: &char| c.is_ascii_alphabetic())
        .chain(filter(|c: &char| c.is_ascii_alphanumeric()).repeated())
        .collect()
}

fn number_chars() -> impl Parser<char, Vec<char>, Error = Cheap<char>> + Clone {
    let integer = filter(|c: &char| c.is_ascii_digit() && *c != '0')
        .chain::<char, Vec<char>, _>(filter(|c: &char| c.is_ascii_digit()).repeated())
        .or(just('0').map(|c| vec![c]));

    let frac = just('.')
        .chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit()))
        .chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit()).repeated());

    let exp = one_of("eE").chain(
        one_of("+-")
            .or_not()
            .chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit()).repeated().at_least(1)),
    );

    integer
        .chain::<char, _, _>(frac.or_not().flatten())
        .chain::<char, _, _>(exp.or_not().flatten())
}

fn parse_f64(chars: Vec<char>, span: std::ops::Range<usize>) -> Result<f64, Cheap<char>> {
    let str: String = chars.into_iter().collect();
    str.parse::<f64>()
        .map_err(|_| Cheap::expected_input_found(span, None, None))
}

fn quoted_string() -> impl Parser<char, String, Error = Cheap<char>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('\\').to('\\'),
        just('"').to('"'),
        just('\'').to('\''),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
    )));

    let plain = filter(|c: &char| *c != '"' && *c != '\\');

    just('"')
        .ignore_then(plain.or(escape).repeated())
        .then_ignore(just('"'))
        .collect()
        .labelled("string")
}
