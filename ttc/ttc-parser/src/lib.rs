//! Lexer, AST, type representation and surface-syntax parser for the
//! ThingTalk language.
//!
//! This crate is pure: no I/O and no async. Schema resolution, typechecking,
//! normalization and the NN codec live in the `ttc` crate.

pub mod ast;
pub mod error;
pub mod lexer;
mod parser;
pub mod span;
pub mod ty;

pub use error::{Detail, Error, ErrorContext, ErrorKind, Errors, TypeErrorKind};
pub use span::Span;

use error::ErrorKind as EK;

/// Lex source text into a token stream.
pub fn lex_source(source: &str, source_id: u16) -> Result<lexer::lr::Tokens, Vec<Error>> {
    lexer::lex_source(source, source_id)
}

/// Parse any ThingTalk input: program, permission rule, library, dataset,
/// bookkeeping, control command or dialogue state.
///
/// Lexical and parse errors are fatal: on error, no partial AST is returned.
pub fn parse_source(source: &str, source_id: u16) -> Result<ast::Input, Vec<Error>> {
    let tokens = lex_source(source, source_id)?;
    let (input, errors) = parser::parse_tokens(tokens.0, source_id);
    if !errors.is_empty() {
        return Err(errors);
    }
    input.ok_or_else(|| vec![Error::new_simple(EK::Parse, "empty input")])
}

/// Parse a program, rejecting other kinds of input.
pub fn parse_program(source: &str, source_id: u16) -> Result<ast::Program, Vec<Error>> {
    match parse_source(source, source_id)? {
        ast::Input::Program(program) => Ok(program),
        other => Err(vec![Error::new_simple(
            EK::Parse,
            format!("expected a program, got {}", input_kind_name(&other)),
        )]),
    }
}

/// Parse a permission rule.
pub fn parse_permission_rule(source: &str, source_id: u16) -> Result<ast::PermissionRule, Vec<Error>> {
    let tokens = lex_source(source, source_id)?;
    let (rule, errors) = parser::parse_permission_rule_tokens(tokens.0, source_id);
    if !errors.is_empty() {
        return Err(errors);
    }
    rule.ok_or_else(|| vec![Error::new_simple(EK::Parse, "empty input")])
}

fn input_kind_name(input: &ast::Input) -> &'static str {
    match input {
        ast::Input::Program(_) => "a program",
        ast::Input::PermissionRule(_) => "a permission rule",
        ast::Input::Library(_) => "a library",
        ast::Input::Dataset(_) => "a dataset",
        ast::Input::Bookkeeping(_) => "a bookkeeping command",
        ast::Input::ControlCommand(_) => "a control command",
        ast::Input::DialogueState(_) => "a dialogue state",
    }
}
