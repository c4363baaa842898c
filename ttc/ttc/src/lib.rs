//! The ThingTalk core toolchain.
//!
//! ThingTalk is the domain-specific language a virtual assistant uses to
//! bind natural-language intents to structured invocations of third-party
//! skills. This crate provides everything past parsing: the typechecker
//! (against an asynchronous schema catalogue), the normalizer, the
//! NN-syntax codec used as a neural semantic-parser target, and the
//! prettyprinter.
//!
//! The pipeline, end to end:
//!
//! ```text
//! source text ──parse──▶ AST ──typecheck──▶ typed AST ──normalize──▶ canonical AST
//!                                                                    │        ▲
//!                                                              encode│        │decode
//!                                                                    ▼        │
//!                                                              NN tokens + entities
//! ```
//!
//! Everything is pure except the [schema::SchemaRetriever], which is the
//! only I/O-capable collaborator.

pub mod codegen;
pub mod nn;
pub mod normalize;
pub mod schema;
pub mod typecheck;

pub use ttc_parser::{
    ast, lex_source, parse_permission_rule, parse_program, parse_source, ty, Error, ErrorKind,
    Errors, Span, TypeErrorKind,
};

pub use codegen::pretty;
pub use normalize::normalize;
pub use typecheck::{typecheck, TypecheckOptions};
