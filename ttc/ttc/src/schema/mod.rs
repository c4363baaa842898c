//! The schema collaborator interface: how the typechecker and the NN codec
//! obtain function and class schemas from the Thingpedia catalogue.

mod caching;
mod memory;

pub use caching::CachingSchemaRetriever;
pub use memory::MemorySchemaRetriever;

use std::future::Future;
use std::sync::Arc;

use ttc_parser::ast::{ClassDef, Dataset, FunctionDef, FunctionType, Input};
use ttc_parser::error::Detail;
use ttc_parser::Error;

/// Options for [SchemaRetriever::get_class].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFlags {
    /// populate `#_[...]` natural-language annotations
    pub inject_natural_language: bool,
    /// fetch the full metadata, not just the signatures
    pub get_meta: bool,
}

/// The only I/O-capable collaborator of the toolchain.
///
/// All operations are asynchronous; while a fetch is outstanding, work on
/// unrelated parts of the AST may proceed. Idempotent retries on transient
/// failures are the retriever's responsibility: by the time an error reaches
/// the toolchain it is final.
pub trait SchemaRetriever {
    /// The declaration of one query or action.
    fn get_function(
        &self,
        kind: &str,
        name: &str,
        function_type: FunctionType,
    ) -> impl Future<Output = Result<Arc<FunctionDef>, Error>>;

    /// The full definition of a class.
    fn get_class(
        &self,
        kind: &str,
        flags: ClassFlags,
    ) -> impl Future<Output = Result<Arc<ClassDef>, Error>>;

    /// The composable examples of the given classes, merged in one dataset.
    fn get_examples_by_kinds(
        &self,
        kinds: &[String],
    ) -> impl Future<Output = Result<Dataset, Error>>;

    /// Return the node with `#_[canonical]`, `#_[confirmation]` and
    /// `#_[formatted]` annotations populated from the catalogue.
    ///
    /// The default implementation returns the node unchanged.
    fn inject_natural_language_annotations(
        &self,
        node: Input,
    ) -> impl Future<Output = Result<Input, Error>> {
        async move { Ok(node) }
    }
}

pub(crate) fn not_found_error(what: &str, name: &str) -> Error {
    Error::new(
        ttc_parser::ErrorKind::Type(ttc_parser::TypeErrorKind::UnresolvedSchema),
        Detail::Missing {
            what: what.to_string(),
            name: name.to_string(),
        },
    )
}

pub(crate) fn is_not_found(error: &Error) -> bool {
    matches!(error.detail, Detail::Missing { .. })
}
