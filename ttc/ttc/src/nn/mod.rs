//! The NN-syntax codec: a second, whitespace-tokenised surface form used as
//! the target of a semantic parser.
//!
//! Programs serialize to a restricted token alphabet; literal values become
//! placeholder tokens (`QUOTED_STRING_0`, `NUMBER_2`, ...) whose concrete
//! values travel in a separate entity dictionary. Encode/decode is an
//! isomorphism on typechecked, normalized programs up to allocation order.

mod allocator;
mod compat;
mod decode;
mod encode;
#[cfg(test)]
mod test;

pub use allocator::{AllocationMode, DefaultValueMatcher, MatchSpan, ValueMatcher};
pub use compat::apply_compatibility;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ttc_parser::ast::{Input, Value};
use ttc_parser::ty::Type;
use ttc_parser::Error;

use allocator::EntityAllocator;
use encode::{EmitSink, NnWriter, RecordSink};

/// Maps each placeholder token to its concrete value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDict(BTreeMap<String, Value>);

impl EntityDict {
    pub fn new() -> Self {
        EntityDict::default()
    }

    pub fn insert(&mut self, token: impl ToString, value: Value) {
        self.0.insert(token.to_string(), value);
    }

    pub fn get(&self, token: &str) -> Option<&Value> {
        self.0.get(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for EntityDict {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        EntityDict(iter.into_iter().collect())
    }
}

pub struct EncodeOptions<'a> {
    pub mode: AllocationMode,
    pub matcher: &'a dyn ValueMatcher,
    /// emit `SLOT_k` for the k-th empty slot instead of `undefined`
    pub allocate_slots: bool,
}

static DEFAULT_MATCHER: DefaultValueMatcher = DefaultValueMatcher;

impl Default for EncodeOptions<'static> {
    fn default() -> Self {
        EncodeOptions {
            mode: AllocationMode::default(),
            matcher: &DEFAULT_MATCHER,
            allocate_slots: false,
        }
    }
}

/// Serialize an AST into NN tokens against a tokenised sentence, allocating
/// entity placeholders for its literal values.
pub fn encode(
    input: &Input,
    sentence: &[String],
    options: &EncodeOptions,
) -> Result<(Vec<String>, EntityDict), Error> {
    let mut allocator = EntityAllocator::new(options.mode, options.matcher, sentence);

    // recording pass: collect literal occurrences in emission order
    {
        let mut sink = RecordSink {
            allocator: &mut allocator,
        };
        let mut writer = NnWriter::new(&mut sink, options.allocate_slots);
        writer.write_input(input)?;
    }
    allocator.assign();

    // emit pass: replay the assigned placeholders
    let mut sink = EmitSink {
        allocator: &allocator,
    };
    let mut writer = NnWriter::new(&mut sink, options.allocate_slots);
    writer.write_input(input)?;
    let tokens = writer.out;

    let entities = allocator.into_entities().into_iter().collect();
    log::debug!("encoded {} NN tokens", tokens.len());
    Ok((tokens, entities))
}

/// Parse NN tokens back into an AST, resolving placeholder tokens through
/// the entity dictionary. Fatal on any deviation from the grammar.
pub fn decode(tokens: &[String], entities: &EntityDict) -> Result<Input, Error> {
    decode::Decoder::new(tokens, entities).decode_input()
}

/// Like [decode], but first rewrites a token stream produced by an older
/// release of the NN syntax.
pub fn decode_with_version(
    tokens: Vec<String>,
    entities: &EntityDict,
    from_version: &semver::Version,
) -> Result<Input, Error> {
    let tokens = apply_compatibility(tokens, from_version);
    decode(&tokens, entities)
}

/// Whether a token is a placeholder to be resolved through the entity
/// dictionary.
pub(crate) fn is_entity_token(token: &str) -> bool {
    let Some((prefix, index)) = token.rsplit_once('_') else {
        return false;
    };
    if index.parse::<usize>().is_err() {
        return false;
    }
    matches!(
        prefix,
        "QUOTED_STRING"
            | "NUMBER"
            | "CURRENCY"
            | "DATE"
            | "TIME"
            | "LOCATION"
            | "USERNAME"
            | "HASHTAG"
            | "URL"
            | "PHONE_NUMBER"
            | "EMAIL_ADDRESS"
            | "PATH_NAME"
            | "SLOT"
    ) || prefix.starts_with("MEASURE_")
        || prefix.starts_with("GENERIC_ENTITY_")
}

/// The compact type tag used inside `param:name:Type` tokens. Must be a
/// single whitespace-free token; compounds are opaque here.
pub(crate) fn nn_type_tag(ty: &Type) -> String {
    match ty {
        Type::Compound(_) => "Compound".to_string(),
        Type::Array(elem) => format!("Array({})", nn_type_tag(elem)),
        other => other.to_string(),
    }
}
