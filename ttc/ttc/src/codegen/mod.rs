//! The prettyprinter: emits canonical surface syntax from an AST.
//!
//! Deterministic: for any AST `a`, `parse(pretty(a)) = a` up to source
//! locations. Used for storage and round-tripping.

mod ast;
#[cfg(test)]
mod test;

use ttc_parser::ast::{Input, Value};

pub trait WriteSource {
    /// Converts self to its source representation according to specified
    /// options.
    fn write(&self, opt: WriteOpt) -> Option<String>;

    fn write_between<S: ToString>(&self, prefix: S, suffix: &str, opt: WriteOpt) -> Option<String> {
        let mut r = prefix.to_string();
        r += &self.write(opt.clone())?;
        r += suffix;
        Some(r)
    }
}

impl<T: WriteSource> WriteSource for &T {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        (*self).write(opt)
    }
}

#[derive(Clone)]
pub struct WriteOpt {
    /// String to emit as one indentation level
    pub tab: &'static str,

    /// Current indent used when emitting lines
    pub indent: u16,
}

impl Default for WriteOpt {
    fn default() -> Self {
        Self {
            // four spaces, fixed
            tab: "    ",
            indent: 0,
        }
    }
}

impl WriteOpt {
    fn indented(&self) -> Self {
        WriteOpt {
            indent: self.indent + 1,
            ..self.clone()
        }
    }

    fn write_indent(&self) -> String {
        self.tab.repeat(self.indent as usize)
    }
}

/// Holds a list of expressions, written on a single line with the given
/// separator.
struct SeparatedExprs<'a, T: WriteSource> {
    exprs: &'a [T],
    inline: &'static str,
}

impl<T: WriteSource> WriteSource for SeparatedExprs<'_, T> {
    fn write(&self, opt: WriteOpt) -> Option<String> {
        let mut parts = Vec::with_capacity(self.exprs.len());
        for expr in self.exprs {
            parts.push(expr.write(opt.clone())?);
        }
        Some(parts.join(self.inline))
    }
}

/// Emit the canonical surface syntax of any input.
pub fn pretty(input: &Input) -> String {
    // every node is writable; the writers never run out of width
    input.write(WriteOpt::default()).unwrap()
}

/// The single-line form of one value; also used by the typechecker and the
/// normalizer to synthesize column names for computed expressions.
pub fn write_value(value: &Value) -> String {
    value.write(WriteOpt::default()).unwrap()
}
