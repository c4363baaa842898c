use std::sync::Arc;

use ttc_parser::ty::Type;

/// A persistent environment mapping names to types.
///
/// Binding is O(1) and never mutates existing frames, so scopes can be
/// extended along one branch of the AST without affecting siblings. Lookup
/// walks the chain, O(depth).
#[derive(Debug, Clone, Default)]
pub struct Scope {
    head: Option<Arc<Frame>>,
}

#[derive(Debug)]
struct Frame {
    name: String,
    ty: Type,
    parent: Option<Arc<Frame>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn bind(&self, name: impl ToString, ty: Type) -> Scope {
        Scope {
            head: Some(Arc::new(Frame {
                name: name.to_string(),
                ty,
                parent: self.head.clone(),
            })),
        }
    }

    /// The innermost binding for `name`, shadowing outer ones.
    pub fn lookup(&self, name: &str) -> Option<&Type> {
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            if f.name == name {
                return Some(&f.ty);
            }
            frame = f.parent.as_deref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// All visible bindings, innermost first, shadowed names omitted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type)> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            if !seen.contains(&f.name.as_str()) {
                seen.push(&f.name);
                out.push((f.name.as_str(), &f.ty));
            }
            frame = f.parent.as_deref();
        }
        out.into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_persistent_binding() {
        let base = Scope::new().bind("a", Type::String);
        let left = base.bind("b", Type::Number);
        let right = base.bind("b", Type::Boolean);

        assert_eq!(left.lookup("b"), Some(&Type::Number));
        assert_eq!(right.lookup("b"), Some(&Type::Boolean));
        assert_eq!(base.lookup("b"), None);
        assert_eq!(left.lookup("a"), Some(&Type::String));
    }

    #[test]
    fn test_shadowing() {
        let scope = Scope::new()
            .bind("x", Type::String)
            .bind("x", Type::Number);
        assert_eq!(scope.lookup("x"), Some(&Type::Number));
        assert_eq!(scope.iter().count(), 1);
    }
}
