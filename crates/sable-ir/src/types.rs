//! IR Types
//!
//! The IR consumes types as opaque structural values: it needs equality,
//! a `to_type` coercion point, structural rewriting and a printable name,
//! nothing more. Type inference and subtyping live in the checker, not here.

use std::fmt;

/// A structural type value.
///
/// `Bottom` is the sentinel for "no computed type": freshly created values
/// default to it and the printer renders it as `bottom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No computed type
    Bottom,
    /// The type of basic-block labels
    Label,
    /// A named monotype (e.g. `Integer`)
    Mono(String),
    /// A composite tuple type
    Tuple(Vec<Type>),
}

impl Type {
    /// Create a monotype from a name
    pub fn mono(name: impl Into<String>) -> Self {
        Type::Mono(name.into())
    }

    /// Coercion point of the type protocol; a `Type` is already a type.
    pub fn to_type(&self) -> &Type {
        self
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Type::Bottom)
    }

    /// Structurally rewrite `from` to `to`, returning the new type.
    pub fn replace_type_with(&self, from: &Type, to: &Type) -> Type {
        if self == from {
            return to.clone();
        }
        match self {
            Type::Tuple(elems) => Type::Tuple(
                elems
                    .iter()
                    .map(|e| e.replace_type_with(from, to))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Bare name without the printer's `^` sigil (used by the event stream).
    pub fn name(&self) -> String {
        match self {
            Type::Bottom => "bottom".to_string(),
            Type::Label => "label".to_string(),
            Type::Mono(name) => name.clone(),
            Type::Tuple(elems) => {
                let names: Vec<String> = elems.iter().map(|e| e.name()).collect();
                format!("({})", names.join(", "))
            }
        }
    }

    /// Structural kind as reported to the event stream.
    pub fn kind(&self) -> &'static str {
        match self {
            Type::Tuple(_) => "composite",
            _ => "monotype",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bottom => write!(f, "bottom"),
            other => write!(f, "^{}", other.name()),
        }
    }
}
