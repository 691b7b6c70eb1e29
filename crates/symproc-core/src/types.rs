//! Resolved types.
//!
//! Resolving a type reference produces a [`TypeId`]. Resolution never fails:
//! a reference that cannot be bound yields [`TypeId::ERROR`], the single
//! error type shared by every generation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Nullability of a type usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    NotNull,
    Nullable,
    /// Unknown nullability of a foreign-language type.
    PlatformFlexible,
}

/// Handle to a resolved type in the session's type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId {
    index: u32,
    generation: u32,
}

impl TypeId {
    /// The error type.
    pub const ERROR: TypeId = TypeId {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        TypeId { index, generation }
    }

    pub fn is_error(self) -> bool {
        self == TypeId::ERROR
    }

    pub(crate) fn index(self) -> u32 {
        self.index
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error() {
            f.write_str("<error>")
        } else {
            write!(f, "type_{}@{}", self.index, self.generation)
        }
    }
}

/// A resolved, non-error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    /// Class, type alias or type parameter the type refers to.
    pub declaration: NodeId,
    pub nullability: Nullability,
    /// Type argument nodes, in order.
    pub arguments: Vec<NodeId>,
}

impl Type {
    pub fn is_nullable(&self) -> bool {
        self.nullability == Nullability::Nullable
    }

    /// Same type with a different nullability.
    pub fn with_nullability(&self, nullability: Nullability) -> Type {
        Type {
            nullability,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_is_a_singleton() {
        assert!(TypeId::ERROR.is_error());
        assert!(!TypeId::new(0, 0).is_error());
        assert_eq!(TypeId::ERROR.to_string(), "<error>");
    }

    #[test]
    fn nullability_override() {
        let ty = Type {
            declaration: NodeId::new(1, 0),
            nullability: Nullability::NotNull,
            arguments: Vec::new(),
        };
        let nullable = ty.with_nullability(Nullability::Nullable);
        assert!(nullable.is_nullable());
        assert_eq!(nullable.declaration, ty.declaration);
    }
}
