//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value type. The language has exactly these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// 32-bit signed integer
    Int,
    /// 64-bit float
    Float,
}

impl Type {
    /// Bytes one array element of this type occupies in linear memory
    pub fn byte_width(&self) -> u32 {
        match self {
            Type::Int => 4,
            Type::Float => 8,
        }
    }

    /// log2 of the natural alignment, as used in memory instruction hints
    pub fn align_log2(&self) -> u32 {
        match self {
            Type::Int => 2,
            Type::Float => 3,
        }
    }

    /// Result type of an arithmetic operation between `self` and `other`
    pub fn join(self, other: Type) -> Type {
        if self == Type::Float || other == Type::Float {
            Type::Float
        } else {
            Type::Int
        }
    }

    /// Whether a value of type `self` may be stored where `target` is expected.
    /// Int widens into Float; nothing narrows.
    pub fn coerces_to(self, target: Type) -> bool {
        self == target || (self == Type::Int && target == Type::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter types and optional return type of a routine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Option<Type>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        if let Some(ret) = self.ret {
            write!(f, " -> {}", ret)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_only_widens() {
        assert!(Type::Int.coerces_to(Type::Float));
        assert!(Type::Int.coerces_to(Type::Int));
        assert!(!Type::Float.coerces_to(Type::Int));
    }

    #[test]
    fn test_join() {
        assert_eq!(Type::Int.join(Type::Int), Type::Int);
        assert_eq!(Type::Int.join(Type::Float), Type::Float);
        assert_eq!(Type::Float.join(Type::Int), Type::Float);
    }

    #[test]
    fn test_signature_display() {
        let sig = Signature {
            params: vec![Type::Int, Type::Float],
            ret: Some(Type::Float),
        };
        assert_eq!(sig.to_string(), "(int, float) -> float");
    }
}
