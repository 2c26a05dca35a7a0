//! [`PrimitiveType`] — the closed set of element and expression value types.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The primitive types an [`crate::runtime::Element`] or expression node can
/// hold. `Bool` is the sole non-arithmetic member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
}

impl PrimitiveType {
    /// Size of the type's representation in bytes.
    pub fn size_bytes(self) -> usize {
        use PrimitiveType::*;
        match self {
            I8 | U8 | Bool => 1,
            I16 | U16 => 2,
            I32 | U32 | F32 => 4,
            I64 | U64 | F64 => 8,
        }
    }

    /// Whether the type participates in arithmetic (every type but `Bool`).
    pub fn is_arithmetic(self) -> bool {
        !matches!(self, PrimitiveType::Bool)
    }

    pub fn is_signed(self) -> bool {
        use PrimitiveType::*;
        matches!(self, I8 | I16 | I32 | I64 | F32 | F64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveType::F32 | PrimitiveType::F64)
    }

    /// The config-file spelling of the type (`I32`, `bool`, ...). Numeric
    /// types are upper-case; `bool` is the sole lower-case spelling.
    pub fn name(self) -> &'static str {
        use PrimitiveType::*;
        match self {
            I8 => "I8",
            I16 => "I16",
            I32 => "I32",
            I64 => "I64",
            U8 => "U8",
            U16 => "U16",
            U32 => "U32",
            U64 => "U64",
            F32 => "F32",
            F64 => "F64",
            Bool => "bool",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TYPE_FROM_NAME.get(name).copied()
    }
}

static TYPE_FROM_NAME: Lazy<HashMap<&'static str, PrimitiveType>> = Lazy::new(|| {
    use PrimitiveType::*;
    [
        I8, I16, I32, I64, U8, U16, U32, U64, F32, F64, Bool,
    ]
    .into_iter()
    .map(|t| (t.name(), t))
    .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_not_arithmetic() {
        assert!(!PrimitiveType::Bool.is_arithmetic());
        assert!(PrimitiveType::I32.is_arithmetic());
    }

    #[test]
    fn name_round_trips_through_lookup_table() {
        for t in [
            PrimitiveType::I8,
            PrimitiveType::U64,
            PrimitiveType::F32,
            PrimitiveType::Bool,
        ] {
            assert_eq!(PrimitiveType::from_name(t.name()), Some(t));
        }
        assert_eq!(PrimitiveType::from_name("frobnicate"), None);
    }

    #[test]
    fn size_bytes_matches_c_abi_widths() {
        assert_eq!(PrimitiveType::I32.size_bytes(), 4);
        assert_eq!(PrimitiveType::F64.size_bytes(), 8);
        assert_eq!(PrimitiveType::Bool.size_bytes(), 1);
    }
}
