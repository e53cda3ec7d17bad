//! Result types of IR instructions.

use strum::{Display, EnumIter};

/// The declared result type of an instruction.
///
/// Sub-word integer types (`Bool`, `Int8`, `Uint8`, `Int16`, `Uint16`) are
/// carried as 32-bit values at run time; the type records the narrowing that
/// produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    /// No value.
    Void,
    /// Boolean, represented as 0 or 1.
    Bool,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer (UTF-16 code unit).
    Uint16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// IEEE-754 single precision.
    Float32,
    /// IEEE-754 double precision.
    Float64,
    /// Object reference.
    Reference,
}

impl DataType {
    /// Returns `true` for every integer type, including `Bool`.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int8
                | Self::Uint8
                | Self::Int16
                | Self::Uint16
                | Self::Int32
                | Self::Int64
        )
    }

    /// Returns `true` for `Int32` and `Int64`.
    #[must_use]
    pub const fn is_int_or_long(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    /// Returns `true` for `Float32` and `Float64`.
    #[must_use]
    pub const fn is_floating_point(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns `true` for `Reference`.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, Self::Reference)
    }

    /// Returns `true` for 64-bit wide types.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    /// Returns the storage size in bits, 0 for `Void`.
    #[must_use]
    pub const fn bit_width(self) -> u32 {
        match self {
            Self::Void => 0,
            Self::Bool | Self::Int8 | Self::Uint8 => 8,
            Self::Int16 | Self::Uint16 => 16,
            Self::Int32 | Self::Float32 | Self::Reference => 32,
            Self::Int64 | Self::Float64 => 64,
        }
    }

    /// Returns the type an arithmetic operation on this type computes in.
    ///
    /// Sub-word integers are promoted to `Int32`; every other type is its own kind.
    #[must_use]
    pub const fn kind(self) -> Self {
        match self {
            Self::Bool | Self::Int8 | Self::Uint8 | Self::Int16 | Self::Uint16 => Self::Int32,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn integral_types_promote_to_int32() {
        for ty in DataType::iter().filter(|t| t.is_integral() && *t != DataType::Int64) {
            assert_eq!(ty.kind(), DataType::Int32, "{ty}");
        }
        assert_eq!(DataType::Int64.kind(), DataType::Int64);
    }

    #[test]
    fn classification_is_disjoint() {
        for ty in DataType::iter() {
            let classes = [ty.is_integral(), ty.is_floating_point(), ty.is_reference()]
                .iter()
                .filter(|&&c| c)
                .count();
            assert!(classes <= 1, "{ty} belongs to {classes} classes");
        }
    }
}
