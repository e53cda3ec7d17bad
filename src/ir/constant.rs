//! Compile-time constant values and their static evaluation.
//!
//! The evaluation functions implement the managed-language semantics the
//! front end compiles from:
//!
//! - integer arithmetic wraps, and division or remainder by zero is never
//!   folded because it throws at run time
//! - `MIN / -1 == MIN` and `MIN % -1 == 0`
//! - shift distances are masked to the operand width (`& 31` / `& 63`)
//! - floating-point remainder is the truncated `fmod`
//! - `min` / `max` propagate NaN and order `-0.0` below `+0.0`
//! - float to integer conversion saturates and maps NaN to 0
//! - floating-point comparisons resolve NaN through a [`ComparisonBias`]
//!
//! Every function returns `None` when the operation cannot be folded, which
//! callers treat as "leave the instruction alone".

use std::fmt;

use crate::ir::{BinaryOp, ComparisonBias, ConditionKind, DataType, UnaryOp};

/// A compile-time constant.
///
/// All sub-word integer types share the `Int` representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    /// 32-bit (or narrower) integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// The null reference.
    Null,
}

impl ConstValue {
    /// Returns the zero value of `ty`, if the type has constants.
    #[must_use]
    pub const fn zero(ty: DataType) -> Option<Self> {
        match ty.kind() {
            DataType::Int32 => Some(Self::Int(0)),
            DataType::Int64 => Some(Self::Long(0)),
            DataType::Float32 => Some(Self::Float(0.0)),
            DataType::Float64 => Some(Self::Double(0.0)),
            DataType::Reference => Some(Self::Null),
            _ => None,
        }
    }

    /// Returns the integral value widened to 64 bits.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v as i64),
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value if this is an `Int` constant.
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match *self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if the value is represented by all-zero bits.
    ///
    /// `-0.0` is not a zero bit pattern.
    #[must_use]
    pub fn is_zero_bit_pattern(&self) -> bool {
        self.bits() == 0
    }

    /// Returns `true` for integral zero, `+0.0`, `-0.0` and null.
    #[must_use]
    pub fn is_arithmetic_zero(&self) -> bool {
        match *self {
            Self::Int(v) => v == 0,
            Self::Long(v) => v == 0,
            Self::Float(v) => v == 0.0,
            Self::Double(v) => v == 0.0,
            Self::Null => true,
        }
    }

    /// Returns `true` for integral one.
    #[must_use]
    pub const fn is_one(&self) -> bool {
        matches!(self, Self::Int(1) | Self::Long(1))
    }

    /// Returns `true` for integral minus one (all bits set).
    #[must_use]
    pub const fn is_minus_one(&self) -> bool {
        matches!(self, Self::Int(-1) | Self::Long(-1))
    }

    /// Returns `true` for a NaN float or double.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        match *self {
            Self::Float(v) => v.is_nan(),
            Self::Double(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Returns the raw bit pattern, used to intern constants.
    #[must_use]
    pub fn bits(&self) -> u64 {
        match *self {
            Self::Int(v) => u64::from(v as u32),
            Self::Long(v) => v as u64,
            Self::Float(v) => u64::from(v.to_bits()),
            Self::Double(v) => v.to_bits(),
            Self::Null => 0,
        }
    }

    /// Narrows an `Int` value to the range of a sub-word type.
    #[must_use]
    pub fn normalize(self, ty: DataType) -> Self {
        match (self, ty) {
            (Self::Int(v), DataType::Bool) => Self::Int(v & 1),
            (Self::Int(v), DataType::Int8) => Self::Int(i32::from(v as i8)),
            (Self::Int(v), DataType::Uint8) => Self::Int(i32::from(v as u8)),
            (Self::Int(v), DataType::Int16) => Self::Int(i32::from(v as i16)),
            (Self::Int(v), DataType::Uint16) => Self::Int(i32::from(v as u16)),
            (value, _) => value,
        }
    }

    /// Returns `true` if this constant is a valid value of `ty`.
    #[must_use]
    pub fn fits(&self, ty: DataType) -> bool {
        match (self, ty.kind()) {
            (Self::Int(_), DataType::Int32) => self.normalize(ty) == *self,
            (Self::Long(_), DataType::Int64)
            | (Self::Float(_), DataType::Float32)
            | (Self::Double(_), DataType::Float64)
            | (Self::Null, DataType::Reference) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v:?}f"),
            Self::Double(v) => write!(f, "{v:?}d"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Evaluates a unary operation on a constant.
#[must_use]
pub fn evaluate_unary(op: UnaryOp, ty: DataType, value: ConstValue) -> Option<ConstValue> {
    use ConstValue::{Double, Float, Int, Long};

    let result = match (op, value) {
        (UnaryOp::Neg, Int(v)) => Int(v.wrapping_neg()),
        (UnaryOp::Neg, Long(v)) => Long(v.wrapping_neg()),
        (UnaryOp::Neg, Float(v)) => Float(-v),
        (UnaryOp::Neg, Double(v)) => Double(-v),
        (UnaryOp::Not, Int(v)) if ty == DataType::Bool => Int(i32::from(v == 0)),
        (UnaryOp::Not, Int(v)) => Int(!v),
        (UnaryOp::Not, Long(v)) => Long(!v),
        (UnaryOp::Abs, Int(v)) => Int(v.wrapping_abs()),
        (UnaryOp::Abs, Long(v)) => Long(v.wrapping_abs()),
        (UnaryOp::Abs, Float(v)) => Float(v.abs()),
        (UnaryOp::Abs, Double(v)) => Double(v.abs()),
        _ => return None,
    };
    Some(result.normalize(ty))
}

/// Evaluates a binary operation on two constants.
///
/// For shifts `rhs` is the `Int` distance; for every other operation both
/// operands have the result's kind.
#[must_use]
pub fn evaluate_binary(
    op: BinaryOp,
    ty: DataType,
    lhs: ConstValue,
    rhs: ConstValue,
) -> Option<ConstValue> {
    use ConstValue::{Double, Float, Int, Long};

    let result = match (lhs, rhs) {
        (Int(a), Int(b)) => Int(int_op(op, a, b)?),
        (Long(a), Long(b)) if op.is_shift() => Long(long_shift(op, a, b)),
        (Long(a), Int(b)) if op.is_shift() => Long(long_shift(op, a, i64::from(b))),
        (Long(a), Long(b)) => Long(long_op(op, a, b)?),
        // Single precision results are exact after rounding the double result.
        (Float(a), Float(b)) => Float(float_op(op, f64::from(a), f64::from(b))? as f32),
        (Double(a), Double(b)) => Double(float_op(op, a, b)?),
        _ => return None,
    };
    Some(result.normalize(ty))
}

fn int_op(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => return None,
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Rem if b == 0 => return None,
        BinaryOp::Rem => a.wrapping_rem(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
        BinaryOp::UShr => (a as u32).wrapping_shr(b as u32) as i32,
        BinaryOp::Ror => (a as u32).rotate_right(b as u32 & 31) as i32,
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
    })
}

fn long_op(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => return None,
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Rem if b == 0 => return None,
        BinaryOp::Rem => a.wrapping_rem(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr | BinaryOp::Ror => long_shift(op, a, b),
    })
}

fn long_shift(op: BinaryOp, a: i64, distance: i64) -> i64 {
    let distance = (distance & 63) as u32;
    match op {
        BinaryOp::Shl => a.wrapping_shl(distance),
        BinaryOp::Shr => a.wrapping_shr(distance),
        BinaryOp::UShr => (a as u64).wrapping_shr(distance) as i64,
        _ => (a as u64).rotate_right(distance) as i64,
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Min => java_min(a, b),
        BinaryOp::Max => java_max(a, b),
        _ => return None,
    })
}

fn java_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

fn java_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else {
        a.max(b)
    }
}

/// Three-way floating-point comparison, resolving NaN through `bias`.
fn compare_fp(bias: ComparisonBias, a: f64, b: f64) -> Option<i32> {
    if a.is_nan() || b.is_nan() {
        return match bias {
            ComparisonBias::GtBias => Some(1),
            ComparisonBias::LtBias => Some(-1),
            ComparisonBias::NoBias => None,
        };
    }
    Some(if a < b {
        -1
    } else if a > b {
        1
    } else {
        0
    })
}

/// Evaluates a condition on two constants.
#[must_use]
pub fn evaluate_condition(
    kind: ConditionKind,
    bias: ComparisonBias,
    lhs: ConstValue,
    rhs: ConstValue,
) -> Option<bool> {
    use ConstValue::{Double, Float, Int, Long, Null};

    match (lhs, rhs) {
        (Int(a), Int(b)) => Some(integral_condition(
            kind,
            i64::from(a),
            i64::from(b),
            u64::from(a as u32),
            u64::from(b as u32),
        )),
        (Long(a), Long(b)) => Some(integral_condition(kind, a, b, a as u64, b as u64)),
        (Float(a), Float(b)) => fp_condition(kind, bias, f64::from(a), f64::from(b)),
        (Double(a), Double(b)) => fp_condition(kind, bias, a, b),
        (Null, Null) => match kind {
            ConditionKind::Equal => Some(true),
            ConditionKind::NotEqual => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn integral_condition(kind: ConditionKind, a: i64, b: i64, ua: u64, ub: u64) -> bool {
    match kind {
        ConditionKind::Equal => a == b,
        ConditionKind::NotEqual => a != b,
        ConditionKind::LessThan => a < b,
        ConditionKind::LessThanOrEqual => a <= b,
        ConditionKind::GreaterThan => a > b,
        ConditionKind::GreaterThanOrEqual => a >= b,
        ConditionKind::Below => ua < ub,
        ConditionKind::BelowOrEqual => ua <= ub,
        ConditionKind::Above => ua > ub,
        ConditionKind::AboveOrEqual => ua >= ub,
    }
}

fn fp_condition(kind: ConditionKind, bias: ComparisonBias, a: f64, b: f64) -> Option<bool> {
    if kind.is_unsigned() {
        return None;
    }
    if a.is_nan() || b.is_nan() {
        match kind {
            ConditionKind::Equal => return Some(false),
            ConditionKind::NotEqual => return Some(true),
            _ => {}
        }
    }
    let cmp = compare_fp(bias, a, b)?;
    Some(match kind {
        ConditionKind::Equal => cmp == 0,
        ConditionKind::NotEqual => cmp != 0,
        ConditionKind::LessThan => cmp < 0,
        ConditionKind::LessThanOrEqual => cmp <= 0,
        ConditionKind::GreaterThan => cmp > 0,
        _ => cmp >= 0,
    })
}

/// Evaluates a three-way comparison on two constants.
#[must_use]
pub fn evaluate_compare(bias: ComparisonBias, lhs: ConstValue, rhs: ConstValue) -> Option<i32> {
    use ConstValue::{Double, Float, Int, Long};

    match (lhs, rhs) {
        (Int(a), Int(b)) => Some(a.cmp(&b) as i32),
        (Long(a), Long(b)) => Some(a.cmp(&b) as i32),
        (Float(a), Float(b)) => compare_fp(bias, f64::from(a), f64::from(b)),
        (Double(a), Double(b)) => compare_fp(bias, a, b),
        _ => None,
    }
}

/// Converts a constant to `to`.
#[must_use]
pub fn convert(value: ConstValue, to: DataType) -> Option<ConstValue> {
    use ConstValue::{Double, Float, Int, Long};

    let result = match (value, to.kind()) {
        (Int(v), DataType::Int32) => Int(v),
        (Int(v), DataType::Int64) => Long(i64::from(v)),
        (Int(v), DataType::Float32) => Float(v as f32),
        (Int(v), DataType::Float64) => Double(f64::from(v)),
        (Long(v), DataType::Int32) => Int(v as i32),
        (Long(v), DataType::Int64) => Long(v),
        (Long(v), DataType::Float32) => Float(v as f32),
        (Long(v), DataType::Float64) => Double(v as f64),
        // `as` saturates and maps NaN to zero.
        (Float(v), DataType::Int32) => Int(v as i32),
        (Float(v), DataType::Int64) => Long(v as i64),
        (Float(v), DataType::Float32) => Float(v),
        (Float(v), DataType::Float64) => Double(f64::from(v)),
        (Double(v), DataType::Int32) => Int(v as i32),
        (Double(v), DataType::Int64) => Long(v as i64),
        (Double(v), DataType::Float32) => Float(v as f32),
        (Double(v), DataType::Float64) => Double(v),
        _ => return None,
    };
    Some(result.normalize(to))
}
