//! The closed set of instruction op-kinds.
//!
//! Every pass matches on [`InstructionKind`] directly, so adding a variant
//! forces each pass to decide how to treat it. Operands are never stored in
//! the kind itself; they live in the instruction's input list so that the
//! def-use bookkeeping in [`crate::ir::Graph`] covers them.
//!
//! # Operand conventions
//!
//! | Kind | Inputs |
//! |------|--------|
//! | `Unary` | `[value]` |
//! | `Binary`, `Condition`, `Compare` | `[lhs, rhs]` (shift distance is `rhs`) |
//! | `InstanceFieldGet` | `[object]` |
//! | `InstanceFieldSet` | `[object, value]` |
//! | `StaticFieldGet` | `[class]` |
//! | `StaticFieldSet` | `[class, value]` |
//! | `ArrayGet`, `VecLoad` | `[array, index]` |
//! | `ArraySet`, `VecStore` | `[array, index, value]` |
//! | `If` | `[condition]` |
//! | `Phi` | one value per predecessor, positionally |
//! | `BitwiseNegatedRight(op)` | `[lhs, rhs]`, computes `lhs op !rhs` |
//! | `AndNot` | `[negated, other]`, computes `!negated & other` |
//! | `ShiftAdd { distance }` | `[shifted, addend]`, computes `(shifted << distance) + addend` |
//! | `VecMultiplyAccumulate` | `[accumulator, mul_lhs, mul_rhs]` |
//! | `RefreshedObject` | `[object]` |

use strum::{Display, IntoStaticStr};

use crate::ir::{ConstValue, DataType, SideEffects};

/// Unary arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement (logical negation for `Bool`).
    Not,
    /// Absolute value.
    Abs,
}

/// Binary arithmetic and logical operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division, truncating toward zero for integers.
    Div,
    /// Remainder with the sign of the dividend.
    Rem,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    UShr,
    /// Rotate right.
    Ror,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

impl BinaryOp {
    /// Returns `true` if `op(a, b) == op(b, a)` for every operand pair.
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::And | Self::Or | Self::Xor | Self::Min | Self::Max
        )
    }

    /// Returns `true` for shifts and rotates, whose right operand is an `Int32` distance.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr | Self::UShr | Self::Ror)
    }

    /// Returns `true` for `And`, `Or` and `Xor`.
    #[must_use]
    pub const fn is_bitwise(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }
}

/// Comparison predicates producing a `Bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ConditionKind {
    /// `lhs == rhs`
    Equal,
    /// `lhs != rhs`
    NotEqual,
    /// Signed `lhs < rhs`
    LessThan,
    /// Signed `lhs <= rhs`
    LessThanOrEqual,
    /// Signed `lhs > rhs`
    GreaterThan,
    /// Signed `lhs >= rhs`
    GreaterThanOrEqual,
    /// Unsigned `lhs < rhs`
    Below,
    /// Unsigned `lhs <= rhs`
    BelowOrEqual,
    /// Unsigned `lhs > rhs`
    Above,
    /// Unsigned `lhs >= rhs`
    AboveOrEqual,
}

impl ConditionKind {
    /// Returns `true` for the unsigned predicates.
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::Below | Self::BelowOrEqual | Self::Above | Self::AboveOrEqual
        )
    }
}

/// How a floating-point comparison treats unordered (NaN) operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum ComparisonBias {
    /// Integral comparison; no NaN handling needed.
    #[default]
    NoBias,
    /// NaN compares as greater (`fcmpg`).
    GtBias,
    /// NaN compares as less (`fcmpl`).
    LtBias,
}

/// Static description of a field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldInfo {
    /// Byte offset of the field within its object.
    pub offset: u32,
    /// Index of the declaring class definition.
    pub declaring_class: u32,
    /// Declared type of the field.
    pub field_type: DataType,
    /// Whether the field is volatile.
    pub is_volatile: bool,
}

impl FieldInfo {
    /// Creates a non-volatile field description.
    #[must_use]
    pub const fn new(offset: u32, declaring_class: u32, field_type: DataType) -> Self {
        Self {
            offset,
            declaring_class,
            field_type,
            is_volatile: false,
        }
    }

    /// Marks the field volatile.
    #[must_use]
    pub const fn volatile(mut self) -> Self {
        self.is_volatile = true;
        self
    }
}

/// The form of GC write barrier a reference store must emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum WriteBarrierKind {
    /// Emit a barrier, skipping it at run time when the stored value is null.
    #[default]
    EmitWithNullCheck,
    /// Emit a barrier unconditionally; a later store relies on it.
    EmitNoNullCheck,
    /// No barrier is needed.
    DontEmit,
}

/// How the refreshed-object pseudo-op exposes the read-barrier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ReadBarrierState {
    /// The state word is loaded into a register and tested explicitly.
    Explicit,
    /// The state is tested in memory by the consuming reads.
    Implicit,
}

/// Lock acquisition or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MonitorKind {
    /// Acquire the object's monitor.
    Enter,
    /// Release the object's monitor.
    Exit,
}

/// Element type and lane count of a vector operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorShape {
    /// Type of each lane.
    pub packed_type: DataType,
    /// Number of lanes.
    pub vector_length: u32,
}

impl VectorShape {
    /// Creates a vector shape.
    #[must_use]
    pub const fn new(packed_type: DataType, vector_length: u32) -> Self {
        Self {
            packed_type,
            vector_length,
        }
    }
}

/// Whether a multiply-accumulate adds or subtracts the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AccumulateOp {
    /// `acc + a * b`
    Add,
    /// `acc - a * b`
    Sub,
}

/// The op-kind of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, IntoStaticStr)]
pub enum InstructionKind {
    /// Incoming method argument.
    Parameter {
        /// Argument position.
        index: u16,
        /// Whether the caller guarantees a non-null reference (`this`).
        non_null: bool,
    },
    /// Compile-time constant.
    Constant(ConstValue),
    /// Unary operation.
    Unary(UnaryOp),
    /// Binary operation.
    Binary(BinaryOp),
    /// Comparison producing a `Bool`.
    Condition {
        /// The predicate.
        kind: ConditionKind,
        /// NaN treatment for floating-point operands.
        bias: ComparisonBias,
    },
    /// Three-way comparison producing -1, 0 or 1.
    Compare {
        /// NaN treatment for floating-point operands.
        bias: ComparisonBias,
    },
    /// Conversion from the input's type to the result type.
    TypeConversion,
    /// Throws if the integer input is zero; produces the input.
    DivZeroCheck,
    /// Throws if the reference input is null; produces the input.
    NullCheck,
    /// Type refinement of a reference; produces the input.
    BoundType {
        /// Whether the refined value may still be null.
        can_be_null: bool,
    },
    /// Address of an array's data plus a constant offset.
    IntermediateAddress {
        /// Byte offset of the first element.
        offset: u32,
    },
    /// Class object load, the base of static field accesses.
    LoadClass {
        /// Class definition index.
        class: u32,
    },
    /// Object allocation.
    NewInstance {
        /// Class definition index.
        class: u32,
    },
    /// Array allocation, input 0 is the length.
    NewArray {
        /// Element type.
        component: DataType,
    },
    /// Read of an instance field.
    InstanceFieldGet {
        /// The field.
        field: FieldInfo,
        /// Whether this read emits its own GC read barrier.
        needs_read_barrier: bool,
    },
    /// Write of an instance field.
    InstanceFieldSet {
        /// The field.
        field: FieldInfo,
        /// Required write barrier.
        write_barrier: WriteBarrierKind,
    },
    /// Read of a static field.
    StaticFieldGet {
        /// The field.
        field: FieldInfo,
    },
    /// Write of a static field.
    StaticFieldSet {
        /// The field.
        field: FieldInfo,
        /// Required write barrier.
        write_barrier: WriteBarrierKind,
    },
    /// Read of an array element.
    ArrayGet,
    /// Write of an array element.
    ArraySet {
        /// Element type.
        component: DataType,
        /// Required write barrier.
        write_barrier: WriteBarrierKind,
        /// Whether a runtime store check (which may call into the runtime) is needed.
        needs_type_check: bool,
    },
    /// Length of an array.
    ArrayLength,
    /// Method call.
    Invoke {
        /// Method index.
        method: u32,
    },
    /// Monitor enter or exit.
    MonitorOperation(MonitorKind),
    /// Thread suspension point.
    SuspendCheck,
    /// SSA merge.
    Phi,
    /// Unconditional jump to the single successor.
    Goto,
    /// Conditional jump: successor 0 when true, successor 1 when false.
    If,
    /// Return a value.
    Return,
    /// Return without a value.
    ReturnVoid,
    /// Throw the input exception.
    Throw,
    /// Transfer to the interpreter when the input condition holds.
    Deoptimize,
    /// Vector load.
    VecLoad(VectorShape),
    /// Vector store.
    VecStore(VectorShape),
    /// Lane-wise addition.
    VecAdd(VectorShape),
    /// Lane-wise subtraction.
    VecSub(VectorShape),
    /// Lane-wise multiplication.
    VecMul(VectorShape),
    /// Fused lane-wise multiply-accumulate.
    VecMultiplyAccumulate {
        /// Add or subtract the product.
        op: AccumulateOp,
        /// Lane layout.
        shape: VectorShape,
    },
    /// Bitwise op with negated right operand (BIC / ORN / EON).
    BitwiseNegatedRight(BinaryOp),
    /// `!a & b` (ANDN).
    AndNot,
    /// `x & (x - 1)` (BLSR).
    ClearLowestSetBit,
    /// `x ^ (x - 1)` (BLSMSK).
    MaskUpToLowestSetBit,
    /// `(a << distance) + b` (SHxADD).
    ShiftAdd {
        /// Shift distance, 1 to 3.
        distance: u8,
    },
    /// Object whose fields were made safe to read under one shared read barrier.
    RefreshedObject(ReadBarrierState),
}

impl InstructionKind {
    /// Returns the variant name, for dumps and diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Returns `true` for instructions that end a block.
    #[must_use]
    pub const fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Self::Goto | Self::If | Self::Return | Self::ReturnVoid | Self::Throw
        )
    }

    /// Returns the constant value if this is a constant.
    #[must_use]
    pub const fn as_constant(&self) -> Option<ConstValue> {
        match self {
            Self::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the binary operation if this is a `Binary` instruction.
    #[must_use]
    pub const fn as_binary(&self) -> Option<BinaryOp> {
        match self {
            Self::Binary(op) => Some(*op),
            _ => None,
        }
    }

    /// Returns the accessed field for field gets and sets.
    #[must_use]
    pub const fn field(&self) -> Option<&FieldInfo> {
        match self {
            Self::InstanceFieldGet { field, .. }
            | Self::InstanceFieldSet { field, .. }
            | Self::StaticFieldGet { field }
            | Self::StaticFieldSet { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns the write barrier requirement of a store.
    #[must_use]
    pub const fn write_barrier(&self) -> Option<WriteBarrierKind> {
        match self {
            Self::InstanceFieldSet { write_barrier, .. }
            | Self::StaticFieldSet { write_barrier, .. }
            | Self::ArraySet { write_barrier, .. } => Some(*write_barrier),
            _ => None,
        }
    }

    /// Returns the side effects an instruction of this kind has by default.
    #[must_use]
    pub fn default_side_effects(&self) -> SideEffects {
        match self {
            Self::InstanceFieldGet { field, .. } | Self::StaticFieldGet { field } => {
                if field.is_volatile {
                    SideEffects::FIELD_READ | SideEffects::all_writes()
                } else {
                    SideEffects::FIELD_READ
                }
            }
            Self::InstanceFieldSet { field, .. } | Self::StaticFieldSet { field, .. } => {
                if field.is_volatile {
                    SideEffects::FIELD_WRITE | SideEffects::all_reads()
                } else {
                    SideEffects::FIELD_WRITE
                }
            }
            Self::ArrayGet | Self::VecLoad(_) => SideEffects::ARRAY_READ,
            Self::VecStore(_) => SideEffects::ARRAY_WRITE,
            Self::ArraySet {
                needs_type_check, ..
            } => {
                if *needs_type_check {
                    SideEffects::ARRAY_WRITE | SideEffects::CAN_TRIGGER_GC | SideEffects::CAN_THROW
                } else {
                    SideEffects::ARRAY_WRITE
                }
            }
            Self::NewInstance { .. } | Self::NewArray { .. } | Self::LoadClass { .. } => {
                SideEffects::CAN_TRIGGER_GC | SideEffects::CAN_THROW
            }
            Self::Invoke { .. } | Self::MonitorOperation(_) => SideEffects::all(),
            Self::SuspendCheck => SideEffects::CAN_TRIGGER_GC,
            Self::DivZeroCheck | Self::NullCheck | Self::Throw | Self::Deoptimize => {
                SideEffects::CAN_THROW
            }
            Self::RefreshedObject(_) => SideEffects::DEPENDS_ON_GC,
            _ => SideEffects::empty(),
        }
    }
}
