//! Compilation target description.
//!
//! A [`TargetConfig`] is built once per compilation target and handed to
//! every pass through the pass context. Passes query it instead of global
//! state, so tests can compile the same graph for several targets side by
//! side.

use bitflags::bitflags;
use strum::{Display, EnumIter, EnumString};

use crate::ir::ReadBarrierState;

/// Instruction set architectures the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum InstructionSet {
    /// 32-bit ARM.
    Arm,
    /// 32-bit ARM, Thumb-2 encoding.
    Thumb2,
    /// AArch64.
    Arm64,
    /// 32-bit x86.
    X86,
    /// x86-64.
    #[strum(serialize = "x86_64")]
    X86_64,
    /// RISC-V 64.
    Riscv64,
    /// Interpreter-only, no native code.
    None,
}

impl InstructionSet {
    /// Returns `true` for the ARM family.
    #[must_use]
    pub const fn is_arm_family(self) -> bool {
        matches!(self, Self::Arm | Self::Thumb2 | Self::Arm64)
    }

    /// Returns `true` for the x86 family.
    #[must_use]
    pub const fn is_x86_family(self) -> bool {
        matches!(self, Self::X86 | Self::X86_64)
    }
}

bitflags! {
    /// Optional ISA extensions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IsaFeatures: u32 {
        /// x86 AVX2.
        const AVX2 = 1 << 0;
        /// x86 BMI1 bit manipulation.
        const BMI = 1 << 1;
        /// AArch64 scalable vectors.
        const SVE = 1 << 2;
        /// RISC-V address generation (SHxADD).
        const ZBA = 1 << 3;
        /// RISC-V basic bit manipulation (ANDN / ORN / XNOR).
        const ZBB = 1 << 4;
    }
}

/// Garbage collector families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CollectorKind {
    /// Concurrent copying collector.
    ConcurrentCopying,
    /// Concurrent mark-compact collector.
    ConcurrentMarkCompact,
    /// Stop-the-world mark-sweep.
    MarkSweep,
}

/// The collector and barrier scheme compiled code must cooperate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// The collector in use.
    pub collector: CollectorKind,
    /// Whether reference reads use Baker-style fast-path read barriers.
    pub use_baker_read_barrier: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            collector: CollectorKind::ConcurrentCopying,
            use_baker_read_barrier: true,
        }
    }
}

/// Everything passes need to know about the code they generate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    /// Target instruction set.
    pub isa: InstructionSet,
    /// Enabled ISA extensions.
    pub features: IsaFeatures,
    /// Collector configuration.
    pub gc: GcConfig,
}

impl TargetConfig {
    /// Creates a target with no optional features and the default collector.
    #[must_use]
    pub fn new(isa: InstructionSet) -> Self {
        Self {
            isa,
            features: IsaFeatures::empty(),
            gc: GcConfig::default(),
        }
    }

    /// AArch64 target.
    #[must_use]
    pub fn arm64() -> Self {
        Self::new(InstructionSet::Arm64)
    }

    /// Thumb-2 target.
    #[must_use]
    pub fn thumb2() -> Self {
        Self::new(InstructionSet::Thumb2)
    }

    /// x86 target with the given extensions.
    #[must_use]
    pub fn x86(features: IsaFeatures) -> Self {
        Self::new(InstructionSet::X86).with_features(features)
    }

    /// x86-64 target with the given extensions.
    #[must_use]
    pub fn x86_64(features: IsaFeatures) -> Self {
        Self::new(InstructionSet::X86_64).with_features(features)
    }

    /// RISC-V 64 target with the given extensions.
    #[must_use]
    pub fn riscv64(features: IsaFeatures) -> Self {
        Self::new(InstructionSet::Riscv64).with_features(features)
    }

    /// Replaces the ISA extensions.
    #[must_use]
    pub fn with_features(mut self, features: IsaFeatures) -> Self {
        self.features = features;
        self
    }

    /// Replaces the collector configuration.
    #[must_use]
    pub fn with_gc(mut self, gc: GcConfig) -> Self {
        self.gc = gc;
        self
    }

    /// Returns `true` if every flag in `feature` is enabled.
    #[must_use]
    pub fn has_feature(&self, feature: IsaFeatures) -> bool {
        self.features.contains(feature)
    }

    /// Returns `true` if adjacent reference reads may share one read barrier.
    ///
    /// Requires the concurrent copying collector with Baker read barriers and
    /// code generation support for the refreshed-object pseudo-op.
    #[must_use]
    pub fn supports_read_barrier_merge(&self) -> bool {
        self.gc.collector == CollectorKind::ConcurrentCopying
            && self.gc.use_baker_read_barrier
            && (self.isa.is_arm_family() || self.isa.is_x86_family())
    }

    /// Returns how the refreshed-object pseudo-op exposes the barrier state.
    #[must_use]
    pub fn read_barrier_state(&self) -> ReadBarrierState {
        if self.isa.is_x86_family() {
            ReadBarrierState::Implicit
        } else {
            ReadBarrierState::Explicit
        }
    }
}
