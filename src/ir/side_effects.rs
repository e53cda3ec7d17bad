//! Side-effect descriptors attached to every instruction.

use bitflags::bitflags;

bitflags! {
    /// What an instruction may do besides producing its value.
    ///
    /// Reads and writes are tracked per memory kind so that alias-sensitive
    /// passes can tell field traffic from array traffic.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SideEffects: u16 {
        /// May read an instance or static field.
        const FIELD_READ = 1 << 0;
        /// May write an instance or static field.
        const FIELD_WRITE = 1 << 1;
        /// May read an array element.
        const ARRAY_READ = 1 << 2;
        /// May write an array element.
        const ARRAY_WRITE = 1 << 3;
        /// May enter the runtime and let the garbage collector run.
        const CAN_TRIGGER_GC = 1 << 4;
        /// Result depends on the garbage collector not having run.
        const DEPENDS_ON_GC = 1 << 5;
        /// May throw an exception.
        const CAN_THROW = 1 << 6;
    }
}

impl SideEffects {
    /// Every heap write.
    #[must_use]
    pub const fn all_writes() -> Self {
        Self::FIELD_WRITE.union(Self::ARRAY_WRITE)
    }

    /// Every heap read.
    #[must_use]
    pub const fn all_reads() -> Self {
        Self::FIELD_READ.union(Self::ARRAY_READ)
    }

    /// Returns `true` if any heap write is possible.
    #[must_use]
    pub const fn does_any_write(self) -> bool {
        self.intersects(Self::all_writes())
    }

    /// Returns `true` if any heap read is possible.
    #[must_use]
    pub const fn does_any_read(self) -> bool {
        self.intersects(Self::all_reads())
    }

    /// Returns `true` if the garbage collector may run.
    #[must_use]
    pub const fn can_trigger_gc(self) -> bool {
        self.contains(Self::CAN_TRIGGER_GC)
    }

    /// Returns `true` if an instruction with these effects may observe `other`'s writes.
    #[must_use]
    pub const fn may_depend_on(self, other: Self) -> bool {
        (self.contains(Self::FIELD_READ) && other.contains(Self::FIELD_WRITE))
            || (self.contains(Self::ARRAY_READ) && other.contains(Self::ARRAY_WRITE))
            || (self.contains(Self::DEPENDS_ON_GC) && other.contains(Self::CAN_TRIGGER_GC))
    }
}
