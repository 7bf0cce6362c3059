//! Machine instructions.

use crate::{DataType, Op, OpClass, Operand, RegFile, Schedule};
use smallvec::SmallVec;
use std::fmt;

bitflags::bitflags! {
    /// [`Instruction`] flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct InstFlags: u8 {
        /// The instruction is a reconvergence point for divergent threads.
        const JOIN = 1 << 0;
    }
}

/// A register-allocated machine instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode.
    pub op: Op,
    /// The data type the instruction operates on.
    pub dtype: DataType,
    /// Destination operands, in encoding order.
    pub defs: SmallVec<[Operand; 2]>,
    /// Source operands, in encoding order.
    pub srcs: SmallVec<[Operand; 4]>,
    /// Flags.
    pub flags: InstFlags,
    /// Scheduling control information.
    pub sched: Schedule,
    /// Position in the function, assigned by the builder.
    pub serial: u32,
}

impl Instruction {
    /// Creates a new instruction without operands.
    #[must_use]
    pub fn new(op: Op, dtype: DataType) -> Self {
        Self {
            op,
            dtype,
            defs: SmallVec::new(),
            srcs: SmallVec::new(),
            flags: InstFlags::empty(),
            sched: Schedule::default(),
            serial: 0,
        }
    }

    /// Sets the destination operands.
    #[must_use]
    pub fn with_defs(mut self, defs: impl IntoIterator<Item = Operand>) -> Self {
        self.defs = defs.into_iter().collect();
        self
    }

    /// Sets the source operands.
    #[must_use]
    pub fn with_srcs(mut self, srcs: impl IntoIterator<Item = Operand>) -> Self {
        self.srcs = srcs.into_iter().collect();
        self
    }

    /// Adds `flags`.
    #[must_use]
    pub fn with_flags(mut self, flags: InstFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns the functional class of the opcode.
    #[inline]
    #[must_use]
    pub const fn class(&self) -> OpClass {
        self.op.class()
    }

    /// Returns `true` if this is a reconvergence point.
    #[inline]
    #[must_use]
    pub const fn is_join(&self) -> bool {
        self.flags.contains(InstFlags::JOIN)
    }

    /// Returns `true` if any destination shares a register with `operand`.
    #[must_use]
    pub fn writes(&self, operand: &Operand) -> bool {
        self.defs.iter().any(|def| def.overlaps(operand))
    }

    /// Returns `true` if any source shares a register with `operand`.
    #[must_use]
    pub fn reads(&self, operand: &Operand) -> bool {
        self.srcs.iter().any(|src| src.overlaps(operand))
    }

    /// Returns `true` if any destination is a general, predicate or flag register.
    #[must_use]
    pub fn has_tracked_def(&self) -> bool {
        self.defs.iter().any(Operand::is_tracked)
    }

    /// Returns `true` if the first destination or source is a predicate.
    ///
    /// Conversions to and from predicates run on the fixed-latency pipeline.
    #[must_use]
    pub fn converts_predicate(&self) -> bool {
        let is_pred = |op: Option<&Operand>| op.is_some_and(|op| op.file == RegFile::Predicate);
        is_pred(self.defs.first()) || is_pred(self.srcs.first())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.op.mnemonic(), self.dtype)?;
        for (i, operand) in self.defs.iter().chain(&self.srcs).enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{operand}")?;
        }
        if self.is_join() {
            f.write_str(" (join)")?;
        }
        Ok(())
    }
}
