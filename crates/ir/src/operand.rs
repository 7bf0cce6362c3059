//! Instruction operands.

use std::{fmt, ops::Range};

/// The hard-wired zero general register.
pub const RZ: u32 = 255;

/// The always-true predicate register.
pub const PT: u32 = 7;

/// Number of general registers.
pub const NUM_GPRS: u32 = 256;

/// Number of predicate registers.
pub const NUM_PREDICATES: u32 = 8;

/// The storage class of an [`Operand`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegFile {
    /// A 32-bit general purpose register.
    Gpr,
    /// A 1-bit predicate register.
    Predicate,
    /// The condition flag register.
    Flags,
    /// An immediate value, stored in the operand index.
    Immediate,
    /// Anything whose timing is not tracked: memory, constant buffers, system values.
    Untracked,
}

impl RegFile {
    /// Returns `true` if operands in this file participate in hazard tracking.
    #[inline]
    #[must_use]
    pub const fn is_tracked(self) -> bool {
        matches!(self, Self::Gpr | Self::Predicate | Self::Flags)
    }
}

/// An instruction operand.
///
/// Register operands name physical registers; `width` is the number of consecutive registers the
/// operand spans, e.g. 2 for a 64-bit value held in a general register pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operand {
    /// The storage class.
    pub file: RegFile,
    /// The first register, or the immediate value.
    pub index: u32,
    /// The number of registers spanned.
    pub width: u8,
}

impl Operand {
    /// A single general register.
    #[inline]
    #[must_use]
    pub const fn gpr(index: u32) -> Self {
        Self::gpr_wide(index, 1)
    }

    /// `width` consecutive general registers starting at `index`.
    #[inline]
    #[must_use]
    pub const fn gpr_wide(index: u32, width: u8) -> Self {
        assert!(width > 0, "register operand must span at least one register");
        Self { file: RegFile::Gpr, index, width }
    }

    /// The zero register `RZ`.
    #[inline]
    #[must_use]
    pub const fn rz() -> Self {
        Self::gpr(RZ)
    }

    /// A predicate register.
    #[inline]
    #[must_use]
    pub const fn pred(index: u32) -> Self {
        Self { file: RegFile::Predicate, index, width: 1 }
    }

    /// The always-true predicate `PT`.
    #[inline]
    #[must_use]
    pub const fn pt() -> Self {
        Self::pred(PT)
    }

    /// The condition flag register.
    #[inline]
    #[must_use]
    pub const fn flags() -> Self {
        Self { file: RegFile::Flags, index: 0, width: 1 }
    }

    /// An immediate value.
    #[inline]
    #[must_use]
    pub const fn imm(value: u32) -> Self {
        Self { file: RegFile::Immediate, index: value, width: 0 }
    }

    /// An untracked operand, such as a memory address or a constant buffer slot.
    #[inline]
    #[must_use]
    pub const fn untracked(index: u32) -> Self {
        Self { file: RegFile::Untracked, index, width: 0 }
    }

    /// Returns `true` if this operand participates in hazard tracking.
    #[inline]
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.file.is_tracked()
    }

    /// Returns `true` if this is a general register operand.
    #[inline]
    #[must_use]
    pub const fn is_gpr(&self) -> bool {
        matches!(self.file, RegFile::Gpr)
    }

    /// Returns `true` if this is `RZ` or `PT`.
    #[inline]
    #[must_use]
    pub const fn is_hardwired(&self) -> bool {
        match self.file {
            RegFile::Gpr => self.index == RZ,
            RegFile::Predicate => self.index == PT,
            _ => false,
        }
    }

    /// The registers spanned by this operand. Empty for untracked operands.
    #[inline]
    #[must_use]
    pub fn regs(&self) -> Range<u32> {
        if self.is_tracked() { self.index..self.index + u32::from(self.width) } else { 0..0 }
    }

    /// Returns `true` if both operands are tracked, live in the same file, and share a register.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if !self.is_tracked() || self.file != other.file {
            return false;
        }
        let (a, b) = (self.regs(), other.regs());
        a.start < b.end && b.start < a.end
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file {
            RegFile::Gpr if self.index == RZ => f.write_str("rz"),
            RegFile::Gpr if self.width == 1 => write!(f, "r{}", self.index),
            RegFile::Gpr => write!(f, "r[{}:{}]", self.index, self.index + u32::from(self.width) - 1),
            RegFile::Predicate if self.index == PT => f.write_str("pt"),
            RegFile::Predicate => write!(f, "p{}", self.index),
            RegFile::Flags => f.write_str("cc"),
            RegFile::Immediate => write!(f, "{:#x}", self.index),
            RegFile::Untracked => write!(f, "u{}", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlaps() {
        let wide = Operand::gpr_wide(4, 2);
        assert!(wide.overlaps(&Operand::gpr(5)));
        assert!(!wide.overlaps(&Operand::gpr(6)));
        assert!(!wide.overlaps(&Operand::pred(4)));
        assert!(Operand::pred(2).overlaps(&Operand::pred(2)));
        assert!(Operand::flags().overlaps(&Operand::flags()));
        assert!(!Operand::imm(4).overlaps(&Operand::imm(4)));
        assert!(!Operand::untracked(1).overlaps(&Operand::untracked(1)));
    }

    #[test]
    fn test_hardwired() {
        assert!(Operand::rz().is_hardwired());
        assert!(Operand::pt().is_hardwired());
        assert!(!Operand::gpr(7).is_hardwired());
        assert!(!Operand::pred(0).is_hardwired());
        assert_eq!(Operand::imm(3).regs(), 0..0);
    }

    #[test]
    fn test_display() {
        let ops = [
            Operand::gpr(3),
            Operand::gpr_wide(4, 2),
            Operand::rz(),
            Operand::pred(1),
            Operand::pt(),
            Operand::flags(),
            Operand::imm(16),
            Operand::untracked(2),
        ];
        let s = ops.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        assert_eq!(s, "r3 r[4:5] rz p1 pt cc 0x10 u2");
    }
}
