//! Latency models.

use gpusched_ir::{DataType, Instruction, Op, OpClass};

/// The timing model of a target.
///
/// The scheduler only ever asks these questions about instructions; everything it knows about the
/// hardware comes through this trait.
pub trait Target {
    /// Cycles from issue until the results can be read by the next instruction.
    ///
    /// Must not exceed the maximum stall count, 15. For variable-latency instructions this is a
    /// lower bound; correctness comes from dependency barriers.
    fn latency(&self, inst: &Instruction) -> u32;

    /// Cycles from issue until the sources have been read, after which they may be overwritten.
    fn read_latency(&self, inst: &Instruction) -> u32;

    /// Returns `true` if the instruction completes at a latency not known statically, and must
    /// therefore signal dependency barriers.
    fn is_variable_latency(&self, inst: &Instruction) -> bool;

    /// Returns `true` if the instruction may keep its sources in the operand reuse cache.
    fn supports_reuse(&self, inst: &Instruction) -> bool;

    /// Returns `true` if `b` may issue in the same cycle as `a`.
    fn can_dual_issue(&self, a: &Instruction, b: &Instruction) -> bool;
}

impl<T: Target + ?Sized> Target for &T {
    fn latency(&self, inst: &Instruction) -> u32 {
        (**self).latency(inst)
    }

    fn read_latency(&self, inst: &Instruction) -> u32 {
        (**self).read_latency(inst)
    }

    fn is_variable_latency(&self, inst: &Instruction) -> bool {
        (**self).is_variable_latency(inst)
    }

    fn supports_reuse(&self, inst: &Instruction) -> bool {
        (**self).supports_reuse(inst)
    }

    fn can_dual_issue(&self, a: &Instruction, b: &Instruction) -> bool {
        (**self).can_dual_issue(a, b)
    }
}

/// The Maxwell family (SM 5.x) timing model.
#[derive(Clone, Copy, Debug, Default)]
pub struct Maxwell;

impl Target for Maxwell {
    fn latency(&self, inst: &Instruction) -> u32 {
        match inst.op {
            Op::St | Op::Sust | Op::Emit | Op::Pixld => 1,
            Op::Shfl => 2,
            Op::Mov
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Mad
            | Op::Fma
            | Op::Min
            | Op::Max
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Not
            | Op::Shl
            | Op::Shr
            | Op::Set
            | Op::Selp
            | Op::Extbf
            | Op::Insbf
            | Op::Quadop
            | Op::Vote
                if inst.dtype != DataType::F64 =>
            {
                6
            }
            Op::Cvt if inst.converts_predicate() => 6,
            Op::Rcp
            | Op::Rsq
            | Op::Sin
            | Op::Cos
            | Op::Ex2
            | Op::Lg2
            | Op::Bfind
            | Op::Popcnt
            | Op::Quadon
            | Op::Quadpop => 13,
            _ => {
                if cfg!(debug_assertions) && !self.is_variable_latency(inst) {
                    debug!(op = inst.op.mnemonic(), dtype = %inst.dtype, "no latency model, assuming 15");
                }
                15
            }
        }
    }

    fn read_latency(&self, inst: &Instruction) -> u32 {
        match inst.op {
            Op::Abs
            | Op::Neg
            | Op::Rcp
            | Op::Rsq
            | Op::Sin
            | Op::Cos
            | Op::Ex2
            | Op::Lg2
            | Op::Bfind
            | Op::Popcnt
            | Op::Ld
            | Op::St
            | Op::Atom
            | Op::Suld
            | Op::Sust => 4,
            Op::Cvt if !inst.converts_predicate() => 4,
            _ => 0,
        }
    }

    fn is_variable_latency(&self, inst: &Instruction) -> bool {
        match inst.class() {
            OpClass::Load
            | OpClass::Store
            | OpClass::Atomic
            | OpClass::Texture
            | OpClass::Surface
            | OpClass::Sfu => true,
            OpClass::Bitfield => matches!(inst.op, Op::Bfind | Op::Popcnt),
            OpClass::Control => matches!(inst.op, Op::Emit),
            OpClass::Other => matches!(inst.op, Op::Shfl | Op::Rdsv | Op::Pixld | Op::Afetch),
            OpClass::Arith => matches!(inst.op, Op::Mul | Op::Mad) && !inst.dtype.is_float(),
            OpClass::Convert => !inst.converts_predicate(),
            OpClass::Move
            | OpClass::Logic
            | OpClass::Shift
            | OpClass::Compare
            | OpClass::Flow
            | OpClass::Barrier => false,
        }
    }

    fn supports_reuse(&self, inst: &Instruction) -> bool {
        match inst.class() {
            OpClass::Arith | OpClass::Compare | OpClass::Logic | OpClass::Move | OpClass::Shift => {
                true
            }
            OpClass::Bitfield => matches!(inst.op, Op::Extbf | Op::Insbf),
            _ => false,
        }
    }

    fn can_dual_issue(&self, _a: &Instruction, _b: &Instruction) -> bool {
        false
    }
}
