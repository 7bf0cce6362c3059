//! Operand reuse hints.

use crate::Target;
use gpusched_ir::{Instruction, ReuseMask};

/// Source slots that can be held in the reuse cache.
const NUM_REUSE_SLOTS: usize = 4;

/// Returns the source slots of `inst` whose register `next` reads again in the same slot.
///
/// Only single 32-bit general registers qualify, and never one that `inst` overwrites.
pub(crate) fn reuse_mask(target: &dyn Target, inst: &Instruction, next: &Instruction) -> ReuseMask {
    let mut mask = ReuseMask::empty();
    if !target.supports_reuse(inst) || inst.dtype.size() != 4 {
        return mask;
    }
    for (slot, src) in inst.srcs.iter().enumerate().take(NUM_REUSE_SLOTS) {
        if !src.is_gpr() || src.width != 1 || src.is_hardwired() || inst.writes(src) {
            continue;
        }
        if next.srcs.get(slot).is_some_and(|other| other.is_gpr() && other.index == src.index) {
            mask |= ReuseMask::slot(slot);
        }
    }
    mask
}
