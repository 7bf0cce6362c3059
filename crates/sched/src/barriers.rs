//! Dependency barrier allocation.
//!
//! Variable-latency instructions cannot be protected by stall counts alone. Such an instruction
//! signals a *write barrier* when its results land (protecting later reads and writes of them) and
//! a *read barrier* once its sources have been read (protecting later overwrites of them). The
//! first later instruction that depends on the signal waits on the barrier.
//!
//! Waiting on a barrier waits for every outstanding producer that signals it, which is what makes
//! sharing an id between two producers safe.

use crate::{SchedStats, Target};
use gpusched_data_structures::BitSet;
use gpusched_ir::{BarrierId, BarrierMask, Instruction, NUM_BARRIERS, Operand, Schedule};
use smallvec::SmallVec;

/// The id reused when every barrier is live.
const FALLBACK_BARRIER: BarrierId = BarrierId::new(NUM_BARRIERS - 1);

/// A barrier that must be waited on when execution reaches `trigger`.
#[derive(Clone, Copy, Debug)]
struct Obligation {
    bar: BarrierId,
    trigger: usize,
}

/// Allocates dependency barriers within a basic block.
#[derive(Debug)]
pub struct BarrierAllocator {
    in_use: BitSet,
    /// Pending write barriers, resolved at the first use of the results.
    live_uses: SmallVec<[Obligation; NUM_BARRIERS]>,
    /// Pending read barriers, resolved at the first redefinition of the sources.
    live_defs: SmallVec<[Obligation; NUM_BARRIERS]>,
}

impl Default for BarrierAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierAllocator {
    /// Creates a new allocator with every barrier free.
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_use: BitSet::new(NUM_BARRIERS),
            live_uses: SmallVec::new(),
            live_defs: SmallVec::new(),
        }
    }

    /// Assigns barriers and waits for the instructions of one block.
    ///
    /// `scheds` is the block's schedule buffer, parallel to `insts`. Only the barrier and wait
    /// fields are written.
    pub fn run(
        &mut self,
        target: &dyn Target,
        insts: &[Instruction],
        scheds: &mut [Schedule],
        stats: &mut SchedStats,
    ) {
        assert_eq!(insts.len(), scheds.len());
        self.reset();

        for (i, inst) in insts.iter().enumerate() {
            self.expire(i, &mut scheds[i].wait);

            let mut usei = None;
            if needs_write_barrier(target, inst) {
                usei = find_first_use(insts, i);
                let bar = self.alloc(stats);
                scheds[i].wr_bar = Some(bar);
                if let Some(trigger) = usei {
                    self.live_uses.push(Obligation { bar, trigger });
                }
            }

            if needs_read_barrier(target, inst) {
                let defi = find_first_def(insts, i);
                // The wait at the first use of the results already proves the sources were read.
                if let (Some(usei), Some(defi)) = (usei, defi)
                    && usei <= defi
                {
                    continue;
                }
                let bar = self.alloc(stats);
                scheds[i].rd_bar = Some(bar);
                if let Some(trigger) = defi {
                    self.live_defs.push(Obligation { bar, trigger });
                }
            }
        }

        remove_dead_waits(scheds);
    }

    fn reset(&mut self) {
        self.in_use.clear_all();
        self.live_uses.clear();
        self.live_defs.clear();
    }

    /// Resolves every obligation triggered at or before instruction `index`.
    fn expire(&mut self, index: usize, wait: &mut BarrierMask) {
        let in_use = &mut self.in_use;
        let mut resolve = |ob: &Obligation| {
            if ob.trigger > index {
                return true;
            }
            *wait |= ob.bar.mask();
            in_use.clear(ob.bar.index());
            false
        };
        self.live_uses.retain(|ob| resolve(&*ob));
        self.live_defs.retain(|ob| resolve(&*ob));
    }

    fn alloc(&mut self, stats: &mut SchedStats) -> BarrierId {
        stats.barriers += 1;
        let bar = match self.in_use.first_clear() {
            Some(id) => BarrierId::new(id),
            None => {
                debug!(bar = FALLBACK_BARRIER.index(), "out of barriers, sharing");
                stats.barrier_fallbacks += 1;
                FALLBACK_BARRIER
            }
        };
        self.in_use.set(bar.index());
        bar
    }
}

/// Returns `true` if `inst` must signal a barrier when its results are written.
pub(crate) fn needs_write_barrier(target: &dyn Target, inst: &Instruction) -> bool {
    target.is_variable_latency(inst) && inst.has_tracked_def()
}

/// Returns `true` if `inst` must signal a barrier once its sources have been read.
///
/// Sources that are also destinations are protected by the write barrier.
pub(crate) fn needs_read_barrier(target: &dyn Target, inst: &Instruction) -> bool {
    target.is_variable_latency(inst) && !war_sources(inst).is_empty()
}

/// The general registers read by `inst` and not written by it, excluding `RZ`.
pub(crate) fn war_sources(inst: &Instruction) -> BitSet {
    let mut regs = BitSet::new(gpusched_ir::NUM_GPRS as usize);
    let gprs = |ops: &[Operand]| {
        ops.iter()
            .filter(|op| op.is_gpr() && !op.is_hardwired())
            .flat_map(|op| op.regs())
            .collect::<SmallVec<[u32; 8]>>()
    };
    for r in gprs(&inst.srcs) {
        regs.set(r as usize);
    }
    for r in gprs(&inst.defs) {
        regs.clear(r as usize);
    }
    regs
}

/// Returns the index of the first instruction after `index` in `insts` that reads or writes a
/// register written by `insts[index]`.
#[must_use]
pub fn find_first_use(insts: &[Instruction], index: usize) -> Option<usize> {
    let inst = &insts[index];
    if inst.defs.is_empty() {
        return None;
    }
    insts[index + 1..]
        .iter()
        .position(|later| {
            later.srcs.iter().chain(&later.defs).any(|operand| inst.writes(operand))
        })
        .map(|pos| index + 1 + pos)
}

/// Returns the index of the first instruction after `index` in `insts` that writes a register
/// read by `insts[index]`.
#[must_use]
pub fn find_first_def(insts: &[Instruction], index: usize) -> Option<usize> {
    let inst = &insts[index];
    insts[index + 1..]
        .iter()
        .position(|later| inst.srcs.iter().any(|src| later.writes(src)))
        .map(|pos| index + 1 + pos)
}

/// Removes waits on barriers that have not been signalled since the previous wait on them.
fn remove_dead_waits(scheds: &mut [Schedule]) {
    let mut alive = BarrierMask::empty();
    for sched in scheds {
        let dead = sched.wait - alive;
        sched.wait -= dead;
        alive -= sched.wait;
        alive |= sched.signals();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Maxwell;
    use gpusched_ir::{DataType, Op};

    fn ld(dst: u32, addr: u32) -> Instruction {
        Instruction::new(Op::Ld, DataType::U32)
            .with_defs([Operand::gpr(dst)])
            .with_srcs([Operand::gpr(addr)])
    }

    fn add(dst: u32, a: u32, b: u32) -> Instruction {
        Instruction::new(Op::Add, DataType::U32)
            .with_defs([Operand::gpr(dst)])
            .with_srcs([Operand::gpr(a), Operand::gpr(b)])
    }

    fn run(insts: &[Instruction]) -> (Vec<Schedule>, SchedStats) {
        let mut scheds = vec![Schedule::EMPTY; insts.len()];
        let mut stats = SchedStats::default();
        BarrierAllocator::new().run(&Maxwell, insts, &mut scheds, &mut stats);
        (scheds, stats)
    }

    #[test]
    fn test_first_use_def() {
        let insts = [ld(1, 2), add(3, 4, 4), add(5, 1, 1), add(2, 0, 0)];
        assert_eq!(find_first_use(&insts, 0), Some(2));
        assert_eq!(find_first_def(&insts, 0), Some(3));
        assert_eq!(find_first_use(&insts, 3), None);
        assert_eq!(find_first_def(&insts, 1), None);
    }

    #[test]
    fn test_load_use() {
        let (scheds, stats) = run(&[ld(1, 2), add(3, 1, 1)]);
        let b0 = BarrierId::new(0);
        assert_eq!(scheds[0].wr_bar, Some(b0));
        assert_eq!(scheds[0].rd_bar, Some(BarrierId::new(1)));
        assert_eq!(scheds[1].wait, b0.mask());
        assert_eq!(stats.barriers, 2);
    }

    #[test]
    fn test_read_barrier_skipped_when_use_comes_first() {
        let (scheds, stats) = run(&[ld(1, 2), add(3, 1, 1), add(2, 0, 0)]);
        assert_eq!(scheds[0].wr_bar, Some(BarrierId::new(0)));
        assert_eq!(scheds[0].rd_bar, None);
        assert_eq!(scheds[1].wait, BarrierMask::B0);
        assert_eq!(scheds[2].wait, BarrierMask::empty());
        assert_eq!(stats.barriers, 1);
    }

    #[test]
    fn test_war() {
        let (scheds, _) = run(&[ld(1, 2), add(2, 0, 0), add(3, 1, 1)]);
        assert_eq!(scheds[0].wr_bar, Some(BarrierId::new(0)));
        assert_eq!(scheds[0].rd_bar, Some(BarrierId::new(1)));
        assert_eq!(scheds[1].wait, BarrierMask::B1);
        assert_eq!(scheds[2].wait, BarrierMask::B0);
    }

    #[test]
    fn test_no_read_barrier_when_sources_are_results() {
        let rcp = Instruction::new(Op::Rcp, DataType::F32)
            .with_defs([Operand::gpr(0)])
            .with_srcs([Operand::gpr(0)]);
        assert!(needs_write_barrier(&Maxwell, &rcp));
        assert!(!needs_read_barrier(&Maxwell, &rcp));

        let st = Instruction::new(Op::St, DataType::U32)
            .with_srcs([Operand::untracked(4), Operand::rz()]);
        assert!(!needs_write_barrier(&Maxwell, &st));
        assert!(!needs_read_barrier(&Maxwell, &st));
    }

    #[test]
    fn test_fallback() {
        // Seven loads from constant addresses whose results are only used at the end of the block.
        let ld_const = |dst| {
            Instruction::new(Op::Ld, DataType::U32)
                .with_defs([Operand::gpr(dst)])
                .with_srcs([Operand::untracked(0)])
        };
        let mut insts = (0..7).map(|i| ld_const(10 + i)).collect::<Vec<_>>();
        insts.extend((0..7).map(|i| add(30 + i, 10 + i, 10 + i)));
        let (scheds, stats) = run(&insts);

        let wr = scheds[..7].iter().map(|s| s.wr_bar.unwrap().index()).collect::<Vec<_>>();
        assert_eq!(wr, [0, 1, 2, 3, 4, 5, 5]);
        assert_eq!(stats.barrier_fallbacks, 1);
        assert!(scheds.iter().all(|s| s.rd_bar.is_none()));

        // The first wait on the shared id covers both producers; the second is dead.
        let waits = scheds[7..].iter().map(|s| s.wait.bits()).collect::<Vec<_>>();
        assert_eq!(waits, [1 << 0, 1 << 1, 1 << 2, 1 << 3, 1 << 4, 1 << 5, 0]);
    }

    #[test]
    fn test_dead_waits() {
        let mut scheds = vec![Schedule::EMPTY; 3];
        scheds[0].wait = BarrierMask::B2;
        scheds[0].wr_bar = Some(BarrierId::new(2));
        scheds[1].wait = BarrierMask::B2 | BarrierMask::B3;
        scheds[2].wait = BarrierMask::B2;
        remove_dead_waits(&mut scheds);
        assert_eq!(scheds[0].wait, BarrierMask::empty());
        assert_eq!(scheds[1].wait, BarrierMask::B2);
        assert_eq!(scheds[2].wait, BarrierMask::empty());
    }
}
