//! Hazard verification of scheduled functions.
//!
//! The checks replay the issue cycle of every instruction from the committed stall counts and
//! make sure every dependency is covered, either by elapsed cycles for fixed-latency producers or
//! by a barrier wait for variable-latency ones. Fixed-latency results are followed along every
//! control flow edge, loops included; barrier dependencies are only checked within a block, and
//! every block with incoming edges must wait on all barriers on entry.

use crate::{PREDICATE_LATENCY, Target, barriers::war_sources, find_first_use};
use gpusched_data_structures::{index::IndexVec, map::FxHashMap};
use gpusched_ir::{
    BarrierMask, BasicBlock, BlockId, Function, Instruction, Operand, RegFile, Schedule,
};

/// A hazard found in a scheduled function.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HazardError {
    #[error("{block}[{index}]: stall count {stall} exceeds the maximum of {max}", max = Schedule::MAX_STALL)]
    StallOutOfRange { block: BlockId, index: usize, stall: u8 },
    #[error("{block}[{index}]: zero stall, but the next instruction cannot be dual-issued with it")]
    IllegalDualIssue { block: BlockId, index: usize },
    #[error(
        "{block}[{index}]: {reg} read at cycle {issue}, but {block}[{writer}] only writes it at cycle {ready}"
    )]
    ReadTooEarly { block: BlockId, index: usize, writer: usize, reg: Operand, issue: i32, ready: i32 },
    #[error(
        "{block}[{index}]: {reg} read at cycle {issue}, but a write in a predecessor only completes at cycle {ready}"
    )]
    ReadTooEarlyOnEntry { block: BlockId, index: usize, reg: Operand, issue: i32, ready: i32 },
    #[error("{block}[{index}]: variable-latency write of {reg} signals no barrier")]
    MissingWriteBarrier { block: BlockId, index: usize, reg: Operand },
    #[error("{block}[{user}]: {reg} used without waiting for the write by {block}[{writer}]")]
    UnprotectedUse { block: BlockId, writer: usize, user: usize, reg: Operand },
    #[error("{block}[{redefiner}]: {reg} overwritten before {block}[{reader}] has read it")]
    UnprotectedRedefinition { block: BlockId, reader: usize, redefiner: usize, reg: Operand },
    #[error("{block}: entry does not wait on every barrier")]
    MissingEntryWait { block: BlockId },
}

/// Checks every block of a scheduled `func` for hazards, returning the first one found.
pub fn verify_function(func: &Function, target: &dyn Target) -> Result<(), HazardError> {
    let blocks = func
        .blocks
        .iter_enumerated()
        .map(|(id, block)| BlockVerifier::new(target, id, block))
        .collect::<Vec<_>>();
    let blocks = IndexVec::<BlockId, _>::from_vec(blocks);
    let entries = entry_ready(&blocks);
    for (block, entry) in blocks.iter().zip(entries.iter()) {
        block.verify(entry)?;
    }
    Ok(())
}

/// Cycle, relative to the start of a block, at which each register written by a fixed-latency
/// instruction in an earlier block becomes readable. Registers that are already readable are
/// absent.
type ReadyMap = FxHashMap<(RegFile, u32), i32>;

/// Propagates pending fixed-latency results along every edge until nothing changes.
///
/// Each block shifts the ready cycles down by its length and entries drop out once they reach
/// zero, so loops converge.
fn entry_ready(blocks: &IndexVec<BlockId, BlockVerifier<'_>>) -> IndexVec<BlockId, ReadyMap> {
    let mut entries = IndexVec::from_vec(vec![ReadyMap::default(); blocks.len()]);
    let mut changed = true;
    while changed {
        changed = false;
        for (id, block) in blocks.iter_enumerated() {
            let exit = block.exit_ready(&entries[id]);
            for edge in &block.block.succs {
                let entry = &mut entries[edge.block];
                for (&key, &ready) in &exit {
                    let slot = entry.entry(key).or_insert(0);
                    if ready > *slot {
                        *slot = ready;
                        changed = true;
                    }
                }
            }
        }
    }
    entries
}

struct BlockVerifier<'a> {
    target: &'a dyn Target,
    id: BlockId,
    block: &'a BasicBlock,
    /// Issue cycle of every instruction, relative to the first.
    issue: Vec<i32>,
    /// Cycle at which control leaves the block.
    end: i32,
}

impl<'a> BlockVerifier<'a> {
    fn new(target: &'a dyn Target, id: BlockId, block: &'a BasicBlock) -> Self {
        let issue = block
            .insts
            .iter()
            .scan(0, |cycle, inst| {
                let issue = *cycle;
                *cycle += i32::from(inst.sched.stall);
                Some(issue)
            })
            .collect();
        let end = block.insts.iter().map(|inst| i32::from(inst.sched.stall)).sum();
        Self { target, id, block, issue, end }
    }

    /// Returns the pending fixed-latency results when control leaves the block, given those
    /// pending on entry.
    fn exit_ready(&self, entry: &ReadyMap) -> ReadyMap {
        let mut ready = entry.clone();
        for (i, inst) in self.insts().iter().enumerate() {
            for def in &inst.defs {
                for reg in def.regs() {
                    match self.ready(i, def) {
                        Some(cycle) => ready.insert((def.file, reg), cycle),
                        // Covered by the barrier wait on entry to every successor.
                        None => ready.remove(&(def.file, reg)),
                    };
                }
            }
        }
        ready.retain(|_, cycle| {
            *cycle -= self.end;
            *cycle > 0
        });
        ready
    }

    fn insts(&self) -> &'a [Instruction] {
        &self.block.insts
    }

    fn verify(&self, entry: &ReadyMap) -> Result<(), HazardError> {
        if let Some(first) = self.block.first()
            && !self.block.preds.is_empty()
            && first.sched.wait != BarrierMask::all()
        {
            return Err(HazardError::MissingEntryWait { block: self.id });
        }
        self.check_stalls()?;
        self.check_fixed_latency(entry)?;
        for (i, inst) in self.insts().iter().enumerate() {
            if self.target.is_variable_latency(inst) {
                self.check_write_barrier(i)?;
                self.check_read_barrier(i)?;
            }
        }
        Ok(())
    }

    fn check_stalls(&self) -> Result<(), HazardError> {
        let insts = self.insts();
        for (i, inst) in insts.iter().enumerate() {
            let stall = inst.sched.stall;
            if stall > Schedule::MAX_STALL {
                return Err(HazardError::StallOutOfRange { block: self.id, index: i, stall });
            }
            let pairs = insts.get(i + 1).is_some_and(|next| self.target.can_dual_issue(inst, next));
            if stall == 0 && !pairs {
                return Err(HazardError::IllegalDualIssue { block: self.id, index: i });
            }
        }
        Ok(())
    }

    /// Reads of results of fixed-latency instructions must issue after the latency has elapsed,
    /// whether the write happened in this block or in one before it.
    fn check_fixed_latency(&self, entry: &ReadyMap) -> Result<(), HazardError> {
        let mut last_write = FxHashMap::<(RegFile, u32), usize>::default();
        for (i, inst) in self.insts().iter().enumerate() {
            for src in &inst.srcs {
                for reg in src.regs() {
                    let Some(&writer) = last_write.get(&(src.file, reg)) else {
                        if let Some(&ready) = entry.get(&(src.file, reg))
                            && self.issue[i] < ready
                        {
                            return Err(HazardError::ReadTooEarlyOnEntry {
                                block: self.id,
                                index: i,
                                reg: *src,
                                issue: self.issue[i],
                                ready,
                            });
                        }
                        continue;
                    };
                    if let Some(ready) = self.ready(writer, src)
                        && self.issue[i] < ready
                    {
                        return Err(HazardError::ReadTooEarly {
                            block: self.id,
                            index: i,
                            writer,
                            reg: *src,
                            issue: self.issue[i],
                            ready,
                        });
                    }
                }
            }
            for def in &inst.defs {
                for reg in def.regs() {
                    last_write.insert((def.file, reg), i);
                }
            }
        }
        Ok(())
    }

    /// The cycle at which `operand` written by instruction `writer` can be read, or `None` if the
    /// write completes at a variable latency.
    fn ready(&self, writer: usize, operand: &Operand) -> Option<i32> {
        let inst = &self.insts()[writer];
        if self.target.is_variable_latency(inst) {
            return None;
        }
        let latency = if operand.file == RegFile::Predicate {
            PREDICATE_LATENCY
        } else {
            self.target.latency(inst) as i32
        };
        Some(self.issue[writer] + latency)
    }

    /// Returns `true` if an instruction in `(after, until]` waits on any barrier of `mask`.
    fn waits_between(&self, after: usize, until: usize, mask: BarrierMask) -> bool {
        self.insts()[after + 1..=until].iter().any(|inst| inst.sched.wait.intersects(mask))
    }

    /// The results of variable-latency instruction `i` must be waited for before their first use.
    fn check_write_barrier(&self, i: usize) -> Result<(), HazardError> {
        let insts = self.insts();
        let inst = &insts[i];
        let Some(reg) = inst.defs.iter().find(|def| def.is_tracked()) else { return Ok(()) };
        let Some(bar) = inst.sched.wr_bar else {
            return Err(HazardError::MissingWriteBarrier { block: self.id, index: i, reg: *reg });
        };
        let Some(user) = find_first_use(insts, i) else { return Ok(()) };
        if self.waits_between(i, user, bar.mask()) {
            return Ok(());
        }
        let used = &insts[user];
        let reg = inst
            .defs
            .iter()
            .find(|def| used.reads(def) || used.writes(def))
            .unwrap_or(reg);
        Err(HazardError::UnprotectedUse { block: self.id, writer: i, user, reg: *reg })
    }

    /// The general register sources of variable-latency instruction `i` must not be overwritten
    /// before it has read them.
    fn check_read_barrier(&self, i: usize) -> Result<(), HazardError> {
        let insts = self.insts();
        let inst = &insts[i];
        let regs = war_sources(inst);
        if regs.is_empty() {
            return Ok(());
        }
        let redefines = |later: &'a Instruction| {
            later.defs.iter().find(|def| def.is_gpr() && def.regs().any(|r| regs.test(r as usize)))
        };
        let Some((redefiner, reg)) = insts[i + 1..]
            .iter()
            .enumerate()
            .find_map(|(pos, later)| redefines(later).map(|reg| (i + 1 + pos, *reg)))
        else {
            return Ok(());
        };
        if self.waits_between(i, redefiner, inst.sched.signals()) {
            return Ok(());
        }
        Err(HazardError::UnprotectedRedefinition { block: self.id, reader: i, redefiner, reg })
    }
}
