//! The per-function scheduling driver.

use crate::{
    BarrierAllocator, Scoreboard, Target,
    barriers::{needs_read_barrier, needs_write_barrier},
    reuse::reuse_mask,
    stall::{self, Next},
    verify_function,
};
use gpusched_config::{SchedMode, SchedOpts};
use gpusched_data_structures::{BitSet, index::IndexVec};
use gpusched_ir::{BarrierId, BarrierMask, BlockId, Function, Schedule};

/// Summary of a scheduling run.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, derive_more::Add, derive_more::AddAssign,
)]
pub struct SchedStats {
    /// Basic blocks visited.
    pub blocks: usize,
    /// Instructions scheduled.
    pub instructions: usize,
    /// Barriers allocated, fallback allocations included.
    pub barriers: usize,
    /// Allocations that had to share the fallback barrier because all were live.
    pub barrier_fallbacks: usize,
    /// Instructions issued together with the next one.
    pub dual_issues: usize,
    /// Source operands marked for reuse.
    pub reuse_hints: usize,
    /// Sum of all stall counts.
    pub stall_cycles: usize,
}

/// Computes the [`Schedule`] of every instruction in a function.
///
/// The scheduler only holds the target and a copy of the options; all per-function state lives
/// for the duration of [`run`](Self::run).
#[derive(Clone, Copy)]
pub struct Scheduler<'a> {
    target: &'a dyn Target,
    opts: SchedOpts,
}

impl std::fmt::Debug for Scheduler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("opts", &self.opts).finish_non_exhaustive()
    }
}

impl<'a> Scheduler<'a> {
    /// Creates a new scheduler.
    pub fn new(target: &'a dyn Target, opts: SchedOpts) -> Self {
        Self { target, opts }
    }

    /// Returns the options.
    #[must_use]
    pub fn opts(&self) -> &SchedOpts {
        &self.opts
    }

    /// Schedules `func` in place, overwriting every instruction's [`Schedule`].
    ///
    /// Running the scheduler again on its own output produces the same schedules.
    ///
    /// # Panics
    ///
    /// Panics if verification is enabled and the result has a hazard.
    #[instrument(level = "debug", skip_all, fields(function = %func.name, mode = %self.opts.mode))]
    pub fn run(&self, func: &mut Function) -> SchedStats {
        func.classify_edges();
        let mut stats = SchedStats::default();
        match self.opts.mode {
            SchedMode::Full => FunctionScheduler::new(self, func).run(func, &mut stats),
            SchedMode::Conservative => self.run_conservative(func, &mut stats),
            SchedMode::Off => func.reset_schedules(),
        }
        count(func, &mut stats);
        debug!(?stats, "scheduled");

        if self.opts.verify {
            if self.opts.mode.is_off() {
                debug!("nothing to verify");
            } else if let Err(err) = verify_function(func, self.target) {
                panic!("hazard in scheduled function `{}`: {err}\n{func}", func.name);
            }
        }
        stats
    }

    /// Stalls fully after every instruction and waits on every barrier before it.
    fn run_conservative(&self, func: &mut Function, stats: &mut SchedStats) {
        let bar = Some(BarrierId::new(0));
        for inst in func.blocks.iter_mut().flat_map(|block| &mut block.insts) {
            let mut sched = Schedule::default();
            if needs_write_barrier(self.target, inst) {
                sched.wr_bar = bar;
                stats.barriers += 1;
            }
            if needs_read_barrier(self.target, inst) {
                sched.rd_bar = bar;
                stats.barriers += 1;
            }
            inst.sched = sched;
        }
    }
}

/// Fills in the counters that can be read off the final schedules.
fn count(func: &Function, stats: &mut SchedStats) {
    stats.blocks = func.blocks.len();
    for inst in func.insts() {
        stats.instructions += 1;
        stats.dual_issues += usize::from(inst.sched.stall == 0);
        stats.reuse_hints += inst.sched.reuse.bits().count_ones() as usize;
        stats.stall_cycles += usize::from(inst.sched.stall);
    }
}

/// State of one [`SchedMode::Full`] run.
struct FunctionScheduler<'a> {
    target: &'a dyn Target,
    opts: &'a SchedOpts,
    barriers: BarrierAllocator,
    /// Exit scoreboard of every block, relative to the block's last issue cycle.
    exit_scores: IndexVec<BlockId, Scoreboard>,
    /// Blocks whose exit scoreboard is final.
    done: BitSet,
}

impl<'a> FunctionScheduler<'a> {
    fn new(scheduler: &'a Scheduler<'_>, func: &Function) -> Self {
        let n = func.blocks.len();
        Self {
            target: scheduler.target,
            opts: &scheduler.opts,
            barriers: BarrierAllocator::new(),
            exit_scores: IndexVec::from_vec(vec![Scoreboard::new(); n]),
            done: BitSet::new(n),
        }
    }

    fn run(&mut self, func: &mut Function, stats: &mut SchedStats) {
        for block in func.reverse_post_order() {
            let scheds = self.schedule_block(func, block, stats);
            for (inst, sched) in func.blocks[block].insts.iter_mut().zip(scheds) {
                inst.sched = sched;
            }
            self.done.set(block.index());
        }
    }

    #[instrument(level = "debug", skip_all, fields(block = %id))]
    fn schedule_block(
        &mut self,
        func: &Function,
        id: BlockId,
        stats: &mut SchedStats,
    ) -> Vec<Schedule> {
        let block = &func.blocks[id];
        let mut score = Scoreboard::new();
        for pred in block.forward_preds() {
            assert!(self.done.test(pred.index()), "{pred} was not scheduled before {id}");
            score.merge(&self.exit_scores[pred]);
        }

        let insts = &block.insts;
        let Some(last) = insts.last() else {
            trace!("empty block");
            self.exit_scores[id] = score;
            return Vec::new();
        };

        let mut scheds = vec![Schedule::EMPTY; insts.len()];
        self.barriers.run(self.target, insts, &mut scheds, stats);
        if !block.preds.is_empty() {
            // Barriers signalled in predecessors are not tracked across blocks.
            scheds[0].wait = BarrierMask::all();
        }

        let mut cycle = 0;
        for (i, pair) in insts.windows(2).enumerate() {
            let (inst, next) = (&pair[0], &pair[1]);
            stall::commit(&mut score, self.target, inst, cycle);
            let delay = stall::calc_delay(&score, next, cycle);
            let next_wait = scheds[i + 1].wait;
            let sched = &mut scheds[i];
            sched.stall = stall::set_delay(
                self.target,
                self.opts,
                inst,
                sched,
                delay,
                Next::InBlock { inst: next, wait: next_wait },
            );
            if self.opts.reuse {
                sched.reuse = reuse_mask(self.target, inst, next);
            }
            if self.opts.dump {
                trace!(cycle, "{sched}  {inst}");
            }
            cycle += i32::from(sched.stall);
        }

        stall::commit(&mut score, self.target, last, cycle);
        let delay = self.exit_delay(func, id, &scheds, &score, cycle);
        let next = match block.succs.as_slice() {
            [edge] if !edge.is_back() => {
                func.blocks[edge.block].first().map_or(Next::End, Next::Successor)
            }
            _ => Next::End,
        };
        let sched = &mut scheds[insts.len() - 1];
        sched.stall = stall::set_delay(self.target, self.opts, last, sched, delay, next);
        if self.opts.dump {
            trace!(cycle, "{sched}  {last}");
        }
        cycle += i32::from(sched.stall);

        debug!(insts = insts.len(), cycle, "scheduled block");
        score.rebase(cycle);
        self.exit_scores[id] = score;
        scheds
    }

    /// Returns the delay the last instruction of block `id`, issued at `cycle`, must leave before
    /// execution continues in any successor.
    ///
    /// Empty successors issue nothing, so the instructions behind them are checked instead.
    fn exit_delay(
        &self,
        func: &Function,
        id: BlockId,
        scheds: &[Schedule],
        score: &Scoreboard,
        cycle: i32,
    ) -> i32 {
        let block = &func.blocks[id];
        let mut delay = 0;
        let mut seen = BitSet::new(func.blocks.len());
        let mut edges = block.succs.to_vec();
        while let Some(edge) = edges.pop() {
            if edge.is_back() {
                delay = delay.max(self.loop_delay(func, id, edge.block, scheds, score, cycle));
                continue;
            }
            let succ = &func.blocks[edge.block];
            if let Some(first) = succ.first() {
                delay = delay.max(stall::calc_delay(score, first, cycle));
                continue;
            }
            if let Some(last) = block.insts.last() {
                delay = delay.max(self.target.latency(last) as i32);
            }
            if seen.set(edge.block.index()) {
                edges.extend(succ.succs.iter().copied());
            }
        }
        delay
    }

    /// Returns the delay needed before re-entering the already scheduled loop `header` from the
    /// end of block `id`, issued at `cycle`.
    fn loop_delay(
        &self,
        func: &Function,
        id: BlockId,
        header: BlockId,
        scheds: &[Schedule],
        score: &Scoreboard,
        cycle: i32,
    ) -> i32 {
        let free = score.latest();
        let mut delay = 0;
        let mut c = cycle;
        for (i, inst) in func.blocks[header].insts.iter().enumerate() {
            if c >= free {
                return delay;
            }
            delay = delay.max(stall::calc_delay(score, inst, c));
            // In a self loop the last stall is the one being computed; counting it as zero can
            // only lengthen the delay.
            let stall = if header == id { scheds[i].stall } else { inst.sched.stall };
            c += i32::from(stall);
        }
        // The rest of the loop body was scheduled without this block's results.
        delay.max(free - c)
    }
}
