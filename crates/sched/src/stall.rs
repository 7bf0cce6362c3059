//! Stall count computation.

use crate::{Scoreboard, Target};
use gpusched_config::SchedOpts;
use gpusched_ir::{BarrierMask, Instruction, Op, OpClass, Schedule};

/// Minimum stall before the quad control instructions' effect is visible.
const QUAD_STALL: i32 = 13;

/// The instruction issued after the one whose stall is being computed.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Next<'a> {
    /// The next instruction of the same block, with the barriers it waits on.
    InBlock { inst: &'a Instruction, wait: BarrierMask },
    /// The first instruction of the only successor block.
    Successor(&'a Instruction),
    /// Unknown: the block has no successor, several of them, or loops back.
    End,
}

/// Records the results and sources of `inst`, issued at `cycle`.
pub(crate) fn commit(score: &mut Scoreboard, target: &dyn Target, inst: &Instruction, cycle: i32) {
    let ready = cycle + target.latency(inst) as i32;
    for def in &inst.defs {
        score.record_write(def, cycle, ready);
    }
    let latched = cycle + target.read_latency(inst) as i32;
    if latched > cycle {
        for src in &inst.srcs {
            score.record_read(src, latched);
        }
    }
}

/// Returns the number of cycles after `cycle` before `inst` may issue.
pub(crate) fn calc_delay(score: &Scoreboard, inst: &Instruction, cycle: i32) -> i32 {
    let reads = inst.srcs.iter().map(|src| score.check_read(src, cycle));
    let writes = inst.defs.iter().map(|def| score.check_write(def, cycle));
    reads.chain(writes).max().unwrap_or(0)
}

/// Returns `true` if nothing may issue until `inst` has drained the pipeline.
fn needs_full_stall(inst: &Instruction) -> bool {
    matches!(inst.class(), OpClass::Flow | OpClass::Barrier) || inst.is_join()
}

/// Turns the raw `delay` before `next` into the stall count of `inst`.
pub(crate) fn set_delay(
    target: &dyn Target,
    opts: &SchedOpts,
    inst: &Instruction,
    sched: &Schedule,
    delay: i32,
    next: Next<'_>,
) -> u8 {
    assert!(delay >= 0, "negative delay {delay} computed for `{inst}`");
    let max = i32::from(Schedule::MAX_STALL);
    let full_stall = needs_full_stall(inst);
    let delay = if full_stall {
        max
    } else if matches!(inst.op, Op::Quadon | Op::Quadpop) {
        delay.max(QUAD_STALL)
    } else {
        delay
    };

    let signals = sched.signals();
    let dual_issue = match next {
        Next::InBlock { inst: next, wait } => {
            opts.dual_issue
                && delay == 0
                && !full_stall
                && !wait.intersects(signals)
                && target.can_dual_issue(inst, next)
        }
        Next::Successor(_) | Next::End => false,
    };
    if dual_issue {
        return 0;
    }

    let mut stall = delay.clamp(1, max);
    // Barriers become active one cycle after the instruction producing them.
    if stall == 1 && !signals.is_empty() {
        let waits = match next {
            Next::InBlock { wait, .. } => wait.intersects(signals),
            Next::Successor(_) | Next::End => true,
        };
        if waits {
            stall = 2;
        }
    }
    stall as u8
}
