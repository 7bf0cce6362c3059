#![allow(unused_crate_dependencies)]

use gpusched_ir::{
    BarrierMask, BlockId, DataType, Function, FunctionBuilder, Instruction, Op, Operand, Schedule,
};
use gpusched_sched::{
    HazardError, Maxwell, PREDICATE_LATENCY, SchedMode, SchedOpts, Scheduler, Scoreboard, Target,
    verify_function,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use snapbox::assert_data_eq;
use std::{cell::Cell, collections::BTreeSet};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn build(f: impl FnOnce(&mut FunctionBuilder<'_>)) -> Function {
    let mut func = Function::new("test");
    let mut b = FunctionBuilder::new(&mut func);
    f(&mut b);
    b.finish();
    func
}

fn schedule(func: &mut Function) -> gpusched_sched::SchedStats {
    init_tracing();
    let opts = SchedOpts { verify: true, dump: true, ..Default::default() };
    Scheduler::new(&Maxwell, opts).run(func)
}

fn scheds(func: &Function, block: BlockId) -> Vec<Schedule> {
    func.blocks[block].insts.iter().map(|inst| inst.sched).collect()
}

#[test]
fn load_then_use_waits_on_the_load_barrier() {
    let mut func = build(|b| {
        b.ld(1, 2);
        b.inst(Op::Add, DataType::U32, &[Operand::gpr(2)], &[Operand::gpr(1), Operand::gpr(1)]);
        b.exit();
    });
    let stats = schedule(&mut func);
    let s = scheds(&func, func.entry);

    let bar = s[0].wr_bar.expect("load signals a write barrier");
    assert!(s[1].wait.has(bar));
    assert!(s[0].stall >= 1);
    // The wait on the write barrier also proves the address was read.
    assert_eq!(s[0].rd_bar, None);
    assert_eq!(stats.barriers, 1);
}

#[test]
fn independent_moves_get_minimum_stall() {
    let mut func = build(|b| {
        b.mov(1, Operand::gpr(2));
        b.mov(3, Operand::gpr(4));
    });
    let stats = schedule(&mut func);
    for sched in scheds(&func, func.entry) {
        assert_eq!(sched.stall, 1);
        assert_eq!(sched.signals(), BarrierMask::empty());
        assert_eq!(sched.wait, BarrierMask::empty());
    }
    assert_eq!(stats.barriers, 0);
    assert_eq!(stats.stall_cycles, 2);
}

#[test]
fn ready_cycles_flow_into_successors() {
    let mut a = Scoreboard::new();
    a.record_write(&Operand::gpr(5), 0, 15);
    a.rebase(6);
    let mut entry = Scoreboard::new();
    entry.merge(&a);
    assert!(entry.ready(&Operand::gpr(5)) >= 9);

    let mut func = build(|b| {
        let next = b.create_block();
        b.inst(Op::Add, DataType::F64, &[Operand::gpr(5)], &[Operand::gpr(1), Operand::gpr(2)]);
        b.add(6, 1, 1);
        b.add(7, 6, 6);
        b.edge(b.current_block(), next);
        b.switch_to_block(next);
        b.mov(8, Operand::imm(0));
        b.add(9, 5, 5);
        b.exit();
    });
    schedule(&mut func);
    assert_eq!(scheds(&func, func.entry).iter().map(|s| s.stall).collect::<Vec<_>>(), [1, 6, 1]);
    // r5 becomes ready 15 - 8 = 7 cycles into the successor.
    let next = scheds(&func, BlockId::new(1));
    assert_eq!(next[0].wait, BarrierMask::all());
    assert_eq!(next[0].stall, 7);
}

#[test]
fn seven_pending_loads_share_the_last_barrier() {
    let mut func = build(|b| {
        for i in 0..7 {
            b.inst(Op::Ld, DataType::U32, &[Operand::gpr(10 + i)], &[Operand::untracked(i)]);
        }
        for i in 0..7 {
            b.add(30 + i, 10 + i, 10 + i);
        }
        b.exit();
    });
    let stats = schedule(&mut func);
    let s = scheds(&func, func.entry);

    let ids = s.iter().filter_map(|s| s.wr_bar).map(|id| id.index()).collect::<BTreeSet<_>>();
    assert_eq!(ids.len(), 6);
    assert_eq!(stats.barriers, 7);
    assert_eq!(stats.barrier_fallbacks, 1);
    // Waiting for the sixth load also waits for the seventh.
    assert_eq!(s[12].wait, BarrierMask::B5);
    assert_eq!(s[13].wait, BarrierMask::empty());
}

#[test]
fn loop_back_edge_delays_the_latch() {
    let mut func = build(|b| {
        let (body, exit) = (b.create_block(), b.create_block());
        b.mov(3, Operand::imm(0));
        b.edge(b.current_block(), body);

        b.switch_to_block(body);
        b.mov(2, Operand::imm(5));
        b.add(0, 0, 1);
        b.edge(body, body);
        b.edge(body, exit);

        b.switch_to_block(exit);
        b.exit();
    });
    let stats = schedule(&mut func);
    assert_eq!(stats.blocks, 3);

    // The add of the next iteration must not issue before r0 is ready.
    let body = scheds(&func, BlockId::new(1));
    assert_eq!(body[1].stall, 5);

    assert_data_eq!(
        func.to_string(),
        "\
function test {
bb0 -> bb1:
    st=1  wr=- rd=- wt=------ ru=----  mov.u32 r3, 0x0
bb1 -> bb1 (back), bb2:
    st=1  wr=- rd=- wt=012345 ru=----  mov.u32 r2, 0x5
    st=5  wr=- rd=- wt=------ ru=----  add.u32 r0, r0, r1
bb2:
    st=15 wr=- rd=- wt=012345 ru=----  exit.u32
}"
    );
}

#[test]
fn fallthrough_latch_covers_the_loop_body() {
    let mut func = build(|b| {
        let (header, body, latch, exit) =
            (b.create_block(), b.create_block(), b.create_block(), b.create_block());
        b.mov(3, Operand::imm(0));
        b.edge(b.current_block(), header);

        b.switch_to_block(header);
        b.mov(0, Operand::imm(0));
        b.edge(header, body);

        b.switch_to_block(body);
        b.add(2, 10, 10);
        b.edge(body, latch);

        // No branch at the end of the latch, so nothing forces a full stall.
        b.switch_to_block(latch);
        b.inst(Op::Add, DataType::F64, &[Operand::gpr(10)], &[Operand::gpr(4), Operand::gpr(5)]);
        b.edge(latch, header);
        b.edge(latch, exit);

        b.switch_to_block(exit);
        b.exit();
    });
    schedule(&mut func);

    // The body reads r10 one cycle after the header is re-entered.
    let latch = BlockId::new(3);
    assert_eq!(scheds(&func, latch)[0].stall, 14);

    func.blocks[latch].insts[0].sched.stall = 1;
    assert_eq!(
        verify_function(&func, &Maxwell),
        Err(HazardError::ReadTooEarlyOnEntry {
            block: BlockId::new(2),
            index: 0,
            reg: Operand::gpr(10),
            issue: 0,
            ready: 13,
        })
    );
}

/// Maxwell, except that two moves can issue together.
struct PairedMoves;

impl Target for PairedMoves {
    fn latency(&self, inst: &Instruction) -> u32 {
        Maxwell.latency(inst)
    }
    fn read_latency(&self, inst: &Instruction) -> u32 {
        Maxwell.read_latency(inst)
    }
    fn is_variable_latency(&self, inst: &Instruction) -> bool {
        Maxwell.is_variable_latency(inst)
    }
    fn supports_reuse(&self, inst: &Instruction) -> bool {
        Maxwell.supports_reuse(inst)
    }
    fn can_dual_issue(&self, a: &Instruction, b: &Instruction) -> bool {
        a.op == Op::Mov && b.op == Op::Mov
    }
}

#[test]
fn dual_issue() {
    let build = || {
        build(|b| {
            b.mov(1, Operand::gpr(2));
            b.mov(3, Operand::gpr(4));
            b.mov(5, Operand::gpr(1));
            b.exit();
        })
    };
    let stalls =
        |func: &Function| scheds(func, func.entry).iter().map(|s| s.stall).collect::<Vec<_>>();

    let mut func = build();
    let opts = SchedOpts { verify: true, ..Default::default() };
    let stats = Scheduler::new(&PairedMoves, opts).run(&mut func);
    // The third move depends on the first.
    assert_eq!(stalls(&func), [0, 6, 1, 15]);
    assert_eq!(stats.dual_issues, 1);
    assert_eq!(verify_function(&func, &PairedMoves), Ok(()));

    let mut func = build();
    let opts = SchedOpts { dual_issue: false, ..opts };
    Scheduler::new(&PairedMoves, opts).run(&mut func);
    assert_eq!(stalls(&func), [1, 5, 1, 15]);
}

#[test]
fn reuse_hints() {
    fn fma(b: &mut FunctionBuilder<'_>, dst: u32, a: u32, c: u32) {
        let srcs = [Operand::gpr(a), Operand::gpr(2), Operand::gpr(c)];
        b.inst(Op::Fma, DataType::F32, &[Operand::gpr(dst)], &srcs);
    }

    let mut func = build(|b| {
        fma(b, 10, 1, 3);
        fma(b, 11, 1, 4);
        b.exit();
    });
    let stats = schedule(&mut func);
    let s = scheds(&func, func.entry);
    assert_eq!(s[0].reuse.bits(), 0b011);
    assert_eq!(stats.reuse_hints, 2);

    let mut func = build(|b| {
        fma(b, 10, 1, 3);
        fma(b, 11, 1, 4);
    });
    let opts = SchedOpts { reuse: false, ..Default::default() };
    let stats = Scheduler::new(&Maxwell, opts).run(&mut func);
    assert_eq!(stats.reuse_hints, 0);
}

#[test]
fn predicate_results_take_longer() {
    let mut func = build(|b| {
        b.inst(Op::Set, DataType::S32, &[Operand::pred(1)], &[Operand::gpr(0), Operand::imm(3)]);
        b.inst(Op::Selp, DataType::U32, &[Operand::gpr(1)], &[Operand::gpr(2), Operand::pred(1)]);
    });
    schedule(&mut func);
    assert_eq!(i32::from(scheds(&func, func.entry)[0].stall), PREDICATE_LATENCY);
}

/// Maxwell, but only the first question about dual issue is answered with yes.
struct Fickle {
    asked: Cell<usize>,
}

impl Target for Fickle {
    fn latency(&self, inst: &Instruction) -> u32 {
        Maxwell.latency(inst)
    }
    fn read_latency(&self, inst: &Instruction) -> u32 {
        Maxwell.read_latency(inst)
    }
    fn is_variable_latency(&self, inst: &Instruction) -> bool {
        Maxwell.is_variable_latency(inst)
    }
    fn supports_reuse(&self, inst: &Instruction) -> bool {
        Maxwell.supports_reuse(inst)
    }
    fn can_dual_issue(&self, _a: &Instruction, _b: &Instruction) -> bool {
        let asked = self.asked.get();
        self.asked.set(asked + 1);
        asked == 0
    }
}

#[test]
#[should_panic = "hazard in scheduled function `test`"]
fn verification_failures_panic() {
    let mut func = build(|b| {
        b.mov(1, Operand::gpr(2));
        b.mov(3, Operand::gpr(4));
    });
    let target = Fickle { asked: Cell::new(0) };
    let opts = SchedOpts { verify: true, ..Default::default() };
    Scheduler::new(&target, opts).run(&mut func);
}

#[test]
fn modes() {
    let build = || {
        build(|b| {
            b.ld(1, 2);
            b.add(3, 1, 1);
            b.st(2, 3);
            b.exit();
        })
    };

    let mut func = build();
    let opts = SchedOpts { mode: SchedMode::Conservative, verify: true, ..Default::default() };
    Scheduler::new(&Maxwell, opts).run(&mut func);
    for sched in scheds(&func, func.entry) {
        assert_eq!(sched.stall, 15);
        assert_eq!(sched.wait, BarrierMask::all());
        assert!(sched.signals().is_empty() || sched.signals() == BarrierMask::B0);
    }

    let mut func = build();
    let opts = SchedOpts { mode: SchedMode::Off, ..Default::default() };
    let stats = Scheduler::new(&Maxwell, opts).run(&mut func);
    assert!(func.insts().all(|inst| inst.sched == Schedule::default()));
    assert_eq!(stats.barriers, 0);
    assert_eq!(stats.stall_cycles, 60);
}

#[test]
fn rescheduling_is_idempotent() {
    let mut func = build(|b| {
        let (body, exit) = (b.create_block(), b.create_block());
        b.ld(1, 0);
        b.edge(b.current_block(), body);
        b.switch_to_block(body);
        b.add(2, 1, 2);
        b.ld(1, 2);
        b.edge(body, body);
        b.edge(body, exit);
        b.switch_to_block(exit);
        b.st(0, 2);
        b.exit();
    });
    schedule(&mut func);
    let first = func.clone();

    schedule(&mut func);
    assert_eq!(func, first);

    func.reset_schedules();
    schedule(&mut func);
    assert_eq!(func, first);
}

fn random_reg(rng: &mut StdRng) -> Operand {
    if rng.random_bool(0.05) { Operand::rz() } else { Operand::gpr(rng.random_range(0..8)) }
}

fn random_inst(rng: &mut StdRng) -> Instruction {
    let kind = rng.random_range(0..12);
    if kind == 11 {
        let pred = Operand::pred(rng.random_range(0..3));
        return if rng.random_bool(0.5) {
            Instruction::new(Op::Set, DataType::S32)
                .with_defs([pred])
                .with_srcs([random_reg(rng), Operand::imm(0)])
        } else {
            Instruction::new(Op::Selp, DataType::U32)
                .with_defs([random_reg(rng)])
                .with_srcs([random_reg(rng), random_reg(rng), pred])
        };
    }

    let mut regs = |n: usize| (0..n).map(|_| random_reg(rng)).collect::<Vec<_>>();
    let (op, dtype, defs, srcs) = match kind {
        0 => (Op::Mov, DataType::U32, regs(1), regs(1)),
        1 => (Op::Add, DataType::U32, regs(1), regs(2)),
        2 => (Op::Add, DataType::F64, regs(1), regs(2)),
        3 => (Op::Fma, DataType::F32, regs(1), regs(3)),
        4 => (Op::Ld, DataType::U32, regs(1), regs(1)),
        5 => (Op::St, DataType::U32, vec![], regs(2)),
        6 => (Op::Rcp, DataType::F32, regs(1), regs(1)),
        7 => (Op::Mul, DataType::S32, regs(1), regs(2)),
        8 => (Op::Cvt, DataType::F32, regs(1), regs(1)),
        9 => (Op::Tex, DataType::F32, regs(2), regs(2)),
        _ => (Op::Ld, DataType::U32, regs(1), vec![Operand::untracked(0)]),
    };
    Instruction::new(op, dtype).with_defs(defs).with_srcs(srcs)
}

fn random_function(rng: &mut StdRng) -> Function {
    build(|b| {
        let n = rng.random_range(1..=6);
        let mut blocks = vec![b.current_block()];
        blocks.extend((1..n).map(|_| b.create_block()));
        for (i, &block) in blocks.iter().enumerate() {
            b.switch_to_block(block);
            if rng.random_bool(0.9) {
                for _ in 0..rng.random_range(1..16) {
                    b.push(random_inst(rng));
                }
            }
            if i + 1 < n {
                b.edge(block, blocks[i + 1]);
            }
            if rng.random_bool(0.3) {
                b.edge(block, blocks[rng.random_range(0..n)]);
            } else if i + 1 == n {
                b.exit();
            }
        }
    })
}

#[test]
fn random_functions_are_hazard_free() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x6d31_07);
    for mode in [SchedMode::Full, SchedMode::Conservative] {
        for _ in 0..300 {
            let mut func = random_function(&mut rng);
            let opts = SchedOpts { mode, verify: true, ..Default::default() };
            let stats = Scheduler::new(&Maxwell, opts).run(&mut func);
            assert_eq!(verify_function(&func, &Maxwell), Ok(()), "{func}");
            assert_eq!(stats.instructions, func.num_insts());
            assert!(func.insts().all(|inst| (1..=15).contains(&inst.sched.stall)), "{func}");

            let mut again = func.clone();
            again.reset_schedules();
            Scheduler::new(&Maxwell, opts).run(&mut again);
            assert_eq!(again, func);
        }
    }
}
