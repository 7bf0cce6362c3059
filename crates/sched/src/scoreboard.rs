//! Register scoreboard.

use gpusched_ir::{NUM_GPRS, NUM_PREDICATES, Operand, RegFile};

/// Cycles a freshly written predicate needs before it can be consumed, regardless of the
/// instruction that wrote it.
pub const PREDICATE_LATENCY: i32 = 13;

/// Ready cycles of every tracked register.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Table {
    r: [i32; NUM_GPRS as usize],
    p: [i32; NUM_PREDICATES as usize],
    c: i32,
}

impl Default for Table {
    fn default() -> Self {
        Self { r: [0; NUM_GPRS as usize], p: [0; NUM_PREDICATES as usize], c: 0 }
    }
}

impl Table {
    /// Returns the entries spanned by `operand`.
    fn slots(&self, operand: &Operand) -> &[i32] {
        match operand.file {
            RegFile::Gpr => {
                let regs = gpr_range(operand);
                &self.r[regs]
            }
            RegFile::Predicate => std::slice::from_ref(&self.p[pred_index(operand)]),
            RegFile::Flags => std::slice::from_ref(&self.c),
            RegFile::Immediate | RegFile::Untracked => &[],
        }
    }

    fn slots_mut(&mut self, operand: &Operand) -> &mut [i32] {
        match operand.file {
            RegFile::Gpr => {
                let regs = gpr_range(operand);
                &mut self.r[regs]
            }
            RegFile::Predicate => std::slice::from_mut(&mut self.p[pred_index(operand)]),
            RegFile::Flags => std::slice::from_mut(&mut self.c),
            RegFile::Immediate | RegFile::Untracked => &mut [],
        }
    }

    fn values(&self) -> impl Iterator<Item = i32> + '_ {
        self.r.iter().chain(&self.p).chain(std::iter::once(&self.c)).copied()
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut i32> {
        self.r.iter_mut().chain(&mut self.p).chain(std::iter::once(&mut self.c))
    }

    fn delay(&self, operand: &Operand, cycle: i32) -> i32 {
        self.slots(operand).iter().map(|&ready| ready - cycle).max().unwrap_or(0).max(0)
    }
}

fn gpr_range(operand: &Operand) -> std::ops::Range<usize> {
    let regs = operand.regs();
    assert!(regs.end <= NUM_GPRS, "register {operand} out of range");
    regs.start as usize..regs.end as usize
}

fn pred_index(operand: &Operand) -> usize {
    assert!(operand.index < NUM_PREDICATES, "predicate {operand} out of range");
    operand.index as usize
}

/// Per-register ready cycles, relative to a block-local cycle zero.
///
/// The `rd` table holds the cycle at which a register's pending write completes and it may be
/// read; the `wr` table holds the cycle at which pending readers have latched a register and it
/// may be overwritten. Immediate and untracked operands are ignored by every operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scoreboard {
    rd: Table,
    wr: Table,
}

impl Scoreboard {
    /// Creates a scoreboard with every register ready at cycle 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write of `operand` by an instruction issued at `cycle` whose results are ready at
    /// `ready`. Predicates are always ready [`PREDICATE_LATENCY`] cycles after issue.
    pub fn record_write(&mut self, operand: &Operand, cycle: i32, ready: i32) {
        let ready = if operand.file == RegFile::Predicate { cycle + PREDICATE_LATENCY } else { ready };
        self.rd.slots_mut(operand).fill(ready);
    }

    /// Records a read of `operand` which has latched its value at `latched`.
    pub fn record_read(&mut self, operand: &Operand, latched: i32) {
        for slot in self.wr.slots_mut(operand) {
            *slot = (*slot).max(latched);
        }
    }

    /// Returns how many cycles past `cycle` a read of `operand` must wait.
    #[must_use]
    pub fn check_read(&self, operand: &Operand, cycle: i32) -> i32 {
        self.rd.delay(operand, cycle)
    }

    /// Returns how many cycles past `cycle` a write of `operand` must wait.
    #[must_use]
    pub fn check_write(&self, operand: &Operand, cycle: i32) -> i32 {
        self.wr.delay(operand, cycle)
    }

    /// Returns the cycle at which `operand` can be read.
    #[must_use]
    pub fn ready(&self, operand: &Operand) -> i32 {
        self.rd.slots(operand).iter().copied().max().unwrap_or(i32::MIN)
    }

    /// Merges the exit state of a predecessor: every entry becomes the maximum of both.
    pub fn merge(&mut self, other: &Self) {
        let tables = [(&mut self.rd, &other.rd), (&mut self.wr, &other.wr)];
        for (this, other) in tables {
            for (a, b) in this.values_mut().zip(other.values()) {
                *a = (*a).max(b);
            }
        }
    }

    /// Moves cycle zero to `cycle`.
    pub fn rebase(&mut self, cycle: i32) {
        for value in self.rd.values_mut().chain(self.wr.values_mut()) {
            *value -= cycle;
        }
    }

    /// Returns the last cycle at which any register becomes free.
    #[must_use]
    pub fn latest(&self) -> i32 {
        self.rd.values().chain(self.wr.values()).max().unwrap_or(0)
    }
}
