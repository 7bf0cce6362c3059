//! Per-instruction scheduling control information.

use std::fmt;

/// Number of dependency barriers provided by the hardware.
pub const NUM_BARRIERS: usize = 6;

const MAX_STALL: u8 = 15;
const NO_BARRIER: u32 = 7;

/// A dependency barrier id, in `0..NUM_BARRIERS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BarrierId(u8);

impl BarrierId {
    /// Creates a new barrier id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a valid barrier.
    #[inline]
    #[must_use]
    pub const fn new(id: usize) -> Self {
        assert!(id < NUM_BARRIERS, "barrier id out of range");
        Self(id as u8)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the wait mask containing only this barrier.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> BarrierMask {
        BarrierMask::from_bits_retain(1 << self.0)
    }
}

bitflags::bitflags! {
    /// A set of dependency barriers to wait on.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BarrierMask: u8 {
        const B0 = 1 << 0;
        const B1 = 1 << 1;
        const B2 = 1 << 2;
        const B3 = 1 << 3;
        const B4 = 1 << 4;
        const B5 = 1 << 5;
    }
}

impl BarrierMask {
    /// Returns `true` if `id` is in the set.
    #[inline]
    #[must_use]
    pub const fn has(self, id: BarrierId) -> bool {
        self.contains(id.mask())
    }

    /// Iterates over the barriers in the set, lowest first.
    pub fn ids(self) -> impl Iterator<Item = BarrierId> {
        (0..NUM_BARRIERS).map(BarrierId::new).filter(move |&id| self.has(id))
    }
}

bitflags::bitflags! {
    /// Source operand slots whose value the next instruction reads again.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ReuseMask: u8 {
        const S0 = 1 << 0;
        const S1 = 1 << 1;
        const S2 = 1 << 2;
        const S3 = 1 << 3;
    }
}

impl ReuseMask {
    /// Returns the mask for source slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` has no reuse bit.
    #[inline]
    #[must_use]
    pub const fn slot(slot: usize) -> Self {
        assert!(slot < 4, "reuse slot out of range");
        Self::from_bits_retain(1 << slot)
    }
}

/// The scheduling control information of one instruction.
///
/// Instructions are created with the [default](Self::default) schedule, which is safe regardless
/// of surrounding code: stall for the maximum count and wait on every barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Schedule {
    /// Cycles to wait before issuing the next instruction. 0 means dual issue.
    pub stall: u8,
    /// Allow the warp scheduler to switch to another warp.
    pub yield_: bool,
    /// Barrier signalled when the results are written.
    pub wr_bar: Option<BarrierId>,
    /// Barrier signalled when the sources have been read.
    pub rd_bar: Option<BarrierId>,
    /// Barriers to wait on before issuing.
    pub wait: BarrierMask,
    /// Source slots to keep in the operand reuse cache.
    pub reuse: ReuseMask,
}

impl Default for Schedule {
    fn default() -> Self {
        Self { stall: MAX_STALL, wait: BarrierMask::all(), ..Self::EMPTY }
    }
}

impl Schedule {
    /// A schedule with no stall, no barriers and no waits. Starting point of the scheduler.
    pub const EMPTY: Self = Self {
        stall: 0,
        yield_: false,
        wr_bar: None,
        rd_bar: None,
        wait: BarrierMask::empty(),
        reuse: ReuseMask::empty(),
    };

    /// The maximum stall count.
    pub const MAX_STALL: u8 = MAX_STALL;

    /// Returns the barriers this instruction signals.
    #[must_use]
    pub fn signals(&self) -> BarrierMask {
        self.wr_bar.iter().chain(&self.rd_bar).fold(BarrierMask::empty(), |m, id| m | id.mask())
    }

    /// Packs the schedule into a 21-bit control code.
    ///
    /// Bits 0-3 hold the stall count, bit 4 the yield flag, bits 5-7 and 8-10 the write and read
    /// barriers (7 for none), bits 11-16 the wait mask and bits 17-20 the reuse mask.
    #[must_use]
    pub fn to_bits(&self) -> u32 {
        assert!(self.stall <= MAX_STALL, "stall count out of range: {}", self.stall);
        let bar = |id: Option<BarrierId>| id.map_or(NO_BARRIER, |id| id.index() as u32);
        u32::from(self.stall)
            | u32::from(self.yield_) << 4
            | bar(self.wr_bar) << 5
            | bar(self.rd_bar) << 8
            | u32::from(self.wait.bits()) << 11
            | u32::from(self.reuse.bits()) << 17
    }

    /// Unpacks a control code produced by [`to_bits`](Self::to_bits).
    ///
    /// Returns `None` if a barrier field holds an invalid id or bits above 20 are set.
    #[must_use]
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits >> 21 != 0 {
            return None;
        }
        let bar = |raw: u32| match raw {
            NO_BARRIER => Some(None),
            id if (id as usize) < NUM_BARRIERS => Some(Some(BarrierId::new(id as usize))),
            _ => None,
        };
        Some(Self {
            stall: (bits & 0xf) as u8,
            yield_: bits & (1 << 4) != 0,
            wr_bar: bar((bits >> 5) & 0x7)?,
            rd_bar: bar((bits >> 8) & 0x7)?,
            wait: BarrierMask::from_bits_retain(((bits >> 11) & 0x3f) as u8),
            reuse: ReuseMask::from_bits_retain(((bits >> 17) & 0xf) as u8),
        })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bar = |id: Option<BarrierId>| id.map_or('-', |id| char::from(b'0' + id.0));
        write!(f, "st={:<2} wr={} rd={} wt=", self.stall, bar(self.wr_bar), bar(self.rd_bar))?;
        for id in (0..NUM_BARRIERS).map(BarrierId::new) {
            let c = if self.wait.has(id) { char::from(b'0' + id.0) } else { '-' };
            write!(f, "{c}")?;
        }
        f.write_str(" ru=")?;
        for slot in 0..4 {
            let c = if self.reuse.contains(ReuseMask::slot(slot)) {
                char::from(b'0' + slot as u8)
            } else {
                '-'
            };
            write!(f, "{c}")?;
        }
        if self.yield_ {
            f.write_str(" yield")?;
        }
        Ok(())
    }
}
