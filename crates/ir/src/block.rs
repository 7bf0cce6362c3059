//! Basic blocks and control flow edges.

use crate::{BlockId, Instruction};
use smallvec::SmallVec;

/// The kind of a control flow edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Any edge that is not a back edge.
    Forward,
    /// An edge to a block that was still on the depth-first search stack, i.e. a loop latch.
    Back,
}

/// One end of a control flow edge, stored in both the source and the target block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The block at the other end of the edge.
    pub block: BlockId,
    /// The edge kind.
    pub kind: EdgeKind,
}

impl Edge {
    /// Returns `true` if this is a back edge.
    #[inline]
    #[must_use]
    pub const fn is_back(&self) -> bool {
        matches!(self.kind, EdgeKind::Back)
    }
}

/// A basic block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicBlock {
    /// The instructions, in issue order.
    pub insts: Vec<Instruction>,
    /// Incoming edges.
    pub preds: SmallVec<[Edge; 2]>,
    /// Outgoing edges.
    pub succs: SmallVec<[Edge; 2]>,
}

impl BasicBlock {
    /// Creates a new empty basic block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the block has no instructions.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Returns the first instruction.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&Instruction> {
        self.insts.first()
    }

    /// Iterates over the predecessors reached through forward edges.
    pub fn forward_preds(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.preds.iter().filter(|e| !e.is_back()).map(|e| e.block)
    }

    /// Iterates over the successors reached through forward edges.
    pub fn forward_succs(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.succs.iter().filter(|e| !e.is_back()).map(|e| e.block)
    }
}
