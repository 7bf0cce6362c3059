//! Functions and control flow graph traversal.

use crate::{BasicBlock, BlockId, Edge, EdgeKind, Instruction, Schedule};
use gpusched_data_structures::{BitSet, index::IndexVec};
use std::fmt;

/// A function: a control flow graph of basic blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// All basic blocks in this function.
    pub blocks: IndexVec<BlockId, BasicBlock>,
    /// The entry block.
    pub entry: BlockId,
}

impl Function {
    /// Creates a new function with an empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = IndexVec::new();
        let entry = blocks.push(BasicBlock::new());
        Self { name: name.into(), blocks, entry }
    }

    /// Returns the basic block for the given ID.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Returns a mutable reference to the basic block.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    /// Allocates a new basic block.
    pub fn alloc_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::new())
    }

    /// Adds a control flow edge. The edge is a forward edge until [`classify_edges`] runs.
    ///
    /// [`classify_edges`]: Self::classify_edges
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].succs.push(Edge { block: to, kind: EdgeKind::Forward });
        self.blocks[to].preds.push(Edge { block: from, kind: EdgeKind::Forward });
    }

    /// Returns the total number of instructions.
    #[must_use]
    pub fn num_insts(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Iterates over all instructions, in block order.
    pub fn insts(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| &b.insts)
    }

    /// Resets every instruction to the default schedule.
    pub fn reset_schedules(&mut self) {
        for inst in self.blocks.iter_mut().flat_map(|b| &mut b.insts) {
            inst.sched = Schedule::default();
        }
    }

    /// Marks every edge as forward or back.
    ///
    /// An edge is a back edge if, during a depth-first search starting at the entry, its target is
    /// still on the search stack when the edge is traversed. Blocks unreachable from the entry
    /// start their own searches, in index order.
    pub fn classify_edges(&mut self) {
        let back_edges = self.depth_first().back_edges;
        for block in self.blocks.iter_mut() {
            for edge in block.succs.iter_mut().chain(block.preds.iter_mut()) {
                edge.kind = EdgeKind::Forward;
            }
        }
        for (from, slot) in back_edges {
            let to = self.blocks[from].succs[slot].block;
            self.blocks[from].succs[slot].kind = EdgeKind::Back;
            for pred in self.blocks[to].preds.iter_mut().filter(|e| e.block == from) {
                pred.kind = EdgeKind::Back;
            }
            tracing::trace!(%from, %to, "back edge");
        }
    }

    /// Returns the blocks in reverse post-order of the depth-first search used by
    /// [`classify_edges`](Self::classify_edges).
    ///
    /// Every block appears after all of its predecessors over forward edges.
    #[must_use]
    pub fn reverse_post_order(&self) -> Vec<BlockId> {
        let mut order = self.depth_first().post_order;
        order.reverse();
        order
    }

    fn depth_first(&self) -> DepthFirst {
        let n = self.blocks.len();
        let mut visited = BitSet::new(n);
        let mut on_stack = BitSet::new(n);
        let mut dfs = DepthFirst { post_order: Vec::with_capacity(n), back_edges: Vec::new() };
        let mut stack: Vec<(BlockId, usize)> = Vec::new();

        for root in std::iter::once(self.entry).chain(self.blocks.indices()) {
            if !visited.set(root.index()) {
                continue;
            }
            on_stack.set(root.index());
            stack.push((root, 0));
            while let Some(top) = stack.last_mut() {
                let (block, slot) = *top;
                top.1 += 1;
                match self.blocks[block].succs.get(slot) {
                    Some(edge) => {
                        let succ = edge.block.index();
                        if on_stack.test(succ) {
                            dfs.back_edges.push((block, slot));
                        } else if visited.set(succ) {
                            on_stack.set(succ);
                            stack.push((edge.block, 0));
                        }
                    }
                    None => {
                        stack.pop();
                        on_stack.clear(block.index());
                        dfs.post_order.push(block);
                    }
                }
            }
        }
        dfs
    }
}

struct DepthFirst {
    post_order: Vec<BlockId>,
    /// `(source, successor slot)` of every back edge.
    back_edges: Vec<(BlockId, usize)>,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} {{", self.name)?;
        for (id, block) in self.blocks.iter_enumerated() {
            write!(f, "{id}")?;
            for (i, edge) in block.succs.iter().enumerate() {
                f.write_str(if i == 0 { " -> " } else { ", " })?;
                write!(f, "{}", edge.block)?;
                if edge.is_back() {
                    f.write_str(" (back)")?;
                }
            }
            writeln!(f, ":")?;
            for inst in &block.insts {
                writeln!(f, "    {}  {inst}", inst.sched)?;
            }
        }
        f.write_str("}")
    }
}
