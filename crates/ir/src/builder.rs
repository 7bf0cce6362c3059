//! Function builder.

use crate::{BlockId, DataType, Function, InstFlags, Instruction, Op, Operand};

/// A builder for constructing functions.
///
/// Instructions are appended to the current block and numbered in creation order.
pub struct FunctionBuilder<'a> {
    /// The function being built.
    func: &'a mut Function,
    /// The current block.
    current_block: BlockId,
    next_serial: u32,
}

impl<'a> FunctionBuilder<'a> {
    /// Creates a new function builder positioned at the entry block.
    pub fn new(func: &'a mut Function) -> Self {
        let current_block = func.entry;
        let next_serial = func.num_insts() as u32;
        Self { func, current_block, next_serial }
    }

    /// Returns the current block.
    #[must_use]
    pub const fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Switches to a different block.
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    /// Creates a new basic block.
    pub fn create_block(&mut self) -> BlockId {
        self.func.alloc_block()
    }

    /// Adds a control flow edge.
    pub fn edge(&mut self, from: BlockId, to: BlockId) {
        self.func.add_edge(from, to);
    }

    /// Appends `inst` to the current block, returning its index within the block.
    pub fn push(&mut self, mut inst: Instruction) -> usize {
        inst.serial = self.next_serial;
        self.next_serial += 1;
        let insts = &mut self.func.blocks[self.current_block].insts;
        insts.push(inst);
        insts.len() - 1
    }

    /// Appends a new instruction.
    pub fn inst(&mut self, op: Op, dtype: DataType, defs: &[Operand], srcs: &[Operand]) -> usize {
        self.push(
            Instruction::new(op, dtype).with_defs(defs.iter().copied()).with_srcs(srcs.iter().copied()),
        )
    }

    /// Emits `mov dst, src`.
    pub fn mov(&mut self, dst: u32, src: Operand) -> usize {
        self.inst(Op::Mov, DataType::U32, &[Operand::gpr(dst)], &[src])
    }

    /// Emits a 32-bit integer add.
    pub fn add(&mut self, dst: u32, a: u32, b: u32) -> usize {
        self.inst(Op::Add, DataType::U32, &[Operand::gpr(dst)], &[Operand::gpr(a), Operand::gpr(b)])
    }

    /// Emits a 32-bit global load `ld dst, [addr]`.
    pub fn ld(&mut self, dst: u32, addr: u32) -> usize {
        self.inst(Op::Ld, DataType::U32, &[Operand::gpr(dst)], &[Operand::gpr(addr)])
    }

    /// Emits a 32-bit global store `st [addr], value`.
    pub fn st(&mut self, addr: u32, value: u32) -> usize {
        self.inst(Op::St, DataType::U32, &[], &[Operand::gpr(addr), Operand::gpr(value)])
    }

    /// Emits a branch.
    pub fn bra(&mut self) -> usize {
        self.inst(Op::Bra, DataType::U32, &[], &[])
    }

    /// Emits `exit`.
    pub fn exit(&mut self) -> usize {
        self.inst(Op::Exit, DataType::U32, &[], &[])
    }

    /// Marks the instruction at `index` in the current block as a reconvergence point.
    pub fn mark_join(&mut self, index: usize) {
        self.func.blocks[self.current_block].insts[index].flags |= InstFlags::JOIN;
    }

    /// Finishes building, classifying control flow edges.
    pub fn finish(self) {
        self.func.classify_edges();
    }
}
