//! Register-allocated machine IR.
//!
//! This is the input of the scheduling pass: a control flow graph of basic blocks holding
//! instructions whose operands already name physical registers. Every instruction carries a
//! [`Schedule`], the control information the scheduler computes for it.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

use gpusched_data_structures::newtype_index;

mod operand;
pub use operand::{NUM_GPRS, NUM_PREDICATES, Operand, PT, RZ, RegFile};

mod op;
pub use op::{DataType, Op, OpClass};

mod inst;
pub use inst::{InstFlags, Instruction};

mod schedule;
pub use schedule::{BarrierId, BarrierMask, NUM_BARRIERS, ReuseMask, Schedule};

mod block;
pub use block::{BasicBlock, Edge, EdgeKind};

mod function;
pub use function::Function;

mod builder;
pub use builder::FunctionBuilder;

mod display;
pub use display::function_to_dot;

newtype_index! {
    /// A unique identifier for a basic block in a [`Function`].
    pub struct BlockId;
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.get())
    }
}
