//! Static issue scheduling for in-order GPU pipelines.
//!
//! The target issues instructions in program order but completes them at varying latencies and
//! detects no hazards on its own. [`Scheduler`] computes, for every instruction of a
//! register-allocated [`Function`](gpusched_ir::Function), a [`Schedule`](gpusched_ir::Schedule):
//! how long to stall before issuing the next instruction, which dependency barriers the
//! instruction signals and waits on, and which operands to keep in the reuse cache.
//!
//! [`verify_function`] independently checks a scheduled function for hazards.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub use gpusched_config::{SchedMode, SchedOpts};

mod target;
pub use target::{Maxwell, Target};

mod scoreboard;
pub use scoreboard::{PREDICATE_LATENCY, Scoreboard};

mod barriers;
pub use barriers::{BarrierAllocator, find_first_def, find_first_use};

mod stall;

mod reuse;

mod scheduler;
pub use scheduler::{SchedStats, Scheduler};

mod verify;
pub use verify::{HazardError, verify_function};
