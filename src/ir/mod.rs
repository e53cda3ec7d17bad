//! The instruction graph every pass operates on.
//!
//! A method is one [`Graph`]: basic blocks holding typed SSA instructions,
//! with def-use lists maintained in both directions. Blocks and instructions
//! are stored in arenas and referenced by the dense indices [`BlockId`] and
//! [`InstrId`], so passes hold plain copyable handles instead of references.
//!
//! # Building a graph
//!
//! ```rust
//! use optigraph::ir::{BinaryOp, DataType, Graph, InstructionKind};
//!
//! let mut graph = Graph::new("add_one");
//! let x = graph.add_parameter(DataType::Int32)?;
//! let one = graph.int_constant(1)?;
//! let entry = graph.entry_block();
//! let sum = graph.append(entry, InstructionKind::Binary(BinaryOp::Add), DataType::Int32, vec![x, one])?;
//! graph.append(entry, InstructionKind::Return, DataType::Void, vec![sum])?;
//! graph.set_exit_block(entry);
//! graph.rebuild_analyses()?;
//! graph.verify()?;
//! # Ok::<(), optigraph::Error>(())
//! ```
//!
//! # Derived data
//!
//! Reverse post-order, dominators and loops are derived from the block
//! structure by [`Graph::rebuild_analyses`]. Adding blocks or edges marks them
//! stale; [`Graph::check_analyses`] reports stale data as an error instead of
//! letting a pass consume it.

mod block;
mod constant;
mod cursor;
mod display;
mod dominators;
mod graph;
mod instruction;
mod loops;
mod ops;
mod side_effects;
mod types;
mod verify;

pub use block::{BasicBlock, BlockId};
pub use constant::{convert, evaluate_binary, evaluate_compare, evaluate_condition, evaluate_unary, ConstValue};
pub use cursor::InstructionCursor;
pub use graph::Graph;
pub use instruction::{Environment, InstrId, Instruction, Use};
pub use loops::{LoopId, LoopInformation, LoopTransformDecision};
pub use ops::{
    AccumulateOp, BinaryOp, ComparisonBias, ConditionKind, FieldInfo, InstructionKind, MonitorKind,
    ReadBarrierState, UnaryOp, VectorShape, WriteBarrierKind,
};
pub use side_effects::SideEffects;
pub use types::DataType;
