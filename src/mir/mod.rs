//! The machine-level IR the sinking passes operate on: a graph of basic
//! blocks holding ordered instructions over virtual and physical registers.
//!
//! Blocks and instructions live in arenas inside [`Function`] and are
//! addressed by stable ids. A block's instruction sequence is a plain list of
//! ids, so detaching an instruction from one block and splicing it into
//! another never invalidates any other id.

pub use block::{Block, BlockId, LiveIn, Prob};
pub use build::FuncBuilder;
pub use func::Function;
pub use inst::{
    DebugLoc, DebugVar, Inst, InstFlags, InstId, MemBase, MemOperand, Opcode, Operand, RegOperand,
};
pub use reg::{LaneMask, PhysReg, Reg, RegClassId, RegUnit, VirtReg};

mod block;
mod build;
mod func;
mod inst;
mod reg;
