//! Machine-level instruction sinking.
//!
//! Moves instructions downward through a function's control-flow graph so
//! they only execute on paths that need their results. Two entry points:
//! [`sink::sink`] for the pre-allocation pass over virtual registers, and
//! [`postra::sink_copies`] for the post-allocation copy sinker.

pub mod analysis;
pub mod mir;
pub mod postra;
pub mod sink;
pub mod target;
