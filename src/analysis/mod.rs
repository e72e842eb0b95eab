//! Derived read-only views of the function graph. Each is computed from the
//! graph as it stands and stays valid until the next structural edit; the
//! sinking pass rebuilds them at sweep boundaries, never mid-sweep.

pub use alias::{insts_may_alias, AliasQuery, BaseOffsetAlias, ConservativeAlias};
pub use dom::{DomTree, PostDomTree};
pub use freq::{edge_prob, BlockFreq, ENTRY_FREQ};
pub use loops::{Loop, LoopId, LoopInfo};

mod alias;
mod dom;
mod freq;
mod loops;
