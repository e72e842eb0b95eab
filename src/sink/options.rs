use crate::mir::Prob;

/// Tuning knobs for the pre-allocation pass. `Default` gives the stock
/// configuration; embedders override fields as needed.
#[derive(Clone, Debug)]
pub struct SinkOptions {
    /// Break critical edges when doing so unblocks a sink.
    pub split_critical_edges: bool,
    /// Consult block frequencies when deciding whether a split pays off.
    pub use_block_frequency: bool,
    /// Edges at most this likely may be broken for non-cheap instructions.
    pub split_edge_probability_threshold: Prob,
    /// Give up a store-interference scan after this many instructions in one
    /// block.
    pub load_sink_inst_threshold: usize,
    /// Give up a store-interference scan after visiting this many blocks.
    pub load_sink_block_threshold: usize,
    /// Sink loop-invariant definitions out of preheaders and into their
    /// loops.
    pub enable_loop_sink: bool,
    /// Candidates considered per loop when loop sinking is on.
    pub loop_sink_limit: usize,
}

impl Default for SinkOptions {
    fn default() -> SinkOptions {
        SinkOptions {
            split_critical_edges: true,
            use_block_frequency: true,
            split_edge_probability_threshold: Prob::from_percent(40),
            load_sink_inst_threshold: 2000,
            load_sink_block_threshold: 20,
            enable_loop_sink: false,
            loop_sink_limit: 50,
        }
    }
}

/// What a run changed, for logs and tests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SinkStats {
    pub sunk: u32,
    pub coalesced: u32,
    pub edges_split: u32,
    pub loop_sunk: u32,
}

impl SinkStats {
    pub fn changed(&self) -> bool {
        *self != SinkStats::default()
    }
}
