use super::{InstId, LaneMask, PhysReg};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A branch probability, scaled to parts per million.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Prob(pub u32);

impl Prob {
    pub const SCALE: u32 = 1_000_000;

    pub const NEVER: Prob = Prob(0);
    pub const ALWAYS: Prob = Prob(Prob::SCALE);

    pub fn from_percent(percent: u32) -> Prob {
        assert!(percent <= 100);
        Prob(percent * (Prob::SCALE / 100))
    }

    /// Uniform probability over `n` outcomes.
    pub fn even(n: usize) -> Prob {
        assert!(n > 0);
        Prob(Prob::SCALE / n as u32)
    }

    pub fn complement(self) -> Prob {
        Prob(Prob::SCALE - self.0)
    }

    /// Scale a frequency by this probability.
    pub fn apply(self, freq: u64) -> u64 {
        freq * self.0 as u64 / Prob::SCALE as u64
    }
}

/// A physical register live into a block, with the lanes that carry values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LiveIn {
    pub reg: PhysReg,
    pub mask: LaneMask,
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    /// Ordered instruction sequence; merge points come first.
    pub insts: Vec<InstId>,
    pub succs: Vec<BlockId>,
    /// Edge probabilities, parallel to `succs`.
    pub succ_probs: Vec<Prob>,
    pub preds: Vec<BlockId>,
    pub live_ins: Vec<LiveIn>,
    /// Exception-handling entry; control flow into it is implicit.
    pub is_eh_entry: bool,
    /// Indirect branch target; instructions must not move into it.
    pub is_indirect_target: bool,
}

impl Block {
    pub fn is_live_in(&self, reg: PhysReg) -> bool {
        self.live_ins.iter().any(|li| li.reg == reg)
    }
}
