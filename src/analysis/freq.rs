use super::LoopInfo;
use crate::mir::{BlockId, Function, Prob};

pub const ENTRY_FREQ: u64 = 1 << 14;

/// Probability of the edge `from -> to`, summed over duplicate edges. Zero
/// if `to` is not a successor of `from`.
pub fn edge_prob(func: &Function, from: BlockId, to: BlockId) -> Prob {
    let block = func.block(from);
    let mut total = 0;
    for (succ, prob) in block.succs.iter().zip(block.succ_probs.iter()) {
        if *succ == to {
            total += prob.0;
        }
    }
    Prob(total.min(Prob::SCALE))
}

/// Estimated execution frequency per block, as scaled integers. Mass flows
/// from the entry along forward edges only; blocks inside loops are then
/// scaled up per nesting level. Only the ordering and the zero/nonzero
/// reliability of these numbers matter to consumers.
#[derive(Debug)]
pub struct BlockFreq {
    freq: Vec<u64>,
}

impl BlockFreq {
    pub fn compute(func: &Function, loops: &LoopInfo) -> BlockFreq {
        let n = func.num_blocks();

        // Reverse postorder so every forward predecessor is final before its
        // successors are summed.
        let mut postorder = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        let mut stack = vec![(func.entry(), 0)];
        visited[func.entry().index()] = true;
        while let Some((id, child)) = stack.pop() {
            let succs = &func.block(id).succs;
            if child < succs.len() {
                stack.push((id, child + 1));
                let next = succs[child];
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    stack.push((next, 0));
                }
            } else {
                postorder.push(id);
            }
        }
        let mut rpo_index = vec![usize::MAX; n];
        for (i, &id) in postorder.iter().rev().enumerate() {
            rpo_index[id.index()] = i;
        }

        let mut freq = vec![0; n];
        freq[func.entry().index()] = ENTRY_FREQ;
        for &id in postorder.iter().rev() {
            if id == func.entry() {
                continue;
            }
            let mut total = 0;
            for &pred in func.block(id).preds.iter() {
                if rpo_index[pred.index()] < rpo_index[id.index()] {
                    total += edge_prob(func, pred, id).apply(freq[pred.index()]);
                }
            }
            freq[id.index()] = total;
        }

        for id in func.block_ids() {
            freq[id.index()] <<= 2 * loops.depth(id).min(16);
        }

        BlockFreq { freq }
    }

    /// Scaled frequency; 0 means no reliable data.
    pub fn freq(&self, block: BlockId) -> u64 {
        self.freq.get(block.index()).copied().unwrap_or(0)
    }

    /// Account for a split edge: the new block inherits the frequency that
    /// flowed along the edge it now carries.
    pub fn on_edge_split(&mut self, func: &Function, from: BlockId, new: BlockId) {
        self.freq.resize(func.num_blocks(), 0);
        self.freq[new.index()] = edge_prob(func, from, new).apply(self.freq(from));
    }
}
