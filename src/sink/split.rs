//! Scheduling of critical-edge splits. Edges are only recorded here; the
//! driver performs the splits in a batch once the sweep finishes.

use crate::analysis::edge_prob;
use crate::mir::{BlockId, Function, InstId, Reg};

use super::Sinker;

impl<'a> Sinker<'a> {
    /// Whether unlocking the sink of `id` justifies a new block on the
    /// `from -> to` edge.
    fn is_worth_breaking_edge(
        &mut self,
        func: &Function,
        id: InstId,
        from: BlockId,
        to: BlockId,
    ) -> bool {
        // An edge already considered this sweep is worth it again; that lets
        // several cheap instructions pile into the same new block.
        if !self.ceb_candidates.insert((from, to)) {
            return true;
        }

        let inst = func.inst(id);
        if !inst.is_copy() && !self.target.is_cheap_as_move(inst) {
            return true;
        }

        // A cold enough edge is worth splitting even for a cheap instruction.
        if func.block(from).succs.contains(&to)
            && edge_prob(func, from, to) <= self.options.split_edge_probability_threshold
        {
            return true;
        }

        // Cheap and on a warm edge. Still worth it when this instruction is
        // the lone user of a value defined in the same block, since the pair
        // can then sink together.
        for op in inst.uses() {
            let v = match op.reg {
                Reg::Virtual(v) => v,
                Reg::Physical(_) => continue,
            };
            if func.has_one_nondbg_use(v) {
                if let Some(def) = func.def_of(v) {
                    if func.inst(def).block == inst.block {
                        return true;
                    }
                }
            }
        }

        false
    }

    /// Record `from -> to` for splitting at the end of the sweep, if legal
    /// and worthwhile. Returns whether the split was scheduled.
    pub(super) fn postpone_split_edge(
        &mut self,
        func: &Function,
        id: InstId,
        from: BlockId,
        to: BlockId,
        break_phi_edge: bool,
    ) -> bool {
        if !self.is_worth_breaking_edge(func, id, from, to) {
            return false;
        }

        // Never break back edges. from == to is the single-block loop case.
        if !self.options.split_critical_edges || from == to {
            return false;
        }
        if self.loops.loop_for(from) == self.loops.loop_for(to) && self.loops.is_header(to) {
            return false;
        }

        // The new block must dominate every use reached through `to`. That
        // holds exactly when the other predecessors of `to` are dominated by
        // `to` itself; otherwise a path bypassing `from` could reach a use
        // without passing the computation. Merge-point inputs are exempt,
        // they are only read along their own edge.
        if !break_phi_edge {
            for &pred in func.block(to).preds.iter() {
                if pred == from {
                    continue;
                }
                if !self.dom.dominates(to, pred) {
                    return false;
                }
            }
        }

        if self.to_split_set.insert((from, to)) {
            self.to_split.push((from, to));
        }

        true
    }
}
