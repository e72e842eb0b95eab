//! The optional loop-sinking phase: moves loop-invariant definitions from a
//! preheader down into the loop, trading recomputation for shorter live
//! ranges when the values are only consumed by copies inside.

use log::debug;

use super::Sinker;
use crate::analysis::LoopId;
use crate::mir::{BlockId, Function, Inst, InstId, Reg};
use crate::target::Target;

/// A load is rematerialisable inside the loop only when its source region
/// cannot change. An access the target cannot decode is not provably
/// read-only.
fn may_load_from_read_only(target: &dyn Target, inst: &Inst) -> bool {
    match target.mem_operand(inst) {
        Some(mem) => mem.base.is_read_only(),
        None => false,
    }
}

impl<'a> Sinker<'a> {
    pub(super) fn sink_into_loops(&mut self, func: &mut Function) -> bool {
        let mut changed = false;

        for l in self.loops.top_level_loops().collect::<Vec<_>>() {
            let preheader = match self.loops.preheader(l, func) {
                Some(preheader) => preheader,
                None => {
                    debug!("loop sink: loop at b{} has no preheader", self.loops.get(l).header.0);
                    continue;
                }
            };

            let candidates = self.find_loop_sink_candidates(func, l, preheader);

            // Walk in reverse so the tail of a def-use chain moves first.
            let mut considered = 0;
            for &cand in candidates.iter().rev() {
                if considered == self.options.loop_sink_limit {
                    debug!("loop sink: candidate limit reached");
                    break;
                }
                considered += 1;

                if !self.sink_into_loop(func, l, preheader, cand) {
                    break;
                }
                self.stats.loop_sunk += 1;
                changed = true;
            }
        }

        changed
    }

    fn find_loop_sink_candidates(
        &self,
        func: &Function,
        l: LoopId,
        preheader: BlockId,
    ) -> Vec<InstId> {
        let mut candidates = Vec::new();

        for &id in func.block(preheader).insts.iter() {
            let inst = func.inst(id);
            if !self.target.should_sink(inst) {
                continue;
            }
            if !self.is_loop_invariant(func, l, id) {
                continue;
            }
            let mut saw_store = true;
            if !inst.is_safe_to_move(&mut saw_store) {
                continue;
            }
            if inst.may_load() && !may_load_from_read_only(self.target, inst) {
                continue;
            }
            if inst.is_convergent() {
                continue;
            }

            // The candidate's first operand must define a virtual register.
            let def = match inst.operands.first().and_then(|op| op.as_reg()) {
                Some(op) if op.is_def => *op,
                _ => continue,
            };
            let v = match def.reg {
                Reg::Virtual(v) => v,
                Reg::Physical(_) => continue,
            };
            if func.def_of(v) != Some(id) {
                continue;
            }

            candidates.push(id);
        }

        candidates
    }

    fn is_loop_invariant(&self, func: &Function, l: LoopId, id: InstId) -> bool {
        for op in func.inst(id).reg_operands() {
            match op.reg {
                Reg::Physical(reg) => {
                    if op.is_def || !self.target.is_constant_phys_reg(reg) {
                        return false;
                    }
                }
                Reg::Virtual(v) => {
                    if op.is_def {
                        continue;
                    }
                    if let Some(def) = func.def_of(v) {
                        if self.loops.contains(l, func.inst(def).block) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Move one candidate to the nearest common dominator of its in-loop
    /// uses. Bails unless every use is a copy inside the loop.
    fn sink_into_loop(
        &mut self,
        func: &mut Function,
        l: LoopId,
        preheader: BlockId,
        id: InstId,
    ) -> bool {
        let v = match func.inst(id).operands[0].as_reg().and_then(|op| op.reg.as_virtual()) {
            Some(v) => v,
            None => return false,
        };

        let mut sink_block: Option<BlockId> = None;
        for &user in func.uses_of(v) {
            let inst = func.inst(user);
            if !self.loops.contains(l, inst.block) {
                debug!("loop sink: v{} used outside the loop", v.0);
                return false;
            }
            // No cost model yet; only copies are assumed cheaper than the
            // register they would otherwise hold.
            if !inst.is_copy() {
                return false;
            }
            sink_block = match sink_block {
                None => Some(inst.block),
                Some(sofar) => match self.dom.nearest_common_dominator(sofar, inst.block) {
                    Some(nca) => Some(nca),
                    None => return false,
                },
            };
        }

        let sink_block = match sink_block {
            Some(sink_block) => sink_block,
            None => return false,
        };
        if sink_block == preheader {
            return false;
        }
        if func.nondbg_len(sink_block) > self.options.load_sink_inst_threshold {
            return false;
        }

        debug!("loop sink: moving v{} def into b{}", v.0, sink_block.0);
        let pos = func.first_non_phi(sink_block);
        func.splice(id, sink_block, pos);

        // The instruction left its source position for good.
        func.inst_mut(id).loc = None;
        true
    }
}
