//! Decides whether a legal sink actually pays off.

use log::debug;

use super::{Sinker, SuccCache};
use crate::mir::{BlockId, Function, InstId, Reg, RegClassId, VirtReg};

/// Bound on the chained lookahead through follow-on sink targets.
const MAX_SINK_DEPTH: usize = 8;

impl<'a> Sinker<'a> {
    /// A sink to `succ` pays off when `succ` is off the unconditional path
    /// (not a post-dominator), or strictly shallower in the loop nest, or
    /// only feeds merge points there. Otherwise look one sink further: the
    /// move still helps if the instruction can keep sinking from `succ` next
    /// sweep. As a last resort, sinking inside a loop is allowed when it
    /// shortens live ranges without pushing `succ` over a pressure limit.
    pub(super) fn is_profitable_to_sink_to(
        &mut self,
        func: &Function,
        reg: VirtReg,
        id: InstId,
        block: BlockId,
        succ: BlockId,
        cache: &mut SuccCache,
        depth: usize,
    ) -> bool {
        if block == succ {
            return false;
        }
        if depth >= MAX_SINK_DEPTH {
            return false;
        }

        if !self.pdt.dominates(succ, block) {
            return true;
        }

        // Leaving a deeper loop is worth it even on the unconditional path.
        if self.loops.depth(block) > self.loops.depth(succ) {
            return true;
        }

        let mut non_phi_use = false;
        for user in func.nondbg_uses(reg) {
            let inst = func.inst(user);
            if inst.block == succ && !inst.is_phi() {
                non_phi_use = true;
            }
        }
        if !non_phi_use {
            return true;
        }

        // `succ` post-dominates us and holds a real use. Still worthwhile if
        // the instruction can sink onward from there in a later sweep.
        let mut break_phi_edge = false;
        if let Some(next) =
            self.find_succ_to_sink_to(func, id, succ, &mut break_phi_edge, cache, depth + 1)
        {
            return self.is_profitable_to_sink_to(func, reg, id, succ, next, cache, depth + 1);
        }

        // `succ` is the final stop. Outside a loop that is a plain loss.
        let cycle = match self.loops.loop_for(block) {
            Some(cycle) => cycle,
            None => return false,
        };

        // Inside a loop, sinking shortens live ranges. Allow it unless a used
        // register defined in the loop would push a pressure limit in `succ`.
        for i in 0..func.inst(id).operands.len() {
            let op = match func.inst(id).operands[i].as_reg() {
                Some(op) => *op,
                None => continue,
            };
            let v = match op.reg {
                Reg::Virtual(v) => v,
                Reg::Physical(_) => return false,
            };

            if op.is_def {
                let mut local_use = false;
                if !self.all_uses_dominated_by(
                    func,
                    v,
                    succ,
                    block,
                    &mut break_phi_edge,
                    &mut local_use,
                ) {
                    return false;
                }
            } else {
                let def = match func.def_of(v) {
                    Some(def) => def,
                    None => continue,
                };
                let def_block = func.inst(def).block;

                // Values from outside the loop, or merged at its header, are
                // live across the whole loop anyway.
                if self.loops.loop_for(def_block) != Some(cycle)
                    || (func.inst(def).is_phi() && self.loops.is_header(def_block))
                {
                    continue;
                }

                if self.pressure_exceeds_limit(func, func.vreg_class(v), succ) {
                    debug!("register pressure limit in b{}, not profitable", succ.0);
                    return false;
                }
            }
        }

        true
    }

    fn pressure_exceeds_limit(
        &mut self,
        func: &Function,
        class: RegClassId,
        block: BlockId,
    ) -> bool {
        let rc = *self.target.reg_class(class);
        rc.weight + self.bb_pressure(func, block)[class.0] >= rc.limit
    }

    /// Maximum register pressure per class inside `block`, from a backward
    /// scan of its live virtual registers. Memoised until the block changes.
    fn bb_pressure(&mut self, func: &Function, block: BlockId) -> &Vec<u32> {
        if !self.pressure_cache.contains_key(&block) {
            let pressure = self.compute_pressure(func, block);
            self.pressure_cache.insert(block, pressure);
        }
        &self.pressure_cache[&block]
    }

    fn compute_pressure(&self, func: &Function, block: BlockId) -> Vec<u32> {
        let mut live: Vec<VirtReg> = Vec::new();
        let mut cur = vec![0; self.target.num_reg_classes()];
        let mut max = vec![0; self.target.num_reg_classes()];

        for &id in func.block(block).insts.iter().rev() {
            let inst = func.inst(id);
            if inst.is_dbg_value() {
                continue;
            }

            for op in inst.reg_operands() {
                let v = match op.reg {
                    Reg::Virtual(v) => v,
                    Reg::Physical(_) => continue,
                };
                let class = func.vreg_class(v);
                let weight = self.target.reg_class(class).weight;

                if op.is_def {
                    // Going upward the value dies at its definition. A dead
                    // def still occupies a register for an instant.
                    match live.iter().position(|&l| l == v) {
                        Some(at) => {
                            live.swap_remove(at);
                            cur[class.0] -= weight;
                        }
                        None => max[class.0] = max[class.0].max(cur[class.0] + weight),
                    }
                } else if !live.contains(&v) {
                    live.push(v);
                    cur[class.0] += weight;
                    max[class.0] = max[class.0].max(cur[class.0]);
                }
            }
        }

        max
    }
}
