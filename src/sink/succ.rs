//! Picks the block an instruction's definitions should move to.

use super::{Sinker, SuccCache};
use crate::mir::{BlockId, Function, InstId, Reg, VirtReg};

/// Non-debug use operands of a register, as (instruction, operand index)
/// pairs. An instruction reading the register twice yields two pairs.
fn nondbg_use_operands(func: &Function, reg: VirtReg) -> Vec<(InstId, usize)> {
    let mut out = Vec::new();
    let mut seen = Vec::new();
    for &user in func.uses_of(reg) {
        if func.inst(user).is_dbg_value() || seen.contains(&user) {
            continue;
        }
        seen.push(user);
        for (i, op) in func.inst(user).operands.iter().enumerate() {
            if let Some(op) = op.as_reg() {
                if !op.is_def && op.reg == Reg::Virtual(reg) {
                    out.push((user, i));
                }
            }
        }
    }
    out
}

impl<'a> Sinker<'a> {
    /// Whether every use of `reg` sits in a block dominated by `block`.
    ///
    /// Sets `break_phi_edge` when all uses are merge-point inputs in `block`
    /// arriving along the `def_block` edge; the definition may then move once
    /// that edge is broken. Sets `local_use` on a use inside `def_block`
    /// itself, which rules the move out for good.
    pub(super) fn all_uses_dominated_by(
        &self,
        func: &Function,
        reg: VirtReg,
        block: BlockId,
        def_block: BlockId,
        break_phi_edge: &mut bool,
        local_use: &mut bool,
    ) -> bool {
        let uses = nondbg_use_operands(func, reg);
        if uses.is_empty() {
            return true;
        }

        if uses.iter().all(|&(user, i)| {
            let inst = func.inst(user);
            inst.block == block && inst.is_phi() && inst.phi_incoming_block(i) == def_block
        }) {
            *break_phi_edge = true;
            return true;
        }

        for (user, i) in uses {
            let inst = func.inst(user);
            let use_block = if inst.is_phi() {
                // Merge points use the value at the end of the incoming edge.
                inst.phi_incoming_block(i)
            } else if inst.block == def_block {
                *local_use = true;
                return false;
            } else {
                inst.block
            };

            if !self.dom.dominates(block, use_block) {
                return false;
            }
        }

        true
    }

    /// Candidate target blocks for `block`, most attractive first: its CFG
    /// successors plus, for the instruction's own block, join points it
    /// immediately dominates. Colder blocks sort earlier; a frequency of 0
    /// means no reliable data, and such pairs rank by loop depth instead.
    pub(super) fn all_sorted_successors(
        &self,
        func: &Function,
        id: InstId,
        block: BlockId,
        cache: &mut SuccCache,
    ) -> Vec<BlockId> {
        if let Some(cached) = cache.get(&block) {
            return cached.clone();
        }

        let mut succs = func.block(block).succs.clone();

        // A definition can also sink past a diamond into a join point the
        // defining block immediately dominates, even though the join is not a
        // successor.
        if block == func.inst(id).block {
            for &child in self.dom.children_of(block) {
                if !succs.contains(&child) {
                    succs.push(child);
                }
            }
        }

        match self.freq.as_ref() {
            Some(freq) => succs.sort_by(|&a, &b| {
                let (fa, fb) = (freq.freq(a), freq.freq(b));
                if fa != 0 && fb != 0 {
                    fa.cmp(&fb)
                } else {
                    self.loops.depth(a).cmp(&self.loops.depth(b))
                }
            }),
            None => succs.sort_by_key(|&s| self.loops.depth(s)),
        }

        cache.insert(block, succs.clone());
        succs
    }

    /// Walk the operands and find the one block every definition can move to,
    /// if it exists and pays off.
    pub(super) fn find_succ_to_sink_to(
        &mut self,
        func: &Function,
        id: InstId,
        block: BlockId,
        break_phi_edge: &mut bool,
        cache: &mut SuccCache,
        depth: usize,
    ) -> Option<BlockId> {
        let mut succ_to_sink_to: Option<BlockId> = None;

        for i in 0..func.inst(id).operands.len() {
            let op = match func.inst(id).operands[i].as_reg() {
                Some(op) => *op,
                None => continue,
            };

            match op.reg {
                Reg::Physical(reg) => {
                    if !op.is_def {
                        // Reads of ambient constant registers move freely;
                        // anything else may be clobbered along the way.
                        if !self.target.is_constant_phys_reg(reg) {
                            return None;
                        }
                    } else if !op.is_dead {
                        return None;
                    }
                }
                Reg::Virtual(reg) => {
                    if !op.is_def {
                        continue;
                    }
                    if !self.target.is_safe_to_move_class_defs(func.vreg_class(reg)) {
                        return None;
                    }

                    if let Some(succ) = succ_to_sink_to {
                        // A previous definition already picked the block; this
                        // one must fit there too.
                        let mut local_use = false;
                        if !self.all_uses_dominated_by(
                            func,
                            reg,
                            succ,
                            block,
                            break_phi_edge,
                            &mut local_use,
                        ) {
                            return None;
                        }
                        continue;
                    }

                    for cand in self.all_sorted_successors(func, id, block, cache) {
                        let mut local_use = false;
                        if self.all_uses_dominated_by(
                            func,
                            reg,
                            cand,
                            block,
                            break_phi_edge,
                            &mut local_use,
                        ) {
                            succ_to_sink_to = Some(cand);
                            break;
                        }
                        if local_use {
                            return None;
                        }
                    }

                    let succ = succ_to_sink_to?;
                    if !self.is_profitable_to_sink_to(func, reg, id, block, succ, cache, depth) {
                        return None;
                    }
                }
            }
        }

        let succ = succ_to_sink_to?;

        // Single-block loops offer this; it is not a sink.
        if succ == block {
            return None;
        }

        // Control flow into an exception entry or an indirect branch target
        // is partly implicit; nothing may move there.
        if func.block(succ).is_eh_entry || func.block(succ).is_indirect_target {
            return None;
        }

        Some(succ)
    }
}
