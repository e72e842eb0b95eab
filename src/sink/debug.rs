//! Keeping debug annotations honest while values move. An annotation whose
//! value sinks either travels with it (as a clone at the new site, with the
//! original struck to undef), is redirected through a copy source, or is
//! struck entirely when neither is sound.

use std::collections::HashSet;

use super::Sinker;
use crate::mir::{BlockId, Function, InstId, Reg, VirtReg};

/// A debug annotation seen below the current scan point, plus whether a later
/// annotation of the same variable shadows it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SeenDbgUser {
    pub inst: InstId,
    pub shadowed: bool,
}

impl<'a> Sinker<'a> {
    /// Record a debug annotation during the bottom-up scan so the right ones
    /// travel if the value's definition sinks past them.
    pub(super) fn process_dbg_inst(&mut self, func: &Function, id: InstId) {
        let inst = func.inst(id);
        assert!(inst.is_dbg_value());
        let var = inst.var.expect("debug annotation must name a variable");

        let shadowed = self.seen_dbg_vars.contains(&var);
        if let Some(op) = inst.operands.first().and_then(|op| op.as_reg()) {
            if let Reg::Virtual(v) = op.reg {
                self.seen_dbg_users
                    .entry(v)
                    .or_default()
                    .push(SeenDbgUser { inst: id, shadowed });
            }
        }
        self.seen_dbg_vars.insert(var);
    }

    /// Annotations that must travel with `id`. Shadowed ones cannot move
    /// without re-ordering assignments of their variable, so they are
    /// redirected or struck on the spot.
    pub(super) fn collect_dbg_users(&mut self, func: &mut Function, id: InstId) -> Vec<InstId> {
        let defs: Vec<VirtReg> = func
            .inst(id)
            .defs()
            .filter_map(|op| op.reg.as_virtual())
            .collect();

        let mut to_sink = Vec::new();
        for v in defs {
            let users = match self.seen_dbg_users.get(&v) {
                Some(users) => users.clone(),
                None => continue,
            };
            for user in users {
                if user.shadowed {
                    if !attempt_debug_copy_prop(func, id, user.inst) {
                        func.set_dbg_value_undef(user.inst);
                    }
                } else {
                    to_sink.push(user.inst);
                }
            }
        }
        to_sink
    }

    /// After a copy sinks, annotations of its destination left behind may no
    /// longer be dominated by the definition. Point them at the copy source,
    /// which is still live at their site.
    pub(super) fn salvage_unsunk_debug_users_of_copy(
        &mut self,
        func: &mut Function,
        id: InstId,
        target: BlockId,
    ) {
        let src = match func.inst(id).copy_src() {
            Some(src) => src.reg,
            None => return,
        };
        let parent = func.inst(id).block;

        let defs: Vec<VirtReg> = func
            .inst(id)
            .defs()
            .filter_map(|op| op.reg.as_virtual())
            .collect();

        let mut stranded = Vec::new();
        for v in defs {
            for &user in func.uses_of(v) {
                let inst = func.inst(user);
                if !inst.is_dbg_value() || self.dom.dominates(target, inst.block) {
                    continue;
                }
                // Same-block users either sink along or become use-before-def
                // and are struck by the sink itself.
                if inst.block == parent {
                    continue;
                }
                stranded.push(user);
            }
        }

        for user in stranded {
            func.set_reg(user, 0, src);
        }
    }
}

/// Rather than striking a copy's annotation to undef, try pointing it at the
/// copy source. Forwarding across the virtual/physical divide is not
/// attempted, and a physical annotation must name the copy destination
/// exactly.
pub(crate) fn attempt_debug_copy_prop(func: &mut Function, sink: InstId, dbg: InstId) -> bool {
    let (dst, src) = match (func.inst(sink).copy_dst(), func.inst(sink).copy_src()) {
        (Some(dst), Some(src)) => (dst.reg, src.reg),
        _ => return false,
    };
    let dbg_reg = match func.inst(dbg).operands.first().and_then(|op| op.as_reg()) {
        Some(op) => op.reg,
        None => return false,
    };

    if dbg_reg.is_virtual() != src.is_virtual() {
        return false;
    }
    if dbg_reg.is_physical() && dbg_reg != dst {
        return false;
    }

    func.set_reg(dbg, 0, src);
    true
}

/// Move `id` to `pos` in `to`, bringing `dbg_to_sink` annotations along as
/// clones and striking the originals (or forwarding them through a sunk
/// copy). The moved instruction keeps its source location only when it
/// matches its new neighbour's, so debug tooling is never pointed at a line
/// the flow no longer visits.
pub(crate) fn perform_sink(
    func: &mut Function,
    id: InstId,
    to: BlockId,
    pos: usize,
    dbg_to_sink: &[InstId],
) {
    let loc = func
        .block(to)
        .insts
        .get(pos)
        .map(|&next| func.inst(next).loc)
        .filter(|&loc| loc == func.inst(id).loc)
        .flatten();
    func.inst_mut(id).loc = loc;

    func.splice(id, to, pos);

    let mut at = func.pos_in_block(id) + 1;
    let mut seen: HashSet<InstId> = HashSet::new();
    for &dbg in dbg_to_sink {
        if !seen.insert(dbg) {
            continue;
        }
        let clone = func.inst(dbg).clone();
        func.insert_inst(to, at, clone);
        at += 1;

        if !attempt_debug_copy_prop(func, id, dbg) {
            func.set_dbg_value_undef(dbg);
        }
    }
}
