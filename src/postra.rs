//! The post-allocation copy sinker. Not a second general sinking pass: it
//! only moves renamable register copies into the single successor where
//! their destination is live-in, so copies of incoming arguments stop
//! executing on paths that never read them.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::mir::{BlockId, Function, InstId, LiveIn, PhysReg, RegUnit};
use crate::sink::debug::perform_sink;
use crate::target::Target;

/// Occupancy of register units, the currency of physical-register
/// interference. One bit per unit of the target's universe; two registers
/// conflict exactly when they share a unit.
#[derive(Debug)]
struct LiveRegUnits {
    units: Vec<bool>,
}

impl LiveRegUnits {
    fn new(target: &dyn Target) -> LiveRegUnits {
        LiveRegUnits {
            units: vec![false; target.num_reg_units()],
        }
    }

    fn clear(&mut self) {
        self.units.fill(false);
    }

    fn add(&mut self, target: &dyn Target, reg: PhysReg) {
        for unit in target.reg_units(reg) {
            self.units[unit.0 as usize] = true;
        }
    }

    /// Whether no unit of `reg` is occupied.
    fn available(&self, target: &dyn Target, reg: PhysReg) -> bool {
        target.reg_units(reg).iter().all(|unit| !self.units[unit.0 as usize])
    }
}

/// Sink renamable copies in every block of an allocated function. Returns
/// the number of copies moved.
pub fn sink_copies(func: &mut Function, target: &dyn Target) -> u32 {
    info!("post-allocation copy sinking: {}", func.name);

    let mut sinker = PostRaSinker {
        target,
        modified: LiveRegUnits::new(target),
        used: LiveRegUnits::new(target),
        seen_dbg: HashMap::new(),
    };

    let mut sunk = 0;
    for block in func.block_ids() {
        sunk += sinker.sink_copies_in_block(func, block);
    }
    sunk
}

struct PostRaSinker<'a> {
    target: &'a dyn Target,

    /// Units written between the scan point and the end of the block.
    modified: LiveRegUnits,
    /// Units read between the scan point and the end of the block.
    used: LiveRegUnits,
    /// Debug annotations below the scan point, per unit they read.
    seen_dbg: HashMap<RegUnit, Vec<InstId>>,
}

impl<'a> PostRaSinker<'a> {
    fn sink_copies_in_block(&mut self, func: &mut Function, block: BlockId) -> u32 {
        // Only successors with a lone predecessor can receive code without
        // new blocks or branches; live-in sets say which ones want the copy.
        let sinkable: HashSet<BlockId> = func
            .block(block)
            .succs
            .iter()
            .copied()
            .filter(|&s| !func.block(s).live_ins.is_empty() && func.block(s).preds.len() == 1)
            .collect();
        if sinkable.is_empty() {
            return 0;
        }

        self.modified.clear();
        self.used.clear();
        self.seen_dbg.clear();

        let mut sunk = 0;
        let snapshot = func.block(block).insts.clone();
        for id in snapshot.into_iter().rev() {
            let inst = func.inst(id);

            if inst.is_dbg_value() {
                let reg = inst
                    .operands
                    .first()
                    .and_then(|op| op.as_reg())
                    .and_then(|op| op.reg.as_physical());
                if let Some(reg) = reg {
                    // Pointless to accumulate annotations whose sink would be
                    // rejected anyway.
                    if self.register_dependency(func, id).is_none() {
                        continue;
                    }
                    for unit in self.target.reg_units(reg) {
                        self.seen_dbg.entry(unit).or_default().push(id);
                    }
                }
                continue;
            }

            // Nothing moves across a call; the rest of the block was already
            // handled, so stop here.
            if inst.is_call() {
                break;
            }

            let renamable = inst
                .copy_dst()
                .map_or(false, |dst| dst.is_renamable && dst.reg.is_physical());
            if !inst.is_copy() || !renamable {
                self.accumulate(func, id);
                continue;
            }

            let (used_ops, defed) = match self.register_dependency(func, id) {
                Some(deps) => deps,
                None => {
                    self.accumulate(func, id);
                    continue;
                }
            };

            let succ = match self.single_live_in_succ(func, block, &sinkable, &defed) {
                Some(succ) => succ,
                None => {
                    self.accumulate(func, id);
                    continue;
                }
            };

            // Annotations reading any unit this copy writes must come along.
            let mut dbg_to_sink: Vec<InstId> = Vec::new();
            for def in defed.iter() {
                for unit in self.target.reg_units(*def) {
                    for &dbg in self.seen_dbg.get(&unit).into_iter().flatten() {
                        if !dbg_to_sink.contains(&dbg) {
                            dbg_to_sink.push(dbg);
                        }
                    }
                }
            }

            self.take_over_kills(func, block, id, &used_ops);

            debug!("sink copy from b{} into b{}", block.0, succ.0);
            let pos = func.first_non_phi(succ);
            perform_sink(func, id, succ, pos, &dbg_to_sink);
            self.update_live_ins(func, id, succ, &used_ops, &defed);

            sunk += 1;
        }
        sunk
    }

    fn accumulate(&mut self, func: &Function, id: InstId) {
        for op in func.inst(id).reg_operands() {
            if let Some(reg) = op.reg.as_physical() {
                if op.is_def {
                    self.modified.add(self.target, reg);
                } else {
                    self.used.add(self.target, reg);
                }
            }
        }
    }

    /// Operand indices read and registers written by `id`, or None when a
    /// later instruction already touched one of them and the move would
    /// reorder the dependency.
    fn register_dependency(
        &self,
        func: &Function,
        id: InstId,
    ) -> Option<(Vec<usize>, Vec<PhysReg>)> {
        let mut used_ops = Vec::new();
        let mut defed = Vec::new();

        for (i, op) in func.inst(id).operands.iter().enumerate() {
            let op = match op.as_reg() {
                Some(op) => op,
                None => continue,
            };
            let reg = match op.reg.as_physical() {
                Some(reg) => reg,
                None => continue,
            };

            if op.is_def {
                if !self.modified.available(self.target, reg)
                    || !self.used.available(self.target, reg)
                {
                    return None;
                }
                defed.push(reg);
            } else {
                if !self.modified.available(self.target, reg) {
                    return None;
                }
                used_ops.push(i);
            }
        }

        Some((used_ops, defed))
    }

    /// The lone sinkable successor where every written register is live-in.
    /// None if the registers disagree, or a unit is also live into a
    /// non-sinkable successor, where the value would go stale.
    fn single_live_in_succ(
        &self,
        func: &Function,
        block: BlockId,
        sinkable: &HashSet<BlockId>,
        defed: &[PhysReg],
    ) -> Option<BlockId> {
        let mut single: Option<BlockId> = None;

        for &def in defed.iter() {
            let mut found: Option<BlockId> = None;
            for &s in sinkable.iter() {
                if self.live_in_overlaps(func, s, def) {
                    if found.is_some() {
                        return None;
                    }
                    found = Some(s);
                }
            }
            let found = found?;

            for &s in func.block(block).succs.iter() {
                if !sinkable.contains(&s) && self.live_in_overlaps(func, s, def) {
                    return None;
                }
            }

            match single {
                Some(prev) if prev != found => return None,
                _ => single = Some(found),
            }
        }

        single
    }

    fn live_in_overlaps(&self, func: &Function, block: BlockId, reg: PhysReg) -> bool {
        let mut live = LiveRegUnits::new(self.target);
        for live_in in func.block(block).live_ins.iter() {
            live.add(self.target, live_in.reg);
        }
        !live.available(self.target, reg)
    }

    /// If a source register is read below the copy, its kill has to move up
    /// onto the copy before the copy leaves the block.
    fn take_over_kills(
        &mut self,
        func: &mut Function,
        block: BlockId,
        id: InstId,
        used_ops: &[usize],
    ) {
        for &u in used_ops.iter() {
            let src = match func.inst(id).operands[u].as_reg().and_then(|op| op.reg.as_physical())
            {
                Some(src) => src,
                None => continue,
            };
            if self.used.available(self.target, src) {
                continue;
            }

            let pos = func.pos_in_block(id);
            let below: Vec<InstId> = func.block(block).insts[pos + 1..].to_vec();
            for later in below {
                let killing = func.inst(later).operands.iter().position(|op| {
                    op.as_reg().map_or(false, |op| {
                        op.reg.as_physical() == Some(src) && !op.is_def && op.is_kill
                    })
                });
                if let Some(i) = killing {
                    func.inst_mut(later).operands[i]
                        .as_reg_mut()
                        .expect("kill operand is a register")
                        .is_kill = false;
                    func.inst_mut(id).operands[u]
                        .as_reg_mut()
                        .expect("copy source operand is a register")
                        .is_kill = true;
                    break;
                }
            }
        }
    }

    /// The written registers stop being live into `succ`; the read ones
    /// start, since their values now flow in from outside.
    fn update_live_ins(
        &self,
        func: &mut Function,
        id: InstId,
        succ: BlockId,
        used_ops: &[usize],
        defed: &[PhysReg],
    ) {
        for &def in defed.iter() {
            let units: HashSet<RegUnit> = self.target.reg_units(def).into_iter().collect();
            func.block_mut(succ)
                .live_ins
                .retain(|live_in| !self.overlaps(live_in.reg, &units));
        }

        for &u in used_ops.iter() {
            let src = match func.inst(id).operands[u].as_reg().and_then(|op| op.reg.as_physical())
            {
                Some(src) => src,
                None => continue,
            };
            let mask = self.target.lane_mask(src);
            if !func.block(succ).live_ins.iter().any(|live_in| live_in.reg == src) {
                func.block_mut(succ).live_ins.push(LiveIn { reg: src, mask });
            }
        }
    }

    fn overlaps(&self, reg: PhysReg, units: &HashSet<RegUnit>) -> bool {
        self.target.reg_units(reg).iter().any(|unit| units.contains(unit))
    }
}

#[cfg(test)]
mod tests {
    use super::sink_copies;
    use crate::mir::{FuncBuilder, LaneMask, MemBase, MemOperand, PhysReg, Prob, Reg};
    use crate::target::GenericTarget;

    fn r(n: u16) -> Reg {
        Reg::Physical(PhysReg(n))
    }

    #[test]
    fn sinks_copy_into_single_live_in_successor() {
        let mut b = FuncBuilder::new("postra");
        let entry = b.block();
        let call_side = b.block();
        let other = b.block();

        b.set_block(entry);
        b.op2("sub", r(9), r(1), r(1));
        b.copy_renamable(PhysReg(19), PhysReg(0));
        b.cond_br(r(9), other, call_side, Prob::from_percent(50));

        b.set_block(call_side);
        b.live_in(call_side, PhysReg(19), LaneMask::ALL);
        b.call();
        b.op2("add", r(0), r(0), r(19));
        b.ret();

        b.set_block(other);
        b.copy(r(0), r(2));
        b.ret();

        let mut func = b.finish();
        let sunk = sink_copies(&mut func, &GenericTarget);

        assert_eq!(sunk, 1);
        let first = func.block(call_side).insts[0];
        assert!(func.inst(first).is_copy());
        assert_eq!(func.inst(first).block, call_side);
        // The successor reads the source from outside now.
        assert!(func.block(call_side).is_live_in(PhysReg(0)));
        assert!(!func.block(call_side).is_live_in(PhysReg(19)));
    }

    #[test]
    fn non_renamable_copy_stays() {
        let mut b = FuncBuilder::new("postra");
        let entry = b.block();
        let succ = b.block();
        let exit = b.block();

        b.set_block(entry);
        b.copy(r(19), r(0));
        b.cond_br(r(9), exit, succ, Prob::from_percent(50));

        b.set_block(succ);
        b.live_in(succ, PhysReg(19), LaneMask::ALL);
        b.op2("add", r(0), r(0), r(19));
        b.ret();

        b.set_block(exit);
        b.ret();

        let mut func = b.finish();
        assert_eq!(sink_copies(&mut func, &GenericTarget), 0);
        assert!(func.inst(func.block(entry).insts[0]).is_copy());
    }

    #[test]
    fn copy_does_not_cross_dependency() {
        let mut b = FuncBuilder::new("postra");
        let entry = b.block();
        let succ = b.block();
        let exit = b.block();

        b.set_block(entry);
        b.copy_renamable(PhysReg(19), PhysReg(0));
        // Reads the copy destination later in the block.
        b.store(r(19), MemOperand { base: MemBase::Frame(0), offset: 0, size: 8 });
        b.cond_br(r(9), exit, succ, Prob::from_percent(50));

        b.set_block(succ);
        b.live_in(succ, PhysReg(19), LaneMask::ALL);
        b.ret();

        b.set_block(exit);
        b.ret();

        let mut func = b.finish();
        assert_eq!(sink_copies(&mut func, &GenericTarget), 0);
    }

    #[test]
    fn live_in_to_two_successors_blocks_sink() {
        let mut b = FuncBuilder::new("postra");
        let entry = b.block();
        let left = b.block();
        let right = b.block();

        b.set_block(entry);
        b.copy_renamable(PhysReg(19), PhysReg(0));
        b.cond_br(r(9), left, right, Prob::from_percent(50));

        b.set_block(left);
        b.live_in(left, PhysReg(19), LaneMask::ALL);
        b.ret();

        b.set_block(right);
        b.live_in(right, PhysReg(19), LaneMask::ALL);
        b.ret();

        let mut func = b.finish();
        assert_eq!(sink_copies(&mut func, &GenericTarget), 0);
    }
}
