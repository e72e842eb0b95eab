//! Store interference scan for sinking loads along critical edges.

use std::collections::HashSet;

use super::Sinker;
use crate::analysis::insts_may_alias;
use crate::mir::{BlockId, Function, InstId};

impl<'a> Sinker<'a> {
    /// Whether any store that may alias the load `id` sits between `from`
    /// and `to`. Only meaningful on a straight line, so anything else
    /// answers true. Full scans are capped by the configured thresholds;
    /// giving up also answers true.
    pub(super) fn has_store_between(
        &mut self,
        func: &Function,
        from: BlockId,
        to: BlockId,
        id: InstId,
    ) -> bool {
        if !self.dom.dominates(from, to) || !self.pdt.dominates(to, from) {
            return true;
        }

        let key = (from, to);
        if let Some(&cached) = self.has_store_cache.get(&key) {
            return cached;
        }
        if let Some(stores) = self.store_cache.get(&key) {
            return stores.iter().any(|&store| {
                insts_may_alias(self.target, self.alias, func.inst(store), func.inst(id))
            });
        }

        let mut saw_store = false;
        let mut aliased = false;
        let mut stores: Vec<InstId> = Vec::new();
        // Blocks on the straight line visited so far, for partial caching.
        let mut on_line: Vec<BlockId> = Vec::new();

        let mut visited: HashSet<BlockId> = HashSet::from([from]);
        let mut stack = vec![from];
        while let Some(bb) = stack.pop() {
            for &succ in func.block(bb).succs.iter() {
                if visited.insert(succ) {
                    stack.push(succ);
                }
            }

            // Stores in `from` were accounted for by the caller's own scan,
            // and the load lands at the top of `to`.
            if bb == from || bb == to {
                continue;
            }

            // Only blocks the destination post-dominates lie on the path.
            if !self.pdt.dominates(to, bb) {
                continue;
            }
            on_line.push(bb);

            let over_budget = func.nondbg_len(bb) > self.options.load_sink_inst_threshold
                || on_line.len() > self.options.load_sink_block_threshold;

            if over_budget {
                self.cache_partial_line(&on_line, from, to, bb);
                self.has_store_cache.insert(key, true);
                return true;
            }

            for &iid in func.block(bb).insts.iter() {
                let inst = func.inst(iid);

                // Calls and ordered accesses clobber conservatively.
                if inst.is_call() || inst.has_ordered_mem() {
                    self.cache_partial_line(&on_line, from, to, bb);
                    self.has_store_cache.insert(key, true);
                    return true;
                }

                if inst.may_store() {
                    saw_store = true;
                    if insts_may_alias(self.target, self.alias, inst, func.inst(id)) {
                        aliased = true;
                    }
                    stores.push(iid);
                }
            }
        }

        if !stores.is_empty() {
            self.store_cache.insert(key, stores);
        }
        if !saw_store {
            self.has_store_cache.insert(key, false);
        }
        aliased
    }

    /// A definite blocker was found in `bad`. Sub-ranges of the straight line
    /// that include it are blocked too; remember that before bailing out.
    fn cache_partial_line(&mut self, on_line: &[BlockId], from: BlockId, to: BlockId, bad: BlockId) {
        for &bb in on_line.iter() {
            if bb == bad {
                continue;
            }
            if self.dom.dominates(bb, bad) {
                self.has_store_cache.insert((bb, to), true);
            } else if self.dom.dominates(bad, bb) {
                self.has_store_cache.insert((from, bb), true);
            }
        }
    }
}
