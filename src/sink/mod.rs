//! The pre-allocation sinking pass: moves instructions into successor blocks
//! so they only execute on paths that need their results. Sinks are simple
//! and local; nothing is ever duplicated, only detached and spliced.
//!
//! The driver sweeps every block bottom-up to a fixpoint. Edge splits are
//! recorded during a sweep and applied in one batch at its end, so the
//! dominance, post-dominance and loop views stay valid for the whole sweep.

pub use self::options::{SinkOptions, SinkStats};

mod loops;
mod options;
mod profit;
mod split;
mod store;
mod succ;
#[cfg(test)]
mod tests;

pub(crate) mod debug;

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use self::debug::SeenDbgUser;
use crate::analysis::{AliasQuery, BlockFreq, DomTree, LoopInfo, PostDomTree};
use crate::mir::{BlockId, DebugVar, Function, InstId, Reg, VirtReg};
use crate::target::Target;

/// Run the pass over one function. Returns the change counters; the graph is
/// mutated in place.
pub fn sink(
    func: &mut Function,
    target: &dyn Target,
    alias: &dyn AliasQuery,
    options: SinkOptions,
) -> SinkStats {
    let mut sinker = Sinker::new(func, target, alias, options);
    sinker.run(func);
    sinker.stats
}

/// Sorted successor candidates, cached per block for one block's scan.
type SuccCache = HashMap<BlockId, Vec<BlockId>>;

struct Sinker<'a> {
    target: &'a dyn Target,
    alias: &'a dyn AliasQuery,
    options: SinkOptions,
    stats: SinkStats,

    // Rebuilt at every sweep boundary.
    dom: DomTree,
    pdt: PostDomTree,
    loops: LoopInfo,
    freq: Option<BlockFreq>,

    /// Edges considered for breaking this sweep.
    ceb_candidates: HashSet<(BlockId, BlockId)>,
    /// Edges committed to break at sweep end, in decision order.
    to_split: Vec<(BlockId, BlockId)>,
    to_split_set: HashSet<(BlockId, BlockId)>,

    /// Registers whose kill flags are no longer trustworthy.
    clear_kills: HashSet<VirtReg>,

    /// Debug annotations of the block being scanned, per register read.
    seen_dbg_users: HashMap<VirtReg, Vec<SeenDbgUser>>,
    /// Variables already annotated later in the block.
    seen_dbg_vars: HashSet<DebugVar>,

    has_store_cache: HashMap<(BlockId, BlockId), bool>,
    store_cache: HashMap<(BlockId, BlockId), Vec<InstId>>,
    pressure_cache: HashMap<BlockId, Vec<u32>>,
}

impl<'a> Sinker<'a> {
    fn new(
        func: &Function,
        target: &'a dyn Target,
        alias: &'a dyn AliasQuery,
        options: SinkOptions,
    ) -> Sinker<'a> {
        let dom = DomTree::compute(func);
        let pdt = PostDomTree::compute(func);
        let loops = LoopInfo::compute(func, &dom);
        let freq = options
            .use_block_frequency
            .then(|| BlockFreq::compute(func, &loops));
        Sinker {
            target,
            alias,
            options,
            stats: SinkStats::default(),
            dom,
            pdt,
            loops,
            freq,
            ceb_candidates: HashSet::new(),
            to_split: Vec::new(),
            to_split_set: HashSet::new(),
            clear_kills: HashSet::new(),
            seen_dbg_users: HashMap::new(),
            seen_dbg_vars: HashSet::new(),
            has_store_cache: HashMap::new(),
            store_cache: HashMap::new(),
            pressure_cache: HashMap::new(),
        }
    }

    fn recompute_analyses(&mut self, func: &Function) {
        self.dom = DomTree::compute(func);
        self.pdt = PostDomTree::compute(func);
        self.loops = LoopInfo::compute(func, &self.dom);
        if self.options.use_block_frequency {
            self.freq = Some(BlockFreq::compute(func, &self.loops));
        }
    }

    fn run(&mut self, func: &mut Function) -> bool {
        info!("machine sinking: {}", func.name);

        let mut ever_changed = false;
        loop {
            self.ceb_candidates.clear();
            self.to_split.clear();
            self.to_split_set.clear();

            let mut changed = false;
            for block in func.block_ids() {
                changed |= self.process_block(func, block);
            }

            for (from, to) in std::mem::take(&mut self.to_split) {
                if let Some(new) = func.split_edge(from, to) {
                    debug!("split critical edge b{} -> b{} -> b{}", from.0, new.0, to.0);
                    if let Some(freq) = self.freq.as_mut() {
                        freq.on_edge_split(func, from, new);
                    }
                    self.stats.edges_split += 1;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
            ever_changed = true;
            self.recompute_analyses(func);
        }

        if self.options.enable_loop_sink {
            ever_changed |= self.sink_into_loops(func);
        }

        self.has_store_cache.clear();
        self.store_cache.clear();

        for reg in std::mem::take(&mut self.clear_kills) {
            func.clear_kill_flags(reg);
        }

        ever_changed
    }

    fn process_block(&mut self, func: &mut Function, block: BlockId) -> bool {
        if func.block(block).succs.len() <= 1 || func.block(block).insts.is_empty() {
            return false;
        }

        // Unreachable loops have no bottom to sink toward; skip them or the
        // fixpoint never terminates.
        if !self.dom.is_reachable(block) {
            return false;
        }

        let mut succ_cache = SuccCache::new();
        let mut changed = false;
        let mut saw_store = false;

        let snapshot = func.block(block).insts.clone();
        for id in snapshot.into_iter().rev() {
            if func.inst(id).is_dbg_value() {
                self.process_dbg_inst(func, id);
                continue;
            }

            if self.coalesce_copy(func, id) {
                changed = true;
                continue;
            }

            if self.sink_instruction(func, id, &mut saw_store, &mut succ_cache) {
                self.stats.sunk += 1;
                changed = true;
            }
        }

        self.seen_dbg_users.clear();
        self.seen_dbg_vars.clear();
        self.pressure_cache.clear();

        changed
    }

    /// Fold `dst = COPY src` into the single instruction producing `src`:
    /// rewrite every use of `dst` to read `src` and delete the copy.
    fn coalesce_copy(&mut self, func: &mut Function, id: InstId) -> bool {
        let inst = func.inst(id);
        if !inst.is_copy() {
            return false;
        }

        let (dst, src) = match (inst.copy_dst(), inst.copy_src()) {
            (Some(dst), Some(src)) => (dst.reg, src.reg),
            _ => return false,
        };
        let (dst, src) = match (dst.as_virtual(), src.as_virtual()) {
            (Some(dst), Some(src)) => (dst, src),
            _ => return false,
        };

        if !func.has_one_nondbg_use(src) {
            return false;
        }
        if func.vreg_class(src) != func.vreg_class(dst) {
            return false;
        }
        let def = match func.def_of(src) {
            Some(def) => def,
            None => return false,
        };
        if func.inst(def).is_copy_like() {
            return false;
        }

        debug!("coalescing v{} into v{}", dst.0, src.0);
        func.replace_all_uses(dst, src);
        func.erase_inst(id);

        // The source's kill flags may now lie; drop them.
        func.clear_kill_flags(src);

        self.stats.coalesced += 1;
        true
    }

    fn sink_instruction(
        &mut self,
        func: &mut Function,
        id: InstId,
        saw_store: &mut bool,
        succ_cache: &mut SuccCache,
    ) -> bool {
        if !self.target.should_sink(func.inst(id)) {
            return false;
        }
        if !func.inst(id).is_safe_to_move(saw_store) {
            return false;
        }
        if func.inst(id).is_convergent() {
            return false;
        }

        let parent = func.inst(id).block;
        let mut break_phi_edge = false;
        let succ = match self.find_succ_to_sink_to(func, id, parent, &mut break_phi_edge, succ_cache, 0)
        {
            Some(succ) => succ,
            None => return false,
        };

        // A physical register live into the target could be clobbered by the
        // moved definition, or read a stale value.
        for op in func.inst(id).reg_operands() {
            if let Reg::Physical(reg) = op.reg {
                if func.block(succ).is_live_in(reg) {
                    return false;
                }
            }
        }

        debug!("sink {:?} from b{} into b{}", func.inst(id).opcode, parent.0, succ.0);

        if func.block(succ).preds.len() > 1 {
            // Crossing a critical edge. Only allowed when the move is safe
            // outright; otherwise see whether the edge should be broken.
            let mut try_break = false;

            if func.inst(id).may_load() {
                let mut store = self.has_store_between(func, parent, succ, id);
                if !func.inst(id).is_safe_to_move(&mut store) {
                    debug!("won't sink load along critical edge");
                    try_break = true;
                }
            }

            if !try_break && !self.dom.dominates(parent, succ) {
                try_break = true;
            }

            if !try_break && self.loops.is_header(succ) {
                try_break = true;
            }

            if try_break {
                if !self.postpone_split_edge(func, id, parent, succ, break_phi_edge) {
                    debug!("not legal or profitable to break critical edge");
                }
                // Not sunk this sweep; a later sweep sees the split block.
                return false;
            }
        }

        if break_phi_edge {
            // Every use is a merge-point input along this edge; the edge has
            // to be broken before the definition can move.
            if !self.postpone_split_edge(func, id, parent, succ, break_phi_edge) {
                debug!("not legal or profitable to break critical edge");
            }
            return false;
        }

        let pos = func.first_non_phi(succ);
        let dbg_to_sink = self.collect_dbg_users(func, id);

        if func.inst(id).is_copy() {
            self.salvage_unsunk_debug_users_of_copy(func, id, succ);
        }

        debug::perform_sink(func, id, succ, pos, &dbg_to_sink);
        self.pressure_cache.remove(&succ);

        // We may have moved past instructions that killed the used
        // registers; their flags are cleared once the run finishes.
        for op in func.inst(id).uses() {
            if let Reg::Virtual(reg) = op.reg {
                self.clear_kills.insert(reg);
            }
        }

        true
    }
}
