use std::collections::HashMap;

use log::trace;

use super::{Block, BlockId, Inst, InstId, Opcode, Operand, Prob, Reg, RegClassId, VirtReg};

/// A function under optimisation: arenas of blocks and instructions plus a
/// use/def index over virtual registers, kept correct by the mutation API.
///
/// Block and instruction ids are stable for the lifetime of a pass; erased
/// instructions are tombstoned, and edge splits append fresh blocks.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    blocks: Vec<Block>,
    insts: Vec<Inst>,
    entry: BlockId,
    vreg_classes: Vec<RegClassId>,
    defs: Vec<Option<InstId>>,
    uses: Vec<Vec<InstId>>,
}

impl Function {
    pub(super) fn new(name: &str) -> Function {
        Function {
            name: name.to_string(),
            blocks: Vec::new(),
            insts: Vec::new(),
            entry: BlockId(0),
            vreg_classes: Vec::new(),
            defs: Vec::new(),
            uses: Vec::new(),
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Block ids as of the call; blocks appended later are not included.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    pub fn num_vregs(&self) -> usize {
        self.vreg_classes.len()
    }

    pub fn new_vreg(&mut self, class: RegClassId) -> VirtReg {
        let reg = VirtReg(self.vreg_classes.len() as u32);
        self.vreg_classes.push(class);
        self.defs.push(None);
        self.uses.push(Vec::new());
        reg
    }

    pub fn vreg_class(&self, reg: VirtReg) -> RegClassId {
        self.vreg_classes[reg.0 as usize]
    }

    /// The single defining instruction, if the register is defined at all.
    pub fn def_of(&self, reg: VirtReg) -> Option<InstId> {
        self.defs[reg.0 as usize]
    }

    /// Every instruction reading `reg`, debug annotations included. An
    /// instruction reading the register twice appears twice.
    pub fn uses_of(&self, reg: VirtReg) -> &[InstId] {
        &self.uses[reg.0 as usize]
    }

    pub fn nondbg_uses(&self, reg: VirtReg) -> impl Iterator<Item = InstId> + '_ {
        self.uses[reg.0 as usize]
            .iter()
            .copied()
            .filter(|id| !self.inst(*id).is_dbg_value())
    }

    pub fn has_one_nondbg_use(&self, reg: VirtReg) -> bool {
        self.nondbg_uses(reg).count() == 1
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    /// Position of an instruction within its block.
    pub fn pos_in_block(&self, id: InstId) -> usize {
        let block = self.block(self.inst(id).block);
        block
            .insts
            .iter()
            .position(|other| *other == id)
            .expect("instruction must be in its parent block")
    }

    /// Number of instructions in a block, debug annotations excluded, so
    /// size-bounded decisions come out the same with and without debug info.
    pub fn nondbg_len(&self, block: BlockId) -> usize {
        self.block(block)
            .insts
            .iter()
            .filter(|id| !self.inst(**id).is_dbg_value())
            .count()
    }

    /// Index of the first non-merge-point instruction in a block.
    pub fn first_non_phi(&self, block: BlockId) -> usize {
        let block = self.block(block);
        block
            .insts
            .iter()
            .position(|id| !self.inst(*id).is_phi())
            .unwrap_or(block.insts.len())
    }

    /// Append an instruction to a block and index its operands.
    pub fn push_inst(&mut self, block: BlockId, inst: Inst) -> InstId {
        let len = self.block(block).insts.len();
        self.insert_inst(block, len, inst)
    }

    /// Insert an instruction at a position in a block and index its operands.
    pub fn insert_inst(&mut self, block: BlockId, pos: usize, mut inst: Inst) -> InstId {
        inst.block = block;
        let id = InstId(self.insts.len() as u32);
        self.insts.push(inst);
        self.block_mut(block).insts.insert(pos, id);
        self.index_operands(id);
        id
    }

    /// Remove an instruction from its block and from the use/def index. The
    /// id is tombstoned, never reused.
    pub fn erase_inst(&mut self, id: InstId) {
        self.unindex_operands(id);
        let block = self.inst(id).block;
        let pos = self.pos_in_block(id);
        self.block_mut(block).insts.remove(pos);
        self.inst_mut(id).operands.clear();
    }

    /// Atomically detach an instruction from its block and splice it into
    /// `to` at `pos`. Operands are untouched, so the use/def index stays
    /// valid.
    pub fn splice(&mut self, id: InstId, to: BlockId, pos: usize) {
        let from = self.inst(id).block;
        assert!(from != to, "splice within a block is not supported");
        let old = self.pos_in_block(id);
        self.block_mut(from).insts.remove(old);
        self.block_mut(to).insts.insert(pos, id);
        self.inst_mut(id).block = to;
    }

    /// Rewrite every use of `from` to read `to` instead. The definition of
    /// `from` is left alone; callers erase it separately.
    pub fn replace_all_uses(&mut self, from: VirtReg, to: VirtReg) {
        let users = std::mem::take(&mut self.uses[from.0 as usize]);
        for &id in users.iter() {
            for op in self.insts[id.index()].operands.iter_mut() {
                if let Some(reg) = op.as_reg_mut() {
                    if !reg.is_def && reg.reg == Reg::Virtual(from) {
                        reg.reg = Reg::Virtual(to);
                    }
                }
            }
        }
        self.uses[to.0 as usize].extend(users);
    }

    /// Point one register operand at a different register, keeping the index
    /// in sync.
    pub fn set_reg(&mut self, id: InstId, op_index: usize, to: Reg) {
        let op = self.insts[id.index()].operands[op_index]
            .as_reg()
            .copied()
            .expect("operand must be a register");
        assert!(!op.is_def, "only use operands may be redirected");
        if let Some(v) = op.reg.as_virtual() {
            remove_one(&mut self.uses[v.0 as usize], id);
        }
        if let Some(v) = to.as_virtual() {
            self.uses[v.0 as usize].push(id);
        }
        self.insts[id.index()].operands[op_index]
            .as_reg_mut()
            .unwrap()
            .reg = to;
    }

    /// Mark a debug annotation as holding no known value.
    pub fn set_dbg_value_undef(&mut self, id: InstId) {
        assert!(self.inst(id).is_dbg_value());
        if let Some(op) = self.insts[id.index()].operands[0].as_reg() {
            if let Some(v) = op.reg.as_virtual() {
                remove_one(&mut self.uses[v.0 as usize], id);
            }
        }
        self.insts[id.index()].operands[0] = Operand::Undef;
    }

    /// Conservatively drop kill flags on every use of a register.
    pub fn clear_kill_flags(&mut self, reg: VirtReg) {
        let users = self.uses[reg.0 as usize].clone();
        for id in users {
            for op in self.insts[id.index()].operands.iter_mut() {
                if let Some(r) = op.as_reg_mut() {
                    if r.reg == Reg::Virtual(reg) {
                        r.is_kill = false;
                    }
                }
            }
        }
    }

    /// Break the edge `from -> to` by inserting a fresh block carrying an
    /// unconditional branch. Rewires the adjacency lists, retargets the
    /// terminator of `from`, moves the edge probability onto the new edge,
    /// and rewrites merge-point operands in `to`.
    pub fn split_edge(&mut self, from: BlockId, to: BlockId) -> Option<BlockId> {
        let pos = self.block(from).succs.iter().position(|s| *s == to)?;

        let new = self.add_block();
        self.block_mut(from).succs[pos] = new;
        {
            let block = self.block_mut(new);
            block.succs.push(to);
            block.succ_probs.push(Prob::ALWAYS);
            block.preds.push(from);
        }
        for pred in self.block_mut(to).preds.iter_mut() {
            if *pred == from {
                *pred = new;
            }
        }

        // Retarget the terminator of `from`.
        if let Some(&term) = self.block(from).insts.last() {
            if self.inst(term).is_terminator() {
                for op in self.insts[term.index()].operands.iter_mut() {
                    if let Operand::Block(target) = op {
                        if *target == to {
                            *target = new;
                        }
                    }
                }
            }
        }

        // Merge points in `to` now receive their values along the new edge.
        for i in 0..self.block(to).insts.len() {
            let id = self.block(to).insts[i];
            if !self.inst(id).is_phi() {
                break;
            }
            for op in self.insts[id.index()].operands.iter_mut() {
                if let Operand::Block(incoming) = op {
                    if *incoming == from {
                        *incoming = new;
                    }
                }
            }
        }

        self.push_inst(new, Inst::new(Opcode::Br, vec![Operand::Block(to)]));

        trace!(
            "split edge b{} -> b{} with new block b{}",
            from.0,
            to.0,
            new.0
        );
        Some(new)
    }

    fn index_operands(&mut self, id: InstId) {
        let mut defs = Vec::new();
        let mut uses = Vec::new();
        for op in self.inst(id).reg_operands() {
            if let Reg::Virtual(v) = op.reg {
                if op.is_def {
                    defs.push(v);
                } else {
                    uses.push(v);
                }
            }
        }
        for v in defs {
            assert!(
                self.defs[v.0 as usize].is_none(),
                "virtual register defined twice"
            );
            self.defs[v.0 as usize] = Some(id);
        }
        for v in uses {
            self.uses[v.0 as usize].push(id);
        }
    }

    fn unindex_operands(&mut self, id: InstId) {
        let mut defs = Vec::new();
        let mut uses = Vec::new();
        for op in self.inst(id).reg_operands() {
            if let Reg::Virtual(v) = op.reg {
                if op.is_def {
                    defs.push(v);
                } else {
                    uses.push(v);
                }
            }
        }
        for v in defs {
            if self.defs[v.0 as usize] == Some(id) {
                self.defs[v.0 as usize] = None;
            }
        }
        for v in uses {
            remove_one(&mut self.uses[v.0 as usize], id);
        }
    }

    /// Derive predecessor lists from the successor lists. Used once at
    /// construction; splits maintain both incrementally.
    pub(super) fn recompute_preds(&mut self) {
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for id in self.block_ids() {
            for &succ in self.block(id).succs.iter() {
                preds.entry(succ).or_default().push(id);
            }
        }
        for id in self.block_ids() {
            self.block_mut(id).preds = preds.remove(&id).unwrap_or_default();
        }
    }
}

fn remove_one(list: &mut Vec<InstId>, id: InstId) {
    if let Some(pos) = list.iter().position(|other| *other == id) {
        list.remove(pos);
    }
}
