use super::{
    BlockId, DebugVar, Function, Inst, InstId, LaneMask, LiveIn, MemOperand, Opcode, Operand,
    PhysReg, Prob, Reg, RegClassId, RegOperand, VirtReg,
};

/// Builds a [`Function`] block by block. The first block added is the entry.
#[derive(Debug)]
pub struct FuncBuilder {
    func: Function,
    cur: Option<BlockId>,
}

impl FuncBuilder {
    pub fn new(name: &str) -> FuncBuilder {
        FuncBuilder {
            func: Function::new(name),
            cur: None,
        }
    }

    pub fn block(&mut self) -> BlockId {
        let id = self.func.add_block();
        if self.cur.is_none() {
            self.cur = Some(id);
        }
        id
    }

    /// Select the block subsequent instructions append to.
    pub fn set_block(&mut self, id: BlockId) {
        self.cur = Some(id);
    }

    pub fn vreg(&mut self, class: RegClassId) -> VirtReg {
        self.func.new_vreg(class)
    }

    pub fn inst(&mut self, inst: Inst) -> InstId {
        let cur = self.cur.expect("no block selected");
        self.func.push_inst(cur, inst)
    }

    /// `dst = op a, b`
    pub fn op2(&mut self, name: &'static str, dst: Reg, a: Reg, b: Reg) -> InstId {
        self.inst(Inst::new(
            Opcode::Op(name),
            vec![
                Operand::Reg(RegOperand::def(dst)),
                Operand::Reg(RegOperand::read(a)),
                Operand::Reg(RegOperand::read(b)),
            ],
        ))
    }

    /// `dst = op imm`
    pub fn op_imm(&mut self, name: &'static str, dst: Reg, imm: i64) -> InstId {
        self.inst(Inst::new(
            Opcode::Op(name),
            vec![Operand::Reg(RegOperand::def(dst)), Operand::Imm(imm)],
        ))
    }

    pub fn copy(&mut self, dst: Reg, src: Reg) -> InstId {
        self.inst(Inst::new(
            Opcode::Copy,
            vec![
                Operand::Reg(RegOperand::def(dst)),
                Operand::Reg(RegOperand::read(src)),
            ],
        ))
    }

    /// A post-allocation copy whose destination may be renamed.
    pub fn copy_renamable(&mut self, dst: PhysReg, src: PhysReg) -> InstId {
        let mut dst = RegOperand::def(Reg::Physical(dst));
        dst.is_renamable = true;
        self.inst(Inst::new(
            Opcode::Copy,
            vec![
                Operand::Reg(dst),
                Operand::Reg(RegOperand::read(Reg::Physical(src))),
            ],
        ))
    }

    pub fn load(&mut self, dst: VirtReg, mem: MemOperand) -> InstId {
        let mut inst = Inst::new(
            Opcode::Load,
            vec![Operand::Reg(RegOperand::def(Reg::Virtual(dst)))],
        );
        inst.mem = Some(mem);
        self.inst(inst)
    }

    pub fn store(&mut self, src: Reg, mem: MemOperand) -> InstId {
        let mut inst = Inst::new(Opcode::Store, vec![Operand::Reg(RegOperand::read(src))]);
        inst.mem = Some(mem);
        self.inst(inst)
    }

    pub fn call(&mut self) -> InstId {
        self.inst(Inst::new(Opcode::Call, Vec::new()))
    }

    pub fn phi(&mut self, dst: VirtReg, incoming: &[(Reg, BlockId)]) -> InstId {
        let mut operands = vec![Operand::Reg(RegOperand::def(Reg::Virtual(dst)))];
        for &(reg, block) in incoming {
            operands.push(Operand::Reg(RegOperand::read(reg)));
            operands.push(Operand::Block(block));
        }
        self.inst(Inst::new(Opcode::Phi, operands))
    }

    pub fn dbg_value(&mut self, reg: Reg, var: DebugVar) -> InstId {
        let mut inst = Inst::new(Opcode::DbgValue, vec![Operand::Reg(RegOperand::read(reg))]);
        inst.var = Some(var);
        self.inst(inst)
    }

    pub fn br(&mut self, to: BlockId) -> InstId {
        let id = self.inst(Inst::new(Opcode::Br, vec![Operand::Block(to)]));
        let cur = self.cur.unwrap();
        let block = self.func.block_mut(cur);
        block.succs.push(to);
        block.succ_probs.push(Prob::ALWAYS);
        id
    }

    pub fn cond_br(&mut self, cond: Reg, then: BlockId, other: BlockId, prob_then: Prob) -> InstId {
        let id = self.inst(Inst::new(
            Opcode::CondBr,
            vec![
                Operand::Reg(RegOperand::read(cond)),
                Operand::Block(then),
                Operand::Block(other),
            ],
        ));
        let cur = self.cur.unwrap();
        let block = self.func.block_mut(cur);
        block.succs.push(then);
        block.succ_probs.push(prob_then);
        block.succs.push(other);
        block.succ_probs.push(prob_then.complement());
        id
    }

    pub fn ret(&mut self) -> InstId {
        self.inst(Inst::new(Opcode::Ret, Vec::new()))
    }

    pub fn live_in(&mut self, block: BlockId, reg: PhysReg, mask: LaneMask) {
        self.func.block_mut(block).live_ins.push(LiveIn { reg, mask });
    }

    pub fn finish(mut self) -> Function {
        assert!(self.func.num_blocks() > 0, "function needs an entry block");
        self.func.recompute_preds();
        self.func
    }
}
