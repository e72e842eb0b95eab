use super::{BlockId, Reg};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstId(pub u32);

impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a source variable, as far as debug annotations care.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DebugVar(pub u32);

/// An opaque source location attached to an ordinary instruction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DebugLoc(pub u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    /// Merge-point pseudo-instruction. Operands are laid out as
    /// `[def, use, block, use, block, ...]`: each incoming value is followed
    /// by the predecessor edge it flows along.
    Phi,
    Copy,
    /// Debug annotation binding its single operand to a source variable.
    DbgValue,
    Load,
    Store,
    Call,
    Br,
    CondBr,
    Ret,
    /// Any other target instruction, named for logs and tests.
    Op(&'static str),
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InstFlags(pub u8);

impl InstFlags {
    pub const NONE: InstFlags = InstFlags(0);
    /// May not be made control-dependent on additional values.
    pub const CONVERGENT: InstFlags = InstFlags(1);
    /// Memory access with ordering constraints (volatile, atomic).
    pub const ORDERED_MEM: InstFlags = InstFlags(1 << 1);
    /// Side effects the memory model does not capture.
    pub const SIDE_EFFECTS: InstFlags = InstFlags(1 << 2);

    pub fn contains(self, other: InstFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for InstFlags {
    type Output = InstFlags;

    fn bitor(self, rhs: InstFlags) -> InstFlags {
        InstFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemBase {
    /// Address computed into a register.
    Reg(Reg),
    /// A stack frame slot.
    Frame(i32),
    /// The constant pool; read-only for the function's lifetime.
    ConstantPool,
    /// A jump/offset table; read-only for the function's lifetime.
    OffsetTable,
    Global(u32),
}

impl MemBase {
    pub fn is_read_only(self) -> bool {
        matches!(self, MemBase::ConstantPool | MemBase::OffsetTable)
    }
}

/// What a load or store touches. An instruction that accesses memory but
/// carries no descriptor is treated as touching everything.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemOperand {
    pub base: MemBase,
    pub offset: i64,
    /// Access size in bytes; 0 when unknown.
    pub size: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct RegOperand {
    pub reg: Reg,
    pub is_def: bool,
    /// Def whose value is never read.
    pub is_dead: bool,
    /// Use after which the register's value is not needed. Advisory.
    pub is_kill: bool,
    /// Post-allocation: the destination may be renamed freely.
    pub is_renamable: bool,
}

impl RegOperand {
    pub fn def(reg: Reg) -> RegOperand {
        RegOperand {
            reg,
            is_def: true,
            is_dead: false,
            is_kill: false,
            is_renamable: false,
        }
    }

    pub fn read(reg: Reg) -> RegOperand {
        RegOperand {
            reg,
            is_def: false,
            is_dead: false,
            is_kill: false,
            is_renamable: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Operand {
    Reg(RegOperand),
    Imm(i64),
    Block(BlockId),
    /// A debug annotation whose value has been optimised away.
    Undef,
}

impl Operand {
    pub fn as_reg(&self) -> Option<&RegOperand> {
        match self {
            Operand::Reg(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_reg_mut(&mut self) -> Option<&mut RegOperand> {
        match self {
            Operand::Reg(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Operand::Block(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Inst {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub mem: Option<MemOperand>,
    pub flags: InstFlags,
    /// Source variable, for `DbgValue` only.
    pub var: Option<DebugVar>,
    pub loc: Option<DebugLoc>,
    pub block: BlockId,
}

impl Inst {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Inst {
        Inst {
            opcode,
            operands,
            mem: None,
            flags: InstFlags::NONE,
            var: None,
            loc: None,
            block: BlockId(u32::MAX),
        }
    }

    pub fn is_phi(&self) -> bool {
        self.opcode == Opcode::Phi
    }

    pub fn is_copy(&self) -> bool {
        self.opcode == Opcode::Copy
    }

    /// Copies and merge points both just shuffle values around; neither is a
    /// computation worth coalescing into.
    pub fn is_copy_like(&self) -> bool {
        self.is_copy() || self.is_phi()
    }

    pub fn is_dbg_value(&self) -> bool {
        self.opcode == Opcode::DbgValue
    }

    pub fn is_call(&self) -> bool {
        self.opcode == Opcode::Call
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self.opcode, Opcode::Br | Opcode::CondBr | Opcode::Ret)
    }

    pub fn may_load(&self) -> bool {
        self.opcode == Opcode::Load
    }

    pub fn may_store(&self) -> bool {
        self.opcode == Opcode::Store
    }

    pub fn is_convergent(&self) -> bool {
        self.flags.contains(InstFlags::CONVERGENT)
    }

    pub fn has_ordered_mem(&self) -> bool {
        self.flags.contains(InstFlags::ORDERED_MEM)
    }

    pub fn has_side_effects(&self) -> bool {
        self.flags.contains(InstFlags::SIDE_EFFECTS)
    }

    /// A load whose source region cannot be written for the function's
    /// lifetime.
    pub fn is_invariant_load(&self) -> bool {
        self.may_load() && self.mem.map_or(false, |mem| mem.base.is_read_only())
    }

    /// Whether this instruction can be moved down past the point where
    /// `saw_store` stores have been seen. Records stores it encounters into
    /// `saw_store` for the caller's bottom-up scan.
    pub fn is_safe_to_move(&self, saw_store: &mut bool) -> bool {
        if self.is_phi() || self.is_dbg_value() || self.is_terminator() {
            return false;
        }

        if self.may_store() || self.is_call() || self.has_ordered_mem() {
            *saw_store = true;
            return false;
        }

        if self.has_side_effects() {
            return false;
        }

        if self.may_load() && *saw_store && !self.is_invariant_load() {
            return false;
        }

        true
    }

    pub fn reg_operands(&self) -> impl Iterator<Item = &RegOperand> {
        self.operands.iter().filter_map(Operand::as_reg)
    }

    pub fn defs(&self) -> impl Iterator<Item = &RegOperand> {
        self.reg_operands().filter(|op| op.is_def)
    }

    pub fn uses(&self) -> impl Iterator<Item = &RegOperand> {
        self.reg_operands().filter(|op| !op.is_def)
    }

    /// Destination operand of a copy.
    pub fn copy_dst(&self) -> Option<&RegOperand> {
        if !self.is_copy() {
            return None;
        }
        self.operands.first().and_then(Operand::as_reg)
    }

    /// Source operand of a copy.
    pub fn copy_src(&self) -> Option<&RegOperand> {
        if !self.is_copy() {
            return None;
        }
        self.operands.get(1).and_then(Operand::as_reg)
    }

    /// The predecessor block a merge-point operand flows along.
    pub fn phi_incoming_block(&self, op_index: usize) -> BlockId {
        assert!(self.is_phi());
        match self.operands.get(op_index + 1) {
            Some(Operand::Block(id)) => *id,
            _ => panic!("phi use operand must be followed by its predecessor block"),
        }
    }
}
