//! The capability seam a backend target implements to steer the sinking
//! passes. Policy (what is sinkable, what is cheap) and register-file
//! description (classes, pressure limits, units, lanes) both live here.

use lazy_static::lazy_static;

use crate::mir::{Inst, LaneMask, MemOperand, Opcode, PhysReg, RegClassId, RegUnit};

#[derive(Clone, Copy, Debug)]
pub struct RegClass {
    pub name: &'static str,
    /// Pressure contribution of one live register of this class.
    pub weight: u32,
    /// Pressure above which the class is considered over-subscribed.
    pub limit: u32,
}

pub trait Target {
    fn num_reg_classes(&self) -> usize;

    fn reg_class(&self, id: RegClassId) -> &RegClass;

    fn num_reg_units(&self) -> usize;

    /// Units a physical register covers; overlapping registers share units.
    fn reg_units(&self, reg: PhysReg) -> Vec<RegUnit>;

    /// Lanes occupied when `reg` is added to a live-in set.
    fn lane_mask(&self, _reg: PhysReg) -> LaneMask {
        LaneMask::ALL
    }

    /// A read-only ambient register (zero register, thread pointer); uses of
    /// it may move freely.
    fn is_constant_phys_reg(&self, _reg: PhysReg) -> bool {
        false
    }

    /// Veto for instructions the target prefers to keep in place.
    fn should_sink(&self, _inst: &Inst) -> bool {
        true
    }

    /// Whether executing the instruction costs no more than a register move.
    fn is_cheap_as_move(&self, inst: &Inst) -> bool {
        inst.is_copy()
    }

    /// Whether definitions of this class may be moved at all.
    fn is_safe_to_move_class_defs(&self, _class: RegClassId) -> bool {
        true
    }

    /// Base and offset of a load or store, when the target can decode them.
    fn mem_operand<'a>(&self, inst: &'a Inst) -> Option<&'a MemOperand> {
        inst.mem.as_ref()
    }
}

pub const GPR: RegClassId = RegClassId(0);
pub const FPR: RegClassId = RegClassId(1);

lazy_static! {
    static ref GENERIC_CLASSES: Vec<RegClass> = vec![
        RegClass {
            name: "gpr",
            weight: 1,
            limit: 16,
        },
        RegClass {
            name: "fpr",
            weight: 1,
            limit: 16,
        },
    ];
}

/// A plain RISC-like register file: 32 integer registers, one unit each,
/// register 0 hardwired to zero. Enough target for tests and for embedders
/// that have not written their own description yet.
#[derive(Debug, Default)]
pub struct GenericTarget;

impl Target for GenericTarget {
    fn num_reg_classes(&self) -> usize {
        GENERIC_CLASSES.len()
    }

    fn reg_class(&self, id: RegClassId) -> &RegClass {
        &GENERIC_CLASSES[id.0]
    }

    fn num_reg_units(&self) -> usize {
        32
    }

    fn reg_units(&self, reg: PhysReg) -> Vec<RegUnit> {
        vec![RegUnit(reg.0)]
    }

    fn is_constant_phys_reg(&self, reg: PhysReg) -> bool {
        reg.0 == 0
    }

    fn is_cheap_as_move(&self, inst: &Inst) -> bool {
        matches!(inst.opcode, Opcode::Copy | Opcode::Op("li") | Opcode::Op("mov"))
    }
}
