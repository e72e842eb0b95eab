use std::fmt;

/// A virtual register. Has exactly one definition for the lifetime of the
/// pre-allocation passes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VirtReg(pub u32);

/// A physical register from the target's bounded register file.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PhysReg(pub u16);

/// The smallest unit of aliasing between physical registers. Two physical
/// registers overlap iff they share a unit.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RegUnit(pub u16);

/// Index into the target's register class table.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RegClassId(pub usize);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Reg {
    Virtual(VirtReg),
    Physical(PhysReg),
}

impl Reg {
    pub fn is_virtual(self) -> bool {
        matches!(self, Reg::Virtual(_))
    }

    pub fn is_physical(self) -> bool {
        matches!(self, Reg::Physical(_))
    }

    pub fn as_virtual(self) -> Option<VirtReg> {
        match self {
            Reg::Virtual(reg) => Some(reg),
            Reg::Physical(_) => None,
        }
    }

    pub fn as_physical(self) -> Option<PhysReg> {
        match self {
            Reg::Physical(reg) => Some(reg),
            Reg::Virtual(_) => None,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reg::Virtual(reg) => write!(f, "v{}", reg.0),
            Reg::Physical(reg) => write!(f, "r{}", reg.0),
        }
    }
}

/// Which lanes of a register a value occupies. Only the post-allocation
/// sinker cares; everything else uses `ALL`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct LaneMask(pub u32);

impl LaneMask {
    pub const NONE: LaneMask = LaneMask(0);
    pub const ALL: LaneMask = LaneMask(u32::MAX);

    pub fn any(self) -> bool {
        self.0 != 0
    }
}

impl std::ops::BitOr for LaneMask {
    type Output = LaneMask;

    fn bitor(self, rhs: LaneMask) -> LaneMask {
        LaneMask(self.0 | rhs.0)
    }
}
