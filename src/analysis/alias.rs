use crate::mir::{Inst, MemBase, MemOperand};
use crate::target::Target;

/// The seam to whatever alias information the embedding compiler has.
pub trait AliasQuery {
    fn may_alias(&self, a: &MemOperand, b: &MemOperand) -> bool;
}

/// Assumes everything aliases. The safe default when no alias information
/// survives lowering.
#[derive(Debug, Default)]
pub struct ConservativeAlias;

impl AliasQuery for ConservativeAlias {
    fn may_alias(&self, _a: &MemOperand, _b: &MemOperand) -> bool {
        true
    }
}

/// Disambiguates by base and offset: read-only regions never alias writable
/// ones, distinct frame slots and globals never alias each other, and
/// accesses off the same base with known sizes are checked for overlap.
#[derive(Debug, Default)]
pub struct BaseOffsetAlias;

impl AliasQuery for BaseOffsetAlias {
    fn may_alias(&self, a: &MemOperand, b: &MemOperand) -> bool {
        if a.base.is_read_only() || b.base.is_read_only() {
            return a.base == b.base && ranges_overlap(a, b);
        }

        match (a.base, b.base) {
            (MemBase::Frame(x), MemBase::Frame(y)) => x == y && ranges_overlap(a, b),
            (MemBase::Global(x), MemBase::Global(y)) => x == y && ranges_overlap(a, b),
            (MemBase::Reg(x), MemBase::Reg(y)) => x != y || ranges_overlap(a, b),
            // A register base may point anywhere writable.
            _ => true,
        }
    }
}

fn ranges_overlap(a: &MemOperand, b: &MemOperand) -> bool {
    if a.size == 0 || b.size == 0 {
        return true;
    }
    a.offset < b.offset + b.size as i64 && b.offset < a.offset + a.size as i64
}

/// Whether two instructions' memory accesses may touch the same location.
/// Descriptors come from the target; an access the target cannot decode is
/// assumed to touch everything.
pub fn insts_may_alias(target: &dyn Target, aa: &dyn AliasQuery, a: &Inst, b: &Inst) -> bool {
    if !(a.may_load() || a.may_store()) || !(b.may_load() || b.may_store()) {
        return false;
    }
    match (target.mem_operand(a), target.mem_operand(b)) {
        (Some(a), Some(b)) => aa.may_alias(a, b),
        _ => true,
    }
}
