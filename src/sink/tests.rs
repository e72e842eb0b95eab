use super::{sink, SinkOptions, SinkStats};
use crate::analysis::{BaseOffsetAlias, ConservativeAlias};
use crate::mir::{
    FuncBuilder, Function, Inst, MemBase, MemOperand, Opcode, Operand, PhysReg, Prob, Reg,
    RegOperand, VirtReg,
};
use crate::target::{GenericTarget, FPR, GPR};

fn v(reg: VirtReg) -> Reg {
    Reg::Virtual(reg)
}

fn frame(slot: i32) -> MemOperand {
    MemOperand {
        base: MemBase::Frame(slot),
        offset: 0,
        size: 8,
    }
}

fn run(func: &mut Function) -> SinkStats {
    let _ = env_logger::builder().is_test(true).try_init();
    sink(func, &GenericTarget, &ConservativeAlias, SinkOptions::default())
}

#[test]
fn sinks_into_the_branch_with_the_use() {
    let mut b = FuncBuilder::new("branch_use");
    let entry = b.block();
    let then = b.block();
    let other = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    let def = b.op_imm("li", v(x), 42);
    b.cond_br(v(c), then, other, Prob::even(2));
    b.set_block(then);
    b.op2("add", v(y), v(x), v(x));
    b.ret();
    b.set_block(other);
    b.ret();
    let mut func = b.finish();

    let stats = run(&mut func);

    assert_eq!(stats.sunk, 1);
    assert_eq!(func.inst(def).block, then);
    assert_eq!(func.block(then).insts[0], def);
    // The branch condition is used locally and must stay put.
    assert_eq!(func.block(entry).insts.len(), 2);

    // A second run finds nothing left to do.
    assert!(!run(&mut func).changed());
}

#[test]
fn sinks_past_a_diamond_into_a_dominated_join() {
    let mut b = FuncBuilder::new("dominated_join");
    let entry = b.block();
    let left = b.block();
    let right = b.block();
    let join = b.block();
    let escape = b.block();

    let c = b.vreg(GPR);
    let c2 = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    b.op_imm("li", v(c2), 2);
    let def = b.op_imm("li", v(x), 42);
    b.cond_br(v(c), left, right, Prob::even(2));
    b.set_block(left);
    b.cond_br(v(c2), join, escape, Prob::even(2));
    b.set_block(right);
    b.br(join);
    b.set_block(join);
    b.op2("add", v(y), v(x), v(x));
    b.ret();
    b.set_block(escape);
    b.ret();
    let mut func = b.finish();

    let stats = run(&mut func);

    // The join is not a successor of the entry, but the entry immediately
    // dominates it, so the definition still lands there. The second branch
    // condition sinks into the left arm on the way.
    assert_eq!(stats.sunk, 2);
    assert_eq!(func.inst(def).block, join);
    assert_eq!(func.block(join).insts[0], def);
    assert_eq!(stats.edges_split, 0);
}

#[test]
fn does_not_sink_to_a_post_dominating_join() {
    let mut b = FuncBuilder::new("postdom_join");
    let entry = b.block();
    let left = b.block();
    let right = b.block();
    let join = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    let def = b.op_imm("li", v(x), 42);
    b.cond_br(v(c), left, right, Prob::even(2));
    b.set_block(left);
    b.br(join);
    b.set_block(right);
    b.br(join);
    b.set_block(join);
    b.op2("add", v(y), v(x), v(x));
    b.ret();
    let mut func = b.finish();

    // Every path runs the instruction either way; moving it buys nothing.
    let stats = run(&mut func);
    assert!(!stats.changed());
    assert_eq!(func.inst(def).block, entry);
}

#[test]
fn local_use_pins_the_whole_chain() {
    let mut b = FuncBuilder::new("local_use");
    let entry = b.block();
    let then = b.block();
    let other = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    let z = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    b.op_imm("li", v(x), 7);
    b.op2("add", v(y), v(x), v(x));
    b.store(v(y), frame(0));
    b.cond_br(v(c), then, other, Prob::even(2));
    b.set_block(then);
    b.op2("add", v(z), v(x), v(y));
    b.ret();
    b.set_block(other);
    b.ret();
    let mut func = b.finish();

    // y feeds the store next to it, and x feeds y; neither may move even
    // though both are also read in the successor.
    let stats = run(&mut func);
    assert!(!stats.changed());
}

#[test]
fn splits_a_cold_edge_for_a_phi_only_use() {
    let cold = build_phi_edge_func(Prob::from_percent(10));
    let (mut func, def, entry, join) = cold;
    let stats = run(&mut func);

    assert_eq!(stats.edges_split, 1);
    assert_eq!(stats.sunk, 1);

    // The definition now sits in the block created on the entry -> join
    // edge, executing only when that edge is taken.
    let new = func.inst(def).block;
    assert_ne!(new, entry);
    assert_eq!(func.block(new).preds, vec![entry]);
    assert_eq!(func.block(new).succs, vec![join]);
    assert_eq!(func.block(new).insts[0], def);

    assert!(!run(&mut func).changed());
}

#[test]
fn keeps_a_likely_edge_intact() {
    let warm = build_phi_edge_func(Prob::from_percent(60));
    let (mut func, def, entry, _) = warm;
    let stats = run(&mut func);

    assert!(!stats.changed());
    assert_eq!(func.inst(def).block, entry);
}

/// entry -> join directly and via side; the only use of the definition is a
/// merge-point input along the entry -> join edge.
fn build_phi_edge_func(prob: Prob) -> (Function, crate::mir::InstId, crate::mir::BlockId, crate::mir::BlockId) {
    let mut b = FuncBuilder::new("phi_edge");
    let entry = b.block();
    let join = b.block();
    let side = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let w = b.vreg(GPR);
    let p = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    let def = b.op_imm("li", v(x), 42);
    b.cond_br(v(c), join, side, prob);
    b.set_block(side);
    b.op_imm("li", v(w), 7);
    b.br(join);
    b.set_block(join);
    b.phi(p, &[(v(x), entry), (v(w), side)]);
    b.ret();

    (b.finish(), def, entry, join)
}

#[test]
fn zero_frequency_successor_defers_to_loop_depth() {
    let mut b = FuncBuilder::new("cold_loop");
    let entry = b.block();
    let cold = b.block();
    let warm = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    let def = b.op_imm("li", v(x), 42);
    b.cond_br(v(c), cold, warm, Prob::NEVER);
    b.set_block(cold);
    b.cond_br(v(c), cold, warm, Prob::from_percent(90));
    b.set_block(warm);
    b.ret();
    let mut func = b.finish();

    let stats = run(&mut func);

    // The never-taken successor has no reliable frequency and sits in a
    // loop; depth ranks it behind the warm exit, which wins the sink.
    assert_eq!(stats.sunk, 1);
    assert_eq!(stats.edges_split, 0);
    assert_eq!(func.inst(def).block, warm);
}

#[test]
fn live_in_physical_register_blocks_the_sink() {
    let (mut func, def, entry, _) = build_phys_def_func(true);
    let stats = run(&mut func);
    assert_eq!(stats.sunk, 0);
    assert_eq!(func.inst(def).block, entry);
}

#[test]
fn dead_physical_def_sinks_when_not_live_in() {
    let (mut func, def, _, then) = build_phys_def_func(false);
    let stats = run(&mut func);
    assert_eq!(stats.sunk, 1);
    assert_eq!(func.inst(def).block, then);
}

/// A definition that also clobbers a dead condition-flags register.
fn build_phys_def_func(flags_live_in: bool) -> (Function, crate::mir::InstId, crate::mir::BlockId, crate::mir::BlockId) {
    let flags = PhysReg(5);

    let mut b = FuncBuilder::new("phys_def");
    let entry = b.block();
    let then = b.block();
    let other = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    let mut dead_flags = RegOperand::def(Reg::Physical(flags));
    dead_flags.is_dead = true;
    let def = b.inst(Inst::new(
        Opcode::Op("addi"),
        vec![
            Operand::Reg(RegOperand::def(v(x))),
            Operand::Imm(42),
            Operand::Reg(dead_flags),
        ],
    ));
    b.cond_br(v(c), then, other, Prob::even(2));
    b.set_block(then);
    if flags_live_in {
        b.live_in(then, flags, crate::mir::LaneMask::ALL);
    }
    b.op2("add", v(y), v(x), v(x));
    b.ret();
    b.set_block(other);
    b.ret();

    (b.finish(), def, entry, then)
}

#[test]
fn coalesces_a_forward_copy_and_sinks_the_chain() {
    let mut b = FuncBuilder::new("coalesce");
    let entry = b.block();
    let then = b.block();
    let other = b.block();

    let c = b.vreg(GPR);
    let a = b.vreg(GPR);
    let bb = b.vreg(GPR);
    let s = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    b.op_imm("li", v(a), 2);
    b.op_imm("li", v(bb), 3);
    let sum = b.op2("add", v(s), v(a), v(bb));
    b.copy(v(x), v(s));
    b.cond_br(v(c), then, other, Prob::even(2));
    b.set_block(then);
    let use_x = b.op2("add", v(y), v(x), v(x));
    b.ret();
    b.set_block(other);
    b.ret();
    let mut func = b.finish();

    let stats = run(&mut func);

    assert_eq!(stats.coalesced, 1);
    // The sum and both of its inputs follow the rewritten use down.
    assert_eq!(stats.sunk, 3);
    assert_eq!(func.inst(sum).block, then);

    // The use now reads the copy source directly.
    let op = func.inst(use_x).operands[1].as_reg().unwrap();
    assert_eq!(op.reg, v(s));

    // Only the branch condition and the branch remain.
    assert_eq!(func.block(entry).insts.len(), 2);
}

#[test]
fn aliasing_store_blocks_a_load_on_a_critical_edge() {
    let (mut func, load, header, _) = build_loop_load_func(0, 0);
    let stats = sink(
        &mut func,
        &GenericTarget,
        &BaseOffsetAlias,
        SinkOptions::default(),
    );
    assert_eq!(stats.sunk, 0);
    assert_eq!(func.inst(load).block, header);
}

#[test]
fn independent_store_lets_the_load_sink() {
    let (mut func, load, _, tail) = build_loop_load_func(1, 0);
    let stats = sink(
        &mut func,
        &GenericTarget,
        &BaseOffsetAlias,
        SinkOptions::default(),
    );
    assert_eq!(stats.sunk, 1);
    assert_eq!(func.inst(load).block, tail);
    assert_eq!(func.block(tail).insts[0], load);
}

/// A loop whose header loads from frame slot 0 and whose right arm stores to
/// `store_slot`, padded with `dbg_pad` debug annotations; the load's only
/// use is in the loop tail, behind a join.
fn build_loop_load_func(
    store_slot: i32,
    dbg_pad: u32,
) -> (Function, crate::mir::InstId, crate::mir::BlockId, crate::mir::BlockId) {
    let mut b = FuncBuilder::new("loop_load");
    let entry = b.block();
    let header = b.block();
    let left = b.block();
    let right = b.block();
    let tail = b.block();
    let exit = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    b.br(header);
    b.set_block(header);
    let load = b.load(x, frame(0));
    b.cond_br(v(c), left, right, Prob::even(2));
    b.set_block(left);
    b.br(tail);
    b.set_block(right);
    b.store(v(c), frame(store_slot));
    for i in 0..dbg_pad {
        b.dbg_value(v(c), crate::mir::DebugVar(i));
    }
    b.br(tail);
    b.set_block(tail);
    b.op2("add", v(y), v(x), v(x));
    b.cond_br(v(y), header, exit, Prob::from_percent(90));
    b.set_block(exit);
    b.ret();

    (b.finish(), load, header, tail)
}

#[test]
fn debug_annotations_do_not_count_against_the_scan_budget() {
    let (mut func, load, _, tail) = build_loop_load_func(1, 3);
    let options = SinkOptions {
        load_sink_inst_threshold: 2,
        ..SinkOptions::default()
    };
    let stats = sink(&mut func, &GenericTarget, &BaseOffsetAlias, options);

    // Three annotations pad the store's block past the threshold, but only
    // real instructions count toward the scan budget.
    assert_eq!(stats.sunk, 1);
    assert_eq!(func.inst(load).block, tail);
}

#[test]
fn shadowed_debug_annotations_go_undef_and_live_ones_travel() {
    let mut b = FuncBuilder::new("dbg");
    let entry = b.block();
    let then = b.block();
    let other = b.block();
    let var = crate::mir::DebugVar(0);

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    let def = b.op_imm("li", v(x), 42);
    let shadowed = b.dbg_value(v(x), var);
    let live = b.dbg_value(v(x), var);
    b.cond_br(v(c), then, other, Prob::even(2));
    b.set_block(then);
    b.op2("add", v(y), v(x), v(x));
    b.ret();
    b.set_block(other);
    b.ret();
    let mut func = b.finish();

    let stats = run(&mut func);
    assert_eq!(stats.sunk, 1);
    assert_eq!(func.inst(def).block, then);

    // Both originals are struck; re-ordering variable assignments is worse
    // than losing one.
    assert!(matches!(func.inst(shadowed).operands[0], Operand::Undef));
    assert!(matches!(func.inst(live).operands[0], Operand::Undef));

    // The unshadowed annotation travelled as a clone right after the def.
    let clone = func.block(then).insts[1];
    let inst = func.inst(clone);
    assert!(inst.is_dbg_value());
    assert_eq!(inst.var, Some(var));
    assert_eq!(inst.operands[0].as_reg().unwrap().reg, v(x));
}

#[test]
fn sunk_copy_forwards_its_debug_annotation() {
    let mut b = FuncBuilder::new("dbg_copy");
    let entry = b.block();
    let then = b.block();
    let other = b.block();
    let var = crate::mir::DebugVar(3);

    let c = b.vreg(GPR);
    let s = b.vreg(GPR);
    let s2 = b.vreg(GPR);
    let x = b.vreg(FPR);
    let y = b.vreg(FPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    b.op_imm("li", v(s), 5);
    b.op2("add", v(s2), v(s), v(s));
    let copy = b.copy(v(x), v(s2));
    let first = b.dbg_value(v(x), var);
    let second = b.dbg_value(v(x), var);
    b.cond_br(v(c), then, other, Prob::even(2));
    b.set_block(then);
    b.op2("fadd", v(y), v(x), v(x));
    b.ret();
    b.set_block(other);
    b.ret();
    let mut func = b.finish();

    let stats = run(&mut func);
    assert!(stats.sunk >= 1);
    assert_eq!(func.inst(copy).block, then);

    // The copy sank, so the shadowed annotation forwards to the copy source
    // instead of going dark.
    assert_eq!(func.inst(first).operands[0].as_reg().unwrap().reg, v(s2));
    assert_eq!(func.inst(second).operands[0].as_reg().unwrap().reg, v(s2));
}

#[test]
fn loop_sinking_moves_an_invariant_def_to_its_copy() {
    let mut b = FuncBuilder::new("loop_sink");
    let pre = b.block();
    let header = b.block();
    let exit = b.block();

    let cv = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(FPR);
    b.set_block(pre);
    b.op_imm("li", v(cv), 1);
    let def = b.op_imm("li", v(x), 42);
    b.br(header);
    b.set_block(header);
    b.copy(v(y), v(x));
    b.store(v(y), frame(0));
    b.cond_br(v(cv), header, exit, Prob::from_percent(90));
    b.set_block(exit);
    b.ret();
    let mut func = b.finish();

    let options = SinkOptions {
        enable_loop_sink: true,
        ..SinkOptions::default()
    };
    let stats = sink(&mut func, &GenericTarget, &ConservativeAlias, options);

    assert_eq!(stats.loop_sunk, 1);
    assert_eq!(func.inst(def).block, header);
    assert_eq!(func.block(header).insts[0], def);
    // The loop-variant condition stays in the preheader.
    assert_eq!(func.block(pre).insts.len(), 2);
}

#[test]
fn loop_sinking_is_off_by_default() {
    let mut b = FuncBuilder::new("loop_sink_off");
    let pre = b.block();
    let header = b.block();
    let exit = b.block();

    let cv = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(FPR);
    b.set_block(pre);
    b.op_imm("li", v(cv), 1);
    let def = b.op_imm("li", v(x), 42);
    b.br(header);
    b.set_block(header);
    b.copy(v(y), v(x));
    b.store(v(y), frame(0));
    b.cond_br(v(cv), header, exit, Prob::from_percent(90));
    b.set_block(exit);
    b.ret();
    let mut func = b.finish();

    let stats = run(&mut func);
    assert_eq!(stats.loop_sunk, 0);
    assert_eq!(func.inst(def).block, pre);
}

#[test]
fn convergent_instructions_stay_put() {
    let mut b = FuncBuilder::new("convergent");
    let entry = b.block();
    let then = b.block();
    let other = b.block();

    let c = b.vreg(GPR);
    let x = b.vreg(GPR);
    let y = b.vreg(GPR);
    b.set_block(entry);
    b.op_imm("li", v(c), 1);
    let def = b.op_imm("li", v(x), 42);
    b.cond_br(v(c), then, other, Prob::even(2));
    b.set_block(then);
    b.op2("add", v(y), v(x), v(x));
    b.ret();
    b.set_block(other);
    b.ret();
    let mut func = b.finish();
    func.inst_mut(def).flags = crate::mir::InstFlags::CONVERGENT;

    let stats = run(&mut func);
    assert_eq!(stats.sunk, 0);
    assert_eq!(func.inst(def).block, entry);
}
