//! End-to-end lowering checks for the AArch64 backend.

use keel_codegen::context::Context;
use keel_codegen::ir::{Builder, Linkage, Unit, ValueFlags};
use keel_codegen::isa::{self, FileType};
use keel_codegen::passes::{OptLevel, PassManager};
use std::str::FromStr;
use target_lexicon::Triple;

fn compile(ctx: &mut Context, unit: &mut Unit, triple: &str, level: OptLevel) -> String {
    let _ = env_logger::builder().is_test(true).try_init();
    let isa = isa::lookup(Triple::from_str(triple).unwrap()).unwrap();
    let mut pm = PassManager::new();
    isa.add_passes_for_code_generation(&mut pm, FileType::Assembly, level)
        .unwrap();
    let state = pm.run(ctx, unit).unwrap();
    state.output
}

/// `classify(x)` maps 0..=4 to 1..=5 and everything else to 0: five dense
/// cases, which must select the jump-table strategy.
fn build_classify(ctx: &mut Context, unit: &mut Unit) {
    let i32t = ctx.types.int(32);
    let fn_ty = ctx.types.function(i32t, vec![i32t], false);
    let func = unit.get_or_insert_function("classify", fn_ty, Linkage::External);
    let mut b = Builder::new(unit, ctx, func);
    let entry = b.create_block("entry");
    let default = b.create_block("default");
    let arms: Vec<_> = (0..5).map(|i| b.create_block(&format!("case{i}"))).collect();
    b.position_at_end(entry);
    let x = b.arg(0);
    let cases: Vec<_> = (0..5)
        .map(|i| (b.unit.iconst(i32t, i), arms[i as usize]))
        .collect();
    b.create_switch(x, default, &cases);
    for (i, &arm) in arms.iter().enumerate() {
        b.position_at_end(arm);
        let result = b.unit.iconst(i32t, i as i64 + 1);
        b.create_ret(Some(result));
    }
    b.position_at_end(default);
    let zero = b.unit.iconst(i32t, 0);
    b.create_ret(Some(zero));
}

#[test]
fn dense_switch_builds_a_jump_table() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("switch");
    build_classify(&mut ctx, &mut unit);

    let asm = compile(&mut ctx, &mut unit, "aarch64-unknown-linux-gnu", OptLevel::O1);

    // The table is an internal rodata array of block addresses.
    assert!(asm.contains("classify.jt0:"), "missing jump table:\n{asm}");
    assert_eq!(
        asm.matches("\t.quad .Lclassify_").count(),
        5,
        "table must hold one entry per case:\n{asm}"
    );
    // Range check against the case span, then an indirect branch.
    assert!(asm.contains("\tb.lt"), "missing lower range check:\n{asm}");
    assert!(asm.contains("\tb.gt"), "missing upper range check:\n{asm}");
    assert!(asm.contains("lsl #3"), "missing scaled table load:\n{asm}");
    assert!(asm.contains("\tbr "), "missing indirect branch:\n{asm}");
    assert!(!asm.contains("%v"));
}

#[test]
fn sparse_switch_prefers_a_cascade() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("sparse");
    let i32t = ctx.types.int(32);
    let fn_ty = ctx.types.function(i32t, vec![i32t], false);
    let func = unit.get_or_insert_function("pick", fn_ty, Linkage::External);
    let mut b = Builder::new(&mut unit, &mut ctx, func);
    let entry = b.create_block("entry");
    let default = b.create_block("default");
    let a = b.create_block("a");
    let c = b.create_block("c");
    b.position_at_end(entry);
    let x = b.arg(0);
    // Two cases spread over a span of 1000: density 0.002.
    let k1 = b.unit.iconst(i32t, 0);
    let k2 = b.unit.iconst(i32t, 999);
    b.create_switch(x, default, &[(k1, a), (k2, c)]);
    for (block, value) in [(a, 1), (c, 2), (default, 0)] {
        b.position_at_end(block);
        let v = b.unit.iconst(i32t, value);
        b.create_ret(Some(v));
    }

    let asm = compile(&mut ctx, &mut unit, "aarch64-unknown-linux-gnu", OptLevel::O0);
    assert!(!asm.contains(".jt"), "sparse switch built a table:\n{asm}");
    assert!(asm.contains("\tb.eq"), "missing cascade compare:\n{asm}");
}

#[test]
fn byval_struct_argument_reads_the_incoming_frame() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("byval");
    let i64t = ctx.types.int(64);
    let triple_ty = ctx.types.struct_("triple", vec![i64t, i64t, i64t]);
    let ptr_ty = ctx.types.pointer(triple_ty);
    let fn_ty = ctx.types.function(i64t, vec![ptr_ty], false);
    let func = unit.get_or_insert_function("sum3", fn_ty, Linkage::External);
    let mut b = Builder::new(&mut unit, &mut ctx, func);
    let arg = b.arg(0);
    b.unit.values[arg].flags.insert(ValueFlags::BYVAL);
    let entry = b.create_block("entry");
    b.position_at_end(entry);
    let i32t = b.ctx.types.int(32);
    let zero = b.unit.iconst(i32t, 0);
    let mut sum = None;
    for i in 0..3 {
        let idx = b.unit.iconst(i32t, i);
        let field_ptr = b.create_gep(arg, &[zero, idx]);
        let field = b.create_load(field_ptr);
        sum = Some(match sum {
            None => field,
            Some(acc) => b.create_add(acc, field),
        });
    }
    b.create_ret(sum);

    let asm = compile(&mut ctx, &mut unit, "aarch64-unknown-linux-gnu", OptLevel::O0);
    // The aggregate lives above the frame record; its address comes from
    // x29 plus a positive offset.
    assert!(
        asm.contains("add") && asm.contains("x29, #16"),
        "missing incoming-frame address:\n{asm}"
    );
    assert!(!asm.contains("%v"));
}

#[test]
fn callee_saved_registers_pair_into_stp() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("stp");
    let i64t = ctx.types.int(64);
    let fn_ty = ctx.types.function(i64t, vec![i64t], false);
    let callee_ty = ctx.types.function(i64t, vec![], false);
    let helper = unit.get_or_insert_function("helper", callee_ty, Linkage::External);
    let helper_val = unit.func_value(helper);
    let func = unit.get_or_insert_function("keepalive", fn_ty, Linkage::External);
    let mut b = Builder::new(&mut unit, &mut ctx, func);
    let entry = b.create_block("entry");
    b.position_at_end(entry);
    let x = b.arg(0);
    // x is live across the call, forcing a save.
    let r = b.create_call(helper_val, &[]);
    let sum = b.create_add(x, r);
    b.create_ret(Some(sum));

    let asm = compile(&mut ctx, &mut unit, "aarch64-unknown-linux-gnu", OptLevel::O0);
    // Frame record plus at least one register saved around the call.
    assert!(asm.contains("\tstp x29, x30, [sp, #-16]!"), "missing frame record:\n{asm}");
    assert!(asm.contains("\tldp x29, x30, [sp], #16"), "missing frame restore:\n{asm}");
    assert!(asm.contains("\tbl helper"));
    let saves = asm.matches("\tstp ").count();
    assert!(saves >= 2, "expected a register save around the call:\n{asm}");
}

#[test]
fn macho_symbols_get_underscores() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("macho");
    let i32t = ctx.types.int(32);
    let fn_ty = ctx.types.function(i32t, vec![i32t], false);
    let func = unit.get_or_insert_function("ident", fn_ty, Linkage::External);
    let mut b = Builder::new(&mut unit, &mut ctx, func);
    let entry = b.create_block("entry");
    b.position_at_end(entry);
    let x = b.arg(0);
    b.create_ret(Some(x));

    let asm = compile(&mut ctx, &mut unit, "aarch64-apple-darwin", OptLevel::O0);
    assert!(asm.contains("_ident:"), "missing mangled symbol:\n{asm}");
}
