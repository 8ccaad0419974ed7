//! End-to-end lowering checks for the x86-64 backend.
//!
//! These build IR through the public builder, run the full pass pipeline,
//! and assert on the emitted assembly text. Execution-based checks
//! (assemble, link, run) live with the external driver.

use keel_codegen::context::Context;
use keel_codegen::ir::{Builder, Linkage, Opcode, Unit};
use keel_codegen::isa::{self, FileType};
use keel_codegen::passes::{OptLevel, PassManager};
use keel_codegen::verifier::verify_function;
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

/// `fib(n) = n < 2 ? n : fib(n-1) + fib(n-2)`, the classic recursion.
fn build_fib(ctx: &mut Context, unit: &mut Unit) {
    let i32t = ctx.types.int(32);
    let fn_ty = ctx.types.function(i32t, vec![i32t], false);
    let fib = unit.get_or_insert_function("fib", fn_ty, Linkage::External);
    let fib_val = unit.func_value(fib);

    let mut b = Builder::new(unit, ctx, fib);
    let entry = b.create_block("entry");
    let base = b.create_block("base");
    let recurse = b.create_block("recurse");
    b.position_at_end(entry);
    let n = b.arg(0);
    let two = b.unit.iconst(i32t, 2);
    let is_base = b.create_cmp(Opcode::ICmpLt, n, two);
    b.create_cond_br(base, recurse, is_base);

    b.position_at_end(base);
    b.create_ret(Some(n));

    b.position_at_end(recurse);
    let one = b.unit.iconst(i32t, 1);
    let n1 = b.create_sub(n, one);
    let f1 = b.create_call(fib_val, &[n1]);
    let two = b.unit.iconst(i32t, 2);
    let n2 = b.create_sub(n, two);
    let f2 = b.create_call(fib_val, &[n2]);
    let sum = b.create_add(f1, f2);
    b.create_ret(Some(sum));
}

#[test]
fn fib_recursion_lowers_to_sysv_assembly() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("fib");
    build_fib(&mut ctx, &mut unit);
    let fib = {
        let (func, _) = unit.funcs.iter().next().unwrap();
        func
    };
    verify_function(&unit, fib).unwrap();

    let asm = compile(&mut ctx, &mut unit, "x86_64-unknown-linux-gnu", OptLevel::O0);

    assert!(asm.contains(".globl fib"));
    assert!(asm.contains("fib:"));
    // Recursion survives lowering as direct calls.
    assert!(asm.contains("\tcall fib"));
    // Frame discipline: rbp-based prologue and epilogue.
    assert!(asm.contains("\tpush rbp"));
    assert!(asm.contains("\tmov rbp, rsp"));
    assert!(asm.contains("\tpop rbp"));
    assert!(asm.contains("\tret"));
    // The first argument arrives in edi under SysV.
    assert!(asm.contains("edi"), "missing SysV argument register:\n{asm}");
    // Allocation left no virtual registers behind.
    assert!(!asm.contains("%v"), "virtual register leaked:\n{asm}");
}

#[test]
fn frame_sizes_stay_aligned() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("frames");
    let i64t = ctx.types.int(64);
    let fn_ty = ctx.types.function(i64t, vec![], false);
    let func = unit.get_or_insert_function("locals", fn_ty, Linkage::External);
    let mut b = Builder::new(&mut unit, &mut ctx, func);
    let entry = b.create_block("entry");
    b.position_at_end(entry);
    // Three mismatched slots force padding.
    let a = b.create_alloca(i64t);
    let i8t = b.ctx.types.int(8);
    let _ = b.create_alloca(i8t);
    let _ = b.create_alloca(i64t);
    let v = b.unit.iconst(i64t, 7);
    b.create_store(a, v);
    let loaded = b.create_load(a);
    b.create_ret(Some(loaded));

    let asm = compile(&mut ctx, &mut unit, "x86_64-unknown-linux-gnu", OptLevel::O0);
    for line in asm.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("sub rsp, ") {
            let size: i64 = rest.parse().expect("numeric frame size");
            assert_eq!(size % 16, 0, "unaligned frame: {line}");
        }
    }
}

#[test]
fn struct_return_uses_two_registers() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("pair");
    let i64t = ctx.types.int(64);
    let pair_ty = ctx.types.struct_("pair", vec![i64t, i64t]);
    let fn_ty = ctx.types.function(pair_ty, vec![], false);
    let make_pair = unit.get_or_insert_function("make_pair", fn_ty, Linkage::External);

    // make_pair returns {7, 35} through a stack temporary.
    let mut b = Builder::new(&mut unit, &mut ctx, make_pair);
    let entry = b.create_block("entry");
    b.position_at_end(entry);
    let slot = b.create_alloca(pair_ty);
    let i32t = b.ctx.types.int(32);
    let zero = b.unit.iconst(i32t, 0);
    let one = b.unit.iconst(i32t, 1);
    let p0 = b.create_gep(slot, &[zero, zero]);
    let v7 = b.unit.iconst(i64t, 7);
    b.create_store(p0, v7);
    let p1 = b.create_gep(slot, &[zero, one]);
    let v35 = b.unit.iconst(i64t, 35);
    b.create_store(p1, v35);
    let value = b.create_load(slot);
    b.create_ret(Some(value));

    // main sums both fields.
    let main_ty = ctx.types.function(i64t, vec![], false);
    let main = unit.get_or_insert_function("main", main_ty, Linkage::External);
    let make_pair_val = unit.func_value(make_pair);
    let mut b = Builder::new(&mut unit, &mut ctx, main);
    let entry = b.create_block("entry");
    b.position_at_end(entry);
    let pair = b.create_call(make_pair_val, &[]);
    let lo = b.create_extract_value(pair, 0);
    let hi = b.create_extract_value(pair, 1);
    let sum = b.create_add(lo, hi);
    b.create_ret(Some(sum));

    let asm = compile(&mut ctx, &mut unit, "x86_64-unknown-linux-gnu", OptLevel::O0);
    // SysV returns 16-byte aggregates in rax:rdx; both sides must mention
    // both registers.
    assert!(asm.contains("rax"), "missing rax:\n{asm}");
    assert!(asm.contains("rdx"), "missing rdx:\n{asm}");
    assert!(asm.contains("\tcall make_pair"));
    assert!(!asm.contains("%v"));
}

#[test]
fn float_compare_branches_on_flags() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("fcmp");
    let f64t = ctx.types.float(64);
    let i32t = ctx.types.int(32);
    let fn_ty = ctx.types.function(i32t, vec![f64t], false);
    let func = unit.get_or_insert_function("above_pi", fn_ty, Linkage::External);
    let mut b = Builder::new(&mut unit, &mut ctx, func);
    let entry = b.create_block("entry");
    let yes = b.create_block("yes");
    let no = b.create_block("no");
    b.position_at_end(entry);
    let x = b.arg(0);
    let pi = b.unit.fconst(f64t, 3.14);
    let gt = b.create_cmp(Opcode::FCmpGt, x, pi);
    b.create_cond_br(yes, no, gt);
    b.position_at_end(yes);
    let one = b.unit.iconst(i32t, 1);
    b.create_ret(Some(one));
    b.position_at_end(no);
    let zero = b.unit.iconst(i32t, 0);
    b.create_ret(Some(zero));

    let asm = compile(&mut ctx, &mut unit, "x86_64-unknown-linux-gnu", OptLevel::O0);
    // The constant lands in the pool and the compare fuses into ja.
    assert!(asm.contains(".LCPIabove_pi_0"), "missing pool entry:\n{asm}");
    assert!(asm.contains("\tucomisd"), "missing float compare:\n{asm}");
    assert!(asm.contains("\tja "), "missing fused branch:\n{asm}");
}

#[test]
fn lea_addition_is_gated_behind_o1() {
    fn build(ctx: &mut Context, unit: &mut Unit) {
        let i64t = ctx.types.int(64);
        let fn_ty = ctx.types.function(i64t, vec![i64t, i64t], false);
        let func = unit.get_or_insert_function("padd", fn_ty, Linkage::External);
        let mut b = Builder::new(unit, ctx, func);
        let entry = b.create_block("entry");
        b.position_at_end(entry);
        let sum = b.create_add(b.arg(0), b.arg(1));
        b.create_ret(Some(sum));
    }

    let mut ctx = Context::new();
    let mut unit = Unit::new("o0");
    build(&mut ctx, &mut unit);
    let at_o0 = compile(&mut ctx, &mut unit, "x86_64-unknown-linux-gnu", OptLevel::O0);
    assert!(!at_o0.contains("\tlea"), "lea leaked into O0:\n{at_o0}");

    let mut ctx = Context::new();
    let mut unit = Unit::new("o1");
    build(&mut ctx, &mut unit);
    let at_o1 = compile(&mut ctx, &mut unit, "x86_64-unknown-linux-gnu", OptLevel::O1);
    assert!(at_o1.contains("\tlea"), "lea missing at O1:\n{at_o1}");
}

#[test]
fn win64_uses_rcx_for_the_first_argument() {
    let mut ctx = Context::new();
    let mut unit = Unit::new("w64");
    let i32t = ctx.types.int(32);
    let fn_ty = ctx.types.function(i32t, vec![i32t], false);
    let func = unit.get_or_insert_function("ident", fn_ty, Linkage::External);
    let mut b = Builder::new(&mut unit, &mut ctx, func);
    let entry = b.create_block("entry");
    b.position_at_end(entry);
    let arg = b.arg(0);
    b.create_ret(Some(arg));

    let asm = compile(&mut ctx, &mut unit, "x86_64-pc-windows-msvc", OptLevel::O0);
    assert!(asm.contains("ecx"), "missing Win64 argument register:\n{asm}");
}
