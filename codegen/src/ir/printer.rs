//! Human-readable printing of IR units.
//!
//! The format is line-oriented and close to the usual SSA notation:
//!
//! ```text
//! fn @fib(i32) -> i32 {
//! entry:
//!     v0 = icmp.slt arg0, 2
//!     br v0, ret_n, recurse
//! ...
//! }
//! ```

use crate::context::Context;
use crate::ir::entities::{Func, Value};
use crate::ir::unit::Unit;
use crate::ir::value::ValueKind;
use core::fmt::{self, Write};

/// Write a whole unit to `w`.
pub fn write_unit(w: &mut dyn Write, ctx: &Context, unit: &Unit) -> fmt::Result {
    writeln!(w, "; unit {}", unit.name)?;
    for (gv, data) in unit.globals.iter() {
        let _ = gv;
        write!(w, "@{} = global {}", data.name, ctx.types.display(data.ty))?;
        match data.init {
            Some(init) => writeln!(w, " {}", value_ref(unit, init))?,
            None => writeln!(w, " external")?,
        }
    }
    for (func, _) in unit.funcs.iter() {
        write_function(w, ctx, unit, func)?;
    }
    Ok(())
}

/// Write one function to `w`.
pub fn write_function(
    w: &mut dyn Write,
    ctx: &Context,
    unit: &Unit,
    func: Func,
) -> fmt::Result {
    let data = &unit.funcs[func];
    let params = ctx.types.params(data.ty);
    write!(w, "fn @{}(", data.name)?;
    for (i, &p) in params.iter().enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}", ctx.types.display(p))?;
    }
    let ret = ctx.types.return_type(data.ty);
    write!(w, ") -> {}", ctx.types.display(ret))?;
    if data.is_declaration() {
        return writeln!(w, ";");
    }
    writeln!(w, " {{")?;
    for &block in &data.blocks {
        writeln!(w, "{}:", unit.blocks[block].name)?;
        for &inst in &unit.blocks[block].insts {
            let idata = &unit.insts[inst];
            write!(w, "    ")?;
            if let Some(result) = idata.result.expand() {
                if !ctx.types.is_void(unit.values[result].ty) {
                    write!(w, "{} = ", value_ref(unit, result))?;
                }
            }
            write!(w, "{}", idata.opcode.name())?;
            for (i, &op) in idata.operands.iter().enumerate() {
                write!(w, "{} {}", if i == 0 { "" } else { "," }, value_ref(unit, op))?;
            }
            writeln!(w)?;
        }
    }
    writeln!(w, "}}")
}

fn value_ref(unit: &Unit, val: Value) -> String {
    let data = &unit.values[val];
    match data.kind {
        ValueKind::ConstInt(v) => format!("{v}"),
        ValueKind::ConstFloat(bits) => format!("{}", f64::from_bits(bits)),
        ValueKind::ConstString(ref s) => format!("{s:?}"),
        ValueKind::ConstStruct(ref fields) => {
            let inner: Vec<String> = fields.iter().map(|&f| value_ref(unit, f)).collect();
            format!("{{ {} }}", inner.join(", "))
        }
        ValueKind::ConstArray(ref elems) => {
            let inner: Vec<String> = elems.iter().map(|&e| value_ref(unit, e)).collect();
            format!("[ {} ]", inner.join(", "))
        }
        ValueKind::ConstGep { base, ref indices } => {
            let inner: Vec<String> = indices.iter().map(|&i| value_ref(unit, i)).collect();
            format!("gep({}, {})", value_ref(unit, base), inner.join(", "))
        }
        ValueKind::Undef => "undef".to_string(),
        ValueKind::Null => "null".to_string(),
        ValueKind::GlobalVar(gv) => format!("@{}", unit.globals[gv].name),
        ValueKind::Func(func) => format!("@{}", unit.funcs[func].name),
        ValueKind::Block(block) => unit.blocks[block].name.clone(),
        ValueKind::Arg { index, .. } => format!("arg{index}"),
        ValueKind::Inst(_) => format!("%{}", data.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::function::Linkage;
    use crate::ir::Opcode;

    #[test]
    fn prints_a_small_function() {
        let mut ctx = Context::new();
        let mut unit = Unit::new("p");
        let i32t = ctx.types.int(32);
        let fn_ty = ctx.types.function(i32t, vec![i32t], false);
        let func = unit.get_or_insert_function("double", fn_ty, Linkage::External);
        let mut b = Builder::new(&mut unit, &mut ctx, func);
        let entry = b.create_block("entry");
        b.position_at_end(entry);
        let arg = b.arg(0);
        let sum = b.create_binary(Opcode::Add, arg, arg);
        b.create_ret(Some(sum));

        let mut out = String::new();
        write_function(&mut out, &ctx, &unit, func).unwrap();
        assert!(out.contains("fn @double(i32) -> i32 {"));
        assert!(out.contains("add arg0, arg0"));
        assert!(out.contains("ret %v0"));
    }
}
