//! Intrinsic functions.
//!
//! Intrinsics look like ordinary calls in the IR and are recognized by
//! callee during DAG construction, where they turn into dedicated chain
//! nodes instead of real calls.

use crate::context::Context;
use crate::ir::entities::Func;
use crate::ir::function::Linkage;
use crate::ir::unit::Unit;

/// The intrinsics understood by the back-end.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Intrinsic {
    /// Initialize a `va_list` at the start of a vararg body.
    VaStart,
    /// Tear down a `va_list`.
    VaEnd,
}

impl Intrinsic {
    /// The reserved symbol name of the intrinsic.
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::VaStart => "keel.va_start",
            Intrinsic::VaEnd => "keel.va_end",
        }
    }

    /// Recognize an intrinsic by symbol name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "keel.va_start" => Some(Intrinsic::VaStart),
            "keel.va_end" => Some(Intrinsic::VaEnd),
            _ => None,
        }
    }
}

impl Unit {
    /// Get the declaration of `intrinsic`, creating it if needed.
    ///
    /// Both current intrinsics have signature `void(i8*)`; the operand is a
    /// pointer to the `va_list` storage.
    pub fn intrinsic_function(&mut self, ctx: &mut Context, intrinsic: Intrinsic) -> Func {
        let i8_ty = ctx.types.int(8);
        let ptr = ctx.types.pointer(i8_ty);
        let void = ctx.types.void();
        let ty = ctx.types.function(void, vec![ptr], false);
        self.get_or_insert_function(intrinsic.name(), ty, Linkage::External)
    }
}
