//! The pass manager.
//!
//! Compilation is single-threaded and cooperative: passes run serially over
//! a shared unit, and within a pass one function is fully processed before
//! the next begins. The machine-IR artifacts produced along the way live in
//! a [`CompileState`] owned by the manager, keyed by IR function.

use crate::context::Context;
use crate::fx::FxHashMap;
use crate::ir;
use crate::ir::unit::Unit;
use crate::mir;
use crate::result::CodegenResult;

/// Optimization level.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum OptLevel {
    /// Mandatory lowering only.
    O0,
    /// Standard optimizations; also unlocks gated selection patterns.
    O1,
    /// Reserved.
    O2,
}

/// Mutable state threaded through the passes of one compilation.
pub struct CompileState {
    /// Machine functions, one per lowered IR function.
    pub machine: FxHashMap<ir::Func, mir::Function>,
    /// Accumulated assembly text, when assembly output was requested.
    pub output: String,
}

impl CompileState {
    /// Fresh, empty state.
    pub fn new() -> Self {
        Self {
            machine: FxHashMap::default(),
            output: String::new(),
        }
    }

    /// The machine function of `func`.
    pub fn machine_func(&mut self, func: ir::Func) -> &mut mir::Function {
        self.machine.get_mut(&func).expect("function not lowered yet")
    }
}

impl Default for CompileState {
    fn default() -> Self {
        Self::new()
    }
}

/// A compilation pass over a unit.
pub trait Pass {
    /// Diagnostic name.
    fn name(&self) -> &'static str;

    /// Run the pass over the whole unit.
    fn run(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        state: &mut CompileState,
    ) -> CodegenResult<()>;
}

/// Runs passes in registration order.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Append a pass.
    pub fn add(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Run every pass over `unit`, returning the final state.
    pub fn run(&mut self, ctx: &mut Context, unit: &mut Unit) -> CodegenResult<CompileState> {
        let mut state = CompileState::new();
        for pass in &mut self.passes {
            log::debug!("running pass {}", pass.name());
            pass.run(ctx, unit, &mut state)?;
        }
        Ok(state)
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}
