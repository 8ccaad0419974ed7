//! Keel code generation library.
//!
//! This crate is the core of a retargetable compiler back-end: it consumes a
//! typed, SSA-form intermediate representation of a whole translation unit
//! and lowers it to machine code for one of the supported targets (x86-64
//! and AArch64).
//!
//! The pipeline is organized as a sequence of passes over a shared
//! [`ir::Unit`]:
//!
//! 1. Instruction selection builds a per-block DAG of target-neutral
//!    operation nodes and covers it with target patterns, producing machine
//!    IR ([`mir`]) over virtual registers.
//! 2. Target lowering expands pseudo-instructions (calls, returns, switches,
//!    φ-resolution, va_start/va_end), applies the calling convention, and
//!    finalizes the stack frame.
//! 3. Register allocation assigns physical registers by graph coloring,
//!    spilling where necessary.
//! 4. A final pass saves and restores clobbered registers around calls and
//!    in the function prologue/epilogue.
//!
//! Backends are looked up by target triple through [`isa::lookup`].

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub use cranelift_entity as entity;

pub mod context;
pub mod datalayout;
pub mod dominator_tree;
pub mod ir;
pub mod isa;
pub mod isel;
pub mod loop_analysis;
pub mod mir;
pub mod passes;
pub mod pipeline;
pub mod regalloc;
pub mod verifier;

mod fx;
mod result;

pub use crate::context::Context;
pub use crate::result::{CodegenError, CodegenResult};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
