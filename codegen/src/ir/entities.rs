//! IR entity references.
//!
//! Entities in a [`Unit`](crate::ir::Unit) reference each other through
//! typed `u32` indices into the unit's arenas rather than through Rust
//! references: the use-def and control-flow graphs are full of back-edges
//! that ownership rules would otherwise make painful, and 32-bit indices
//! keep the in-memory representation compact.

use crate::entity::entity_impl;

/// An opaque reference to an SSA value.
///
/// Constants, globals, functions, blocks, formal arguments and instruction
/// results are all values; the discriminating payload lives in
/// [`ValueData`](crate::ir::ValueData).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to a basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to a function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Func(u32);
entity_impl!(Func, "fn");

/// An opaque reference to a global variable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Global(u32);
entity_impl!(Global, "gv");

/// An opaque reference to an external symbol registered on the unit.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtSym(u32);
entity_impl!(ExtSym, "sym");
