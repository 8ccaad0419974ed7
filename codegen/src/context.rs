//! The compilation context.
//!
//! A [`Context`] owns the process-wide interners shared by every translation
//! unit compiled against it: the type store and the machine-immediate cache.
//! Interned handles are pointer-stable in the arena sense; two structurally
//! equal requests always return the same index.
//!
//! Compilation is single-threaded; if functions are ever compiled in
//! parallel, the context is the synchronization boundary.

use crate::fx::FxHashMap;
use crate::ir::types::{Type, TypeStore};
use crate::mir::{ImmSize, Operand, RegFlags};

/// Process-wide interners and target bookkeeping.
pub struct Context {
    /// The type store. All types used by units compiled with this context
    /// are interned here.
    pub types: TypeStore,
    immediates: FxHashMap<(i64, ImmSize, RegFlags), Operand>,
}

impl Context {
    /// Create a fresh context.
    pub fn new() -> Self {
        Self {
            types: TypeStore::new(),
            immediates: FxHashMap::default(),
        }
    }

    /// Get the void type.
    pub fn void_type(&self) -> Type {
        self.types.void()
    }

    /// Get the 1-bit integer type.
    pub fn i1_type(&mut self) -> Type {
        self.types.int(1)
    }

    /// Get the 8-bit integer type.
    pub fn i8_type(&mut self) -> Type {
        self.types.int(8)
    }

    /// Get the 16-bit integer type.
    pub fn i16_type(&mut self) -> Type {
        self.types.int(16)
    }

    /// Get the 32-bit integer type.
    pub fn i32_type(&mut self) -> Type {
        self.types.int(32)
    }

    /// Get the 64-bit integer type.
    pub fn i64_type(&mut self) -> Type {
        self.types.int(64)
    }

    /// Get the 32-bit float type.
    pub fn f32_type(&mut self) -> Type {
        self.types.float(32)
    }

    /// Get the 64-bit float type.
    pub fn f64_type(&mut self) -> Type {
        self.types.float(64)
    }

    /// Get an integer machine immediate operand, interned by
    /// `(value, size, flags)`.
    pub fn imm(&mut self, value: i64, size: ImmSize) -> Operand {
        self.imm_with_flags(value, size, RegFlags::empty())
    }

    /// Like [`Context::imm`] but carrying operand flags.
    pub fn imm_with_flags(&mut self, value: i64, size: ImmSize, flags: RegFlags) -> Operand {
        *self
            .immediates
            .entry((value, size, flags))
            .or_insert(Operand::Imm(value, size))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
