//! Static register file descriptions.
//!
//! Each target provides a table of register descriptors (name, class,
//! aliases) and a table of register classes (member registers, spill size
//! and alignment). Physical and virtual registers share one `u32` id space
//! split at [`VREG_START`](crate::mir::VREG_START); everything below the
//! target's descriptor count is physical.

use crate::datalayout::DataLayout;
use crate::ir::types::{Type, TypeStore};
use crate::mir::{self, Reg};

/// A physical register descriptor.
pub struct RegisterDesc {
    /// Assembly name.
    pub name: &'static str,
    /// The class the register belongs to.
    pub class: u32,
    /// Registers occupying the same hardware storage at other widths.
    pub aliases: &'static [Reg],
}

/// A register class: the registers an allocator color can be drawn from.
pub struct RegisterClassData {
    /// Member registers, ordered so that same-storage registers sit at the
    /// same index across width classes.
    pub regs: &'static [Reg],
    /// Spill slot size in bytes.
    pub size: u64,
    /// Spill slot alignment in bytes.
    pub align: u64,
}

/// Target register file queries.
pub trait RegisterInfo: Send + Sync {
    /// The descriptor of a physical register.
    fn desc(&self, reg: Reg) -> &RegisterDesc;

    /// Number of physical registers.
    fn num_regs(&self) -> usize;

    /// A register class by id.
    fn class(&self, class: u32) -> &RegisterClassData;

    /// Number of register classes.
    fn num_classes(&self) -> usize;

    /// The class a value of `ty` is allocated from.
    fn class_for_type(&self, types: &TypeStore, layout: &DataLayout, ty: Type) -> u32;

    /// The primary floating-point class id.
    fn fp_class(&self) -> u32;

    /// Is `class` one of the floating-point classes?
    fn is_fp_class(&self, class: u32) -> bool {
        class == self.fp_class()
    }

    /// Caller-saved registers, in save order.
    fn caller_saved(&self) -> &'static [Reg];

    /// Callee-saved registers, in save order.
    fn callee_saved(&self) -> &'static [Reg];

    /// Registers of `class` never handed to the allocator.
    fn reserved(&self, class: u32) -> &'static [Reg];

    /// Registers of `class` available for coloring.
    fn available(&self, class: u32) -> &'static [Reg];

    /// Is `reg` a physical register of this target?
    fn is_physical(&self, reg: Reg) -> bool {
        (reg.0 as usize) < self.num_regs()
    }

    /// The assembly name of a physical register.
    fn name(&self, reg: Reg) -> &'static str {
        self.desc(reg).name
    }

    /// The alias of `reg` whose class is `size` bytes wide, if any.
    fn with_size(&self, reg: Reg, size: u64) -> Option<Reg> {
        let desc = self.desc(reg);
        if self.class(desc.class).size == size {
            return Some(reg);
        }
        desc.aliases
            .iter()
            .copied()
            .find(|&alias| self.class(self.desc(alias).class).size == size)
    }

    /// Do `a` and `b` name the same hardware storage (possibly at different
    /// widths)?
    fn is_same_register(&self, a: Reg, b: Reg) -> bool {
        if a == b {
            return true;
        }
        if !self.is_physical(a) || !self.is_physical(b) {
            return false;
        }
        self.desc(a).aliases.contains(&b) || self.desc(b).aliases.contains(&a)
    }

    /// The smallest-id alias of `reg`, used as the canonical storage name.
    fn canonical(&self, reg: Reg) -> Reg {
        if !self.is_physical(reg) {
            return reg;
        }
        let min_alias = self
            .desc(reg)
            .aliases
            .iter()
            .copied()
            .min()
            .unwrap_or(reg);
        if reg < min_alias {
            reg
        } else {
            min_alias
        }
    }

    /// The class of a physical or virtual register.
    fn class_of(&self, reg: Reg, func: &mir::Function) -> u32 {
        if self.is_physical(reg) {
            self.desc(reg).class
        } else {
            func.vreg_class(reg)
        }
    }
}
