//! Target data layout: sizes, alignments, and aggregate offsets.

use crate::ir::types::{Type, TypeData, TypeStore};

/// Size and alignment rules for a target.
///
/// Both supported targets are LP64 with natural scalar alignment, so a
/// single parameterized layout covers them.
#[derive(Clone, Copy, Debug)]
pub struct DataLayout {
    /// Size of a pointer in bytes.
    pub pointer_size: u64,
    /// Required stack alignment at function entry, in bytes.
    pub stack_align: u64,
}

impl DataLayout {
    /// The layout shared by x86-64 and AArch64.
    pub fn lp64() -> Self {
        Self {
            pointer_size: 8,
            stack_align: 16,
        }
    }

    /// The size of `ty` in bytes, including interior and tail padding for
    /// aggregates.
    pub fn size_of(&self, types: &TypeStore, ty: Type) -> u64 {
        match *types.data(ty) {
            TypeData::Void => 0,
            TypeData::Int { bits } => u64::from(bits.max(8)) / 8,
            TypeData::Float { bits } => u64::from(bits) / 8,
            TypeData::Pointer { .. } | TypeData::Function { .. } => self.pointer_size,
            TypeData::Array { element, count } => {
                self.size_of(types, element) * u64::from(count)
            }
            TypeData::Struct { ref fields, .. } => {
                let mut offset = 0;
                let mut align = 1;
                for &field in fields {
                    let fa = self.align_of(types, field);
                    align = align.max(fa);
                    offset = round_up(offset, fa) + self.size_of(types, field);
                }
                round_up(offset, align)
            }
        }
    }

    /// The ABI alignment of `ty` in bytes.
    pub fn align_of(&self, types: &TypeStore, ty: Type) -> u64 {
        match *types.data(ty) {
            TypeData::Void => 1,
            TypeData::Int { bits } => u64::from(bits.max(8)) / 8,
            TypeData::Float { bits } => u64::from(bits) / 8,
            TypeData::Pointer { .. } | TypeData::Function { .. } => self.pointer_size,
            TypeData::Array { element, .. } => self.align_of(types, element),
            TypeData::Struct { ref fields, .. } => fields
                .iter()
                .map(|&f| self.align_of(types, f))
                .max()
                .unwrap_or(1),
        }
    }

    /// The byte offset of field `index` within struct type `ty`.
    pub fn field_offset(&self, types: &TypeStore, ty: Type, index: usize) -> u64 {
        let fields = types.struct_fields(ty);
        let mut offset = 0;
        for &field in &fields[..index] {
            let fa = self.align_of(types, field);
            offset = round_up(offset, fa) + self.size_of(types, field);
        }
        round_up(offset, self.align_of(types, fields[index]))
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two() || align == 1);
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::TypeStore;

    #[test]
    fn scalar_sizes() {
        let mut types = TypeStore::new();
        let layout = DataLayout::lp64();
        let i1 = types.int(1);
        let i32t = types.int(32);
        let f64t = types.float(64);
        let p = types.pointer(i32t);
        assert_eq!(layout.size_of(&types, i1), 1);
        assert_eq!(layout.size_of(&types, i32t), 4);
        assert_eq!(layout.size_of(&types, f64t), 8);
        assert_eq!(layout.size_of(&types, p), 8);
    }

    #[test]
    fn struct_layout_pads_fields() {
        let mut types = TypeStore::new();
        let layout = DataLayout::lp64();
        let i8t = types.int(8);
        let i32t = types.int(32);
        let i64t = types.int(64);
        // { i8, i32, i64 } lays out as 0, 4, 8 with total size 16.
        let st = types.struct_("mixed", vec![i8t, i32t, i64t]);
        assert_eq!(layout.field_offset(&types, st, 0), 0);
        assert_eq!(layout.field_offset(&types, st, 1), 4);
        assert_eq!(layout.field_offset(&types, st, 2), 8);
        assert_eq!(layout.size_of(&types, st), 16);
        assert_eq!(layout.align_of(&types, st), 8);
    }

    #[test]
    fn array_of_structs() {
        let mut types = TypeStore::new();
        let layout = DataLayout::lp64();
        let i16t = types.int(16);
        let i64t = types.int(64);
        let st = types.struct_("e", vec![i16t, i64t]);
        let arr = types.array(st, 3);
        assert_eq!(layout.size_of(&types, st), 16);
        assert_eq!(layout.size_of(&types, arr), 48);
    }
}
