//! Interned type descriptions.
//!
//! Types are immutable and hash-consed: any two types with identical
//! structural content receive the same [`Type`] handle from the store, so
//! type equality is index equality. Handles are compact `u32` entity
//! references into the [`TypeStore`] owned by the [`Context`].
//!
//! [`Context`]: crate::context::Context

use crate::entity::{entity_impl, PrimaryMap};
use crate::fx::FxHashMap;
use core::fmt;

/// An opaque reference to an interned type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(u32);
entity_impl!(Type, "ty");

/// The structural content of a type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeData {
    /// The empty type of instructions that produce no value.
    Void,
    /// An integer type of 1, 8, 16, 32 or 64 bits.
    Int {
        /// Width in bits.
        bits: u8,
    },
    /// An IEEE-754 binary32 or binary64 floating point type.
    Float {
        /// Width in bits.
        bits: u8,
    },
    /// A pointer to a value of the pointee type.
    Pointer {
        /// The type pointed to.
        pointee: Type,
    },
    /// A fixed-length homogeneous aggregate.
    Array {
        /// Element type.
        element: Type,
        /// Number of elements.
        count: u32,
    },
    /// A named heterogeneous aggregate with ordered fields.
    Struct {
        /// The struct's name; part of its identity.
        name: String,
        /// The ordered field types. Empty for a forward declaration until
        /// [`TypeStore::update_struct`] closes it.
        fields: Vec<Type>,
    },
    /// A function signature.
    Function {
        /// The return type; `Void` for none.
        ret: Type,
        /// The ordered parameter types.
        params: Vec<Type>,
        /// Whether the function accepts variable arguments after `params`.
        vararg: bool,
    },
}

/// The hash-consing store for types.
///
/// All interning goes through the `intern_*` methods; `TypeData` values are
/// never constructed by callers directly.
pub struct TypeStore {
    data: PrimaryMap<Type, TypeData>,
    interned: FxHashMap<TypeData, Type>,
    void: Type,
}

impl TypeStore {
    /// Create a store with the `void` type pre-interned.
    pub fn new() -> Self {
        let mut data = PrimaryMap::new();
        let mut interned = FxHashMap::default();
        let void = data.push(TypeData::Void);
        interned.insert(TypeData::Void, void);
        Self {
            data,
            interned,
            void,
        }
    }

    fn intern(&mut self, ty: TypeData) -> Type {
        if let Some(&found) = self.interned.get(&ty) {
            return found;
        }
        let handle = self.data.push(ty.clone());
        self.interned.insert(ty, handle);
        handle
    }

    /// Get the void type.
    pub fn void(&self) -> Type {
        self.void
    }

    /// Intern an integer type. `bits` must be one of 1, 8, 16, 32, 64.
    pub fn int(&mut self, bits: u8) -> Type {
        debug_assert!(matches!(bits, 1 | 8 | 16 | 32 | 64), "bad int width");
        self.intern(TypeData::Int { bits })
    }

    /// Intern a float type. `bits` must be 32 or 64.
    pub fn float(&mut self, bits: u8) -> Type {
        debug_assert!(matches!(bits, 32 | 64), "bad float width");
        self.intern(TypeData::Float { bits })
    }

    /// Intern a pointer type.
    pub fn pointer(&mut self, pointee: Type) -> Type {
        self.intern(TypeData::Pointer { pointee })
    }

    /// Intern an array type.
    pub fn array(&mut self, element: Type, count: u32) -> Type {
        self.intern(TypeData::Array { element, count })
    }

    /// Intern a struct type with the given name and field types.
    pub fn struct_(&mut self, name: &str, fields: Vec<Type>) -> Type {
        self.intern(TypeData::Struct {
            name: name.to_string(),
            fields,
        })
    }

    /// Close a forward-declared struct type by installing its fields.
    ///
    /// Allowed at most once per struct, while no constants of the struct
    /// exist. The interner is rehashed so later structurally-equal requests
    /// find the updated type.
    pub fn update_struct(&mut self, ty: Type, fields: Vec<Type>) {
        let old = self.data[ty].clone();
        let name = match old {
            TypeData::Struct { ref name, .. } => name.clone(),
            _ => panic!("update_struct on a non-struct type"),
        };
        self.interned.remove(&old);
        let new = TypeData::Struct { name, fields };
        self.data[ty] = new.clone();
        self.interned.insert(new, ty);
    }

    /// Intern a function type.
    pub fn function(&mut self, ret: Type, params: Vec<Type>, vararg: bool) -> Type {
        self.intern(TypeData::Function {
            ret,
            params,
            vararg,
        })
    }

    /// Get the structural content of `ty`.
    pub fn data(&self, ty: Type) -> &TypeData {
        &self.data[ty]
    }

    /// Is `ty` an integer type?
    pub fn is_int(&self, ty: Type) -> bool {
        matches!(self.data[ty], TypeData::Int { .. })
    }

    /// Is `ty` a float type?
    pub fn is_float(&self, ty: Type) -> bool {
        matches!(self.data[ty], TypeData::Float { .. })
    }

    /// Is `ty` the void type?
    pub fn is_void(&self, ty: Type) -> bool {
        matches!(self.data[ty], TypeData::Void)
    }

    /// Is `ty` a pointer type?
    pub fn is_pointer(&self, ty: Type) -> bool {
        matches!(self.data[ty], TypeData::Pointer { .. })
    }

    /// Is `ty` a struct type?
    pub fn is_struct(&self, ty: Type) -> bool {
        matches!(self.data[ty], TypeData::Struct { .. })
    }

    /// Is `ty` an array type?
    pub fn is_array(&self, ty: Type) -> bool {
        matches!(self.data[ty], TypeData::Array { .. })
    }

    /// Is `ty` a function type?
    pub fn is_function(&self, ty: Type) -> bool {
        matches!(self.data[ty], TypeData::Function { .. })
    }

    /// The width in bits of an integer or float type.
    pub fn bits(&self, ty: Type) -> u8 {
        match self.data[ty] {
            TypeData::Int { bits } | TypeData::Float { bits } => bits,
            _ => panic!("bits() on non-scalar type"),
        }
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self, ty: Type) -> Type {
        match self.data[ty] {
            TypeData::Pointer { pointee } => pointee,
            _ => panic!("pointee() on non-pointer type"),
        }
    }

    /// The field types of a struct type.
    pub fn struct_fields(&self, ty: Type) -> &[Type] {
        match self.data[ty] {
            TypeData::Struct { ref fields, .. } => fields,
            _ => panic!("struct_fields() on non-struct type"),
        }
    }

    /// The return type of a function type.
    pub fn return_type(&self, ty: Type) -> Type {
        match self.data[ty] {
            TypeData::Function { ret, .. } => ret,
            _ => panic!("return_type() on non-function type"),
        }
    }

    /// The parameter types of a function type.
    pub fn params(&self, ty: Type) -> &[Type] {
        match self.data[ty] {
            TypeData::Function { ref params, .. } => params,
            _ => panic!("params() on non-function type"),
        }
    }

    /// Whether a function type is vararg.
    pub fn is_vararg(&self, ty: Type) -> bool {
        match self.data[ty] {
            TypeData::Function { vararg, .. } => vararg,
            _ => false,
        }
    }

    /// Format `ty` for display.
    pub fn display(&self, ty: Type) -> DisplayType<'_> {
        DisplayType { store: self, ty }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper for printing a type in the textual IR format.
pub struct DisplayType<'a> {
    store: &'a TypeStore,
    ty: Type,
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.store.data(self.ty) {
            TypeData::Void => write!(f, "void"),
            TypeData::Int { bits } => write!(f, "i{bits}"),
            TypeData::Float { bits } => write!(f, "f{bits}"),
            TypeData::Pointer { pointee } => {
                write!(f, "{}*", self.store.display(pointee))
            }
            TypeData::Array { element, count } => {
                write!(f, "[{} x {}]", count, self.store.display(element))
            }
            TypeData::Struct { ref name, .. } => write!(f, "%{name}"),
            TypeData::Function {
                ret,
                ref params,
                vararg,
            } => {
                write!(f, "{} (", self.store.display(ret))?;
                for (i, &p) in params.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.store.display(p))?;
                }
                if vararg {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut store = TypeStore::new();
        let a = store.int(32);
        let b = store.int(32);
        assert_eq!(a, b);
        let p1 = store.pointer(a);
        let p2 = store.pointer(b);
        assert_eq!(p1, p2);
        assert_ne!(store.int(64), a);
        assert_eq!(store.function(a, vec![a, p1], false), {
            let i32t = store.int(32);
            let p = store.pointer(i32t);
            store.function(i32t, vec![i32t, p], false)
        });
    }

    #[test]
    fn struct_update_rehashes() {
        let mut store = TypeStore::new();
        let i64t = store.int(64);
        let fwd = store.struct_("pair", vec![]);
        store.update_struct(fwd, vec![i64t, i64t]);
        // A structurally equal request now resolves to the updated type.
        assert_eq!(store.struct_("pair", vec![i64t, i64t]), fwd);
        assert_eq!(store.struct_fields(fwd), &[i64t, i64t]);
    }

    #[test]
    fn display_forms() {
        let mut store = TypeStore::new();
        let i8t = store.int(8);
        let arr = store.array(i8t, 4);
        let ptr = store.pointer(arr);
        assert_eq!(format!("{}", store.display(ptr)), "[4 x i8]*");
    }
}
