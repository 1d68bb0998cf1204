//! `ClType` — the opaque, immutable type handle the symbolic heap consumes (§3.1).
//!
//! Types are owned by a [`TypeTable`], interned once and never mutated after
//! insertion. A `TypeTable` is shared (via `Arc`) across every `SymHeap` built
//! against the same translation unit; the heap itself stores only [`TypeId`]
//! handles, never `ClType` values, so cloning a heap never clones type data.

use crate::ids::TypeId;
use std::collections::HashMap;

/// The kind tag of a [`ClType`], matching the source IR's coarse type lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Int,
    Bool,
    Char,
    Ptr,
    Struct,
    Union,
    Array,
    Fnc,
    Enum,
    String,
    Unknown,
}

/// One field of a struct/union type: its byte offset, name, and element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub offset: u32,
    pub name: String,
    pub ty: TypeId,
}

/// An immutable, interned type description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClType {
    pub kind: TypeKind,
    pub size_bytes: u32,
    /// Element type, for `Ptr` and `Array`.
    pub pointee: Option<TypeId>,
    /// Ordered fields, for `Struct`/`Union`; empty otherwise.
    pub fields: Vec<Field>,
    /// Array element count, when known (`None` for incomplete arrays).
    pub array_len: Option<u32>,
}

impl ClType {
    pub fn scalar(kind: TypeKind, size_bytes: u32) -> Self {
        Self {
            kind,
            size_bytes,
            pointee: None,
            fields: Vec::new(),
            array_len: None,
        }
    }

    pub fn pointer(pointee: TypeId) -> Self {
        Self {
            kind: TypeKind::Ptr,
            size_bytes: 8,
            pointee: Some(pointee),
            fields: Vec::new(),
            array_len: None,
        }
    }

    pub fn aggregate(kind: TypeKind, fields: Vec<Field>, size_bytes: u32) -> Self {
        debug_assert!(matches!(kind, TypeKind::Struct | TypeKind::Union));
        Self {
            kind,
            size_bytes,
            pointee: None,
            fields,
            array_len: None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, TypeKind::Struct | TypeKind::Union)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Ptr)
    }

    /// The field whose offset equals `offset`, if any.
    pub fn field_at(&self, offset: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.offset == offset)
    }
}

/// Append-only interner for [`ClType`]s, shared across every `SymHeap` of a
/// translation unit. Outlives all heaps referencing it (§5).
#[derive(Debug, Default)]
pub struct TypeTable {
    types: Vec<ClType>,
    by_shape: HashMap<ClType, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `ty`, returning the existing id if an identical type was
    /// already registered (structural interning, not just identity).
    pub fn intern(&mut self, ty: ClType) -> TypeId {
        if let Some(id) = self.by_shape.get(&ty) {
            return *id;
        }
        let id = TypeId::from_index(self.types.len());
        self.by_shape.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &ClType {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut table = TypeTable::new();
        let a = table.intern(ClType::scalar(TypeKind::Int, 4));
        let b = table.intern(ClType::scalar(TypeKind::Int, 4));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_shapes_get_distinct_ids() {
        let mut table = TypeTable::new();
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let ptr_ty = table.intern(ClType::pointer(int_ty));
        assert_ne!(int_ty, ptr_ty);
        assert!(table.get(ptr_ty).is_pointer());
    }

    #[test]
    fn struct_field_lookup_by_offset() {
        let mut table = TypeTable::new();
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let ptr_ty = table.intern(ClType::pointer(int_ty));
        let struct_ty = ClType::aggregate(
            TypeKind::Struct,
            vec![
                Field { offset: 0, name: "next".into(), ty: ptr_ty },
                Field { offset: 8, name: "value".into(), ty: int_ty },
            ],
            16,
        );
        let id = table.intern(struct_ty);
        let resolved = table.get(id);
        assert_eq!(resolved.field_at(8).unwrap().name, "value");
        assert!(resolved.field_at(4).is_none());
    }
}
