//! Read-only inspection views over a [`SymHeap`] (§6.3): the iterators an
//! external renderer (or the CLI's `--dump`) walks to draw a heap without
//! reaching into its arenas directly. This module draws no pictures and
//! writes no files — it is the visitor contract a plotter would consume.

use crate::heap::value::ValueCode;
use crate::heap::SymHeap;
use crate::ids::{ObjId, ValId};

/// A directed edge from an address value to the object it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEdge {
    pub from: ValId,
    pub to: ObjId,
}

/// A parent-to-child edge within one aggregate object's sub-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubEdge {
    pub parent: ObjId,
    pub child: ObjId,
}

/// A recorded disequality between two values (§3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeqEdge {
    pub a: ValId,
    pub b: ValId,
}

/// A borrowing view over one heap's contents for inspection.
pub struct Inspection<'h> {
    heap: &'h SymHeap,
}

impl<'h> Inspection<'h> {
    pub fn new(heap: &'h SymHeap) -> Self {
        Self { heap }
    }

    /// Every live object id, in arena allocation order.
    pub fn objects(&self) -> impl Iterator<Item = ObjId> + 'h {
        (0..self.heap.object_count()).map(ObjId::from_index)
    }

    /// Every live value id, in arena allocation order.
    pub fn values(&self) -> impl Iterator<Item = ValId> + 'h {
        (0..self.heap.value_count()).map(ValId::from_index)
    }

    /// One edge per address-valued value whose target resolves to a dense
    /// (non-sentinel) object.
    pub fn pointer_edges(&self) -> impl Iterator<Item = PointerEdge> + 'h {
        let heap = self.heap;
        self.values().filter_map(move |v| {
            let value = heap.value(v)?;
            if !value.is_address() {
                return None;
            }
            let to = heap.target(v);
            if to.is_sentinel() {
                None
            } else {
                Some(PointerEdge { from: v, to })
            }
        })
    }

    /// One edge per aggregate object's direct child.
    pub fn sub_edges(&self) -> impl Iterator<Item = SubEdge> + 'h {
        let heap = self.heap;
        self.objects().flat_map(move |parent| {
            let children = heap.object(parent).map(|o| o.sub_fields.clone()).unwrap_or_default();
            children.into_iter().map(move |child| SubEdge { parent, child })
        })
    }

    /// Every recorded disequality pair.
    pub fn neq_edges(&self) -> impl Iterator<Item = NeqEdge> + 'h {
        self.heap.neq_pairs().map(|&(a, b)| NeqEdge { a, b })
    }

    /// A `(code-label, is_address)` summary for `--dump`, avoiding a direct
    /// `ValueCode` match at the call site.
    pub fn describe_value(&self, v: ValId) -> Option<(&'static str, bool)> {
        let value = self.heap.value(v)?;
        let label = match &value.code {
            ValueCode::Heap => "heap",
            ValueCode::Custom(_) => "custom",
            ValueCode::Composite(_) => "composite",
            ValueCode::Unknown => "unknown",
            ValueCode::Lost => "lost",
            ValueCode::Deleted => "deleted",
            ValueCode::Static => "static",
            ValueCode::OnStack => "on_stack",
            ValueCode::OnHeap => "on_heap",
            ValueCode::Abstract => "abstract",
        };
        Some((label, value.is_address()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ClType, Field, TypeKind, TypeTable};
    use crate::heap::object::Storage;
    use std::sync::Arc;

    #[test]
    fn pointer_edges_follow_address_values_to_their_targets() {
        let mut table = TypeTable::new();
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let placeholder = table.intern(ClType::scalar(TypeKind::Unknown, 0));
        let ptr_ty = table.intern(ClType::pointer(placeholder));
        let node_ty = table.intern(ClType::aggregate(
            TypeKind::Struct,
            vec![Field { offset: 0, name: "next".into(), ty: ptr_ty }, Field { offset: 8, name: "value".into(), ty: int_ty }],
            16,
        ));
        let mut h = SymHeap::new(Arc::new(table));
        let a = h.root_create(node_ty, None, Storage::Heap).unwrap();
        let b = h.root_create(node_ty, None, Storage::Heap).unwrap();
        let b_addr = h.address_of(b);
        let a_addr = h.address_of(a);
        let a_next = h.offset_by(a_addr, 0).unwrap();
        let a_next_obj = h.obj_at_offset(a_next);
        h.write_value(a_next_obj, b_addr).unwrap();

        let inspection = Inspection::new(&h);
        let edges: Vec<_> = inspection.pointer_edges().filter(|e| e.to == b).collect();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn sub_edges_enumerate_direct_children_only() {
        let mut table = TypeTable::new();
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let node_ty = table.intern(ClType::aggregate(
            TypeKind::Struct,
            vec![Field { offset: 0, name: "value".into(), ty: int_ty }],
            4,
        ));
        let mut h = SymHeap::new(Arc::new(table));
        let root = h.root_create(node_ty, None, Storage::Heap).unwrap();
        let inspection = Inspection::new(&h);
        let edges: Vec<_> = inspection.sub_edges().filter(|e| e.parent == root).collect();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn neq_edges_reflect_recorded_disequalities() {
        let table = TypeTable::new();
        let mut h = SymHeap::new(Arc::new(table));
        h.neq_add(ValId::TRUE, ValId::NULL);
        let inspection = Inspection::new(&h);
        assert_eq!(inspection.neq_edges().count(), 1);
    }
}
