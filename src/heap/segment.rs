//! Chain-walking helpers shared by equality/entailment checks and by join's
//! segment-introduction step (§4.4).

use crate::heap::core::SymHeap;
use crate::heap::object::{BindingOff, ObjKind};
use crate::ids::{ObjId, ValId};
use std::collections::HashSet;

const MAX_CHAIN_WALK: usize = 4096;

/// Walks concrete nodes reachable from `start` via `binding.next`, stopping
/// at the first non-concrete node, a dangling/non-address value, or a
/// repeat (defensive cycle guard — well-formed SLS/DLS chains are acyclic
/// per spec). Returns the visited concrete nodes in order and the address
/// value the walk stopped at (the chain's eventual tail binding: `VAL_NULL`,
/// an existing segment's entry address, or a dangling sentinel).
pub fn walk_concrete_chain(h: &SymHeap, start: ValId, binding: BindingOff) -> (Vec<ObjId>, ValId) {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cur = start;
    for _ in 0..MAX_CHAIN_WALK {
        let obj = h.target(cur);
        let idx = match obj.index() {
            Some(i) => i,
            None => break,
        };
        if h.objects()[idx].kind != ObjKind::Concrete {
            break;
        }
        if !seen.insert(obj) {
            break;
        }
        let next_field_addr = match h.peek_offset(cur, binding.next as i64) {
            Some(a) => a,
            None => break,
        };
        let next_field_obj = h.obj_at_offset(next_field_addr);
        if next_field_obj.is_sentinel() {
            break;
        }
        chain.push(obj);
        cur = h.read_value(next_field_obj);
    }
    (chain, cur)
}

/// The exit address of an abstract segment object: the value its (`value`)
/// slot holds, per the simplified placeholder representation `set_abstract`
/// builds (§4.2 design note in `heap::core`).
pub fn segment_exit(h: &SymHeap, seg: ObjId) -> ValId {
    h.read_value(seg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ClType, Field, TypeKind, TypeTable};
    use crate::heap::object::Storage;
    use std::sync::Arc;

    fn node_type(table: &mut TypeTable) -> (crate::ids::TypeId, BindingOff) {
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let placeholder = table.intern(ClType::scalar(TypeKind::Unknown, 0));
        let ptr_ty = table.intern(ClType::pointer(placeholder));
        let node_ty = table.intern(ClType::aggregate(
            TypeKind::Struct,
            vec![
                Field { offset: 0, name: "next".into(), ty: ptr_ty },
                Field { offset: 8, name: "value".into(), ty: int_ty },
            ],
            16,
        ));
        (node_ty, BindingOff::singly_linked(0, 0))
    }

    #[test]
    fn walk_stops_at_null() {
        let mut table = TypeTable::new();
        let (node_ty, binding) = node_type(&mut table);
        let mut h = SymHeap::new(Arc::new(table));
        let n1 = h.root_create(node_ty, None, Storage::Heap).unwrap();
        let n1_addr = h.address_of(n1);
        let next_field_off = h.offset_by(n1_addr, 0).unwrap();
        let next_field = h.obj_at_offset(next_field_off);
        h.write_value(next_field, ValId::NULL).unwrap();

        let (chain, tail) = walk_concrete_chain(&h, n1_addr, binding);
        assert_eq!(chain, vec![n1]);
        assert_eq!(tail, ValId::NULL);
    }

    #[test]
    fn walk_follows_two_nodes() {
        let mut table = TypeTable::new();
        let (node_ty, binding) = node_type(&mut table);
        let mut h = SymHeap::new(Arc::new(table));
        let n1 = h.root_create(node_ty, None, Storage::Heap).unwrap();
        let n2 = h.root_create(node_ty, None, Storage::Heap).unwrap();
        let n1_addr = h.address_of(n1);
        let n2_addr = h.address_of(n2);
        let n1_next_off = h.offset_by(n1_addr, 0).unwrap();
        let n1_next = h.obj_at_offset(n1_next_off);
        let n2_next_off = h.offset_by(n2_addr, 0).unwrap();
        let n2_next = h.obj_at_offset(n2_next_off);
        h.write_value(n1_next, n2_addr).unwrap();
        h.write_value(n2_next, ValId::NULL).unwrap();

        let (chain, tail) = walk_concrete_chain(&h, n1_addr, binding);
        assert_eq!(chain, vec![n1, n2]);
        assert_eq!(tail, ValId::NULL);
    }
}
