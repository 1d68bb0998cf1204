//! Join / entailment (C4, §4.4).
//!
//! This is a deliberately scoped implementation of the spec's algorithm
//! sketch: it handles exact structural matches, strict entailment in either
//! direction, and the single-linked-list divergence pattern (one side
//! shorter, or empty, where the other has a concrete chain) that the
//! fixed-point driver actually needs to stabilize a loop header. General
//! struct layouts with multiple independent pointer fields are merged
//! field-by-field without segment introduction on any field but the
//! self-referential `next` pointer at offset 0 — see `DESIGN.md`.

use crate::heap::core::SymHeap;
use crate::heap::equality::sh_equal;
use crate::heap::object::{BindingOff, ObjKind, Storage, VarRef};
use crate::heap::segment;
use crate::heap::value::ValueCode;
use crate::ids::{ObjId, TypeId, ValId};
use std::collections::HashMap;

/// Outcome of [`join`] (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// `H1 ≡ H2`.
    UseAny,
    /// `H2 ⊑ H1` strictly.
    UseSh1,
    /// `H1 ⊑ H2` strictly.
    UseSh2,
    /// Neither entails the other; a common abstraction was built.
    ThreeWay,
}

/// `None` means join failed: no finite common abstraction exists. Callers
/// (state containers, C5) fall back to appending the unmerged heap.
pub fn join(h1: &SymHeap, h2: &SymHeap) -> Option<(JoinStatus, SymHeap)> {
    if sh_equal(h1, h2) {
        return Some((JoinStatus::UseAny, h1.clone()));
    }
    if entails(h2, h1) {
        return Some((JoinStatus::UseSh1, h1.clone()));
    }
    if entails(h1, h2) {
        return Some((JoinStatus::UseSh2, h2.clone()));
    }
    three_way(h1, h2).map(|h| (JoinStatus::ThreeWay, h))
}

/// The self-referential binding this crate's segment introduction supports:
/// a pointer field at offset 0 that points to the next node of the same
/// type (§9 design note on scope).
const SELF_NEXT: BindingOff = BindingOff { head: 0, next: 0, prev: None };

// ---- entailment ---------------------------------------------------------

/// `true` iff every fact `small` states is an instance of what `big` states
/// (`big ⊒ small`): `big`'s abstractions are allowed to be strictly more
/// general than `small`'s concrete structure.
fn entails(small: &SymHeap, big: &SymHeap) -> bool {
    let small_vars = small.gather_cvars();
    if small_vars != big.gather_cvars() {
        return false;
    }
    let mut memo = HashMap::new();
    for (uid, inst) in small_vars {
        let (Some(so), Some(bo)) = (small.var_object(uid, inst), big.var_object(uid, inst)) else {
            return false;
        };
        if !obj_entails(small, so, big, bo, &mut memo) {
            return false;
        }
    }
    true
}

fn obj_entails(
    small: &SymHeap,
    s: ObjId,
    big: &SymHeap,
    b: ObjId,
    memo: &mut HashMap<(ObjId, ObjId), bool>,
) -> bool {
    if let Some(&cached) = memo.get(&(s, b)) {
        return cached;
    }
    // Assume success while descending: a later contradiction at the same
    // pair re-derives `false` through the recursion that found it, not
    // through this memo entry (co-inductive comparison of shared/cyclic
    // structure).
    memo.insert((s, b), true);

    let (s_idx, b_idx) = match (s.index(), b.index()) {
        (Some(si), Some(bi)) => (si, bi),
        _ => {
            let ok = s == b;
            memo.insert((s, b), ok);
            return ok;
        }
    };
    let s_sub = small.objects()[s_idx].sub_fields.clone();
    let b_sub = big.objects()[b_idx].sub_fields.clone();
    let ok = if !s_sub.is_empty() || !b_sub.is_empty() {
        s_sub.len() == b_sub.len()
            && s_sub
                .iter()
                .zip(b_sub.iter())
                .all(|(&sc, &bc)| obj_entails(small, sc, big, bc, memo))
    } else {
        let sv = small.read_value(s);
        let bv = big.read_value(b);
        values_correspond(small, sv, big, bv, memo)
    };
    memo.insert((s, b), ok);
    ok
}

fn values_correspond(
    small: &SymHeap,
    sv: ValId,
    big: &SymHeap,
    bv: ValId,
    memo: &mut HashMap<(ObjId, ObjId), bool>,
) -> bool {
    if sv.is_sentinel() || bv.is_sentinel() {
        return sv == bv;
    }
    let sval = &small.values()[sv.index().unwrap()];
    let bval = &big.values()[bv.index().unwrap()];
    if !sval.is_address() || !bval.is_address() {
        return sval.code == bval.code;
    }
    let to = small.target(sv);
    let tb = big.target(bv);
    if to.is_sentinel() || tb.is_sentinel() {
        return to == tb;
    }
    let tb_idx = tb.index().unwrap();
    if big.objects()[tb_idx].kind.is_abstract() {
        let binding = big.objects()[tb_idx].binding.unwrap();
        let min_len = big.objects()[tb_idx].min_len;
        let (chain, small_tail) = segment::walk_concrete_chain(small, sv, binding);
        if (chain.len() as u8) < min_len {
            return false;
        }
        let exit_big = segment::segment_exit(big, tb);
        return values_correspond(small, small_tail, big, exit_big, memo);
    }
    obj_entails(small, to, big, tb, memo)
}

// ---- three-way merge ------------------------------------------------------

struct Merger<'a> {
    h1: &'a SymHeap,
    h2: &'a SymHeap,
    result: SymHeap,
    map: HashMap<(ObjId, ObjId), ObjId>,
}

/// Attempts to build a single heap over-approximating both `h1` and `h2`.
fn three_way(h1: &SymHeap, h2: &SymHeap) -> Option<SymHeap> {
    if h1.gather_cvars() != h2.gather_cvars() {
        return None;
    }
    let mut m = Merger { h1, h2, result: SymHeap::new(h1.types_arc()), map: HashMap::new() };
    for (uid, inst) in h1.gather_cvars() {
        let o1 = h1.var_object(uid, inst)?;
        let o2 = h2.var_object(uid, inst)?;
        let ty = h1.objects()[o1.index()?].ty?;
        let storage = h1.objects()[o1.index()?].storage;
        let var = VarRef { c_var_uid: uid, inst };
        let merged = m.result.root_create(ty, Some(var), storage).ok()?;
        m.map.insert((o1, o2), merged);
        m.merge_into(o1, o2, merged)?;
    }
    Some(m.result)
}

impl<'a> Merger<'a> {
    fn merge_into(&mut self, o1: ObjId, o2: ObjId, merged: ObjId) -> Option<()> {
        let sub1 = self.h1.objects()[o1.index()?].sub_fields.clone();
        let sub2 = self.h2.objects()[o2.index()?].sub_fields.clone();
        if !sub1.is_empty() || !sub2.is_empty() {
            if sub1.len() != sub2.len() {
                return None;
            }
            let merged_sub = self.result.objects()[merged.index()?].sub_fields.clone();
            if merged_sub.len() != sub1.len() {
                return None;
            }
            for ((&c1, &c2), &mc) in sub1.iter().zip(sub2.iter()).zip(merged_sub.iter()) {
                self.merge_into(c1, c2, mc)?;
            }
            return Some(());
        }
        let v1 = self.h1.read_value(o1);
        let v2 = self.h2.read_value(o2);
        let merged_val = self.merge_value(v1, v2)?;
        self.result.write_value(merged, merged_val).ok()
    }

    fn merge_value(&mut self, sv: ValId, bv: ValId) -> Option<ValId> {
        if sv == bv && sv.is_sentinel() {
            return Some(sv);
        }
        let s_addr = !sv.is_sentinel() && self.h1.values()[sv.index()?].is_address();
        let b_addr = !bv.is_sentinel() && self.h2.values()[bv.index()?].is_address();
        let sv_is_null_like = sv == ValId::NULL;
        let bv_is_null_like = bv == ValId::NULL;

        if (sv_is_null_like || s_addr) && (bv_is_null_like || b_addr) {
            return self.merge_chain_value(sv, bv);
        }

        if sv.is_sentinel() || bv.is_sentinel() {
            return if sv == bv { Some(sv) } else { None };
        }
        let scode = &self.h1.values()[sv.index()?].code;
        let bcode = &self.h2.values()[bv.index()?].code;
        if scode == bcode {
            Some(self.result.intern_custom(scode.clone()))
        } else {
            None
        }
    }

    /// Merges two address-or-null values, introducing a `MAY_EXIST`/`SLS`
    /// segment when the two sides' chains have different lengths.
    fn merge_chain_value(&mut self, sv: ValId, bv: ValId) -> Option<ValId> {
        let (len1, tail1, ty1) = self.chain_info(Side::One, sv);
        let (len2, tail2, ty2) = self.chain_info(Side::Two, bv);

        if len1 == 0 && len2 == 0 {
            return self.merge_value(tail1, tail2);
        }
        let node_ty = ty1.or(ty2)?;
        if ty1.is_some() && ty2.is_some() && ty1 != ty2 {
            return None;
        }

        let min_len = len1.min(len2);
        let exit = self.merge_value(tail1, tail2)?;
        let seg = self.result.root_create(node_ty, None, Storage::Heap).ok()?;
        let kind = if min_len == 0 { ObjKind::MayExist } else { ObjKind::Sls };
        self.result.set_abstract(seg, kind, SELF_NEXT, min_len, exit).ok()?;
        Some(self.result.address_of(seg))
    }

    /// `(min_len, exit, node_type)` for a possibly-null, possibly-already-
    /// abstract chain value on one side of the join.
    fn chain_info(&self, side: Side, val: ValId) -> (u8, ValId, Option<TypeId>) {
        let h = side.heap(self.h1, self.h2);
        if val.is_sentinel() {
            return (0, val, None);
        }
        let target = h.target(val);
        let idx = match target.index() {
            Some(i) => i,
            None => return (0, val, None),
        };
        let obj = &h.objects()[idx];
        if obj.kind.is_concrete() {
            let (chain, tail) = segment::walk_concrete_chain(h, val, SELF_NEXT);
            (chain.len() as u8, tail, obj.ty)
        } else {
            (obj.min_len, segment::segment_exit(h, target), obj.ty)
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    One,
    Two,
}

impl Side {
    fn heap<'a>(self, h1: &'a SymHeap, h2: &'a SymHeap) -> &'a SymHeap {
        match self {
            Side::One => h1,
            Side::Two => h2,
        }
    }
}

impl SymHeap {
    /// Allocates a fresh value carrying `code`'s payload, used when
    /// transplanting a matched scalar into a freshly built merge result.
    pub(crate) fn intern_custom(&mut self, code: ValueCode) -> ValId {
        use std::collections::BTreeSet;
        self.alloc_value(crate::heap::value::Value {
            code,
            ty: None,
            points_to: ObjId::INVALID,
            offset: 0,
            base: ValId::INVALID,
            used_by: BTreeSet::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ClType, Field, TypeKind, TypeTable};
    use crate::heap::object::Storage;
    use std::sync::Arc;

    fn list_node_type(table: &mut TypeTable) -> TypeId {
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let placeholder = table.intern(ClType::scalar(TypeKind::Unknown, 0));
        let ptr_ty = table.intern(ClType::pointer(placeholder));
        table.intern(ClType::aggregate(
            TypeKind::Struct,
            vec![
                Field { offset: 0, name: "next".into(), ty: ptr_ty },
                Field { offset: 8, name: "value".into(), ty: int_ty },
            ],
            16,
        ))
    }

    #[test]
    fn join_of_equal_heaps_is_use_any() {
        let mut table = TypeTable::new();
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let types = Arc::new(table);
        let mut h1 = SymHeap::new(types.clone());
        h1.root_create(int_ty, Some(VarRef { c_var_uid: 1, inst: 0 }), Storage::Stack).unwrap();
        let h2 = h1.clone();
        let (status, _) = join(&h1, &h2).expect("join should succeed");
        assert_eq!(status, JoinStatus::UseAny);
    }

    #[test]
    fn join_widens_null_and_one_node_into_may_exist() {
        let mut table = TypeTable::new();
        let node_ty = list_node_type(&mut table);
        let types = Arc::new(table);

        let mut h1 = SymHeap::new(types.clone());
        let var = VarRef { c_var_uid: 1, inst: 0 };
        let p1 = h1.root_create(node_ty, Some(var), Storage::Stack).unwrap();
        h1.write_value(p1, ValId::NULL).unwrap();

        let mut h2 = SymHeap::new(types.clone());
        let p2 = h2.root_create(node_ty, Some(var), Storage::Stack).unwrap();
        let n2 = h2.root_create(node_ty, None, Storage::Heap).unwrap();
        let n2_addr = h2.address_of(n2);
        let n2_next_off = h2.offset_by(n2_addr, 0).unwrap();
        let n2_next = h2.obj_at_offset(n2_next_off);
        h2.write_value(n2_next, ValId::NULL).unwrap();
        h2.write_value(p2, n2_addr).unwrap();

        let (status, joined) = join(&h1, &h2).expect("join should succeed");
        assert_eq!(status, JoinStatus::ThreeWay);
        let merged_var = joined.var_object(1, 0).unwrap();
        let merged_val = joined.read_value(merged_var);
        let seg = joined.target(merged_val);
        assert!(seg.index().is_some());
    }
}
