//! Canonical equality and fingerprint hashing (C3, §4.3).
//!
//! Two heaps are equal iff a canonical traversal — rooted at program-variable
//! objects in ascending `(cVarUid, inst)` order, then at dangling roots in a
//! stable fingerprint order, then at whatever is left over in arena order —
//! produces the same sequence of structural descriptors with ids replaced by
//! first-seen local indices. Any mismatch aborts the comparison; the
//! traversal never backtracks to try an alternate bijection, which keeps the
//! algorithm linear as the spec requires.

use crate::heap::core::SymHeap;
use crate::heap::object::{BindingOff, ObjKind, Storage};
use crate::heap::value::{CustomValue, ValueCode};
use crate::ids::{ObjId, TypeId, ValId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ObjDescriptor {
    kind: ObjKind,
    ty: Option<TypeId>,
    anon_size: Option<u32>,
    binding: Option<BindingOff>,
    min_len: u8,
    var: Option<(u32, u32)>,
    storage: StorageTag,
    root_offset: u32,
    parent: Option<u32>,
    sub_fields: Vec<u32>,
    placed_at: Option<u32>,
    value: LocalValueRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StorageTag {
    Stack,
    Heap,
}

impl From<Storage> for StorageTag {
    fn from(s: Storage) -> Self {
        match s {
            Storage::Stack => StorageTag::Stack,
            Storage::Heap => StorageTag::Heap,
        }
    }
}

/// A value reference in a descriptor: either a local index into the
/// canonical value sequence, or a sentinel (stable across heaps as-is).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LocalValueRef {
    Local(u32),
    Sentinel(ValId),
}

fn local_val_ref(id: ValId, val_map: &HashMap<ValId, u32>) -> LocalValueRef {
    if id.is_sentinel() {
        LocalValueRef::Sentinel(id)
    } else {
        LocalValueRef::Local(val_map[&id])
    }
}

fn local_obj_ref(id: ObjId, obj_map: &HashMap<ObjId, u32>) -> Option<u32> {
    if id.is_sentinel() {
        None
    } else {
        obj_map.get(&id).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ValDescriptor {
    code: LocalValueCode,
    ty: Option<TypeId>,
    offset: i64,
    base: LocalValueRef,
    points_to: PointsToTag,
}

/// Mirrors [`ValueCode`] with embedded object ids translated to local
/// indices so the descriptor compares id-invariantly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LocalValueCode {
    Heap,
    Custom(CustomValue),
    Composite(Option<u32>),
    Unknown,
    Lost,
    Deleted,
    Static,
    OnStack,
    OnHeap,
    Abstract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PointsToTag {
    /// Only meaningful (and recorded) at `offset == 0`; offset-derived
    /// values resolve through `base` instead (§3.3).
    NotApplicable,
    Object(Option<u32>, ObjId),
}

struct CanonState<'h> {
    h: &'h SymHeap,
    obj_order: Vec<ObjId>,
    val_order: Vec<ValId>,
    obj_map: HashMap<ObjId, u32>,
    val_map: HashMap<ValId, u32>,
}

impl<'h> CanonState<'h> {
    fn new(h: &'h SymHeap) -> Self {
        Self {
            h,
            obj_order: Vec::new(),
            val_order: Vec::new(),
            obj_map: HashMap::new(),
            val_map: HashMap::new(),
        }
    }

    fn visit_obj(&mut self, obj: ObjId) {
        if obj.is_sentinel() || self.obj_map.contains_key(&obj) {
            return;
        }
        let idx = obj.index().unwrap();
        let local = self.obj_order.len() as u32;
        self.obj_map.insert(obj, local);
        self.obj_order.push(obj);
        let o = &self.h.objects()[idx];
        self.visit_val(o.placed_at);
        self.visit_val(o.value);
        let subs = o.sub_fields.clone();
        for sub in subs {
            self.visit_obj(sub);
        }
    }

    fn visit_val(&mut self, val: ValId) {
        if val.is_sentinel() || self.val_map.contains_key(&val) {
            return;
        }
        let idx = val.index().unwrap();
        let local = self.val_order.len() as u32;
        self.val_map.insert(val, local);
        self.val_order.push(val);
        let v = &self.h.values()[idx];
        if v.offset == 0 {
            self.visit_obj(v.points_to);
        } else {
            self.visit_val(v.base);
        }
    }
}

/// Fingerprint ordering for dangling roots: deterministic, but not claimed
/// to disambiguate every symmetric pair of isomorphic roots (documented
/// simplification; see `DESIGN.md`).
fn root_fingerprint(h: &SymHeap, obj: ObjId) -> (i64, u32, u8, bool) {
    let o = &h.objects()[obj.index().unwrap()];
    (
        o.ty.map(|t| t.index() as i64).unwrap_or(-1),
        o.anon_size.unwrap_or(0),
        o.min_len,
        o.storage == Storage::Heap,
    )
}

fn canonicalize(h: &SymHeap) -> (Vec<ObjDescriptor>, Vec<ValDescriptor>, Vec<(LocalValueRef, LocalValueRef)>) {
    let mut st = CanonState::new(h);

    for (uid, inst) in h.gather_cvars() {
        if let Some(obj) = h.var_object(uid, inst) {
            st.visit_obj(obj);
        }
    }

    let mut dangling: Vec<ObjId> = h
        .objects()
        .iter()
        .enumerate()
        .filter(|(i, o)| o.is_root() && o.var.is_none() && !st.obj_map.contains_key(&ObjId::from_index(*i)))
        .map(|(i, _)| ObjId::from_index(i))
        .collect();
    dangling.sort_by_key(|&o| root_fingerprint(h, o));
    for obj in dangling {
        st.visit_obj(obj);
    }

    for i in 0..h.objects().len() {
        st.visit_obj(ObjId::from_index(i));
    }
    for i in 0..h.values().len() {
        st.visit_val(ValId::from_index(i));
    }

    let obj_descs: Vec<ObjDescriptor> = st
        .obj_order
        .iter()
        .map(|&obj| {
            let o = &h.objects()[obj.index().unwrap()];
            ObjDescriptor {
                kind: o.kind,
                ty: o.ty,
                anon_size: o.anon_size,
                binding: o.binding,
                min_len: o.min_len,
                var: o.var.map(|v| (v.c_var_uid, v.inst)),
                storage: o.storage.into(),
                root_offset: o.root_offset,
                parent: o.parent.and_then(|p| local_obj_ref(p, &st.obj_map)),
                sub_fields: o.sub_fields.iter().map(|&s| st.obj_map[&s]).collect(),
                placed_at: if o.placed_at.is_sentinel() { None } else { Some(st.val_map[&o.placed_at]) },
                value: local_val_ref(o.value, &st.val_map),
            }
        })
        .collect();

    let val_descs: Vec<ValDescriptor> = st
        .val_order
        .iter()
        .map(|&val| {
            let v = &h.values()[val.index().unwrap()];
            let code = match &v.code {
                ValueCode::Heap => LocalValueCode::Heap,
                ValueCode::Custom(c) => LocalValueCode::Custom(c.clone()),
                ValueCode::Composite(o) => LocalValueCode::Composite(local_obj_ref(*o, &st.obj_map)),
                ValueCode::Unknown => LocalValueCode::Unknown,
                ValueCode::Lost => LocalValueCode::Lost,
                ValueCode::Deleted => LocalValueCode::Deleted,
                ValueCode::Static => LocalValueCode::Static,
                ValueCode::OnStack => LocalValueCode::OnStack,
                ValueCode::OnHeap => LocalValueCode::OnHeap,
                ValueCode::Abstract => LocalValueCode::Abstract,
            };
            let points_to = if v.offset == 0 {
                PointsToTag::Object(local_obj_ref(v.points_to, &st.obj_map), v.points_to)
            } else {
                PointsToTag::NotApplicable
            };
            ValDescriptor {
                code,
                ty: v.ty,
                offset: v.offset,
                base: local_val_ref(v.base, &st.val_map),
                points_to,
            }
        })
        .collect();

    let neq_descs: Vec<(LocalValueRef, LocalValueRef)> = h
        .neq_pairs()
        .map(|&(a, b)| (local_val_ref(a, &st.val_map), local_val_ref(b, &st.val_map)))
        .collect();

    (obj_descs, val_descs, neq_descs)
}

pub fn sh_equal(h1: &SymHeap, h2: &SymHeap) -> bool {
    let (o1, v1, n1) = canonicalize(h1);
    let (o2, v2, n2) = canonicalize(h2);
    o1 == o2 && v1 == v2 && n1 == n2
}

pub fn sh_fingerprint(h: &SymHeap) -> u64 {
    let (objs, vals, neqs) = canonicalize(h);
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    objs.hash(&mut hasher);
    vals.hash(&mut hasher);
    neqs.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ClType, TypeKind, TypeTable};
    use crate::heap::object::Storage;
    use std::sync::Arc;

    fn fresh_scalar_heap() -> (SymHeap, TypeId) {
        let mut table = TypeTable::new();
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        (SymHeap::new(Arc::new(table)), int_ty)
    }

    #[test]
    fn a_heap_equals_its_own_clone() {
        let (mut h, ty) = fresh_scalar_heap();
        h.root_create(ty, None, Storage::Stack).unwrap();
        let clone = h.clone();
        assert!(sh_equal(&h, &clone));
    }

    #[test]
    fn equal_heaps_have_equal_fingerprints() {
        let (mut h, ty) = fresh_scalar_heap();
        h.root_create(ty, None, Storage::Stack).unwrap();
        let clone = h.clone();
        assert_eq!(sh_fingerprint(&h), sh_fingerprint(&clone));
    }

    #[test]
    fn differing_values_are_not_equal() {
        let (mut h1, ty) = fresh_scalar_heap();
        let obj1 = h1.root_create(ty, None, Storage::Stack).unwrap();
        h1.write_value(obj1, ValId::TRUE).unwrap();

        let (mut h2, ty2) = fresh_scalar_heap();
        let obj2 = h2.root_create(ty2, None, Storage::Stack).unwrap();
        h2.write_value(obj2, ValId::NULL).unwrap();

        assert!(!sh_equal(&h1, &h2));
    }
}
