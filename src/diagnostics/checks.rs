//! Category-1 program-defect checks (§7): pure functions over a `SymHeap`
//! that classify a dereference or a `free`, or enumerate leaked heap roots.
//! None of these mutate the heap; the transfer layer decides what to do
//! with the classification (emit a diagnostic, substitute `*_DEREF_FAILED`).

use std::collections::HashSet;

use crate::heap::object::Storage;
use crate::heap::value::ValueCode;
use crate::heap::SymHeap;
use crate::ids::{ObjId, ValId};

/// The outcome of dereferencing `val` as a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefOutcome {
    Ok(ObjId),
    Null,
    Invalid,
}

pub fn classify_deref(h: &SymHeap, val: ValId) -> DerefOutcome {
    if val == ValId::NULL {
        return DerefOutcome::Null;
    }
    if matches!(val, ValId::DEREF_FAILED | ValId::UNINITIALIZED | ValId::UNKNOWN | ValId::INVALID) {
        return DerefOutcome::Invalid;
    }
    match h.value(val) {
        None => DerefOutcome::Invalid,
        Some(v) => {
            if !v.is_address() || matches!(v.code, ValueCode::Deleted | ValueCode::Lost) {
                return DerefOutcome::Invalid;
            }
            let target = h.target(val);
            if target.is_sentinel() {
                DerefOutcome::Invalid
            } else {
                DerefOutcome::Ok(target)
            }
        }
    }
}

/// The outcome of `free`ing `val`. Distinct from [`DerefOutcome`] because a
/// double free (target already `OBJ_DELETED`) is its own diagnostic, and
/// `free(NULL)` is a legal no-op rather than a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    Freed(ObjId),
    DoubleFree,
    Invalid,
    NoOp,
}

pub fn classify_free(h: &SymHeap, val: ValId) -> FreeOutcome {
    if val == ValId::NULL {
        return FreeOutcome::NoOp;
    }
    if matches!(val, ValId::DEREF_FAILED | ValId::UNINITIALIZED | ValId::UNKNOWN | ValId::INVALID) {
        return FreeOutcome::Invalid;
    }
    match h.value(val) {
        None => FreeOutcome::Invalid,
        Some(v) => {
            if matches!(v.code, ValueCode::Deleted) {
                return FreeOutcome::DoubleFree;
            }
            if !v.is_address() {
                return FreeOutcome::Invalid;
            }
            let target = h.target(val);
            if target.is_sentinel() {
                FreeOutcome::Invalid
            } else {
                FreeOutcome::Freed(target)
            }
        }
    }
}

/// Roots reachable from a program variable by following sub-fields and
/// pointer values transitively. Used by the scope-exit leak check (§3.5).
pub fn reachable_heap_roots(h: &SymHeap) -> HashSet<ObjId> {
    reachable_heap_roots_from(h, &[])
}

/// As [`reachable_heap_roots`], but also rooted at `extra_roots` — used at a
/// `ret` to exempt the object the function is handing back to its caller
/// from the leak check, since it is not reachable from any local variable.
pub fn reachable_heap_roots_from(h: &SymHeap, extra_roots: &[ObjId]) -> HashSet<ObjId> {
    let mut seen_objs = HashSet::new();
    let mut reachable_roots = HashSet::new();
    let mut stack: Vec<ObjId> = h
        .gather_cvars()
        .into_iter()
        .filter_map(|(uid, inst)| h.var_object(uid, inst))
        .chain(extra_roots.iter().copied())
        .collect();
    for &extra in extra_roots {
        if !extra.is_sentinel() {
            reachable_roots.insert(extra);
        }
    }

    while let Some(obj_id) = stack.pop() {
        if obj_id.is_sentinel() || !seen_objs.insert(obj_id) {
            continue;
        }
        let obj = match h.object(obj_id) {
            Some(o) => o,
            None => continue,
        };
        for &sub in &obj.sub_fields {
            stack.push(sub);
        }
        let val_id = h.read_value(obj_id);
        if let Some(val) = h.value(val_id) {
            if val.is_address() && !matches!(val.code, ValueCode::Deleted | ValueCode::Lost) {
                let target = h.target(val_id);
                if !target.is_sentinel() {
                    reachable_roots.insert(target);
                    stack.push(target);
                }
            }
        }
    }
    reachable_roots
}

/// Heap-storage roots not reachable from any program variable and not
/// already freed — the memory-leak defect (§3.5, S6).
pub fn leaked_heap_roots(h: &SymHeap) -> Vec<ObjId> {
    leaked_heap_roots_from(h, &[])
}

/// As [`leaked_heap_roots`], but exempting `extra_roots` (see
/// [`reachable_heap_roots_from`]).
pub fn leaked_heap_roots_from(h: &SymHeap, extra_roots: &[ObjId]) -> Vec<ObjId> {
    let reachable = reachable_heap_roots_from(h, extra_roots);
    let mut leaked = Vec::new();
    for (idx, obj) in h.objects().iter().enumerate() {
        if obj.storage != Storage::Heap || !obj.is_root() {
            continue;
        }
        let id = ObjId::from_index(idx);
        if let Some(addr) = h.value(obj.placed_at) {
            if matches!(addr.code, ValueCode::Deleted) {
                continue;
            }
        }
        if !reachable.contains(&id) {
            leaked.push(id);
        }
    }
    leaked
}
