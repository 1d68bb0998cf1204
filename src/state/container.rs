//! State containers (C5, §4.5): a per-block multiset of symbolic heaps with
//! an `insert` that deduplicates (union mode) or widens via join (join
//! mode). Both variants preserve insertion order and track a per-element
//! `pending` bit cleared once the FPD has propagated that heap onward.

use crate::heap::equality::sh_equal;
use crate::heap::join::{join, JoinStatus};
use crate::heap::SymHeap;

/// What `insert` actually did, for `tracing` events in the FPD; callers
/// that only care about "did the container change" use the `bool` the
/// [`StateContainer::insert`] trait method returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Appended,
    NoChange,
    Widened,
}

impl InsertOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, InsertOutcome::NoChange)
    }
}

/// Shared external contract of [`SymHeapUnion`] and [`SymStateWithJoin`].
pub trait StateContainer {
    /// Inserts `sh`; returns `true` iff the container's observable content
    /// changed (an append, a replace-by-join, or a widen).
    fn insert(&mut self, sh: SymHeap) -> bool;
    fn heaps(&self) -> &[SymHeap];
    fn pending_indices(&self) -> Vec<usize>;
    fn clear_pending(&mut self, idx: usize);

    fn len(&self) -> usize {
        self.heaps().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Union mode (§4.5): `insert` appends iff `sh` is not C3-equal to any
/// existing element.
#[derive(Debug, Default)]
pub struct SymHeapUnion {
    heaps: Vec<SymHeap>,
    pending: Vec<bool>,
}

impl SymHeapUnion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_heaps(heaps: Vec<SymHeap>) -> Self {
        let pending = vec![true; heaps.len()];
        Self { heaps, pending }
    }

    pub fn into_heaps(self) -> Vec<SymHeap> {
        self.heaps
    }

    pub fn insert_detailed(&mut self, sh: SymHeap) -> InsertOutcome {
        if self.heaps.iter().any(|existing| sh_equal(existing, &sh)) {
            return InsertOutcome::NoChange;
        }
        self.heaps.push(sh);
        self.pending.push(true);
        InsertOutcome::Appended
    }
}

impl StateContainer for SymHeapUnion {
    fn insert(&mut self, sh: SymHeap) -> bool {
        self.insert_detailed(sh).changed()
    }

    fn heaps(&self) -> &[SymHeap] {
        &self.heaps
    }

    fn pending_indices(&self) -> Vec<usize> {
        self.pending.iter().enumerate().filter(|(_, &p)| p).map(|(i, _)| i).collect()
    }

    fn clear_pending(&mut self, idx: usize) {
        self.pending[idx] = false;
    }
}

/// Join mode (§4.5): `insert` scans for the first element `joinSymHeaps`
/// succeeds against and acts on the returned status; appends only if no
/// existing element joins.
#[derive(Debug, Default)]
pub struct SymStateWithJoin {
    heaps: Vec<SymHeap>,
    pending: Vec<bool>,
}

impl SymStateWithJoin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_heaps(heaps: Vec<SymHeap>) -> Self {
        let pending = vec![true; heaps.len()];
        Self { heaps, pending }
    }

    pub fn into_heaps(self) -> Vec<SymHeap> {
        self.heaps
    }

    pub fn insert_detailed(&mut self, sh: SymHeap) -> InsertOutcome {
        for i in 0..self.heaps.len() {
            if let Some((status, joined)) = join(&self.heaps[i], &sh) {
                return match status {
                    JoinStatus::UseAny | JoinStatus::UseSh1 => InsertOutcome::NoChange,
                    JoinStatus::UseSh2 => {
                        self.heaps[i] = joined;
                        self.pending[i] = true;
                        InsertOutcome::Widened
                    }
                    JoinStatus::ThreeWay => {
                        self.heaps[i] = joined;
                        self.pending[i] = true;
                        InsertOutcome::Widened
                    }
                };
            }
        }
        self.heaps.push(sh);
        self.pending.push(true);
        InsertOutcome::Appended
    }
}

impl StateContainer for SymStateWithJoin {
    fn insert(&mut self, sh: SymHeap) -> bool {
        self.insert_detailed(sh).changed()
    }

    fn heaps(&self) -> &[SymHeap] {
        &self.heaps
    }

    fn pending_indices(&self) -> Vec<usize> {
        self.pending.iter().enumerate().filter(|(_, &p)| p).map(|(i, _)| i).collect()
    }

    fn clear_pending(&mut self, idx: usize) {
        self.pending[idx] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ClType, TypeKind, TypeTable};
    use crate::heap::object::Storage;
    use std::sync::Arc;

    fn scalar_heap() -> SymHeap {
        let mut table = TypeTable::new();
        table.intern(ClType::scalar(TypeKind::Int, 4));
        SymHeap::new(Arc::new(table))
    }

    #[test]
    fn insert_into_empty_always_appends() {
        let mut c = SymHeapUnion::new();
        assert!(c.insert(scalar_heap()));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn union_mode_dedups_equal_heaps() {
        let mut c = SymHeapUnion::new();
        let h = scalar_heap();
        assert!(c.insert(h.clone()));
        assert!(!c.insert(h));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn repeated_insert_never_grows_the_container() {
        let mut c = SymHeapUnion::new();
        let h = scalar_heap();
        c.insert(h.clone());
        let len_before = c.len();
        assert!(!c.insert(h));
        assert_eq!(c.len(), len_before);
    }

    #[test]
    fn join_mode_replaces_instead_of_appending_on_widen() {
        let mut table = TypeTable::new();
        let node_ty = table.intern(ClType::aggregate(TypeKind::Struct, vec![], 0));
        let types = Arc::new(table);
        let var = crate::heap::object::VarRef { c_var_uid: 1, inst: 0 };

        let mut h1 = SymHeap::new(types.clone());
        h1.root_create(node_ty, Some(var), Storage::Stack).unwrap();

        let mut c = SymStateWithJoin::new();
        assert!(c.insert(h1));
        assert_eq!(c.len(), 1);

        let mut h2 = SymHeap::new(types);
        h2.root_create(node_ty, Some(var), Storage::Stack).unwrap();
        assert!(!c.insert(h2)); // structurally equal -> UseAny/UseSh1, no growth
        assert_eq!(c.len(), 1);
    }
}
