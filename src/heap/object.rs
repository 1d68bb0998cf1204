//! `Object` — a typed storage location with identity (§3.2).

use crate::ids::{ObjId, TypeId, ValId};

/// Where an object's backing storage lives; decides which sentinel a
/// destroyed root's address value is rewritten to (§3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// A program variable; scope exit turns its address into `OBJ_LOST`.
    Stack,
    /// A `malloc`-style anonymous or typed region; `free` turns its address
    /// into `OBJ_DELETED`.
    Heap,
}

/// The kind of object (§3.2): a concrete node, or one of the three
/// list-abstraction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    Concrete,
    /// A possibly-empty region; equivalent to `Sls` with `min_len = 0` and a
    /// length bound of 1 (see `MAY_EXIST` in the glossary).
    MayExist,
    /// An acyclic singly-linked segment of at least `min_len` concrete nodes.
    Sls,
    /// An acyclic doubly-linked segment of at least `min_len` concrete nodes.
    Dls,
}

impl ObjKind {
    pub fn is_concrete(self) -> bool {
        matches!(self, ObjKind::Concrete)
    }

    pub fn is_abstract(self) -> bool {
        !self.is_concrete()
    }
}

/// Field offsets (within the abstracted node's type) that define how a node
/// participates in a list segment (§3.2, glossary "binding offsets").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingOff {
    /// Offset of the field through which the segment is entered.
    pub head: u32,
    /// Offset of the forward link.
    pub next: u32,
    /// Offset of the backward link; only meaningful for `Dls`.
    pub prev: Option<u32>,
}

impl BindingOff {
    pub fn singly_linked(head: u32, next: u32) -> Self {
        Self { head, next, prev: None }
    }

    pub fn doubly_linked(head: u32, next: u32, prev: u32) -> Self {
        Self { head, next, prev: Some(prev) }
    }
}

/// A program variable identity: the IR's variable id plus the call-nest
/// level, to disambiguate recursive frames (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarRef {
    pub c_var_uid: u32,
    pub inst: u32,
}

/// A typed or raw storage location with identity (§3.2).
#[derive(Debug, Clone)]
pub struct Object {
    /// `None` for an anonymous raw region of `anon_size` bytes.
    pub ty: Option<TypeId>,
    pub anon_size: Option<u32>,
    pub kind: ObjKind,
    /// Required for non-`Concrete` kinds (I3); `None` for `Concrete`.
    pub binding: Option<BindingOff>,
    /// `0..=2` (I4); `MayExist` always carries `0`.
    pub min_len: u8,
    /// This object's root's address value (I1). Defined for every object,
    /// not only roots: a sub-field's address is `offsetBy(placed_at,
    /// root_offset)`, computed on demand rather than stored redundantly.
    pub placed_at: ValId,
    /// The value currently stored here, or the `COMPOSITE` sentinel value
    /// for aggregate objects (V3).
    pub value: ValId,
    pub parent: Option<ObjId>,
    pub sub_fields: Vec<ObjId>,
    /// Set when this object represents a program variable.
    pub var: Option<VarRef>,
    pub storage: Storage,
    /// This object's root (itself, if this object has no parent).
    pub root: ObjId,
    /// Byte offset from `root`'s base address; `0` for the root itself.
    pub root_offset: u32,
}

impl Object {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_aggregate_root(&self, sub_count: usize) -> bool {
        self.is_root() && sub_count > 0
    }
}
