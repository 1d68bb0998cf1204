//! `Value` — an abstract scalar or address (§3.3).

use crate::ids::{ObjId, TypeId, ValId};
use std::collections::BTreeSet;

/// The kind of a value's payload (§3.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueCode {
    /// A typed address: `pointsTo`/`offset` on the owning [`Value`] are live.
    Heap,
    /// An opaque scalar that is not an address: a literal, function
    /// reference, or string.
    Custom(CustomValue),
    /// The stored value of an aggregate object; a back-reference to that
    /// object (V3). Never stored anywhere else.
    Composite(ObjId),
    Unknown,
    /// The address value of a destroyed stack object (§3.5).
    Lost,
    /// The address value of a destroyed heap object (§3.5).
    Deleted,
    /// A statically-allocated address (string literal storage, globals).
    Static,
    OnStack,
    OnHeap,
    /// An address into an abstract segment object.
    Abstract,
}

/// The payload of a `Custom` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CustomValue {
    FuncRef(String),
    StrLit(String),
    Int(i64),
}

/// An abstract scalar or address (§3.3).
#[derive(Debug, Clone)]
pub struct Value {
    pub code: ValueCode,
    pub ty: Option<TypeId>,
    /// For address-carrying codes: the target object, possibly a sentinel.
    /// `OBJ_INVALID` for non-address codes.
    pub points_to: ObjId,
    /// Displacement from the root address denoted by `points_to` when
    /// `offset = 0` (V1).
    pub offset: i64,
    /// The root value this value was derived from via `offsetBy`; equal to
    /// this value's own id when `offset == 0`.
    pub base: ValId,
    /// Reverse index of objects whose `value` field currently holds this id
    /// (V2), maintained by `writeValue`.
    pub used_by: BTreeSet<ObjId>,
}

impl Value {
    pub fn is_address(&self) -> bool {
        matches!(
            self.code,
            ValueCode::Heap
                | ValueCode::Lost
                | ValueCode::Deleted
                | ValueCode::Static
                | ValueCode::OnStack
                | ValueCode::OnHeap
                | ValueCode::Abstract
        )
    }
}
