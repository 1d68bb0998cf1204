//! Dense integer identifiers for objects, values, and types (C1).
//!
//! Each id space is a thin newtype over `i64`: non-negative values are dense,
//! freshly-allocated ids; negative values are the small fixed set of sentinels
//! each space reserves. IDs never wrap and a freed id is never reused within
//! the lifetime of one [`crate::heap::SymHeap`].

use std::fmt;

/// Identifies an [`crate::heap::object::Object`] within one symbolic heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(i64);

impl ObjId {
    pub const INVALID: ObjId = ObjId(-1);
    pub const DELETED: ObjId = ObjId(-2);
    pub const LOST: ObjId = ObjId(-3);
    pub const UNKNOWN: ObjId = ObjId(-4);
    pub const DEREF_FAILED: ObjId = ObjId(-5);
    pub const RETURN: ObjId = ObjId(-6);

    pub(crate) fn from_index(idx: usize) -> Self {
        ObjId(idx as i64)
    }

    /// `true` for any of the fixed sentinel values, `false` for a dense id.
    pub fn is_sentinel(self) -> bool {
        self.0 < 0
    }

    pub(crate) fn index(self) -> Option<usize> {
        if self.0 >= 0 {
            Some(self.0 as usize)
        } else {
            None
        }
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ObjId::INVALID => write!(f, "OBJ_INVALID"),
            ObjId::DELETED => write!(f, "OBJ_DELETED"),
            ObjId::LOST => write!(f, "OBJ_LOST"),
            ObjId::UNKNOWN => write!(f, "OBJ_UNKNOWN"),
            ObjId::DEREF_FAILED => write!(f, "OBJ_DEREF_FAILED"),
            ObjId::RETURN => write!(f, "OBJ_RETURN"),
            ObjId(n) => write!(f, "obj#{n}"),
        }
    }
}

/// Identifies a [`crate::heap::value::Value`] within one symbolic heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValId(i64);

impl ValId {
    pub const INVALID: ValId = ValId(-1);
    pub const NULL: ValId = ValId(-2);
    pub const FALSE: ValId = ValId(-2); // VAL_NULL == VAL_FALSE (§3.1)
    pub const TRUE: ValId = ValId(-3);
    pub const DEREF_FAILED: ValId = ValId(-4);
    pub const UNKNOWN: ValId = ValId(-5);
    pub const UNINITIALIZED: ValId = ValId(-6);

    pub(crate) fn from_index(idx: usize) -> Self {
        ValId(idx as i64)
    }

    pub fn is_sentinel(self) -> bool {
        self.0 < 0
    }

    pub(crate) fn index(self) -> Option<usize> {
        if self.0 >= 0 {
            Some(self.0 as usize)
        } else {
            None
        }
    }
}

impl fmt::Display for ValId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ValId::INVALID => write!(f, "VAL_INVALID"),
            ValId::NULL => write!(f, "VAL_NULL"),
            ValId::TRUE => write!(f, "VAL_TRUE"),
            ValId::DEREF_FAILED => write!(f, "VAL_DEREF_FAILED"),
            ValId::UNKNOWN => write!(f, "VAL_UNKNOWN"),
            ValId::UNINITIALIZED => write!(f, "VAL_UNINITIALIZED"),
            ValId(n) => write!(f, "val#{n}"),
        }
    }
}

/// Identifies an interned [`crate::common::types::ClType`] in a [`crate::common::types::TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub(crate) fn from_index(idx: usize) -> Self {
        TypeId(idx as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}
