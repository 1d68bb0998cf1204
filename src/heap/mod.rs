//! The symbolic heap core (C2), its canonical equality (C3), and join/
//! entailment (C4).

pub mod core;
pub mod equality;
pub mod join;
pub mod object;
pub mod segment;
pub mod value;

pub use core::SymHeap;
pub use join::JoinStatus;
pub use object::{BindingOff, ObjKind, Object, Storage, VarRef};
pub use value::{CustomValue, Value, ValueCode};
