//! Per-block state containers (C5, §4.5) and the CFG's inbound-edge index.

pub mod container;
pub mod map;

pub use container::{InsertOutcome, StateContainer, SymHeapUnion, SymStateWithJoin};
pub use map::SymStateMap;
