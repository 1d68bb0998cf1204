//! Control-flow graph representation and the fixed-point driver (C6, §4.6)
//! that walks it.

pub mod graph;
pub mod worklist;

pub use graph::Cfg;
pub use worklist::FixedPointDriver;
