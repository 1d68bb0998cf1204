//! `shapecore` — a static shape analyzer for pointer-manipulating C-like
//! programs: a symbolic-heap abstract domain (§3), join/entailment over it
//! (§4.4), a CFG fixed-point driver (§4.6), and a thin IR-consumer contract
//! (§6.1) a frontend can feed into it.

pub mod cfg;
pub mod common;
pub mod config;
pub mod diagnostics;
pub mod heap;
pub mod ids;
pub mod ir;
pub mod plot;
pub mod state;
pub mod transfer;
