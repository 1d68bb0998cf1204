pub mod analyzer;
pub mod builder;
pub mod instr;
pub mod step;

pub use analyzer::{analyze_source, AnalysisReport};
pub use builder::{Function, FunctionCollector};
pub use instr::Instr;
pub use step::{run_block, StepContext};
