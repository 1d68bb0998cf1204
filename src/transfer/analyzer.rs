//! Ties the textual IR reader, [`FunctionCollector`], and
//! [`FixedPointDriver`] together into one entry point: parse a translation
//! unit, drive every function to a fixed point, and collect diagnostics.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cfg::FixedPointDriver;
use crate::common::error::{AnalysisError, DiagnosticEngine};
use crate::common::types::TypeTable;
use crate::config::AnalyzerConfig;
use crate::heap::SymHeap;
use crate::ids::TypeId;
use crate::ir::textual;
use crate::transfer::builder::{Function, FunctionCollector};
use crate::transfer::step::{self, StepContext};

/// The result of analyzing one translation unit: every function's
/// diagnostics, pooled together (functions in this harness do not call each
/// other, so there is no cross-function ordering to preserve).
pub struct AnalysisReport {
    pub diagnostics: DiagnosticEngine,
    pub functions: Vec<String>,
}

/// Parses `source` with [`textual::read_str`] and analyzes every function it
/// defines against `types`/`type_names` (the table `decl` resolves type
/// names through, since the textual format names types rather than carrying
/// `TypeId`s directly).
pub fn analyze_source(
    source: &str,
    types: Arc<TypeTable>,
    type_names: &HashMap<String, TypeId>,
    config: &AnalyzerConfig,
) -> Result<AnalysisReport, AnalysisError> {
    let mut collector = FunctionCollector::new();
    textual::read_str(source, &mut collector)?;

    let mut diagnostics = DiagnosticEngine::new();
    let mut names = Vec::with_capacity(collector.functions.len());
    for function in &collector.functions {
        names.push(function.name.clone());
        analyze_function(function, &types, type_names, config, &mut diagnostics)?;
    }
    Ok(AnalysisReport { diagnostics, functions: names })
}

/// Drives one function's CFG to a fixed point, starting from a single empty
/// heap seeded at the entry block (this harness has no caller context to
/// seed argument values from, so parameters start `VAL_UNINITIALIZED` like
/// any other local until a `decl`/assignment gives them a value).
fn analyze_function(
    function: &Function,
    types: &Arc<TypeTable>,
    type_names: &HashMap<String, TypeId>,
    config: &AnalyzerConfig,
    diagnostics: &mut DiagnosticEngine,
) -> Result<(), AnalysisError> {
    let mut fpd = FixedPointDriver::new(&function.cfg, config.clone());
    fpd.seed(function.cfg.entry(), SymHeap::new(Arc::clone(types)));
    let ctx = StepContext { types: type_names };

    fpd.run(|block, heap| {
        let instrs = function.blocks.get(block).map(|v| v.as_slice()).unwrap_or(&[]);
        step::run_block(heap, instrs, &ctx, diagnostics)
    })
}
