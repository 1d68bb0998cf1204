//! Executes one basic block's instructions against a `SymHeap`, producing
//! the `(successor, heap)` routing the fixed-point driver's `run` contract
//! expects (§4.6). This is where the IR's operand/instruction vocabulary
//! (§6.1) meets the SH primitives (§3).
//!
//! Diagnostics emitted here all carry [`Span::dummy`]: the textual reader
//! (§6.1) is a line-oriented demonstration harness and does not currently
//! track per-token byte offsets back to a `SourceManager`. A real IR
//! producer would thread real spans through `Operand`/`Instr` instead.

use std::collections::HashMap;

use crate::common::error::AnalysisError;
use crate::common::source::Span;
use crate::common::error::{DefectKind, Diagnostic, DiagnosticEngine};
use crate::diagnostics::checks::{classify_deref, classify_free, leaked_heap_roots_from, DerefOutcome, FreeOutcome};
use crate::heap::object::{Storage, VarRef};
use crate::heap::value::{CustomValue, ValueCode};
use crate::heap::SymHeap;
use crate::ids::{ObjId, TypeId, ValId};
use crate::ir::event::{BinOp, ChainOp, Operand, UnOp};
use crate::transfer::instr::Instr;

/// Per-function context the step functions need besides the heap itself:
/// the type-name table `decl` resolves against, since this harness has no
/// real type front-end to attach `TypeId`s to operands directly.
pub struct StepContext<'a> {
    pub types: &'a HashMap<String, TypeId>,
}

/// Runs `instrs` (one basic block's worth) against `sh`, returning the
/// `(successor label, resulting heap)` pairs the block's terminator routed
/// control to. Mutates nothing outside the returned heaps; `sh` itself is
/// left untouched.
pub fn run_block(
    sh: &SymHeap,
    instrs: &[Instr],
    ctx: &StepContext,
    diagnostics: &mut DiagnosticEngine,
) -> Result<Vec<(String, SymHeap)>, AnalysisError> {
    let mut h = sh.clone();
    for instr in instrs {
        match instr {
            Instr::Jmp(target) => return Ok(vec![(target.clone(), h)]),

            Instr::Cond { val, then_label, else_label } => {
                let v = resolve_rvalue(&mut h, diagnostics, val)?;
                return Ok(branch(h, v, then_label, else_label));
            }

            Instr::Ret(val) => {
                let mut ret_target = ObjId::INVALID;
                if let Some(op) = val {
                    let v = resolve_rvalue(&mut h, diagnostics, op)?;
                    h.write_value(ObjId::RETURN, v)?;
                    ret_target = h.target(v);
                }
                // Simulate scope exit: a leak is heap memory unreachable
                // once the callee's own locals go out of scope, not memory
                // merely unreachable from *other* frames' variables (there
                // are none in this harness's single-function view).
                let mut scope_exit = h.clone();
                for (uid, inst) in scope_exit.gather_cvars() {
                    if let Some(obj) = scope_exit.var_object(uid, inst) {
                        if scope_exit.object(obj).map(|o| o.storage) == Some(Storage::Stack) {
                            scope_exit.destroy(obj)?;
                        }
                    }
                }
                let extra: &[ObjId] = if ret_target.is_sentinel() { &[] } else { &[ret_target] };
                for _leaked in leaked_heap_roots_from(&scope_exit, extra) {
                    diagnostics.emit(Diagnostic::defect(DefectKind::MemoryLeak, Span::dummy()));
                }
                return Ok(Vec::new());
            }

            Instr::Unop { op, dst, src } => apply_unop(&mut h, diagnostics, *op, dst, src)?,
            Instr::Binop { op, dst, lhs, rhs } => apply_binop(&mut h, diagnostics, *op, dst, lhs, rhs)?,
            Instr::Call { dst, name, args } => apply_call(&mut h, ctx, diagnostics, dst, name, args)?,
        }
    }
    Err(AnalysisError::contract("basic block fell through without a terminator"))
}

/// Splits a conditional on `v`: a known `VAL_NULL`/`VAL_TRUE` takes exactly
/// one edge, anything else (an unproved value) forks both, narrowing the
/// then-branch's copy with `v != NULL` (§3.4) since the analyzer cannot yet
/// distinguish a narrowing scheme richer than that from this harness's thin
/// `Cond` contract.
fn branch(h: SymHeap, v: ValId, then_label: &str, else_label: &str) -> Vec<(String, SymHeap)> {
    if v == ValId::NULL {
        vec![(else_label.to_string(), h)]
    } else if v == ValId::TRUE {
        vec![(then_label.to_string(), h)]
    } else {
        let mut h_then = h.clone();
        h_then.neq_add(v, ValId::NULL);
        vec![(then_label.to_string(), h_then), (else_label.to_string(), h)]
    }
}

/// Resolves an lvalue operand to the `Object` it denotes, walking its field
/// chain. A dot step stays within the current aggregate; an arrow step
/// dereferences the current value first, classifying a null/invalid
/// dereference into its own diagnostic before the chain can propagate
/// `OBJ_DEREF_FAILED` silently.
fn resolve_obj(h: &mut SymHeap, diagnostics: &mut DiagnosticEngine, operand: &Operand) -> Result<ObjId, AnalysisError> {
    let (uid, inst, chain) = match operand {
        Operand::Var { c_var_uid, inst, chain, .. } => (*c_var_uid, *inst, chain),
        _ => return Err(AnalysisError::contract("expected a variable operand as an lvalue")),
    };
    let mut obj = h
        .var_object(uid, inst)
        .ok_or_else(|| AnalysisError::contract(format!("variable %{uid}@{inst} used before `decl`")))?;
    for step in chain {
        if obj.is_sentinel() {
            break;
        }
        match step.op {
            ChainOp::Dot => {
                let addr = h.address_of(obj);
                let field_addr = h.offset_by(addr, step.offset as i64)?;
                obj = h.obj_at_offset(field_addr);
            }
            ChainOp::Arrow => {
                let ptr_val = h.read_value(obj);
                match classify_deref(h, ptr_val) {
                    DerefOutcome::Null => {
                        diagnostics.emit(Diagnostic::defect(DefectKind::NullDeref, Span::dummy()));
                        obj = ObjId::DEREF_FAILED;
                    }
                    DerefOutcome::Invalid => {
                        diagnostics.emit(Diagnostic::defect(DefectKind::InvalidDeref, Span::dummy()));
                        obj = ObjId::DEREF_FAILED;
                    }
                    DerefOutcome::Ok(_) => {
                        let field_addr = h.offset_by(ptr_val, step.offset as i64)?;
                        obj = h.obj_at_offset(field_addr);
                    }
                }
            }
        }
    }
    Ok(obj)
}

/// Resolves any operand to a value: a variable reads through [`resolve_obj`],
/// a literal is interned. Integer literal `0` is always `VAL_NULL` — the
/// universal null-pointer constant in C, and `VAL_NULL == VAL_FALSE` (§3.1)
/// makes it double as a generic zero/false scalar too, so this harness does
/// not need a separate int-vs-pointer literal distinction.
fn resolve_rvalue(h: &mut SymHeap, diagnostics: &mut DiagnosticEngine, operand: &Operand) -> Result<ValId, AnalysisError> {
    match operand {
        Operand::Var { .. } => {
            let obj = resolve_obj(h, diagnostics, operand)?;
            Ok(h.read_value(obj))
        }
        Operand::IntLit(0) => Ok(ValId::NULL),
        Operand::IntLit(n) => Ok(h.intern_custom(ValueCode::Custom(CustomValue::Int(*n)))),
        Operand::StrLit(s) => Ok(h.intern_custom(ValueCode::Custom(CustomValue::StrLit(s.clone())))),
        Operand::FuncRef(name) => Ok(h.intern_custom(ValueCode::Custom(CustomValue::FuncRef(name.clone())))),
    }
}

/// Writes `val` into `obj`, except when `obj` is `OBJ_DEREF_FAILED`: the
/// chain that produced it already reported a null/invalid deref, and
/// `write_value` rejects any sentinel destination outright, so a failed
/// chain's assignment is simply dropped rather than raised as a second,
/// unrelated contract violation.
fn write_through(h: &mut SymHeap, obj: ObjId, val: ValId) -> Result<(), AnalysisError> {
    if obj.is_sentinel() {
        return Ok(());
    }
    h.write_value(obj, val)
}

fn apply_unop(
    h: &mut SymHeap,
    diagnostics: &mut DiagnosticEngine,
    op: UnOp,
    dst: &Operand,
    src: &Operand,
) -> Result<(), AnalysisError> {
    match op {
        UnOp::Assign => {
            let v = resolve_rvalue(h, diagnostics, src)?;
            let dst_obj = resolve_obj(h, diagnostics, dst)?;
            write_through(h, dst_obj, v)?;
        }
        UnOp::AddressOf => {
            let obj = resolve_obj(h, diagnostics, src)?;
            let addr = h.address_of(obj);
            let dst_obj = resolve_obj(h, diagnostics, dst)?;
            write_through(h, dst_obj, addr)?;
        }
        UnOp::Deref => {
            // `dst = *src`: an explicit dereference of `src`'s own value,
            // distinct from the field-chain arrow steps `resolve_obj` walks.
            let src_obj = resolve_obj(h, diagnostics, src)?;
            let ptr_val = h.read_value(src_obj);
            let v = match classify_deref(h, ptr_val) {
                DerefOutcome::Null => {
                    diagnostics.emit(Diagnostic::defect(DefectKind::NullDeref, Span::dummy()));
                    ValId::DEREF_FAILED
                }
                DerefOutcome::Invalid => {
                    diagnostics.emit(Diagnostic::defect(DefectKind::InvalidDeref, Span::dummy()));
                    ValId::DEREF_FAILED
                }
                DerefOutcome::Ok(target) => h.read_value(target),
            };
            let dst_obj = resolve_obj(h, diagnostics, dst)?;
            write_through(h, dst_obj, v)?;
        }
        UnOp::Not => {
            let v = resolve_rvalue(h, diagnostics, src)?;
            let result = if v == ValId::NULL {
                ValId::TRUE
            } else if v == ValId::TRUE {
                ValId::FALSE
            } else {
                ValId::UNKNOWN
            };
            let dst_obj = resolve_obj(h, diagnostics, dst)?;
            write_through(h, dst_obj, result)?;
        }
    }
    Ok(())
}

fn as_int_literal(h: &SymHeap, v: ValId) -> Option<i64> {
    match h.value(v).map(|vv| &vv.code) {
        Some(ValueCode::Custom(CustomValue::Int(n))) => Some(*n),
        _ => None,
    }
}

/// `lhs + sign*rhs` when `lhs` is an address and `rhs` is a known integer
/// literal (pointer arithmetic); `VAL_UNKNOWN` otherwise, since this harness
/// does not model general integer arithmetic.
fn pointer_arith(h: &mut SymHeap, lhs: ValId, rhs: ValId, sign: i64) -> Result<ValId, AnalysisError> {
    let is_addr = h.value(lhs).map(|v| v.is_address()).unwrap_or(false);
    if is_addr {
        if let Some(delta) = as_int_literal(h, rhs) {
            return h.offset_by(lhs, sign * delta);
        }
    }
    Ok(ValId::UNKNOWN)
}

fn apply_binop(
    h: &mut SymHeap,
    diagnostics: &mut DiagnosticEngine,
    op: BinOp,
    dst: &Operand,
    lhs: &Operand,
    rhs: &Operand,
) -> Result<(), AnalysisError> {
    let lv = resolve_rvalue(h, diagnostics, lhs)?;
    let rv = resolve_rvalue(h, diagnostics, rhs)?;
    let result = match op {
        BinOp::Eq => {
            if lv == rv {
                ValId::TRUE
            } else if h.prove_neq(lv, rv) {
                ValId::FALSE
            } else {
                ValId::UNKNOWN
            }
        }
        BinOp::Ne => {
            if lv == rv {
                ValId::FALSE
            } else if h.prove_neq(lv, rv) {
                ValId::TRUE
            } else {
                ValId::UNKNOWN
            }
        }
        BinOp::Add => pointer_arith(h, lv, rv, 1)?,
        BinOp::Sub => pointer_arith(h, lv, rv, -1)?,
    };
    let dst_obj = resolve_obj(h, diagnostics, dst)?;
    write_through(h, dst_obj, result)?;
    Ok(())
}

fn apply_call(
    h: &mut SymHeap,
    ctx: &StepContext,
    diagnostics: &mut DiagnosticEngine,
    dst: &Option<Operand>,
    name: &str,
    args: &[Operand],
) -> Result<(), AnalysisError> {
    match name {
        "decl" => {
            let (uid, inst) = match dst {
                Some(Operand::Var { c_var_uid, inst, .. }) => (*c_var_uid, *inst),
                _ => return Err(AnalysisError::contract("decl needs a plain variable destination")),
            };
            let type_name = match args.first() {
                Some(Operand::FuncRef(n)) => n.as_str(),
                _ => return Err(AnalysisError::contract("decl's argument must name a type, e.g. &list_node")),
            };
            let ty = *ctx
                .types
                .get(type_name)
                .ok_or_else(|| AnalysisError::contract(format!("unknown type `{type_name}`")))?;
            // Idempotent: a loop header revisiting `decl` for the same
            // variable must not recreate its storage.
            if h.var_object(uid, inst).is_none() {
                h.root_create(ty, Some(VarRef { c_var_uid: uid, inst }), Storage::Stack)?;
            }
        }
        "malloc" => {
            let size = match args.first() {
                Some(Operand::IntLit(n)) => *n as u32,
                _ => return Err(AnalysisError::contract("malloc needs an integer size argument")),
            };
            let obj = h.root_create_anon(size)?;
            // An optional second argument names the block's type, standing in
            // for the static `sizeof`/cast type a real frontend would supply;
            // without it the block stays untyped and only pointer-level
            // reasoning (not field access) is possible through it.
            if let Some(Operand::FuncRef(type_name)) = args.get(1) {
                let ty = *ctx
                    .types
                    .get(type_name.as_str())
                    .ok_or_else(|| AnalysisError::contract(format!("unknown type `{type_name}`")))?;
                h.define_type(obj, ty)?;
            }
            let addr = h.address_of(obj);
            if let Some(dst_operand) = dst {
                let dst_obj = resolve_obj(h, diagnostics, dst_operand)?;
                write_through(h, dst_obj, addr)?;
            }
        }
        "free" => {
            let ptr_operand =
                args.first().ok_or_else(|| AnalysisError::contract("free needs a pointer argument"))?;
            let ptr_val = resolve_rvalue(h, diagnostics, ptr_operand)?;
            match classify_free(h, ptr_val) {
                FreeOutcome::NoOp => {}
                FreeOutcome::DoubleFree => {
                    diagnostics.emit(Diagnostic::defect(DefectKind::DoubleFree, Span::dummy()));
                }
                FreeOutcome::Invalid => {
                    diagnostics.emit(Diagnostic::defect(DefectKind::InvalidDeref, Span::dummy()));
                }
                FreeOutcome::Freed(target) => h.destroy(target)?,
            }
        }
        _ => {
            if let Some(dst_operand) = dst {
                let dst_obj = resolve_obj(h, diagnostics, dst_operand)?;
                write_through(h, dst_obj, ValId::UNKNOWN)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ClType, Field, TypeKind, TypeTable};
    use std::sync::Arc;

    fn node_type_table() -> (HashMap<String, TypeId>, Arc<TypeTable>) {
        let mut table = TypeTable::new();
        let int_ty = table.intern(ClType::scalar(TypeKind::Int, 4));
        let placeholder = table.intern(ClType::scalar(TypeKind::Unknown, 0));
        let ptr_ty = table.intern(ClType::pointer(placeholder));
        let node_ty = table.intern(ClType::aggregate(
            TypeKind::Struct,
            vec![
                Field { offset: 0, name: "next".into(), ty: ptr_ty },
                Field { offset: 8, name: "value".into(), ty: int_ty },
            ],
            16,
        ));
        let mut types = HashMap::new();
        types.insert("node".to_string(), node_ty);
        types.insert("node_ptr".to_string(), ptr_ty);
        (types, Arc::new(table))
    }

    #[test]
    fn decl_then_assign_through_dot_chain() {
        let (types, table) = node_type_table();
        let ctx = StepContext { types: &types };
        let h = SymHeap::new(table);
        let mut diagnostics = DiagnosticEngine::new();
        let instrs = vec![
            Instr::Call { dst: Some(Operand::var(1, 0)), name: "decl".into(), args: vec![Operand::FuncRef("node".into())] },
            Instr::Unop {
                op: UnOp::Assign,
                dst: Operand::var(1, 0).with_dot(8),
                src: Operand::IntLit(42),
            },
            Instr::Jmp("exit".into()),
        ];
        let outs = run_block(&h, &instrs, &ctx, &mut diagnostics).unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].0, "exit");
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn dereferencing_null_reports_a_null_deref_and_yields_deref_failed() {
        let (types, table) = node_type_table();
        let ctx = StepContext { types: &types };
        let h = SymHeap::new(table);
        let mut diagnostics = DiagnosticEngine::new();
        let instrs = vec![
            Instr::Call { dst: Some(Operand::var(1, 0)), name: "decl".into(), args: vec![Operand::FuncRef("node".into())] },
            Instr::Unop { op: UnOp::Assign, dst: Operand::var(1, 0).with_dot(0), src: Operand::IntLit(0) },
            Instr::Unop {
                op: UnOp::Assign,
                dst: Operand::var(1, 0).with_dot(0).with_arrow(8),
                src: Operand::IntLit(1),
            },
            Instr::Jmp("exit".into()),
        ];
        run_block(&h, &instrs, &ctx, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.of_kind(DefectKind::NullDeref).count(), 1);
    }

    #[test]
    fn writing_through_a_failed_dereference_is_dropped_not_a_contract_error() {
        let (types, table) = node_type_table();
        let ctx = StepContext { types: &types };
        let h = SymHeap::new(table);
        let mut diagnostics = DiagnosticEngine::new();
        let instrs = vec![
            Instr::Call { dst: Some(Operand::var(1, 0)), name: "decl".into(), args: vec![Operand::FuncRef("node_ptr".into())] },
            Instr::Unop { op: UnOp::Assign, dst: Operand::var(1, 0), src: Operand::IntLit(0) },
            Instr::Unop { op: UnOp::Assign, dst: Operand::var(1, 0).with_arrow(0), src: Operand::IntLit(1) },
            Instr::Jmp("exit".into()),
        ];
        let outs = run_block(&h, &instrs, &ctx, &mut diagnostics).unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(diagnostics.of_kind(DefectKind::NullDeref).count(), 1);
    }

    #[test]
    fn unknown_condition_forks_both_branches() {
        let (types, table) = node_type_table();
        let ctx = StepContext { types: &types };
        let h = SymHeap::new(table);
        let mut diagnostics = DiagnosticEngine::new();
        let instrs = vec![Instr::Cond {
            val: Operand::IntLit(7),
            then_label: "then".into(),
            else_label: "else".into(),
        }];
        let outs = run_block(&h, &instrs, &ctx, &mut diagnostics).unwrap();
        let labels: Vec<_> = outs.iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(labels, vec!["then".to_string(), "else".to_string()]);
    }

    #[test]
    fn double_free_is_reported_without_crashing() {
        let (types, table) = node_type_table();
        let ctx = StepContext { types: &types };
        let h = SymHeap::new(table);
        let mut diagnostics = DiagnosticEngine::new();
        let instrs = vec![
            Instr::Call { dst: Some(Operand::var(1, 0)), name: "decl".into(), args: vec![Operand::FuncRef("node".into())] },
            Instr::Call { dst: Some(Operand::var(2, 0)), name: "decl".into(), args: vec![Operand::FuncRef("node_ptr".into())] },
            Instr::Call { dst: Some(Operand::var(2, 0)), name: "malloc".into(), args: vec![Operand::IntLit(16)] },
            Instr::Unop { op: UnOp::Assign, dst: Operand::var(1, 0).with_dot(0), src: Operand::var(2, 0) },
            Instr::Call { dst: None, name: "free".into(), args: vec![Operand::var(1, 0).with_dot(0)] },
            Instr::Call { dst: None, name: "free".into(), args: vec![Operand::var(1, 0).with_dot(0)] },
            Instr::Jmp("exit".into()),
        ];
        run_block(&h, &instrs, &ctx, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.of_kind(DefectKind::DoubleFree).count(), 1);
    }

    #[test]
    fn malloc_with_no_reachable_reference_at_return_is_a_leak() {
        let (types, table) = node_type_table();
        let ctx = StepContext { types: &types };
        let h = SymHeap::new(table);
        let mut diagnostics = DiagnosticEngine::new();
        let instrs = vec![
            Instr::Call { dst: Some(Operand::var(2, 0)), name: "decl".into(), args: vec![Operand::FuncRef("node_ptr".into())] },
            Instr::Call { dst: Some(Operand::var(2, 0)), name: "malloc".into(), args: vec![Operand::IntLit(16)] },
            Instr::Ret(None),
        ];
        run_block(&h, &instrs, &ctx, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.of_kind(DefectKind::MemoryLeak).count(), 1);
    }

    #[test]
    fn returning_the_malloced_pointer_is_not_a_leak() {
        let (types, table) = node_type_table();
        let ctx = StepContext { types: &types };
        let h = SymHeap::new(table);
        let mut diagnostics = DiagnosticEngine::new();
        let instrs = vec![
            Instr::Call { dst: Some(Operand::var(2, 0)), name: "decl".into(), args: vec![Operand::FuncRef("node_ptr".into())] },
            Instr::Call { dst: Some(Operand::var(2, 0)), name: "malloc".into(), args: vec![Operand::IntLit(16)] },
            Instr::Ret(Some(Operand::var(2, 0))),
        ];
        run_block(&h, &instrs, &ctx, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.of_kind(DefectKind::MemoryLeak).count(), 0);
    }
}
