//! End-to-end scenarios driven through [`shapecore::transfer::analyze_source`]
//! rather than the unit-level `step`/`analyzer` tests: whole functions, built
//! the way a frontend's textual IR would render a small C program, exercised
//! through the full parse-to-diagnostics pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use shapecore::common::error::DefectKind;
use shapecore::common::types::{ClType, Field, TypeKind, TypeTable};
use shapecore::config::AnalyzerConfig;
use shapecore::ids::TypeId;
use shapecore::transfer::analyze_source;

/// A singly-linked list node: `next` at offset 0 (a self-referential pointer,
/// the only binding shape this crate's segment join supports), `value` at
/// offset 8.
fn list_node_types() -> (HashMap<String, TypeId>, Arc<TypeTable>) {
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
    let mut names = HashMap::new();
    names.insert("int".to_string(), int_ty);
    names.insert("node_ptr".to_string(), ptr_ty);
    names.insert("node".to_string(), node_ty);
    (names, Arc::new(table))
}

/// S1: build a two-node list and hand it back to the caller. Returning the
/// head exempts the whole chain reachable from it, not just the head node
/// itself, so a well-formed list handed off this way is never a leak.
#[test]
fn s1_building_a_list_and_returning_it_reports_nothing() {
    let (names, types) = list_node_types();
    let src = "\
file a.c
fnc global build_list
bb entry
call_open %1 decl
call_arg 0 &node_ptr
call_close
call_open %1 malloc
call_arg 0 #16
call_arg 1 &node
call_close
call_open %2 decl
call_arg 0 &node_ptr
call_close
call_open %2 malloc
call_arg 0 #16
call_arg 1 &node
call_close
unop assign %1>0 %2
unop assign %2>0 #0
ret %1
endfnc
endfile
";
    let report = analyze_source(src, types, &names, &AnalyzerConfig::default()).unwrap();
    assert!(!report.diagnostics.has_errors());
    assert_eq!(report.diagnostics.diagnostics().iter().count(), 0);
    assert_eq!(report.functions, vec!["build_list".to_string()]);
}

/// S2: a loop appends nodes to the head of a list. The loop's exit test is
/// never proved either way (this harness models no general integer
/// arithmetic, so there is no decrementing counter to drive it concrete),
/// which is exactly the case the CFG fixed-point driver's join machinery
/// exists for: low `join_threshold` forces the loop header through the
/// union-to-join switch within a handful of visits, exercising the
/// self-referential segment join (`next` at offset 0) that stabilizes it.
/// The loop body never dereferences through the head variable itself (only
/// through the freshly malloc'd node each iteration), so it stays correct
/// whether the header's current state is a concrete chain or an
/// already-abstracted segment.
#[test]
fn s2_an_append_loop_converges_without_a_state_count_error() {
    let (names, types) = list_node_types();
    let src = "\
file a.c
fnc global build_list_loop
bb entry
call_open %1 decl
call_arg 0 &node_ptr
call_close
unop assign %1 #0
call_open %4 decl
call_arg 0 &int
call_close
jmp loop
bb loop
call_open %2 decl
call_arg 0 &node_ptr
call_close
call_open %2 malloc
call_arg 0 #16
call_arg 1 &node
call_close
unop assign %2>0 %1
unop assign %1 %2
cond %4 exit loop
bb exit
ret %1
endfnc
endfile
";
    let config = AnalyzerConfig { join_threshold: 2, ..AnalyzerConfig::default() };
    let report = analyze_source(src, types, &names, &config).unwrap();
    assert!(!report.diagnostics.has_errors(), "unexpected errors: {:?}", report.diagnostics.diagnostics().iter().collect::<Vec<_>>());
    assert_eq!(report.diagnostics.of_kind(DefectKind::MemoryLeak).count(), 0);
    assert_eq!(report.diagnostics.of_kind(DefectKind::NullDeref).count(), 0);
    assert_eq!(report.diagnostics.of_kind(DefectKind::InvalidDeref).count(), 0);
}

/// S3: detach the first node, free it, then free what remains. Nothing here
/// should be flagged: each node is freed exactly once and nothing is left
/// unreachable at `ret`.
#[test]
fn s3_delete_first_then_drain_reports_nothing() {
    let (names, types) = list_node_types();
    let src = "\
file a.c
fnc global drain
bb entry
call_open %1 decl
call_arg 0 &node_ptr
call_close
call_open %1 malloc
call_arg 0 #16
call_arg 1 &node
call_close
call_open %2 decl
call_arg 0 &node_ptr
call_close
call_open %2 malloc
call_arg 0 #16
call_arg 1 &node
call_close
unop assign %1>0 %2
unop assign %2>0 #0
call_open %5 decl
call_arg 0 &node_ptr
call_close
unop assign %5 %1
unop assign %1 %5>0
call_open - free
call_arg 0 %5
call_close
call_open - free
call_arg 0 %1
call_close
unop assign %1 #0
ret #0
endfnc
endfile
";
    let report = analyze_source(src, types, &names, &AnalyzerConfig::default()).unwrap();
    assert!(!report.diagnostics.has_errors());
    assert_eq!(report.diagnostics.diagnostics().iter().count(), 0);
}

/// S3 variant: freeing the already-drained first node a second time is a
/// double free, not a second no-op.
#[test]
fn s3_freeing_the_same_node_twice_is_a_double_free() {
    let (names, types) = list_node_types();
    let src = "\
file a.c
fnc global double_free
bb entry
call_open %1 decl
call_arg 0 &node_ptr
call_close
call_open %1 malloc
call_arg 0 #16
call_arg 1 &node
call_close
call_open - free
call_arg 0 %1
call_close
call_open - free
call_arg 0 %1
call_close
ret #0
endfnc
endfile
";
    let report = analyze_source(src, types, &names, &AnalyzerConfig::default()).unwrap();
    assert_eq!(report.diagnostics.of_kind(DefectKind::DoubleFree).count(), 1);
}

/// S4/S6 together: a node is malloc'd and its `next` field written through
/// before the list is ever pointed at by anything reachable, and the
/// function returns without freeing or handing the pointer back — both the
/// null-unsafe write (once the head is nulled out) and the leak should
/// surface.
#[test]
fn s4_and_s6_null_deref_and_leak_are_both_reported() {
    let (names, types) = list_node_types();
    let src = "\
file a.c
fnc global bug
bb entry
call_open %1 decl
call_arg 0 &node_ptr
call_close
call_open %1 malloc
call_arg 0 #16
call_arg 1 &node
call_close
unop assign %1 #0
unop assign %1>0 #0
ret #0
endfnc
endfile
";
    let report = analyze_source(src, types, &names, &AnalyzerConfig::default()).unwrap();
    assert_eq!(report.diagnostics.of_kind(DefectKind::NullDeref).count(), 1);
    assert_eq!(report.diagnostics.of_kind(DefectKind::MemoryLeak).count(), 1);
}
