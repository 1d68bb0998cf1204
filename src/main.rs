//! `shapecore` CLI: reads a textual IR file (§6.1), analyzes every function
//! it defines, and reports diagnostics. `--dump` additionally prints the
//! names of the functions that were analyzed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use shapecore::common::types::TypeTable;
use shapecore::config::AnalyzerConfig;
use shapecore::ids::TypeId;
use shapecore::transfer::analyze_source;

struct Args {
    ir_path: PathBuf,
    config_path: Option<PathBuf>,
    dump: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut ir_path = None;
    let mut config_path = None;
    let mut dump = false;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(it.next().ok_or("--config needs a path")?));
            }
            "--dump" => dump = true,
            other if ir_path.is_none() => ir_path = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument `{other}`")),
        }
    }
    Ok(Args {
        ir_path: ir_path.ok_or("usage: shapecore [--config FILE] [--dump] <ir-file>")?,
        config_path,
        dump,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let config = match &args.config_path {
        Some(path) => match AnalyzerConfig::load_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => AnalyzerConfig::cli_default(),
    };

    let source = match std::fs::read_to_string(&args.ir_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cannot read {}: {e}", args.ir_path.display());
            return ExitCode::FAILURE;
        }
    };

    // This demonstration harness's textual IR names types by a bare
    // identifier in `decl`'s argument; since it has no type-declaration
    // syntax of its own, every run registers the same small fixed set of
    // scalar/pointer/struct shapes a fixture needs. A real frontend would
    // populate this table from the program's actual type declarations.
    let (type_names, types) = bootstrap_types();

    let report = match analyze_source(&source, types, &type_names, &config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("analysis failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    use shapecore::common::error::Severity;
    for diag in report.diagnostics.diagnostics() {
        let label = match diag.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        eprintln!("{label}: {}", diag.message);
    }

    if args.dump {
        println!("functions analyzed: {}", report.functions.join(", "));
    }

    if report.diagnostics.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn bootstrap_types() -> (HashMap<String, TypeId>, Arc<TypeTable>) {
    use shapecore::common::types::{ClType, Field, TypeKind};

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
