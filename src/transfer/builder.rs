//! `FunctionCollector` — a `CodeListener` that assembles the event stream
//! into per-function `Cfg`s and instruction lists the [`crate::transfer`]
//! step functions can execute. This is the harness's only stateful listener
//! besides [`crate::ir::listener::IntegrityCheckListener`].

use std::collections::HashMap;

use crate::cfg::graph::Cfg;
use crate::ir::event::{BinOp, Operand, UnOp};
use crate::ir::listener::CodeListener;
use crate::transfer::instr::Instr;

/// One parsed function, ready to be driven through a [`crate::cfg::FixedPointDriver`].
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub cfg: Cfg,
    pub blocks: HashMap<String, Vec<Instr>>,
    /// `(position, name)` pairs as declared; this harness does not map
    /// argument names back to `cVarUid`s (the textual format addresses
    /// variables by id directly), so this is carried only for `--dump`.
    pub args: Vec<(u32, String)>,
}

struct PendingCall {
    dst: Option<Operand>,
    name: String,
    args: Vec<(u32, Operand)>,
}

#[derive(Default)]
struct PartialFunction {
    name: String,
    cfg: Option<Cfg>,
    blocks: HashMap<String, Vec<Instr>>,
    current_block: Option<String>,
    args: Vec<(u32, String)>,
    pending_call: Option<PendingCall>,
}

impl PartialFunction {
    fn push(&mut self, instr: Instr) {
        if let Some(block) = &self.current_block {
            self.blocks.entry(block.clone()).or_default().push(instr);
        }
    }
}

#[derive(Default)]
pub struct FunctionCollector {
    pub functions: Vec<Function>,
    current: Option<PartialFunction>,
}

impl FunctionCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodeListener for FunctionCollector {
    fn fnc_open(&mut self, _scope: &str, name: &str) {
        self.current = Some(PartialFunction { name: name.to_string(), ..PartialFunction::default() });
    }

    fn fnc_arg_decl(&mut self, pos: u32, name: &str) {
        if let Some(pf) = &mut self.current {
            pf.args.push((pos, name.to_string()));
        }
    }

    fn bb_open(&mut self, label: &str) {
        if let Some(pf) = &mut self.current {
            match &mut pf.cfg {
                Some(cfg) => cfg.add_block(label),
                None => pf.cfg = Some(Cfg::new(label)),
            }
            pf.blocks.entry(label.to_string()).or_default();
            pf.current_block = Some(label.to_string());
        }
    }

    fn jmp(&mut self, target: &str) {
        if let Some(pf) = &mut self.current {
            if let (Some(cfg), Some(cur)) = (&mut pf.cfg, &pf.current_block) {
                cfg.add_edge(cur.clone(), target);
            }
            pf.push(Instr::Jmp(target.to_string()));
        }
    }

    fn cond(&mut self, val: Operand, then_label: &str, else_label: &str) {
        if let Some(pf) = &mut self.current {
            if let (Some(cfg), Some(cur)) = (&mut pf.cfg, &pf.current_block) {
                cfg.add_edge(cur.clone(), then_label);
                cfg.add_edge(cur.clone(), else_label);
            }
            pf.push(Instr::Cond {
                val,
                then_label: then_label.to_string(),
                else_label: else_label.to_string(),
            });
        }
    }

    fn ret(&mut self, val: Option<Operand>) {
        if let Some(pf) = &mut self.current {
            pf.push(Instr::Ret(val));
        }
    }

    fn unop(&mut self, op: UnOp, dst: Operand, src: Operand) {
        if let Some(pf) = &mut self.current {
            pf.push(Instr::Unop { op, dst, src });
        }
    }

    fn binop(&mut self, op: BinOp, dst: Operand, lhs: Operand, rhs: Operand) {
        if let Some(pf) = &mut self.current {
            pf.push(Instr::Binop { op, dst, lhs, rhs });
        }
    }

    fn call_open(&mut self, dst: Option<Operand>, name: &str) {
        if let Some(pf) = &mut self.current {
            pf.pending_call = Some(PendingCall { dst, name: name.to_string(), args: Vec::new() });
        }
    }

    fn call_arg(&mut self, pos: u32, arg: Operand) {
        if let Some(pf) = &mut self.current {
            if let Some(pending) = &mut pf.pending_call {
                pending.args.push((pos, arg));
            }
        }
    }

    fn call_close(&mut self) {
        if let Some(pf) = &mut self.current {
            if let Some(mut pending) = pf.pending_call.take() {
                pending.args.sort_by_key(|(pos, _)| *pos);
                let args = pending.args.into_iter().map(|(_, a)| a).collect();
                pf.push(Instr::Call { dst: pending.dst, name: pending.name, args });
            }
        }
    }

    fn fnc_close(&mut self) {
        if let Some(pf) = self.current.take() {
            let cfg = pf.cfg.unwrap_or_else(|| Cfg::new("entry"));
            self.functions.push(Function { name: pf.name, cfg, blocks: pf.blocks, args: pf.args });
        }
    }
}
