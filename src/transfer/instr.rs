//! The assembled per-block instruction form the transfer layer actually
//! executes. `call_open`/`call_arg`/`call_close` triplets from the listener
//! contract (§6.1) are assembled into a single [`Instr::Call`] here; every
//! other instruction corresponds 1:1 with a `CodeListener` method.

use crate::ir::event::{BinOp, Operand, UnOp};

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Jmp(String),
    Cond { val: Operand, then_label: String, else_label: String },
    Ret(Option<Operand>),
    Unop { op: UnOp, dst: Operand, src: Operand },
    Binop { op: BinOp, dst: Operand, lhs: Operand, rhs: Operand },
    /// A call, including the three builtins the transfer layer recognizes by
    /// name: `decl` (materializes `dst`'s storage as an instance of the type
    /// named by its sole `FuncRef` argument — standing in for a type
    /// front-end this harness doesn't have), `malloc`, and `free`. Any other
    /// name is evaluated as an opaque call: its result is `VAL_UNKNOWN`.
    Call { dst: Option<Operand>, name: String, args: Vec<Operand> },
}

impl Instr {
    /// `true` for an instruction that ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Jmp(_) | Instr::Cond { .. } | Instr::Ret(_))
    }
}
