//! The consumed-IR contract (§6.1, §9 "Polymorphism of listener chain"): a
//! `CodeListener` trait mirroring the event stream an external front-end
//! would drive, a `ChainListener` broadcaster so several listeners can
//! observe the same stream, and an `IntegrityCheckListener` that records
//! structural violations (opens without matching closes) without aborting
//! the stream — malformed input is the textual reader's problem to report,
//! not a reason for one listener to crash every other subscriber.

use crate::ir::event::{BinOp, Operand, UnOp};

/// Mirrors the external code-listener-chain interface: `file_open`,
/// `fnc_open`/`fnc_arg_decl`, `bb_open`, the typed instruction set, and the
/// matching close events. A stream is well-formed when opens and closes
/// nest properly; see [`IntegrityCheckListener`].
#[allow(unused_variables)]
pub trait CodeListener {
    fn file_open(&mut self, name: &str) {}
    fn fnc_open(&mut self, scope: &str, name: &str) {}
    fn fnc_arg_decl(&mut self, pos: u32, name: &str) {}
    fn bb_open(&mut self, label: &str) {}
    fn jmp(&mut self, target: &str) {}
    fn cond(&mut self, val: Operand, then_label: &str, else_label: &str) {}
    fn ret(&mut self, val: Option<Operand>) {}
    fn unop(&mut self, op: UnOp, dst: Operand, src: Operand) {}
    fn binop(&mut self, op: BinOp, dst: Operand, lhs: Operand, rhs: Operand) {}
    fn call_open(&mut self, dst: Option<Operand>, name: &str) {}
    fn call_arg(&mut self, pos: u32, arg: Operand) {}
    fn call_close(&mut self) {}
    fn fnc_close(&mut self) {}
    fn file_close(&mut self) {}
}

/// Broadcasts every event to each subscriber in registration order. The
/// source's intrusive linked list of listeners becomes a plain `Vec`.
#[derive(Default)]
pub struct ChainListener {
    subscribers: Vec<Box<dyn CodeListener>>,
}

impl ChainListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Box<dyn CodeListener>) {
        self.subscribers.push(listener);
    }
}

impl CodeListener for ChainListener {
    fn file_open(&mut self, name: &str) {
        for s in &mut self.subscribers {
            s.file_open(name);
        }
    }

    fn fnc_open(&mut self, scope: &str, name: &str) {
        for s in &mut self.subscribers {
            s.fnc_open(scope, name);
        }
    }

    fn fnc_arg_decl(&mut self, pos: u32, name: &str) {
        for s in &mut self.subscribers {
            s.fnc_arg_decl(pos, name);
        }
    }

    fn bb_open(&mut self, label: &str) {
        for s in &mut self.subscribers {
            s.bb_open(label);
        }
    }

    fn jmp(&mut self, target: &str) {
        for s in &mut self.subscribers {
            s.jmp(target);
        }
    }

    fn cond(&mut self, val: Operand, then_label: &str, else_label: &str) {
        for s in &mut self.subscribers {
            s.cond(val.clone(), then_label, else_label);
        }
    }

    fn ret(&mut self, val: Option<Operand>) {
        for s in &mut self.subscribers {
            s.ret(val.clone());
        }
    }

    fn unop(&mut self, op: UnOp, dst: Operand, src: Operand) {
        for s in &mut self.subscribers {
            s.unop(op, dst.clone(), src.clone());
        }
    }

    fn binop(&mut self, op: BinOp, dst: Operand, lhs: Operand, rhs: Operand) {
        for s in &mut self.subscribers {
            s.binop(op, dst.clone(), lhs.clone(), rhs.clone());
        }
    }

    fn call_open(&mut self, dst: Option<Operand>, name: &str) {
        for s in &mut self.subscribers {
            s.call_open(dst.clone(), name);
        }
    }

    fn call_arg(&mut self, pos: u32, arg: Operand) {
        for s in &mut self.subscribers {
            s.call_arg(pos, arg.clone());
        }
    }

    fn call_close(&mut self) {
        for s in &mut self.subscribers {
            s.call_close();
        }
    }

    fn fnc_close(&mut self) {
        for s in &mut self.subscribers {
            s.fnc_close();
        }
    }

    fn file_close(&mut self) {
        for s in &mut self.subscribers {
            s.file_close();
        }
    }
}

/// Tracks nesting of file/function/basic-block/call scopes and records a
/// human-readable violation string for each mismatch it observes. Never
/// aborts the stream: a malformed producer still finishes delivering events
/// to the other chain members.
#[derive(Default)]
pub struct IntegrityCheckListener {
    file_open: bool,
    fnc_open: bool,
    bb_open: bool,
    call_depth: u32,
    violations: Vec<String>,
}

impl IntegrityCheckListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl CodeListener for IntegrityCheckListener {
    fn file_open(&mut self, _name: &str) {
        if self.file_open {
            self.violations.push("file_open without matching file_close".into());
        }
        self.file_open = true;
    }

    fn fnc_open(&mut self, _scope: &str, name: &str) {
        if self.fnc_open {
            self.violations.push(format!("fnc_open({name}) while another function is still open"));
        }
        self.fnc_open = true;
    }

    fn bb_open(&mut self, label: &str) {
        if !self.fnc_open {
            self.violations.push(format!("bb_open({label}) outside any function"));
        }
        self.bb_open = true;
    }

    fn call_open(&mut self, _dst: Option<Operand>, name: &str) {
        if !self.bb_open {
            self.violations.push(format!("call_open({name}) outside any basic block"));
        }
        self.call_depth += 1;
    }

    fn call_close(&mut self) {
        if self.call_depth == 0 {
            self.violations.push("call_close without a matching call_open".into());
        } else {
            self.call_depth -= 1;
        }
    }

    fn fnc_close(&mut self) {
        if !self.fnc_open {
            self.violations.push("fnc_close without a matching fnc_open".into());
        }
        self.fnc_open = false;
        self.bb_open = false;
    }

    fn file_close(&mut self) {
        if !self.file_open {
            self.violations.push("file_close without a matching file_open".into());
        }
        if self.fnc_open {
            self.violations.push("file_close while a function is still open".into());
        }
        self.file_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_stream_has_no_violations() {
        let mut l = IntegrityCheckListener::new();
        l.file_open("a.c");
        l.fnc_open("global", "main");
        l.bb_open("entry");
        l.call_open(None, "malloc");
        l.call_close();
        l.fnc_close();
        l.file_close();
        assert!(l.is_clean());
    }

    #[test]
    fn unmatched_call_close_is_a_violation() {
        let mut l = IntegrityCheckListener::new();
        l.file_open("a.c");
        l.fnc_open("global", "main");
        l.bb_open("entry");
        l.call_close();
        assert!(!l.is_clean());
    }

    #[test]
    fn bb_open_outside_function_is_a_violation() {
        let mut l = IntegrityCheckListener::new();
        l.file_open("a.c");
        l.bb_open("entry");
        assert!(!l.is_clean());
    }

    #[test]
    fn chain_listener_forwards_to_every_subscriber() {
        #[derive(Default)]
        struct Counter {
            opens: u32,
        }
        impl CodeListener for Counter {
            fn fnc_open(&mut self, _scope: &str, _name: &str) {
                self.opens += 1;
            }
        }

        struct Recorder(std::rc::Rc<std::cell::RefCell<u32>>);
        impl CodeListener for Recorder {
            fn fnc_open(&mut self, _scope: &str, _name: &str) {
                *self.0.borrow_mut() += 1;
            }
        }

        let shared = std::rc::Rc::new(std::cell::RefCell::new(0));
        let mut chain = ChainListener::new();
        chain.add(Box::new(Counter::default()));
        chain.add(Box::new(Recorder(shared.clone())));
        chain.fnc_open("global", "f");
        assert_eq!(*shared.borrow(), 1);
    }
}
