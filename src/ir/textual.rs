//! `ir::textual` — a line-oriented reader for a small instruction-text
//! format, the crate's one concrete IR producer (§6.1). Reading real C
//! source is external to this crate; this is a demonstration harness for
//! the tests and the CLI, not a parser for any existing language.
//!
//! Operand syntax: `%uid` or `%uid@inst` for a variable, optionally followed
//! by a chain of `.offset` (direct field access) and `>offset` (dereference,
//! then field access) steps — e.g. `%1@0>0.8` reads "the value of `%1`
//! instance 0, dereferenced, then its field at offset 8". `#123` is an
//! integer literal, `"text"` a string literal, `&name` a function reference.

use crate::common::error::AnalysisError;
use crate::ir::event::{BinOp, ChainOp, Operand, UnOp};
use crate::ir::listener::CodeListener;

fn parse_operand(tok: &str) -> Result<Operand, AnalysisError> {
    if let Some(rest) = tok.strip_prefix('%') {
        let split_at = rest.find(['.', '>']).unwrap_or(rest.len());
        let head = &rest[..split_at];
        let mut chain_str = &rest[split_at..];
        let (uid_str, inst_str) = match head.split_once('@') {
            Some((u, i)) => (u, i),
            None => (head, "0"),
        };
        let c_var_uid: u32 = uid_str
            .parse()
            .map_err(|_| AnalysisError::contract(format!("bad variable id in operand `{tok}`")))?;
        let inst: u32 = inst_str
            .parse()
            .map_err(|_| AnalysisError::contract(format!("bad instance number in operand `{tok}`")))?;
        let mut operand = Operand::var(c_var_uid, inst);
        while !chain_str.is_empty() {
            let op = match chain_str.as_bytes()[0] {
                b'.' => ChainOp::Dot,
                b'>' => ChainOp::Arrow,
                c => {
                    return Err(AnalysisError::contract(format!(
                        "expected '.' or '>' in operand `{tok}`, found `{}`",
                        c as char
                    )))
                }
            };
            let rest2 = &chain_str[1..];
            let end = rest2.find(['.', '>']).unwrap_or(rest2.len());
            let offset: u32 = rest2[..end]
                .parse()
                .map_err(|_| AnalysisError::contract(format!("bad field offset in operand `{tok}`")))?;
            operand = match op {
                ChainOp::Dot => operand.with_dot(offset),
                ChainOp::Arrow => operand.with_arrow(offset),
            };
            chain_str = &rest2[end..];
        }
        Ok(operand)
    } else if let Some(rest) = tok.strip_prefix('#') {
        let n: i64 = rest
            .parse()
            .map_err(|_| AnalysisError::contract(format!("bad integer literal `{tok}`")))?;
        Ok(Operand::IntLit(n))
    } else if let Some(rest) = tok.strip_prefix('&') {
        Ok(Operand::FuncRef(rest.to_string()))
    } else if tok.starts_with('"') && tok.ends_with('"') && tok.len() >= 2 {
        Ok(Operand::StrLit(tok[1..tok.len() - 1].to_string()))
    } else {
        Err(AnalysisError::contract(format!("unrecognized operand `{tok}`")))
    }
}

fn parse_unop(tok: &str) -> Result<UnOp, AnalysisError> {
    match tok {
        "assign" => Ok(UnOp::Assign),
        "addr" => Ok(UnOp::AddressOf),
        "deref" => Ok(UnOp::Deref),
        "not" => Ok(UnOp::Not),
        other => Err(AnalysisError::contract(format!("unknown unop `{other}`"))),
    }
}

fn parse_binop(tok: &str) -> Result<BinOp, AnalysisError> {
    match tok {
        "add" => Ok(BinOp::Add),
        "sub" => Ok(BinOp::Sub),
        "eq" => Ok(BinOp::Eq),
        "ne" => Ok(BinOp::Ne),
        other => Err(AnalysisError::contract(format!("unknown binop `{other}`"))),
    }
}

/// Reads `source` line by line, driving `listener` with the corresponding
/// `CodeListener` calls. Blank lines and `#`-comment lines are skipped.
pub fn read_str(source: &str, listener: &mut dyn CodeListener) -> Result<(), AnalysisError> {
    for (lineno, raw_line) in source.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        dispatch_line(&tokens, listener)
            .map_err(|e| AnalysisError::contract(format!("line {}: {}", lineno + 1, describe(&e))))?;
    }
    Ok(())
}

fn describe(err: &AnalysisError) -> String {
    err.to_string()
}

fn dispatch_line(tokens: &[&str], listener: &mut dyn CodeListener) -> Result<(), AnalysisError> {
    let keyword = *tokens.first().ok_or_else(|| AnalysisError::contract("empty instruction"))?;
    match keyword {
        "file" => {
            let name = tokens.get(1).ok_or_else(|| AnalysisError::contract("file needs a name"))?;
            listener.file_open(name);
            Ok(())
        }
        "endfile" => {
            listener.file_close();
            Ok(())
        }
        "fnc" => {
            let scope = tokens.get(1).ok_or_else(|| AnalysisError::contract("fnc needs a scope"))?;
            let name = tokens.get(2).ok_or_else(|| AnalysisError::contract("fnc needs a name"))?;
            listener.fnc_open(scope, name);
            Ok(())
        }
        "endfnc" => {
            listener.fnc_close();
            Ok(())
        }
        "arg" => {
            let pos: u32 = tokens
                .get(1)
                .ok_or_else(|| AnalysisError::contract("arg needs a position"))?
                .parse()
                .map_err(|_| AnalysisError::contract("arg position must be an integer"))?;
            let name = tokens.get(2).ok_or_else(|| AnalysisError::contract("arg needs a name"))?;
            listener.fnc_arg_decl(pos, name);
            Ok(())
        }
        "bb" => {
            let label = tokens.get(1).ok_or_else(|| AnalysisError::contract("bb needs a label"))?;
            listener.bb_open(label);
            Ok(())
        }
        "jmp" => {
            let target = tokens.get(1).ok_or_else(|| AnalysisError::contract("jmp needs a target"))?;
            listener.jmp(target);
            Ok(())
        }
        "cond" => {
            let val = parse_operand(tokens.get(1).ok_or_else(|| AnalysisError::contract("cond needs an operand"))?)?;
            let then_label =
                tokens.get(2).ok_or_else(|| AnalysisError::contract("cond needs a then-label"))?;
            let else_label =
                tokens.get(3).ok_or_else(|| AnalysisError::contract("cond needs an else-label"))?;
            listener.cond(val, then_label, else_label);
            Ok(())
        }
        "ret" => {
            let val = match tokens.get(1) {
                Some(tok) => Some(parse_operand(tok)?),
                None => None,
            };
            listener.ret(val);
            Ok(())
        }
        "unop" => {
            let op = parse_unop(tokens.get(1).ok_or_else(|| AnalysisError::contract("unop needs an op"))?)?;
            let dst = parse_operand(tokens.get(2).ok_or_else(|| AnalysisError::contract("unop needs a dst"))?)?;
            let src = parse_operand(tokens.get(3).ok_or_else(|| AnalysisError::contract("unop needs a src"))?)?;
            listener.unop(op, dst, src);
            Ok(())
        }
        "binop" => {
            let op = parse_binop(tokens.get(1).ok_or_else(|| AnalysisError::contract("binop needs an op"))?)?;
            let dst = parse_operand(tokens.get(2).ok_or_else(|| AnalysisError::contract("binop needs a dst"))?)?;
            let lhs = parse_operand(tokens.get(3).ok_or_else(|| AnalysisError::contract("binop needs a lhs"))?)?;
            let rhs = parse_operand(tokens.get(4).ok_or_else(|| AnalysisError::contract("binop needs a rhs"))?)?;
            listener.binop(op, dst, lhs, rhs);
            Ok(())
        }
        "call_open" => {
            let dst = match tokens.get(1) {
                Some(&"-") | None => None,
                Some(tok) => Some(parse_operand(tok)?),
            };
            let name = tokens.get(2).ok_or_else(|| AnalysisError::contract("call_open needs a callee name"))?;
            listener.call_open(dst, name);
            Ok(())
        }
        "call_arg" => {
            let pos: u32 = tokens
                .get(1)
                .ok_or_else(|| AnalysisError::contract("call_arg needs a position"))?
                .parse()
                .map_err(|_| AnalysisError::contract("call_arg position must be an integer"))?;
            let arg = parse_operand(tokens.get(2).ok_or_else(|| AnalysisError::contract("call_arg needs a value"))?)?;
            listener.call_arg(pos, arg);
            Ok(())
        }
        "call_close" => {
            listener.call_close();
            Ok(())
        }
        other => Err(AnalysisError::contract(format!("unknown instruction `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording {
        events: Vec<String>,
    }

    impl CodeListener for Recording {
        fn file_open(&mut self, name: &str) {
            self.events.push(format!("file_open {name}"));
        }
        fn fnc_open(&mut self, scope: &str, name: &str) {
            self.events.push(format!("fnc_open {scope} {name}"));
        }
        fn bb_open(&mut self, label: &str) {
            self.events.push(format!("bb_open {label}"));
        }
        fn jmp(&mut self, target: &str) {
            self.events.push(format!("jmp {target}"));
        }
        fn ret(&mut self, val: Option<Operand>) {
            self.events.push(format!("ret {val:?}"));
        }
        fn fnc_close(&mut self) {
            self.events.push("fnc_close".into());
        }
        fn file_close(&mut self) {
            self.events.push("file_close".into());
        }
    }

    #[test]
    fn reads_a_minimal_function() {
        let src = "file a.c\nfnc global main\nbb entry\nret #0\nendfnc\nendfile\n";
        let mut rec = Recording::default();
        read_str(src, &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec![
                "file_open a.c".to_string(),
                "fnc_open global main".to_string(),
                "bb_open entry".to_string(),
                "ret Some(IntLit(0))".to_string(),
                "fnc_close".to_string(),
                "file_close".to_string(),
            ]
        );
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let src = "// a comment\n\nfile a.c\nendfile\n";
        let mut rec = Recording::default();
        read_str(src, &mut rec).unwrap();
        assert_eq!(rec.events, vec!["file_open a.c".to_string(), "file_close".to_string()]);
    }

    #[test]
    fn variable_operand_parses_uid_inst_and_field_chain() {
        assert_eq!(parse_operand("%3@1.8").unwrap(), Operand::var(3, 1).with_dot(8));
        assert_eq!(parse_operand("%3").unwrap(), Operand::var(3, 0));
    }

    #[test]
    fn arrow_step_parses_as_dereference() {
        assert_eq!(parse_operand("%1>0").unwrap(), Operand::var(1, 0).with_arrow(0));
        assert_eq!(parse_operand("%1>0.8").unwrap(), Operand::var(1, 0).with_arrow(0).with_dot(8));
    }

    #[test]
    fn malformed_instruction_reports_its_line_number() {
        let src = "file a.c\nbogus\n";
        let mut rec = Recording::default();
        let err = read_str(src, &mut rec).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
