#![forbid(unsafe_code)]

//! Text form of the instruction set: one instruction per line, `#` starts a
//! comment.
//!
//! ```text
//! const_load 3
//! local_get x
//! i32_add
//! call builtins::abs 1
//! return
//! ```

use chroma_ast::{Fqn, Loc};
use chroma_core::{ChromaError, ErrorKind, Value};

use crate::code::OpCode;

const FILENAME: &str = "<bytecode>";

fn parse_error(message: impl Into<String>, detail: impl Into<String>, line: usize, text: &str) -> ChromaError {
    let line = u32::try_from(line).unwrap_or(u32::MAX);
    let width = u32::try_from(text.len()).unwrap_or(u32::MAX);
    ChromaError::simple(ErrorKind::Parse, message, detail, &Loc::new(FILENAME, line, line, 0, width))
}

pub fn parse_code(text: &str) -> Result<Vec<OpCode>, ChromaError> {
    let mut code = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let lineno = i + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let op = parse_op(name, rest).map_err(|detail| {
            parse_error(format!("invalid instruction `{line}`"), detail, lineno, raw)
        })?;
        code.push(op);
    }
    Ok(code)
}

/// Everything before a `#` that is not inside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            '#' if !in_str => return &line[..i],
            _ => {}
        }
    }
    line
}

fn no_args(op: OpCode, rest: &str) -> Result<OpCode, String> {
    if rest.is_empty() {
        Ok(op)
    } else {
        Err(format!("`{}` takes no operand", op.name()))
    }
}

fn ident(rest: &str) -> Result<String, String> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [name] => Ok((*name).to_string()),
        _ => Err("expected one name".to_string()),
    }
}

fn fqn(text: &str) -> Result<Fqn, String> {
    Fqn::parse(text).map_err(|e| e.to_string())
}

fn parse_op(name: &str, rest: &str) -> Result<OpCode, String> {
    match name {
        "const_load" => parse_const(rest).map(OpCode::ConstLoad),
        "i32_add" => no_args(OpCode::I32Add, rest),
        "i32_sub" => no_args(OpCode::I32Sub, rest),
        "i32_mul" => no_args(OpCode::I32Mul, rest),
        "pop" => no_args(OpCode::Pop, rest),
        "return" => no_args(OpCode::Return, rest),
        "local_get" => ident(rest).map(OpCode::LocalGet),
        "local_set" => ident(rest).map(OpCode::LocalSet),
        "global_get" => fqn(&ident(rest)?).map(OpCode::GlobalGet),
        "global_set" => fqn(&ident(rest)?).map(OpCode::GlobalSet),
        "call" => match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
            [target, argc] => {
                let argc = argc
                    .parse::<usize>()
                    .map_err(|_| format!("invalid argument count `{argc}`"))?;
                Ok(OpCode::Call(fqn(target)?, argc))
            }
            _ => Err("expected `call <fqn> <argc>`".to_string()),
        },
        other => Err(format!("unknown opcode `{other}`")),
    }
}

/// A constant operand: `None`, `True`, `False`, an integer, a float or a
/// double-quoted string.
pub fn parse_const(text: &str) -> Result<Value, String> {
    let text = text.trim();
    match text {
        "None" => return Ok(Value::None),
        "True" => return Ok(Value::Bool(true)),
        "False" => return Ok(Value::Bool(false)),
        "" => return Err("missing constant".to_string()),
        _ => {}
    }
    if let Some(body) = text.strip_prefix('"') {
        return parse_str(body).map(|s| Value::str(&s));
    }
    if let Ok(v) = text.parse::<i32>() {
        return Ok(Value::I32(v));
    }
    if text.contains(['.', 'e', 'E']) || matches!(text, "inf" | "-inf" | "NaN") {
        if let Ok(v) = text.parse::<f64>() {
            return Ok(Value::F64(v));
        }
    }
    Err(format!("invalid constant `{text}`"))
}

/// The content of a string literal, after its opening quote.
fn parse_str(body: &str) -> Result<String, String> {
    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                return if chars.as_str().trim().is_empty() {
                    Ok(out)
                } else {
                    Err("unexpected text after string".to_string())
                };
            }
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some(other) => return Err(format!("unknown escape `\\{other}`")),
                None => return Err("unterminated string".to_string()),
            },
            other => out.push(other),
        }
    }
    Err("unterminated string".to_string())
}
