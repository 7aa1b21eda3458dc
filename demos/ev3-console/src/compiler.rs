//! Straight-line compiler for console programs.
//!
//! Each non-blank line is one primitive call, `name(arg, ...)`, with
//! integer, float or double-quoted string arguments. `//` starts a comment.

use async_trait::async_trait;
use remote_exec_core::{ErrorKind, Position, SourceError, SourceLocation};
use remote_exec_pipeline::{
    CompiledProgram, Compiler, Function, Instruction, LanguageContext, Opcode, Operand,
    SourceFiles,
};

/// Operand stack the entry function reserves.
const STACK_SIZE: u8 = 16;

pub struct LineCompiler;

fn location(file: &str, line: usize, column: usize, width: usize) -> SourceLocation {
    let line = u32::try_from(line + 1).unwrap_or(u32::MAX);
    let column_at = |c: usize| u32::try_from(c).unwrap_or(u32::MAX);
    SourceLocation {
        file: Some(file.to_string()),
        start: Position {
            line,
            column: column_at(column),
        },
        end: Position {
            line,
            column: column_at(column + width),
        },
    }
}

fn parse_arg(raw: &str) -> Option<Operand> {
    let raw = raw.trim();
    if let Some(s) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Some(Operand::Str(s.to_string()));
    }
    if let Ok(i) = raw.parse::<i32>() {
        return Some(Operand::Int(i));
    }
    raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(Operand::Float)
}

fn push_arg(instructions: &mut Vec<Instruction>, arg: Operand) {
    let opcode = match arg {
        Operand::Int(_) => Opcode::Lgci,
        Operand::Float(_) => Opcode::Lgcf64,
        Operand::Str(_) => Opcode::Lgcs,
    };
    instructions.push(Instruction::with_operands(opcode, [arg]));
}

/// Compile one statement, returning an error message and its column on
/// failure.
fn compile_line(
    code: &str,
    context: &LanguageContext,
    instructions: &mut Vec<Instruction>,
) -> Result<(), (ErrorKind, String, usize)> {
    let code = code.trim_end_matches(';').trim_end();
    let Some((name, rest)) = code.split_once('(') else {
        return Err((ErrorKind::Syntax, "Expected a call".into(), 0));
    };
    let Some(args) = rest.strip_suffix(')') else {
        return Err((ErrorKind::Syntax, "Missing ')'".into(), code.len()));
    };
    let name = name.trim();
    let Some((index, function)) = context.primitive(name) else {
        return Err((ErrorKind::Type, format!("Name {name} not declared."), 0));
    };

    let mut argc = 0;
    for raw in args.split(',').filter(|a| !a.trim().is_empty()) {
        let Some(arg) = parse_arg(raw) else {
            let column = name.len() + 1;
            return Err((ErrorKind::Syntax, format!("Invalid argument {}", raw.trim()), column));
        };
        push_arg(instructions, arg);
        argc += 1;
    }
    if argc != i32::from(function.arity) {
        let message = format!("{name} expects {} argument(s), got {argc}.", function.arity);
        return Err((ErrorKind::Type, message, 0));
    }

    let index = i32::try_from(index).unwrap_or(i32::MAX);
    instructions.push(Instruction::with_operands(
        Opcode::Callv,
        [Operand::Int(index), Operand::Int(argc)],
    ));
    instructions.push(Instruction::new(Opcode::Popg));
    Ok(())
}

#[async_trait]
impl Compiler for LineCompiler {
    async fn compile(
        &self,
        files: &SourceFiles,
        entrypoint: &str,
        context: &mut LanguageContext,
    ) -> Option<CompiledProgram> {
        let Some(source) = files.get(entrypoint) else {
            context.push_error(SourceError::new(
                ErrorKind::Syntax,
                format!("File {entrypoint} not found"),
                SourceLocation::unknown(),
            ));
            return None;
        };

        let mut instructions = Vec::new();
        for (line, text) in source.lines().enumerate() {
            let code = text.split("//").next().unwrap_or_default();
            let indent = code.len() - code.trim_start().len();
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            if let Err((kind, message, column)) = compile_line(code, context, &mut instructions) {
                let width = code.len().saturating_sub(column);
                let loc = location(entrypoint, line, indent + column, width);
                context.push_error(SourceError::new(kind, message, loc));
            }
        }
        instructions.push(Instruction::new(Opcode::Retu));

        Some(CompiledProgram {
            entry: 0,
            functions: vec![Function {
                stack_size: STACK_SIZE,
                instructions,
                ..Function::default()
            }],
        })
    }
}
