//! Compile-then-assemble step of a run, gated on compiler errors.

use bytes::Bytes;
use remote_exec_core::{ErrorKind, SourceError, SourceLocation};

use crate::{
    compiler::{Compiler, LanguageContext, SourceFiles},
    program::assemble,
};

/// Compile and assemble a program for the device.
///
/// Nothing is returned for sending if the compiler produced no program or
/// recorded any error.
///
/// # Errors
/// Returns the errors to report to the workspace.
pub async fn prepare(
    compiler: &dyn Compiler,
    context: &mut LanguageContext,
    files: &SourceFiles,
    entrypoint: &str,
) -> Result<Bytes, Vec<SourceError>> {
    context.errors.clear();

    let program = compiler.compile(files, entrypoint, context).await;
    let program = match program {
        Some(program) if !context.has_errors() => program,
        _ => {
            tracing::debug!(
                entrypoint,
                errors = context.errors.len(),
                "compilation rejected program"
            );
            return Err(context.errors.clone());
        }
    };

    assemble(&program).map_err(|e| {
        vec![SourceError::new(
            ErrorKind::Syntax,
            format!("Assembly failed: {e}"),
            SourceLocation::unknown(),
        )]
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        device_types,
        program::{CompiledProgram, Function, Instruction, MAGIC, Opcode},
    };

    /// Emits one program and optionally a warning-like error alongside it.
    struct Fixed {
        program: Option<CompiledProgram>,
        error: Option<&'static str>,
    }

    #[async_trait]
    impl Compiler for Fixed {
        async fn compile(
            &self,
            _files: &SourceFiles,
            _entrypoint: &str,
            context: &mut LanguageContext,
        ) -> Option<CompiledProgram> {
            if let Some(message) = self.error {
                context.push_error(SourceError::new(
                    ErrorKind::Type,
                    message,
                    SourceLocation::unknown(),
                ));
            }
            self.program.clone()
        }
    }

    fn program() -> CompiledProgram {
        CompiledProgram {
            entry: 0,
            functions: vec![Function {
                instructions: vec![Instruction::new(Opcode::Retu)],
                ..Function::default()
            }],
        }
    }

    fn context() -> LanguageContext {
        LanguageContext::for_device(device_types::lookup("ev3").unwrap())
    }

    #[test]
    fn test_success_produces_buffer() {
        let compiler = Fixed {
            program: Some(program()),
            error: None,
        };
        let bytes =
            tokio_test::block_on(prepare(&compiler, &mut context(), &SourceFiles::new(), "/main.js"))
                .unwrap();
        assert!(bytes.starts_with(MAGIC));
    }

    #[test]
    fn test_any_error_blocks_program() {
        let compiler = Fixed {
            program: Some(program()),
            error: Some("bad"),
        };
        let errors =
            tokio_test::block_on(prepare(&compiler, &mut context(), &SourceFiles::new(), "/main.js"))
                .unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_errors_cleared_between_attempts() {
        let mut ctx = context();
        ctx.push_error(SourceError::runtime("left over"));
        let compiler = Fixed {
            program: Some(program()),
            error: None,
        };
        let result =
            tokio_test::block_on(prepare(&compiler, &mut ctx, &SourceFiles::new(), "/main.js"));
        assert!(result.is_ok());
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn test_assembly_failure_is_reported() {
        let compiler = Fixed {
            program: Some(CompiledProgram::default()),
            error: None,
        };
        let errors =
            tokio_test::block_on(prepare(&compiler, &mut context(), &SourceFiles::new(), "/main.js"))
                .unwrap_err();
        assert!(errors[0].message.starts_with("Assembly failed"));
    }
}
