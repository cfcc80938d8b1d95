//! Mica Compiler Library
//!
//! Compiles Mica source — a small statically typed imperative language —
//! into binary bytecode for a register-less stack machine. The pipeline is
//! lexer → parser → code generator → encoder; each stage is a pure function
//! over its input with accumulated diagnostics, and a compilation session
//! shares no state with any other.
//!
//! ```rust,ignore
//! use micac::{CompilerConfig, compile_source};
//!
//! let program = compile_source("fn main() -> int return 2 + 3 end", &CompilerConfig::default())?;
//! assert_eq!(program.functions.len(), 1);
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod lexer;
pub mod parser;

pub use codegen::{CodeGen, CodegenError, CompiledProgram};
pub use config::CompilerConfig;
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser};

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use mica_bytecode::{EncodeError, encode_to_vec};

/// Everything a compilation can fail with.
///
/// Lexer and parser diagnostics are accumulated and reported together;
/// codegen stops at its first error.
#[derive(Debug)]
pub enum CompileError {
    Diagnostics {
        lex: Vec<LexError>,
        parse: Vec<ParseError>,
    },
    Codegen(CodegenError),
    Encode(EncodeError),
    Io(io::Error),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Diagnostics { lex, parse } => {
                let mut first = true;
                for e in lex {
                    if !first {
                        writeln!(f)?;
                    }
                    write!(f, "{}", e)?;
                    first = false;
                }
                for e in parse {
                    if !first {
                        writeln!(f)?;
                    }
                    write!(f, "{}", e)?;
                    first = false;
                }
                Ok(())
            }
            CompileError::Codegen(e) => write!(f, "{}", e),
            CompileError::Encode(e) => write!(f, "{}", e),
            CompileError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CodegenError> for CompileError {
    fn from(e: CodegenError) -> Self {
        CompileError::Codegen(e)
    }
}

impl From<EncodeError> for CompileError {
    fn from(e: EncodeError) -> Self {
        CompileError::Encode(e)
    }
}

impl From<io::Error> for CompileError {
    fn from(e: io::Error) -> Self {
        CompileError::Io(e)
    }
}

/// Compile source text to a sealed program.
///
/// The parser keeps going after an error, so `Diagnostics` can carry several
/// entries from one run; codegen only ever contributes one.
pub fn compile_source(
    source: &str,
    config: &CompilerConfig,
) -> Result<CompiledProgram, CompileError> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    let parse_result = Parser::new(tokens).parse();

    let program = match parse_result {
        Ok(program) if lex_errors.is_empty() => program,
        Ok(_) => {
            return Err(CompileError::Diagnostics {
                lex: lex_errors,
                parse: Vec::new(),
            });
        }
        Err(parse_errors) => {
            return Err(CompileError::Diagnostics {
                lex: lex_errors,
                parse: parse_errors,
            });
        }
    };

    CodeGen::new(config)
        .generate(&program)
        .map_err(CompileError::from)
}

/// Compile a source file and write the bytecode artifact.
///
/// The artifact is encoded in memory first, so nothing touches `output_path`
/// until compilation has fully succeeded; a failed write removes whatever
/// partial file the filesystem left behind.
pub fn compile_file(
    input_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<CompiledProgram, CompileError> {
    let source = fs::read_to_string(input_path)?;
    let program = compile_source(&source, config)?;

    let bytes = encode_to_vec(&program.constants, &program.functions)?;
    if let Err(e) = fs::write(output_path, &bytes) {
        let _ = fs::remove_file(output_path);
        return Err(CompileError::Io(e));
    }

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_bytecode::{OpCode, Value, decode_from_slice};

    #[test]
    fn test_compile_source_end_to_end() {
        let program = compile_source(
            "extern print(string) -> none fn main() -> none return end",
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(program.constants.is_empty());
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.extern_functions.len(), 1);
    }

    #[test]
    fn test_parse_diagnostics_accumulate() {
        let err = compile_source(
            "fn () -> int return 1 end fn g( -> int return 2 end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        let CompileError::Diagnostics { lex, parse } = err else {
            panic!("expected diagnostics");
        };
        assert!(lex.is_empty());
        assert!(parse.len() >= 2);
    }

    #[test]
    fn test_lex_errors_skip_codegen() {
        let err = compile_source(
            "fn main() -> none return end @",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        let CompileError::Diagnostics { lex, .. } = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(lex.len(), 1);
    }

    #[test]
    fn test_codegen_error_is_fatal() {
        let err = compile_source(
            "fn f() -> none var a: int = 1 var a: int = 2 return end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::Codegen(CodegenError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_compile_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("add.mica");
        let output = dir.path().join("add.mbc");
        fs::write(&input, "fn add(a: int, b: int) -> int return a + b end").unwrap();

        let program = compile_file(&input, &output, &CompilerConfig::default()).unwrap();

        let bytes = fs::read(&output).unwrap();
        let (constants, functions) = decode_from_slice(&bytes).unwrap();
        assert_eq!(constants, program.constants);
        assert_eq!(functions, program.functions);
    }

    #[test]
    fn test_failed_compile_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.mica");
        let output = dir.path().join("bad.mbc");
        fs::write(&input, "fn f() -> int return y end").unwrap();

        assert!(compile_file(&input, &output, &CompilerConfig::default()).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_file(
            &dir.path().join("absent.mica"),
            &dir.path().join("out.mbc"),
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }

    #[test]
    fn test_folded_program_artifact() {
        let program = compile_source(
            "fn main() -> int return 2 + 3 * 4 end",
            &CompilerConfig::default(),
        )
        .unwrap();
        assert_eq!(program.constants, vec![Value::Int(14)]);
        let main = &program.functions[0];
        assert_eq!(main.code.len(), 2);
        assert_eq!(main.code[0].opcode, OpCode::LoadConst);
        assert_eq!(main.code[1].opcode, OpCode::Ret);
    }

    #[test]
    fn test_diagnostics_display_one_per_line() {
        let err = compile_source(
            "fn () -> int return 1 end fn g( -> int return 2 end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.lines().count() >= 2);
        assert!(text.contains("parse error"));
    }
}
