//! End-to-end helpers: source text to tokens, AST, bytecode, and output.

use crate::bytecode::compile::Compiler;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::image::{self, ImageError};
use crate::bytecode::ir::ProgramBc;
use crate::bytecode::verify::{self, VerifyError};
use crate::config::VmConfig;
use crate::frontend::lexer::{LexError, Lexer, Spanned};
use crate::frontend::parse_error::ParseError;
use crate::frontend::parser::Parser;
use crate::lang::program::Program;
use crate::runtime::externals::Externals;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm_bc::{Vm, VmStats};
use std::io::Write;
use std::path::Path;

/// Any failure along the pipeline, tagged with the stage that produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// Stage name used in diagnostics: `<kind> error: <message>`.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Lex(_) => "lex",
            Error::Parse(_) => "parse",
            Error::Compile(_) => "compile",
            Error::Verify(_) => "verify",
            Error::Image(_) => "image",
            Error::Runtime(_) => "runtime",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn tokenize(source: &str) -> Result<Vec<Spanned>> {
    Ok(Lexer::new(source).tokenize()?)
}

pub fn parse(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    Ok(Parser::new(tokens).parse()?)
}

/// Parses and compiles `source` against the given externals.
pub fn compile(source: &str, externals: &Externals) -> Result<ProgramBc> {
    let program = parse(source)?;
    let signatures = externals.signatures();
    Ok(Compiler::new(&signatures).compile(&program)?)
}

/// Loads a bytecode image and checks it before it reaches the VM.
pub fn load_image(path: &Path, externals: &Externals) -> Result<ProgramBc> {
    let bc = image::load(path)?;
    verify::verify(&bc, &externals.signatures())?;
    Ok(bc)
}

pub fn run<'a>(
    bc: &'a ProgramBc,
    externals: &'a Externals,
    config: VmConfig,
    out: impl Write + 'a,
) -> Result<VmStats> {
    let mut vm = Vm::new(bc, externals).with_config(config).with_output(out);
    Ok(vm.run()?)
}

/// Compiles and runs `source` with the default limits.
pub fn run_source(source: &str, externals: &Externals, out: impl Write) -> Result<VmStats> {
    let bc = compile(source, externals)?;
    run(&bc, externals, VmConfig::default(), out)
}
