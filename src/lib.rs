#![forbid(unsafe_code)]
//! ncc: a single-pass compiler for a restricted C-family language,
//! emitting 16-bit x86 (8086) assembly in NASM syntax for flat binaries
//! (MS-DOS `.COM` programs and boot sectors).
//!
//! The pipeline is strictly sequential: preprocess, lex, parse, generate.
//! Each phase fully consumes its input before the next begins, and all
//! per-compilation state lives in the phase structs threaded through
//! [`compile_processed`].

pub mod ast;
pub mod codegen;
pub mod diag;
pub mod lexer;
pub mod parser;
pub mod preprocessor;
pub mod types;

#[cfg(test)]
mod test;

use anyhow::{ensure, Result};

pub use codegen::{CodeGen, OptLevel, TargetOptions};
pub use diag::Diagnostics;
pub use lexer::Lexer;
pub use parser::Parser;
pub use preprocessor::Preprocessor;

/// Compile already-preprocessed source text into NASM assembly.
///
/// `unit_name` is the translation-unit filename used for global-label
/// mangling and diagnostics.
pub fn compile_processed(
    processed: &str,
    unit_name: &str,
    target: &TargetOptions,
    diags: &mut Diagnostics,
) -> Result<String> {
    let lexer = Lexer::new(processed, diags)?;
    let mut parser = Parser::new(lexer, diags);
    let program = parser.parse_program()?;
    let (symbols, structs) = parser.into_tables();

    let mut gen =
        CodeGen::new(&symbols, &structs, target.clone(), unit_name, diags);
    gen.generate(&program)?;
    gen.finalize()
}

/// Preprocess and compile an in-memory source buffer. Convenience wrapper
/// over the phase API; the driver runs the phases itself so it can dump
/// intermediate state.
pub fn compile_source(
    source: &str,
    unit_name: &str,
    target: &TargetOptions,
) -> Result<String> {
    let mut diags = Diagnostics::new(unit_name);
    diags.set_quiet(true);
    let mut preprocessor = Preprocessor::new();
    let processed = preprocessor.process_source(source, &mut diags)?;
    diags.set_source(processed.clone());
    let asm = compile_processed(&processed, unit_name, target, &mut diags)?;
    ensure!(
        diags.error_count() == 0,
        "compilation failed with {} error(s)",
        diags.error_count()
    );
    Ok(asm)
}
