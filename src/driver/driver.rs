//! Command-line driver: argument handling, file I/O, and invoking the
//! external assembler on the generated text.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::Parser;

use ncc::ast::print_program;
use ncc::codegen::{CodeGen, OptLevel, TargetOptions};
use ncc::diag::Diagnostics;
use ncc::lexer::Lexer;
use ncc::preprocessor::Preprocessor;

/// Compile a C-subset source file into a flat 16-bit x86 binary
#[derive(Clone, Debug, Parser)]
#[command(name = "ncc", version)]
struct Args {
    /// source file to compile
    input: PathBuf,
    /// output path
    #[arg(short, long, default_value = "output.asm")]
    output: PathBuf,
    /// debug mode: print the parsed AST
    #[arg(short = 'd')]
    dump_ast: bool,
    /// show preprocessor line mappings
    #[arg(long = "dl")]
    dump_lines: bool,
    /// add a directory to the include search path
    #[arg(short = 'I', value_name = "PATH")]
    include: Vec<PathBuf>,
    /// origin displacement address (hex or decimal)
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    disp: Option<u32>,
    /// optimization level (0 = none, 1 = string merging)
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 0)]
    opt: u8,
    /// target an MS-DOS .COM executable (org 0x100)
    #[arg(long)]
    com: bool,
    /// target a boot sector (org 0x7C00)
    #[arg(long)]
    sys: bool,
    /// initial stack segment and pointer for bootloaders, in hex
    #[arg(long, value_name = "SS:SP")]
    ss: Option<String>,
    /// stop after generating assembly (do not assemble)
    #[arg(short = 'S')]
    stop_after_asm: bool,
}

fn parse_address(text: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) =
        text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| format!("invalid address '{text}'"))
}

fn parse_stack(text: &str) -> Result<(u16, u16)> {
    let Some((segment, pointer)) = text.split_once(':') else {
        bail!("-ss requires SS:SP format in hexadecimal");
    };
    let segment = u16::from_str_radix(segment.trim_start_matches("0x"), 16)
        .context("invalid stack segment")?;
    let pointer = u16::from_str_radix(pointer.trim_start_matches("0x"), 16)
        .context("invalid stack pointer")?;
    Ok((segment, pointer))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut origin = 0;
    let mut system_mode = false;
    if args.com {
        origin = 0x100;
    }
    if args.sys {
        origin = 0x7C00;
        system_mode = true;
    }
    if let Some(disp) = args.disp {
        origin = disp;
    }
    let stack = args.ss.as_deref().map(parse_stack).transpose()?;

    let unit_name = args.input.display().to_string();
    let mut diags = Diagnostics::new(&unit_name);
    diags.set_quiet(!args.dump_ast);

    let mut preprocessor = Preprocessor::new();
    preprocessor.add_include_path(".");
    for path in &args.include {
        preprocessor.add_include_path(path.clone());
    }
    let processed = preprocessor.process_file(&args.input, &mut diags)?;
    if args.dump_lines {
        preprocessor.dump_line_mappings();
    }
    diags.set_source(processed.clone());

    let lexer = Lexer::new(&processed, &mut diags)?;
    let mut parser = ncc::Parser::new(lexer, &mut diags);
    let program = parser.parse_program()?;
    let (symbols, structs) = parser.into_tables();

    if args.dump_ast {
        print_program(&program);
    }

    let target = TargetOptions {
        origin,
        system_mode,
        stack,
        opt_level: if args.opt >= 1 {
            OptLevel::Basic
        } else {
            OptLevel::None
        },
    };
    let mut gen =
        CodeGen::new(&symbols, &structs, target, &unit_name, &mut diags);
    gen.generate(&program)?;
    let asm = gen.finalize()?;

    if diags.error_count() > 0 {
        bail!("compilation failed with {} error(s)", diags.error_count());
    }

    // assemble through a scratch file unless -S keeps the text output
    let asm_path = if args.stop_after_asm {
        args.output.clone()
    } else {
        PathBuf::from("temp.asm")
    };
    fs::write(&asm_path, &asm)
        .with_context(|| format!("cannot write '{}'", asm_path.display()))?;

    if !args.stop_after_asm {
        let status = Command::new("nasm")
            .args(["-f", "bin"])
            .arg(&asm_path)
            .arg("-o")
            .arg(&args.output)
            .status()
            .context("failed to run nasm")?;
        if !status.success() {
            bail!("nasm failed");
        }
        let _ = fs::remove_file(&asm_path);
    }

    if args.dump_ast {
        println!(
            "compilation successful, output written to {}",
            args.output.display()
        );
    }
    Ok(())
}
