use std::collections::HashMap;
use std::fmt::Display;

use anyhow::Result;

use crate::ast::{
    Block, Declaration, FnFlags, Function, Initializer, Item, Program, Stmt,
};
use crate::diag::Diagnostics;
use crate::types::{BaseKind, StructRegistry, SymbolTable};

mod data;
mod expr;
mod flow;

pub use data::unescape_string;

/// Placement markers: a function with one of these names pins the matching
/// deferred-emission table at its position in the output.
pub const STRING_MARKER: &str = "_NCC_STRING_LOC";
pub const ARRAY_MARKER: &str = "_NCC_ARRAY_LOC";
pub const GLOBAL_MARKER: &str = "_NCC_GLOBAL_LOC";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptLevel {
    #[default]
    None,
    /// `-O1`: merge byte-identical string literals.
    Basic,
}

impl OptLevel {
    pub fn merge_strings(&self) -> bool {
        matches!(self, OptLevel::Basic)
    }
}

/// Target configuration for one compilation.
#[derive(Clone, Debug, Default)]
pub struct TargetOptions {
    pub origin: u32,
    /// Bootloader mode: emit stack setup and jump to `_after_diskload`.
    pub system_mode: bool,
    /// Initial `SS:SP`, only honored in system mode.
    pub stack: Option<(u16, u16)>,
    pub opt_level: OptLevel,
}

/// Tracked stack slots of the function being emitted. Parameters carry
/// negated offsets encoding positive BP displacements; locals positive
/// offsets encoding `bp - offset`.
#[derive(Default)]
struct Frame {
    vars: Vec<(String, i32)>,
    stack_size: u32,
}

impl Frame {
    fn clear(&mut self) {
        self.vars.clear();
        self.stack_size = 0;
    }

    /// Reserve word-aligned space and return the new slot's offset.
    fn add_local(&mut self, name: &str, bytes: u32) -> u32 {
        let allocation = bytes.div_ceil(2).max(1) * 2;
        self.stack_size += allocation;
        self.vars.push((name.to_string(), self.stack_size as i32));
        self.stack_size
    }

    fn add_param(&mut self, name: &str, bp_offset: u32) {
        self.vars.push((name.to_string(), -(bp_offset as i32)));
    }

    /// Offset for a name; 0 means the name lives in no frame slot (a
    /// global).
    fn offset(&self, name: &str) -> i32 {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, off)| *off)
            .unwrap_or(0)
    }

    fn is_param(&self, name: &str) -> bool {
        self.offset(name) < 0
    }
}

/// Zero-reserved array pending emission.
struct ArrayReservation {
    label: String,
    size: u32,
    byte_element: bool,
}

struct LoopLabels {
    #[allow(dead_code)]
    continue_label: String,
    #[allow(dead_code)]
    break_label: String,
}

/// Walks the AST once and emits NASM text into an in-memory buffer.
pub struct CodeGen<'a> {
    diags: &'a mut Diagnostics,
    symbols: &'a SymbolTable,
    structs: &'a StructRegistry,
    target: TargetOptions,
    /// Sanitized translation-unit stem, prefixed onto global labels.
    unit_prefix: String,

    out: String,
    label_counter: u32,

    frame: Frame,
    current_fn: Option<String>,
    current_naked: bool,
    /// `(continue, break)` targets of enclosing loops.
    loop_stack: Vec<LoopLabels>,

    strings: Vec<Vec<u8>>,
    /// How many string-table entries have been written out already.
    strings_emitted: usize,
    string_marker_found: bool,
    zero_arrays: Vec<ArrayReservation>,
    init_arrays: Vec<Declaration>,
    array_marker_found: bool,
    globals: Vec<Declaration>,
    global_marker_found: bool,
    /// Emitted label for each array name.
    array_labels: HashMap<String, String>,
}

impl<'a> CodeGen<'a> {
    pub fn new(
        symbols: &'a SymbolTable,
        structs: &'a StructRegistry,
        target: TargetOptions,
        unit_name: &str,
        diags: &'a mut Diagnostics,
    ) -> Self {
        CodeGen {
            diags,
            symbols,
            structs,
            target,
            unit_prefix: sanitize_unit_name(unit_name),
            out: String::new(),
            label_counter: 0,
            frame: Frame::default(),
            current_fn: None,
            current_naked: false,
            loop_stack: Vec::new(),
            strings: Vec::new(),
            strings_emitted: 0,
            string_marker_found: false,
            zero_arrays: Vec::new(),
            init_arrays: Vec::new(),
            array_marker_found: false,
            globals: Vec::new(),
            global_marker_found: false,
            array_labels: HashMap::new(),
        }
    }

    // output plumbing

    fn raw(&mut self, text: impl Display) {
        self.out.push_str(&format!("{text}\n"));
    }

    fn ins(&mut self, text: impl Display) {
        self.out.push_str(&format!("    {text}\n"));
    }

    fn label(&mut self, name: impl Display) {
        self.out.push_str(&format!("{name}:\n"));
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn next_label_id(&mut self) -> u32 {
        let id = self.label_counter;
        self.label_counter += 1;
        id
    }

    /// Unique label within this compilation.
    fn make_label(&mut self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_label_id())
    }

    fn global_label(&self, name: &str) -> String {
        format!("_{}_{name}", self.unit_prefix)
    }

    // generation

    pub fn generate(&mut self, program: &Program) -> Result<()> {
        self.raw("bits 16");
        self.raw(format!("org 0x{:X}", self.target.origin));
        self.blank();
        self.raw("; 8086 assembly generated by ncc");
        self.blank();

        if self.target.system_mode {
            self.raw("; bootloader startup");
            if let Some((segment, pointer)) = self.target.stack {
                self.ins(format!("mov ax, 0x{segment:04X} ; stack segment"));
                self.ins("mov ss, ax");
                self.ins(format!("mov sp, 0x{pointer:04X} ; stack pointer"));
            }
            self.ins("jmp _after_diskload");
            self.blank();
        }

        for item in &program.items {
            match item {
                Item::Function(function) => self.gen_function(function)?,
                Item::Global(decl) => self.gen_global_declaration(decl)?,
                Item::StructDef(_) => {} // layout only, nothing to emit
            }
        }
        Ok(())
    }

    /// Flush whatever was not pinned by a marker and return the finished
    /// assembly text. Every referenced string label is emitted before the
    /// binary closes, even when it was interned after the marker fired.
    pub fn finalize(mut self) -> Result<String> {
        if !self.globals.is_empty() {
            if !self.global_marker_found {
                self.raw("; global variables (no _NCC_GLOBAL_LOC marker found)");
            }
            self.flush_globals()?;
        }
        let strings_pending = self.strings.len() > self.strings_emitted;
        let arrays_pending =
            !self.zero_arrays.is_empty() || !self.init_arrays.is_empty();
        if strings_pending || arrays_pending {
            self.blank();
            self.raw("; data section for strings and arrays");
            if strings_pending {
                self.flush_strings();
            }
            if arrays_pending {
                self.flush_arrays()?;
            }
        }
        Ok(self.out)
    }

    fn gen_function(&mut self, function: &Function) -> Result<()> {
        match function.name.as_str() {
            STRING_MARKER => {
                if !self.string_marker_found && !self.strings.is_empty() {
                    self.string_marker_found = true;
                    self.raw("; string literals placed at _NCC_STRING_LOC");
                    self.flush_strings();
                }
                self.raw("; string literal location marker");
                self.label(format!("_{}", function.name));
                return Ok(());
            }
            ARRAY_MARKER => {
                if !self.array_marker_found
                    && (!self.zero_arrays.is_empty()
                        || !self.init_arrays.is_empty())
                {
                    self.array_marker_found = true;
                    self.raw("; array declarations placed at _NCC_ARRAY_LOC");
                    self.flush_arrays()?;
                }
                self.raw("; array location marker");
                self.label(format!("_{}", function.name));
                return Ok(());
            }
            GLOBAL_MARKER => {
                if !self.global_marker_found && !self.globals.is_empty() {
                    self.global_marker_found = true;
                    self.raw("; global variables placed at _NCC_GLOBAL_LOC");
                    self.flush_globals()?;
                }
                self.raw("; global variable location marker");
                self.label(format!("_{}", function.name));
                return Ok(());
            }
            _ => {}
        }

        self.frame.clear();
        self.current_fn = Some(function.name.clone());
        self.current_naked = function.flags.contains(FnFlags::NAKED);

        self.raw(format!("; function: {}", function.name));
        self.label(format!("_{}", function.name));

        if self.current_naked {
            self.ins("; naked function - no prologue generated");
        } else if function.flags.contains(FnFlags::STACKFRAME) {
            self.ins("; set up stackframe with register preservation");
            self.ins("push bp");
            self.ins("mov bp, sp");
            self.ins("push bx");
            self.ins("push cx");
            self.ins("push dx");
            self.ins("push si");
            self.ins("push di");
        } else {
            self.ins("push bp");
            self.ins("mov bp, sp");
            self.blank();
        }

        // parameters sit above the saved bp and return address
        let mut bp_offset = 4;
        for param in &function.params {
            self.frame.add_param(&param.name, bp_offset);
            bp_offset += 2;
        }

        self.gen_block(&function.body)?;

        self.blank();
        self.label(format!("_{}_exit", function.name));
        if self.current_naked {
            self.ins("; naked function - no epilogue generated");
        } else if function.flags.contains(FnFlags::STACKFRAME) {
            self.ins("; restore stackframe registers");
            if self.frame.stack_size > 0 {
                self.ins(format!(
                    "add sp, {} ; remove space for local variables",
                    self.frame.stack_size
                ));
            }
            self.ins("pop di");
            self.ins("pop si");
            self.ins("pop dx");
            self.ins("pop cx");
            self.ins("pop bx");
            self.ins("pop bp");
            self.ins("ret");
        } else {
            self.ins("mov sp, bp");
            self.ins("pop bp");
            self.ins("ret");
        }
        self.blank();

        self.current_fn = None;
        self.current_naked = false;
        Ok(())
    }

    fn gen_block(&mut self, block: &Block) -> Result<()> {
        for stmt in &block.stmts {
            self.gen_statement(stmt)?;
        }
        Ok(())
    }

    fn gen_statement(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(block) => self.gen_block(block),
            Stmt::Decl(decl) => self.gen_local_declaration(decl),
            Stmt::Expr(expr) => self.gen_expression(expr),
            Stmt::Return(expr) => self.gen_return(expr.as_ref()),
            Stmt::If { .. }
            | Stmt::While { .. }
            | Stmt::DoWhile { .. }
            | Stmt::For { .. } => self.gen_control_flow(stmt),
            Stmt::AsmBlock(code) => {
                self.ins("; inline assembly block");
                self.raw(code);
                Ok(())
            }
            Stmt::Asm { template, .. } => {
                // extended operand lists parse but the template is emitted
                // verbatim; %n substitution is not wired up
                self.ins("; inline assembly statement");
                self.ins(template);
                Ok(())
            }
        }
    }

    fn gen_return(&mut self, expr: Option<&crate::ast::Expr>) -> Result<()> {
        self.ins("; return statement");
        if let Some(expr) = expr {
            self.gen_expression(expr)?;
        }
        if self.current_naked {
            self.ins("; naked function - no automatic jump to epilogue");
        } else if let Some(name) = self.current_fn.clone() {
            self.ins(format!("jmp _{name}_exit"));
        }
        Ok(())
    }

    fn gen_local_declaration(&mut self, decl: &Declaration) -> Result<()> {
        if decl.ty.array && decl.ty.array_size > 0 {
            // array storage is emitted with the array table; the local slot
            // holds a pointer to it
            let label = self.register_array(decl)?;
            self.ins(format!(
                "; array variable declaration: {}[{}]",
                decl.name, decl.ty.array_size
            ));
            self.ins(format!("mov ax, {label} ; address of array"));
            self.ins("push ax ; store pointer to array");
            self.frame.add_local(&decl.name, 2);
            return Ok(());
        }

        if decl.ty.base == BaseKind::Struct && decl.ty.pointer == 0 {
            return self.gen_local_struct(decl);
        }

        self.ins(format!("; local variable declaration: {}", decl.name));
        match &decl.init {
            Some(Initializer::Expr(expr)) => {
                self.gen_expression(expr)?;
                self.ins("push ax ; initialize local variable");
            }
            Some(Initializer::List(_)) => {
                self.diags.warning(
                    Some(decl.pos),
                    format!(
                        "brace initializer on scalar variable '{}' ignored",
                        decl.name
                    ),
                );
                self.ins("push 0 ; uninitialized local variable");
            }
            None => {
                self.ins("push 0 ; uninitialized local variable");
            }
        }
        self.frame.add_local(&decl.name, 2);
        Ok(())
    }

    /// A struct value on the stack: reserve its full (word-aligned) size,
    /// then run the member initializers if a brace list was given.
    fn gen_local_struct(&mut self, decl: &Declaration) -> Result<()> {
        let size = decl.ty.size(self.structs);
        let reserved = size.div_ceil(2) * 2;
        self.ins(format!(
            "; struct variable declaration: {} ({} bytes)",
            decl.name, size
        ));
        self.ins(format!("sub sp, {reserved} ; reserve struct storage"));
        let base = self.frame.add_local(&decl.name, reserved);

        if let Some(Initializer::List(items)) = &decl.init {
            let info = decl
                .ty
                .struct_name
                .as_deref()
                .and_then(|name| self.structs.lookup(name))
                .cloned();
            if let Some(info) = info {
                for (item, member) in items.iter().zip(info.members.iter()) {
                    self.gen_expression(item)?;
                    let slot = base as i32 - member.offset as i32;
                    if member.ty.is_byte() {
                        self.ins(format!(
                            "mov [bp-{slot}], al ; init member {}",
                            member.name
                        ));
                    } else {
                        self.ins(format!(
                            "mov [bp-{slot}], ax ; init member {}",
                            member.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn gen_global_declaration(&mut self, decl: &Declaration) -> Result<()> {
        if decl.ty.array && decl.ty.array_size > 0 {
            self.register_array(decl)?;
            return Ok(());
        }
        // scalar globals are deferred to the marker or file close
        self.globals.push(decl.clone());
        Ok(())
    }
}

/// Translation-unit stem: extension removed, anything non-alphanumeric
/// replaced by underscore.
fn sanitize_unit_name(name: &str) -> String {
    let stem = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    };
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_sanitization() {
        assert_eq!(sanitize_unit_name("main.c"), "main");
        assert_eq!(sanitize_unit_name("src/boot-loader.c"), "src_boot_loader");
        assert_eq!(sanitize_unit_name("kernel"), "kernel");
    }

    #[test]
    fn frame_offsets() {
        let mut frame = Frame::default();
        assert_eq!(frame.add_local("a", 2), 2);
        assert_eq!(frame.add_local("b", 2), 4);
        frame.add_param("p", 4);
        assert_eq!(frame.offset("a"), 2);
        assert_eq!(frame.offset("b"), 4);
        assert_eq!(frame.offset("p"), -4);
        assert!(frame.is_param("p"));
        assert!(!frame.is_param("a"));
        assert_eq!(frame.offset("missing"), 0);
    }

    #[test]
    fn frame_struct_allocation_rounds_to_words() {
        let mut frame = Frame::default();
        assert_eq!(frame.add_local("p", 3), 4);
        assert_eq!(frame.stack_size, 4);
    }
}
