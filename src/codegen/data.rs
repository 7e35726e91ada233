//! Deferred data emission: the string-literal table, zero-reserved and
//! initialized arrays, and scalar global variables.

use anyhow::Result;

use super::{ArrayReservation, CodeGen};
use crate::ast::{Declaration, Expr, Initializer, Literal};
use crate::types::StorageFlags;

/// Resolve the escapes of a raw string-literal body into the bytes stored in
/// the output binary. The terminating 0 is not included.
pub fn unescape_string(raw: &str) -> Vec<u8> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            i += 1;
            match bytes[i] {
                b'n' => out.push(10),
                b'r' => out.push(13),
                b't' => out.push(9),
                b'0' => out.push(0),
                b'\\' => out.push(b'\\'),
                b'"' => out.push(b'"'),
                b'\'' => out.push(b'\''),
                b'x' => {
                    if i + 2 < bytes.len()
                        && bytes[i + 1].is_ascii_hexdigit()
                        && bytes[i + 2].is_ascii_hexdigit()
                    {
                        let hex =
                            std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                        out.push(u8::from_str_radix(hex, 16).unwrap());
                        i += 2;
                    } else {
                        out.push(b'x');
                    }
                }
                other => out.push(other),
            }
            i += 1;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

impl CodeGen<'_> {
    /// Intern a string literal; returns its table index. With string merging
    /// on, byte-identical contents share one entry.
    pub(super) fn intern_string(&mut self, raw: &str) -> usize {
        let bytes = unescape_string(raw);
        if self.target.opt_level.merge_strings() {
            if let Some(index) =
                self.strings.iter().position(|existing| *existing == bytes)
            {
                return index;
            }
        }
        self.strings.push(bytes);
        self.strings.len() - 1
    }

    pub(super) fn flush_strings(&mut self) {
        let mut lines = Vec::new();
        for index in self.strings_emitted..self.strings.len() {
            let mut line = format!("string_{index}: db ");
            for byte in &self.strings[index] {
                line.push_str(&format!("{byte}, "));
            }
            line.push_str("0 ; null terminator");
            lines.push(line);
        }
        self.strings_emitted = self.strings.len();
        for line in lines {
            self.raw(line);
        }
    }

    /// Record an array for deferred emission and return the label its
    /// storage will carry.
    pub(super) fn register_array(
        &mut self,
        decl: &Declaration,
    ) -> Result<String> {
        let label = if decl.init.is_some() {
            self.global_label(&decl.name)
        } else {
            format!("_{}", decl.name)
        };
        self.array_labels
            .insert(decl.name.clone(), label.clone());
        if decl.init.is_some() {
            self.init_arrays.push(decl.clone());
        } else {
            self.zero_arrays.push(ArrayReservation {
                label: label.clone(),
                size: decl.ty.array_size,
                byte_element: decl.ty.is_byte(),
            });
        }
        Ok(label)
    }

    pub(super) fn flush_arrays(&mut self) -> Result<()> {
        let init_arrays = std::mem::take(&mut self.init_arrays);
        for decl in &init_arrays {
            self.emit_array_with_initializers(decl)?;
        }

        let zero_arrays = std::mem::take(&mut self.zero_arrays);
        for array in &zero_arrays {
            let directive = if array.byte_element { "db" } else { "dw" };
            let element = if array.byte_element { 1 } else { 2 };
            self.raw(format!(
                "{}: times {} {} 0 ; array of {} bytes",
                array.label,
                array.size,
                directive,
                array.size * element
            ));
        }
        Ok(())
    }

    fn emit_array_with_initializers(&mut self, decl: &Declaration) -> Result<()> {
        let directive = if decl.ty.is_byte() { "db" } else { "dw" };
        let label = self
            .array_labels
            .get(&decl.name)
            .cloned()
            .unwrap_or_else(|| self.global_label(&decl.name));

        self.raw(format!(
            "; array with initializers: {}[{}]",
            decl.name, decl.ty.array_size
        ));
        self.label(&label);

        let count = match &decl.init {
            // a quoted initializer lays the bytes down with a terminator
            Some(Initializer::Expr(Expr::Literal(Literal::Str(raw)))) => {
                let bytes = unescape_string(raw);
                let mut line = format!("    {directive} ");
                for byte in &bytes {
                    line.push_str(&format!("{byte}, "));
                }
                line.push('0');
                self.raw(line);
                bytes.len() as u32 + 1
            }
            Some(Initializer::List(items)) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(match item {
                        Expr::Literal(Literal::Int(v)) => v.to_string(),
                        Expr::Literal(Literal::Char(c)) => c.to_string(),
                        Expr::Literal(Literal::Bool(b)) => {
                            (*b as u8).to_string()
                        }
                        _ => {
                            self.diags.warning(
                                Some(decl.pos),
                                "non-literal array initializer not supported",
                            );
                            "0".to_string()
                        }
                    });
                }
                self.raw(format!("    {directive} {}", rendered.join(", ")));
                rendered.len() as u32
            }
            Some(Initializer::Expr(other)) => {
                let value = match other {
                    Expr::Literal(Literal::Int(v)) => v.to_string(),
                    Expr::Literal(Literal::Char(c)) => c.to_string(),
                    _ => {
                        self.diags.warning(
                            Some(decl.pos),
                            "non-literal array initializer not supported",
                        );
                        "0".to_string()
                    }
                };
                self.raw(format!("    {directive} {value}"));
                1
            }
            None => 0,
        };

        if count < decl.ty.array_size {
            self.raw(format!(
                "    times {} {directive} 0",
                decl.ty.array_size - count
            ));
        }
        self.blank();
        Ok(())
    }

    pub(super) fn flush_globals(&mut self) -> Result<()> {
        let globals = std::mem::take(&mut self.globals);
        for decl in &globals {
            if decl.ty.storage.contains(StorageFlags::STATIC) {
                self.raw(format!(
                    "; static global variable (file scope): {}",
                    decl.name
                ));
            } else {
                self.raw(format!(
                    "; global variable (program scope): {}",
                    decl.name
                ));
            }
            let label = self.global_label(&decl.name);
            self.label(label);
            self.emit_global_storage(decl);
            self.blank();
        }
        Ok(())
    }

    fn emit_global_storage(&mut self, decl: &Declaration) {
        let init = match &decl.init {
            Some(Initializer::Expr(expr)) => Some(expr),
            _ => None,
        };
        match init {
            Some(Expr::Literal(Literal::Int(v))) => {
                self.ins(format!("dw {v} ; integer value"));
            }
            Some(Expr::Literal(Literal::Char(c))) => {
                self.ins(format!("db {c} ; character value"));
            }
            Some(Expr::Literal(Literal::Bool(b))) => {
                self.ins(format!(
                    "db {} ; boolean value ({})",
                    *b as u8,
                    if *b { "true" } else { "false" }
                ));
            }
            Some(Expr::Literal(Literal::FarPtr { segment, offset })) => {
                // offset low word, segment high word
                self.ins(format!("dw {offset} ; offset"));
                self.ins(format!("dw {segment} ; segment"));
            }
            Some(Expr::Literal(Literal::Str(raw))) => {
                let raw = raw.clone();
                let index = self.intern_string(&raw);
                self.ins(format!("dw string_{index} ; string address"));
            }
            Some(_) => {
                self.diags.warning(
                    Some(decl.pos),
                    format!(
                        "non-constant initializer for global '{}' ignored",
                        decl.name
                    ),
                );
                self.ins("dw 0 ; default zero initialization");
            }
            None => {
                if decl.ty.is_byte() {
                    self.ins("db 0 ; zero initialization");
                } else if decl.ty.far_pointer
                    || decl.ty.base == crate::types::BaseKind::FarPointer
                {
                    self.ins("dw 0 ; offset (zero initialization)");
                    self.ins("dw 0 ; segment (zero initialization)");
                } else {
                    self.ins("dw 0 ; zero initialization");
                }
            }
        }
    }
}
