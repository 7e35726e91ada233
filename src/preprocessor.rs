use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;

use crate::diag::Diagnostics;

mod expr;

/// An object-like macro. `#undef` clears the flag instead of removing the
/// entry, so redefinition is idempotent and conditionals stay decidable.
#[derive(Clone, Debug)]
pub struct Macro {
    pub value: String,
    pub defined: bool,
}

/// One contiguous run of output lines that came from a single file, in
/// emission order. Dumped by `-dl`.
#[derive(Clone, Debug)]
pub struct LineSegment {
    pub file: String,
    pub lines: usize,
}

/// Textual macro preprocessor. Object-like macros only, expanded on
/// identifier boundaries and never rescanned.
pub struct Preprocessor {
    macros: IndexMap<String, Macro>,
    include_paths: Vec<PathBuf>,
    /// Lowercased paths recorded by `#pragma once`.
    included_once: HashSet<String>,
    segments: Vec<LineSegment>,
}

impl Preprocessor {
    pub fn new() -> Self {
        let mut pp = Preprocessor {
            macros: IndexMap::new(),
            include_paths: Vec::new(),
            included_once: HashSet::new(),
            segments: Vec::new(),
        };
        pp.define("__NCC__", "65536");
        pp.define("__NCC_MAJOR__", "1");
        pp.define("__NCC_MINOR__", "0");
        pp.define("__x86_16__", "1");
        pp
    }

    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.include_paths.push(path.into());
    }

    pub fn define(&mut self, name: &str, value: &str) {
        self.macros.insert(
            name.to_string(),
            Macro {
                value: value.to_string(),
                defined: true,
            },
        );
    }

    pub fn undef(&mut self, name: &str) {
        if let Some(entry) = self.macros.get_mut(name) {
            entry.defined = false;
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.get(name).map(|m| m.defined).unwrap_or(false)
    }

    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.macros
            .get(name)
            .filter(|m| m.defined)
            .map(|m| m.value.as_str())
    }

    pub fn line_segments(&self) -> &[LineSegment] {
        &self.segments
    }

    pub fn dump_line_mappings(&self) {
        let mut start = 1;
        for segment in &self.segments {
            println!(
                "lines {}..{} <- {}",
                start,
                start + segment.lines,
                segment.file
            );
            start += segment.lines;
        }
    }

    /// Preprocess a file, splicing its includes. The translation-unit entry
    /// point.
    pub fn process_file(
        &mut self,
        path: &Path,
        diags: &mut Diagnostics,
    ) -> Result<String> {
        if self.marked_once(path) {
            return Ok(String::new());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read file '{}'", path.display()))?;
        let display = path.display().to_string();
        self.define("__FILE__", &format!("\"{display}\""));
        self.process_source_in(&content, Some(path), diags)
    }

    /// Preprocess an in-memory buffer with no owning file.
    pub fn process_source(
        &mut self,
        source: &str,
        diags: &mut Diagnostics,
    ) -> Result<String> {
        self.process_source_in(source, None, diags)
    }

    fn marked_once(&self, path: &Path) -> bool {
        self.included_once.contains(&canonical_key(path))
    }

    fn resolve_include(
        &self,
        name: &str,
        system_header: bool,
    ) -> Option<PathBuf> {
        if !system_header {
            let direct = PathBuf::from(name);
            if direct.is_file() {
                return Some(direct);
            }
        }
        for dir in &self.include_paths {
            let full = dir.join(name);
            if full.is_file() {
                return Some(full);
            }
        }
        None
    }

    fn process_source_in(
        &mut self,
        source: &str,
        current_file: Option<&Path>,
        diags: &mut Diagnostics,
    ) -> Result<String> {
        let bytes = source.as_bytes();
        let mut out: Vec<u8> = Vec::with_capacity(source.len());
        let mut line_start = true;
        let mut line_no = 1usize;
        let mut if_level = 0usize;
        let mut skip_level = 0usize;
        // line numbers of still-open conditionals, innermost last
        let mut open_conds: Vec<usize> = Vec::new();
        let mut segment_mark = 0usize;

        let file_name = current_file
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<source>".to_string());

        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];

            if line_start && c == b'#' {
                let end = bytes[i..]
                    .iter()
                    .position(|b| *b == b'\n')
                    .map(|n| i + n)
                    .unwrap_or(bytes.len());
                let line = &source[i..end];
                self.process_directive(
                    line,
                    line_no,
                    &file_name,
                    current_file,
                    &mut if_level,
                    &mut skip_level,
                    &mut open_conds,
                    &mut out,
                    &mut segment_mark,
                    diags,
                )?;
                i = end;
                line_start = true;
                continue;
            }

            if c == b'\n' || c == b'\r' {
                line_start = true;
                if c == b'\n' {
                    line_no += 1;
                }
                i += 1;
                if skip_level > 0 {
                    continue;
                }
                out.push(c);
                continue;
            }

            if !c.is_ascii_whitespace() {
                line_start = false;
            }

            if skip_level > 0 {
                i += 1;
                continue;
            }

            // substitute object-like macros on identifier boundaries
            if c.is_ascii_alphabetic() || c == b'_' {
                let boundary_before = i == 0 || !is_ident_char(bytes[i - 1]);
                if boundary_before {
                    let mut j = i + 1;
                    while j < bytes.len() && is_ident_char(bytes[j]) {
                        j += 1;
                    }
                    let boundary_after =
                        j >= bytes.len() || !is_ident_char(bytes[j]);
                    let ident = &source[i..j];
                    if boundary_after {
                        if let Some(value) = self.value_of(ident) {
                            out.extend_from_slice(value.as_bytes());
                            i = j;
                            continue;
                        }
                    }
                }
            }

            out.push(c);
            i += 1;
        }

        if if_level > 0 {
            let line = open_conds.last().copied().unwrap_or(0);
            return Err(diags.fatal(format!(
                "{file_name}:{line}: unterminated conditional directive"
            )));
        }

        self.close_segment(&file_name, &out, segment_mark);
        String::from_utf8(out).context("preprocessed output is not valid UTF-8")
    }

    fn close_segment(&mut self, file: &str, out: &[u8], mark: usize) {
        let lines = out[mark..].iter().filter(|b| **b == b'\n').count();
        if lines > 0 {
            self.segments.push(LineSegment {
                file: file.to_string(),
                lines,
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_directive(
        &mut self,
        line: &str,
        line_no: usize,
        file_name: &str,
        current_file: Option<&Path>,
        if_level: &mut usize,
        skip_level: &mut usize,
        open_conds: &mut Vec<usize>,
        out: &mut Vec<u8>,
        segment_mark: &mut usize,
        diags: &mut Diagnostics,
    ) -> Result<()> {
        let body = line[1..].trim_start();

        if let Some(rest) = directive(body, "define") {
            if *skip_level > 0 {
                return Ok(());
            }
            let (name, rest) = take_ident(rest);
            if !name.is_empty() {
                self.define(name, rest.trim());
            }
        } else if let Some(rest) = directive(body, "undef") {
            if *skip_level > 0 {
                return Ok(());
            }
            let (name, _) = take_ident(rest);
            self.undef(name);
        } else if let Some(rest) = directive(body, "ifdef") {
            *if_level += 1;
            open_conds.push(line_no);
            // conditions inside a skipped region are not evaluated; the
            // frame only tracks nesting
            if *skip_level > 0 {
                return Ok(());
            }
            let (name, _) = take_ident(rest);
            if !self.is_defined(name) {
                *skip_level = *if_level;
            }
        } else if let Some(rest) = directive(body, "ifndef") {
            *if_level += 1;
            open_conds.push(line_no);
            if *skip_level > 0 {
                return Ok(());
            }
            let (name, _) = take_ident(rest);
            if self.is_defined(name) {
                *skip_level = *if_level;
            }
        } else if let Some(rest) = directive(body, "if") {
            *if_level += 1;
            open_conds.push(line_no);
            if *skip_level > 0 {
                return Ok(());
            }
            if expr::evaluate(self, rest.trim(), diags)? == 0 {
                *skip_level = *if_level;
            }
        } else if directive(body, "else").is_some() || body == "else" {
            // only the frame that started the skip can toggle it
            if *skip_level == *if_level && *skip_level > 0 {
                *skip_level = 0;
            } else if *skip_level == 0 && *if_level > 0 {
                *skip_level = *if_level;
            }
        } else if directive(body, "endif").is_some() || body == "endif" {
            if *skip_level == *if_level {
                *skip_level = 0;
            }
            if *if_level > 0 {
                *if_level -= 1;
                open_conds.pop();
            }
        } else if let Some(rest) = directive(body, "org") {
            if *skip_level > 0 {
                return Ok(());
            }
            self.define("__ORG_ADDRESS__", rest.trim());
        } else if let Some(rest) = directive(body, "include") {
            if *skip_level > 0 {
                return Ok(());
            }
            let rest = rest.trim_start();
            let (name, system_header) = parse_include_target(rest)
                .ok_or_else(|| {
                    diags.fatal(format!(
                        "{file_name}:{line_no}: malformed #include directive"
                    ))
                })?;
            let resolved = self
                .resolve_include(name, system_header)
                .ok_or_else(|| {
                    diags.fatal(format!(
                        "{file_name}:{line_no}: cannot find include file '{name}'"
                    ))
                })?;
            // close the current segment, splice, then start a fresh one
            self.close_segment(file_name, out, *segment_mark);
            let spliced = self.process_file(&resolved, diags)?;
            out.extend_from_slice(spliced.as_bytes());
            *segment_mark = out.len();
            if let Some(path) = current_file {
                let display = path.display().to_string();
                self.define("__FILE__", &format!("\"{display}\""));
            }
        } else if let Some(rest) = directive(body, "pragma") {
            if *skip_level > 0 {
                return Ok(());
            }
            if rest.trim_start().starts_with("once") {
                if let Some(path) = current_file {
                    self.included_once.insert(canonical_key(path));
                }
            }
        } else if *skip_level == 0 {
            diags.report_error(
                None,
                format!("{file_name}:{line_no}: unknown directive {line}"),
            )?;
        }
        Ok(())
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Match a directive name followed by whitespace; returns the remainder.
fn directive<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let rest = body.strip_prefix(name)?;
    if rest.starts_with(|c: char| c.is_ascii_whitespace()) {
        Some(rest)
    } else {
        None
    }
}

fn take_ident(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    let end = text
        .bytes()
        .position(|b| !is_ident_char(b))
        .unwrap_or(text.len());
    (&text[..end], &text[end..])
}

fn parse_include_target(text: &str) -> Option<(&str, bool)> {
    if let Some(rest) = text.strip_prefix('<') {
        let end = rest.find('>')?;
        Some((&rest[..end], true))
    } else if let Some(rest) = text.strip_prefix('"') {
        let end = rest.find('"')?;
        Some((&rest[..end], false))
    } else {
        None
    }
}

/// Case-insensitive key used by the `#pragma once` set.
fn canonical_key(path: &Path) -> String {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    canonical.display().to_string().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        let mut diags = Diagnostics::new("test.c");
        diags.set_quiet(true);
        Preprocessor::new()
            .process_source(source, &mut diags)
            .unwrap()
    }

    #[test]
    fn no_directives_is_identity() {
        let src = "int main() {\n    return 0;\n}\n";
        assert_eq!(run(src), src);
    }

    #[test]
    fn define_substitutes_on_boundaries() {
        let out = run("#define N 42\nint x = N;\nint y = NN;\n");
        assert!(out.contains("int x = 42;"));
        assert!(out.contains("int y = NN;"));
    }

    #[test]
    fn substitution_is_not_rescanned() {
        let out = run("#define A B\n#define B A\nint x = A;\n");
        assert!(out.contains("int x = B;"));
    }

    #[test]
    fn if_else_branches() {
        let out = run("#if 1\nfirst\n#else\nsecond\n#endif\n");
        assert!(out.contains("first"));
        assert!(!out.contains("second"));

        let out = run("#if 0\nfirst\n#else\nsecond\n#endif\n");
        assert!(!out.contains("first"));
        assert!(out.contains("second"));
    }

    #[test]
    fn undef_then_defined_is_false() {
        let out = run(
            "#define X 1\n#undef X\n#if defined(X)\nyes\n#else\nno\n#endif\n",
        );
        assert!(!out.contains("yes"));
        assert!(out.contains("no"));
    }

    #[test]
    fn nested_conditionals_in_skipped_region() {
        let out = run(
            "#if 0\n#if 1\ninner\n#endif\nouter\n#else\ntaken\n#endif\n",
        );
        assert!(!out.contains("inner"));
        assert!(!out.contains("outer"));
        assert!(out.contains("taken"));
    }

    #[test]
    fn defines_inside_false_branch_are_ignored() {
        let out = run("#if 0\n#define Z 9\n#endif\nint x = Z;\n");
        assert!(out.contains("int x = Z;"));
    }

    #[test]
    fn arithmetic_condition() {
        let out = run("#define A 3\n#if A*2==6\nint x=1;\n#else\nint x=2;\n#endif\n");
        assert!(out.contains("int x=1;"));
        assert!(!out.contains("int x=2;"));
    }

    #[test]
    fn unterminated_conditional_is_fatal() {
        let mut diags = Diagnostics::new("test.c");
        diags.set_quiet(true);
        let result =
            Preprocessor::new().process_source("#if 1\nbody\n", &mut diags);
        assert!(result.is_err());
    }

    #[test]
    fn org_defines_builtin_macro() {
        let mut pp = Preprocessor::new();
        let mut diags = Diagnostics::new("test.c");
        diags.set_quiet(true);
        pp.process_source("#org 0x7C00\n", &mut diags).unwrap();
        assert_eq!(pp.value_of("__ORG_ADDRESS__"), Some("0x7C00"));
    }

    #[test]
    fn builtins_are_defined() {
        let pp = Preprocessor::new();
        assert_eq!(pp.value_of("__NCC__"), Some("65536"));
        assert_eq!(pp.value_of("__NCC_MAJOR__"), Some("1"));
        assert_eq!(pp.value_of("__NCC_MINOR__"), Some("0"));
        assert_eq!(pp.value_of("__x86_16__"), Some("1"));
    }
}
