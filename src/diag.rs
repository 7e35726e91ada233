use std::fmt::Display;

use anyhow::{anyhow, Error};

const COLOR_RED: &str = "\x1b[1;31m";
const COLOR_YELLOW: &str = "\x1b[1;33m";
const COLOR_RESET: &str = "\x1b[0m";

/// Collects errors and warnings for one compilation.
///
/// Positions are byte offsets into the preprocessed source buffer; they are
/// resolved to (line, column) and a caret snippet when the report is printed.
/// Errors past the configured cap abort the compilation.
pub struct Diagnostics {
    filename: String,
    source: Option<String>,
    errors: usize,
    warnings: usize,
    max_errors: usize,
    quiet: bool,
}

impl Diagnostics {
    pub fn new(filename: impl Into<String>) -> Self {
        Diagnostics {
            filename: filename.into(),
            source: None,
            errors: 0,
            warnings: 0,
            max_errors: 20,
            quiet: false,
        }
    }

    /// Attach the source buffer reports are positioned against. Called once
    /// the preprocessor has produced the final translation unit text.
    pub fn set_source(&mut self, source: String) {
        self.source = Some(source);
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    pub fn set_max_errors(&mut self, max: usize) {
        self.max_errors = max;
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Report a fatal error and hand back an `Error` for the caller to
    /// propagate with `?`.
    pub fn error(&mut self, pos: usize, msg: impl Display) -> Error {
        let rendered = format!("{msg}");
        self.print_report("error", COLOR_RED, Some(pos), &rendered);
        self.errors += 1;
        anyhow!("{}", rendered)
    }

    /// Report a fatal error that has no position in the source buffer
    /// (preprocessor failures, I/O).
    pub fn fatal(&mut self, msg: impl Display) -> Error {
        let rendered = format!("{msg}");
        self.print_report("error", COLOR_RED, None, &rendered);
        self.errors += 1;
        anyhow!("{}", rendered)
    }

    /// Report an error the compilation can survive. Returns `Err` only when
    /// the error cap has been reached.
    pub fn report_error(
        &mut self,
        pos: Option<usize>,
        msg: impl Display,
    ) -> anyhow::Result<()> {
        self.print_report("error", COLOR_RED, pos, &format!("{msg}"));
        self.errors += 1;
        if self.errors >= self.max_errors {
            return Err(anyhow!("too many errors, stopping compilation"));
        }
        Ok(())
    }

    pub fn warning(&mut self, pos: Option<usize>, msg: impl Display) {
        self.warnings += 1;
        if self.quiet {
            return;
        }
        self.print_report("warning", COLOR_YELLOW, pos, &format!("{msg}"));
    }

    fn print_report(
        &self,
        kind: &str,
        color: &str,
        pos: Option<usize>,
        msg: &str,
    ) {
        match pos {
            Some(pos) if self.source.is_some() => {
                let (line, col) = self.line_col(pos);
                eprintln!(
                    "{color}{kind}:{COLOR_RESET} {}:{line}:{col}: {msg}",
                    self.filename
                );
                self.print_snippet(pos);
            }
            _ => eprintln!("{color}{kind}:{COLOR_RESET} {msg}"),
        }
    }

    /// Resolve a byte offset to 1-based (line, column).
    pub fn line_col(&self, pos: usize) -> (usize, usize) {
        let Some(source) = &self.source else {
            return (0, 0);
        };
        let bytes = source.as_bytes();
        let pos = pos.min(bytes.len());
        let mut line = 1;
        let mut line_start = 0;
        for (i, b) in bytes[..pos].iter().enumerate() {
            if *b == b'\n' {
                line += 1;
                line_start = i + 1;
            }
        }
        (line, pos - line_start + 1)
    }

    fn print_snippet(&self, pos: usize) {
        let Some(source) = &self.source else { return };
        let bytes = source.as_bytes();
        let pos = pos.min(bytes.len());
        let line_start = bytes[..pos]
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = bytes[pos..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|i| pos + i)
            .unwrap_or(bytes.len());
        let (line, _) = self.line_col(pos);
        let text = String::from_utf8_lossy(&bytes[line_start..line_end]);
        eprintln!(" {line:4} | {text}");
        eprintln!("      | {}^~~~", " ".repeat(pos - line_start));
    }
}
