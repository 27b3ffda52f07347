//! Code formatting of non-minified bundles.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use log::debug;

use crate::error::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Single,
    Double,
}

/// Parser the formatter reads the code with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserDialect {
    Babel,
}

impl ParserDialect {
    pub fn as_str(self) -> &'static str {
        match self {
            ParserDialect::Babel => "babel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub quote_style: QuoteStyle,
    pub max_line_width: usize,
    pub parser: ParserDialect,
}

impl FormatOptions {
    /// The options every formatted bundle is written with.
    pub fn bundle() -> Self {
        Self {
            quote_style: QuoteStyle::Single,
            max_line_width: 92,
            parser: ParserDialect::Babel,
        }
    }
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self::bundle()
    }
}

/// A synchronous, deterministic code formatter.
pub trait CodeFormatter: Send + Sync {
    fn format(&self, code: &str, options: &FormatOptions) -> Result<String, FormatError>;
}

/// Runs an external prettier executable over stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrettierFormatter {
    command: Vec<String>,
}

impl Default for PrettierFormatter {
    fn default() -> Self {
        Self::new("prettier")
    }
}

impl PrettierFormatter {
    /// `command` is split on whitespace, e.g. `"npx prettier"`.
    pub fn new(command: &str) -> Self {
        Self::from_args(command.split_whitespace().map(str::to_string).collect())
    }

    /// Program followed by leading arguments; the formatting flags are appended.
    pub fn from_args(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn option_args(options: &FormatOptions) -> Vec<String> {
        let mut args = Vec::new();
        if options.quote_style == QuoteStyle::Single {
            args.push("--single-quote".to_string());
        }
        args.push("--print-width".to_string());
        args.push(options.max_line_width.to_string());
        args.push("--parser".to_string());
        args.push(options.parser.as_str().to_string());
        args
    }
}

impl CodeFormatter for PrettierFormatter {
    fn format(&self, code: &str, options: &FormatOptions) -> Result<String, FormatError> {
        let (program, leading) = self.command.split_first().ok_or(FormatError::EmptyCommand)?;
        debug!("Formatting {} bytes with {}", code.len(), program);

        let mut child = Command::new(program)
            .args(leading)
            .args(Self::option_args(options))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FormatError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("formatter stdin unavailable"))?;
        let input = code.to_string();
        // Feed stdin from a separate thread so a full stdout pipe cannot deadlock us.
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("formatter stdin writer panicked")));

        if !output.status.success() {
            return Err(FormatError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        String::from_utf8(output.stdout).map_err(|_| FormatError::InvalidUtf8)
    }
}
