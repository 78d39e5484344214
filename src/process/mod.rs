//! External process execution: spawn, capture, classify.

use std::{fmt, path::Path, time::Duration};

mod runner;

pub use runner::run;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// A single non-empty line read from the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

/// How a process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success {
        stdout: String,
        stderr: String,
    },
    /// Non-zero exit. `code` is `None` when the process died from a signal.
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The process outlived its timeout and was killed.
    TimedOut {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
}

impl ExitOutcome {
    pub fn stdout(&self) -> &str {
        match self {
            ExitOutcome::Success { stdout, .. }
            | ExitOutcome::Failed { stdout, .. }
            | ExitOutcome::TimedOut { stdout, .. } => stdout,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            ExitOutcome::Success { stderr, .. }
            | ExitOutcome::Failed { stderr, .. }
            | ExitOutcome::TimedOut { stderr, .. } => stderr,
        }
    }

    /// Text to show the user: stderr if it has content, else stdout.
    pub fn diagnostics(&self) -> &str {
        let stderr = self.stderr().trim_end();
        if stderr.trim().is_empty() {
            self.stdout().trim_end()
        } else {
            stderr
        }
    }
}

/// Quote one argument for display. Every argument is quoted so the rendered
/// command line reads the same way the process receives it.
///
/// Follows Windows argv rules: backslashes are literal unless they precede a
/// `"` or the closing quote, where they are doubled.
pub fn quote_arg(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                push_backslashes(&mut out, backslashes * 2 + 1);
                out.push('"');
                backslashes = 0;
            }
            _ => {
                push_backslashes(&mut out, backslashes);
                out.push(c);
                backslashes = 0;
            }
        }
    }
    push_backslashes(&mut out, backslashes * 2);
    out.push('"');
    out
}

fn push_backslashes(out: &mut String, n: usize) {
    out.extend(std::iter::repeat('\\').take(n));
}

/// Printable form of an invocation, for logs and status text.
pub struct CommandLine<'a> {
    pub program: &'a Path,
    pub args: &'a [String],
}

impl fmt::Display for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote_arg(&self.program.to_string_lossy()))?;
        for arg in self.args {
            write!(f, " {}", quote_arg(arg))?;
        }
        Ok(())
    }
}

/// Redact positional arguments that should not reach logs.
pub fn redacted(args: &[String], secret_positions: &[usize]) -> Vec<String> {
    args.iter()
        .enumerate()
        .map(|(i, a)| {
            if secret_positions.contains(&i) {
                "***".to_string()
            } else {
                a.clone()
            }
        })
        .collect()
}
