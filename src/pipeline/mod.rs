//! Import pipeline: validate the document, find the interpreter and script,
//! run the script and turn its outcome into a report or an error.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::Local;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument, warn};

use crate::{
    config::Config,
    interpreter::InterpreterLocator,
    process::{self, CommandLine, ExitOutcome, OutputLine},
    selector::{self, SelectError},
};

/// Connection parameters handed to the import script as positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseParams {
    pub host: String,
    pub port: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

/// Where the script puts its results.
#[derive(Debug, Clone)]
pub enum OutputMode {
    /// Import straight into the database.
    Database(DatabaseParams),
    /// Write files into a fresh timestamped folder under `root`.
    Directory { root: PathBuf, pattern: String },
}

impl OutputMode {
    pub fn label(&self) -> &'static str {
        match self {
            OutputMode::Database(_) => "database",
            OutputMode::Directory { .. } => "directory",
        }
    }
}

/// Document families the parser scripts know about, keyed by the marker that
/// appears in their file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DocumentKind {
    /// Equipment specification (СО).
    Spec,
    /// Cable log (КЖ).
    Cable,
    /// Statement of works (ВР).
    Works,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [DocumentKind::Cable, DocumentKind::Spec, DocumentKind::Works];

    pub fn marker(self) -> &'static str {
        match self {
            DocumentKind::Spec => "СО",
            DocumentKind::Cable => "КЖ",
            DocumentKind::Works => "ВР",
        }
    }

    pub fn script_key(self) -> &'static str {
        match self {
            DocumentKind::Spec => "SPEC_SCRIPT",
            DocumentKind::Cable => "CABLE_SCRIPT",
            DocumentKind::Works => "WORKS_SCRIPT",
        }
    }

    /// Whether a file name carries this kind's marker. `СВР` names contain
    /// `ВР` but belong to a different document family.
    pub fn matches(self, file_name: &str) -> bool {
        match self {
            DocumentKind::Works => file_name.contains("ВР") && !file_name.contains("СВР"),
            other => file_name.contains(other.marker()),
        }
    }
}

/// One script invocation for one document.
#[derive(Debug, Clone)]
pub struct Job {
    pub document: PathBuf,
    /// Script file name, resolved against the script directory unless absolute.
    pub script: PathBuf,
    pub mode: OutputMode,
}

/// Everything a run needs besides the job itself.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub locator: InterpreterLocator,
    pub script_dir: PathBuf,
    pub timeout: Duration,
}

impl RunSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            locator: InterpreterLocator::from_env(cfg.get_path("PYTHON_PATH")),
            script_dir: cfg.get_path("SCRIPT_DIR").unwrap_or_else(default_script_dir),
            timeout: cfg.timeout(),
        }
    }
}

/// Scripts ship next to the executable by default.
pub fn default_script_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub document: PathBuf,
    pub script: PathBuf,
    pub interpreter: PathBuf,
    pub mode: &'static str,
    pub output_dir: Option<PathBuf>,
    pub elapsed_ms: u64,
    pub stdout: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidDocument(#[from] SelectError),
    #[error("Python interpreter not found. Make sure Python 3.9+ is installed and on PATH, or set PYTHON_PATH")]
    MissingInterpreter,
    #[error("Python script not found: {}", .0.display())]
    MissingScript(PathBuf),
    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("failed to start {}: {source}", .program.display())]
    Spawn { program: PathBuf, source: io::Error },
    #[error("script failed (exit code {}):\n{diagnostics}", code_label(.code))]
    ScriptFailed {
        code: Option<i32>,
        diagnostics: String,
    },
    #[error("script did not finish within {} ms and was stopped", .timeout.as_millis())]
    TimedOut { timeout: Duration },
}

fn code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl PipelineError {
    /// Short text for status lines: the script's own diagnostics when it failed.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ScriptFailed { diagnostics, .. } => diagnostics.clone(),
            other => other.to_string(),
        }
    }
}

/// Run one job end to end.
///
/// Nothing is spawned unless the document exists and both the interpreter and
/// the script were found. Output lines are forwarded to `listener` as they arrive.
#[instrument(skip_all, fields(document = %job.document.display(), mode = job.mode.label()))]
pub async fn run_job(
    job: &Job,
    settings: &RunSettings,
    listener: Option<UnboundedSender<OutputLine>>,
) -> Result<Report, PipelineError> {
    let document = selector::select_document(&job.document)?;

    let interpreter = settings
        .locator
        .find()
        .ok_or(PipelineError::MissingInterpreter)?;

    let script = resolve_script(&settings.script_dir, &job.script)?;

    let (mode_args, output_dir) = match &job.mode {
        OutputMode::Database(db) => (
            vec![
                db.host.clone(),
                db.port.clone(),
                db.database.clone(),
                db.user.clone(),
                db.password.clone(),
            ],
            None,
        ),
        OutputMode::Directory { root, pattern } => {
            let dir = create_output_dir(root, pattern)?;
            (vec![dir.to_string_lossy().into_owned()], Some(dir))
        }
    };

    let mut args = vec![
        script.to_string_lossy().into_owned(),
        document.to_string_lossy().into_owned(),
    ];
    args.extend(mode_args);

    let secret = match job.mode {
        OutputMode::Database(_) => vec![args.len() - 1],
        OutputMode::Directory { .. } => vec![],
    };
    let shown = process::redacted(&args, &secret);
    let command = CommandLine {
        program: &interpreter,
        args: &shown,
    };
    info!(%command, "starting script");

    let started = Instant::now();
    let outcome = process::run(&interpreter, &args, settings.timeout, listener)
        .await
        .map_err(|source| PipelineError::Spawn {
            program: interpreter.clone(),
            source,
        })?;
    let elapsed = started.elapsed();

    let diagnostics = outcome.diagnostics().to_string();
    match outcome {
        ExitOutcome::Success { stdout, .. } => {
            info!(elapsed_ms = elapsed.as_millis() as u64, "script finished");
            Ok(Report {
                document,
                script,
                interpreter,
                mode: job.mode.label(),
                output_dir,
                elapsed_ms: elapsed.as_millis() as u64,
                stdout,
            })
        }
        ExitOutcome::Failed { code, .. } => {
            warn!(?code, "script failed");
            Err(PipelineError::ScriptFailed { code, diagnostics })
        }
        ExitOutcome::TimedOut { timeout, .. } => Err(PipelineError::TimedOut { timeout }),
    }
}

pub fn resolve_script(script_dir: &Path, script: &Path) -> Result<PathBuf, PipelineError> {
    let path = if script.is_absolute() {
        script.to_path_buf()
    } else {
        script_dir.join(script)
    };
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::MissingScript(path))
    }
}

/// Attempts at a `_N` suffix before giving up on a taken folder name.
const MAX_DIR_SUFFIX: u32 = 1000;

/// Create a new `<root>/<Local::now() formatted with pattern>` and return it.
///
/// The folder is never shared: if the name is taken (two runs in the same
/// second), `_1`, `_2`, ... is appended until an unused name is created.
pub fn create_output_dir(root: &Path, pattern: &str) -> Result<PathBuf, PipelineError> {
    let output_err = |path: &Path, source| PipelineError::OutputDir {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(root).map_err(|e| output_err(root, e))?;

    let base = Local::now().format(pattern).to_string();
    let mut dir = root.join(&base);
    for n in 1..=MAX_DIR_SUFFIX {
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                dir = root.join(format!("{base}_{n}"));
            }
            Err(e) => return Err(output_err(&dir, e)),
        }
    }
    Err(output_err(
        &dir,
        io::Error::new(io::ErrorKind::AlreadyExists, "no unused output folder name left"),
    ))
}

/// Show a folder in the platform file manager. Does not wait for it.
pub fn open_in_file_browser(dir: &Path) -> io::Result<()> {
    let program = if cfg!(windows) {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    std::process::Command::new(program).arg(dir).spawn().map(|_| ())
}
