mod batch;
mod cli;
mod config;
mod interpreter;
mod logging;
mod pipeline;
mod printer;
mod process;
mod selector;
mod tui;

use std::{io, path::PathBuf};

use anyhow::{bail, Result};
use cli::{Command, DbArgs, RunArgs};
use config::Config;
use is_terminal::IsTerminal;
use pipeline::{DocumentKind, Job, OutputMode, Report, RunSettings};
use printer::StatusPrinter;
use tokio::sync::mpsc;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let mut cfg = Config::load(args.config.as_deref())?;

    // The TUI owns the terminal; everything else logs to stderr.
    let _log_guard = match &args.command {
        Command::Tui { .. } => Some(logging::init_file(&cfg.log_dir(), args.verbose)?),
        _ => {
            logging::init_stderr(args.verbose)?;
            None
        }
    };

    tracing::debug!(path = %cfg.config_path.display(), "config loaded");

    let printer = StatusPrinter {
        color: !args.no_color && io::stdout().is_terminal(),
    };

    match args.command {
        Command::Import {
            document,
            kind,
            run,
            db,
        } => {
            apply_run_args(&mut cfg, &run);
            apply_db_args(&mut cfg, &db);
            let job = Job {
                document,
                script: script_for(&cfg, kind),
                mode: OutputMode::Database(cfg.database()),
            };
            let report = run_single(&job, &RunSettings::from_config(&cfg), &printer, run.json).await?;
            printer.report(&report, run.json);
            Ok(())
        }
        Command::Export {
            document,
            output_root,
            open,
            run,
        } => {
            apply_run_args(&mut cfg, &run);
            if let Some(root) = output_root {
                cfg.set("OUTPUT_ROOT", root.to_string_lossy());
            }
            let job = Job {
                document,
                script: cfg.get_path("EXPORT_SCRIPT").unwrap_or_default(),
                mode: directory_mode(&cfg),
            };
            let report = run_single(&job, &RunSettings::from_config(&cfg), &printer, run.json).await?;
            printer.report(&report, run.json);

            if open || cfg.get_bool("OPEN_OUTPUT_DIR") {
                if let Some(dir) = &report.output_dir {
                    if let Err(e) = pipeline::open_in_file_browser(dir) {
                        warn!(error = %e, dir = %dir.display(), "could not open output folder");
                    }
                }
            }
            Ok(())
        }
        Command::Batch {
            folder,
            output_root,
            run,
            db,
        } => {
            apply_run_args(&mut cfg, &run);
            apply_db_args(&mut cfg, &db);
            let mode = match output_root {
                Some(root) => {
                    cfg.set("OUTPUT_ROOT", root.to_string_lossy());
                    directory_mode(&cfg)
                }
                None => OutputMode::Database(cfg.database()),
            };

            let jobs = batch::plan(&folder, &mode, |kind| script_for(&cfg, kind))?;
            if jobs.is_empty() {
                printer.status(&format!("No documents found under {}", folder.display()));
                return Ok(());
            }
            printer.status(&format!("Found {} document(s)", jobs.len()));

            let settings = RunSettings::from_config(&cfg);
            let summary = batch::run_batch(&jobs, &settings, |item, result| {
                printer.batch_item(item, result)
            })
            .await;
            if !summary.all_ok() {
                bail!(
                    "{} of {} document(s) failed",
                    summary.failed,
                    summary.failed + summary.succeeded
                );
            }
            printer.success(&format!("{} document(s) processed", summary.succeeded));
            Ok(())
        }
        Command::Tui {
            document,
            output_root,
            run,
        } => {
            apply_run_args(&mut cfg, &run);
            let mode = match output_root {
                Some(root) => {
                    cfg.set("OUTPUT_ROOT", root.to_string_lossy());
                    directory_mode(&cfg)
                }
                None => OutputMode::Database(cfg.database()),
            };
            let script = match mode {
                OutputMode::Directory { .. } => cfg.get_path("EXPORT_SCRIPT").unwrap_or_default(),
                OutputMode::Database(_) => script_for(&cfg, DocumentKind::Spec),
            };
            tui::run_tui(tui::TuiOptions {
                document,
                script,
                mode,
                settings: RunSettings::from_config(&cfg),
            })
            .await
        }
        Command::Locate { python } => {
            let explicit = python.or_else(|| cfg.get_path("PYTHON_PATH"));
            match interpreter::InterpreterLocator::from_env(explicit).find() {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                None => bail!("{}", pipeline::PipelineError::MissingInterpreter),
            }
        }
    }
}

/// Run one job, echoing the script's output lines as they arrive.
async fn run_single(job: &Job, settings: &RunSettings, printer: &StatusPrinter, json: bool) -> Result<Report> {
    let document = selector::select_document(&job.document)?;
    if !json {
        printer.status(&selector::selection_status(&document));
        printer.status("Import started...");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = pipeline::run_job(job, settings, Some(tx));
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            Some(line) = rx.recv() => {
                if !json {
                    printer.line(&line);
                }
            }
            res = &mut run => break res,
        }
    };
    while let Ok(line) = rx.try_recv() {
        if !json {
            printer.line(&line);
        }
    }

    Ok(result?)
}

fn apply_run_args(cfg: &mut Config, run: &RunArgs) {
    if let Some(p) = &run.python {
        cfg.set("PYTHON_PATH", p.to_string_lossy());
    }
    if let Some(d) = &run.script_dir {
        cfg.set("SCRIPT_DIR", d.to_string_lossy());
    }
    if let Some(ms) = run.timeout_ms {
        cfg.set("PROCESS_TIMEOUT_MS", ms.to_string());
    }
}

fn apply_db_args(cfg: &mut Config, db: &DbArgs) {
    let pairs = [
        ("DB_HOST", &db.host),
        ("DB_PORT", &db.port),
        ("DB_NAME", &db.name),
        ("DB_USER", &db.user),
        ("DB_PASSWORD", &db.password),
    ];
    for (key, value) in pairs {
        if let Some(v) = value {
            cfg.set(key, v.clone());
        }
    }
}

fn script_for(cfg: &Config, kind: DocumentKind) -> PathBuf {
    cfg.get_path(kind.script_key()).unwrap_or_default()
}

fn directory_mode(cfg: &Config) -> OutputMode {
    OutputMode::Directory {
        root: cfg.output_root(),
        pattern: cfg.output_dir_pattern(),
    }
}
