//! Terminal output for the command-line surface.

use owo_colors::OwoColorize;

use crate::{
    batch::BatchJob,
    pipeline::{PipelineError, Report},
    process::{OutputLine, Stream},
};

pub struct StatusPrinter {
    pub color: bool,
}

impl StatusPrinter {
    pub fn status(&self, text: &str) {
        if self.color {
            println!("{}", text.cyan());
        } else {
            println!("{}", text);
        }
    }

    pub fn success(&self, text: &str) {
        if self.color {
            println!("{}", text.green());
        } else {
            println!("{}", text);
        }
    }

    pub fn error(&self, text: &str) {
        if self.color {
            eprintln!("{}", text.red());
        } else {
            eprintln!("{}", text);
        }
    }

    /// Echo a live output line from the script.
    pub fn line(&self, line: &OutputLine) {
        match line.stream {
            Stream::Stdout => println!("{}", line.text),
            Stream::Stderr if self.color => eprintln!("{} {}", "ERROR:".red(), line.text),
            Stream::Stderr => eprintln!("ERROR: {}", line.text),
        }
    }

    pub fn report(&self, report: &Report, json: bool) {
        if json {
            match serde_json::to_string_pretty(report) {
                Ok(s) => println!("{}", s),
                Err(e) => self.error(&format!("failed to encode report: {e}")),
            }
            return;
        }
        match &report.output_dir {
            Some(dir) => self.success(&format!("Files written to {}", dir.display())),
            None => self.success("Import completed successfully"),
        }
    }

    pub fn batch_item(&self, item: &BatchJob, result: &Result<Report, PipelineError>) {
        let name = item
            .job
            .document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match result {
            Ok(_) => self.success(&format!("[{:?}] {}: done", item.kind, name)),
            Err(e) => self.error(&format!("[{:?}] {}: {}", item.kind, name, e.user_message())),
        }
    }
}
