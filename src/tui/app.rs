//! TUI application state management.

use std::path::{Path, PathBuf};

use crate::{
    pipeline::{PipelineError, Report},
    process::{OutputLine, Stream},
    selector::{self, Browser, Confirm},
};

pub const INITIAL_STATUS: &str = "Select a specification file (.docx) to import";
pub const RUNNING_STATUS: &str = "Import started...";
pub const SUCCESS_STATUS: &str = "Import completed successfully";
pub const NO_DOCUMENT_MESSAGE: &str = "Select an existing specification file!";

/// Popup display state
#[derive(Debug, Clone)]
pub enum PopupState {
    /// No popup shown
    None,
    /// File picker
    Browser(Browser),
    /// Error dialog
    Error { title: String, message: String },
}

/// Application state for the TUI
#[derive(Debug)]
pub struct App {
    /// Currently selected document
    pub document: Option<PathBuf>,
    /// One-line status shown in the status bar
    pub status_message: String,
    /// Lines received from the running (or last) script
    pub output: Vec<String>,
    /// Whether a script is running; processing is disabled meanwhile
    pub is_running: bool,
    /// "database" or "directory"
    pub mode_label: &'static str,
    /// Popup display state
    pub popup_state: PopupState,
    /// Whether to show help
    pub show_help: bool,
    /// Lines scrolled up from the bottom of the output pane
    pub output_scroll_offset: usize,
    /// Maximum output lines kept in memory for display
    pub max_output_lines: usize,
}

impl App {
    pub fn new(mode_label: &'static str) -> Self {
        Self {
            document: None,
            status_message: INITIAL_STATUS.to_string(),
            output: Vec::new(),
            is_running: false,
            mode_label,
            popup_state: PopupState::None,
            show_help: false,
            output_scroll_offset: 0,
            max_output_lines: 5000,
        }
    }

    /// Select a document. On failure the previous selection is kept and an
    /// error popup explains why.
    pub fn select_document(&mut self, path: &Path) -> bool {
        match selector::select_document(path) {
            Ok(doc) => {
                self.status_message = selector::selection_status(&doc);
                self.document = Some(doc);
                true
            }
            Err(e) => {
                self.show_error("Error", e.to_string());
                false
            }
        }
    }

    /// Open the file picker next to the current document, or in `fallback`.
    pub fn open_browser(&mut self, fallback: &Path) {
        let start = self
            .document
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(fallback);
        self.popup_state = PopupState::Browser(Browser::open(start));
    }

    pub fn browser_mut(&mut self) -> Option<&mut Browser> {
        match &mut self.popup_state {
            PopupState::Browser(b) => Some(b),
            _ => None,
        }
    }

    /// Confirm the highlighted browser entry; choosing a document closes the picker.
    pub fn browser_confirm(&mut self) {
        let Some(browser) = self.browser_mut() else {
            return;
        };
        if let Confirm::Chosen(path) = browser.confirm() {
            self.hide_popup();
            self.select_document(&path);
        }
    }

    /// Start a run if allowed. Returns the document to process.
    pub fn begin_run(&mut self) -> Option<PathBuf> {
        if self.is_running {
            return None;
        }
        let doc = match &self.document {
            Some(d) if d.is_file() => d.clone(),
            _ => {
                self.show_error("Error", NO_DOCUMENT_MESSAGE.to_string());
                return None;
            }
        };
        self.is_running = true;
        self.output.clear();
        self.output_scroll_offset = 0;
        self.status_message = RUNNING_STATUS.to_string();
        Some(doc)
    }

    pub fn push_output(&mut self, line: OutputLine) {
        let text = match line.stream {
            Stream::Stdout => line.text,
            Stream::Stderr => format!("ERROR: {}", line.text),
        };
        self.output.push(text);
        if self.output.len() > self.max_output_lines {
            self.output.drain(0..self.output.len() - self.max_output_lines);
        }
    }

    pub fn finish_run(&mut self, result: Result<Report, PipelineError>) {
        self.is_running = false;
        match result {
            Ok(report) => {
                self.status_message = match &report.output_dir {
                    Some(dir) => format!("Files written to {}", dir.display()),
                    None => SUCCESS_STATUS.to_string(),
                };
            }
            Err(e) => {
                self.status_message = format!("Import failed: {}", first_line(&e.user_message()));
                self.show_error("Import error", e.to_string());
            }
        }
    }

    pub fn show_error(&mut self, title: &str, message: String) {
        self.popup_state = PopupState::Error {
            title: title.to_string(),
            message,
        };
    }

    /// Hide any popup
    pub fn hide_popup(&mut self) {
        self.popup_state = PopupState::None;
    }

    /// Check if any popup is shown
    pub fn is_popup_shown(&self) -> bool {
        !matches!(self.popup_state, PopupState::None)
    }

    /// Toggle help display
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn scroll_up(&mut self) {
        self.output_scroll_offset += 1;
    }

    pub fn scroll_down(&mut self) {
        self.output_scroll_offset = self.output_scroll_offset.saturating_sub(1);
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
