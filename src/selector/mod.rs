//! Document selection: path validation and a directory browser filtered to `.docx`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;

pub const DOCUMENT_EXTENSION: &str = "docx";

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Document file '{0}' does not exist")]
    Missing(PathBuf),
    #[error("'{0}' is not a file")]
    NotAFile(PathBuf),
    #[error("'{0}' is not a .docx document")]
    WrongExtension(PathBuf),
    #[error("failed to resolve '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Validate a user-supplied document path and return it as an absolute path.
pub fn select_document(path: &Path) -> Result<PathBuf, SelectError> {
    if !path.exists() {
        return Err(SelectError::Missing(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(SelectError::NotAFile(path.to_path_buf()));
    }
    if !is_document(path) {
        return Err(SelectError::WrongExtension(path.to_path_buf()));
    }
    fs::canonicalize(path).map_err(|source| SelectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Status line shown after a document is picked.
pub fn selection_status(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("Selected file: {name}")
}

pub fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

/// Word keeps `~$name.docx` owner files next to open documents.
pub fn is_lock_file(name: &str) -> bool {
    name.starts_with("~$")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Parent,
    Directory,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// What confirming the highlighted entry did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    /// Moved into a directory; the browser stays open.
    Entered,
    /// A document was chosen.
    Chosen(PathBuf),
    Nothing,
}

/// File-open prompt state: one directory listing and a cursor.
#[derive(Debug, Clone)]
pub struct Browser {
    dir: PathBuf,
    entries: Vec<Entry>,
    cursor: usize,
    error: Option<String>,
}

impl Browser {
    pub fn open(dir: &Path) -> Self {
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let mut browser = Self {
            dir,
            entries: Vec::new(),
            cursor: 0,
            error: None,
        };
        browser.refresh();
        browser
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Last listing error, if the directory could not be read.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn refresh(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.error = None;

        if let Some(parent) = self.dir.parent() {
            self.entries.push(Entry {
                name: "..".into(),
                path: parent.to_path_buf(),
                kind: EntryKind::Parent,
            });
        }

        let read = match fs::read_dir(&self.dir) {
            Ok(r) => r,
            Err(e) => {
                self.error = Some(format!("cannot read {}: {e}", self.dir.display()));
                return;
            }
        };

        let mut dirs = Vec::new();
        let mut docs = Vec::new();
        for entry in read.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_dir() {
                dirs.push(Entry {
                    name,
                    path,
                    kind: EntryKind::Directory,
                });
            } else if is_document(&path) && !is_lock_file(&name) {
                docs.push(Entry {
                    name,
                    path,
                    kind: EntryKind::Document,
                });
            }
        }
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        self.entries.extend(dirs);
        self.entries.extend(docs);
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
    }

    pub fn selected(&self) -> Option<&Entry> {
        self.entries.get(self.cursor)
    }

    pub fn go_parent(&mut self) {
        if let Some(parent) = self.dir.parent() {
            self.dir = parent.to_path_buf();
            self.refresh();
        }
    }

    pub fn confirm(&mut self) -> Confirm {
        let Some(entry) = self.selected().cloned() else {
            return Confirm::Nothing;
        };
        match entry.kind {
            EntryKind::Parent => {
                self.go_parent();
                Confirm::Entered
            }
            EntryKind::Directory => {
                self.dir = entry.path;
                self.refresh();
                Confirm::Entered
            }
            EntryKind::Document => Confirm::Chosen(entry.path),
        }
    }
}
