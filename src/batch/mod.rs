//! Folder mode: find the documents of each project book and run the matching
//! parser for every one of them.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    pipeline::{self, DocumentKind, Job, OutputMode, PipelineError, Report, RunSettings},
    selector,
};

/// Project folders are named `Книга <n> ...`.
pub const BOOK_PREFIX: &str = "Книга";

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub folder: PathBuf,
    pub kind: DocumentKind,
    pub job: Job,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Folders to scan: `root` itself when it is a book, otherwise its book subfolders.
pub fn book_folders(root: &Path) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("'{}' does not exist or is not a directory", root.display()),
        ));
    }
    if is_book(root) {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut books: Vec<PathBuf> = fs::read_dir(root)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && is_book(p))
        .collect();
    books.sort();
    Ok(books)
}

fn is_book(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(BOOK_PREFIX))
        .unwrap_or(false)
}

/// First document per kind, by file name. Each file is claimed by at most one kind.
pub fn find_documents(folder: &Path) -> io::Result<Vec<(DocumentKind, PathBuf)>> {
    let mut names: Vec<String> = fs::read_dir(folder)?
        .flatten()
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| selector::is_document(Path::new(n)) && !selector::is_lock_file(n))
        .collect();
    names.sort();

    let mut found: Vec<(DocumentKind, PathBuf)> = Vec::new();
    for name in &names {
        let claimed = DocumentKind::ALL
            .into_iter()
            .find(|kind| !found.iter().any(|(k, _)| k == kind) && kind.matches(name));
        if let Some(kind) = claimed {
            found.push((kind, folder.join(name)));
        }
    }
    found.sort_by_key(|(kind, _)| DocumentKind::ALL.iter().position(|k| k == kind));
    Ok(found)
}

/// Build the job list for `root`. `script_for` maps a kind to its script.
pub fn plan(
    root: &Path,
    mode: &OutputMode,
    script_for: impl Fn(DocumentKind) -> PathBuf,
) -> io::Result<Vec<BatchJob>> {
    let mut jobs = Vec::new();
    for folder in book_folders(root)? {
        let docs = find_documents(&folder)?;
        info!(folder = %folder.display(), count = docs.len(), "scanned book");
        for (kind, document) in docs {
            jobs.push(BatchJob {
                folder: folder.clone(),
                kind,
                job: Job {
                    document,
                    script: script_for(kind),
                    mode: mode.clone(),
                },
            });
        }
    }
    Ok(jobs)
}

/// Run jobs one after another. A failed job is reported through `on_done`
/// and does not stop the rest.
pub async fn run_batch(
    jobs: &[BatchJob],
    settings: &RunSettings,
    mut on_done: impl FnMut(&BatchJob, &Result<Report, PipelineError>),
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for item in jobs {
        let result = pipeline::run_job(&item.job, settings, None).await;
        match &result {
            Ok(_) => summary.succeeded += 1,
            Err(e) => {
                warn!(document = %item.job.document.display(), error = %e, "batch job failed");
                summary.failed += 1;
            }
        }
        on_done(item, &result);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn book_folder_is_scanned_directly() {
        let tmp = tempfile::tempdir().unwrap();
        let book = tmp.path().join("Книга 1");
        fs::create_dir(&book).unwrap();
        assert_eq!(book_folders(&book).unwrap(), vec![book]);
    }

    #[test]
    fn parent_folder_yields_its_books() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("Книга 2")).unwrap();
        fs::create_dir(tmp.path().join("Книга 1")).unwrap();
        fs::create_dir(tmp.path().join("Архив")).unwrap();
        touch(tmp.path(), "Книга 3.docx");

        let books = book_folders(tmp.path()).unwrap();
        assert_eq!(
            books,
            vec![tmp.path().join("Книга 1"), tmp.path().join("Книга 2")]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(book_folders(&tmp.path().join("absent")).is_err());
    }

    #[test]
    fn documents_are_classified_by_marker() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "01 КЖ кабельный журнал.docx");
        touch(tmp.path(), "02 СО спецификация.docx");
        touch(tmp.path(), "03 СВР сводная.docx");
        touch(tmp.path(), "04 ВР ведомость.docx");
        touch(tmp.path(), "~$02 СО спецификация.docx");
        touch(tmp.path(), "05 КЖ копия.docx");
        touch(tmp.path(), "notes СО.txt");

        let found = find_documents(tmp.path()).unwrap();
        let names: Vec<(DocumentKind, String)> = found
            .iter()
            .map(|(k, p)| (*k, p.file_name().unwrap().to_string_lossy().into_owned()))
            .collect();
        assert_eq!(
            names,
            vec![
                (DocumentKind::Cable, "01 КЖ кабельный журнал.docx".to_string()),
                (DocumentKind::Spec, "02 СО спецификация.docx".to_string()),
                (DocumentKind::Works, "04 ВР ведомость.docx".to_string()),
            ]
        );
    }

    #[test]
    fn file_with_two_markers_is_claimed_once() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a КЖ СО.docx");
        touch(tmp.path(), "b СО.docx");

        let found = find_documents(tmp.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].1.ends_with("a КЖ СО.docx"));
        assert!(found[1].1.ends_with("b СО.docx"));
    }

    #[test]
    fn plan_uses_script_per_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let book = tmp.path().join("Книга 7");
        fs::create_dir(&book).unwrap();
        touch(&book, "x СО.docx");
        touch(&book, "y КЖ.docx");

        let mode = OutputMode::Directory {
            root: tmp.path().to_path_buf(),
            pattern: "out".into(),
        };
        let jobs = plan(tmp.path(), &mode, |kind| PathBuf::from(format!("{kind:?}.py"))).unwrap();
        let scripts: Vec<PathBuf> = jobs.iter().map(|j| j.job.script.clone()).collect();
        assert_eq!(scripts, vec![PathBuf::from("Cable.py"), PathBuf::from("Spec.py")]);
        assert!(jobs.iter().all(|j| j.folder == book));
    }
}

#[cfg(all(test, unix))]
mod run_tests {
    use super::*;
    use crate::interpreter::InterpreterLocator;
    use std::time::Duration;

    #[tokio::test]
    async fn books_in_directory_mode_write_to_separate_folders() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("spec.sh"), "echo \"$1\" > \"$2/tables.csv\"\n").unwrap();
        for book in ["Книга 1", "Книга 2"] {
            let dir = tmp.path().join("project").join(book);
            fs::create_dir_all(&dir).unwrap();
            fs::File::create(dir.join("спецификация СО.docx")).unwrap();
        }

        let out = tmp.path().join("out");
        let mode = OutputMode::Directory {
            root: out.clone(),
            pattern: "output_%Y%m%d_%H%M%S".into(),
        };
        let jobs = plan(&tmp.path().join("project"), &mode, |_| PathBuf::from("spec.sh")).unwrap();
        assert_eq!(jobs.len(), 2);

        let settings = RunSettings {
            locator: InterpreterLocator::new(vec![PathBuf::from("/bin/sh")], None),
            script_dir: tmp.path().to_path_buf(),
            timeout: Duration::from_secs(10),
        };
        let mut dirs = Vec::new();
        let summary = run_batch(&jobs, &settings, |_, result| {
            dirs.push(result.as_ref().unwrap().output_dir.clone().unwrap());
        })
        .await;

        assert!(summary.all_ok());
        assert_ne!(dirs[0], dirs[1]);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 2);
        for (dir, book) in dirs.iter().zip(["Книга 1", "Книга 2"]) {
            let written = fs::read_to_string(dir.join("tables.csv")).unwrap();
            assert!(written.contains(book), "{written}");
        }
    }
}
