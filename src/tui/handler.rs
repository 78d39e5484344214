//! Async event loop for the interactive front-end.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use is_terminal::IsTerminal;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{
    app::{App, PopupState},
    events::TuiEvent,
    ui::render_ui,
};
use crate::pipeline::{self, Job, OutputMode, RunSettings};

/// What the interactive session runs.
#[derive(Debug, Clone)]
pub struct TuiOptions {
    pub document: Option<PathBuf>,
    pub script: PathBuf,
    pub mode: OutputMode,
    pub settings: RunSettings,
}

/// Run the interactive front-end until the user quits.
pub async fn run_tui(opts: TuiOptions) -> Result<()> {
    if !io::stdout().is_terminal() {
        return Err(anyhow::anyhow!("TUI mode requires a proper terminal environment"));
    }

    let mut app = App::new(opts.mode.label());
    if let Some(doc) = &opts.document {
        app.select_document(doc);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (event_tx, event_rx) = mpsc::unbounded_channel::<TuiEvent>();
    let result = run_app(&mut terminal, &mut app, &opts, event_tx, event_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Main application loop
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    opts: &TuiOptions,
    event_tx: mpsc::UnboundedSender<TuiEvent>,
    mut event_rx: mpsc::UnboundedReceiver<TuiEvent>,
) -> Result<()> {
    // Keyboard poller; stops once the loop below drops the receiver.
    let input_tx = event_tx.clone();
    tokio::task::spawn_blocking(move || {
        while !input_tx.is_closed() {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if input_tx.send(TuiEvent::Key(key)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    loop {
        terminal.draw(|frame| render_ui(frame, app))?;

        let Some(tui_event) = event_rx.recv().await else {
            break;
        };
        match tui_event {
            TuiEvent::Key(key) => {
                // Decide before the key reaches a popup; Enter that picks a file must not also run.
                let starts_run = key_starts_run(app, &key);
                if handle_key_event(app, key, &cwd) {
                    break;
                }
                if starts_run {
                    if let Some(document) = app.begin_run() {
                        spawn_run(document, opts, event_tx.clone());
                    }
                }
            }
            TuiEvent::Output(line) => app.push_output(line),
            TuiEvent::Finished(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "run failed");
                }
                app.finish_run(result);
            }
        }
    }

    Ok(())
}

/// Run the pipeline on a background task. Output lines and the final result
/// are posted back to the UI loop in order.
fn spawn_run(document: PathBuf, opts: &TuiOptions, tx: mpsc::UnboundedSender<TuiEvent>) {
    let job = Job {
        document,
        script: opts.script.clone(),
        mode: opts.mode.clone(),
    };
    let settings = opts.settings.clone();
    info!(document = %job.document.display(), "starting run from TUI");

    tokio::spawn(async move {
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let forward_tx = tx.clone();
        let forward = tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if forward_tx.send(TuiEvent::Output(line)).is_err() {
                    break;
                }
            }
        });

        let result = pipeline::run_job(&job, &settings, Some(line_tx)).await;
        // All senders are gone once run_job returns; wait so every line lands before Finished.
        let _ = forward.await;
        let _ = tx.send(TuiEvent::Finished(result));
    });
}

fn key_starts_run(app: &App, key: &KeyEvent) -> bool {
    key.kind == KeyEventKind::Press
        && !app.is_popup_shown()
        && !app.show_help
        && matches!(key.code, KeyCode::Enter | KeyCode::Char('p'))
}

/// Handle keyboard events. Returns true when the user asked to quit.
fn handle_key_event(app: &mut App, key: KeyEvent, cwd: &std::path::Path) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if matches!(app.popup_state, PopupState::Browser(_)) {
        handle_browser_key(app, key.code);
        return false;
    }
    if matches!(app.popup_state, PopupState::Error { .. }) {
        // Any key closes the dialog
        app.hide_popup();
        return false;
    }

    if app.show_help {
        app.toggle_help();
        return false;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::F(1) | KeyCode::Char('?') => app.toggle_help(),
        KeyCode::Char('o') => app.open_browser(cwd),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        _ => {}
    }
    false
}

fn handle_browser_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Esc => app.hide_popup(),
        KeyCode::Enter => app.browser_confirm(),
        KeyCode::Up | KeyCode::Char('k') => {
            if let Some(b) = app.browser_mut() {
                b.move_up();
            }
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if let Some(b) = app.browser_mut() {
                b.move_down();
            }
        }
        KeyCode::Backspace | KeyCode::Left => {
            if let Some(b) = app.browser_mut() {
                b.go_parent();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn quit_keys() {
        let mut app = App::new("database");
        let cwd = std::env::temp_dir();
        assert!(handle_key_event(&mut app, press(KeyCode::Char('q')), &cwd));
        assert!(handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
            &cwd
        ));
    }

    #[test]
    fn error_popup_swallows_the_next_key() {
        let mut app = App::new("database");
        app.show_error("Error", "boom".into());
        let cwd = std::env::temp_dir();
        assert!(!handle_key_event(&mut app, press(KeyCode::Char('q')), &cwd));
        assert!(!app.is_popup_shown());
    }

    #[test]
    fn enter_in_browser_picks_file_without_starting_a_run() {
        let tmp = tempfile::tempdir().unwrap();
        File::create(tmp.path().join("spec.docx")).unwrap();

        let mut app = App::new("database");
        handle_key_event(&mut app, press(KeyCode::Char('o')), tmp.path());
        handle_key_event(&mut app, press(KeyCode::Down), tmp.path());

        let enter = press(KeyCode::Enter);
        assert!(!key_starts_run(&app, &enter));
        handle_key_event(&mut app, enter, tmp.path());
        assert!(app.document.is_some());
        assert!(!app.is_running);
    }

    #[test]
    fn escape_cancels_browser_and_keeps_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = App::new("database");
        handle_key_event(&mut app, press(KeyCode::Char('o')), tmp.path());
        assert!(app.is_popup_shown());
        assert!(!handle_key_event(&mut app, press(KeyCode::Esc), tmp.path()));
        assert!(!app.is_popup_shown());
        assert!(app.document.is_none());
    }

    #[test]
    fn p_starts_a_run_on_the_selected_document() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("spec.docx");
        File::create(&doc).unwrap();

        let mut app = App::new("database");
        assert!(app.select_document(&doc));

        let p = press(KeyCode::Char('p'));
        assert!(key_starts_run(&app, &p));
        assert!(!handle_key_event(&mut app, p, tmp.path()));
        assert!(app.begin_run().is_some());
        assert!(app.is_running);
        // A second press while running does not start another run.
        assert!(app.begin_run().is_none());
    }

    #[test]
    fn p_is_ignored_behind_help_overlay() {
        let mut app = App::new("database");
        app.toggle_help();
        assert!(!key_starts_run(&app, &press(KeyCode::Char('p'))));
    }
}

#[cfg(all(test, unix))]
mod run_tests {
    use super::*;
    use crate::interpreter::InterpreterLocator;
    use std::fs;

    #[tokio::test]
    async fn background_run_posts_every_line_before_finishing() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("spec СО.docx");
        fs::File::create(&doc).unwrap();
        fs::write(
            tmp.path().join("parser.sh"),
            "for i in 1 2 3 4 5; do echo \"row $i\"; done\necho 'warn' >&2\n",
        )
        .unwrap();

        let opts = TuiOptions {
            document: None,
            script: "parser.sh".into(),
            mode: OutputMode::Database(crate::pipeline::DatabaseParams {
                host: "localhost".into(),
                port: "5432".into(),
                database: "cable_db".into(),
                user: "postgres".into(),
                password: "test1".into(),
            }),
            settings: RunSettings {
                locator: InterpreterLocator::new(vec![PathBuf::from("/bin/sh")], None),
                script_dir: tmp.path().to_path_buf(),
                timeout: Duration::from_secs(10),
            },
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_run(doc, &opts, tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let (last, before) = events.split_last().expect("at least one event");
        assert!(matches!(last, TuiEvent::Finished(Ok(_))), "{last:?}");
        assert!(before.iter().all(|e| matches!(e, TuiEvent::Output(_))));

        let mut stdout: Vec<&str> = Vec::new();
        let mut stderr: Vec<&str> = Vec::new();
        for event in before {
            if let TuiEvent::Output(line) = event {
                match line.stream {
                    crate::process::Stream::Stdout => stdout.push(&line.text),
                    crate::process::Stream::Stderr => stderr.push(&line.text),
                }
            }
        }
        assert_eq!(stdout, ["row 1", "row 2", "row 3", "row 4", "row 5"]);
        assert_eq!(stderr, ["warn"]);
    }
}
