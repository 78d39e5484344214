//! UI layout and rendering logic for the TUI.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::app::{App, PopupState};
use crate::selector::{Browser, EntryKind};

/// Render the main UI
pub fn render_ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Selected document
            Constraint::Min(3),    // Script output
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_document_area(frame, app, main_layout[0]);
    render_output_area(frame, app, main_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    if app.show_help {
        render_help_overlay(frame);
    }

    match &app.popup_state {
        PopupState::Browser(browser) => render_browser_popup(frame, browser),
        PopupState::Error { title, message } => render_error_popup(frame, title, message),
        PopupState::None => {}
    }
}

fn render_document_area(frame: &mut Frame, app: &App, area: Rect) {
    let text = match &app.document {
        Some(doc) => Line::from(doc.display().to_string()),
        None => Line::from(Span::styled(
            "no file selected (press o)",
            Style::default().fg(Color::DarkGray),
        )),
    };
    let title = format!("Specification file | output: {}", app.mode_label);
    let paragraph = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, area);
}

fn render_output_area(frame: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = app
        .output
        .iter()
        .map(|l| {
            let style = if l.starts_with("ERROR: ") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Line::from(Span::styled(l.as_str(), style))
        })
        .collect();

    let available_height = area.height.saturating_sub(2) as usize; // Account for borders
    let total_lines = lines.len();

    let mut paragraph = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("Script output"))
        .wrap(Wrap { trim: false });

    if total_lines > available_height {
        // Offset 0 follows the tail
        let max_scroll = total_lines - available_height;
        let offset = app.output_scroll_offset.min(max_scroll);
        paragraph = paragraph.scroll(((max_scroll - offset) as u16, 0));
    }

    frame.render_widget(paragraph, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let hint = if app.is_running {
        "running..."
    } else {
        "o=open  enter/p=process  ?=help  q=quit"
    };
    let text = format!("{} | {}", app.status_message, hint);
    let style = if app.status_message.starts_with("Import failed") {
        Style::default().bg(Color::Red).fg(Color::White)
    } else {
        Style::default().bg(Color::DarkGray).fg(Color::White)
    };
    frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_help_overlay(frame: &mut Frame) {
    let popup_area = centered_rect(60, 50, frame.area());
    frame.render_widget(Clear, popup_area);

    let help_lines = vec![
        Line::from("Keys"),
        Line::from(""),
        Line::from("  o          - Choose a .docx file"),
        Line::from("  Enter / p  - Process the selected file"),
        Line::from("  ↑/↓        - Scroll script output"),
        Line::from("  ? / F1     - Toggle this help"),
        Line::from("  q / Ctrl+C - Quit"),
        Line::from(""),
        Line::from("File picker"),
        Line::from(""),
        Line::from("  ↑/↓ j/k    - Move"),
        Line::from("  Enter      - Open folder / choose file"),
        Line::from("  Backspace  - Parent folder"),
        Line::from("  Esc        - Cancel"),
    ];

    let help_paragraph = Paragraph::new(Text::from(help_lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .title_style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(help_paragraph, popup_area);
}

fn render_browser_popup(frame: &mut Frame, browser: &Browser) {
    let popup_area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, popup_area);

    let items: Vec<ListItem> = browser
        .entries()
        .iter()
        .map(|e| {
            let (label, style) = match e.kind {
                EntryKind::Parent => ("../".to_string(), Style::default().fg(Color::Yellow)),
                EntryKind::Directory => (format!("{}/", e.name), Style::default().fg(Color::Blue)),
                EntryKind::Document => (e.name.clone(), Style::default()),
            };
            ListItem::new(Span::styled(label, style))
        })
        .collect();

    let title = match browser.error() {
        Some(err) => format!("Open (*.docx) - {err}"),
        None => format!("Open (*.docx) - {}", browser.dir().display()),
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(browser.cursor()));
    frame.render_stateful_widget(list, popup_area, &mut state);
}

fn render_error_popup(frame: &mut Frame, title: &str, message: &str) {
    let popup_area = centered_rect(70, 50, frame.area());
    frame.render_widget(Clear, popup_area);

    let mut lines: Vec<Line> = message.lines().map(Line::from).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press any key to close",
        Style::default().fg(Color::DarkGray),
    )));

    let paragraph = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string())
                .title_style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, popup_area);
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn rendered(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| render_ui(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer.content.iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn shows_initial_status() {
        let app = App::new("database");
        let screen = rendered(&app);
        assert!(screen.contains("Select a specification file"));
        assert!(screen.contains("no file selected"));
    }

    #[test]
    fn shows_error_popup() {
        let mut app = App::new("database");
        app.show_error("Import error", "bad format".into());
        let screen = rendered(&app);
        assert!(screen.contains("bad format"));
        assert!(screen.contains("Press any key"));
    }
}
