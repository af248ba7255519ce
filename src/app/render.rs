//! Drawing for the console screens.

use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Paragraph, Row, Table, TableState, Wrap},
};

use crate::{
    events::Screen,
    gallery::IndexState,
    jobs::GalleryRow,
    layout,
    shortcuts::Shortcuts,
};

use super::App;

/// Draw the whole screen.
pub fn draw(f: &mut Frame, app: &App) {
    let main_layout = layout::create_main_layout(f.area());
    let body_layout = layout::create_body_layout(main_layout.body);

    let rows = app.galleries.iter().map(|g| {
        Row::new(vec![
            g.album_code.clone(),
            g.photos.to_string(),
            if g.enabled { "yes" } else { "no" }.to_string(),
            g.status.status.label().to_string(),
            format!("{}%", g.percent()),
            eta_str(g),
            if g.running { "*" } else { "" }.to_string(),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Min(12),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(4),
        ],
    )
    .block(Block::default().borders(Borders::ALL).title("GALLERIES"))
    .header(
        Row::new(vec![
            "album", "photos", "enabled", "status", "done", "eta", "run",
        ])
        .bold(),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(255, 140, 0))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    );

    let mut table_state = TableState::default();
    if !app.galleries.is_empty() {
        table_state.select(Some(app.ui.selected));
    }
    f.render_stateful_widget(table, body_layout.galleries, &mut table_state);

    let (title, info_text) = match app.ui.screen {
        Screen::Detail => ("DETAIL", build_detail_text(app)),
        Screen::Main => ("INFO", build_main_info_text(app)),
    };
    let info_panel = Paragraph::new(info_text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: true });
    f.render_widget(info_panel, body_layout.side_panel);

    let help_bar = Paragraph::new(get_help_text(&app.ui.screen, &app.shortcuts))
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    f.render_widget(build_status_bar(app), main_layout.status_bar);
}

fn build_main_info_text(app: &App) -> String {
    let selected = app
        .selected()
        .map(|g| g.album_code.as_str())
        .unwrap_or("-");
    format!(
        "Selected: {}\nStore: {}\nFace service: {}\n\nLog:\n{}",
        selected,
        app.cfg.store.path,
        if app.cfg.face_service_configured() {
            app.cfg.face_service.endpoint.as_str()
        } else {
            "(not configured)"
        },
        recent_log(app, 10),
    )
}

/// Full status record of the selected gallery.
fn build_detail_text(app: &App) -> String {
    let Some(g) = app.selected() else {
        return "No gallery selected".to_string();
    };
    let s = &g.status;
    let updated = s
        .last_updated
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "Album: {}\nPhotos: {}\nIndexing enabled: {}\nRunning: {}\n\nStatus: {}\nProcessed: {}/{}\nFaces indexed: {}\nReady to send: {}\nETA: {}\nUpdated: {}\n\nLog:\n{}",
        g.album_code,
        g.photos,
        g.enabled,
        g.running,
        s.status.label(),
        s.indexed_photos,
        s.total_photos,
        s.faces_indexed,
        s.is_ready_to_send,
        eta_str(g),
        updated,
        recent_log(app, 6),
    )
}

fn recent_log(app: &App, n: usize) -> String {
    let skip = app.ui.log.len().saturating_sub(n);
    app.ui.log[skip..].join("\n")
}

fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::Main => "Main",
        Screen::Detail => "Detail",
    };

    let summary = format!(
        "Galleries: {}, {} running, {} finished, {} ready",
        app.galleries.len(),
        app.galleries.iter().filter(|g| g.running).count(),
        app.galleries
            .iter()
            .filter(|g| g.status.status.is_terminal())
            .count(),
        app.galleries
            .iter()
            .filter(|g| g.status.is_ready_to_send)
            .count()
    );

    let status_text = if let Some(err) = &app.ui.error {
        format!("[{}] {} | ERROR: {}", screen_name, summary, err)
    } else {
        format!("[{}] {} | {}", screen_name, summary, app.ui.status)
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });

    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }

    status_bar
}

fn get_help_text(screen: &Screen, shortcuts: &Shortcuts) -> String {
    match screen {
        Screen::Main => format!(
            "{}: quit | {}: refresh | {}: start | {}: stop | {}: detail | {}/{}: navigate",
            format_keys(&shortcuts.main.quit),
            format_keys(&shortcuts.main.refresh),
            format_keys(&shortcuts.main.start),
            format_keys(&shortcuts.main.stop),
            format_keys(&shortcuts.main.detail),
            format_keys(&shortcuts.main.up),
            format_keys(&shortcuts.main.down)
        ),
        Screen::Detail => format!(
            "{}: back | {}: start | {}: stop",
            format_keys(&shortcuts.detail.back),
            format_keys(&shortcuts.detail.start),
            format_keys(&shortcuts.detail.stop)
        ),
    }
}

fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

/// ETA column: minutes while in progress, blank otherwise.
fn eta_str(g: &GalleryRow) -> String {
    match g.status.status {
        IndexState::InProgress => format!("{}m", g.status.estimated_time_remaining),
        _ => "-".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::IndexingStatus;

    #[test]
    fn eta_only_shown_while_in_progress() {
        let mut row = GalleryRow {
            album_code: "g".into(),
            photos: 10,
            enabled: true,
            status: IndexingStatus::default(),
            running: false,
        };
        row.status.estimated_time_remaining = 3;
        assert_eq!(eta_str(&row), "-");
        row.status.status = IndexState::InProgress;
        assert_eq!(eta_str(&row), "3m");
    }

    #[test]
    fn help_lists_detail_bindings() {
        let text = get_help_text(&Screen::Detail, &Shortcuts::default());
        assert_eq!(text, "Esc: back | s: start | x: stop");
    }
}
