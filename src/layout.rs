//! Layout helpers for the console.

use ratatui::prelude::*;

/// Top-level regions of the main screen.
pub struct MainLayout {
    /// Gallery table + side panel.
    pub body: Rect,
    pub help_bar: Rect,
    pub status_bar: Rect,
}

/// Body split into the gallery table and the side panel.
pub struct BodyLayout {
    pub galleries: Rect,
    pub side_panel: Rect,
}

pub fn create_main_layout(area: Rect) -> MainLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    MainLayout {
        body: chunks[0],
        help_bar: chunks[1],
        status_bar: chunks[2],
    }
}

/// Galleries take 65% of the width, the side panel the rest.
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    BodyLayout {
        galleries: chunks[0],
        side_panel: chunks[1],
    }
}
