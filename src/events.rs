//! Screen state shared between input handling and rendering.

/// Screen currently shown in the console.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// Gallery list with indexing progress.
    Main,
    /// Full status record of the selected gallery.
    Detail,
}

/// UI state shared with the renderer.
#[derive(Clone, Debug)]
pub struct UiState {
    /// Current screen.
    pub screen: Screen,
    /// Selected row in the gallery list.
    pub selected: usize,
    /// Messages shown in the side panel.
    pub log: Vec<String>,
    /// Status bar text.
    pub status: String,
    /// Error message (highlighted).
    pub error: Option<String>,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Main,
            selected: 0,
            log: vec![],
            status: "Ready".into(),
            error: None,
        }
    }

    /// Append to the log panel, keeping it bounded.
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
        if self.log.len() > 200 {
            let excess = self.log.len() - 200;
            self.log.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded() {
        let mut ui = UiState::new();
        for i in 0..250 {
            ui.push_log(format!("line {i}"));
        }
        assert_eq!(ui.log.len(), 200);
        assert_eq!(ui.log[0], "line 50");
    }
}
