//! Console key bindings, loaded from `shortcut.toml`.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All key bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortcuts {
    pub main: MainShortcuts,
    pub detail: DetailShortcuts,
}

/// Gallery list bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainShortcuts {
    pub quit: Vec<String>,
    pub refresh: Vec<String>,
    pub start: Vec<String>,
    pub stop: Vec<String>,
    pub detail: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
}

/// Gallery detail bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailShortcuts {
    pub back: Vec<String>,
    pub start: Vec<String>,
    pub stop: Vec<String>,
}

impl Shortcuts {
    /// Load from TOML, falling back to defaults when the file is missing.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            main: MainShortcuts {
                quit: vec!["q".into()],
                refresh: vec!["r".into()],
                start: vec!["s".into()],
                stop: vec!["x".into()],
                detail: vec!["Enter".into()],
                down: vec!["Down".into(), "j".into()],
                up: vec!["Up".into(), "k".into()],
            },
            detail: DetailShortcuts {
                back: vec!["Esc".into()],
                start: vec!["s".into()],
                stop: vec!["x".into()],
            },
        }
    }
}

/// True if the key matches any of the binding strings.
pub fn matches_shortcut(key: &KeyEvent, shortcuts: &[String]) -> bool {
    shortcuts.iter().any(|s| matches_single_shortcut(key, s))
}

/// Match one binding such as `"Ctrl+u"`, `"a"` or `"Enter"`.
fn matches_single_shortcut(key: &KeyEvent, binding: &str) -> bool {
    let (mods, name) = match binding.rsplit_once('+') {
        Some((m, n)) if !n.is_empty() => (m, n),
        _ => ("", binding),
    };

    let mut expected = KeyModifiers::empty();
    for m in mods.split('+').filter(|m| !m.is_empty()) {
        expected |= match m.to_ascii_lowercase().as_str() {
            "ctrl" => KeyModifiers::CONTROL,
            "alt" => KeyModifiers::ALT,
            "shift" => KeyModifiers::SHIFT,
            _ => return false,
        };
    }

    key.modifiers == expected && key_code(name).is_some_and(|c| c == key.code)
}

/// Named keys, or a single character.
fn key_code(name: &str) -> Option<KeyCode> {
    let code = match name.to_ascii_lowercase().as_str() {
        "enter" => KeyCode::Enter,
        "esc" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        _ => {
            let mut chars = name.chars();
            let c = chars.next()?;
            return chars.next().is_none().then_some(KeyCode::Char(c));
        }
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    #[test]
    fn default_bindings_drive_the_console() {
        let sc = Shortcuts::default();
        assert!(matches_shortcut(&key(KeyCode::Char('s')), &sc.main.start));
        assert!(matches_shortcut(&key(KeyCode::Char('x')), &sc.main.stop));
        assert!(matches_shortcut(&key(KeyCode::Enter), &sc.main.detail));
        assert!(matches_shortcut(&key(KeyCode::Esc), &sc.detail.back));
        assert!(!matches_shortcut(&key(KeyCode::Char('s')), &sc.main.quit));
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let ctrl_r = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert!(matches_shortcut(&ctrl_r, &[String::from("Ctrl+r")]));
        assert!(!matches_shortcut(&ctrl_r, &[String::from("r")]));
        assert!(!matches_shortcut(&key(KeyCode::Char('r')), &[String::from("Hyper+r")]));
    }

    #[test]
    fn alternatives_and_arrows() {
        let sc = Shortcuts::default();
        assert!(matches_shortcut(&key(KeyCode::Up), &sc.main.up));
        assert!(matches_shortcut(&key(KeyCode::Char('k')), &sc.main.up));
        assert!(!matches_shortcut(&key(KeyCode::Char('j')), &sc.main.up));
    }

    #[test]
    fn bindings_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shortcut.toml");
        assert_eq!(Shortcuts::load_or_default(&path).unwrap().main.quit, vec!["q"]);

        let mut custom = Shortcuts::default();
        custom.main.start = vec!["i".into()];
        std::fs::write(&path, toml::to_string_pretty(&custom).unwrap()).unwrap();
        let loaded = Shortcuts::load_or_default(&path).unwrap();
        assert_eq!(loaded.main.start, vec!["i"]);
    }
}
