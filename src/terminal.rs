use colored::{ColoredString, Colorize};

/// Semantic colour classes for terminal output. Presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Info,
    Success,
    Warning,
    Error,
}

pub fn paint(style: Style, text: &str) -> ColoredString {
    match style {
        Style::Info => text.blue(),
        Style::Success => text.green(),
        Style::Warning => text.yellow(),
        Style::Error => text.red(),
    }
}

pub fn set_color_enabled(enabled: bool) {
    if enabled {
        colored::control::unset_override();
    } else {
        colored::control::set_override(false);
    }
}

pub const FAREWELL: &str = "\n\nExiting...";
