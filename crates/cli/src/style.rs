//! Shared styling utilities for terminal output.

use console::Style;

use viewsync_core::models::{ItemStatus, LockState};

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// File status, colored by how much attention it needs.
pub fn status(status: ItemStatus) -> String {
    let style = match status {
        ItemStatus::Current => Style::new().green(),
        ItemStatus::Modified => Style::new().cyan(),
        ItemStatus::OutOfDate => Style::new().yellow(),
        ItemStatus::Merge => Style::new().red().bold(),
        ItemStatus::Unknown => Style::new().magenta(),
    };
    style.apply_to(status.to_string()).to_string()
}

pub fn lock(lock: LockState) -> String {
    match lock {
        LockState::Unlocked => dim("unlocked"),
        LockState::NonExclusive => Style::new().yellow().apply_to("locked").to_string(),
    }
}
