//! Remote file browser pane shown beside a tab's terminal.

use std::path::PathBuf;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use tui_textarea::TextArea;

use crate::error::Result;
use crate::filesystem::{FileEntry, join_remote};

/// Per-tab browser state: remote cwd, its entries and the local side of transfers.
#[derive(Clone, Debug)]
pub struct FileBrowserState {
    /// `.` until the first listing resolves it to an absolute path
    pub cwd: String,
    pub entries: Vec<FileEntry>,
    pub selected: usize,
    /// Where downloads land
    pub local_dir: PathBuf,
    /// Present while asking for the local file to upload
    pub upload_input: Option<TextArea<'static>>,
    pub status: Option<String>,
    pub loading: bool,
}

impl FileBrowserState {
    pub fn new(local_dir: PathBuf) -> Self {
        Self {
            cwd: ".".to_string(),
            entries: Vec::new(),
            selected: 0,
            local_dir,
            upload_input: None,
            status: None,
            loading: false,
        }
    }

    pub fn select_next(&mut self) {
        if !self.entries.is_empty() {
            self.selected = (self.selected + 1).min(self.entries.len() - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_entry(&self) -> Option<&FileEntry> {
        self.entries.get(self.selected)
    }

    /// Remote path of `name` inside the current directory
    pub fn child_path(&self, name: &str) -> String {
        join_remote(&self.cwd, name)
    }

    pub fn parent_path(&self) -> String {
        match self.cwd.as_str() {
            "/" => "/".to_string(),
            "." | "" => "..".to_string(),
            cwd => match cwd.trim_end_matches('/').rsplit_once('/') {
                Some(("", _)) => "/".to_string(),
                Some((parent, _)) => parent.to_string(),
                None => ".".to_string(),
            },
        }
    }

    /// Applies a finished listing of `path`. On failure the current
    /// directory and entries stay as they were.
    pub fn apply_listing(&mut self, path: String, result: Result<Vec<FileEntry>>) {
        self.loading = false;
        match result {
            Ok(mut entries) => {
                entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
                self.cwd = path;
                self.entries = entries;
                self.selected = 0;
                self.status = None;
            }
            Err(e) => {
                tracing::warn!("Listing {} failed: {}", path, e);
                self.status = Some(format!("Cannot list {path}: {e}"));
            }
        }
    }

    pub fn begin_upload(&mut self) {
        let mut input = TextArea::default();
        input.set_placeholder_text("Local file to upload");
        input.set_cursor_line_style(Style::default());
        self.upload_input = Some(input);
    }

    pub fn cancel_upload(&mut self) {
        self.upload_input = None;
    }

    /// Closes the upload prompt, returning the typed path when non-empty.
    pub fn take_upload_path(&mut self) -> Option<String> {
        let input = self.upload_input.take()?;
        let text = input.lines().first().map(|l| l.trim().to_string())?;
        (!text.is_empty()).then_some(text)
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }
}

fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size}{}", UNITS[0])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

fn entry_item(entry: &FileEntry) -> ListItem<'static> {
    let (name, style) = if entry.is_dir {
        (
            format!("{}/", entry.name),
            Style::default().fg(Color::LightBlue).add_modifier(Modifier::BOLD),
        )
    } else if entry.is_symlink {
        (format!("{}@", entry.name), Style::default().fg(Color::Cyan))
    } else {
        (entry.name.clone(), Style::default().fg(Color::White))
    };
    let modified = entry
        .modified
        .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    ListItem::new(Line::from(vec![
        Span::styled(format!("{:o} ", entry.mode), Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{:>7} ", format_size(entry.size)), Style::default().fg(Color::Gray)),
        Span::styled(format!("{modified:<16} "), Style::default().fg(Color::DarkGray)),
        Span::styled(name, style),
    ]))
}

/// Draw the browser pane; `focused` highlights the border and selection.
pub fn draw_file_browser(f: &mut Frame, area: Rect, state: &FileBrowserState, focused: bool) {
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let title = if state.loading {
        format!(" Remote | {} (loading...) ", state.cwd)
    } else {
        format!(" Remote | {} ", state.cwd)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border_style);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let prompt_h = if state.upload_input.is_some() { 3 } else { 0 };
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(prompt_h),
            Constraint::Length(1), // status
            Constraint::Length(1), // hints
        ])
        .split(inner);

    let items: Vec<ListItem> = state.entries.iter().map(entry_item).collect();
    let highlight = if focused {
        Style::default().fg(Color::Black).bg(Color::Cyan)
    } else {
        Style::default().add_modifier(Modifier::REVERSED)
    };
    let list = List::new(items).highlight_style(highlight);
    let mut list_state = ListState::default();
    if !state.entries.is_empty() {
        list_state.select(Some(state.selected));
    }
    f.render_stateful_widget(list, layout[0], &mut list_state);

    if let Some(input) = &state.upload_input {
        let mut input = input.clone();
        input.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Upload into {}", state.cwd))
                .border_style(Style::default().fg(Color::Yellow)),
        );
        f.render_widget(&input, layout[1]);
    }

    let status = state.status.clone().unwrap_or_else(|| format!("Downloads to {}", state.local_dir.display()));
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(status, Style::default().fg(Color::Yellow)))),
        layout[2],
    );

    let hints = if state.upload_input.is_some() {
        "Enter: Upload | Esc: Cancel"
    } else {
        "↑↓: Move | Enter: Open | Backspace: Up | r: Refresh | d: Download | u: Upload"
    };
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            hints,
            Style::default().fg(Color::White).add_modifier(Modifier::DIM),
        ))),
        layout[3],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn entry(name: &str, is_dir: bool) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            size: 10,
            mode: if is_dir { 0o755 } else { 0o644 },
            modified: None,
            is_dir,
            is_symlink: false,
        }
    }

    #[test]
    fn listing_sorts_directories_first_and_resets_selection() {
        let mut state = FileBrowserState::new(PathBuf::from("/tmp"));
        state.selected = 3;
        state.loading = true;
        state.apply_listing(
            "/home/alice".into(),
            Ok(vec![entry("b.txt", false), entry("src", true), entry("a.txt", false)]),
        );
        let names: Vec<_> = state.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["src", "a.txt", "b.txt"]);
        assert_eq!(state.cwd, "/home/alice");
        assert_eq!(state.selected, 0);
        assert!(!state.loading);
    }

    #[test]
    fn failed_listing_keeps_current_directory() {
        let mut state = FileBrowserState::new(PathBuf::from("/tmp"));
        state.apply_listing("/srv".into(), Ok(vec![entry("data", true)]));
        state.apply_listing(
            "/root".into(),
            Err(AppError::SshConnectionError("permission denied".into())),
        );
        assert_eq!(state.cwd, "/srv");
        assert_eq!(state.entries.len(), 1);
        assert!(state.status.as_deref().is_some_and(|s| s.contains("/root")));
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut state = FileBrowserState::new(PathBuf::from("/tmp"));
        state.select_next();
        assert_eq!(state.selected, 0);
        state.apply_listing("/".into(), Ok(vec![entry("a", false), entry("b", false)]));
        state.select_next();
        state.select_next();
        assert_eq!(state.selected, 1);
        state.select_prev();
        state.select_prev();
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn test_parent_path() {
        let mut state = FileBrowserState::new(PathBuf::from("/tmp"));
        assert_eq!(state.parent_path(), "..");
        for (cwd, parent) in [("/", "/"), ("/etc", "/"), ("/home/alice", "/home"), ("/home/alice/", "/home")] {
            state.cwd = cwd.to_string();
            assert_eq!(state.parent_path(), parent, "{cwd}");
        }
        state.cwd = "/srv".into();
        assert_eq!(state.child_path("www"), "/srv/www");
    }

    #[test]
    fn upload_prompt_yields_trimmed_path() {
        let mut state = FileBrowserState::new(PathBuf::from("/tmp"));
        state.begin_upload();
        if let Some(input) = state.upload_input.as_mut() {
            input.insert_str("  ./notes.txt ");
        }
        assert_eq!(state.take_upload_path().as_deref(), Some("./notes.txt"));
        assert!(state.upload_input.is_none());

        state.begin_upload();
        assert_eq!(state.take_upload_path(), None);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.0K");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0M");
    }
}
