use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::time::Instant;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Widget};
use vt100::{Color as VtColor, Parser};

use crate::async_ssh_client::{PTY_INITIAL_COLS, PTY_INITIAL_ROWS};
use crate::config::manager::DEFAULT_TERMINAL_SCROLLBACK_LINES;

/// Screen state of one tab's remote terminal, rebuilt row by row only when
/// the row actually changed.
pub struct TerminalState {
    pub parser: Parser,
    pub last_change: Instant,
    cached_lines: Vec<Line<'static>>,
    row_hashes: Vec<u64>,
    cached_height: u16,
    cached_width: u16,
    cache_invalidated: bool,
}

impl Default for TerminalState {
    fn default() -> Self {
        Self::new(PTY_INITIAL_ROWS as u16, PTY_INITIAL_COLS as u16)
    }
}

impl TerminalState {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self::new_with_scrollback(rows, cols, DEFAULT_TERMINAL_SCROLLBACK_LINES)
    }

    pub fn new_with_scrollback(rows: u16, cols: u16, scrollback_limit: usize) -> Self {
        Self {
            parser: Parser::new(rows.max(1), cols.max(1), scrollback_limit.max(1)),
            last_change: Instant::now(),
            cached_lines: Vec::new(),
            row_hashes: Vec::new(),
            cached_height: 0,
            cached_width: 0,
            cache_invalidated: true,
        }
    }

    /// `(rows, cols)` of the emulated screen
    pub fn size(&self) -> (u16, u16) {
        self.parser.screen().size()
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.parser.set_size(rows.max(1), cols.max(1));
        self.last_change = Instant::now();
        self.invalidate_cache();
    }

    pub fn process_bytes(&mut self, data: &[u8]) {
        self.parser.process(data);
        self.last_change = Instant::now();
        self.invalidate_cache();
    }

    pub fn scroll_by(&mut self, delta_lines: i32) {
        let current = self.parser.screen().scrollback() as i32;
        let target = current.saturating_add(delta_lines).max(0) as usize;
        self.parser.set_scrollback(target);
        self.invalidate_cache();
    }

    pub fn scroll_to_bottom(&mut self) {
        if self.parser.screen().scrollback() > 0 {
            self.parser.set_scrollback(0);
            self.invalidate_cache();
        }
    }

    /// Visible text, one string per row, trailing blanks trimmed
    pub fn visible_text(&self) -> Vec<String> {
        let (_, cols) = self.size();
        self.parser
            .screen()
            .rows(0, cols)
            .map(|row| row.trim_end().to_string())
            .collect()
    }

    fn ensure_cache_dimensions(&mut self, height: u16, width: u16) {
        if self.cached_height != height || self.cached_width != width {
            self.cached_height = height;
            self.cached_width = width;
            self.cached_lines.resize(height as usize, Line::default());
            self.row_hashes.resize(height as usize, 0);
            self.invalidate_cache();
        }
    }

    fn invalidate_cache(&mut self) {
        self.cache_invalidated = true;
    }

    fn rebuild_cache(&mut self) {
        if !self.cache_invalidated {
            return;
        }
        let screen = self.parser.screen();
        for row in 0..self.cached_height {
            let row_idx = row as usize;
            let new_hash = compute_row_hash(screen, row, self.cached_width);
            if self.row_hashes[row_idx] != new_hash || self.cached_lines[row_idx].spans.is_empty() {
                self.cached_lines[row_idx] = build_line(screen, row, self.cached_width);
                self.row_hashes[row_idx] = new_hash;
            }
        }
        self.cache_invalidated = false;
    }

    fn cached_lines(&mut self, height: u16, width: u16) -> &[Line<'static>] {
        self.ensure_cache_dimensions(height, width);
        self.rebuild_cache();
        &self.cached_lines
    }
}

fn map_color(c: VtColor) -> Color {
    match c {
        VtColor::Default => Color::Reset,
        VtColor::Idx(n) => Color::Indexed(n),
        VtColor::Rgb(r, g, b) => Color::Rgb(r, g, b),
    }
}

/// Inner area the remote screen is drawn into for a pane at `area`
pub fn terminal_inner(area: Rect) -> Rect {
    Block::default().borders(Borders::TOP).inner(area)
}

pub fn draw_terminal(
    area: Rect,
    state: &mut TerminalState,
    title: &str,
    focused: bool,
    frame: &mut ratatui::Frame<'_>,
) {
    let color = if focused { Color::Cyan } else { Color::DarkGray };
    let term_block = Block::default()
        .borders(Borders::TOP)
        .title(title.to_string())
        .fg(color);
    frame.render_widget(&term_block, area);

    let inner = term_block.inner(area);
    let screen = state.parser.screen();
    let (cur_row, cur_col) = screen.cursor_position();
    let show_cursor = focused && !screen.hide_cursor() && screen.scrollback() == 0;
    let lines = state.cached_lines(inner.height, inner.width);
    frame.render_widget(CachedTerminalWidget { lines }, inner);

    if show_cursor && cur_row < inner.height && cur_col < inner.width {
        frame.set_cursor_position((inner.x + cur_col, inner.y + cur_row));
    }
}

struct CachedTerminalWidget<'a> {
    lines: &'a [Line<'static>],
}

impl Widget for CachedTerminalWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        buf.set_style(area, Style::default().bg(Color::Reset));
        let height = area.height.min(self.lines.len() as u16);
        for row in 0..height {
            buf.set_line(area.x, area.y + row, &self.lines[row as usize], area.width);
        }
    }
}

fn compute_row_hash(screen: &vt100::Screen, row: u16, width: u16) -> u64 {
    let mut hasher = DefaultHasher::new();
    for col in 0..width {
        match screen.cell(row, col) {
            Some(cell) => {
                hash_color(&mut hasher, cell.fgcolor());
                hash_color(&mut hasher, cell.bgcolor());
                hasher.write_u8(cell.bold() as u8);
                hasher.write_u8(cell.italic() as u8);
                hasher.write_u8(cell.underline() as u8);
                hasher.write_u8(cell.inverse() as u8);
                let contents = cell.contents();
                hasher.write_usize(contents.len());
                hasher.write(contents.as_bytes());
            }
            None => hasher.write_u8(0),
        }
    }
    hasher.finish()
}

fn hash_color(hasher: &mut DefaultHasher, color: VtColor) {
    match color {
        VtColor::Default => hasher.write_u8(0),
        VtColor::Idx(n) => {
            hasher.write_u8(1);
            hasher.write_u8(n);
        }
        VtColor::Rgb(r, g, b) => {
            hasher.write_u8(2);
            hasher.write_u8(r);
            hasher.write_u8(g);
            hasher.write_u8(b);
        }
    }
}

fn cell_style(cell: &vt100::Cell) -> Style {
    let mut style = Style::default()
        .fg(map_color(cell.fgcolor()))
        .bg(map_color(cell.bgcolor()));
    if cell.bold() {
        style = style.add_modifier(Modifier::BOLD);
    }
    if cell.italic() {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if cell.underline() {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if cell.inverse() {
        style = style.add_modifier(Modifier::REVERSED);
    }
    style
}

fn build_line(screen: &vt100::Screen, row: u16, width: u16) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut current_style = Style::default();
    let mut current_text = String::new();

    for col in 0..width {
        let (style, text) = match screen.cell(row, col) {
            // the wide character itself already covered this column
            Some(cell) if cell.is_wide_continuation() => continue,
            Some(cell) => {
                let contents = cell.contents();
                let to_append: &str = if contents.is_empty() { " " } else { &contents };
                (cell_style(cell), to_append.to_string())
            }
            None => (Style::default(), " ".to_string()),
        };

        if style != current_style && !current_text.is_empty() {
            spans.push(Span::styled(std::mem::take(&mut current_text), current_style));
        }
        current_style = style;
        current_text.push_str(&text);
    }
    if !current_text.is_empty() {
        spans.push(Span::styled(current_text, current_style));
    }

    Line::from(spans)
}
