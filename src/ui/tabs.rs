use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Tabs};

/// What the tab bar needs to know about one tab
pub struct TabLabel<'a> {
    pub title: &'a str,
    pub connected: bool,
}

pub fn draw_tab_bar(area: Rect, labels: &[TabLabel<'_>], active: usize, frame: &mut ratatui::Frame<'_>) {
    let titles: Vec<Line> = labels
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            let marker = if label.connected { "●" } else { "○" };
            let marker_color = if label.connected { Color::Green } else { Color::Red };
            Line::from(vec![
                Span::styled(format!("{} ", idx + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(marker, Style::default().fg(marker_color)),
                Span::raw(format!(" {}", label.title)),
            ])
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(active)
        .style(Style::default().fg(Color::Gray))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .divider(Span::styled("│", Style::default().fg(Color::DarkGray)));
    frame.render_widget(tabs, area);
}

/// Bottom line: the active tab's last error, otherwise the key hints.
pub fn draw_status_line(area: Rect, error: Option<&str>, frame: &mut ratatui::Frame<'_>) {
    let line = match error {
        Some(err) => Line::from(Span::styled(err.to_string(), Style::default().fg(Color::Red))),
        None => Line::from(Span::styled(
            "F1: Help  F2: Focus  F3: New Tab  F4: Close Tab  F5/F6: Prev/Next  F10: Quit",
            Style::default().fg(Color::White).add_modifier(Modifier::DIM),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}
