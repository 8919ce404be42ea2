use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crate::connect::PendingConnection;

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

fn dim_hint(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::White).add_modifier(Modifier::DIM),
    ))
}

fn message_popup(area: Rect, title: &str, message: &str, color: Color, frame: &mut ratatui::Frame<'_>) {
    let popup_w = area.width.saturating_sub(4);
    let inner_w = popup_w.saturating_sub(2).max(1);
    let estimated_lines: u16 = message
        .lines()
        .map(|l| (l.chars().count() as u16).div_ceil(inner_w).max(1))
        .sum();
    // title + message + spacer + hint
    let popup_h = (estimated_lines.max(1) + 4).min(area.height.saturating_sub(2));
    let popup = centered(area, popup_w, popup_h);

    frame.render_widget(Clear, popup);
    let block = Block::default().borders(Borders::ALL).title(Line::from(Span::styled(
        title.to_string(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )));
    let body = Paragraph::new(vec![
        Line::from(Span::styled(message.to_string(), Style::default().fg(color))),
        Line::from(Span::raw("")),
        dim_hint("Press Enter or Esc to dismiss"),
    ])
    .wrap(Wrap { trim: true })
    .block(block);
    frame.render_widget(body, popup);
}

pub fn draw_error_popup(area: Rect, message: &str, frame: &mut ratatui::Frame<'_>) {
    message_popup(area, "Error", message, Color::Red, frame);
}

pub fn draw_info_popup(area: Rect, message: &str, frame: &mut ratatui::Frame<'_>) {
    message_popup(area, "Info", message, Color::Green, frame);
}

/// Asks whether to trust the host key of a paused connect attempt.
pub fn draw_host_key_popup(area: Rect, pending: &PendingConnection, frame: &mut ratatui::Frame<'_>) {
    let popup = centered(area, area.width.saturating_sub(10).max(60), 11);
    frame.render_widget(Clear, popup);

    let (title, color) = if pending.mismatch {
        ("Host Key Changed", Color::Red)
    } else {
        ("Unknown Host Key", Color::Yellow)
    };
    let block = Block::default().borders(Borders::ALL).title(Line::from(Span::styled(
        title,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )));
    frame.render_widget(block, popup);

    let inner = popup.inner(Margin::new(1, 1));
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // host
            Constraint::Length(1), // algorithm
            Constraint::Length(1), // fingerprint
            Constraint::Length(1),
            Constraint::Length(2), // warning
            Constraint::Min(0),
            Constraint::Length(1), // buttons
        ])
        .split(inner);

    let host_label = if pending.on_jump_host { "Jump host: " } else { "Host: " };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(host_label, Style::default().fg(Color::Gray)),
            Span::styled(
                pending.host_port.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ])),
        layout[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Key type: ", Style::default().fg(Color::Gray)),
            Span::raw(pending.key.algorithm().to_string()),
        ])),
        layout[1],
    );
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Fingerprint: ", Style::default().fg(Color::Gray)),
            Span::styled(pending.fingerprint.clone(), Style::default().fg(Color::Cyan)),
        ])),
        layout[2],
    );

    let warning = if pending.mismatch {
        "WARNING: this key differs from the one in known_hosts. Someone may be intercepting the connection."
    } else {
        "The authenticity of this host cannot be established. Trusting it adds the key to known_hosts."
    };
    frame.render_widget(
        Paragraph::new(Span::styled(warning, Style::default().fg(color))).wrap(Wrap { trim: true }),
        layout[4],
    );

    let buttons = Paragraph::new(Line::from(vec![
        Span::styled("Y", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Span::styled(" - Trust and connect   ", Style::default().fg(Color::White)),
        Span::styled("N", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        Span::styled("/", Style::default().fg(Color::White)),
        Span::styled("Esc", Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
        Span::styled(" - Reject", Style::default().fg(Color::White)),
    ]))
    .alignment(Alignment::Center);
    frame.render_widget(buttons, layout[6]);
}

const HELP_LINES: [(&str, &str); 12] = [
    ("F1", "Toggle this help"),
    ("F2", "Switch focus between terminal and file browser"),
    ("F3", "New connection tab"),
    ("F4", "Close the current tab"),
    ("F5 / F6", "Previous / next tab"),
    ("F10", "Quit"),
    ("Alt+F1..F12", "Send the function key to the remote shell"),
    ("Shift+PgUp/PgDn", "Scroll terminal history"),
    ("Enter / Backspace", "Browser: open directory / go up"),
    ("r", "Browser: refresh listing"),
    ("d", "Browser: download selected file"),
    ("u", "Browser: upload a local file"),
];

pub fn draw_help_popup(area: Rect, frame: &mut ratatui::Frame<'_>) {
    let popup = centered(area, 64, HELP_LINES.len() as u16 + 4);
    frame.render_widget(Clear, popup);

    let mut lines: Vec<Line> = HELP_LINES
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(
                    format!("{key:>18}  "),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::raw(*action),
            ])
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(dim_hint("Press F1 or Esc to close"));

    let block = Block::default().borders(Borders::ALL).title(Line::from(Span::styled(
        "Keys",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )));
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}
