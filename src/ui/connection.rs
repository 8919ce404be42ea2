use std::path::Path;

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use tui_textarea::TextArea;

use crate::config::manager::{Connection, Target};
use crate::error::{AppError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FocusField {
    Host,
    Port,
    Username,
    Password,
    PrivateKeyPath,
    JumpHost,
    HostKeyAlgorithms,
    AcceptUnknownHostKeys,
}

const FIELD_ORDER: [FocusField; 8] = [
    FocusField::Host,
    FocusField::Port,
    FocusField::Username,
    FocusField::Password,
    FocusField::PrivateKeyPath,
    FocusField::JumpHost,
    FocusField::HostKeyAlgorithms,
    FocusField::AcceptUnknownHostKeys,
];

fn input(placeholder: &str) -> TextArea<'static> {
    let mut textarea = TextArea::default();
    textarea.set_placeholder_text(placeholder);
    textarea.set_cursor_line_style(Style::default());
    textarea
}

fn value(textarea: &TextArea<'_>) -> String {
    textarea.lines().first().cloned().unwrap_or_default()
}

fn replace(textarea: &mut TextArea<'static>, text: &str) {
    textarea.delete_line_by_head();
    textarea.delete_line_by_end();
    textarea.insert_str(text);
}

/// The connection screen's input fields
#[derive(Clone, Debug)]
pub struct ConnectionForm {
    pub host: TextArea<'static>,
    pub port: TextArea<'static>,
    pub username: TextArea<'static>,
    pub password: TextArea<'static>,
    pub private_key_path: TextArea<'static>,
    pub jump_host: TextArea<'static>,
    pub host_key_algorithms: TextArea<'static>,
    pub accept_unknown_host_keys: bool,
    pub focus: FocusField,
}

impl ConnectionForm {
    pub fn new(default_port: u16) -> Self {
        let mut password = input("Enter password");
        password.set_mask_char('*');
        Self {
            host: input("Enter hostname or IP address"),
            port: input(&default_port.to_string()),
            username: input("Enter username"),
            password,
            private_key_path: input("~/.ssh/id_ed25519 (password or key required)"),
            jump_host: input("[user@]host[:port] (optional)"),
            host_key_algorithms: input("ssh-ed25519,rsa-sha2-256 (optional)"),
            accept_unknown_host_keys: false,
            focus: FocusField::Host,
        }
    }

    /// Fills host, port and user from a `[user@]host[:port]` destination.
    pub fn prefill(&mut self, target: &Target) {
        replace(&mut self.host, &target.host);
        replace(&mut self.port, &target.port.to_string());
        if let Some(user) = &target.user {
            replace(&mut self.username, user);
            self.focus = FocusField::Password;
        } else {
            self.focus = FocusField::Username;
        }
    }

    pub fn next(&mut self) {
        let idx = FIELD_ORDER.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = FIELD_ORDER[(idx + 1) % FIELD_ORDER.len()];
    }

    pub fn prev(&mut self) {
        let idx = FIELD_ORDER.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = FIELD_ORDER[(idx + FIELD_ORDER.len() - 1) % FIELD_ORDER.len()];
    }

    /// Text input under focus; `None` on the checkbox.
    pub fn focused_textarea_mut(&mut self) -> Option<&mut TextArea<'static>> {
        match self.focus {
            FocusField::Host => Some(&mut self.host),
            FocusField::Port => Some(&mut self.port),
            FocusField::Username => Some(&mut self.username),
            FocusField::Password => Some(&mut self.password),
            FocusField::PrivateKeyPath => Some(&mut self.private_key_path),
            FocusField::JumpHost => Some(&mut self.jump_host),
            FocusField::HostKeyAlgorithms => Some(&mut self.host_key_algorithms),
            FocusField::AcceptUnknownHostKeys => None,
        }
    }

    pub fn toggle_accept_unknown(&mut self) {
        self.accept_unknown_host_keys = !self.accept_unknown_host_keys;
    }

    /// Builds and validates the descriptor for a connect attempt.
    pub fn to_connection(&self, default_port: u16, known_hosts_path: Option<&Path>) -> Result<Connection> {
        let port_text = value(&self.port);
        let port = if port_text.trim().is_empty() {
            default_port
        } else {
            port_text
                .trim()
                .parse::<u16>()
                .map_err(|_| AppError::ValidationError("Port must be a number".into()))?
        };

        let optional = |textarea: &TextArea<'_>| {
            let text = value(textarea).trim().to_string();
            (!text.is_empty()).then_some(text)
        };

        let connection = Connection {
            host: value(&self.host).trim().to_string(),
            port,
            username: value(&self.username).trim().to_string(),
            password: Some(value(&self.password)).filter(|p| !p.is_empty()),
            private_key_path: optional(&self.private_key_path),
            jump_host: optional(&self.jump_host),
            host_key_algorithms: optional(&self.host_key_algorithms),
            accept_unknown_host_keys: self.accept_unknown_host_keys,
            known_hosts_path: known_hosts_path.map(Path::to_path_buf),
        };
        connection.validate()?;
        connection.jump_connection()?;
        Ok(connection)
    }
}

pub fn draw_connection_form(
    area: Rect,
    form: &ConnectionForm,
    connecting: bool,
    has_tabs: bool,
    frame: &mut ratatui::Frame<'_>,
) {
    let popup_w = area.width.saturating_sub(8).clamp(20, 90);
    let popup_h = 28u16.min(area.height);
    let popup = Rect {
        x: area.x + area.width.saturating_sub(popup_w) / 2,
        y: area.y + area.height.saturating_sub(popup_h) / 2,
        width: popup_w,
        height: popup_h,
    };
    frame.render_widget(Clear, popup);

    let title = if connecting {
        "New Connection (connecting...)"
    } else {
        "New Connection"
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Line::from(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )));
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // host
            Constraint::Length(3), // port
            Constraint::Length(3), // username
            Constraint::Length(3), // password
            Constraint::Length(3), // private key
            Constraint::Length(3), // jump host
            Constraint::Length(3), // host key algorithms
            Constraint::Length(1), // accept unknown checkbox
            Constraint::Min(0),
            Constraint::Length(1), // hints
        ])
        .split(inner);

    let fields: [(&TextArea<'static>, &str, FocusField); 7] = [
        (&form.host, "Host", FocusField::Host),
        (&form.port, "Port", FocusField::Port),
        (&form.username, "Username", FocusField::Username),
        (&form.password, "Password", FocusField::Password),
        (&form.private_key_path, "Private Key Path", FocusField::PrivateKeyPath),
        (&form.jump_host, "Jump Host", FocusField::JumpHost),
        (&form.host_key_algorithms, "Host Key Algorithms", FocusField::HostKeyAlgorithms),
    ];

    for (idx, (textarea, label, field)) in fields.into_iter().enumerate() {
        let focused = form.focus == field;
        let mut textarea = textarea.clone();
        let border = if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        textarea.set_block(Block::default().borders(Borders::ALL).title(label).border_style(border));
        if !focused {
            textarea.set_cursor_style(Style::default());
        }
        frame.render_widget(&textarea, layout[idx]);
    }

    let checkbox = if form.accept_unknown_host_keys { "[x]" } else { "[ ]" };
    let checkbox_style = if form.focus == FocusField::AcceptUnknownHostKeys {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            format!(" {checkbox} Accept unknown host keys without asking"),
            checkbox_style,
        ))),
        layout[7],
    );

    let mut hints = String::from("Enter: Connect   Tab/↓: Next   Shift+Tab/↑: Prev   Space: Toggle");
    if has_tabs {
        hints.push_str("   Esc: Back to tabs");
    } else {
        hints.push_str("   Esc: Quit");
    }
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            hints,
            Style::default().fg(Color::White).add_modifier(Modifier::DIM),
        )))
        .alignment(Alignment::Center),
        layout[9],
    );
}
