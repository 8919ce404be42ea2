use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use crate::app::{App, Focus, Screen};

pub mod connected;
pub mod file_browser;
pub mod form;
pub mod host_key;

// Re-export commonly used items for convenience
pub use connected::handle_main_key;
pub use file_browser::handle_file_browser_key;
pub use form::handle_form_key;
pub use host_key::handle_host_key_key;

/// Result of handling a key or paste event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFlow {
    Continue,
    Quit,
}

/// Top-level key event handler: popup dismissal, the help overlay, then
/// dispatch by screen.
pub async fn handle_key_event(app: &mut App, key: KeyEvent) -> KeyFlow {
    // Only handle actual key presses (ignore repeats/releases)
    if key.kind != KeyEventKind::Press {
        return KeyFlow::Continue;
    }

    // If error popup is visible, handle dismissal only
    if app.error.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            app.error = None;
        }
        return KeyFlow::Continue;
    }

    if app.info.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            app.info = None;
        }
        return KeyFlow::Continue;
    }

    // the help overlay swallows everything
    if app.show_help {
        if matches!(key.code, KeyCode::F(1) | KeyCode::Esc) {
            app.show_help = false;
        }
        return KeyFlow::Continue;
    }

    match app.screen {
        Screen::Connection => handle_form_key(app, key).await,
        Screen::HostKeyPrompt => handle_host_key_key(app, key).await,
        Screen::Main => handle_main_key(app, key).await,
    }
}

/// Paste event handler; dispatches by screen and focus
pub async fn handle_paste_event(app: &mut App, data: &str) {
    if app.error.is_some() || app.info.is_some() || app.show_help {
        return;
    }
    match app.screen {
        Screen::Connection => {
            if let Some(textarea) = app.form.focused_textarea_mut() {
                // inputs are single-line
                textarea.insert_str(data.lines().next().unwrap_or_default());
            }
        }
        Screen::Main => match app.focus {
            Focus::Terminal => {
                if let Some(tab) = app.active_tab_mut() {
                    tab.terminal.scroll_to_bottom();
                }
                app.write_to_active(data.as_bytes()).await;
            }
            Focus::FileBrowser => {
                if let Some(input) = app
                    .active_browser_mut()
                    .and_then(|b| b.upload_input.as_mut())
                {
                    input.insert_str(data.lines().next().unwrap_or_default());
                }
            }
        },
        Screen::HostKeyPrompt => {}
    }
}
