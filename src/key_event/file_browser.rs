use crossterm::event::{KeyCode, KeyEvent};
use tui_textarea::Input;

use crate::app::App;

enum BrowserAction {
    None,
    List(String),
    Download,
    Upload(String),
}

pub async fn handle_file_browser_key(app: &mut App, key: KeyEvent) {
    let index = app.active_index();
    let Some(browser) = app.active_browser_mut() else {
        return;
    };

    let action = if let Some(input) = browser.upload_input.as_mut() {
        match key.code {
            KeyCode::Esc => {
                browser.cancel_upload();
                BrowserAction::None
            }
            KeyCode::Enter => match browser.take_upload_path() {
                Some(path) => BrowserAction::Upload(path),
                None => BrowserAction::None,
            },
            _ => {
                input.input(Input::from(key));
                BrowserAction::None
            }
        }
    } else {
        match key.code {
            KeyCode::Up => {
                browser.select_prev();
                BrowserAction::None
            }
            KeyCode::Down => {
                browser.select_next();
                BrowserAction::None
            }
            KeyCode::Enter => match browser.selected_entry() {
                Some(entry) if entry.is_dir => BrowserAction::List(browser.child_path(&entry.name)),
                _ => BrowserAction::None,
            },
            KeyCode::Backspace => BrowserAction::List(browser.parent_path()),
            KeyCode::Char('r') => BrowserAction::List(browser.cwd.clone()),
            KeyCode::Char('d') => BrowserAction::Download,
            KeyCode::Char('u') => {
                browser.begin_upload();
                BrowserAction::None
            }
            _ => BrowserAction::None,
        }
    };

    match action {
        BrowserAction::None => {}
        BrowserAction::List(path) => app.request_listing(index, path),
        BrowserAction::Download => app.request_download(),
        BrowserAction::Upload(path) => app.request_upload(&path),
    }
}
