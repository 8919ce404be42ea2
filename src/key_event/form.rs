use crossterm::event::{KeyCode, KeyEvent};
use tui_textarea::Input;

use super::KeyFlow;
use crate::app::App;
use crate::ui::FocusField;

pub async fn handle_form_key(app: &mut App, key: KeyEvent) -> KeyFlow {
    match key.code {
        KeyCode::F(10) => return KeyFlow::Quit,
        KeyCode::Esc => {
            if app.is_connecting() {
                app.abandon_connect();
            } else if app.tab_count() > 0 {
                app.back_to_tabs();
            } else {
                return KeyFlow::Quit;
            }
        }
        KeyCode::Tab | KeyCode::Down => app.form.next(),
        KeyCode::BackTab | KeyCode::Up => app.form.prev(),
        KeyCode::Enter => app.begin_connect(),
        KeyCode::Char(' ') if app.form.focus == FocusField::AcceptUnknownHostKeys => {
            app.form.toggle_accept_unknown();
        }
        _ => {
            // Use textarea's built-in input handling for all other keys
            if let Some(textarea) = app.form.focused_textarea_mut() {
                textarea.input(Input::from(key));
            }
        }
    }
    KeyFlow::Continue
}
