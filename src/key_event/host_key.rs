use crossterm::event::{KeyCode, KeyEvent};

use super::KeyFlow;
use crate::app::App;

/// `y` trusts the offered key and resumes; `n` or Esc drops the attempt.
pub async fn handle_host_key_key(app: &mut App, key: KeyEvent) -> KeyFlow {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => app.accept_host_key(),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.reject_host_key(),
        _ => {}
    }
    KeyFlow::Continue
}
