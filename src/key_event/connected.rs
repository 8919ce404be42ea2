use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{KeyFlow, handle_file_browser_key};
use crate::app::{App, Focus};
use crate::terminal::key_to_bytes;

/// Keys on the tab view. Function keys drive the tab manager; everything else
/// belongs to the focused pane.
///
/// Alt+F-key sends the plain function key to the remote shell, so programs
/// that use F1-F10 stay usable.
pub async fn handle_main_key(app: &mut App, key: KeyEvent) -> KeyFlow {
    if matches!(key.code, KeyCode::F(_))
        && key.modifiers.contains(KeyModifiers::ALT)
        && app.focus == Focus::Terminal
    {
        handle_terminal_key(app, key).await;
        return KeyFlow::Continue;
    }

    match key.code {
        KeyCode::F(1) => app.show_help = true,
        KeyCode::F(2) => app.toggle_focus(),
        KeyCode::F(3) => app.go_to_new_tab(),
        KeyCode::F(4) => app.close_active_tab(),
        KeyCode::F(5) => app.prev_tab(),
        KeyCode::F(6) => app.next_tab(),
        KeyCode::F(10) => return KeyFlow::Quit,
        _ => match app.focus {
            Focus::Terminal => handle_terminal_key(app, key).await,
            Focus::FileBrowser => handle_file_browser_key(app, key).await,
        },
    }
    KeyFlow::Continue
}

async fn handle_terminal_key(app: &mut App, key: KeyEvent) {
    // Shift+PageUp/PageDown scroll the local history instead of reaching the remote
    if key.modifiers.contains(KeyModifiers::SHIFT)
        && matches!(key.code, KeyCode::PageUp | KeyCode::PageDown)
    {
        if let Some(tab) = app.active_tab_mut() {
            let page = tab.terminal.size().0.saturating_sub(1) as i32;
            let delta = if key.code == KeyCode::PageUp { page } else { -page };
            tab.terminal.scroll_by(delta);
        }
        return;
    }

    let bytes = key_to_bytes(&key);
    if let Some(tab) = app.active_tab_mut() {
        tab.terminal.scroll_to_bottom();
    }
    app.write_to_active(&bytes).await;
}
