pub mod connection;
pub mod file_browser;
pub mod popup;
pub mod tabs;
pub mod terminal;

// Re-export commonly used items for convenience
pub use connection::{ConnectionForm, FocusField, draw_connection_form};
pub use file_browser::{FileBrowserState, draw_file_browser};
pub use popup::{draw_error_popup, draw_help_popup, draw_host_key_popup, draw_info_popup};
pub use tabs::{TabLabel, draw_status_line, draw_tab_bar};
pub use terminal::{TerminalState, draw_terminal, terminal_inner};
