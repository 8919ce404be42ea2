mod app;
mod async_ssh_client;
mod config;
mod connect;
mod error;
mod events;
mod filesystem;
mod key_event;
mod terminal;
mod transfer;
mod ui;
mod utils;

// Re-export commonly used types
pub use app::{App, Focus, SHUTDOWN_TIMEOUT, Screen, Tab, TabTeardown};
pub use async_ssh_client::{AuthMethod, HostKeyPolicy, SessionClient};
pub use config::manager::{ConfigManager, Connection, Target, parse_target};
pub use connect::{ConnectOutcome, PendingConnection, auth_methods, connect, resume};
pub use error::{AppError, Result};
pub use events::{AppEvent, EventReceiver, EventSender, event_channel};
pub use filesystem::FileEntry;
pub use key_event::KeyFlow;
pub use terminal::{OutputBuffer, TerminalPipeline, key_to_bytes};
pub use transfer::{TransferDirection, TransferOutcome};
pub use utils::{expand_tilde, init_panic_hook, init_tracing, restore_tui};
