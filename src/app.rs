use std::path::PathBuf;
use std::time::Duration;

use ratatui::Terminal;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::Backend;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::async_ssh_client::{PTY_INITIAL_COLS, PTY_INITIAL_ROWS, SessionClient};
use crate::config::manager::{ConfigManager, Connection, Target};
use crate::connect::{PendingConnection, spawn_connect, spawn_resume};
use crate::error::{AppError, Result, join_errors};
use crate::events::{AppEvent, EventReceiver, EventSender};
use crate::key_event::KeyFlow;
use crate::terminal::TerminalPipeline;
use crate::transfer::{TransferDirection, TransferOutcome};
use crate::ui::{
    ConnectionForm, FileBrowserState, TabLabel, TerminalState, draw_connection_form,
    draw_error_popup, draw_file_browser, draw_help_popup, draw_host_key_popup, draw_info_popup,
    draw_status_line, draw_tab_bar, draw_terminal, terminal_inner,
};
use crate::utils::expand_tilde;

/// How long quitting waits for tab teardowns
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Events handled per wake-up before the screen is redrawn
const EVENT_BATCH: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Connection,
    Main,
    HostKeyPrompt,
}

/// Pane of the active tab receiving keys
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Terminal,
    FileBrowser,
}

pub struct Tab {
    pub id: Uuid,
    pub title: String,
    pub connected: bool,
    pub error: Option<String>,
    pub terminal: TerminalState,
}

/// Resources taken out of a closed tab, released in order by [`TabTeardown::run`].
pub struct TabTeardown {
    pub id: Uuid,
    pub title: String,
    pub pipeline: Option<TerminalPipeline>,
    pub client: Option<SessionClient>,
}

impl TabTeardown {
    /// Closes the pipeline, then the client. Both are attempted.
    pub async fn run(self) -> Result<()> {
        let mut errors = Vec::new();
        if let Some(pipeline) = self.pipeline
            && let Err(e) = pipeline.close().await
        {
            tracing::warn!("Closing terminal of tab '{}' failed: {}", self.title, e);
            errors.push(e);
        }
        if let Some(client) = self.client
            && let Err(e) = client.close().await
        {
            tracing::warn!("Closing connection of tab '{}' failed: {}", self.title, e);
            errors.push(e);
        }
        tracing::info!("Tab '{}' ({}) torn down", self.title, self.id);
        join_errors(errors)
    }
}

#[derive(Clone, Copy, Debug)]
struct MainLayout {
    tab_bar: Rect,
    terminal: Rect,
    browser: Rect,
    status: Rect,
}

fn main_layout(area: Rect) -> MainLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1), Constraint::Length(1)])
        .split(area);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(rows[1]);
    MainLayout {
        tab_bar: rows[0],
        terminal: panes[0],
        browser: panes[1],
        status: rows[2],
    }
}

/// App owns every tab and everything a tab holds.
///
/// `tabs`, `clients`, `pipelines` and `browsers` are index-aligned: entry `i`
/// of each belongs to the same tab, and they only ever grow or shrink together.
pub struct App {
    pub screen: Screen,
    pub focus: Focus,
    pub form: ConnectionForm,
    pub error: Option<AppError>,
    pub info: Option<String>,
    pub show_help: bool,
    /// Connect attempt waiting on a host key decision
    pub pending: Option<PendingConnection>,
    pub config: ConfigManager,
    tabs: Vec<Tab>,
    clients: Vec<Option<SessionClient>>,
    pipelines: Vec<Option<TerminalPipeline>>,
    browsers: Vec<FileBrowserState>,
    active: usize,
    next_attempt: u64,
    /// Only outcomes of this attempt are acted upon
    current_attempt: Option<u64>,
    connecting: Option<Connection>,
    event_tx: EventSender,
    teardowns: Vec<JoinHandle<()>>,
    /// Inner size `(rows, cols)` every tab's remote screen is kept at
    screen_size: Option<(u16, u16)>,
    needs_redraw: bool,
}

impl App {
    pub fn new(config: ConfigManager, event_tx: EventSender) -> Self {
        let form = ConnectionForm::new(config.default_port());
        Self {
            screen: Screen::Connection,
            focus: Focus::Terminal,
            form,
            error: None,
            info: None,
            show_help: false,
            pending: None,
            config,
            tabs: Vec::new(),
            clients: Vec::new(),
            pipelines: Vec::new(),
            browsers: Vec::new(),
            active: 0,
            next_attempt: 0,
            current_attempt: None,
            connecting: None,
            event_tx,
            teardowns: Vec::new(),
            screen_size: None,
            needs_redraw: true,
        }
    }

    /// Pre-fills the connection form from a `[user@]host[:port]` destination.
    pub fn prefill(&mut self, target: &Target) {
        self.form.prefill(target);
        self.mark_redraw();
    }

    /// Mark that UI needs redrawing
    pub fn mark_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Check if redraw is needed and mark as drawn
    pub fn should_redraw(&mut self) -> bool {
        let should = self.needs_redraw;
        self.needs_redraw = false;
        should
    }

    pub fn set_error(&mut self, error: AppError) {
        self.error = Some(error);
        self.needs_redraw = true;
    }

    pub fn set_info(&mut self, info: String) {
        self.info = Some(info);
        self.needs_redraw = true;
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.get(self.active)
    }

    pub fn active_tab_mut(&mut self) -> Option<&mut Tab> {
        self.tabs.get_mut(self.active)
    }

    pub fn active_browser_mut(&mut self) -> Option<&mut FileBrowserState> {
        self.browsers.get_mut(self.active)
    }

    pub fn active_pipeline(&self) -> Option<&TerminalPipeline> {
        self.pipelines.get(self.active).and_then(Option::as_ref)
    }

    fn active_client(&self) -> Option<SessionClient> {
        self.clients.get(self.active).and_then(Option::clone)
    }

    fn index_of(&self, tab_id: Uuid) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == tab_id)
    }

    pub fn is_connecting(&self) -> bool {
        self.current_attempt.is_some()
    }

    pub fn next_tab(&mut self) {
        if !self.tabs.is_empty() {
            self.active = (self.active + 1) % self.tabs.len();
            self.mark_redraw();
        }
    }

    pub fn prev_tab(&mut self) {
        if !self.tabs.is_empty() {
            self.active = (self.active + self.tabs.len() - 1) % self.tabs.len();
            self.mark_redraw();
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Terminal => Focus::FileBrowser,
            Focus::FileBrowser => Focus::Terminal,
        };
        self.mark_redraw();
    }

    /// Shows an empty connection form; existing tabs keep running.
    pub fn go_to_new_tab(&mut self) {
        self.form = ConnectionForm::new(self.config.default_port());
        self.screen = Screen::Connection;
        self.mark_redraw();
    }

    /// Leaves the connection screen for the tabs, dropping any connect in flight.
    pub fn back_to_tabs(&mut self) {
        self.abandon_connect();
        self.screen = Screen::Main;
        self.mark_redraw();
    }

    /// Validates the form and starts a background connect attempt.
    pub fn begin_connect(&mut self) {
        if self.is_connecting() {
            return;
        }
        let connection = match self
            .form
            .to_connection(self.config.default_port(), self.config.known_hosts_path())
        {
            Ok(connection) => connection,
            Err(e) => {
                self.set_error(e);
                return;
            }
        };

        let attempt = self.start_attempt();
        tracing::info!("Connect attempt {} to {}", attempt, connection.display_name());
        self.connecting = Some(connection.clone());
        spawn_connect(
            connection,
            attempt,
            self.config.connection_timeout(),
            self.event_tx.clone(),
        );
        self.mark_redraw();
    }

    fn start_attempt(&mut self) -> u64 {
        self.next_attempt += 1;
        self.current_attempt = Some(self.next_attempt);
        self.next_attempt
    }

    /// Forgets the in-flight attempt; whatever it produces later is closed.
    pub fn abandon_connect(&mut self) {
        if let Some(attempt) = self.current_attempt.take() {
            tracing::info!("Connect attempt {} abandoned", attempt);
        }
        self.connecting = None;
    }

    /// Trusts the pending host key and resumes the paused attempt.
    pub fn accept_host_key(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let attempt = self.start_attempt();
        tracing::info!("Host key for {} accepted, resuming as attempt {}", pending.host_port, attempt);
        spawn_resume(
            pending,
            attempt,
            self.config.connection_timeout(),
            self.event_tx.clone(),
        );
        self.screen = Screen::Connection;
        self.mark_redraw();
    }

    /// Drops the pending attempt; its jump connection, if any, closes in the background.
    pub fn reject_host_key(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::info!("Host key for {} rejected", pending.host_port);
            discard_pending(pending);
        }
        self.connecting = None;
        self.screen = Screen::Connection;
        self.mark_redraw();
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.current_attempt == Some(attempt)
    }

    /// Allocates a tab for `client` and starts its terminal in the background.
    fn push_tab(&mut self, title: String, client: SessionClient) -> Uuid {
        let id = Uuid::new_v4();
        let (rows, cols) = self
            .screen_size
            .unwrap_or((PTY_INITIAL_ROWS as u16, PTY_INITIAL_COLS as u16));
        let terminal =
            TerminalState::new_with_scrollback(rows, cols, self.config.terminal_scrollback_lines());

        self.spawn_pipeline(id, client.clone());
        let local_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        self.tabs.push(Tab {
            id,
            title,
            connected: true,
            error: None,
            terminal,
        });
        self.clients.push(Some(client));
        self.pipelines.push(None);
        self.browsers.push(FileBrowserState::new(local_dir));
        self.active = self.tabs.len() - 1;
        self.request_listing(self.active, ".".to_string());
        id
    }

    fn spawn_pipeline(&self, tab_id: Uuid, client: SessionClient) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut pipeline = TerminalPipeline::with_events(tab_id, tx.clone());
            let result = match pipeline.start(&client).await {
                Ok(()) => Ok(pipeline),
                Err(e) => {
                    tracing::error!("Starting terminal for tab {} failed: {}", tab_id, e);
                    Err(e)
                }
            };
            if let Err(tokio::sync::mpsc::error::SendError(event)) =
                tx.send(AppEvent::PipelineStarted { tab_id, result }).await
                && let AppEvent::PipelineStarted {
                    result: Ok(pipeline),
                    ..
                } = event
            {
                close_orphaned_pipeline(pipeline).await;
            }
        });
    }

    /// Removes tab `index` from every collection at once and hands back what it owned.
    pub fn close_tab(&mut self, index: usize) -> Option<TabTeardown> {
        if index >= self.tabs.len() {
            return None;
        }
        let tab = self.tabs.remove(index);
        let client = self.clients.remove(index);
        let pipeline = self.pipelines.remove(index);
        self.browsers.remove(index);

        if index < self.active || self.active >= self.tabs.len() {
            self.active = self.active.saturating_sub(1);
        }
        if self.tabs.is_empty() {
            self.active = 0;
            self.focus = Focus::Terminal;
            self.go_to_new_tab();
        }
        self.mark_redraw();
        tracing::info!("Closing tab '{}'", tab.title);
        Some(TabTeardown {
            id: tab.id,
            title: tab.title,
            pipeline,
            client,
        })
    }

    pub fn close_active_tab(&mut self) {
        if let Some(teardown) = self.close_tab(self.active) {
            self.teardowns.push(tokio::spawn(async move {
                let _ = teardown.run().await;
            }));
        }
    }

    /// Closes every tab and any pending attempt, waiting for all teardowns up
    /// to [`SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(&mut self) {
        self.abandon_connect();
        if let Some(pending) = self.pending.take() {
            discard_pending(pending);
        }
        while !self.tabs.is_empty() {
            self.close_active_tab();
        }
        let teardowns = std::mem::take(&mut self.teardowns);
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(teardowns))
            .await
            .is_err()
        {
            tracing::warn!("Tab teardown did not finish within {:?}", SHUTDOWN_TIMEOUT);
        }
    }

    /// Lists `path` (resolved to an absolute path) for tab `index`.
    pub fn request_listing(&mut self, index: usize, path: String) {
        let (Some(tab), Some(Some(client))) = (self.tabs.get(index), self.clients.get(index)) else {
            return;
        };
        let tab_id = tab.id;
        let client = client.clone();
        let tx = self.event_tx.clone();
        if let Some(browser) = self.browsers.get_mut(index) {
            browser.loading = true;
        }
        tokio::spawn(async move {
            let (path, result) = match client.resolve_dir(&path).await {
                Ok(resolved) => {
                    let result = client.list_dir(&resolved).await;
                    (resolved, result)
                }
                Err(e) => (path, Err(e)),
            };
            if tx.send(AppEvent::Listing { tab_id, path, result }).await.is_err() {
                tracing::trace!("UI queue closed, dropping listing for tab {}", tab_id);
            }
        });
    }

    /// Downloads the selected file of the active tab's browser into its local directory.
    pub fn request_download(&mut self) {
        let index = self.active;
        let Some(client) = self.active_client() else {
            return;
        };
        let Some(tab_id) = self.tabs.get(index).map(|t| t.id) else {
            return;
        };
        let Some(browser) = self.browsers.get_mut(index) else {
            return;
        };
        let Some(entry) = browser.selected_entry() else {
            return;
        };
        if entry.is_dir {
            browser.set_status("Only regular files can be downloaded");
            return;
        }
        let remote = browser.child_path(&entry.name);
        let local_dir = browser.local_dir.clone();
        browser.set_status(format!("Downloading {remote}..."));

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = client.download(&remote, &local_dir).await;
            let destination = match &result {
                Ok(path) => path.display().to_string(),
                Err(_) => local_dir.display().to_string(),
            };
            let outcome =
                TransferOutcome::new(TransferDirection::Download, remote, destination, result.map(|_| ()));
            send_transfer(tx, tab_id, outcome).await;
        });
    }

    /// Uploads `local` into the active tab's remote directory under its own file name.
    pub fn request_upload(&mut self, local: &str) {
        let index = self.active;
        let Some(client) = self.active_client() else {
            return;
        };
        let Some(tab_id) = self.tabs.get(index).map(|t| t.id) else {
            return;
        };
        let Some(browser) = self.browsers.get_mut(index) else {
            return;
        };
        let local_path = expand_tilde(local);
        let Some(name) = local_path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            browser.set_status(format!("{local} is not a file"));
            return;
        };
        let remote = browser.child_path(&name);
        browser.set_status(format!("Uploading {}...", local_path.display()));

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = client.upload(&local_path, &remote).await;
            let outcome = TransferOutcome::new(
                TransferDirection::Upload,
                local_path.display().to_string(),
                remote,
                result,
            );
            send_transfer(tx, tab_id, outcome).await;
        });
    }

    /// Writes `bytes` to the active tab's remote shell. A failure is shown on the tab.
    pub async fn write_to_active(&mut self, bytes: &[u8]) {
        let Some(pipeline) = self.pipelines.get(self.active).and_then(Option::as_ref) else {
            return;
        };
        if let Err(e) = pipeline.write(bytes).await {
            tracing::warn!("Write to tab {} failed: {}", pipeline.tab_id(), e);
            if let Some(tab) = self.tabs.get_mut(self.active) {
                tab.connected = false;
                tab.error = Some(e.to_string());
            }
            self.mark_redraw();
        }
    }

    /// Applies one message from the queue.
    pub async fn handle_event(&mut self, event: AppEvent) -> KeyFlow {
        match event {
            AppEvent::Input(input) => {
                use crossterm::event::Event;

                self.mark_redraw();
                match input {
                    Event::Key(key) => return crate::key_event::handle_key_event(self, key).await,
                    Event::Paste(data) => crate::key_event::handle_paste_event(self, &data).await,
                    _ => {}
                }
            }
            AppEvent::Tick => {}
            AppEvent::Connected { attempt, client } => {
                if !self.is_current(attempt) {
                    tracing::info!("Ignoring stale connect attempt {}", attempt);
                    close_in_background(client);
                    return KeyFlow::Continue;
                }
                self.current_attempt = None;
                let title = self
                    .connecting
                    .take()
                    .map(|c| c.display_name())
                    .unwrap_or_else(|| client.target().to_string());
                tracing::info!("Connected to {}", title);
                self.push_tab(title, client);
                self.screen = Screen::Main;
                self.focus = Focus::Terminal;
                self.mark_redraw();
            }
            AppEvent::ConnectFailed { attempt, error } => {
                if !self.is_current(attempt) {
                    tracing::debug!("Ignoring failure of stale attempt {}: {}", attempt, error);
                    return KeyFlow::Continue;
                }
                self.current_attempt = None;
                self.connecting = None;
                self.screen = Screen::Connection;
                self.set_error(error);
            }
            AppEvent::HostKeyPending { attempt, pending } => {
                if !self.is_current(attempt) {
                    tracing::debug!("Ignoring host key prompt of stale attempt {}", attempt);
                    discard_pending(pending);
                    return KeyFlow::Continue;
                }
                self.current_attempt = None;
                self.pending = Some(pending);
                self.screen = Screen::HostKeyPrompt;
                self.mark_redraw();
            }
            AppEvent::PipelineStarted { tab_id, result } => {
                let Some(index) = self.index_of(tab_id) else {
                    // the tab was closed while its terminal was starting
                    if let Ok(pipeline) = result {
                        tokio::spawn(close_orphaned_pipeline(pipeline));
                    }
                    return KeyFlow::Continue;
                };
                match result {
                    Ok(mut pipeline) => {
                        let (rows, cols) = self.tabs[index].terminal.size();
                        pipeline.resize(cols, rows).await;
                        self.pipelines[index] = Some(pipeline);
                    }
                    Err(e) => {
                        let tab = &mut self.tabs[index];
                        tab.connected = false;
                        tab.error = Some(e.to_string());
                    }
                }
                self.mark_redraw();
            }
            AppEvent::Output { tab_id, bytes } => {
                if let Some(index) = self.index_of(tab_id) {
                    self.tabs[index].terminal.process_bytes(&bytes);
                    if index == self.active {
                        self.mark_redraw();
                    }
                }
            }
            AppEvent::Listing { tab_id, path, result } => {
                if let Some(index) = self.index_of(tab_id) {
                    self.browsers[index].apply_listing(path, result);
                    self.mark_redraw();
                }
            }
            AppEvent::TransferDone { tab_id, outcome } => {
                if let Some(index) = self.index_of(tab_id) {
                    tracing::info!("{}", outcome);
                    let refresh = outcome.succeeded() && outcome.direction == TransferDirection::Upload;
                    self.browsers[index].set_status(outcome.to_string());
                    if refresh {
                        let cwd = self.browsers[index].cwd.clone();
                        self.request_listing(index, cwd);
                    }
                    self.mark_redraw();
                }
            }
        }
        KeyFlow::Continue
    }

    /// Keeps every tab's screen and remote PTY at the size of the terminal pane.
    pub async fn sync_terminal_size(&mut self, area: Rect) {
        let inner = terminal_inner(main_layout(area).terminal);
        let size = (inner.height.max(1), inner.width.max(1));
        if self.screen_size == Some(size) {
            return;
        }
        self.screen_size = Some(size);
        let (rows, cols) = size;
        for (tab, pipeline) in self.tabs.iter_mut().zip(self.pipelines.iter_mut()) {
            tab.terminal.resize(rows, cols);
            if let Some(pipeline) = pipeline {
                pipeline.resize(cols, rows).await;
                if let Some(err) = pipeline.take_last_error() {
                    tab.error = Some(err);
                }
            }
        }
        self.mark_redraw();
    }

    pub fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let area = f.area();

        if !self.tabs.is_empty() {
            self.draw_main(area, f);
        }
        if matches!(self.screen, Screen::Connection | Screen::HostKeyPrompt) {
            draw_connection_form(area, &self.form, self.is_connecting(), !self.tabs.is_empty(), f);
        }
        if let (Screen::HostKeyPrompt, Some(pending)) = (self.screen, &self.pending) {
            draw_host_key_popup(area, pending, f);
        }
        if self.show_help {
            draw_help_popup(area, f);
        }
        if let Some(error) = &self.error {
            draw_error_popup(area, &error.to_string(), f);
        } else if let Some(info) = &self.info {
            draw_info_popup(area, info, f);
        }
    }

    fn draw_main(&mut self, area: Rect, f: &mut ratatui::Frame<'_>) {
        let layout = main_layout(area);
        let labels: Vec<TabLabel> = self
            .tabs
            .iter()
            .map(|t| TabLabel {
                title: &t.title,
                connected: t.connected,
            })
            .collect();
        draw_tab_bar(layout.tab_bar, &labels, self.active, f);

        let on_main = self.screen == Screen::Main;
        let focus = self.focus;
        if let Some(tab) = self.tabs.get_mut(self.active) {
            let title = if tab.connected {
                format!(" {} ", tab.title)
            } else {
                format!(" {} (disconnected) ", tab.title)
            };
            draw_terminal(layout.terminal, &mut tab.terminal, &title, on_main && focus == Focus::Terminal, f);
            draw_status_line(layout.status, tab.error.as_deref(), f);
        }
        if let Some(browser) = self.browsers.get(self.active) {
            draw_file_browser(f, layout.browser, browser, on_main && focus == Focus::FileBrowser);
        }
    }

    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>, rx: &mut EventReceiver) -> Result<()> {
        loop {
            let size = terminal.size()?;
            self.sync_terminal_size(Rect::new(0, 0, size.width, size.height)).await;

            // Only render when needed
            if self.should_redraw() {
                terminal.draw(|f| self.draw(f))?;
            }

            // wait for an event (asynchronous)
            let Some(event) = rx.recv().await else {
                tracing::warn!("App event channel closed");
                break;
            };
            if let KeyFlow::Quit = self.handle_event(event).await {
                return Ok(());
            }
            for _ in 1..EVENT_BATCH {
                let Ok(event) = rx.try_recv() else {
                    break;
                };
                if let KeyFlow::Quit = self.handle_event(event).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn close_in_background(client: SessionClient) {
    tokio::spawn(async move {
        let target = client.target().to_string();
        if let Err(e) = client.close().await {
            tracing::warn!("Error closing {}: {}", target, e);
        }
    });
}

/// Closes the terminal of a tab that no longer exists.
async fn close_orphaned_pipeline(pipeline: TerminalPipeline) {
    let tab_id = pipeline.tab_id();
    if let Err(e) = pipeline.close().await {
        tracing::warn!("Closing terminal of removed tab {} failed: {}", tab_id, e);
    }
}

fn discard_pending(pending: PendingConnection) {
    tokio::spawn(async move {
        if let Err(e) = pending.discard().await {
            tracing::warn!("Error discarding pending connection: {}", e);
        }
    });
}

async fn send_transfer(tx: EventSender, tab_id: Uuid, outcome: TransferOutcome) {
    if tx.send(AppEvent::TransferDone { tab_id, outcome }).await.is_err() {
        tracing::trace!("UI queue closed, dropping transfer result for tab {}", tab_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;

    fn test_app() -> (App, EventReceiver, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();
        let (tx, rx) = event_channel();
        (App::new(config, tx), rx, dir)
    }

    /// Adds a tab with no connection behind it
    fn add_offline_tab(app: &mut App, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        app.tabs.push(Tab {
            id,
            title: title.to_string(),
            connected: true,
            error: None,
            terminal: TerminalState::new(10, 40),
        });
        app.clients.push(None);
        app.pipelines.push(None);
        app.browsers.push(FileBrowserState::new(PathBuf::from(".")));
        app.active = app.tabs.len() - 1;
        app.screen = Screen::Main;
        id
    }

    fn assert_aligned(app: &App) {
        assert_eq!(app.tabs.len(), app.clients.len());
        assert_eq!(app.tabs.len(), app.pipelines.len());
        assert_eq!(app.tabs.len(), app.browsers.len());
    }

    #[tokio::test]
    async fn starts_on_connection_screen() {
        let (app, _rx, _dir) = test_app();
        assert_eq!(app.screen, Screen::Connection);
        assert_eq!(app.tab_count(), 0);
        assert!(!app.is_connecting());
    }

    #[tokio::test]
    async fn stale_failure_is_ignored() {
        let (mut app, _rx, _dir) = test_app();
        let attempt = app.start_attempt();
        app.abandon_connect();

        app.handle_event(AppEvent::ConnectFailed {
            attempt,
            error: AppError::ConnectTimeout("example.com:22".into()),
        })
        .await;
        assert!(app.error.is_none());

        let current = app.start_attempt();
        app.handle_event(AppEvent::ConnectFailed {
            attempt: current - 1,
            error: AppError::ConnectTimeout("example.com:22".into()),
        })
        .await;
        assert!(app.error.is_none());
        assert!(app.is_connecting());

        app.handle_event(AppEvent::ConnectFailed {
            attempt: current,
            error: AppError::AuthenticationError("denied".into()),
        })
        .await;
        assert!(matches!(app.error, Some(AppError::AuthenticationError(_))));
        assert!(!app.is_connecting());
        assert_eq!(app.screen, Screen::Connection);
    }

    #[tokio::test]
    async fn invalid_form_never_starts_an_attempt() {
        let (mut app, _rx, _dir) = test_app();
        app.begin_connect();
        assert!(matches!(app.error, Some(AppError::ValidationError(_))));
        assert!(!app.is_connecting());
    }

    #[tokio::test]
    async fn form_without_credentials_fails_through_the_queue() {
        let (mut app, mut rx, _dir) = test_app();
        app.form.host.insert_str("192.0.2.1");
        app.form.username.insert_str("alice");
        app.begin_connect();
        assert!(app.is_connecting());

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            AppEvent::ConnectFailed {
                error: AppError::NoAuthMethod,
                ..
            }
        ));
        app.handle_event(event).await;
        assert!(matches!(app.error, Some(AppError::NoAuthMethod)));
        assert!(!app.is_connecting());
    }

    #[tokio::test]
    async fn closing_tabs_keeps_collections_aligned() {
        let (mut app, _rx, _dir) = test_app();
        let a = add_offline_tab(&mut app, "a");
        let b = add_offline_tab(&mut app, "b");
        let c = add_offline_tab(&mut app, "c");
        assert_eq!(app.active_index(), 2);

        // closing a tab before the active one shifts the active index with it
        let teardown = app.close_tab(0).unwrap();
        assert_eq!(teardown.id, a);
        assert_aligned(&app);
        assert_eq!(app.active_tab().unwrap().id, c);

        // closing the active last tab selects the new last one
        app.close_tab(1).unwrap();
        assert_aligned(&app);
        assert_eq!(app.active_tab().unwrap().id, b);

        assert!(app.close_tab(5).is_none());
        assert_eq!(app.tab_count(), 1);
    }

    #[tokio::test]
    async fn closing_a_middle_active_tab_keeps_the_slot() {
        let (mut app, _rx, _dir) = test_app();
        add_offline_tab(&mut app, "a");
        let b = add_offline_tab(&mut app, "b");
        let c = add_offline_tab(&mut app, "c");
        app.prev_tab();
        assert_eq!(app.active_tab().unwrap().id, b);

        let teardown = app.close_tab(1).unwrap();
        assert_eq!(teardown.id, b);
        assert_aligned(&app);
        assert_eq!(app.active_index(), 1);
        assert_eq!(app.active_tab().unwrap().id, c);
        assert_eq!(app.screen, Screen::Main);
    }

    fn pending_for(dir: &tempfile::TempDir) -> PendingConnection {
        use russh::keys::PrivateKey;
        use russh::keys::ssh_key::Algorithm;

        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone();
        // no credentials, so a resumed attempt fails before dialing
        let mut connection = Connection::new("192.0.2.10", 22, "alice");
        connection.known_hosts_path = Some(dir.path().join("known_hosts"));
        PendingConnection::unverified(connection, key, false)
    }

    #[tokio::test]
    async fn host_key_prompt_then_reject_creates_no_tab() {
        let (mut app, _rx, dir) = test_app();
        let attempt = app.start_attempt();

        app.handle_event(AppEvent::HostKeyPending {
            attempt,
            pending: pending_for(&dir),
        })
        .await;
        assert_eq!(app.screen, Screen::HostKeyPrompt);
        assert!(app.pending.is_some());
        assert_eq!(app.tab_count(), 0);
        assert_aligned(&app);

        app.reject_host_key();
        assert!(app.pending.is_none());
        assert_eq!(app.screen, Screen::Connection);
        assert!(!app.is_connecting());
        assert_eq!(app.tab_count(), 0);
    }

    #[tokio::test]
    async fn stale_host_key_prompt_is_discarded() {
        let (mut app, _rx, dir) = test_app();
        let attempt = app.start_attempt();
        app.abandon_connect();

        app.handle_event(AppEvent::HostKeyPending {
            attempt,
            pending: pending_for(&dir),
        })
        .await;
        assert!(app.pending.is_none());
        assert_eq!(app.screen, Screen::Connection);
    }

    #[tokio::test]
    async fn accepted_host_key_resumes_without_a_tab_until_connected() {
        let (mut app, mut rx, dir) = test_app();
        let attempt = app.start_attempt();
        app.handle_event(AppEvent::HostKeyPending {
            attempt,
            pending: pending_for(&dir),
        })
        .await;

        app.accept_host_key();
        assert!(app.pending.is_none());
        assert!(app.is_connecting());
        assert_eq!(app.screen, Screen::Connection);
        assert_eq!(app.tab_count(), 0);

        let event = rx.recv().await.unwrap();
        let AppEvent::ConnectFailed { attempt: resumed, .. } = &event else {
            panic!("expected the resumed attempt to fail, got {event:?}");
        };
        assert_ne!(*resumed, attempt);
        app.handle_event(event).await;

        assert!(matches!(app.error, Some(AppError::NoAuthMethod)));
        assert_eq!(app.tab_count(), 0);
        assert_aligned(&app);
        // the accepted key was still recorded
        assert!(dir.path().join("known_hosts").exists());
    }

    #[tokio::test]
    async fn closing_last_tab_returns_to_connection_screen() {
        let (mut app, _rx, _dir) = test_app();
        add_offline_tab(&mut app, "only");
        app.focus = Focus::FileBrowser;

        let teardown = app.close_tab(0).unwrap();
        assert!(teardown.pipeline.is_none() && teardown.client.is_none());
        teardown.run().await.unwrap();

        assert_aligned(&app);
        assert_eq!(app.screen, Screen::Connection);
        assert_eq!(app.focus, Focus::Terminal);
        assert_eq!(app.active_index(), 0);
    }

    #[tokio::test]
    async fn tab_navigation_wraps() {
        let (mut app, _rx, _dir) = test_app();
        add_offline_tab(&mut app, "a");
        add_offline_tab(&mut app, "b");
        add_offline_tab(&mut app, "c");
        app.next_tab();
        assert_eq!(app.active_index(), 0);
        app.prev_tab();
        assert_eq!(app.active_index(), 2);
        app.prev_tab();
        assert_eq!(app.active_index(), 1);
    }

    #[tokio::test]
    async fn output_is_routed_by_tab_id() {
        let (mut app, _rx, _dir) = test_app();
        let a = add_offline_tab(&mut app, "a");
        let b = add_offline_tab(&mut app, "b");

        app.handle_event(AppEvent::Output {
            tab_id: a,
            bytes: bytes::Bytes::from_static(b"from a"),
        })
        .await;
        app.handle_event(AppEvent::Output {
            tab_id: b,
            bytes: bytes::Bytes::from_static(b"from b"),
        })
        .await;
        // output for a closed tab is dropped
        app.handle_event(AppEvent::Output {
            tab_id: Uuid::new_v4(),
            bytes: bytes::Bytes::from_static(b"lost"),
        })
        .await;

        assert_eq!(app.tabs()[0].terminal.visible_text()[0], "from a");
        assert_eq!(app.tabs()[1].terminal.visible_text()[0], "from b");
    }

    #[tokio::test]
    async fn failed_pipeline_marks_tab_disconnected() {
        let (mut app, _rx, _dir) = test_app();
        let id = add_offline_tab(&mut app, "a");
        app.handle_event(AppEvent::PipelineStarted {
            tab_id: id,
            result: Err(AppError::SshConnectionError("channel refused".into())),
        })
        .await;
        let tab = app.active_tab().unwrap();
        assert!(!tab.connected);
        assert!(tab.error.as_deref().unwrap().contains("channel refused"));
    }

    #[tokio::test]
    async fn pipeline_for_a_removed_tab_is_not_attached() {
        let (mut app, _rx, _dir) = test_app();
        let kept = add_offline_tab(&mut app, "a");
        let removed = Uuid::new_v4();

        app.handle_event(AppEvent::PipelineStarted {
            tab_id: removed,
            result: Ok(TerminalPipeline::new(removed)),
        })
        .await;
        assert_eq!(app.tab_count(), 1);
        assert_eq!(app.active_tab().unwrap().id, kept);
        assert!(app.active_pipeline().is_none());
        assert_aligned(&app);

        close_orphaned_pipeline(TerminalPipeline::new(removed)).await;
    }

    #[tokio::test]
    async fn listing_and_transfer_results_reach_the_browser() {
        let (mut app, _rx, _dir) = test_app();
        let id = add_offline_tab(&mut app, "a");
        app.handle_event(AppEvent::Listing {
            tab_id: id,
            path: "/srv".into(),
            result: Ok(Vec::new()),
        })
        .await;
        assert_eq!(app.browsers[0].cwd, "/srv");

        app.handle_event(AppEvent::TransferDone {
            tab_id: id,
            outcome: TransferOutcome::new(
                TransferDirection::Download,
                "/srv/a.txt",
                "./",
                Err(AppError::TransferError("scp: a.txt: No such file".into())),
            ),
        })
        .await;
        assert!(
            app.browsers[0]
                .status
                .as_deref()
                .unwrap()
                .starts_with("Download of /srv/a.txt failed")
        );
    }

    #[tokio::test]
    async fn resize_reaches_every_tab() {
        let (mut app, _rx, _dir) = test_app();
        add_offline_tab(&mut app, "a");
        add_offline_tab(&mut app, "b");
        let area = Rect::new(0, 0, 100, 30);
        app.sync_terminal_size(area).await;

        let expected = terminal_inner(main_layout(area).terminal);
        for tab in app.tabs() {
            assert_eq!(tab.terminal.size(), (expected.height, expected.width));
        }
    }

    #[tokio::test]
    async fn shutdown_closes_every_tab() {
        let (mut app, _rx, _dir) = test_app();
        add_offline_tab(&mut app, "a");
        add_offline_tab(&mut app, "b");
        app.shutdown().await;
        assert_eq!(app.tab_count(), 0);
        assert_aligned(&app);
    }
}
