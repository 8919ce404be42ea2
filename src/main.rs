use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use crossterm::ExecutableCommand;
use crossterm::event::EventStream;
use crossterm::terminal::{EnterAlternateScreen, enable_raw_mode};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tabssh::{
    App, AppEvent, ConfigManager, EventSender, Result, event_channel, init_panic_hook,
    init_tracing, parse_target, restore_tui,
};

const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Tabbed SSH terminal client
#[derive(Parser, Debug)]
#[command(name = "tabssh", version, about)]
struct Cli {
    /// `[user@]host[:port]` to pre-fill the connection form with
    destination: Option<String>,

    /// Log level written to tabssh.log (RUST_LOG takes precedence)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// known_hosts file used to verify servers (default ~/.ssh/known_hosts)
    #[arg(long, value_name = "PATH")]
    known_hosts: Option<PathBuf>,

    /// Settings file (default ~/.config/tabssh/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

type Term = Terminal<CrosstermBackend<Stdout>>;

fn init_terminal() -> Result<Term> {
    enable_raw_mode().inspect_err(|e| tracing::error!("Error enabling raw mode: {}", e))?;
    let mut stdout = io::stdout();
    stdout
        .execute(EnterAlternateScreen)
        .inspect_err(|e| tracing::error!("Error executing EnterAlternateScreen terminal command: {}", e))?;

    #[cfg(not(target_os = "windows"))]
    stdout
        .execute(crossterm::event::EnableBracketedPaste)
        .inspect_err(|e| tracing::error!("Error executing EnableBracketedPaste terminal command: {}", e))?;

    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

/// Forwards terminal input and periodic ticks into the UI queue until cancelled.
fn spawn_input_task(tx: EventSender, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                next = events.next() => match next {
                    Some(Ok(event)) => AppEvent::Input(event),
                    Some(Err(e)) => {
                        tracing::error!("Reading terminal input failed: {}", e);
                        break;
                    }
                    None => break,
                },
                _ = ticker.tick() => AppEvent::Tick,
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
        tracing::debug!("Input task stopped");
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigManager::with_path(path)?,
        None => ConfigManager::new()?,
    };
    if let Some(path) = cli.known_hosts {
        config.set_known_hosts_path(path);
    }
    let target = cli
        .destination
        .as_deref()
        .map(|dest| parse_target(dest, config.default_port()))
        .transpose()?;

    let log_dir = ConfigManager::config_dir()?;
    let _log_guard = init_tracing(&cli.log_level, &log_dir)?;
    init_panic_hook();
    tracing::info!("tabssh {} starting", env!("CARGO_PKG_VERSION"));

    let (tx, mut rx) = event_channel();
    let mut app = App::new(config, tx.clone());
    if let Some(target) = &target {
        app.prefill(target);
    }

    let mut terminal = init_terminal()?;
    let cancel = CancellationToken::new();
    let input_task = spawn_input_task(tx, cancel.clone());

    let result = app.run(&mut terminal, &mut rx).await;

    cancel.cancel();
    // readers blocked on a full queue must not hold up teardown
    drop(rx);
    app.shutdown().await;
    if let Err(e) = input_task.await {
        tracing::warn!("Input task ended abnormally: {}", e);
    }

    #[cfg(not(target_os = "windows"))]
    terminal
        .backend_mut()
        .execute(crossterm::event::DisableBracketedPaste)
        .ok();
    restore_tui()?;

    if let Err(e) = &result {
        tracing::error!("tabssh exited with error: {}", e);
    }
    tracing::info!("tabssh stopped");
    result
}
