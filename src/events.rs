use bytes::Bytes;
use crossterm::event::Event;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::async_ssh_client::SessionClient;
use crate::connect::PendingConnection;
use crate::error::AppError;
use crate::filesystem::FileEntry;
use crate::terminal::TerminalPipeline;
use crate::transfer::TransferOutcome;

/// Capacity of the UI message queue
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

pub type EventSender = mpsc::Sender<AppEvent>;
pub type EventReceiver = mpsc::Receiver<AppEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}

/// Every message the UI loop consumes. Background tasks only ever talk to the
/// UI by sending one of these.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum AppEvent {
    Input(Event),
    Tick,
    /// A connect (or resume) attempt produced an authenticated client
    Connected {
        attempt: u64,
        client: SessionClient,
    },
    ConnectFailed {
        attempt: u64,
        error: AppError,
    },
    /// The server's host key needs a user decision before connecting can go on
    HostKeyPending {
        attempt: u64,
        pending: PendingConnection,
    },
    /// The PTY of a freshly allocated tab finished starting
    PipelineStarted {
        tab_id: Uuid,
        result: crate::error::Result<TerminalPipeline>,
    },
    /// Raw bytes produced by a tab's remote shell, in the order the remote sent them
    Output {
        tab_id: Uuid,
        bytes: Bytes,
    },
    Listing {
        tab_id: Uuid,
        path: String,
        result: crate::error::Result<Vec<FileEntry>>,
    },
    TransferDone {
        tab_id: Uuid,
        outcome: TransferOutcome,
    },
}
