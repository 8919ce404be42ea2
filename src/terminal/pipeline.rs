use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

use super::buffer::OutputBuffer;
use crate::async_ssh_client::{OutputSink, PtyHandle, PtyWriter, SessionClient};
use crate::error::{Result, join_errors};
use crate::events::{AppEvent, EventSender};

/// Where a pipeline's output goes: the UI queue when one is registered,
/// otherwise the pipeline's own buffer.
#[derive(Clone, Debug)]
pub enum PipelineSink {
    Events { tab_id: Uuid, tx: EventSender },
    Buffer(OutputBuffer),
}

impl OutputSink for PipelineSink {
    async fn deliver(&mut self, chunk: Bytes) {
        match self {
            PipelineSink::Events { tab_id, tx } => {
                let event = AppEvent::Output {
                    tab_id: *tab_id,
                    bytes: chunk,
                };
                if tx.send(event).await.is_err() {
                    tracing::trace!("UI queue closed, dropping output for tab {}", tab_id);
                }
            }
            PipelineSink::Buffer(buffer) => buffer.append(&chunk),
        }
    }
}

/// Interactive I/O for one tab: keystrokes in, remote output out.
pub struct TerminalPipeline {
    tab_id: Uuid,
    events: Option<EventSender>,
    buffer: OutputBuffer,
    client: Option<SessionClient>,
    writer: Option<PtyWriter>,
    last_error: Option<String>,
}

impl fmt::Debug for TerminalPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalPipeline")
            .field("tab_id", &self.tab_id)
            .field("active", &self.is_active())
            .field("buffered", &self.buffer.len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl TerminalPipeline {
    /// A pipeline that keeps its output in its own buffer
    pub fn new(tab_id: Uuid) -> Self {
        Self {
            tab_id,
            events: None,
            buffer: OutputBuffer::new(),
            client: None,
            writer: None,
            last_error: None,
        }
    }

    /// A pipeline that streams its output into the UI queue
    pub fn with_events(tab_id: Uuid, tx: EventSender) -> Self {
        Self {
            events: Some(tx),
            ..Self::new(tab_id)
        }
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    fn sink(&self) -> PipelineSink {
        match &self.events {
            Some(tx) => PipelineSink::Events {
                tab_id: self.tab_id,
                tx: tx.clone(),
            },
            None => PipelineSink::Buffer(self.buffer.clone()),
        }
    }

    /// Opens a session on `client`, starts a shell in a PTY and begins streaming
    /// its output.
    pub async fn start(&mut self, client: &SessionClient) -> Result<()> {
        let session = client.open_session().await?;
        let sink = self.sink();
        let PtyHandle { writer, reader } = client.start_pty(session, sink.clone()).await?;

        let tab_id = self.tab_id;
        let mut final_sink = sink;
        tokio::spawn(async move {
            let notice = match reader.await {
                Ok(Some(status)) => format!("\r\n[process exited with status {status}]\r\n"),
                Ok(None) => "\r\n[session closed]\r\n".to_string(),
                Err(e) => {
                    tracing::warn!("Output reader for tab {} ended abnormally: {}", tab_id, e);
                    "\r\n[session closed]\r\n".to_string()
                }
            };
            tracing::info!("Session of tab {} ended", tab_id);
            final_sink.deliver(Bytes::from(notice)).await;
        });

        self.client = Some(client.clone());
        self.writer = Some(writer);
        tracing::debug!("Terminal pipeline for tab {} started", self.tab_id);
        Ok(())
    }

    /// Sends `bytes` to the remote shell's input; does nothing before `start`.
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.write(bytes).await,
            None => Ok(()),
        }
    }

    /// Propagates a new window size; a failure is kept in `last_error`.
    pub async fn resize(&mut self, width: u16, height: u16) {
        let (Some(client), Some(writer)) = (&self.client, &self.writer) else {
            return;
        };
        if let Err(e) = client.resize_pty(writer, width, height).await {
            tracing::warn!("Resize of tab {} to {}x{} failed: {}", self.tab_id, width, height, e);
            self.last_error = Some(e.to_string());
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Output retained when no UI queue is registered
    pub fn output(&self) -> &OutputBuffer {
        &self.buffer
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.buffer.snapshot()
    }

    /// Sends EOF and closes the session channel. Both are attempted.
    pub async fn close(self) -> Result<()> {
        let Some(writer) = self.writer else {
            return Ok(());
        };
        let mut errors = Vec::new();
        if let Err(e) = writer.eof().await {
            errors.push(e);
        }
        if let Err(e) = writer.close().await {
            errors.push(e);
        }
        join_errors(errors)
    }
}
