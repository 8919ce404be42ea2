//! Whole-file copies using the SCP protocol over an exec channel.
//!
//! The remote side runs `scp -t <path>` (sink, for uploads) or `scp -f <path>`
//! (source, for downloads). Every control record is acknowledged with a single
//! NUL byte; `\x01`/`\x02` introduce a warning/fatal message line.

use std::path::{Path, PathBuf};

use russh::Channel;
use russh::client::Msg;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{AppError, Result, join_errors};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpHeader {
    pub mode: u32,
    pub size: u64,
    pub name: String,
}

impl ScpHeader {
    pub fn encode(&self) -> String {
        format!("C{:04o} {} {}\n", self.mode & 0o7777, self.size, self.name)
    }

    /// Parses a `C<mode> <size> <name>` record, without its trailing newline.
    pub fn parse(record: &str) -> Result<Self> {
        let invalid = || AppError::TransferError(format!("unexpected scp record: {record:?}"));
        let body = record.strip_prefix('C').ok_or_else(invalid)?;
        let mut parts = body.splitn(3, ' ');
        let mode = parts
            .next()
            .and_then(|m| u32::from_str_radix(m, 8).ok())
            .ok_or_else(invalid)?;
        let size = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let name = parts.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
        Ok(Self {
            mode,
            size,
            name: name.to_string(),
        })
    }
}

/// Uploads `local_path` to `remote_path` through a channel already running `scp -t`.
pub async fn send_file(mut channel: Channel<Msg>, local_path: &Path, remote_path: &str) -> Result<()> {
    tracing::info!("Uploading {} to {}", local_path.display(), remote_path);

    let transfer = async {
        let file = File::open(local_path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(AppError::TransferError(format!(
                "{} is not a regular file",
                local_path.display()
            )));
        }
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::TransferError(format!("{} has no file name", local_path.display())))?;
        let header = ScpHeader {
            mode: file_mode(&metadata),
            size: metadata.len(),
            name,
        };

        let mut writer = channel.make_writer();
        let mut reader = BufReader::new(channel.make_reader());
        send(&mut reader, &mut writer, file, &header).await
    }
    .await;

    let mut errors = Vec::new();
    if let Err(e) = transfer {
        errors.push(e);
    }
    errors.extend(close_channel(&channel).await);
    join_errors(errors)
}

/// Downloads `remote_path` into `local_dir` through a channel already running `scp -f`.
pub async fn receive_file(mut channel: Channel<Msg>, remote_path: &str, local_dir: &Path) -> Result<PathBuf> {
    tracing::info!("Downloading {} into {}", remote_path, local_dir.display());

    let mut errors = Vec::new();
    let mut written = None;
    {
        let mut writer = channel.make_writer();
        let mut reader = BufReader::new(channel.make_reader());
        let transfer = async {
            let header = request(&mut reader, &mut writer).await?;
            let name = local_file_name(&header.name)?;
            let destination = local_dir.join(name);
            let mut file = File::create(&destination).await?;

            let copied = receive_body(&mut reader, &mut writer, &mut file, header.size).await;
            let flushed = finish_local_file(file).await;
            let mut step_errors = Vec::new();
            if let Err(e) = copied {
                step_errors.push(e);
            }
            if let Err(e) = flushed {
                step_errors.push(e);
            }
            if step_errors.is_empty() {
                apply_mode(&destination, header.mode).await;
            }
            join_errors(step_errors).map(|()| destination)
        };
        match transfer.await {
            Ok(path) => written = Some(path),
            Err(e) => errors.push(e),
        }
    }
    errors.extend(close_channel(&channel).await);

    join_errors(errors)?;
    written.ok_or_else(|| AppError::TransferError(format!("nothing received for {remote_path}")))
}

/// Sink side of the protocol: `source` is streamed as a single file record.
pub async fn send<R, W, S>(reader: &mut R, writer: &mut W, mut source: S, header: &ScpHeader) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: AsyncRead + Unpin,
{
    read_ack(reader).await?;
    writer.write_all(header.encode().as_bytes()).await?;
    writer.flush().await?;
    read_ack(reader).await?;

    let copied = tokio::io::copy(&mut (&mut source).take(header.size), writer).await?;
    if copied != header.size {
        return Err(AppError::TransferError(format!(
            "{} shrank during upload ({copied} of {} bytes)",
            header.name, header.size
        )));
    }
    writer.write_all(&[0]).await?;
    writer.flush().await?;
    read_ack(reader).await
}

/// Source side of the protocol: starts the transfer and reads the file record.
pub async fn request<R, W>(reader: &mut R, writer: &mut W) -> Result<ScpHeader>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[0]).await?;
    writer.flush().await?;
    let record = read_record(reader).await?;
    let header = ScpHeader::parse(&record)?;
    writer.write_all(&[0]).await?;
    writer.flush().await?;
    Ok(header)
}

/// Copies exactly `size` bytes into `sink` and completes the handshake.
pub async fn receive_body<R, W, S>(reader: &mut R, writer: &mut W, sink: &mut S, size: u64) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(&mut (&mut *reader).take(size), sink).await?;
    if copied != size {
        return Err(AppError::TransferError(format!(
            "remote closed after {copied} of {size} bytes"
        )));
    }
    read_ack(reader).await?;
    writer.write_all(&[0]).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_ack<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<()> {
    match read_byte(reader).await? {
        0 => Ok(()),
        1 | 2 => Err(AppError::TransferError(read_line(reader).await?)),
        other => Err(AppError::TransferError(format!(
            "unexpected scp response byte {other:#04x}"
        ))),
    }
}

async fn read_record<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let first = read_byte(reader).await?;
    let rest = read_line(reader).await?;
    match first {
        1 | 2 => Err(AppError::TransferError(rest)),
        b'C' => Ok(format!("C{rest}")),
        b'D' => Err(AppError::TransferError(
            "directories cannot be downloaded".to_string(),
        )),
        other => Err(AppError::TransferError(format!(
            "unexpected scp record starting with {other:#04x}: {rest:?}"
        ))),
    }
}

async fn read_byte<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<u8> {
    match reader.read_u8().await {
        Ok(byte) => Ok(byte),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(AppError::TransferError(
            "remote scp exited before the transfer finished".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;
    Ok(String::from_utf8_lossy(&line).trim_end().to_string())
}

async fn close_channel(channel: &Channel<Msg>) -> Vec<AppError> {
    let mut errors = Vec::new();
    if let Err(e) = channel.eof().await {
        errors.push(AppError::TransferError(format!("failed to send eof: {e}")));
    }
    if let Err(e) = channel.close().await {
        errors.push(AppError::TransferError(format!("failed to close channel: {e}")));
    }
    errors
}

/// Flushes and syncs a file that was written to, then drops it.
async fn finish_local_file(mut file: File) -> Result<()> {
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Rejects names that would escape the download directory.
fn local_file_name(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(AppError::TransferError(format!(
            "refusing to write remote file name {name:?}"
        )));
    }
    Ok(name)
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
async fn apply_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(mode & 0o7777);
    if let Err(e) = tokio::fs::set_permissions(path, permissions).await {
        tracing::warn!("Failed to set mode {:o} on {}: {}", mode, path.display(), e);
    }
}

#[cfg(not(unix))]
async fn apply_mode(_path: &Path, _mode: u32) {}
