use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use russh::client::{self, AuthResult, Handle, KeyboardInteractiveAuthResponse, Msg};
use russh::keys::ssh_key::{self, HashAlg};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg, ChannelWriteHalf, Disconnect, MethodKind, Pty};
use tokio::task::JoinHandle;

use crate::config::manager::Connection;
use crate::error::{AppError, Result, join_errors};
use crate::filesystem::{self, FileEntry, shell_quote};

pub const PTY_TERM: &str = "xterm-256color";
pub const PTY_INITIAL_COLS: u32 = 80;
pub const PTY_INITIAL_ROWS: u32 = 40;

/// A credential the client will offer, in the order it was resolved.
#[derive(Clone)]
pub enum AuthMethod {
    PublicKey(Arc<PrivateKey>),
    Password(String),
}

impl AuthMethod {
    fn name(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey(_) => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the server's host key is judged on first contact
#[derive(Clone, Debug)]
pub enum HostKeyPolicy {
    AcceptAny,
    KnownHosts {
        path: Option<PathBuf>,
        /// A key the user explicitly accepted for this attempt
        accepted: Option<PublicKey>,
    },
}

impl HostKeyPolicy {
    pub fn for_connection(connection: &Connection, accepted: Option<PublicKey>) -> Self {
        if connection.accept_unknown_host_keys {
            HostKeyPolicy::AcceptAny
        } else {
            HostKeyPolicy::KnownHosts {
                path: connection.known_hosts_file(),
                accepted,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKeyVerdict {
    Trusted,
    Unknown,
    Mismatch,
}

pub fn verify_host_key(host: &str, port: u16, key: &PublicKey, policy: &HostKeyPolicy) -> HostKeyVerdict {
    let (path, accepted) = match policy {
        HostKeyPolicy::AcceptAny => return HostKeyVerdict::Trusted,
        HostKeyPolicy::KnownHosts { path, accepted } => (path, accepted),
    };

    if let Some(accepted) = accepted
        && accepted.key_data() == key.key_data()
    {
        return HostKeyVerdict::Trusted;
    }

    let Some(path) = path else {
        return HostKeyVerdict::Unknown;
    };

    match russh::keys::check_known_hosts_path(host, port, key, path) {
        Ok(true) => HostKeyVerdict::Trusted,
        Ok(false) => HostKeyVerdict::Unknown,
        Err(russh::keys::Error::KeyChanged { line }) => {
            tracing::warn!(
                "Host key for {}:{} does not match {} line {}",
                host,
                port,
                path.display(),
                line
            );
            HostKeyVerdict::Mismatch
        }
        Err(e) => {
            tracing::warn!("Failed to read known hosts {}: {}", path.display(), e);
            HostKeyVerdict::Unknown
        }
    }
}

/// Records `key` as trusted for `host:port`, dropping the entries it replaces.
pub fn remember_host_key(host: &str, port: u16, key: &PublicKey, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let update_error =
        |e: russh::keys::Error| AppError::ConfigError(format!("Failed to update {}: {e}", path.display()));

    let stale = russh::keys::known_hosts::known_host_keys_path(host, port, path)
        .map_err(update_error)?
        .into_iter()
        .filter(|(_, recorded)| recorded.algorithm() == key.algorithm() && recorded != key)
        .map(|(line, _)| line)
        .collect::<Vec<_>>();
    if !stale.is_empty() {
        tracing::info!(
            "Replacing {} stale host key entr{} for {}:{} in {}",
            stale.len(),
            if stale.len() == 1 { "y" } else { "ies" },
            host,
            port,
            path.display()
        );
        prune_known_hosts(path, &stale)?;
    }

    if let Ok(true) = russh::keys::check_known_hosts_path(host, port, key, path) {
        return Ok(());
    }
    russh::keys::known_hosts::learn_known_hosts_path(host, port, key, path).map_err(update_error)
}

/// Rewrites `path` without the given entry lines. Lines are numbered from 1 and
/// comment lines are not counted, matching russh's known_hosts reader.
fn prune_known_hosts(path: &Path, lines: &[usize]) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let mut kept = String::with_capacity(content.len());
    let mut line = 1;
    for entry in content.split_inclusive('\n') {
        if entry.starts_with('#') {
            kept.push_str(entry);
            continue;
        }
        if !lines.contains(&line) {
            kept.push_str(entry);
        }
        line += 1;
    }
    std::fs::write(path, kept)?;
    Ok(())
}

pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

type RejectedKeySlot = Arc<StdMutex<Option<(PublicKey, bool)>>>;

pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    rejected: RejectedKeySlot,
}

impl client::Handler for ClientHandler {
    type Error = AppError;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let verdict = verify_host_key(&self.host, self.port, server_public_key, &self.policy);
        tracing::debug!(
            "Host key {} for {}:{}: {:?}",
            fingerprint(server_public_key),
            self.host,
            self.port,
            verdict
        );
        match verdict {
            HostKeyVerdict::Trusted => Ok(true),
            HostKeyVerdict::Unknown | HostKeyVerdict::Mismatch => {
                if let Ok(mut slot) = self.rejected.lock() {
                    *slot = Some((
                        server_public_key.clone(),
                        verdict == HostKeyVerdict::Mismatch,
                    ));
                }
                Ok(false)
            }
        }
    }
}

/// Returned by [`SessionClient::open_via_jump`] so the caller decides the jump
/// client's fate.
pub struct JumpDialFailure {
    pub error: AppError,
    pub jump: SessionClient,
}

/// One authenticated SSH connection, possibly tunneled through a jump host it owns.
///
/// Clones share the connection handle but not the jump leg; only the original
/// (kept by the tab manager) should be closed.
pub struct SessionClient {
    handle: Arc<Handle<ClientHandler>>,
    jump: Option<Box<SessionClient>>,
    target: String,
}

impl Clone for SessionClient {
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
            jump: None,
            target: self.target.clone(),
        }
    }
}

impl fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("target", &self.target)
            .field("jump", &self.jump.as_ref().map(|j| j.target.clone()))
            .finish()
    }
}

impl SessionClient {
    /// `host:port` this client is connected to
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_tunneled(&self) -> bool {
        self.jump.is_some()
    }

    /// Dials `connection` directly and authenticates.
    pub async fn open(
        connection: &Connection,
        methods: &[AuthMethod],
        policy: HostKeyPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let target = connection.host_port();
        let rejected = RejectedKeySlot::default();
        let handler = ClientHandler {
            host: connection.host.clone(),
            port: connection.port,
            policy,
            rejected: rejected.clone(),
        };

        tracing::info!("Connecting to {}", target);
        let dial = client::connect(
            client_config(connection),
            (connection.host.as_str(), connection.port),
            handler,
        );
        let mut handle = match tokio::time::timeout(timeout, dial).await {
            Err(_) => return Err(AppError::ConnectTimeout(target)),
            Ok(Err(e)) => return Err(dial_error(&target, &rejected, e)),
            Ok(Ok(handle)) => handle,
        };

        if let Err(e) = authenticate(&mut handle, &connection.username, methods).await {
            return Err(dial_error(&target, &rejected, e));
        }

        tracing::info!("Authenticated to {} as {}", target, connection.username);
        Ok(Self {
            handle: Arc::new(handle),
            jump: None,
            target,
        })
    }

    /// Dials `connection` through a `direct-tcpip` channel of `jump` and authenticates.
    ///
    /// On success the returned client owns `jump`; on failure `jump` is handed back.
    pub async fn open_via_jump(
        jump: SessionClient,
        connection: &Connection,
        methods: &[AuthMethod],
        policy: HostKeyPolicy,
        timeout: Duration,
    ) -> std::result::Result<Self, JumpDialFailure> {
        let target = connection.host_port();
        tracing::info!("Connecting to {} through {}", target, jump.target);

        let channel = match jump
            .handle
            .channel_open_direct_tcpip(connection.host.as_str(), connection.port.into(), "127.0.0.1", 0)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                let error = AppError::SshConnectionError(format!(
                    "Failed to open tunnel to {target} through {}: {e}",
                    jump.target
                ));
                return Err(JumpDialFailure { error, jump });
            }
        };

        let rejected = RejectedKeySlot::default();
        let handler = ClientHandler {
            host: connection.host.clone(),
            port: connection.port,
            policy,
            rejected: rejected.clone(),
        };

        let dial = client::connect_stream(client_config(connection), channel.into_stream(), handler);
        let mut handle = match tokio::time::timeout(timeout, dial).await {
            Err(_) => {
                return Err(JumpDialFailure {
                    error: AppError::ConnectTimeout(target),
                    jump,
                });
            }
            Ok(Err(e)) => {
                return Err(JumpDialFailure {
                    error: dial_error(&target, &rejected, e),
                    jump,
                });
            }
            Ok(Ok(handle)) => handle,
        };

        if let Err(e) = authenticate(&mut handle, &connection.username, methods).await {
            return Err(JumpDialFailure {
                error: dial_error(&target, &rejected, e),
                jump,
            });
        }

        tracing::info!("Authenticated to {} as {} via jump host", target, connection.username);
        Ok(Self {
            handle: Arc::new(handle),
            jump: Some(Box::new(jump)),
            target,
        })
    }

    /// Opens a fresh session channel for a shell or a one-shot command.
    pub async fn open_session(&self) -> Result<RemoteSession> {
        let channel = self.handle.channel_open_session().await?;
        Ok(RemoteSession { channel })
    }

    /// Requests a PTY on `session`, starts the login shell and spawns the reader
    /// feeding `sink`. Returns as soon as the shell is running.
    pub async fn start_pty<S: OutputSink>(&self, session: RemoteSession, mut sink: S) -> Result<PtyHandle> {
        let mut channel = session.channel;
        let mut early = Vec::new();

        channel
            .request_pty(
                true,
                PTY_TERM,
                PTY_INITIAL_COLS,
                PTY_INITIAL_ROWS,
                0,
                0,
                &[(Pty::ECHO, 1)],
            )
            .await?;
        await_reply(&mut channel, "pty-req", &mut early).await?;

        channel.request_shell(true).await?;
        await_reply(&mut channel, "shell", &mut early).await?;

        let (mut read_half, write_half) = channel.split();
        let reader = tokio::spawn(async move {
            for chunk in early {
                sink.deliver(chunk).await;
            }
            let mut exit_status = None;
            while let Some(msg) = read_half.wait().await {
                match msg {
                    ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
                        sink.deliver(Bytes::copy_from_slice(&data)).await;
                    }
                    ChannelMsg::ExitStatus { exit_status: status } => {
                        exit_status = Some(status);
                    }
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
            exit_status
        });

        Ok(PtyHandle {
            writer: PtyWriter { half: write_half },
            reader,
        })
    }

    /// Sends a window-change for an already started PTY.
    pub async fn resize_pty(&self, writer: &PtyWriter, width: u16, height: u16) -> Result<()> {
        writer
            .half
            .window_change(width.into(), height.into(), 0, 0)
            .await?;
        Ok(())
    }

    /// Runs `command` on a one-shot exec channel and collects its output.
    pub async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self.open_exec(command).await?;
        let mut output = CommandOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    output.stderr.extend_from_slice(&data)
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        Ok(output)
    }

    /// Resolves `path` to an absolute directory on the remote host.
    pub async fn resolve_dir(&self, path: &str) -> Result<String> {
        let output = self
            .run_command(&format!("cd {} && pwd", shell_quote(path)))
            .await?;
        let resolved = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.exit_status.unwrap_or(0) != 0 || resolved.is_empty() {
            return Err(AppError::TransferError(format!(
                "cd {path}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(resolved)
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<FileEntry>> {
        let quoted = shell_quote(path);
        let command = format!(
            "LC_ALL=C ls -la --time-style=long-iso {quoted} 2>/dev/null || LC_ALL=C ls -la {quoted}"
        );
        let output = self.run_command(&command).await?;
        if output.exit_status.unwrap_or(0) != 0 && output.stdout.is_empty() {
            return Err(AppError::TransferError(format!(
                "ls {path}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(filesystem::parse_ls_output(
            &text,
            chrono::Local::now().naive_local(),
        ))
    }

    pub async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let channel = self
            .open_exec(&format!("scp -t {}", shell_quote(remote_path)))
            .await?;
        filesystem::scp::send_file(channel, local_path, remote_path).await
    }

    /// Copies `remote_path` into `local_dir`, returning the written file's path.
    pub async fn download(&self, remote_path: &str, local_dir: &Path) -> Result<PathBuf> {
        let channel = self
            .open_exec(&format!("scp -f {}", shell_quote(remote_path)))
            .await?;
        filesystem::scp::receive_file(channel, remote_path, local_dir).await
    }

    async fn open_exec(&self, command: &str) -> Result<Channel<Msg>> {
        let channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;
        Ok(channel)
    }

    /// Closes this connection and then the jump connection it was dialed through.
    pub async fn close(self) -> Result<()> {
        let target = self.target.clone();
        let handle = self.handle;
        let destination = async move {
            if handle.is_closed() {
                return Ok(());
            }
            handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
                .map_err(|e| AppError::SshConnectionError(format!("closing {target}: {e}")))
        };
        let jump = self.jump.map(|jump| Box::pin(jump.close()));
        close_in_order(destination, jump).await
    }
}

/// Awaits the destination close, then always the jump close, joining both failures.
async fn close_in_order<D, J>(destination: D, jump: Option<J>) -> Result<()>
where
    D: Future<Output = Result<()>>,
    J: Future<Output = Result<()>>,
{
    let mut errors = Vec::new();
    if let Err(e) = destination.await {
        errors.push(e);
    }
    if let Some(jump) = jump
        && let Err(e) = jump.await
    {
        errors.push(AppError::JumpHost(Box::new(e)));
    }
    join_errors(errors)
}

fn client_config(connection: &Connection) -> Arc<client::Config> {
    let mut config = client::Config {
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    };
    if let Some(algorithms) = connection.host_key_algorithms.as_deref() {
        let preferred = parse_host_key_algorithms(algorithms);
        if !preferred.is_empty() {
            config.preferred.key = Cow::Owned(preferred);
        }
    }
    Arc::new(config)
}

pub fn parse_host_key_algorithms(list: &str) -> Vec<ssh_key::Algorithm> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| match ssh_key::Algorithm::from_str(name) {
            Ok(algorithm) => Some(algorithm),
            Err(_) => {
                tracing::warn!("Ignoring unknown host key algorithm '{}'", name);
                None
            }
        })
        .collect()
}

fn dial_error(target: &str, rejected: &RejectedKeySlot, error: AppError) -> AppError {
    let rejected = rejected.lock().ok().and_then(|mut slot| slot.take());
    match rejected {
        Some((key, mismatch)) => AppError::HostKeyNotVerified {
            host_port: target.to_string(),
            key: Box::new(key),
            mismatch,
        },
        None => match error {
            AppError::RusshError(e) => AppError::SshConnectionError(format!("{target}: {e}")),
            AppError::IOError(e) => AppError::SshConnectionError(format!("{target}: {e}")),
            other => other,
        },
    }
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    methods: &[AuthMethod],
) -> Result<()> {
    for method in methods {
        let result = match method {
            AuthMethod::PublicKey(key) => {
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::clone(key), hash))
                    .await?
            }
            AuthMethod::Password(password) => {
                let result = handle.authenticate_password(username, password).await?;
                match result {
                    AuthResult::Failure {
                        ref remaining_methods,
                        ..
                    } if remaining_methods.contains(&MethodKind::KeyboardInteractive) => {
                        authenticate_keyboard_interactive(handle, username, password).await?
                    }
                    other => other,
                }
            }
        };

        if result.success() {
            return Ok(());
        }
        tracing::debug!("{} authentication rejected for {}", method.name(), username);
    }

    let tried = methods
        .iter()
        .map(AuthMethod::name)
        .collect::<Vec<_>>()
        .join(", ");
    Err(AppError::AuthenticationError(format!(
        "server rejected {tried} for user {username}"
    )))
}

async fn authenticate_keyboard_interactive(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    password: &str,
) -> Result<AuthResult> {
    let mut step = handle
        .authenticate_keyboard_interactive_start(username, None)
        .await?;
    loop {
        match step {
            KeyboardInteractiveAuthResponse::Success => return Ok(AuthResult::Success),
            KeyboardInteractiveAuthResponse::Failure {
                remaining_methods,
                partial_success,
            } => {
                return Ok(AuthResult::Failure {
                    remaining_methods,
                    partial_success,
                });
            }
            KeyboardInteractiveAuthResponse::InfoRequest { ref prompts, .. } => {
                let answers = prompts
                    .iter()
                    .map(|p| if p.echo { String::new() } else { password.to_string() })
                    .collect();
                step = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
        }
    }
}

/// Waits for the reply to a `want_reply` channel request, stashing any output
/// that arrives first.
async fn await_reply(channel: &mut Channel<Msg>, request: &str, early: &mut Vec<Bytes>) -> Result<()> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(AppError::SshConnectionError(format!(
                    "server refused {request} request"
                )));
            }
            Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                early.push(Bytes::copy_from_slice(&data));
            }
            Some(ChannelMsg::Close) | None => {
                return Err(AppError::SshConnectionError(format!(
                    "channel closed before {request} was confirmed"
                )));
            }
            Some(_) => {}
        }
    }
}

/// A session channel that has not been turned into a shell yet
pub struct RemoteSession {
    channel: Channel<Msg>,
}

/// Receives every chunk of PTY output, in order.
pub trait OutputSink: Send + 'static {
    fn deliver(&mut self, chunk: Bytes) -> impl Future<Output = ()> + Send;
}

/// Write side of a started PTY
pub struct PtyWriter {
    half: ChannelWriteHalf<Msg>,
}

impl PtyWriter {
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.half
            .data(data)
            .await
            .map_err(|e| AppError::SshWriteError(format!("Failed to write to SSH channel: {e}")))
    }

    /// Signals end of input to the remote shell.
    pub async fn eof(&self) -> Result<()> {
        self.half.eof().await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.half.close().await?;
        Ok(())
    }
}

pub struct PtyHandle {
    pub writer: PtyWriter,
    /// Finishes with the remote exit status once the session ends
    pub reader: JoinHandle<Option<u32>>,
}

#[derive(Debug, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<u32>,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn close_in_order_still_closes_jump_after_destination_failure() {
        let jump_closed = Arc::new(AtomicBool::new(false));
        let flag = jump_closed.clone();

        let result = close_in_order(
            async { Err(AppError::SshConnectionError("destination reset".into())) },
            Some(async move {
                flag.store(true, Ordering::SeqCst);
                Err(AppError::SshConnectionError("jump reset".into()))
            }),
        )
        .await;

        assert!(jump_closed.load(Ordering::SeqCst));
        let err = result.unwrap_err();
        let AppError::Multiple(errors) = &err else {
            panic!("expected both failures, got {err:?}");
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[1], AppError::JumpHost(_)));
        assert!(err.to_string().contains("destination reset"));
        assert!(err.to_string().contains("jump reset"));
    }

    #[tokio::test]
    async fn close_in_order_without_jump() {
        let none: Option<std::future::Ready<Result<()>>> = None;
        assert!(close_in_order(async { Ok(()) }, none).await.is_ok());

        let none: Option<std::future::Ready<Result<()>>> = None;
        let err = close_in_order(
            async { Err(AppError::SshConnectionError("gone".into())) },
            none,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::SshConnectionError(_)));
    }

    #[test]
    fn test_parse_host_key_algorithms() {
        let algorithms = parse_host_key_algorithms("ssh-ed25519, bogus-alg ,rsa-sha2-256,");
        assert_eq!(algorithms.len(), 2);
        assert_eq!(algorithms[0], ssh_key::Algorithm::Ed25519);
        assert!(parse_host_key_algorithms("").is_empty());
    }

    #[test]
    fn accept_any_policy_trusts_every_key() {
        let key = PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone();
        assert_eq!(
            verify_host_key("example.com", 22, &key, &HostKeyPolicy::AcceptAny),
            HostKeyVerdict::Trusted
        );
    }

    #[test]
    fn known_hosts_policy_unknown_accept_and_mismatch() {
        let mut rng = rand::thread_rng();
        let key = PrivateKey::random(&mut rng, ssh_key::Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone();
        let other = PrivateKey::random(&mut rng, ssh_key::Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");

        let policy = HostKeyPolicy::KnownHosts {
            path: Some(path.clone()),
            accepted: None,
        };
        assert_eq!(
            verify_host_key("example.com", 2222, &key, &policy),
            HostKeyVerdict::Unknown
        );

        let accepting = HostKeyPolicy::KnownHosts {
            path: Some(path.clone()),
            accepted: Some(key.clone()),
        };
        assert_eq!(
            verify_host_key("example.com", 2222, &key, &accepting),
            HostKeyVerdict::Trusted
        );
        assert_eq!(
            verify_host_key("example.com", 2222, &other, &accepting),
            HostKeyVerdict::Unknown
        );

        remember_host_key("example.com", 2222, &key, &path).unwrap();
        assert_eq!(
            verify_host_key("example.com", 2222, &key, &policy),
            HostKeyVerdict::Trusted
        );
        assert_eq!(
            verify_host_key("example.com", 2222, &other, &policy),
            HostKeyVerdict::Mismatch
        );
    }

    #[test]
    fn fingerprint_is_sha256() {
        let key = PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone();
        assert!(fingerprint(&key).starts_with("SHA256:"));
    }

    #[test]
    fn accepting_a_changed_key_replaces_the_old_entry() {
        let mut rng = rand::thread_rng();
        let old = PrivateKey::random(&mut rng, ssh_key::Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone();
        let new = PrivateKey::random(&mut rng, ssh_key::Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(
            &path,
            format!(
                "# managed by hand\nother.example {}\n",
                old.to_openssh().unwrap()
            ),
        )
        .unwrap();
        let policy = HostKeyPolicy::KnownHosts {
            path: Some(path.clone()),
            accepted: None,
        };

        remember_host_key("example.com", 2222, &old, &path).unwrap();
        assert_eq!(
            verify_host_key("example.com", 2222, &new, &policy),
            HostKeyVerdict::Mismatch
        );

        remember_host_key("example.com", 2222, &new, &path).unwrap();
        assert_eq!(
            verify_host_key("example.com", 2222, &new, &policy),
            HostKeyVerdict::Trusted
        );
        assert_eq!(
            verify_host_key("example.com", 2222, &old, &policy),
            HostKeyVerdict::Mismatch
        );

        // accepting the same key again does not grow the file
        remember_host_key("example.com", 2222, &new, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("[example.com]:2222").count(), 1);
        assert!(content.starts_with("# managed by hand\nother.example "));
        assert_eq!(
            verify_host_key("other.example", 22, &old, &policy),
            HostKeyVerdict::Trusted
        );
    }

    #[tokio::test]
    #[ignore = "requires a running ssh server"]
    async fn test_open_and_list_home() {
        let conn = Connection::new("127.0.0.1", 2222, "dockeruser").with_password("dockerpass");
        let client = SessionClient::open(
            &conn,
            &[AuthMethod::Password("dockerpass".into())],
            HostKeyPolicy::AcceptAny,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        let entries = client.list_dir(".").await.unwrap();
        assert!(entries.iter().all(|e| e.name != "." && e.name != ".."));
        client.close().await.unwrap();
    }
}
