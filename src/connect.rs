//! Connection establishment: credential resolution, optional jump-host
//! tunneling and the pause for host key decisions.

use std::sync::Arc;
use std::time::Duration;

use russh::keys::PublicKey;

use crate::async_ssh_client::{
    AuthMethod, HostKeyPolicy, JumpDialFailure, SessionClient, fingerprint, remember_host_key,
};
use crate::config::manager::Connection;
use crate::error::{AppError, Result};
use crate::events::{AppEvent, EventSender};
use crate::utils::expand_tilde;

/// What a connect attempt ended with when it did not fail outright
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected(SessionClient),
    /// The server presented a key that is not trusted yet
    HostKeyPending(PendingConnection),
}

/// A connect attempt paused on an unverified host key.
///
/// Consumed by exactly one decision: [`resume`] after the user accepts, or
/// [`PendingConnection::discard`] after a rejection.
#[derive(Debug)]
pub struct PendingConnection {
    /// The descriptor the user asked to connect to
    pub connection: Connection,
    /// `host:port` whose key is pending; the jump host's when `on_jump_host`
    pub host_port: String,
    pub key: PublicKey,
    pub fingerprint: String,
    /// The key contradicts a known-hosts entry rather than being absent from it
    pub mismatch: bool,
    pub on_jump_host: bool,
    jump: Option<SessionClient>,
}

impl PendingConnection {
    fn new(connection: Connection, host_port: String, key: PublicKey, mismatch: bool) -> Self {
        Self {
            connection,
            host_port,
            fingerprint: fingerprint(&key),
            key,
            mismatch,
            on_jump_host: false,
            jump: None,
        }
    }

    /// A pending decision on `key` for the destination of `connection`.
    #[cfg(test)]
    pub(crate) fn unverified(connection: Connection, key: PublicKey, mismatch: bool) -> Self {
        let host_port = connection.host_port();
        Self::new(connection, host_port, key, mismatch)
    }

    pub fn has_open_jump(&self) -> bool {
        self.jump.is_some()
    }

    /// Drops the attempt, closing the jump connection it may hold.
    pub async fn discard(self) -> Result<()> {
        match self.jump {
            Some(jump) => jump.close().await.map_err(|e| AppError::JumpHost(Box::new(e))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct AcceptedKeys {
    destination: Option<PublicKey>,
    jump: Option<PublicKey>,
}

/// Resolves the ordered authentication methods for `connection`: key first,
/// then password.
///
/// A key that cannot be read or parsed is skipped with a warning.
pub fn auth_methods(connection: &Connection) -> Result<Vec<AuthMethod>> {
    let mut methods = Vec::new();

    if let Some(key_path) = connection
        .private_key_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let path = expand_tilde(key_path);
        match russh::keys::load_secret_key(&path, connection.password.as_deref()) {
            Ok(key) => methods.push(AuthMethod::PublicKey(Arc::new(key))),
            Err(e) => {
                tracing::warn!(
                    "Skipping private key {} for {}: {}",
                    path.display(),
                    connection.host_port(),
                    e
                );
            }
        }
    }

    if let Some(password) = connection.password.as_deref().filter(|p| !p.is_empty()) {
        methods.push(AuthMethod::Password(password.to_string()));
    }

    if methods.is_empty() {
        return Err(AppError::NoAuthMethod);
    }
    Ok(methods)
}

/// Runs a fresh connect attempt for `connection`.
pub async fn connect(connection: &Connection, timeout: Duration) -> Result<ConnectOutcome> {
    connection.validate()?;
    establish(connection, AcceptedKeys::default(), None, timeout).await
}

/// Continues a paused attempt after the user accepted `pending.key`.
///
/// The key is also written to the known-hosts file; a write failure is only logged.
pub async fn resume(pending: PendingConnection, timeout: Duration) -> Result<ConnectOutcome> {
    let PendingConnection {
        connection,
        host_port,
        key,
        on_jump_host,
        jump,
        ..
    } = pending;

    let leg = if on_jump_host {
        connection.jump_connection()?
    } else {
        Some(connection.clone())
    };
    if let Some(leg) = leg
        && !leg.accept_unknown_host_keys
        && let Some(path) = leg.known_hosts_file()
        && let Err(e) = remember_host_key(&leg.host, leg.port, &key, &path)
    {
        tracing::warn!("Could not record host key for {}: {}", host_port, e);
    }

    let accepted = if on_jump_host {
        AcceptedKeys {
            destination: None,
            jump: Some(key),
        }
    } else {
        AcceptedKeys {
            destination: Some(key),
            jump: None,
        }
    };
    establish(&connection, accepted, jump, timeout).await
}

async fn establish(
    connection: &Connection,
    accepted: AcceptedKeys,
    jump: Option<SessionClient>,
    timeout: Duration,
) -> Result<ConnectOutcome> {
    // credentials are checked before anything touches the network
    let methods = match auth_methods(connection) {
        Ok(methods) => methods,
        Err(e) => {
            close_quietly(jump).await;
            return Err(e);
        }
    };

    let jump = match (jump, connection.jump_connection()) {
        (Some(client), _) => Some(client),
        (None, Err(e)) => return Err(AppError::JumpHost(Box::new(e))),
        (None, Ok(None)) => None,
        (None, Ok(Some(jump_connection))) => {
            let leg = Box::pin(establish(
                &jump_connection,
                AcceptedKeys {
                    destination: accepted.jump,
                    jump: None,
                },
                None,
                timeout,
            ))
            .await;
            match leg {
                Ok(ConnectOutcome::Connected(client)) => Some(client),
                Ok(ConnectOutcome::HostKeyPending(pending)) => {
                    tracing::info!("Jump host {} needs a host key decision", pending.host_port);
                    return Ok(ConnectOutcome::HostKeyPending(PendingConnection {
                        connection: connection.clone(),
                        on_jump_host: true,
                        ..pending
                    }));
                }
                Err(e) => return Err(AppError::JumpHost(Box::new(e))),
            }
        }
    };

    let policy = HostKeyPolicy::for_connection(connection, accepted.destination);
    let Some(jump) = jump else {
        return match SessionClient::open(connection, &methods, policy, timeout).await {
            Ok(client) => Ok(ConnectOutcome::Connected(client)),
            Err(e) => pending_or_error(connection, e, None),
        };
    };

    match SessionClient::open_via_jump(jump, connection, &methods, policy, timeout).await {
        Ok(client) => Ok(ConnectOutcome::Connected(client)),
        Err(JumpDialFailure {
            error: error @ AppError::HostKeyNotVerified { .. },
            jump,
        }) => pending_or_error(connection, error, Some(jump)),
        Err(JumpDialFailure { error, jump }) => {
            close_quietly(Some(jump)).await;
            Err(error)
        }
    }
}

fn pending_or_error(
    connection: &Connection,
    error: AppError,
    jump: Option<SessionClient>,
) -> Result<ConnectOutcome> {
    match error {
        AppError::HostKeyNotVerified {
            host_port,
            key,
            mismatch,
        } => {
            tracing::info!(
                "Host key for {} is {}",
                host_port,
                if mismatch { "different from the known one" } else { "unknown" }
            );
            let mut pending = PendingConnection::new(connection.clone(), host_port, *key, mismatch);
            pending.jump = jump;
            Ok(ConnectOutcome::HostKeyPending(pending))
        }
        other => Err(other),
    }
}

async fn close_quietly(client: Option<SessionClient>) {
    if let Some(client) = client {
        let target = client.target().to_string();
        if let Err(e) = client.close().await {
            tracing::warn!("Error closing {}: {}", target, e);
        }
    }
}

/// Runs [`connect`] in the background and reports exactly one event tagged
/// with `attempt`.
pub fn spawn_connect(connection: Connection, attempt: u64, timeout: Duration, tx: EventSender) {
    tokio::spawn(async move {
        let outcome = connect(&connection, timeout).await;
        deliver(outcome, attempt, tx).await;
    });
}

/// Runs [`resume`] in the background and reports exactly one event tagged
/// with `attempt`.
pub fn spawn_resume(pending: PendingConnection, attempt: u64, timeout: Duration, tx: EventSender) {
    tokio::spawn(async move {
        let outcome = resume(pending, timeout).await;
        deliver(outcome, attempt, tx).await;
    });
}

async fn deliver(outcome: Result<ConnectOutcome>, attempt: u64, tx: EventSender) {
    let event = match outcome {
        Ok(ConnectOutcome::Connected(client)) => AppEvent::Connected { attempt, client },
        Ok(ConnectOutcome::HostKeyPending(pending)) => AppEvent::HostKeyPending { attempt, pending },
        Err(error) => {
            tracing::error!("Connect attempt {} failed: {}", attempt, error);
            AppEvent::ConnectFailed { attempt, error }
        }
    };

    // the UI is gone; make sure nothing stays connected
    if let Err(tokio::sync::mpsc::error::SendError(event)) = tx.send(event).await {
        match event {
            AppEvent::Connected { client, .. } => close_quietly(Some(client)).await,
            AppEvent::HostKeyPending { pending, .. } => {
                if let Err(e) = pending.discard().await {
                    tracing::warn!("Error discarding pending connection: {}", e);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use russh::keys::PrivateKey;
    use russh::keys::ssh_key::{Algorithm, LineEnding};
    use tokio::net::TcpListener;

    use super::*;
    use crate::events::event_channel;

    fn write_key(dir: &std::path::Path) -> String {
        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap();
        let path = dir.join("id_ed25519");
        std::fs::write(&path, key.to_openssh(LineEnding::LF).unwrap().as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn no_credentials_means_no_auth_method() {
        let conn = Connection::new("example.com", 22, "alice");
        assert!(matches!(auth_methods(&conn), Err(AppError::NoAuthMethod)));

        let empty_password = Connection::new("example.com", 22, "alice").with_password("");
        assert!(matches!(
            auth_methods(&empty_password),
            Err(AppError::NoAuthMethod)
        ));
    }

    #[test]
    fn unreadable_key_falls_through_to_password() {
        let conn = Connection::new("example.com", 22, "alice")
            .with_private_key("/definitely/not/here/id_rsa")
            .with_password("secret");
        let methods = auth_methods(&conn).unwrap();
        assert_eq!(methods.len(), 1);
        assert!(matches!(methods[0], AuthMethod::Password(_)));

        let key_only = Connection::new("example.com", 22, "alice")
            .with_private_key("/definitely/not/here/id_rsa");
        assert!(matches!(auth_methods(&key_only), Err(AppError::NoAuthMethod)));
    }

    #[test]
    fn garbage_key_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_rsa");
        std::fs::write(&path, "not a key").unwrap();
        let conn = Connection::new("example.com", 22, "alice")
            .with_private_key(path.to_string_lossy())
            .with_password("secret");
        let methods = auth_methods(&conn).unwrap();
        assert_eq!(methods.len(), 1);
        assert!(matches!(methods[0], AuthMethod::Password(_)));
    }

    #[test]
    fn key_comes_before_password() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::new("example.com", 22, "alice")
            .with_private_key(write_key(dir.path()))
            .with_password("secret");
        let methods = auth_methods(&conn).unwrap();
        assert_eq!(methods.len(), 2);
        assert!(matches!(methods[0], AuthMethod::PublicKey(_)));
        assert!(matches!(methods[1], AuthMethod::Password(_)));
    }

    #[tokio::test]
    async fn connect_without_credentials_never_dials() {
        // TEST-NET-3: a dial here would hang until the timeout
        let conn = Connection::new("203.0.113.7", 22, "alice");
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            connect(&conn, Duration::from_secs(30)),
        )
        .await
        .expect("returned without dialing");
        assert!(matches!(result, Err(AppError::NoAuthMethod)));
    }

    #[tokio::test]
    async fn refused_dial_is_a_connection_error() {
        let port = closed_port().await;
        let conn = Connection::new("127.0.0.1", port, "alice").with_password("secret");
        let result = connect(&conn, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(AppError::SshConnectionError(_))));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let conn = Connection::new("127.0.0.1", port, "alice").with_password("secret");
        let result = connect(&conn, Duration::from_millis(300)).await;
        assert!(matches!(result, Err(AppError::ConnectTimeout(_))));
    }

    #[tokio::test]
    async fn jump_failure_is_wrapped() {
        let port = closed_port().await;
        let conn = Connection::new("10.0.0.5", 22, "alice")
            .with_password("secret")
            .with_jump_host(format!("bastion@127.0.0.1:{port}"));
        let err = connect(&conn, Duration::from_secs(5)).await.unwrap_err();
        let AppError::JumpHost(inner) = err else {
            panic!("expected a jump host error, got {err:?}");
        };
        assert!(matches!(*inner, AppError::SshConnectionError(_)));
    }

    #[tokio::test]
    async fn spawn_connect_reports_once_with_attempt_id() {
        let (tx, mut rx) = event_channel();
        spawn_connect(Connection::new("example.com", 22, "alice"), 7, Duration::from_secs(1), tx);

        match rx.recv().await {
            Some(AppEvent::ConnectFailed { attempt, error }) => {
                assert_eq!(attempt, 7);
                assert!(matches!(error, AppError::NoAuthMethod));
            }
            other => panic!("unexpected event {other:?}"),
        }
        // the task dropped its sender after its single report
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running ssh server"]
    async fn test_connect_unknown_host_key_pauses() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = Connection::new("127.0.0.1", 2222, "dockeruser").with_password("dockerpass");
        conn.known_hosts_path = Some(dir.path().join("known_hosts"));

        let outcome = connect(&conn, Duration::from_secs(10)).await.unwrap();
        let ConnectOutcome::HostKeyPending(pending) = outcome else {
            panic!("expected a host key prompt");
        };
        assert!(!pending.mismatch);
        assert!(pending.fingerprint.starts_with("SHA256:"));

        let outcome = resume(pending, Duration::from_secs(10)).await.unwrap();
        let ConnectOutcome::Connected(client) = outcome else {
            panic!("expected a connected client after accepting");
        };
        client.close().await.unwrap();
    }
}
