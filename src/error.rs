use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No authentication method available: set a password or a readable private key")]
    NoAuthMethod,

    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("SSH connection failed: {0}")]
    SshConnectionError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Host key for {host_port} is not trusted")]
    HostKeyNotVerified {
        host_port: String,
        key: Box<russh::keys::PublicKey>,
        mismatch: bool,
    },

    #[error("Jump host failed: {0}")]
    JumpHost(Box<AppError>),

    #[error("SSH write error: {0}")]
    SshWriteError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Russh error: {0}")]
    RusshError(#[from] russh::Error),

    #[error("{}", join_messages(.0))]
    Multiple(Vec<AppError>),
}

fn join_messages(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Folds the failures of several independent close/cleanup steps into one result.
pub fn join_errors(mut errors: Vec<AppError>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(AppError::Multiple(errors)),
    }
}

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;
