//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Protocol-related errors (realm or world leg).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid packet: {message}")]
    InvalidPacket { message: String },

    #[error("Unexpected opcode: expected {expected:#06X}, got {actual:#06X}")]
    UnexpectedOpcode { expected: u16, actual: u16 },

    #[error("Packet too short: need {needed} bytes, got {got}")]
    PacketTooShort { needed: usize, got: usize },

    #[error("Invalid string encoding: {message}")]
    InvalidString { message: String },

    #[error("Character not found: {name}")]
    CharacterNotFound { name: String },

    #[error("Realm not found: {name}")]
    RealmNotFound { name: String },

    #[error("Unusable world address: {address}")]
    BadRealmAddress { address: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors. Always recoverable: the reconnect
/// controller retries after the fixed delay.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("No packet received for {seconds}s")]
    IdleTimeout { seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication errors from either leg, classified for the
/// reconnect controller.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credential/ban/version class failures. Surfaced to the host,
    /// no reconnect.
    #[error("{reason}")]
    Fatal { reason: String },

    /// Wait-queue/db-busy class failures. Retried after the delay.
    #[error("{reason}")]
    Transient { reason: String },

    /// Non-zero security flag on the realm challenge.
    #[error("Two factor auth type {flag:#04X} not supported")]
    TwoFactorRequired { flag: u8 },
}

impl AuthError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::TwoFactorRequired { .. })
    }
}

/// Everything that can end a realm or world session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Fatal sessions are not reconnected; everything else restarts
    /// from realm logon. A missing realm or character and an
    /// unusable hand-off address never resolve on retry.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Auth(auth) => auth.is_fatal(),
            Self::Protocol(
                ProtocolError::RealmNotFound { .. }
                | ProtocolError::CharacterNotFound { .. }
                | ProtocolError::BadRealmAddress { .. },
            ) => true,
            Self::Connection(_) | Self::Protocol(_) => false,
        }
    }

    /// Process exit code for a fatal session error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Auth(auth) if auth.is_fatal() => 1,
            other if other.is_fatal() => 3,
            _ => 0,
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(ConnectionError::Io(e))
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<std::io::Error>() {
            Ok(io_err) => Self::Connection(ConnectionError::Io(io_err)),
            Err(e) => Self::Protocol(ProtocolError::InvalidPacket {
                message: e.to_string(),
            }),
        }
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
