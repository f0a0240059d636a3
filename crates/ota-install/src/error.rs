//! Error types for session startup and payload delivery.
//!
//! Startup failures are returned from [`crate::InstallSession::start`];
//! delivery failures travel through the status channel inside
//! [`crate::Status::Completed`].

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors raised while starting a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("tls setup failed: {0}")]
    Tls(#[from] TlsConfigError),
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
    #[error("invalid app metadata: {0}")]
    InvalidMetadata(String),
}

/// Problems with the TLS material or its binding to the advertised hostname.
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificate found in {0:?}")]
    MissingCertificate(PathBuf),
    #[error("no private key found in {0:?}")]
    MissingKey(PathBuf),
    #[error("tls_cert and tls_key must be set together")]
    Incomplete,
    #[error("certificate parse failed: {0}")]
    Parse(String),
    #[error("certificate does not cover hostname {hostname} (names: {names:?})")]
    HostnameMismatch { hostname: String, names: Vec<String> },
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),
    #[error("rustls rejected the identity: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Why a payload transfer did not complete.
///
/// Cloneable so it can sit inside [`crate::Status`]; I/O errors are kept as
/// their rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("open {path:?}: {message}")]
    Open { path: PathBuf, message: String },
    #[error("read failed after {sent} bytes: {message}")]
    Read { sent: u64, message: String },
    #[error("package ended after {sent} of {expected} bytes")]
    Truncated { sent: u64, expected: u64 },
    #[error("client disconnected after {sent} bytes")]
    ClientDisconnected { sent: u64 },
}

/// Unrecoverable runtime fault that leaves the session broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFault {
    #[error("http server stopped: {0}")]
    Server(String),
}
