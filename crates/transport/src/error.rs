#![allow(missing_docs)]

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Failed when waiting for data channel open: {0}")]
    DataChannelOpen(String),

    #[error("Offer or answer {0} does not match any connection")]
    UnknownSdp(String),

    #[error("Connection {0} has no remote side, should handshake first")]
    ConnectionNotEstablished(String),

    #[error("Connection {0} is closed")]
    ConnectionClosed(String),

    #[error("Failed to lock connection state")]
    LockPoisoned,
}
