//! Error of chordmesh_core

use crate::dht::Did;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in chordmesh-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A lookup or forward ran out of hops.
    #[error("Lookup or forward exceeded its hop budget")]
    TtlExceeded,

    /// No answer or connection from the peer within the deadline.
    #[error("Waiting on {0} timed out")]
    LinkTimeout(Did),

    /// No finger or link leads towards the destination.
    #[error("No route to {0}")]
    NoRoute(Did),

    /// Every join attempt through the bootstrap peer failed.
    #[error("Failed to join the ring via {0} after {1} attempts")]
    JoinFailure(Did, usize),

    /// The request names a method this node does not serve.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The request body does not fit its method.
    #[error("Malformed request for {0}: {1}")]
    MalformedRequest(String, #[source] serde_json::Error),

    /// An outgoing message could not be encoded.
    #[error("Failed to serialize: {0}")]
    Serialize(#[source] serde_json::Error),

    /// An incoming message could not be decoded.
    #[error("Failed to deserialize: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// The peer handled the request and answered with an error.
    #[error("Remote peer {0} answered with error: {1}")]
    RemoteError(Did, String),

    /// No live link can relay a handshake to the peer.
    #[error("No live link can introduce {0}")]
    NoIntroducer(Did),

    /// A connection to the peer failed recently and is not retried yet.
    #[error("Connection to {0} has just failed, retry later")]
    ConnectBackoff(Did),

    /// The handshake with the peer failed.
    #[error("Failed to connect {0}: {1}")]
    ConnectFailed(Did, String),

    /// There is no established link to the peer.
    #[error("Connection {0} is not established")]
    ConnectionNotFound(Did),


    /// A node never links to itself.
    #[error("Should not connect to self")]
    ShouldNotConnectSelf,

    /// The hub was torn down while waiting.
    #[error("Connection hub was destroyed")]
    HubDestroyed,

    /// The swarm was dropped or stopped.
    #[error("Swarm is not running")]
    SwarmStopped,

    /// `start` was called on a running swarm.
    #[error("Swarm is already running")]
    SwarmAlreadyStarted,

    /// Wrapped transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] chordmesh_transport::error::Error),

    /// The ring lock is poisoned.
    #[error("Failed to get dht from a sync lock")]
    DHTSyncLockError,

    /// The callback lock is poisoned.
    #[error("Failed to get callback from a sync lock")]
    CallbackSyncLockError,

    /// Unknown logging level name.
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String),

    /// The text is not an identifier.
    #[error("Invalid identifier: {0}")]
    InvalidDid(String),

    /// Identifier width out of range.
    #[error("Identifier width must be within 1..={max} bits, got {0}", max = crate::consts::MAX_ID_BITS)]
    InvalidIdBits(u32),

    /// A config value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Config file is not valid yaml.
    #[error("Failed to load config: {0}")]
    ConfigYaml(#[from] serde_yaml::Error),

    /// Reading a config file failed.
    #[error("IOError: {0}")]
    IOError(#[from] std::io::Error),

}

impl Error {
    /// Whether the error means the link to the peer is unusable,
    /// in contrast to a failure of one request over a healthy link.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Error::LinkTimeout(_)
                | Error::ConnectFailed(_, _)
                | Error::ConnectBackoff(_)
                | Error::ConnectionNotFound(_)
                | Error::NoIntroducer(_)
                | Error::Transport(_)
                | Error::Serialize(_)
        )
    }
}
