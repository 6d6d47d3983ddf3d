//! Methods a ring node answers.
#![warn(missing_docs)]

use crate::error::Error;
use crate::error::Result;

/// supported methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Own id
    Id,
    /// Current successor
    SuccessorId,
    /// Current predecessor
    PredecessorId,
    /// Successor followed by its backups
    SuccWithBackupIds,
    /// Predecessor followed by its backups
    PredWithBackupIds,
    /// Offer the sender as predecessor
    Notify,
    /// Keys of the local store
    Keys,
    /// Read a stored value
    Get,
    /// Content hash of a stored value
    Hash,
    /// Write a value
    Put,
    /// Add or renew a subscriber of a channel
    Subscribe,
    /// Remove a subscriber of a channel
    Unsubscribe,
    /// Route a query to the node responsible for an id
    RecQuery,
    /// Lookup the node responsible for an id
    FindSuccessorId,
    /// Lookup the predecessor of the node responsible for an id
    FindPredecessorId,
}

impl Method {
    /// Return method's name as `&str`
    pub fn as_str(&self) -> &str {
        match self {
            Method::Id => "id",
            Method::SuccessorId => "successorId",
            Method::PredecessorId => "predecessorId",
            Method::SuccWithBackupIds => "succWithBackupIds",
            Method::PredWithBackupIds => "predWithBackupIds",
            Method::Notify => "notify",
            Method::Keys => "keys",
            Method::Get => "get",
            Method::Hash => "hash",
            Method::Put => "put",
            Method::Subscribe => "subscribe",
            Method::Unsubscribe => "unsubscribe",
            Method::RecQuery => "recQuery",
            Method::FindSuccessorId => "findSuccessorId",
            Method::FindPredecessorId => "findPredecessorId",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Method {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Ok(match value {
            "id" => Method::Id,
            "successorId" => Method::SuccessorId,
            "predecessorId" => Method::PredecessorId,
            "succWithBackupIds" => Method::SuccWithBackupIds,
            "predWithBackupIds" => Method::PredWithBackupIds,
            "notify" => Method::Notify,
            "keys" => Method::Keys,
            "get" => Method::Get,
            "hash" => Method::Hash,
            "put" => Method::Put,
            "subscribe" => Method::Subscribe,
            "unsubscribe" => Method::Unsubscribe,
            "recQuery" => Method::RecQuery,
            "findSuccessorId" => Method::FindSuccessorId,
            "findPredecessorId" => Method::FindPredecessorId,
            _ => return Err(Error::UnknownMethod(value.to_string())),
        })
    }
}
