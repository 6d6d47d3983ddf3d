#![warn(missing_docs)]
//! This module defines the queries a ring node answers and the events peers exchange.
//! Queries are correlated, each one expects a reply. Events are fire-and-forget,
//! except when sent through [Hub::call](crate::hub::Hub::call).

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::Method;

/// Subscribers of a channel, subscriber id to last renewal in epoch ms.
pub type Subscribers = BTreeMap<Did, u64>;

/// Argument of [Query::Put].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PutArg {
    /// hashed key
    pub key: Did,
    /// value to store
    #[serde(rename = "val")]
    pub value: Value,
}

/// Argument of [Query::Subscribe] and [Query::Unsubscribe].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SubscribeArg {
    /// hashed channel key
    pub key: Did,
    /// subscriber
    pub id: Did,
}

#[derive(Deserialize, Serialize)]
struct RecQueryArg {
    id: Did,
    method: String,
    #[serde(default)]
    arg: Value,
    ttl: u32,
}

/// A request answered by a ring node.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
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
    /// The sender may be the predecessor
    Notify(Did),
    /// Keys of the local store
    Keys,
    /// Read a stored value
    Get(Did),
    /// Content hash of a stored value
    Hash(Did),
    /// Write a value
    Put(PutArg),
    /// Add or renew a subscriber
    Subscribe(SubscribeArg),
    /// Remove a subscriber
    Unsubscribe(SubscribeArg),
    /// Route `query` to the node responsible for `id`, within `ttl` hops.
    RecQuery {
        /// routing target
        id: Did,
        /// query answered by the responsible node
        query: Box<Query>,
        /// hops left
        ttl: u32,
    },
    /// Lookup the node responsible for an id
    FindSuccessorId(Did),
    /// Lookup the predecessor of the node responsible for an id
    FindPredecessorId(Did),
}

fn to_arg<T: Serialize>(v: &T) -> Result<Value> {
    serde_json::to_value(v).map_err(Error::Serialize)
}

fn from_arg<T: DeserializeOwned>(method: Method, arg: Value) -> Result<T> {
    serde_json::from_value(arg).map_err(|e| Error::MalformedRequest(method.to_string(), e))
}

/// Decode the `ret` of a reply.
pub fn from_ret<T: DeserializeOwned>(ret: Value) -> Result<T> {
    serde_json::from_value(ret).map_err(Error::Deserialize)
}

impl Query {
    /// The method of this query.
    pub fn method(&self) -> Method {
        match self {
            Query::Id => Method::Id,
            Query::SuccessorId => Method::SuccessorId,
            Query::PredecessorId => Method::PredecessorId,
            Query::SuccWithBackupIds => Method::SuccWithBackupIds,
            Query::PredWithBackupIds => Method::PredWithBackupIds,
            Query::Notify(_) => Method::Notify,
            Query::Keys => Method::Keys,
            Query::Get(_) => Method::Get,
            Query::Hash(_) => Method::Hash,
            Query::Put(_) => Method::Put,
            Query::Subscribe(_) => Method::Subscribe,
            Query::Unsubscribe(_) => Method::Unsubscribe,
            Query::RecQuery { .. } => Method::RecQuery,
            Query::FindSuccessorId(_) => Method::FindSuccessorId,
            Query::FindPredecessorId(_) => Method::FindPredecessorId,
        }
    }

    /// The wire argument of this query.
    pub fn arg(&self) -> Result<Value> {
        match self {
            Query::Id
            | Query::SuccessorId
            | Query::PredecessorId
            | Query::SuccWithBackupIds
            | Query::PredWithBackupIds
            | Query::Keys => Ok(Value::Null),
            Query::Notify(did)
            | Query::Get(did)
            | Query::Hash(did)
            | Query::FindSuccessorId(did)
            | Query::FindPredecessorId(did) => to_arg(did),
            Query::Put(arg) => to_arg(arg),
            Query::Subscribe(arg) | Query::Unsubscribe(arg) => to_arg(arg),
            Query::RecQuery { id, query, ttl } => to_arg(&RecQueryArg {
                id: id.clone(),
                method: query.method().to_string(),
                arg: query.arg()?,
                ttl: *ttl,
            }),
        }
    }

    /// Rebuild a query from its wire parts. An unknown method is an
    /// [Error::UnknownMethod], an argument of the wrong shape a [Error::MalformedRequest].
    pub fn from_parts(method: &str, arg: Value) -> Result<Self> {
        let method = Method::try_from(method)?;
        Ok(match method {
            Method::Id => Query::Id,
            Method::SuccessorId => Query::SuccessorId,
            Method::PredecessorId => Query::PredecessorId,
            Method::SuccWithBackupIds => Query::SuccWithBackupIds,
            Method::PredWithBackupIds => Query::PredWithBackupIds,
            Method::Keys => Query::Keys,
            Method::Notify => Query::Notify(from_arg(method, arg)?),
            Method::Get => Query::Get(from_arg(method, arg)?),
            Method::Hash => Query::Hash(from_arg(method, arg)?),
            Method::FindSuccessorId => Query::FindSuccessorId(from_arg(method, arg)?),
            Method::FindPredecessorId => Query::FindPredecessorId(from_arg(method, arg)?),
            Method::Put => Query::Put(from_arg(method, arg)?),
            Method::Subscribe => Query::Subscribe(from_arg(method, arg)?),
            Method::Unsubscribe => Query::Unsubscribe(from_arg(method, arg)?),
            Method::RecQuery => {
                let rec: RecQueryArg = from_arg(method, arg)?;
                Query::RecQuery {
                    id: rec.id,
                    query: Box::new(Query::from_parts(&rec.method, rec.arg)?),
                    ttl: rec.ttl,
                }
            }
        })
    }
}

/// Multi-target relay of an event.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ForwardPayload {
    /// final receivers
    pub targets: Vec<Did>,
    /// delivered event
    pub event: Box<Event>,
    /// hops left
    pub ttl: u32,
}

/// Asks the target to start accepting an introduced connection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SignalStart {
    /// initiator
    pub id: Did,
    /// introducer relaying the handshake
    pub proxy: Did,
    /// single use token correlating the handshake
    pub token: String,
}

/// A handshake step carrying only its token.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SignalToken {
    /// handshake token
    pub token: String,
}

/// A handshake step carrying an offer or an answer.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SignalSdp {
    /// handshake token
    pub token: String,
    /// offer or answer
    pub sdp: String,
}

/// Current subscriber set of a channel, pushed to the other subscribers.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    /// hashed channel key
    pub channel: Did,
    /// subscribers after the change
    pub subscribers: Subscribers,
}

/// Application message.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CustomMessage {
    /// original sender
    pub from: Did,
    /// application event name
    pub name: String,
    /// application payload
    pub data: Value,
}

/// Events exchanged between peers.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "evt", content = "data", rename_all = "kebab-case")]
pub enum Event {
    /// Relay to targets.
    Forward(ForwardPayload),
    /// Introduction request, relayed to the target.
    SignalStart(SignalStart),
    /// Target is ready for the offer.
    SignalReady(SignalToken),
    /// Offer of the initiator.
    SignalOffer(SignalSdp),
    /// Answer of the target.
    SignalAnswer(SignalSdp),
    /// Subscriber set changed.
    SubscriptionUpdate(SubscriptionUpdate),
    /// Liveness check.
    Ping,
    /// Application message.
    Message(CustomMessage),
}

impl Event {
    /// Short name of the event for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Forward(_) => "forward",
            Event::SignalStart(_) => "signal-start",
            Event::SignalReady(_) => "signal-ready",
            Event::SignalOffer(_) => "signal-offer",
            Event::SignalAnswer(_) => "signal-answer",
            Event::SubscriptionUpdate(_) => "subscription-update",
            Event::Ping => "ping",
            Event::Message(_) => "message",
        }
    }
}
