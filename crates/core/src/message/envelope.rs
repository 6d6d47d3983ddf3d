//! Wire envelope of peer messages.
//!
//! Every frame on a link is one JSON encoded [Envelope], carried by
//! [TransportMessage::Custom](chordmesh_transport::core::transport::TransportMessage::Custom).
//! The variant is recognized by its correlation field: `req` for a query,
//! `call` for a correlated event, `res` for a reply, and none for a plain event.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::message::Event;
use crate::message::Query;

/// Correlation token of a pending call.
pub type Token = u64;

/// One frame on a peer link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// A query expecting a reply.
    Request {
        /// correlation token
        req: Token,
        /// method name
        method: String,
        /// method argument
        #[serde(default)]
        arg: Value,
    },
    /// An event expecting an empty reply.
    Call {
        /// correlation token
        call: Token,
        /// delivered event
        event: Event,
    },
    /// Outcome of a request or a call.
    Reply {
        /// token of the answered request
        res: Token,
        /// result on success
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ret: Option<Value>,
        /// rendered error on failure
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    /// A fire-and-forget event.
    Event(Event),
}

impl Envelope {
    /// Wrap a query.
    pub fn request(req: Token, query: &Query) -> Result<Self> {
        Ok(Self::Request {
            req,
            method: query.method().to_string(),
            arg: query.arg()?,
        })
    }

    /// Reply carrying the outcome of a handler.
    pub fn reply(res: Token, outcome: Result<Value>) -> Self {
        match outcome {
            Ok(ret) => Self::Reply {
                res,
                ret: Some(ret),
                err: None,
            },
            Err(e) => Self::Reply {
                res,
                ret: None,
                err: Some(e.to_string()),
            },
        }
    }

    /// Encode to bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Serialize)
    }

    /// Decode from bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(Error::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dht::Did;

    #[test]
    fn test_envelope_variants_on_the_wire() {
        let req = Envelope::request(3, &Query::FindSuccessorId(Did::from(200u32))).unwrap();
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"req": 3, "method": "findSuccessorId", "arg": "0xc8"})
        );

        let ok = Envelope::reply(3, Ok(json!("0xd0")));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"res": 3, "ret": "0xd0"})
        );
        let err = Envelope::reply(4, Err(Error::TtlExceeded));
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["res"], json!(4));
        assert!(v.get("ret").is_none());
        assert!(v["err"].is_string());

        let call = Envelope::Call {
            call: 5,
            event: Event::Ping,
        };
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"call": 5, "event": {"evt": "ping"}})
        );
    }

    #[test]
    fn test_envelope_decode_dispatch() {
        for (raw, expect) in [
            (
                r#"{"req": 1, "method": "id"}"#,
                Envelope::Request {
                    req: 1,
                    method: "id".into(),
                    arg: Value::Null,
                },
            ),
            (
                r#"{"res": 1, "ret": null}"#,
                Envelope::Reply {
                    res: 1,
                    ret: None,
                    err: None,
                },
            ),
            (
                r#"{"call": 9, "event": {"evt": "ping"}}"#,
                Envelope::Call {
                    call: 9,
                    event: Event::Ping,
                },
            ),
            (r#"{"evt": "ping"}"#, Envelope::Event(Event::Ping)),
        ] {
            assert_eq!(Envelope::from_slice(raw.as_bytes()).unwrap(), expect);
        }
        assert!(Envelope::from_slice(b"{\"hello\": 1}").is_err());
        assert!(Envelope::from_slice(b"not json").is_err());
    }
}
