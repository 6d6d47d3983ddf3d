//! The main concepts of this mod are:
//!
//! The [ConnectionInterface](transport::ConnectionInterface) trait defines how to
//! make an offer/answer handshake with a remote peer and then send messages to it.
//! See the [transport] module.
//!
//! The [TransportInterface](transport::TransportInterface) trait should be
//! implemented for each kind of connection. It creates connections and binds
//! a callback to each of them. See the [transport] module.
//!
//! The [TransportCallback](callback::TransportCallback) trait is used to let user handle
//! the events of a connection, including connection state change,
//! incoming messages and etc. See the [callback] module.

pub mod callback;
pub mod transport;
