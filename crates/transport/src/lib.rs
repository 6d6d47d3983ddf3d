#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
pub mod callback;
pub mod connections;
pub mod core;
pub mod error;
pub mod notifier;

#[cfg(feature = "memory")]
pub use connections::MemoryConnection as Connection;
#[cfg(feature = "memory")]
pub use connections::MemoryTransport as Transport;
