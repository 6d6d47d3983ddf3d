#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
pub mod config;
pub mod consts;
pub mod dht;
pub mod error;
pub mod hub;
pub mod inspect;
pub mod logging;
pub mod message;
pub mod storage;
pub mod swarm;
pub mod utils;

#[cfg(test)]
mod tests;
