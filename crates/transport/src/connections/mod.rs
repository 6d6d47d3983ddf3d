//! Connection implementations.

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryConnection;
#[cfg(feature = "memory")]
pub use memory::MemoryNetwork;
#[cfg(feature = "memory")]
pub use memory::MemoryTransport;
