#![warn(missing_docs)]
//! Implementation of the ring's DHT
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

mod chord;
pub mod did;
/// Finger table of a ring node
pub mod finger;
pub mod successor;

pub use chord::RingNode;
pub use chord::RingRpc;
pub use did::in_range;
pub use did::Did;
pub use did::IdSpace;
pub use finger::FingerTable;
pub use successor::BackupList;

