//! Messages exchanged by ring nodes: the closed [Method] set, [Query] and [Event]
//! payloads, and the [Envelope] framing them on a link.

mod envelope;
pub use envelope::Envelope;
pub use envelope::Token;

mod method;
pub use method::Method;

pub mod types;
pub use types::*;
