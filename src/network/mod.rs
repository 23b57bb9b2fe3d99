// Network module
//
// Peer-facing collaborators of the ledger:
// - Peer registry
// - Transport capability and its HTTP implementation

pub mod http;
pub mod peers;
pub mod transport;

pub use http::{BlockEnvelope, HttpTransport};
pub use peers::PeerRegistry;
pub use transport::{BroadcastStatus, Transport};
