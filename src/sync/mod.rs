// Sync module - HOW NODES TALK
// Wire protocol, inbound message handling and the live peer set

mod gossip;
mod peer;
mod protocol;

pub use gossip::{Dispatch, GossipHandler, GossipStats};
pub use peer::{Broadcaster, PeerRegistry, PeerSummary};
pub use protocol::{Message, MessageType, ProtocolError};
