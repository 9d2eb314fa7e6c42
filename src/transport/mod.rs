// Transport module - THE WIRE
// TCP peer links carrying newline-delimited JSON frames

mod tcp;
mod traits;

pub use traits::{
    // Connection handles
    ConnectionId, ConnectionState, Direction,
    // Configuration
    TransportConfig,
    // Errors
    TransportError,
};

pub use tcp::{dial, normalize_address, Frame, FrameReader, PeerConnection};
