//! Primary/relay template-distribution protocol: a primary node fans block
//! templates out to relay generators over a small framed binary protocol,
//! and each relay client falls back to independent mining if the primary
//! goes quiet for too long.

pub mod client;
pub mod frame;
pub mod peer;
pub mod primary;

pub use client::{ClientState, RelayClient, TemplateHandler};
pub use frame::{FrameError, MessageType, HEADER_LEN, MAGIC, MAX_PAYLOAD};
pub use peer::{PeerSlot, PeerTable, MAX_PEERS};
pub use primary::{BlockFoundHandler, RelayPrimary, DEFAULT_RELAY_PORT};
