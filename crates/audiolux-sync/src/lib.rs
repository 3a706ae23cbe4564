//! Audiolux Sync - Audio State over UDP
//!
//! Lets one microphone drive many controllers. A transmitter broadcasts the
//! derived audio state every 20 ms; receivers overwrite their local state
//! with it. Older packets in the legacy layout are still understood.

#![warn(missing_docs)]

pub mod error;
pub mod packet;
pub mod receiver;
pub mod transmitter;

pub use error::{Result, SyncError};
pub use packet::{
    is_valid_header, PacketLayout, SyncPacket, LEGACY_HEADER, LEGACY_PACKET_SIZE, PACKET_SIZE,
    SYNC_HEADER,
};
pub use receiver::{ReceiverStats, SyncReceiver};
pub use transmitter::{SyncTransmitter, TRANSMIT_INTERVAL_MS};
