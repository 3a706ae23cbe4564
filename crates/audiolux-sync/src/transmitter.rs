//! Audio sync transmitter
//!
//! Broadcasts the local derived state to other controllers. Fire and forget:
//! no acknowledgement, no retry.

use crate::error::{Result, SyncError};
use crate::packet::SyncPacket;
use audiolux_core::{AudioReactiveConfig, DerivedAudioState};
use std::net::{SocketAddr, UdpSocket};

/// Minimum interval between two packets
pub const TRANSMIT_INTERVAL_MS: u64 = 20;

/// UDP sender for sync packets
pub struct SyncTransmitter {
    socket: UdpSocket,
    target: SocketAddr,
    last_send_ms: Option<u64>,
    sent: u64,
}

impl SyncTransmitter {
    /// Create a transmitter
    ///
    /// # Arguments
    /// * `target` - Destination, typically "255.255.255.255:11988"
    pub fn new(target: &str) -> Result<Self> {
        let target: SocketAddr = target.parse().map_err(|e| {
            SyncError::InvalidAddress(format!("Invalid sync target {}: {}", target, e))
        })?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| SyncError::SocketError(format!("Failed to bind sender: {}", e)))?;
        socket.set_broadcast(true)?;

        tracing::info!("Audio sync transmitter -> {}", target);

        Ok(Self {
            socket,
            target,
            last_send_ms: None,
            sent: 0,
        })
    }

    /// Create from `sync_target` and `sync_port`
    pub fn from_config(config: &AudioReactiveConfig) -> Result<Self> {
        Self::new(&format!("{}:{}", config.sync_target, config.sync_port))
    }

    /// Send the state unless the last packet went out less than
    /// [`TRANSMIT_INTERVAL_MS`] ago. Returns whether a packet was sent.
    pub fn maybe_transmit(&mut self, state: &DerivedAudioState, now_ms: u64) -> Result<bool> {
        if let Some(last) = self.last_send_ms {
            if now_ms.saturating_sub(last) < TRANSMIT_INTERVAL_MS {
                return Ok(false);
            }
        }

        // Count the attempt so a failing socket is not hammered every iteration
        self.last_send_ms = Some(now_ms);
        self.send(&SyncPacket::from_state(state))?;
        Ok(true)
    }

    /// Send one packet immediately
    pub fn send(&mut self, packet: &SyncPacket) -> Result<()> {
        self.socket.send_to(&packet.encode(), self.target)?;
        self.sent += 1;
        tracing::trace!("Sent audio sync packet #{} to {}", self.sent, self.target);
        Ok(())
    }

    /// Destination address
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Packets sent so far
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmitter_creation() {
        let transmitter = SyncTransmitter::new("255.255.255.255:11988");
        assert!(transmitter.is_ok());
    }

    #[test]
    fn test_invalid_target() {
        assert!(matches!(
            SyncTransmitter::new("invalid:address"),
            Err(SyncError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = AudioReactiveConfig {
            sync_target: "127.0.0.1".to_string(),
            sync_port: 12000,
            ..Default::default()
        };
        let transmitter = SyncTransmitter::from_config(&config).unwrap();
        assert_eq!(transmitter.target().port(), 12000);
    }

    #[test]
    fn test_rate_limit() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = receiver.local_addr().unwrap().to_string();
        let mut transmitter = SyncTransmitter::new(&target).unwrap();
        let state = DerivedAudioState::default();

        assert!(transmitter.maybe_transmit(&state, 1000).unwrap());
        assert!(!transmitter.maybe_transmit(&state, 1019).unwrap());
        assert!(transmitter.maybe_transmit(&state, 1020).unwrap());
        assert_eq!(transmitter.sent(), 2);
    }
}
