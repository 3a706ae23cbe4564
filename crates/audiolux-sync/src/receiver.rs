//! Audio sync receiver
//!
//! Polls a non-blocking UDP socket on its own cadence and overwrites the
//! local derived state with whatever arrived.

use crate::error::{Result, SyncError};
use crate::packet::{PacketLayout, SyncPacket};
use audiolux_core::DerivedAudioState;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

/// Largest datagram read in one go
const RECV_BUFFER_SIZE: usize = 1500;

/// Upper bound of datagrams drained in one poll
const MAX_DRAIN: usize = 64;

/// Counters for received packets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Packets in the current layout
    pub current: u64,
    /// Packets parsed with the legacy layout
    pub legacy: u64,
    /// Datagrams skipped because a newer one was queued behind them
    pub stale: u64,
}

/// Non-blocking UDP listener for sync packets
pub struct SyncReceiver {
    socket: UdpSocket,
    poll_delay_ms: u64,
    last_poll_ms: Option<u64>,
    buffer: Vec<u8>,
    stats: ReceiverStats,
}

impl SyncReceiver {
    /// Listen on `port` on all interfaces
    pub fn bind(port: u16, poll_delay_ms: u64) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).map_err(|e| {
            SyncError::SocketError(format!("Failed to bind audio sync port {}: {}", port, e))
        })?;
        socket.set_nonblocking(true)?;

        tracing::info!("Audio sync receiver listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            poll_delay_ms,
            last_poll_ms: None,
            buffer: vec![0u8; RECV_BUFFER_SIZE],
            stats: ReceiverStats::default(),
        })
    }

    /// Bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Packet counters
    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Drain the socket and decode the newest datagram, unless the last poll
    /// was too recent.
    ///
    /// Never blocks; no pending datagram means `Ok(None)`.
    pub fn poll(&mut self, now_ms: u64) -> Result<Option<(SyncPacket, PacketLayout)>> {
        if let Some(last) = self.last_poll_ms {
            if now_ms.saturating_sub(last) <= self.poll_delay_ms {
                return Ok(None);
            }
        }
        self.last_poll_ms = Some(now_ms);

        let mut newest = None;
        for _ in 0..MAX_DRAIN {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((len, from)) => {
                    tracing::trace!("Audio sync packet from {} ({} bytes)", from, len);
                    if newest.replace(len).is_some() {
                        self.stats.stale += 1;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        let Some(len) = newest else {
            return Ok(None);
        };

        let decoded = SyncPacket::decode(&self.buffer[..len]);
        if let Some((_, layout)) = &decoded {
            match layout {
                PacketLayout::Current => self.stats.current += 1,
                PacketLayout::Legacy => {
                    self.stats.legacy += 1;
                    if self.stats.legacy == 1 {
                        tracing::info!("Receiving legacy audio sync packets");
                    }
                }
            }
        }
        Ok(decoded)
    }

    /// Poll and apply a received packet to `state`. Returns whether one was applied.
    pub fn receive_into(&mut self, state: &mut DerivedAudioState, now_ms: u64) -> Result<bool> {
        match self.poll(now_ms)? {
            Some((packet, _)) => {
                packet.apply_to(state);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_pending() {
        let mut receiver = SyncReceiver::bind(0, 10).unwrap();
        assert!(receiver.poll(100).unwrap().is_none());
    }

    #[test]
    fn test_poll_delay() {
        let mut receiver = SyncReceiver::bind(0, 10).unwrap();
        let port = receiver.local_addr().unwrap().port();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        assert!(receiver.poll(100).unwrap().is_none());
        sender
            .send_to(&SyncPacket::default().encode(), ("127.0.0.1", port))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        // Too soon after the previous poll
        assert!(receiver.poll(105).unwrap().is_none());
        assert!(receiver.poll(111).unwrap().is_some());
        assert_eq!(receiver.stats().current, 1);
    }

    #[test]
    fn test_poll_keeps_only_newest() {
        let mut receiver = SyncReceiver::bind(0, 0).unwrap();
        let port = receiver.local_addr().unwrap().port();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        for value in [1.0, 2.0, 3.0] {
            let packet = SyncPacket {
                sample_agc: value,
                ..Default::default()
            };
            sender.send_to(&packet.encode(), ("127.0.0.1", port)).unwrap();
        }
        std::thread::sleep(std::time::Duration::from_millis(50));

        let (packet, _) = receiver.poll(1).unwrap().unwrap();
        assert_eq!(packet.sample_agc, 3.0);
        assert_eq!(receiver.stats().stale, 2);
        assert!(receiver.poll(2).unwrap().is_none());
    }
}
