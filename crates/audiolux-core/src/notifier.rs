//! Interface notification
//!
//! When the AGC moves the input level far enough, connected user interfaces
//! are told about it. Delivery is the host's business; this module only
//! defines the seam and two simple implementations.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info};

/// Global minimum interval between two interface updates. Shorter than the
/// smallest push tier so that tier stays reachable after a push.
pub const INTERFACE_UPDATE_COOLDOWN_MS: u64 = 1000;

/// Update sent to user interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceUpdate {
    /// Input level slider changed
    InputLevel {
        /// New slider value
        level: u8,
        /// Time of the change
        at_ms: u64,
    },
}

/// Receives input-level pushes
pub trait InterfaceNotifier: Send {
    /// Time of the last update of any kind, if there was one
    fn last_update_ms(&self) -> Option<u64>;

    /// Tell the interfaces about a new input level
    fn notify_input_level(&mut self, level: u8, now_ms: u64);

    /// True when the global cooldown has elapsed
    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        self.last_update_ms()
            .map_or(true, |last| now_ms.saturating_sub(last) > INTERFACE_UPDATE_COOLDOWN_MS)
    }
}

/// Forwards updates over a bounded channel
pub struct ChannelNotifier {
    tx: Sender<InterfaceUpdate>,
    last_update_ms: Option<u64>,
    dropped: u64,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end for the host
    pub fn new(capacity: usize) -> (Self, Receiver<InterfaceUpdate>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                tx,
                last_update_ms: None,
                dropped: 0,
            },
            rx,
        )
    }

    /// Record an update made by some other part of the host
    pub fn record_external_update(&mut self, now_ms: u64) {
        self.last_update_ms = Some(now_ms);
    }

    /// Updates dropped because the host was not reading
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl InterfaceNotifier for ChannelNotifier {
    fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }

    fn notify_input_level(&mut self, level: u8, now_ms: u64) {
        self.last_update_ms = Some(now_ms);
        match self.tx.try_send(InterfaceUpdate::InputLevel { level, at_ms: now_ms }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!("Interface queue full, dropped input level {}", level);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }
}

/// Logs updates instead of delivering them
#[derive(Debug, Default)]
pub struct LogNotifier {
    last_update_ms: Option<u64>,
}

impl InterfaceNotifier for LogNotifier {
    fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }

    fn notify_input_level(&mut self, level: u8, now_ms: u64) {
        self.last_update_ms = Some(now_ms);
        info!("Input level now {}", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown() {
        let mut notifier = LogNotifier::default();
        assert!(notifier.cooldown_elapsed(0));

        notifier.notify_input_level(100, 5000);
        assert!(!notifier.cooldown_elapsed(5500));
        assert!(!notifier.cooldown_elapsed(6000));
        assert!(notifier.cooldown_elapsed(6001));
    }

    #[test]
    fn test_channel_delivery_and_drop() {
        let (mut notifier, rx) = ChannelNotifier::new(1);
        notifier.notify_input_level(10, 100);
        notifier.notify_input_level(20, 200);

        assert_eq!(
            rx.try_recv().unwrap(),
            InterfaceUpdate::InputLevel { level: 10, at_ms: 100 }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(notifier.dropped(), 1);
        assert_eq!(notifier.last_update_ms(), Some(200));
    }

    #[test]
    fn test_external_update_counts_for_cooldown() {
        let (mut notifier, _rx) = ChannelNotifier::new(4);
        notifier.record_external_update(1000);
        assert!(!notifier.cooldown_elapsed(1800));
    }
}
