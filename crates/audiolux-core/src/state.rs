//! Shared audio state
//!
//! `DerivedAudioState` is what the animation engine and the sync transmitter
//! read. One writer owns it at a time: the local pipeline in normal and
//! transmit mode, the sync receiver in receive mode.

use crate::config::{AudioReactiveConfig, RealtimeMode, RealtimeOverride, SyncRole};
use crate::spectral::SpectrumSnapshot;

/// Slots in the rolling AGC history
pub const HISTORY_LEN: usize = 32;

/// Number of spectral buckets
pub const NUM_BUCKETS: usize = 16;

/// Lower gain limit of the AGC multiplier
pub const MIN_GAIN: f32 = 1.0 / 64.0;

/// Upper gain limit of the AGC multiplier
pub const MAX_GAIN: f32 = 32.0;

/// History slot for a wall-clock time in milliseconds
pub fn history_slot(now_ms: u64) -> usize {
    (now_ms % HISTORY_LEN as u64) as usize
}

/// Derived loudness and spectrum values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedAudioState {
    /// Instantaneous gain-adjusted sample (0-255)
    pub sample: f32,
    /// Sample averaged over the last ~16 iterations
    pub sample_avg: f32,
    /// Smoothed AGC-corrected sample (0-255)
    pub sample_agc: f32,
    /// Unsmoothed AGC-corrected sample
    pub raw_sample_agc: f32,
    /// Peak detected and not yet consumed
    pub sample_peak: bool,
    /// Rolling AGC history, indexed by time modulo 32
    pub history: [u8; HISTORY_LEN],
    /// Spectral buckets (0-254)
    pub fft_result: [u8; NUM_BUCKETS],
    /// Magnitude of the dominant frequency
    pub fft_magnitude: f32,
    /// Dominant frequency in Hz
    pub fft_major_peak: f32,
}

impl DerivedAudioState {
    /// Store the current AGC value in the slot for `now_ms`
    pub fn record_history(&mut self, now_ms: u64) {
        self.history[history_slot(now_ms)] = self.sample_agc.clamp(0.0, 255.0) as u8;
    }

    /// Copy bucket and dominant-frequency results from the spectral task
    pub fn apply_spectrum(&mut self, spectrum: &SpectrumSnapshot) {
        self.fft_result = spectrum.buckets;
        self.fft_magnitude = spectrum.major_peak_magnitude;
        self.fft_major_peak = spectrum.major_peak_hz;
    }

    /// Consume the peak flag
    pub fn take_peak(&mut self) -> bool {
        std::mem::take(&mut self.sample_peak)
    }
}

/// Persistent variables of the AGC control loop
#[derive(Debug, Clone, PartialEq)]
pub struct AgcControlState {
    gain: f32,
    /// Input level the user last saw (or set)
    pub last_user_input_level: u8,
    /// Time of the last input-level push to the interfaces
    pub last_push_ms: u64,
    /// Time of the last user kick
    pub last_kick_ms: u64,
}

impl Default for AgcControlState {
    fn default() -> Self {
        Self {
            gain: 1.0,
            last_user_input_level: 0,
            last_push_ms: 0,
            last_kick_ms: 0,
        }
    }
}

impl AgcControlState {
    /// Current gain multiplier, always positive and finite
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set the gain multiplier, clamped to [`MIN_GAIN`, `MAX_GAIN`]
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = if gain.is_finite() {
            gain.clamp(MIN_GAIN, MAX_GAIN)
        } else {
            tracing::warn!("AGC gain became {}, resetting to 1.0", gain);
            1.0
        };
    }

    /// Multiply the gain by `factor`
    pub fn scale_gain(&mut self, factor: f32) {
        self.set_gain(self.gain * factor);
    }
}

/// Mode flags set by the host configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperatingModeFlags {
    /// Realtime protocol currently driving the LEDs
    pub realtime_mode: RealtimeMode,
    /// User override of realtime mode
    pub realtime_override: RealtimeOverride,
    /// Output restricted to the main segment
    pub main_segment_only: bool,
    /// Audio sync role
    pub sync_role: SyncRole,
}

impl From<&AudioReactiveConfig> for OperatingModeFlags {
    fn from(config: &AudioReactiveConfig) -> Self {
        Self {
            realtime_mode: config.realtime_mode,
            realtime_override: config.realtime_override,
            main_segment_only: config.main_segment_only,
            sync_role: config.sync_role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_stays_in_range() {
        let mut control = AgcControlState::default();
        control.set_gain(1000.0);
        assert_eq!(control.gain(), MAX_GAIN);

        control.set_gain(0.0);
        assert_eq!(control.gain(), MIN_GAIN);

        control.set_gain(f32::NAN);
        assert_eq!(control.gain(), 1.0);

        control.set_gain(f32::INFINITY);
        assert_eq!(control.gain(), 1.0);
    }

    #[test]
    fn test_record_history_clamps() {
        let mut state = DerivedAudioState {
            sample_agc: 300.0,
            ..Default::default()
        };
        state.record_history(33);
        assert_eq!(state.history[1], 255);

        state.sample_agc = -4.0;
        state.record_history(64);
        assert_eq!(state.history[0], 0);
    }

    #[test]
    fn test_take_peak() {
        let mut state = DerivedAudioState {
            sample_peak: true,
            ..Default::default()
        };
        assert!(state.take_peak());
        assert!(!state.take_peak());
    }

    #[test]
    fn test_flags_from_config() {
        let config = AudioReactiveConfig {
            main_segment_only: true,
            sync_role: SyncRole::RECEIVE,
            ..Default::default()
        };
        let flags = OperatingModeFlags::from(&config);
        assert!(flags.main_segment_only);
        assert!(flags.sync_role.receives());
    }
}
