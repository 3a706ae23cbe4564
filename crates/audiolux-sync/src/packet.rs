//! Audio sync packet
//!
//! Two fixed layouts exist on the wire. Both start with a 6-byte header; the
//! header is checked on the raw bytes and then exactly one layout is parsed.
//!
//! Current layout (header `"00002\0"`, packed, little-endian, 79 bytes):
//!
//! | offset | field            | type      |
//! |--------|------------------|-----------|
//! | 0      | header           | `[u8; 6]` |
//! | 6      | history          | `[u8; 32]`|
//! | 38     | sample_agc       | `f32`     |
//! | 42     | raw_sample_agc   | `f32`     |
//! | 46     | sample           | `f32`     |
//! | 50     | sample_avg       | `f32`     |
//! | 54     | sample_peak      | `u8`      |
//! | 55     | fft_result       | `[u8; 16]`|
//! | 71     | fft_magnitude    | `f32`     |
//! | 75     | fft_major_peak   | `f32`     |
//!
//! Legacy layout (any other header, naturally aligned, 88 bytes):
//!
//! | offset | field            | type      |
//! |--------|------------------|-----------|
//! | 0      | header           | `[u8; 6]` |
//! | 6      | history          | `[u8; 32]`|
//! | 40     | sample_agc       | `i32`     |
//! | 44     | sample           | `i32`     |
//! | 48     | sample_avg       | `f32`     |
//! | 52     | sample_peak      | `u8`      |
//! | 53     | fft_result       | `[u8; 16]`|
//! | 72     | fft_magnitude    | `f64`     |
//! | 80     | fft_major_peak   | `f64`     |
//!
//! The legacy layout has no raw AGC field; `sample_agc` stands in for it.

use audiolux_core::{DerivedAudioState, HISTORY_LEN, NUM_BUCKETS};

/// Header length in bytes
pub const HEADER_LEN: usize = 6;

/// Header of the current layout
pub const SYNC_HEADER: [u8; HEADER_LEN] = *b"00002\0";

/// Header written by [`SyncPacket::encode_legacy`]
pub const LEGACY_HEADER: [u8; HEADER_LEN] = *b"00001\0";

/// Size of a current-layout packet
pub const PACKET_SIZE: usize = 79;

/// Size of a legacy-layout packet
pub const LEGACY_PACKET_SIZE: usize = 88;

const HISTORY_OFFSET: usize = HEADER_LEN;

/// Which layout a datagram uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLayout {
    /// Packed layout with the raw AGC field
    Current,
    /// Older aligned layout
    Legacy,
}

impl PacketLayout {
    /// Decide from the raw header bytes
    pub fn detect(bytes: &[u8]) -> Self {
        if is_valid_header(bytes) {
            PacketLayout::Current
        } else {
            PacketLayout::Legacy
        }
    }

    /// Wire size of the layout
    pub fn size(&self) -> usize {
        match self {
            PacketLayout::Current => PACKET_SIZE,
            PacketLayout::Legacy => LEGACY_PACKET_SIZE,
        }
    }
}

/// True when `bytes` starts with the current header
pub fn is_valid_header(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_LEN && bytes[..HEADER_LEN] == SYNC_HEADER
}

/// Derived audio values as carried on the wire
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncPacket {
    /// Rolling AGC history
    pub history: [u8; HISTORY_LEN],
    /// Smoothed AGC sample
    pub sample_agc: f32,
    /// Unsmoothed AGC sample
    pub raw_sample_agc: f32,
    /// Gain-adjusted sample
    pub sample: f32,
    /// Averaged sample
    pub sample_avg: f32,
    /// Peak flag
    pub sample_peak: bool,
    /// Spectral buckets
    pub fft_result: [u8; NUM_BUCKETS],
    /// Magnitude of the dominant frequency
    pub fft_magnitude: f32,
    /// Dominant frequency in Hz
    pub fft_major_peak: f32,
}

fn read_f32(buf: &[u8], offset: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    f32::from_le_bytes(raw)
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

fn read_f64(buf: &[u8], offset: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    f64::from_le_bytes(raw)
}

impl SyncPacket {
    /// Snapshot the values to transmit
    pub fn from_state(state: &DerivedAudioState) -> Self {
        Self {
            history: state.history,
            sample_agc: state.sample_agc,
            raw_sample_agc: state.raw_sample_agc,
            sample: state.sample,
            sample_avg: state.sample_avg,
            sample_peak: state.sample_peak,
            fft_result: state.fft_result,
            fft_magnitude: state.fft_magnitude,
            fft_major_peak: state.fft_major_peak,
        }
    }

    /// Serialize in the current layout
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = vec![0u8; PACKET_SIZE];

        packet[0..6].copy_from_slice(&SYNC_HEADER);
        packet[6..38].copy_from_slice(&self.history);
        packet[38..42].copy_from_slice(&self.sample_agc.to_le_bytes());
        packet[42..46].copy_from_slice(&self.raw_sample_agc.to_le_bytes());
        packet[46..50].copy_from_slice(&self.sample.to_le_bytes());
        packet[50..54].copy_from_slice(&self.sample_avg.to_le_bytes());
        packet[54] = self.sample_peak as u8;
        packet[55..71].copy_from_slice(&self.fft_result);
        packet[71..75].copy_from_slice(&self.fft_magnitude.to_le_bytes());
        packet[75..79].copy_from_slice(&self.fft_major_peak.to_le_bytes());

        packet
    }

    /// Serialize in the legacy layout, for receivers that only know it
    pub fn encode_legacy(&self) -> Vec<u8> {
        let mut packet = vec![0u8; LEGACY_PACKET_SIZE];

        packet[0..6].copy_from_slice(&LEGACY_HEADER);
        packet[6..38].copy_from_slice(&self.history);
        packet[40..44].copy_from_slice(&(self.sample_agc as i32).to_le_bytes());
        packet[44..48].copy_from_slice(&(self.sample as i32).to_le_bytes());
        packet[48..52].copy_from_slice(&self.sample_avg.to_le_bytes());
        packet[52] = self.sample_peak as u8;
        packet[53..69].copy_from_slice(&self.fft_result);
        packet[72..80].copy_from_slice(&(self.fft_magnitude as f64).to_le_bytes());
        packet[80..88].copy_from_slice(&(self.fft_major_peak as f64).to_le_bytes());

        packet
    }

    /// Parse with a given layout. Short input is zero-padded, extra bytes are
    /// ignored.
    pub fn parse(bytes: &[u8], layout: PacketLayout) -> Self {
        let mut buf = vec![0u8; layout.size()];
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);

        let mut history = [0u8; HISTORY_LEN];
        history.copy_from_slice(&buf[HISTORY_OFFSET..HISTORY_OFFSET + HISTORY_LEN]);

        match layout {
            PacketLayout::Current => {
                let mut fft_result = [0u8; NUM_BUCKETS];
                fft_result.copy_from_slice(&buf[55..71]);
                Self {
                    history,
                    sample_agc: read_f32(&buf, 38),
                    raw_sample_agc: read_f32(&buf, 42),
                    sample: read_f32(&buf, 46),
                    sample_avg: read_f32(&buf, 50),
                    sample_peak: buf[54] != 0,
                    fft_result,
                    fft_magnitude: read_f32(&buf, 71),
                    fft_major_peak: read_f32(&buf, 75),
                }
            }
            PacketLayout::Legacy => {
                let mut fft_result = [0u8; NUM_BUCKETS];
                fft_result.copy_from_slice(&buf[53..69]);
                let sample_agc = read_i32(&buf, 40) as f32;
                Self {
                    history,
                    sample_agc,
                    raw_sample_agc: sample_agc,
                    sample: read_i32(&buf, 44) as f32,
                    sample_avg: read_f32(&buf, 48),
                    sample_peak: buf[52] != 0,
                    fft_result,
                    fft_magnitude: read_f64(&buf, 72) as f32,
                    fft_major_peak: read_f64(&buf, 80) as f32,
                }
            }
        }
    }

    /// Detect the layout from the header and parse. Empty input is no packet.
    pub fn decode(bytes: &[u8]) -> Option<(Self, PacketLayout)> {
        if bytes.is_empty() {
            return None;
        }
        let layout = PacketLayout::detect(bytes);
        Some((Self::parse(bytes, layout), layout))
    }

    /// Overwrite local state with the received values.
    ///
    /// The peak flag is only raised, never cleared, so an animation that has
    /// not consumed a local peak yet still sees it.
    pub fn apply_to(&self, state: &mut DerivedAudioState) {
        state.history = self.history;
        state.sample_agc = self.sample_agc;
        state.raw_sample_agc = self.raw_sample_agc;
        state.sample = self.sample;
        state.sample_avg = self.sample_avg;
        if !state.sample_peak {
            state.sample_peak = self.sample_peak;
        }
        state.fft_result = self.fft_result;
        state.fft_magnitude = self.fft_magnitude;
        state.fft_major_peak = self.fft_major_peak;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> SyncPacket {
        let mut packet = SyncPacket {
            sample_agc: 120.5,
            raw_sample_agc: 130.25,
            sample: 99.0,
            sample_avg: 87.75,
            sample_peak: true,
            fft_magnitude: 512.0,
            fft_major_peak: 440.0,
            ..Default::default()
        };
        for (i, slot) in packet.history.iter_mut().enumerate() {
            *slot = i as u8 * 7;
        }
        for (i, bucket) in packet.fft_result.iter_mut().enumerate() {
            *bucket = 250 - i as u8 * 10;
        }
        packet
    }

    #[test]
    fn test_current_packet_structure() {
        let bytes = sample_packet().encode();

        assert_eq!(bytes.len(), PACKET_SIZE);
        assert_eq!(&bytes[0..6], b"00002\0");
        assert_eq!(bytes[6 + 3], 21);
        assert_eq!(&bytes[38..42], &120.5f32.to_le_bytes());
        assert_eq!(bytes[54], 1);
        assert_eq!(bytes[55], 250);
        assert_eq!(&bytes[75..79], &440.0f32.to_le_bytes());
    }

    #[test]
    fn test_legacy_packet_structure() {
        let bytes = sample_packet().encode_legacy();

        assert_eq!(bytes.len(), LEGACY_PACKET_SIZE);
        assert_eq!(&bytes[40..44], &120i32.to_le_bytes());
        assert_eq!(bytes[52], 1);
        assert_eq!(&bytes[80..88], &440.0f64.to_le_bytes());
        // Padding stays zero
        assert_eq!(&bytes[38..40], &[0, 0]);
        assert_eq!(&bytes[69..72], &[0, 0, 0]);
    }

    #[test]
    fn test_detect_layout() {
        assert_eq!(PacketLayout::detect(b"00002\0rest"), PacketLayout::Current);
        assert_eq!(PacketLayout::detect(b"00001\0rest"), PacketLayout::Legacy);
        assert_eq!(PacketLayout::detect(b"0000"), PacketLayout::Legacy);
    }

    #[test]
    fn test_empty_is_no_packet() {
        assert!(SyncPacket::decode(&[]).is_none());
    }

    #[test]
    fn test_short_packet_zero_padded() {
        let bytes = sample_packet().encode();
        let (packet, layout) = SyncPacket::decode(&bytes[..40]).unwrap();
        assert_eq!(layout, PacketLayout::Current);
        assert_eq!(packet.history, sample_packet().history);
        assert_eq!(packet.sample_avg, 0.0);
        assert_eq!(packet.fft_result, [0; NUM_BUCKETS]);
    }

    #[test]
    fn test_oversized_packet_truncated() {
        let mut bytes = sample_packet().encode();
        bytes.extend_from_slice(&[0xFF; 64]);
        let (packet, _) = SyncPacket::decode(&bytes).unwrap();
        assert_eq!(packet, sample_packet());
    }

    #[test]
    fn test_apply_keeps_local_peak() {
        let mut state = DerivedAudioState {
            sample_peak: true,
            ..Default::default()
        };
        let packet = SyncPacket {
            sample_peak: false,
            fft_major_peak: 1000.0,
            ..Default::default()
        };
        packet.apply_to(&mut state);
        assert!(state.sample_peak);
        assert_eq!(state.fft_major_peak, 1000.0);
    }
}
