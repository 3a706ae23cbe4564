//! Configuration surface consumed by the audio pipeline
//!
//! The settings are owned by the host (web UI, settings storage) and only read
//! here. Every field has a default so partial files load cleanly.

use crate::error::{CoreError, Result};
use crate::logging::LogConfig;
use crate::mode::DEFAULT_AGC_EFFECTS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default UDP port for audio sync packets
pub const DEFAULT_SYNC_PORT: u16 = 11988;

/// Microphone interconnect, selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MicrophoneType {
    /// Analog microphone on the ADC, left channel only
    #[default]
    AnalogAdc,
    /// Generic I2S microphone
    GenericI2s,
    /// ES7243 I2S codec
    Es7243,
    /// SPH0645 I2S MEMS microphone
    Sph0645,
    /// Generic I2S microphone driven with a master clock
    I2sMasterClock,
    /// I2S PDM microphone
    I2sPdm,
}

impl MicrophoneType {
    /// Map the numeric selector used by the settings surface.
    ///
    /// Unknown selectors fall back to the analog microphone.
    pub fn from_selector(selector: u8) -> Self {
        match selector {
            0 => Self::AnalogAdc,
            1 => Self::GenericI2s,
            2 => Self::Es7243,
            3 => Self::Sph0645,
            4 => Self::I2sMasterClock,
            5 => Self::I2sPdm,
            other => {
                tracing::warn!(
                    "Unknown microphone selector {}, falling back to analog microphone",
                    other
                );
                Self::AnalogAdc
            }
        }
    }

    /// Numeric selector for this type
    pub fn selector(&self) -> u8 {
        match self {
            Self::AnalogAdc => 0,
            Self::GenericI2s => 1,
            Self::Es7243 => 2,
            Self::Sph0645 => 3,
            Self::I2sMasterClock => 4,
            Self::I2sPdm => 5,
        }
    }

    /// Sample resolution mask of the underlying converter
    pub fn sample_mask(&self) -> u32 {
        match self {
            Self::AnalogAdc => 0x0FFF,
            _ => 0xFFFF_FFFF,
        }
    }
}

impl fmt::Display for MicrophoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnalogAdc => write!(f, "Analog Microphone (left channel only)"),
            Self::GenericI2s => write!(f, "Generic I2S Microphone"),
            Self::Es7243 => write!(f, "ES7243 Microphone"),
            Self::Sph0645 => write!(f, "SPH0645 Microphone"),
            Self::I2sMasterClock => write!(f, "Generic I2S Microphone with Master Clock"),
            Self::I2sPdm => write!(f, "I2S PDM Microphone"),
        }
    }
}

/// Audio sync role bitmask (bit 0 = transmit, bit 1 = receive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SyncRole(u8);

impl SyncRole {
    /// Sync disabled
    pub const OFF: SyncRole = SyncRole(0);
    /// Broadcast local audio state
    pub const TRANSMIT: SyncRole = SyncRole(1 << 0);
    /// Take audio state from the network
    pub const RECEIVE: SyncRole = SyncRole(1 << 1);

    /// Build from raw bits, ignoring unknown bits
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b11)
    }

    /// Transmit bit set
    pub fn transmits(&self) -> bool {
        self.0 & Self::TRANSMIT.0 != 0
    }

    /// Receive bit set
    pub fn receives(&self) -> bool {
        self.0 & Self::RECEIVE.0 != 0
    }

    /// No role at all
    pub fn is_off(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SyncRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.transmits(), self.receives()) {
            (false, false) => write!(f, "off"),
            (true, false) => write!(f, "transmit"),
            (false, true) => write!(f, "receive"),
            (true, true) => write!(f, "transmit+receive"),
        }
    }
}

/// Which realtime protocol currently drives the LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeMode {
    /// No realtime protocol active
    #[default]
    Inactive,
    /// Generic realtime (JSON/live API)
    Generic,
    /// UDP pixel protocol
    Udp,
    /// Hyperion
    Hyperion,
    /// E1.31 streaming ACN
    E131,
    /// Adalight serial pixel protocol
    Adalight,
    /// Art-Net
    ArtNet,
    /// TPM2.NET
    Tpm2Net,
    /// Distributed Display Protocol
    Ddp,
}

impl RealtimeMode {
    /// Protocols that take complete control of all LEDs
    pub fn takes_full_control(&self) -> bool {
        matches!(
            self,
            Self::Generic | Self::E131 | Self::Udp | Self::Adalight | Self::ArtNet
        )
    }
}

/// User override of realtime mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeOverride {
    /// Realtime protocols are honoured
    #[default]
    None,
    /// Ignore realtime until it ends once
    Once,
    /// Always ignore realtime
    Always,
}

/// Audio-reactive settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioReactiveConfig {
    /// Microphone selector (0 = analog, 1..=5 I2S variants)
    pub microphone: u8,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Samples per audio block (FFT size)
    pub block_size: usize,
    /// AGC preset (0 = off, 1 = normal, 2 = vivid, 3 = lazy)
    pub agc_preset: u8,
    /// Noise gate threshold in microphone units
    pub squelch: f32,
    /// Manual sample gain (40 = unity)
    pub gain: f32,
    /// Initial input level control (0-255, 128 = unity)
    pub input_level: u8,
    /// FFT bin watched by the peak detector
    pub peak_bin: usize,
    /// Magnitude the peak bin must exceed
    pub peak_threshold: f32,
    /// How long a detected peak stays raised
    pub peak_hold_ms: u64,
    /// Smoothing factor for spectral buckets (0.0 = none)
    pub smoothing: f32,
    /// Audio sync role bitmask
    pub sync_role: SyncRole,
    /// UDP port for audio sync
    pub sync_port: u16,
    /// Destination host for transmitted packets
    pub sync_target: String,
    /// Minimum time between receive polls
    pub receive_delay_ms: u64,
    /// Restrict output to the main segment
    pub main_segment_only: bool,
    /// Realtime override selector
    pub realtime_override: RealtimeOverride,
    /// Realtime protocol currently active
    pub realtime_mode: RealtimeMode,
    /// Animation modes that visualise the AGC gain
    pub agc_effects: Vec<u8>,
    /// Animation mode selected at startup
    pub active_mode: u8,
    /// Emit a trace line with the loudness values every 20 ms
    pub log_audio: bool,
    /// Logging settings, the `[log]` table
    pub log: LogConfig,
}

impl Default for AudioReactiveConfig {
    fn default() -> Self {
        Self {
            microphone: 0,
            sample_rate: 10240,
            block_size: 512,
            agc_preset: 1,
            squelch: 10.0,
            gain: 60.0,
            input_level: 128,
            peak_bin: 8,
            peak_threshold: 10.0,
            peak_hold_ms: 50,
            smoothing: 0.0,
            sync_role: SyncRole::OFF,
            sync_port: DEFAULT_SYNC_PORT,
            sync_target: "255.255.255.255".to_string(),
            receive_delay_ms: 10,
            main_segment_only: false,
            realtime_override: RealtimeOverride::None,
            realtime_mode: RealtimeMode::Inactive,
            agc_effects: DEFAULT_AGC_EFFECTS.to_vec(),
            active_mode: 0,
            log_audio: false,
            log: LogConfig::default(),
        }
    }
}

impl AudioReactiveConfig {
    /// Selected microphone type
    pub fn microphone_type(&self) -> MicrophoneType {
        MicrophoneType::from_selector(self.microphone)
    }

    /// Check values the pipeline cannot work around
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 1000 {
            return Err(CoreError::InvalidConfig(format!(
                "sample_rate {} too low (min 1000)",
                self.sample_rate
            )));
        }
        if !(64..=8192).contains(&self.block_size) {
            return Err(CoreError::InvalidConfig(format!(
                "block_size {} out of range (64-8192)",
                self.block_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(CoreError::InvalidConfig(format!(
                "smoothing {} out of range (0.0-1.0)",
                self.smoothing
            )));
        }
        Ok(())
    }

    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("Audiolux");
            p.push("audio.toml");
            p
        })
    }

    /// Load from the default location; defaults when no file exists there
    pub fn load() -> Result<Self> {
        match Self::config_path().filter(|path| path.exists()) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from a TOML or JSON file (chosen by extension)
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML or JSON file (chosen by extension)
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self).map_err(|e| CoreError::ConfigParse(e.to_string()))?
        };
        fs::write(path, content)?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
