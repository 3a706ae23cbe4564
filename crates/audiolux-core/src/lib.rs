//! Audiolux Core - Audio Pipeline Building Blocks
//!
//! This crate contains everything the audio-reactive loop needs except the
//! network sync and the loop itself:
//! - Audio sources (live capture, WAV playback, synthetic)
//! - Automatic gain control and the input level coupling
//! - Spectral analysis on a dedicated thread
//! - Realtime arbitration
//! - Configuration and logging settings

#![warn(missing_docs)]

pub mod agc;
pub mod arbitrator;
pub mod config;
pub mod error;
pub mod input_level;
pub mod logging;
pub mod mode;
pub mod notifier;
pub mod source;
pub mod spectral;
pub mod state;

// --- Re-exports grouped by category ---

// AGC
pub use agc::{
    clamp_preset, preset_params, AgcEngine, AgcInput, AgcPreset, SamplerSettings, SoundSampler,
    AGC_PRESETS, NUM_PRESETS,
};
pub use input_level::{gain_to_input_level, update_input_level, InputLevelUpdate};

// Arbitration & modes
pub use arbitrator::{decide, Arbitration, ProcessingMode, RealtimeArbitrator};
pub use mode::{EffectCatalog, ModeObservation, ModeTracker, DEFAULT_AGC_EFFECTS};

// Configuration
pub use config::{
    AudioReactiveConfig, MicrophoneType, RealtimeMode, RealtimeOverride, SyncRole,
    DEFAULT_SYNC_PORT,
};
pub use logging::LogConfig;

// Interfaces
pub use notifier::{
    ChannelNotifier, InterfaceNotifier, InterfaceUpdate, LogNotifier,
    INTERFACE_UPDATE_COOLDOWN_MS,
};

// Audio & spectrum
pub use source::{open_source, AudioSample, AudioSource, SyntheticSource, WavFileSource};
pub use spectral::{
    AnalysedBlock, SharedAudio, SpectralAnalyzer, SpectralAnalyzerConfig, SpectralStats,
    SpectralTask, SpectrumSnapshot,
};

// State
pub use state::{
    history_slot, AgcControlState, DerivedAudioState, OperatingModeFlags, HISTORY_LEN, MAX_GAIN,
    MIN_GAIN, NUM_BUCKETS,
};

// Errors
pub use error::{CoreError, Result};
