//! Spectral analysis
//!
//! A dedicated thread reads blocks from the audio source, runs the FFT and
//! publishes both the raw block and the bucket spectrum as immutable
//! snapshots. The control loop only ever loads the latest snapshot.

pub mod analyzer;
pub mod task;

pub use analyzer::{
    SpectralAnalyzer, SpectralAnalyzerConfig, SpectrumSnapshot, BUCKET_EDGES_HZ,
    PINK_NOISE_WEIGHTS,
};
pub use task::{AnalysedBlock, SharedAudio, SpectralStats, SpectralTask};
