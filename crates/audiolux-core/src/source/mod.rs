//! Audio sources
//!
//! The rest of the pipeline only sees the [`AudioSource`] capability. The
//! concrete source is chosen once at startup by [`open_source`] and then moved
//! onto the spectral thread, which is the only caller of `read_block`.
//!
//! ## Variants
//!
//! - [`CaptureSource`]: live input via `cpal` (feature `capture`)
//! - [`WavFileSource`]: replays a WAV file in a loop
//! - [`SyntheticSource`]: tone and burst generator for tests and demos

#[cfg(feature = "capture")]
pub mod capture;
pub mod synthetic;
pub mod wav;

#[cfg(feature = "capture")]
pub use capture::CaptureSource;
pub use synthetic::SyntheticSource;
pub use wav::WavFileSource;

use crate::config::{AudioReactiveConfig, MicrophoneType};
use crate::error::Result;
use std::path::Path;

/// Microphone units per full-scale sample (12-bit ADC, centered)
pub const MIC_FULL_SCALE: f32 = 2048.0;

/// Microphone capability
pub trait AudioSource: Send {
    /// Bring up the hardware. Called once, on the thread that reads blocks.
    fn initialize(&mut self) -> Result<()>;

    /// Fill `out` with the next block of mono samples in -1.0..=1.0
    fn read_block(&mut self, out: &mut [f32]) -> Result<()>;

    /// Effective sample rate (valid after `initialize`)
    fn sample_rate(&self) -> u32;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn initialize(&mut self) -> Result<()> {
        (**self).initialize()
    }

    fn read_block(&mut self, out: &mut [f32]) -> Result<()> {
        (**self).read_block(out)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// One block of raw samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioSample {
    /// Block counter, increases by one per read
    pub sequence: u64,
    /// Mono samples in -1.0..=1.0
    pub samples: Vec<f32>,
}

impl AudioSample {
    /// Wrap a block
    pub fn new(sequence: u64, samples: Vec<f32>) -> Self {
        Self { sequence, samples }
    }

    /// Largest deviation from the block mean, in microphone units
    pub fn level(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        let peak = self
            .samples
            .iter()
            .map(|s| (s - mean).abs())
            .fold(0.0f32, f32::max);
        if peak.is_finite() {
            peak * MIC_FULL_SCALE
        } else {
            0.0
        }
    }
}

/// Reduce a sample to the resolution of the microphone's converter
pub fn quantize(mic: MicrophoneType, sample: f32) -> f32 {
    let mask = mic.sample_mask();
    if mask == u32::MAX {
        return sample;
    }
    let half_range = (mask as f32 + 1.0) / 2.0;
    (sample * half_range).round() / half_range
}

/// Select and construct the audio source for this run.
///
/// A WAV path takes precedence over live capture. Without the `capture`
/// feature the synthetic source stands in for the microphone.
pub fn open_source(
    config: &AudioReactiveConfig,
    input: Option<&Path>,
) -> Result<Box<dyn AudioSource>> {
    let mic = config.microphone_type();

    if let Some(path) = input {
        let source = WavFileSource::open(path, mic)?;
        return Ok(Box::new(source));
    }

    #[cfg(feature = "capture")]
    {
        Ok(Box::new(CaptureSource::new(mic, config.sample_rate)))
    }

    #[cfg(not(feature = "capture"))]
    {
        tracing::warn!("Built without live capture, using synthetic audio for {}", mic);
        Ok(Box::new(
            SyntheticSource::new(config.sample_rate)
                .with_microphone(mic)
                .with_bursts(500)
                .paced(true),
        ))
    }
}
