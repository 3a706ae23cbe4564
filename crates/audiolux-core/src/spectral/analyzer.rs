//! Block FFT analysis
//!
//! Turns one raw block into 16 spectral buckets and a dominant-frequency
//! estimate. Every call analyses exactly one block; there is no overlap.

use crate::source::{AudioSample, MIC_FULL_SCALE};
use crate::state::NUM_BUCKETS;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::{debug, trace};

/// Bucket edges in Hz; bucket `i` spans `EDGES[i]..EDGES[i + 1]`
pub const BUCKET_EDGES_HZ: [f32; NUM_BUCKETS + 1] = [
    60.0, 80.0, 100.0, 140.0, 180.0, 240.0, 320.0, 420.0, 580.0, 740.0, 960.0, 1280.0, 1680.0,
    2220.0, 2940.0, 3880.0, 5120.0,
];

/// Pink-noise correction per bucket
pub const PINK_NOISE_WEIGHTS: [f32; NUM_BUCKETS] = [
    1.70, 1.71, 1.73, 1.78, 1.68, 1.56, 1.55, 1.63, 1.79, 1.62, 1.80, 2.06, 2.47, 3.35, 6.83, 9.55,
];

/// Scale from weighted magnitude (microphone units) to bucket value
const BUCKET_SCALE: f32 = 0.125;

/// Bins below this index are DC/rumble and never the dominant frequency
const FIRST_PEAK_BIN: usize = 3;

/// Spectral analysis results for one block
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSnapshot {
    /// Sequence number of the analysed block
    pub sequence: u64,
    /// Bucket values (0-254)
    pub buckets: [u8; NUM_BUCKETS],
    /// Dominant frequency in Hz
    pub major_peak_hz: f32,
    /// Magnitude of the dominant frequency
    pub major_peak_magnitude: f32,
    /// Per-bin magnitudes in microphone units (half the FFT size)
    pub bins: Vec<f32>,
}

impl Default for SpectrumSnapshot {
    fn default() -> Self {
        Self {
            sequence: 0,
            buckets: [0; NUM_BUCKETS],
            major_peak_hz: 0.0,
            major_peak_magnitude: 0.0,
            bins: Vec::new(),
        }
    }
}

impl SpectrumSnapshot {
    /// Magnitude of one bin, zero when out of range
    pub fn bin(&self, index: usize) -> f32 {
        self.bins.get(index).copied().unwrap_or(0.0)
    }
}

/// Configuration for [`SpectralAnalyzer`]
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralAnalyzerConfig {
    /// Sample rate of the source
    pub sample_rate: u32,
    /// FFT size; shorter blocks are zero-padded
    pub block_size: usize,
    /// Bucket smoothing factor (0.0 = none)
    pub smoothing: f32,
}

impl Default for SpectralAnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 10240,
            block_size: 512,
            smoothing: 0.0,
        }
    }
}

/// FFT analyzer with preallocated buffers
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    config: SpectralAnalyzerConfig,
    fft_buffer: Vec<Complex<f32>>,
    scratch_buffer: Vec<Complex<f32>>,
    window: Vec<f32>,
    bucket_bins: [(usize, usize); NUM_BUCKETS],
    smoothed_buckets: [f32; NUM_BUCKETS],
    fft_count: u64,
}

impl SpectralAnalyzer {
    /// Create an analyzer for the given configuration
    pub fn new(config: SpectralAnalyzerConfig) -> Self {
        let fft_size = config.block_size.max(4);

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        // Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        let bucket_bins = Self::bucket_bins(config.sample_rate, fft_size);

        debug!(
            "SpectralAnalyzer created: sample_rate={}, fft_size={}, bin_width={:.1} Hz",
            config.sample_rate,
            fft_size,
            config.sample_rate as f32 / fft_size as f32
        );

        Self {
            fft,
            config,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); scratch_len],
            window,
            bucket_bins,
            smoothed_buckets: [0.0; NUM_BUCKETS],
            fft_count: 0,
        }
    }

    /// Bin range `[lo, hi)` of every bucket, clipped to Nyquist
    fn bucket_bins(sample_rate: u32, fft_size: usize) -> [(usize, usize); NUM_BUCKETS] {
        let half = fft_size / 2;
        let bin_width = sample_rate as f32 / fft_size as f32;
        let to_bin = |hz: f32| ((hz / bin_width).round() as usize).clamp(1, half);

        let mut ranges = [(0, 0); NUM_BUCKETS];
        for (i, range) in ranges.iter_mut().enumerate() {
            let lo = to_bin(BUCKET_EDGES_HZ[i]).min(half - 1);
            let hi = to_bin(BUCKET_EDGES_HZ[i + 1]).max(lo + 1).min(half);
            *range = (lo, hi);
        }
        ranges
    }

    /// Analyse one block
    pub fn analyze(&mut self, block: &AudioSample) -> SpectrumSnapshot {
        let fft_size = self.fft_buffer.len();
        let half = fft_size / 2;
        self.fft_count += 1;

        let samples = &block.samples[..block.samples.len().min(fft_size)];
        let finite = |s: f32| if s.is_finite() { s } else { 0.0 };
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|&s| finite(s)).sum::<f32>() / samples.len() as f32
        };

        // DC removal + window, zero-padded
        for i in 0..fft_size {
            let value = samples.get(i).map(|&s| finite(s) - mean).unwrap_or(0.0);
            self.fft_buffer[i] = Complex::new(value * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        // Amplitude in microphone units; the Hann window halves a pure tone
        let norm = 4.0 / fft_size as f32 * MIC_FULL_SCALE;
        let bins: Vec<f32> = self.fft_buffer[..half]
            .iter()
            .map(|c| c.norm() * norm)
            .collect();

        let mut buckets = [0u8; NUM_BUCKETS];
        let smoothing = self.config.smoothing;
        for (i, &(lo, hi)) in self.bucket_bins.iter().enumerate() {
            let range = &bins[lo.min(half)..hi.min(half)];
            let avg = if range.is_empty() {
                0.0
            } else {
                range.iter().sum::<f32>() / range.len() as f32
            };
            let value = avg * PINK_NOISE_WEIGHTS[i] * BUCKET_SCALE;
            self.smoothed_buckets[i] = self.smoothed_buckets[i] * smoothing + value * (1.0 - smoothing);
            buckets[i] = self.smoothed_buckets[i].clamp(0.0, 254.0) as u8;
        }

        let (major_peak_hz, major_peak_magnitude) = self.major_peak(&bins);

        if self.fft_count % 500 == 0 {
            trace!(
                "FFT #{}: peak {:.0} Hz ({:.1}), buckets {:?}",
                self.fft_count,
                major_peak_hz,
                major_peak_magnitude,
                &buckets[..4]
            );
        }

        SpectrumSnapshot {
            sequence: block.sequence,
            buckets,
            major_peak_hz,
            major_peak_magnitude,
            bins,
        }
    }

    /// Strongest bin above the DC region, refined by parabolic interpolation
    fn major_peak(&self, bins: &[f32]) -> (f32, f32) {
        if bins.len() <= FIRST_PEAK_BIN + 1 {
            return (0.0, 0.0);
        }
        let (index, &magnitude) = bins
            .iter()
            .enumerate()
            .skip(FIRST_PEAK_BIN)
            .fold((FIRST_PEAK_BIN, &0.0f32), |best, (i, m)| {
                if *m > *best.1 {
                    (i, m)
                } else {
                    best
                }
            });

        if magnitude <= f32::EPSILON {
            return (0.0, 0.0);
        }

        let bin_width = self.config.sample_rate as f32 / self.fft_buffer.len() as f32;
        let delta = if index + 1 < bins.len() {
            let (a, b, c) = (bins[index - 1], bins[index], bins[index + 1]);
            let denom = a - 2.0 * b + c;
            if denom.abs() > f32::EPSILON {
                (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            }
        } else {
            0.0
        };

        ((index as f32 + delta) * bin_width, magnitude)
    }

    /// Number of blocks analysed so far
    pub fn fft_count(&self) -> u64 {
        self.fft_count
    }

    /// Current configuration
    pub fn config(&self) -> &SpectralAnalyzerConfig {
        &self.config
    }
}
