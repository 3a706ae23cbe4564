//! Automatic gain control
//!
//! Two stages run once per sampled iteration:
//!
//! 1. [`SoundSampler`] turns the block level into `sample`/`sample_avg`,
//!    tracks the noise floor and the running maximum, and detects peaks.
//! 2. [`AgcEngine`] runs a PI controller that moves the gain multiplier so
//!    the loudest recent signal lands on one of two set-points, then
//!    produces `sample_agc` and `raw_sample_agc`.
//!
//! Preset 0 disables AGC; 1-3 select normal, vivid and lazy tuning. Any
//! other value is clamped to 0 before use.

use crate::config::AudioReactiveConfig;
use crate::state::{AgcControlState, DerivedAudioState, MAX_GAIN, MIN_GAIN};
use crate::spectral::AnalysedBlock;
use tracing::trace;

/// Number of AGC presets (excluding "disabled")
pub const NUM_PRESETS: u8 = 3;

/// Minimum interval between two PI controller updates
const CONTROL_INTERVAL_MS: u64 = 2;

/// Minimum interval between two detected peaks
const PEAK_INTERVAL_MS: u64 = 100;

/// Exponential smoothing of the noise-free level
const WEIGHTING: f32 = 0.2;

/// Tuning of one AGC preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcPreset {
    /// Display name
    pub name: &'static str,
    /// Per-iteration decay of the running maximum
    pub sample_decay: f32,
    /// Lower edge of the "normal" zone
    pub zone_low: f32,
    /// Upper edge of the "normal" zone
    pub zone_high: f32,
    /// Above this the running maximum follows quickly and the integrator stops
    pub zone_stop: f32,
    /// First set-point
    pub target0: f32,
    /// Switch to the second set-point above this amplified level
    pub target0_up: f32,
    /// Second set-point
    pub target1: f32,
    /// Follow factor outside the normal zone
    pub follow_fast: f32,
    /// Follow factor inside the normal zone
    pub follow_slow: f32,
    /// Proportional gain
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Smoothing of `sample_agc`
    pub sample_smooth: f32,
}

/// Normal, vivid and lazy
pub const AGC_PRESETS: [AgcPreset; NUM_PRESETS as usize] = [
    AgcPreset {
        name: "normal",
        sample_decay: 0.9994,
        zone_low: 32.0,
        zone_high: 240.0,
        zone_stop: 336.0,
        target0: 112.0,
        target0_up: 88.0,
        target1: 220.0,
        follow_fast: 1.0 / 192.0,
        follow_slow: 1.0 / 6144.0,
        kp: 0.6,
        ki: 1.7,
        sample_smooth: 1.0 / 12.0,
    },
    AgcPreset {
        name: "vivid",
        sample_decay: 0.9985,
        zone_low: 28.0,
        zone_high: 240.0,
        zone_stop: 448.0,
        target0: 144.0,
        target0_up: 64.0,
        target1: 224.0,
        follow_fast: 1.0 / 128.0,
        follow_slow: 1.0 / 4096.0,
        kp: 1.5,
        ki: 1.85,
        sample_smooth: 1.0 / 6.0,
    },
    AgcPreset {
        name: "lazy",
        sample_decay: 0.9997,
        zone_low: 36.0,
        zone_high: 248.0,
        zone_stop: 304.0,
        target0: 164.0,
        target0_up: 116.0,
        target1: 216.0,
        follow_fast: 1.0 / 256.0,
        follow_slow: 1.0 / 8192.0,
        kp: 0.65,
        ki: 1.2,
        sample_smooth: 1.0 / 16.0,
    },
];

/// Clamp a preset selector; out-of-range means disabled
pub fn clamp_preset(preset: u8) -> u8 {
    if preset > NUM_PRESETS {
        0
    } else {
        preset
    }
}

/// Coefficients for a (clamped) selector. Disabled uses the normal tuning
/// for the running maximum.
pub fn preset_params(preset: u8) -> &'static AgcPreset {
    let index = clamp_preset(preset).saturating_sub(1) as usize;
    &AGC_PRESETS[index]
}

/// Static sampler settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Noise gate in microphone units
    pub squelch: f32,
    /// Fixed amplification of `sample`
    pub gain: f32,
    /// Spectrum bin watched for peaks
    pub peak_bin: usize,
    /// Magnitude above which the peak bin counts as a peak
    pub peak_threshold: f32,
    /// Peak flag lifetime if nobody consumes it
    pub peak_hold_ms: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self::from(&AudioReactiveConfig::default())
    }
}

impl From<&AudioReactiveConfig> for SamplerSettings {
    fn from(config: &AudioReactiveConfig) -> Self {
        Self {
            squelch: config.squelch,
            gain: config.gain,
            peak_bin: config.peak_bin,
            peak_threshold: config.peak_threshold,
            peak_hold_ms: config.peak_hold_ms,
        }
    }
}

/// What the AGC needs from one block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgcInput {
    /// Block level in microphone units
    pub level: f32,
    /// Magnitude of the peak-detection bin
    pub peak_bin_magnitude: f32,
}

impl AgcInput {
    /// Extract the input from one analysed block
    pub fn from_analysed(analysed: &AnalysedBlock, peak_bin: usize) -> Self {
        Self {
            level: analysed.block.level(),
            peak_bin_magnitude: analysed.spectrum.bin(peak_bin),
        }
    }
}

/// The sampling stage: noise floor, smoothing, gate, running maximum, peaks
#[derive(Debug, Clone, PartialEq)]
pub struct SoundSampler {
    settings: SamplerSettings,
    mic_lev: f32,
    exp_adj: f32,
    sample_real: f32,
    sample_max: f32,
    peak_time_ms: Option<u64>,
}

impl SoundSampler {
    /// Create a sampler with an empty history
    pub fn new(settings: SamplerSettings) -> Self {
        Self {
            settings,
            mic_lev: 0.0,
            exp_adj: 0.0,
            sample_real: 0.0,
            sample_max: 0.0,
            peak_time_ms: None,
        }
    }

    /// Gated, noise-free level of the last block
    pub fn sample_real(&self) -> f32 {
        self.sample_real
    }

    /// Running maximum of `sample_real`
    pub fn sample_max(&self) -> f32 {
        self.sample_max
    }

    /// Current settings
    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    /// Process one block level
    pub fn process(
        &mut self,
        input: &AgcInput,
        input_level: u8,
        gain: f32,
        preset: u8,
        now_ms: u64,
        state: &mut DerivedAudioState,
    ) {
        let preset = clamp_preset(preset);
        let params = preset_params(preset);
        let level = if input.level.is_finite() { input.level.max(0.0) } else { 0.0 };

        // Noise floor: slow follower, snaps towards quieter input
        self.mic_lev = (self.mic_lev * 8191.0 + level) / 8192.0;
        if level < self.mic_lev {
            self.mic_lev = (self.mic_lev * 31.0 + level) / 32.0;
        }

        let no_dc = (level - self.mic_lev).abs();
        self.exp_adj = (WEIGHTING * no_dc + (1.0 - WEIGHTING) * self.exp_adj).abs();

        // Noise gate on the output; the smoothed level keeps building up
        let squelch = self.settings.squelch;
        let tmp = if self.exp_adj <= squelch || (squelch <= 0.0 && self.exp_adj < 0.25) {
            0.0
        } else {
            self.exp_adj
        };
        self.sample_real = tmp;

        let sample_adj = (tmp * self.settings.gain / 40.0 * input_level as f32 / 128.0 + tmp / 16.0)
            .clamp(0.0, 255.0);
        state.sample = sample_adj;
        state.sample_avg = ((state.sample_avg * 15.0 + sample_adj) / 16.0).abs();

        // Running maximum
        if self.sample_max < self.sample_real && self.sample_real > 0.5 {
            self.sample_max += 0.5 * (self.sample_real - self.sample_max);
        } else if preset > 0 && gain * self.sample_max > params.zone_stop {
            self.sample_max += 0.5 * (self.sample_real - self.sample_max);
        } else {
            self.sample_max *= params.sample_decay;
        }
        if self.sample_max < 0.5 {
            self.sample_max = 0.0;
        }

        self.detect_peak(input.peak_bin_magnitude, now_ms, state);
    }

    fn detect_peak(&mut self, magnitude: f32, now_ms: u64, state: &mut DerivedAudioState) {
        let since_peak = self.peak_time_ms.map(|t| now_ms.saturating_sub(t));

        if magnitude > self.settings.peak_threshold
            && since_peak.map_or(true, |ms| ms > PEAK_INTERVAL_MS)
        {
            state.sample_peak = true;
            self.peak_time_ms = Some(now_ms);
            trace!("Peak at {} ms ({:.1})", now_ms, magnitude);
        } else if state.sample_peak && since_peak.map_or(true, |ms| ms > self.settings.peak_hold_ms) {
            state.sample_peak = false;
        }
    }
}

/// PI controller for the gain multiplier
#[derive(Debug, Clone, PartialEq)]
pub struct AgcEngine {
    sampler: SoundSampler,
    control_integrated: f32,
    last_control_ms: u64,
}

impl AgcEngine {
    /// Create an engine with a fresh sampler
    pub fn new(settings: SamplerSettings) -> Self {
        Self {
            sampler: SoundSampler::new(settings),
            control_integrated: 0.0,
            last_control_ms: 0,
        }
    }

    /// The sampling stage
    pub fn sampler(&self) -> &SoundSampler {
        &self.sampler
    }

    /// Accumulated control error
    pub fn control_integrated(&self) -> f32 {
        self.control_integrated
    }

    /// Sample one block and update the AGC outputs.
    ///
    /// `preset` is clamped here, so any value is accepted. With AGC disabled
    /// the gain is left alone and `sample_agc` mirrors `sample_avg`.
    pub fn process(
        &mut self,
        input: &AgcInput,
        preset: u8,
        input_level: u8,
        control: &mut AgcControlState,
        state: &mut DerivedAudioState,
        now_ms: u64,
    ) {
        let preset = clamp_preset(preset);
        self.sampler
            .process(input, input_level, control.gain(), preset, now_ms, state);

        let params = preset_params(preset);
        let sample_real = self.sampler.sample_real;
        let sample_max = self.sampler.sample_max;
        let last_gain = control.gain();
        let mut new_gain = last_gain;

        if now_ms.saturating_sub(self.last_control_ms) > CONTROL_INTERVAL_MS {
            self.last_control_ms = now_ms;

            if sample_real.abs() < 2.0 || sample_max < 1.0 {
                // Squelched: spin the integrator down
                if self.control_integrated.abs() < 0.01 {
                    self.control_integrated = 0.0;
                } else {
                    self.control_integrated *= 0.91;
                }
            } else {
                let amplified = sample_real * last_gain;
                let setpoint = if amplified <= params.target0_up {
                    params.target0
                } else {
                    params.target1
                };
                new_gain = setpoint / sample_max;
            }
            new_gain = new_gain.clamp(MIN_GAIN, MAX_GAIN);

            let control_error = new_gain - last_gain;

            // Anti-windup
            if new_gain > 0.085 && new_gain < 6.5 && last_gain * sample_max < params.zone_stop {
                self.control_integrated += control_error * 0.002 * 0.25;
            } else {
                self.control_integrated *= 0.9;
            }

            let amplified = sample_real * last_gain;
            let follow = if amplified > params.zone_high
                || amplified < self.sampler.settings.squelch + params.zone_low
            {
                params.follow_fast
            } else {
                params.follow_slow
            };
            new_gain = last_gain
                + follow * params.kp * control_error
                + follow * params.ki * self.control_integrated;
            new_gain = new_gain.clamp(MIN_GAIN, MAX_GAIN);
        }

        let mut tmp = sample_real * new_gain;
        if sample_real.abs() < 2.0 || tmp < 1.0 {
            tmp = 0.0;
        }
        let tmp = tmp.min(255.0);

        if preset > 0 {
            control.set_gain(new_gain);
            state.raw_sample_agc = 0.8 * tmp + 0.2 * state.raw_sample_agc;
            state.sample_agc = if tmp < 1.0 {
                0.5 * tmp + 0.5 * state.sample_agc
            } else {
                state.sample_agc + params.sample_smooth * (tmp - state.sample_agc)
            }
            .abs();
        } else {
            state.raw_sample_agc = state.sample;
            state.sample_agc = state.sample_avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        engine: &mut AgcEngine,
        level: f32,
        preset: u8,
        iterations: u64,
    ) -> (AgcControlState, DerivedAudioState) {
        let mut control = AgcControlState::default();
        let mut state = DerivedAudioState::default();
        let input = AgcInput {
            level,
            peak_bin_magnitude: 0.0,
        };
        for i in 1..=iterations {
            engine.process(&input, preset, 128, &mut control, &mut state, i * 3);
        }
        (control, state)
    }

    #[test]
    fn test_clamp_preset() {
        assert_eq!(clamp_preset(0), 0);
        assert_eq!(clamp_preset(3), 3);
        assert_eq!(clamp_preset(4), 0);
        assert_eq!(clamp_preset(255), 0);
        assert_eq!(preset_params(2).name, "vivid");
        assert_eq!(preset_params(0).name, "normal");
        assert_eq!(preset_params(200).name, "normal");
    }

    #[test]
    fn test_silence_keeps_gain() {
        let mut engine = AgcEngine::new(SamplerSettings::default());
        let (control, state) = run(&mut engine, 0.0, 1, 500);
        assert_eq!(control.gain(), 1.0);
        assert_eq!(state.sample_agc, 0.0);
        assert_eq!(state.sample, 0.0);
        assert_eq!(engine.control_integrated(), 0.0);
    }

    #[test]
    fn test_quiet_signal_raises_gain() {
        let mut engine = AgcEngine::new(SamplerSettings::default());
        let (control, state) = run(&mut engine, 40.0, 1, 3000);
        assert!(control.gain() > 1.1, "gain was {}", control.gain());
        assert!(state.sample_agc > 0.0);
    }

    #[test]
    fn test_loud_signal_lowers_gain() {
        let mut engine = AgcEngine::new(SamplerSettings::default());
        let (control, state) = run(&mut engine, 1500.0, 1, 2000);
        assert!(control.gain() < 0.5, "gain was {}", control.gain());
        assert!(state.sample_agc <= 255.0);
        assert!(state.raw_sample_agc <= 255.0);
    }

    #[test]
    fn test_disabled_agc_mirrors_average() {
        let mut engine = AgcEngine::new(SamplerSettings::default());
        let (control, state) = run(&mut engine, 800.0, 0, 200);
        assert_eq!(control.gain(), 1.0);
        assert_eq!(state.sample_agc, state.sample_avg);
        assert!(state.sample_avg > 0.0);
    }

    #[test]
    fn test_squelch_gates_small_levels() {
        let settings = SamplerSettings {
            squelch: 50.0,
            ..Default::default()
        };
        let mut engine = AgcEngine::new(settings);
        let (_, state) = run(&mut engine, 30.0, 1, 200);
        assert_eq!(state.sample, 0.0);
        assert_eq!(engine.sampler().sample_real(), 0.0);
    }

    #[test]
    fn test_peak_detection_rate_limited() {
        let mut sampler = SoundSampler::new(SamplerSettings::default());
        let mut state = DerivedAudioState::default();
        let loud = AgcInput {
            level: 100.0,
            peak_bin_magnitude: 50.0,
        };

        sampler.process(&loud, 128, 1.0, 1, 1000, &mut state);
        assert!(state.take_peak());

        // Within 100 ms: no new peak
        sampler.process(&loud, 128, 1.0, 1, 1050, &mut state);
        assert!(!state.sample_peak);

        sampler.process(&loud, 128, 1.0, 1, 1101, &mut state);
        assert!(state.sample_peak);
    }

    #[test]
    fn test_peak_auto_resets() {
        let mut sampler = SoundSampler::new(SamplerSettings::default());
        let mut state = DerivedAudioState::default();
        let quiet = AgcInput::default();

        sampler.process(
            &AgcInput {
                level: 0.0,
                peak_bin_magnitude: 50.0,
            },
            128,
            1.0,
            1,
            1000,
            &mut state,
        );
        assert!(state.sample_peak);

        sampler.process(&quiet, 128, 1.0, 1, 1030, &mut state);
        assert!(state.sample_peak);
        sampler.process(&quiet, 128, 1.0, 1, 1051, &mut state);
        assert!(!state.sample_peak);
    }

    #[test]
    fn test_non_finite_level_is_silence() {
        let mut engine = AgcEngine::new(SamplerSettings::default());
        let (control, state) = run(&mut engine, f32::NAN, 2, 50);
        assert_eq!(control.gain(), 1.0);
        assert_eq!(state.sample_agc, 0.0);
    }
}
