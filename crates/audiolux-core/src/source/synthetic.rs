//! Synthetic audio source
//!
//! Generates a sine tone with optional periodic bursts plus a little
//! deterministic noise. Used for tests and for builds without live capture.

use super::{quantize, AudioSource};
use crate::config::MicrophoneType;
use crate::error::Result;
use std::f32::consts::PI;
use std::time::{Duration, Instant};

/// Tone/burst generator
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    sample_rate: u32,
    mic: MicrophoneType,
    frequency: f32,
    amplitude: f32,
    noise: f32,
    burst_period_ms: Option<u64>,
    paced: bool,
    phase: f32,
    position: u64,
    noise_state: u32,
    next_deadline: Option<Instant>,
}

impl SyntheticSource {
    /// 440 Hz tone at 0.2 amplitude
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            mic: MicrophoneType::GenericI2s,
            frequency: 440.0,
            amplitude: 0.2,
            noise: 0.002,
            burst_period_ms: None,
            paced: false,
            phase: 0.0,
            position: 0,
            noise_state: 0x1234_5678,
            next_deadline: None,
        }
    }

    /// Set tone frequency and amplitude
    pub fn with_tone(mut self, frequency: f32, amplitude: f32) -> Self {
        self.frequency = frequency;
        self.amplitude = amplitude;
        self
    }

    /// Set noise amplitude
    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// Emulate the resolution of a microphone type
    pub fn with_microphone(mut self, mic: MicrophoneType) -> Self {
        self.mic = mic;
        self
    }

    /// Only sound for the first quarter of every period
    pub fn with_bursts(mut self, period_ms: u64) -> Self {
        self.burst_period_ms = Some(period_ms.max(1));
        self
    }

    /// Block in `read_block` so blocks arrive at the real-time rate
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    fn next_noise(&mut self) -> f32 {
        // xorshift32
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    fn envelope(&self) -> f32 {
        match self.burst_period_ms {
            Some(period) => {
                let ms = self.position * 1000 / self.sample_rate as u64;
                if ms % period < period / 4 {
                    1.0
                } else {
                    0.0
                }
            }
            None => 1.0,
        }
    }

    fn wait_for_block(&mut self, len: usize) {
        let block = Duration::from_secs_f64(len as f64 / self.sample_rate as f64);
        let deadline = self.next_deadline.unwrap_or_else(Instant::now) + block;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
            self.next_deadline = Some(deadline);
        } else {
            // Fell behind; don't try to catch up
            self.next_deadline = Some(now);
        }
    }
}

impl AudioSource for SyntheticSource {
    fn initialize(&mut self) -> Result<()> {
        tracing::info!(
            "Synthetic source: {} Hz tone at {:.2}, {} Hz sample rate",
            self.frequency,
            self.amplitude,
            self.sample_rate
        );
        self.next_deadline = None;
        Ok(())
    }

    fn read_block(&mut self, out: &mut [f32]) -> Result<()> {
        if self.paced {
            self.wait_for_block(out.len());
        }

        let step = 2.0 * PI * self.frequency / self.sample_rate as f32;
        for slot in out.iter_mut() {
            let tone = self.phase.sin() * self.amplitude * self.envelope();
            let noise = self.next_noise() * self.noise;
            *slot = quantize(self.mic, (tone + noise).clamp(-1.0, 1.0));

            self.phase = (self.phase + step) % (2.0 * PI);
            self.position += 1;
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!("Synthetic {} ({} Hz tone)", self.mic, self.frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_amplitude() {
        let mut source = SyntheticSource::new(10240).with_tone(500.0, 0.5).with_noise(0.0);
        source.initialize().unwrap();

        let mut block = vec![0.0; 512];
        source.read_block(&mut block).unwrap();

        let peak = block.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(peak > 0.45 && peak <= 0.5, "peak was {}", peak);
    }

    #[test]
    fn test_bursts_are_silent_between_pulses() {
        let mut source = SyntheticSource::new(10240)
            .with_tone(500.0, 0.5)
            .with_noise(0.0)
            .with_bursts(400);
        source.initialize().unwrap();

        // 0-100 ms loud, 100-400 ms silent
        let mut loud = vec![0.0; 512];
        source.read_block(&mut loud).unwrap();
        let mut skip = vec![0.0; 1024];
        source.read_block(&mut skip).unwrap();
        let mut quiet = vec![0.0; 512];
        source.read_block(&mut quiet).unwrap();

        assert!(loud.iter().any(|s| s.abs() > 0.1));
        assert!(quiet.iter().all(|s| *s == 0.0));
    }
}
