//! WAV file playback source

use super::{quantize, AudioSource};
use crate::config::MicrophoneType;
use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Replays the left channel of a WAV file in a loop at real-time speed
pub struct WavFileSource {
    path: PathBuf,
    mic: MicrophoneType,
    sample_rate: u32,
    samples: Vec<f32>,
    position: usize,
    paced: bool,
    next_deadline: Option<Instant>,
}

impl WavFileSource {
    /// Check the file header; samples are loaded in `initialize`
    pub fn open(path: &Path, mic: MicrophoneType) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        Ok(Self {
            path: path.to_path_buf(),
            mic,
            sample_rate: spec.sample_rate,
            samples: Vec::new(),
            position: 0,
            paced: true,
            next_deadline: None,
        })
    }

    /// Disable real-time pacing (offline analysis)
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn load(&mut self) -> Result<()> {
        let mut reader = hound::WavReader::open(&self.path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        // Left channel only
        self.samples = interleaved
            .into_iter()
            .step_by(channels)
            .map(|s| quantize(self.mic, s.clamp(-1.0, 1.0)))
            .collect();
        self.position = 0;

        if self.samples.is_empty() {
            return Err(CoreError::SourceError(format!(
                "WAV file {:?} contains no samples",
                self.path
            )));
        }
        Ok(())
    }

    fn wait_for_block(&mut self, len: usize) {
        let block = Duration::from_secs_f64(len as f64 / self.sample_rate.max(1) as f64);
        let deadline = self.next_deadline.unwrap_or_else(Instant::now) + block;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
            self.next_deadline = Some(deadline);
        } else {
            self.next_deadline = Some(now);
        }
    }
}

impl AudioSource for WavFileSource {
    fn initialize(&mut self) -> Result<()> {
        self.load()?;
        tracing::info!(
            "WAV source {:?}: {} samples at {} Hz",
            self.path,
            self.samples.len(),
            self.sample_rate
        );
        Ok(())
    }

    fn read_block(&mut self, out: &mut [f32]) -> Result<()> {
        if self.samples.is_empty() {
            return Err(CoreError::SourceDisconnected(
                "WAV source not initialized".to_string(),
            ));
        }
        if self.paced {
            self.wait_for_block(out.len());
        }
        for slot in out.iter_mut() {
            *slot = self.samples[self.position];
            self.position = (self.position + 1) % self.samples.len();
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!("WAV file {:?} as {}", self.path, self.mic)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn write_tone(path: &Path, sample_rate: u32, len: usize) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..len {
            let t = i as f32 / sample_rate as f32;
            let left = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            writer.write_sample((left * i16::MAX as f32) as i16).unwrap();
            // Right channel is ignored
            writer.write_sample(i16::MAX).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_reads_left_channel_and_loops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_tone(&path, 8000, 100);

        let mut source = WavFileSource::open(&path, MicrophoneType::GenericI2s)
            .unwrap()
            .unpaced();
        source.initialize().unwrap();

        let mut block = vec![0.0; 256];
        source.read_block(&mut block).unwrap();

        assert!(block.iter().all(|s| s.abs() <= 0.51));
        // Wrapped around after 100 samples
        assert!((block[0] - block[100]).abs() < 1e-6);
    }

    #[test]
    fn test_read_before_initialize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_tone(&path, 8000, 10);

        let mut source = WavFileSource::open(&path, MicrophoneType::AnalogAdc).unwrap();
        let mut block = vec![0.0; 8];
        assert!(source.read_block(&mut block).is_err());
    }
}
