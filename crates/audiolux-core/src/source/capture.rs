//! Live microphone input via cpal
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream is created
//! and kept alive on a small capture thread. Samples reach `read_block`
//! through a bounded channel; when the reader falls behind, chunks are dropped.

use super::{quantize, AudioSource};
use crate::config::MicrophoneType;
use crate::error::{CoreError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long `read_block` waits for the device before reporting it gone
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Capture from the default input device
pub struct CaptureSource {
    mic: MicrophoneType,
    requested_rate: u32,
    sample_rate: u32,
    receiver: Option<Receiver<Vec<f32>>>,
    pending: VecDeque<f32>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureSource {
    /// Create an unopened capture source
    pub fn new(mic: MicrophoneType, requested_rate: u32) -> Self {
        Self {
            mic,
            requested_rate,
            sample_rate: requested_rate,
            receiver: None,
            pending: VecDeque::new(),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

fn forward_left<T: Copy>(
    data: &[T],
    channels: usize,
    mic: MicrophoneType,
    tx: &Sender<Vec<f32>>,
    convert: impl Fn(T) -> f32,
) {
    let chunk: Vec<f32> = data
        .iter()
        .step_by(channels.max(1))
        .map(|&s| quantize(mic, convert(s)))
        .collect();
    // Drop the chunk if the reader is behind
    let _ = tx.try_send(chunk);
}

fn run_stream(
    mic: MicrophoneType,
    tx: Sender<Vec<f32>>,
    ready: Sender<std::result::Result<u32, String>>,
    running: Arc<AtomicBool>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            let _ = ready.send(Err("No input device found".to_string()));
            return;
        }
    };
    let supported = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(format!("No input config available: {}", e)));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let rate = config.sample_rate.0;
    let err_fn = |err: cpal::StreamError| tracing::error!("Audio input stream error: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward_left(data, channels, mic, &tx, |s| s)
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward_left(data, channels, mic, &tx, |s| s as f32 / i16::MAX as f32)
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                forward_left(data, channels, mic, &tx, |s| {
                    (s as f32 - 32768.0) / 32768.0
                })
            },
            err_fn,
            None,
        ),
        other => {
            let _ = ready.send(Err(format!("Unsupported sample format: {:?}", other)));
            return;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(format!("Failed to build stream: {}", e)));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(format!("Failed to start stream: {}", e)));
        return;
    }

    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    tracing::info!("Capturing from {} @ {} Hz, {} channel(s)", name, rate, channels);
    let _ = ready.send(Ok(rate));

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }
    drop(stream);
    tracing::info!("Capture stream closed");
}

impl AudioSource for CaptureSource {
    fn initialize(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        let (tx, rx) = bounded(64);
        let (ready_tx, ready_rx) = bounded(1);
        let running = self.running.clone();
        let mic = self.mic;
        running.store(true, Ordering::Relaxed);

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_stream(mic, tx, ready_tx, running))
            .map_err(|e| CoreError::SourceError(format!("Failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(rate)) => {
                if rate != self.requested_rate {
                    tracing::warn!(
                        "Input device runs at {} Hz instead of {} Hz",
                        rate,
                        self.requested_rate
                    );
                }
                self.sample_rate = rate;
                self.receiver = Some(rx);
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(msg)) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = handle.join();
                Err(CoreError::SourceError(msg))
            }
            Err(_) => {
                self.running.store(false, Ordering::Relaxed);
                Err(CoreError::SourceError(
                    "Input device did not start within 5 s".to_string(),
                ))
            }
        }
    }

    fn read_block(&mut self, out: &mut [f32]) -> Result<()> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| CoreError::SourceDisconnected("capture not initialized".to_string()))?;

        while self.pending.len() < out.len() {
            match receiver.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CoreError::SourceDisconnected(format!(
                        "no audio for {} ms",
                        READ_TIMEOUT.as_millis()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CoreError::SourceDisconnected(
                        "capture thread stopped".to_string(),
                    ))
                }
            }
        }

        for (slot, sample) in out.iter_mut().zip(self.pending.drain(..out.len())) {
            *slot = sample;
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!("{} (live capture)", self.mic)
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
