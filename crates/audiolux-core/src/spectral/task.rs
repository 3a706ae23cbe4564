//! Background spectral thread

use super::analyzer::{SpectralAnalyzer, SpectralAnalyzerConfig, SpectrumSnapshot};
use crate::error::{CoreError, Result};
use crate::source::{AudioSample, AudioSource};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thread_priority::{set_current_thread_priority, ThreadPriority};
use tracing::{debug, error, info, warn};

/// Pause after a failed read before trying again
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// One block together with its analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysedBlock {
    /// Raw samples
    pub block: AudioSample,
    /// Spectrum computed from `block`
    pub spectrum: SpectrumSnapshot,
}

/// Latest analysed block, swapped atomically as one snapshot
#[derive(Debug, Default)]
pub struct SharedAudio {
    latest: ArcSwap<AnalysedBlock>,
}

impl SharedAudio {
    /// Empty snapshot
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Most recent block and its spectrum. Load once per iteration and read
    /// both halves from the same snapshot.
    pub fn latest(&self) -> Arc<AnalysedBlock> {
        self.latest.load_full()
    }

    /// Publish a new block/spectrum pair
    pub fn publish(&self, block: AudioSample, spectrum: SpectrumSnapshot) {
        self.latest.store(Arc::new(AnalysedBlock { block, spectrum }));
    }
}

/// Spectral thread statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralStats {
    /// Blocks successfully read and analysed
    pub blocks: u64,
    /// Failed reads
    pub read_errors: u64,
    /// Duration of the last FFT in microseconds
    pub analysis_time_us: f64,
    /// Effective sample rate reported by the source
    pub sample_rate: u32,
}

/// Owns the audio source on its own thread
pub struct SpectralTask {
    shared: Arc<SharedAudio>,
    stats: Arc<parking_lot::RwLock<SpectralStats>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SpectralTask {
    /// Start reading and analysing `source`.
    ///
    /// Source initialization happens on the new thread. If it fails the
    /// thread logs the error and exits; the snapshots stay silent.
    pub fn spawn<S: AudioSource + 'static>(
        mut source: S,
        config: SpectralAnalyzerConfig,
    ) -> Result<Self> {
        let shared = SharedAudio::new();
        let stats = Arc::new(parking_lot::RwLock::new(SpectralStats::default()));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let shared = shared.clone();
            let stats = stats.clone();
            let running = running.clone();

            thread::Builder::new()
                .name("spectral-task".to_string())
                .spawn(move || {
                    if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
                        debug!("Could not raise spectral thread priority: {:?}", e);
                    }

                    if let Err(e) = source.initialize() {
                        error!("Audio source {} failed to initialize: {}", source.describe(), e);
                        running.store(false, Ordering::Relaxed);
                        return;
                    }

                    let config = SpectralAnalyzerConfig {
                        sample_rate: source.sample_rate(),
                        ..config
                    };
                    stats.write().sample_rate = config.sample_rate;
                    info!(
                        "Spectral task started: {} ({} samples per block)",
                        source.describe(),
                        config.block_size
                    );

                    let mut analyzer = SpectralAnalyzer::new(config.clone());
                    let mut buffer = vec![0.0f32; config.block_size];
                    let mut sequence = 0u64;

                    while running.load(Ordering::Relaxed) {
                        if let Err(e) = source.read_block(&mut buffer) {
                            let errors = {
                                let mut stats = stats.write();
                                stats.read_errors += 1;
                                stats.read_errors
                            };
                            if errors == 1 || errors % 100 == 0 {
                                warn!("Audio read failed ({} so far): {}", errors, e);
                            }
                            thread::sleep(READ_RETRY_DELAY);
                            continue;
                        }

                        sequence += 1;
                        let block = AudioSample::new(sequence, buffer.clone());
                        let start = Instant::now();
                        let spectrum = analyzer.analyze(&block);
                        let elapsed = start.elapsed();
                        shared.publish(block, spectrum);

                        let mut stats = stats.write();
                        stats.blocks += 1;
                        stats.analysis_time_us = elapsed.as_secs_f64() * 1_000_000.0;
                    }

                    info!("Spectral task stopped after {} blocks", sequence);
                })
                .map_err(|e| CoreError::TaskError(format!("Failed to spawn spectral task: {}", e)))?
        };

        Ok(Self {
            shared,
            stats,
            running,
            thread: Some(thread),
        })
    }

    /// Shared snapshots written by this task
    pub fn shared(&self) -> Arc<SharedAudio> {
        self.shared.clone()
    }

    /// Current statistics
    pub fn stats(&self) -> SpectralStats {
        *self.stats.read()
    }

    /// False once stopped or after a failed initialization
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it to finish its current block
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Spectral task panicked");
            }
        }
    }
}

impl Drop for SpectralTask {
    fn drop(&mut self) {
        self.stop();
    }
}
