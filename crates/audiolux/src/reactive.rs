//! The per-iteration audio-reactive loop
//!
//! `AudioReactive` ties the pieces together. The host calls
//! [`AudioReactive::run_iteration`] as often as it can (500-1500 Hz); each
//! call asks the arbitrator, samples and runs the AGC when allowed, couples
//! the input level slider, and transmits or receives sync packets. The
//! spectral task runs on its own thread and is only read from here.

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use audiolux_core::{
    clamp_preset, update_input_level, AgcControlState, AgcEngine, AgcInput, AudioReactiveConfig,
    AudioSource, DerivedAudioState, EffectCatalog, InterfaceNotifier, ModeTracker,
    OperatingModeFlags, ProcessingMode, RealtimeArbitrator, SamplerSettings, SharedAudio,
    SpectralAnalyzerConfig, SpectralStats, SpectralTask,
};
use audiolux_sync::{SyncReceiver, SyncTransmitter};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Gaps between sampled iterations above this are reported
pub const HICCUP_THRESHOLD_MS: u64 = 23;

/// Interval of the optional audio trace line
const AUDIO_LOG_INTERVAL_MS: u64 = 20;

/// What one iteration did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Arbitration result
    pub mode: ProcessingMode,
    /// Sampling and AGC ran
    pub sampled: bool,
    /// Gap since the previous sampled iteration, if it was a hiccup
    pub hiccup_ms: Option<u64>,
    /// The user kicked the gain
    pub kicked: bool,
    /// Input level pushed to the interfaces
    pub pushed_level: Option<u8>,
    /// A sync packet went out
    pub transmitted: bool,
    /// A sync packet was applied
    pub received: bool,
}

/// Audio-reactive front end
pub struct AudioReactive {
    config: AudioReactiveConfig,
    flags: OperatingModeFlags,
    arbitrator: RealtimeArbitrator,
    agc: AgcEngine,
    control: AgcControlState,
    modes: ModeTracker,
    input_level: u8,
    notifier: Box<dyn InterfaceNotifier>,

    spectral: Option<SpectralTask>,
    shared: Arc<SharedAudio>,

    // Single writer; readers get the published copy
    state: DerivedAudioState,
    published: ArcSwap<DerivedAudioState>,

    transmitter: Option<SyncTransmitter>,
    receiver: Option<SyncReceiver>,
    transmit_failed: bool,
    receive_failed: bool,
    sync_errors: u64,

    last_sample_ms: Option<u64>,
    last_audio_log_ms: u64,
    sampling_period_us: u64,
}

impl AudioReactive {
    /// Create the loop; nothing runs until [`setup`](Self::setup)
    pub fn new(config: AudioReactiveConfig, notifier: Box<dyn InterfaceNotifier>) -> Result<Self> {
        config.validate().context("Invalid audio configuration")?;

        let flags = OperatingModeFlags::from(&config);
        let catalog = EffectCatalog::from_ids(config.agc_effects.iter().copied());
        let input_level = config.input_level;

        Ok(Self {
            flags,
            arbitrator: RealtimeArbitrator::new(),
            agc: AgcEngine::new(SamplerSettings::from(&config)),
            control: AgcControlState::default(),
            modes: ModeTracker::new(catalog),
            input_level,
            notifier,
            spectral: None,
            shared: SharedAudio::new(),
            state: DerivedAudioState::default(),
            published: ArcSwap::from_pointee(DerivedAudioState::default()),
            transmitter: None,
            receiver: None,
            transmit_failed: false,
            receive_failed: false,
            sync_errors: 0,
            last_sample_ms: None,
            last_audio_log_ms: 0,
            sampling_period_us: 0,
            config,
        })
    }

    /// Start the spectral task on `source`
    pub fn setup(&mut self, source: Box<dyn AudioSource>) -> Result<()> {
        if self.spectral.is_some() {
            warn!("Audio reactive setup called twice, ignoring");
            return Ok(());
        }

        info!(
            "Audio source: {} ({})",
            self.config.microphone_type(),
            source.describe()
        );

        let analyzer_config = SpectralAnalyzerConfig {
            sample_rate: self.config.sample_rate,
            block_size: self.config.block_size,
            smoothing: self.config.smoothing,
        };
        let task = SpectralTask::spawn(source, analyzer_config)
            .context("Failed to start spectral task")?;
        self.shared = task.shared();
        self.spectral = Some(task);

        self.sampling_period_us =
            (1_000_000.0 / self.config.sample_rate as f64).round() as u64;
        debug!("Sampling period: {} us", self.sampling_period_us);

        self.ensure_sync_sockets();
        Ok(())
    }

    /// Open sockets for the current sync role. A bind failure is reported
    /// once and sync in that direction stays off.
    fn ensure_sync_sockets(&mut self) {
        let role = self.flags.sync_role;

        if role.transmits() && self.transmitter.is_none() && !self.transmit_failed {
            match SyncTransmitter::from_config(&self.config) {
                Ok(tx) => self.transmitter = Some(tx),
                Err(e) => {
                    warn!("Audio sync transmit disabled: {}", e);
                    self.transmit_failed = true;
                }
            }
        }

        if role.receives() && self.receiver.is_none() && !self.receive_failed {
            match SyncReceiver::bind(self.config.sync_port, self.config.receive_delay_ms) {
                Ok(rx) => self.receiver = Some(rx),
                Err(e) => {
                    warn!("Audio sync receive disabled: {}", e);
                    self.receive_failed = true;
                }
            }
        }
    }

    /// Close sockets whose role was cleared, so a later switch back starts
    /// without a queued backlog and a failed bind is retried.
    fn close_unused_sockets(&mut self) {
        let role = self.flags.sync_role;
        if !role.transmits() {
            if self.transmitter.take().is_some() {
                info!("Audio sync transmitter closed");
            }
            self.transmit_failed = false;
        }
        if !role.receives() {
            if self.receiver.take().is_some() {
                info!("Audio sync receiver closed");
            }
            self.receive_failed = false;
        }
    }

    /// Run one iteration at wall-clock `now_ms` with the active animation mode
    pub fn run_iteration(&mut self, now_ms: u64, mode_id: u8) -> IterationReport {
        let arbitration = self.arbitrator.evaluate(&self.flags, now_ms);
        if arbitration.resumed {
            self.last_sample_ms = self.arbitrator.timing_reference_ms();
        }

        let mut report = IterationReport {
            mode: arbitration.mode,
            ..Default::default()
        };

        if !arbitration.mode.is_suspended() && !self.flags.sync_role.receives() {
            self.sample(now_ms, mode_id, &mut report);
        }

        let role = self.flags.sync_role;
        self.close_unused_sockets();
        if role.transmits() || role.receives() {
            self.ensure_sync_sockets();
        }

        if role.transmits() {
            if let Some(tx) = self.transmitter.as_mut() {
                match tx.maybe_transmit(&self.state, now_ms) {
                    Ok(sent) => report.transmitted = sent,
                    Err(e) => Self::sync_error(&mut self.sync_errors, "transmit", &e),
                }
            }
        }

        if role.receives() {
            if let Some(rx) = self.receiver.as_mut() {
                match rx.receive_into(&mut self.state, now_ms) {
                    Ok(applied) => report.received = applied,
                    Err(e) => Self::sync_error(&mut self.sync_errors, "receive", &e),
                }
            }
        }

        if report.sampled || report.received {
            self.published.store(Arc::new(self.state.clone()));
        }
        report
    }

    fn sample(&mut self, now_ms: u64, mode_id: u8, report: &mut IterationReport) {
        if let Some(last) = self.last_sample_ms {
            let gap = now_ms.saturating_sub(last);
            if gap > HICCUP_THRESHOLD_MS {
                warn!("Audio loop hiccup: inactive for the last {} ms", gap);
                report.hiccup_ms = Some(gap);
            }
        }
        self.last_sample_ms = Some(now_ms);

        let preset = clamp_preset(self.config.agc_preset);
        if preset != self.config.agc_preset {
            warn!(
                "AGC preset {} out of range, AGC disabled",
                self.config.agc_preset
            );
            self.config.agc_preset = preset;
        }

        // One load: level, peak bin and buckets all come from the same block
        let analysed = self.shared.latest();
        let input = AgcInput::from_analysed(&analysed, self.config.peak_bin);

        self.agc.process(
            &input,
            preset,
            self.input_level,
            &mut self.control,
            &mut self.state,
            now_ms,
        );
        self.state.record_history(now_ms);
        self.state.apply_spectrum(&analysed.spectrum);

        let observation = self.modes.observe(mode_id);
        let update = update_input_level(
            &mut self.control,
            &mut self.input_level,
            &observation,
            preset > 0,
            self.notifier.as_mut(),
            now_ms,
        );
        self.modes.commit(mode_id);

        report.sampled = true;
        report.kicked = update.kicked;
        report.pushed_level = update.pushed;

        if self.config.log_audio
            && now_ms.saturating_sub(self.last_audio_log_ms) >= AUDIO_LOG_INTERVAL_MS
        {
            self.last_audio_log_ms = now_ms;
            trace!(
                "sample={:.1} avg={:.1} agc={:.1} raw={:.1} gain={:.3} peak={}",
                self.state.sample,
                self.state.sample_avg,
                self.state.sample_agc,
                self.state.raw_sample_agc,
                self.control.gain(),
                self.state.sample_peak
            );
        }
    }

    fn sync_error(count: &mut u64, direction: &str, error: &audiolux_sync::SyncError) {
        *count += 1;
        if *count == 1 || *count % 100 == 0 {
            warn!("Audio sync {} failed ({} errors): {}", direction, count, error);
        }
    }

    /// Latest derived state for the animation engine
    pub fn snapshot(&self) -> Arc<DerivedAudioState> {
        self.published.load_full()
    }

    /// Consume a pending peak
    pub fn take_peak(&mut self) -> bool {
        let peak = self.state.take_peak();
        if peak {
            self.published.store(Arc::new(self.state.clone()));
        }
        peak
    }

    /// User moved the input level slider
    pub fn set_input_level(&mut self, level: u8) {
        self.input_level = level;
    }

    /// Current input level slider value
    pub fn input_level(&self) -> u8 {
        self.input_level
    }

    /// Replace the operating mode flags
    pub fn set_flags(&mut self, flags: OperatingModeFlags) {
        if flags.sync_role != self.flags.sync_role {
            info!("Audio sync role: {} -> {}", self.flags.sync_role, flags.sync_role);
        }
        self.flags = flags;
    }

    /// Current operating mode flags
    pub fn flags(&self) -> OperatingModeFlags {
        self.flags
    }

    /// Select an AGC preset; out-of-range values disable AGC on next use
    pub fn set_agc_preset(&mut self, preset: u8) {
        self.config.agc_preset = preset;
    }

    /// Mode decided in the last iteration
    pub fn processing_mode(&self) -> ProcessingMode {
        self.arbitrator.mode()
    }

    /// AGC gain multiplier
    pub fn gain(&self) -> f32 {
        self.control.gain()
    }

    /// Configuration in use
    pub fn config(&self) -> &AudioReactiveConfig {
        &self.config
    }

    /// Spectral task counters, if the task was started
    pub fn spectral_stats(&self) -> Option<SpectralStats> {
        self.spectral.as_ref().map(|task| task.stats())
    }

    /// Address the sync receiver is bound to, once opened
    pub fn sync_receiver_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().and_then(|rx| rx.local_addr().ok())
    }

    /// Sample period of the source in microseconds (0 before setup)
    pub fn sampling_period_us(&self) -> u64 {
        self.sampling_period_us
    }

    /// Stop the spectral task
    pub fn shutdown(&mut self) {
        if let Some(mut task) = self.spectral.take() {
            task.stop();
            info!("Audio reactive stopped");
        }
    }
}

impl Drop for AudioReactive {
    fn drop(&mut self) {
        self.shutdown();
    }
}
