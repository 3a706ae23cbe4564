//! Audiolux host binary
//!
//! Runs the audio-reactive loop at roughly 1 kHz and logs a status line
//! once per second.

use anyhow::{Context, Result};
use audiolux::cli::Cli;
use audiolux::{logging_setup, AudioReactive};
use audiolux_core::{open_source, AudioReactiveConfig, ChannelNotifier, InterfaceUpdate};
use clap::Parser;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const LOOP_INTERVAL: Duration = Duration::from_millis(1);
const STATUS_INTERVAL_MS: u64 = 1000;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, ignored) = match &cli.config {
        Some(path) => (
            AudioReactiveConfig::load_from(path)
                .with_context(|| format!("Failed to load settings from {:?}", path))?,
            None,
        ),
        None => match AudioReactiveConfig::load() {
            Ok(config) => (config, None),
            Err(e) => (AudioReactiveConfig::default(), Some(e)),
        },
    };
    cli.apply_overrides(&mut config);

    let _log_guard = logging_setup::init(&config.log)?;
    if let Some(e) = ignored {
        warn!("Ignoring settings file {:?}: {}", AudioReactiveConfig::config_path(), e);
    }

    let source = open_source(&config, cli.input.as_deref()).context("Failed to open audio source")?;
    let mode = config.active_mode;

    let (notifier, updates) = ChannelNotifier::new(16);
    let mut reactive = AudioReactive::new(config, Box::new(notifier))?;
    reactive.setup(source)?;

    info!(
        "Audiolux running (sync role {}, AGC preset {})",
        reactive.flags().sync_role,
        reactive.config().agc_preset
    );

    let start = Instant::now();
    let deadline = cli.seconds.map(Duration::from_secs);
    let mut next_status_ms = STATUS_INTERVAL_MS;
    let mut iterations = 0u64;

    loop {
        let elapsed = start.elapsed();
        if deadline.map_or(false, |d| elapsed >= d) {
            break;
        }
        let now_ms = elapsed.as_millis() as u64;

        reactive.run_iteration(now_ms, mode);
        iterations += 1;

        for update in updates.try_iter() {
            match update {
                InterfaceUpdate::InputLevel { level, at_ms } => {
                    info!("Input level slider -> {} at {} ms", level, at_ms)
                }
            }
        }

        if now_ms >= next_status_ms {
            next_status_ms = now_ms + STATUS_INTERVAL_MS;
            let state = reactive.snapshot();
            info!(
                "{} | agc {:5.1} avg {:5.1} gain {:6.3} level {:3} | peak {:6.1} Hz | {} it/s",
                reactive.processing_mode(),
                state.sample_agc,
                state.sample_avg,
                reactive.gain(),
                reactive.input_level(),
                state.fft_major_peak,
                iterations
            );
            iterations = 0;
        }

        thread::sleep(LOOP_INTERVAL);
    }

    if let Some(stats) = reactive.spectral_stats() {
        info!(
            "Analysed {} blocks ({} read errors, last FFT {:.0} us)",
            stats.blocks, stats.read_errors, stats.analysis_time_us
        );
    }
    reactive.shutdown();
    Ok(())
}
