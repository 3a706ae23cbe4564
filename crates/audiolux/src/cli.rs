//! Command line interface

use audiolux_core::{AudioReactiveConfig, SyncRole};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Audio sync role as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncRoleArg {
    /// No sync
    Off,
    /// Broadcast local audio
    Tx,
    /// Use audio from the network
    Rx,
}

impl From<SyncRoleArg> for SyncRole {
    fn from(arg: SyncRoleArg) -> Self {
        match arg {
            SyncRoleArg::Off => SyncRole::OFF,
            SyncRoleArg::Tx => SyncRole::TRANSMIT,
            SyncRoleArg::Rx => SyncRole::RECEIVE,
        }
    }
}

/// Audio-reactive LED front end
#[derive(Debug, Parser)]
#[command(name = "audiolux", version, about)]
pub struct Cli {
    /// Settings file (TOML or JSON); defaults to the platform config dir
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Replay a WAV file instead of the microphone
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub seconds: Option<u64>,

    /// Override the audio sync role
    #[arg(long, value_enum)]
    pub sync_role: Option<SyncRoleArg>,

    /// Override the AGC preset (0 = off, 1 = normal, 2 = vivid, 3 = lazy)
    #[arg(long)]
    pub agc_preset: Option<u8>,

    /// Active animation mode id
    #[arg(long)]
    pub mode: Option<u8>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write logs to files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    /// Apply command line overrides on top of the loaded settings
    pub fn apply_overrides(&self, config: &mut AudioReactiveConfig) {
        if let Some(role) = self.sync_role {
            config.sync_role = role.into();
        }
        if let Some(preset) = self.agc_preset {
            config.agc_preset = preset;
        }
        if let Some(mode) = self.mode {
            config.active_mode = mode;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log.file_output = true;
            config.log.log_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::parse_from([
            "audiolux",
            "--sync-role",
            "rx",
            "--agc-preset",
            "2",
            "--seconds",
            "5",
        ]);
        let mut config = AudioReactiveConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.sync_role, SyncRole::RECEIVE);
        assert_eq!(config.agc_preset, 2);
        assert_eq!(cli.seconds, Some(5));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_log_flags_override_log_table() {
        let cli = Cli::parse_from(["audiolux", "--log-level", "trace", "--log-dir", "/tmp/al"]);
        let mut config = AudioReactiveConfig::default();
        config.log.level = "warn".to_string();
        cli.apply_overrides(&mut config);

        assert_eq!(config.log.level, "trace");
        assert!(config.log.file_output);
        assert_eq!(config.log.log_dir, PathBuf::from("/tmp/al"));
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let cli = Cli::parse_from(["audiolux"]);
        let mut config = AudioReactiveConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config, AudioReactiveConfig::default());
    }
}
