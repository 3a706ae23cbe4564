//! Realtime arbitration
//!
//! Decides once per iteration whether local sampling and AGC run. Realtime
//! protocols that drive every LED make local audio pointless; the sync role
//! overrides that decision in both directions.

use crate::config::RealtimeOverride;
use crate::state::OperatingModeFlags;
use std::fmt;
use tracing::debug;

/// Whether local sound processing runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Sampling and AGC run
    #[default]
    Active,
    /// A realtime protocol has full control of the LEDs
    SuspendedByOverride,
    /// Values come from the network instead
    SuspendedBySyncRole,
}

impl ProcessingMode {
    /// True when sound processing is disabled
    pub fn is_suspended(&self) -> bool {
        !matches!(self, ProcessingMode::Active)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Active => write!(f, "active"),
            ProcessingMode::SuspendedByOverride => write!(f, "suspended (realtime mode)"),
            ProcessingMode::SuspendedBySyncRole => write!(f, "suspended (audio sync receive)"),
        }
    }
}

/// Pure decision for one set of flags.
///
/// Receive always wins, even when the transmit bit is set as well.
pub fn decide(flags: &OperatingModeFlags) -> ProcessingMode {
    if flags.sync_role.receives() {
        return ProcessingMode::SuspendedBySyncRole;
    }
    if flags.sync_role.transmits() {
        return ProcessingMode::Active;
    }
    if flags.realtime_override == RealtimeOverride::None
        && !flags.main_segment_only
        && flags.realtime_mode.takes_full_control()
    {
        ProcessingMode::SuspendedByOverride
    } else {
        ProcessingMode::Active
    }
}

/// Result of one arbitration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    /// Mode for this iteration
    pub mode: ProcessingMode,
    /// Processing was suspended last iteration and runs again now
    pub resumed: bool,
}

/// Remembers the previous decision to detect transitions
#[derive(Debug, Clone, Default)]
pub struct RealtimeArbitrator {
    mode: ProcessingMode,
    timing_reference_ms: Option<u64>,
}

impl RealtimeArbitrator {
    /// Start active
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide for this iteration and record transitions
    pub fn evaluate(&mut self, flags: &OperatingModeFlags, now_ms: u64) -> Arbitration {
        let mode = decide(flags);
        let previous = std::mem::replace(&mut self.mode, mode);
        let resumed = previous.is_suspended() && !mode.is_suspended();

        if previous != mode {
            debug!(
                "Audio processing {} -> {} (realtime={:?}, override={:?}, main segment only={}, sync={})",
                previous,
                mode,
                flags.realtime_mode,
                flags.realtime_override,
                flags.main_segment_only,
                flags.sync_role
            );
        }
        if resumed {
            self.timing_reference_ms = Some(now_ms);
        }

        Arbitration { mode, resumed }
    }

    /// Mode decided in the last evaluation
    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Shorthand for `mode().is_suspended()`
    pub fn disable_sound_processing(&self) -> bool {
        self.mode.is_suspended()
    }

    /// Time of the last resume, if any
    pub fn timing_reference_ms(&self) -> Option<u64> {
        self.timing_reference_ms
    }
}
