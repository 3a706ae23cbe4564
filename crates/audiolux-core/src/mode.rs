//! Animation mode tracking
//!
//! Decides whether the active animation mode visualises the AGC gain. The
//! association is an explicit table of mode ids, maintained next to the effect
//! catalog of the host.

use std::collections::HashSet;

/// Sound-reactive effect block of the default effect catalog
pub const DEFAULT_AGC_EFFECTS: [u8; 59] = {
    let mut ids = [0u8; 59];
    let mut i = 0;
    while i < ids.len() {
        ids[i] = 128 + i as u8;
        i += 1;
    }
    ids
};

/// Table of mode ids that depict the AGC gain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectCatalog {
    agc_modes: HashSet<u8>,
}

impl Default for EffectCatalog {
    fn default() -> Self {
        Self::from_ids(DEFAULT_AGC_EFFECTS)
    }
}

impl EffectCatalog {
    /// Build from a list of mode ids
    pub fn from_ids(ids: impl IntoIterator<Item = u8>) -> Self {
        Self {
            agc_modes: ids.into_iter().collect(),
        }
    }

    /// Whether `mode` depicts AGC gain
    pub fn depicts_agc(&self, mode: u8) -> bool {
        self.agc_modes.contains(&mode)
    }
}

/// Result of observing the mode for one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeObservation {
    /// Mode id seen this iteration
    pub mode: u8,
    /// Mode differs from the previous iteration
    pub changed: bool,
    /// Mode depicts AGC gain
    pub depicts_agc: bool,
}

/// Remembers the previous iteration's mode
#[derive(Debug, Clone)]
pub struct ModeTracker {
    catalog: EffectCatalog,
    last_mode: u8,
    depicts_agc: bool,
}

impl ModeTracker {
    /// Create a tracker; the first observation of mode 0 is not a change
    pub fn new(catalog: EffectCatalog) -> Self {
        let depicts_agc = catalog.depicts_agc(0);
        Self {
            catalog,
            last_mode: 0,
            depicts_agc,
        }
    }

    /// Observe the active mode without committing it as "previous"
    pub fn observe(&mut self, mode: u8) -> ModeObservation {
        let changed = mode != self.last_mode;
        if changed {
            self.depicts_agc = self.catalog.depicts_agc(mode);
            tracing::debug!(
                "Animation mode {} -> {} (depicts AGC: {})",
                self.last_mode,
                mode,
                self.depicts_agc
            );
        }
        ModeObservation {
            mode,
            changed,
            depicts_agc: self.depicts_agc,
        }
    }

    /// Commit `mode` as the previous iteration's mode
    pub fn commit(&mut self, mode: u8) {
        self.last_mode = mode;
    }

    /// Mode committed last
    pub fn last_mode(&self) -> u8 {
        self.last_mode
    }
}
