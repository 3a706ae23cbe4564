//! Input level slider coupling
//!
//! While a mode that depicts the AGC gain is active, the AGC and the user's
//! input level slider influence each other: a large slider move "kicks" the
//! gain, and the gain is reflected back onto the slider at a throttled rate.

use crate::mode::ModeObservation;
use crate::notifier::InterfaceNotifier;
use crate::state::AgcControlState;
use tracing::debug;

/// Slider moves larger than this kick the gain
pub const KICK_THRESHOLD: u8 = 31;

/// Minimum interval between two kicks
pub const KICK_INTERVAL_MS: u64 = 3500;

/// Gain factor for an upward kick
pub const KICK_UP: f32 = 1.5;

/// Gain factor for a downward kick
pub const KICK_DOWN: f32 = 0.6;

/// Minimum change and minimum time since the last push, per tier
pub const PUSH_TIERS: [(u8, u64); 3] = [(32, 3500), (16, 2200), (3, 1200)];

/// Map the gain multiplier onto the 0-255 slider; 1.0 sits at 128, the range
/// above is compressed so gains up to 4 remain visible.
pub fn gain_to_input_level(gain: f32) -> u8 {
    let level = if gain > 1.0 {
        128.0 * ((gain - 1.0) / 4.0 + 1.0)
    } else {
        128.0 * gain
    };
    if level.is_finite() {
        level.clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

/// Whether a change of `delta` after `elapsed_ms` clears one of the tiers
pub fn clears_push_tier(delta: u8, elapsed_ms: u64) -> bool {
    PUSH_TIERS
        .iter()
        .any(|&(min_delta, min_elapsed)| delta >= min_delta && elapsed_ms > min_elapsed)
}

/// What happened to the slider in one iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputLevelUpdate {
    /// Gain was kicked
    pub kicked: bool,
    /// New slider value pushed to the interfaces
    pub pushed: Option<u8>,
}

/// Kick the gain if the user moved the slider far enough.
///
/// Only a push refreshes the remembered user level, so a kick repeats every
/// [`KICK_INTERVAL_MS`] until the slider and the gain agree again.
pub fn apply_kick(
    control: &mut AgcControlState,
    input_level: u8,
    mode_changed: bool,
    now_ms: u64,
) -> bool {
    let last = control.last_user_input_level;
    if mode_changed
        || last.abs_diff(input_level) <= KICK_THRESHOLD
        || now_ms.saturating_sub(control.last_kick_ms) < KICK_INTERVAL_MS
    {
        return false;
    }

    let factor = if input_level > last { KICK_UP } else { KICK_DOWN };
    control.scale_gain(factor);
    control.last_kick_ms = now_ms;
    debug!(
        "AGC kick: slider {} -> {}, gain now {:.3}",
        last,
        input_level,
        control.gain()
    );
    true
}

/// Reflect the gain onto the slider when the change is worth telling the
/// interfaces about.
pub fn maybe_push(
    control: &mut AgcControlState,
    input_level: &mut u8,
    notifier: &mut dyn InterfaceNotifier,
    now_ms: u64,
) -> Option<u8> {
    let new_level = gain_to_input_level(control.gain());
    let delta = new_level.abs_diff(*input_level);
    let elapsed = now_ms.saturating_sub(control.last_push_ms);

    if !clears_push_tier(delta, elapsed) || !notifier.cooldown_elapsed(now_ms) {
        return None;
    }

    *input_level = new_level;
    control.last_push_ms = now_ms;
    control.last_user_input_level = new_level;
    notifier.notify_input_level(new_level, now_ms);
    Some(new_level)
}

/// Kick, then push. Does nothing unless AGC is enabled and the mode depicts it.
pub fn update_input_level(
    control: &mut AgcControlState,
    input_level: &mut u8,
    observation: &ModeObservation,
    agc_enabled: bool,
    notifier: &mut dyn InterfaceNotifier,
    now_ms: u64,
) -> InputLevelUpdate {
    if !agc_enabled || !observation.depicts_agc {
        return InputLevelUpdate::default();
    }

    let kicked = apply_kick(control, *input_level, observation.changed, now_ms);
    let pushed = maybe_push(control, input_level, notifier, now_ms);
    InputLevelUpdate { kicked, pushed }
}
