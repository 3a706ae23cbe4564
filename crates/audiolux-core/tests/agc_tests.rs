use audiolux_core::input_level::{apply_kick, maybe_push};
use audiolux_core::{
    history_slot, AgcControlState, AgcEngine, AgcInput, DerivedAudioState, LogNotifier,
    ModeObservation, SamplerSettings, HISTORY_LEN,
};
use audiolux_core::{update_input_level, InterfaceNotifier};
use proptest::prelude::*;

fn agc_mode(changed: bool) -> ModeObservation {
    ModeObservation {
        mode: 140,
        changed,
        depicts_agc: true,
    }
}

proptest! {
    #[test]
    fn prop_out_of_range_preset_matches_disabled(
        preset in 4u8..=255,
        levels in proptest::collection::vec(0.0f32..3000.0, 1..200),
    ) {
        let mut clamped = AgcEngine::new(SamplerSettings::default());
        let mut disabled = AgcEngine::new(SamplerSettings::default());
        let mut control_a = AgcControlState::default();
        let mut control_b = AgcControlState::default();
        let mut state_a = DerivedAudioState::default();
        let mut state_b = DerivedAudioState::default();

        for (i, level) in levels.iter().enumerate() {
            let input = AgcInput { level: *level, peak_bin_magnitude: *level / 10.0 };
            let now = (i as u64 + 1) * 3;
            clamped.process(&input, preset, 128, &mut control_a, &mut state_a, now);
            disabled.process(&input, 0, 128, &mut control_b, &mut state_b, now);
        }

        prop_assert_eq!(control_a, control_b);
        prop_assert_eq!(state_a, state_b);
        prop_assert_eq!(clamped, disabled);
    }

    #[test]
    fn prop_gain_stays_positive_and_finite(
        preset in 0u8..=3,
        levels in proptest::collection::vec(
            prop_oneof![0.0f32..5000.0, Just(f32::NAN), Just(f32::INFINITY)],
            1..300,
        ),
    ) {
        let mut engine = AgcEngine::new(SamplerSettings::default());
        let mut control = AgcControlState::default();
        let mut state = DerivedAudioState::default();

        for (i, level) in levels.iter().enumerate() {
            let input = AgcInput { level: *level, peak_bin_magnitude: 0.0 };
            engine.process(&input, preset, 128, &mut control, &mut state, (i as u64 + 1) * 3);
            prop_assert!(control.gain().is_finite());
            prop_assert!(control.gain() > 0.0);
            prop_assert!((0.0..=255.0).contains(&state.sample_agc));
        }
    }

    #[test]
    fn prop_history_slot_in_range(now in any::<u64>()) {
        let slot = history_slot(now);
        prop_assert!(slot < HISTORY_LEN);
        prop_assert_eq!(slot, (now % 32) as usize);

        let mut state = DerivedAudioState { sample_agc: 42.0, ..Default::default() };
        state.record_history(now);
        prop_assert_eq!(state.history[slot], 42);
    }
}

#[test]
fn test_history_wraps_around() {
    assert_eq!(history_slot(31), 31);
    assert_eq!(history_slot(32), 0);
    assert_eq!(history_slot(u64::MAX), 31);
}

#[test]
fn test_kick_up_by_32() {
    let mut control = AgcControlState::default();
    control.last_user_input_level = 100;
    control.last_kick_ms = 1000;
    assert!(apply_kick(&mut control, 132, false, 4500));
    assert!((control.gain() - 1.5).abs() < 1e-6);
    assert_eq!(control.last_kick_ms, 4500);
}

#[test]
fn test_kick_down_by_32() {
    let mut control = AgcControlState::default();
    control.last_user_input_level = 100;
    control.last_kick_ms = 1000;
    assert!(apply_kick(&mut control, 68, false, 4500));
    assert!((control.gain() - 0.6).abs() < 1e-6);
}

#[test]
fn test_kick_ignores_31() {
    let mut control = AgcControlState::default();
    control.last_user_input_level = 100;
    control.last_kick_ms = 1000;
    assert!(!apply_kick(&mut control, 131, false, 4500));
    assert!(!apply_kick(&mut control, 69, false, 4500));
    assert_eq!(control.gain(), 1.0);
}

#[test]
fn test_kick_rate_limited() {
    let mut control = AgcControlState::default();
    control.last_user_input_level = 100;
    control.last_kick_ms = 1000;
    assert!(!apply_kick(&mut control, 200, false, 4499));
    assert!(apply_kick(&mut control, 200, false, 4500));
    // Slider still far away, but the next kick has to wait
    assert!(!apply_kick(&mut control, 200, false, 7999));
    assert!(apply_kick(&mut control, 200, false, 8000));
    assert!((control.gain() - 2.25).abs() < 1e-5);
}

#[test]
fn test_small_change_after_1000ms_does_not_push() {
    let mut control = AgcControlState::default();
    control.last_push_ms = 9_000;
    control.set_gain(1.0 + 4.0 * 3.0 / 128.0); // three units above 128
    let mut level = 128;
    let mut notifier = LogNotifier::default();

    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 10_000), None);
    assert_eq!(level, 128);
    assert_eq!(notifier.last_update_ms(), None);
}

#[test]
fn test_three_units_after_1300ms_pushes() {
    let mut control = AgcControlState::default();
    control.last_push_ms = 8_700;
    control.set_gain(1.0 + 4.0 * 3.5 / 128.0);
    let mut level = 128;
    let mut notifier = LogNotifier::default();

    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 10_000), Some(131));
    assert_eq!(level, 131);
    assert_eq!(control.last_user_input_level, 131);
    assert_eq!(control.last_push_ms, 10_000);
}

#[test]
fn test_push_respects_interface_cooldown() {
    let mut control = AgcControlState::default();
    control.set_gain(4.0);
    let mut level = 128;
    let mut notifier = LogNotifier::default();
    notifier.notify_input_level(128, 9_000);

    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 10_000), None);
    assert!(maybe_push(&mut control, &mut level, &mut notifier, 10_001).is_some());
}

#[test]
fn test_smallest_tier_fires_after_a_real_push() {
    let mut control = AgcControlState::default();
    control.set_gain(2.0);
    let mut level = 128;
    let mut notifier = LogNotifier::default();

    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 10_000), Some(160));

    // Three units above the pushed level
    control.set_gain(1.0 + 4.0 * 35.0 / 128.0);
    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 11_000), None);
    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 11_200), None);
    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 11_300), Some(163));
    assert_eq!(level, 163);
    assert_eq!(notifier.last_update_ms(), Some(11_300));
}

#[test]
fn test_two_unit_change_never_pushes() {
    let mut control = AgcControlState::default();
    control.set_gain(2.0);
    let mut level = 128;
    let mut notifier = LogNotifier::default();
    maybe_push(&mut control, &mut level, &mut notifier, 10_000);

    control.set_gain(1.0 + 4.0 * 34.0 / 128.0);
    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 11_000), None);
    assert_eq!(maybe_push(&mut control, &mut level, &mut notifier, 11_300), None);
    assert_eq!(level, 160);
}

#[test]
fn test_update_skips_kick_on_mode_change() {
    let mut control = AgcControlState::default();
    control.last_user_input_level = 0;
    let mut level = 200;
    let mut notifier = LogNotifier::default();
    // Keep the push out of the way
    notifier.notify_input_level(200, 9_500);

    let update = update_input_level(
        &mut control,
        &mut level,
        &agc_mode(true),
        true,
        &mut notifier,
        10_000,
    );
    assert!(!update.kicked);

    let update = update_input_level(
        &mut control,
        &mut level,
        &agc_mode(false),
        true,
        &mut notifier,
        10_001,
    );
    assert!(update.kicked);
}

#[test]
fn test_update_requires_agc_enabled() {
    let mut control = AgcControlState::default();
    let mut level = 255;
    let mut notifier = LogNotifier::default();

    let update = update_input_level(
        &mut control,
        &mut level,
        &agc_mode(false),
        false,
        &mut notifier,
        50_000,
    );
    assert!(!update.kicked);
    assert_eq!(update.pushed, None);
    assert_eq!(control.gain(), 1.0);
}
