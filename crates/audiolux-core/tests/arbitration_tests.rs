use audiolux_core::{
    decide, OperatingModeFlags, ProcessingMode, RealtimeArbitrator, RealtimeMode,
    RealtimeOverride, SyncRole,
};
use proptest::prelude::*;

fn any_realtime_mode() -> impl Strategy<Value = RealtimeMode> {
    prop_oneof![
        Just(RealtimeMode::Inactive),
        Just(RealtimeMode::Generic),
        Just(RealtimeMode::Udp),
        Just(RealtimeMode::Hyperion),
        Just(RealtimeMode::E131),
        Just(RealtimeMode::Adalight),
        Just(RealtimeMode::ArtNet),
        Just(RealtimeMode::Tpm2Net),
        Just(RealtimeMode::Ddp),
    ]
}

fn any_override() -> impl Strategy<Value = RealtimeOverride> {
    prop_oneof![
        Just(RealtimeOverride::None),
        Just(RealtimeOverride::Once),
        Just(RealtimeOverride::Always),
    ]
}

fn flags_with_role(
    role_bits: impl Strategy<Value = u8>,
) -> impl Strategy<Value = OperatingModeFlags> {
    (any_realtime_mode(), any_override(), any::<bool>(), role_bits).prop_map(
        |(realtime_mode, realtime_override, main_segment_only, bits)| OperatingModeFlags {
            realtime_mode,
            realtime_override,
            main_segment_only,
            sync_role: SyncRole::from_bits(bits),
        },
    )
}

proptest! {
    #[test]
    fn prop_receive_always_disables(flags in flags_with_role(prop_oneof![Just(0b10u8), Just(0b11u8)])) {
        prop_assert_eq!(decide(&flags), ProcessingMode::SuspendedBySyncRole);

        let mut arbitrator = RealtimeArbitrator::new();
        arbitrator.evaluate(&flags, 0);
        prop_assert!(arbitrator.disable_sound_processing());
    }

    #[test]
    fn prop_transmit_only_enables(flags in flags_with_role(Just(0b01u8))) {
        prop_assert_eq!(decide(&flags), ProcessingMode::Active);

        let mut arbitrator = RealtimeArbitrator::new();
        arbitrator.evaluate(&flags, 0);
        prop_assert!(!arbitrator.disable_sound_processing());
    }

    #[test]
    fn prop_without_sync_follows_realtime_rule(flags in flags_with_role(Just(0u8))) {
        let expect_suspended = flags.realtime_override == RealtimeOverride::None
            && !flags.main_segment_only
            && flags.realtime_mode.takes_full_control();
        let mode = decide(&flags);
        prop_assert_eq!(mode.is_suspended(), expect_suspended);
        if expect_suspended {
            prop_assert_eq!(mode, ProcessingMode::SuspendedByOverride);
        }
    }

    #[test]
    fn prop_resume_only_after_suspension(
        sequence in proptest::collection::vec(flags_with_role(0u8..4), 1..50),
    ) {
        let mut arbitrator = RealtimeArbitrator::new();
        let mut previous = ProcessingMode::Active;
        for (i, flags) in sequence.iter().enumerate() {
            let now = i as u64 * 10;
            let outcome = arbitrator.evaluate(flags, now);
            let expected = previous.is_suspended() && !outcome.mode.is_suspended();
            prop_assert_eq!(outcome.resumed, expected);
            if outcome.resumed {
                prop_assert_eq!(arbitrator.timing_reference_ms(), Some(now));
            }
            previous = outcome.mode;
        }
    }
}

#[test]
fn test_unknown_role_bits_ignored() {
    let flags = OperatingModeFlags {
        sync_role: SyncRole::from_bits(0b1111_1100),
        realtime_mode: RealtimeMode::Generic,
        ..Default::default()
    };
    assert_eq!(decide(&flags), ProcessingMode::SuspendedByOverride);
}

#[test]
fn test_receive_to_active_resets_timing() {
    let mut arbitrator = RealtimeArbitrator::new();
    let receive = OperatingModeFlags {
        sync_role: SyncRole::RECEIVE,
        ..Default::default()
    };
    arbitrator.evaluate(&receive, 100);
    assert_eq!(arbitrator.mode(), ProcessingMode::SuspendedBySyncRole);

    let outcome = arbitrator.evaluate(&OperatingModeFlags::default(), 250);
    assert!(outcome.resumed);
    assert_eq!(arbitrator.timing_reference_ms(), Some(250));
}
