//! Integration tests for the microwave source driver
//!
//! These tests drive a simulated source end to end and check:
//! - Mode transitions and their idempotence
//! - Client-side validation (nothing reaches the wire on rejection)
//! - Sweep arming one step below the requested start
//! - Trigger polarity fallback and the blind trigger wait
//! - Bounded and cancellable polling
//! - Shared access through the source actor

use std::time::Duration;

use mw_driver::{
    spawn_source_actor, DriverConfig, DriverError, FrequencyReading, PollConfig, ReferenceSettings,
    SourceDriver, SweepRequest,
};
use mw_protocol::{BandwidthMode, LimitViolation, Mode, ModulationShape, TriggerEdge};
use mw_sim::{
    spawn_virtual_source, FrontPanelAction, VirtualSource, VirtualSourceConfig,
    VirtualSourceHandle,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Driver settings with fast polling for tests
    pub fn fast_config() -> DriverConfig {
        DriverConfig {
            poll: PollConfig {
                interval_ms: 1,
                max_attempts: 100,
            },
            ..Default::default()
        }
    }

    /// Connect a driver to a fresh virtual source
    pub async fn connect(source: VirtualSourceConfig) -> (SourceDriver, VirtualSourceHandle) {
        connect_with(source, fast_config()).await
    }

    pub async fn connect_with(
        source: VirtualSourceConfig,
        config: DriverConfig,
    ) -> (SourceDriver, VirtualSourceHandle) {
        let source = VirtualSource::from_config(source).unwrap();
        let (stream, handle) = spawn_virtual_source(source);
        let driver = SourceDriver::from_stream(stream, "sim", &config)
            .await
            .unwrap();
        (driver, handle)
    }

    /// Number of journaled lines so far
    pub async fn journal_len(handle: &VirtualSourceHandle) -> usize {
        handle.snapshot().await.unwrap().received_commands.len()
    }

    /// Journaled lines after the first `from`
    pub async fn sent_since(handle: &VirtualSourceHandle, from: usize) -> Vec<String> {
        handle.snapshot().await.unwrap().received_commands[from..].to_vec()
    }

    /// Journaled setting lines (no queries, no `*WAI`) after the first `from`
    pub async fn settings_since(handle: &VirtualSourceHandle, from: usize) -> Vec<String> {
        sent_since(handle, from)
            .await
            .into_iter()
            .filter(|c| !c.ends_with('?') && c != "*WAI")
            .collect()
    }

    pub fn smbv() -> VirtualSourceConfig {
        VirtualSourceConfig::default()
    }

    pub fn smb() -> VirtualSourceConfig {
        VirtualSourceConfig {
            model: "SMB100A".into(),
            ..Default::default()
        }
    }
}

use helpers::*;

// ============================================================================
// Mode Transitions
// ============================================================================

mod mode_transitions {
    use super::*;

    #[tokio::test]
    async fn same_mode_switch_sends_no_settings() {
        for mode in [Mode::ContinuousWave, Mode::Sweep] {
            let (mut driver, handle) = connect(smbv()).await;
            driver.turn_on(mode).await.unwrap();

            let before = journal_len(&handle).await;
            let first = driver.switch_to(mode).await.unwrap();
            let second = driver.switch_to(mode).await.unwrap();

            assert!(first.is_running && second.is_running);
            assert_eq!(second.mode, mode);
            assert!(settings_since(&handle, before).await.is_empty());
        }
    }

    #[tokio::test]
    async fn turn_on_same_mode_twice_is_noop() {
        let (mut driver, handle) = connect(smbv()).await;
        driver.turn_on(Mode::ContinuousWave).await.unwrap();

        let before = journal_len(&handle).await;
        driver.turn_on(Mode::ContinuousWave).await.unwrap();
        assert!(settings_since(&handle, before).await.is_empty());
    }

    #[tokio::test]
    async fn off_twice_sends_stop_once() {
        let (mut driver, handle) = connect(VirtualSourceConfig {
            output_settle_polls: 2,
            ..smbv()
        })
        .await;
        driver.turn_on(Mode::ContinuousWave).await.unwrap();

        let before = journal_len(&handle).await;
        driver.off().await.unwrap();
        driver.off().await.unwrap();

        assert_eq!(settings_since(&handle, before).await, vec!["OUTP:STAT OFF"]);
        assert!(!handle.snapshot().await.unwrap().output);
    }

    #[tokio::test]
    async fn switching_running_mode_stops_output_first() {
        let (mut driver, handle) = connect(smbv()).await;
        driver.turn_on(Mode::ContinuousWave).await.unwrap();

        let before = journal_len(&handle).await;
        let status = driver.switch_to(Mode::Sweep).await.unwrap();

        assert_eq!(status.mode, Mode::Sweep);
        assert!(!status.is_running);
        assert_eq!(
            settings_since(&handle, before).await,
            vec!["OUTP:STAT OFF", "FREQ:MODE SWEEP"]
        );
    }

    #[tokio::test]
    async fn state_is_read_fresh_after_front_panel_change() {
        let (mut driver, handle) = connect(smbv()).await;
        driver.turn_on(Mode::ContinuousWave).await.unwrap();

        handle.front_panel(FrontPanelAction::SetOutput(false)).await;
        assert!(!driver.status().await.unwrap().is_running);

        // Not cached: the driver sees the output is already off
        let before = journal_len(&handle).await;
        driver.off().await.unwrap();
        assert!(settings_since(&handle, before).await.is_empty());
    }

    #[tokio::test]
    async fn list_mode_is_unsupported() {
        let (mut driver, _handle) = connect(smbv()).await;

        driver.set_cw(Some(2e9), Some(-10.0)).await.unwrap();
        match driver.turn_on(Mode::List).await.unwrap_err() {
            DriverError::UnsupportedMode {
                mode: Mode::List,
                fallback: Some(readback),
                ..
            } => {
                assert_eq!(readback.mode, Mode::ContinuousWave);
                assert_eq!(readback.frequency, FrequencyReading::Cw(2e9));
            }
            other => panic!("expected fallback readback, got {:?}", other),
        }

        match driver.mode().set_list(&[1e9], None).await.unwrap_err() {
            DriverError::UnsupportedMode {
                fallback: Some(readback),
                ..
            } => {
                assert_eq!(readback.mode, Mode::ContinuousWave);
                assert_eq!(readback.frequency, FrequencyReading::Cw(1e9));
            }
            other => panic!("expected fallback readback, got {:?}", other),
        }
    }
}

// ============================================================================
// Continuous Wave
// ============================================================================

mod continuous_wave {
    use super::*;

    #[tokio::test]
    async fn set_cw_reads_back_actual_values() {
        let (mut driver, _handle) = connect(smbv()).await;

        let readback = driver.set_cw(Some(2.87e9), Some(-3.141)).await.unwrap();
        assert_eq!(readback.frequency, FrequencyReading::Cw(2.87e9));
        assert!((readback.power - -3.14).abs() < 1e-9);
        assert_eq!(readback.mode, Mode::ContinuousWave);
    }

    #[tokio::test]
    async fn set_cw_partial_update() {
        let (mut driver, handle) = connect(smbv()).await;
        driver.set_cw(Some(2e9), Some(-10.0)).await.unwrap();

        let before = journal_len(&handle).await;
        let readback = driver.set_cw(None, Some(-5.0)).await.unwrap();

        assert_eq!(readback.frequency, FrequencyReading::Cw(2e9));
        assert_eq!(readback.power, -5.0);
        assert_eq!(settings_since(&handle, before).await, vec!["POW -5"]);
    }

    #[tokio::test]
    async fn cw_above_model_maximum_is_rejected_before_sending() {
        let (mut driver, handle) = connect(smbv()).await;
        assert_eq!(driver.limits().max_frequency, 6e9);

        let before = journal_len(&handle).await;
        let err = driver.set_cw(Some(7e9), Some(0.0)).await.unwrap_err();

        assert!(matches!(
            err,
            DriverError::Validation(LimitViolation::FrequencyOutOfRange { value, max, .. })
                if value == 7e9 && max == 6e9
        ));
        assert_eq!(journal_len(&handle).await, before);
        assert_eq!(handle.snapshot().await.unwrap().cw_frequency, 1e9);
    }

    #[tokio::test]
    async fn smb100a_has_lower_ceiling() {
        let (mut driver, _handle) = connect(smb()).await;
        assert!(driver.set_cw(Some(3.2e9), None).await.is_ok());
        assert!(matches!(
            driver.set_cw(Some(4e9), None).await,
            Err(DriverError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn configured_power_ceiling_is_enforced() {
        let config = DriverConfig {
            max_power_dbm: Some(0.0),
            ..fast_config()
        };
        let (mut driver, handle) = connect_with(smbv(), config).await;

        let before = journal_len(&handle).await;
        assert!(matches!(
            driver.set_cw(None, Some(10.0)).await,
            Err(DriverError::Validation(LimitViolation::PowerOutOfRange { .. }))
        ));
        assert_eq!(journal_len(&handle).await, before);
    }
}

// ============================================================================
// Sweep
// ============================================================================

mod sweep {
    use super::*;

    #[tokio::test]
    async fn sweep_is_armed_one_step_below_start() {
        let (mut driver, handle) = connect(smbv()).await;

        let before = journal_len(&handle).await;
        let readback = driver
            .set_sweep(SweepRequest::new(1e9, 2e9, 1e6).with_power(0.0))
            .await
            .unwrap();

        assert_eq!(
            settings_since(&handle, before).await,
            vec![
                "FREQ:MODE SWEEP",
                "SWE:MODE STEP",
                "SWE:SPAC LIN",
                "FREQ:STAR 999000000",
                "FREQ:STOP 2000000000",
                "SWE:STEP:LIN 1000000",
                "POW 0",
                "TRIG:FSW:SOUR SING",
            ]
        );
        assert_eq!(
            readback.frequency,
            FrequencyReading::Sweep {
                start: 1e9,
                stop: 2e9,
                step: 1e6
            }
        );
        assert_eq!(readback.power, 0.0);
        assert_eq!(readback.mode, Mode::Sweep);

        assert_eq!(
            driver.frequency().await.unwrap(),
            FrequencyReading::Sweep {
                start: 1e9,
                stop: 2e9,
                step: 1e6
            }
        );
        assert_eq!(handle.snapshot().await.unwrap().sweep_start, 999e6);
    }

    #[tokio::test]
    async fn first_trigger_outputs_logical_start() {
        let (mut driver, handle) = connect(smbv()).await;
        driver
            .set_sweep(SweepRequest::new(1e9, 1.003e9, 1e6))
            .await
            .unwrap();
        driver.turn_on(Mode::Sweep).await.unwrap();

        driver.fire_trigger().await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().sweep_position, 1e9);

        driver.fire_trigger().await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().sweep_position, 1.001e9);

        driver.reset_sweep_position().await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().sweep_position, 999e6);
    }

    #[tokio::test]
    async fn set_sweep_stops_running_output() {
        let (mut driver, handle) = connect(smbv()).await;
        driver.turn_on(Mode::Sweep).await.unwrap();

        driver
            .set_sweep(SweepRequest::new(1e9, 2e9, 1e6))
            .await
            .unwrap();
        assert!(!handle.snapshot().await.unwrap().output);
    }

    #[tokio::test]
    async fn identical_sweep_is_sent_again() {
        let (mut driver, handle) = connect(smbv()).await;
        let request = SweepRequest::new(1e9, 2e9, 1e6);
        driver.set_sweep(request).await.unwrap();

        let before = journal_len(&handle).await;
        driver.set_sweep(request).await.unwrap();
        let sent = settings_since(&handle, before).await;
        assert!(sent.contains(&"FREQ:STAR 999000000".to_string()));
        assert!(sent.contains(&"FREQ:STOP 2000000000".to_string()));
    }

    #[tokio::test]
    async fn step_above_maximum_rejected_without_sending() {
        let (mut driver, handle) = connect(smbv()).await;
        let max_step = driver.limits().sweep_max_step;

        let before = journal_len(&handle).await;
        let err = driver
            .set_sweep(SweepRequest::new(1e6, 5e9, max_step + 1.0))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DriverError::Validation(LimitViolation::StepOutOfRange { .. })
        ));
        assert_eq!(journal_len(&handle).await, before);
    }

    #[tokio::test]
    async fn too_many_entries_rejected_without_sending() {
        let (mut driver, handle) = connect(smbv()).await;

        let before = journal_len(&handle).await;
        let err = driver
            .set_sweep(SweepRequest::new(1e9, 2e9, 1e3))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DriverError::Validation(LimitViolation::TooManyEntries { max: 10_001, .. })
        ));
        assert_eq!(journal_len(&handle).await, before);
    }
}

// ============================================================================
// Triggers
// ============================================================================

mod triggers {
    use super::*;

    #[tokio::test]
    async fn external_trigger_reads_back_polarity() {
        let (mut driver, _handle) = connect(smbv()).await;
        assert_eq!(
            driver.set_external_trigger(TriggerEdge::Falling).await.unwrap(),
            TriggerEdge::Falling
        );
        assert_eq!(
            driver.set_external_trigger(TriggerEdge::Rising).await.unwrap(),
            TriggerEdge::Rising
        );
    }

    #[tokio::test]
    async fn unrecognized_polarity_defaults_to_rising() {
        let (mut driver, _handle) = connect(VirtualSourceConfig {
            slope_reply_override: Some("ANY".into()),
            ..smbv()
        })
        .await;

        assert_eq!(
            driver.set_external_trigger(TriggerEdge::Falling).await.unwrap(),
            TriggerEdge::Rising
        );
    }

    #[tokio::test]
    async fn internal_trigger_stops_output() {
        let (mut driver, handle) = connect(smbv()).await;
        driver.turn_on(Mode::Sweep).await.unwrap();

        driver.set_internal_trigger().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(!snapshot.output);
    }
}

// ============================================================================
// Reference Modulation
// ============================================================================

mod reference {
    use super::*;

    #[tokio::test]
    async fn set_reference_then_enable() {
        let (mut driver, handle) = connect(smbv()).await;

        let readback = driver
            .set_reference(ReferenceSettings {
                shape: Some(ModulationShape::Square),
                center_frequency: Some(10e3),
                bandwidth_mode: Some(BandwidthMode::HighBandwidth),
                deviation: Some(1e6),
            })
            .await
            .unwrap();
        assert_eq!(readback.shape, ModulationShape::Square);
        assert_eq!(readback.center_frequency, 10e3);
        assert_eq!(readback.bandwidth_mode, BandwidthMode::HighBandwidth);
        assert_eq!(readback.deviation, 1e6);

        driver.enable_reference().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.fm_on && snapshot.lfo_on);

        // Changing settings switches the reference off again
        driver
            .set_reference(ReferenceSettings {
                center_frequency: Some(20e3),
                ..Default::default()
            })
            .await
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(!snapshot.fm_on && !snapshot.lfo_on);
        assert_eq!(snapshot.lfo_shape, ModulationShape::Square);
    }
}

// ============================================================================
// Bounded Polling
// ============================================================================

mod polling {
    use super::*;

    #[tokio::test]
    async fn stuck_output_times_out() {
        let (mut driver, _handle) = connect(VirtualSourceConfig {
            frozen_output: true,
            ..smbv()
        })
        .await;

        match driver.turn_on(Mode::ContinuousWave).await.unwrap_err() {
            DriverError::Timeout {
                command, attempts, ..
            } => {
                assert_eq!(command, "OUTP:STAT ON");
                assert_eq!(attempts, 100);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stuck_completion_times_out() {
        let config = DriverConfig {
            reset_on_connect: false,
            ..fast_config()
        };
        let (mut driver, _handle) = connect_with(
            VirtualSourceConfig {
                busy_polls: u32::MAX,
                ..smbv()
            },
            config,
        )
        .await;

        let err = driver.set_cw(Some(2e9), None).await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { ref command, .. } if command == "FREQ 2000000000"));
    }

    #[tokio::test]
    async fn stuck_poll_can_be_cancelled() {
        let config = DriverConfig {
            poll: PollConfig {
                interval_ms: 5,
                max_attempts: u32::MAX,
            },
            ..fast_config()
        };
        let (mut driver, _handle) = connect_with(
            VirtualSourceConfig {
                busy_polls: 2,
                frozen_output: true,
                ..smbv()
            },
            config,
        )
        .await;

        let token = driver.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            driver.turn_on(Mode::ContinuousWave),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, DriverError::Cancelled { ref command } if command == "OUTP:STAT ON"));

        // The next operation polls under a fresh token
        let readback = driver.set_cw(Some(2e9), Some(-5.0)).await.unwrap();
        assert_eq!(readback.frequency, FrequencyReading::Cw(2e9));
        assert!(!driver.cancel_token().is_cancelled());
    }
}

// ============================================================================
// Actor
// ============================================================================

mod actor {
    use super::*;

    #[tokio::test]
    async fn simulated_address_through_actor() {
        let driver = SourceDriver::connect(&DriverConfig {
            address: "SIM::SMBV100A".into(),
            ..fast_config()
        })
        .await
        .unwrap();
        let client = spawn_source_actor(driver);

        let readback = client
            .set_sweep(SweepRequest::new(2.8e9, 2.95e9, 1e6).with_power(-10.0))
            .await
            .unwrap();
        assert_eq!(readback.mode, Mode::Sweep);

        let status = client.turn_on(Mode::Sweep).await.unwrap();
        assert!(status.is_running);
        client.fire_trigger().await.unwrap();
        client.off().await.unwrap();

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_reaches_running_poll() {
        let source = VirtualSource::from_config(VirtualSourceConfig {
            frozen_output: true,
            ..smbv()
        })
        .unwrap();
        let (stream, _handle) = spawn_virtual_source(source);
        let config = DriverConfig {
            poll: PollConfig {
                interval_ms: 5,
                max_attempts: u32::MAX,
            },
            ..fast_config()
        };
        let driver = SourceDriver::from_stream(stream, "sim", &config)
            .await
            .unwrap();
        let client = spawn_source_actor(driver);

        let stuck = {
            let client = client.clone();
            tokio::spawn(async move { client.turn_on(Mode::ContinuousWave).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), stuck)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(DriverError::Cancelled { .. })));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn cw_readback_within_one_quantization_step(
            hz in 9e3f64..6e9f64,
            dbm in -145f64..30f64,
        ) {
            let readback = block_on(async {
                let (mut driver, _handle) = connect(smbv()).await;
                driver.set_cw(Some(hz), Some(dbm)).await.unwrap()
            });

            let actual_hz = readback.frequency.cw().unwrap();
            prop_assert!((actual_hz - hz).abs() <= mw_sim::source::FREQUENCY_RESOLUTION);
            prop_assert!((readback.power - dbm).abs() <= mw_sim::source::POWER_RESOLUTION);
        }

        #[test]
        fn sweep_arms_one_step_below_start(
            start_mhz in 100u32..3000,
            span_mhz in 1u32..1000,
            step_khz in 100u32..1000,
        ) {
            let start = f64::from(start_mhz) * 1e6;
            let stop = start + f64::from(span_mhz) * 1e6;
            let step = f64::from(step_khz) * 1e3;

            let (snapshot, readback) = block_on(async {
                let (mut driver, handle) = connect(smbv()).await;
                let readback = driver
                    .set_sweep(SweepRequest::new(start, stop, step))
                    .await
                    .unwrap();
                (handle.snapshot().await.unwrap(), readback)
            });

            prop_assert_eq!(snapshot.sweep_start, start - step);
            prop_assert_eq!(
                readback.frequency,
                FrequencyReading::Sweep { start, stop, step }
            );
        }

        #[test]
        fn out_of_range_cw_never_reaches_the_wire(
            hz in prop_oneof![0f64..9e3, 6.000001e9f64..20e9],
        ) {
            let (before, after, err) = block_on(async {
                let (mut driver, handle) = connect(smbv()).await;
                let before = journal_len(&handle).await;
                let err = driver.set_cw(Some(hz), None).await.unwrap_err();
                (before, journal_len(&handle).await, err)
            });

            prop_assert_eq!(before, after);
            prop_assert!(matches!(err, DriverError::Validation(_)), "{:?}", err);
        }
    }
}
