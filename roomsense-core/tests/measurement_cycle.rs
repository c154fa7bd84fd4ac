//! Integration tests for the measurement cycle
//!
//! Drives a node over simulated rails, sensors and radio from boot through
//! complete uplinks.

#![cfg(test)]

mod common;

use roomsense_core::{
    constants::lpp::{
        CHANNEL_BATTERY, CHANNEL_CO2, CHANNEL_HUMIDITY, CHANNEL_PM10, CHANNEL_PM1_0, CHANNEL_PM2_5,
        CHANNEL_PRESENCE, CHANNEL_TEMPERATURE, CHANNEL_VOC,
    },
    datarate::Region,
    node::{CycleState, TxOutcome},
    payload::LppType,
    power::PowerDomain,
    radio::SendStatus,
    sensor::{Quantity, SensorConfig, SensorKind},
    sim::{run_until, SimRadio, SimSensor},
    NodeConfig,
};

use common::{assert_no_violations, channels, records, scenarios, Rig, BATTERY_MV};

#[test]
fn test_cycle_sends_every_present_sensor() {
    let mut rig = Rig::new().headless();
    let fleet = scenarios::office(&mut rig);
    let radio = rig.radio.clone();
    let board = rig.board.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    let presence = node.boot();
    assert_eq!(presence.len(), 4);

    assert_eq!(run_until(&mut node, clock, 60_000), None);

    let frames = radio.accepted();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        channels(&frames[0].payload),
        vec![
            CHANNEL_TEMPERATURE,
            CHANNEL_HUMIDITY,
            CHANNEL_CO2,
            CHANNEL_PM1_0,
            CHANNEL_PM2_5,
            CHANNEL_PM10,
            CHANNEL_VOC,
            CHANNEL_BATTERY,
            CHANNEL_PRESENCE,
        ]
    );

    let decoded = records(&frames[0].payload);
    assert_eq!(decoded[0], (CHANNEL_TEMPERATURE, LppType::Temperature, 21.5));
    assert_eq!(decoded[2], (CHANNEL_CO2, LppType::Concentration, 650.0));
    assert_eq!(decoded[7], (CHANNEL_BATTERY, LppType::Voltage, 3.7));
    assert_eq!(decoded[8], (CHANNEL_PRESENCE, LppType::Presence, 1.0));

    let report = node.last_report().expect("cycle completed");
    assert_eq!(report.outcome, TxOutcome::Accepted);
    assert_eq!(report.read.len(), 4);
    assert!(report.skipped.is_empty());
    assert_eq!(node.state(), CycleState::Idle);
    assert_eq!(node.battery_mv(), BATTERY_MV);

    // Sleep-command sensors were told to sleep before their rails went down
    assert!(fleet.climate.sleeps() >= 1);
    assert!(fleet.co2.sleeps() >= 1);
    assert_eq!(fleet.particulate.sleeps(), 0);
    assert!(fleet.voc.background_samples() >= 1);

    assert!(!board.rail(PowerDomain::Bus));
    assert!(!board.rail(PowerDomain::GasParticulate));
    assert!(board.rail(PowerDomain::Voc));
    assert!(board.rail(PowerDomain::Motion));
    assert_no_violations(&board);
}

#[test]
fn test_gas_sensor_timeout_still_sends() {
    let mut rig = Rig::new().headless();
    let climate = rig.add(SensorConfig::new(SensorKind::TempHumidity));
    climate.set_sample(Quantity::Temperature, 20.0);
    let stuck = SimSensor::new(&rig.board, PowerDomain::GasParticulate).never_ready();
    let co2 = rig.add_sensor(SensorConfig::new(SensorKind::Co2), stuck);
    let radio = rig.radio.clone();
    let board = rig.board.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();
    assert!(node.presence().contains(SensorKind::Co2));

    run_until(&mut node, clock, 90_000);

    let frames = radio.accepted();
    assert_eq!(frames.len(), 1);
    let sent = channels(&frames[0].payload);
    assert!(!sent.contains(&CHANNEL_CO2));
    assert_eq!(sent, vec![CHANNEL_TEMPERATURE, CHANNEL_BATTERY, CHANNEL_PRESENCE]);

    let report = node.last_report().expect("cycle completed");
    assert!(report.skipped.contains(SensorKind::Co2));
    assert!(report.read.contains(SensorKind::TempHumidity));

    // Polled until the bound, then parked anyway
    assert!(co2.polls() > 1);
    assert_eq!(co2.reads(), 0);
    assert!(co2.sleeps() >= 1);
    assert_no_violations(&board);
}

#[test]
fn test_absent_sensor_is_never_woken() {
    let mut rig = Rig::new().headless();
    let missing = SimSensor::new(&rig.board, PowerDomain::Bus).absent();
    let light = rig.add_sensor(SensorConfig::new(SensorKind::Light), missing);
    let radio = rig.radio.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    let presence = node.boot();
    assert!(presence.is_empty());
    let probes_at_boot = light.probes();
    assert!(probes_at_boot >= 1);

    run_until(&mut node, clock, 300_000);

    assert_eq!(light.wakes(), 0);
    assert_eq!(light.probes(), probes_at_boot);
    // Empty rooms still get battery and presence
    assert!(radio.accepted().len() >= 2);
    assert_eq!(
        channels(&radio.accepted()[0].payload),
        vec![CHANNEL_BATTERY, CHANNEL_PRESENCE]
    );
}

#[test]
fn test_heartbeat_confirms_every_nth_uplink() {
    let mut rig = Rig::new()
        .headless()
        .with_config(NodeConfig::new().with_reliability(10, 3));
    scenarios::office(&mut rig);
    let radio = rig.radio.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();
    run_until(&mut node, clock, 400_000);

    let confirms: Vec<bool> = radio.accepted().iter().map(|f| f.confirm).collect();
    assert!(confirms.len() >= 3);
    assert_eq!(&confirms[..3], &[false, false, true]);
}

#[test]
fn test_rate_fitting_picks_slowest_carrying_rate() {
    let mut rig = Rig::new()
        .headless()
        .with_radio(SimRadio::new(Region::Eu868).joined().rate_selectable());
    scenarios::fully_loaded(&mut rig);
    let radio = rig.radio.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();
    run_until(&mut node, clock, 60_000);

    let frames = radio.accepted();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload.len(), 68);
    assert_eq!(frames[0].rate, Some(3));
    assert_eq!(node.last_report().and_then(|r| r.rate), Some(3));
    assert_eq!(node.display_state().last_rate, Some(3));
}

#[test]
fn test_rate_fitting_retries_once_then_gives_up() {
    let mut rig = Rig::new()
        .headless()
        .with_radio(SimRadio::new(Region::Eu868).joined().rate_selectable().reject_rate(3));
    scenarios::fully_loaded(&mut rig);
    let radio = rig.radio.clone();
    let clock = rig.clock;
    let mut node = rig.node();
    node.boot();
    run_until(&mut node, clock, 60_000);
    assert_eq!(radio.accepted()[0].rate, Some(4));
    drop(node);

    let mut rig = Rig::new().headless().with_radio(
        SimRadio::new(Region::Eu868)
            .joined()
            .rate_selectable()
            .reject_rate(3)
            .reject_rate(4),
    );
    scenarios::fully_loaded(&mut rig);
    let radio = rig.radio.clone();
    let console = rig.console.clone();
    let clock = rig.clock;
    let mut node = rig.node();
    node.boot();
    run_until(&mut node, clock, 60_000);

    assert!(radio.frames().is_empty());
    assert!(console.saw("+EVT:SIZE_ERROR"));
    assert_eq!(node.last_report().map(|r| r.outcome), Some(TxOutcome::NoRate));
}

#[test]
fn test_uplink_waits_for_join() {
    let mut rig = Rig::new().headless().with_radio(SimRadio::new(Region::Eu868));
    scenarios::office(&mut rig);
    let radio = rig.radio.clone();
    let console = rig.console.clone();
    let shared = rig.shared;
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();
    assert_eq!(radio.joins(), 1);

    // Cycle timer still runs; the uplink is skipped without counting
    run_until(&mut node, clock, 200_000);
    assert!(radio.frames().is_empty());
    assert_eq!(node.last_report().map(|r| r.outcome), Some(TxOutcome::NotJoined));
    assert_eq!(node.reliability().send_failures(), 0);

    radio.set_joined(true);
    shared.on_join_finished(true);
    run_until(&mut node, clock, 260_000);

    assert!(console.saw("+EVT:JOINED"));
    assert_eq!(radio.accepted().len(), 1);
}

#[test]
fn test_busy_radio_counts_as_failure() {
    let mut rig = Rig::new().headless();
    scenarios::office(&mut rig);
    let radio = rig.radio.clone();
    let console = rig.console.clone();
    let clock = rig.clock;
    radio.queue_status(SendStatus::Busy);

    let mut node = rig.node();
    node.boot();
    run_until(&mut node, clock, 60_000);

    assert!(console.saw("+EVT:BUSY"));
    assert_eq!(node.reliability().send_failures(), 1);
    assert_eq!(node.last_report().map(|r| r.outcome), Some(TxOutcome::Busy));
    assert_eq!(node.state(), CycleState::Idle);
}

#[test]
fn test_refused_uplink_keeps_heartbeat_due() {
    let mut rig = Rig::new()
        .headless()
        .with_config(NodeConfig::new().with_reliability(10, 2));
    scenarios::office(&mut rig);
    let radio = rig.radio.clone();
    let clock = rig.clock;
    radio.queue_status(SendStatus::Accepted);
    radio.queue_status(SendStatus::Busy);

    let mut node = rig.node();
    node.boot();
    run_until(&mut node, clock, 400_000);

    let sent: Vec<(SendStatus, bool)> = radio.frames().iter().map(|f| (f.status, f.confirm)).collect();
    assert!(sent.len() >= 4);
    // The forced acknowledgement moves to the next frame the radio takes
    assert_eq!(
        &sent[..4],
        &[
            (SendStatus::Accepted, false),
            (SendStatus::Busy, true),
            (SendStatus::Accepted, true),
            (SendStatus::Accepted, false),
        ]
    );
}

#[test]
fn test_sensors_on_a_cut_rail_are_probed_again() {
    let mut rig = Rig::new().headless();
    let fleet = scenarios::office(&mut rig);
    let board = rig.board.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();
    let co2_at_boot = fleet.co2.probes();
    let pm_at_boot = fleet.particulate.probes();
    let voc_at_boot = fleet.voc.probes();

    // Cycles at 0, 120 and 240 s, each after the rails were cut
    run_until(&mut node, clock, 300_000);

    assert_eq!(fleet.co2.wakes(), 3);
    assert_eq!(fleet.co2.probes(), co2_at_boot + 3);
    assert_eq!(fleet.particulate.probes(), pm_at_boot + 3);
    assert_eq!(fleet.voc.probes(), voc_at_boot);
    assert_no_violations(&board);
}
