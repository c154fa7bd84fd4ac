//! Integration tests for rail sequencing over long runs

#![cfg(test)]

mod common;

use roomsense_core::{
    constants::lpp::{
        CHANNEL_BATTERY, CHANNEL_HUMIDITY, CHANNEL_PRESENCE, CHANNEL_TEMPERATURE, CHANNEL_VOC,
    },
    power::PowerDomain,
    sensor::SensorKind,
    sim::{run_until, SimBattery},
    PowerSource,
};

use common::{assert_no_violations, channels, scenarios, Rig};

#[test]
fn test_long_run_never_touches_unpowered_domain() {
    let mut rig = Rig::new();
    scenarios::fully_loaded(&mut rig);
    let board = rig.board.clone();
    let radio = rig.radio.clone();
    let shared = rig.shared;
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();

    for minute in 1..=30u64 {
        run_until(&mut node, clock, minute * 60_000);
        if minute % 7 == 0 {
            shared.on_button(4);
        }
        if minute % 11 == 0 {
            shared.on_tx_finished(true);
        }
    }

    // The room empties after ten minutes and the period doubles
    assert!(radio.accepted().len() >= 9);
    assert_no_violations(&board);
}

#[test]
fn test_every_bus_enable_is_matched_by_a_cut() {
    let mut rig = Rig::new().headless();
    scenarios::office(&mut rig);
    let board = rig.board.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();
    run_until(&mut node, clock, 60_000);

    // Boot scan and one cycle; every enable is matched by a cut
    let trace = board.trace();
    let enables = board.enables(PowerDomain::Bus);
    let disables = trace
        .iter()
        .filter(|&&(d, on)| d == PowerDomain::Bus && !on)
        .count();
    assert!(enables >= 2);
    assert_eq!(enables, disables);
    assert!(!node.is_powered(PowerDomain::Bus));
}

#[test]
fn test_mains_keeps_every_rail_on() {
    let mut rig = Rig::new().headless();
    rig.battery = SimBattery::new(0);
    let fleet = scenarios::office(&mut rig);
    let board = rig.board.clone();
    let clock = rig.clock;

    let mut node = rig.node();
    node.boot();
    assert_eq!(node.power_source(), PowerSource::Mains);

    run_until(&mut node, clock, 300_000);

    for domain in PowerDomain::ALL {
        assert!(board.rail(domain), "{} off on mains", domain);
    }
    assert_eq!(board.enables(PowerDomain::Bus), 1);
    assert!(fleet.particulate.reads() >= 2);
    // Rails never dropped, so nothing needs probing again
    assert_eq!(fleet.co2.probes(), 1);
    assert_eq!(fleet.particulate.probes(), 1);
    assert_no_violations(&board);
}

#[test]
fn test_failed_rail_leaves_its_sensors_out() {
    let mut rig = Rig::new().headless();
    let fleet = scenarios::office(&mut rig);
    let board = rig.board.clone();
    let radio = rig.radio.clone();
    let clock = rig.clock;
    board.fail_rail(PowerDomain::GasParticulate);

    let mut node = rig.node();
    let presence = node.boot();
    assert!(!presence.contains(SensorKind::Co2));
    assert!(!presence.contains(SensorKind::Particulate));
    assert!(presence.contains(SensorKind::TempHumidity));

    run_until(&mut node, clock, 60_000);

    assert_eq!(fleet.co2.probes(), 0);
    assert_eq!(
        channels(&radio.accepted()[0].payload),
        vec![
            CHANNEL_TEMPERATURE,
            CHANNEL_HUMIDITY,
            CHANNEL_VOC,
            CHANNEL_BATTERY,
            CHANNEL_PRESENCE,
        ]
    );
    assert_no_violations(&board);
}
