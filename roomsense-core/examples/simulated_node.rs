//! Simulated Node Example
//!
//! Runs a fully fitted RoomSense node against simulated rails, sensors and
//! radio for one simulated hour and prints every uplink.
//!
//! ## What You'll Learn
//!
//! - Wiring board collaborators into a `Node`
//! - Driving the dispatcher loop and sleeping until the next deadline
//! - Feeding AT commands and downlinks
//! - Reading back decoded uplinks
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example simulated_node
//! ```

use roomsense_core::{
    at::{self, NullConsole},
    datarate::Region,
    irq::Shared,
    node::{Node, Peripherals},
    payload::decode,
    power::PowerDomain,
    sensor::{Quantity, SensorBank, SensorConfig, SensorKind},
    settings::JsonFileStore,
    sim::{run_until, SimBattery, SimBoard, SimClock, SimRadio, SimSensor},
    NodeConfig,
};

static SHARED: Shared = Shared::new();

const MINUTE_MS: u64 = 60_000;

fn main() {
    println!("RoomSense Simulated Node");
    println!("========================\n");

    let clock = SimClock::new();
    let mut delay = &clock;
    let board = SimBoard::new();
    let mut rails = board.rails();

    let mut climate = SimSensor::new(&board, PowerDomain::Bus)
        .with_sample(Quantity::Temperature, 21.4)
        .with_sample(Quantity::Humidity, 47.0);
    let mut co2 = SimSensor::new(&board, PowerDomain::GasParticulate).with_sample(Quantity::Co2, 780.0);
    let mut particulate = SimSensor::new(&board, PowerDomain::GasParticulate)
        .with_sample(Quantity::Pm2_5, 6.0)
        .with_sample(Quantity::Pm10, 11.0);
    let mut voc = SimSensor::new(&board, PowerDomain::Voc).with_sample(Quantity::VocIndex, 110.0);
    let co2_handle = co2.clone();

    let mut radio = SimRadio::new(Region::Eu868).joined().rate_selectable();
    let frames = radio.clone();
    let mut battery = SimBattery::new(3_800);
    let settings_path = std::env::temp_dir().join("roomsense-simulated-node.json");
    let mut store = JsonFileStore::new(settings_path.clone());
    let mut console = NullConsole;

    let sensors = SensorBank::new()
        .with(SensorConfig::new(SensorKind::TempHumidity), &mut climate)
        .with(SensorConfig::new(SensorKind::Co2), &mut co2)
        .with(SensorConfig::new(SensorKind::Particulate), &mut particulate)
        .with(SensorConfig::new(SensorKind::Voc), &mut voc);

    let peripherals = Peripherals {
        clock: &clock,
        delay: &mut delay,
        rails: &mut rails,
        radio: &mut radio,
        battery: &mut battery,
        store: &mut store,
        console: &mut console,
        indicator: None,
        display: None,
    };
    let mut node = Node::new(&SHARED, NodeConfig::default(), sensors, peripherals);

    let presence = node.boot();
    let modules: Vec<&str> = presence.iter().map(|kind| kind.name()).collect();
    println!("Detected modules: {}", modules.join(", "));
    println!("Power source: {}\n", node.power_source().name());

    for line in ["AT+SENDINT=300", "AT+SENDINT?", "AT+CO2=9999"] {
        match node.handle_line(line) {
            Ok(response) => println!("> {}\n{}", line, response),
            Err(e) => println!("> {}\n{}", line, at::error_line(e)),
        }
    }
    println!();

    let mut printed = 0;
    for minute in 1..=60 {
        if let Some(cause) = run_until(&mut node, &clock, minute * MINUTE_MS) {
            println!("restart requested: {:?}", cause);
            break;
        }

        if minute == 20 {
            co2_handle.set_sample(Quantity::Co2, 1_350.0);
        }
        if minute == 40 {
            // Downlink: back to two minutes
            SHARED.on_rx(3, &[0xAA, 0x55, 0x00, 0x00, 0x00, 0x78]);
        }

        let sent = frames.accepted();
        for frame in &sent[printed..] {
            // Every uplink is delivered
            SHARED.on_tx_finished(true);
            println!(
                "t={:>4}s  {} bytes at rate {:?}  air {:?}",
                clock.now() / 1000,
                frame.payload.len(),
                frame.rate,
                node.air_status()
            );
            for record in decode(&frame.payload) {
                println!("         ch {:>2}  {:?}  {}", record.channel, record.kind, record.value);
            }
        }
        printed = sent.len();
    }

    println!("\nUplinks sent: {}", printed);
    println!("Send interval now: {} s", node.settings().send_interval_s);
    println!("Settings stored at {}", settings_path.display());
}
