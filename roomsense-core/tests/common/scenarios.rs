//! Sensor fleets fitted to the rig
//!
//! Values sit in the comfortable range so the air status is good unless a
//! test changes them.

use roomsense_core::sensor::{Quantity, SensorConfig, SensorKind};
use roomsense_core::sim::SimSensor;

use super::Rig;

/// Typical office node
pub struct Fleet {
    pub climate: SimSensor,
    pub co2: SimSensor,
    pub particulate: SimSensor,
    pub voc: SimSensor,
}

/// Climate, CO2, particulate and VOC with default configs
pub fn office(rig: &mut Rig) -> Fleet {
    let climate = rig.add(SensorConfig::new(SensorKind::TempHumidity));
    climate.set_sample(Quantity::Temperature, 21.5);
    climate.set_sample(Quantity::Humidity, 45.0);

    let co2 = rig.add(SensorConfig::new(SensorKind::Co2));
    co2.set_sample(Quantity::Co2, 650.0);

    let particulate = rig.add(SensorConfig::new(SensorKind::Particulate));
    particulate.set_sample(Quantity::Pm1_0, 3.0);
    particulate.set_sample(Quantity::Pm2_5, 5.0);
    particulate.set_sample(Quantity::Pm10, 8.0);

    let voc = rig.add(SensorConfig::new(SensorKind::Voc));
    voc.set_sample(Quantity::VocIndex, 100.0);

    Fleet {
        climate,
        co2,
        particulate,
        voc,
    }
}

/// Every kind fitted, each reporting all quantities it has a channel for
///
/// Encodes to 68 bytes, too large for the three slowest EU868 rates.
pub fn fully_loaded(rig: &mut Rig) -> Vec<SimSensor> {
    let samples: [(SensorKind, &[(Quantity, f32)]); SensorKind::COUNT] = [
        (
            SensorKind::TempHumidity,
            &[(Quantity::Temperature, 21.5), (Quantity::Humidity, 45.0)],
        ),
        (SensorKind::Pressure, &[(Quantity::Pressure, 1013.2)]),
        (SensorKind::Light, &[(Quantity::Light, 320.0)]),
        (
            SensorKind::Environment,
            &[
                (Quantity::Temperature, 21.8),
                (Quantity::Humidity, 44.0),
                (Quantity::Pressure, 1013.0),
                (Quantity::GasResistance, 120.5),
            ],
        ),
        (SensorKind::Light2, &[(Quantity::Light, 310.0)]),
        (
            SensorKind::Co2,
            &[
                (Quantity::Co2, 650.0),
                (Quantity::Temperature, 22.0),
                (Quantity::Humidity, 43.0),
            ],
        ),
        (
            SensorKind::Particulate,
            &[
                (Quantity::Pm1_0, 3.0),
                (Quantity::Pm2_5, 5.0),
                (Quantity::Pm10, 8.0),
            ],
        ),
        (SensorKind::Voc, &[(Quantity::VocIndex, 100.0)]),
    ];

    samples
        .iter()
        .map(|(kind, values)| {
            let sensor = rig.add(SensorConfig::new(*kind));
            for &(quantity, value) in values.iter() {
                sensor.set_sample(quantity, value);
            }
            sensor
        })
        .collect()
}
