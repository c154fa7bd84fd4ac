//! Uplink payload
//!
//! Cayenne LPP framing: every record is self-describing, so the network
//! decoder needs no schema and a missing sensor simply means a missing
//! record.
//!
//! ```text
//! ┌─────────┬──────┬────────────┐┌─────────┬──────┬────────────┐
//! │ channel │ type │ value ...  ││ channel │ type │ value ...  │ ...
//! └─────────┴──────┴────────────┘└─────────┴──────┴────────────┘
//!    1 byte  1 byte  1-2 bytes BE
//! ```
//!
//! Battery and occupancy always close the frame. Sensor records are only
//! accepted while room for those two remains.

use heapless::Vec;

use crate::constants::lpp::*;
use crate::constants::MAX_PAYLOAD;
use crate::errors::PayloadError;
use crate::sensor::{Quantity, SensorKind};

/// LPP data types used by the node
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LppType {
    /// 0.01 signed
    AnalogInput = TYPE_ANALOG_INPUT,
    /// 1 lux unsigned
    Luminosity = TYPE_LUMINOSITY,
    /// 0 or 1
    Presence = TYPE_PRESENCE,
    /// 0.1 °C signed
    Temperature = TYPE_TEMPERATURE,
    /// 0.5 % unsigned
    Humidity = TYPE_HUMIDITY,
    /// 0.1 hPa unsigned
    Barometer = TYPE_BAROMETER,
    /// 0.01 V unsigned
    Voltage = TYPE_VOLTAGE,
    /// 1 ppm unsigned
    Concentration = TYPE_CONCENTRATION,
    /// 1 unit unsigned
    VocIndex = TYPE_VOC_INDEX,
}

impl LppType {
    /// Type for a tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            TYPE_ANALOG_INPUT => Self::AnalogInput,
            TYPE_LUMINOSITY => Self::Luminosity,
            TYPE_PRESENCE => Self::Presence,
            TYPE_TEMPERATURE => Self::Temperature,
            TYPE_HUMIDITY => Self::Humidity,
            TYPE_BAROMETER => Self::Barometer,
            TYPE_VOLTAGE => Self::Voltage,
            TYPE_CONCENTRATION => Self::Concentration,
            TYPE_VOC_INDEX => Self::VocIndex,
            _ => return None,
        })
    }

    /// Value bytes
    pub const fn value_len(self) -> usize {
        match self {
            Self::Presence | Self::Humidity => 1,
            _ => 2,
        }
    }

    /// Header plus value bytes
    pub const fn record_len(self) -> usize {
        2 + self.value_len()
    }

    fn scale(self) -> f32 {
        match self {
            Self::AnalogInput | Self::Voltage => 100.0,
            Self::Temperature | Self::Barometer => 10.0,
            Self::Humidity => 2.0,
            _ => 1.0,
        }
    }

    fn signed(self) -> bool {
        matches!(self, Self::AnalogInput | Self::Temperature)
    }

    fn encode(self, value: f32, out: &mut [u8]) {
        let scaled = libm::roundf(value * self.scale());
        match (self.value_len(), self.signed()) {
            (1, _) => out[0] = scaled as u8,
            (_, true) => out.copy_from_slice(&(scaled as i16).to_be_bytes()),
            _ => out.copy_from_slice(&(scaled as u16).to_be_bytes()),
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        let raw = match (bytes, self.signed()) {
            ([b], _) => f32::from(*b),
            ([hi, lo], true) => f32::from(i16::from_be_bytes([*hi, *lo])),
            ([hi, lo], false) => f32::from(u16::from_be_bytes([*hi, *lo])),
            _ => 0.0,
        };
        raw / self.scale()
    }
}

/// Channel and type for a sensor value
///
/// Kinds that report overlapping quantities get distinct channels so the
/// decoder can tell them apart.
pub fn channel_for(kind: SensorKind, quantity: Quantity) -> Option<(u8, LppType)> {
    use Quantity as Q;
    use SensorKind as K;

    Some(match (kind, quantity) {
        (K::TempHumidity, Q::Temperature) => (CHANNEL_TEMPERATURE, LppType::Temperature),
        (K::TempHumidity, Q::Humidity) => (CHANNEL_HUMIDITY, LppType::Humidity),
        (K::Pressure, Q::Pressure) => (CHANNEL_PRESSURE, LppType::Barometer),
        (K::Light, Q::Light) => (CHANNEL_LIGHT, LppType::Luminosity),
        (K::Environment, Q::Temperature) => (CHANNEL_TEMPERATURE_2, LppType::Temperature),
        (K::Environment, Q::Humidity) => (CHANNEL_HUMIDITY_2, LppType::Humidity),
        (K::Environment, Q::Pressure) => (CHANNEL_PRESSURE_2, LppType::Barometer),
        (K::Environment, Q::GasResistance) => (CHANNEL_GAS_2, LppType::AnalogInput),
        (K::Light2, Q::Light) => (CHANNEL_LIGHT_2, LppType::Luminosity),
        (K::Co2, Q::Co2) => (CHANNEL_CO2, LppType::Concentration),
        (K::Co2, Q::Temperature) => (CHANNEL_CO2_TEMPERATURE, LppType::Temperature),
        (K::Co2, Q::Humidity) => (CHANNEL_CO2_HUMIDITY, LppType::Humidity),
        (K::Particulate, Q::Pm1_0) => (CHANNEL_PM1_0, LppType::VocIndex),
        (K::Particulate, Q::Pm2_5) => (CHANNEL_PM2_5, LppType::VocIndex),
        (K::Particulate, Q::Pm10) => (CHANNEL_PM10, LppType::VocIndex),
        (K::Voc, Q::VocIndex) => (CHANNEL_VOC, LppType::VocIndex),
        _ => return None,
    })
}

/// Bytes the battery and occupancy records need
pub const TRAILER_LEN: usize = LppType::Voltage.record_len() + LppType::Presence.record_len();

/// A decoded record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Channel id
    pub channel: u8,
    /// Data type
    pub kind: LppType,
    /// Value after scaling back
    pub value: f32,
}

/// One cycle's uplink
#[derive(Debug, Clone, Default)]
pub struct PayloadBuffer {
    bytes: Vec<u8, MAX_PAYLOAD>,
}

impl PayloadBuffer {
    /// Empty buffer
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Encoded length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing was appended
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes still free
    pub fn remaining(&self) -> usize {
        MAX_PAYLOAD - self.bytes.len()
    }

    /// Encoded frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append a sensor record, keeping room for the trailer
    pub fn push_sensor(&mut self, channel: u8, kind: LppType, value: f32) -> Result<(), PayloadError> {
        self.push_reserving(channel, kind, value, TRAILER_LEN)
    }

    /// Append the battery voltage record
    pub fn push_battery(&mut self, millivolts: u16) -> Result<(), PayloadError> {
        self.push_reserving(CHANNEL_BATTERY, LppType::Voltage, f32::from(millivolts) / 1000.0, 0)
    }

    /// Append the occupancy record
    pub fn push_presence(&mut self, occupied: bool) -> Result<(), PayloadError> {
        self.push_reserving(CHANNEL_PRESENCE, LppType::Presence, if occupied { 1.0 } else { 0.0 }, 0)
    }

    fn push_reserving(
        &mut self,
        channel: u8,
        kind: LppType,
        value: f32,
        reserve: usize,
    ) -> Result<(), PayloadError> {
        if !value.is_finite() {
            return Err(PayloadError::InvalidValue);
        }

        let needed = kind.record_len();
        let remaining = self.remaining().saturating_sub(reserve);
        if needed > remaining {
            return Err(PayloadError::Full { needed, remaining });
        }

        let mut value_bytes = [0u8; 2];
        let value_bytes = &mut value_bytes[..kind.value_len()];
        kind.encode(value, value_bytes);

        // Capacity was checked above
        let _ = self.bytes.extend_from_slice(&[channel, kind as u8]);
        let _ = self.bytes.extend_from_slice(value_bytes);
        Ok(())
    }

    /// Decode the frame back into records
    pub fn records(&self) -> Records<'_> {
        Records { rest: &self.bytes }
    }
}

/// Decode a received frame
pub fn decode(bytes: &[u8]) -> Records<'_> {
    Records { rest: bytes }
}

/// Iterator over encoded records; stops at the first malformed one
pub struct Records<'a> {
    rest: &'a [u8],
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let (&channel, tail) = self.rest.split_first()?;
        let (&tag, tail) = tail.split_first()?;
        let kind = LppType::from_tag(tag)?;
        if tail.len() < kind.value_len() {
            return None;
        }
        let (value, tail) = tail.split_at(kind.value_len());
        self.rest = tail;
        Some(Record {
            channel,
            kind,
            value: kind.decode(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_is_signed_tenths() {
        let mut payload = PayloadBuffer::new();
        payload.push_sensor(CHANNEL_TEMPERATURE, LppType::Temperature, -4.25).unwrap();

        assert_eq!(payload.as_bytes(), &[3, 103, 0xFF, 0xD5]);
        let record = payload.records().next().unwrap();
        assert_eq!(record.value, -4.3);
    }

    #[test]
    fn trailer_is_voltage_then_presence() {
        let mut payload = PayloadBuffer::new();
        payload.push_battery(3_912).unwrap();
        payload.push_presence(true).unwrap();

        assert_eq!(payload.as_bytes(), &[1, 116, 0x01, 0x87, 48, 102, 1]);
        assert_eq!(payload.len(), TRAILER_LEN);
    }

    #[test]
    fn sensor_records_leave_room_for_trailer() {
        let mut payload = PayloadBuffer::new();
        let mut accepted = 0;
        while payload.push_sensor(CHANNEL_CO2, LppType::Concentration, 800.0).is_ok() {
            accepted += 1;
        }

        assert_eq!(accepted, (MAX_PAYLOAD - TRAILER_LEN) / 4);
        assert!(payload.push_battery(3_700).is_ok());
        assert!(payload.push_presence(false).is_ok());
        assert_eq!(payload.records().count(), accepted + 2);
    }

    #[test]
    fn rejects_non_finite() {
        let mut payload = PayloadBuffer::new();
        assert_eq!(
            payload.push_sensor(CHANNEL_LIGHT, LppType::Luminosity, f32::NAN),
            Err(PayloadError::InvalidValue)
        );
        assert!(payload.is_empty());
    }

    #[test]
    fn out_of_range_values_saturate() {
        let mut payload = PayloadBuffer::new();
        payload.push_sensor(CHANNEL_LIGHT, LppType::Luminosity, 120_000.0).unwrap();
        payload.push_sensor(CHANNEL_HUMIDITY, LppType::Humidity, 140.0).unwrap();

        let values: Vec<f32, 2> = payload.records().map(|r| r.value).collect();
        assert_eq!(values.as_slice(), &[65_535.0, 127.5]);
    }

    #[test]
    fn sensor_channels_are_distinct_per_kind() {
        let th = channel_for(SensorKind::TempHumidity, Quantity::Temperature).unwrap();
        let env = channel_for(SensorKind::Environment, Quantity::Temperature).unwrap();
        assert_ne!(th.0, env.0);
        assert_eq!(channel_for(SensorKind::Co2, Quantity::Co2), Some((CHANNEL_CO2, LppType::Concentration)));
        assert_eq!(channel_for(SensorKind::Light, Quantity::Co2), None);
    }

    #[test]
    fn truncated_frame_stops_iteration() {
        let mut payload = PayloadBuffer::new();
        payload.push_sensor(CHANNEL_VOC, LppType::VocIndex, 120.0).unwrap();
        payload.bytes.push(CHANNEL_TEMPERATURE).unwrap();
        payload.bytes.push(TYPE_TEMPERATURE).unwrap();

        assert_eq!(payload.records().count(), 1);
    }
}
