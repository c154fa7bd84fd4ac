//! Uplink channel map and Cayenne LPP type tags
//!
//! Channel numbers are what the network decoder keys on, so they stay
//! stable across firmware versions.

/// Battery voltage
pub const CHANNEL_BATTERY: u8 = 1;
/// Humidity from the temperature/humidity sensor
pub const CHANNEL_HUMIDITY: u8 = 2;
/// Temperature from the temperature/humidity sensor
pub const CHANNEL_TEMPERATURE: u8 = 3;
/// Barometric pressure
pub const CHANNEL_PRESSURE: u8 = 4;
/// Ambient light
pub const CHANNEL_LIGHT: u8 = 5;
/// Humidity from the environment sensor
pub const CHANNEL_HUMIDITY_2: u8 = 6;
/// Temperature from the environment sensor
pub const CHANNEL_TEMPERATURE_2: u8 = 7;
/// Pressure from the environment sensor
pub const CHANNEL_PRESSURE_2: u8 = 8;
/// Gas resistance from the environment sensor
pub const CHANNEL_GAS_2: u8 = 9;
/// Light from the secondary light sensor
pub const CHANNEL_LIGHT_2: u8 = 15;
/// VOC index
pub const CHANNEL_VOC: u8 = 16;
/// CO2 concentration
pub const CHANNEL_CO2: u8 = 35;
/// Temperature reported by the CO2 sensor
pub const CHANNEL_CO2_TEMPERATURE: u8 = 36;
/// Humidity reported by the CO2 sensor
pub const CHANNEL_CO2_HUMIDITY: u8 = 37;
/// PM1.0 mass concentration
pub const CHANNEL_PM1_0: u8 = 40;
/// PM2.5 mass concentration
pub const CHANNEL_PM2_5: u8 = 41;
/// PM10 mass concentration
pub const CHANNEL_PM10: u8 = 42;
/// Room occupancy
pub const CHANNEL_PRESENCE: u8 = 48;

/// Analog input, 0.01 signed
pub const TYPE_ANALOG_INPUT: u8 = 2;
/// Illuminance, 1 lux unsigned
pub const TYPE_LUMINOSITY: u8 = 101;
/// Presence, 0 or 1
pub const TYPE_PRESENCE: u8 = 102;
/// Temperature, 0.1 °C signed
pub const TYPE_TEMPERATURE: u8 = 103;
/// Relative humidity, 0.5 % unsigned
pub const TYPE_HUMIDITY: u8 = 104;
/// Barometric pressure, 0.1 hPa unsigned
pub const TYPE_BAROMETER: u8 = 115;
/// Voltage, 0.01 V unsigned
pub const TYPE_VOLTAGE: u8 = 116;
/// Concentration, 1 ppm unsigned
pub const TYPE_CONCENTRATION: u8 = 125;
/// VOC index, 1 unit unsigned
pub const TYPE_VOC_INDEX: u8 = 138;
