//! AT command interface
//!
//! Commands arrive as text lines on the serial console. Parsing is pure;
//! [`crate::node::Node::apply_command`] applies the result through the same
//! setters a downlink uses, so the console never switches rails or touches
//! sensors itself.
//!
//! | Command              | Effect                               |
//! |----------------------|--------------------------------------|
//! | `AT+SENDINT=<s>`     | uplink interval, seconds             |
//! | `AT+SENDINT?`        | query interval                       |
//! | `AT+UI=<0\|1>`       | display layout                       |
//! | `AT+UI?`             | query layout                         |
//! | `AT+MOD?`            | list detected modules                |
//! | `AT+CO2=<400..2000>` | CO2 forced recalibration             |
//! | `AT+CONF=<0\|1>`     | acknowledged uplinks by default      |
//! | `AT+CONF?`           | query default                        |
//! | `ATZ`                | restart                              |
//!
//! Asynchronous happenings go the other way as `+EVT:` lines through
//! [`Diagnostics`].

use core::fmt;

use crate::constants::CO2_CALIBRATION_RANGE;
use crate::errors::CommandError;
use crate::radio::Downlink;
use crate::sensor::SensorPresence;
use crate::settings::UiMode;

/// Parsed console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Set uplink interval, seconds
    SetSendInterval(u32),
    /// Query uplink interval
    QuerySendInterval,
    /// Set display layout
    SetUi(UiMode),
    /// Query display layout
    QueryUi,
    /// List detected modules
    QueryModules,
    /// Recalibrate CO2 against a reference, ppm
    CalibrateCo2(u16),
    /// Set default acknowledgement
    SetConfirmed(bool),
    /// Query default acknowledgement
    QueryConfirmed,
    /// Restart
    Reset,
}

/// Parse one console line
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("ATZ") {
        return Ok(Command::Reset);
    }

    let body = strip_prefix_ignore_case(line, "AT+").ok_or(CommandError::Unknown)?;

    if let Some(name) = body.strip_suffix('?') {
        return match_name(name, |name| match name {
            Name::SendInt => Ok(Command::QuerySendInterval),
            Name::Ui => Ok(Command::QueryUi),
            Name::Mod => Ok(Command::QueryModules),
            Name::Conf => Ok(Command::QueryConfirmed),
            Name::Co2 => Err(CommandError::Unknown),
        });
    }

    let (name, value) = body.split_once('=').ok_or(CommandError::Unknown)?;
    let value = value.trim();
    match_name(name, |name| match name {
        Name::SendInt => Ok(Command::SetSendInterval(number(value)?)),
        Name::Ui => {
            let index = u8::try_from(number(value)?).map_err(|_| CommandError::Parameter)?;
            UiMode::from_index(index)
                .map(Command::SetUi)
                .ok_or(CommandError::Parameter)
        }
        Name::Co2 => {
            let ppm = u16::try_from(number(value)?).map_err(|_| CommandError::Parameter)?;
            let (low, high) = CO2_CALIBRATION_RANGE;
            if (low..=high).contains(&ppm) {
                Ok(Command::CalibrateCo2(ppm))
            } else {
                Err(CommandError::Parameter)
            }
        }
        Name::Conf => match number(value)? {
            0 => Ok(Command::SetConfirmed(false)),
            1 => Ok(Command::SetConfirmed(true)),
            _ => Err(CommandError::Parameter),
        },
        Name::Mod => Err(CommandError::Unknown),
    })
}

#[derive(Clone, Copy)]
enum Name {
    SendInt,
    Ui,
    Mod,
    Co2,
    Conf,
}

fn match_name<F>(name: &str, f: F) -> Result<Command, CommandError>
where
    F: FnOnce(Name) -> Result<Command, CommandError>,
{
    const NAMES: [(&str, Name); 5] = [
        ("SENDINT", Name::SendInt),
        ("UI", Name::Ui),
        ("MOD", Name::Mod),
        ("CO2", Name::Co2),
        ("CONF", Name::Conf),
    ];

    let name = name.trim();
    NAMES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .ok_or(CommandError::Unknown)
        .and_then(|&(_, n)| f(n))
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

fn number(value: &str) -> Result<u32, CommandError> {
    value.parse().map_err(|_| CommandError::Parameter)
}

/// Successful command result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Done, nothing to report
    Ok,
    /// Query answer
    Number(u32),
    /// Module listing
    Modules(SensorPresence),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => {}
            Response::Number(n) => write!(f, "{}\r\n", n)?,
            Response::Modules(presence) => {
                for (i, kind) in presence.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(kind.name())?;
                }
                f.write_str("\r\n")?;
            }
        }
        f.write_str("OK")
    }
}

/// Console line for a failed command
pub const fn error_line(error: CommandError) -> &'static str {
    match error {
        CommandError::Unknown => "AT_ERROR",
        CommandError::Parameter => "AT_PARAM_ERROR",
        CommandError::Busy => "AT_BUSY_ERROR",
        CommandError::NotPresent => "AT_MODULE_ERROR",
    }
}

/// Asynchronous event reported on the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Network joined
    Joined,
    /// Join attempt failed
    JoinFailed,
    /// Uplink delivered
    SendOk,
    /// Uplink not delivered
    SendFailed,
    /// Radio busy, uplink skipped
    Busy,
    /// Uplink too large for any usable rate
    SizeError,
    /// Downlink received
    Rx(Downlink),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("+EVT:")?;
        match self {
            Diagnostic::Joined => f.write_str("JOINED"),
            Diagnostic::JoinFailed => f.write_str("JOIN FAILED"),
            Diagnostic::SendOk => f.write_str("SEND OK"),
            Diagnostic::SendFailed => f.write_str("SEND FAILED"),
            Diagnostic::Busy => f.write_str("BUSY"),
            Diagnostic::SizeError => f.write_str("SIZE_ERROR"),
            Diagnostic::Rx(downlink) => {
                write!(f, "RX:{}:", downlink.port)?;
                for byte in &downlink.data {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Console sink for `+EVT:` lines
pub trait Diagnostics {
    /// Report one event
    fn report(&mut self, diagnostic: &Diagnostic);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConsole;

impl Diagnostics for NullConsole {
    fn report(&mut self, _diagnostic: &Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SensorBank, SensorKind};

    #[test]
    fn parses_setters() {
        assert_eq!(parse("AT+SENDINT=600"), Ok(Command::SetSendInterval(600)));
        assert_eq!(parse("at+ui=1\r\n"), Ok(Command::SetUi(UiMode::Iconic)));
        assert_eq!(parse("AT+CO2=420"), Ok(Command::CalibrateCo2(420)));
        assert_eq!(parse("AT+CONF=1"), Ok(Command::SetConfirmed(true)));
        assert_eq!(parse("ATZ"), Ok(Command::Reset));
    }

    #[test]
    fn parses_queries() {
        assert_eq!(parse("AT+SENDINT?"), Ok(Command::QuerySendInterval));
        assert_eq!(parse("AT+MOD?"), Ok(Command::QueryModules));
        assert_eq!(parse("AT+UI?"), Ok(Command::QueryUi));
        assert_eq!(parse("AT+CONF?"), Ok(Command::QueryConfirmed));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(parse("AT+UI=2"), Err(CommandError::Parameter));
        assert_eq!(parse("AT+CO2=399"), Err(CommandError::Parameter));
        assert_eq!(parse("AT+CO2=70000"), Err(CommandError::Parameter));
        assert_eq!(parse("AT+SENDINT=abc"), Err(CommandError::Parameter));
        assert_eq!(parse("AT+CONF=2"), Err(CommandError::Parameter));
    }

    #[test]
    fn rejects_unknown() {
        assert_eq!(parse("AT+FOO=1"), Err(CommandError::Unknown));
        assert_eq!(parse("AT+CO2?"), Err(CommandError::Unknown));
        assert_eq!(parse("hello"), Err(CommandError::Unknown));
        assert_eq!(parse(""), Err(CommandError::Unknown));
    }

    #[cfg(feature = "std")]
    #[test]
    fn renders_responses_and_events() {
        assert_eq!(Response::Ok.to_string(), "OK");
        assert_eq!(Response::Number(120).to_string(), "120\r\nOK");
        assert_eq!(Diagnostic::SizeError.to_string(), "+EVT:SIZE_ERROR");

        let downlink = Downlink {
            port: 3,
            data: heapless::Vec::from_slice(&[0xAA, 0x55, 0x01]).unwrap(),
        };
        assert_eq!(Diagnostic::Rx(downlink).to_string(), "+EVT:RX:3:AA5501");
    }

    #[cfg(feature = "std")]
    #[test]
    fn lists_modules_in_read_order() {
        struct Present;
        impl crate::sensor::SensorDriver for Present {
            fn probe(&mut self) -> bool {
                true
            }
            fn wake(&mut self) -> Result<(), crate::errors::SensorError> {
                Ok(())
            }
            fn read(&mut self) -> nb::Result<crate::sensor::Reading, crate::errors::SensorError> {
                Err(nb::Error::WouldBlock)
            }
            fn sleep(&mut self) -> Result<(), crate::errors::SensorError> {
                Ok(())
            }
            fn value(&self, _quantity: crate::sensor::Quantity) -> Option<f32> {
                None
            }
        }

        let (mut a, mut b) = (Present, Present);
        let mut bank = SensorBank::new()
            .with(crate::sensor::SensorConfig::new(SensorKind::Voc), &mut a)
            .with(crate::sensor::SensorConfig::new(SensorKind::Co2), &mut b);
        let presence = bank.scan(|_, d| d.probe());

        assert_eq!(Response::Modules(presence).to_string(), "co2,voc\r\nOK");
    }
}
