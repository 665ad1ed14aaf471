//! Operator commands from the serial console.
//!
//! These are the maintenance switches a technician types at the device:
//! `KEY` or `KEY=VALUE`, keys case-insensitive.  The
//! [`DiagnosticsService`](super::service::DiagnosticsService) interprets
//! and acts upon them.

use core::fmt;
use core::str::FromStr;

use crate::logger::ExportKind;
use crate::logger::level::LogLevel;

/// Commands accepted on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagCommand {
    /// `SD_LOG=ON|OFF`
    SetLogging(bool),
    /// `SD_LOG_LEVEL=<LEVEL>`
    SetLevel(LogLevel),
    /// `SD_FLUSH`
    Flush,
    /// `SD_CLEANUP`
    Cleanup,
    /// `EXPORT_DATA=<PRICE|BLOCKS|MEMPOOL|ALL>`
    Export(ExportKind),
    /// `CRASH_INFO`
    CrashInfo,
    /// `SD_STATUS`
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    UnknownCommand,
    MissingValue(&'static str),
    InvalidValue(&'static str),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::MissingValue(key) => write!(f, "{key} needs a value"),
            Self::InvalidValue(key) => write!(f, "invalid value for {key}"),
        }
    }
}

fn parse_switch(v: &str) -> Option<bool> {
    match v.to_ascii_uppercase().as_str() {
        "ON" | "1" | "TRUE" => Some(true),
        "OFF" | "0" | "FALSE" => Some(false),
        _ => None,
    }
}

impl FromStr for DiagCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (line, None),
        };
        let key = key.to_ascii_uppercase();

        let need = |name: &'static str| value.filter(|v| !v.is_empty()).ok_or(ParseError::MissingValue(name));

        match key.as_str() {
            "SD_LOG" => parse_switch(need("SD_LOG")?)
                .map(Self::SetLogging)
                .ok_or(ParseError::InvalidValue("SD_LOG")),
            "SD_LOG_LEVEL" => need("SD_LOG_LEVEL")?
                .parse()
                .map(Self::SetLevel)
                .map_err(|_| ParseError::InvalidValue("SD_LOG_LEVEL")),
            "EXPORT_DATA" => need("EXPORT_DATA")?
                .parse()
                .map(Self::Export)
                .map_err(|_| ParseError::InvalidValue("EXPORT_DATA")),
            "SD_FLUSH" => Ok(Self::Flush),
            "SD_CLEANUP" => Ok(Self::Cleanup),
            "CRASH_INFO" => Ok(Self::CrashInfo),
            "SD_STATUS" => Ok(Self::Status),
            _ => Err(ParseError::UnknownCommand),
        }
    }
}
