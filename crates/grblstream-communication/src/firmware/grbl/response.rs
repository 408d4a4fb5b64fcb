//! GRBL response line classification

use std::fmt;

/// Acknowledgement token
pub const OK: &str = "ok";
pub const ERROR_PREFIX: &str = "error:";
pub const ALARM_PREFIX: &str = "ALARM:";
pub const LOG_PREFIX: &str = "[MSG:";
pub const SLEEP_REPORT_PREFIX: &str = "<Sleep";
/// First line an ESP32 bootloader prints after a hardware reset
pub const RESET_BANNER_PREFIX: &str = "ets";
/// Welcome line GRBL prints once initialized
pub const INIT_BANNER_PREFIX: &str = "Grbl";

/// Kind of a line received from a GRBL controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrblLine {
    /// Controller was hard-reset
    ResetBanner,
    /// Controller finished initializing
    InitBanner,
    /// `[MSG:...]` log line
    Log,
    /// `<...>` status report
    Status,
    /// Status report while sleeping; also ends the current response
    SleepReport,
    Ok,
    /// `error:N`, with the code when numeric
    Error(Option<u16>),
    /// `ALARM:N`, with the code when numeric
    Alarm(Option<u16>),
    /// Anything else; part of a multi-line response
    Other,
}

impl GrblLine {
    /// Whether this line ends the response to the active command
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Ok | Self::SleepReport | Self::Error(_))
    }
}

impl fmt::Display for GrblLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResetBanner => write!(f, "reset banner"),
            Self::InitBanner => write!(f, "init banner"),
            Self::Log => write!(f, "log"),
            Self::Status => write!(f, "status"),
            Self::SleepReport => write!(f, "sleep report"),
            Self::Ok => write!(f, "ok"),
            Self::Error(Some(code)) => write!(f, "error {}", code),
            Self::Error(None) => write!(f, "error"),
            Self::Alarm(Some(code)) => write!(f, "alarm {}", code),
            Self::Alarm(None) => write!(f, "alarm"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Classify one received line
///
/// Checks run in protocol priority order, so a line is given the first kind it
/// qualifies for.
pub fn classify_line(line: &str) -> GrblLine {
    if line.starts_with(RESET_BANNER_PREFIX) {
        return GrblLine::ResetBanner;
    }
    if line.starts_with(INIT_BANNER_PREFIX) {
        return GrblLine::InitBanner;
    }
    if line.starts_with(LOG_PREFIX) {
        return GrblLine::Log;
    }
    if line.starts_with(SLEEP_REPORT_PREFIX) {
        return GrblLine::SleepReport;
    }
    if line.starts_with('<') {
        return GrblLine::Status;
    }
    if line == OK {
        return GrblLine::Ok;
    }
    if let Some(code) = line.strip_prefix(ERROR_PREFIX) {
        return GrblLine::Error(code.trim().parse().ok());
    }
    if let Some(code) = line.strip_prefix(ALARM_PREFIX) {
        return GrblLine::Alarm(code.trim().parse().ok());
    }
    GrblLine::Other
}
