//! GRBL `[MSG:...]` log line parser

use grblstream_core::{LogEntry, LogKind, ProtocolError};
use regex::Regex;
use std::sync::OnceLock;

/// Parse `[MSG:TYPE]` or `[MSG:TYPE: text]`
///
/// `ALARM` maps to [`LogKind::Error`], `RST` to [`LogKind::Reset`], every
/// other type to [`LogKind::Info`].
pub fn parse_log(line: &str) -> Result<LogEntry, ProtocolError> {
    static LOG_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = LOG_REGEX.get_or_init(|| {
        Regex::new(r"^\s*\[MSG:(.+?)(?:: (.+?))?\]\s*$").expect("invalid regex pattern")
    });

    let captures = regex
        .captures(line)
        .ok_or_else(|| ProtocolError::InvalidLog {
            line: line.to_string(),
        })?;

    let kind = match &captures[1] {
        "ALARM" => LogKind::Error,
        "RST" => LogKind::Reset,
        _ => LogKind::Info,
    };
    let message = captures
        .get(2)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Ok(LogEntry { kind, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_log() {
        assert_eq!(
            parse_log("[MSG:ALARM: Alarm!]").unwrap(),
            LogEntry {
                kind: LogKind::Error,
                message: "Alarm!".to_string()
            }
        );
    }

    #[test]
    fn test_reset_log_without_text() {
        assert_eq!(
            parse_log("[MSG:RST]").unwrap(),
            LogEntry {
                kind: LogKind::Reset,
                message: String::new()
            }
        );
    }

    #[test]
    fn test_info_log_keeps_inner_colons() {
        let log = parse_log("  [MSG:INFO: Axis A (-1000.000,0.000)]  ").unwrap();
        assert_eq!(log.kind, LogKind::Info);
        assert_eq!(log.message, "Axis A (-1000.000,0.000)");

        let log = parse_log("[MSG:Caution: Unlocked]").unwrap();
        assert_eq!(log.kind, LogKind::Info);
        assert_eq!(log.message, "Unlocked");
    }

    #[test]
    fn test_invalid_log() {
        assert!(matches!(
            parse_log("[GC:G0 G54]"),
            Err(ProtocolError::InvalidLog { .. })
        ));
        assert!(parse_log("[MSG:]").is_err());
        assert!(parse_log("[MSG:INFO").is_err());
    }
}
