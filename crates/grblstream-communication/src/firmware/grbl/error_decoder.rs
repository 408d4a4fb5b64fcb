//! GRBL 1.1 error and alarm code decoder
//!
//! Converts `error:N` and `ALARM:N` codes to human-readable text.

use super::response::{ALARM_PREFIX, ERROR_PREFIX};

const ERROR_CODES: &[(u16, &str)] = &[
    (1, "Expected command letter"),
    (2, "Bad number format"),
    (3, "Invalid '$' statement"),
    (4, "Negative value"),
    (5, "Homing not enabled"),
    (6, "Step pulse must be at least 3 microseconds"),
    (7, "EEPROM read failed, defaults restored"),
    (8, "'$' command requires the machine to be idle"),
    (9, "G-code locked out during alarm or jog"),
    (10, "Soft limits require homing to be enabled"),
    (11, "Line exceeds maximum length"),
    (12, "Step rate exceeds supported maximum"),
    (13, "Safety door opened"),
    (14, "Line exceeds EEPROM storage length"),
    (15, "Jog target exceeds machine travel"),
    (16, "Invalid jog command"),
    (17, "Laser mode requires PWM output"),
    (20, "Unsupported or invalid g-code command"),
    (21, "Multiple commands from the same modal group"),
    (22, "Feed rate undefined"),
    (23, "Command requires an integer value"),
    (24, "Multiple commands need axis words"),
    (25, "Repeated g-code word"),
    (26, "Command needs axis words but none were found"),
    (27, "Line number out of range"),
    (28, "Missing required P or L value"),
    (29, "Unsupported work coordinate system"),
    (30, "G53 requires G0 or G1 motion mode"),
    (31, "Unused axis words while G80 is active"),
    (32, "Arc has no axis words in the selected plane"),
    (33, "Invalid motion target"),
    (34, "Arc radius computation failed"),
    (35, "Arc is missing an IJK offset word in the selected plane"),
    (36, "Unused g-code words in block"),
    (37, "Tool length offset applied to an unconfigured axis"),
    (38, "Tool number exceeds supported maximum"),
];

const ALARM_CODES: &[(u16, &str)] = &[
    (1, "Hard limit triggered, position lost"),
    (2, "Soft limit: target exceeds machine travel"),
    (3, "Reset while in motion, position lost"),
    (4, "Probe not in expected initial state"),
    (5, "Probe did not contact the workpiece"),
    (6, "Homing failed: reset during cycle"),
    (7, "Homing failed: safety door opened during cycle"),
    (8, "Homing failed: could not clear limit switch on pull-off"),
    (9, "Homing failed: limit switch not found"),
];

fn lookup(table: &[(u16, &'static str)], code: u16) -> Option<&'static str> {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| *text)
}

/// Description of an `error:N` code
pub fn decode_error(code: u16) -> Option<&'static str> {
    lookup(ERROR_CODES, code)
}

/// Description of an `ALARM:N` code
pub fn decode_alarm(code: u16) -> Option<&'static str> {
    lookup(ALARM_CODES, code)
}

/// Description for a raw `error:...` line
pub fn describe_error_line(line: &str) -> String {
    describe(line, ERROR_PREFIX, decode_error, "Unknown error")
}

/// Description for a raw `ALARM:...` line
pub fn describe_alarm_line(line: &str) -> String {
    describe(line, ALARM_PREFIX, decode_alarm, "Unknown alarm")
}

fn describe(
    line: &str,
    prefix: &str,
    decode: fn(u16) -> Option<&'static str>,
    unknown: &str,
) -> String {
    let detail = line.strip_prefix(prefix).unwrap_or(line).trim();
    match detail.parse::<u16>() {
        Ok(code) => decode(code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {}", unknown, code)),
        // Some firmwares report text instead of a code
        Err(_) if !detail.is_empty() => detail.to_string(),
        Err(_) => unknown.to_string(),
    }
}
