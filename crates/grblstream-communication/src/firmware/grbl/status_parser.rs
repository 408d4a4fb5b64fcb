//! GRBL real-time status report parser
//!
//! Parses `<STATE[:SUB]|KEY:v[,v...]|...>` reports, for example
//! `<Run|MPos:200.000,31.070,0.000,0.000|FS:5000,0>`.
//!
//! Recognized fields: `MPos`, `WCO`, `FS` (or `F` when the firmware has no
//! variable spindle), `Bf`, `Ln`, `Ov`, `Pn`, `A`. Unknown fields are skipped
//! so reports from extended firmwares still parse.

use grblstream_core::{
    AccessoryState, AxesPosition, BufferLevels, OverrideValues, PinState, ProtocolError,
    StatusReport,
};
use std::str::FromStr;

/// Parse one status report line
pub fn parse_status(line: &str) -> Result<StatusReport, ProtocolError> {
    let content = line
        .trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProtocolError::InvalidStatus {
            line: line.to_string(),
        })?;

    let mut fields = content.split('|');
    let state_field = fields.next().unwrap_or_default();
    let (state, sub_state) = match state_field.split_once(':') {
        Some((state, sub)) if !sub.is_empty() => (state, Some(parse_number("state", sub)?)),
        Some((state, _)) => (state, None),
        None => (state_field, None),
    };

    let mut status = StatusReport {
        state: state.to_string(),
        sub_state,
        ..Default::default()
    };

    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };

        match key {
            "MPos" => status.position = parse_position(key, value)?,
            "WCO" => status.work_coord_offset = Some(parse_position(key, value)?),
            "FS" => {
                let values: Vec<f64> = parse_list(key, value)?;
                status.feed_rate = values.first().copied().unwrap_or_default();
                status.spindle_speed = values.get(1).copied().unwrap_or_default();
            }
            "F" => status.feed_rate = parse_number(key, value)?,
            "Bf" => {
                let [planner, rx] = parse_exact::<2>(key, value)?;
                status.buffer = Some(BufferLevels { planner, rx });
            }
            "Ln" => status.line_number = Some(parse_number(key, value)?),
            "Ov" => {
                let [feed, rapid, spindle] = parse_exact::<3>(key, value)?;
                status.overrides = Some(OverrideValues {
                    feed,
                    rapid,
                    spindle,
                });
            }
            "Pn" => status.pins = Some(parse_pins(value)),
            "A" => status.accessories = Some(parse_accessories(value)),
            _ => {}
        }
    }

    Ok(status)
}

fn invalid(field: &str, value: &str) -> ProtocolError {
    ProtocolError::InvalidStatusField {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T, ProtocolError> {
    value.trim().parse().map_err(|_| invalid(field, value))
}

fn parse_list<T: FromStr>(field: &str, value: &str) -> Result<Vec<T>, ProtocolError> {
    value
        .split(',')
        .map(|v| parse_number(field, v))
        .collect()
}

fn parse_exact<const N: usize>(field: &str, value: &str) -> Result<[u32; N], ProtocolError> {
    parse_list::<u32>(field, value)?
        .try_into()
        .map_err(|_| invalid(field, value))
}

fn parse_position(field: &str, value: &str) -> Result<AxesPosition, ProtocolError> {
    let components: Vec<f64> = parse_list(field, value)?;
    if components.len() > 6 {
        return Err(invalid(field, value));
    }
    Ok(AxesPosition::from_components(&components))
}

fn parse_pins(pins: &str) -> PinState {
    PinState {
        limit_x: pins.contains('X'),
        limit_y: pins.contains('Y'),
        limit_z: pins.contains('Z'),
        probe: pins.contains('P'),
        door: pins.contains('D'),
        hold: pins.contains('H'),
        reset: pins.contains('R'),
        start: pins.contains('S'),
    }
}

fn parse_accessories(accessories: &str) -> AccessoryState {
    AccessoryState {
        spindle_cw: accessories.contains('S'),
        spindle_ccw: accessories.contains('C'),
        flood: accessories.contains('F'),
        mist: accessories.contains('M'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_report() {
        let status = parse_status("<Run|MPos:200.000,31.070,0.000,0.000|FS:5000,0>").unwrap();
        assert_eq!(status.state, "Run");
        assert_eq!(status.sub_state, None);
        assert_eq!(
            status.position,
            AxesPosition {
                x: Some(200.0),
                y: Some(31.07),
                z: Some(0.0),
                a: Some(0.0),
                b: None,
                c: None,
            }
        );
        assert_eq!(status.feed_rate, 5000.0);
        assert_eq!(status.spindle_speed, 0.0);
    }

    #[test]
    fn test_parse_full_report() {
        let status = parse_status(
            "<Hold:1|MPos:1.000,2.000,3.000|Bf:15,128|Ln:99|FS:500,8000|WCO:0.000,-1.500,0.000|Ov:100,50,120|Pn:XZP|A:SF>",
        )
        .unwrap();
        assert_eq!(status.state, "Hold");
        assert_eq!(status.sub_state, Some(1));
        assert_eq!(status.position.axis_count(), 3);
        assert_eq!(status.buffer, Some(BufferLevels { planner: 15, rx: 128 }));
        assert_eq!(status.line_number, Some(99));
        assert_eq!(status.work_coord_offset.unwrap().y, Some(-1.5));
        assert_eq!(
            status.overrides,
            Some(OverrideValues {
                feed: 100,
                rapid: 50,
                spindle: 120
            })
        );

        let pins = status.pins.unwrap();
        assert!(pins.limit_x && pins.limit_z && pins.probe);
        assert!(!pins.limit_y && !pins.door && !pins.hold);

        let accessories = status.accessories.unwrap();
        assert!(accessories.spindle_cw && accessories.flood);
        assert!(!accessories.spindle_ccw && !accessories.mist);

        assert_eq!(status.work_position().unwrap().y, Some(3.5));
    }

    #[test]
    fn test_single_axis_position() {
        let status = parse_status("<Idle|MPos:5.5>").unwrap();
        assert_eq!(status.position.x, Some(5.5));
        assert_eq!(status.position.y, None);
    }

    #[test]
    fn test_feed_only_field() {
        let status = parse_status("<Idle|MPos:0,0,0|F:250>").unwrap();
        assert_eq!(status.feed_rate, 250.0);
        assert_eq!(status.spindle_speed, 0.0);
    }

    #[test]
    fn test_unknown_fields_skipped() {
        let status = parse_status("<Idle|MPos:0,0,0|FW:grblHAL|SD:4.5,file.nc>").unwrap();
        assert_eq!(status.state, "Idle");
    }

    #[test]
    fn test_state_only() {
        let status = parse_status("  <Sleep>  ").unwrap();
        assert_eq!(status.state, "Sleep");
        assert!(status.position.is_empty());
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(
            parse_status("Idle|MPos:0,0,0"),
            Err(ProtocolError::InvalidStatus { .. })
        ));
        assert!(matches!(
            parse_status("<>"),
            Err(ProtocolError::InvalidStatus { .. })
        ));
        assert!(matches!(
            parse_status("<Idle|MPos:0,0,0"),
            Err(ProtocolError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_invalid_field_value() {
        assert_eq!(
            parse_status("<Idle|Bf:15>"),
            Err(ProtocolError::InvalidStatusField {
                field: "Bf".to_string(),
                value: "15".to_string()
            })
        );
        assert!(parse_status("<Idle|MPos:1,x,3>").is_err());
        assert!(parse_status("<Door:x>").is_err());
    }
}
