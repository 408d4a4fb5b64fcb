//! Data models for device state and telemetry
//!
//! Provides:
//! - Device state machine states
//! - Axis positions with optional trailing axes
//! - Real-time status report snapshot
//! - Controller log entries

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection-level state of a device, tracked by the protocol engine
///
/// This is the engine's own view of the link, not the machine state name
/// reported in status reports (`Idle`, `Run`, `Hold`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceState {
    /// No transport is open
    #[default]
    Disconnected,
    /// Transport is open, waiting for the first status report
    Connecting,
    /// Connected and accepting commands
    Normal,
    /// A reset banner was seen, waiting for the init banner
    Resetting,
    /// Controller reports `Sleep`
    Sleeping,
    /// Controller raised an alarm
    Alarm,
}

impl DeviceState {
    /// Check if a transport is open in this state
    pub fn is_open(&self) -> bool {
        !matches!(self, DeviceState::Disconnected)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Normal => write!(f, "Normal"),
            Self::Resetting => write!(f, "Resetting"),
            Self::Sleeping => write!(f, "Sleeping"),
            Self::Alarm => write!(f, "Alarm"),
        }
    }
}

/// Position on up to six axes
///
/// Axes absent from the source are `None`; a status report with three
/// components only fills `x`, `y` and `z`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxesPosition {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub c: Option<f64>,
}

impl AxesPosition {
    /// Build a position from positional components in x, y, z, a, b, c order
    ///
    /// Components past the sixth are ignored.
    pub fn from_components(values: &[f64]) -> Self {
        let get = |i: usize| values.get(i).copied();
        Self {
            x: get(0),
            y: get(1),
            z: get(2),
            a: get(3),
            b: get(4),
            c: get(5),
        }
    }

    /// Number of axes present
    pub fn axis_count(&self) -> usize {
        [self.x, self.y, self.z, self.a, self.b, self.c]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }

    /// Check if no axis is set
    pub fn is_empty(&self) -> bool {
        self.axis_count() == 0
    }
}

/// Planner and serial buffer availability (`Bf:` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLevels {
    /// Free blocks in the planner buffer
    pub planner: u32,
    /// Free bytes in the serial RX buffer
    pub rx: u32,
}

/// Override percentages (`Ov:` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideValues {
    pub feed: u32,
    pub rapid: u32,
    pub spindle: u32,
}

/// Input pin states (`Pn:` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinState {
    pub limit_x: bool,
    pub limit_y: bool,
    pub limit_z: bool,
    pub probe: bool,
    pub door: bool,
    pub hold: bool,
    /// Soft reset input
    pub reset: bool,
    /// Cycle start input
    pub start: bool,
}

/// Accessory states (`A:` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessoryState {
    pub spindle_cw: bool,
    pub spindle_ccw: bool,
    /// Flood coolant
    pub flood: bool,
    /// Mist coolant
    pub mist: bool,
}

/// Parsed real-time status report
///
/// Produced fresh for every status line; the engine keeps only the latest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state name: Idle, Run, Hold, Jog, Alarm, Door, Check, Home, Sleep
    pub state: String,
    /// Sub-state such as `Hold:0` or `Door:1`
    pub sub_state: Option<u32>,
    /// Machine coordinate position
    pub position: AxesPosition,
    /// Work coordinate offset
    pub work_coord_offset: Option<AxesPosition>,
    /// Feed rate (mm/min or inch/min)
    pub feed_rate: f64,
    /// Spindle speed (RPM)
    pub spindle_speed: f64,
    pub buffer: Option<BufferLevels>,
    /// Line number currently executing
    pub line_number: Option<u32>,
    pub overrides: Option<OverrideValues>,
    pub pins: Option<PinState>,
    pub accessories: Option<AccessoryState>,
}

impl StatusReport {
    /// Work position derived as `MPos - WCO`, when an offset is known
    pub fn work_position(&self) -> Option<AxesPosition> {
        let wco = self.work_coord_offset?;
        let sub = |p: Option<f64>, o: Option<f64>| match (p, o) {
            (Some(p), Some(o)) => Some(p - o),
            (Some(p), None) => Some(p),
            _ => None,
        };
        Some(AxesPosition {
            x: sub(self.position.x, wco.x),
            y: sub(self.position.y, wco.y),
            z: sub(self.position.z, wco.z),
            a: sub(self.position.a, wco.a),
            b: sub(self.position.b, wco.b),
            c: sub(self.position.c, wco.c),
        })
    }
}

/// Kind of a controller log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Error,
    Reset,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Error => write!(f, "error"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// Parsed `[MSG:...]` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    /// Free text after `TYPE: `, empty when absent
    pub message: String,
}
