//! # grblstream Core
//!
//! Core types, traits, and utilities for grblstream.
//! Provides the device capability interface, the device state and telemetry
//! data model, events, the G-code line parser and the G-code stream sender.

pub mod core;
pub mod data;
pub mod error;
pub mod gcode;

pub use core::{
    event::{DeviceEvent, EventDispatcher},
    streaming::{lines_from_text, send_lines, LineSource},
    CncDevice,
};

pub use data::{
    AccessoryState, AxesPosition, BufferLevels, DeviceState, LogEntry, LogKind, OverrideValues,
    PinState, StatusReport,
};

pub use error::{ConnectionError, ControllerError, Error, ProtocolError, Result};

pub use gcode::{parse_gcode, GCode, SourceLine};
