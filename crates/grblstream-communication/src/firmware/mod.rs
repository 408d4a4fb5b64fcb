//! Firmware implementations for CNC controllers
//!
//! Supported controllers:
//! - GRBL 1.1 and line-compatible derivatives (FluidNC, grblHAL)

pub mod grbl;

pub use grbl::{GrblDevice, GrblDeviceConfig};
