//! gpucool Core Library
//!
//! Building blocks for the gpucool daemon: GPU cooling control for Linux.
//!
//! # Features
//!
//! - **Device Discovery**: Enumeration of amdgpu-bound PCI devices and their
//!   identification attributes
//! - **Config Matching**: Scored multi-attribute matching of config sections
//!   to discovered devices
//! - **Fan Curves**: Temperature-based PWM control with semi-passive
//!   hysteresis
//! - **State Restoration**: Override ledger guaranteeing hardware files are
//!   returned to their pre-daemon values
//!
//! # Module Structure
//!
//! - `sysfs` - Typed accessors over hardware control files
//! - `device` - Discovery and identification attributes
//! - `config` - TOML config sections and tuning options
//! - `matcher` - Config-to-device scoring
//! - `curve` - The fan curve controller
//! - `ledger` - Original-value recording and rollback

pub mod config;
pub mod constants;
pub mod curve;
pub mod device;
pub mod ledger;
pub mod matcher;
pub mod sysfs;

// Re-export primary types
pub use config::{load_config, parse_section, DeviceConfig};
pub use curve::{CurveParams, FanController};
pub use device::{enumerate_devices, DeviceAttributes, GpuDevice, IdKey};
pub use ledger::{CapabilityCheck, OverrideLedger};
pub use matcher::{best_match, match_score, REJECTED};
pub use sysfs::SysfsValue;

// Re-export error types
pub use gpc_error::{GpucoolError, Result};
