//! Constants and configuration values for gpucool
//!
//! Centralizes magic numbers, paths, and tuning defaults.
//! Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// System paths
pub mod paths {
    /// PCI driver tree for amdgpu-bound devices; each entry named like
    /// `0000:0b:00.0` is a managed GPU
    pub const AMDGPU_DRIVER_BASE: &str = "/sys/bus/pci/drivers/amdgpu";

    /// Driver feature mask consulted for the overdrive diagnostic
    pub const PPFEATUREMASK: &str = "/sys/module/amdgpu/parameters/ppfeaturemask";
}

/// File names inside a device's sysfs/hwmon directories
pub mod sysfs_file {
    pub const PWM: &str = "pwm1";
    pub const PWM_ENABLE: &str = "pwm1_enable";
    pub const PWM_MIN: &str = "pwm1_min";
    pub const PWM_MAX: &str = "pwm1_max";
    pub const TEMP_INPUT: &str = "temp1_input";
    pub const TEMP_CRIT: &str = "temp1_crit";
    pub const POWER_CAP: &str = "power1_cap";
    pub const UEVENT: &str = "uevent";
    pub const DEVICE_ID: &str = "device";
    pub const VBIOS_VERSION: &str = "vbios_version";
}

/// PWM control values
pub mod pwm {
    /// `pwm1_enable` mode code for software (manual) control
    pub const MANUAL_MODE: &str = "1";

    /// Fallback output floor when `pwm1_min` is unreadable
    pub const DEFAULT_MIN: f64 = 0.0;

    /// Fallback output ceiling when `pwm1_max` is unreadable
    pub const DEFAULT_MAX: f64 = 255.0;
}

/// Temperature handling
pub mod temperature {
    /// Linux hwmon reports temperatures in millidegrees Celsius
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;

    /// Assumed critical threshold when `temp1_crit` is unreadable (milli-°C)
    pub const DEFAULT_CRIT_MILLIDEGREES: f64 = 90_000.0;

    /// Safety margin subtracted from the critical threshold to derive
    /// the default `temp_max`
    pub const CRIT_MARGIN_CELSIUS: f64 = 5.0;
}

/// Driver capability diagnostics
pub mod overdrive {
    /// Bit in the amdgpu ppfeaturemask that gates manual PWM overrides
    pub const PP_OVERDRIVE_MASK: u64 = 0x4000;
}

/// Curve tuning defaults (applied when a config section omits the option)
pub mod tuning {
    pub const DEFAULT_TEMP_MIN: f64 = 40.0;
    pub const DEFAULT_CURVE_POW: f64 = 2.0;
    pub const DEFAULT_SEMI_PASSIVE_HYST: f64 = 5.0;
}

/// Timing
pub mod timing {
    use super::Duration;

    /// Fixed period between controller ticks
    pub const TICK_PERIOD: Duration = Duration::from_secs(1);
}
