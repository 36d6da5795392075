//! Fan curve controller
//!
//! Computes the PWM duty for a sampled temperature and writes it to the
//! device's actuator file. The response is a normalized power curve:
//!
//! ```text
//! frac = clamp((t - temp_min) / (temp_max - temp_min), 0, 1)
//! pwm  = pwm_min + (pwm_max - pwm_min) * frac^curve_pow
//! ```
//!
//! With `fan_semi_passive` set, the fan is turned fully off below
//! `temp_min` and stays off until the temperature climbs past
//! `temp_min + fan_semi_passive_hyst` - the latch prevents oscillation
//! right at the turn-on threshold.
//!
//! The controller snapshots the previous `pwm1_enable` mode the first time
//! it switches the device to manual control, and `restore_enable` writes it
//! back on shutdown.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use gpc_error::{GpucoolError, Result};

use crate::config::DeviceConfig;
use crate::constants::{pwm, sysfs_file, temperature};
use crate::sysfs::SysfsValue;

/// Resolved, validated curve parameters for one controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveParams {
    pub pwm_min: f64,
    pub pwm_max: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub curve_pow: f64,
    pub semi_passive: bool,
    pub semi_passive_hyst: f64,
}

impl CurveParams {
    /// Validate and construct
    ///
    /// Rejects degenerate ranges up front so the curve can never divide by
    /// zero or run inverted.
    pub fn new(
        pwm_min: f64,
        pwm_max: f64,
        temp_min: f64,
        temp_max: f64,
        curve_pow: f64,
        semi_passive: bool,
        semi_passive_hyst: f64,
    ) -> Result<Self> {
        if !(pwm_max > pwm_min) {
            return Err(GpucoolError::invalid_config(
                "fan_pwm_max",
                format!("must be greater than fan_pwm_min ({} <= {})", pwm_max, pwm_min),
            ));
        }
        if !(temp_max > temp_min) {
            return Err(GpucoolError::invalid_config(
                "temp_max",
                format!("must be greater than temp_min ({} <= {})", temp_max, temp_min),
            ));
        }
        if !curve_pow.is_finite() || curve_pow < 0.0 {
            return Err(GpucoolError::invalid_config(
                "fan_curve_pow",
                format!("must be a finite number >= 0, got {}", curve_pow),
            ));
        }

        Ok(Self {
            pwm_min,
            pwm_max,
            temp_min,
            temp_max,
            curve_pow,
            semi_passive,
            semi_passive_hyst,
        })
    }

    /// Resolve parameters from a config section, filling unset bounds from
    /// the hardware-reported defaults under `hwmon_path`
    ///
    /// An unreadable hardware default is logged and replaced by a safe
    /// fallback; validation still applies to the final values.
    pub fn resolve(config: &DeviceConfig, hwmon_path: &Path) -> Result<Self> {
        let read_default = |file: &str, fallback: f64| -> f64 {
            let value = SysfsValue::new(hwmon_path.join(file));
            match value.read_f64() {
                Ok(v) => v,
                Err(e) => {
                    error!("Can't read {:?}: {}", value.path(), e);
                    fallback
                }
            }
        };

        let pwm_min = config
            .fan_pwm_min
            .unwrap_or_else(|| read_default(sysfs_file::PWM_MIN, pwm::DEFAULT_MIN));
        let pwm_max = config
            .fan_pwm_max
            .unwrap_or_else(|| read_default(sysfs_file::PWM_MAX, pwm::DEFAULT_MAX));
        let temp_max = config.temp_max.unwrap_or_else(|| {
            read_default(
                sysfs_file::TEMP_CRIT,
                temperature::DEFAULT_CRIT_MILLIDEGREES,
            ) / temperature::MILLIDEGREE_DIVISOR
                - temperature::CRIT_MARGIN_CELSIUS
        });

        Self::new(
            pwm_min,
            pwm_max,
            config.temp_min,
            temp_max,
            config.fan_curve_pow,
            config.fan_semi_passive,
            config.fan_semi_passive_hyst,
        )
    }

    /// Curve output for a temperature, before integer truncation
    ///
    /// Monotonically non-decreasing in `t`, with `pwm_at(temp_min) ==
    /// pwm_min` and `pwm_at(temp_max) == pwm_max`. `curve_pow == 0` is a
    /// step straight to `pwm_max` once `t` passes `temp_min`.
    pub fn pwm_at(&self, t: f64) -> f64 {
        let frac = ((t - self.temp_min) / (self.temp_max - self.temp_min)).clamp(0.0, 1.0);
        // powf(0.0) is 1.0 even at frac == 0; the step stays anchored at pwm_min
        let shaped = if frac == 0.0 { 0.0 } else { frac.powf(self.curve_pow) };
        self.pwm_min + (self.pwm_max - self.pwm_min) * shaped
    }
}

/// Per-device fan control state machine
#[derive(Debug)]
pub struct FanController {
    hwmon_path: PathBuf,
    pwm: SysfsValue,
    pwm_enable: SysfsValue,
    temp_input: SysfsValue,
    params: CurveParams,
    turned_off: bool,
    prev_pwm_enable: Option<String>,
}

impl FanController {
    /// Build a controller for the device behind `hwmon_path`
    ///
    /// Fails when the resolved parameters are invalid; no hardware is
    /// touched until the first tick.
    pub fn new(hwmon_path: &Path, config: &DeviceConfig) -> Result<Self> {
        let params = CurveParams::resolve(config, hwmon_path)?;

        info!(hwmon = ?hwmon_path, params = ?params, "Created fan controller");

        Ok(Self {
            hwmon_path: hwmon_path.to_path_buf(),
            pwm: SysfsValue::new(hwmon_path.join(sysfs_file::PWM)),
            pwm_enable: SysfsValue::new(hwmon_path.join(sysfs_file::PWM_ENABLE)),
            temp_input: SysfsValue::new(hwmon_path.join(sysfs_file::TEMP_INPUT)),
            params,
            turned_off: false,
            prev_pwm_enable: None,
        })
    }

    pub fn hwmon_path(&self) -> &Path {
        &self.hwmon_path
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    /// Whether the backing hwmon directory still exists (hot-unplug check)
    pub fn is_present(&self) -> bool {
        self.hwmon_path.is_dir()
    }

    /// One control tick: sample the temperature and write the derived duty
    ///
    /// Any I/O failure propagates so the caller can log it with device
    /// context; the controller stays usable for the next tick.
    pub fn update(&mut self) -> Result<()> {
        let current_enable = self.pwm_enable.read_string()?;
        if current_enable != pwm::MANUAL_MODE {
            self.prev_pwm_enable = Some(current_enable);
            self.pwm_enable.write_str(pwm::MANUAL_MODE)?;
            info!("Enabled fan speed control for {:?}", self.hwmon_path);
        }

        let temp = self.temp_input.read_millidegrees()?;

        if self.params.semi_passive && temp < self.params.temp_min {
            self.pwm.write_u64(0)?;
            self.turned_off = true;
            return Ok(());
        }

        if self.turned_off && temp < self.params.temp_min + self.params.semi_passive_hyst {
            self.pwm.write_u64(0)?;
            return Ok(());
        }

        self.turned_off = false;
        self.pwm.write_u64(self.params.pwm_at(temp) as u64)?;
        Ok(())
    }

    /// Restore the actuator-enable mode recorded before the first override
    ///
    /// Consumes the snapshot, so repeated calls are no-ops.
    pub fn restore_enable(&mut self) -> Result<()> {
        if let Some(prev) = self.prev_pwm_enable.take() {
            self.pwm_enable.write_str(&prev)?;
            info!("Restored fan control mode '{}' for {:?}", prev, self.hwmon_path);
        }
        Ok(())
    }
}
