//! Update cycle
//!
//! One cycle covers the life of a device set: at start it enumerates
//! devices, matches each against the config sections, and builds a fan
//! controller per controllable device (applying any one-shot power cap
//! through the ledger). It then ticks every live controller once per second
//! until cancelled, at which point all hardware state is restored.
//!
//! # Restoration Guarantees
//!
//! - Every controller's `pwm1_enable` mode is restored, then the ledger is
//!   rolled back; a failure on one device never blocks the others.
//! - A sleep or shutdown request lands at a tick boundary: an in-flight
//!   tick finishes before restoration runs, so no actuator value is left
//!   half-written.
//! - Cancellation is idempotent; repeated requests restore at most once.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use gpc_core::constants::{paths, sysfs_file, timing};
use gpc_core::{
    best_match, enumerate_devices, CapabilityCheck, DeviceConfig, FanController, OverrideLedger,
};

/// Cooperative cancellation token
///
/// Cancelling is idempotent and never blocks; waiters are woken exactly
/// once and late waiters observe the flag immediately.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until `cancel` has been called (returns immediately if it
    /// already was)
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering so a cancel between the check and
            // the await cannot be missed
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Host paths an update cycle operates on; swappable for tests
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// PCI driver tree to enumerate
    pub driver_base: PathBuf,
    /// Driver feature-mask file for the capability-lock diagnostic
    pub capability_mask: PathBuf,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            driver_base: PathBuf::from(paths::AMDGPU_DRIVER_BASE),
            capability_mask: PathBuf::from(paths::PPFEATUREMASK),
        }
    }
}

/// Run one update cycle until the token is cancelled
///
/// Never returns an error: every per-device failure is logged and contained
/// so siblings keep running, and restoration is always attempted on the way
/// out.
pub async fn run_update_cycle(
    configs: Arc<Vec<DeviceConfig>>,
    settings: CycleSettings,
    cancel: CancelToken,
) {
    let capability = CapabilityCheck::amdgpu_overdrive(&settings.capability_mask);
    let mut ledger = OverrideLedger::new(Some(capability));
    let mut controllers = build_controllers(&configs, &settings, &mut ledger);

    info!(
        "Update cycle started with {} fan controllers, {} ledger overrides",
        controllers.len(),
        ledger.len()
    );

    loop {
        if controllers.is_empty() {
            // Nothing to tick; park until cancelled so any ledger
            // overrides are still rolled back on the way out
            cancel.cancelled().await;
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(timing::TICK_PERIOD) => {}
            _ = cancel.cancelled() => break,
        }

        // Hot-unplugged devices are dropped without restoration attempts:
        // their files are gone
        controllers.retain(|controller| {
            if controller.is_present() {
                true
            } else {
                info!(
                    "Device {:?} disappeared, dropping its controller",
                    controller.hwmon_path()
                );
                false
            }
        });

        for controller in &mut controllers {
            if let Err(e) = controller.update() {
                error!(
                    "Failed to update device {:?}: {}",
                    controller.hwmon_path(),
                    e
                );
            }
        }
    }

    restore_all(&mut controllers, &mut ledger);
    info!("Update cycle stopped");
}

/// Discovery -> match -> controller-creation pipeline
fn build_controllers(
    configs: &[DeviceConfig],
    settings: &CycleSettings,
    ledger: &mut OverrideLedger,
) -> Vec<FanController> {
    let devices = match enumerate_devices(&settings.driver_base) {
        Ok(devices) => devices,
        Err(e) => {
            error!("Device enumeration failed: {}", e);
            Vec::new()
        }
    };

    let mut controllers = Vec::new();

    for device in &devices {
        let attributes = &device.attributes;
        info!(
            "Identification data for {:?}: {:?}",
            attributes.syspath, attributes
        );

        let Some((config, score)) = best_match(attributes, configs) else {
            info!(
                "No config section matches {:?}, leaving it unmanaged",
                attributes.syspath
            );
            continue;
        };
        info!(
            "Matched config '{}' to {:?} (score {})",
            config.name, attributes.syspath, score
        );

        let hwmon = match device.hwmon_paths.as_slice() {
            [single] => single,
            [] => {
                warn!("Device {:?} has no hwmon directory", attributes.syspath);
                continue;
            }
            many => {
                warn!(
                    "Device {:?} has {} hwmon directories, don't know how to handle that",
                    attributes.syspath,
                    many.len()
                );
                continue;
            }
        };

        if config.fan_control {
            match FanController::new(hwmon, config) {
                Ok(controller) => controllers.push(controller),
                Err(e) => error!("Failed to enable fan control for {:?}: {}", hwmon, e),
            }
        }

        // One-shot: applied at cycle start, rolled back on cancellation
        if let Some(power_cap) = config.power_cap {
            ledger.set(
                &hwmon.join(sysfs_file::POWER_CAP),
                power_cap.to_string().as_bytes(),
            );
        }
    }

    controllers
}

fn restore_all(controllers: &mut [FanController], ledger: &mut OverrideLedger) {
    for controller in controllers.iter_mut() {
        if let Err(e) = controller.restore_enable() {
            error!(
                "Failed to restore device {:?}: {}",
                controller.hwmon_path(),
                e
            );
        }
    }
    ledger.rollback();
}
