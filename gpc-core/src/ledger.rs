//! Hardware override ledger
//!
//! Records the original contents of every sysfs file this process changes
//! and restores them on shutdown. The first recorded value for a path wins:
//! however many times the daemon overwrites a file, rollback always returns
//! it to its pre-daemon state.
//!
//! If the current value cannot be read, the write is aborted - a file is
//! never modified without a rollback point.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::constants::overdrive;
use crate::sysfs::SysfsValue;

/// Capability-lock diagnostic for failed overrides
///
/// Some drivers reject manual overrides unless a feature bit is set in
/// their parameter mask. When a write fails, the ledger consults the mask
/// and points the user at the missing bit instead of leaving a bare EPERM
/// in the log.
#[derive(Debug, Clone)]
pub struct CapabilityCheck {
    mask_path: PathBuf,
    mask_bit: u64,
    hint: String,
}

impl CapabilityCheck {
    pub fn new(mask_path: impl Into<PathBuf>, mask_bit: u64, hint: impl Into<String>) -> Self {
        Self {
            mask_path: mask_path.into(),
            mask_bit,
            hint: hint.into(),
        }
    }

    /// The amdgpu overdrive bit in ppfeaturemask
    pub fn amdgpu_overdrive(mask_path: impl Into<PathBuf>) -> Self {
        Self::new(
            mask_path,
            overdrive::PP_OVERDRIVE_MASK,
            "Overdrive is currently disabled. Add the overdrive bit to the \
             amdgpu ppfeaturemask module parameter and reboot to enable it",
        )
    }

    /// Warn when the gating bit is not set; silent when the mask is
    /// unreadable or the bit is present
    fn warn_if_locked(&self) {
        let mask = SysfsValue::new(&self.mask_path);
        match mask.read_u64() {
            Ok(value) => {
                if value & self.mask_bit == 0 {
                    warn!("{}", self.hint);
                }
            }
            Err(e) => error!("Can't check capability mask: {}", e),
        }
    }
}

/// Record of original hardware values with best-effort rollback
#[derive(Debug, Default)]
pub struct OverrideLedger {
    // Insertion order is rollback order
    originals: Vec<(PathBuf, Vec<u8>)>,
    capability: Option<CapabilityCheck>,
}

impl OverrideLedger {
    pub fn new(capability: Option<CapabilityCheck>) -> Self {
        Self {
            originals: Vec::new(),
            capability,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    /// Override a hardware file, recording its original value first
    ///
    /// Failures are logged, never propagated: a read failure aborts this
    /// write, a write failure leaves the recorded original in place for
    /// rollback.
    pub fn set(&mut self, path: &Path, value: &[u8]) {
        let file = SysfsValue::new(path);

        if !self.originals.iter().any(|(p, _)| p == path) {
            match file.read_bytes() {
                Ok(original) => self.originals.push((path.to_path_buf(), original)),
                Err(e) => {
                    error!("Can't read original value from {:?}: {}", path, e);
                    return;
                }
            }
        }

        self.write(&file, value, true);
    }

    /// Restore every recorded file to its pre-daemon value
    ///
    /// Best-effort: a failure on one path never blocks the rest. Entries
    /// are consumed, so a second rollback is a no-op.
    pub fn rollback(&mut self) {
        for (path, original) in self.originals.drain(..) {
            let file = SysfsValue::new(&path);
            Self::write_inner(&file, &original, None);
        }
    }

    fn write(&self, file: &SysfsValue, value: &[u8], check_capability: bool) {
        let capability = if check_capability {
            self.capability.as_ref()
        } else {
            None
        };
        Self::write_inner(file, value, capability);
    }

    fn write_inner(file: &SysfsValue, value: &[u8], capability: Option<&CapabilityCheck>) {
        info!(
            "Writing {:?} to {:?}",
            String::from_utf8_lossy(value),
            file.path()
        );
        if let Err(e) = file.write_bytes(value) {
            error!("{}", e);
            if let Some(check) = capability {
                check.warn_if_locked();
            }
        }
    }
}
