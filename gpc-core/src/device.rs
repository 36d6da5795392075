//! Device discovery and identification attributes
//!
//! Enumerates GPUs bound to the amdgpu driver by scanning its PCI driver
//! tree, and captures per-device identification attributes used for config
//! matching:
//!
//! - `device`, `vbios_version` - sysfs attribute files in the device directory
//! - `pci_id`, `pci_slot_name`, `pci_subsys_id` - properties from the
//!   device's `uevent` file
//!
//! Absent attributes are `None`, never an empty string.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gpc_error::Result;

use crate::constants::sysfs_file;

/// Recognized identification attribute keys
///
/// Config sections may constrain any subset of these; the matcher walks the
/// full set for every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdKey {
    Device,
    VbiosVersion,
    PciId,
    PciSlotName,
    PciSubsysId,
}

impl IdKey {
    pub const ALL: [IdKey; 5] = [
        IdKey::Device,
        IdKey::VbiosVersion,
        IdKey::PciId,
        IdKey::PciSlotName,
        IdKey::PciSubsysId,
    ];

    /// Config option name for this key
    pub fn name(self) -> &'static str {
        match self {
            IdKey::Device => "device",
            IdKey::VbiosVersion => "vbios_version",
            IdKey::PciId => "pci_id",
            IdKey::PciSlotName => "pci_slot_name",
            IdKey::PciSubsysId => "pci_subsys_id",
        }
    }
}

/// Immutable identification snapshot captured at discovery time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAttributes {
    /// Device directory under the PCI driver tree
    pub syspath: PathBuf,
    pub device: Option<String>,
    pub vbios_version: Option<String>,
    pub pci_id: Option<String>,
    pub pci_slot_name: Option<String>,
    pub pci_subsys_id: Option<String>,
}

impl DeviceAttributes {
    /// Capture attributes from a device's sysfs directory
    ///
    /// Missing or unreadable files simply yield `None`; discovery never
    /// fails because of a single absent attribute.
    pub fn from_syspath(syspath: &Path) -> Self {
        let device = read_attribute(&syspath.join(sysfs_file::DEVICE_ID));
        let vbios_version = read_attribute(&syspath.join(sysfs_file::VBIOS_VERSION));

        let mut pci_id = None;
        let mut pci_slot_name = None;
        let mut pci_subsys_id = None;

        if let Ok(uevent) = fs::read_to_string(syspath.join(sysfs_file::UEVENT)) {
            for line in uevent.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    match key {
                        "PCI_ID" => pci_id = non_empty(value),
                        "PCI_SLOT_NAME" => pci_slot_name = non_empty(value),
                        "PCI_SUBSYS_ID" => pci_subsys_id = non_empty(value),
                        _ => {}
                    }
                }
            }
        }

        Self {
            syspath: syspath.to_path_buf(),
            device,
            vbios_version,
            pci_id,
            pci_slot_name,
            pci_subsys_id,
        }
    }

    /// Look up an identification attribute by key
    pub fn id_value(&self, key: IdKey) -> Option<&str> {
        match key {
            IdKey::Device => self.device.as_deref(),
            IdKey::VbiosVersion => self.vbios_version.as_deref(),
            IdKey::PciId => self.pci_id.as_deref(),
            IdKey::PciSlotName => self.pci_slot_name.as_deref(),
            IdKey::PciSubsysId => self.pci_subsys_id.as_deref(),
        }
    }
}

/// A discovered GPU: identification attributes plus its hwmon directories
#[derive(Debug, Clone)]
pub struct GpuDevice {
    pub attributes: DeviceAttributes,
    /// hwmon directories under the device; control requires exactly one
    pub hwmon_paths: Vec<PathBuf>,
}

impl GpuDevice {
    /// The single hwmon directory, if the device has exactly one
    pub fn hwmon_path(&self) -> Option<&Path> {
        match self.hwmon_paths.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }
}

/// Enumerate devices bound to the driver tree at `driver_base`
///
/// Entries named like PCI addresses (`0000:0b:00.0`) are device directories.
/// A missing driver tree is not an error: it just means no managed hardware
/// on this host.
pub fn enumerate_devices(driver_base: &Path) -> Result<Vec<GpuDevice>> {
    if !driver_base.is_dir() {
        warn!("Driver tree {:?} not present, no devices to manage", driver_base);
        return Ok(Vec::new());
    }

    let mut syspaths = Vec::new();
    for entry in fs::read_dir(driver_base)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        // PCI addresses contain ':'; skips driver control files like "bind"
        if !name_str.contains(':') {
            continue;
        }

        let path = entry.path();
        if path.is_dir() {
            syspaths.push(path);
        }
    }

    // read_dir order is arbitrary; sort for deterministic discovery
    syspaths.sort();

    let mut devices = Vec::new();
    for syspath in syspaths {
        let attributes = DeviceAttributes::from_syspath(&syspath);
        let hwmon_paths = find_hwmon_dirs(&syspath);
        debug!(device = ?syspath, hwmon = hwmon_paths.len(), "Discovered device");
        devices.push(GpuDevice {
            attributes,
            hwmon_paths,
        });
    }

    Ok(devices)
}

fn find_hwmon_dirs(syspath: &Path) -> Vec<PathBuf> {
    let hwmon_dir = syspath.join("hwmon");
    let mut paths = Vec::new();
    if let Ok(entries) = fs::read_dir(&hwmon_dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                paths.push(entry.path());
            }
        }
    }
    paths.sort();
    paths
}

fn read_attribute(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    non_empty(content.trim())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_device(base: &Path, slot: &str, pci_id: &str) -> PathBuf {
        let dev = base.join(slot);
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("device"), "0x731f\n").unwrap();
        fs::write(dev.join("vbios_version"), "113-D1990100-O09\n").unwrap();
        fs::write(
            dev.join("uevent"),
            format!(
                "DRIVER=amdgpu\nPCI_CLASS=30000\nPCI_ID={}\nPCI_SUBSYS_ID=1DA2:E411\nPCI_SLOT_NAME={}\nMODALIAS=pci:whatever\n",
                pci_id, slot
            ),
        )
        .unwrap();
        dev
    }

    #[test]
    fn test_attributes_from_syspath() {
        let dir = TempDir::new().unwrap();
        let dev = fake_device(dir.path(), "0000:0b:00.0", "1002:731F");

        let attrs = DeviceAttributes::from_syspath(&dev);
        assert_eq!(attrs.device.as_deref(), Some("0x731f"));
        assert_eq!(attrs.vbios_version.as_deref(), Some("113-D1990100-O09"));
        assert_eq!(attrs.pci_id.as_deref(), Some("1002:731F"));
        assert_eq!(attrs.pci_slot_name.as_deref(), Some("0000:0b:00.0"));
        assert_eq!(attrs.pci_subsys_id.as_deref(), Some("1DA2:E411"));
    }

    #[test]
    fn test_absent_attributes_are_none() {
        let dir = TempDir::new().unwrap();
        let dev = dir.path().join("0000:03:00.0");
        fs::create_dir_all(&dev).unwrap();

        let attrs = DeviceAttributes::from_syspath(&dev);
        assert!(attrs.device.is_none());
        assert!(attrs.pci_id.is_none());
        assert!(attrs.pci_slot_name.is_none());
    }

    #[test]
    fn test_enumerate_skips_control_files() {
        let dir = TempDir::new().unwrap();
        fake_device(dir.path(), "0000:0b:00.0", "1002:731F");
        fs::write(dir.path().join("bind"), "").unwrap();
        fs::write(dir.path().join("new_id"), "").unwrap();

        let devices = enumerate_devices(dir.path()).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(
            devices[0].attributes.pci_slot_name.as_deref(),
            Some("0000:0b:00.0")
        );
    }

    #[test]
    fn test_enumerate_missing_tree_is_empty() {
        let dir = TempDir::new().unwrap();
        let devices = enumerate_devices(&dir.path().join("missing")).unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn test_hwmon_resolution_requires_exactly_one() {
        let dir = TempDir::new().unwrap();
        let dev = fake_device(dir.path(), "0000:0b:00.0", "1002:731F");
        fs::create_dir_all(dev.join("hwmon/hwmon3")).unwrap();

        let devices = enumerate_devices(dir.path()).unwrap();
        assert!(devices[0].hwmon_path().is_some());

        fs::create_dir_all(dev.join("hwmon/hwmon4")).unwrap();
        let devices = enumerate_devices(dir.path()).unwrap();
        assert_eq!(devices[0].hwmon_paths.len(), 2);
        assert!(devices[0].hwmon_path().is_none());
    }
}
