//! Configuration file parsing
//!
//! The config file is TOML; each top-level table is one device section.
//! A section carries identification options (matched against discovered
//! device attributes) and tuning options for the fan curve:
//!
//! ```toml
//! [any-gpu]
//! fan_control = true
//! temp_min = 45.0
//!
//! [navi]
//! pci_id = "1002:731F"
//! fan_control = true
//! fan_semi_passive = true
//! power_cap = 220000000
//! ```
//!
//! Unknown options are warnings, never fatal. A malformed value fails that
//! section only; the remaining sections still load. Section order in the
//! file is preserved - it is the tie-break order for matching.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use toml::Value;
use tracing::{error, info, warn};

use gpc_error::{GpucoolError, Result};

use crate::constants::tuning;
use crate::device::IdKey;

/// Option names recognized in a device section
const KNOWN_OPTIONS: &[&str] = &[
    "device",
    "vbios_version",
    "pci_id",
    "pci_slot_name",
    "pci_subsys_id",
    "fan_control",
    "fan_pwm_min",
    "fan_pwm_max",
    "temp_min",
    "temp_max",
    "fan_curve_pow",
    "fan_semi_passive",
    "fan_semi_passive_hyst",
    "power_cap",
];

/// One parsed device section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Section name, used as the diagnostic key in logs
    pub name: String,

    // Identification options
    pub device: Option<String>,
    pub vbios_version: Option<String>,
    pub pci_id: Option<String>,
    pub pci_slot_name: Option<String>,
    pub pci_subsys_id: Option<String>,

    // Tuning options
    pub fan_control: bool,
    pub fan_pwm_min: Option<f64>,
    pub fan_pwm_max: Option<f64>,
    pub temp_min: f64,
    pub temp_max: Option<f64>,
    pub fan_curve_pow: f64,
    pub fan_semi_passive: bool,
    pub fan_semi_passive_hyst: f64,
    pub power_cap: Option<i64>,
}

impl DeviceConfig {
    /// A section with every option at its default
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: None,
            vbios_version: None,
            pci_id: None,
            pci_slot_name: None,
            pci_subsys_id: None,
            fan_control: false,
            fan_pwm_min: None,
            fan_pwm_max: None,
            temp_min: tuning::DEFAULT_TEMP_MIN,
            temp_max: None,
            fan_curve_pow: tuning::DEFAULT_CURVE_POW,
            fan_semi_passive: false,
            fan_semi_passive_hyst: tuning::DEFAULT_SEMI_PASSIVE_HYST,
            power_cap: None,
        }
    }

    /// Value this section requires for an identification attribute,
    /// or `None` when the section does not constrain it
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

/// Load all device sections from a TOML config file
///
/// Fatal only when the file cannot be read or is not valid TOML. A section
/// with a malformed value is logged and skipped; the rest still apply.
pub fn load_config(path: &Path) -> Result<Vec<DeviceConfig>> {
    let content = fs::read_to_string(path).map_err(|e| GpucoolError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let table: toml::Table = content
        .parse()
        .map_err(|e| GpucoolError::Config(format!("{}: {}", path.display(), e)))?;

    let mut sections = Vec::new();
    for (name, value) in &table {
        let Value::Table(section) = value else {
            warn!(
                "Top-level option '{}' is not a section, ignoring (sections are [name] tables)",
                name
            );
            continue;
        };

        match parse_section(name, section) {
            Ok(config) => sections.push(config),
            Err(e) => error!("Skipping config section '{}': {}", name, e),
        }
    }

    info!("Loaded {} device sections from {:?}", sections.len(), path);
    Ok(sections)
}

/// Parse one named section into a typed config
pub fn parse_section(name: &str, section: &toml::Table) -> Result<DeviceConfig> {
    let mut config = DeviceConfig::named(name);

    for (option, value) in section {
        match option.as_str() {
            "device" => config.device = Some(as_string(name, option, value)?),
            "vbios_version" => config.vbios_version = Some(as_string(name, option, value)?),
            "pci_id" => config.pci_id = Some(as_string(name, option, value)?),
            "pci_slot_name" => config.pci_slot_name = Some(as_string(name, option, value)?),
            "pci_subsys_id" => config.pci_subsys_id = Some(as_string(name, option, value)?),
            "fan_control" => config.fan_control = as_bool(name, option, value)?,
            "fan_pwm_min" => config.fan_pwm_min = Some(as_float(name, option, value)?),
            "fan_pwm_max" => config.fan_pwm_max = Some(as_float(name, option, value)?),
            "temp_min" => config.temp_min = as_float(name, option, value)?,
            "temp_max" => config.temp_max = Some(as_float(name, option, value)?),
            "fan_curve_pow" => config.fan_curve_pow = as_float(name, option, value)?,
            "fan_semi_passive" => config.fan_semi_passive = as_bool(name, option, value)?,
            "fan_semi_passive_hyst" => {
                config.fan_semi_passive_hyst = as_float(name, option, value)?
            }
            "power_cap" => config.power_cap = Some(as_integer(name, option, value)?),
            _ => warn!(
                "Unknown option '{}' in section '{}' (known options: {:?})",
                option, name, KNOWN_OPTIONS
            ),
        }
    }

    Ok(config)
}

fn as_string(section: &str, option: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(invalid(section, option, "a string", other)),
    }
}

fn as_bool(section: &str, option: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => Err(invalid(section, option, "a boolean", other)),
    }
}

fn as_float(section: &str, option: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Integer(i) => Ok(*i as f64),
        other => Err(invalid(section, option, "a number", other)),
    }
}

fn as_integer(section: &str, option: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => Ok(*i),
        other => Err(invalid(section, option, "an integer", other)),
    }
}

fn invalid(section: &str, option: &str, expected: &str, got: &Value) -> GpucoolError {
    GpucoolError::InvalidOption {
        section: section.to_string(),
        option: option.to_string(),
        reason: format!("expected {}, got {}", expected, got.type_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load_str(content: &str) -> Vec<DeviceConfig> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        load_config(file.path()).unwrap()
    }

    #[test]
    fn test_defaults_when_options_omitted() {
        let configs = load_str("[gpu]\nfan_control = true\n");
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.name, "gpu");
        assert!(config.fan_control);
        assert_eq!(config.temp_min, 40.0);
        assert_eq!(config.fan_curve_pow, 2.0);
        assert!(!config.fan_semi_passive);
        assert_eq!(config.fan_semi_passive_hyst, 5.0);
        assert!(config.fan_pwm_min.is_none());
        assert!(config.temp_max.is_none());
        assert!(config.power_cap.is_none());
    }

    #[test]
    fn test_identification_and_tuning_options() {
        let configs = load_str(
            "[navi]\n\
             pci_id = \"1002:731F\"\n\
             vbios_version = \"113-D1990100-O09\"\n\
             fan_control = true\n\
             fan_pwm_min = 40\n\
             fan_pwm_max = 240.0\n\
             temp_min = 45.0\n\
             temp_max = 88.0\n\
             fan_curve_pow = 1.5\n\
             fan_semi_passive = true\n\
             fan_semi_passive_hyst = 8.0\n\
             power_cap = 220000000\n",
        );
        let config = &configs[0];
        assert_eq!(config.pci_id.as_deref(), Some("1002:731F"));
        assert_eq!(config.fan_pwm_min, Some(40.0));
        assert_eq!(config.fan_pwm_max, Some(240.0));
        assert_eq!(config.temp_max, Some(88.0));
        assert_eq!(config.fan_curve_pow, 1.5);
        assert!(config.fan_semi_passive);
        assert_eq!(config.power_cap, Some(220_000_000));
    }

    #[test]
    fn test_section_order_is_preserved() {
        let configs = load_str(
            "[zebra]\nfan_control = true\n\n[alpha]\nfan_control = true\n\n[middle]\nfan_control = false\n",
        );
        let names: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["zebra", "alpha", "middle"]);
    }

    #[test]
    fn test_malformed_section_is_skipped_not_fatal() {
        let configs = load_str(
            "[broken]\ntemp_min = \"warm\"\n\n[good]\nfan_control = true\n",
        );
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "good");
    }

    #[test]
    fn test_unknown_option_is_not_fatal() {
        let configs = load_str("[gpu]\nfan_control = true\nfan_colour = \"red\"\n");
        assert_eq!(configs.len(), 1);
        assert!(configs[0].fan_control);
    }

    #[test]
    fn test_invalid_toml_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not [valid toml").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_parse_section_error_names_section_and_option() {
        let table: toml::Table = "power_cap = 1.5".parse().unwrap();
        let err = parse_section("gpu0", &table).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("gpu0"));
        assert!(message.contains("power_cap"));
    }
}
