//! Typed accessors for sysfs control files
//!
//! Low-level read/write operations against a single hardware file.
//!
//! # Value Encodings
//!
//! - **PWM**: ASCII decimal integer, 0 to 255
//! - **Temperature**: millidegrees Celsius (e.g., 45000 = 45.0°C)
//! - **Enable mode**: single mode code (0=disabled, 1=manual, 2=automatic)
//!
//! Every operation goes to the file; there is no caching layer.

use std::fs;
use std::path::{Path, PathBuf};

use gpc_error::{GpucoolError, Result};

use crate::constants::temperature;

/// Capability object over one sysfs control file
#[derive(Debug, Clone)]
pub struct SysfsValue {
    path: PathBuf,
}

impl SysfsValue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the file's exact byte contents (no trimming)
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| GpucoolError::FileRead {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Read the file as a string with surrounding whitespace trimmed
    pub fn read_string(&self) -> Result<String> {
        let content = fs::read_to_string(&self.path).map_err(|e| GpucoolError::FileRead {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(content.trim().to_string())
    }

    /// Read and parse an unsigned integer value
    pub fn read_u64(&self) -> Result<u64> {
        let content = self.read_string()?;
        content.parse::<u64>().map_err(|e| GpucoolError::ValueParse {
            path: self.path.clone(),
            reason: format!("'{}' is not an unsigned integer: {}", content, e),
        })
    }

    /// Read and parse a float value
    pub fn read_f64(&self) -> Result<f64> {
        let content = self.read_string()?;
        content.parse::<f64>().map_err(|e| GpucoolError::ValueParse {
            path: self.path.clone(),
            reason: format!("'{}' is not a number: {}", content, e),
        })
    }

    /// Read a temperature file and convert from millidegrees to degrees Celsius
    pub fn read_millidegrees(&self) -> Result<f64> {
        let content = fs::read_to_string(&self.path).map_err(|e| GpucoolError::TemperatureRead {
            path: self.path.clone(),
            reason: format!("Failed to read: {}", e),
        })?;

        let millidegrees =
            content
                .trim()
                .parse::<f64>()
                .map_err(|e| GpucoolError::TemperatureRead {
                    path: self.path.clone(),
                    reason: format!("Failed to parse '{}': {}", content.trim(), e),
                })?;

        Ok(millidegrees / temperature::MILLIDEGREE_DIVISOR)
    }

    /// Write raw bytes to the file
    pub fn write_bytes(&self, value: &[u8]) -> Result<()> {
        fs::write(&self.path, value).map_err(|e| GpucoolError::FileWrite {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Write a string value
    pub fn write_str(&self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write an ASCII decimal integer value
    pub fn write_u64(&self, value: u64) -> Result<()> {
        self.write_str(&value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_with(dir: &TempDir, name: &str, content: &str) -> SysfsValue {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        SysfsValue::new(path)
    }

    #[test]
    fn test_read_u64_trims_newline() {
        let dir = TempDir::new().unwrap();
        let value = file_with(&dir, "pwm1", "128\n");
        assert_eq!(value.read_u64().unwrap(), 128);
    }

    #[test]
    fn test_read_millidegrees() {
        let dir = TempDir::new().unwrap();
        let value = file_with(&dir, "temp1_input", "65000\n");
        assert!((value.read_millidegrees().unwrap() - 65.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_bytes_is_exact() {
        let dir = TempDir::new().unwrap();
        let value = file_with(&dir, "power1_cap", "280000000\n");
        assert_eq!(value.read_bytes().unwrap(), b"280000000\n");
    }

    #[test]
    fn test_write_u64_round_trip() {
        let dir = TempDir::new().unwrap();
        let value = SysfsValue::new(dir.path().join("pwm1"));
        value.write_u64(63).unwrap();
        assert_eq!(value.read_u64().unwrap(), 63);
    }

    #[test]
    fn test_parse_failure_names_path() {
        let dir = TempDir::new().unwrap();
        let value = file_with(&dir, "pwm1", "garbage\n");
        let err = value.read_u64().unwrap_err();
        assert!(err.to_string().contains("pwm1"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let value = SysfsValue::new(dir.path().join("nope"));
        assert!(value.read_string().is_err());
        assert!(!value.exists());
    }
}
