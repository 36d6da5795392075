/*
 * Integration tests for gpc-core
 *
 * These tests exercise the config -> matcher -> controller pipeline the way
 * the daemon drives it, against a fake sysfs tree.
 */

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use gpc_core::{best_match, load_config, DeviceAttributes, FanController};

fn fake_hwmon(dir: &Path, temp_milli: i64) {
    fs::write(dir.join("pwm1"), "128\n").unwrap();
    fs::write(dir.join("pwm1_enable"), "2\n").unwrap();
    fs::write(dir.join("pwm1_min"), "0\n").unwrap();
    fs::write(dir.join("pwm1_max"), "255\n").unwrap();
    fs::write(dir.join("temp1_input"), format!("{}\n", temp_milli)).unwrap();
    fs::write(dir.join("temp1_crit"), "95000\n").unwrap();
}

fn attributes(pci_id: &str) -> DeviceAttributes {
    DeviceAttributes {
        syspath: PathBuf::from("/sys/bus/pci/drivers/amdgpu/0000:0b:00.0"),
        device: Some("0x1234".to_string()),
        vbios_version: None,
        pci_id: Some(pci_id.to_string()),
        pci_slot_name: Some("0000:0b:00.0".to_string()),
        pci_subsys_id: None,
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_specific_section_wins_over_catch_all_declared_first() {
    // The catch-all is declared first; the exact pci_id section must still
    // win because score 1 beats score 0.
    let file = write_config(
        "[everything]\n\
         fan_control = true\n\
         \n\
         [my-card]\n\
         pci_id = \"1002:1234\"\n\
         fan_control = true\n\
         temp_min = 50.0\n",
    );

    let configs = load_config(file.path()).unwrap();
    let device = attributes("1002:1234");

    let (winner, score) = best_match(&device, &configs).unwrap();
    assert_eq!(winner.name, "my-card");
    assert_eq!(score, 1);
    assert_eq!(winner.temp_min, 50.0);
}

#[test]
fn test_unmatched_device_falls_back_to_catch_all() {
    let file = write_config(
        "[everything]\n\
         fan_control = true\n\
         \n\
         [my-card]\n\
         pci_id = \"1002:1234\"\n\
         fan_control = true\n",
    );

    let configs = load_config(file.path()).unwrap();
    let device = attributes("1002:9999");

    let (winner, score) = best_match(&device, &configs).unwrap();
    assert_eq!(winner.name, "everything");
    assert_eq!(score, 0);
}

#[test]
fn test_matched_config_drives_expected_curve_output() {
    // temp_min=40, temp_max=90, pwm 0..255, pow 2, temp 65°C:
    // 255 * ((65-40)/50)^2 = 255 * 0.25 = 63.75 -> 63 truncated
    let file = write_config(
        "[my-card]\n\
         pci_id = \"1002:1234\"\n\
         fan_control = true\n\
         temp_min = 40.0\n\
         temp_max = 90.0\n\
         fan_pwm_min = 0.0\n\
         fan_pwm_max = 255.0\n\
         fan_curve_pow = 2.0\n",
    );

    let configs = load_config(file.path()).unwrap();
    let device = attributes("1002:1234");
    let (winner, _) = best_match(&device, &configs).unwrap();

    let hwmon = TempDir::new().unwrap();
    fake_hwmon(hwmon.path(), 65_000);

    let mut controller = FanController::new(hwmon.path(), winner).unwrap();
    controller.update().unwrap();

    let pwm: u64 = fs::read_to_string(hwmon.path().join("pwm1"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pwm, 63);
}

#[test]
fn test_controller_restores_mode_after_run() {
    let file = write_config("[everything]\nfan_control = true\n");
    let configs = load_config(file.path()).unwrap();
    let device = attributes("1002:1234");
    let (winner, _) = best_match(&device, &configs).unwrap();

    let hwmon = TempDir::new().unwrap();
    fake_hwmon(hwmon.path(), 70_000);

    let mut controller = FanController::new(hwmon.path(), winner).unwrap();
    controller.update().unwrap();
    assert_eq!(
        fs::read_to_string(hwmon.path().join("pwm1_enable")).unwrap().trim(),
        "1"
    );

    controller.restore_enable().unwrap();
    assert_eq!(
        fs::read_to_string(hwmon.path().join("pwm1_enable")).unwrap().trim(),
        "2"
    );
}
