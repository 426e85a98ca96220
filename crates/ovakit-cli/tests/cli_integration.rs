//! CLI subprocess integration tests.
//!
//! These tests run the `ovakit` binary and check exit codes, produced files,
//! and JSON output. Inputs only use empty disks and plain image files, so no
//! disk conversion tool is needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn ovakit_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ovakit"));
    // keep a user's ~/.config/ovakit out of the picture
    cmd.env("HOME", home);
    cmd.env_remove("OVAKIT_LOG");
    cmd
}

fn write_input(dir: &Path, hardware_extra: &str) -> PathBuf {
    fs::write(dir.join("seed.iso"), b"seed").unwrap();
    let path = dir.join("appliance.yaml");
    fs::write(
        &path,
        format!(
            r"system:
  name: !param vm_name=photon
  type: vmx-14
networks:
  vm_network:
    name: VM Network
hardware:
  cpus: 2
  memory: 2048
  scsi0:
    type: scsi_controller
  rootdisk:
    type: hard_disk
    parent: scsi0
    disk_capacity: 8192
  cdrom:
    type: cd_drive
    parent: scsi0
    image: {dir}/seed.iso
  eth0:
    type: ethernet
    subtype: VmxNet3
    network: vm_network
{hardware_extra}",
            dir = dir.display()
        ),
    )
    .unwrap();
    path
}

fn compose(dir: &Path, input: &Path, output: &Path, extra: &[&str]) -> Output {
    ovakit_bin(dir)
        .arg("compose")
        .arg("-i")
        .arg(input)
        .arg("-o")
        .arg(output)
        .arg("-q")
        .args(extra)
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_version_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = ovakit_bin(dir.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ovakit"));
}

#[test]
fn cli_compose_ovf_with_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "");
    let ovf = dir.path().join("photon.ovf");

    let output = compose(dir.path(), &input, &ovf, &["--manifest"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let xml = fs::read_to_string(&ovf).unwrap();
    assert!(xml.lines().nth(1).unwrap().starts_with("<!-- Generated by ovakit"));
    assert!(xml.contains("<Name>photon</Name>"));
    assert!(xml.contains("<rasd:ResourceSubType>VirtualSCSI</rasd:ResourceSubType>"));

    let mf = fs::read_to_string(dir.path().join("photon.mf")).unwrap();
    let lines: Vec<&str> = mf.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("SHA256(photon.ovf)= "));
    assert!(lines[1].starts_with("SHA256(seed.iso)= "));
}

#[test]
fn cli_param_overrides_default() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "");
    let ovf = dir.path().join("vm.ovf");

    let output = compose(dir.path(), &input, &ovf, &["--param", "vm_name=edge-01"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(fs::read_to_string(&ovf).unwrap().contains("<Name>edge-01</Name>"));
}

#[test]
fn cli_dir_output_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "");
    let out = dir.path().join("photon");

    let output = compose(dir.path(), &input, &out, &["-f", "dir", "--checksum-type", "sha512"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(out.join("photon.ovf").exists());
    assert!(out.join("seed.iso").exists());

    let mf = out.join("photon.mf");
    let verify = ovakit_bin(dir.path()).arg("verify").arg(&mf).output().unwrap();
    assert_eq!(verify.status.code(), Some(0), "stderr: {}", stderr(&verify));

    fs::write(out.join("photon.ovf"), "<Envelope/>").unwrap();
    let verify = ovakit_bin(dir.path()).arg("verify").arg(&mf).output().unwrap();
    assert_eq!(verify.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&verify.stdout).contains("photon.ovf"));
}

#[test]
fn cli_ova_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "");
    let ova = dir.path().join("photon.ova");

    let output = ovakit_bin(dir.path())
        .arg("--json")
        .arg("compose")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&ova)
        .arg("--tar-format")
        .arg("ustar")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(ova.exists());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["format"], "ova");
    assert_eq!(report["descriptor"], "photon.ovf");
    assert_eq!(report["manifest"], "photon.mf");
    assert_eq!(report["payloads"], serde_json::json!(["seed.iso"]));
}

#[test]
fn cli_unknown_hardware_type_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "  gpu0:\n    type: tensor_core\n");
    let ovf = dir.path().join("photon.ovf");

    let output = compose(dir.path(), &input, &ovf, &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("tensor_core"));
    assert!(!ovf.exists());
}

#[test]
fn cli_dangling_controller_reference_produces_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        "  datadisk:\n    type: hard_disk\n    parent: scsi9\n    disk_capacity: 1024\n",
    );
    let ova = dir.path().join("photon.ova");

    let output = compose(dir.path(), &input, &ova, &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("scsi9"));

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["appliance.yaml", "seed.iso"]);
}

#[test]
fn cli_unsupported_checksum_fails_early() {
    let dir = tempfile::tempdir().unwrap();
    let ovf = dir.path().join("photon.ovf");
    // input does not exist: the algorithm must be rejected first
    let output = compose(
        dir.path(),
        &dir.path().join("missing.yaml"),
        &ovf,
        &["--checksum-type", "md5"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("md5"));
}

#[test]
fn cli_ovf_signing_requires_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "");
    let output = compose(
        dir.path(),
        &input,
        &dir.path().join("photon.ovf"),
        &["--sign", "key.pem"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("manifest"));
}

#[test]
fn cli_missing_param_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.yaml");
    fs::write(
        &input,
        "system:\n  name: !param name\n  type: vmx-14\nhardware:\n  cpus: 1\n",
    )
    .unwrap();
    let output = compose(dir.path(), &input, &dir.path().join("x.ovf"), &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("name"));
}

#[test]
fn cli_settings_file_supplies_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "");
    let settings = dir.path().join("ovakit.toml");
    fs::write(&settings, "checksum = \"sha1\"\n").unwrap();

    let output = ovakit_bin(dir.path())
        .arg("--config")
        .arg(&settings)
        .arg("compose")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("photon.ovf"))
        .arg("-m")
        .arg("-q")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let mf = fs::read_to_string(dir.path().join("photon.mf")).unwrap();
    assert!(mf.starts_with("SHA1(photon.ovf)= "));
}

#[test]
fn cli_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    let output = ovakit_bin(dir.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ovakit"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let man = dir.path().join("man");
    let output = ovakit_bin(dir.path())
        .arg("man-pages")
        .arg(&man)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(man.join("ovakit.1").exists());
    assert!(man.join("ovakit-compose.1").exists());
}
