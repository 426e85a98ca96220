pub mod completions;
pub mod compose;
pub mod man_pages;
pub mod verify;

use indicatif::{ProgressBar, ProgressStyle};
use ovakit_core::CoreError;
use ovakit_package::PackageError;
use ovakit_schema::ConfigError;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_PACKAGE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn plain_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        plain_style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Prefix a package error with the category `main` maps to an exit code.
pub fn package_error_message(e: &PackageError) -> String {
    if e.is_config_error() {
        format!("config error: {e}")
    } else if matches!(e, PackageError::Core(_)) {
        e.to_string()
    } else {
        format!("package error: {e}")
    }
}

pub fn core_error_message(e: CoreError) -> String {
    package_error_message(&PackageError::Core(e))
}

pub fn config_error_message(e: ConfigError) -> String {
    core_error_message(CoreError::Config(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"format": "ova"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"format\""));
        assert!(result.contains("\"ova\""));
    }

    #[test]
    fn config_errors_get_config_prefix() {
        let msg = config_error_message(ConfigError::MissingParam("disk".to_owned()));
        assert!(msg.starts_with("config error:"));
        assert!(msg.contains("disk"));

        let msg = core_error_message(CoreError::Reference {
            referrer: "hardware entry 'd0'".to_owned(),
            kind: "controller",
            id: "scsi9".to_owned(),
        });
        assert!(msg.starts_with("config error:"));
    }

    #[test]
    fn packaging_errors_get_package_prefix() {
        let msg = package_error_message(&PackageError::MissingCertificate("key.pem".into()));
        assert!(msg.starts_with("package error:"));
    }

    #[test]
    fn tool_failures_during_construction_are_generic() {
        let msg = core_error_message(CoreError::ExternalTool {
            tool: "vmdk-convert".to_owned(),
            message: "boom".to_owned(),
        });
        assert_eq!(msg, "vmdk-convert failed: boom");
    }
}
