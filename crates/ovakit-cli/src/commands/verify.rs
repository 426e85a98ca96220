use super::{json_pretty, package_error_message, EXIT_PACKAGE_ERROR, EXIT_SUCCESS};
use console::Style;
use ovakit_package::verify_manifest;
use std::path::Path;

pub fn run(manifest: &Path, json: bool) -> Result<u8, String> {
    let report = verify_manifest(manifest).map_err(|e| package_error_message(&e))?;

    if json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|f| serde_json::json!({ "file": f.file_name, "reason": f.reason }))
            .collect();
        let payload = serde_json::json!({
            "manifest": manifest.display().to_string(),
            "checked": report.checked,
            "passed": report.passed,
            "failed": failed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{}: {}/{} files passed",
            manifest.display(),
            report.passed,
            report.checked
        );
        let fail = Style::new().red().bold();
        for f in &report.failed {
            println!("  {} {}: {}", fail.apply_to("FAIL"), f.file_name, f.reason);
        }
    }

    if report.is_ok() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_PACKAGE_ERROR)
    }
}
