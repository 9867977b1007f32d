use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sitescan_scanner::ScanReport;
use url::Url;

pub const RESULTS_DIR: &str = "results";

const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '%'];

pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| if RESERVED.contains(&c) { '-' } else { c })
        .collect()
}

/// `<host>-<path>-<YYYYMMDDTHHMMSS>.json`, named after the requested URL.
///
/// Input that does not parse as a URL is used whole as the host, with `root`
/// as the path. URLs without a host (`file:`, `data:`) use their scheme.
pub fn report_file_name(requested: &str, at: DateTime<Utc>) -> String {
    let (host, path) = match Url::parse(requested) {
        Ok(url) => {
            let host = url.host_str().unwrap_or(url.scheme()).to_string();
            let path = match url.path() {
                "" | "/" => "root".to_string(),
                path => sanitize_filename(path),
            };
            (sanitize_filename(&host), path)
        }
        Err(_) => (sanitize_filename(requested), "root".to_string()),
    };
    format!("{host}-{path}-{}.json", at.format("%Y%m%dT%H%M%S"))
}

/// Writes the report under `<base>/results/`, creating the directory if needed.
pub fn write_report(report: &ScanReport, base: &Path, requested: &str, at: DateTime<Utc>) -> Result<PathBuf> {
    let dir = base.join(RESULTS_DIR);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create results directory {}", dir.display()))?;

    let path = dir.join(report_file_name(requested, at));
    report.write_to(&path)?;
    tracing::debug!(path = %path.display(), "report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap()
    }

    #[test]
    fn reserved_characters_become_dashes() {
        assert_eq!(sanitize_filename(r#"a/b\c:d*e?f"g<h>i|j%k"#), "a-b-c-d-e-f-g-h-i-j-k");
        assert_eq!(sanitize_filename("plain.name_1"), "plain.name_1");
    }

    #[test]
    fn bare_host_uses_root_path() {
        assert_eq!(
            report_file_name("https://example.com", at()),
            "example.com-root-20240501T090307.json"
        );
    }

    #[test]
    fn path_segments_are_flattened() {
        assert_eq!(
            report_file_name("http://127.0.0.1:8080/docs/a%20b?q=1", at()),
            "127.0.0.1--docs-a-20b-20240501T090307.json"
        );
    }

    #[test]
    fn unparsable_input_names_the_report_as_given() {
        assert_eq!(
            report_file_name("example.com/shop", at()),
            "example.com-shop-root-20240501T090307.json"
        );
    }

    #[test]
    fn hostless_url_falls_back_to_scheme() {
        assert_eq!(
            report_file_name("file:///tmp/page.html", at()),
            "file--tmp-page.html-20240501T090307.json"
        );
    }

    #[test]
    fn report_lands_in_created_results_dir() {
        let base = tempfile::tempdir().unwrap();
        let report: ScanReport = serde_json::from_value(serde_json::json!({
            "url": "https://example.com/shop",
            "finalUrl": "https://example.com/shop",
            "scanTime": "2024-05-01T09:03:00.000Z",
            "statusCode": 200,
            "consoleErrors": [],
            "resourceWarnings": []
        }))
        .unwrap();

        let path = write_report(&report, base.path(), "https://example.com/shop", at()).unwrap();
        assert_eq!(
            path,
            base.path()
                .join("results")
                .join("example.com--shop-20240501T090307.json")
        );
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["statusCode"], 200);
        assert!(written.get("consoleErrors").unwrap().as_array().unwrap().is_empty());
    }
}
