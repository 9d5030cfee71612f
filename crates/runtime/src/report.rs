//! At-exit collector report
//!
//! Dumps collector KPIs when a heap is dropped, controlled by the
//! `SKEIN_GC_REPORT` env var:
//! - Unset or `0` → no report, zero cost
//! - `1` → human-readable to stderr
//! - `json` → JSON to stderr
//! - `json:/path` → JSON appended to a file

use serde::Serialize;
use std::io::Write;
use std::sync::OnceLock;

/// Counters the heap maintains across its lifetime.
#[derive(Debug, Default, Clone, Serialize)]
pub struct GcStats {
    /// Completed collection cycles.
    pub collections: u64,
    /// Bytes of accounted garbage reclaimed across all cycles.
    pub bytes_reclaimed: u64,
    /// High-water mark of accounted live bytes.
    pub peak_live_bytes: u64,
    /// Total time spent inside `collect`.
    pub total_pause_micros: u64,
}

/// Output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

/// Output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stderr,
    File(String),
}

/// Parsed report configuration.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub destination: ReportDestination,
}

impl ReportConfig {
    /// Parse from the SKEIN_GC_REPORT environment variable.
    pub fn from_env() -> Option<Self> {
        let val = std::env::var("SKEIN_GC_REPORT").ok()?;
        if val.is_empty() {
            return None;
        }

        match val.as_str() {
            "0" => None,
            "1" => Some(ReportConfig {
                format: ReportFormat::Human,
                destination: ReportDestination::Stderr,
            }),
            "json" => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::Stderr,
            }),
            s if s.starts_with("json:") => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File(s[5..].to_string()),
            }),
            _ => {
                eprintln!("Warning: SKEIN_GC_REPORT='{}' not recognized, ignoring", val);
                None
            }
        }
    }
}

static REPORT_CONFIG: OnceLock<Option<ReportConfig>> = OnceLock::new();

fn report_config() -> &'static Option<ReportConfig> {
    REPORT_CONFIG.get_or_init(ReportConfig::from_env)
}

fn render_human(stats: &GcStats) -> String {
    format!(
        "skein gc report\n\
         \x20 collections:     {}\n\
         \x20 bytes reclaimed: {}\n\
         \x20 peak live bytes: {}\n\
         \x20 total pause:     {}us\n",
        stats.collections, stats.bytes_reclaimed, stats.peak_live_bytes, stats.total_pause_micros
    )
}

fn render_json(stats: &GcStats) -> String {
    match serde_json::to_string(stats) {
        Ok(mut json) => {
            json.push('\n');
            json
        }
        Err(err) => format!("{{\"error\":\"{}\"}}\n", err),
    }
}

/// Emit `stats` if SKEIN_GC_REPORT asks for it. Called when a heap is
/// dropped; failures to write are reported but never fatal.
pub(crate) fn emit_if_configured(stats: &GcStats) {
    let Some(config) = report_config() else {
        return;
    };

    let rendered = match config.format {
        ReportFormat::Human => render_human(stats),
        ReportFormat::Json => render_json(stats),
    };

    match &config.destination {
        ReportDestination::Stderr => eprint!("{rendered}"),
        ReportDestination::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path);
            match file {
                Ok(mut file) => {
                    if let Err(err) = file.write_all(rendered.as_bytes()) {
                        eprintln!("Warning: failed to write gc report to {path}: {err}");
                    }
                }
                Err(err) => {
                    eprintln!("Warning: failed to open gc report file {path}: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        // Safety: tests in this module are serialized.
        unsafe {
            std::env::remove_var("SKEIN_GC_REPORT");
        }
    }

    #[test]
    #[serial]
    fn test_unset_means_no_report() {
        clear_env();
        assert!(ReportConfig::from_env().is_none());
    }

    #[test]
    #[serial]
    fn test_report_grammar() {
        clear_env();
        // Safety: serialized with every other env-touching test.
        unsafe {
            std::env::set_var("SKEIN_GC_REPORT", "0");
            assert!(ReportConfig::from_env().is_none());

            std::env::set_var("SKEIN_GC_REPORT", "1");
            let config = ReportConfig::from_env().expect("configured");
            assert_eq!(config.format, ReportFormat::Human);
            assert_eq!(config.destination, ReportDestination::Stderr);

            std::env::set_var("SKEIN_GC_REPORT", "json");
            let config = ReportConfig::from_env().expect("configured");
            assert_eq!(config.format, ReportFormat::Json);
            assert_eq!(config.destination, ReportDestination::Stderr);

            std::env::set_var("SKEIN_GC_REPORT", "json:/tmp/gc.json");
            let config = ReportConfig::from_env().expect("configured");
            assert_eq!(config.format, ReportFormat::Json);
            assert_eq!(
                config.destination,
                ReportDestination::File("/tmp/gc.json".to_string())
            );

            std::env::set_var("SKEIN_GC_REPORT", "verbose");
            assert!(ReportConfig::from_env().is_none());
        }
        clear_env();
    }

    #[test]
    fn test_render_human_mentions_counters() {
        let stats = GcStats {
            collections: 3,
            bytes_reclaimed: 2048,
            peak_live_bytes: 9000,
            total_pause_micros: 1500,
        };
        let rendered = render_human(&stats);
        assert!(rendered.contains("collections:     3"));
        assert!(rendered.contains("2048"));
        assert!(rendered.contains("9000"));
        assert!(rendered.contains("1500us"));
    }

    #[test]
    fn test_render_json_is_parseable() {
        let stats = GcStats {
            collections: 1,
            bytes_reclaimed: 10,
            peak_live_bytes: 20,
            total_pause_micros: 30,
        };
        let parsed: serde_json::Value =
            serde_json::from_str(render_json(&stats).trim()).expect("valid json");
        assert_eq!(parsed["collections"], 1);
        assert_eq!(parsed["bytes_reclaimed"], 10);
        assert_eq!(parsed["peak_live_bytes"], 20);
        assert_eq!(parsed["total_pause_micros"], 30);
    }
}
