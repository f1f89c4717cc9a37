//! Run metrics. Counters are recorded unconditionally through the `metrics`
//! facade; a Prometheus recorder is only installed when a textfile dump was
//! requested, and its rendering is written once at the end of the run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const FEEDS_PROCESSED: &str = "feeds_processed_total";
pub const FEED_ERRORS: &str = "feed_errors_total";
pub const ENTRIES_NEW: &str = "entries_new_total";
pub const SUMMARIES: &str = "summaries_total";
pub const NOTIFICATIONS: &str = "notifications_total";
pub const FETCH_DURATION: &str = "fetch_duration_ms";
pub const PARSE_DURATION: &str = "feed_parse_ms";
pub const RUN_LAST_TS: &str = "run_last_ts";

static DESCRIBED: OnceCell<()> = OnceCell::new();
static RECORDER: OnceCell<PrometheusHandle> = OnceCell::new();

/// Register help text for every series. Safe to call repeatedly.
pub fn describe() {
    DESCRIBED.get_or_init(|| {
        describe_counter!(FEEDS_PROCESSED, "Feeds that completed a run, any outcome");
        describe_counter!(FEED_ERRORS, "Per-feed failures by stage (fetch, parse, notify)");
        describe_counter!(ENTRIES_NEW, "Entries classified as new");
        describe_counter!(SUMMARIES, "Summary attempts by result");
        describe_counter!(NOTIFICATIONS, "Notification deliveries by result");
        describe_histogram!(FETCH_DURATION, Unit::Milliseconds, "Feed download time");
        describe_histogram!(PARSE_DURATION, Unit::Milliseconds, "Feed parse time");
        describe_gauge!(RUN_LAST_TS, Unit::Seconds, "Unix time the last run finished");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder; later calls reuse it.
    pub fn init() -> Result<Self> {
        let handle = RECORDER.get_or_try_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .context("prometheus: install recorder")
        })?;
        describe();
        Ok(Self {
            handle: handle.clone(),
        })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the current rendering to `path` (tmp file + rename).
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        write_textfile(path, &self.render())
    }
}

/// Stamp the end of a run.
pub fn mark_run_finished() {
    gauge!(RUN_LAST_TS).set(chrono::Utc::now().timestamp() as f64);
}

pub fn write_textfile(path: &Path, body: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, body).with_context(|| format!("writing {}", path.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn local_recorder_renders_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            counter!(FEED_ERRORS, "stage" => "fetch").increment(2);
            counter!(ENTRIES_NEW).increment(3);
            mark_run_finished();
        });

        let text = handle.render();
        assert!(text.contains(r#"feed_errors_total{stage="fetch"} 2"#), "{text}");
        assert!(text.contains("entries_new_total 3"), "{text}");
        assert!(text.contains("run_last_ts"), "{text}");
    }

    #[test]
    fn textfile_lands_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics/feedwatch.prom");
        write_textfile(&path, "a 1\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a 1\n");
        assert!(!dir.path().join("metrics/feedwatch.prom.tmp").exists());
    }
}
