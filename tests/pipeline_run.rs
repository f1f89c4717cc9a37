// tests/pipeline_run.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use feedwatch::config::FeedConfig;
use feedwatch::ingest::parser::XmlFeedParser;
use feedwatch::summarize::{DisabledSummarizer, DynSummarizer};
use feedwatch::{
    DedupeKey, Entry, FeedOutcome, Fetcher, Notifier, Pipeline, Summarizer, WatermarkStore,
};

// ---------- test doubles ----------

/// Serves canned RSS documents by URL; URLs without a document fail.
#[derive(Default)]
struct FakeFetcher {
    docs: Mutex<HashMap<String, String>>,
    panic_on: Option<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeFetcher {
    fn set(&self, url: &str, guids: &[&str]) {
        self.docs.lock().insert(url.to_string(), rss(guids));
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if self.panic_on.as_deref() == Some(url) {
            panic!("fetcher blew up");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.docs
            .lock()
            .get(url)
            .map(|s| s.clone().into_bytes())
            .ok_or_else(|| anyhow!("unexpected status code: 503"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Each(String, Vec<String>),
    Aggregate(String, Vec<String>),
}

#[derive(Default)]
struct RecordingNotifier {
    calls: Mutex<Vec<Call>>,
    summaries: Mutex<Vec<Option<String>>>,
    fail: bool,
}

impl RecordingNotifier {
    fn record(&self, entries: &[Entry]) -> Vec<String> {
        self.summaries
            .lock()
            .extend(entries.iter().map(|e| e.summary.clone()));
        entries.iter().map(|e| e.guid.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        let guids = self.record(entries);
        self.calls.lock().push(Call::Each(feed_name.into(), guids));
        if self.fail {
            bail!("push service down");
        }
        Ok(())
    }

    async fn notify_aggregate(&self, feed_name: &str, entries: &[Entry]) -> Result<()> {
        let guids = self.record(entries);
        self.calls.lock().push(Call::Aggregate(feed_name.into(), guids));
        if self.fail {
            bail!("push service down");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Summarizes every title except the ones listed in `fail_for`.
struct FakeSummarizer {
    fail_for: Vec<String>,
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn summarize(&self, title: &str, _description: &str) -> Result<String> {
        if self.fail_for.iter().any(|t| t == title) {
            bail!("API returned status 500 (response length: 0 bytes)");
        }
        Ok(format!("sum:{title}"))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

// ---------- helpers ----------

fn rss(guids: &[&str]) -> String {
    let items: String = guids
        .iter()
        .map(|g| {
            format!(
                "<item><title>T-{g}</title><link>https://feed.test/{g}</link>\
                 <guid>{g}</guid><description>D-{g}</description></item>"
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title>{items}</channel></rss>"#)
}

fn feed(id: &str, notify: bool, aggregate: bool) -> FeedConfig {
    FeedConfig {
        id: id.into(),
        name: format!("Feed {id}"),
        url: format!("https://{id}.test/rss"),
        notify,
        dedupe_key: DedupeKey::Guid,
        aggregate,
    }
}

fn pipeline(
    fetcher: Arc<FakeFetcher>,
    summarizer: DynSummarizer,
    notifier: Arc<RecordingNotifier>,
) -> Pipeline {
    Pipeline::new(fetcher, Arc::new(XmlFeedParser), summarizer, notifier)
}

fn disabled() -> DynSummarizer {
    Arc::new(DisabledSummarizer)
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

// ---------- tests ----------

#[tokio::test]
async fn first_run_then_new_items_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state/last_states.json");

    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.set("https://a.test/rss", &["g2", "g1"]);
    let notifier = Arc::new(RecordingNotifier::default());
    let p = pipeline(fetcher.clone(), disabled(), notifier.clone());
    let feeds = vec![feed("a", true, false)];

    // First contact: only the newest entry counts.
    let store = Arc::new(WatermarkStore::load(&state_path).unwrap());
    let report = p.run(&feeds, store.clone()).await;
    assert_eq!(report.outcome("a"), Some(&FeedOutcome::Notified { new: 1 }));
    store.save(&state_path).unwrap();

    // "Restart": fresh store from disk, feed grew by two.
    fetcher.set("https://a.test/rss", &["g4", "g3", "g2", "g1"]);
    let store = Arc::new(WatermarkStore::load(&state_path).unwrap());
    assert_eq!(store.get("a").as_deref(), Some("g2"));
    let report = p.run(&feeds, store.clone()).await;
    assert_eq!(report.outcome("a"), Some(&FeedOutcome::Notified { new: 2 }));
    assert_eq!(store.get("a").as_deref(), Some("g4"));

    // Steady state.
    let report = p.run(&feeds, store.clone()).await;
    assert_eq!(report.outcome("a"), Some(&FeedOutcome::NoNew));
    assert_eq!(store.get("a").as_deref(), Some("g4"));

    assert_eq!(
        *notifier.calls.lock(),
        vec![
            Call::Each("Feed a".into(), strings(&["g2"])),
            Call::Each("Feed a".into(), strings(&["g4", "g3"])),
        ]
    );
}

#[tokio::test]
async fn failures_are_isolated_per_feed() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.set("https://ok.test/rss", &["x1"]);
    fetcher
        .docs
        .lock()
        .insert("https://bad-xml.test/rss".into(), "<html><body>oops".into());
    fetcher.set("https://empty.test/rss", &[]);
    // "down" has no document: every fetch fails.

    let store = Arc::new(WatermarkStore::new());
    store.set("down", "old");
    store.set("empty", "old");

    let notifier = Arc::new(RecordingNotifier::default());
    let p = pipeline(fetcher, disabled(), notifier.clone());
    let feeds = vec![
        feed("down", true, false),
        feed("bad-xml", true, false),
        feed("empty", true, false),
        feed("ok", true, false),
    ];
    let report = p.run(&feeds, store.clone()).await;

    let ids: Vec<&str> = report.feeds.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["down", "bad-xml", "empty", "ok"], "report keeps config order");

    assert!(matches!(report.outcome("down"), Some(FeedOutcome::FetchFailed(e)) if e.contains("503")));
    assert!(matches!(report.outcome("bad-xml"), Some(FeedOutcome::ParseFailed(_))));
    assert_eq!(report.outcome("empty"), Some(&FeedOutcome::Empty));
    assert_eq!(report.outcome("ok"), Some(&FeedOutcome::Notified { new: 1 }));
    assert_eq!(report.failures(), 3);

    assert_eq!(store.get("down").as_deref(), Some("old"));
    assert_eq!(store.get("empty").as_deref(), Some("old"));
    assert_eq!(store.get("bad-xml"), None);
    assert_eq!(store.get("ok").as_deref(), Some("x1"));
}

#[tokio::test]
async fn aggregate_feeds_get_one_message() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.set("https://agg.test/rss", &["c", "b", "a"]);
    fetcher.set("https://each.test/rss", &["z", "y", "x"]);

    let store = Arc::new(WatermarkStore::new());
    store.set("agg", "a");
    store.set("each", "x");

    let notifier = Arc::new(RecordingNotifier::default());
    let p = pipeline(fetcher, disabled(), notifier.clone()).with_concurrency(1);
    p.run(&[feed("agg", true, true), feed("each", true, false)], store)
        .await;

    let calls = notifier.calls.lock().clone();
    assert_eq!(calls.len(), 2);
    assert!(calls.contains(&Call::Aggregate("Feed agg".into(), strings(&["c", "b"]))));
    assert!(calls.contains(&Call::Each("Feed each".into(), strings(&["z", "y"]))));
}

#[tokio::test]
async fn notify_off_still_advances_watermark() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.set("https://quiet.test/rss", &["n2", "n1"]);
    let store = Arc::new(WatermarkStore::new());
    store.set("quiet", "n1");

    let notifier = Arc::new(RecordingNotifier::default());
    let p = pipeline(fetcher, disabled(), notifier.clone());
    let report = p.run(&[feed("quiet", false, false)], store.clone()).await;

    assert_eq!(report.outcome("quiet"), Some(&FeedOutcome::NotifyDisabled { new: 1 }));
    assert!(notifier.calls.lock().is_empty());
    assert_eq!(store.get("quiet").as_deref(), Some("n2"));
}

#[tokio::test]
async fn notify_failure_does_not_roll_back() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.set("https://f.test/rss", &["b", "a"]);
    let store = Arc::new(WatermarkStore::new());
    store.set("f", "a");

    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    let p = pipeline(fetcher, disabled(), notifier);
    let report = p.run(&[feed("f", true, false)], store.clone()).await;

    assert!(matches!(
        report.outcome("f"),
        Some(FeedOutcome::NotifyFailed { new: 1, error }) if error.contains("push service down")
    ));
    assert_eq!(store.get("f").as_deref(), Some("b"));
}

#[tokio::test]
async fn summary_failure_leaves_entry_blank() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.set("https://s.test/rss", &["s3", "s2", "s1"]);
    let store = Arc::new(WatermarkStore::new());
    store.set("s", "s1");

    let summarizer: DynSummarizer = Arc::new(FakeSummarizer {
        fail_for: vec!["T-s2".into()],
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let p = pipeline(fetcher, summarizer, notifier.clone());
    let report = p.run(&[feed("s", true, false)], store).await;

    assert_eq!(report.outcome("s"), Some(&FeedOutcome::Notified { new: 2 }));
    assert_eq!(
        *notifier.summaries.lock(),
        vec![Some("sum:T-s3".to_string()), None]
    );
}

#[tokio::test]
async fn panicking_feed_does_not_take_down_the_run() {
    let fetcher = Arc::new(FakeFetcher {
        panic_on: Some("https://boom.test/rss".into()),
        ..Default::default()
    });
    fetcher.set("https://fine.test/rss", &["f1"]);

    let store = Arc::new(WatermarkStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let p = pipeline(fetcher, disabled(), notifier);
    let report = p
        .run(&[feed("boom", true, false), feed("fine", true, false)], store.clone())
        .await;

    assert!(matches!(report.outcome("boom"), Some(FeedOutcome::Aborted(_))));
    assert_eq!(report.outcome("fine"), Some(&FeedOutcome::Notified { new: 1 }));
    assert_eq!(store.get("fine").as_deref(), Some("f1"));
}

#[tokio::test]
async fn concurrency_limit_is_respected() {
    let fetcher = Arc::new(FakeFetcher {
        delay: Some(Duration::from_millis(30)),
        ..Default::default()
    });
    let feeds: Vec<FeedConfig> = (0..6).map(|i| feed(&format!("c{i}"), false, false)).collect();
    for f in &feeds {
        fetcher.set(&f.url, &["only"]);
    }

    let store = Arc::new(WatermarkStore::new());
    let p = pipeline(fetcher.clone(), disabled(), Arc::new(RecordingNotifier::default()))
        .with_concurrency(2);
    let report = p.run(&feeds, store.clone()).await;

    assert_eq!(report.failures(), 0);
    assert_eq!(store.len(), 6);
    let peak = fetcher.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak in-flight fetches = {peak}");
}

#[test]
fn zero_concurrency_is_raised_to_one() {
    let p = pipeline(
        Arc::new(FakeFetcher::default()),
        disabled(),
        Arc::new(RecordingNotifier::default()),
    )
    .with_concurrency(0);
    assert_eq!(p.concurrency(), 1);
}
