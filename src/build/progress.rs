//! Build progress reporting.
//!
//! Builds and watch sessions emit [`ProgressEvent`]s through a
//! [`ProgressReporter`]. The console reporter prints the per-bundle status
//! lines and summaries a developer watches; the JSON reporter writes one
//! object per line for editors and CI.
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::progress::{BundleStatus, ConsoleProgress, ProgressEvent, ProgressReporter};
//!
//! let reporter = ConsoleProgress::new();
//! reporter.report(ProgressEvent::BuildStarted { total_bundles: 2 });
//! reporter.report(ProgressEvent::BundleCompleted {
//!     bundle: "style:scielo-article".to_string(),
//!     status: BundleStatus::Success,
//!     duration_ms: 42,
//! });
//! ```

use chrono::Local;
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Status of a bundle in progress events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
    /// Output written
    Success,
    /// Not built (dry run)
    Skipped,
    /// Build failed
    Failed(String),
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleStatus::Success => write!(f, "success"),
            BundleStatus::Skipped => write!(f, "skipped"),
            BundleStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Events reported during builds and watch sessions.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A batch build started
    BuildStarted {
        /// Number of bundles in the batch
        total_bundles: usize,
    },
    /// One bundle started building
    BundleStarted {
        /// Bundle id
        bundle: String,
    },
    /// One bundle finished
    BundleCompleted {
        /// Bundle id
        bundle: String,
        /// Outcome
        status: BundleStatus,
        /// Duration in milliseconds
        duration_ms: u64,
    },
    /// A batch build finished
    BuildCompleted {
        /// Whether every bundle succeeded
        success: bool,
        /// Total duration in milliseconds
        duration_ms: u64,
        /// Bundles built
        succeeded: usize,
        /// Bundles skipped
        skipped: usize,
        /// Bundles failed
        failed: usize,
    },
    /// Watch mode is waiting for changes
    Watching {
        /// Directories being watched
        roots: Vec<String>,
    },
    /// A watched file changed and scheduled a group
    Changed {
        /// File that changed
        path: String,
        /// Group it triggered
        group: String,
    },
    /// A debounced group rebuild is starting
    RebuildStarted {
        /// Group being rebuilt
        group: String,
    },
    /// A bundle that failed in an earlier rebuild succeeded again
    Fixed {
        /// Bundle id
        bundle: String,
    },
    /// A warning was generated
    Warning {
        /// Bundle the warning belongs to
        bundle: Option<String>,
        /// Warning message
        message: String,
    },
    /// An error occurred
    Error {
        /// Bundle the error belongs to
        bundle: Option<String>,
        /// Error message
        message: String,
    },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    use_colors: bool,
    verbose: bool,
    timestamps: bool,
    current: AtomicUsize,
    total: AtomicUsize,
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("timestamps", &self.timestamps)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a reporter writing to stderr, colored when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stderr),
            verbose: false,
            timestamps: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false,
            verbose: false,
            timestamps: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Prefix every line with a local-time `[HH:MM:SS]` stamp (watch mode).
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn bold(&self, text: &str) -> String {
        self.color(text, "\x1b[1m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = if self.timestamps {
                writeln!(output, "[{}] {}", timestamp(), line)
            } else {
                writeln!(output, "{}", line)
            };
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BuildStarted { total_bundles } => {
                self.total.store(total_bundles, Ordering::SeqCst);
                self.current.store(0, Ordering::SeqCst);
                if total_bundles > 0 {
                    self.writeln(&format!(
                        "{} Building {} bundle{}...",
                        self.cyan("[build]"),
                        total_bundles,
                        if total_bundles == 1 { "" } else { "s" }
                    ));
                }
            }
            ProgressEvent::BundleStarted { bundle } => {
                if self.verbose {
                    let current = self.current.load(Ordering::SeqCst) + 1;
                    let total = self.total.load(Ordering::SeqCst);
                    self.writeln(&format!(
                        "{} [{}/{}] Building {}...",
                        self.cyan("[build]"),
                        current,
                        total,
                        bundle
                    ));
                }
            }
            ProgressEvent::BundleCompleted { bundle, status, duration_ms } => {
                let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst);

                let status_str = match &status {
                    BundleStatus::Success => self.green("ok"),
                    BundleStatus::Skipped => self.yellow("skipped"),
                    BundleStatus::Failed(_) => self.red("FAILED"),
                };

                self.writeln(&format!(
                    "{} [{}/{}] {} {} ({})",
                    self.cyan("[build]"),
                    current,
                    total,
                    status_str,
                    bundle,
                    format_duration(duration_ms)
                ));

                if let BundleStatus::Failed(err) = status {
                    for line in err.lines() {
                        self.writeln(&format!("        {}", self.red(line)));
                    }
                }
            }
            ProgressEvent::BuildCompleted { success, duration_ms, succeeded, skipped, failed } => {
                let duration_str = format_duration(duration_ms);

                if success {
                    self.writeln(&format!(
                        "{} {} {} built, {} skipped in {}",
                        self.green("[done]"),
                        self.bold(&succeeded.to_string()),
                        if succeeded == 1 { "bundle" } else { "bundles" },
                        skipped,
                        duration_str
                    ));
                } else {
                    self.writeln(&format!(
                        "{} Build failed: {} succeeded, {} skipped, {} {} in {}",
                        self.red("[error]"),
                        succeeded,
                        skipped,
                        failed,
                        if failed == 1 { "failure" } else { "failures" },
                        duration_str
                    ));
                }
            }
            ProgressEvent::Watching { roots } => {
                self.writeln(&format!(
                    "{} Watching {} for changes...",
                    self.cyan("[watch]"),
                    roots.join(", ")
                ));
            }
            ProgressEvent::Changed { path, group } => {
                self.writeln(&format!("{} Changed: {} ({})", self.cyan("[watch]"), path, group));
            }
            ProgressEvent::RebuildStarted { group } => {
                self.writeln(&format!("{} Rebuilding {}...", self.cyan("[watch]"), group));
            }
            ProgressEvent::Fixed { bundle } => {
                self.writeln(&format!("{} {}", self.green("[fixed]"), bundle));
            }
            ProgressEvent::Warning { bundle, message } => {
                let prefix = bundle.map(|id| format!("{}: ", id)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.yellow("[warn]"), prefix, message));
            }
            ProgressEvent::Error { bundle, message } => {
                let prefix = bundle.map(|id| format!("{}: ", id)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.red("[error]"), prefix, message));
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// JSON progress reporter for machine-readable output.
pub struct JsonProgress {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }

    fn write_json(&self, value: serde_json::Value) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", value);
        }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let value = match event {
            ProgressEvent::BuildStarted { total_bundles } => {
                json!({ "event": "build_started", "total_bundles": total_bundles })
            }
            ProgressEvent::BundleStarted { bundle } => {
                json!({ "event": "bundle_started", "bundle": bundle })
            }
            ProgressEvent::BundleCompleted { bundle, status, duration_ms } => {
                let mut value = json!({
                    "event": "bundle_completed",
                    "bundle": bundle,
                    "duration_ms": duration_ms,
                });
                let (name, error) = match status {
                    BundleStatus::Success => ("success", None),
                    BundleStatus::Skipped => ("skipped", None),
                    BundleStatus::Failed(e) => ("failed", Some(e)),
                };
                value["status"] = json!(name);
                if let Some(error) = error {
                    value["error"] = json!(error);
                }
                value
            }
            ProgressEvent::BuildCompleted { success, duration_ms, succeeded, skipped, failed } => {
                json!({
                    "event": "build_completed",
                    "success": success,
                    "duration_ms": duration_ms,
                    "succeeded": succeeded,
                    "skipped": skipped,
                    "failed": failed,
                })
            }
            ProgressEvent::Watching { roots } => json!({ "event": "watching", "roots": roots }),
            ProgressEvent::Changed { path, group } => {
                json!({ "event": "changed", "path": path, "group": group })
            }
            ProgressEvent::RebuildStarted { group } => {
                json!({ "event": "rebuild_started", "group": group })
            }
            ProgressEvent::Fixed { bundle } => json!({ "event": "fixed", "bundle": bundle }),
            ProgressEvent::Warning { bundle, message } => {
                json!({ "event": "warning", "bundle": bundle, "message": message })
            }
            ProgressEvent::Error { bundle, message } => {
                json!({ "event": "error", "bundle": bundle, "message": message })
            }
        };
        self.write_json(value);
    }
}

/// Format a duration in milliseconds for display.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}

/// Current local wall-clock time as `HH:MM:SS`.
fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone)]
    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (TestWriter, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        (TestWriter(Arc::clone(&output)), output)
    }

    fn text(output: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&output.lock().unwrap()).into_owned()
    }

    #[test]
    fn test_bundle_status_display() {
        assert_eq!(BundleStatus::Success.to_string(), "success");
        assert_eq!(BundleStatus::Skipped.to_string(), "skipped");
        assert_eq!(BundleStatus::Failed("boom".to_string()).to_string(), "failed: boom");
    }

    #[test]
    fn test_null_progress() {
        let reporter = NullProgress::new();
        reporter.report(ProgressEvent::BuildStarted { total_bundles: 3 });
        assert!(!reporter.is_verbose());
    }

    #[test]
    fn test_console_build_started_pluralizes() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer);
        reporter.report(ProgressEvent::BuildStarted { total_bundles: 1 });
        reporter.report(ProgressEvent::BuildStarted { total_bundles: 7 });
        let text = text(&output);
        assert!(text.contains("Building 1 bundle..."));
        assert!(text.contains("Building 7 bundles..."));
    }

    #[test]
    fn test_console_bundle_completed_counts() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer);
        reporter.report(ProgressEvent::BuildStarted { total_bundles: 2 });
        reporter.report(ProgressEvent::BundleCompleted {
            bundle: "script:scielo-article".to_string(),
            status: BundleStatus::Success,
            duration_ms: 150,
        });
        reporter.report(ProgressEvent::BundleCompleted {
            bundle: "style:scielo-article".to_string(),
            status: BundleStatus::Failed("compile-less failed\nsources: a.less".to_string()),
            duration_ms: 20,
        });

        let text = text(&output);
        assert!(text.contains("[build] [1/2] ok script:scielo-article (150ms)"));
        assert!(text.contains("[build] [2/2] FAILED style:scielo-article (20ms)"));
        assert!(text.contains("        sources: a.less"));
    }

    #[test]
    fn test_console_verbose_bundle_started() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer).with_verbose(true);
        reporter.report(ProgressEvent::BuildStarted { total_bundles: 1 });
        reporter.report(ProgressEvent::BundleStarted { bundle: "style:x".to_string() });
        assert!(reporter.is_verbose());
        assert!(text(&output).contains("[1/1] Building style:x..."));
    }

    #[test]
    fn test_console_quiet_skips_bundle_started() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer);
        reporter.report(ProgressEvent::BundleStarted { bundle: "style:x".to_string() });
        assert!(text(&output).is_empty());
    }

    #[test]
    fn test_console_build_completed() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer);
        reporter.report(ProgressEvent::BuildCompleted {
            success: true,
            duration_ms: 1500,
            succeeded: 3,
            skipped: 0,
            failed: 0,
        });
        reporter.report(ProgressEvent::BuildCompleted {
            success: false,
            duration_ms: 10,
            succeeded: 1,
            skipped: 0,
            failed: 1,
        });
        let text = text(&output);
        assert!(text.contains("[done] 3 bundles built, 0 skipped in 1.5s"));
        assert!(text.contains("[error] Build failed: 1 succeeded, 0 skipped, 1 failure in 10ms"));
    }

    #[test]
    fn test_console_colors() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer).with_colors(true);
        reporter.report(ProgressEvent::Warning { bundle: None, message: "careful".to_string() });
        assert!(text(&output).contains("\x1b[33m[warn]\x1b[0m careful"));
    }

    #[test]
    fn test_console_timestamps() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer).with_timestamps(true);
        reporter.report(ProgressEvent::RebuildStarted { group: "styles".to_string() });
        let text = text(&output);
        assert!(text.starts_with('['));
        assert_eq!(&text[3..4], ":");
        assert!(chrono::NaiveTime::parse_from_str(&text[1..9], "%H:%M:%S").is_ok(), "{}", text);
        assert!(text.ends_with("] [watch] Rebuilding styles...\n"));
    }

    #[test]
    fn test_console_watch_events() {
        let (writer, output) = capture();
        let reporter = ConsoleProgress::with_output(writer);
        reporter.report(ProgressEvent::Watching { roots: vec!["less".to_string(), "js".to_string()] });
        reporter.report(ProgressEvent::Changed { path: "less/a.less".to_string(), group: "styles".to_string() });
        reporter.report(ProgressEvent::Fixed { bundle: "style:site".to_string() });
        let text = text(&output);
        assert!(text.contains("[fixed] style:site"));
        assert!(text.contains("[watch] Watching less, js for changes..."));
        assert!(text.contains("[watch] Changed: less/a.less (styles)"));
    }

    #[test]
    fn test_json_bundle_completed() {
        let (writer, output) = capture();
        let reporter = JsonProgress::with_output(writer);
        reporter.report(ProgressEvent::BundleCompleted {
            bundle: "style:\"quoted\"".to_string(),
            status: BundleStatus::Failed("line 1\nline 2".to_string()),
            duration_ms: 5,
        });

        let text = text(&output);
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["event"], "bundle_completed");
        assert_eq!(value["bundle"], "style:\"quoted\"");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "line 1\nline 2");
        assert_eq!(value["duration_ms"], 5);
    }

    #[test]
    fn test_json_one_object_per_line() {
        let (writer, output) = capture();
        let reporter = JsonProgress::with_output(writer);
        reporter.report(ProgressEvent::BuildStarted { total_bundles: 2 });
        reporter.report(ProgressEvent::Error { bundle: None, message: "x".to_string() });
        let text = text(&output);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"event":"build_started","total_bundles":2}"#);
        let error: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(error["bundle"].is_null());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(999), "999ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(90_000), "1m 30s");
    }
}
