//! Watch mode tests
//!
//! Drives a [`WatchSession`] with synthetic filesystem events and synthetic
//! instants, then runs the rebuilds the scheduler hands out through the
//! session's pipeline.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, DataChange, ModifyKind};
use notify::EventKind;
use tempfile::TempDir;

use assetpipe::build::{BuildContext, BuildPipeline, BuildReport};
use assetpipe::config::parse_config;
use assetpipe::watch::{DebouncePolicy, FailureTracker, GroupState, Scheduler, WatchError, WatchSession};

const CONFIG: &str = r#"
[paths]
source_root = "static"
script_out = "static/js/dist"
style_out = "static/css"

[watch]
debounce_ms = 100

[[watch.groups]]
name = "styles"
globs = ["less/**/*.less"]
bundles = ["style:*"]

[[watch.groups]]
name = "scripts"
globs = ["js/*.js"]
bundles = ["script:*"]

[[script]]
name = "app"
output = "app-min.js"
sources = ["js/app.js"]
source_map = "none"

[[style]]
name = "site"
output = "site.css"
sources = ["less/site.less"]

[[style]]
name = "print"
output = "print.css"
sources = ["less/print.less"]
"#;

struct Fixture {
    dir: TempDir,
    session: WatchSession,
    pipeline: BuildPipeline,
}

impl Fixture {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        for (rel, content) in [
            ("static/js/app.js", "var app = 1;\n"),
            ("static/less/site.less", ".site { width: 1px; }\n"),
            ("static/less/print.less", ".print { width: 2px; }\n"),
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let context = BuildContext::new(parse_config(config).unwrap(), dir.path().to_path_buf()).unwrap();
        let pipeline = BuildPipeline::new(context);
        let session = WatchSession::new(pipeline.clone()).unwrap();
        Self { dir, session, pipeline }
    }

    /// Absolute path under the canonical source root, as the watcher reports it.
    fn source(&self, rel: &str) -> PathBuf {
        fs::canonicalize(self.dir.path().join("static")).unwrap().join(rel)
    }

    fn write(&self, rel: &str, content: &str) {
        fs::write(self.dir.path().join("static").join(rel), content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.dir.path().join("static").join(rel)).unwrap()
    }

    fn rebuild(&self, group: &str) -> BuildReport {
        let bundles: Vec<String> = self
            .session
            .groups()
            .iter()
            .find(|g| g.name == group)
            .map(|g| g.bundles.iter().map(|id| id.to_string()).collect())
            .unwrap_or_default();
        self.pipeline.build_all(&bundles)
    }
}

fn modify(path: PathBuf) -> notify::Event {
    notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_groups_resolved_from_selectors() {
    let fixture = Fixture::new(CONFIG);
    let groups = fixture.session.groups();
    assert_eq!(groups.len(), 2);

    let styles: Vec<String> = groups[0].bundles.iter().map(|id| id.to_string()).collect();
    assert_eq!(styles, vec!["style:site", "style:print"]);
    let scripts: Vec<String> = groups[1].bundles.iter().map(|id| id.to_string()).collect();
    assert_eq!(scripts, vec!["script:app"]);

    assert_eq!(fixture.session.policy(), DebouncePolicy::Debounced(ms(100)));
    assert_eq!(fixture.session.watched_bundles(), vec!["script:app", "style:site", "style:print"]);
}

#[test]
fn test_style_edit_rebuilds_only_styles() {
    let fixture = Fixture::new(CONFIG);
    let mut scheduler = fixture.session.scheduler();
    let t0 = Instant::now();

    fixture.write("less/site.less", ".site { width: 3px; }\n");
    let triggered = fixture.session.on_event(&mut scheduler, &modify(fixture.source("less/site.less")), t0);
    assert_eq!(triggered, vec![(fixture.source("less/site.less"), "styles".to_string())]);

    assert!(scheduler.due_groups(t0 + ms(50)).is_empty());
    let due = scheduler.due_groups(t0 + ms(100));
    assert_eq!(due, vec!["styles".to_string()]);

    let report = fixture.rebuild(&due[0]);
    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.results.len(), 2);
    scheduler.on_finished("styles", t0 + ms(150));

    assert_eq!(fixture.read("css/site.css"), ".site{width:3px}");
    assert!(!fixture.dir.path().join("static/js/dist/app-min.js").exists());
    assert_eq!(scheduler.state("scripts"), Some(GroupState::Idle));
}

#[test]
fn test_burst_of_saves_rebuilds_once() {
    let fixture = Fixture::new(CONFIG);
    let mut scheduler = fixture.session.scheduler();
    let t0 = Instant::now();

    let path = fixture.source("less/print.less");
    for i in 0..5 {
        fixture.session.on_event(&mut scheduler, &modify(path.clone()), t0 + ms(i * 30));
    }

    let last = t0 + ms(120);
    assert!(scheduler.due_groups(last + ms(99)).is_empty());
    assert_eq!(scheduler.due_groups(last + ms(100)), vec!["styles".to_string()]);
    scheduler.on_finished("styles", last + ms(150));
    assert!(scheduler.due_groups(last + ms(1000)).is_empty());
}

#[test]
fn test_nested_less_file_matches_recursive_glob() {
    let fixture = Fixture::new(CONFIG);
    let nested = fixture.source("less/partials/buttons.less");
    assert_eq!(fixture.session.groups_for(&nested), vec!["styles"]);
    assert!(fixture.session.groups_for(&fixture.source("js/vendor/lib.js")).is_empty());
}

#[test]
fn test_outputs_never_trigger_rebuilds() {
    let fixture = Fixture::new(&CONFIG.replace(r#"script_out = "static/js/dist""#, r#"script_out = "static/js""#));
    let mut scheduler = fixture.session.scheduler();

    let output = fixture.source("js/app-min.js");
    assert!(fixture.session.groups()[1].matches(&output));
    assert!(fixture.session.groups_for(&output).is_empty());

    let created = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(output);
    assert!(fixture.session.on_event(&mut scheduler, &created, Instant::now()).is_empty());
    assert_eq!(scheduler.next_deadline(), None);
}

#[test]
fn test_broken_then_fixed_stylesheet() {
    let fixture = Fixture::new(CONFIG);
    let mut tracker = FailureTracker::new();

    assert!(tracker.update(&fixture.rebuild("styles")).is_empty());
    let good = fixture.read("css/site.css");

    fixture.write("less/site.less", ".site { width: @missing; }\n");
    let report = fixture.rebuild("styles");
    assert_eq!(report.failed_count(), 1);
    assert!(tracker.update(&report).is_empty());
    assert_eq!(tracker.failing_count(), 1);
    assert_eq!(fixture.read("css/site.css"), good);
    assert!(report.get("print").unwrap().is_success());

    fixture.write("less/site.less", ".site { width: 4px; }\n");
    let fixed = tracker.update(&fixture.rebuild("styles"));
    assert_eq!(fixed, vec!["style:site".to_string()]);
    assert_eq!(tracker.failing_count(), 0);
    assert_eq!(fixture.read("css/site.css"), ".site{width:4px}");
}

#[test]
fn test_zero_debounce_rebuilds_on_every_event() {
    let fixture = Fixture::new(&CONFIG.replace("debounce_ms = 100", "debounce_ms = 0"));
    assert_eq!(fixture.session.policy(), DebouncePolicy::EveryEvent);

    let mut scheduler = fixture.session.scheduler();
    let t0 = Instant::now();
    let path = fixture.source("js/app.js");

    fixture.session.on_event(&mut scheduler, &modify(path.clone()), t0);
    assert_eq!(scheduler.due_groups(t0), vec!["scripts".to_string()]);

    // Changes while building collapse into one follow-up
    fixture.session.on_event(&mut scheduler, &modify(path.clone()), t0 + ms(1));
    fixture.session.on_event(&mut scheduler, &modify(path), t0 + ms(2));
    assert!(scheduler.due_groups(t0 + ms(3)).is_empty());

    scheduler.on_finished("scripts", t0 + ms(10));
    assert_eq!(scheduler.due_groups(t0 + ms(10)), vec!["scripts".to_string()]);
    scheduler.on_finished("scripts", t0 + ms(20));
    assert_eq!(scheduler.state("scripts"), Some(GroupState::Idle));
}

#[test]
fn test_overlapping_groups_rebuild_shared_bundle_one_at_a_time() {
    let config = CONFIG.replace(
        "[[script]]",
        "[[watch.groups]]\nname = \"site\"\nglobs = [\"less/*.less\"]\nbundles = [\"style:site\"]\n\n[[script]]",
    );
    let fixture = Fixture::new(&config);
    assert_eq!(fixture.session.groups().len(), 3);
    let mut scheduler = fixture.session.scheduler();
    let t0 = Instant::now();

    let created = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(fixture.source("less/site.less"));
    let triggered: Vec<String> = fixture
        .session
        .on_event(&mut scheduler, &created, t0)
        .into_iter()
        .map(|(_, group)| group)
        .collect();
    assert_eq!(triggered, vec!["styles", "site"]);

    // Both groups include style:site, so only the first starts
    assert_eq!(scheduler.due_groups(t0 + ms(1000)), vec!["styles".to_string()]);
    assert!(matches!(scheduler.state("site"), Some(GroupState::Pending { .. })));
    assert_eq!(scheduler.next_deadline(), None);

    assert!(fixture.rebuild("styles").is_success());
    scheduler.on_finished("styles", t0 + ms(1100));
    assert_eq!(scheduler.due_groups(t0 + ms(1100)), vec!["site".to_string()]);
    assert!(fixture.rebuild("site").is_success());
    scheduler.on_finished("site", t0 + ms(1200));
    assert!(!scheduler.is_building());
}

#[test]
fn test_invalid_selector_rejected() {
    let dir = TempDir::new().unwrap();
    let config = CONFIG.replace(r#"bundles = ["script:*"]"#, r#"bundles = ["script:missing"]"#);
    let context = BuildContext::new(parse_config(&config).unwrap(), dir.path().to_path_buf()).unwrap();

    match WatchSession::new(BuildPipeline::new(context)) {
        Err(WatchError::InvalidSelector { group, .. }) => assert_eq!(group, "scripts"),
        other => panic!("expected InvalidSelector, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_glob_rejected() {
    let dir = TempDir::new().unwrap();
    let config = CONFIG.replace(r#"globs = ["js/*.js"]"#, r#"globs = ["js/[.js"]"#);
    let context = BuildContext::new(parse_config(&config).unwrap(), dir.path().to_path_buf()).unwrap();

    let err = WatchSession::new(BuildPipeline::new(context)).unwrap_err();
    assert!(matches!(err, WatchError::InvalidGlob { ref pattern, .. } if pattern == "js/[.js"));
}

#[test]
fn test_scheduler_ignores_unknown_groups() {
    let mut scheduler = Scheduler::new(DebouncePolicy::from_millis(50), ["styles"]);
    assert!(!scheduler.on_change("images", Instant::now()));
    assert_eq!(scheduler.next_deadline(), None);
}
