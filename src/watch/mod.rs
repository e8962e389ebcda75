//! Watch mode for automatic rebuilds on file changes
//!
//! Each configured watch group pairs source globs with a bundle selector.
//! Filesystem events are matched against the globs, debounced per group by
//! the [`Scheduler`], and the group's bundles are rebuilt on a worker
//! thread. A failing rebuild is reported and the session keeps watching.

pub mod scheduler;

pub use scheduler::{DebouncePolicy, GroupState, Scheduler};

use crate::build::progress::ProgressEvent;
use crate::build::{BuildPipeline, BuildReport};
use crate::config::WatchGroupConfig;
use crate::error::BuildError;
use crate::registry::{BundleId, BundleRegistry};
use glob::{MatchOptions, Pattern};
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Error starting or running a watch session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// The platform watcher could not be created
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// A directory could not be watched
    #[error("failed to watch {}: {source}", .path.display())]
    WatchPath {
        /// Directory that failed
        path: PathBuf,
        /// Underlying watcher error
        source: notify::Error,
    },
    /// A group glob does not parse
    #[error("watch group '{group}': invalid glob '{pattern}': {source}")]
    InvalidGlob {
        /// Group the glob belongs to
        group: String,
        /// The glob as configured
        pattern: String,
        /// Parse error
        source: glob::PatternError,
    },
    /// A group's bundle selector names no bundle
    #[error("watch group '{group}': {source}")]
    InvalidSelector {
        /// Group the selector belongs to
        group: String,
        /// Resolution error
        source: BuildError,
    },
    /// The event channel closed unexpectedly
    #[error("watch channel closed")]
    ChannelClosed,
}

/// A watch group resolved against the source root and the registry.
#[derive(Debug, Clone)]
pub struct WatchGroup {
    /// Group name
    pub name: String,
    /// Absolute glob patterns
    pub patterns: Vec<Pattern>,
    /// Directories to subscribe to, with their recursion mode
    pub roots: Vec<(PathBuf, RecursiveMode)>,
    /// Bundles rebuilt when the group fires, in registry order
    pub bundles: Vec<BundleId>,
}

impl WatchGroup {
    /// Resolve a configured group.
    pub fn from_config(
        config: &WatchGroupConfig,
        source_root: &Path,
        registry: &BundleRegistry,
    ) -> Result<Self, WatchError> {
        let root_pattern = Pattern::escape(&source_root.to_string_lossy());
        let mut patterns = Vec::with_capacity(config.globs.len());
        let mut roots: Vec<(PathBuf, RecursiveMode)> = Vec::new();

        for glob in &config.globs {
            let full = format!("{}/{}", root_pattern.trim_end_matches('/'), glob.trim_start_matches("./"));
            let pattern = Pattern::new(&full).map_err(|source| WatchError::InvalidGlob {
                group: config.name.clone(),
                pattern: glob.clone(),
                source,
            })?;
            patterns.push(pattern);

            let (base, mode) = base_dir(glob);
            add_root(&mut roots, source_root.join(base), mode);
        }

        let bundles = registry.select(&config.bundles).map_err(|source| WatchError::InvalidSelector {
            group: config.name.clone(),
            source,
        })?;

        Ok(Self { name: config.name.clone(), patterns, roots, bundles })
    }

    /// Whether `path` matches any of the group's globs.
    pub fn matches(&self, path: &Path) -> bool {
        let options = MatchOptions { require_literal_separator: true, ..MatchOptions::new() };
        self.patterns.iter().any(|p| p.matches_path_with(path, options))
    }
}

/// Split a glob into the directory above its first wildcard and whether
/// the rest of the glob can descend into subdirectories.
pub fn base_dir(glob: &str) -> (PathBuf, RecursiveMode) {
    let parts: Vec<&str> = glob.trim_start_matches("./").split('/').collect();
    let wild = parts.iter().position(|p| p.contains(['*', '?', '[', '{']));

    match wild {
        Some(i) => {
            let rest = &parts[i..];
            let mode = if rest.len() > 1 || rest.contains(&"**") {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            (parts[..i].iter().collect(), mode)
        }
        None => {
            let parent = &parts[..parts.len().saturating_sub(1)];
            (parent.iter().collect(), RecursiveMode::NonRecursive)
        }
    }
}

fn add_root(roots: &mut Vec<(PathBuf, RecursiveMode)>, path: PathBuf, mode: RecursiveMode) {
    match roots.iter_mut().find(|(p, _)| *p == path) {
        Some(existing) => {
            if mode == RecursiveMode::Recursive {
                existing.1 = RecursiveMode::Recursive;
            }
        }
        None => roots.push((path, mode)),
    }
}

/// Tracks bundles that failed so a later success can be reported as fixed.
#[derive(Debug, Default)]
pub struct FailureTracker {
    failing: HashSet<String>,
}

impl FailureTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report and return the bundles it fixed.
    pub fn update(&mut self, report: &BuildReport) -> Vec<String> {
        let mut fixed = Vec::new();
        for result in &report.results {
            if result.is_success() {
                if self.failing.remove(&result.bundle) {
                    fixed.push(result.bundle.clone());
                }
            } else {
                self.failing.insert(result.bundle.clone());
            }
        }
        fixed
    }

    /// Number of bundles currently failing.
    pub fn failing_count(&self) -> usize {
        self.failing.len()
    }
}

enum Message {
    Fs(notify::Result<notify::Event>),
    Finished { group: String, report: BuildReport },
}

/// A running watch: groups, debounce policy and the pipeline they rebuild with.
#[derive(Debug)]
pub struct WatchSession {
    pipeline: BuildPipeline,
    groups: Vec<WatchGroup>,
    policy: DebouncePolicy,
    clear_screen: bool,
    outputs: HashSet<PathBuf>,
    failures: FailureTracker,
}

impl WatchSession {
    /// Resolve the pipeline's watch configuration.
    pub fn new(pipeline: BuildPipeline) -> Result<Self, WatchError> {
        let context = pipeline.context();
        let watch = &context.config().watch;
        let source_root = context.source_root();
        let source_root = fs::canonicalize(&source_root).unwrap_or(source_root);

        let groups = watch
            .groups
            .iter()
            .map(|g| WatchGroup::from_config(g, &source_root, context.registry()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs = HashSet::new();
        for path in context.registry().output_paths() {
            if let (Some(dir), Some(name)) = (path.parent(), path.file_name()) {
                if let Ok(dir) = fs::canonicalize(dir) {
                    outputs.insert(dir.join(name));
                }
            }
            outputs.insert(path);
        }

        Ok(Self {
            policy: DebouncePolicy::from_millis(watch.debounce_ms),
            clear_screen: watch.clear_screen,
            pipeline,
            groups,
            outputs,
            failures: FailureTracker::new(),
        })
    }

    /// The resolved groups.
    pub fn groups(&self) -> &[WatchGroup] {
        &self.groups
    }

    /// The debounce policy in effect.
    pub fn policy(&self) -> DebouncePolicy {
        self.policy
    }

    /// A scheduler over this session's groups.
    ///
    /// Groups that select a common bundle are serialized by the scheduler.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::with_bundles(
            self.policy,
            self.groups
                .iter()
                .map(|g| (g.name.clone(), g.bundles.iter().map(|id| id.to_string()).collect())),
        )
    }

    /// Names of the groups a change to `path` triggers.
    ///
    /// Paths the pipeline itself writes never trigger a group.
    pub fn groups_for(&self, path: &Path) -> Vec<&str> {
        if self.outputs.contains(path) {
            return Vec::new();
        }
        self.groups.iter().filter(|g| g.matches(path)).map(|g| g.name.as_str()).collect()
    }

    /// Feed one filesystem event to `scheduler`; returns the
    /// `(path, group)` pairs it scheduled.
    pub fn on_event(&self, scheduler: &mut Scheduler, event: &notify::Event, now: Instant) -> Vec<(PathBuf, String)> {
        if matches!(event.kind, EventKind::Access(_)) {
            return Vec::new();
        }

        let mut triggered = Vec::new();
        for path in &event.paths {
            for group in self.groups_for(path) {
                if scheduler.on_change(group, now) {
                    triggered.push((path.clone(), group.to_string()));
                }
            }
        }
        triggered
    }

    /// Every bundle any group rebuilds, in registry order.
    pub fn watched_bundles(&self) -> Vec<String> {
        let wanted: HashSet<&BundleId> = self.groups.iter().flat_map(|g| g.bundles.iter()).collect();
        self.pipeline
            .context()
            .registry()
            .ids()
            .into_iter()
            .filter(|id| wanted.contains(id))
            .map(|id| id.to_string())
            .collect()
    }

    /// Build every watched bundle, then rebuild groups as their sources change.
    ///
    /// Only returns on a watcher error.
    pub fn run(mut self) -> Result<(), WatchError> {
        let (tx, rx) = mpsc::channel();
        let fs_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(Message::Fs(res));
        })
        .map_err(WatchError::WatcherInit)?;

        let mut roots: Vec<(PathBuf, RecursiveMode)> = Vec::new();
        for group in &self.groups {
            for (root, mode) in &group.roots {
                add_root(&mut roots, root.clone(), *mode);
            }
        }
        for (root, mode) in &roots {
            watcher
                .watch(root, *mode)
                .map_err(|source| WatchError::WatchPath { path: root.clone(), source })?;
            debug!(root = %root.display(), recursive = (*mode == RecursiveMode::Recursive), "watching");
        }

        if self.clear_screen {
            clear_screen();
        }
        let initial = self.pipeline.build_all(&self.watched_bundles());
        self.failures.update(&initial);

        let progress = self.pipeline.progress().clone();
        let root_names: Vec<String> = roots.iter().map(|(r, _)| r.display().to_string()).collect();
        progress.report(ProgressEvent::Watching { roots: root_names.clone() });

        let mut scheduler = self.scheduler();
        loop {
            let message = match scheduler.next_deadline() {
                Some(deadline) => match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return Err(WatchError::ChannelClosed),
                },
                None => Some(rx.recv().map_err(|_| WatchError::ChannelClosed)?),
            };

            match message {
                Some(Message::Fs(Ok(event))) => {
                    for (path, group) in self.on_event(&mut scheduler, &event, Instant::now()) {
                        progress.report(ProgressEvent::Changed { path: path.display().to_string(), group });
                    }
                }
                Some(Message::Fs(Err(e))) => {
                    warn!(error = %e, "watch error");
                    progress.report(ProgressEvent::Warning {
                        bundle: None,
                        message: format!("watch error: {}", e),
                    });
                }
                Some(Message::Finished { group, report }) => {
                    for bundle in self.failures.update(&report) {
                        progress.report(ProgressEvent::Fixed { bundle });
                    }
                    scheduler.on_finished(&group, Instant::now());
                    if !scheduler.is_building() && scheduler.next_deadline().is_none() {
                        progress.report(ProgressEvent::Watching { roots: root_names.clone() });
                    }
                }
                None => {}
            }

            for group in scheduler.due_groups(Instant::now()) {
                self.spawn_rebuild(group, tx.clone());
            }
        }
    }

    fn spawn_rebuild(&self, group: String, tx: Sender<Message>) {
        let bundles: Vec<String> = self
            .groups
            .iter()
            .find(|g| g.name == group)
            .map(|g| g.bundles.iter().map(|id| id.to_string()).collect())
            .unwrap_or_default();

        if self.clear_screen {
            clear_screen();
        }
        self.pipeline.progress().report(ProgressEvent::RebuildStarted { group: group.clone() });

        let pipeline = self.pipeline.clone();
        thread::spawn(move || {
            let report = pipeline.build_all(&bundles);
            let _ = tx.send(Message::Finished { group, report });
        });
    }
}

/// Clear the terminal screen
fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildContext, BuildResult};
    use crate::config::{default_config, AssetsConfig};
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn session(config: AssetsConfig, root: &Path) -> WatchSession {
        let pipeline = BuildPipeline::new(BuildContext::new(config, root.to_path_buf()).unwrap());
        WatchSession::new(pipeline).unwrap()
    }

    fn modify(path: PathBuf) -> notify::Event {
        notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path)
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(base_dir("less/*.less"), (PathBuf::from("less"), RecursiveMode::NonRecursive));
        assert_eq!(base_dir("./js/*.js"), (PathBuf::from("js"), RecursiveMode::NonRecursive));
        assert_eq!(base_dir("less/**/*.less"), (PathBuf::from("less"), RecursiveMode::Recursive));
        assert_eq!(base_dir("*.js"), (PathBuf::new(), RecursiveMode::NonRecursive));
        assert_eq!(base_dir("a/*/b.js"), (PathBuf::from("a"), RecursiveMode::Recursive));
        assert_eq!(base_dir("js/main.js"), (PathBuf::from("js"), RecursiveMode::NonRecursive));
    }

    #[test]
    fn test_group_matching() {
        let registry = BundleRegistry::from_config(&default_config(), Path::new("/p")).unwrap();
        let config = WatchGroupConfig {
            name: "styles".to_string(),
            globs: vec!["less/*.less".to_string()],
            bundles: vec!["style:*".to_string()],
        };
        let group = WatchGroup::from_config(&config, Path::new("/p/static"), &registry).unwrap();

        assert!(group.matches(Path::new("/p/static/less/site.less")));
        assert!(!group.matches(Path::new("/p/static/less/sub/site.less")));
        assert!(!group.matches(Path::new("/p/static/js/site.js")));
        assert_eq!(group.roots, vec![(PathBuf::from("/p/static/less"), RecursiveMode::NonRecursive)]);
        assert_eq!(group.bundles.len(), 4);
    }

    #[test]
    fn test_invalid_glob() {
        let registry = BundleRegistry::default();
        let config = WatchGroupConfig {
            name: "bad".to_string(),
            globs: vec!["less/[.less".to_string()],
            bundles: vec![],
        };
        let err = WatchGroup::from_config(&config, Path::new("/p"), &registry).unwrap_err();
        assert!(matches!(err, WatchError::InvalidGlob { ref group, .. } if group == "bad"));
    }

    #[test]
    fn test_invalid_selector() {
        let registry = BundleRegistry::default();
        let config = WatchGroupConfig {
            name: "g".to_string(),
            globs: vec!["*.js".to_string()],
            bundles: vec!["nope".to_string()],
        };
        let err = WatchGroup::from_config(&config, Path::new("/p"), &registry).unwrap_err();
        assert_eq!(err.to_string(), "watch group 'g': unknown bundle 'nope'");
    }

    #[test]
    fn test_outputs_never_trigger() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("static/less")).unwrap();
        let mut config = default_config();
        config.paths.source_root = PathBuf::from("static");
        config.paths.style_out = PathBuf::from("static/less");
        config.styles[0].output = "generated.less".to_string();
        let session = session(config, dir.path());

        let root = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(session.groups_for(&root.join("static/less/site.less")), vec!["styles"]);
        assert!(session.groups_for(&root.join("static/less/generated.less")).is_empty());
    }

    #[test]
    fn test_on_event_schedules_groups() {
        let dir = TempDir::new().unwrap();
        let mut config = default_config();
        config.paths.source_root = PathBuf::from(".");
        let session = session(config, dir.path());
        let root = fs::canonicalize(dir.path()).unwrap();
        let mut scheduler = session.scheduler();
        let now = Instant::now();

        let triggered = session.on_event(&mut scheduler, &modify(root.join("less/site.less")), now);
        assert_eq!(triggered, vec![(root.join("less/site.less"), "styles".to_string())]);
        assert_eq!(scheduler.state("styles"), Some(GroupState::Pending { due: now + Duration::from_millis(100) }));
        assert_eq!(scheduler.state("scripts"), Some(GroupState::Idle));

        let created = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(root.join("js/new.js"));
        assert_eq!(session.on_event(&mut scheduler, &created, now).len(), 1);
    }

    #[test]
    fn test_access_events_ignored() {
        let dir = TempDir::new().unwrap();
        let mut config = default_config();
        config.paths.source_root = PathBuf::from(".");
        let session = session(config, dir.path());
        let root = fs::canonicalize(dir.path()).unwrap();
        let mut scheduler = session.scheduler();

        let event = notify::Event::new(EventKind::Access(AccessKind::Read)).add_path(root.join("less/site.less"));
        assert!(session.on_event(&mut scheduler, &event, Instant::now()).is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_zero_debounce_is_every_event() {
        let dir = TempDir::new().unwrap();
        let mut config = default_config();
        config.watch.debounce_ms = 0;
        assert_eq!(session(config, dir.path()).policy(), DebouncePolicy::EveryEvent);
    }

    #[test]
    fn test_watched_bundles_in_registry_order() {
        let dir = TempDir::new().unwrap();
        let session = session(default_config(), dir.path());
        let bundles = session.watched_bundles();
        assert_eq!(bundles.len(), 7);
        assert_eq!(bundles[0], "script:scielo-bundle");
        assert_eq!(bundles[3], "style:scielo-bundle");
    }

    #[test]
    fn test_failure_tracker_reports_fixed() {
        let id = BundleId::parse("style:site").unwrap();
        let mut tracker = FailureTracker::new();

        let mut failed = BuildReport::new();
        failed.add_result(BuildResult::failed("style:site", BuildError::UnknownBundle("x".to_string()), Duration::ZERO));
        assert!(tracker.update(&failed).is_empty());
        assert_eq!(tracker.failing_count(), 1);

        let mut fixed = BuildReport::new();
        fixed.add_result(BuildResult::success(id, PathBuf::from("site.css"), None, Duration::ZERO));
        assert_eq!(tracker.update(&fixed), vec!["style:site".to_string()]);
        assert_eq!(tracker.failing_count(), 0);
        assert!(tracker.update(&fixed).is_empty());
    }
}
