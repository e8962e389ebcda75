//! Debounced rebuild scheduling.
//!
//! [`Scheduler`] is a pure state machine over watch groups. It never reads
//! the clock or the filesystem; callers pass `now` in, which keeps every
//! timing rule testable with synthetic instants.

use std::time::{Duration, Instant};

/// How change events map to rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebouncePolicy {
    /// Wait until no event has arrived for the window, then rebuild once
    Debounced(Duration),
    /// Rebuild as soon as the group is not already building
    EveryEvent,
}

impl DebouncePolicy {
    /// Policy for a configured window; `0` means [`DebouncePolicy::EveryEvent`].
    pub fn from_millis(ms: u32) -> Self {
        if ms == 0 {
            DebouncePolicy::EveryEvent
        } else {
            DebouncePolicy::Debounced(Duration::from_millis(u64::from(ms)))
        }
    }

    fn window(&self) -> Duration {
        match self {
            DebouncePolicy::Debounced(window) => *window,
            DebouncePolicy::EveryEvent => Duration::ZERO,
        }
    }
}

/// Rebuild state of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Nothing scheduled
    Idle,
    /// A rebuild will start once `due` has passed
    Pending {
        /// Earliest start time
        due: Instant,
    },
    /// A rebuild is running
    Building {
        /// Another change arrived while building
        rerun: bool,
    },
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    state: GroupState,
    bundles: Vec<String>,
}

impl Entry {
    fn shares_bundle(&self, other: &Entry) -> bool {
        self.bundles.iter().any(|b| other.bundles.contains(b))
    }
}

/// Per-group debounce state machine.
///
/// At most one rebuild per group is in flight; changes that arrive during a
/// rebuild collapse into a single follow-up. A due group that shares a
/// bundle with a building group waits until that build finishes.
#[derive(Debug, Clone)]
pub struct Scheduler {
    policy: DebouncePolicy,
    groups: Vec<Entry>,
}

impl Scheduler {
    /// Create a scheduler with every group idle.
    pub fn new<I, S>(policy: DebouncePolicy, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_bundles(policy, groups.into_iter().map(|g| (g, Vec::new())))
    }

    /// Create a scheduler whose groups rebuild the given bundles.
    ///
    /// Groups listing a common bundle never build at the same time.
    pub fn with_bundles<I, S>(policy: DebouncePolicy, groups: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: Into<String>,
    {
        let groups = groups
            .into_iter()
            .map(|(name, bundles)| Entry { name: name.into(), state: GroupState::Idle, bundles })
            .collect();
        Self { policy, groups }
    }

    /// The active policy.
    pub fn policy(&self) -> DebouncePolicy {
        self.policy
    }

    /// Current state of `group`.
    pub fn state(&self, group: &str) -> Option<GroupState> {
        self.groups.iter().find(|e| e.name == group).map(|e| e.state)
    }

    /// Record a change affecting `group`. Returns `false` for unknown groups.
    pub fn on_change(&mut self, group: &str, now: Instant) -> bool {
        let policy = self.policy;
        let due = now + policy.window();
        let Some(state) = self.state_mut(group) else {
            return false;
        };

        *state = match *state {
            GroupState::Idle => GroupState::Pending { due },
            GroupState::Pending { due: old } => match policy {
                DebouncePolicy::Debounced(_) => GroupState::Pending { due },
                DebouncePolicy::EveryEvent => GroupState::Pending { due: old },
            },
            GroupState::Building { .. } => GroupState::Building { rerun: true },
        };
        true
    }

    /// Move every pending group whose deadline has passed to building and
    /// return their names, in group order.
    ///
    /// A group sharing a bundle with a building group, including one started
    /// by this call, stays pending.
    pub fn due_groups(&mut self, now: Instant) -> Vec<String> {
        let mut due = Vec::new();
        for i in 0..self.groups.len() {
            if !matches!(self.groups[i].state, GroupState::Pending { due: at } if at <= now) {
                continue;
            }
            if self.is_blocked(i) {
                continue;
            }
            self.groups[i].state = GroupState::Building { rerun: false };
            due.push(self.groups[i].name.clone());
        }
        due
    }

    /// Record that the rebuild of `group` finished.
    ///
    /// A change seen during the rebuild schedules exactly one follow-up.
    pub fn on_finished(&mut self, group: &str, now: Instant) {
        let due = now + self.policy.window();
        if let Some(state) = self.state_mut(group) {
            *state = match *state {
                GroupState::Building { rerun: true } => GroupState::Pending { due },
                GroupState::Building { rerun: false } => GroupState::Idle,
                other => other,
            };
        }
    }

    /// Earliest deadline among pending groups that could start.
    ///
    /// Groups held back by an overlapping build are left out; they become
    /// eligible when that build reports [`Scheduler::on_finished`].
    pub fn next_deadline(&self) -> Option<Instant> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry.state {
                GroupState::Pending { due } if !self.is_blocked(i) => Some(due),
                _ => None,
            })
            .min()
    }

    /// Whether any group is currently building.
    pub fn is_building(&self) -> bool {
        self.groups.iter().any(|e| matches!(e.state, GroupState::Building { .. }))
    }

    /// Whether another group sharing a bundle with group `index` is building.
    fn is_blocked(&self, index: usize) -> bool {
        let entry = &self.groups[index];
        self.groups.iter().enumerate().any(|(j, other)| {
            j != index && matches!(other.state, GroupState::Building { .. }) && entry.shares_bundle(other)
        })
    }

    fn state_mut(&mut self, group: &str) -> Option<&mut GroupState> {
        self.groups.iter_mut().find(|e| e.name == group).map(|e| &mut e.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn debounced() -> Scheduler {
        Scheduler::new(DebouncePolicy::Debounced(WINDOW), ["styles", "scripts"])
    }

    #[test]
    fn test_policy_from_millis() {
        assert_eq!(DebouncePolicy::from_millis(0), DebouncePolicy::EveryEvent);
        assert_eq!(DebouncePolicy::from_millis(250), DebouncePolicy::Debounced(ms(250)));
    }

    #[test]
    fn test_single_change_builds_once_after_window() {
        let t0 = Instant::now();
        let mut s = debounced();
        assert!(s.on_change("styles", t0));
        assert_eq!(s.state("styles"), Some(GroupState::Pending { due: t0 + WINDOW }));

        assert!(s.due_groups(t0 + ms(50)).is_empty());
        assert_eq!(s.due_groups(t0 + WINDOW), vec!["styles".to_string()]);
        assert_eq!(s.state("styles"), Some(GroupState::Building { rerun: false }));

        s.on_finished("styles", t0 + ms(300));
        assert_eq!(s.state("styles"), Some(GroupState::Idle));
        assert!(s.due_groups(t0 + ms(1000)).is_empty());
    }

    #[test]
    fn test_rapid_changes_coalesce() {
        let t0 = Instant::now();
        let mut s = debounced();
        for i in 0..10 {
            s.on_change("styles", t0 + ms(i * 20));
        }
        let last = t0 + ms(180);
        assert!(s.due_groups(last + ms(99)).is_empty());
        assert_eq!(s.next_deadline(), Some(last + WINDOW));
        assert_eq!(s.due_groups(last + WINDOW).len(), 1);
        assert!(s.due_groups(last + ms(500)).is_empty());
    }

    #[test]
    fn test_change_during_build_queues_one_rerun() {
        let t0 = Instant::now();
        let mut s = debounced();
        s.on_change("styles", t0);
        s.due_groups(t0 + WINDOW);

        s.on_change("styles", t0 + ms(120));
        s.on_change("styles", t0 + ms(130));
        assert_eq!(s.state("styles"), Some(GroupState::Building { rerun: true }));
        assert!(s.due_groups(t0 + ms(1000)).is_empty(), "no concurrent rebuild of a building group");

        let done = t0 + ms(200);
        s.on_finished("styles", done);
        assert_eq!(s.state("styles"), Some(GroupState::Pending { due: done + WINDOW }));
        assert_eq!(s.due_groups(done + WINDOW), vec!["styles".to_string()]);
        s.on_finished("styles", done + ms(300));
        assert_eq!(s.state("styles"), Some(GroupState::Idle));
    }

    #[test]
    fn test_groups_are_independent() {
        let t0 = Instant::now();
        let mut s = debounced();
        s.on_change("styles", t0);
        s.on_change("scripts", t0 + ms(60));

        assert_eq!(s.due_groups(t0 + WINDOW), vec!["styles".to_string()]);
        assert_eq!(s.next_deadline(), Some(t0 + ms(160)));
        assert_eq!(s.due_groups(t0 + ms(160)), vec!["scripts".to_string()]);
        assert!(s.is_building());
    }

    #[test]
    fn test_due_groups_in_group_order() {
        let t0 = Instant::now();
        let mut s = debounced();
        s.on_change("scripts", t0);
        s.on_change("styles", t0);
        assert_eq!(s.due_groups(t0 + WINDOW), vec!["styles".to_string(), "scripts".to_string()]);
    }

    #[test]
    fn test_every_event_policy() {
        let t0 = Instant::now();
        let mut s = Scheduler::new(DebouncePolicy::EveryEvent, ["styles"]);

        s.on_change("styles", t0);
        assert_eq!(s.due_groups(t0), vec!["styles".to_string()]);

        for i in 1..5 {
            s.on_change("styles", t0 + ms(i));
        }
        assert!(s.due_groups(t0 + ms(10)).is_empty());

        s.on_finished("styles", t0 + ms(20));
        assert_eq!(s.due_groups(t0 + ms(20)), vec!["styles".to_string()]);
        s.on_finished("styles", t0 + ms(40));
        assert_eq!(s.state("styles"), Some(GroupState::Idle));
    }

    #[test]
    fn test_every_event_keeps_earliest_deadline() {
        let t0 = Instant::now();
        let mut s = Scheduler::new(DebouncePolicy::EveryEvent, ["styles"]);
        s.on_change("styles", t0);
        s.on_change("styles", t0 + ms(5));
        assert_eq!(s.next_deadline(), Some(t0));
    }

    fn overlapping() -> Scheduler {
        Scheduler::with_bundles(
            DebouncePolicy::Debounced(WINDOW),
            [
                ("styles", vec!["style:site".to_string(), "style:print".to_string()]),
                ("site", vec!["style:site".to_string()]),
                ("scripts", vec!["script:site".to_string()]),
            ],
        )
    }

    #[test]
    fn test_overlapping_groups_never_build_together() {
        let t0 = Instant::now();
        let mut s = overlapping();
        for group in ["styles", "site", "scripts"] {
            s.on_change(group, t0);
        }

        assert_eq!(s.due_groups(t0 + WINDOW), vec!["styles".to_string(), "scripts".to_string()]);
        assert_eq!(s.state("site"), Some(GroupState::Pending { due: t0 + WINDOW }));
        assert_eq!(s.next_deadline(), None, "held-back group has no deadline to wait for");
        assert!(s.due_groups(t0 + ms(500)).is_empty());

        s.on_finished("styles", t0 + ms(300));
        assert_eq!(s.next_deadline(), Some(t0 + WINDOW));
        assert_eq!(s.due_groups(t0 + ms(300)), vec!["site".to_string()]);
        assert!(s.due_groups(t0 + ms(300)).is_empty());
    }

    #[test]
    fn test_held_back_group_blocks_rerun_of_overlapping_group() {
        let t0 = Instant::now();
        let mut s = overlapping();
        s.on_change("site", t0);
        s.due_groups(t0 + WINDOW);

        s.on_change("styles", t0 + ms(110));
        assert!(s.due_groups(t0 + ms(400)).is_empty());
        s.on_finished("site", t0 + ms(500));
        assert_eq!(s.due_groups(t0 + ms(500)), vec!["styles".to_string()]);
        assert_eq!(s.state("site"), Some(GroupState::Idle));
    }

    #[test]
    fn test_unknown_group() {
        let mut s = debounced();
        assert!(!s.on_change("images", Instant::now()));
        assert_eq!(s.state("images"), None);
        s.on_finished("images", Instant::now());
    }

    #[test]
    fn test_finished_while_idle_is_noop() {
        let mut s = debounced();
        s.on_finished("styles", Instant::now());
        assert_eq!(s.state("styles"), Some(GroupState::Idle));
        assert_eq!(s.next_deadline(), None);
    }
}
