//! Event matching against workflow trigger declarations.
//!
//! An [`Event`] is what arrives at the engine: an event kind, the git ref it
//! concerns, and the set of changed paths. A workflow runs when its `on`
//! block declares the event kind and the ref and changed paths pass the
//! declared branch and path glob filters.

use glob::Pattern;

use crate::workflow::{TriggerFilter, Workflow};

pub use crate::workflow::EventKind;

/// An event presented to the engine for trigger evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Branch or ref the event concerns (e.g. `main`).
    pub git_ref: String,
    /// Paths changed by the event, relative to the repository root.
    pub changed_paths: Vec<String>,
}

impl Event {
    pub fn new(kind: EventKind, git_ref: &str) -> Self {
        Self {
            kind,
            git_ref: git_ref.to_string(),
            changed_paths: Vec::new(),
        }
    }

    pub fn with_changed_paths(mut self, paths: Vec<String>) -> Self {
        self.changed_paths = paths;
        self
    }
}

/// Whether the workflow is triggered by the event.
///
/// Manual dispatch ignores branch and path filters; everything else must
/// pass both.
pub fn matches(workflow: &Workflow, event: &Event) -> bool {
    let Some(filter) = workflow.on.get(event.kind) else {
        return false;
    };

    if event.kind == EventKind::WorkflowDispatch {
        return true;
    }

    branch_matches(filter, &event.git_ref) && paths_match(filter, &event.changed_paths)
}

/// Branch filter: `branches` allows only matching refs, `branches-ignore`
/// suppresses matching refs. An empty filter allows everything.
fn branch_matches(filter: &TriggerFilter, git_ref: &str) -> bool {
    if !filter.branches.is_empty() && !any_glob_match(&filter.branches, git_ref) {
        return false;
    }
    if !filter.branches_ignore.is_empty() && any_glob_match(&filter.branches_ignore, git_ref) {
        return false;
    }
    true
}

/// Path filter semantics:
/// - `paths` present: trigger only if at least one changed file matches.
/// - `paths-ignore` present: suppress only if every changed file matches
///   an ignore pattern.
fn paths_match(filter: &TriggerFilter, changed: &[String]) -> bool {
    if !filter.paths.is_empty() {
        let any_hit = changed.iter().any(|p| any_glob_match(&filter.paths, p));
        if !any_hit {
            return false;
        }
    }
    if !filter.paths_ignore.is_empty() && !changed.is_empty() {
        let all_ignored = changed
            .iter()
            .all(|p| any_glob_match(&filter.paths_ignore, p));
        if all_ignored {
            return false;
        }
    }
    true
}

fn any_glob_match(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| glob_match(p, candidate))
}

/// Check that a filter glob compiles, after the same rewriting matching
/// applies.
pub fn check_pattern(pattern: &str) -> Result<(), glob::PatternError> {
    Pattern::new(&rewrite_pattern(pattern)).map(|_| ())
}

fn rewrite_pattern(pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix("**") {
        if rest.starts_with('.') {
            return format!("**/*{}", rest);
        }
    }
    pattern.to_string()
}

/// Match one workflow glob against a candidate string.
///
/// Workflow globs treat a leading `**.ext` as "any file with that
/// extension anywhere", which `glob::Pattern` only honors with a path
/// separator, so that form is rewritten to `**/*.ext` and also tried
/// against the bare file name.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let rewritten = rewrite_pattern(pattern);

    match Pattern::new(&rewritten) {
        Ok(p) => {
            if p.matches(candidate) {
                return true;
            }
            // A bare-name pattern like "*.py" should hit files at the root.
            if rewritten.starts_with("**/") {
                if let Ok(tail) = Pattern::new(&rewritten[3..]) {
                    return tail.matches(candidate);
                }
            }
            false
        }
        // Malformed patterns never match; validation reports them.
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Workflow;

    fn workflow(on_block: &str) -> Workflow {
        let yaml = format!("on:\n{}\njobs:\n  a:\n    steps: []\n", on_block);
        Workflow::parse(&yaml).unwrap()
    }

    #[test]
    fn test_undeclared_kind_does_not_match() {
        let wf = workflow("  pull_request:");
        let event = Event::new(EventKind::Push, "main");
        assert!(!matches(&wf, &event));
    }

    #[test]
    fn test_branch_filter() {
        let wf = workflow("  pull_request:\n    branches: [main]");
        assert!(matches(
            &wf,
            &Event::new(EventKind::PullRequest, "main")
        ));
        assert!(!matches(
            &wf,
            &Event::new(EventKind::PullRequest, "develop")
        ));
    }

    #[test]
    fn test_branch_glob() {
        let wf = workflow("  push:\n    branches: [\"release/*\"]");
        assert!(matches(&wf, &Event::new(EventKind::Push, "release/1.2")));
        assert!(!matches(&wf, &Event::new(EventKind::Push, "main")));
    }

    #[test]
    fn test_branches_ignore() {
        let wf = workflow("  push:\n    branches-ignore: [\"wip/*\"]");
        assert!(matches(&wf, &Event::new(EventKind::Push, "main")));
        assert!(!matches(&wf, &Event::new(EventKind::Push, "wip/scratch")));
    }

    #[test]
    fn test_paths_filter_requires_a_hit() {
        let wf = workflow("  pull_request:\n    paths: [\"**.py\", \"pyproject.toml\"]");

        let hit = Event::new(EventKind::PullRequest, "main")
            .with_changed_paths(vec!["pkg/base/datalayer.py".to_string()]);
        assert!(matches(&wf, &hit));

        let root_hit = Event::new(EventKind::PullRequest, "main")
            .with_changed_paths(vec!["pyproject.toml".to_string()]);
        assert!(matches(&wf, &root_hit));

        let miss = Event::new(EventKind::PullRequest, "main")
            .with_changed_paths(vec!["docs/index.md".to_string()]);
        assert!(!matches(&wf, &miss));
    }

    #[test]
    fn test_paths_filter_empty_changeset_does_not_trigger() {
        let wf = workflow("  pull_request:\n    paths: [\"**.py\"]");
        let event = Event::new(EventKind::PullRequest, "main");
        assert!(!matches(&wf, &event));
    }

    #[test]
    fn test_paths_ignore_suppresses_only_when_all_ignored() {
        let wf = workflow("  push:\n    paths-ignore: [\"docs/**\"]");

        let all_docs = Event::new(EventKind::Push, "main")
            .with_changed_paths(vec!["docs/a.md".to_string(), "docs/b.md".to_string()]);
        assert!(!matches(&wf, &all_docs));

        let mixed = Event::new(EventKind::Push, "main")
            .with_changed_paths(vec!["docs/a.md".to_string(), "src/lib.rs".to_string()]);
        assert!(matches(&wf, &mixed));
    }

    #[test]
    fn test_dispatch_ignores_filters() {
        let wf = workflow("  workflow_dispatch:\n  pull_request:\n    branches: [main]");
        let event = Event::new(EventKind::WorkflowDispatch, "anything");
        assert!(matches(&wf, &event));
    }

    #[test]
    fn test_glob_match_double_star_extension() {
        assert!(glob_match("**.py", "a/b/c.py"));
        assert!(glob_match("**.py", "top.py"));
        assert!(!glob_match("**.py", "a/b/c.rs"));
    }
}
