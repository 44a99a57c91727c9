//! Build-wide environment accumulated from `ENV` directives.

/// Ordered `KEY=VALUE` assignments seen so far in one build.
///
/// Owned by the build context and replaced, never mutated in place: each
/// `ENV` produces a new value via [`BuildEnv::with`]. Two builds in the same
/// process therefore never see each other's assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    assignments: Vec<String>,
}

impl BuildEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this environment with `assignment` appended.
    ///
    /// The `KEY value` form is normalized to `KEY=value`.
    pub fn with(&self, assignment: &str) -> Self {
        let mut assignments = self.assignments.clone();
        assignments.push(normalize(assignment));
        Self { assignments }
    }

    pub fn assignments(&self) -> &[String] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Single-line shell prefix exporting every assignment, e.g.
    /// `export A=1 B=2`. None when nothing has been assigned.
    pub fn export_prefix(&self) -> Option<String> {
        if self.assignments.is_empty() {
            return None;
        }
        Some(format!("export {}", self.assignments.join(" ")))
    }

    /// One `export KEY=VALUE` line per well-formed assignment.
    pub fn export_lines(&self) -> Vec<String> {
        self.assignments
            .iter()
            .filter(|a| a.contains('='))
            .map(|a| format!("export {}", a))
            .collect()
    }
}

fn normalize(assignment: &str) -> String {
    let assignment = assignment.trim();
    match assignment.split_once(char::is_whitespace) {
        Some((key, value)) if !key.contains('=') => format!("{}={}", key, value.trim()),
        _ => assignment.to_string(),
    }
}
