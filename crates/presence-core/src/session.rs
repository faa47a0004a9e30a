//! Login/logout derivation by diffing the names seen in consecutive ticks.

/// Names that appeared and disappeared between two ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiff {
    /// Present now, absent last tick. First-appearance order, no duplicates.
    pub logins: Vec<String>,
    /// Present last tick, absent now. In last tick's order.
    pub logouts: Vec<String>,
}

impl SessionDiff {
    pub fn is_empty(&self) -> bool {
        self.logins.is_empty() && self.logouts.is_empty()
    }
}

/// Ordered set of names with duplicates and empty names removed.
fn name_set<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut set: Vec<String> = Vec::new();
    for name in names {
        if !name.is_empty() && !set.iter().any(|n| n == name) {
            set.push(name.to_string());
        }
    }
    set
}

/// Set difference `current \ previous` over deduplicated names.
pub fn diff(current: &[String], previous: &[String]) -> SessionDiff {
    let current = name_set(current.iter().map(String::as_str));
    let previous = name_set(previous.iter().map(String::as_str));

    SessionDiff {
        logins: current
            .iter()
            .filter(|n| !previous.contains(n))
            .cloned()
            .collect(),
        logouts: previous
            .iter()
            .filter(|n| !current.contains(n))
            .cloned()
            .collect(),
    }
}

/// Remembers who was present last tick.
#[derive(Debug, Clone, Default)]
pub struct SessionDiffer {
    previous: Vec<String>,
}

impl SessionDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff this tick's names against the last tick, then remember this tick.
    ///
    /// The remembered set is replaced on every call, even when nothing changed.
    pub fn observe(&mut self, current: &[String]) -> SessionDiff {
        let result = diff(current, &self.previous);
        self.previous = name_set(current.iter().map(String::as_str));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_login_and_logout() {
        let d = diff(&names(&["A", "B"]), &names(&["B", "C"]));
        assert_eq!(d.logins, names(&["A"]));
        assert_eq!(d.logouts, names(&["C"]));
    }

    #[test]
    fn test_diff_is_repeatable() {
        let current = names(&["A", "B"]);
        let previous = names(&["B", "C"]);
        assert_eq!(diff(&current, &previous), diff(&current, &previous));
    }

    #[test]
    fn test_duplicate_current_names_login_once() {
        let d = diff(&names(&["A", "A", "B", "B"]), &names(&["A"]));
        assert_eq!(d.logins, names(&["B"]));
        assert!(d.logouts.is_empty());
    }

    #[test]
    fn test_empty_names_are_ignored() {
        let d = diff(&names(&["", "A"]), &names(&[""]));
        assert_eq!(d.logins, names(&["A"]));
        assert!(d.logouts.is_empty());
    }

    #[test]
    fn test_differ_tracks_previous_tick() {
        let mut differ = SessionDiffer::new();

        let first = differ.observe(&names(&["A", "A"]));
        assert_eq!(first.logins, names(&["A"]));
        assert_eq!(differ.previous, names(&["A"]).as_slice());

        let unchanged = differ.observe(&names(&["A"]));
        assert!(unchanged.is_empty());

        let swap = differ.observe(&names(&["unknown"]));
        assert_eq!(swap.logins, names(&["unknown"]));
        assert_eq!(swap.logouts, names(&["A"]));

        let gone = differ.observe(&[]);
        assert_eq!(gone.logouts, names(&["unknown"]));
        assert!(differ.previous.is_empty());
    }
}
