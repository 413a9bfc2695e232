// Readiness Tracker
// Process-wide map of unit name to "has acknowledged initialization"

use std::collections::HashMap;

/// Tracks which units have acknowledged their most recent `Init`.
///
/// Flags start false, flip true on `Inited`, and only go back to
/// false when a caller re-sends `Init` with different mode flags
/// (`mark_pending`). A run issued in that window is rejected until
/// the fresh `Inited` arrives.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    units: HashMap<String, bool>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configured unit, initially not ready.
    pub fn register(&mut self, name: impl Into<String>) {
        self.units.insert(name.into(), false);
    }

    /// Record an `Inited` from `name`. Returns false for a unit that
    /// was never registered.
    pub fn mark_ready(&mut self, name: &str) -> bool {
        match self.units.get_mut(name) {
            Some(flag) => {
                *flag = true;
                true
            }
            None => false,
        }
    }

    /// Reset a unit to not-ready while a re-`Init` is in flight.
    pub fn mark_pending(&mut self, name: &str) {
        if let Some(flag) = self.units.get_mut(name) {
            *flag = false;
        }
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.units.get(name).copied().unwrap_or(false)
    }

    /// All of the given units are ready.
    pub fn all_ready<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names.into_iter().all(|n| self.is_ready(n))
    }

    /// The subset of the given units that is not ready, for error
    /// reporting.
    pub fn not_ready<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        names
            .into_iter()
            .filter(|n| !self.is_ready(n))
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_start_not_ready() {
        let mut tracker = ReadinessTracker::new();
        tracker.register("qbsp");

        assert!(!tracker.is_ready("qbsp"));
        assert!(tracker.mark_ready("qbsp"));
        assert!(tracker.is_ready("qbsp"));
    }

    #[test]
    fn test_unregistered_unit_is_rejected() {
        let mut tracker = ReadinessTracker::new();
        assert!(!tracker.mark_ready("ghost"));
        assert!(!tracker.is_ready("ghost"));
    }

    #[test]
    fn test_reinit_resets_readiness() {
        let mut tracker = ReadinessTracker::new();
        tracker.register("vis");
        tracker.mark_ready("vis");

        tracker.mark_pending("vis");
        assert!(!tracker.is_ready("vis"));

        tracker.mark_ready("vis");
        assert!(tracker.is_ready("vis"));
    }

    #[test]
    fn test_all_ready_over_participants() {
        let mut tracker = ReadinessTracker::new();
        for name in ["qbsp", "light", "vis"] {
            tracker.register(name);
        }
        tracker.mark_ready("qbsp");
        tracker.mark_ready("light");

        assert!(!tracker.all_ready(["qbsp", "light", "vis"]));
        assert_eq!(tracker.not_ready(["qbsp", "light", "vis"]), vec!["vis"]);

        tracker.mark_ready("vis");
        assert!(tracker.all_ready(["qbsp", "light", "vis"]));
    }
}
