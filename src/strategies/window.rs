use tracing::warn;

use crate::data::types::{ObservationSource, TemperatureObservation};

/// Append-only, time-ordered buffer of one session's observations.
///
/// Nothing is ever evicted; the session length bounds the size.
#[derive(Debug, Clone, Default)]
pub struct ObservationWindow {
    observations: Vec<TemperatureObservation>,
}

impl ObservationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `obs`. An observation older than the newest one already held
    /// is rejected, since the trend rule depends on chronological order.
    pub fn push(&mut self, obs: TemperatureObservation) -> bool {
        if let Some(last) = self.observations.last() {
            if obs.timestamp < last.timestamp {
                warn!(
                    "Rejecting out-of-order observation at {} (newest is {})",
                    obs.timestamp, last.timestamp
                );
                return false;
            }
        }
        self.observations.push(obs);
        true
    }

    pub fn all(&self) -> &[TemperatureObservation] {
        &self.observations
    }

    /// The `n` most recent observations in chronological order.
    pub fn last(&self, n: usize) -> &[TemperatureObservation] {
        let start = self.observations.len().saturating_sub(n);
        &self.observations[start..]
    }

    pub fn of(&self, source: ObservationSource) -> impl Iterator<Item = &TemperatureObservation> {
        self.observations.iter().filter(move |o| o.source == source)
    }

    /// The `n` most recent observations from `source`, oldest first.
    pub fn last_of(&self, source: ObservationSource, n: usize) -> Vec<&TemperatureObservation> {
        let mut recent: Vec<&TemperatureObservation> =
            self.observations.iter().rev().filter(|o| o.source == source).take(n).collect();
        recent.reverse();
        recent
    }

    pub fn count_of(&self, source: ObservationSource) -> usize {
        self.of(source).count()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn into_observations(self) -> Vec<TemperatureObservation> {
        self.observations
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    const PRIMARY: ObservationSource = ObservationSource::PrimaryObservationStation;
    const SECONDARY: ObservationSource = ObservationSource::SecondaryModel;

    #[test]
    fn test_last_returns_chronological_tail() {
        let window = primary_window(&[55.0, 56.0, 57.0, 58.0]);
        let tail: Vec<f64> = window.last(2).iter().map(|o| o.temperature).collect();
        assert_eq!(tail, vec![57.0, 58.0]);
        assert_eq!(window.last(10).len(), 4);
        assert!(ObservationWindow::new().last(3).is_empty());
    }

    #[test]
    fn test_source_filter() {
        let mut window = ObservationWindow::new();
        window.push(obs(0, PRIMARY, 55.0));
        window.push(obs(0, SECONDARY, 54.0));
        window.push(obs(5, PRIMARY, 56.0));
        window.push(obs(5, SECONDARY, 57.0));
        window.push(obs(10, PRIMARY, 57.0));

        assert_eq!(window.count_of(PRIMARY), 3);
        assert_eq!(window.count_of(SECONDARY), 2);
        let last_primary: Vec<f64> = window.last_of(PRIMARY, 2).iter().map(|o| o.temperature).collect();
        assert_eq!(last_primary, vec![56.0, 57.0]);
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut window = ObservationWindow::new();
        assert!(window.push(obs(10, PRIMARY, 55.0)));
        assert!(!window.push(obs(5, PRIMARY, 56.0)));
        assert!(window.push(obs(10, SECONDARY, 56.0)));
        assert_eq!(window.len(), 2);
    }
}
