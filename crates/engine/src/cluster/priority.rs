//! Priority scoring and alert boundaries
//!
//! Priority is monotonic in member count with a recency boost that decays
//! exponentially. Alert boundaries are edge-triggered: a boundary fires
//! exactly when the count crosses it upward, never again while the count
//! sits above it.

use chrono::{DateTime, Utc};

/// Priority score for a cluster.
///
/// `count` dominates; the boost adds at most `boost_weight * count` when
/// the cluster was touched just now and halves every `half_life_hours`.
/// Strictly increasing in count for any fixed recency.
pub fn priority_score(
    count: i32,
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
    boost_weight: f64,
    half_life_hours: f64,
) -> f64 {
    let count = count.max(0) as f64;
    let age_hours = (now - last_activity).num_seconds().max(0) as f64 / 3600.0;

    let decay = if half_life_hours > 0.0 {
        0.5f64.powf(age_hours / half_life_hours)
    } else {
        0.0
    };

    count * (1.0 + boost_weight * decay)
}

/// Ordered alert boundaries with edge-triggered crossing detection
#[derive(Debug, Clone)]
pub struct ThresholdMonitor {
    boundaries: Vec<i32>,
}

impl ThresholdMonitor {
    /// Build from a configured boundary list. Input is sorted and deduped.
    pub fn new(mut boundaries: Vec<i32>) -> Self {
        boundaries.retain(|b| *b > 0);
        boundaries.sort_unstable();
        boundaries.dedup();
        Self { boundaries }
    }

    pub fn boundaries(&self) -> &[i32] {
        &self.boundaries
    }

    /// Boundaries crossed by a count moving from `pre` to `post`.
    ///
    /// A boundary b fires iff pre < b <= post, so each upward crossing
    /// fires once and downward movement never fires.
    pub fn crossings(&self, pre: i32, post: i32) -> Vec<i32> {
        self.boundaries
            .iter()
            .copied()
            .filter(|b| pre < *b && *b <= post)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_boundary_fires_once_on_upward_crossing() {
        let monitor = ThresholdMonitor::new(vec![5, 10, 25]);

        assert_eq!(monitor.crossings(4, 5), vec![5]);
        assert_eq!(monitor.crossings(5, 6), Vec::<i32>::new());
        assert_eq!(monitor.crossings(6, 7), Vec::<i32>::new());
    }

    #[test]
    fn test_batch_jump_fires_every_boundary_passed() {
        let monitor = ThresholdMonitor::new(vec![5, 10, 25]);
        assert_eq!(monitor.crossings(3, 12), vec![5, 10]);
    }

    #[test]
    fn test_downward_and_recross() {
        let monitor = ThresholdMonitor::new(vec![5]);

        assert_eq!(monitor.crossings(5, 4), Vec::<i32>::new());
        // Dropping below and climbing back fires again
        assert_eq!(monitor.crossings(4, 5), vec![5]);
    }

    #[test]
    fn test_boundaries_sorted_and_deduped() {
        let monitor = ThresholdMonitor::new(vec![25, 5, 10, 5, 0, -3]);
        assert_eq!(monitor.boundaries(), &[5, 10, 25]);
    }

    #[test]
    fn test_priority_monotonic_in_count() {
        let now = Utc::now();
        let a = priority_score(4, now, now, 0.25, 72.0);
        let b = priority_score(5, now, now, 0.25, 72.0);
        assert!(b > a);
    }

    #[test]
    fn test_recency_boost_decays() {
        let now = Utc::now();
        let fresh = priority_score(10, now, now, 0.25, 72.0);
        let stale = priority_score(10, now - Duration::hours(720), now, 0.25, 72.0);

        assert!(fresh > stale);
        // Ten half-lives: effectively bare count
        assert!((stale - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_boost_never_outweighs_count() {
        let now = Utc::now();
        // A fresh 5-member cluster still scores below a stale 7-member one
        let fresh_small = priority_score(5, now, now, 0.25, 72.0);
        let stale_large = priority_score(7, now - Duration::hours(720), now, 0.25, 72.0);
        assert!(stale_large > fresh_small);
    }
}
