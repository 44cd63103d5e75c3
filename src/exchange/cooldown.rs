use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Process-wide rate-limit cool-down marker
///
/// The one piece of deliberately shared mutable state in the system: every
/// instrument trader's gateway calls consult it, and a throttle signal from
/// the exchange updates it so that all traders observe the same back-off.
///
/// This struct is cloneable to allow sharing across async tasks; all clones
/// share the same marker.
#[derive(Clone, Default)]
pub struct CooldownGate {
    until: Arc<Mutex<Option<Instant>>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining wait if the marker is in the future
    ///
    /// An elapsed marker is cleared as a side effect. Callers are expected
    /// to sleep out the returned duration and then soft-abort the current
    /// call rather than retry within it.
    pub async fn deferral(&self) -> Option<Duration> {
        let mut until = self.until.lock().await;
        match *until {
            Some(deadline) => {
                let now = Instant::now();
                if deadline > now {
                    Some(deadline - now)
                } else {
                    *until = None;
                    None
                }
            }
            None => None,
        }
    }

    /// Record a throttle signal: marker = now + delay
    ///
    /// When trips race, the later deadline wins.
    pub async fn trip(&self, delay: Duration) {
        let mut until = self.until.lock().await;
        let deadline = Instant::now() + delay;
        if until.map_or(true, |existing| deadline > existing) {
            *until = Some(deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_idle_gate_has_no_deferral() {
        let gate = CooldownGate::new();
        assert_eq!(gate.deferral().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_defers_until_deadline() {
        let gate = CooldownGate::new();
        gate.trip(Duration::from_secs(30)).await;

        let wait = gate.deferral().await.unwrap();
        assert!(wait <= Duration::from_secs(30));
        assert!(wait > Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_clears_after_elapse() {
        let gate = CooldownGate::new();
        gate.trip(Duration::from_secs(5)).await;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(gate.deferral().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_across_clones() {
        let gate = CooldownGate::new();
        let observer = gate.clone();

        gate.trip(Duration::from_secs(10)).await;
        assert!(observer.deferral().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_deadline_wins() {
        let gate = CooldownGate::new();
        gate.trip(Duration::from_secs(60)).await;
        gate.trip(Duration::from_secs(5)).await;

        let wait = gate.deferral().await.unwrap();
        assert!(wait > Duration::from_secs(50));
    }
}
