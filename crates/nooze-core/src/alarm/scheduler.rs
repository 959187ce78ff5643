//! Trigger Scheduler: registers the single platform wake-up per alarm id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::platform::{TimerPrecision, WakeupTimer};
use super::AlarmId;
use crate::error::PlatformError;

/// Arms and cancels wake-ups, asking for the most precise delivery the
/// platform will grant.
#[derive(Clone)]
pub struct TriggerScheduler {
    timer: Arc<dyn WakeupTimer>,
}

impl TriggerScheduler {
    pub fn new(timer: Arc<dyn WakeupTimer>) -> Self {
        Self { timer }
    }

    /// Register the wake-up for `alarm_id` at `fire_at`, superseding any
    /// earlier registration for the same id.
    ///
    /// A denied precision is logged and the next one down the ladder is
    /// tried. Returns the precision that was granted.
    ///
    /// # Errors
    /// [`PlatformError::TimerUnavailable`] only when no precision at all
    /// could be registered.
    pub fn arm(
        &self,
        alarm_id: AlarmId,
        fire_at: DateTime<Utc>,
    ) -> Result<TimerPrecision, PlatformError> {
        for precision in TimerPrecision::LADDER {
            match self.timer.register(alarm_id, fire_at, precision) {
                Ok(()) => {
                    info!(alarm_id, %fire_at, precision = precision.as_str(), "alarm armed");
                    return Ok(precision);
                }
                Err(err) => {
                    warn!(alarm_id, precision = precision.as_str(), error = %err, "wake-up precision unavailable, degrading");
                }
            }
        }
        Err(PlatformError::TimerUnavailable(alarm_id))
    }

    /// Remove the registration for `alarm_id`. Returns whether one existed;
    /// absence is not an error.
    pub fn cancel(&self, alarm_id: AlarmId) -> bool {
        let removed = self.timer.unregister(alarm_id);
        debug!(alarm_id, removed, "alarm cancel requested");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{BTreeSet, HashMap};

    /// Records registrations in a map, refusing configured precisions.
    #[derive(Default)]
    struct MapTimer {
        denied: BTreeSet<TimerPrecision>,
        slots: Mutex<HashMap<AlarmId, (DateTime<Utc>, TimerPrecision)>>,
    }

    impl WakeupTimer for MapTimer {
        fn register(
            &self,
            alarm_id: AlarmId,
            fire_at: DateTime<Utc>,
            precision: TimerPrecision,
        ) -> Result<(), PlatformError> {
            if self.denied.contains(&precision) {
                return Err(PlatformError::PrecisionDenied(precision.as_str()));
            }
            self.slots.lock().insert(alarm_id, (fire_at, precision));
            Ok(())
        }

        fn unregister(&self, alarm_id: AlarmId) -> bool {
            self.slots.lock().remove(&alarm_id).is_some()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_800_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn arm_prefers_alarm_clock() {
        let timer = Arc::new(MapTimer::default());
        let scheduler = TriggerScheduler::new(timer.clone());
        assert_eq!(scheduler.arm(1001, at(0)), Ok(TimerPrecision::AlarmClock));
    }

    #[test]
    fn arm_twice_leaves_one_registration_at_second_time() {
        let timer = Arc::new(MapTimer::default());
        let scheduler = TriggerScheduler::new(timer.clone());
        scheduler.arm(1001, at(0)).unwrap();
        scheduler.arm(1001, at(60)).unwrap();

        let slots = timer.slots.lock();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[&1001].0, at(60));
    }

    #[test]
    fn denied_precision_degrades() {
        let timer = Arc::new(MapTimer {
            denied: [TimerPrecision::AlarmClock, TimerPrecision::ExactAllowWhileIdle]
                .into_iter()
                .collect(),
            ..MapTimer::default()
        });
        let scheduler = TriggerScheduler::new(timer.clone());
        assert_eq!(scheduler.arm(7, at(0)), Ok(TimerPrecision::Inexact));
        assert_eq!(timer.slots.lock()[&7].1, TimerPrecision::Inexact);
    }

    #[test]
    fn nothing_granted_is_an_error() {
        let timer = Arc::new(MapTimer {
            denied: TimerPrecision::LADDER.into_iter().collect(),
            ..MapTimer::default()
        });
        let scheduler = TriggerScheduler::new(timer);
        assert_eq!(
            scheduler.arm(7, at(0)),
            Err(PlatformError::TimerUnavailable(7))
        );
    }

    #[test]
    fn cancel_absent_is_not_an_error() {
        let timer = Arc::new(MapTimer::default());
        let scheduler = TriggerScheduler::new(timer);
        assert!(!scheduler.cancel(9));
        scheduler.arm(9, at(0)).unwrap();
        assert!(scheduler.cancel(9));
    }
}
