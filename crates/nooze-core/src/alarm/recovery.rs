//! Boot Recovery: re-arm the daily trigger from persisted state alone.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::scheduler::TriggerScheduler;
use super::time::{next_occurrence, WakeTime};
use super::AlarmId;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::state::EnforcementStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Restored {
        alarm_id: AlarmId,
        wake_time: WakeTime,
        fire_at: DateTime<Utc>,
    },
    /// No daily time was ever scheduled.
    NothingScheduled,
}

pub struct BootRecovery<'a> {
    store: &'a EnforcementStore,
    scheduler: &'a TriggerScheduler,
    events: &'a EventBus,
}

impl<'a> BootRecovery<'a> {
    pub fn new(store: &'a EnforcementStore, scheduler: &'a TriggerScheduler, events: &'a EventBus) -> Self {
        Self {
            store,
            scheduler,
            events,
        }
    }

    /// Restore the trigger registration after a restart.
    ///
    /// Needs neither the alert nor the ring screen. A missing daily time is
    /// not an error. The persisted alarm id is reused, falling back to
    /// `default_alarm_id` when none was stored.
    ///
    /// # Errors
    /// Returns an error if state cannot be read or no wake-up could be
    /// registered at any precision.
    pub fn restore<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        default_alarm_id: AlarmId,
    ) -> Result<RecoveryOutcome> {
        let Some(wake_time) = self.store.daily_wake_time()? else {
            info!("no daily wake time on record, nothing to restore");
            self.events.publish(Event::RecoverySkipped { at: Utc::now() });
            return Ok(RecoveryOutcome::NothingScheduled);
        };
        let alarm_id = self.store.alarm_id()?.unwrap_or(default_alarm_id);

        let fire_at = next_occurrence(wake_time, now).with_timezone(&Utc);
        self.scheduler.arm(alarm_id, fire_at)?;
        self.store.set_last_trigger_time(fire_at)?;

        info!(alarm_id, %wake_time, %fire_at, "daily alarm restored");
        self.events.publish(Event::RecoveryRestored {
            alarm_id,
            fire_at,
            at: Utc::now(),
        });
        Ok(RecoveryOutcome::Restored {
            alarm_id,
            wake_time,
            fire_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::timer::TokioWakeupTimer;
    use std::sync::Arc;

    fn parts() -> (EnforcementStore, TokioWakeupTimer, TriggerScheduler, EventBus) {
        let store = EnforcementStore::in_memory().unwrap();
        let (timer, _fires) = TokioWakeupTimer::new();
        let scheduler = TriggerScheduler::new(Arc::new(timer.clone()));
        (store, timer, scheduler, EventBus::new())
    }

    #[tokio::test]
    async fn nothing_persisted_is_a_no_op() {
        let (store, timer, scheduler, events) = parts();
        let now = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();

        let outcome = BootRecovery::new(&store, &scheduler, &events)
            .restore(&now, 1001)
            .unwrap();
        assert_eq!(outcome, RecoveryOutcome::NothingScheduled);
        assert_eq!(timer.pending_count(), 0);
    }

    #[tokio::test]
    async fn restores_with_persisted_id() {
        let (store, timer, scheduler, events) = parts();
        store.set_daily_wake_time(WakeTime::new(6, 30).unwrap()).unwrap();
        store.set_alarm_id(42).unwrap();
        let now = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();

        let outcome = BootRecovery::new(&store, &scheduler, &events)
            .restore(&now, 1001)
            .unwrap();

        let expected = Utc.with_ymd_and_hms(2031, 6, 2, 6, 30, 0).unwrap();
        assert_eq!(
            outcome,
            RecoveryOutcome::Restored {
                alarm_id: 42,
                wake_time: WakeTime::new(6, 30).unwrap(),
                fire_at: expected,
            }
        );
        assert_eq!(timer.pending(42).unwrap().fire_at, expected);
        assert_eq!(store.last_trigger_time().unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn falls_back_to_default_id() {
        let (store, timer, scheduler, events) = parts();
        store.set_daily_wake_time(WakeTime::new(23, 0).unwrap()).unwrap();
        let now = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();

        BootRecovery::new(&store, &scheduler, &events)
            .restore(&now, 1001)
            .unwrap();
        assert_eq!(
            timer.pending(1001).unwrap().fire_at,
            Utc.with_ymd_and_hms(2031, 6, 1, 23, 0, 0).unwrap()
        );
    }
}
