//! Wake Dispatcher: the entry point a delivered wake-up runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::alert::AlertDriver;
use super::platform::{AlertSurface, WakeHold, WakeLock};
use super::scheduler::TriggerScheduler;
use super::time::next_occurrence;
use super::AlarmId;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::state::EnforcementStore;

const WAKE_HOLD_TAG: &str = "nooze:dispatch";

/// How early a wake-up may arrive and still count as the armed occurrence.
const EARLY_DELIVERY_TOLERANCE_SECS: i64 = 5 * 60;

/// What one fire did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// `false` when the alert was already ringing and this fire was a
    /// duplicate.
    pub started: bool,
    /// Tomorrow's trigger, when one could be armed.
    pub next_trigger: Option<DateTime<Utc>>,
}

pub struct WakeDispatcher {
    store: EnforcementStore,
    scheduler: TriggerScheduler,
    driver: AlertDriver,
    surface: Arc<dyn AlertSurface>,
    wake_lock: Arc<dyn WakeLock>,
    wake_hold_ceiling: Duration,
    events: EventBus,
}

impl WakeDispatcher {
    pub fn new(
        store: EnforcementStore,
        scheduler: TriggerScheduler,
        driver: AlertDriver,
        surface: Arc<dyn AlertSurface>,
        wake_lock: Arc<dyn WakeLock>,
        wake_hold_ceiling: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            scheduler,
            driver,
            surface,
            wake_lock,
            wake_hold_ceiling,
            events,
        }
    }

    /// Handle a fire for `alarm_id` delivered at `now`.
    ///
    /// In order: hold the wake lock, mark enforcement active, start the
    /// alert, reset the ring screen's visibility, bring up the ring screen,
    /// then re-arm tomorrow from the
    /// persisted daily time. Re-arming happens on every fire, duplicates
    /// included, and never depends on the challenge being solved.
    ///
    /// Failures are logged and absorbed; the worst outcome of any of them
    /// is that one step did not happen.
    pub fn on_fire<Tz: TimeZone>(&self, alarm_id: AlarmId, now: &DateTime<Tz>) -> DispatchOutcome {
        let _hold = match WakeHold::acquire(self.wake_lock.as_ref(), WAKE_HOLD_TAG, self.wake_hold_ceiling) {
            Ok(hold) => Some(hold),
            Err(err) => {
                warn!(alarm_id, error = %err, "wake hold refused, dispatching without it");
                None
            }
        };

        if let Err(err) = self.store.set_active(true) {
            error!(alarm_id, error = %err, "could not persist active flag");
        }
        info!(alarm_id, "alarm fired");
        self.events.publish(Event::AlarmFired {
            alarm_id,
            at: Utc::now(),
        });

        let started = self.driver.start(alarm_id);
        if started {
            // The ring screen reports visibility afresh for every alarm.
            if let Err(err) = self.store.set_ring_ui_visible(false) {
                warn!(alarm_id, error = %err, "could not reset ring screen visibility");
            }
            if let Err(err) = self.surface.launch_ring_ui(alarm_id) {
                warn!(alarm_id, error = %err, "ring screen launch failed");
            }
        } else {
            debug!(alarm_id, "duplicate fire, alert already ringing");
            self.events.publish(Event::DuplicateFireIgnored {
                alarm_id,
                at: Utc::now(),
            });
        }

        let next_trigger = match self.rearm(alarm_id, now) {
            Ok(next) => next,
            Err(err) => {
                error!(alarm_id, error = %err, "could not re-arm tomorrow's alarm");
                None
            }
        };

        DispatchOutcome {
            started,
            next_trigger,
        }
    }

    /// Arm the next occurrence after `now`, or after the last armed trigger
    /// when that lies just ahead of `now`, so a wake-up delivered a little
    /// early never re-arms the same occurrence.
    fn rearm<Tz: TimeZone>(&self, alarm_id: AlarmId, now: &DateTime<Tz>) -> Result<Option<DateTime<Utc>>> {
        let Some(wake) = self.store.daily_wake_time()? else {
            debug!(alarm_id, "no daily time on record, nothing to re-arm");
            return Ok(None);
        };

        let now_utc = now.with_timezone(&Utc);
        let base = match self.store.last_trigger_time()? {
            Some(last) if last > now_utc && (last - now_utc).num_seconds() <= EARLY_DELIVERY_TOLERANCE_SECS => {
                last.with_timezone(&now.timezone())
            }
            _ => now.clone(),
        };
        let fire_at = next_occurrence(wake, &base).with_timezone(&Utc);

        let precision = self.scheduler.arm(alarm_id, fire_at)?;
        self.store.set_last_trigger_time(fire_at)?;
        self.events.publish(Event::AlarmArmed {
            alarm_id,
            fire_at,
            precision,
            at: Utc::now(),
        });
        Ok(Some(fire_at))
    }
}
