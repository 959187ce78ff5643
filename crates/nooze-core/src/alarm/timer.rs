//! In-process implementations of the timer and wake-lock seams.
//!
//! [`TokioWakeupTimer`] delivers fires as [`Fire`] messages on a channel,
//! the way a platform delivers a broadcast to a receiver: the fire arrives
//! out of band and whoever owns the receiving end runs the dispatcher.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::platform::{TimerPrecision, WakeLock, WakeupTimer};
use super::AlarmId;
use crate::error::PlatformError;

/// A delivered wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fire {
    pub alarm_id: AlarmId,
    pub scheduled_for: DateTime<Utc>,
}

/// A registration that has not fired yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTrigger {
    pub fire_at: DateTime<Utc>,
    pub precision: TimerPrecision,
}

struct Slot {
    generation: u64,
    pending: PendingTrigger,
    token: CancellationToken,
}

struct TimerInner {
    fires: mpsc::UnboundedSender<Fire>,
    slots: Mutex<HashMap<AlarmId, Slot>>,
    next_generation: Mutex<u64>,
    denied: Mutex<BTreeSet<TimerPrecision>>,
}

/// Wake-up timer backed by tokio sleeps.
///
/// Must be used from within a tokio runtime. Re-registering an id cancels
/// the earlier sleep; a generation check at wake-up time also drops any
/// sleep that lost the race with its cancellation.
#[derive(Clone)]
pub struct TokioWakeupTimer {
    inner: Arc<TimerInner>,
}

impl TokioWakeupTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fire>) {
        let (fires, rx) = mpsc::unbounded_channel();
        let timer = Self {
            inner: Arc::new(TimerInner {
                fires,
                slots: Mutex::new(HashMap::new()),
                next_generation: Mutex::new(0),
                denied: Mutex::new(BTreeSet::new()),
            }),
        };
        (timer, rx)
    }

    /// Refuse `precision` from now on, like a platform without the
    /// exact-alarm grant.
    pub fn deny(&self, precision: TimerPrecision) {
        self.inner.denied.lock().insert(precision);
    }

    pub fn pending(&self, alarm_id: AlarmId) -> Option<PendingTrigger> {
        self.inner.slots.lock().get(&alarm_id).map(|s| s.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.slots.lock().len()
    }
}

impl WakeupTimer for TokioWakeupTimer {
    fn register(
        &self,
        alarm_id: AlarmId,
        fire_at: DateTime<Utc>,
        precision: TimerPrecision,
    ) -> Result<(), PlatformError> {
        if self.inner.denied.lock().contains(&precision) {
            return Err(PlatformError::PrecisionDenied(precision.as_str()));
        }

        let generation = {
            let mut next = self.inner.next_generation.lock();
            *next += 1;
            *next
        };
        let token = CancellationToken::new();

        {
            let mut slots = self.inner.slots.lock();
            let previous = slots.insert(
                alarm_id,
                Slot {
                    generation,
                    pending: PendingTrigger { fire_at, precision },
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                trace!(alarm_id, "superseding earlier registration");
                previous.token.cancel();
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut slots = inner.slots.lock();
            match slots.get(&alarm_id) {
                Some(slot) if slot.generation == generation => {
                    slots.remove(&alarm_id);
                }
                _ => return,
            }
            drop(slots);

            debug!(alarm_id, %fire_at, "wake-up delivered");
            let _ = inner.fires.send(Fire {
                alarm_id,
                scheduled_for: fire_at,
            });
        });

        Ok(())
    }

    fn unregister(&self, alarm_id: AlarmId) -> bool {
        match self.inner.slots.lock().remove(&alarm_id) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Wake lock that only tracks holds and their ceilings in-process.
#[derive(Default)]
pub struct TimedWakeLock {
    holds: Mutex<HashMap<String, Instant>>,
}

impl TimedWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `tag` is held and its ceiling has not passed.
    pub fn is_held(&self, tag: &str) -> bool {
        self.holds
            .lock()
            .get(tag)
            .map(|deadline| *deadline > Instant::now())
            .unwrap_or(false)
    }
}

impl WakeLock for TimedWakeLock {
    fn acquire(&self, tag: &str, ceiling: Duration) -> Result<(), PlatformError> {
        self.holds
            .lock()
            .insert(tag.to_string(), Instant::now() + ceiling);
        trace!(tag, ceiling_ms = ceiling.as_millis() as u64, "wake hold acquired");
        Ok(())
    }

    fn release(&self, tag: &str) {
        if self.holds.lock().remove(tag).is_some() {
            trace!(tag, "wake hold released");
        }
    }
}
