use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::alarm::{AlarmId, TimerPrecision};

/// Every lifecycle transition produces an Event.
/// The CLI daemon prints them; tests subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    AlarmArmed {
        alarm_id: AlarmId,
        fire_at: DateTime<Utc>,
        precision: TimerPrecision,
        at: DateTime<Utc>,
    },
    AlarmCancelled {
        alarm_id: AlarmId,
        /// Whether a registration was actually removed.
        removed: bool,
        at: DateTime<Utc>,
    },
    AlarmFired {
        alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    /// A fire arrived while the alert was already ringing.
    DuplicateFireIgnored {
        alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    AlertStarted {
        alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    VibrationEscalated {
        alarm_id: AlarmId,
        phase: u8,
        at: DateTime<Utc>,
    },
    /// The alert notification was re-posted because the ring screen was
    /// not visible.
    AlertReasserted {
        alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    /// Playback failed and is being retried.
    PlaybackRestarted {
        alarm_id: AlarmId,
        consecutive_failures: u32,
        at: DateTime<Utc>,
    },
    AlertStopped {
        alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    ChallengeStarted {
        problem_count: usize,
        prompt: String,
        at: DateTime<Utc>,
    },
    ChallengeAdvanced {
        index: usize,
        problem_count: usize,
        prompt: String,
        at: DateTime<Utc>,
    },
    ChallengeRejected {
        index: usize,
        at: DateTime<Utc>,
    },
    ChallengeSolved {
        at: DateTime<Utc>,
    },
    CompletionRecorded {
        date_key: String,
        wake_time: DateTime<FixedOffset>,
    },
    RecoveryRestored {
        alarm_id: AlarmId,
        fire_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Recovery ran with no daily time on record.
    RecoverySkipped {
        at: DateTime<Utc>,
    },
}

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of [`Event`]s to any number of subscribers.
///
/// Publishing never blocks and never fails; with no subscribers the event
/// is simply dropped. Slow subscribers see `Lagged` and skip ahead.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        tracing::trace!(?event, "event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
