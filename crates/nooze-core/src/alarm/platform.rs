//! Seams to the platform the engine runs on.
//!
//! The lifecycle components never talk to an OS service directly; they go
//! through these traits. `nooze-core` ships in-process implementations of
//! the timer and wake lock ([`super::timer`]); the CLI supplies console
//! versions of the surface, audio and vibration seams.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vibration::VibrationPattern;
use super::AlarmId;
use crate::error::PlatformError;

/// How precisely the platform promises to deliver a wake-up.
///
/// Ordered from most to least precise; the scheduler walks the ladder
/// downward when a grant is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPrecision {
    /// User-visible alarm clock: exempt from idle throttling.
    AlarmClock,
    /// Exact, allowed to fire while the device idles.
    ExactAllowWhileIdle,
    /// Best effort; may be batched or deferred.
    Inexact,
}

impl TimerPrecision {
    pub const LADDER: [TimerPrecision; 3] = [
        TimerPrecision::AlarmClock,
        TimerPrecision::ExactAllowWhileIdle,
        TimerPrecision::Inexact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimerPrecision::AlarmClock => "alarm_clock",
            TimerPrecision::ExactAllowWhileIdle => "exact_allow_while_idle",
            TimerPrecision::Inexact => "inexact",
        }
    }
}

/// Platform-level one-shot wake-up registration, keyed by alarm id.
pub trait WakeupTimer: Send + Sync {
    /// Register a wake-up for `alarm_id` at `fire_at`, replacing any
    /// existing registration for the same id.
    ///
    /// Returns [`PlatformError::PrecisionDenied`] when `precision` is not
    /// granted; the caller may retry with a lower precision.
    fn register(
        &self,
        alarm_id: AlarmId,
        fire_at: DateTime<Utc>,
        precision: TimerPrecision,
    ) -> Result<(), PlatformError>;

    /// Remove the registration for `alarm_id`. Returns whether one existed.
    fn unregister(&self, alarm_id: AlarmId) -> bool;
}

/// Short-lived hold that keeps the process from being suspended.
pub trait WakeLock: Send + Sync {
    /// Acquire the hold; the platform releases it on its own after `ceiling`.
    fn acquire(&self, tag: &str, ceiling: Duration) -> Result<(), PlatformError>;

    /// Release early. Releasing a hold that is not held is a no-op.
    fn release(&self, tag: &str);
}

/// RAII guard over a [`WakeLock`] hold; releases on drop.
pub struct WakeHold<'a> {
    lock: &'a dyn WakeLock,
    tag: &'static str,
}

impl<'a> WakeHold<'a> {
    /// # Errors
    /// Propagates the platform's refusal; callers usually log and proceed.
    pub fn acquire(
        lock: &'a dyn WakeLock,
        tag: &'static str,
        ceiling: Duration,
    ) -> Result<Self, PlatformError> {
        lock.acquire(tag, ceiling)?;
        Ok(Self { lock, tag })
    }
}

impl Drop for WakeHold<'_> {
    fn drop(&mut self) {
        self.lock.release(self.tag);
    }
}

/// User-facing alert surfaces: the ring screen and the alarm notification.
pub trait AlertSurface: Send + Sync {
    /// Bring up the ring screen as a new, top-most task, shown over the
    /// lock screen.
    fn launch_ring_ui(&self, alarm_id: AlarmId) -> Result<(), PlatformError>;

    /// Post (or re-post) the high-priority alarm notification with a
    /// full-screen intent pointing at the ring screen.
    fn post_alert(&self, alarm_id: AlarmId) -> Result<(), PlatformError>;

    /// Withdraw the alarm notification.
    fn cancel_alert(&self, alarm_id: AlarmId);

    /// Claim long-lived foreground execution for the alert loop.
    fn claim_foreground(&self, alarm_id: AlarmId) -> Result<(), PlatformError>;

    /// Drop the foreground claim.
    fn release_foreground(&self, alarm_id: AlarmId);
}

/// Alarm sound output.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play the alarm sound once, resolving when it ends naturally.
    ///
    /// An `Err` means the engine failed mid-playback.
    async fn play(&self) -> Result<(), PlatformError>;

    /// Stop any playback in progress and release the engine.
    fn halt(&self);
}

/// Haptic output.
pub trait Vibrator: Send + Sync {
    /// Start repeating `pattern`, replacing whatever is playing.
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), PlatformError>;

    fn cancel(&self);
}
