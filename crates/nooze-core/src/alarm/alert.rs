//! Alert Driver: the escalating sound, vibration and notification loop.
//!
//! ## States
//!
//! - **Idle**: never started
//! - **Ringing**: playback loops, vibration escalates, the alert is
//!   re-posted whenever the ring screen is not visible
//! - **Stopped**: every resource released; a new start rings again from
//!   phase 1
//!
//! Each ringing period gets its own generation number and cancellation
//! token. Background tasks check both before every side effect, and
//! stopping happens under the same lock, so nothing a stale task does can
//! land after `Stopped` was entered.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::platform::{AlertSurface, AudioOutput, Vibrator};
use super::vibration::VibrationPhase;
use super::AlarmId;
use crate::events::{Event, EventBus};
use crate::state::EnforcementStore;
use crate::storage::EscalationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Idle,
    Ringing,
    Stopped,
}

struct Ring {
    state: AlertState,
    generation: u64,
    alarm_id: Option<AlarmId>,
    phase: VibrationPhase,
    token: CancellationToken,
}

struct DriverInner {
    store: EnforcementStore,
    surface: Arc<dyn AlertSurface>,
    audio: Arc<dyn AudioOutput>,
    vibrator: Arc<dyn Vibrator>,
    config: EscalationConfig,
    events: EventBus,
    ring: Mutex<Ring>,
}

/// Handle to the alert loop. Clones drive the same alert.
#[derive(Clone)]
pub struct AlertDriver {
    inner: Arc<DriverInner>,
}

impl AlertDriver {
    pub fn new(
        store: EnforcementStore,
        surface: Arc<dyn AlertSurface>,
        audio: Arc<dyn AudioOutput>,
        vibrator: Arc<dyn Vibrator>,
        config: EscalationConfig,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                store,
                surface,
                audio,
                vibrator,
                config,
                events,
                ring: Mutex::new(Ring {
                    state: AlertState::Idle,
                    generation: 0,
                    alarm_id: None,
                    phase: VibrationPhase::One,
                    token: CancellationToken::new(),
                }),
            }),
        }
    }

    pub fn state(&self) -> AlertState {
        self.inner.ring.lock().state
    }

    pub fn phase(&self) -> VibrationPhase {
        self.inner.ring.lock().phase
    }

    pub fn alarm_id(&self) -> Option<AlarmId> {
        self.inner.ring.lock().alarm_id
    }

    /// Enter `Ringing` for `alarm_id`.
    ///
    /// Returns `false` without doing anything when already ringing, so a
    /// duplicate fire never starts a second loop. Must be called from
    /// within a tokio runtime.
    pub fn start(&self, alarm_id: AlarmId) -> bool {
        let inner = &self.inner;
        let mut ring = inner.ring.lock();
        if ring.state == AlertState::Ringing {
            debug!(alarm_id, "alert already ringing");
            return false;
        }

        ring.generation += 1;
        ring.state = AlertState::Ringing;
        ring.alarm_id = Some(alarm_id);
        ring.phase = VibrationPhase::One;
        ring.token = CancellationToken::new();
        let generation = ring.generation;
        let token = ring.token.clone();
        let started_at = Instant::now();

        if let Err(err) = inner.surface.claim_foreground(alarm_id) {
            warn!(alarm_id, error = %err, "foreground claim refused");
        }
        if let Err(err) = inner.surface.post_alert(alarm_id) {
            warn!(alarm_id, error = %err, "alert notification not posted");
        }
        if let Err(err) = inner.vibrator.vibrate(VibrationPhase::One.pattern()) {
            warn!(alarm_id, error = %err, "vibration failed to start");
        }
        // Subscribed before unlocking so no change after this point is missed.
        let active_rx = inner.store.subscribe_active();
        drop(ring);

        info!(alarm_id, "alert ringing");
        inner.events.publish(Event::AlertStarted {
            alarm_id,
            at: Utc::now(),
        });

        let ctx = RingContext {
            inner: Arc::clone(inner),
            generation,
            alarm_id,
            token,
        };
        tokio::spawn(ctx.clone().playback_loop());
        tokio::spawn(ctx.clone().reassert_loop());
        tokio::spawn(ctx.clone().escalation_loop(started_at));
        tokio::spawn(ctx.watch_active(active_rx));
        true
    }

    /// Enter `Stopped`, releasing playback, vibration, the notification
    /// and the foreground claim. Returns whether the alert was ringing.
    pub fn stop(&self) -> bool {
        let generation = self.inner.ring.lock().generation;
        self.inner.stop_generation(generation, "stop requested")
    }
}

impl DriverInner {
    fn stop_generation(&self, generation: u64, reason: &str) -> bool {
        let mut ring = self.ring.lock();
        if ring.generation != generation || ring.state != AlertState::Ringing {
            return false;
        }
        ring.state = AlertState::Stopped;
        ring.token.cancel();

        self.audio.halt();
        self.vibrator.cancel();
        let alarm_id = ring.alarm_id;
        if let Some(alarm_id) = alarm_id {
            self.surface.cancel_alert(alarm_id);
            self.surface.release_foreground(alarm_id);
        }
        drop(ring);

        info!(?alarm_id, reason, "alert stopped");
        if let Some(alarm_id) = alarm_id {
            self.events.publish(Event::AlertStopped {
                alarm_id,
                at: Utc::now(),
            });
        }
        true
    }

    /// A read failure counts as still active.
    fn still_active(&self) -> bool {
        match self.store.is_active() {
            Ok(active) => active,
            Err(err) => {
                warn!(error = %err, "could not read active flag, assuming active");
                true
            }
        }
    }
}

#[derive(Clone)]
struct RingContext {
    inner: Arc<DriverInner>,
    generation: u64,
    alarm_id: AlarmId,
    token: CancellationToken,
}

impl RingContext {
    fn is_current(&self) -> bool {
        let ring = self.inner.ring.lock();
        ring.generation == self.generation && ring.state == AlertState::Ringing
    }

    async fn playback_loop(self) {
        let max_failures = self.inner.config.max_consecutive_playback_failures;
        let retry_delay = self.inner.config.playback_retry_delay();
        let mut failures = 0u32;

        loop {
            if !self.is_current() {
                return;
            }
            let outcome = tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                result = self.inner.audio.play() => result,
            };

            if !self.inner.still_active() {
                self.inner.stop_generation(self.generation, "enforcement no longer active");
                return;
            }

            match outcome {
                Ok(()) => {
                    failures = 0;
                    trace!(alarm_id = self.alarm_id, "playback looped");
                }
                Err(err) => {
                    failures += 1;
                    if max_failures > 0 && failures >= max_failures {
                        warn!(alarm_id = self.alarm_id, failures, error = %err, "giving up on audio for this alert");
                        return;
                    }
                    warn!(alarm_id = self.alarm_id, failures, error = %err, "playback failed, retrying");
                    self.inner.events.publish(Event::PlaybackRestarted {
                        alarm_id: self.alarm_id,
                        consecutive_failures: failures,
                        at: Utc::now(),
                    });
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return,
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
    }

    async fn reassert_loop(self) {
        let period = self.inner.config.reassert_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = interval.tick() => self.reassert(),
            }
        }
    }

    fn reassert(&self) {
        let visible = self.inner.store.ring_ui_visible().unwrap_or_else(|err| {
            warn!(error = %err, "could not read ring screen visibility");
            false
        });
        if visible {
            trace!(alarm_id = self.alarm_id, "ring screen visible, no re-post");
            return;
        }

        let ring = self.inner.ring.lock();
        if ring.generation != self.generation || ring.state != AlertState::Ringing {
            return;
        }
        if let Err(err) = self.inner.surface.post_alert(self.alarm_id) {
            warn!(alarm_id = self.alarm_id, error = %err, "alert re-post failed");
        }
        drop(ring);

        debug!(alarm_id = self.alarm_id, "alert re-asserted");
        self.inner.events.publish(Event::AlertReasserted {
            alarm_id: self.alarm_id,
            at: Utc::now(),
        });
    }

    async fn escalation_loop(self, started_at: Instant) {
        let mut phase = VibrationPhase::One;
        while let Some(next) = phase.next() {
            let due = started_at + next.starts_after(&self.inner.config);
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep_until(due) => {}
            }
            if !self.escalate(next) {
                return;
            }
            phase = next;
        }
    }

    fn escalate(&self, phase: VibrationPhase) -> bool {
        let mut ring = self.inner.ring.lock();
        if ring.generation != self.generation || ring.state != AlertState::Ringing {
            return false;
        }
        if phase <= ring.phase {
            return true;
        }
        ring.phase = phase;
        if let Err(err) = self.inner.vibrator.vibrate(phase.pattern()) {
            warn!(alarm_id = self.alarm_id, phase = phase.as_u8(), error = %err, "vibration phase not applied");
        }
        drop(ring);

        info!(alarm_id = self.alarm_id, phase = phase.as_u8(), "vibration escalated");
        self.inner.events.publish(Event::VibrationEscalated {
            alarm_id: self.alarm_id,
            phase: phase.as_u8(),
            at: Utc::now(),
        });
        true
    }

    async fn watch_active(self, mut active_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                changed = active_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*active_rx.borrow_and_update() {
                        self.inner.stop_generation(self.generation, "enforcement cleared");
                        return;
                    }
                }
            }
        }
    }
}
