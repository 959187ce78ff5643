//! The call surface outer shells drive the engine through.
//!
//! [`AlarmService`] wires the lifecycle components to one
//! [`EnforcementStore`] and one set of platform seams. Every operation
//! has a variant taking `now` so behaviour can be pinned to a clock in
//! tests; the plain variants use local time.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::alarm::{
    next_occurrence, AlarmId, AlertDriver, AlertState, AlertSurface, AudioOutput, BootRecovery,
    ChallengeGate, DispatchOutcome, Problem, RecoveryOutcome, TriggerScheduler, Verdict,
    Vibrator, WakeDispatcher, WakeLock, WakeTime, WakeupTimer,
};
use crate::error::{ChallengeError, Result};
use crate::events::{Event, EventBus};
use crate::state::{CompletionRecord, EnforcementStore};
use crate::storage::Config;

/// The platform seams an [`AlarmService`] runs against.
#[derive(Clone)]
pub struct Platform {
    pub timer: Arc<dyn WakeupTimer>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub surface: Arc<dyn AlertSurface>,
    pub audio: Arc<dyn AudioOutput>,
    pub vibrator: Arc<dyn Vibrator>,
}

pub struct AlarmService {
    config: Config,
    store: EnforcementStore,
    scheduler: TriggerScheduler,
    driver: AlertDriver,
    dispatcher: WakeDispatcher,
    events: EventBus,
    challenge: Mutex<Option<ChallengeGate>>,
}

impl AlarmService {
    pub fn new(config: Config, store: EnforcementStore, platform: Platform) -> Self {
        let events = EventBus::new();
        let scheduler = TriggerScheduler::new(platform.timer);
        let driver = AlertDriver::new(
            store.clone(),
            Arc::clone(&platform.surface),
            platform.audio,
            platform.vibrator,
            config.escalation.clone(),
            events.clone(),
        );
        let dispatcher = WakeDispatcher::new(
            store.clone(),
            scheduler.clone(),
            driver.clone(),
            platform.surface,
            platform.wake_lock,
            config.alarm.wake_hold_ceiling(),
            events.clone(),
        );
        Self {
            config,
            store,
            scheduler,
            driver,
            dispatcher,
            events,
            challenge: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &EnforcementStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn alert_state(&self) -> AlertState {
        self.driver.state()
    }

    // ── scheduling ───────────────────────────────────────────────────

    /// Persist the daily time and arm its next occurrence.
    ///
    /// # Errors
    /// Rejects an out-of-range time before anything is written.
    pub fn schedule_daily(&self, alarm_id: AlarmId, hour: u32, minute: u32) -> Result<DateTime<Utc>> {
        self.schedule_daily_at(alarm_id, WakeTime::new(hour, minute)?, &Local::now())
    }

    /// # Errors
    /// Returns an error if state cannot be written or no wake-up could be
    /// registered at any precision. The daily time is persisted first, so
    /// the next recovery retries the registration.
    pub fn schedule_daily_at<Tz: TimeZone>(
        &self,
        alarm_id: AlarmId,
        wake: WakeTime,
        now: &DateTime<Tz>,
    ) -> Result<DateTime<Utc>> {
        self.store.set_daily_wake_time(wake)?;
        self.store.set_alarm_id(alarm_id)?;

        let fire_at = next_occurrence(wake, now).with_timezone(&Utc);
        let precision = self.scheduler.arm(alarm_id, fire_at)?;
        self.store.set_last_trigger_time(fire_at)?;

        info!(alarm_id, %wake, %fire_at, "daily alarm scheduled");
        self.events.publish(Event::AlarmArmed {
            alarm_id,
            fire_at,
            precision,
            at: Utc::now(),
        });
        Ok(fire_at)
    }

    /// Cancel the registration and clear `active`. The daily time stays on
    /// record.
    ///
    /// # Errors
    /// Returns an error if the active flag cannot be written.
    pub fn cancel_alarm(&self, alarm_id: AlarmId) -> Result<()> {
        let removed = self.scheduler.cancel(alarm_id);
        self.store.set_active(false)?;
        self.driver.stop();
        self.challenge.lock().take();

        info!(alarm_id, removed, "alarm cancelled");
        self.events.publish(Event::AlarmCancelled {
            alarm_id,
            removed,
            at: Utc::now(),
        });
        Ok(())
    }

    // ── dispatch and recovery ────────────────────────────────────────

    pub fn on_fire(&self, alarm_id: AlarmId) -> DispatchOutcome {
        self.on_fire_at(alarm_id, &Local::now())
    }

    pub fn on_fire_at<Tz: TimeZone>(&self, alarm_id: AlarmId, now: &DateTime<Tz>) -> DispatchOutcome {
        self.dispatcher.on_fire(alarm_id, now)
    }

    /// # Errors
    /// See [`BootRecovery::restore`].
    pub fn recover(&self) -> Result<RecoveryOutcome> {
        self.recover_at(&Local::now())
    }

    /// # Errors
    /// See [`BootRecovery::restore`].
    pub fn recover_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<RecoveryOutcome> {
        BootRecovery::new(&self.store, &self.scheduler, &self.events)
            .restore(now, self.config.alarm.default_alarm_id)
    }

    // ── ring screen ──────────────────────────────────────────────────

    /// Heartbeat from the ring screen on every foreground/background change.
    ///
    /// # Errors
    /// Returns an error if the flag cannot be written.
    pub fn report_ring_ui_visibility(&self, visible: bool) -> Result<()> {
        debug!(visible, "ring screen visibility reported");
        self.store.set_ring_ui_visible(visible)
    }

    /// Emergency stop for collaborator-level escape hatches. Silences the
    /// alert but leaves `active` untouched.
    pub fn stop_alert_now(&self) -> bool {
        self.driver.stop()
    }

    // ── challenge ────────────────────────────────────────────────────

    /// Start a fresh batch of problems, discarding any progress. Returns
    /// the first problem.
    ///
    /// # Errors
    /// [`ChallengeError::NoActiveAlarm`] unless enforcement is active.
    pub fn begin_challenge(&self) -> Result<Problem> {
        self.ensure_active()?;
        let gate = ChallengeGate::generate(&self.config.challenge);
        Ok(self.install_challenge(gate))
    }

    /// Start from a fixed batch of problems. An empty batch falls back to
    /// a generated one.
    ///
    /// # Errors
    /// [`ChallengeError::NoActiveAlarm`] unless enforcement is active.
    pub fn begin_challenge_with(&self, problems: Vec<Problem>) -> Result<Problem> {
        if problems.is_empty() {
            return self.begin_challenge();
        }
        self.ensure_active()?;
        Ok(self.install_challenge(ChallengeGate::from_problems(problems)))
    }

    fn ensure_active(&self) -> Result<()> {
        if self.store.is_active()? {
            Ok(())
        } else {
            Err(ChallengeError::NoActiveAlarm.into())
        }
    }

    fn install_challenge(&self, gate: ChallengeGate) -> Problem {
        let first = gate.problems()[0];
        info!(problem_count = gate.len(), "challenge started");
        self.events.publish(Event::ChallengeStarted {
            problem_count: gate.len(),
            prompt: first.prompt(),
            at: Utc::now(),
        });
        *self.challenge.lock() = Some(gate);
        first
    }

    /// The problem awaiting an answer, if a challenge is in progress.
    pub fn current_problem(&self) -> Option<Problem> {
        self.challenge
            .lock()
            .as_ref()
            .and_then(|gate| gate.current().copied())
    }

    /// # Errors
    /// [`ChallengeError::NotStarted`] without a challenge in progress.
    pub fn submit_challenge_answer(&self, value: i64) -> Result<Verdict> {
        self.submit_with(|gate| Ok(gate.submit(value)))
    }

    /// Answer from raw user input.
    ///
    /// # Errors
    /// Blank or non-numeric input, or no challenge in progress.
    pub fn submit_challenge_text(&self, input: &str) -> Result<Verdict> {
        self.submit_with(|gate| gate.submit_text(input))
    }

    fn submit_with(
        &self,
        answer: impl FnOnce(&mut ChallengeGate) -> std::result::Result<Verdict, ChallengeError>,
    ) -> Result<Verdict> {
        let mut slot = self.challenge.lock();
        let gate = slot.as_mut().ok_or(ChallengeError::NotStarted)?;
        let verdict = answer(gate)?;

        match verdict {
            Verdict::Rejected => {
                debug!(index = gate.index(), "wrong answer");
                self.events.publish(Event::ChallengeRejected {
                    index: gate.index(),
                    at: Utc::now(),
                });
            }
            Verdict::Advanced => {
                self.events.publish(Event::ChallengeAdvanced {
                    index: gate.index(),
                    problem_count: gate.len(),
                    prompt: gate.current().map(Problem::prompt).unwrap_or_default(),
                    at: Utc::now(),
                });
            }
            Verdict::Solved => {
                slot.take();
                drop(slot);
                self.complete()?;
            }
        }
        Ok(verdict)
    }

    /// Stop the alert, clear `active`, then record the completion. The
    /// trigger armed at dispatch stays armed. Nothing is recorded when
    /// `active` was already clear.
    fn complete(&self) -> Result<()> {
        self.driver.stop();
        if !self.store.set_active(false)? {
            warn!("challenge solved with no active alarm, no completion recorded");
            self.events.publish(Event::ChallengeSolved { at: Utc::now() });
            return Ok(());
        }
        let record = self.store.record_completion(Local::now().fixed_offset())?;

        info!(date_key = %record.date_key, "challenge solved");
        self.events.publish(Event::ChallengeSolved { at: Utc::now() });
        self.events.publish(Event::CompletionRecorded {
            date_key: record.date_key,
            wake_time: record.wake_time,
        });
        Ok(())
    }

    // ── completion ───────────────────────────────────────────────────

    /// One-shot read of the completion record; the second call in a row
    /// returns `None`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn consume_last_completion(&self) -> Result<Option<CompletionRecord>> {
        self.store.consume_completion()
    }
}
