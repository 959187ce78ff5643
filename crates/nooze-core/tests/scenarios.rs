//! End-to-end lifecycle scenarios.
//!
//! Each scenario wires a full `AlarmService` to the built-in tokio timer
//! and wake lock plus recording fakes for the user-facing seams, on a
//! paused tokio clock.
//!
//! | Scenario | Drives                         | Checks                                   |
//! |----------|--------------------------------|------------------------------------------|
//! | A        | schedule 07:00 at 06:59:00     | trigger today 07:00                      |
//! | B        | schedule 07:00 at 07:00:01     | trigger tomorrow 07:00                   |
//! | C        | fire at 07:00:00               | tomorrow armed, active, ringing          |
//! | D        | solve all 4 problems           | inactive, completion pending, stopped    |
//! | E        | consume twice                  | record, then none                        |

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use nooze_core::alarm::{
    AlarmId, AlertSurface, AudioOutput, TimedWakeLock, TimerPrecision, TokioWakeupTimer,
    VibrationPattern, Vibrator, WakeupTimer,
};
use nooze_core::{
    AlarmService, AlertState, Config, EnforcementStore, Event, Platform, PlatformError, Verdict,
    WakeTime,
};

// ============================================================================
// Recording fakes
// ============================================================================

#[derive(Default)]
struct Surface {
    launches: AtomicU32,
    posts: AtomicU32,
    releases: AtomicU32,
}

impl AlertSurface for Surface {
    fn launch_ring_ui(&self, _: AlarmId) -> Result<(), PlatformError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn post_alert(&self, _: AlarmId) -> Result<(), PlatformError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn cancel_alert(&self, _: AlarmId) {}
    fn claim_foreground(&self, _: AlarmId) -> Result<(), PlatformError> {
        Ok(())
    }
    fn release_foreground(&self, _: AlarmId) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct Audio;

#[async_trait]
impl AudioOutput for Audio {
    async fn play(&self) -> Result<(), PlatformError> {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok(())
    }
    fn halt(&self) {}
}

struct Haptics;

impl Vibrator for Haptics {
    fn vibrate(&self, _: &VibrationPattern) -> Result<(), PlatformError> {
        Ok(())
    }
    fn cancel(&self) {}
}

// ============================================================================
// Test Helpers
// ============================================================================

struct Rig {
    service: AlarmService,
    timer: TokioWakeupTimer,
    surface: Arc<Surface>,
}

fn rig_with_store(store: EnforcementStore) -> Rig {
    let (timer, _fires) = TokioWakeupTimer::new();
    let surface = Arc::new(Surface::default());
    let platform = Platform {
        timer: Arc::new(timer.clone()),
        wake_lock: Arc::new(TimedWakeLock::new()),
        surface: surface.clone(),
        audio: Arc::new(Audio),
        vibrator: Arc::new(Haptics),
    };
    let mut config = Config::default();
    config.challenge.seed = Some(7);
    Rig {
        service: AlarmService::new(config, store, platform),
        timer,
        surface,
    }
}

fn rig() -> Rig {
    rig_with_store(EnforcementStore::in_memory().unwrap())
}

/// UTC+9, a zone with no transitions.
fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .unwrap()
}

fn seven() -> WakeTime {
    WakeTime::new(7, 0).unwrap()
}

fn solve_all(service: &AlarmService) -> Verdict {
    service.begin_challenge().unwrap();
    let mut last = Verdict::Rejected;
    while let Some(problem) = service.current_problem() {
        last = service.submit_challenge_answer(problem.answer()).unwrap();
    }
    last
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn scenario_a_schedule_before_time_fires_today() {
    let r = rig();
    let fire_at = r
        .service
        .schedule_daily_at(1001, seven(), &local(2031, 4, 10, 6, 59, 0))
        .unwrap();

    let today = local(2031, 4, 10, 7, 0, 0).with_timezone(&Utc);
    assert_eq!(fire_at, today);
    assert_eq!(r.timer.pending(1001).unwrap().fire_at, today);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_schedule_after_time_fires_tomorrow() {
    let r = rig();
    let fire_at = r
        .service
        .schedule_daily_at(1001, seven(), &local(2031, 4, 10, 7, 0, 1))
        .unwrap();

    assert_eq!(fire_at, local(2031, 4, 11, 7, 0, 0).with_timezone(&Utc));
    assert_eq!(r.timer.pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_fire_rearms_tomorrow_and_activates() {
    let r = rig();
    r.service
        .schedule_daily_at(1001, seven(), &local(2031, 4, 10, 6, 59, 0))
        .unwrap();

    let outcome = r.service.on_fire_at(1001, &local(2031, 4, 10, 7, 0, 0));

    let tomorrow = local(2031, 4, 11, 7, 0, 0).with_timezone(&Utc);
    assert!(outcome.started);
    assert_eq!(outcome.next_trigger, Some(tomorrow));
    assert_eq!(r.timer.pending(1001).unwrap().fire_at, tomorrow);
    assert_eq!(r.timer.pending_count(), 1);
    assert!(r.service.store().is_active().unwrap());
    assert_eq!(r.service.alert_state(), AlertState::Ringing);
    assert_eq!(r.surface.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_solving_clears_active_and_records_completion() {
    let r = rig();
    r.service
        .schedule_daily_at(1001, seven(), &local(2031, 4, 10, 6, 59, 0))
        .unwrap();
    r.service.on_fire_at(1001, &local(2031, 4, 10, 7, 0, 0));
    tokio::time::sleep(Duration::from_secs(40)).await;

    let mut events = r.service.events().subscribe();
    assert_eq!(solve_all(&r.service), Verdict::Solved);

    assert!(!r.service.store().is_active().unwrap());
    assert!(r.service.store().completion_pending().unwrap());
    assert_eq!(r.service.alert_state(), AlertState::Stopped);
    assert_eq!(r.surface.releases.load(Ordering::SeqCst), 1);
    // Tomorrow's trigger is untouched by the solve.
    assert_eq!(
        r.timer.pending(1001).unwrap().fire_at,
        local(2031, 4, 11, 7, 0, 0).with_timezone(&Utc)
    );

    let mut advanced = 0;
    let mut solved = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::ChallengeAdvanced { .. } => advanced += 1,
            Event::ChallengeSolved { .. } => solved += 1,
            _ => {}
        }
    }
    assert_eq!((advanced, solved), (3, 1));

    let posts = r.surface.posts.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(r.surface.posts.load(Ordering::SeqCst), posts);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_completion_is_consumed_once() {
    let r = rig();
    r.service.on_fire_at(1001, &local(2031, 4, 10, 7, 0, 0));
    solve_all(&r.service);

    let record = r.service.consume_last_completion().unwrap();
    let record = record.expect("first read returns the record");
    assert_eq!(record.date_key.len(), 10);
    assert!(r.service.consume_last_completion().unwrap().is_none());
    assert!(!r.service.store().completion_pending().unwrap());
}

// ============================================================================
// Restart and recurrence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn recovery_after_restart_uses_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nooze.db");

    {
        let r = rig_with_store(EnforcementStore::open_at(&path).unwrap());
        r.service
            .schedule_daily_at(55, seven(), &local(2031, 4, 10, 6, 0, 0))
            .unwrap();
    }

    // A new process: nothing armed until recovery runs.
    let r = rig_with_store(EnforcementStore::open_at(&path).unwrap());
    assert_eq!(r.timer.pending_count(), 0);

    r.service.recover_at(&local(2031, 4, 12, 9, 30, 0)).unwrap();
    assert_eq!(
        r.timer.pending(55).unwrap().fire_at,
        local(2031, 4, 13, 7, 0, 0).with_timezone(&Utc)
    );
    assert_eq!(r.service.alert_state(), AlertState::Idle);
}

#[tokio::test(start_paused = true)]
async fn unsolved_alarm_still_rearms_every_day() {
    let r = rig();
    r.service
        .schedule_daily_at(1001, seven(), &local(2031, 4, 10, 6, 0, 0))
        .unwrap();

    r.service.on_fire_at(1001, &local(2031, 4, 10, 7, 0, 0));
    let second = r.service.on_fire_at(1001, &local(2031, 4, 11, 7, 0, 0));

    // Still ringing from the first day, so nothing new starts, but the
    // recurrence keeps moving.
    assert!(!second.started);
    assert_eq!(
        second.next_trigger,
        Some(local(2031, 4, 12, 7, 0, 0).with_timezone(&Utc))
    );
}

#[tokio::test]
async fn delivered_fire_reaches_the_receiver() {
    let (timer, mut fires) = TokioWakeupTimer::new();
    let store = EnforcementStore::in_memory().unwrap();
    let platform = Platform {
        timer: Arc::new(timer.clone()),
        wake_lock: Arc::new(TimedWakeLock::new()),
        surface: Arc::new(Surface::default()),
        audio: Arc::new(Audio),
        vibrator: Arc::new(Haptics),
    };
    let service = AlarmService::new(Config::default(), store, platform);

    let soon = Utc::now() + chrono::Duration::milliseconds(50);
    let wake = WakeTime::new(0, 0).unwrap();
    service.schedule_daily_at(9, wake, &Utc::now()).unwrap();
    // Re-register the same id a moment from now; the daily registration
    // is superseded.
    timer.register(9, soon, TimerPrecision::AlarmClock).unwrap();

    let fire = tokio::time::timeout(Duration::from_secs(5), fires.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fire.alarm_id, 9);
    assert_eq!(timer.pending_count(), 0);
}
