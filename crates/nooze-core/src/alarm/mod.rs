//! The alarm lifecycle: scheduling, dispatch, alerting, the challenge and
//! recovery after restart.

mod alert;
mod challenge;
mod dispatcher;
pub mod platform;
mod recovery;
mod scheduler;
#[cfg(test)]
pub(crate) mod testing;
mod time;
pub mod timer;
mod vibration;

/// Stable identifier of the single alarm slot, reused across re-arms.
pub type AlarmId = u32;

pub use alert::{AlertDriver, AlertState};
pub use challenge::{ChallengeGate, Operator, Problem, Verdict};
pub use dispatcher::{DispatchOutcome, WakeDispatcher};
pub use platform::{
    AlertSurface, AudioOutput, TimerPrecision, Vibrator, WakeHold, WakeLock, WakeupTimer,
};
pub use recovery::{BootRecovery, RecoveryOutcome};
pub use scheduler::TriggerScheduler;
pub use time::{date_key, next_occurrence, WakeTime};
pub use timer::{Fire, PendingTrigger, TimedWakeLock, TokioWakeupTimer};
pub use vibration::{VibrationPattern, VibrationPhase};
