//! # Nooze Core Library
//!
//! This library provides the alarm lifecycle of the Nooze wake-up
//! enforcer: a daily alarm that fires reliably, escalates until the user
//! solves an arithmetic challenge, and keeps re-arming itself whether or
//! not the challenge is ever solved. The `nooze` CLI is a thin shell over
//! the same library.
//!
//! ## Architecture
//!
//! - **Trigger Scheduler**: computes the next occurrence and registers the
//!   single platform wake-up for the alarm id
//! - **Wake Dispatcher**: runs on every fire; activates enforcement, starts
//!   the alert and re-arms tomorrow unconditionally
//! - **Alert Driver**: looping playback, vibration escalation and periodic
//!   re-assertion of the alert while the ring screen is hidden
//! - **Challenge Gate**: the batch of problems that must be solved to stop
//! - **Boot Recovery**: re-arms from persisted state after a restart
//! - **Storage**: SQLite key/value state and TOML configuration
//!
//! Components coordinate only through [`EnforcementStore`], never through
//! references to each other.
//!
//! ## Key Components
//!
//! - [`AlarmService`]: the call surface for outer shells
//! - [`EnforcementStore`]: durable shared flags
//! - [`Config`]: escalation and challenge tunables
//! - [`Event`]: lifecycle notifications

pub mod alarm;
pub mod error;
pub mod events;
pub mod service;
pub mod state;
pub mod storage;

pub use alarm::{
    next_occurrence, AlarmId, AlertState, ChallengeGate, DispatchOutcome, Operator, Problem,
    RecoveryOutcome, TimerPrecision, Verdict, VibrationPhase, WakeTime,
};
pub use error::{ChallengeError, ConfigError, CoreError, DatabaseError, PlatformError, ValidationError};
pub use events::{Event, EventBus};
pub use service::{AlarmService, Platform};
pub use state::{CompletionRecord, EnforcementSnapshot, EnforcementStore};
pub use storage::{Config, Database};
