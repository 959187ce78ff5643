//! Vibration escalation.
//!
//! ## Phases
//!
//! - **Phase 1**: moderate pulses, from the moment ringing starts
//! - **Phase 2**: stronger pulses, shorter gaps (default +30s)
//! - **Phase 3**: maximum intensity (default +60s)
//!
//! A phase only ever moves up while one ringing period lasts; a fresh
//! ringing period starts again at phase 1.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::EscalationConfig;

/// Escalating vibration intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VibrationPhase {
    One,
    Two,
    Three,
}

/// A repeating waveform: alternating off/on durations with per-segment
/// amplitude (0-255).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VibrationPattern {
    pub timings_ms: &'static [u64],
    pub amplitudes: &'static [u8],
    /// Index the waveform loops back to after the last segment.
    pub repeat_from: usize,
}

const PHASE_ONE: VibrationPattern = VibrationPattern {
    timings_ms: &[0, 200, 150, 200, 150, 260, 800],
    amplitudes: &[0, 150, 0, 150, 0, 180, 0],
    repeat_from: 0,
};

const PHASE_TWO: VibrationPattern = VibrationPattern {
    timings_ms: &[0, 280, 120, 280, 120, 320, 600],
    amplitudes: &[0, 200, 0, 200, 0, 230, 0],
    repeat_from: 0,
};

const PHASE_THREE: VibrationPattern = VibrationPattern {
    timings_ms: &[0, 360, 100, 360, 100, 420, 500],
    amplitudes: &[0, 255, 0, 255, 0, 255, 0],
    repeat_from: 0,
};

impl VibrationPhase {
    /// Numeric phase (1-3)
    pub fn as_u8(self) -> u8 {
        match self {
            VibrationPhase::One => 1,
            VibrationPhase::Two => 2,
            VibrationPhase::Three => 3,
        }
    }

    pub fn pattern(self) -> &'static VibrationPattern {
        match self {
            VibrationPhase::One => &PHASE_ONE,
            VibrationPhase::Two => &PHASE_TWO,
            VibrationPhase::Three => &PHASE_THREE,
        }
    }

    /// Phase due after `elapsed` time spent ringing.
    pub fn for_elapsed(elapsed: Duration, config: &EscalationConfig) -> Self {
        if elapsed >= config.phase_three_after() {
            VibrationPhase::Three
        } else if elapsed >= config.phase_two_after() {
            VibrationPhase::Two
        } else {
            VibrationPhase::One
        }
    }

    /// The phase following this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            VibrationPhase::One => Some(VibrationPhase::Two),
            VibrationPhase::Two => Some(VibrationPhase::Three),
            VibrationPhase::Three => None,
        }
    }

    /// Offset from ringing start at which this phase begins.
    pub fn starts_after(self, config: &EscalationConfig) -> Duration {
        match self {
            VibrationPhase::One => Duration::ZERO,
            VibrationPhase::Two => config.phase_two_after(),
            VibrationPhase::Three => config.phase_three_after(),
        }
    }
}
