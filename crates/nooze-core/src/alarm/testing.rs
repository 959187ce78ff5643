//! Recording fakes of the platform seams for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::platform::{AlertSurface, AudioOutput, Vibrator};
use super::vibration::{VibrationPattern, VibrationPhase};
use super::AlarmId;
use crate::error::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Launch,
    Post,
    Cancel,
    Claim,
    Release,
}

#[derive(Default)]
pub(crate) struct FakeSurface {
    pub calls: Mutex<Vec<Call>>,
}

impl FakeSurface {
    pub fn count(&self, call: Call) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }
}

impl AlertSurface for FakeSurface {
    fn launch_ring_ui(&self, _: AlarmId) -> Result<(), PlatformError> {
        self.calls.lock().push(Call::Launch);
        Ok(())
    }
    fn post_alert(&self, _: AlarmId) -> Result<(), PlatformError> {
        self.calls.lock().push(Call::Post);
        Ok(())
    }
    fn cancel_alert(&self, _: AlarmId) {
        self.calls.lock().push(Call::Cancel);
    }
    fn claim_foreground(&self, _: AlarmId) -> Result<(), PlatformError> {
        self.calls.lock().push(Call::Claim);
        Ok(())
    }
    fn release_foreground(&self, _: AlarmId) {
        self.calls.lock().push(Call::Release);
    }
}

/// Each pass lasts five seconds, or fails after one when `failing`.
#[derive(Default)]
pub(crate) struct FakeAudio {
    pub failing: bool,
    pub plays: AtomicU32,
    pub halts: AtomicU32,
}

impl FakeAudio {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn plays(&self) -> u32 {
        self.plays.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioOutput for FakeAudio {
    async fn play(&self) -> Result<(), PlatformError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            tokio::time::sleep(Duration::from_secs(1)).await;
            return Err(PlatformError::Playback("decoder error".into()));
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeVibrator {
    pub patterns: Mutex<Vec<VibrationPattern>>,
    pub cancels: AtomicU32,
}

impl FakeVibrator {
    pub fn phases(&self) -> Vec<VibrationPhase> {
        self.patterns
            .lock()
            .iter()
            .map(|p| {
                [VibrationPhase::One, VibrationPhase::Two, VibrationPhase::Three]
                    .into_iter()
                    .find(|phase| phase.pattern() == p)
                    .expect("unknown vibration pattern")
            })
            .collect()
    }
}

impl Vibrator for FakeVibrator {
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), PlatformError> {
        self.patterns.lock().push(*pattern);
        Ok(())
    }
    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

