//! Page automation: one browser page driven through a submission.

pub mod captcha;
pub mod engine;
pub mod outcome;
pub mod screenshot;

pub use engine::PageAutomation;
pub use screenshot::ScreenshotStore;

use std::time::Duration;

/// Waits and delays applied by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTimings {
    pub navigation_timeout: Duration,
    /// Extra wait after the page reports loaded.
    pub settle_after_load: Duration,
    /// Bound on waiting for a field to become visible.
    pub element_wait: Duration,
    pub keystroke_delay: Duration,
    /// Pause between consecutive field fills.
    pub field_pacing: Duration,
    pub submit_settle: Duration,
    pub verify_settle: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            settle_after_load: Duration::from_secs(2),
            element_wait: Duration::from_secs(5),
            keystroke_delay: Duration::from_millis(50),
            field_pacing: Duration::from_millis(300),
            submit_settle: Duration::from_secs(3),
            verify_settle: Duration::from_secs(3),
        }
    }
}

impl EngineTimings {
    /// No delays at all; element waits check once.
    pub fn instant() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(5),
            settle_after_load: Duration::ZERO,
            element_wait: Duration::ZERO,
            keystroke_delay: Duration::ZERO,
            field_pacing: Duration::ZERO,
            submit_settle: Duration::ZERO,
            verify_settle: Duration::ZERO,
        }
    }
}

pub(crate) async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
