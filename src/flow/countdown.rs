//! Advisory resend timer for the code step.

use std::time::{Duration, Instant};

pub const DEFAULT_RESEND_COOLDOWN: Duration = Duration::from_secs(60);

/// Disables the resend control for a fixed period after each send.
///
/// Only the client honours it; the backend accepts earlier requests.
#[derive(Clone, Copy, Debug)]
pub struct ResendCountdown {
    cooldown: Duration,
    started_at: Option<Instant>,
}

impl ResendCountdown {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            started_at: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    pub fn reset(&mut self) {
        self.started_at = None;
    }

    /// Whole seconds left, rounded up so the UI never shows zero while disabled.
    #[must_use]
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let Some(started_at) = self.started_at else {
            return 0;
        };
        let elapsed = now.saturating_duration_since(started_at);
        let left = self.cooldown.saturating_sub(elapsed);
        let secs = left.as_secs();
        if left.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    #[must_use]
    pub fn is_active(&self, now: Instant) -> bool {
        self.remaining_secs(now) > 0
    }
}

impl Default for ResendCountdown {
    fn default() -> Self {
        Self::new(DEFAULT_RESEND_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_until_started() {
        let countdown = ResendCountdown::default();
        assert_eq!(countdown.remaining_secs(Instant::now()), 0);
        assert!(!countdown.is_active(Instant::now()));
    }

    #[test]
    fn counts_down_in_whole_seconds() {
        let start = Instant::now();
        let mut countdown = ResendCountdown::default();
        countdown.start(start);
        assert_eq!(countdown.remaining_secs(start), 60);
        assert_eq!(
            countdown.remaining_secs(start + Duration::from_millis(1500)),
            59
        );
        assert_eq!(countdown.remaining_secs(start + Duration::from_secs(59)), 1);
        assert!(!countdown.is_active(start + Duration::from_secs(60)));
    }

    #[test]
    fn restart_extends_the_window() {
        let start = Instant::now();
        let mut countdown = ResendCountdown::new(Duration::from_secs(10));
        countdown.start(start);
        countdown.start(start + Duration::from_secs(8));
        assert_eq!(countdown.remaining_secs(start + Duration::from_secs(10)), 8);
        countdown.reset();
        assert!(!countdown.is_active(start + Duration::from_secs(10)));
    }
}
