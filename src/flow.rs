//! Per-session producer flow control (§4.6). A token-bucket credit
//! accountant: each admitted content message consumes one credit, credit is
//! replenished continuously at `rate` messages/sec, and accumulated new
//! credit is flushed to the peer as `message.flow` once it crosses a
//! threshold rather than on every single message.

use std::time::{Duration, Instant};

/// `rate == 0` means unlimited: every message is admitted and no
/// `message.flow`/`message.stop` traffic is ever generated.
#[derive(Debug, Clone, Copy)]
pub struct FlowConfig {
    pub rate: u32,
}

impl FlowConfig {
    pub const fn unlimited() -> Self {
        Self { rate: 0 }
    }

    pub const fn rate(rate: u32) -> Self {
        Self { rate }
    }
}

/// Outcome of admitting one content message (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowDecision {
    /// The message was refused; the caller must send `message.stop("")`.
    pub stopped: bool,
    /// Non-`None` when accumulated new credit crossed the emit threshold;
    /// the caller must send `message.flow("", MESSAGE, credit)`.
    pub emit_credit: Option<u32>,
}

/// Fraction of `rate` accumulated before a `message.flow` is emitted. Chosen
/// so a full-rate producer sees roughly ten `message.flow` frames per
/// second rather than one per message; not specified numerically in the
/// design, so this is an implementation decision (see DESIGN.md).
fn emit_threshold(rate: u32) -> u32 {
    (rate / 10).max(1)
}

/// Per-session credit accountant (§3 `FlowControl`, §4.6).
#[derive(Debug)]
pub struct FlowController {
    config: FlowConfig,
    window: f64,
    last_issue: Instant,
    accumulated_since_emit: u32,
}

impl FlowController {
    /// Issues initial credit on attach: `min(rate, 300)` messages (§4.6).
    pub fn new(config: FlowConfig) -> Self {
        let initial = if config.rate == 0 {
            0
        } else {
            config.rate.min(300)
        };
        Self {
            config,
            window: initial as f64,
            last_issue: Instant::now(),
            accumulated_since_emit: 0,
        }
    }

    pub fn rate(&self) -> u32 {
        self.config.rate
    }

    fn replenish(&mut self, now: Instant) {
        if self.config.rate == 0 {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_issue);
        self.window += elapsed.as_secs_f64() * self.config.rate as f64;
        self.last_issue = now;
    }

    /// Admits (or refuses) one content message at `now`.
    pub fn admit(&mut self, now: Instant) -> FlowDecision {
        if self.config.rate == 0 {
            return FlowDecision {
                stopped: false,
                emit_credit: None,
            };
        }

        self.replenish(now);

        if self.window < 1.0 {
            return FlowDecision {
                stopped: true,
                emit_credit: None,
            };
        }

        self.window -= 1.0;
        self.accumulated_since_emit += 1;

        let threshold = emit_threshold(self.config.rate);
        let emit_credit = if self.accumulated_since_emit >= threshold {
            let credit = self.accumulated_since_emit;
            self.accumulated_since_emit = 0;
            Some(credit)
        } else {
            None
        };

        FlowDecision {
            stopped: false,
            emit_credit,
        }
    }

    /// How long to wait before retrying admission after a `stopped` decision:
    /// `min(50/rate seconds, 500ms)` (§4.6).
    pub fn retry_delay(&self) -> Duration {
        if self.config.rate == 0 {
            return Duration::ZERO;
        }
        let secs = 50.0 / self.config.rate as f64;
        Duration::from_secs_f64(secs.min(0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_rate_never_stops() {
        let mut flow = FlowController::new(FlowConfig::unlimited());
        let now = Instant::now();
        for _ in 0..10_000 {
            assert!(!flow.admit(now).stopped);
        }
    }

    #[test]
    fn initial_credit_caps_at_300() {
        let flow = FlowController::new(FlowConfig::rate(10_000));
        assert_eq!(flow.window as u32, 300);
    }

    #[test]
    fn initial_credit_is_rate_when_below_300() {
        let flow = FlowController::new(FlowConfig::rate(50));
        assert_eq!(flow.window as u32, 50);
    }

    #[test]
    fn exhausting_initial_credit_stops_admission() {
        let mut flow = FlowController::new(FlowConfig::rate(10));
        let now = Instant::now();
        for _ in 0..10 {
            assert!(!flow.admit(now).stopped);
        }
        assert!(flow.admit(now).stopped);
    }

    #[test]
    fn credit_replenishes_over_time() {
        let mut flow = FlowController::new(FlowConfig::rate(10));
        let now = Instant::now();
        for _ in 0..10 {
            flow.admit(now);
        }
        assert!(flow.admit(now).stopped);
        let later = now + Duration::from_secs(1);
        assert!(!flow.admit(later).stopped);
    }

    #[test]
    fn retry_delay_is_clamped_to_500ms() {
        let flow = FlowController::new(FlowConfig::rate(1));
        assert_eq!(flow.retry_delay(), Duration::from_millis(500));
        let flow_fast = FlowController::new(FlowConfig::rate(1000));
        assert_eq!(flow_fast.retry_delay(), Duration::from_micros(50_000));
    }

    #[test]
    fn bounded_admission_rate_matches_rate_times_time_plus_initial() {
        // §8 flow-control property: at rate=R for T seconds a 2R producer is
        // admitted at most R*T + initialCredit messages.
        let rate = 100u32;
        let mut flow = FlowController::new(FlowConfig::rate(rate));
        let start = Instant::now();
        let mut admitted = 0u32;
        // Simulate a 2R producer across 1-second steps for 3 seconds.
        for second in 0..3 {
            let now = start + Duration::from_secs(second);
            for _ in 0..(rate * 2) {
                if !flow.admit(now).stopped {
                    admitted += 1;
                }
            }
        }
        let initial_credit = rate.min(300);
        assert!(admitted <= rate * 3 + initial_credit);
    }
}
