//! Admission control for outbound completion calls.
//!
//! Keeps a rolling record of admitted call instants and answers two
//! questions before every call: is there room in the current window, and
//! how long must the caller wait to honour the minimum spacing. The
//! controller never sleeps or retries; callers decide what to do with the
//! decision.

use agentgate_config::AdmissionConfig;
use agentgate_core::error::AdmissionError;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the call may go ahead.
    pub allowed: bool,
    /// Allowed: spacing the caller must sleep before calling.
    /// Refused: time until a slot frees up.
    pub wait: Duration,
}

impl AdmissionDecision {
    fn allow(wait: Duration) -> Self {
        Self {
            allowed: true,
            wait,
        }
    }

    fn refuse(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            wait: retry_after,
        }
    }

    /// Convert into the spacing delay, or a rate error if refused.
    pub fn into_result(self) -> Result<Duration, AdmissionError> {
        if self.allowed {
            Ok(self.wait)
        } else {
            Err(AdmissionError::RateExceeded {
                retry_after: self.wait,
            })
        }
    }
}

/// Rolling-window call-rate gate with minimum inter-call spacing.
///
/// Shared by every conversation in the process. Concurrent callers racing
/// the same window may slightly over-admit; the ceiling is a conservative
/// guard, not a mutual-exclusion primitive.
pub struct AdmissionController {
    max_calls: usize,
    window: Duration,
    min_spacing: Duration,
    safety_cap: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            max_calls: config.max_calls_per_window,
            window: config.window(),
            min_spacing: config.min_spacing(),
            safety_cap: config.safety_cap,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Check whether a call may be made now.
    pub fn try_admit(&self) -> AdmissionDecision {
        self.try_admit_at(Instant::now())
    }

    /// Check whether a call may be made at `now`.
    pub fn try_admit_at(&self, now: Instant) -> AdmissionDecision {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());

        // Remove expired timestamps
        while calls
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            calls.pop_front();
        }

        if calls.len() >= self.max_calls {
            let retry_after = calls
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            warn!(
                in_window = calls.len(),
                max_calls = self.max_calls,
                retry_after_ms = retry_after.as_millis() as u64,
                "Admission refused: call rate exceeded"
            );
            return AdmissionDecision::refuse(retry_after);
        }

        let wait = calls
            .back()
            .map(|last| {
                self.min_spacing
                    .saturating_sub(now.saturating_duration_since(*last))
            })
            .unwrap_or(Duration::ZERO);

        debug!(
            in_window = calls.len(),
            wait_ms = wait.as_millis() as u64,
            "Admission granted"
        );
        AdmissionDecision::allow(wait)
    }

    /// Record that a call was made now.
    pub fn record_call(&self) {
        self.record_call_at(Instant::now());
    }

    /// Record that a call was made at `at`.
    pub fn record_call_at(&self, at: Instant) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.push_back(at);

        if calls.len() > self.safety_cap {
            let excess = calls.len().saturating_sub(self.max_calls.min(self.safety_cap));
            calls.drain(..excess);
            warn!(
                safety_cap = self.safety_cap,
                kept = calls.len(),
                "Call record exceeded safety cap, truncated"
            );
        }
    }

    /// Number of call instants currently held (including not yet evicted ones).
    pub fn recorded(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_calls: usize, min_spacing_ms: u64) -> AdmissionConfig {
        AdmissionConfig {
            max_calls_per_window: max_calls,
            window_secs: 60,
            min_spacing_ms,
            safety_cap: 1_000,
        }
    }

    #[test]
    fn admits_exactly_ceiling_per_window() {
        let controller = AdmissionController::new(&config(5, 0));
        let start = Instant::now();

        let mut admitted = Vec::new();
        for i in 0..120 {
            let now = start + Duration::from_millis(i * 500);
            if controller.try_admit_at(now).allowed {
                controller.record_call_at(now);
                admitted.push(now);
            }
        }

        // Every rolling 60s window holds at most 5 admissions.
        for (i, t) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|u| u.duration_since(*t) < Duration::from_secs(60))
                .count();
            assert!(in_window <= 5);
        }
        // The first window is saturated.
        let first_window = admitted
            .iter()
            .filter(|t| t.duration_since(start) < Duration::from_secs(60))
            .count();
        assert_eq!(first_window, 5);
    }

    #[test]
    fn refusal_waits_for_oldest_to_expire() {
        let controller = AdmissionController::new(&config(2, 0));
        let start = Instant::now();
        controller.record_call_at(start);
        controller.record_call_at(start + Duration::from_secs(10));

        let decision = controller.try_admit_at(start + Duration::from_secs(15));
        assert!(!decision.allowed);
        assert_eq!(decision.wait, Duration::from_secs(45));

        let err = decision.into_result().unwrap_err();
        assert!(err.user_message().contains("45"));
    }

    #[test]
    fn window_expiry_frees_slot() {
        let controller = AdmissionController::new(&config(1, 0));
        let start = Instant::now();
        controller.record_call_at(start);

        assert!(!controller.try_admit_at(start + Duration::from_secs(59)).allowed);
        assert!(controller.try_admit_at(start + Duration::from_secs(60)).allowed);
        assert_eq!(controller.recorded(), 0);
    }

    #[test]
    fn spacing_wait_is_remaining_delta() {
        let controller = AdmissionController::new(&config(50, 1_000));
        let start = Instant::now();

        let first = controller.try_admit_at(start);
        assert_eq!(first, AdmissionDecision::allow(Duration::ZERO));
        controller.record_call_at(start);

        let second = controller.try_admit_at(start + Duration::from_millis(300));
        assert!(second.allowed);
        assert_eq!(second.wait, Duration::from_millis(700));

        let third = controller.try_admit_at(start + Duration::from_millis(1_500));
        assert_eq!(third.wait, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn callers_honouring_wait_are_spaced() {
        let controller = AdmissionController::new(&config(50, 1_000));
        let mut admitted: Vec<Instant> = Vec::new();

        for _ in 0..5 {
            let wait = controller.try_admit().into_result().unwrap();
            tokio::time::sleep(wait).await;
            controller.record_call();
            admitted.push(Instant::now());
        }

        for pair in admitted.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_secs(1));
        }
    }

    #[test]
    fn safety_cap_truncates_to_most_recent() {
        let mut cfg = config(50, 0);
        cfg.safety_cap = 100;
        let controller = AdmissionController::new(&cfg);
        let start = Instant::now();

        for i in 0..101 {
            controller.record_call_at(start + Duration::from_millis(i));
        }
        assert_eq!(controller.recorded(), 50);

        // Oldest survivor is call #51.
        let decision = controller.try_admit_at(start + Duration::from_millis(200));
        assert!(!decision.allowed);
        assert_eq!(
            decision.wait,
            Duration::from_secs(60) - Duration::from_millis(200 - 51)
        );
    }

    #[test]
    fn safety_cap_below_ceiling_keeps_cap_most_recent() {
        let mut cfg = config(50, 0);
        cfg.safety_cap = 10;
        let controller = AdmissionController::new(&cfg);
        let start = Instant::now();

        for i in 0..11 {
            controller.record_call_at(start + Duration::from_millis(i));
        }
        assert_eq!(controller.recorded(), 10);
        assert!(controller.try_admit_at(start + Duration::from_millis(20)).allowed);
    }
}
