//! Per-symbol fetch bookkeeping and circuit breaker
//!
//! Callers report every fetch attempt; the tracker turns that history into a
//! [`FetchStatus`] that says whether another attempt is worthwhile. Time is
//! always passed in, never read from the system clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Canonical form of a ticker symbol: trimmed and uppercased
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Windows and thresholds for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerPolicy {
    /// Successes younger than this are fresh
    pub fresh_window: Duration,
    /// Successes younger than this (but not fresh) are stale; older are expired
    pub stale_window: Duration,
    /// Minimum gap after a failure before retrying
    pub retry_interval: Duration,
    /// Consecutive failures that trip the breaker
    pub suspend_threshold: u32,
    /// How long a tripped breaker blocks fetches
    pub suspend_duration: Duration,
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        Self {
            fresh_window: Duration::minutes(15),
            stale_window: Duration::minutes(60),
            retry_interval: Duration::minutes(5),
            suspend_threshold: 5,
            suspend_duration: Duration::hours(1),
        }
    }
}

/// Freshness/availability of a symbol's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    NeverFetched,
    Fresh,
    Stale,
    Expired,
    FailedRecently,
    ReadyToRetry,
    Suspended,
}

impl FetchStatus {
    /// Whether an automatic fetch should be attempted
    pub fn permits_fetch(self) -> bool {
        matches!(
            self,
            FetchStatus::NeverFetched
                | FetchStatus::Stale
                | FetchStatus::Expired
                | FetchStatus::ReadyToRetry
        )
    }

    /// Badge text for cache inspectors
    pub fn label(self) -> &'static str {
        match self {
            FetchStatus::NeverFetched => "Never Fetched",
            FetchStatus::Fresh => "Fresh",
            FetchStatus::Stale => "Stale",
            FetchStatus::Expired => "Expired",
            FetchStatus::FailedRecently => "Failed Recently",
            FetchStatus::ReadyToRetry => "Ready to Retry",
            FetchStatus::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Recorded fetch history for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFetchState {
    pub symbol: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Failures since the last success (or manual reset)
    pub consecutive_failures: u32,
    /// Set while the breaker is open
    pub suspended_until: Option<DateTime<Utc>>,
}

impl SymbolFetchState {
    fn new(symbol: String) -> Self {
        Self {
            symbol,
            last_success_at: None,
            last_failure_at: None,
            consecutive_failures: 0,
            suspended_until: None,
        }
    }

    /// True while `now` falls inside an open breaker window
    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        self.suspended_until.is_some_and(|until| now < until)
    }

    /// Classifies this history at `now`
    pub fn classify(&self, policy: &TrackerPolicy, now: DateTime<Utc>) -> FetchStatus {
        if self.is_suspended(now) {
            return FetchStatus::Suspended;
        }

        match (self.last_success_at, self.last_failure_at) {
            (None, None) => FetchStatus::NeverFetched,
            (success, Some(failure)) if success.map_or(true, |s| failure > s) => {
                if now - failure < policy.retry_interval {
                    FetchStatus::FailedRecently
                } else {
                    FetchStatus::ReadyToRetry
                }
            }
            (Some(success), _) => {
                let age = now - success;
                if age < policy.fresh_window {
                    FetchStatus::Fresh
                } else if age < policy.stale_window {
                    FetchStatus::Stale
                } else {
                    FetchStatus::Expired
                }
            }
            // Unreachable: a failure with no success always matches the failure arm
            (None, Some(_)) => FetchStatus::ReadyToRetry,
        }
    }
}

/// `at + by`, clamped to the latest representable time
fn later_by(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Circuit breaker over every symbol the app fetches
///
/// Symbols are normalized with [`normalize_symbol`], so `aapl` and `AAPL`
/// share one history.
#[derive(Debug, Default)]
pub struct FetchStateTracker {
    policy: TrackerPolicy,
    states: Mutex<HashMap<String, SymbolFetchState>>,
}

impl FetchStateTracker {
    pub fn new(policy: TrackerPolicy) -> Self {
        Self {
            policy,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &TrackerPolicy {
        &self.policy
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, SymbolFetchState>> {
        // The map holds plain data, so a panic elsewhere cannot leave it inconsistent
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a successful fetch, closing the breaker
    pub fn record_success(&self, symbol: &str, at: DateTime<Utc>) {
        let symbol = normalize_symbol(symbol);
        let mut states = self.states();
        let state = states
            .entry(symbol.clone())
            .or_insert_with(|| SymbolFetchState::new(symbol.clone()));
        state.last_success_at = Some(at);
        state.consecutive_failures = 0;
        state.suspended_until = None;
        debug!(symbol = %symbol, "Recorded fetch success");
    }

    /// Records a failed fetch, tripping the breaker at the threshold
    ///
    /// Returns true if this failure suspended the symbol.
    pub fn record_failure(&self, symbol: &str, at: DateTime<Utc>) -> bool {
        let symbol = normalize_symbol(symbol);
        let mut states = self.states();
        let state = states
            .entry(symbol.clone())
            .or_insert_with(|| SymbolFetchState::new(symbol.clone()));
        state.last_failure_at = Some(at);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.consecutive_failures >= self.policy.suspend_threshold {
            let until = later_by(at, self.policy.suspend_duration);
            state.suspended_until = Some(until);
            warn!(
                symbol = %symbol,
                failures = state.consecutive_failures,
                until = %until,
                "Suspending fetches after repeated failures"
            );
            return true;
        }

        debug!(symbol = %symbol, failures = state.consecutive_failures, "Recorded fetch failure");
        false
    }

    /// Current status of `symbol` at `now`
    pub fn classify(&self, symbol: &str, now: DateTime<Utc>) -> FetchStatus {
        let symbol = normalize_symbol(symbol);
        match self.states().get(&symbol) {
            Some(state) => state.classify(&self.policy, now),
            None => FetchStatus::NeverFetched,
        }
    }

    /// Ends a suspension early ("Retry Now"), keeping timestamps
    pub fn clear_suspension(&self, symbol: &str) {
        let symbol = normalize_symbol(symbol);
        if let Some(state) = self.states().get_mut(&symbol) {
            state.suspended_until = None;
            state.consecutive_failures = 0;
            info!(symbol = %symbol, "Cleared fetch suspension");
        }
    }

    /// Forgets every symbol
    pub fn clear_all(&self) {
        self.states().clear();
        info!("Cleared all fetch state");
    }

    /// Copy of the recorded history for `symbol`
    pub fn snapshot(&self, symbol: &str) -> Option<SymbolFetchState> {
        self.states().get(&normalize_symbol(symbol)).cloned()
    }

    /// Every tracked symbol, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.states().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Symbols whose breaker is open at `now`, sorted
    pub fn suspended_symbols(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .states()
            .values()
            .filter(|s| s.is_suspended(now))
            .map(|s| s.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// When an automatic fetch will next be permitted; `None` if permitted now
    pub fn next_attempt_at(&self, symbol: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let state = self.snapshot(symbol)?;
        match state.classify(&self.policy, now) {
            FetchStatus::Fresh => state
                .last_success_at
                .map(|s| later_by(s, self.policy.fresh_window)),
            FetchStatus::FailedRecently => state
                .last_failure_at
                .map(|f| later_by(f, self.policy.retry_interval)),
            FetchStatus::Suspended => state.suspended_until,
            _ => None,
        }
    }
}
