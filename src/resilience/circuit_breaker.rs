//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: testing if upstream recovered
//!
//! # Design Decisions
//! - One breaker per (service, operation), created lazily in [`CircuitBreakers`]
//! - Fail fast in Open state (the wrapped call is never started)
//! - Single probe in Half-Open; concurrent callers are rejected, not queued
//! - Observers are notified after the state lock is released

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::registry::ServiceName;
use crate::resilience::state::{
    Admission, BreakerCore, BreakerSettings, BreakerState, Outcome, Transition,
};
use crate::transport::CallError;

/// Identifies one protected operation on one service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakerKey {
    pub service: ServiceName,
    pub operation: String,
}

impl BreakerKey {
    pub fn new(service: ServiceName, operation: impl Into<String>) -> Self {
        Self {
            service,
            operation: operation.into(),
        }
    }
}

impl fmt::Display for BreakerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.operation)
    }
}

/// Receives breaker state transitions.
pub trait BreakerObserver: Send + Sync {
    fn on_transition(&self, key: &BreakerKey, from: BreakerState, to: BreakerState);
}

/// Default observer: structured log line plus state gauge.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl BreakerObserver for LoggingObserver {
    fn on_transition(&self, key: &BreakerKey, from: BreakerState, to: BreakerState) {
        match to {
            BreakerState::Open => tracing::warn!(
                service = %key.service,
                operation = %key.operation,
                from = from.as_str(),
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                service = %key.service,
                operation = %key.operation,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker transition"
            ),
        }
        metrics::record_breaker_transition(key.service.as_str(), &key.operation, to);
    }
}

/// Point-in-time view of a breaker, for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub operation: String,
    pub state: BreakerState,
    pub window_calls: usize,
    pub window_failures: usize,
    pub failure_ratio: f64,
    pub next_cooldown_ms: u64,
    pub remaining_cooldown_ms: Option<u64>,
}

/// Circuit breaker guarding one (service, operation) pair.
pub struct CircuitBreaker {
    key: BreakerKey,
    core: Mutex<BreakerCore>,
    observer: Arc<dyn BreakerObserver>,
}

impl CircuitBreaker {
    pub fn new(
        key: BreakerKey,
        config: &CircuitBreakerConfig,
        observer: Arc<dyn BreakerObserver>,
    ) -> Self {
        metrics::record_breaker_state(key.service.as_str(), &key.operation, BreakerState::Closed);
        Self {
            key,
            core: Mutex::new(BreakerCore::new(BreakerSettings::from(config))),
            observer,
        }
    }

    pub fn key(&self) -> &BreakerKey {
        &self.key
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state()
    }

    /// Ask for permission to make one call.
    ///
    /// The returned permit must be resolved with [`BreakerPermit::record`];
    /// dropping it unresolved only frees a Half-Open probe slot.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, CallError> {
        let (admission, transition) = self.lock().admit(Instant::now());
        self.notify(transition);

        match admission {
            Admission::Reject => {
                tracing::debug!(breaker = %self.key, "Call short-circuited");
                Err(CallError::BreakerOpen)
            }
            admission => {
                if admission == Admission::Probe {
                    tracing::info!(breaker = %self.key, "Admitting half-open probe");
                }
                Ok(BreakerPermit {
                    breaker: self,
                    admission,
                    resolved: false,
                })
            }
        }
    }

    /// Run `f` under the breaker. Rejected calls never invoke `f`.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let permit = self.try_acquire()?;
        let result = f().await;
        permit.record_result(&result);
        result
    }

    /// Force the breaker back to Closed with an empty window.
    pub fn reset(&self) {
        let transition = self.lock().reset();
        self.notify(transition);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.lock();
        let window = core.window();
        BreakerSnapshot {
            service: self.key.service.to_string(),
            operation: self.key.operation.clone(),
            state: core.state(),
            window_calls: window.len(),
            window_failures: window.failures(),
            failure_ratio: window.failure_ratio(),
            next_cooldown_ms: duration_ms(core.current_cooldown()),
            remaining_cooldown_ms: core.remaining_cooldown(Instant::now()).map(duration_ms),
        }
    }

    fn record(&self, admission: Admission, outcome: Outcome) {
        let transition = self.lock().record(admission, outcome, Instant::now());
        self.notify(transition);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        // A panic while holding the lock cannot leave the core half-updated.
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, transition: Option<Transition>) {
        if let Some(Transition { from, to }) = transition {
            self.observer.on_transition(&self.key, from, to);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

/// Permission for one call through a breaker.
#[must_use = "a permit must be resolved with record()"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    resolved: bool,
}

impl BreakerPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.admission == Admission::Probe
    }

    pub fn record(mut self, outcome: Outcome) {
        self.resolved = true;
        self.breaker.record(self.admission, outcome);
    }

    pub fn record_success(self) {
        self.record(Outcome::Success);
    }

    pub fn record_failure(self) {
        self.record(Outcome::Failure);
    }

    /// Classify a call result and record it.
    pub fn record_result<T>(self, result: &Result<T, CallError>) {
        let outcome = match result {
            Err(e) if e.is_breaker_failure() => Outcome::Failure,
            _ => Outcome::Success,
        };
        self.record(outcome);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        match self.admission {
            Admission::Probe => {
                tracing::debug!(breaker = %self.breaker.key, "Half-open probe abandoned");
                self.breaker.lock().abandon_probe();
            }
            // A closed-state call cut off by its caller never finished in time.
            Admission::Pass { .. } => {
                tracing::debug!(breaker = %self.breaker.key, "Call abandoned, counted as failure");
                self.breaker.record(self.admission, Outcome::Failure);
            }
            Admission::Reject => {}
        }
    }
}

/// Lazily created breakers, one per (service, operation).
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    observer: Arc<dyn BreakerObserver>,
    breakers: DashMap<BreakerKey, Arc<CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_observer(config, Arc::new(LoggingObserver))
    }

    pub fn with_observer(config: CircuitBreakerConfig, observer: Arc<dyn BreakerObserver>) -> Self {
        Self {
            config,
            observer,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `(service, operation)`, created on first use.
    pub fn get(&self, service: &ServiceName, operation: &str) -> Arc<CircuitBreaker> {
        let key = BreakerKey::new(service.clone(), operation);
        if let Some(existing) = self.breakers.get(&key) {
            return existing.clone();
        }
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(key, &self.config, self.observer.clone()))
            })
            .clone()
    }

    /// Breaker for `(service, operation)` if one has been created.
    pub fn find(&self, service: &ServiceName, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(&BreakerKey::new(service.clone(), operation))
            .map(|e| e.value().clone())
    }

    /// Snapshots of every breaker, ordered by key.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();
        breakers.sort_by(|a, b| a.key().cmp(b.key()));
        breakers.iter().map(|b| b.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: 20,
            minimum_calls: 20,
            failure_ratio_threshold: 0.5,
            cooldown_ms: 5_000,
            cooldown_multiplier: 2.0,
            max_cooldown_ms: 60_000,
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        transitions: Mutex<Vec<(BreakerState, BreakerState)>>,
    }

    impl BreakerObserver for RecordingObserver {
        fn on_transition(&self, _key: &BreakerKey, from: BreakerState, to: BreakerState) {
            self.transitions.lock().unwrap().push((from, to));
        }
    }

    fn breaker_with(observer: Arc<dyn BreakerObserver>) -> CircuitBreaker {
        let key = BreakerKey::new(ServiceName::new("order-service").unwrap(), "names");
        CircuitBreaker::new(key, &config(), observer)
    }

    async fn fail_times(breaker: &CircuitBreaker, n: usize, err: CallError) {
        for _ in 0..n {
            let _ = breaker.call(|| async { Err::<(), _>(err.clone()) }).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_never_invokes_call() {
        let breaker = breaker_with(Arc::new(LoggingObserver));
        fail_times(&breaker, 20, CallError::Timeout).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        let attempts = AtomicUsize::new(0);
        for _ in 0..50 {
            let result = breaker
                .call(|| async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CallError>(())
                })
                .await;
            assert_eq!(result, Err(CallError::BreakerOpen));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        let result = breaker
            .call(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallError>(())
            })
            .await;
        assert_eq!(result, Ok(()));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn client_errors_do_not_trip() {
        let breaker = breaker_with(Arc::new(LoggingObserver));
        fail_times(&breaker, 10, CallError::UpstreamError { status: 404 }).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().window_failures, 0);

        fail_times(&breaker, 30, CallError::UpstreamError { status: 400 }).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn server_errors_and_missing_endpoints_trip() {
        let breaker = breaker_with(Arc::new(LoggingObserver));
        fail_times(&breaker, 10, CallError::UpstreamError { status: 502 }).await;
        fail_times(&breaker, 10, CallError::NoEndpointsAvailable).await;
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_exactly_one_of_ten() {
        let breaker = Arc::new(breaker_with(Arc::new(LoggingObserver)));
        fail_times(&breaker, 20, CallError::ConnectionError("refused".into())).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let live = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let breaker = breaker.clone();
            let live = live.clone();
            let mut release = release_rx.clone();
            tasks.spawn(async move {
                breaker
                    .call(|| async move {
                        live.fetch_add(1, Ordering::SeqCst);
                        let _ = release.wait_for(|go| *go).await;
                        Ok::<_, CallError>(())
                    })
                    .await
            });
        }

        // Let every task reach the breaker before releasing the probe.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(live.load(Ordering::SeqCst), 1);
        release_tx.send_replace(true);

        let mut ok = 0;
        let mut rejected = 0;
        while let Some(res) = tasks.join_next().await {
            match res.unwrap() {
                Ok(()) => ok += 1,
                Err(CallError::BreakerOpen) => rejected += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!((ok, rejected), (1, 9));
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_probe_releases_slot() {
        let breaker = breaker_with(Arc::new(LoggingObserver));
        fail_times(&breaker, 20, CallError::Timeout).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let permit = breaker.try_acquire().unwrap();
        assert!(permit.is_probe());
        assert!(breaker.try_acquire().is_err());
        drop(permit);

        let permit = breaker.try_acquire().unwrap();
        assert!(permit.is_probe());
        permit.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.snapshot().remaining_cooldown_ms, Some(10_000));
    }

    #[tokio::test]
    async fn abandoned_call_counts_as_failure() {
        let breaker = breaker_with(Arc::new(LoggingObserver));
        for _ in 0..20 {
            let permit = breaker.try_acquire().unwrap();
            assert!(!permit.is_probe());
            drop(permit);
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let breaker = breaker_with(Arc::new(LoggingObserver));
        let cut_off = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| std::future::pending::<Result<(), CallError>>()),
        )
        .await;
        assert!(cut_off.is_err());
        assert_eq!(breaker.snapshot().window_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_reach_observer() {
        let observer = Arc::new(RecordingObserver::default());
        let breaker = breaker_with(observer.clone());

        fail_times(&breaker, 20, CallError::Timeout).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        breaker.call(|| async { Ok::<_, CallError>(()) }).await.unwrap();

        let seen = observer.transitions.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Closed),
            ]
        );
    }

    #[test]
    fn registry_reuses_breakers() {
        let breakers = CircuitBreakers::new(config());
        let svc = ServiceName::new("order-service").unwrap();
        let a = breakers.get(&svc, "names");
        let b = breakers.get(&svc, "names");
        let c = breakers.get(&svc, "proxy");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let snaps = breakers.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].operation, "names");
        assert_eq!(snaps[1].operation, "proxy");
    }
}
