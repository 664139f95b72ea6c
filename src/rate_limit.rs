//! Per-client sliding window rate limiting.
//!
//! Every client identity (usually an IP address) maps to the instants of its
//! admitted requests. A request is admitted when fewer than `limit` of those
//! instants fall inside the trailing `window`, measured from the moment of the
//! check rather than from fixed clock buckets.
//!
//! Memory is bounded only by the sweeper, which drops identities with no
//! activity inside the window. A caller that rotates through many distinct
//! identities (spoofed forwarding headers, large address pools) still grows the
//! map until the next sweep; the limiter does not defend against that.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::LimiterConfig;
use crate::sweeper::spawn_sweeper;

/// Outcome of a single sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub evicted: usize,
    pub remaining: usize,
}

pub(crate) struct LimiterState {
    hits: DashMap<String, VecDeque<Instant>>,
    limit: u32,
    window: Duration,
}

impl LimiterState {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            hits: DashMap::new(),
            limit,
            window,
        }
    }

    // Keeps only the instants strictly after `now - window`.
    fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        hits.retain(|&t| now.saturating_duration_since(t) < window);
    }

    fn allow_at(&self, identity: &str, now: Instant) -> bool {
        // The entry guard holds the shard lock for the whole prune + append.
        let mut entry = self.hits.entry(identity.to_owned()).or_default();
        let hits = entry.value_mut();
        Self::prune(hits, now, self.window);

        if hits.len() >= self.limit as usize {
            return false;
        }
        hits.push_back(now);
        true
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> SweepReport {
        let window = self.window;
        let mut report = SweepReport::default();

        self.hits.retain(|_, hits| {
            Self::prune(hits, now, window);
            if hits.is_empty() {
                report.evicted += 1;
                false
            } else {
                report.remaining += 1;
                true
            }
        });
        report
    }
}

/// Sliding window limiter shared by every request handler.
///
/// Construction spawns the background sweeper on the current tokio runtime.
/// The sweeper stops when the token passed to [`RateLimiter::new`] is
/// cancelled, when [`RateLimiter::shutdown`] is called, or when the limiter is
/// dropped.
pub struct RateLimiter {
    state: Arc<LimiterState>,
    shutdown: CancellationToken,
    sweeper: JoinHandle<()>,
}

impl RateLimiter {
    /// Creates a limiter and starts its sweeper.
    ///
    /// `config` is expected to have passed [`LimiterConfig::validate`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: LimiterConfig, shutdown: CancellationToken) -> Self {
        let state = Arc::new(LimiterState::new(config.limit, config.window));
        let shutdown = shutdown.child_token();
        let sweeper = spawn_sweeper(state.clone(), config.sweep_interval, shutdown.clone());

        Self {
            state,
            shutdown,
            sweeper,
        }
    }

    /// Returns `true` if a request from `identity` is admitted now.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Runs the admission check as if the current time were `now`.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        self.state.allow_at(identity, now)
    }

    /// Runs one sweep pass immediately, outside the background schedule.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        self.state.sweep_at(now)
    }

    pub fn limit(&self) -> u32 {
        self.state.limit
    }

    pub fn window(&self) -> Duration {
        self.state.window
    }

    /// Number of identities currently held in memory, stale or not.
    pub fn tracked(&self) -> usize {
        self.state.hits.len()
    }

    pub fn is_tracked(&self, identity: &str) -> bool {
        self.state.hits.contains_key(identity)
    }

    pub fn is_sweeping(&self) -> bool {
        !self.sweeper.is_finished()
    }

    /// Stops the background sweeper. Admission checks keep working.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[cfg(test)]
    pub(crate) fn stored(&self, identity: &str) -> usize {
        self.state.hits.get(identity).map(|hits| hits.len()).unwrap_or(0)
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.sweeper.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limiter(limit: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            LimiterConfig::new(limit, Duration::from_secs(window_secs)),
            CancellationToken::new(),
        )
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = limiter(5, 60);

        for i in 0..5 {
            assert!(limiter.allow("client"), "request {} should be allowed", i);
        }
        for _ in 0..3 {
            assert!(!limiter.allow("client"));
        }
    }

    #[tokio::test]
    async fn earliest_request_expires_out_of_window() {
        let limiter = limiter(3, 10);
        let t0 = Instant::now();

        assert!(limiter.allow_at("A", t0));
        assert!(limiter.allow_at("A", t0 + secs(1)));
        assert!(limiter.allow_at("A", t0 + secs(2)));
        assert!(!limiter.allow_at("A", t0 + secs(3)));
        assert!(limiter.allow_at("A", t0 + secs(11)));
    }

    #[tokio::test]
    async fn window_boundary_is_exclusive() {
        let limiter = limiter(1, 10);
        let t0 = Instant::now();

        assert!(limiter.allow_at("A", t0));
        assert!(!limiter.allow_at("A", t0 + secs(10) - Duration::from_millis(1)));
        assert!(limiter.allow_at("A", t0 + secs(10)));
    }

    #[tokio::test]
    async fn window_slides_instead_of_resetting() {
        let limiter = limiter(2, 10);
        let t0 = Instant::now();

        assert!(limiter.allow_at("A", t0));
        assert!(limiter.allow_at("A", t0 + secs(9)));
        // A fixed bucket would reset at t0 + 10; the request at t0 + 9 still counts.
        assert!(limiter.allow_at("A", t0 + secs(10)));
        assert!(!limiter.allow_at("A", t0 + secs(12)));
        assert!(limiter.allow_at("A", t0 + secs(19)));
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let limiter = limiter(2, 60);

        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));

        assert!(limiter.allow("b"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("b"));
    }

    #[tokio::test]
    async fn zero_limit_denies_everything() {
        let limiter = limiter(0, 60);

        assert!(!limiter.allow("a"));
        assert!(!limiter.allow("b"));
        assert_eq!(limiter.sweep().evicted, 2);
        assert_eq!(limiter.tracked(), 0);
    }

    #[tokio::test]
    async fn denials_do_not_grow_stored_history() {
        let limiter = limiter(3, 60);
        let t0 = Instant::now();

        for i in 0..1_000 {
            limiter.allow_at("flood", t0 + Duration::from_millis(i));
        }
        assert_eq!(limiter.stored("flood"), 3);
    }

    #[tokio::test]
    async fn sweep_evicts_idle_and_prunes_active() {
        let limiter = limiter(3, 10);
        let t0 = Instant::now();

        assert!(limiter.allow_at("idle", t0));
        assert!(limiter.allow_at("busy", t0));
        assert!(limiter.allow_at("busy", t0 + secs(9)));

        let report = limiter.sweep_at(t0 + secs(10));

        assert_eq!(report, SweepReport { evicted: 1, remaining: 1 });
        assert!(!limiter.is_tracked("idle"));
        assert!(limiter.is_tracked("busy"));
        assert_eq!(limiter.stored("busy"), 1);
    }

    #[tokio::test]
    async fn evicted_identity_starts_fresh() {
        let limiter = limiter(1, 10);
        let t0 = Instant::now();

        assert!(limiter.allow_at("A", t0));
        limiter.sweep_at(t0 + secs(30));
        assert!(!limiter.is_tracked("A"));
        assert!(limiter.allow_at("A", t0 + secs(30)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_exceed_limit() {
        let limiter = Arc::new(limiter(5, 1));

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.allow("shared") })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 5);
        assert_eq!(limiter.stored("shared"), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sweeps_racing_admissions_lose_no_updates() {
        let limiter = Arc::new(limiter(5, 60));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let sweepers: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                let done = done.clone();
                tokio::spawn(async move {
                    while !done.load(std::sync::atomic::Ordering::Relaxed) {
                        limiter.sweep();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let callers: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.allow("shared") })
            })
            .collect();

        let mut admitted = 0;
        for task in callers {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        done.store(true, std::sync::atomic::Ordering::Relaxed);
        for task in sweepers {
            task.await.unwrap();
        }

        assert_eq!(admitted, 5);
        assert_eq!(limiter.stored("shared"), 5);
        assert_eq!(limiter.sweep(), SweepReport { evicted: 0, remaining: 1 });
    }

    #[tokio::test]
    async fn dropping_limiter_leaves_caller_token_alone() {
        let token = CancellationToken::new();
        let limiter = RateLimiter::new(LimiterConfig::new(1, secs(1)), token.clone());
        assert!(limiter.is_sweeping());

        drop(limiter);
        assert!(!token.is_cancelled());
    }

    proptest! {
        // For every call: an admitted one leaves at most `limit` admissions in
        // (t - window, t]; a denied one finds exactly `limit` there already.
        #[test]
        fn matches_brute_force_oracle(
            limit in 1u32..6,
            window_ms in 1u64..1_000,
            mut offsets in proptest::collection::vec(0u64..5_000, 1..200),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let _guard = rt.enter();
            let limiter = RateLimiter::new(
                LimiterConfig::new(limit, Duration::from_millis(window_ms)),
                CancellationToken::new(),
            );

            offsets.sort_unstable();
            let t0 = Instant::now();
            let mut admitted: Vec<u64> = Vec::new();

            for &at in &offsets {
                let allowed = limiter.allow_at("A", t0 + Duration::from_millis(at));
                let in_window = |adm: &[u64]| {
                    adm.iter().filter(|&&s| s <= at && at - s < window_ms).count()
                };

                if allowed {
                    admitted.push(at);
                    prop_assert!(in_window(admitted.as_slice()) <= limit as usize);
                } else {
                    prop_assert_eq!(in_window(admitted.as_slice()), limit as usize);
                }
            }
        }
    }
}
