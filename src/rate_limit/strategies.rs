use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::rate_limit::store::{InMemoryWindowStore, WindowStore};
use crate::rate_limit::{Decision, RateLimitPool, RateLimiter};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Checks between idle-window sweeps unless the builder says otherwise.
pub const DEFAULT_SWEEP_INTERVAL: u64 = 4_096;

/// Timestamps (epoch millis) of the requests admitted for one `(pool, identity)` key.
///
/// Pruning is lazy: old timestamps are only dropped when the window is next consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingWindow {
    admitted: VecDeque<u64>,
}

impl SlidingWindow {
    /// Drop every timestamp older than `now - window_ms`.
    pub fn prune(&mut self, now: u64, window_ms: u64) {
        let cutoff = now.saturating_sub(window_ms);
        while self.admitted.front().is_some_and(|&t| t < cutoff) {
            self.admitted.pop_front();
        }
    }

    /// Prune, then record `now` if the window holds fewer than `limit` admissions.
    /// A denial leaves the window untouched.
    pub fn try_admit(&mut self, now: u64, window_ms: u64, limit: u32) -> bool {
        self.prune(now, window_ms);
        if self.admitted.len() >= limit as usize {
            return false;
        }
        // Kept sorted even if the clock steps back, so the front is always the oldest.
        let at = self.admitted.partition_point(|&t| t <= now);
        self.admitted.insert(at, now);
        true
    }

    /// Quota left for `limit`, assuming the window was just pruned.
    pub fn remaining(&self, limit: u32) -> u32 {
        let used = u32::try_from(self.admitted.len()).unwrap_or(u32::MAX);
        limit.saturating_sub(used)
    }

    /// When the oldest admission leaves the window, or `now` if the window is empty.
    pub fn reset_at(&self, now: u64, window_ms: u64) -> u64 {
        match self.admitted.front() {
            Some(oldest) => oldest.saturating_add(window_ms),
            None => now,
        }
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

/// Sliding-window limiter over a set of named pools.
///
/// Holds no global state: build one per process (or per test) and share it behind an `Arc`.
///
/// # Example
/// ```
/// use cachegate::{ManualClock, RateLimitPool, SlidingWindowLimiter};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(0);
/// let limiter = SlidingWindowLimiter::builder()
///     .pool(RateLimitPool::new("login", 2, Duration::from_secs(1)).unwrap())
///     .with_clock(clock.clone())
///     .build()
///     .unwrap();
///
/// assert!(limiter.admit("login", "alice").unwrap());
/// assert!(limiter.admit("login", "alice").unwrap());
/// assert!(!limiter.admit("login", "alice").unwrap());
/// assert!(limiter.admit("login", "bob").unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    pools: HashMap<String, RateLimitPool>,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    sweep_interval: u64,
    checks: Arc<AtomicU64>,
}

impl SlidingWindowLimiter {
    pub fn builder() -> SlidingWindowLimiterBuilder {
        SlidingWindowLimiterBuilder::new()
    }

    /// Limiter with the built-in api/auth/ai pools, in-memory windows and the wall clock.
    pub fn with_default_pools() -> Self {
        let pools = RateLimitPool::catalog()
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self {
            pools,
            store: Arc::new(InMemoryWindowStore::new()),
            clock: Arc::new(SystemClock),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            checks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn pool(&self, name: &str) -> Option<&RateLimitPool> {
        self.pools.get(name)
    }

    /// Configured pool names, sorted.
    pub fn pool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Admit one request from `identity` against `pool`.
    pub fn admit(&self, pool: &str, identity: &str) -> Result<bool, ConfigError> {
        self.check(pool, identity).map(|d| d.is_allowed())
    }

    /// `max(0, limit - admissions in the trailing window)`. Does not record anything.
    pub fn remaining(&self, pool: &str, identity: &str) -> Result<u32, ConfigError> {
        let cfg = self.lookup(pool)?;
        let now = self.clock.now_millis();
        let mut remaining = cfg.limit();
        self.store.with_existing(&window_key(pool, identity), &mut |w: &mut SlidingWindow| {
            w.prune(now, cfg.window_ms());
            remaining = w.remaining(cfg.limit());
        });
        Ok(remaining)
    }

    /// Oldest admission in the window plus the window length; `now` when the window is empty.
    pub fn reset_at(&self, pool: &str, identity: &str) -> Result<u64, ConfigError> {
        let cfg = self.lookup(pool)?;
        let now = self.clock.now_millis();
        let mut reset_at = now;
        self.store.with_existing(&window_key(pool, identity), &mut |w: &mut SlidingWindow| {
            w.prune(now, cfg.window_ms());
            reset_at = w.reset_at(now, cfg.window_ms());
        });
        Ok(reset_at)
    }

    /// Forget every admission recorded for `identity` in `pool`.
    pub fn reset(&self, pool: &str, identity: &str) -> Result<bool, ConfigError> {
        self.lookup(pool)?;
        Ok(self.store.remove(&window_key(pool, identity)))
    }

    /// `pool:identity` keys currently tracked, sorted.
    pub fn tracked_keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Drop every window whose admissions have all aged out. Returns how many were found empty.
    ///
    /// Runs on its own every `sweep_interval` checks, so identities that stop calling do not
    /// hold memory for the life of the process.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now_millis();
        let mut emptied = 0;
        for key in self.store.keys() {
            let Some(window_ms) = self.window_for_key(&key) else {
                continue;
            };
            let mut empty = false;
            self.store.with_existing(&key, &mut |w: &mut SlidingWindow| {
                w.prune(now, window_ms);
                empty = w.is_empty();
            });
            if empty {
                emptied += 1;
            }
        }
        if emptied > 0 {
            tracing::debug!(target: "cachegate::rate_limit", emptied, "idle windows purged");
        }
        emptied
    }

    /// Longest window among the pools `key` could belong to; pool names may contain `:`.
    fn window_for_key(&self, key: &str) -> Option<u64> {
        self.pools
            .values()
            .filter(|p| key.strip_prefix(p.name()).is_some_and(|rest| rest.starts_with(':')))
            .map(RateLimitPool::window_ms)
            .max()
    }

    fn maybe_sweep(&self) {
        if self.sweep_interval == 0 {
            return;
        }
        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.sweep_interval == 0 {
            self.purge_idle();
        }
    }

    fn lookup(&self, pool: &str) -> Result<&RateLimitPool, ConfigError> {
        self.pools.get(pool).ok_or_else(|| ConfigError::UnknownPool(pool.to_string()))
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(&self, pool: &str, identity: &str) -> Result<Decision, ConfigError> {
        let cfg = self.lookup(pool)?;
        self.maybe_sweep();
        let now = self.clock.now_millis();
        let (limit, window_ms) = (cfg.limit(), cfg.window_ms());

        let mut allowed = false;
        let mut remaining = 0;
        let mut reset_at_millis = now;
        self.store.with_window(&window_key(pool, identity), &mut |w: &mut SlidingWindow| {
            allowed = w.try_admit(now, window_ms, limit);
            remaining = w.remaining(limit);
            reset_at_millis = w.reset_at(now, window_ms);
        });

        if allowed {
            return Ok(Decision::Allowed { limit, remaining, reset_at_millis });
        }
        tracing::debug!(
            target: "cachegate::rate_limit",
            pool,
            identity,
            reset_at_millis,
            "rate limit exceeded"
        );
        Ok(Decision::Denied {
            limit,
            reset_at_millis,
            retry_after: Duration::from_millis(reset_at_millis.saturating_sub(now)),
        })
    }

    fn has_pool(&self, pool: &str) -> bool {
        self.pools.contains_key(pool)
    }
}

fn window_key(pool: &str, identity: &str) -> String {
    format!("{pool}:{identity}")
}

/// Builder for [`SlidingWindowLimiter`].
#[derive(Debug, Default)]
pub struct SlidingWindowLimiterBuilder {
    pools: Vec<RateLimitPool>,
    store: Option<Arc<dyn WindowStore>>,
    clock: Option<Arc<dyn Clock>>,
    sweep_interval: Option<u64>,
}

impl SlidingWindowLimiterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool. A later pool with the same name replaces an earlier one.
    pub fn pool(mut self, pool: RateLimitPool) -> Self {
        self.pools.push(pool);
        self
    }

    /// Add the built-in api/auth/ai pools.
    pub fn default_pools(mut self) -> Self {
        self.pools.extend(RateLimitPool::catalog());
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_store<S: WindowStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sweep idle windows every `checks` checks. `0` turns the sweep off.
    pub fn sweep_every(mut self, checks: u64) -> Self {
        self.sweep_interval = Some(checks);
        self
    }

    /// Errors with [`ConfigError::NoPools`] if no pool was added.
    pub fn build(self) -> Result<SlidingWindowLimiter, ConfigError> {
        if self.pools.is_empty() {
            return Err(ConfigError::NoPools);
        }
        let mut pools = HashMap::with_capacity(self.pools.len());
        for pool in self.pools {
            let name = pool.name().to_string();
            if pools.insert(name.clone(), pool).is_some() {
                tracing::warn!(
                    target: "cachegate::rate_limit",
                    pool = %name,
                    "rate-limit pool redefined; last definition wins"
                );
            }
        }
        Ok(SlidingWindowLimiter {
            pools,
            store: self.store.unwrap_or_else(|| Arc::new(InMemoryWindowStore::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            sweep_interval: self.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL),
            checks: Arc::new(AtomicU64::new(0)),
        })
    }
}
