//! Per-key occurrence counter over a sliding time window, with a cooldown.
//!
//! ```text
//!            increment             len == capacity           cooldown elapsed
//! (no key) ───────────▶ NORMAL ─────────────────▶ COOLING ─────────────────▶ NORMAL
//!                        │  ▲                     (muted,                     (fresh
//!                        └──┘ entries older        cleared)                    cycle)
//!                             than `window` expire
//! ```
//!
//! Key state lives in a [`DashMap`]. Expiry is driven by a single sweeper task
//! that sleeps until the earliest deadline in a shared min-heap; every call
//! also settles its key lazily, so results never depend on when the sweeper
//! last ran. Keys that end up empty and not cooling are evicted.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::trace;

/// Occurrence window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Number of occurrences within `window` that fills a key.
    pub capacity: usize,
    /// How long a single occurrence counts.
    pub window: Duration,
    /// How long a filled key stays muted before counting again.
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Normal,
    Cooling { until: Instant },
}

#[derive(Debug)]
struct KeyWindow {
    /// Oldest first.
    occurrences: VecDeque<Instant>,
    liveness: Liveness,
    /// Deadline this key has in the sweeper heap, if any.
    scheduled: Option<Instant>,
}

impl KeyWindow {
    fn new() -> Self {
        Self {
            occurrences: VecDeque::new(),
            liveness: Liveness::Normal,
            scheduled: None,
        }
    }

    /// Drop expired occurrences and finish an elapsed cooldown.
    fn settle(&mut self, now: Instant, window: Duration) {
        if let Liveness::Cooling { until } = self.liveness {
            if now < until {
                return;
            }
            self.liveness = Liveness::Normal;
            self.occurrences.clear();
        }
        while let Some(&oldest) = self.occurrences.front() {
            if now.duration_since(oldest) < window {
                break;
            }
            self.occurrences.pop_front();
        }
    }

    fn next_deadline(&self, window: Duration) -> Option<Instant> {
        match self.liveness {
            Liveness::Cooling { until } => Some(until),
            Liveness::Normal => self.occurrences.front().map(|&oldest| oldest + window),
        }
    }

    fn is_idle(&self) -> bool {
        self.liveness == Liveness::Normal && self.occurrences.is_empty()
    }

    /// Claim a heap slot for the next deadline unless an earlier one is pending.
    fn reschedule(&mut self, window: Duration) -> Option<Instant> {
        let at = self.next_deadline(window)?;
        match self.scheduled {
            Some(pending) if pending <= at => None,
            _ => {
                self.scheduled = Some(at);
                Some(at)
            }
        }
    }
}

struct Deadline<K> {
    at: Instant,
    key: K,
}

impl<K> PartialEq for Deadline<K> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl<K> Eq for Deadline<K> {}

impl<K> PartialOrd for Deadline<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Deadline<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at)
    }
}

struct Shared<K> {
    config: WindowConfig,
    keys: DashMap<K, KeyWindow>,
    deadlines: Mutex<BinaryHeap<Reverse<Deadline<K>>>>,
    wake: Notify,
}

impl<K> Shared<K>
where
    K: Eq + Hash + Clone,
{
    fn schedule(&self, key: K, at: Instant) {
        let earliest = {
            let mut deadlines = self.deadlines.lock();
            let earliest = deadlines.peek().map_or(true, |Reverse(next)| at < next.at);
            deadlines.push(Reverse(Deadline { at, key }));
            earliest
        };
        if earliest {
            self.wake.notify_one();
        }
    }

    fn pop_due(&self, now: Instant) -> Option<Deadline<K>> {
        let mut deadlines = self.deadlines.lock();
        if deadlines.peek().is_some_and(|Reverse(next)| next.at <= now) {
            deadlines.pop().map(|Reverse(deadline)| deadline)
        } else {
            None
        }
    }

    /// Settle every key whose deadline has passed.
    fn expire_due(&self, now: Instant) {
        while let Some(Deadline { at, key }) = self.pop_due(now) {
            let (idle, next) = match self.keys.get_mut(&key) {
                // Superseded by an earlier deadline for the same key.
                Some(entry) if entry.scheduled != Some(at) => continue,
                Some(mut entry) => {
                    entry.scheduled = None;
                    entry.settle(now, self.config.window);
                    (entry.is_idle(), entry.reschedule(self.config.window))
                }
                None => continue,
            };

            if idle {
                let evicted = self
                    .keys
                    .remove_if(&key, |_, entry| entry.is_idle() && entry.scheduled.is_none());
                if evicted.is_some() {
                    trace!(tracked = self.keys.len(), "evicted idle occurrence window");
                }
            } else if let Some(at) = next {
                self.deadlines.lock().push(Reverse(Deadline { at, key }));
            }
        }
    }

    #[cfg(test)]
    fn pending_deadlines(&self) -> usize {
        self.deadlines.lock().len()
    }
}

async fn sweep<K>(shared: Arc<Shared<K>>, shutdown: CancellationToken)
where
    K: Eq + Hash + Clone,
{
    loop {
        let next = shared.deadlines.lock().peek().map(|Reverse(next)| next.at);
        match next {
            Some(at) if at <= Instant::now() => shared.expire_due(Instant::now()),
            Some(at) => {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = sleep_until(at) => {}
                    _ = shared.wake.notified() => {}
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }
}

/// Time-windowed occurrence counter, see the module docs.
///
/// Cloning is cheap and clones share state. The sweeper task stops when the
/// last clone is dropped.
pub struct OccurrenceWindow<K> {
    shared: Arc<Shared<K>>,
    _sweeper: Arc<DropGuard>,
}

impl<K> Clone for OccurrenceWindow<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _sweeper: Arc::clone(&self._sweeper),
        }
    }
}

impl<K> OccurrenceWindow<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Create a window and spawn its sweeper task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: WindowConfig) -> Self {
        let config = WindowConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        let shared = Arc::new(Shared {
            config,
            keys: DashMap::new(),
            deadlines: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
        });

        let shutdown = CancellationToken::new();
        tokio::spawn(sweep(Arc::clone(&shared), shutdown.clone()));

        Self {
            shared,
            _sweeper: Arc::new(shutdown.drop_guard()),
        }
    }

    /// Window parameters.
    pub fn config(&self) -> &WindowConfig {
        &self.shared.config
    }

    /// Record one occurrence of `key` now.
    ///
    /// Returns `true` only for the call that fills the key. Calls made while
    /// the key is cooling down are not counted and return `false`.
    pub fn increment(&self, key: K) -> bool {
        let now = Instant::now();
        let config = self.shared.config;

        let (filled, deadline) = {
            let mut entry = self
                .shared
                .keys
                .entry(key.clone())
                .or_insert_with(KeyWindow::new);
            entry.settle(now, config.window);

            if let Liveness::Cooling { .. } = entry.liveness {
                return false;
            }

            entry.occurrences.push_back(now);
            let filled = entry.occurrences.len() >= config.capacity;
            if filled {
                entry.occurrences.clear();
                entry.liveness = Liveness::Cooling {
                    until: now + config.cooldown,
                };
            }
            (filled, entry.reschedule(config.window))
        };

        if let Some(at) = deadline {
            self.shared.schedule(key, at);
        }
        filled
    }

    /// Whether `key` is filled (cooling down).
    pub fn is_full(&self, key: &K) -> bool {
        let now = Instant::now();
        let config = self.shared.config;
        match self.shared.keys.get_mut(key) {
            Some(mut entry) => {
                entry.settle(now, config.window);
                match entry.liveness {
                    Liveness::Cooling { .. } => true,
                    Liveness::Normal => entry.occurrences.len() >= config.capacity,
                }
            }
            None => false,
        }
    }

    /// Number of keys currently held.
    pub fn tracked_keys(&self) -> usize {
        self.shared.keys.len()
    }
}
