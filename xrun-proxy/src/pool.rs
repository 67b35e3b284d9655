// SPDX-License-Identifier: Apache-2.0

//! The proxy pool selector: round-robin, random-with-recency-avoidance, and
//! sticky-with-TTL strategies, each with independent peek/commit semantics
//! (spec §4.4).

use crate::types::{ProxyEndpoint, ProxyPoolConfig, SelectionStrategy, StickyScope};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const RING_SENTINEL: i64 = -1;

/// Caller-supplied context used to derive a sticky key when no explicit key
/// is given (spec §4.4 "Sticky key is derived in this precedence...").
#[derive(Debug, Clone, Default)]
pub struct SelectionContext<'a> {
    pub explicit_key: Option<&'a str>,
    pub job_id: Option<&'a str>,
    pub domain: Option<&'a str>,
    pub origin: Option<(&'a str, &'a str, u16)>,
}

#[derive(Debug, Clone, Copy)]
struct StickyEntry {
    endpoint_index: usize,
    expires_at: Option<Instant>,
}

fn is_expired(expires_at: Instant, now: Instant) -> bool {
    now >= expires_at
}

struct PoolState {
    round_robin_counter: usize,
    recency_ring: Vec<i64>,
    recency_write_pos: usize,
    recency_commits: usize,
    sticky_map: HashMap<String, StickyEntry>,
}

pub struct ProxyPool {
    config: ProxyPoolConfig,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    pub fn new(config: ProxyPoolConfig) -> Self {
        let ring_len = config.recency_window.unwrap_or(0);
        ProxyPool {
            config,
            state: Mutex::new(PoolState {
                round_robin_counter: 0,
                recency_ring: vec![RING_SENTINEL; ring_len],
                recency_write_pos: 0,
                recency_commits: 0,
                sticky_map: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoints(&self) -> &[ProxyEndpoint] {
        &self.config.endpoints
    }

    /// Returns what would be selected without mutating any rotation state.
    pub fn peek(&self, ctx: &SelectionContext<'_>) -> ProxyEndpoint {
        let idx = self.select_index(ctx, false);
        self.endpoints()[idx].clone()
    }

    /// Selects an endpoint and advances the pool's rotation state.
    pub fn commit(&self, ctx: &SelectionContext<'_>) -> ProxyEndpoint {
        let idx = self.select_index(ctx, true);
        self.endpoints()[idx].clone()
    }

    /// Eagerly deletes expired sticky entries (spec §4.4: "Expired entries
    /// are lazily deleted on next access, or eagerly via a cleanup
    /// operation").
    pub fn sweep_expired_sticky(&self, now: Instant) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.sticky_map.len();
        state
            .sticky_map
            .retain(|_, entry| !matches!(entry.expires_at, Some(exp) if is_expired(exp, now)));
        before - state.sticky_map.len()
    }

    fn select_index(&self, ctx: &SelectionContext<'_>, commit: bool) -> usize {
        match self.config.strategy {
            SelectionStrategy::RoundRobin => self.round_robin_select(commit),
            SelectionStrategy::Random => self.random_select(commit),
            SelectionStrategy::Sticky => self.sticky_select(ctx, commit),
        }
    }

    fn round_robin_select(&self, commit: bool) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = self.endpoints().len();
        let idx = state.round_robin_counter % n;
        if commit {
            state.round_robin_counter = state.round_robin_counter.wrapping_add(1);
        }
        idx
    }

    /// Random selection with optional recency-window avoidance. When
    /// `update_ring` is false the selection is read-only with respect to
    /// the recency ring (used by sticky's fresh-pick path, spec §4.4).
    fn random_select_with(&self, commit: bool, update_ring: bool) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = self.endpoints().len();
        let Some(window) = self.config.recency_window else {
            return rand::thread_rng().gen_range(0..n);
        };
        if window == 0 {
            return rand::thread_rng().gen_range(0..n);
        }

        let excluded: std::collections::HashSet<usize> = state
            .recency_ring
            .iter()
            .filter(|&&v| v >= 0)
            .map(|&v| v as usize)
            .collect();

        let candidates: Vec<usize> = (0..n).filter(|i| !excluded.contains(i)).collect();

        let chosen = if candidates.is_empty() {
            // W >= N: every endpoint is currently excluded. Fall back to the
            // least-recently-used endpoint: the ring hasn't wrapped yet, the
            // oldest surviving entry is slot 0; once it has, it's whatever
            // sits at the next write position (about to be overwritten).
            let lru_pos = if state.recency_commits < window {
                0
            } else {
                state.recency_write_pos
            };
            state.recency_ring[lru_pos] as usize
        } else {
            candidates[rand::thread_rng().gen_range(0..candidates.len())]
        };

        if commit && update_ring {
            let pos = state.recency_write_pos;
            state.recency_ring[pos] = chosen as i64;
            state.recency_write_pos = (pos + 1) % window;
            state.recency_commits += 1;
        }

        chosen
    }

    fn random_select(&self, commit: bool) -> usize {
        self.random_select_with(commit, true)
    }

    fn sticky_key(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        if let Some(key) = ctx.explicit_key {
            return Some(key.to_string());
        }
        let sticky = self.config.sticky?;
        match sticky.scope {
            StickyScope::Job => ctx.job_id.map(str::to_string),
            StickyScope::Domain => ctx.domain.map(str::to_string),
            StickyScope::Origin => ctx
                .origin
                .map(|(scheme, host, port)| format!("{scheme}://{host}:{port}")),
        }
    }

    fn sticky_select(&self, ctx: &SelectionContext<'_>, commit: bool) -> usize {
        let key = match self.sticky_key(ctx) {
            Some(k) => k,
            None => return self.random_select_with(commit, false),
        };

        let now = Instant::now();
        {
            let state = self.state.lock().unwrap();
            if let Some(entry) = state.sticky_map.get(&key) {
                let expired = matches!(entry.expires_at, Some(exp) if is_expired(exp, now));
                if !expired {
                    return entry.endpoint_index;
                }
            }
        }

        // Either no entry, or it expired (lazily dropped on next access):
        // pick fresh without touching the recency ring.
        let fresh_idx = self.random_select_with(commit, false);

        if commit {
            let ttl = self.config.sticky.and_then(|s| s.ttl_ms);
            let expires_at = ttl.map(|ms| now + Duration::from_millis(ms));
            let mut state = self.state.lock().unwrap();
            state.sticky_map.insert(
                key,
                StickyEntry {
                    endpoint_index: fresh_idx,
                    expires_at,
                },
            );
        }

        fresh_idx
    }
}
