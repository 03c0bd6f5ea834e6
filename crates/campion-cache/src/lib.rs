//! Cache for forwarded responses.
//!
//! Entries are keyed by (name, type, class) and live for the minimum
//! TTL among their records, clamped to a configurable floor and
//! ceiling. Expired entries are treated as absent and evicted on
//! sight; stale answers are never served.

#![warn(missing_docs)]
#![warn(clippy::all)]

use campion_proto::{min_ttl, Class, Name, Question, RecordType, ResourceRecord, ResponseCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Cache tuning parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Floor applied to entry lifetimes.
    pub min_ttl: Duration,
    /// Ceiling applied to entry lifetimes.
    pub max_ttl: Duration,
    /// Maximum number of entries.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_ttl: Duration::from_secs(1),
            max_ttl: Duration::from_secs(3600),
            max_entries: 10_000,
        }
    }
}

/// Cache key: lowercased name plus type and class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: Name,
    rtype: RecordType,
    class: Class,
}

impl CacheKey {
    /// Creates a key, normalizing the name.
    pub fn new(name: &Name, rtype: RecordType, class: Class) -> Self {
        Self {
            name: name.lowercased(),
            rtype,
            class,
        }
    }

    /// Creates a key from a question.
    pub fn from_question(question: &Question) -> Self {
        Self::new(&question.qname, question.qtype, question.qclass)
    }
}

/// A cached upstream answer.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    records: Vec<ResourceRecord>,
    rcode: ResponseCode,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(records: Vec<ResourceRecord>, rcode: ResponseCode, ttl: Duration) -> Self {
        Self {
            records,
            rcode,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// The cached records as received from upstream.
    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    /// The cached response code.
    pub fn rcode(&self) -> ResponseCode {
        self.rcode
    }

    /// Returns true once the entry's lifetime has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    /// Lifetime left at `now`.
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.duration_since(self.created_at))
    }

    /// The records with TTLs reduced by the entry's age.
    pub fn records_with_adjusted_ttl(&self, now: Instant) -> Vec<ResourceRecord> {
        let remaining = self.remaining_ttl(now).as_secs() as u32;
        self.records
            .iter()
            .map(|r| r.with_ttl(remaining.max(1).min(r.ttl)))
            .collect()
    }
}

/// Hit and miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Total hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hits over total lookups, zero when untouched.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// The forward cache.
pub struct ForwardCache {
    entries: moka::sync::Cache<CacheKey, CacheEntry>,
    config: CacheConfig,
    stats: CacheStats,
}

impl ForwardCache {
    /// Creates a cache with the given tuning.
    pub fn new(config: CacheConfig) -> Self {
        let mut builder = moka::sync::Cache::builder().max_capacity(config.max_entries);
        if config.max_ttl > Duration::ZERO {
            builder = builder.time_to_live(config.max_ttl);
        }
        let entries = builder.build();
        Self {
            entries,
            config,
            stats: CacheStats::default(),
        }
    }

    /// Looks up an unexpired entry. Expired entries are invalidated
    /// and reported as misses.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!(?key, "cache hit");
                Some(entry)
            }
            Some(_) => {
                self.entries.invalidate(key);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                trace!(?key, "cache entry expired");
                None
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores an upstream answer. The lifetime is the minimum record
    /// TTL clamped to the configured floor and ceiling; answers with
    /// no records (including negative answers) use the floor.
    pub fn store(&self, key: CacheKey, records: Vec<ResourceRecord>, rcode: ResponseCode) {
        let ttl = match min_ttl(&records) {
            Some(seconds) => Duration::from_secs(u64::from(seconds))
                .clamp(self.config.min_ttl, self.config.max_ttl),
            None => self.config.min_ttl,
        };
        trace!(?key, ?ttl, records = records.len(), "caching answer");
        self.entries
            .insert(key, CacheEntry::new(records, rcode, ttl));
    }

    /// Number of live entries as tracked by the backing cache.
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit and miss counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
