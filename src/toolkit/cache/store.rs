use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::similarity::cosine_similarity;
use crate::core::fingerprint::Fingerprint;
use crate::toolkit::expansion::ExpansionResult;
use crate::toolkit::query_builder::StructuredQuery;


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub normalized_text: String,
    pub structured_query: StructuredQuery,
    /// Kept so a hit can be rebuilt against the current request's filters.
    pub expansion: ExpansionResult,
    pub embedding_vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        normalized_text: impl Into<String>,
        structured_query: StructuredQuery,
        expansion: ExpansionResult,
        ttl: Duration,
    ) -> Self {
        Self {
            fingerprint,
            normalized_text: normalized_text.into(),
            embedding_vector: expansion.vector.clone(),
            structured_query,
            expansion,
            created_at: Utc::now(),
            ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now - self.created_at >= ttl,
            Err(_) => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: CacheEntry,
    pub similarity: f64,
}


#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub hit_rate: f64,
}


/// Key/value medium for built queries. Exact lookups go by fingerprint;
/// approximate lookups by cosine similarity of the stored embedding.
/// Expired entries read as absent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup_exact(&self, fingerprint: &Fingerprint) -> Option<CacheEntry>;

    /// Nearest live entry with similarity >= `threshold`. Ties go to the
    /// most recently created entry.
    async fn lookup_similar(&self, embedding: &[f32], threshold: f64) -> Option<CacheEntry>;

    /// Up to `k` live entries, best first.
    async fn nearest(&self, embedding: &[f32], k: usize) -> Vec<ScoredEntry>;

    async fn store(&self, entry: CacheEntry);

    async fn invalidate(&self, fingerprint: &Fingerprint) -> bool;

    fn stats(&self) -> CacheStats;
}


pub struct InMemoryCacheStore {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        info!("InMemoryCacheStore initialized: capacity={}", capacity);
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn ranked(&self, embedding: &[f32]) -> Vec<ScoredEntry> {
        let now = Utc::now();
        let entries = self.entries.lock();
        let mut scored: Vec<ScoredEntry> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .filter_map(|(_, entry)| {
                let vector = entry.embedding_vector.as_ref()?;
                Some(ScoredEntry {
                    similarity: cosine_similarity(embedding, vector),
                    entry: entry.clone(),
                })
            })
            .collect();
        drop(entries);

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
        });
        scored
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn lookup_exact(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let found = match entries.get(fingerprint) {
            Some(entry) if !entry.is_expired() => Some(entry.clone()),
            Some(_) => {
                entries.pop(fingerprint);
                debug!("Cache entry {} expired", fingerprint);
                None
            }
            None => None,
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    async fn lookup_similar(&self, embedding: &[f32], threshold: f64) -> Option<CacheEntry> {
        self.ranked(embedding)
            .into_iter()
            .next()
            .filter(|best| best.similarity >= threshold)
            .map(|best| best.entry)
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Vec<ScoredEntry> {
        let mut ranked = self.ranked(embedding);
        ranked.truncate(k);
        ranked
    }

    async fn store(&self, entry: CacheEntry) {
        debug!("Caching query {}", entry.fingerprint);
        self.entries.lock().put(entry.fingerprint.clone(), entry);
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.lock().pop(fingerprint).is_some()
    }

    fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.entries.lock().len(),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}
