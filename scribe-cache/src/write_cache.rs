//! In-memory cache of recent document snapshots.
//!
//! One ring buffer of `(revision, document)` snapshots per
//! (document, scope, branch) stream, with least-recently-used stream
//! eviction once the stream count hits its cap. The cache never reaches
//! into storage; the executor reads through it and repopulates on miss.

use crate::RingBuffer;
use scribe_types::{Document, DocumentId};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Sizing knobs for the write cache.
#[derive(Debug, Clone)]
pub struct WriteCacheConfig {
    /// Maximum number of streams held at once.
    pub max_streams: usize,

    /// Snapshots retained per stream.
    pub ring_capacity: usize,
}

impl Default for WriteCacheConfig {
    fn default() -> Self {
        Self {
            max_streams: 1000,
            ring_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    document_id: DocumentId,
    scope: String,
    branch: String,
}

#[derive(Debug, Clone)]
struct Snapshot {
    revision: u64,
    document: Document,
}

/// Tracks access recency; `evict` returns the least recently touched key.
struct LruTracker<K> {
    stamps: HashMap<K, u64>,
    clock: u64,
}

impl<K: Eq + Hash + Clone> LruTracker<K> {
    fn new() -> Self {
        Self {
            stamps: HashMap::new(),
            clock: 0,
        }
    }

    fn touch(&mut self, key: K) {
        self.clock += 1;
        self.stamps.insert(key, self.clock);
    }

    fn remove(&mut self, key: &K) {
        self.stamps.remove(key);
    }

    fn evict(&mut self) -> Option<K> {
        let key = self
            .stamps
            .iter()
            .min_by_key(|(_, stamp)| **stamp)
            .map(|(key, _)| key.clone())?;
        self.stamps.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.stamps.clear();
        self.clock = 0;
    }
}

/// Snapshot cache in front of document storage.
///
/// Not internally synchronized; the executor owns it behind a lock.
pub struct WriteCache {
    streams: HashMap<StreamKey, RingBuffer<Snapshot>>,
    lru: LruTracker<StreamKey>,
    config: WriteCacheConfig,
}

impl WriteCache {
    /// Creates an empty cache.
    ///
    /// A zero `ring_capacity` or `max_streams` is lifted to one so the
    /// cache stays usable with a degenerate config.
    #[must_use]
    pub fn new(config: WriteCacheConfig) -> Self {
        let config = WriteCacheConfig {
            max_streams: config.max_streams.max(1),
            ring_capacity: config.ring_capacity.max(1),
        };
        Self {
            streams: HashMap::new(),
            lru: LruTracker::new(),
            config,
        }
    }

    /// Looks up a snapshot.
    ///
    /// `revision: None` returns the newest snapshot of the stream;
    /// `Some(rev)` returns the snapshot at exactly that revision. A hit
    /// refreshes the stream's recency.
    pub fn get(
        &mut self,
        document_id: DocumentId,
        scope: &str,
        branch: &str,
        revision: Option<u64>,
    ) -> Option<Document> {
        let key = StreamKey {
            document_id,
            scope: scope.to_string(),
            branch: branch.to_string(),
        };
        let ring = self.streams.get(&key)?;

        let snapshot = match revision {
            None => ring.peek_newest(),
            Some(rev) => ring.iter().rev().find(|s| s.revision == rev),
        }?;
        let document = snapshot.document.clone();

        self.lru.touch(key);
        Some(document)
    }

    /// Stores a snapshot at `revision`, creating the stream when needed
    /// and evicting the least recently used stream at capacity.
    pub fn put(
        &mut self,
        document_id: DocumentId,
        scope: &str,
        branch: &str,
        revision: u64,
        document: Document,
    ) {
        let key = StreamKey {
            document_id,
            scope: scope.to_string(),
            branch: branch.to_string(),
        };

        if !self.streams.contains_key(&key) && self.streams.len() >= self.config.max_streams {
            if let Some(evicted) = self.lru.evict() {
                debug!(
                    document_id = %evicted.document_id,
                    scope = %evicted.scope,
                    branch = %evicted.branch,
                    "evicting least recently used stream"
                );
                self.streams.remove(&evicted);
            }
        }

        let ring = self.streams.entry(key.clone()).or_insert_with(|| {
            RingBuffer::new(self.config.ring_capacity).expect("capacity lifted to at least one")
        });
        ring.push(Snapshot { revision, document });
        self.lru.touch(key);
    }

    /// Drops every stream of one document. Returns the number of streams
    /// removed.
    pub fn invalidate_document(&mut self, document_id: DocumentId) -> usize {
        self.invalidate_matching(|key| key.document_id == document_id)
    }

    /// Drops every branch of one document scope. Returns the number of
    /// streams removed.
    pub fn invalidate_scope(&mut self, document_id: DocumentId, scope: &str) -> usize {
        self.invalidate_matching(|key| key.document_id == document_id && key.scope == scope)
    }

    /// Drops exactly one stream. Returns the number of streams removed
    /// (zero or one).
    pub fn invalidate_stream(
        &mut self,
        document_id: DocumentId,
        scope: &str,
        branch: &str,
    ) -> usize {
        self.invalidate_matching(|key| {
            key.document_id == document_id && key.scope == scope && key.branch == branch
        })
    }

    /// Drops every stream and resets recency tracking.
    pub fn clear(&mut self) {
        self.streams.clear();
        self.lru.clear();
    }

    /// Number of live streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn invalidate_matching(&mut self, matches: impl Fn(&StreamKey) -> bool) -> usize {
        let doomed: Vec<StreamKey> = self.streams.keys().filter(|k| matches(k)).cloned().collect();
        for key in &doomed {
            self.streams.remove(key);
            self.lru.remove(key);
        }
        doomed.len()
    }
}

// ==================== Tests ====================
