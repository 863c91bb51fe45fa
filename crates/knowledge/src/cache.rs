//! Cache-aside knowledge store.
//!
//! Lookup order for a namespace:
//! 1. in-process layer, if younger than `local_ttl`
//! 2. external [`CacheStore`] (no expiry; explicit invalidation only)
//! 3. the [`OriginStore`], whose result is written back to both layers
//!
//! A namespace's document set is always replaced as a whole, so readers
//! never observe a partially refreshed set.

use agentgate_config::KnowledgeConfig;
use agentgate_core::error::KnowledgeError;
use agentgate_core::{CacheStore, Document, OriginStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::extract::ExtractorRegistry;

/// Process-local [`CacheStore`], for tests and single-process deployments.
pub struct InMemoryCacheStore {
    entries: tokio::sync::RwLock<HashMap<String, String>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KnowledgeError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), KnowledgeError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KnowledgeError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub local_hits: u64,
    pub store_hits: u64,
    pub misses: u64,
    pub origin_fetches: u64,
    pub origin_failures: u64,
}

impl CacheStats {
    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.store_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    store_hits: AtomicU64,
    misses: AtomicU64,
    origin_fetches: AtomicU64,
    origin_failures: AtomicU64,
}

struct LocalEntry {
    documents: Arc<Vec<Document>>,
    loaded_at: Instant,
}

/// Agent-scoped knowledge cache.
pub struct KnowledgeCache {
    origin: Arc<dyn OriginStore>,
    store: Arc<dyn CacheStore>,
    extractors: ExtractorRegistry,
    prefix: String,
    local_ttl: Duration,
    local: RwLock<HashMap<String, LocalEntry>>,
    counters: Counters,
}

impl KnowledgeCache {
    pub fn new(
        origin: Arc<dyn OriginStore>,
        store: Arc<dyn CacheStore>,
        config: &KnowledgeConfig,
    ) -> Self {
        Self {
            origin,
            store,
            extractors: ExtractorRegistry::default(),
            prefix: config.cache_prefix.clone(),
            local_ttl: config.local_ttl(),
            local: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Replace the extractor registry.
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    /// External cache key for a namespace.
    pub fn cache_key(&self, namespace: &str) -> String {
        format!("{}:{namespace}", self.prefix)
    }

    /// Get the full document set of a namespace.
    ///
    /// Never fails: if the origin is unreachable, an expired local copy is
    /// served when one exists, otherwise an empty set. Neither is re-cached,
    /// so the next call tries the origin again.
    pub async fn get_namespace(&self, namespace: &str) -> Arc<Vec<Document>> {
        if let Some(documents) = self.local_get(namespace) {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            debug!(namespace, count = documents.len(), "Knowledge local hit");
            return documents;
        }

        let key = self.cache_key(namespace);
        match self.store.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<Document>>(&payload) {
                Ok(documents) => {
                    self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(namespace, count = documents.len(), "Knowledge cache hit");
                    let documents = Arc::new(documents);
                    self.local_put(namespace, documents.clone());
                    return documents;
                }
                Err(e) => warn!(namespace, error = %e, "Discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(namespace, store = self.store.name(), error = %e, "Cache read failed"),
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        match self.load_from_origin(namespace).await {
            Ok(documents) => documents,
            Err(e) => match self.local_stale(namespace) {
                Some(documents) => {
                    warn!(
                        namespace,
                        count = documents.len(),
                        error = %e,
                        "Origin fetch failed, serving expired local copy"
                    );
                    documents
                }
                None => {
                    warn!(namespace, error = %e, "Origin fetch failed, continuing without knowledge");
                    Arc::new(Vec::new())
                }
            },
        }
    }

    /// Re-fetch a namespace from the origin and replace the cached set.
    ///
    /// On failure the previously cached set is left untouched.
    pub async fn refresh(&self, namespace: &str) -> Result<Arc<Vec<Document>>, KnowledgeError> {
        let documents = self.load_from_origin(namespace).await?;
        info!(namespace, count = documents.len(), "Knowledge namespace refreshed");
        Ok(documents)
    }

    /// Drop a namespace from both layers.
    pub async fn clear(&self, namespace: &str) -> Result<bool, KnowledgeError> {
        self.local
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(namespace);
        let existed = self.store.delete(&self.cache_key(namespace)).await?;
        info!(namespace, existed, "Knowledge namespace cleared");
        Ok(existed)
    }

    /// Drop the in-process layer only.
    pub fn clear_local(&self) {
        self.local.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            origin_fetches: self.counters.origin_fetches.load(Ordering::Relaxed),
            origin_failures: self.counters.origin_failures.load(Ordering::Relaxed),
        }
    }

    async fn load_from_origin(
        &self,
        namespace: &str,
    ) -> Result<Arc<Vec<Document>>, KnowledgeError> {
        self.counters.origin_fetches.fetch_add(1, Ordering::Relaxed);
        let files = match self.origin.fetch_namespace(namespace).await {
            Ok(files) => files,
            Err(e) => {
                self.counters.origin_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let total = files.len();
        let documents: Vec<Document> = files
            .into_iter()
            .filter_map(|file| match self.extractors.extract(&file) {
                Ok(text) => Some(Document::new(file.filename, text).with_timestamp(file.modified)),
                Err(e) => {
                    warn!(namespace, filename = %file.filename, error = %e, "Skipping knowledge file");
                    None
                }
            })
            .collect();

        debug!(
            namespace,
            origin = self.origin.name(),
            fetched = total,
            kept = documents.len(),
            "Loaded namespace from origin"
        );

        let payload = serde_json::to_string(&documents)
            .map_err(|e| KnowledgeError::Serialization(e.to_string()))?;
        if let Err(e) = self.store.set(&self.cache_key(namespace), payload).await {
            warn!(namespace, error = %e, "Cache write failed, serving from local layer only");
        }

        let documents = Arc::new(documents);
        self.local_put(namespace, documents.clone());
        Ok(documents)
    }

    fn local_get(&self, namespace: &str) -> Option<Arc<Vec<Document>>> {
        let local = self.local.read().unwrap_or_else(|e| e.into_inner());
        local
            .get(namespace)
            .filter(|entry| entry.loaded_at.elapsed() < self.local_ttl)
            .map(|entry| entry.documents.clone())
    }

    /// The local entry regardless of age.
    fn local_stale(&self, namespace: &str) -> Option<Arc<Vec<Document>>> {
        let local = self.local.read().unwrap_or_else(|e| e.into_inner());
        local.get(namespace).map(|entry| entry.documents.clone())
    }

    fn local_put(&self, namespace: &str, documents: Arc<Vec<Document>>) {
        self.local.write().unwrap_or_else(|e| e.into_inner()).insert(
            namespace.to_string(),
            LocalEntry {
                documents,
                loaded_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::OriginFile;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Origin that serves a fixed file list and counts fetches.
    struct CountingOrigin {
        files: Mutex<Vec<(String, String)>>,
        fetches: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingOrigin {
        fn new(files: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                files: Mutex::new(
                    files
                        .iter()
                        .map(|(n, c)| (n.to_string(), c.to_string()))
                        .collect(),
                ),
                fetches: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn set_files(&self, files: &[(&str, &str)]) {
            *self.files.lock().unwrap() = files
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect();
        }
    }

    #[async_trait]
    impl OriginStore for CountingOrigin {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch_namespace(&self, namespace: &str) -> Result<Vec<OriginFile>, KnowledgeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(KnowledgeError::OriginFetchFailed {
                    namespace: namespace.into(),
                    reason: "unreachable".into(),
                });
            }
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(name, content)| OriginFile {
                    filename: name.clone(),
                    mime_type: crate::extract::mime_from_filename(name).into(),
                    content: content.as_bytes().to_vec(),
                    modified: Utc::now(),
                })
                .collect())
        }
    }

    fn cache(origin: Arc<CountingOrigin>) -> (KnowledgeCache, Arc<InMemoryCacheStore>) {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = KnowledgeCache::new(origin, store.clone(), &KnowledgeConfig::default());
        (cache, store)
    }

    #[tokio::test]
    async fn second_get_does_not_refetch() {
        let origin = CountingOrigin::new(&[("a.md", "alpha"), ("b.txt", "beta")]);
        let (cache, _) = cache(origin.clone());

        let first = cache.get_namespace("grant-cards").await;
        let second = cache.get_namespace("grant-cards").await;

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(origin.fetches(), 1);
        assert_eq!(cache.stats().local_hits, 1);
    }

    #[tokio::test]
    async fn external_store_serves_after_local_clear() {
        let origin = CountingOrigin::new(&[("a.md", "alpha")]);
        let (cache, store) = cache(origin.clone());

        cache.get_namespace("etg-writer").await;
        assert!(store.get("kb:etg-writer").await.unwrap().is_some());

        cache.clear_local();
        let docs = cache.get_namespace("etg-writer").await;
        assert_eq!(docs[0].content, "alpha");
        assert_eq!(origin.fetches(), 1);
        assert_eq!(cache.stats().store_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn local_layer_expires_but_store_does_not() {
        let origin = CountingOrigin::new(&[("a.md", "alpha")]);
        let (cache, _) = cache(origin.clone());

        cache.get_namespace("ns").await;
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        cache.get_namespace("ns").await;

        let stats = cache.stats();
        assert_eq!(stats.local_hits, 0);
        assert_eq!(stats.store_hits, 1);
        assert_eq!(origin.fetches(), 1);
    }

    #[tokio::test]
    async fn unreadable_files_skipped() {
        let origin = CountingOrigin::new(&[
            ("scan.png", "\u{89}PNG"),
            ("guide.pdf", "%PDF-1.7 truncated"),
            ("notes.md", "text"),
        ]);
        let (cache, _) = cache(origin);

        let docs = cache.get_namespace("ns").await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "notes.md");
    }

    #[tokio::test]
    async fn origin_failure_degrades_to_empty_and_is_not_cached() {
        let origin = CountingOrigin::new(&[("a.md", "alpha")]);
        origin.set_failing(true);
        let (cache, store) = cache(origin.clone());

        assert!(cache.get_namespace("ns").await.is_empty());
        assert!(store.get("kb:ns").await.unwrap().is_none());

        origin.set_failing(false);
        assert_eq!(cache.get_namespace("ns").await.len(), 1);
        assert_eq!(origin.fetches(), 2);
        assert_eq!(cache.stats().origin_failures, 1);
    }

    /// External cache that is always unreachable.
    struct UnreachableStore;

    #[async_trait]
    impl CacheStore for UnreachableStore {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, KnowledgeError> {
            Err(KnowledgeError::Cache("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String) -> Result<(), KnowledgeError> {
            Err(KnowledgeError::Cache("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, KnowledgeError> {
            Err(KnowledgeError::Cache("connection refused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_local_copy_served_when_everything_else_fails() {
        let origin = CountingOrigin::new(&[("a.md", "alpha")]);
        let cache = KnowledgeCache::new(
            origin.clone(),
            Arc::new(UnreachableStore),
            &KnowledgeConfig::default(),
        );

        assert_eq!(cache.get_namespace("ns").await.len(), 1);
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        origin.set_failing(true);

        let docs = cache.get_namespace("ns").await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "alpha");
        assert_eq!(cache.stats().origin_failures, 1);

        // Still stale: the origin is tried again next time.
        cache.get_namespace("ns").await;
        assert_eq!(origin.fetches(), 3);
    }

    #[tokio::test]
    async fn refresh_replaces_whole_set() {
        let origin = CountingOrigin::new(&[("a.md", "alpha"), ("b.md", "beta")]);
        let (cache, _) = cache(origin.clone());
        cache.get_namespace("ns").await;

        origin.set_files(&[("c.md", "gamma")]);
        let refreshed = cache.refresh("ns").await.unwrap();
        assert_eq!(refreshed.len(), 1);

        let docs = cache.get_namespace("ns").await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "c.md");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_set() {
        let origin = CountingOrigin::new(&[("a.md", "alpha")]);
        let (cache, _) = cache(origin.clone());
        cache.get_namespace("ns").await;

        origin.set_failing(true);
        assert!(cache.refresh("ns").await.is_err());

        let docs = cache.get_namespace("ns").await;
        assert_eq!(docs[0].filename, "a.md");
    }

    #[tokio::test]
    async fn clear_forces_origin_fetch() {
        let origin = CountingOrigin::new(&[("a.md", "alpha")]);
        let (cache, _) = cache(origin.clone());

        cache.get_namespace("ns").await;
        assert!(cache.clear("ns").await.unwrap());
        cache.get_namespace("ns").await;
        assert_eq!(origin.fetches(), 2);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let origin = CountingOrigin::new(&[("a.md", "alpha")]);
        let (cache, store) = cache(origin.clone());

        cache.get_namespace("grant-cards").await;
        cache.get_namespace("etg-writer").await;
        assert_eq!(origin.fetches(), 2);
        assert!(store.get("kb:grant-cards").await.unwrap().is_some());
        assert!(store.get("kb:etg-writer").await.unwrap().is_some());
    }
}
