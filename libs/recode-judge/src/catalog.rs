//! Cached views of the backend's language and status catalogs.
//!
//! Both catalogs are read through a `MetadataCache`. A read that finds a
//! stale entry gets it back at once and starts a background refresh; only
//! one refresh per catalog runs at a time. A failed refresh leaves the stale
//! entry in place. Only a cold read waits on the backend.

use crate::cache::{Clock, Lookup, MetadataCache, SystemClock};
use crate::error::JudgeResult;
use crate::protocol::ExecutionBackend;
use recode_common::types::{
    LanguageInfo, RawExecutionResult, StatusInfo, STATUS_IN_QUEUE, STATUS_PROCESSING,
};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const LANGUAGES_KEY: &str = "judge0:languages";
pub const STATUSES_KEY: &str = "judge0:statuses";

/// Which status ids still mean "not finished", plus their descriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    non_terminal: BTreeSet<i32>,
    descriptions: HashMap<i32, String>,
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::fallback()
    }
}

impl StatusTable {
    /// In-queue and processing only, with no descriptions
    pub fn fallback() -> Self {
        Self {
            non_terminal: BTreeSet::from([STATUS_IN_QUEUE, STATUS_PROCESSING]),
            descriptions: HashMap::new(),
        }
    }

    /// Derive the table from the status catalog.
    ///
    /// Statuses whose description mentions a queue or processing are
    /// non-terminal. A catalog with no such entry yields the fallback set.
    pub fn from_catalog(statuses: &[StatusInfo]) -> Self {
        let mut non_terminal = BTreeSet::new();
        let mut descriptions = HashMap::new();

        for status in statuses {
            let lowered = status.description.to_lowercase();
            if lowered.contains("queue") || lowered.contains("processing") {
                non_terminal.insert(status.id);
            }
            descriptions.insert(status.id, status.description.clone());
        }

        if non_terminal.is_empty() {
            non_terminal = Self::fallback().non_terminal;
        }

        Self {
            non_terminal,
            descriptions,
        }
    }

    pub fn is_non_terminal_id(&self, id: i32) -> bool {
        self.non_terminal.contains(&id)
    }

    /// A read without a status id is terminal only if it already has stdout
    pub fn is_terminal(&self, raw: &RawExecutionResult) -> bool {
        match raw.status.id {
            Some(id) => !self.is_non_terminal_id(id),
            None => raw.has_stdout(),
        }
    }

    pub fn describe(&self, id: Option<i32>) -> Option<&str> {
        id.and_then(|id| self.descriptions.get(&id))
            .map(String::as_str)
    }
}

pub struct CatalogService {
    backend: Arc<dyn ExecutionBackend>,
    languages: CachedCatalog<Vec<LanguageInfo>>,
    statuses: CachedCatalog<Vec<StatusInfo>>,
    ttl: Duration,
}

impl CatalogService {
    pub fn new(backend: Arc<dyn ExecutionBackend>, ttl: Duration) -> Self {
        Self::with_clock(backend, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn ExecutionBackend>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            languages: CachedCatalog::new(LANGUAGES_KEY, clock.clone()),
            statuses: CachedCatalog::new(STATUSES_KEY, clock),
            ttl,
        }
    }

    pub async fn languages(&self) -> JudgeResult<Vec<LanguageInfo>> {
        let backend = self.backend.clone();
        self.languages
            .read(self.ttl, move || async move { backend.languages().await })
            .await
    }

    pub async fn statuses(&self) -> JudgeResult<Vec<StatusInfo>> {
        let backend = self.backend.clone();
        self.statuses
            .read(self.ttl, move || async move { backend.statuses().await })
            .await
    }

    /// Status table from the catalog, or the fallback table if it cannot be read
    pub async fn status_table(&self) -> StatusTable {
        match self.statuses().await {
            Ok(statuses) => StatusTable::from_catalog(&statuses),
            Err(e) => {
                warn!(error = %e, "status catalog unavailable, using fallback status table");
                StatusTable::fallback()
            }
        }
    }
}

/// One catalog's cache entry and its refresh-in-progress flag
struct CachedCatalog<V> {
    key: &'static str,
    cache: Arc<MetadataCache<V>>,
    refreshing: Arc<AtomicBool>,
}

impl<V> CachedCatalog<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new(key: &'static str, clock: Arc<dyn Clock>) -> Self {
        Self {
            key,
            cache: Arc::new(MetadataCache::with_clock(clock)),
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn read<F, Fut>(&self, ttl: Duration, fetch: F) -> JudgeResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = JudgeResult<V>> + Send + 'static,
    {
        match self.cache.get(self.key, ttl) {
            Lookup::Fresh(value) => Ok(value),
            Lookup::Stale(stale) => {
                self.refresh_in_background(ttl, fetch);
                Ok(stale)
            }
            Lookup::Missing => {
                let value = fetch().await?;
                debug!(key = self.key, "catalog loaded");
                self.cache.set(self.key, value.clone(), ttl);
                Ok(value)
            }
        }
    }

    /// Start a refresh unless one is already running for this catalog
    fn refresh_in_background<F, Fut>(&self, ttl: Duration, fetch: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = JudgeResult<V>> + Send + 'static,
    {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let flag = RefreshFlag(self.refreshing.clone());
        let cache = self.cache.clone();
        let key = self.key;
        let refresh = fetch();

        debug!(key, "catalog stale, refreshing in background");
        tokio::spawn(async move {
            let _flag = flag;
            match refresh.await {
                Ok(value) => {
                    debug!(key, "catalog refreshed");
                    cache.set(key, value, ttl);
                }
                Err(e) => {
                    warn!(key, error = %e, "catalog refresh failed, keeping stale copy");
                }
            }
        });
    }
}

/// Clears the refresh flag when the refresh task ends, however it ends
struct RefreshFlag(Arc<AtomicBool>);

impl Drop for RefreshFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
