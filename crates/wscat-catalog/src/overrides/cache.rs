use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use wscat_core::PriceOverrideEntry;

use super::feed::{parse_feed_file, FeedLayout, ParsedFeed};
use crate::error::FeedError;

/// One immutable snapshot of the override feed.
#[derive(Debug, Clone)]
pub struct OverrideGeneration {
    entries: HashMap<String, PriceOverrideEntry>,
    source_modified: Option<SystemTime>,
    loaded_at: DateTime<Utc>,
    layout: Option<FeedLayout>,
    unrecognized_stock: usize,
}

impl OverrideGeneration {
    /// The generation used when no feed exists.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            source_modified: None,
            loaded_at: Utc::now(),
            layout: None,
            unrecognized_stock: 0,
        }
    }

    fn from_parsed(parsed: ParsedFeed, source_modified: SystemTime) -> Self {
        Self {
            entries: parsed.entries,
            source_modified: Some(source_modified),
            loaded_at: Utc::now(),
            layout: Some(parsed.layout),
            unrecognized_stock: parsed.stats.unrecognized_stock,
        }
    }

    #[must_use]
    pub fn lookup(&self, sku: &str) -> Option<&PriceOverrideEntry> {
        self.entries.get(sku)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> impl Iterator<Item = &PriceOverrideEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn source_modified_at(&self) -> Option<DateTime<Utc>> {
        self.source_modified.map(DateTime::<Utc>::from)
    }

    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// What a call to [`OverrideCache::refresh_if_stale`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Unchanged,
    Reloaded { entries: usize },
    /// The feed disappeared; an empty generation is now current.
    Cleared,
    /// The feed could not be read or parsed; the previous generation stays.
    Failed,
    /// Another caller is refreshing; the current generation was left as is.
    InFlight,
    /// A reload was started on a background task; the current generation
    /// stays in place until it finishes.
    Scheduled,
}

/// Snapshot of cache health for the admin status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideStatus {
    pub path: String,
    pub entries: usize,
    pub layout: Option<FeedLayout>,
    pub source_modified_at: Option<DateTime<Utc>>,
    pub loaded_at: DateTime<Utc>,
    pub unrecognized_stock: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct RefreshState {
    /// Modification time of a feed version that failed to parse, so it is
    /// not re-parsed on every request.
    failed_modified: Option<SystemTime>,
}

/// Override map keyed by SKU, reloaded when the feed file's modification
/// time changes.
///
/// Readers clone the current `Arc` and never observe a partially built map.
/// Refreshes are serialized; a caller that finds one in flight returns
/// immediately and keeps using the current generation.
#[derive(Debug)]
pub struct OverrideCache {
    path: PathBuf,
    current: RwLock<Arc<OverrideGeneration>>,
    refresh: tokio::sync::Mutex<RefreshState>,
    last_error: RwLock<Option<String>>,
}

impl OverrideCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(OverrideGeneration::empty())),
            refresh: tokio::sync::Mutex::new(RefreshState::default()),
            last_error: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The generation every lookup of one request should use.
    #[must_use]
    pub fn current(&self) -> Arc<OverrideGeneration> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Override for `sku` in the current generation. Never touches the disk.
    #[must_use]
    pub fn lookup(&self, sku: &str) -> Option<PriceOverrideEntry> {
        self.current().lookup(sku).cloned()
    }

    /// Stats the feed and reloads it if its modification time changed.
    pub async fn refresh_if_stale(&self) -> RefreshOutcome {
        let Ok(mut state) = self.refresh.try_lock() else {
            return RefreshOutcome::InFlight;
        };

        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.clear_if_loaded(&mut state),
            Err(e) => {
                return self.record_failure(FeedError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                return self.record_failure(FeedError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };

        if self.current().source_modified == Some(modified) || state.failed_modified == Some(modified)
        {
            return RefreshOutcome::Unchanged;
        }

        let path = self.path.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_feed_file(&path))
            .await
            .map_err(|e| FeedError::Task(e.to_string()))
            .and_then(|result| result);

        match parsed {
            Ok(parsed) => {
                let generation = OverrideGeneration::from_parsed(parsed, modified);
                let entries = generation.len();
                if generation.unrecognized_stock > 0 {
                    tracing::warn!(
                        path = %self.path.display(),
                        unrecognized_stock = generation.unrecognized_stock,
                        "override feed has unrecognized stock values, treated as in stock"
                    );
                }
                self.swap(generation);
                state.failed_modified = None;
                self.set_last_error(None);
                tracing::info!(path = %self.path.display(), entries, "override feed reloaded");
                RefreshOutcome::Reloaded { entries }
            }
            Err(e) => {
                state.failed_modified = Some(modified);
                self.record_failure(e)
            }
        }
    }

    /// Request-path refresh. Stats the feed and, if it changed, reparses it on
    /// a spawned task while the caller keeps the current generation.
    ///
    /// The first load and the clearing of a removed feed still happen inline:
    /// there is nothing worth serving before the one, and the other needs no
    /// parsing.
    pub async fn refresh_in_background(self: &Arc<Self>) -> RefreshOutcome {
        let Some(loaded) = self.current().source_modified else {
            return self.refresh_if_stale().await;
        };

        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|metadata| metadata.modified());
        match &modified {
            Ok(modified) if *modified == loaded => return RefreshOutcome::Unchanged,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.refresh_if_stale().await,
            _ => {}
        }

        let modified = modified.ok();
        match self.refresh.try_lock() {
            Err(_) => return RefreshOutcome::InFlight,
            Ok(state) if modified.is_some() && state.failed_modified == modified => {
                return RefreshOutcome::Unchanged;
            }
            Ok(_) => {}
        }

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = cache.refresh_if_stale().await;
            tracing::debug!(
                path = %cache.path.display(),
                ?outcome,
                "background override refresh done"
            );
        });
        RefreshOutcome::Scheduled
    }

    #[must_use]
    pub fn status(&self) -> OverrideStatus {
        let generation = self.current();
        OverrideStatus {
            path: self.path.display().to_string(),
            entries: generation.len(),
            layout: generation.layout,
            source_modified_at: generation.source_modified_at(),
            loaded_at: generation.loaded_at,
            unrecognized_stock: generation.unrecognized_stock,
            last_error: self
                .last_error
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn clear_if_loaded(&self, state: &mut RefreshState) -> RefreshOutcome {
        state.failed_modified = None;
        self.set_last_error(None);
        if self.current().source_modified.is_none() {
            return RefreshOutcome::Unchanged;
        }
        tracing::info!(path = %self.path.display(), "override feed removed, clearing overrides");
        self.swap(OverrideGeneration::empty());
        RefreshOutcome::Cleared
    }

    fn record_failure(&self, error: FeedError) -> RefreshOutcome {
        tracing::warn!(
            path = %self.path.display(),
            error = %error,
            "override feed refresh failed, keeping last-known-good overrides"
        );
        self.set_last_error(Some(error.to_string()));
        RefreshOutcome::Failed
    }

    fn swap(&self, generation: OverrideGeneration) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(generation);
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
