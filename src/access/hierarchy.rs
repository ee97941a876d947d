//! Folder hierarchy resolution.
//!
//! Decides whether a Drive item lives under a root folder by walking parent
//! links through the [`DriveClient`]. Results are memoized per
//! `(child, ancestor)` pair for the lifetime of the process.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::google::DriveClient;
use crate::resilience::{RetryContext, RetryExecutor, UpstreamFailure};
use crate::types::Result;

/// Upper bound on parent levels walked before giving up.
pub const MAX_WALK_DEPTH: usize = 64;

// =============================================================================
// Cache
// =============================================================================

/// Memoized ancestry verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub result: bool,
    pub checked_at: DateTime<Utc>,
}

/// Snapshot of cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub within: usize,
    pub outside: usize,
}

/// Process-local `(child, ancestor) -> verdict` map. Never persisted.
#[derive(Debug, Default)]
pub struct FolderHierarchyCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl FolderHierarchyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, child: &str, ancestor: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(child.to_string(), ancestor.to_string()))
            .copied()
    }

    /// Store a verdict unless one is already present; returns the stored entry.
    pub fn insert_if_absent(&self, child: &str, ancestor: &str, result: bool) -> CacheEntry {
        *self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((child.to_string(), ancestor.to_string()))
            .or_insert_with(|| CacheEntry {
                result,
                checked_at: Utc::now(),
            })
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let within = entries.values().filter(|e| e.result).count();
        CacheStats {
            entries: entries.len(),
            within,
            outside: entries.len() - within,
        }
    }
}

// =============================================================================
// Walker
// =============================================================================

/// Resolves folder ancestry against Drive, with caching.
#[derive(Clone)]
pub struct FolderHierarchy {
    drive: Arc<dyn DriveClient>,
    cache: Arc<FolderHierarchyCache>,
    retry: Option<RetryExecutor>,
    max_depth: usize,
}

impl fmt::Debug for FolderHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderHierarchy")
            .field("cached_entries", &self.cache.len())
            .field("retry", &self.retry.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl FolderHierarchy {
    pub fn new(drive: Arc<dyn DriveClient>) -> Self {
        Self {
            drive,
            cache: Arc::new(FolderHierarchyCache::new()),
            retry: None,
            max_depth: MAX_WALK_DEPTH,
        }
    }

    /// Share a cache between several walkers.
    pub fn with_cache(mut self, cache: Arc<FolderHierarchyCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Route parent lookups through a retry executor.
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<FolderHierarchyCache> {
        &self.cache
    }

    /// True when `target` is `root` or any descendant of it.
    ///
    /// Unrelated folders resolve to `false`; Drive failures propagate.
    pub async fn is_within_folder_hierarchy(&self, target: &str, root: &str) -> Result<bool> {
        if target == root {
            return Ok(true);
        }
        if let Some(hit) = self.cache.get(target, root) {
            tracing::debug!(target_id = target, root_id = root, result = hit.result, "folder_hierarchy_cache_hit");
            return Ok(hit.result);
        }

        let Some(result) = self.walk(target, root).await? else {
            tracing::warn!(
                target_id = target,
                root_id = root,
                max_depth = self.max_depth,
                "folder_hierarchy_depth_exceeded"
            );
            return Ok(false);
        };

        let entry = self.cache.insert_if_absent(target, root, result);
        tracing::debug!(target_id = target, root_id = root, result = entry.result, "folder_hierarchy_resolved");
        Ok(entry.result)
    }

    /// Breadth-first walk up the parent links. `None` when the depth bound
    /// is hit before the frontier empties.
    async fn walk(&self, target: &str, root: &str) -> Result<Option<bool>> {
        let mut visited: HashSet<String> = HashSet::from([target.to_string()]);
        let mut frontier = vec![target.to_string()];

        for _ in 0..self.max_depth {
            let mut next = Vec::new();
            for node in &frontier {
                for parent in self.parents_of(node).await? {
                    if parent == root {
                        return Ok(Some(true));
                    }
                    match self.cache.get(&parent, root) {
                        Some(hit) if hit.result => return Ok(Some(true)),
                        Some(_) => continue,
                        None => {}
                    }
                    if visited.insert(parent.clone()) {
                        next.push(parent);
                    }
                }
            }
            if next.is_empty() {
                return Ok(Some(false));
            }
            frontier = next;
        }

        Ok(None)
    }

    async fn parents_of(&self, file_id: &str) -> Result<Vec<String>> {
        match &self.retry {
            Some(retry) => {
                let ctx = RetryContext::new("drive.files.get.parents");
                retry.execute(&ctx, || self.drive.parents(file_id)).await
            }
            None => self.drive.parents(file_id).await.map_err(|failure| {
                let normalized = failure.normalized();
                failure.into_error(normalized)
            }),
        }
    }
}
