//! Completion cache: stored candidates plus the state needed to rebase them.

use std::num::NonZeroUsize;

use lru::LruCache;
use restitch_core::{Edit, OffsetRange, Replacement};

use crate::config::RebaseConfig;
use crate::rebase::{rebase_candidates, RebaseFailure, RebaseRequest, RebasedCandidate};

/// Cache key: the text immediately around the cursor when the candidates
/// were produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub prefix: String,
    pub suffix: String,
}

impl CacheKey {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

/// One cached candidate set and the baseline state to rebase it with.
#[derive(Debug, Clone)]
struct CacheEntry {
    baseline_document: String,
    baseline_cursor: usize,
    edit_window: Option<OffsetRange>,
    candidates: Vec<Replacement>,
    /// Everything the user typed since this entry was stored.
    edit_since: Edit,
    /// Set once a rebase conflict is confirmed, so a known-unrebasable
    /// entry is not retried on every keystroke.
    rebase_failed: bool,
}

/// A size-bounded, per-document store of cached completions.
///
/// Owned and explicitly lifecycled by the document session: created on
/// first use, dropped when the document closes. Holds no global state.
pub struct CompletionCache {
    entries: LruCache<CacheKey, CacheEntry>,
    config: RebaseConfig,
}

impl CompletionCache {
    pub fn new(capacity: NonZeroUsize, config: RebaseConfig) -> Self {
        Self {
            entries: LruCache::new(capacity),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a candidate set computed against `baseline_document`.
    pub fn insert(
        &mut self,
        key: CacheKey,
        baseline_document: impl Into<String>,
        baseline_cursor: usize,
        edit_window: Option<OffsetRange>,
        candidates: Vec<Replacement>,
    ) {
        self.entries.put(
            key,
            CacheEntry {
                baseline_document: baseline_document.into(),
                baseline_cursor,
                edit_window,
                candidates,
                edit_since: Edit::empty(),
                rebase_failed: false,
            },
        );
    }

    /// Fold a new user edit into every stored entry.
    ///
    /// `edit` is expressed against the document as the entries last saw it
    /// (the usual case: one keystroke at a time, applied to all entries).
    pub fn push_user_edit(&mut self, edit: &Edit) {
        for (_, entry) in self.entries.iter_mut() {
            entry.edit_since = entry.edit_since.compose(edit);
        }
    }

    /// The baseline cursor offset stored for `key`, if present.
    pub fn baseline_cursor(&mut self, key: &CacheKey) -> Option<usize> {
        self.entries.get(key).map(|e| e.baseline_cursor)
    }

    /// Rebase the candidates stored under `key` onto the live document.
    ///
    /// `None` means no entry. A confirmed conflict sets the sticky
    /// rebase-failed marker and every later lookup short-circuits to
    /// `Some(Err(RebaseFailed))` without rerunning the engine.
    pub fn lookup(
        &mut self,
        key: &CacheKey,
        current_document: &str,
        current_selection: &[OffsetRange],
    ) -> Option<Result<Vec<RebasedCandidate>, RebaseFailure>> {
        let config = self.config.clone();
        let entry = self.entries.get_mut(key)?;
        if entry.rebase_failed {
            return Some(Err(RebaseFailure::RebaseFailed));
        }

        let outcome = rebase_candidates(
            &RebaseRequest {
                original_document: &entry.baseline_document,
                edit_window: entry.edit_window,
                candidate_edits: &entry.candidates,
                detailed_edits: None,
                user_edit_since: &entry.edit_since,
                current_document,
                current_selection,
            },
            &config,
        );
        if outcome == Err(RebaseFailure::RebaseFailed) {
            entry.rebase_failed = true;
        }
        Some(outcome)
    }

    /// Drop the entry stored under `key`.
    pub fn remove(&mut self, key: &CacheKey) {
        self.entries.pop(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
