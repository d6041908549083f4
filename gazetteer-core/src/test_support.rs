//! In-memory doubles for the external collaborators, used by unit and
//! behaviour tests across the workspace.
//!
//! [`MemoryIndexGateway`] mimics a near-real-time index: searches only see
//! committed documents, while [`IndexGateway::get_by_ids`] also sees
//! documents indexed since the last commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    CanonicalDocument, GatewayError, Identifier, IndexGateway, KeyValueStore, KvError,
    SearchResult,
};

#[derive(Debug, Default)]
struct IndexState {
    committed: BTreeMap<String, CanonicalDocument>,
    uncommitted: BTreeMap<String, CanonicalDocument>,
    fail_searches: usize,
    fail_index: usize,
    fail_commit: bool,
    searches: usize,
    index_calls: usize,
    commits: usize,
    pages: Vec<usize>,
}

/// Index double with failure injection and call counters.
#[derive(Debug, Default)]
pub struct MemoryIndexGateway {
    state: Mutex<IndexState>,
}

impl MemoryIndexGateway {
    /// Create a gateway whose committed view holds `documents`.
    pub fn with_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = CanonicalDocument>,
    {
        let gateway = Self::default();
        gateway.lock().committed = documents
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();
        gateway
    }

    /// Make the next `count` searches fail.
    pub fn fail_next_searches(&self, count: usize) {
        self.lock().fail_searches = count;
    }

    /// Make the next `count` index submissions fail.
    pub fn fail_next_index_calls(&self, count: usize) {
        self.lock().fail_index = count;
    }

    /// Make every commit fail.
    pub fn fail_commits(&self) {
        self.lock().fail_commit = true;
    }

    /// Committed document with the given id.
    pub fn document(&self, id: &str) -> Option<CanonicalDocument> {
        self.lock().committed.get(id).cloned()
    }

    /// All committed documents ordered by id.
    pub fn documents(&self) -> Vec<CanonicalDocument> {
        self.lock().committed.values().cloned().collect()
    }

    /// Number of searches issued.
    pub fn search_count(&self) -> usize {
        self.lock().searches
    }

    /// Number of index submissions attempted.
    pub fn index_call_count(&self) -> usize {
        self.lock().index_calls
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    /// Sizes of the accepted pages, in order.
    pub fn page_sizes(&self) -> Vec<usize> {
        self.lock().pages.clone()
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IndexGateway for MemoryIndexGateway {
    fn search_by_identifiers(
        &self,
        _field: &str,
        ids: &[Identifier],
    ) -> Result<SearchResult, GatewayError> {
        let mut state = self.lock();
        state.searches += 1;
        if state.fail_searches > 0 {
            state.fail_searches -= 1;
            return Err(GatewayError::Unavailable {
                message: "injected search failure".to_owned(),
            });
        }
        let results: Vec<CanonicalDocument> = state
            .committed
            .values()
            .filter(|doc| doc.shares_identifier(ids))
            .cloned()
            .collect();
        Ok(SearchResult {
            size: results.len(),
            results,
        })
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<CanonicalDocument>, GatewayError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .uncommitted
                    .get(id)
                    .or_else(|| state.committed.get(id))
                    .cloned()
            })
            .collect())
    }

    fn index(&self, documents: &[CanonicalDocument]) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.index_calls += 1;
        if state.fail_index > 0 {
            state.fail_index -= 1;
            return Err(GatewayError::Unavailable {
                message: "injected index failure".to_owned(),
            });
        }
        for doc in documents {
            state.uncommitted.insert(doc.id.clone(), doc.clone());
        }
        state.pages.push(documents.len());
        Ok(())
    }

    fn commit(&self) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if state.fail_commit {
            return Err(GatewayError::Unavailable {
                message: "injected commit failure".to_owned(),
            });
        }
        let staged = std::mem::take(&mut state.uncommitted);
        state.committed.extend(staged);
        state.commits += 1;
        Ok(())
    }
}

/// Key-value double backed by a map.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.lock().get(key).cloned())
    }
}
