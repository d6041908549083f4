//! Orchestration of lookup, merge and paged submission for one source run.

use std::collections::{BTreeMap, HashMap};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    CandidateRecord, CanonicalDocument, DocumentMerger, GatewayError, IDENTIFIERS_FIELD,
    Identifier, IndexGateway, MergeAction, Precedence,
};

/// Default number of documents per index submission.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Bounded retry with a fixed backoff, used for index submission only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Create a policy; zero attempts is raised to one.
    #[must_use]
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }
}

/// What to do when the identifier lookup itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupFailurePolicy {
    /// Skip the record and count it as a lookup failure.
    #[default]
    Skip,
    /// Merge against the unsubmitted page only. May create duplicates.
    TreatAsNew,
}

/// Per-run settings for a [`ReconciliationDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    /// Precedence of the source being imported.
    pub precedence: Precedence,
    /// Documents per index submission.
    pub page_size: usize,
    /// Pause after each submitted page.
    pub page_delay: Duration,
    /// Retry policy for index submission.
    pub retry: RetryPolicy,
    /// Behaviour when an identifier lookup fails.
    pub lookup_failure: LookupFailurePolicy,
    /// Index field searched for identifiers.
    pub identifier_field: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            precedence: Precedence(0),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
            lookup_failure: LookupFailurePolicy::default(),
            identifier_field: IDENTIFIERS_FIELD.to_owned(),
        }
    }
}

impl ImportSettings {
    /// Settings for a source with the given precedence.
    #[must_use]
    pub fn new(precedence: Precedence) -> Self {
        Self {
            precedence,
            ..Self::default()
        }
    }

    /// Set the page size; zero is raised to one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the inter-page delay.
    #[must_use]
    pub const fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Set the submission retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the lookup failure policy.
    #[must_use]
    pub const fn with_lookup_failure(mut self, policy: LookupFailurePolicy) -> Self {
        self.lookup_failure = policy;
        self
    }

    /// Set the index field searched for identifiers.
    #[must_use]
    pub fn with_identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }
}

/// Counters for one source run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportReport {
    /// Candidates that produced new documents.
    pub created: u64,
    /// Candidates merged into an existing document.
    pub merged: u64,
    /// Candidates skipped because several documents matched.
    pub conflicts: u64,
    /// Candidates whose identifier lookup failed.
    pub lookup_failures: u64,
    /// Lookup failures that were merged as new records anyway.
    pub treated_as_new: u64,
    /// Pages accepted by the index.
    pub pages_submitted: u64,
    /// Documents accepted by the index.
    pub documents_indexed: u64,
}

/// Result of processing a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new document was queued.
    Created,
    /// An existing document was updated and queued.
    Merged,
    /// Several documents matched; the candidate was skipped.
    Conflict,
    /// The lookup failed; the candidate was skipped.
    LookupFailed,
}

/// Errors that end a source run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A page could not be submitted within the retry budget.
    #[error("index submission of {documents} documents failed after {attempts} attempts")]
    Submission {
        /// Attempts made.
        attempts: u32,
        /// Documents in the rejected page.
        documents: usize,
        /// Last backend failure.
        #[source]
        source: GatewayError,
    },
    /// The final commit failed.
    #[error("index commit failed")]
    Commit {
        /// Backend failure.
        #[source]
        source: GatewayError,
    },
}

/// Drives candidates from one source into the index.
///
/// Matches for each candidate are gathered from the page not yet
/// submitted, from documents submitted earlier in this run (fetched by
/// key, as the index may not expose them to searches before commit) and
/// from an identifier search, de-duplicated by document id with the
/// freshest copy winning. Submission happens in pages; commit happens once
/// in [`ReconciliationDriver::finish`].
#[derive(Debug)]
pub struct ReconciliationDriver<'a, G: IndexGateway + ?Sized> {
    gateway: &'a G,
    merger: DocumentMerger,
    settings: ImportSettings,
    pending: Vec<CanonicalDocument>,
    submitted: HashMap<Identifier, String>,
    report: ImportReport,
}

impl<'a, G: IndexGateway + ?Sized> ReconciliationDriver<'a, G> {
    /// Create a driver for one source run.
    #[must_use]
    pub fn new(gateway: &'a G, merger: DocumentMerger, settings: ImportSettings) -> Self {
        Self {
            gateway,
            merger,
            settings,
            pending: Vec::new(),
            submitted: HashMap::new(),
            report: ImportReport::default(),
        }
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn report(&self) -> &ImportReport {
        &self.report
    }

    /// Reconcile one candidate.
    ///
    /// Conflicts and lookup failures are logged and counted, not returned.
    /// Only a failed page submission is an error.
    pub fn process(&mut self, candidate: CandidateRecord) -> Result<RecordOutcome, ReconcileError> {
        let matches = match self.find_matches(&candidate) {
            Ok(matches) => matches,
            Err(err) => {
                self.report.lookup_failures += 1;
                match self.settings.lookup_failure {
                    LookupFailurePolicy::Skip => {
                        error!("identifier lookup for {} failed, skipping: {err}", candidate.id());
                        return Ok(RecordOutcome::LookupFailed);
                    }
                    LookupFailurePolicy::TreatAsNew => {
                        error!(
                            "identifier lookup for {} failed, treating as new; duplicates possible: {err}",
                            candidate.id()
                        );
                        self.report.treated_as_new += 1;
                        self.pending_matches(&candidate)
                    }
                }
            }
        };

        let outcome = match self
            .merger
            .merge(candidate, &matches, self.settings.precedence)
        {
            Ok(outcome) => outcome,
            Err(conflict) => {
                warn!(
                    "skipping {}: identifiers [{}] match documents [{}]",
                    conflict.candidate,
                    join(&conflict.identifiers),
                    conflict.document_ids.join(", ")
                );
                self.report.conflicts += 1;
                return Ok(RecordOutcome::Conflict);
            }
        };

        let result = match outcome.action {
            MergeAction::Created => {
                self.report.created += 1;
                RecordOutcome::Created
            }
            MergeAction::Merged { .. } => {
                self.report.merged += 1;
                RecordOutcome::Merged
            }
        };
        self.queue(outcome.document)?;
        Ok(result)
    }

    /// Process every candidate, then flush and commit.
    pub fn run<I>(mut self, candidates: I) -> Result<ImportReport, ReconcileError>
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        for candidate in candidates {
            self.process(candidate)?;
        }
        self.finish()
    }

    /// Submit the remaining page and commit once.
    pub fn finish(mut self) -> Result<ImportReport, ReconcileError> {
        self.flush(false)?;
        self.gateway
            .commit()
            .map_err(|source| ReconcileError::Commit { source })?;
        info!(
            "import finished: {} created, {} merged, {} conflicts, {} lookup failures, {} documents in {} pages",
            self.report.created,
            self.report.merged,
            self.report.conflicts,
            self.report.lookup_failures,
            self.report.documents_indexed,
            self.report.pages_submitted
        );
        Ok(self.report)
    }

    fn find_matches(
        &self,
        candidate: &CandidateRecord,
    ) -> Result<Vec<CanonicalDocument>, GatewayError> {
        let ids: Vec<Identifier> = candidate.identifiers().iter().cloned().collect();
        let mut by_id: BTreeMap<String, CanonicalDocument> = BTreeMap::new();

        let found = self
            .gateway
            .search_by_identifiers(&self.settings.identifier_field, &ids)?;
        by_id.extend(found.results.into_iter().map(|doc| (doc.id.clone(), doc)));

        let mut earlier: Vec<String> = ids
            .iter()
            .filter_map(|id| self.submitted.get(id).cloned())
            .filter(|doc_id| !self.pending.iter().any(|doc| &doc.id == doc_id))
            .collect();
        earlier.sort_unstable();
        earlier.dedup();
        if !earlier.is_empty() {
            let fetched = self.gateway.get_by_ids(&earlier)?;
            by_id.extend(fetched.into_iter().map(|doc| (doc.id.clone(), doc)));
        }

        by_id.extend(
            self.pending_matches(candidate)
                .into_iter()
                .map(|doc| (doc.id.clone(), doc)),
        );
        Ok(by_id.into_values().collect())
    }

    fn pending_matches(&self, candidate: &CandidateRecord) -> Vec<CanonicalDocument> {
        self.pending
            .iter()
            .filter(|doc| doc.shares_identifier(candidate.identifiers()))
            .cloned()
            .collect()
    }

    fn queue(&mut self, document: CanonicalDocument) -> Result<(), ReconcileError> {
        if let Some(slot) = self.pending.iter_mut().find(|doc| doc.id == document.id) {
            *slot = document;
        } else {
            self.pending.push(document);
        }
        if self.pending.len() >= self.settings.page_size {
            self.flush(true)?;
        }
        Ok(())
    }

    fn flush(&mut self, pause: bool) -> Result<(), ReconcileError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let RetryPolicy { attempts, backoff } = self.settings.retry;
        let mut attempt = 1;
        loop {
            match self.gateway.index(&self.pending) {
                Ok(()) => break,
                Err(source) if attempt >= attempts => {
                    error!("giving up on page of {} documents: {source}", self.pending.len());
                    return Err(ReconcileError::Submission {
                        attempts: attempt,
                        documents: self.pending.len(),
                        source,
                    });
                }
                Err(err) => {
                    warn!("index submission attempt {attempt}/{attempts} failed: {err}");
                    attempt += 1;
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                }
            }
        }

        let page = std::mem::take(&mut self.pending);
        self.report.pages_submitted += 1;
        self.report.documents_indexed += page.len() as u64;
        debug!("submitted page {} ({} documents)", self.report.pages_submitted, page.len());
        for document in page {
            for identifier in document.identifiers {
                self.submitted.insert(identifier, document.id.clone());
            }
        }
        if pause && !self.settings.page_delay.is_zero() {
            thread::sleep(self.settings.page_delay);
        }
        Ok(())
    }
}

fn join(identifiers: &[Identifier]) -> String {
    identifiers
        .iter()
        .map(Identifier::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
