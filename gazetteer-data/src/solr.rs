//! Solr-backed [`IndexGateway`].
//!
//! The gateway talks to one Solr core over its JSON API:
//!
//! - identifier search: `select?q=<field>:(<a> OR <b>)&wt=json`
//! - uncommitted reads: realtime `get?ids=<a>,<b>&wt=json`
//! - indexing: `update?wt=json` with a JSON array body
//! - commit: `update?commit=true&wt=json`
//!
//! [`IndexGateway`] is synchronous, so each call blocks on a Tokio runtime
//! owned by the gateway.
//!
//! # Example
//!
//! ```no_run
//! use gazetteer_core::{IndexGateway, IDENTIFIERS_FIELD};
//! use gazetteer_data::solr::SolrIndexGateway;
//!
//! let gateway = SolrIndexGateway::new("http://localhost:8983/solr/", "places")?;
//! let ids = vec!["atco:340000001".parse()?];
//! let found = gateway.search_by_identifiers(IDENTIFIERS_FIELD, &ids)?;
//! println!("{} matches", found.size);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::future::Future;
use std::time::Duration;

use gazetteer_core::{CanonicalDocument, GatewayError, Identifier, IndexGateway, SearchResult};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use url::Url;

/// Default user agent for Solr requests.
pub const DEFAULT_USER_AGENT: &str = "gazetteer-import/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Field Solr adds to every stored document for optimistic locking.
const VERSION_FIELD: &str = "_version_";

/// Characters with a meaning in the Lucene query syntax.
const QUERY_SPECIAL: &[char] = &[
    '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~', '*', '?', '|', '&', ';',
    '/', ' ',
];

/// Failures constructing a [`SolrIndexGateway`].
#[derive(Debug, Error)]
pub enum SolrBuildError {
    /// The base URL does not parse.
    #[error("invalid Solr base URL {url:?}")]
    InvalidUrl {
        /// Rejected URL.
        url: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime")]
    Runtime(#[source] std::io::Error),
}

/// Configuration for [`SolrIndexGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolrConfig {
    /// Solr root, e.g. `http://localhost:8983/solr/`.
    pub base_url: String,
    /// Core holding the places documents.
    pub core: String,
    /// Connect and request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8983/solr/".to_owned(),
            core: "places".to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl SolrConfig {
    /// Configuration for `core` under `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, core: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            core: core.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    response: DocumentList,
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    #[serde(rename = "numFound", default)]
    num_found: usize,
    #[serde(default)]
    docs: Vec<serde_json::Value>,
}

/// Blocking Solr client for the reconciliation driver.
///
/// When called from inside a multi-threaded Tokio runtime the gateway
/// blocks through [`tokio::task::block_in_place`] on that runtime;
/// otherwise it uses its own current-thread runtime.
pub struct SolrIndexGateway {
    client: Client,
    config: SolrConfig,
    core_url: Url,
    runtime: Runtime,
}

impl std::fmt::Debug for SolrIndexGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolrIndexGateway")
            .field("config", &self.config)
            .field("core_url", &self.core_url.as_str())
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish_non_exhaustive()
    }
}

impl SolrIndexGateway {
    /// Gateway for `core` under `base_url` with default settings.
    ///
    /// # Errors
    /// Returns [`SolrBuildError`] when the URL is invalid or the HTTP
    /// client or runtime cannot be built.
    pub fn new(base_url: impl Into<String>, core: impl Into<String>) -> Result<Self, SolrBuildError> {
        Self::with_config(SolrConfig::new(base_url, core))
    }

    /// Gateway with explicit configuration.
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn with_config(config: SolrConfig) -> Result<Self, SolrBuildError> {
        let core_url = core_url(&config.base_url, &config.core)?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(SolrBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SolrBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            core_url,
            runtime,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SolrConfig {
        &self.config
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.core_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(path);
        }
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("wt", "json");
        }
        url
    }

    fn select_url(&self, field: &str, ids: &[Identifier]) -> Url {
        let query = identifier_query(field, ids);
        let rows = ids.len().max(10).to_string();
        self.endpoint("select", &[("q", &query), ("rows", &rows)])
    }

    fn get_url(&self, ids: &[String]) -> Url {
        self.endpoint("get", &[("ids", &ids.join(","))])
    }

    async fn fetch_documents(&self, url: Url) -> Result<SearchResult, GatewayError> {
        let label = url.to_string();
        debug!("GET {label}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &label))?
            .error_for_status()
            .map_err(|err| self.convert_reqwest_error(&err, &label))?;
        let body: QueryResponse = response.json().await.map_err(|err| GatewayError::Decode {
            url: label.clone(),
            message: err.to_string(),
        })?;
        let results = body
            .response
            .docs
            .into_iter()
            .map(decode_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| GatewayError::Decode {
                url: label,
                message: err.to_string(),
            })?;
        Ok(SearchResult {
            size: body.response.num_found,
            results,
        })
    }

    async fn post_update(
        &self,
        url: Url,
        documents: Option<&[CanonicalDocument]>,
    ) -> Result<(), GatewayError> {
        let label = url.to_string();
        debug!("POST {label}");
        let request = match documents {
            Some(documents) => self.client.post(url).json(documents),
            None => self.client.post(url),
        };
        request
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &label))?
            .error_for_status()
            .map_err(|err| self.convert_reqwest_error(&err, &label))?;
        Ok(())
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> GatewayError {
        if error.is_timeout() {
            return GatewayError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }
        if let Some(status) = error.status() {
            return GatewayError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        GatewayError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}

impl IndexGateway for SolrIndexGateway {
    fn search_by_identifiers(
        &self,
        field: &str,
        ids: &[Identifier],
    ) -> Result<SearchResult, GatewayError> {
        if ids.is_empty() {
            return Ok(SearchResult::default());
        }
        self.block_on(self.fetch_documents(self.select_url(field, ids)))
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<CanonicalDocument>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.block_on(self.fetch_documents(self.get_url(ids)))
            .map(|found| found.results)
    }

    fn index(&self, documents: &[CanonicalDocument]) -> Result<(), GatewayError> {
        if documents.is_empty() {
            return Ok(());
        }
        self.block_on(self.post_update(self.endpoint("update", &[]), Some(documents)))
    }

    fn commit(&self) -> Result<(), GatewayError> {
        self.block_on(self.post_update(self.endpoint("update", &[("commit", "true")]), None))
    }
}

fn core_url(base_url: &str, core: &str) -> Result<Url, SolrBuildError> {
    let invalid = |source| SolrBuildError::InvalidUrl {
        url: base_url.to_owned(),
        source,
    };
    let base = if base_url.ends_with('/') {
        Url::parse(base_url)
    } else {
        Url::parse(&format!("{base_url}/"))
    }
    .map_err(invalid)?;
    base.join(&format!("{}/", core.trim_matches('/'))).map_err(invalid)
}

/// Escape Lucene query syntax in a single term.
#[must_use]
pub fn escape_query_term(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if QUERY_SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// `<field>:(<a> OR <b> …)` over escaped identifiers.
#[must_use]
pub fn identifier_query(field: &str, ids: &[Identifier]) -> String {
    let terms: Vec<String> = ids
        .iter()
        .map(|id| escape_query_term(id.as_str()))
        .collect();
    format!("{field}:({})", terms.join(" OR "))
}

fn decode_document(mut raw: serde_json::Value) -> Result<CanonicalDocument, serde_json::Error> {
    if let Some(fields) = raw.as_object_mut() {
        fields.remove(VERSION_FIELD);
    }
    serde_json::from_value(raw)
}
