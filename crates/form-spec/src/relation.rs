//! Remote option lists for `relation` fields.
//!
//! Each relation field instance owns a [`RelationField`] controller. The
//! controller hands out a [`FetchTicket`] whenever a fetch is needed (mount,
//! or a change of endpoint, query or label/value keys) and only accepts the
//! result of its latest ticket, so responses that land after unmount or
//! after a newer request are dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::spec::field::{FieldDescriptor, FieldType};
use crate::values::display;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("relative endpoint '{0}' needs a base URL")]
    NoBaseUrl(String),
    #[error("endpoint '{0}' is not allowed")]
    NotAllowed(String),
    #[error("invalid endpoint pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("option source failed: {0}")]
    Source(String),
}

/// Everything that determines the option list of one relation field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationRequest {
    pub endpoint: String,
    pub query: BTreeMap<String, String>,
    pub label_field: String,
    pub value_field: String,
}

impl RelationRequest {
    /// `None` when the field has no usable endpoint.
    pub fn from_field(field: &FieldDescriptor) -> Option<Self> {
        let endpoint = field.api_endpoint.as_deref()?.trim();
        if endpoint.is_empty() {
            return None;
        }
        Some(Self {
            endpoint: endpoint.to_string(),
            query: field.query_params.clone(),
            label_field: field.label_field().to_string(),
            value_field: field.value_field().to_string(),
        })
    }
}

/// Normalized option: display label, submitted value and the source record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationOption {
    pub label: String,
    pub value: String,
    pub raw: Value,
}

/// Accepts a bare array or an object wrapping it in `data` or `items`.
///
/// Non-object records are skipped. Missing label or value keys yield empty
/// strings rather than dropping the record.
pub fn normalize_options(body: &Value, label_field: &str, value_field: &str) -> Vec<RelationOption> {
    let records: &[Value] = match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("data").or_else(|| map.get("items")) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                debug!("relation response has no data or items array");
                &[]
            }
        },
        _ => &[],
    };

    records
        .iter()
        .filter_map(|record| {
            let object = record.as_object()?;
            Some(RelationOption {
                label: object.get(label_field).map(display).unwrap_or_default(),
                value: object.get(value_field).map(display).unwrap_or_default(),
                raw: record.clone(),
            })
        })
        .collect()
}

/// Fetches the raw list payload for an endpoint.
#[async_trait]
pub trait OptionSource: Send + Sync {
    async fn fetch(
        &self,
        endpoint: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<Value, ResolveError>;
}

/// Settings for [`HttpOptionSource`].
#[derive(Debug, Clone, Default)]
pub struct HttpSourceConfig {
    /// Prefix for endpoints that are not absolute URLs.
    pub base_url: Option<String>,
    /// Glob patterns an endpoint must match; empty allows everything.
    pub allowed_endpoints: Vec<String>,
    /// No timeout unless set.
    pub timeout: Option<Duration>,
    /// Sent as `Authorization: Bearer ...` when set.
    pub bearer_token: Option<String>,
}

/// `GET <endpoint>[?query]` against the REST backend.
pub struct HttpOptionSource {
    client: Client,
    base_url: Option<String>,
    allowed: Option<GlobSet>,
    bearer_token: Option<String>,
}

impl HttpOptionSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self, ResolveError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        let allowed = if config.allowed_endpoints.is_empty() {
            None
        } else {
            let mut set = GlobSetBuilder::new();
            for pattern in &config.allowed_endpoints {
                set.add(Glob::new(pattern)?);
            }
            Some(set.build()?)
        };

        Ok(Self {
            client,
            base_url: config.base_url,
            allowed,
            bearer_token: config.bearer_token,
        })
    }

    fn url_for(&self, endpoint: &str) -> Result<String, ResolveError> {
        if let Some(allowed) = &self.allowed
            && !allowed.is_match(endpoint)
        {
            return Err(ResolveError::NotAllowed(endpoint.to_string()));
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(endpoint.to_string());
        }
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| ResolveError::NoBaseUrl(endpoint.to_string()))?;
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        ))
    }
}

#[async_trait]
impl OptionSource for HttpOptionSource {
    async fn fetch(
        &self,
        endpoint: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<Value, ResolveError> {
        let url = self.url_for(endpoint)?;
        debug!(%url, "fetching relation options");
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

/// Explicit keyed cache over another source, keyed by endpoint and query.
///
/// Field instances never share results unless the host wraps its source in
/// this type.
pub struct CachedOptionSource<S> {
    inner: S,
    entries: Mutex<HashMap<(String, BTreeMap<String, String>), Value>>,
}

impl<S: OptionSource> CachedOptionSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drops every cached entry for `endpoint`, whatever the query.
    pub fn invalidate(&self, endpoint: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(cached, _), _| cached != endpoint);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<S: OptionSource> OptionSource for CachedOptionSource<S> {
    async fn fetch(
        &self,
        endpoint: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<Value, ResolveError> {
        let key = (endpoint.to_string(), query.clone());
        let cached = self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&key).cloned());
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let value = self.inner.fetch(endpoint, query).await?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, value.clone());
        }
        Ok(value)
    }
}

/// Fetches and normalizes; failures are logged and resolve to no options.
pub async fn resolve_options(
    source: &dyn OptionSource,
    request: &RelationRequest,
) -> Vec<RelationOption> {
    match source.fetch(&request.endpoint, &request.query).await {
        Ok(body) => normalize_options(&body, &request.label_field, &request.value_field),
        Err(err) => {
            warn!(endpoint = %request.endpoint, error = %err, "relation options unavailable");
            Vec::new()
        }
    }
}

/// Where a relation field is in its fetch lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RelationStatus {
    Unmounted,
    NoEndpoint,
    Loading,
    Ready { options: Vec<RelationOption> },
}

/// Permission to deliver one fetch result to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub field: String,
    pub generation: u64,
    pub request: RelationRequest,
}

/// Fetch lifecycle of one relation field instance.
#[derive(Debug, Clone)]
pub struct RelationField {
    name: String,
    request: Option<RelationRequest>,
    status: RelationStatus,
    generation: u64,
}

impl RelationField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request: None,
            status: RelationStatus::Unmounted,
            generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &RelationStatus {
        &self.status
    }

    pub fn is_mounted(&self) -> bool {
        self.status != RelationStatus::Unmounted
    }

    pub fn is_loading(&self) -> bool {
        self.status == RelationStatus::Loading
    }

    pub fn options(&self) -> &[RelationOption] {
        match &self.status {
            RelationStatus::Ready { options } => options,
            _ => &[],
        }
    }

    /// Mounts the field and returns the initial fetch, if it needs one.
    pub fn mount(&mut self, field: &FieldDescriptor) -> Option<FetchTicket> {
        if self.is_mounted() {
            return self.sync(field);
        }
        self.request = None;
        self.status = RelationStatus::NoEndpoint;
        self.restart(field)
    }

    /// Re-reads the descriptor; a changed request supersedes any fetch in
    /// flight and returns a new ticket.
    pub fn sync(&mut self, field: &FieldDescriptor) -> Option<FetchTicket> {
        if !self.is_mounted() || field.kind != FieldType::Relation {
            return None;
        }
        if RelationRequest::from_field(field) == self.request {
            return None;
        }
        self.restart(field)
    }

    fn restart(&mut self, field: &FieldDescriptor) -> Option<FetchTicket> {
        self.generation += 1;
        self.request = RelationRequest::from_field(field);
        match &self.request {
            None => {
                self.status = RelationStatus::NoEndpoint;
                None
            }
            Some(request) => {
                self.status = RelationStatus::Loading;
                Some(FetchTicket {
                    field: self.name.clone(),
                    generation: self.generation,
                    request: request.clone(),
                })
            }
        }
    }

    /// Ticket for the fetch currently outstanding, if any.
    pub fn pending(&self) -> Option<FetchTicket> {
        match (&self.status, &self.request) {
            (RelationStatus::Loading, Some(request)) => Some(FetchTicket {
                field: self.name.clone(),
                generation: self.generation,
                request: request.clone(),
            }),
            _ => None,
        }
    }

    /// Delivers a fetch result. Returns `false` when the ticket is stale.
    pub fn complete(&mut self, ticket: &FetchTicket, options: Vec<RelationOption>) -> bool {
        if ticket.generation != self.generation || !self.is_loading() {
            debug!(field = %self.name, "dropping stale relation result");
            return false;
        }
        self.status = RelationStatus::Ready { options };
        true
    }

    /// Clears options and invalidates any fetch in flight.
    pub fn unmount(&mut self) {
        self.generation += 1;
        self.request = None;
        self.status = RelationStatus::Unmounted;
    }
}
