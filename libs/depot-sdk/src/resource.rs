use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::client::ConsoleClient;
use crate::envelope::{Page, Pagination, read_ack, read_envelope};
use crate::error::ApiError;

/// Console resources with a REST collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResourceKind {
    Vendors,
    Warehouses,
    PurchaseOrders,
    DispatchOrders,
    QcTemplates,
    AccessRequests,
    AuditLogs,
    Permissions,
    Users,
}

impl ResourceKind {
    pub const ALL: [Self; 9] = [
        Self::Vendors,
        Self::Warehouses,
        Self::PurchaseOrders,
        Self::DispatchOrders,
        Self::QcTemplates,
        Self::AccessRequests,
        Self::AuditLogs,
        Self::Permissions,
        Self::Users,
    ];

    /// Collection name, also the path segment under the API base URL.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Vendors => "vendors",
            Self::Warehouses => "warehouses",
            Self::PurchaseOrders => "purchase-orders",
            Self::DispatchOrders => "dispatch-orders",
            Self::QcTemplates => "qc-templates",
            Self::AccessRequests => "access-requests",
            Self::AuditLogs => "audit-logs",
            Self::Permissions => "permissions",
            Self::Users => "users",
        }
    }

    #[must_use]
    pub fn path(self) -> String {
        format!("/{}", self.name())
    }

    /// Audit logs are written by the backend only.
    #[must_use]
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::AuditLogs)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_matches('/').replace('_', "-").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.name()).collect();
                format!("unknown resource '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Query string for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub sort: Option<String>,
    /// Extra `key=value` filters such as `status=active`.
    pub filters: BTreeMap<String, String>,
}

impl ListQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Write the query onto `url`, replacing any existing query string.
    pub fn apply(&self, url: &mut Url) {
        url.set_query(None);
        let mut pairs = url.query_pairs_mut();
        if let Some(page) = self.page {
            pairs.append_pair("page", &page.to_string());
        }
        if let Some(limit) = self.limit {
            pairs.append_pair("limit", &limit.to_string());
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.append_pair("search", search);
        }
        if let Some(sort) = &self.sort {
            pairs.append_pair("sort", sort);
        }
        for (key, value) in &self.filters {
            pairs.append_pair(key, value);
        }
        drop(pairs);
        if url.query() == Some("") {
            url.set_query(None);
        }
    }
}

/// Page to request after `requested`, if any.
///
/// The requested number is authoritative: a backend that keeps answering
/// with an older `page` ends the walk instead of repeating it.
fn next_page(pagination: Option<Pagination>, requested: u32, empty: bool) -> Option<u32> {
    let p = pagination?;
    if empty || p.page < requested || requested >= p.total_pages {
        return None;
    }
    requested.checked_add(1)
}

/// CRUD access to one console collection.
///
/// Obtained from [`ConsoleClient::resource`].
#[derive(Clone, Copy)]
pub struct Resource<'a> {
    client: &'a ConsoleClient,
    kind: ResourceKind,
}

impl<'a> Resource<'a> {
    pub(crate) fn new(client: &'a ConsoleClient, kind: ResourceKind) -> Self {
        Self { client, kind }
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn collection_url(&self) -> Result<Url, ApiError> {
        Ok(self.client.endpoint(&self.kind.path())?)
    }

    fn item_url(&self, id: &str) -> Result<Url, ApiError> {
        if id.is_empty() {
            return Err(ApiError::InvalidPath(format!("{}/<empty id>", self.kind.path())));
        }
        let mut url = self.collection_url()?;
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidPath(self.kind.path()))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn ensure_writable(&self) -> Result<(), ApiError> {
        if self.kind.is_read_only() {
            return Err(ApiError::ReadOnly(self.kind));
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`ApiError`] on transport failure, error status or
    /// `success: false`.
    #[instrument(skip_all, fields(resource = %self.kind))]
    pub async fn list<T: DeserializeOwned>(&self, query: &ListQuery) -> Result<Page<T>, ApiError> {
        let mut url = self.collection_url()?;
        query.apply(&mut url);
        let response = self.client.http().get(url.as_str()).send().await?;
        let envelope = read_envelope::<Vec<T>>(response).await?;
        Ok(Page {
            items: envelope.data.unwrap_or_default(),
            pagination: envelope.pagination,
        })
    }

    /// Walk every page starting at `query.page` (default 1).
    ///
    /// Stops after the last page reported by the backend, on an empty page,
    /// when the backend's `page` falls behind the requested one, or after
    /// the first error.
    pub fn pages<T>(self, query: ListQuery) -> impl Stream<Item = Result<Page<T>, ApiError>> + 'a
    where
        T: DeserializeOwned + 'a,
    {
        let resource = self;
        let start = query.page.unwrap_or(1);
        futures::stream::try_unfold(Some((query, start)), move |next| async move {
            let Some((query, page_no)) = next else {
                return Ok::<_, ApiError>(None);
            };
            let page = resource.list::<T>(&query.clone().page(page_no)).await?;
            let next = next_page(page.pagination, page_no, page.items.is_empty())
                .map(|n| (query, n));
            Ok(Some((page, next)))
        })
    }

    /// # Errors
    /// Returns [`ApiError`] on failure, including
    /// [`ApiError::MissingData`] when the envelope carries no item.
    #[instrument(skip_all, fields(resource = %self.kind, id = %id))]
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> Result<T, ApiError> {
        let url = self.item_url(id)?;
        let response = self.client.http().get(url.as_str()).send().await?;
        read_envelope(response)
            .await?
            .into_data(&format!("GET {}", url.path()))
    }

    /// # Errors
    /// Returns [`ApiError::ReadOnly`] for read-only resources, otherwise as
    /// [`get`](Self::get).
    #[instrument(skip_all, fields(resource = %self.kind))]
    pub async fn create<B, T>(&self, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.ensure_writable()?;
        let url = self.collection_url()?;
        let response = self
            .client
            .http()
            .post(url.as_str())
            .json(body)?
            .send()
            .await?;
        read_envelope(response)
            .await?
            .into_data(&format!("POST {}", url.path()))
    }

    /// Replace an item (`PUT`).
    ///
    /// # Errors
    /// Same as [`create`](Self::create).
    #[instrument(skip_all, fields(resource = %self.kind, id = %id))]
    pub async fn update<B, T>(&self, id: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.ensure_writable()?;
        let url = self.item_url(id)?;
        let response = self
            .client
            .http()
            .put(url.as_str())
            .json(body)?
            .send()
            .await?;
        read_envelope(response)
            .await?
            .into_data(&format!("PUT {}", url.path()))
    }

    /// # Errors
    /// Returns [`ApiError::ReadOnly`] for read-only resources, otherwise
    /// [`ApiError`] on failure. An empty 2xx body is success.
    #[instrument(skip_all, fields(resource = %self.kind, id = %id))]
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.ensure_writable()?;
        let url = self.item_url(id)?;
        let response = self.client.http().delete(url.as_str()).send().await?;
        read_ack(response).await
    }
}
